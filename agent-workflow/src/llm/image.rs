//! Image payloads for multimodal prompts.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AgentError;

/// Read an image file and return `(mime_type, base64_data)`.
pub fn image_data(image_path: &Path) -> Result<(String, String), AgentError> {
    let bytes = std::fs::read(image_path)?;
    let mime_type = mime_guess::from_path(image_path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .ok_or_else(|| {
            AgentError::Config(format!(
                "cannot determine image type of {}",
                image_path.display()
            ))
        })?;
    Ok((mime_type.essence_str().to_string(), STANDARD.encode(bytes)))
}

/// Inline image attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePart {
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

impl ImagePart {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_path(image_path: &Path) -> Result<Self, AgentError> {
        let (mime_type, data) = image_data(image_path)?;
        Ok(Self { mime_type, data })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// `image_url` content part with a data URI (OpenAI, Gemini, LM Studio).
    pub fn to_data_url_object(&self) -> Value {
        json!({
            "type": "image_url",
            "image_url": {"url": self.data_url()},
        })
    }

    /// Base64 `image` content block (Anthropic).
    pub fn to_base64_source_object(&self) -> Value {
        json!({
            "type": "image",
            "source": {"type": "base64", "media_type": self.mime_type, "data": self.data},
        })
    }
}

pub fn data_url_image_object(image_path: &Path) -> Result<Value, AgentError> {
    Ok(ImagePart::from_path(image_path)?.to_data_url_object())
}

pub fn base64_source_image_object(image_path: &Path) -> Result<Value, AgentError> {
    Ok(ImagePart::from_path(image_path)?.to_base64_source_object())
}

/// Wire shape a provider expects for inline images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// OpenAI-style `image_url` part
    DataUrl,
    /// Anthropic-style `image` block
    Base64Source,
}

impl ImageFormat {
    pub fn object(self, image_path: &Path) -> Result<Value, AgentError> {
        match self {
            ImageFormat::DataUrl => data_url_image_object(image_path),
            ImageFormat::Base64Source => base64_source_image_object(image_path),
        }
    }
}
