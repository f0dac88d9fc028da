//! Language model handles
//!
//! Nodes talk to models only through the [`Llm`] trait. Three families of
//! implementation ship with the crate:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Llm (trait)                 │
//! │  invoke / stream / invoke_with_chat      │
//! │  invoke_with_tools / chat_with_tools     │
//! │  invoke_with_images / structured output  │
//! └───────┬───────────────┬──────────────┬───┘
//!         ▼               ▼              ▼
//!   RigModel<M>     LmStudioModel    ScriptedLlm
//!  (OpenAI, Claude,  (OpenAI-compat   (in-process,
//!   Gemini via rig)   HTTP server)     deterministic)
//! ```
//!
//! Handles are usually created through [`crate::providers::ModelFactory`],
//! which picks the implementation from the model name.

mod config;
mod image;
mod lmstudio;
mod message;
mod provider;
mod rig_model;
mod scripted;
mod text;

pub use config::{normalize_host, LlmConfig, ProviderSettings, TokenUsage, DEFAULT_LMSTUDIO_HOST};
pub use image::{
    base64_source_image_object, data_url_image_object, image_data, ImageFormat, ImagePart,
};
pub use lmstudio::LmStudioModel;
pub use message::{Message, Role, ToolCall};
pub use provider::{Llm, LlmChunk, LlmStream, ToolCallResponse};
pub use rig_model::{anthropic, gemini, openai, RigModel, ANTHROPIC_DEFAULT_MAX_TOKENS};
pub use scripted::ScriptedLlm;
pub use text::{extract_json, strip_think, structured_output_prompt};

pub(crate) use lmstudio::list_models as list_lmstudio_models;
