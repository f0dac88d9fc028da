//! Chat messages and conversion to rig's completion format.

use rig::completion::message::{AssistantContent, Message as RigMessage};
use rig::completion::ToolDefinition as RigToolDefinition;
use rig::message::{ImageDetail, ImageMediaType, MimeType, ToolCall as RigToolCall, UserContent};
use rig::OneOrMany;
use serde::{Deserialize, Serialize};

use super::image::ImagePart;
use crate::tools::ToolDefinition;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImagePart>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// User turn carrying inline images after the text.
    pub fn user_with_images(content: impl Into<String>, images: Vec<ImagePart>) -> Self {
        Self {
            images,
            ..Self::with_role(Role::User, content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

/// A conversation split the way rig expects it: preamble, history, prompt.
pub(crate) struct RigConversation {
    pub prompt: RigMessage,
    pub history: Vec<RigMessage>,
    pub preamble: Option<String>,
}

pub(crate) fn build_rig_conversation(messages: &[Message]) -> RigConversation {
    let mut system_parts = Vec::new();
    let mut rig_messages = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                if !message.content.trim().is_empty() {
                    system_parts.push(message.content.clone());
                }
            }
            Role::User => rig_messages.push(convert_user_message(message)),
            Role::Assistant => rig_messages.push(convert_assistant_message(message)),
            Role::Tool => {
                let id = message
                    .tool_call_id
                    .clone()
                    .unwrap_or_else(|| "tool".to_string());
                rig_messages.push(RigMessage::tool_result(id, message.content.clone()));
            }
        }
    }

    let prompt = rig_messages.pop().unwrap_or_else(|| RigMessage::user(""));
    let preamble = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

    RigConversation {
        prompt,
        history: rig_messages,
        preamble,
    }
}

fn convert_user_message(message: &Message) -> RigMessage {
    if message.images.is_empty() {
        return RigMessage::user(message.content.clone());
    }

    let mut contents = vec![UserContent::text(message.content.clone())];
    for image in &message.images {
        contents.push(UserContent::image_base64(
            image.data.clone(),
            ImageMediaType::from_mime_type(&image.mime_type),
            Some(ImageDetail::default()),
        ));
    }

    match OneOrMany::many(contents) {
        Ok(content) => RigMessage::User { content },
        Err(_) => RigMessage::user(message.content.clone()),
    }
}

fn convert_assistant_message(message: &Message) -> RigMessage {
    let mut contents = Vec::new();

    if !message.content.is_empty() {
        contents.push(AssistantContent::text(message.content.clone()));
    }
    for call in &message.tool_calls {
        contents.push(AssistantContent::tool_call(
            call.id.clone(),
            call.name.clone(),
            call.arguments.clone(),
        ));
    }

    let content = OneOrMany::many(contents)
        .unwrap_or_else(|_| OneOrMany::one(AssistantContent::text("")));

    RigMessage::Assistant { id: None, content }
}

pub(crate) fn to_rig_tool_definitions(tools: &[ToolDefinition]) -> Vec<RigToolDefinition> {
    tools
        .iter()
        .map(|tool| RigToolDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        })
        .collect()
}

/// Split a rig assistant choice into text and tool calls.
pub(crate) fn split_rig_choice(choice: &OneOrMany<AssistantContent>) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for item in choice.iter() {
        match item {
            AssistantContent::Text(part) => text.push_str(&part.text),
            AssistantContent::ToolCall(call) => tool_calls.push(convert_rig_tool_call(call)),
            _ => {}
        }
    }

    (text, tool_calls)
}

fn convert_rig_tool_call(call: &RigToolCall) -> ToolCall {
    ToolCall {
        id: call.id.clone(),
        name: call.function.name.clone(),
        arguments: call.function.arguments.clone(),
    }
}
