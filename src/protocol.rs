//! Wire types exchanged between the panel, the relay and the content script.
//!
//! Commands arrive as JSON objects tagged by a camelCase `type`; responses go
//! back tagged by a SCREAMING_SNAKE_CASE `type`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single page action requested by the panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Human-readable label, echoed back in failure responses.
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: CommandKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CommandKind {
    Click {
        selector: String,
    },
    Retrieve {
        selector: String,
        #[serde(default)]
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    /// Waits for `selector`; when `text_content` is set, `selector` is a tag
    /// name and an element of that tag must have matching text.
    Wait {
        selector: String,
        #[serde(deserialize_with = "non_negative")]
        timeout: u32,
        #[serde(deserialize_with = "non_negative")]
        retries: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_content: Option<String>,
    },
    WaitForUrl {
        url_pattern: String,
        #[serde(deserialize_with = "non_negative")]
        timeout: u32,
        #[serde(deserialize_with = "non_negative")]
        retries: u32,
    },
    NestedClick {
        parent_selector: String,
        child_selector: String,
    },
    ClickByText {
        tag: String,
        text: String,
    },
    FillValue {
        value: String,
    },
    FillChildPValue {
        value: String,
    },
    TypeText {
        text: String,
    },
    MoveToNextElement,
    FocusElement {
        selector: String,
    },
    Log {
        message: String,
    },
    ProcessingFinished,
}

/// Delays and retry counts come from JS numbers; negatives count as zero.
fn non_negative<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let n = i64::deserialize(deserializer)?;
    Ok(u32::try_from(n.max(0)).unwrap_or(u32::MAX))
}

impl CommandKind {
    /// Every `type` tag the dispatcher understands.
    pub const TAGS: [&'static str; 13] = [
        "click",
        "retrieve",
        "wait",
        "waitForUrl",
        "nestedClick",
        "clickByText",
        "fillValue",
        "fillChildPValue",
        "typeText",
        "moveToNextElement",
        "focusElement",
        "log",
        "processingFinished",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            CommandKind::Click { .. } => "click",
            CommandKind::Retrieve { .. } => "retrieve",
            CommandKind::Wait { .. } => "wait",
            CommandKind::WaitForUrl { .. } => "waitForUrl",
            CommandKind::NestedClick { .. } => "nestedClick",
            CommandKind::ClickByText { .. } => "clickByText",
            CommandKind::FillValue { .. } => "fillValue",
            CommandKind::FillChildPValue { .. } => "fillChildPValue",
            CommandKind::TypeText { .. } => "typeText",
            CommandKind::MoveToNextElement => "moveToNextElement",
            CommandKind::FocusElement { .. } => "focusElement",
            CommandKind::Log { .. } => "log",
            CommandKind::ProcessingFinished => "processingFinished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Message has no string 'type' field")]
    MissingType,
    #[error("Unknown command type '{0}'")]
    UnknownType(String),
    #[error("Malformed '{command_type}' command: {reason}")]
    Malformed { command_type: String, reason: String },
}

impl Command {
    pub fn new(description: impl Into<String>, kind: CommandKind) -> Self {
        Command {
            description: description.into(),
            kind,
        }
    }

    /// Decodes a raw message, telling unknown tags apart from known tags with
    /// bad fields.
    pub fn decode(message: Value) -> Result<Command, DecodeError> {
        let command_type = match message.get("type").and_then(Value::as_str) {
            Some(tag) => tag.to_string(),
            None => return Err(DecodeError::MissingType),
        };
        if !CommandKind::TAGS.contains(&command_type.as_str()) {
            return Err(DecodeError::UnknownType(command_type));
        }
        serde_json::from_value(message).map_err(|e| DecodeError::Malformed {
            command_type,
            reason: e.to_string(),
        })
    }
}

/// The single reply produced for each command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    ActionCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    ActionFailed {
        description: String,
    },
    RetrieveCompleted {
        key: String,
        value: String,
    },
    ProcessingCompleted,
    /// Reply to a message whose `type` is missing or not a known command.
    UnknownCommand {
        #[serde(rename = "commandType", default, skip_serializing_if = "Option::is_none")]
        command_type: Option<String>,
        description: String,
    },
}

impl Response {
    pub fn completed() -> Self {
        Response::ActionCompleted { message: None }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Response::ActionFailed {
            description: description.into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Response::ActionCompleted { .. } => "ACTION_COMPLETED",
            Response::ActionFailed { .. } => "ACTION_FAILED",
            Response::RetrieveCompleted { .. } => "RETRIEVE_COMPLETED",
            Response::ProcessingCompleted => "PROCESSING_COMPLETED",
            Response::UnknownCommand { .. } => "UNKNOWN_COMMAND",
        }
    }

    pub fn to_value(&self) -> Value {
        // Serializing these variants cannot fail: every field is a string.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
