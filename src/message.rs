// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! A single turn of a ChatGPT conversation.
//!
//! Messages live inside tree nodes (`mapping -> node -> message` in the
//! export). They are decoded leniently: a field with an unexpected shape is
//! treated as absent rather than rejecting the whole export. Accessors that
//! depend on the author or content, however, fail with a [`MessageError`]
//! when those fields are missing, since that indicates a corrupted export
//! rather than an optional field.

use serde::Deserialize;
use serde_json::{Map, Value};
use snafu::prelude::*;
use std::fmt;

/// Error type for accessing fields of a malformed message.
#[derive(Debug, Snafu)]
pub enum MessageError {
    /// The message has no usable `author` field.
    #[snafu(display("message {id} has no author"))]
    MissingAuthor {
        /// Identifier of the offending message.
        id: String,
    },

    /// The message has no usable `content` field.
    #[snafu(display("message {id} has no content"))]
    MissingContent {
        /// Identifier of the offending message.
        id: String,
    },
}

/// The author category of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts, including custom instructions.
    System,
    /// The human side of the conversation.
    User,
    /// Model responses.
    Assistant,
    /// Plugin, browser and code interpreter output.
    Tool,
    /// A role this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl Role {
    /// The four roles a well-formed export uses.
    pub const KNOWN: [Self; 4] = [Self::System, Self::User, Self::Assistant, Self::Tool];

    /// Returns the lowercase name used in the export format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Author {
    /// The author's role.
    pub role: Role,

    /// Optional display name (set for plugins and browsing tools).
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub name: Option<String>,
}

/// The payload of a message, discriminated by its shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBody {
    /// A list of segments. Text segments are strings; attachments are objects.
    Parts(Vec<Value>),

    /// Code or execution output carried in a single `text` field.
    Code(String),

    /// Neither shape was present.
    Other,
}

/// The content of a message together with its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    /// The declared content type (e.g. `text`, `code`, `execution_output`).
    pub content_type: String,

    /// The decoded payload.
    pub body: ContentBody,
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let content_type = value
            .get("content_type")
            .and_then(Value::as_str)
            .ok_or_else(|| serde::de::Error::missing_field("content_type"))?
            .to_owned();

        let body = if let Some(parts) = value.get("parts").and_then(Value::as_array) {
            ContentBody::Parts(parts.clone())
        } else if let Some(text) = value.get("text").and_then(Value::as_str) {
            ContentBody::Code(text.to_owned())
        } else {
            ContentBody::Other
        };

        Ok(Self { content_type, body })
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    /// The message identifier.
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub id: Option<String>,

    /// Who wrote the message.
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub author: Option<Author>,

    /// Creation time in epoch seconds.
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub create_time: Option<f64>,

    /// Last update time in epoch seconds.
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub update_time: Option<f64>,

    /// The message payload.
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub content: Option<Content>,

    /// Completion status (e.g. `finished_successfully`).
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub status: Option<String>,

    /// Whether this message ended the assistant's turn.
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub end_turn: Option<bool>,

    /// Sampling weight assigned by the exporter.
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub weight: Option<f64>,

    /// Open key/value metadata; the set of keys depends on the exporter version.
    #[serde(default, deserialize_with = "crate::parser::lenient_or_default")]
    pub metadata: Map<String, Value>,

    /// The intended recipient (`all`, or a tool name for tool calls).
    #[serde(default, deserialize_with = "crate::parser::lenient")]
    pub recipient: Option<String>,
}

impl Message {
    fn display_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| "<unknown>".to_owned())
    }

    /// Returns the role of the message author.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingAuthor`] if the author field is absent
    /// or malformed.
    pub fn author_role(&self) -> Result<Role, MessageError> {
        self.author
            .as_ref()
            .map(|author| author.role)
            .with_context(|| MissingAuthorSnafu {
                id: self.display_id(),
            })
    }

    /// Returns the Markdown header for this message's author.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingAuthor`] if the author field is absent
    /// or malformed.
    pub fn author_header(&self, headers: &AuthorHeaders) -> Result<String, MessageError> {
        Ok(headers.for_role(self.author_role()?))
    }

    fn content(&self) -> Result<&Content, MessageError> {
        self.content.as_ref().with_context(|| MissingContentSnafu {
            id: self.display_id(),
        })
    }

    /// Returns the declared content type of the message.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingContent`] if the content field is
    /// absent or malformed.
    pub fn content_type(&self) -> Result<&str, MessageError> {
        Ok(&self.content()?.content_type)
    }

    /// Returns the text of the message.
    ///
    /// Text parts are joined with newlines and non-text parts are skipped.
    /// Code payloads are wrapped in a fenced block. Content of any other
    /// shape yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingContent`] if the content field is
    /// absent or malformed.
    pub fn content_text(&self) -> Result<String, MessageError> {
        Ok(match &self.content()?.body {
            ContentBody::Parts(parts) => parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
            ContentBody::Code(text) => format!("```python\n{text}\n```"),
            ContentBody::Other => String::new(),
        })
    }

    /// Returns the model that produced this message, if recorded.
    #[must_use]
    pub fn model_slug(&self) -> Option<&str> {
        self.metadata.get("model_slug").and_then(Value::as_str)
    }

    /// Returns the namespace of the plugin this message came from, if any.
    #[must_use]
    pub fn invoked_plugin_namespace(&self) -> Option<&str> {
        self.metadata
            .get("invoked_plugin")?
            .get("namespace")?
            .as_str()
    }

    /// Returns `true` if the metadata marks this as the user's custom
    /// instructions message.
    #[must_use]
    pub fn is_user_system_message(&self) -> bool {
        self.metadata
            .get("is_user_system_message")
            .is_some_and(truthy)
    }
}

/// Whether a metadata flag counts as set: `true`, a nonzero number, or a
/// non-empty string, array or object.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Markdown headers placed above each message, per author role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthorHeaders {
    /// Header for system messages.
    pub system: String,
    /// Header for user messages.
    pub user: String,
    /// Header for assistant messages.
    pub assistant: String,
    /// Header for tool messages.
    pub tool: String,
}

impl Default for AuthorHeaders {
    fn default() -> Self {
        Self {
            system: "### System".into(),
            user: "# User".into(),
            assistant: "# Assistant".into(),
            tool: "# Tool".into(),
        }
    }
}

impl AuthorHeaders {
    /// Returns the header configured for `role`.
    #[must_use]
    pub fn for_role(&self, role: Role) -> String {
        match role {
            Role::System => self.system.clone(),
            Role::User => self.user.clone(),
            Role::Assistant => self.assistant.clone(),
            Role::Tool => self.tool.clone(),
            Role::Unknown => "# Unknown".to_owned(),
        }
    }
}
