// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! JSON parsing for ChatGPT conversation exports.
//!
//! This module handles deserialization of the `conversations.json` file
//! found in a ChatGPT data export. The file is a list of conversation
//! records; each record stores its messages as a flat `mapping` of node ids
//! to tree nodes rather than as a list.
//!
//! # Format Overview
//!
//! A conversation record contains:
//! - Metadata (title, creation and update times, identifiers)
//! - A `mapping` of node id to `{ message, parent, children }`
//! - A `current_node` id marking the end of the branch last shown to the user
//!
//! Fields are read leniently. A field that is missing or has an unexpected
//! shape decodes as absent, so one odd record does not reject the export.
//!
//! # Example
//!
//! ```
//! use cg2md::parser::parse_export;
//!
//! let json = r#"[{
//!     "title": "Greeting",
//!     "create_time": 1700000000.0,
//!     "current_node": "b",
//!     "mapping": {
//!         "a": { "message": null, "parent": null, "children": ["b"] },
//!         "b": {
//!             "message": {
//!                 "author": { "role": "user" },
//!                 "content": { "content_type": "text", "parts": ["Hello"] }
//!             },
//!             "parent": "a",
//!             "children": []
//!         }
//!     }
//! }]"#;
//!
//! let records = parse_export(json).unwrap();
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].mapping.as_ref().unwrap().len(), 2);
//! ```

use crate::message::Message;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use snafu::prelude::*;

/// Error type for JSON parsing failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },

    /// The top-level value is neither a conversation nor a list of them.
    #[snafu(display("expected a conversation object or a list of conversations, found {found}"))]
    UnexpectedShape {
        /// The JSON type that was found instead.
        found: &'static str,
    },
}

/// A conversation record as it appears in the export.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawConversation {
    /// The conversation title, if one was generated or set.
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,

    /// Creation time in epoch seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub create_time: Option<f64>,

    /// Last update time in epoch seconds.
    #[serde(default, deserialize_with = "lenient")]
    pub update_time: Option<f64>,

    /// The flat node dictionary, in document order.
    #[serde(default, deserialize_with = "lenient")]
    pub mapping: Option<IndexMap<String, RawNode>>,

    /// Moderation results attached by the service.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub moderation_results: Vec<Value>,

    /// Id of the node the user was last looking at.
    #[serde(default, deserialize_with = "lenient")]
    pub current_node: Option<String>,

    /// Plugins enabled for the conversation.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub plugin_ids: Vec<String>,

    /// The conversation identifier used in chat links.
    #[serde(default, deserialize_with = "lenient")]
    pub conversation_id: Option<String>,

    /// The custom GPT or template the conversation was started from.
    #[serde(default, deserialize_with = "lenient")]
    pub conversation_template_id: Option<String>,

    /// The record identifier.
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
}

/// One entry of a conversation's `mapping`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawNode {
    /// The message carried by the node. Structural nodes have none.
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<Message>,

    /// Id of the parent node; absent for roots.
    #[serde(default, deserialize_with = "lenient")]
    pub parent: Option<String>,

    /// Ids of the child nodes, in the order the export declares them.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub children: Vec<String>,
}

/// Deserializes an optional field, treating a value of the wrong shape as absent.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Like [`lenient`] but falls back to `T::default()`.
pub(crate) fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Returns a short name for the JSON type of `value`, for error messages.
const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parses a JSON string into a list of [`RawConversation`] records.
///
/// This is the main entry point for parsing. It accepts both a whole
/// `conversations.json` file (a list) and a single conversation object.
///
/// # Arguments
///
/// * `json_str` - The raw JSON content of an export file
///
/// # Errors
///
/// Returns an error if the JSON is malformed, or if the top-level value (or
/// a list element) is not an object.
///
/// # Example
///
/// ```
/// use cg2md::parser::parse_export;
///
/// let records = parse_export(r#"{ "title": "Solo", "mapping": {} }"#).unwrap();
/// assert_eq!(records[0].title.as_deref(), Some("Solo"));
/// ```
pub fn parse_export(json_str: &str) -> Result<Vec<RawConversation>, ParseError> {
    let value: Value = serde_json::from_str(json_str).context(JsonSnafu)?;

    match value {
        Value::Array(items) => {
            if let Some(bad) = items.iter().find(|item| !item.is_object()) {
                return UnexpectedShapeSnafu {
                    found: json_type(bad),
                }
                .fail();
            }
            serde_json::from_value(Value::Array(items)).context(JsonSnafu)
        }
        Value::Object(_) => Ok(vec![serde_json::from_value(value).context(JsonSnafu)?]),
        other => UnexpectedShapeSnafu {
            found: json_type(&other),
        }
        .fail(),
    }
}
