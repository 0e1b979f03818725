// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Markdown rendering for ChatGPT conversations.
//!
//! This module transforms a [`Conversation`] into a Markdown document with
//! a YAML front matter block.
//!
//! # Output Format
//!
//! The rendered document includes:
//! - A YAML header with the title, chat link, timestamps, model, plugins,
//!   message count, content types and custom instructions
//! - One block per message, tagged with its branch, headed by an anchor and
//!   the author header, and followed by links to its children
//! - A `---` rule after each message
//!
//! # Example
//!
//! ```
//! use cg2md::conversation::Conversation;
//! use cg2md::parser::parse_export;
//! use cg2md::renderer::{render_conversation, RenderOptions};
//!
//! let json = r#"{
//!     "title": "Greeting",
//!     "current_node": "b",
//!     "conversation_id": "abc",
//!     "mapping": {
//!         "a": {
//!             "message": {
//!                 "author": { "role": "user" },
//!                 "content": { "content_type": "text", "parts": ["Hello!"] }
//!             },
//!             "children": ["b"]
//!         },
//!         "b": {
//!             "message": {
//!                 "author": { "role": "assistant" },
//!                 "content": { "content_type": "text", "parts": ["Hi there!"] }
//!             },
//!             "parent": "a"
//!         }
//!     }
//! }"#;
//!
//! let raw = parse_export(json).unwrap().remove(0);
//! let conversation = Conversation::try_from(raw).unwrap();
//! let markdown = render_conversation(&conversation, &RenderOptions::default()).unwrap();
//!
//! assert!(markdown.starts_with("---\ntitle: \"Greeting\"\n"));
//! assert!(markdown.contains("Hello!"));
//! assert!(markdown.contains("Hi there!"));
//! ```

use crate::conversation::{BranchTag, Conversation, ConversationError, MessageSnafu, local_time};
use crate::message::AuthorHeaders;
use crate::node::Node;
use serde::Deserialize;
use serde_json::{Value, json};
use snafu::prelude::*;
use std::collections::HashSet;
use std::fmt::Write;

/// Which keys appear in the YAML header.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct YamlFields {
    /// Include the conversation title.
    pub title: bool,
    /// Include the link to the conversation on chat.openai.com.
    pub chat_link: bool,
    /// Include the creation time.
    pub create_time: bool,
    /// Include the last update time.
    pub update_time: bool,
    /// Include the model of the first assistant message.
    pub model: bool,
    /// Include the plugins used by tool messages.
    pub used_plugins: bool,
    /// Include the number of user and assistant messages.
    pub message_count: bool,
    /// Include the distinct content types.
    pub content_types: bool,
    /// Include the custom instructions.
    pub custom_instructions: bool,
}

impl Default for YamlFields {
    fn default() -> Self {
        Self {
            title: true,
            chat_link: true,
            create_time: true,
            update_time: true,
            model: true,
            used_plugins: true,
            message_count: true,
            content_types: true,
            custom_instructions: true,
        }
    }
}

/// How LaTeX math delimiters are written in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatexDelimiters {
    /// Keep `\[ \]` and `\( \)` as produced by the model.
    #[default]
    Default,
    /// Rewrite to `$$ $$` and `$ $`, as Obsidian and most Markdown viewers expect.
    DollarSign,
}

/// Configuration options for Markdown rendering.
///
/// Every field has a default, so a partial JSON configuration file is
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Which keys appear in the YAML header.
    pub yaml: YamlFields,

    /// How LaTeX delimiters are written.
    pub latex_delimiters: LatexDelimiters,

    /// Markdown headers placed above each message.
    pub author_headers: AuthorHeaders,

    /// Whether to render only the main branch.
    ///
    /// By default every message is rendered, including edited prompts and
    /// regenerated responses, each tagged with its branch.
    pub main_branch_only: bool,
}

/// Formats epoch seconds like C's `ctime`, in local time.
fn ctime(epoch_seconds: Option<f64>) -> Value {
    epoch_seconds
        .and_then(local_time)
        .map_or(Value::Null, |time| {
            json!(time.format("%a %b %e %H:%M:%S %Y").to_string())
        })
}

/// Renders the YAML front matter for a conversation.
///
/// Values are written in JSON flow style, which YAML accepts, so titles
/// with colons or quotes need no further escaping.
///
/// # Errors
///
/// Returns an error if a message consulted for the header is malformed.
pub fn yaml_header(conv: &Conversation, opts: &RenderOptions) -> Result<String, ConversationError> {
    let fields = &opts.yaml;
    let mut entries: Vec<(&str, Value)> = Vec::new();

    if fields.title {
        entries.push(("title", json!(conv.title())));
    }
    if fields.chat_link {
        entries.push(("chat_link", json!(conv.chat_link())));
    }
    if fields.create_time {
        entries.push(("create_time", ctime(conv.create_time())));
    }
    if fields.update_time {
        entries.push(("update_time", ctime(conv.update_time())));
    }
    if fields.model {
        entries.push(("model", json!(conv.model_slug()?)));
    }
    if fields.used_plugins {
        entries.push(("used_plugins", json!(conv.used_plugins()?)));
    }
    if fields.message_count {
        entries.push(("message_count", json!(conv.message_count()?)));
    }
    if fields.content_types {
        entries.push(("content_types", json!(conv.content_types()?)));
    }
    if fields.custom_instructions {
        entries.push((
            "custom_instructions",
            conv.custom_instructions()?.cloned().unwrap_or(Value::Null),
        ));
    }

    let mut out = String::from("---\n");
    for (key, value) in entries {
        writeln!(out, "{key}: {value}").unwrap();
    }
    out.push_str("---\n");
    Ok(out)
}

/// Renders a conversation as Markdown.
///
/// This is the main entry point for rendering. It writes the YAML header,
/// then one block per message: every message node in declaration order, or
/// only the main branch when [`RenderOptions::main_branch_only`] is set.
///
/// # Arguments
///
/// * `conv` - The conversation to render
/// * `opts` - Configuration options controlling the output format
///
/// # Errors
///
/// Returns an error if a message lacks the author or content needed to
/// render it.
pub fn render_conversation(
    conv: &Conversation,
    opts: &RenderOptions,
) -> Result<String, ConversationError> {
    let mut out = yaml_header(conv, opts)?;

    let main_branch: HashSet<&str> = conv
        .main_branch_nodes()
        .into_iter()
        .map(Node::id)
        .collect();
    let nodes = if opts.main_branch_only {
        conv.main_branch_nodes()
    } else {
        conv.all_message_nodes()
    };

    for node in nodes {
        let Some(message) = node.message() else {
            continue;
        };
        let context = || MessageSnafu { node: node.id() };

        let text = message.content_text().context(context())?;
        let mut content = ensure_closed_code_blocks(&text);
        if !content.is_empty() {
            content = format!("\n{content}\n");
        }
        if opts.latex_delimiters == LatexDelimiters::DollarSign {
            content = replace_latex_delimiters(&content);
        }

        let header = node
            .header(conv.parent(node), &opts.author_headers)
            .context(context())?;
        let tag = if main_branch.contains(node.id()) {
            BranchTag::Main
        } else {
            BranchTag::Other
        };
        writeln!(out, "\n{tag}\n{header}{content}{}\n---", node.footer())
        .unwrap();
    }

    Ok(out)
}

/// Appends a closing fence if the text leaves a code block open.
///
/// A block opens on any line starting with three backticks (optionally
/// followed by a language) and closes only on a line that is exactly three
/// backticks.
fn ensure_closed_code_blocks(text: &str) -> String {
    let mut open = false;
    for line in text.split('\n') {
        if !open && line.starts_with("```") {
            open = true;
        } else if open && line == "```" {
            open = false;
        }
    }

    if open {
        format!("{text}\n```")
    } else {
        text.to_owned()
    }
}

/// Rewrites LaTeX bracket delimiters to dollar-sign delimiters.
fn replace_latex_delimiters(text: &str) -> String {
    text.replace("\\[", "$$")
        .replace("\\]", "$$")
        .replace("\\(", "$")
        .replace("\\)", "$")
}
