// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! The conversation aggregate.
//!
//! A [`Conversation`] owns the node tree of one export record and the id of
//! its current node. Everything else (the main branch, role filters, text and
//! count aggregates) is derived on demand by walking the tree.
//!
//! # Branches
//!
//! Editing a prompt or regenerating a response adds a sibling node, so a
//! conversation is a tree. The *main branch* is the path from the root to the
//! current node, which is what the user last saw. [`Conversation::all_message_nodes`]
//! also returns the nodes of every other branch.
//!
//! # Example
//!
//! ```
//! use cg2md::conversation::Conversation;
//! use cg2md::parser::parse_export;
//!
//! let json = r#"{
//!     "current_node": "b",
//!     "mapping": {
//!         "root": { "message": null, "parent": null, "children": ["a"] },
//!         "a": {
//!             "message": {
//!                 "author": { "role": "user" },
//!                 "content": { "content_type": "text", "parts": ["Hi"] }
//!             },
//!             "parent": "root",
//!             "children": ["b"]
//!         },
//!         "b": {
//!             "message": {
//!                 "author": { "role": "assistant" },
//!                 "content": { "content_type": "text", "parts": ["Hello!"] },
//!                 "metadata": { "model_slug": "gpt-4" }
//!             },
//!             "parent": "a",
//!             "children": []
//!         }
//!     }
//! }"#;
//!
//! let raw = parse_export(json).unwrap().remove(0);
//! let conversation = Conversation::try_from(raw).unwrap();
//!
//! assert_eq!(conversation.main_branch_nodes().len(), 2);
//! assert_eq!(conversation.message_count().unwrap(), 2);
//! assert_eq!(conversation.model_slug().unwrap(), Some("gpt-4"));
//! ```

use crate::message::{Message, MessageError, Role};
use crate::node::{Node, NodeTree};
use crate::parser::RawConversation;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value;
use snafu::prelude::*;
use std::collections::BTreeSet;
use std::fmt;

/// Error type for building and querying a conversation.
#[derive(Debug, Snafu)]
pub enum ConversationError {
    /// The record has no `current_node` field.
    #[snafu(display("conversation has no current node"))]
    MissingCurrentNode,

    /// The record's `current_node` does not name a node in its mapping.
    #[snafu(display("current node {id} is not in the mapping"))]
    UnknownCurrentNode {
        /// The id that could not be found.
        id: String,
    },

    /// A message needed by a query is malformed.
    #[snafu(display("malformed message in node {node}: {source}"), visibility(pub(crate)))]
    Message {
        /// Id of the node carrying the message.
        node: String,
        /// The underlying message error.
        source: MessageError,
    },
}

/// Whether a node lies on the main branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchTag {
    /// The node is on the path from the root to the current node.
    Main,
    /// The node belongs to a branch that diverged from the main one.
    Other,
}

impl fmt::Display for BranchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("(main branch ⎇)"),
            Self::Other => f.write_str("(other branch ⎇)"),
        }
    }
}

/// One conversation from a ChatGPT export.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    title: Option<String>,
    create_time: Option<f64>,
    update_time: Option<f64>,
    nodes: NodeTree,
    current_node: String,
    moderation_results: Vec<Value>,
    plugin_ids: Vec<String>,
    conversation_id: Option<String>,
    template_id: Option<String>,
    id: Option<String>,
}

impl TryFrom<RawConversation> for Conversation {
    type Error = ConversationError;

    fn try_from(raw: RawConversation) -> Result<Self, Self::Error> {
        let nodes = NodeTree::from_mapping(raw.mapping);
        let current_node = raw.current_node.context(MissingCurrentNodeSnafu)?;
        ensure!(
            nodes.contains(&current_node),
            UnknownCurrentNodeSnafu { id: current_node }
        );

        Ok(Self {
            title: raw.title,
            create_time: raw.create_time,
            update_time: raw.update_time,
            nodes,
            current_node,
            moderation_results: raw.moderation_results,
            plugin_ids: raw.plugin_ids,
            conversation_id: raw.conversation_id,
            template_id: raw.conversation_template_id,
            id: raw.id,
        })
    }
}

/// Returns the role of a message-bearing node, tagging errors with the node id.
fn node_role(node: &Node, message: &Message) -> Result<Role, ConversationError> {
    message
        .author_role()
        .context(MessageSnafu { node: node.id() })
}

impl Conversation {
    /// The conversation title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Creation time in epoch seconds.
    #[must_use]
    pub const fn create_time(&self) -> Option<f64> {
        self.create_time
    }

    /// Last update time in epoch seconds.
    #[must_use]
    pub const fn update_time(&self) -> Option<f64> {
        self.update_time
    }

    /// The full node tree.
    #[must_use]
    pub const fn nodes(&self) -> &NodeTree {
        &self.nodes
    }

    /// The node the user was last looking at.
    #[must_use]
    pub fn current_node(&self) -> &Node {
        // Checked at construction and the tree is never mutated.
        &self.nodes[self.current_node.as_str()]
    }

    /// Moderation results attached to the record.
    #[must_use]
    pub fn moderation_results(&self) -> &[Value] {
        &self.moderation_results
    }

    /// Plugins enabled for the conversation.
    #[must_use]
    pub fn plugin_ids(&self) -> &[String] {
        &self.plugin_ids
    }

    /// The conversation identifier.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// The custom GPT or template the conversation was started from.
    #[must_use]
    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    /// The record identifier.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Link to the conversation on chat.openai.com. Opening it requires the
    /// owner's login; it is not a share link.
    #[must_use]
    pub fn chat_link(&self) -> Option<String> {
        self.conversation_id
            .as_ref()
            .map(|id| format!("https://chat.openai.com/c/{id}"))
    }

    /// Returns the parent of `node`, if it has one.
    #[must_use]
    pub fn parent(&self, node: &Node) -> Option<&Node> {
        self.nodes.parent(node)
    }

    /// Message-bearing nodes on the main branch, in root-to-current order.
    ///
    /// The walk starts at the current node and follows parents. A node is
    /// collected only while it still has a parent, so the root itself is
    /// never included, even if it carries a message.
    #[must_use]
    pub fn main_branch_nodes(&self) -> Vec<&Node> {
        let mut nodes = Vec::new();
        let mut node = self.current_node();

        // A cycle in the parent links would otherwise never terminate.
        for _ in 0..self.nodes.len() {
            let Some(parent) = self.nodes.parent(node) else {
                nodes.reverse();
                return nodes;
            };
            if node.message().is_some() {
                nodes.push(node);
            }
            node = parent;
        }

        tracing::warn!(
            conversation = ?self.conversation_id,
            "parent links form a cycle; main branch truncated"
        );
        nodes.reverse();
        nodes
    }

    /// Every message-bearing node, on all branches, in declaration order.
    #[must_use]
    pub fn all_message_nodes(&self) -> Vec<&Node> {
        self.message_nodes().map(|(node, _)| node).collect()
    }

    fn message_nodes(&self) -> impl Iterator<Item = (&Node, &Message)> {
        self.nodes
            .iter()
            .filter_map(|node| node.message().map(|message| (node, message)))
    }

    /// Returns `true` if some message lies off the main branch.
    #[must_use]
    pub fn has_multiple_branches(&self) -> bool {
        self.message_nodes().count() > self.main_branch_nodes().len()
    }

    /// Number of message-bearing nodes without children.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.message_nodes()
            .filter(|(node, _)| node.is_leaf())
            .count()
    }

    /// Tags `node` with whether it lies on the main branch.
    #[must_use]
    pub fn branch_indicator(&self, node: &Node) -> BranchTag {
        if self
            .main_branch_nodes()
            .iter()
            .any(|main| main.id() == node.id())
        {
            BranchTag::Main
        } else {
            BranchTag::Other
        }
    }

    /// Message-bearing nodes authored by `role`, on all branches, in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn nodes_with_role(&self, role: Role) -> Result<Vec<&Node>, ConversationError> {
        let mut nodes = Vec::new();
        for (node, message) in self.message_nodes() {
            if node_role(node, message)? == role {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// System messages on all branches.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn system_nodes(&self) -> Result<Vec<&Node>, ConversationError> {
        self.nodes_with_role(Role::System)
    }

    /// User messages on all branches.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn user_nodes(&self) -> Result<Vec<&Node>, ConversationError> {
        self.nodes_with_role(Role::User)
    }

    /// Assistant messages on all branches.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn assistant_nodes(&self) -> Result<Vec<&Node>, ConversationError> {
        self.nodes_with_role(Role::Assistant)
    }

    /// Tool messages on all branches.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn tool_nodes(&self) -> Result<Vec<&Node>, ConversationError> {
        self.nodes_with_role(Role::Tool)
    }

    /// Creation times of the messages authored by `role`, in declaration
    /// order. Messages without a creation time are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn message_timestamps(&self, role: Role) -> Result<Vec<f64>, ConversationError> {
        Ok(self
            .nodes_with_role(role)?
            .into_iter()
            .filter_map(|node| node.message()?.create_time)
            .collect())
    }

    /// Creation times of all user messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn user_message_timestamps(&self) -> Result<Vec<f64>, ConversationError> {
        self.message_timestamps(Role::User)
    }

    /// Creation times of all assistant messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn assistant_message_timestamps(&self) -> Result<Vec<f64>, ConversationError> {
        self.message_timestamps(Role::Assistant)
    }

    /// Text of every message authored by `role`, joined with newlines.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author,
    /// or if a message of this role has no content.
    pub fn entire_text(&self, role: Role) -> Result<String, ConversationError> {
        let mut texts = Vec::new();
        for node in self.nodes_with_role(role)? {
            if let Some(message) = node.message() {
                texts.push(
                    message
                        .content_text()
                        .context(MessageSnafu { node: node.id() })?,
                );
            }
        }
        Ok(texts.join("\n"))
    }

    /// Text of every user message, joined with newlines.
    ///
    /// # Errors
    ///
    /// See [`Conversation::entire_text`].
    pub fn entire_user_text(&self) -> Result<String, ConversationError> {
        self.entire_text(Role::User)
    }

    /// Text of every assistant message, joined with newlines.
    ///
    /// # Errors
    ///
    /// See [`Conversation::entire_text`].
    pub fn entire_assistant_text(&self) -> Result<String, ConversationError> {
        self.entire_text(Role::Assistant)
    }

    /// Distinct content types across all messages, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no content.
    pub fn content_types(&self) -> Result<Vec<String>, ConversationError> {
        let mut types = BTreeSet::new();
        for (node, message) in self.message_nodes() {
            let content_type = message
                .content_type()
                .context(MessageSnafu { node: node.id() })?;
            types.insert(content_type.to_owned());
        }
        Ok(types.into_iter().collect())
    }

    /// Number of user and assistant messages on all branches. System and
    /// tool messages are not counted.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn message_count(&self) -> Result<usize, ConversationError> {
        let mut count = 0;
        for (node, message) in self.message_nodes() {
            if matches!(node_role(node, message)?, Role::User | Role::Assistant) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// The model of the first assistant message, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn model_slug(&self) -> Result<Option<&str>, ConversationError> {
        Ok(self
            .assistant_nodes()?
            .into_iter()
            .next()
            .and_then(Node::message)
            .and_then(Message::model_slug))
    }

    /// Distinct plugin namespaces invoked by tool messages, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn used_plugins(&self) -> Result<Vec<&str>, ConversationError> {
        let plugins: BTreeSet<_> = self
            .tool_nodes()?
            .into_iter()
            .filter_map(|node| node.message()?.invoked_plugin_namespace())
            .collect();
        Ok(plugins.into_iter().collect())
    }

    /// The custom instructions in effect for the conversation, if any.
    ///
    /// Custom instructions are carried by the second system message, flagged
    /// as a user system message in its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Message`] if any message has no author.
    pub fn custom_instructions(&self) -> Result<Option<&Value>, ConversationError> {
        let second = self.system_nodes()?.into_iter().nth(1);
        let Some(message) = second.and_then(Node::message) else {
            return Ok(None);
        };
        if !message.is_user_system_message() {
            return Ok(None);
        }
        Ok(message.metadata.get("user_context_message_data"))
    }

    /// The creation time in the local time zone.
    #[must_use]
    pub fn local_create_time(&self) -> Option<DateTime<Local>> {
        self.create_time.and_then(local_time)
    }

    /// Midnight on January 1st of the year the conversation was created in.
    #[must_use]
    pub fn start_of_year(&self) -> Option<NaiveDateTime> {
        self.local_create_time().as_ref().and_then(start_of_year)
    }

    /// Midnight on the first day of the month the conversation was created in.
    #[must_use]
    pub fn start_of_month(&self) -> Option<NaiveDateTime> {
        self.local_create_time().as_ref().and_then(start_of_month)
    }

    /// Midnight on the Monday of the week the conversation was created in.
    #[must_use]
    pub fn start_of_week(&self) -> Option<NaiveDateTime> {
        self.local_create_time().as_ref().and_then(start_of_week)
    }
}

/// Converts epoch seconds to local time. Returns `None` for values outside
/// the representable range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn local_time(epoch_seconds: f64) -> Option<DateTime<Local>> {
    if !epoch_seconds.is_finite() {
        return None;
    }
    let secs = epoch_seconds.floor();
    let nanos = ((epoch_seconds - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
        .map(|utc| utc.with_timezone(&Local))
}

fn midnight(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
}

/// Midnight on January 1st of the year containing `time`.
#[must_use]
pub fn start_of_year<Tz: TimeZone>(time: &DateTime<Tz>) -> Option<NaiveDateTime> {
    midnight(NaiveDate::from_ymd_opt(time.year(), 1, 1)?)
}

/// Midnight on the first day of the month containing `time`.
#[must_use]
pub fn start_of_month<Tz: TimeZone>(time: &DateTime<Tz>) -> Option<NaiveDateTime> {
    midnight(NaiveDate::from_ymd_opt(time.year(), time.month(), 1)?)
}

/// Midnight on the Monday of the ISO week containing `time`.
#[must_use]
pub fn start_of_week<Tz: TimeZone>(time: &DateTime<Tz>) -> Option<NaiveDateTime> {
    let date = time.date_naive();
    let back = u64::from(date.weekday().num_days_from_monday());
    midnight(date.checked_sub_days(Days::new(back))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_export;
    use chrono::{FixedOffset, Timelike, Utc};
    use serde_json::json;

    fn message(role: &str, text: &str, metadata: &Value) -> Value {
        json!({
            "id": format!("msg-{text}"),
            "author": { "role": role },
            "create_time": 1_700_000_000.0,
            "content": { "content_type": "text", "parts": [text] },
            "metadata": metadata,
        })
    }

    fn node(message: Option<Value>, parent: Option<&str>, children: &[&str]) -> Value {
        json!({ "message": message, "parent": parent, "children": children })
    }

    fn conversation(mapping: &Value, current: &str) -> Conversation {
        let record = json!({
            "title": "Test",
            "create_time": 1_700_000_000.0,
            "update_time": 1_700_000_500.0,
            "mapping": mapping,
            "current_node": current,
            "conversation_id": "conv-1",
        });
        let raw = parse_export(&record.to_string()).unwrap().remove(0);
        Conversation::try_from(raw).unwrap()
    }

    /// A(root, no message) -> B(system) -> C(user) -> D(assistant).
    fn linear() -> Value {
        json!({
            "A": node(None, None, &["B"]),
            "B": node(Some(message("system", "sys", &json!({}))), Some("A"), &["C"]),
            "C": node(Some(message("user", "question", &json!({}))), Some("B"), &["D"]),
            "D": node(
                Some(message("assistant", "answer", &json!({ "model_slug": "gpt-4" }))),
                Some("C"),
                &[],
            ),
        })
    }

    /// The linear tree plus an edited prompt C2 next to C.
    fn branched() -> Value {
        let mut mapping = linear();
        mapping["B"]["children"] = json!(["C", "C2"]);
        mapping["C2"] = node(Some(message("user", "edited", &json!({}))), Some("B"), &[]);
        mapping
    }

    fn ids<'a>(nodes: &[&'a Node]) -> Vec<&'a str> {
        nodes.iter().copied().map(Node::id).collect()
    }

    #[test]
    fn main_branch_runs_root_to_current() {
        let conv = conversation(&linear(), "D");

        assert_eq!(ids(&conv.main_branch_nodes()), ["B", "C", "D"]);
        assert_eq!(conv.message_count().unwrap(), 2);
        assert_eq!(conv.leaf_count(), 1);
        assert!(!conv.has_multiple_branches());
    }

    #[test]
    fn main_branch_stops_at_current_node() {
        let conv = conversation(&linear(), "C");

        assert_eq!(ids(&conv.main_branch_nodes()), ["B", "C"]);
        assert!(conv.has_multiple_branches());
    }

    #[test]
    fn main_branch_excludes_root_message() {
        let mapping = json!({
            "R": node(Some(message("system", "root", &json!({}))), None, &["U"]),
            "U": node(Some(message("user", "hi", &json!({}))), Some("R"), &[]),
        });
        let conv = conversation(&mapping, "U");

        assert_eq!(ids(&conv.main_branch_nodes()), ["U"]);
    }

    #[test]
    fn singleton_conversation_has_empty_main_branch() {
        let mapping = json!({
            "only": node(Some(message("user", "alone", &json!({}))), None, &[]),
        });
        let conv = conversation(&mapping, "only");

        assert!(conv.main_branch_nodes().is_empty());
        assert_eq!(conv.all_message_nodes().len(), 1);
    }

    #[test]
    fn detects_sibling_branch() {
        let conv = conversation(&branched(), "D");

        assert!(conv.has_multiple_branches());
        assert_eq!(conv.all_message_nodes().len(), 4);
        assert_eq!(conv.main_branch_nodes().len(), 3);
        assert_eq!(conv.leaf_count(), 2);
    }

    #[test]
    fn tags_nodes_by_branch() {
        let conv = conversation(&branched(), "D");
        let tree = conv.nodes();

        assert_eq!(
            conv.branch_indicator(tree.get("C").unwrap()),
            BranchTag::Main
        );
        assert_eq!(
            conv.branch_indicator(tree.get("C2").unwrap()),
            BranchTag::Other
        );
        assert_eq!(BranchTag::Main.to_string(), "(main branch ⎇)");
        assert_eq!(BranchTag::Other.to_string(), "(other branch ⎇)");
    }

    #[test]
    fn role_filters_partition_message_nodes() {
        let mut mapping = branched();
        mapping["D"]["children"] = json!(["T"]);
        mapping["T"] = node(Some(message("tool", "result", &json!({}))), Some("D"), &[]);
        let conv = conversation(&mapping, "T");

        let all = ids(&conv.all_message_nodes());
        let mut merged: Vec<_> = Role::KNOWN
            .iter()
            .flat_map(|role| ids(&conv.nodes_with_role(*role).unwrap()))
            .collect();
        merged.sort_by_key(|id| all.iter().position(|a| a == id));

        assert_eq!(merged, all);
        assert_eq!(ids(&conv.user_nodes().unwrap()), ["C", "C2"]);
        assert_eq!(ids(&conv.tool_nodes().unwrap()), ["T"]);
    }

    #[test]
    fn aggregates_text_and_timestamps() {
        let conv = conversation(&branched(), "D");

        assert_eq!(conv.entire_user_text().unwrap(), "question\nedited");
        assert_eq!(conv.entire_assistant_text().unwrap(), "answer");
        assert_eq!(
            conv.user_message_timestamps().unwrap(),
            [1_700_000_000.0, 1_700_000_000.0]
        );
        assert_eq!(conv.assistant_message_timestamps().unwrap().len(), 1);
        assert_eq!(conv.content_types().unwrap(), ["text"]);
    }

    #[test]
    fn reads_model_slug_from_first_assistant() {
        let conv = conversation(&linear(), "D");
        assert_eq!(conv.model_slug().unwrap(), Some("gpt-4"));

        let mapping = json!({
            "U": node(Some(message("user", "hi", &json!({}))), None, &[]),
        });
        assert_eq!(conversation(&mapping, "U").model_slug().unwrap(), None);
    }

    #[test]
    fn collects_plugin_namespaces() {
        let mut mapping = linear();
        mapping["D"]["children"] = json!(["T1"]);
        let plugin = |ns: &str| json!({ "invoked_plugin": { "namespace": ns } });
        mapping["T1"] = node(Some(message("tool", "a", &plugin("Weather"))), Some("D"), &["T2"]);
        mapping["T2"] = node(Some(message("tool", "b", &plugin("Weather"))), Some("T1"), &["T3"]);
        mapping["T3"] = node(Some(message("tool", "c", &plugin("Maps"))), Some("T2"), &["T4"]);
        mapping["T4"] = node(Some(message("tool", "d", &json!({}))), Some("T3"), &[]);
        let conv = conversation(&mapping, "T4");

        assert_eq!(conv.used_plugins().unwrap(), ["Maps", "Weather"]);
    }

    #[test]
    fn reads_custom_instructions_from_second_system_message() {
        let mut mapping = linear();
        mapping["B"]["children"] = json!(["S2"]);
        mapping["S2"] = node(
            Some(message(
                "system",
                "",
                &json!({
                    "is_user_system_message": true,
                    "user_context_message_data": { "x": "y" }
                }),
            )),
            Some("B"),
            &["C"],
        );
        mapping["C"]["parent"] = json!("S2");
        let conv = conversation(&mapping, "D");

        assert_eq!(conv.custom_instructions().unwrap(), Some(&json!({ "x": "y" })));
    }

    #[test]
    fn unflagged_second_system_message_has_no_custom_instructions() {
        for flag in [json!(false), Value::Null] {
            let mut mapping = linear();
            mapping["B"]["children"] = json!(["S2"]);
            mapping["S2"] = node(
                Some(message(
                    "system",
                    "",
                    &json!({
                        "is_user_system_message": flag.clone(),
                        "user_context_message_data": { "x": "y" }
                    }),
                )),
                Some("B"),
                &["C"],
            );
            mapping["C"]["parent"] = json!("S2");
            let conv = conversation(&mapping, "D");

            assert_eq!(conv.custom_instructions().unwrap(), None, "flag {flag}");
        }
    }

    #[test]
    fn no_custom_instructions_with_single_system_message() {
        let conv = conversation(&linear(), "D");

        assert_eq!(conv.custom_instructions().unwrap(), None);
    }

    #[test]
    fn unknown_current_node_fails() {
        let record = json!({ "mapping": linear(), "current_node": "nope" });
        let raw = parse_export(&record.to_string()).unwrap().remove(0);

        let err = Conversation::try_from(raw).unwrap_err();
        assert!(matches!(err, ConversationError::UnknownCurrentNode { ref id } if id == "nope"));
    }

    #[test]
    fn missing_current_node_fails() {
        let raw = parse_export(r#"{ "mapping": {} }"#).unwrap().remove(0);

        assert!(matches!(
            Conversation::try_from(raw),
            Err(ConversationError::MissingCurrentNode)
        ));
    }

    #[test]
    fn malformed_author_surfaces_node_id() {
        let mut mapping = linear();
        mapping["C"]["message"]["author"] = Value::Null;
        let conv = conversation(&mapping, "D");

        let err = conv.message_count().unwrap_err();
        assert!(matches!(err, ConversationError::Message { ref node, .. } if node == "C"));
        // Tree queries that do not look at authors still work.
        assert_eq!(conv.main_branch_nodes().len(), 3);
    }

    #[test]
    fn cyclic_parents_terminate() {
        let mapping = json!({
            "a": node(Some(message("user", "a", &json!({}))), Some("b"), &["b"]),
            "b": node(Some(message("assistant", "b", &json!({}))), Some("a"), &["a"]),
        });
        let conv = conversation(&mapping, "a");

        assert!(conv.main_branch_nodes().len() <= 2);
    }

    #[test]
    fn chat_link_uses_conversation_id() {
        let conv = conversation(&linear(), "D");

        assert_eq!(
            conv.chat_link().as_deref(),
            Some("https://chat.openai.com/c/conv-1")
        );
    }

    #[test]
    fn calendar_boundaries() {
        // Thursday 2024-03-14 15:30:45 +02:00
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let time = tz.with_ymd_and_hms(2024, 3, 14, 15, 30, 45).unwrap();
        let date = |y, m, d| {
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };

        assert_eq!(start_of_year(&time), Some(date(2024, 1, 1)));
        assert_eq!(start_of_month(&time), Some(date(2024, 3, 1)));
        assert_eq!(start_of_week(&time), Some(date(2024, 3, 11)));
    }

    #[test]
    fn week_starts_on_monday_itself() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();

        let week = start_of_week(&time).unwrap();
        assert_eq!(week.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(week.hour(), 0);
    }

    #[test]
    fn conversation_boundaries_use_create_time() {
        let conv = conversation(&linear(), "D");

        let year = conv.start_of_year().unwrap();
        let month = conv.start_of_month().unwrap();
        let week = conv.start_of_week().unwrap();
        assert!(year <= month);
        assert_eq!(week.date().weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn local_time_rejects_non_finite() {
        assert!(local_time(f64::NAN).is_none());
        assert!(local_time(f64::INFINITY).is_none());
        assert!(local_time(0.5).is_some());
    }
}
