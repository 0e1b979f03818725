// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! The conversation tree.
//!
//! A [`NodeTree`] is an arena of [`Node`]s keyed by node id, kept in the
//! order the export declares them. Nodes refer to each other by id: a node
//! knows its parent's id but does not own it, and owns only the ordered list
//! of its children's ids. Navigation goes through the tree.

use crate::message::{AuthorHeaders, Message, MessageError};
use crate::parser::RawNode;
use indexmap::IndexMap;
use std::fmt::Write;
use std::ops::Index;

/// A vertex of the conversation tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: String,
    message: Option<Message>,
    parent: Option<String>,
    children: Vec<String>,
}

impl Node {
    /// The node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The message carried by this node, if any.
    ///
    /// Nodes without a message are structural placeholders such as the
    /// synthetic root.
    #[must_use]
    pub const fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Id of the parent node, or `None` for a root.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Ids of the child nodes in declared order.
    #[must_use]
    pub fn child_ids(&self) -> &[String] {
        &self.children
    }

    /// Returns `true` if the node has no children.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns the Markdown marker placed above this node's message.
    ///
    /// The marker is an anchor heading with the node id, a link back to the
    /// parent when the parent carries a message, and the author header.
    /// Nodes without a message get an empty marker.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingAuthor`] if the message has no author.
    pub fn header(
        &self,
        parent: Option<&Self>,
        headers: &AuthorHeaders,
    ) -> Result<String, MessageError> {
        let Some(message) = &self.message else {
            return Ok(String::new());
        };

        let mut out = String::new();
        writeln!(out, "###### {}", self.id).unwrap();
        if let Some(parent) = parent.filter(|p| p.message.is_some()) {
            writeln!(out, "[parent ⬆️](#{})", parent.id).unwrap();
        }
        writeln!(out, "{}", message.author_header(headers)?).unwrap();
        Ok(out)
    }

    /// Returns the Markdown marker placed below this node's message: links
    /// to each child, or nothing for a leaf.
    #[must_use]
    pub fn footer(&self) -> String {
        match self.children.as_slice() {
            [] => String::new(),
            [only] => format!("\n[child ⬇️](#{only})\n"),
            many => {
                let links: Vec<_> = many
                    .iter()
                    .enumerate()
                    .map(|(i, id)| format!("[child {} ⬇️](#{id})", i + 1))
                    .collect();
                format!("\n{}\n", links.join(" | "))
            }
        }
    }
}

/// The full node set of a conversation, keyed by node id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeTree {
    nodes: IndexMap<String, Node>,
}

impl NodeTree {
    /// Builds the tree from the flat `mapping` of an export record.
    ///
    /// All nodes are allocated first and linked in a second pass, so a node
    /// may refer to ids declared after it. Links to ids that are not in the
    /// mapping are dropped. A missing mapping yields an empty tree.
    #[must_use]
    pub fn from_mapping(mapping: Option<IndexMap<String, RawNode>>) -> Self {
        let Some(mapping) = mapping else {
            return Self::default();
        };

        let mut links = Vec::with_capacity(mapping.len());
        let mut nodes = IndexMap::with_capacity(mapping.len());
        for (id, raw) in mapping {
            links.push((raw.parent, raw.children));
            nodes.insert(
                id.clone(),
                Node {
                    id,
                    message: raw.message,
                    parent: None,
                    children: Vec::new(),
                },
            );
        }

        for (index, (parent, children)) in links.into_iter().enumerate() {
            let parent = parent.filter(|p| {
                let known = nodes.contains_key(p);
                if !known {
                    tracing::debug!(parent = %p, "dropping link to unknown parent");
                }
                known
            });
            let children: Vec<_> = children
                .into_iter()
                .filter(|c| {
                    let known = nodes.contains_key(c);
                    if !known {
                        tracing::debug!(child = %c, "dropping link to unknown child");
                    }
                    known
                })
                .collect();

            if let Some((_, node)) = nodes.get_index_mut(index) {
                node.parent = parent;
                node.children = children;
            }
        }

        Self { nodes }
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns `true` if a node with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterates over all nodes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Returns the parent of `node`, if it has one.
    #[must_use]
    pub fn parent(&self, node: &Node) -> Option<&Node> {
        node.parent_id().and_then(|id| self.get(id))
    }

    /// Iterates over the children of `node` in declared order.
    pub fn children<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Node> + 'a {
        node.children.iter().filter_map(|id| self.get(id))
    }

    /// Iterates over the nodes that have no parent.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.iter().filter(|node| node.parent.is_none())
    }
}

impl Index<&str> for NodeTree {
    type Output = Node;

    /// Returns the node with this id.
    ///
    /// # Panics
    ///
    /// Panics if no node has this id.
    fn index(&self, id: &str) -> &Node {
        &self.nodes[id]
    }
}
