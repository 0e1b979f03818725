// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Convert ChatGPT conversation exports to Markdown.
//!
//! This crate provides parsing, tree reconstruction and rendering for
//! transforming the `conversations.json` file of a ChatGPT data export into
//! readable Markdown documents.
//!
//! # Overview
//!
//! ChatGPT stores each conversation as a flat mapping of node ids to tree
//! nodes; editing a prompt or regenerating an answer creates a new branch.
//! This crate:
//!
//! 1. Parses the JSON export into raw records
//! 2. Rebuilds each conversation's message tree and finds its main branch
//! 3. Renders conversations as Markdown with a YAML metadata header
//!
//! # Example
//!
//! ```no_run
//! use cg2md::conversation::Conversation;
//! use cg2md::{parser, renderer};
//!
//! let json = std::fs::read_to_string("conversations.json").unwrap();
//! for raw in parser::parse_export(&json).unwrap() {
//!     let conversation = Conversation::try_from(raw).unwrap();
//!
//!     let opts = renderer::RenderOptions {
//!         main_branch_only: true,
//!         ..Default::default()
//!     };
//!
//!     let markdown = renderer::render_conversation(&conversation, &opts).unwrap();
//!     println!("{markdown}");
//! }
//! ```
//!
//! # Modules
//!
//! - [`parser`]: JSON parsing of export records
//! - [`message`]: a single turn and its author and content
//! - [`node`]: the node tree rebuilt from the flat mapping
//! - [`conversation`]: branch queries and per-role aggregates
//! - [`renderer`]: Markdown generation with configurable output options
//! - [`export`]: output file naming and grouping

#![deny(missing_docs)]

pub mod conversation;
pub mod export;
pub mod message;
pub mod node;
pub mod parser;
pub mod renderer;
