// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Output file naming.
//!
//! Decides where each rendered conversation goes: a file named after its
//! sanitized title, optionally inside a directory for the year, month or
//! week it was created in. Nothing here touches the filesystem.

use crate::conversation::Conversation;
use snafu::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Error returned when parsing an unknown grouping name.
#[derive(Debug, Snafu)]
#[snafu(display("unknown grouping {value:?}, expected none, year, month or week"))]
pub struct GroupByError {
    value: String,
}

/// How output files are grouped into directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    /// All files in the output directory.
    #[default]
    None,
    /// One directory per creation year (`2024`).
    Year,
    /// One directory per creation month (`2024-03`).
    Month,
    /// One directory per creation week, named after its Monday (`2024-03-11`).
    Week,
}

impl FromStr for GroupBy {
    type Err = GroupByError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "week" => Ok(Self::Week),
            _ => GroupBySnafu { value: s }.fail(),
        }
    }
}

impl GroupBy {
    /// Returns the directory name for `conv`, or `None` when not grouping.
    ///
    /// Conversations without a usable creation time go to `undated`.
    #[must_use]
    pub fn directory(self, conv: &Conversation) -> Option<String> {
        let (start, format) = match self {
            Self::None => return None,
            Self::Year => (conv.start_of_year(), "%Y"),
            Self::Month => (conv.start_of_month(), "%Y-%m"),
            Self::Week => (conv.start_of_week(), "%Y-%m-%d"),
        };
        Some(start.map_or_else(
            || "undated".to_owned(),
            |time| time.format(format).to_string(),
        ))
    }
}

/// Returns a file name stem for a conversation title.
///
/// Characters that are unsafe in file names are replaced with `_`. Missing
/// or empty titles become `untitled`.
#[must_use]
pub fn file_name(title: Option<&str>) -> String {
    match title {
        Some(title) if !title.is_empty() => title
            .chars()
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                '\n' | '\r' | '\t' | '\x0b' | '\x0c' => '_',
                c => c,
            })
            .collect(),
        _ => "untitled".to_owned(),
    }
}

/// Assigns output paths to conversations, keeping them unique.
///
/// Two conversations with the same title (and group) would otherwise write
/// to the same file; later ones get a ` (2)`, ` (3)`, ... suffix.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    root: PathBuf,
    group_by: GroupBy,
    taken: HashSet<PathBuf>,
}

impl ExportPlan {
    /// Creates a plan writing below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, group_by: GroupBy) -> Self {
        Self {
            root: root.into(),
            group_by,
            taken: HashSet::new(),
        }
    }

    /// The directory all paths are placed under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the output path for `conv` and reserves it.
    pub fn path_for(&mut self, conv: &Conversation) -> PathBuf {
        let dir = match self.group_by.directory(conv) {
            Some(group) => self.root.join(group),
            None => self.root.clone(),
        };
        let stem = file_name(conv.title());

        let mut path = dir.join(format!("{stem}.md"));
        let mut n = 2;
        while self.taken.contains(&path) {
            path = dir.join(format!("{stem} ({n}).md"));
            n += 1;
        }
        self.taken.insert(path.clone());
        path
    }
}
