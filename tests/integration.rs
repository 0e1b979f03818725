// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Integration tests for cg2md parsing, tree reconstruction and rendering.

use cg2md::conversation::{BranchTag, Conversation};
use cg2md::{parser, renderer};
use std::fs;
use std::process::Command;

/// Two conversations: one with an edited prompt, one with a broken
/// `current_node` that must be skipped.
const EXPORT: &str = r#"[
    {
        "title": "Borrow checker",
        "create_time": 1718193600.0,
        "update_time": 1718197200.0,
        "conversation_id": "c-1",
        "current_node": "a2",
        "mapping": {
            "root": { "id": "root", "message": null, "parent": null, "children": ["sys"] },
            "sys": {
                "id": "sys",
                "message": {
                    "id": "sys",
                    "author": { "role": "system" },
                    "content": { "content_type": "text", "parts": [""] },
                    "metadata": {}
                },
                "parent": "root",
                "children": ["u1", "u2"]
            },
            "u1": {
                "id": "u1",
                "message": {
                    "id": "u1",
                    "author": { "role": "user" },
                    "create_time": 1718193601.0,
                    "content": { "content_type": "text", "parts": ["Why does this not compile?"] },
                    "metadata": {}
                },
                "parent": "sys",
                "children": ["a1"]
            },
            "a1": {
                "id": "a1",
                "message": {
                    "id": "a1",
                    "author": { "role": "assistant" },
                    "create_time": 1718193602.0,
                    "content": { "content_type": "text", "parts": ["Old answer"] },
                    "metadata": { "model_slug": "gpt-4" }
                },
                "parent": "u1",
                "children": []
            },
            "u2": {
                "id": "u2",
                "message": {
                    "id": "u2",
                    "author": { "role": "user" },
                    "create_time": 1718193700.0,
                    "content": { "content_type": "text", "parts": ["Why does this borrow fail?"] },
                    "metadata": {}
                },
                "parent": "sys",
                "children": ["a2"]
            },
            "a2": {
                "id": "a2",
                "message": {
                    "id": "a2",
                    "author": { "role": "assistant" },
                    "create_time": 1718193701.0,
                    "content": { "content_type": "text", "parts": ["```rust\nlet r = &mut x;"] },
                    "metadata": { "model_slug": "gpt-4" }
                },
                "parent": "u2",
                "children": []
            }
        }
    },
    {
        "title": "Broken",
        "current_node": "missing",
        "mapping": {}
    }
]"#;

fn load() -> Vec<Result<Conversation, cg2md::conversation::ConversationError>> {
    parser::parse_export(EXPORT)
        .unwrap()
        .into_iter()
        .map(Conversation::try_from)
        .collect()
}

#[test]
fn rebuilds_branches_from_export() {
    let mut results = load();
    assert!(results.pop().unwrap().is_err(), "broken record should fail");

    let conv = results.pop().unwrap().unwrap();
    let main: Vec<_> = conv
        .main_branch_nodes()
        .into_iter()
        .map(|node| node.id())
        .collect();

    assert_eq!(main, ["sys", "u2", "a2"]);
    assert!(conv.has_multiple_branches());
    assert_eq!(conv.leaf_count(), 2);
    assert_eq!(conv.message_count().unwrap(), 4);
    assert_eq!(conv.model_slug().unwrap(), Some("gpt-4"));

    let u1 = conv.nodes().get("u1").unwrap();
    assert_eq!(conv.branch_indicator(u1), BranchTag::Other);
}

#[test]
fn renders_export_to_markdown() {
    let conv = load().remove(0).unwrap();
    let markdown =
        renderer::render_conversation(&conv, &renderer::RenderOptions::default()).unwrap();

    assert!(markdown.starts_with("---\ntitle: \"Borrow checker\"\n"));
    assert!(markdown.contains("message_count: 4\n"));
    assert!(markdown.contains("Old answer"));
    // The open fence in the last answer is closed.
    assert!(markdown.contains("let r = &mut x;\n```\n"));
    assert_eq!(markdown.matches("(other branch ⎇)").count(), 2);
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cg2md"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run cg2md")
}

#[test]
fn cli_writes_one_file_per_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export").join("conversations.json");
    fs::create_dir_all(input.parent().unwrap()).unwrap();
    fs::write(&input, EXPORT).unwrap();
    let out = dir.path().join("out");

    let output = run(&[
        "-o",
        out.to_str().unwrap(),
        "--group-by",
        "year",
        "--main-branch-only",
        dir.path().join("export").to_str().unwrap(),
    ]);

    assert!(output.status.success(), "{output:?}");
    let written = out.join("2024").join("Borrow checker.md");
    let markdown = fs::read_to_string(&written).unwrap();
    assert!(markdown.contains("Why does this borrow fail?"));
    assert!(!markdown.contains("Old answer"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("skipping conversation"), "{stderr}");
    assert!(!out.join("Broken.md").exists());
}

#[test]
fn cli_skips_existing_files_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("conversations.json");
    fs::write(&input, EXPORT).unwrap();
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("Borrow checker.md"), "keep me").unwrap();

    let output = run(&["-o", out.to_str().unwrap(), input.to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        fs::read_to_string(out.join("Borrow checker.md")).unwrap(),
        "keep me"
    );

    let output = run(&["-f", "-o", out.to_str().unwrap(), input.to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");
    assert!(
        fs::read_to_string(out.join("Borrow checker.md"))
            .unwrap()
            .starts_with("---\n")
    );
}

#[test]
fn cli_prints_single_conversation_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("conversations.json");
    fs::write(&input, EXPORT).unwrap();

    let output = run(&["-o", "-", input.to_str().unwrap()]);

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("---\ntitle: \"Borrow checker\"\n"));
}

#[test]
fn cli_rejects_unknown_grouping() {
    let output = run(&["-o", "-", "--group-by", "daily", "conversations.json"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("daily"), "{stderr}");
}

#[test]
fn cli_reports_empty_export_on_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("conversations.json");
    fs::write(&input, "[]").unwrap();

    let output = run(&["-o", "-", input.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("NoConversations"), "{stderr}");
    assert!(!stderr.contains("MultipleToStdout"), "{stderr}");
}
