// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for cg2md.
//!
//! This binary provides the `cg2md` command for converting ChatGPT
//! conversation exports from JSON to Markdown format.

use cg2md::conversation::Conversation;
use cg2md::export::{ExportPlan, GroupBy};
use cg2md::renderer::{LatexDelimiters, RenderOptions};
use cg2md::{parser, renderer};
use lexopt::prelude::*;
use snafu::{ensure, prelude::*};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// The file name ChatGPT uses for conversations inside a data export.
const EXPORT_FILE_NAME: &str = "conversations.json";

/// Where to write the rendered output.
#[derive(Clone)]
enum OutputTarget {
    /// Write each conversation to a file under the specified directory.
    Directory(PathBuf),
    /// Write to stdout.
    Stdout,
}

#[allow(clippy::struct_excessive_bools)]
struct Cli {
    input: Vec<PathBuf>,
    output: OutputTarget,
    concat: bool,
    group_by: GroupBy,
    config: Option<PathBuf>,
    main_branch_only: Option<bool>,
    latex_dollar: bool,
    quiet: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("at least one input file or directory is required"))]
    NoInputFiles,

    #[snafu(display("no conversations could be loaded from the input"))]
    NoConversations,

    #[snafu(display("cannot output multiple conversations to stdout without --concat"))]
    MultipleToStdout,

    #[snafu(display("failed to read config {}: {source}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse config {}: {source}", path.display()))]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("failed to create output directory {}: {source}", path.display()))]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert ChatGPT conversation exports to Markdown

Usage: {name} [OPTIONS] -o <OUTPUT> <INPUT>...

Arguments:
  <INPUT>...  conversations.json files, or directories containing them

Options:
  -o, --output <OUTPUT>     Output directory (or file with --concat, or - for stdout)
      --concat              Combine all conversations into a single output
      --group-by <PERIOD>   Group files by creation none|year|month|week (default: none)
      --config <FILE>       Read render options from a JSON file

Rendering:
      --main-branch-only    Render only the branch last shown in ChatGPT
      --all-branches        Render every branch, tagged (default)
      --latex-dollar        Rewrite \\( \\) and \\[ \\] math delimiters to $ and $$

Other options:
  -q, --quiet               Suppress progress messages
  -n, --dry-run             Show what would be processed without writing
  -f, --force               Overwrite existing output files
  -h, --help                Print help
  -V, --version             Print version

Diagnostics are logged to stderr; set RUST_LOG (e.g. RUST_LOG=debug) for more.",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut input = Vec::new();
    let mut output: Option<OutputTarget> = None;
    let mut concat = false;
    let mut group_by = GroupBy::None;
    let mut config = None;
    let mut main_branch_only = None;
    let mut latex_dollar = false;
    let mut quiet = false;
    let mut dry_run = false;
    let mut force = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Directory(val)
                });
            }
            Long("concat") => concat = true,
            Long("group-by") => group_by = parser.value()?.parse()?,
            Long("config") => config = Some(parser.value()?.parse()?),
            // Last one wins
            Long("main-branch-only") => main_branch_only = Some(true),
            Long("all-branches") => main_branch_only = Some(false),
            Long("latex-dollar") => latex_dollar = true,
            Short('q') | Long("quiet") => quiet = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Short('f') | Long("force") => force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input,
        output: output.ok_or("missing required option: --output")?,
        concat,
        group_by,
        config,
        main_branch_only,
        latex_dollar,
        quiet,
        dry_run,
        force,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    init_tracing();

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);

    let opts = make_render_options(&cli)?;
    let files = collect_input_files(&cli.input);
    let conversations = load_conversations(&files)?;
    tracing::debug!(
        files = files.len(),
        conversations = conversations.len(),
        "loaded export"
    );

    if cli.concat {
        process_concat(&conversations, &opts, &cli)?;
    } else {
        match &cli.output {
            OutputTarget::Stdout => {
                // Without concat, we can only output one conversation to stdout
                let [conversation] = conversations.as_slice() else {
                    ensure!(!conversations.is_empty(), NoConversationsSnafu);
                    return MultipleToStdoutSnafu.fail();
                };
                process_to_stdout(conversation, &opts, &cli);
            }
            OutputTarget::Directory(dir) => {
                if !cli.dry_run {
                    std::fs::create_dir_all(dir).context(CreateOutputDirSnafu { path: dir })?;
                }
                let mut plan = ExportPlan::new(dir, cli.group_by);
                for conversation in &conversations {
                    process_conversation(conversation, &mut plan, &opts, &cli)?;
                }
            }
        }
    }

    Ok(())
}

/// Collects all export files from the given inputs (files and directories).
///
/// Explicit files are taken as given; directories are searched for
/// `conversations.json`.
fn collect_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file() && e.file_name() == EXPORT_FILE_NAME)
            {
                files.push(entry.path().to_path_buf());
            }
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// Reads and parses every file, building a conversation per record.
///
/// A record that cannot form a conversation is skipped with a warning; an
/// unreadable or unparsable file is an error.
fn load_conversations(files: &[PathBuf]) -> Result<Vec<Conversation>, Error> {
    let mut conversations = Vec::new();
    for path in files {
        let json = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        let records = parser::parse_export(&json).context(ParseFileSnafu { path })?;

        for (index, raw) in records.into_iter().enumerate() {
            let title = raw.title.clone();
            match Conversation::try_from(raw) {
                Ok(conversation) => conversations.push(conversation),
                Err(error) => tracing::warn!(
                    file = %path.display(),
                    index,
                    title = title.as_deref().unwrap_or("untitled"),
                    %error,
                    "skipping conversation"
                ),
            }
        }
    }
    Ok(conversations)
}

/// Creates render options from the config file and CLI arguments.
///
/// Command-line flags override the config file.
fn make_render_options(cli: &Cli) -> Result<RenderOptions, Error> {
    let mut opts = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
            serde_json::from_str(&json).context(ParseConfigSnafu { path })?
        }
        None => RenderOptions::default(),
    };

    if let Some(main_branch_only) = cli.main_branch_only {
        opts.main_branch_only = main_branch_only;
    }
    if cli.latex_dollar {
        opts.latex_delimiters = LatexDelimiters::DollarSign;
    }
    Ok(opts)
}

/// Renders a conversation, logging and returning `None` if it is malformed.
fn render(conversation: &Conversation, opts: &RenderOptions) -> Option<String> {
    match renderer::render_conversation(conversation, opts) {
        Ok(markdown) => Some(markdown),
        Err(error) => {
            tracing::warn!(
                title = conversation.title().unwrap_or("untitled"),
                %error,
                "skipping conversation"
            );
            None
        }
    }
}

/// Renders a single conversation to stdout.
fn process_to_stdout(conversation: &Conversation, opts: &RenderOptions, cli: &Cli) {
    if cli.dry_run {
        eprintln!(
            "Would output {}",
            conversation.title().unwrap_or("untitled")
        );
        return;
    }

    if let Some(markdown) = render(conversation, opts) {
        print!("{markdown}");
    }
}

/// Renders all conversations into a single output.
fn process_concat(
    conversations: &[Conversation],
    opts: &RenderOptions,
    cli: &Cli,
) -> Result<(), Error> {
    let rendered: Vec<_> = conversations
        .iter()
        .filter_map(|conversation| render(conversation, opts))
        .collect();
    let output = rendered.join("\n");

    match &cli.output {
        OutputTarget::Stdout => {
            if cli.dry_run {
                eprintln!("Would output {} conversations concatenated", rendered.len());
            } else {
                print!("{output}");
            }
        }
        OutputTarget::Directory(path) => {
            // In concat mode, treat path as a file, not directory
            if cli.dry_run {
                eprintln!(
                    "Would write {} ({} conversations concatenated)",
                    path.display(),
                    rendered.len()
                );
            } else if path.exists() && !cli.force {
                eprintln!(
                    "Skipping {} (already exists, use --force to overwrite)",
                    path.display()
                );
            } else {
                write_file(path, &output)?;
                if !cli.quiet {
                    eprintln!(
                        "Wrote {} ({} conversations)",
                        path.display(),
                        rendered.len()
                    );
                }
            }
        }
    }

    Ok(())
}

/// Renders a single conversation to its planned path.
fn process_conversation(
    conversation: &Conversation,
    plan: &mut ExportPlan,
    opts: &RenderOptions,
    cli: &Cli,
) -> Result<(), Error> {
    let out_path = plan.path_for(conversation);

    // Handle dry-run mode
    if cli.dry_run {
        eprintln!("Would write {}", out_path.display());
        return Ok(());
    }

    // Check if output exists and handle overwrite
    if out_path.exists() && !cli.force {
        eprintln!(
            "Skipping {} (already exists, use --force to overwrite)",
            out_path.display()
        );
        return Ok(());
    }

    let Some(markdown) = render(conversation, opts) else {
        return Ok(());
    };
    write_file(&out_path, &markdown)?;

    if !cli.quiet {
        eprintln!("Wrote {}", out_path.display());
    }
    Ok(())
}

/// Writes `contents` to `path`, creating parent directories as needed.
fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateOutputDirSnafu { path: parent })?;
    }
    std::fs::write(path, contents).context(WriteFileSnafu { path })
}
