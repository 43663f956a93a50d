// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kash_config::KashSettings;
use kash_core::params::RawParamValues;
use kash_exec::{global_registry, register_all, run_action_with_selection, RuntimeSettings};
use kash_mcp::{run_stdio, LogCapture, McpServer};
use kash_store::{enclosing_ws_dir, FileStore, Selection};
use kash_web::HttpFetcher;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "kash", version, about = "Workspace-oriented execution engine for content pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory (defaults to the enclosing workspace).
    #[arg(long, global = true)]
    ws: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Only log errors.
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a workspace in the given (or current) directory.
    Init {
        /// Directory to initialize.
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Run an action over inputs (URLs, file paths, or store paths).
    Run {
        /// Action name.
        action: String,

        /// Input items; the current selection is used when omitted.
        inputs: Vec<String>,

        /// Parameter values as name=value (repeatable). A bare name sets a
        /// boolean flag.
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,

        /// Force a rerun even when cached outputs exist.
        #[arg(long)]
        rerun: bool,

        /// Skip body normalization when saving outputs.
        #[arg(long)]
        no_format: bool,
    },

    /// List registered actions.
    Actions,

    /// Import URLs or files into the workspace.
    Import {
        /// Locators to import.
        #[arg(required = true)]
        locators: Vec<String>,

        /// Re-import even if already present.
        #[arg(long)]
        reimport: bool,
    },

    /// Archive an item.
    Archive {
        /// Store path to archive.
        path: String,
    },

    /// Restore an item from the archive.
    Unarchive {
        /// Store path (with or without the archive/ prefix).
        path: String,
    },

    /// Show or navigate the selection history.
    Selection {
        #[command(subcommand)]
        command: Option<SelectionCommands>,
    },

    /// Serve published actions as MCP tools over stdio.
    Mcp,
}

#[derive(Subcommand, Debug)]
enum SelectionCommands {
    /// Show the current selection (default).
    Show,
    /// Move to the previous selection.
    Back,
    /// Move to the next selection.
    Forward,
    /// Replace the current selection with the given paths.
    Set {
        /// Store paths to select.
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn init_logging(debug: bool, quiet: bool, settings: &KashSettings, capture: Option<&LogCapture>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = if quiet {
        "error".to_string()
    } else if debug {
        "debug".to_string()
    } else {
        settings.log_level.clone()
    };
    let filter = EnvFilter::try_from_env("KASH_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(format!("kash={level}")));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    match capture {
        Some(capture) => registry.with(capture.layer()).init(),
        None => registry.init(),
    }
}

fn main() {
    let cli = Cli::parse();
    let settings = KashSettings::from_env();
    // The MCP server returns captured run logs with tool results, so its
    // capture layer has to be part of the subscriber from the start.
    let capture = matches!(cli.command, Commands::Mcp).then(LogCapture::new);
    init_logging(cli.debug, cli.quiet, &settings, capture.as_ref());

    if let Err(e) = register_all(global_registry()) {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }

    let result = match cli.command {
        Commands::Init { dir } => cmd_init(&dir),
        Commands::Run {
            action,
            inputs,
            params,
            rerun,
            no_format,
        } => cmd_run(cli.ws, &settings, &action, inputs, params, rerun, no_format),
        Commands::Actions => cmd_actions(),
        Commands::Import { locators, reimport } => cmd_import(cli.ws, locators, reimport),
        Commands::Archive { path } => cmd_archive(cli.ws, &path, false),
        Commands::Unarchive { path } => cmd_archive(cli.ws, &path, true),
        Commands::Selection { command } => cmd_selection(cli.ws, command),
        Commands::Mcp => cmd_mcp(cli.ws, &settings, capture.unwrap_or_default()),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#} (see logs for details)");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

/// Open the workspace from `--ws`, the enclosing directory, or fail.
fn open_ws(ws_flag: Option<PathBuf>) -> Result<Arc<FileStore>> {
    let dir = match ws_flag {
        Some(dir) => dir,
        None => enclosing_ws_dir(&std::env::current_dir()?).context(
            "no workspace found; run `kash init` or pass --ws",
        )?,
    };
    let store = FileStore::open(&dir, false)
        .with_context(|| format!("open workspace at {}", dir.display()))?;
    store.log_workspace_info();
    Ok(Arc::new(store))
}

fn cmd_init(dir: &PathBuf) -> Result<()> {
    let store = FileStore::open(dir, true)?;
    println!("initialized workspace: {}", store.base_dir().display());
    Ok(())
}

fn parse_param_flag(raw: &str) -> (String, Option<String>) {
    match raw.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (raw.to_string(), None),
    }
}

fn cmd_run(
    ws_flag: Option<PathBuf>,
    settings: &KashSettings,
    action: &str,
    inputs: Vec<String>,
    raw_params: Vec<String>,
    rerun: bool,
    no_format: bool,
) -> Result<()> {
    let ws = open_ws(ws_flag)?;

    let mut params = RawParamValues::new();
    for raw in &raw_params {
        match parse_param_flag(raw) {
            (name, Some(value)) => params.set(name, value),
            (name, None) => params.set_flag(name, true),
        }
    }

    let fetcher = HttpFetcher::from_settings(settings).ok();
    let run_settings = RuntimeSettings {
        workspace_dir: ws.base_dir().to_path_buf(),
        rerun,
        no_format,
        ..RuntimeSettings::default()
    };

    let outcome = run_action_with_selection(
        Arc::clone(&ws),
        global_registry(),
        fetcher.as_ref().map(|f| f as &dyn kash_web::WebFetcher),
        action,
        &params,
        &inputs,
        run_settings,
    )?;

    if outcome.skipped_rerun {
        println!(
            "skipped: outputs already exist ({} item(s); use --rerun to force)",
            outcome.result.items.len()
        );
    } else {
        println!("done: {} item(s)", outcome.result.items.len());
    }
    for sp in &outcome.saved_paths {
        println!("{}", sp.display_str());
    }
    for sp in &outcome.archived_paths {
        println!("archived: {}", sp.display_str());
    }
    Ok(())
}

fn cmd_actions() -> Result<()> {
    for action in global_registry().all_actions().iter() {
        let spec = action.spec();
        println!("{:<20} {}", spec.name, spec.description);
    }
    Ok(())
}

fn cmd_import(ws_flag: Option<PathBuf>, locators: Vec<String>, reimport: bool) -> Result<()> {
    let ws = open_ws(ws_flag)?;
    let mut imported = Vec::new();
    for locator in &locators {
        let sp = ws.import_item(locator, None, reimport)?;
        println!("{}", sp.display_str());
        imported.push(sp);
    }
    ws.push_selection(Selection::new(imported));
    Ok(())
}

fn cmd_archive(ws_flag: Option<PathBuf>, path: &str, unarchive: bool) -> Result<()> {
    let ws = open_ws(ws_flag)?;
    let sp = kash_core::paths::StorePath::parse(path)?;
    let moved = if unarchive {
        ws.unarchive(&sp)?
    } else {
        ws.archive(&sp, false)?
    };
    println!("{}", moved.display_str());
    Ok(())
}

fn cmd_selection(ws_flag: Option<PathBuf>, command: Option<SelectionCommands>) -> Result<()> {
    let ws = open_ws(ws_flag)?;
    let selection = match command.unwrap_or(SelectionCommands::Show) {
        SelectionCommands::Show => ws.current_selection(),
        SelectionCommands::Back => Some(ws.previous_selection()?),
        SelectionCommands::Forward => Some(ws.next_selection()?),
        SelectionCommands::Set { paths } => {
            let paths = paths
                .iter()
                .map(|p| kash_core::paths::StorePath::parse(p))
                .collect::<kash_error::Result<Vec<_>>>()?;
            let selection = Selection::new(paths);
            ws.push_selection(selection.clone());
            Some(selection)
        }
    };

    match selection {
        Some(selection) if !selection.is_empty() => {
            for sp in &selection.paths {
                println!("{}", sp.display_str());
            }
        }
        _ => println!("(no selection)"),
    }
    Ok(())
}

fn cmd_mcp(ws_flag: Option<PathBuf>, settings: &KashSettings, capture: LogCapture) -> Result<()> {
    let dir = match ws_flag.or_else(|| settings.mcp_ws_dir.clone()) {
        Some(dir) => dir,
        None => enclosing_ws_dir(&std::env::current_dir()?)
            .context("no workspace found; pass --ws or set KASH_MCP_WS")?,
    };
    let ws = Arc::new(FileStore::open(&dir, true)?);
    let server = McpServer::new(ws, global_registry()).with_capture(capture);
    run_stdio(&server)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_flags_parse() {
        assert_eq!(
            parse_param_flag("pattern=hello"),
            ("pattern".to_string(), Some("hello".to_string()))
        );
        assert_eq!(parse_param_flag("force"), ("force".to_string(), None));
        assert_eq!(
            parse_param_flag("eq=a=b"),
            ("eq".to_string(), Some("a=b".to_string()))
        );
    }

    #[test]
    fn cli_parses_run_command() {
        let cli = Cli::parse_from([
            "kash", "run", "lowercase", "docs/a.doc.md", "--param", "x=1", "--rerun",
        ]);
        match cli.command {
            Commands::Run {
                action,
                inputs,
                params,
                rerun,
                no_format,
            } => {
                assert_eq!(action, "lowercase");
                assert_eq!(inputs, ["docs/a.doc.md"]);
                assert_eq!(params, ["x=1"]);
                assert!(rerun);
                assert!(!no_format);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
