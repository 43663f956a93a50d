// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash
//!
//! Workspace-oriented execution engine for content pipelines.
//!
//! Users declare typed, idempotent transformations ("actions") over content
//! items (documents, resources, URLs). The engine resolves inputs,
//! validates preconditions, runs actions with caching, retry, and
//! concurrency control, persists results as files with structured
//! metadata, and exposes the library as a standalone API
//! ([`kash_init`]/[`kash_run`]), a CLI (`kash`), and an MCP tool server.
//!
//! ```no_run
//! # use kash::{kash_init, kash_run};
//! # use kash_core::params::RawParamValues;
//! let session = kash_init(Some("/tmp/ws".as_ref()), None, false).unwrap();
//! let outcome = kash_run(
//!     &session,
//!     "lowercase",
//!     &["https://example.com/page".to_string()],
//!     &RawParamValues::new(),
//!     false,
//!     false,
//! )
//! .unwrap();
//! println!("saved: {:?}", outcome.saved_paths);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use kash_config::KashSettings;
use kash_error::Result;
use kash_exec::{
    global_registry, register_all, run_action_with_selection, ActionRegistry, RunOutcome,
    RuntimeSettings,
};
use kash_store::{enclosing_ws_dir, FileStore};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub use kash_core;
pub use kash_error;
pub use kash_exec;
pub use kash_store;

/// An initialized kash session: settings, registry, and the active
/// workspace.
pub struct KashSession {
    /// Resolved process settings.
    pub settings: KashSettings,
    /// The action registry (process-wide).
    pub registry: &'static ActionRegistry,
    /// The active workspace.
    pub ws: Arc<FileStore>,
}

fn init_logging_once(log_level: Option<&str>, quiet: bool, settings: &KashSettings) {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let level = if quiet {
            "error"
        } else {
            log_level.unwrap_or(&settings.log_level)
        };
        let filter = EnvFilter::try_from_env("KASH_LOG_LEVEL")
            .unwrap_or_else(|_| EnvFilter::new(format!("kash={level}")));
        // Ignore failures: an embedding application may already have
        // installed a subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Initialize kash: logging, built-in action registration, and the
/// workspace.
///
/// The workspace is `workspace_dir` when given, else the workspace
/// enclosing the current directory, else the global workspace from
/// settings. It is created and initialized if needed.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or initialized.
pub fn kash_init(
    workspace_dir: Option<&Path>,
    log_level: Option<&str>,
    quiet: bool,
) -> Result<KashSession> {
    let settings = KashSettings::from_env();
    init_logging_once(log_level, quiet, &settings);

    let registry = global_registry();
    register_all(registry)?;

    let ws_dir = match workspace_dir {
        Some(dir) => dir.to_path_buf(),
        None => match std::env::current_dir()
            .ok()
            .and_then(|cwd| enclosing_ws_dir(&cwd))
        {
            Some(dir) => dir,
            None => settings.global_ws_dir.clone(),
        },
    };
    debug!(target: "kash.run", ws = %ws_dir.display(), "initializing session");

    let ws = Arc::new(FileStore::open(&ws_dir, true)?);
    if !quiet {
        ws.log_workspace_info();
    }

    Ok(KashSession {
        settings,
        registry,
        ws,
    })
}

/// Run an action by name over input locators (URLs, file paths, or store
/// paths). With no inputs, the current selection supplies them for
/// actions that use it.
///
/// # Errors
///
/// Propagates validation, resolution, execution, and save failures.
pub fn kash_run(
    session: &KashSession,
    action_name: &str,
    inputs: &[String],
    params: &kash_core::params::RawParamValues,
    rerun: bool,
    no_format: bool,
) -> Result<RunOutcome> {
    kash_run_with(session, action_name, inputs, params, rerun, no_format, true)
}

/// Like [`kash_run`], with control over whether results are saved to the
/// workspace proper. With `save_results` false, outputs land in the
/// temporary directory under the workspace metadata dir.
///
/// # Errors
///
/// Propagates validation, resolution, execution, and save failures.
#[allow(clippy::too_many_arguments)]
pub fn kash_run_with(
    session: &KashSession,
    action_name: &str,
    inputs: &[String],
    params: &kash_core::params::RawParamValues,
    rerun: bool,
    no_format: bool,
    save_results: bool,
) -> Result<RunOutcome> {
    let fetcher = kash_web::HttpFetcher::from_settings(&session.settings).ok();
    run_action_with_selection(
        Arc::clone(&session.ws),
        session.registry,
        fetcher.as_ref().map(|f| f as &dyn kash_web::WebFetcher),
        action_name,
        params,
        inputs,
        RuntimeSettings {
            workspace_dir: session.ws.base_dir().to_path_buf(),
            rerun,
            no_format,
            tmp_output: !save_results,
            ..RuntimeSettings::default()
        },
    )
}
