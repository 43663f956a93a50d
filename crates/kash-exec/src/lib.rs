// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-exec
//!
//! The action layer.
//!
//! Responsibilities:
//! - the [`Action`](actions::Action) contract and
//!   [`ActionBuilder`](actions::ActionBuilder)
//! - thread-safe action and precondition registries
//! - the matching engine over preconditions
//! - the execution pipeline: input assembly, validation, operation
//!   fingerprinting, rerun avoidance, the per-item loop, result saving, and
//!   selection updates

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The action contract, specs, inputs, and results.
pub mod actions;
/// Built-in actions.
pub mod builtin;
/// The precondition matching engine.
pub mod checks;
/// The execution pipeline.
pub mod pipeline;
/// Named precondition definitions and their registry.
pub mod preconditions;
/// The thread-safe action registry.
pub mod registry;
/// Input resolution: locators to items, selection fallback.
pub mod resolve;

pub use actions::{
    Action, ActionBuilder, ActionInput, ActionMeta, ActionResult, ActionSpec, ArgCount,
    ExecContext, FnAction, LlmOptions, PathOp, PathOpType, RuntimeSettings, ANY_ARGS, NO_ARGS,
    ONE_ARG, ONE_OR_MORE_ARGS,
};
pub use builtin::register_all;
pub use checks::{actions_matching_paths, items_matching_precondition};
pub use pipeline::{run_action, run_action_with_selection, RunOutcome};
pub use preconditions::{global_preconditions, PreconditionRegistry};
pub use registry::{global_registry, ActionRegistry};
pub use resolve::{assemble_action_args, assemble_action_input};
