// SPDX-License-Identifier: MIT OR Apache-2.0
//! The action contract: specs, inputs, results, and the runtime context.
//!
//! An action is a named, parameterized, idempotent transformation over
//! items, with a declared precondition and output shape. Actions implement
//! the [`Action`] trait; most are built with [`ActionBuilder`], which
//! mirrors the declared parameters against supplied values the way the
//! engine expects.

use kash_core::items::{Item, ItemType, State};
use kash_core::operations::{Operation, Source};
use kash_core::params::{Param, TypedParamValues};
use kash_core::paths::StorePath;
use kash_core::preconditions::Precondition;
use kash_error::{KashError, Result};
use kash_store::FileStore;
use std::path::PathBuf;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Arg counts
// ---------------------------------------------------------------------------

/// Cardinality range for action arguments or outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgCount {
    /// Minimum count.
    pub min: usize,
    /// Maximum count, or `None` for unbounded.
    pub max: Option<usize>,
}

/// Exactly zero arguments.
pub const NO_ARGS: ArgCount = ArgCount {
    min: 0,
    max: Some(0),
};
/// Exactly one argument.
pub const ONE_ARG: ArgCount = ArgCount {
    min: 1,
    max: Some(1),
};
/// One or more arguments.
pub const ONE_OR_MORE_ARGS: ArgCount = ArgCount { min: 1, max: None };
/// Any number of arguments.
pub const ANY_ARGS: ArgCount = ArgCount { min: 0, max: None };

impl ArgCount {
    /// Validate an argument count against this range.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidInput`] when the count is out of range.
    pub fn validate(&self, n: usize, what: &str) -> Result<()> {
        if n < self.min || self.max.is_some_and(|max| n > max) {
            return Err(KashError::InvalidInput(format!(
                "expected {self} {what}, got {n}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for ArgCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min, self.max) {
            (min, Some(max)) if min == max => write!(f, "exactly {min}"),
            (min, Some(max)) => write!(f, "{min}..{max}"),
            (min, None) => write!(f, "at least {min}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs and results
// ---------------------------------------------------------------------------

/// The list of items fed to an action for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ActionInput {
    /// The input items, in argument order.
    pub items: Vec<Item>,
}

impl ActionInput {
    /// Wrap items as an input.
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Number of input items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there are no inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A path operation requested by an action result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOpType {
    /// Archive the path.
    Archive,
    /// Select the path.
    Select,
}

/// A store path plus the operation to apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOp {
    /// The target path.
    pub store_path: StorePath,
    /// What to do with it.
    pub op: PathOpType,
}

/// The items produced by an action plus result hints.
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    /// The output items.
    pub items: Vec<Item>,
    /// When true, inputs not present among the outputs are archived.
    pub replaces_input: bool,
    /// When true, outputs whose identity already exists in the store are
    /// not saved again.
    pub skip_duplicates: bool,
    /// Explicit path operations overriding the default selection update.
    pub path_ops: Option<Vec<PathOp>>,
}

impl ActionResult {
    /// A plain result with no hints.
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Mark the result as replacing its input.
    #[must_use]
    pub fn replacing_input(mut self) -> Self {
        self.replaces_input = true;
        self
    }

    /// Mark the result as skipping duplicate outputs.
    #[must_use]
    pub fn skipping_duplicates(mut self) -> Self {
        self.skip_duplicates = true;
        self
    }

    /// Whether the result carries any non-default hints.
    #[must_use]
    pub fn has_hints(&self) -> bool {
        self.replaces_input || self.skip_duplicates || self.path_ops.is_some()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Workspace and other runtime settings that apply across runs.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    /// The workspace directory the action executes in.
    pub workspace_dir: PathBuf,
    /// Always run, even when cached results exist.
    pub rerun: bool,
    /// Refetch content even when cached.
    pub refetch: bool,
    /// Override the state of result items (e.g. mark transient).
    pub override_state: Option<State>,
    /// Save outputs to the temporary directory.
    pub tmp_output: bool,
    /// Skip body normalization when saving.
    pub no_format: bool,
}

impl RuntimeSettings {
    /// Non-default options that affect output, for operation fingerprints.
    #[must_use]
    pub fn non_default_options(&self) -> Vec<(String, String)> {
        let mut opts = Vec::new();
        if self.no_format {
            opts.push(("no_format".to_string(), "true".to_string()));
        }
        if let Some(state) = self.override_state {
            opts.push(("override_state".to_string(), state.as_str().to_string()));
        }
        opts
    }
}

/// LLM settings an action declares for its completions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmOptions {
    /// Model name, when the action pins one.
    pub model: Option<String>,
    /// System message for the action's completions.
    pub system_message: Option<String>,
}

/// The active action, as visible to an action body.
#[derive(Debug, Clone)]
pub struct ActionMeta {
    /// Action name.
    pub name: String,
    /// Template applied to derived titles (`{title}`, `{action_name}`).
    pub title_template: String,
    /// Default output item type.
    pub output_type: ItemType,
}

/// The runtime context an action body executes in.
pub struct ExecContext {
    /// The workspace store.
    pub ws: Arc<FileStore>,
    /// Runtime settings.
    pub settings: RuntimeSettings,
    /// Bound parameter values for this invocation.
    pub params: TypedParamValues,
    /// The active action.
    pub action: ActionMeta,
}

impl ExecContext {
    /// Derive an output item from an input, applying the active action's
    /// output type and title template.
    #[must_use]
    pub fn derive_output(&self, item: &Item) -> Item {
        item.derived_copy(
            self.action.output_type,
            Some(&self.action.title_template),
            Some(&self.action.name),
        )
    }
}

// ---------------------------------------------------------------------------
// Action contract
// ---------------------------------------------------------------------------

/// The declarative half of an action.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    /// Unique action name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Precondition on every input item, if any.
    pub precondition: Option<Precondition>,
    /// Cardinality of inputs.
    pub expected_args: ArgCount,
    /// Cardinality of outputs.
    pub expected_outputs: ArgCount,
    /// Declared parameters.
    pub params: Vec<Param>,
    /// Run the body once per input item.
    pub run_per_item: bool,
    /// Whether equal reruns may be skipped.
    pub cacheable: bool,
    /// Whether the current selection supplies missing arguments.
    pub uses_selection: bool,
    /// Whether the action prompts the user.
    pub interactive_input: bool,
    /// Whether the action is published as an MCP tool.
    pub mcp_tool: bool,
    /// Template for derived titles.
    pub title_template: String,
    /// Default output item type.
    pub output_type: ItemType,
    /// LLM settings for actions that call a model.
    pub llm_options: LlmOptions,
}

impl ActionSpec {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            precondition: None,
            expected_args: ONE_OR_MORE_ARGS,
            expected_outputs: ONE_OR_MORE_ARGS,
            params: Vec::new(),
            run_per_item: false,
            cacheable: true,
            uses_selection: true,
            interactive_input: false,
            mcp_tool: false,
            title_template: "{title}".to_string(),
            output_type: ItemType::Doc,
            llm_options: LlmOptions::default(),
        }
    }

    /// The declared parameters keyed by name.
    #[must_use]
    pub fn param_map(&self) -> std::collections::BTreeMap<String, Param> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect()
    }
}

/// A named, parameterized, idempotent transformation over items.
pub trait Action: Send + Sync {
    /// The action's declarative contract.
    fn spec(&self) -> &ActionSpec;

    /// Execute the action.
    ///
    /// # Errors
    ///
    /// Per-item bodies may return [`KashError::SkipItem`] to pass the item
    /// through; non-fatal errors are logged and skipped by the per-item
    /// loop.
    fn run(&self, input: ActionInput, context: &ExecContext) -> Result<ActionResult>;

    /// Predict the output items of this operation, so the pipeline can
    /// check whether a prior run already produced them. `None` disables
    /// the rerun check.
    fn preassemble(&self, operation: &Operation, input: &ActionInput) -> Option<Vec<Item>> {
        let spec = self.spec();
        if !spec.cacheable || !spec.run_per_item {
            return None;
        }
        // Per-item actions produce one derived output per input, each
        // sourced from a single-argument operation.
        Some(
            input
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut predicted = item.derived_copy(
                        spec.output_type,
                        Some(&spec.title_template),
                        Some(&spec.name),
                    );
                    let op_i = Operation {
                        action_name: operation.action_name.clone(),
                        arguments: operation.arguments.get(i).cloned().into_iter().collect(),
                        options: operation.options.clone(),
                    };
                    predicted.update_history(Source::new(op_i, 0, spec.cacheable));
                    predicted
                })
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Function-backed actions
// ---------------------------------------------------------------------------

type RunFn = dyn Fn(ActionInput, &ExecContext) -> Result<ActionResult> + Send + Sync;

/// An action backed by a closure, produced by [`ActionBuilder`].
pub struct FnAction {
    spec: ActionSpec,
    run_fn: Arc<RunFn>,
}

impl std::fmt::Debug for FnAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.spec().name)
            .finish_non_exhaustive()
    }
}

impl Action for FnAction {
    fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    fn run(&self, input: ActionInput, context: &ExecContext) -> Result<ActionResult> {
        (*self.run_fn)(input, context)
    }
}

/// Builder for [`FnAction`]s.
///
/// The body is either a whole-input function
/// ([`run`](ActionBuilder::run)) or a per-item function
/// ([`run_per_item`](ActionBuilder::run_per_item)), which forces
/// one-in/one-out cardinality the way a single-item action behaves.
pub struct ActionBuilder {
    spec: ActionSpec,
    run_fn: Option<Arc<RunFn>>,
}

impl ActionBuilder {
    /// Start declaring an action.
    #[must_use]
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            spec: ActionSpec::new(name, description),
            run_fn: None,
        }
    }

    /// Set the precondition.
    #[must_use]
    pub fn precondition(mut self, precondition: Precondition) -> Self {
        self.spec.precondition = Some(precondition);
        self
    }

    /// Set the expected argument cardinality.
    #[must_use]
    pub fn expected_args(mut self, count: ArgCount) -> Self {
        self.spec.expected_args = count;
        self
    }

    /// Set the expected output cardinality.
    #[must_use]
    pub fn expected_outputs(mut self, count: ArgCount) -> Self {
        self.spec.expected_outputs = count;
        self
    }

    /// Declare a parameter.
    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.spec.params.push(param);
        self
    }

    /// Mark the action non-cacheable.
    #[must_use]
    pub fn non_cacheable(mut self) -> Self {
        self.spec.cacheable = false;
        self
    }

    /// Don't fall back to the current selection for arguments.
    #[must_use]
    pub fn no_selection(mut self) -> Self {
        self.spec.uses_selection = false;
        self
    }

    /// Mark the action as interactive.
    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.spec.interactive_input = true;
        self
    }

    /// Publish the action as an MCP tool.
    #[must_use]
    pub fn mcp_tool(mut self) -> Self {
        self.spec.mcp_tool = true;
        self
    }

    /// Set the derived-title template.
    #[must_use]
    pub fn title_template(mut self, template: &str) -> Self {
        self.spec.title_template = template.to_string();
        self
    }

    /// Set the output item type.
    #[must_use]
    pub fn output_type(mut self, output_type: ItemType) -> Self {
        self.spec.output_type = output_type;
        self
    }

    /// Set the LLM options.
    #[must_use]
    pub fn llm_options(mut self, llm_options: LlmOptions) -> Self {
        self.spec.llm_options = llm_options;
        self
    }

    /// Supply a whole-input body.
    #[must_use]
    pub fn run(
        mut self,
        f: impl Fn(ActionInput, &ExecContext) -> Result<ActionResult> + Send + Sync + 'static,
    ) -> Self {
        self.run_fn = Some(Arc::new(f));
        self
    }

    /// Supply a per-item body. Forces `run_per_item` with one argument in
    /// and one output out; the engine invokes it once per input item.
    #[must_use]
    pub fn run_per_item(
        mut self,
        f: impl Fn(&Item, &ExecContext) -> Result<Item> + Send + Sync + 'static,
    ) -> Self {
        self.spec.run_per_item = true;
        self.spec.expected_args = ONE_ARG;
        self.spec.expected_outputs = ONE_ARG;
        self.run_fn = Some(Arc::new(move |input: ActionInput, context: &ExecContext| {
            let item = input.items.into_iter().next().ok_or_else(|| {
                KashError::InvalidInput("per-item action invoked without an item".into())
            })?;
            let out = f(&item, context)?;
            Ok(ActionResult::new(vec![out]))
        }));
        self
    }

    /// Finish the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`KashError::InvalidInput`] when no body was supplied, the
    /// name is empty, or parameter names collide.
    pub fn build(self) -> Result<FnAction> {
        if self.spec.name.is_empty() {
            return Err(KashError::InvalidInput("action name is required".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for p in &self.spec.params {
            if !seen.insert(&p.name) {
                return Err(KashError::InvalidInput(format!(
                    "duplicate param `{}` on action `{}`",
                    p.name, self.spec.name
                )));
            }
        }
        let run_fn = self.run_fn.ok_or_else(|| {
            KashError::InvalidInput(format!("action `{}` has no body", self.spec.name))
        })?;
        Ok(FnAction {
            spec: self.spec,
            run_fn,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
