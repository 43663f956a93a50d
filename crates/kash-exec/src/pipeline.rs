// SPDX-License-Identifier: MIT OR Apache-2.0
//! The execution pipeline.
//!
//! `run_action` takes resolved inputs through validation, operation
//! fingerprinting, the rerun check, execution (whole-input or per-item),
//! lineage recording, result saving, and archive-on-replace.
//! `run_action_with_selection` is the full outer path: look up the action,
//! bind parameters, fall back to the selection for arguments, run, and
//! push the resulting selection.

use crate::actions::{
    Action, ActionInput, ActionMeta, ActionResult, ExecContext, PathOpType, RuntimeSettings,
    NO_ARGS,
};
use crate::registry::ActionRegistry;
use crate::resolve::{assemble_action_args, assemble_action_input};
use kash_core::items::Item;
use kash_core::operations::{Input, Operation, Source};
use kash_core::params::{RawParamValues, TypedParamValues};
use kash_core::paths::StorePath;
use kash_error::{KashError, Result};
use kash_store::store::SaveOptions;
use kash_store::{FileStore, Selection};
use kash_web::WebFetcher;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The outcome of one action run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The action's result items (with store paths filled in when saved).
    pub result: ActionResult,
    /// Paths of saved (or already-present) outputs.
    pub saved_paths: Vec<StorePath>,
    /// Paths archived because the action replaced its input.
    pub archived_paths: Vec<StorePath>,
    /// True when the run was skipped in favor of cached outputs.
    pub skipped_rerun: bool,
}

/// Validate inputs and assemble the operation fingerprint.
fn validate_and_fingerprint(
    action: &dyn Action,
    context: &ExecContext,
    input: &ActionInput,
) -> Result<Operation> {
    let spec = action.spec();

    spec.expected_args.validate(input.len(), "arguments")?;

    for param in &spec.params {
        if param.is_explicit && context.params.get(&param.name).is_none() {
            return Err(KashError::InvalidInput(format!(
                "required param `{}` missing for action `{}`",
                param.name, spec.name
            )));
        }
    }

    if let Some(precondition) = &spec.precondition {
        for item in &input.items {
            precondition.check(item, Some(&format!("action `{}`", spec.name)))?;
        }
    }

    let mut arguments = Vec::new();
    for item in &input.items {
        if let Some(sp) = &item.store_path {
            arguments.push(Input::new(sp.clone(), context.ws.hash(sp)?));
        }
    }

    let mut options: BTreeMap<String, String> = context.params.summary();
    for (k, v) in context.settings.non_default_options() {
        options.insert(k, v);
    }

    Ok(Operation::new(spec.name.clone(), arguments, options))
}

/// Rerun avoidance: when every predicted output already exists with a
/// matching operation fingerprint, return the cached outputs.
fn check_for_existing_result(
    action: &dyn Action,
    context: &ExecContext,
    operation: &Operation,
    input: &ActionInput,
) -> Option<Vec<(StorePath, Item)>> {
    let Some(predicted) = action.preassemble(operation, input) else {
        debug!(
            target: "kash.exec",
            action = %action.spec().name,
            "no rerun check (action has no preassembly)"
        );
        return None;
    };

    let mut existing = Vec::with_capacity(predicted.len());
    for predicted_item in &predicted {
        let sp = context.ws.find_by_id(predicted_item)?;
        let item = context.ws.load(&sp).ok()?;
        let fingerprints_match = match (&item.source, &predicted_item.source) {
            (Some(found), Some(expected)) => found.operation == expected.operation,
            _ => false,
        };
        if !fingerprints_match {
            return None;
        }
        existing.push((sp, item));
    }
    Some(existing)
}

/// Run the action body once per input item.
///
/// Non-fatal errors on individual items are logged and counted; the loop
/// proceeds. With a single input, non-fatal errors re-raise. `SkipItem`
/// passes the item through unchanged.
fn run_for_each_item(
    action: &dyn Action,
    context: &ExecContext,
    input: ActionInput,
) -> Result<Vec<(usize, Item)>> {
    let name = &action.spec().name;
    let total = input.len();
    let multiple_inputs = total > 1;
    info!(target: "kash.exec", action = %name, items = total, "running action per item");

    let mut outputs: Vec<(usize, Item)> = Vec::with_capacity(total);
    let mut errors = 0usize;

    for (i, item) in input.items.into_iter().enumerate() {
        debug!(
            target: "kash.exec",
            action = %name,
            item = i + 1,
            total,
            loc = %item.fmt_loc(),
            "per-item input"
        );
        match action.run(ActionInput::new(vec![item.clone()]), context) {
            Ok(result) => {
                if result.has_hints() {
                    warn!(
                        target: "kash.exec",
                        action = %name,
                        "ignoring result hints from a per-item call"
                    );
                }
                match result.items.into_iter().next() {
                    Some(out) => outputs.push((i, out)),
                    None => {
                        errors += 1;
                        error!(target: "kash.exec", action = %name, item = i + 1, "no output for item");
                    }
                }
            }
            Err(KashError::SkipItem) => {
                debug!(target: "kash.exec", action = %name, item = i + 1, "item skipped, passing through");
                outputs.push((i, item));
            }
            Err(e) if e.is_nonfatal() => {
                errors += 1;
                if multiple_inputs {
                    error!(
                        target: "kash.exec",
                        action = %name,
                        item = i + 1,
                        error = %e,
                        "error processing item; continuing with others"
                    );
                } else {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }

    if errors > 0 {
        error!(target: "kash.exec", action = %name, errors, "errors occurred while processing items");
    }
    if outputs.is_empty() {
        return Err(KashError::ContentError(format!(
            "action `{name}` returned no items"
        )));
    }
    Ok(outputs)
}

/// Run an action with validation, rerun avoidance, lineage, and saving.
///
/// # Errors
///
/// Propagates validation failures, fatal action errors, and save errors.
pub fn run_action(
    action: &dyn Action,
    context: &ExecContext,
    input: ActionInput,
) -> Result<RunOutcome> {
    let spec = action.spec();
    let start = Instant::now();

    let operation = validate_and_fingerprint(action, context, &input)?;
    info!(
        target: "kash.exec",
        action = %spec.name,
        command = %operation.command_line(true),
        "running action"
    );

    // Rerun check.
    if spec.cacheable && !context.settings.rerun {
        if let Some(existing) = check_for_existing_result(action, context, &operation, &input) {
            info!(
                target: "kash.exec",
                action = %spec.name,
                outputs = existing.len(),
                "all outputs already exist, skipping action (use rerun to force)"
            );
            let saved_paths: Vec<StorePath> = existing.iter().map(|(sp, _)| sp.clone()).collect();
            let items: Vec<Item> = existing.into_iter().map(|(_, item)| item).collect();
            return Ok(RunOutcome {
                result: ActionResult::new(items),
                saved_paths,
                archived_paths: Vec::new(),
                skipped_rerun: true,
            });
        }
    }

    let input_store_paths: Vec<StorePath> = input
        .items
        .iter()
        .filter_map(|item| item.store_path.clone())
        .collect();

    // Execute.
    let mut result = if spec.run_per_item {
        let outputs = run_for_each_item(action, context, input)?;
        let mut items = Vec::with_capacity(outputs.len());
        for (input_idx, mut item) in outputs {
            // A per-item run is recorded as if the action ran on that item
            // alone.
            let op_i = Operation {
                action_name: operation.action_name.clone(),
                arguments: operation
                    .arguments
                    .get(input_idx)
                    .cloned()
                    .into_iter()
                    .collect(),
                options: operation.options.clone(),
            };
            item.update_history(Source::new(op_i, 0, spec.cacheable));
            items.push(item);
        }
        ActionResult::new(items)
    } else {
        let mut result = action.run(input, context)?;
        if result.items.is_empty() {
            return Err(KashError::ContentError(format!(
                "action `{}` did not return any results",
                spec.name
            )));
        }
        for (i, item) in result.items.iter_mut().enumerate() {
            item.update_history(Source::new(operation.clone(), i as u32, spec.cacheable));
        }
        result
    };

    if let Err(e) = spec
        .expected_outputs
        .validate(result.items.len(), "outputs")
    {
        warn!(target: "kash.exec", action = %spec.name, error = %e, "unexpected output count");
    }

    if let Some(state) = context.settings.override_state {
        for item in &mut result.items {
            item.state = state;
        }
    }

    // Save outputs.
    let save_options = SaveOptions {
        no_format: context.settings.no_format,
        as_tmp: context.settings.tmp_output,
        ..SaveOptions::default()
    };
    let mut saved_paths = Vec::new();
    let mut skipped_paths = Vec::new();
    for item in &mut result.items {
        if result.skip_duplicates {
            if let Some(existing) = context.ws.find_by_id(item) {
                skipped_paths.push(existing);
                continue;
            }
        }
        saved_paths.push(context.ws.save(item, save_options)?);
    }
    if !skipped_paths.is_empty() {
        info!(
            target: "kash.exec",
            count = skipped_paths.len(),
            "skipped saving items already in the store"
        );
    }

    // Archive-on-replace: inputs that are not among the outputs.
    let mut archived_paths = Vec::new();
    if result.replaces_input {
        let mut old_inputs: Vec<StorePath> = input_store_paths
            .into_iter()
            .filter(|sp| !saved_paths.contains(sp))
            .collect();
        old_inputs.sort();
        old_inputs.dedup();
        for sp in &old_inputs {
            context.ws.archive(sp, true)?;
        }
        if !old_inputs.is_empty() {
            info!(
                target: "kash.exec",
                count = old_inputs.len(),
                "archived old inputs replaced by outputs"
            );
        }
        archived_paths = old_inputs;
    }

    let elapsed = start.elapsed();
    info!(
        target: "kash.exec",
        action = %spec.name,
        items = result.items.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "action done"
    );

    Ok(RunOutcome {
        result,
        saved_paths,
        archived_paths,
        skipped_rerun: false,
    })
}

/// Bind parameters for an action: workspace-level values under explicit
/// ones, both parsed against the declared params.
fn bind_params(
    action: &dyn Action,
    ws: &FileStore,
    explicit: &RawParamValues,
) -> Result<TypedParamValues> {
    let declared = action.spec().param_map();

    // Workspace values may cover params of other actions; only keep the
    // declared ones.
    let ws_raw = ws.params();
    let ws_filtered = RawParamValues(
        ws_raw
            .0
            .iter()
            .filter(|(name, _)| declared.contains_key(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    );

    let mut params = ws_filtered.parse_all(&declared)?;
    params.merge_over(&explicit.parse_all(&declared)?);
    Ok(params)
}

/// The full outer run path: look up the action, bind params, collect
/// arguments (falling back to the selection), resolve inputs, run, and
/// update the selection with the outputs.
///
/// # Errors
///
/// Propagates lookup, binding, resolution, and run failures.
#[allow(clippy::too_many_arguments)]
pub fn run_action_with_selection(
    ws: Arc<FileStore>,
    registry: &ActionRegistry,
    fetcher: Option<&dyn WebFetcher>,
    action_name: &str,
    explicit_params: &RawParamValues,
    provided_args: &[String],
    settings: RuntimeSettings,
) -> Result<RunOutcome> {
    let action = registry.get(action_name)?;
    let spec = action.spec();

    let params = bind_params(action.as_ref(), &ws, explicit_params)?;

    let (mut args, from_selection) =
        assemble_action_args(provided_args, spec.uses_selection, &ws);
    if spec.expected_args == NO_ARGS && from_selection {
        info!(
            target: "kash.exec",
            action = %spec.name,
            "not using current selection since action expects no args"
        );
        args.clear();
    }

    let input = assemble_action_input(&ws, fetcher, &args)?;

    let context = ExecContext {
        ws: Arc::clone(&ws),
        settings,
        params,
        action: ActionMeta {
            name: spec.name.clone(),
            title_template: spec.title_template.clone(),
            output_type: spec.output_type,
        },
    };

    let outcome = run_action(action.as_ref(), &context, input)?;

    // Selection update: explicit path ops win; otherwise select the final
    // outputs (omitting archived ones).
    match &outcome.result.path_ops {
        Some(path_ops) => {
            let path_ops: Vec<_> = path_ops
                .iter()
                .filter(|op| !outcome.archived_paths.contains(&op.store_path))
                .collect();
            let to_archive: Vec<StorePath> = path_ops
                .iter()
                .filter(|op| op.op == PathOpType::Archive)
                .map(|op| op.store_path.clone())
                .collect();
            for sp in &to_archive {
                ws.archive(sp, true)?;
            }
            let to_select: Vec<StorePath> = path_ops
                .iter()
                .filter(|op| op.op == PathOpType::Select)
                .map(|op| op.store_path.clone())
                .collect();
            if !to_select.is_empty() {
                ws.push_selection(Selection::new(to_select));
            }
        }
        None => {
            let mut final_outputs: Vec<StorePath> = outcome
                .saved_paths
                .iter()
                .filter(|sp| !outcome.archived_paths.contains(sp))
                .cloned()
                .collect();
            final_outputs.sort();
            final_outputs.dedup();
            ws.push_selection(Selection::new(final_outputs));
        }
    }

    Ok(outcome)
}
