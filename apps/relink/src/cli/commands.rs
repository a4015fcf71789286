//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use relink::{Replay, ReplayReport, Scenario, StepReport};
use relink_core::{Data, RecordId, RelinkError, Target};
use std::path::{Path, PathBuf};

/// Output switches shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json_mode: bool,
    pub quiet: bool,
    pub verbose: bool,
}

/// Validate a scenario path.
///
/// Canonicalizes the path and ensures it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, RelinkError> {
    let canonical = path.canonicalize().map_err(|e| {
        RelinkError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(RelinkError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn load_scenario(path: &Path) -> Result<Scenario, RelinkError> {
    let path = validate_file_path(path)?;
    let scenario = Scenario::load(&path)?;
    tracing::debug!(
        path = %path.display(),
        records = scenario.store.records.len(),
        steps = scenario.steps.len(),
        "scenario loaded"
    );
    Ok(scenario)
}

fn render(data: &Data, verbose: bool) -> String {
    let rendered = if verbose {
        serde_json::to_string_pretty(data)
    } else {
        serde_json::to_string(data)
    };
    rendered.unwrap_or_default()
}

fn print_json(value: &impl serde::Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// REPLAY COMMAND
// =============================================================================

/// Replay a scenario file.
pub fn cmd_replay(path: &Path, output: Output) -> Result<(), RelinkError> {
    let scenario = load_scenario(path)?;
    let report = Replay::run(&scenario)?;

    if output.json_mode {
        print_json(&report);
        return Ok(());
    }

    if !output.quiet {
        println!("Relink Replay");
        println!("=============");
        println!("Scenario: {}", path.display());
        println!();
    }
    for step in &report.steps {
        print_step(step, output.verbose);
    }
    if !output.quiet {
        print_summary(&report);
    }

    Ok(())
}

fn print_step(step: &StepReport, verbose: bool) {
    let mut line = format!("#{:<3} {:<8}", step.index, step.action);
    if let Some(resolver) = &step.resolver {
        line.push_str(&format!(" [{}]", resolver));
    }
    if let Some(identity) = step.identity {
        line.push_str(&format!(" {}", identity));
    }
    if !step.records.is_empty() {
        line.push_str(&format!(" records={}", join(&step.records)));
    }
    if !step.notified.is_empty() {
        line.push_str(&format!(" notified={}", step.notified.join(",")));
    }
    println!("{}", line);

    if let Some(result) = &step.result {
        println!("     {}", render(result, verbose));
    }
}

fn print_summary(report: &ReplayReport) {
    let summary = &report.summary;
    println!();
    println!("Callbacks:");
    for (resolver, count) in &summary.callbacks {
        println!("  {:<12} {}", resolver, count);
    }
    println!("Live references:");
    if summary.live.is_empty() {
        println!("  (none)");
    }
    for (id, count) in &summary.live {
        println!("  {:<12} {}", id, count);
    }
    println!("Listeners: {}", summary.listeners);
    println!("Records:   {}", summary.records);
}

fn join(ids: &[RecordId]) -> String {
    ids.iter()
        .map(RecordId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// RESOLVE COMMAND
// =============================================================================

/// Resolve one fragment against the scenario's initial store.
///
/// A single `--id` resolves singularly unless the fragment is declared plural.
pub fn cmd_resolve(
    path: &Path,
    output: Output,
    fragment: &str,
    ids: Vec<RecordId>,
) -> Result<(), RelinkError> {
    let scenario = load_scenario(path)?;
    let plural = scenario
        .fragments
        .get(fragment)
        .ok_or_else(|| RelinkError::Scenario(format!("unknown fragment '{}'", fragment)))?
        .plural;

    let target = match <[RecordId; 1]>::try_from(ids) {
        Ok([id]) if !plural => Target::One(id),
        Ok(ids) => Target::many(ids),
        Err(ids) => Target::Many(ids),
    };

    let mut replay = Replay::new(&scenario)?;
    let report = replay.resolve(relink::scenario::DEFAULT_RESOLVER, fragment, target)?;

    if output.json_mode {
        print_json(&report.result);
        return Ok(());
    }

    if let Some(result) = &report.result {
        println!("{}", render(result, output.verbose));
    }
    if !output.quiet {
        let summary = replay.summary();
        println!();
        println!("Referenced records: {}", summary.live.len());
    }

    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Validate a scenario file.
pub fn cmd_check(path: &Path, output: Output) -> Result<(), RelinkError> {
    let scenario = load_scenario(path)?;
    scenario.validate()?;

    if output.json_mode {
        let result = serde_json::json!({
            "valid": true,
            "records": scenario.store.records.len(),
            "views": scenario.store.views.len(),
            "fragments": scenario.fragments.keys().collect::<Vec<_>>(),
            "steps": scenario.steps.len(),
        });
        print_json(&result);
        return Ok(());
    }

    println!("Scenario OK: {}", path.display());
    if !output.quiet {
        println!("  Records:   {}", scenario.store.records.len());
        println!("  Views:     {}", scenario.store.views.len());
        println!("  Fragments: {}", scenario.fragments.len());
        println!("  Steps:     {}", scenario.steps.len());
    }

    Ok(())
}
