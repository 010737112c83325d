use anyhow::Result;
use evolve_core::{AppConfig, ApplyStrategy, PatchOutcome, PatchRequest};
use evolve_gate::EvolutionGate;
use evolve_observe::Observer;
use std::path::Path;

use crate::output::*;

pub(crate) fn run_apply(cwd: &Path, patch: Option<&Path>, json_mode: bool) -> Result<bool> {
    let raw = read_input(patch)?;
    run_gate(cwd, raw, ApplyStrategy::GitApply, json_mode)
}

pub(crate) fn run_replace(
    cwd: &Path,
    file: &str,
    block: Option<&Path>,
    json_mode: bool,
) -> Result<bool> {
    let raw = read_input(block)?;
    let strategy = ApplyStrategy::SearchReplace {
        path: file.to_string(),
    };
    run_gate(cwd, raw, strategy, json_mode)
}

fn run_gate(cwd: &Path, raw: String, strategy: ApplyStrategy, json_mode: bool) -> Result<bool> {
    let cfg = AppConfig::load(cwd)?;
    let observer = Observer::new(cwd, &cfg.telemetry)?;
    let outcome = EvolutionGate::new(cwd, &cfg).run(&PatchRequest::new(raw), &strategy)?;
    observer.record_outcome(&outcome)?;
    print_outcome(&outcome, json_mode)?;
    observer.flush();
    Ok(outcome.is_applied())
}

fn print_outcome(outcome: &PatchOutcome, json_mode: bool) -> Result<()> {
    if json_mode {
        return print_json(outcome);
    }
    println!("{}", outcome_summary(outcome));
    for conflict in &outcome.conflicts {
        println!("  {conflict}");
    }
    Ok(())
}
