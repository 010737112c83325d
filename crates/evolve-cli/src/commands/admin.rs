use anyhow::Result;
use evolve_core::AppConfig;
use evolve_observe::Observer;
use std::path::Path;

use crate::output::*;

pub(crate) fn run_history(cwd: &Path, limit: Option<usize>, json_mode: bool) -> Result<()> {
    let cfg = AppConfig::load(cwd)?;
    let mut records = Observer::new(cwd, &cfg.telemetry)?.history()?;
    if let Some(limit) = limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }

    if json_mode {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No recorded outcomes.");
        return Ok(());
    }
    for record in &records {
        println!("{} {}", record.at.to_rfc3339(), outcome_summary(&record.outcome));
    }
    Ok(())
}

pub(crate) fn run_config(cwd: &Path, json_mode: bool) -> Result<()> {
    let cfg = AppConfig::load(cwd)?;
    if json_mode {
        print_json(&cfg)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
    }
    Ok(())
}
