use anyhow::{Context, Result};
use evolve_core::AppConfig;
use evolve_toxicity::ToxicityScorer;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::output::*;

#[derive(Serialize)]
struct FileScore {
    path: String,
    score: f64,
    average_complexity: f64,
    logical_lines: usize,
    blocks: usize,
    parsed: bool,
}

pub(crate) fn run_score(cwd: &Path, files: &[PathBuf], json_mode: bool) -> Result<()> {
    let cfg = AppConfig::load(cwd)?;
    let scorer = ToxicityScorer::new(cfg.scoring);

    let mut rows = Vec::with_capacity(files.len());
    for file in files {
        let bytes = std::fs::read(cwd.join(file))
            .with_context(|| format!("failed to read {}", file.display()))?;
        let source = String::from_utf8_lossy(&bytes);
        let metrics = scorer.metrics(&source);
        rows.push(FileScore {
            path: file.display().to_string(),
            score: scorer.score(&source),
            average_complexity: metrics.average_complexity,
            logical_lines: metrics.logical_lines,
            blocks: metrics.blocks,
            parsed: metrics.parsed,
        });
    }
    let total: f64 = rows.iter().map(|row| row.score).sum();

    if json_mode {
        return print_json(&json!({ "files": rows, "total": total }));
    }
    for row in &rows {
        println!(
            "{} score={:.2} complexity={:.2} lloc={}{}",
            row.path,
            row.score,
            row.average_complexity,
            row.logical_lines,
            if row.parsed { "" } else { " (unparsable)" },
        );
    }
    println!("total={total:.2}");
    Ok(())
}
