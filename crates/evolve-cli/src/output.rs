use anyhow::{Context, Result};
use evolve_core::PatchOutcome;
use serde::Serialize;
use std::io::Read;
use std::path::Path;

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Read `path`, or stdin when it is `None` or `-`.
pub(crate) fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

pub(crate) fn outcome_summary(outcome: &PatchOutcome) -> String {
    let targets = if outcome.target_files.is_empty() {
        "-".to_string()
    } else {
        outcome.target_files.join(",")
    };
    format!(
        "patch_id={} status={} toxicity={:.2}->{:.2} files={}",
        outcome.patch_id, outcome.status, outcome.pre_toxicity, outcome.post_toxicity, targets
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolve_core::OutcomeStatus;
    use uuid::Uuid;

    #[test]
    fn summary_lists_scores_and_targets() {
        let outcome = PatchOutcome {
            patch_id: Uuid::nil(),
            status: OutcomeStatus::RejectedByQuality,
            pre_toxicity: 2.1,
            post_toxicity: 10.6,
            target_files: vec!["a.py".to_string(), "b.py".to_string()],
            conflicts: Vec::new(),
        };
        let line = outcome_summary(&outcome);
        assert!(line.contains("status=rejected_by_quality"));
        assert!(line.contains("toxicity=2.10->10.60"));
        assert!(line.ends_with("files=a.py,b.py"));
    }

    #[test]
    fn summary_marks_empty_targets() {
        let outcome = PatchOutcome {
            patch_id: Uuid::nil(),
            status: OutcomeStatus::Applied,
            pre_toxicity: 0.0,
            post_toxicity: 0.0,
            target_files: Vec::new(),
            conflicts: Vec::new(),
        };
        assert!(outcome_summary(&outcome).ends_with("files=-"));
    }
}
