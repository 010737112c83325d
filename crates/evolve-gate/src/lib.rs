//! The evolution gate: apply a proposed patch, measure whether the touched
//! code got more toxic, and keep or roll back the change accordingly.
//!
//! One run is strictly sequential:
//!
//! 1. derive the target files from the patch (or take the explicit path);
//! 2. snapshot them and score the pre-change state;
//! 3. apply with the selected strategy, restoring the snapshot on failure;
//! 4. re-score the same files;
//! 5. accept when `post <= pre`, otherwise restore the snapshot;
//! 6. return the [`PatchOutcome`].
//!
//! Runs against the same tree are serialized by a [`TreeLock`]. Once
//! application has started the run always reaches a terminal state (full
//! acceptance or full restoration) before returning.

mod lock;
mod snapshot;

pub use lock::{LockError, TreeLock};
pub use snapshot::FileSnapshot;

use anyhow::{Context, Result};
use evolve_core::{AppConfig, ApplyStrategy, OutcomeStatus, PatchOutcome, PatchRequest};
use evolve_diff::{ApplyReport, GitApplier, apply_search_replace, target_files, touched_files};
use evolve_toxicity::ToxicityScorer;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

pub struct EvolutionGate {
    workspace: PathBuf,
    scorer: ToxicityScorer,
    git: GitApplier,
}

impl EvolutionGate {
    pub fn new(workspace: &Path, cfg: &AppConfig) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            scorer: ToxicityScorer::new(cfg.scoring.clone()),
            git: GitApplier::new(&cfg.git),
        }
    }

    pub fn with_git_applier(mut self, git: GitApplier) -> Self {
        self.git = git;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn run(&self, request: &PatchRequest, strategy: &ApplyStrategy) -> Result<PatchOutcome> {
        let _span = info_span!("gate", patch_id = %request.id).entered();
        let _lock = TreeLock::acquire(&self.workspace)?;

        let (targets, touched) = match strategy {
            ApplyStrategy::GitApply => (
                target_files(&request.raw_content),
                touched_files(&request.raw_content),
            ),
            ApplyStrategy::SearchReplace { path } => (vec![path.clone()], vec![path.clone()]),
        };
        info!(
            bytes = request.raw_content.len(),
            targets = ?targets,
            "received patch"
        );

        let snapshot = FileSnapshot::capture(&self.workspace, &touched)?;
        let pre_toxicity = self.snapshot_score(&snapshot, &targets);
        info!(pre_toxicity, "pre-patch toxicity");

        let report = match self.apply(request, strategy) {
            Ok(report) => report,
            Err(err) => {
                snapshot
                    .restore()
                    .with_context(|| format!("rollback after failed apply ({err:#})"))?;
                return Err(err);
            }
        };

        if !report.applied {
            warn!(conflicts = report.conflicts.len(), "applier rejected patch; rolling back");
            snapshot.restore().context("rollback after applier rejection")?;
            return Ok(PatchOutcome {
                patch_id: request.id,
                status: OutcomeStatus::RejectedByApplier,
                pre_toxicity,
                post_toxicity: pre_toxicity,
                target_files: targets,
                conflicts: report.conflicts,
            });
        }

        let post_toxicity = match self.disk_score(&targets) {
            Ok(score) => score,
            Err(err) => {
                snapshot
                    .restore()
                    .with_context(|| format!("rollback after failed re-score ({err:#})"))?;
                return Err(err);
            }
        };
        info!(post_toxicity, "post-patch toxicity");

        let status = if post_toxicity <= pre_toxicity {
            info!("toxicity did not increase; keeping patch");
            OutcomeStatus::Applied
        } else {
            warn!(
                delta = post_toxicity - pre_toxicity,
                "toxicity increased; rolling back"
            );
            snapshot.restore().context("rollback after quality regression")?;
            OutcomeStatus::RejectedByQuality
        };

        Ok(PatchOutcome {
            patch_id: request.id,
            status,
            pre_toxicity,
            post_toxicity,
            target_files: targets,
            conflicts: Vec::new(),
        })
    }

    fn apply(&self, request: &PatchRequest, strategy: &ApplyStrategy) -> Result<ApplyReport> {
        match strategy {
            ApplyStrategy::GitApply => self.git.apply(&self.workspace, &request.raw_content),
            ApplyStrategy::SearchReplace { path } => {
                let applied =
                    apply_search_replace(&self.workspace.join(path), &request.raw_content)?;
                let conflicts = if applied {
                    Vec::new()
                } else {
                    vec![format!("search/replace block does not apply to {path}")]
                };
                Ok(ApplyReport { applied, conflicts })
            }
        }
    }

    // Absent files contribute nothing.
    fn snapshot_score(&self, snapshot: &FileSnapshot, targets: &[String]) -> f64 {
        targets
            .iter()
            .filter_map(|path| snapshot.content(path).flatten())
            .map(|bytes| self.scorer.score(&String::from_utf8_lossy(bytes)))
            .sum()
    }

    fn disk_score(&self, targets: &[String]) -> Result<f64> {
        let mut total = 0.0;
        for path in targets {
            if let Some(score) = self
                .scorer
                .score_file(&self.workspace.join(path))
                .with_context(|| format!("failed to read {path} for scoring"))?
            {
                total += score;
            }
        }
        Ok(total)
    }
}
