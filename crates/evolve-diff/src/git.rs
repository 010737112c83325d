use anyhow::{Context, Result};
use evolve_core::GitConfig;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Result of one check-then-apply attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyReport {
    pub applied: bool,
    /// Diagnostic lines the tool wrote to stderr when it refused the patch.
    pub conflicts: Vec<String>,
}

impl ApplyReport {
    fn rejected(stderr: &str) -> Self {
        Self {
            applied: false,
            conflicts: stderr.lines().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitApplier {
    program: String,
    timeout: Option<Duration>,
    scratch_dir: Option<PathBuf>,
}

struct StepOutput {
    success: bool,
    stderr: String,
}

impl GitApplier {
    pub fn new(cfg: &GitConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            timeout: cfg.timeout_seconds.map(|s| Duration::from_secs(s.max(1))),
            scratch_dir: None,
        }
    }

    /// Stage temporary patch files in `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Validate `patch` with `apply --check` and, only if that passes, apply
    /// it to the working tree rooted at `workspace`.
    ///
    /// The patch is staged in a private temporary file that is removed on
    /// every exit path. A failed check never touches tracked files.
    pub fn apply(&self, workspace: &Path, patch: &str) -> Result<ApplyReport> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("evolve-").suffix(".patch");
        let mut file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("failed to create temporary patch file")?;
        file.write_all(patch.as_bytes())
            .and_then(|_| file.flush())
            .context("failed to write temporary patch file")?;

        let check = self.run_step(workspace, &["apply", "--check"], file.path())?;
        if !check.success {
            warn!(stderr = %check.stderr.trim_end(), "patch is not valid");
            return Ok(ApplyReport::rejected(&check.stderr));
        }

        let applied = self.run_step(workspace, &["apply"], file.path())?;
        if !applied.success {
            warn!(stderr = %applied.stderr.trim_end(), "failed to apply patch");
            return Ok(ApplyReport::rejected(&applied.stderr));
        }

        debug!(patch_file = %file.path().display(), "patch applied");
        Ok(ApplyReport {
            applied: true,
            conflicts: Vec::new(),
        })
    }

    fn run_step(&self, workspace: &Path, args: &[&str], patch_file: &Path) -> Result<StepOutput> {
        let mut child = Command::new(&self.program)
            .args(args)
            .arg(patch_file)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute {} {}", self.program, args.join(" ")))?;

        // Drained concurrently so a full pipe cannot stall the tool while we wait.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout)? {
                Some(status) => Some(status),
                None => {
                    child.kill()?;
                    child.wait()?;
                    None
                }
            },
            None => Some(child.wait()?),
        };

        let stderr_bytes = stderr_reader
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default();
        let mut stderr = String::from_utf8_lossy(&stderr_bytes).to_string();

        let Some(status) = status else {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "{} {} timed out after {}s",
                self.program,
                args.join(" "),
                self.timeout.map(|t| t.as_secs()).unwrap_or_default()
            ));
            return Ok(StepOutput {
                success: false,
                stderr,
            });
        };

        Ok(StepOutput {
            success: status.success(),
            stderr,
        })
    }
}
