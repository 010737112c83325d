//! Shared fixtures for tests that need a real working tree.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(workspace: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()
        .context("git command failed")?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// A `git init`ed scratch directory, removed on drop.
pub struct TempRepo {
    dir: TempDir,
}

impl TempRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("evolve-repo-").tempdir()?;
        git(dir.path(), &["init", "--quiet"])?;
        git(dir.path(), &["config", "user.email", "evolve@example.test"])?;
        git(dir.path(), &["config", "user.name", "Evolve"])?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> Result<()> {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        fs::read_to_string(self.join(rel)).with_context(|| format!("read {rel}"))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.join(rel).exists()
    }

    /// Stage `rel` so patches that delete or rename it apply cleanly.
    pub fn track(&self, rel: &str) -> Result<()> {
        git(self.path(), &["add", rel]).map(|_| ())
    }

    pub fn git(&self, args: &[&str]) -> Result<String> {
        git(self.path(), args)
    }
}
