use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Pre-change state of a set of workspace-relative files.
///
/// A `None` entry records that the file did not exist. Restoring writes back
/// every recorded byte and deletes every file recorded absent, along with any
/// directories the change created for it. Nothing outside the recorded paths
/// is touched, and restoring twice leaves the same state as restoring once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    root: PathBuf,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    path: String,
    content: Option<Vec<u8>>,
    // Ancestors that did not exist at capture, deepest first.
    missing_dirs: Vec<PathBuf>,
}

impl FileSnapshot {
    pub fn capture(root: &Path, paths: &[String]) -> Result<Self> {
        let mut entries = Vec::with_capacity(paths.len());
        for rel in paths {
            let full = root.join(rel);
            let content = match fs::read(&full) {
                Ok(bytes) => Some(bytes),
                Err(err) if err.kind() == ErrorKind::NotFound => None,
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to snapshot {rel}"));
                }
            };
            let missing_dirs = if content.is_none() {
                missing_ancestors(root, &full)
            } else {
                Vec::new()
            };
            entries.push(Entry {
                path: rel.clone(),
                content,
                missing_dirs,
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn restore(&self) -> Result<()> {
        for entry in &self.entries {
            let full = self.root.join(&entry.path);
            match &entry.content {
                Some(bytes) => {
                    if let Some(parent) = full.parent() {
                        fs::create_dir_all(parent).with_context(|| {
                            format!("failed to recreate parent of {}", entry.path)
                        })?;
                    }
                    fs::write(&full, bytes)
                        .with_context(|| format!("failed to restore {}", entry.path))?;
                }
                None => {
                    match fs::remove_file(&full) {
                        Ok(()) => {}
                        Err(err) if err.kind() == ErrorKind::NotFound => {}
                        Err(err) => {
                            return Err(err)
                                .with_context(|| format!("failed to remove {}", entry.path));
                        }
                    }
                    for dir in &entry.missing_dirs {
                        remove_if_empty(dir)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Recorded content of `path`: `Some(None)` when it was absent, `None`
    /// when the path is not part of the snapshot.
    pub fn content(&self, path: &str) -> Option<Option<&[u8]>> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.content.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn missing_ancestors(root: &Path, file: &Path) -> Vec<PathBuf> {
    file.ancestors()
        .skip(1)
        .take_while(|dir| *dir != root && dir.starts_with(root))
        .filter(|dir| !dir.exists())
        .map(Path::to_path_buf)
        .collect()
}

fn remove_if_empty(dir: &Path) -> Result<()> {
    let is_empty = match fs::read_dir(dir) {
        Ok(mut it) => it.next().is_none(),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to inspect {}", dir.display()));
        }
    };
    if is_empty {
        fs::remove_dir(dir).with_context(|| format!("failed to remove {}", dir.display()))?;
    }
    Ok(())
}
