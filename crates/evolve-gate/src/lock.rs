use evolve_core::runtime_dir;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another evolution gate run holds {}; remove it if that run is gone", .0.display())]
    Held(PathBuf),
    #[error("failed to create lock file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive claim on a working tree for the duration of one gate run.
/// Released when dropped.
#[derive(Debug)]
pub struct TreeLock {
    path: PathBuf,
}

impl TreeLock {
    pub fn path_for(workspace: &Path) -> PathBuf {
        runtime_dir(workspace).join("gate.lock")
    }

    pub fn acquire(workspace: &Path) -> Result<Self, LockError> {
        Self::acquire_with(workspace, |file| writeln!(file, "{}", std::process::id()))
    }

    fn acquire_with(
        workspace: &Path,
        record_owner: impl FnOnce(&mut File) -> std::io::Result<()>,
    ) -> Result<Self, LockError> {
        let path = Self::path_for(workspace);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(LockError::Held(path));
            }
            Err(source) => return Err(LockError::Io { path, source }),
        };
        // Owned from here on, so an error below still removes the file.
        let lock = Self { path };
        record_owner(&mut file).map_err(|source| LockError::Io {
            path: lock.path.clone(),
            source,
        })?;
        Ok(lock)
    }
}

impl Drop for TreeLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
