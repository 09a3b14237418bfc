//! Per-job temporary working directory, mode 0700, removed on every exit
//! path (§4.6 step 1 / step 11).

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct WorkingDir {
    path: PathBuf,
}

impl WorkingDir {
    /// Create a fresh per-job directory under the system temp root, named
    /// after the given id (an asset id for Machinist, a freshly generated
    /// id for a jobgroup submission) for easy correlation in logs.
    pub fn create(id: Uuid) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("archival-job-{}", id));
        std::fs::create_dir_all(&path).map_err(Error::Io)?;
        set_private_mode(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let target = self.path.join(name);
        std::fs::write(&target, data).map_err(Error::Io)?;
        Ok(target)
    }

    /// Remove the directory and everything under it. Safe to call even if
    /// the directory was already removed.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(unix)]
fn set_private_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(Error::Io)
}

#[cfg(not(unix))]
fn set_private_mode(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_remove_round_trip() {
        let dir = WorkingDir::create(Uuid::new_v4()).unwrap();
        assert!(dir.path().exists());
        dir.write_file("hello.txt", b"hi").unwrap();
        assert!(dir.path().join("hello.txt").exists());
        dir.remove().unwrap();
        assert!(!dir.path().exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = WorkingDir::create(Uuid::new_v4()).unwrap();
        dir.remove().unwrap();
        dir.remove().unwrap();
    }
}
