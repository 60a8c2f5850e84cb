//! Staged directory driver using std::fs.
//!
//! Files are written into a hidden sibling staging directory and the whole
//! directory is renamed into place on commit, so a failed run never leaves a
//! partially populated output directory behind.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use kubegen_core::application::{ApplicationError, OutputDriver};
use kubegen_core::domain::{FileId, FileKind, Location};
use kubegen_core::error::{KubegenError, KubegenResult};

/// Production driver: one directory, published atomically.
#[derive(Debug, Clone)]
pub struct DirectoryDriver {
    target: PathBuf,
    staging: PathBuf,
}

impl DirectoryDriver {
    /// Publish into `target`, which must not exist yet.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".into());
        let staging = target
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!(".{name}.staging-{}", Uuid::new_v4().simple()));

        Self { target, staging }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    fn staged_path(&self, location: &Location) -> KubegenResult<PathBuf> {
        let relative = Path::new(location.as_str())
            .strip_prefix(&self.target)
            .map_err(|_| {
                ApplicationError::driver(location.as_str(), "location is outside the output directory")
            })?;
        Ok(self.staging.join(relative))
    }
}

impl OutputDriver for DirectoryDriver {
    fn choose_location(&self, id: FileId, kind: FileKind, file_name: &str) -> KubegenResult<Location> {
        let mut components = Path::new(file_name).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(std::path::Component::Normal(_)), None)
        );
        if !plain {
            return Err(ApplicationError::driver(file_name, "file names must not contain directories").into());
        }

        let path = self.target.join(file_name);
        debug!(%id, %kind, path = %path.display(), "Location chosen");
        Ok(Location::new(path.to_string_lossy().into_owned()))
    }

    fn write(&self, location: &Location, contents: &[u8], executable: bool) -> KubegenResult<()> {
        let path = self.staged_path(location)?;
        std::fs::create_dir_all(&self.staging).map_err(|e| map_io_error(&self.staging, e, "create directory"))?;
        std::fs::write(&path, contents).map_err(|e| map_io_error(&path, e, "write file"))?;
        if executable {
            set_executable(&path)?;
        }
        Ok(())
    }

    fn commit(&self) -> KubegenResult<()> {
        if self.target.exists() {
            return Err(ApplicationError::OutputExists {
                location: self.target.display().to_string(),
            }
            .into());
        }
        if let Some(parent) = self.target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| map_io_error(parent, e, "create directory"))?;
        }
        if !self.staging.exists() {
            std::fs::create_dir_all(&self.staging)
                .map_err(|e| map_io_error(&self.staging, e, "create directory"))?;
        }

        std::fs::rename(&self.staging, &self.target).map_err(|e| map_io_error(&self.target, e, "publish directory"))?;
        info!(path = %self.target.display(), "Output directory published");
        Ok(())
    }

    fn rollback(&self) -> KubegenResult<()> {
        if !self.staging.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(&self.staging).map_err(|e| {
            ApplicationError::RollbackFailed {
                reason: format!("{}: {}", self.staging.display(), e),
            }
            .into()
        })
    }
}

fn set_executable(path: &Path) -> KubegenResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).map_err(|e| map_io_error(path, e, "get metadata"))?;
        let mut perms = metadata.permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms).map_err(|e| map_io_error(path, e, "set permissions"))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

fn map_io_error(path: &Path, e: io::Error, operation: &str) -> KubegenError {
    ApplicationError::driver(path.display().to_string(), format!("Failed to {}: {}", operation, e)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegen_core::domain::{DocumentFile, OutputProject};
    use tempfile::TempDir;

    fn some_id() -> FileId {
        OutputProject::new().append(DocumentFile::new("x"))
    }

    fn location(driver: &DirectoryDriver, name: &str) -> Location {
        driver.choose_location(some_id(), FileKind::Documents, name).unwrap()
    }

    #[test]
    fn nothing_is_visible_before_commit() {
        let tmp = TempDir::new().unwrap();
        let driver = DirectoryDriver::new(tmp.path().join("k3d-out"));

        let loc = location(&driver, "namespace.yaml");
        driver.write(&loc, b"kind: Namespace\n", false).unwrap();
        assert!(!driver.target().exists());
        assert!(driver.staging().join("namespace.yaml").exists());

        driver.commit().unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("k3d-out/namespace.yaml")).unwrap(),
            "kind: Namespace\n"
        );
        assert!(!driver.staging().exists());
    }

    #[test]
    fn rollback_discards_staging() {
        let tmp = TempDir::new().unwrap();
        let driver = DirectoryDriver::new(tmp.path().join("out"));
        let loc = location(&driver, "a.yaml");
        driver.write(&loc, b"a", false).unwrap();

        driver.rollback().unwrap();
        assert!(!driver.staging().exists());
        assert!(!driver.target().exists());
        driver.rollback().unwrap();
    }

    #[test]
    fn existing_target_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("out")).unwrap();
        let driver = DirectoryDriver::new(tmp.path().join("out"));
        let loc = location(&driver, "a.yaml");
        driver.write(&loc, b"a", false).unwrap();

        let err = driver.commit().unwrap_err();
        assert!(matches!(
            err,
            KubegenError::Application(ApplicationError::OutputExists { .. })
        ));
    }

    #[test]
    fn nested_file_names_are_rejected() {
        let driver = DirectoryDriver::new("out");
        assert!(
            driver
                .choose_location(some_id(), FileKind::Script, "../escape.sh")
                .is_err()
        );
    }

    #[cfg(unix)]
    #[test]
    fn scripts_are_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let driver = DirectoryDriver::new(tmp.path().join("out"));
        let loc = location(&driver, "create.sh");
        driver.write(&loc, b"#!/bin/bash\n", true).unwrap();
        driver.commit().unwrap();

        let mode = std::fs::metadata(tmp.path().join("out/create.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_ne!(mode & 0o111, 0);
    }
}
