//! In-memory output driver for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use kubegen_core::application::{ApplicationError, OutputDriver};
use kubegen_core::domain::{FileId, FileKind, Location};
use kubegen_core::error::KubegenResult;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    contents: String,
    executable: bool,
}

#[derive(Debug, Default)]
struct MemoryDriverInner {
    staged: BTreeMap<Location, Entry>,
    published: BTreeMap<Location, Entry>,
    order: Vec<Location>,
    commits: usize,
    rollbacks: usize,
}

/// Keeps staged and published files apart, so tests can observe that
/// nothing becomes visible before commit.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    prefix: String,
    fail_on: Option<String>,
    inner: Arc<RwLock<MemoryDriverInner>>,
}

impl MemoryDriver {
    /// Locations are `prefix/file_name`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fail_on: None,
            inner: Arc::new(RwLock::new(MemoryDriverInner::default())),
        }
    }

    /// Fail every write whose file name is `file_name`.
    pub fn failing_on(mut self, file_name: impl Into<String>) -> Self {
        self.fail_on = Some(file_name.into());
        self
    }

    /// Published contents at `location` (testing helper).
    pub fn read(&self, location: &str) -> Option<String> {
        let inner = self.inner.read().ok()?;
        inner
            .published
            .get(&Location::from(location))
            .map(|e| e.contents.clone())
    }

    pub fn is_executable(&self, location: &str) -> bool {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .published
                    .get(&Location::from(location))
                    .is_some_and(|e| e.executable)
            })
            .unwrap_or(false)
    }

    /// Published locations in write order.
    pub fn published(&self) -> Vec<Location> {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .order
                    .iter()
                    .filter(|l| inner.published.contains_key(l))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn staged_count(&self) -> usize {
        self.inner.read().map(|i| i.staged.len()).unwrap_or(0)
    }

    pub fn commits(&self) -> usize {
        self.inner.read().map(|i| i.commits).unwrap_or(0)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.read().map(|i| i.rollbacks).unwrap_or(0)
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl OutputDriver for MemoryDriver {
    fn choose_location(&self, _id: FileId, _kind: FileKind, file_name: &str) -> KubegenResult<Location> {
        Ok(Location::new(format!("{}/{}", self.prefix, file_name)))
    }

    fn write(&self, location: &Location, contents: &[u8], executable: bool) -> KubegenResult<()> {
        if let Some(name) = &self.fail_on {
            if location.as_str().rsplit('/').next() == Some(name.as_str()) {
                return Err(ApplicationError::driver(location.as_str(), "injected failure").into());
            }
        }

        let contents = String::from_utf8(contents.to_vec())
            .map_err(|e| ApplicationError::driver(location.as_str(), e))?;
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ApplicationError::DriverLockError)?;
        inner.order.push(location.clone());
        inner.staged.insert(location.clone(), Entry { contents, executable });
        Ok(())
    }

    fn commit(&self) -> KubegenResult<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ApplicationError::DriverLockError)?;
        let staged = std::mem::take(&mut inner.staged);
        inner.published.extend(staged);
        inner.commits += 1;
        Ok(())
    }

    fn rollback(&self) -> KubegenResult<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ApplicationError::DriverLockError)?;
        let staged = std::mem::take(&mut inner.staged);
        inner.order.retain(|l| !staged.contains_key(l));
        inner.rollbacks += 1;
        Ok(())
    }
}
