//! Stream driver: prints every file to a writer on commit.

use std::io::Write;
use std::sync::Mutex;

use kubegen_core::application::{ApplicationError, OutputDriver};
use kubegen_core::domain::{FileId, FileKind, Location};
use kubegen_core::error::KubegenResult;

/// Buffers writes and emits them, each under a `# Source:` banner, only when
/// the run commits.
pub struct StreamDriver {
    sink: Mutex<Box<dyn Write + Send>>,
    staged: Mutex<Vec<(Location, Vec<u8>)>>,
}

impl StreamDriver {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
            staged: Mutex::new(Vec::new()),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl std::fmt::Debug for StreamDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDriver").finish_non_exhaustive()
    }
}

impl OutputDriver for StreamDriver {
    fn choose_location(&self, _id: FileId, _kind: FileKind, file_name: &str) -> KubegenResult<Location> {
        Ok(Location::new(file_name))
    }

    fn write(&self, location: &Location, contents: &[u8], _executable: bool) -> KubegenResult<()> {
        self.staged
            .lock()
            .map_err(|_| ApplicationError::DriverLockError)?
            .push((location.clone(), contents.to_vec()));
        Ok(())
    }

    fn commit(&self) -> KubegenResult<()> {
        let staged = std::mem::take(&mut *self.staged.lock().map_err(|_| ApplicationError::DriverLockError)?);
        let mut sink = self.sink.lock().map_err(|_| ApplicationError::DriverLockError)?;

        for (location, contents) in staged {
            let emit = |sink: &mut Box<dyn Write + Send>| -> std::io::Result<()> {
                writeln!(sink, "# Source: {location}")?;
                sink.write_all(&contents)?;
                if !contents.ends_with(b"\n") {
                    writeln!(sink)?;
                }
                Ok(())
            };
            emit(&mut *sink).map_err(|e| ApplicationError::driver(location.as_str(), e))?;
        }
        sink.flush()
            .map_err(|e| ApplicationError::driver("<stream>", e))?;
        Ok(())
    }

    fn rollback(&self) -> KubegenResult<()> {
        self.staged
            .lock()
            .map_err(|_| ApplicationError::DriverLockError)?
            .clear();
        Ok(())
    }
}
