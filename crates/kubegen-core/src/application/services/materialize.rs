//! Materialization - turn an assembled project into published files.
//!
//! Three phases, none of which starts before the previous one finished:
//! 1. Ask the driver for every file's location, in append order
//! 2. Render every file (serialize documents, resolve script templates)
//! 3. Write every file, then commit
//!
//! Any failure rolls the driver back, so either every file is published or
//! none is.

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use crate::application::ApplicationError;
use crate::application::ports::{DocumentSerializer, OutputDriver};
use crate::domain::{FileId, FileKind, Location, LocationMap, OutputFile, OutputProject};
use crate::error::KubegenResult;

/// A file as it was handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub id: FileId,
    pub name: String,
    pub kind: FileKind,
    pub location: Location,
    pub size: usize,
}

struct Rendered {
    id: FileId,
    name: String,
    kind: FileKind,
    location: Location,
    contents: String,
}

impl OutputProject {
    /// Place, render and publish every file through `driver`.
    #[instrument(skip_all, fields(files = self.len()))]
    pub fn materialize(
        &self,
        driver: &dyn OutputDriver,
        serializer: &dyn DocumentSerializer,
    ) -> KubegenResult<Vec<WrittenFile>> {
        match self.stage(driver, serializer) {
            Ok(written) => {
                info!(files = written.len(), "Output published");
                Ok(written)
            }
            Err(e) => {
                warn!(error = %e, "Materialization failed, rolling back");
                if let Err(rollback) = driver.rollback() {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Render every file without a driver, using `locations` for templates.
    /// Used by dry runs.
    pub fn render_with(
        &self,
        locations: &LocationMap,
        serializer: &dyn DocumentSerializer,
    ) -> KubegenResult<Vec<(FileId, String)>> {
        self.validate_references()?;
        self.files()
            .map(|(id, file)| render(id, file, locations, serializer).map(|text| (id, text)))
            .collect()
    }

    fn stage(
        &self,
        driver: &dyn OutputDriver,
        serializer: &dyn DocumentSerializer,
    ) -> KubegenResult<Vec<WrittenFile>> {
        self.validate_references()?;

        // Phase 1: placement
        let mut locations = LocationMap::new();
        let mut owners: BTreeMap<Location, FileId> = BTreeMap::new();
        for (id, file) in self.files() {
            let location = driver.choose_location(id, file.kind(), file.name())?;
            if let Some(first) = owners.insert(location.clone(), id) {
                return Err(ApplicationError::LocationConflict {
                    location: location.to_string(),
                    first,
                    second: id,
                }
                .into());
            }
            locations.insert(id, location);
        }

        // Phase 2: rendering
        let rendered = self
            .files()
            .map(|(id, file)| -> KubegenResult<Rendered> {
                Ok(Rendered {
                    id,
                    name: file.name().to_string(),
                    kind: file.kind(),
                    location: locations[&id].clone(),
                    contents: render(id, file, &locations, serializer)?,
                })
            })
            .collect::<KubegenResult<Vec<_>>>()?;

        // Phase 3: writing
        let mut written = Vec::with_capacity(rendered.len());
        for file in rendered {
            let executable = file.kind == FileKind::Script;
            driver.write(&file.location, file.contents.as_bytes(), executable)?;
            info!(id = %file.id, location = %file.location, "File staged");
            written.push(WrittenFile {
                id: file.id,
                name: file.name,
                kind: file.kind,
                location: file.location,
                size: file.contents.len(),
            });
        }

        driver.commit()?;
        Ok(written)
    }
}

fn render(
    id: FileId,
    file: &OutputFile,
    locations: &LocationMap,
    serializer: &dyn DocumentSerializer,
) -> KubegenResult<String> {
    match file {
        OutputFile::Documents(documents) => serializer.serialize(documents.objects()),
        OutputFile::Script(script) => Ok(script.render(id, locations)?),
    }
}
