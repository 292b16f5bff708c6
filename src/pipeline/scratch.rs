//! Scoped cleanup of intermediate artifacts.

use crate::backend::{FileSystemBackend, GeoprocessingBackend};
use crate::models::ArtifactRef;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Intermediate artifacts to delete when their scope (one item, or the whole
/// run) ends, whether it succeeded or failed.
#[derive(Debug)]
pub struct ScratchSpace {
    scope: String,
    artifacts: Mutex<Vec<ArtifactRef>>,
}

impl ScratchSpace {
    pub fn new<S: Into<String>>(scope: S) -> Self {
        Self {
            scope: scope.into(),
            artifacts: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, artifact: ArtifactRef) {
        debug!(scope = %self.scope, artifact = %artifact, "registered scratch artifact");
        self.artifacts.lock().push(artifact);
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }

    /// Delete everything registered, newest first. Failures are logged and
    /// skipped; returns how many artifacts were deleted.
    pub async fn cleanup(&self, geo: &dyn GeoprocessingBackend, fs: &dyn FileSystemBackend) -> usize {
        let artifacts: Vec<ArtifactRef> = std::mem::take(&mut *self.artifacts.lock());
        let mut deleted = 0;

        for artifact in artifacts.into_iter().rev() {
            let result = match &artifact {
                ArtifactRef::Dataset(name) => geo.delete(name).await,
                ArtifactRef::File(path) => fs.remove_file(path).await,
            };
            match result {
                Ok(()) => deleted += 1,
                Err(e) => warn!(
                    scope = %self.scope,
                    artifact = %artifact,
                    error = %e,
                    "Unable to delete intermediate data"
                ),
            }
        }
        deleted
    }
}

/// A unique dataset name `<prefix>_<8 hex chars>` inside `workspace`
pub fn scratch_name(prefix: &str, workspace: &Path) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    workspace
        .join(format!("{prefix}_{}", &suffix[..8]))
        .to_string_lossy()
        .into_owned()
}
