//! Run-wide bookkeeping of produced outputs.

use crate::backend::{FileSystemBackend, GeoprocessingBackend};
use crate::error::{BackendError, BackendResult};
use crate::models::ArtifactRef;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Which item produced which output in the current run.
///
/// Claiming an output enforces two rules before a step writes it: no two
/// items in one run may produce the same artifact, and an artifact that
/// already exists is only replaced when overwrite is enabled.
#[derive(Debug, Default)]
pub struct OutputClaims {
    owners: HashMap<ArtifactRef, String>,
}

impl OutputClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owner_of(&self, artifact: &ArtifactRef) -> Option<&str> {
        self.owners.get(artifact).map(String::as_str)
    }

    fn reserve(&mut self, artifact: &ArtifactRef, owner: &str) -> BackendResult<bool> {
        match self.owners.get(artifact) {
            Some(existing) if existing != owner => Err(BackendError::OutputCollision {
                artifact: artifact.to_string(),
                claimed_by: existing.clone(),
            }),
            Some(_) => Ok(false),
            None => {
                self.owners.insert(artifact.clone(), owner.to_string());
                Ok(true)
            }
        }
    }

    /// Claim a dataset output for `owner`, deleting a pre-existing copy when
    /// overwrite is enabled.
    pub async fn claim_dataset(
        &mut self,
        geo: &dyn GeoprocessingBackend,
        overwrite: bool,
        owner: &str,
        location: String,
    ) -> BackendResult<ArtifactRef> {
        let artifact = ArtifactRef::Dataset(location);
        let first_claim = self.reserve(&artifact, owner)?;
        let name = artifact.as_dataset().unwrap_or_default();

        if first_claim && geo.exists(name).await? {
            if !overwrite {
                self.owners.remove(&artifact);
                return Err(BackendError::AlreadyExists(name.to_string()));
            }
            debug!(dataset = %name, "overwriting existing output");
            geo.delete(name).await?;
        }
        Ok(artifact)
    }

    /// Claim a file output for `owner`. Existing files are left for the
    /// write to replace when overwrite is enabled.
    pub async fn claim_file(
        &mut self,
        fs: &dyn FileSystemBackend,
        overwrite: bool,
        owner: &str,
        path: PathBuf,
    ) -> BackendResult<ArtifactRef> {
        let artifact = ArtifactRef::File(path);
        let first_claim = self.reserve(&artifact, owner)?;
        let path = artifact.as_file().map(PathBuf::from).unwrap_or_default();

        if first_claim && !overwrite && fs.exists(&path).await? {
            self.owners.remove(&artifact);
            return Err(BackendError::AlreadyExists(path.display().to_string()));
        }
        Ok(artifact)
    }
}
