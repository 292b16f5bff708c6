use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Handle to something a step produced: a dataset known to the geoprocessing
/// backend, or a plain file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRef {
    Dataset(String),
    File(PathBuf),
}

impl ArtifactRef {
    pub fn dataset<S: Into<String>>(name: S) -> Self {
        Self::Dataset(name.into())
    }

    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Dataset name, if this is a dataset
    pub fn as_dataset(&self) -> Option<&str> {
        match self {
            Self::Dataset(name) => Some(name),
            Self::File(_) => None,
        }
    }

    /// File path, if this is a file
    pub fn as_file(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Dataset(_) => None,
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataset(name) => write!(f, "dataset '{name}'"),
            Self::File(path) => write!(f, "file '{}'", path.display()),
        }
    }
}

/// What a completed step hands to later steps of the same item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Artifacts created or modified by the step, primary artifact first
    pub artifacts: Vec<ArtifactRef>,
    /// Derived values (descriptions, totals) for later steps and the report
    pub data: serde_json::Value,
}

impl StepOutput {
    pub fn artifact(artifact: ArtifactRef) -> Self {
        Self {
            artifacts: vec![artifact],
            data: serde_json::Value::Null,
        }
    }

    pub fn data(data: serde_json::Value) -> Self {
        Self {
            artifacts: Vec::new(),
            data,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// First declared artifact
    pub fn primary(&self) -> Option<&ArtifactRef> {
        self.artifacts.first()
    }

    /// String value stored under `key` in the step's data
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|value| value.as_str())
    }
}
