//! Job data model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque identifier of a submitted remote job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wrap a raw handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The raw handle
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of the usable output of a succeeded job
///
/// For a fine-tuning job this is the trained model name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultIdentifier(String);

impl ResultIdentifier {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw identifier
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResultIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a remote job, as reported by one status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted but not started
    Pending,
    /// In progress
    Running,
    /// Finished; carries the usable result
    Succeeded(ResultIdentifier),
    /// Finished without a result
    Failed,
    /// The service does not know the job or reported something unrecognised
    Unknown,
}

impl JobStatus {
    /// Short lowercase label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded(_) => "succeeded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Payload submitted to start a job, e.g. a JSONL training file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    name: String,
}

impl Artifact {
    /// Artifact backed by a file; its name is the file name
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }

    /// Override the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Location of the payload
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name used in logs and as the default store key
    pub fn name(&self) -> &str {
        &self.name
    }
}
