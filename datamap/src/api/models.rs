//! Response models for the DataMap REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A file stored in a dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub storage_file_name: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

/// A named snapshot of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub name: String,
    pub design_state: String,
    pub is_enabled: bool,
    /// Files in this version. The version endpoint names the list `files_in`.
    #[serde(default, alias = "files_in")]
    pub files: Vec<DataFile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Version {
    /// Total size of all files in this version, in bytes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    /// Number of files in this version.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Find a file by id.
    pub fn file(&self, file_id: Uuid) -> Option<&DataFile> {
        self.files.iter().find(|f| f.id == file_id)
    }
}

/// A dataset and its versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    /// Free-form dataset description as published by the platform.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub tenancy: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub design_state: String,
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default)]
    pub current_version: Option<Version>,
}

impl Dataset {
    /// Look up a version by name.
    pub fn version_by_name(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Number of versions.
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Number of files across all versions.
    pub fn total_files(&self) -> usize {
        self.versions.iter().map(Version::file_count).sum()
    }
}

/// Presigned download location for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadUrl {
    pub url: String,
}

impl DownloadUrl {
    /// Whether the URL uses an HTTP(S) scheme.
    pub fn is_http(&self) -> bool {
        let lower = self.url.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

/// Envelope returned by the version endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionEnvelope {
    pub version: Version,
}
