use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::language::Language;
use crate::limits::{RunLimits, RunLimitsOverride};

/// Hard cap on the submitted code body.
pub const MAX_CODE_BYTES: usize = 200 * 1024;

/// Largest single staged input file.
pub const MAX_STAGED_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Cumulative staging budget per run.
pub const MAX_STAGED_TOTAL_BYTES: u64 = 25 * 1024 * 1024;

/// A validated run submission as accepted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub language: Language,
    pub code: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileStaging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<RunLimitsOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// One uploaded file to place under the sandbox input directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStaging {
    pub id: String,
    pub path: String,
}

/// Externally visible outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Timeout,
    Oom,
    Killed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Oom => "oom",
            Self::Killed => "killed",
        }
    }
}

/// Observed resource usage for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub wall_ms: u64,
    pub cpu_ms: u64,
    pub peak_rss_mib: u64,
}

/// Sidecar metadata for a stored file (upload or artifact). This is the
/// exact JSON persisted next to the payload, and the upload API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub sha256: String,
    pub content_type: String,
}

/// A produced file that was moved into the artifact store, reachable only
/// through its signed URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub size: u64,
    pub sha256: String,
    pub url: String,
    pub expires_at: i64,
    pub content_type: String,
}

/// The record returned to the caller and stored by run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub usage: UsageRecord,
    pub artifacts: Vec<ArtifactDescriptor>,
    pub limits: RunLimits,
    pub created_at: i64,
    pub language: Language,
    pub code_sha256: String,
}
