use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which mini-program product an operation targets. Every queue, status set
/// and record file is partitioned by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum MiniProgramType {
    #[serde(rename = "cloud-outpatient-mp")]
    CloudOutpatientMp,
    #[serde(rename = "cloud-mall-mp")]
    CloudMallMp,
}

impl MiniProgramType {
    pub const ALL: [MiniProgramType; 2] = [
        MiniProgramType::CloudOutpatientMp,
        MiniProgramType::CloudMallMp,
    ];

    /// Repository directory name under the workspace root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            MiniProgramType::CloudOutpatientMp => "cloud-outpatient-mp",
            MiniProgramType::CloudMallMp => "cloud-mall-mp",
        }
    }
}

impl fmt::Display for MiniProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum UploadMode {
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "pro")]
    Pro,
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::Test => "test",
            UploadMode::Pro => "pro",
        }
    }

    /// Operator slot on the third-party CI. Distinct slots keep a test and a
    /// production upload of the same project from colliding.
    pub fn robot(&self) -> u8 {
        match self {
            UploadMode::Pro => 1,
            UploadMode::Test => 2,
        }
    }
}

/// Status of a resident upload task. There is no stored "pending" state: a
/// project is pending exactly when its name sits in the wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum UploadStatus {
    #[serde(rename = "building")]
    Building,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "fail")]
    Fail,
}

/// One admitted upload attempt, resident in a type's active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub name: String,
    pub mode: UploadMode,
    pub status: UploadStatus,
}

/// Point-in-time view of one active task, as served to status clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StatusItem {
    pub name: String,
    pub status: UploadStatus,
}

/// Metadata for one buildable sub-project, re-read from disk on every list
/// request and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub project_path: PathBuf,
    pub name: String,
    pub org_name: String,
    pub version: String,
    pub appid: String,
    pub private_key_path: PathBuf,
    pub build_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum RecordStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "fail")]
    Fail,
}

/// Durable history entry for one terminal upload outcome. Immutable once
/// appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: u64,
    pub name: String,
    pub org_name: String,
    pub last_commit_user: String,
    pub commit: String,
    pub upload_time: String,
    pub mode: UploadMode,
    pub status: RecordStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "type")]
    pub mp_type: MiniProgramType,
    pub created_at: String,
}
