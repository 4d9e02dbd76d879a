//! Wire types exchanged with the remote code-generation service

use serde::{Deserialize, Serialize};

/// A file produced by a completed code-generation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    pub file_path: String,
    pub file_content: String,
}

impl GeneratedFile {
    #[must_use]
    pub fn new(file_path: impl Into<String>, file_content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_content: file_content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadUrlRequest {
    pub content_checksum_sha256: String,
}

/// Presigned destination for a workspace snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadUrlResponse {
    pub upload_url: String,
    pub upload_id: String,
    #[serde(default)]
    pub kms_key_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePlanRequest {
    pub upload_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePlanResponse {
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCodeGenerationRequest {
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCodeGenerationResponse {
    pub code_generation_id: String,
}

/// Raw status of a code-generation job as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeGenerationStatus {
    pub status: String,
}

impl CodeGenerationStatus {
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }

    #[must_use]
    pub fn job_status(&self) -> JobStatus {
        JobStatus::parse(&self.status)
    }
}

/// Result archive of a completed job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedArchive {
    pub new_file_contents: Vec<GeneratedFile>,
    #[serde(default)]
    pub deleted_files: Vec<String>,
}

/// Job status values the polling loop knows how to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Complete,
    InProgress,
    PredictReady,
    PredictFailed,
    DebateFailed,
    Failed,
    /// Anything else the service reports; kept verbatim for diagnostics
    Unknown(String),
}

impl JobStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Complete" => Self::Complete,
            "InProgress" => Self::InProgress,
            "predict-ready" => Self::PredictReady,
            "predict-failed" => Self::PredictFailed,
            "debate-failed" => Self::DebateFailed,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Job is still running and should be polled again
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::InProgress | Self::PredictReady)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::PredictFailed | Self::DebateFailed)
    }
}
