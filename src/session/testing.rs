//! Mock implementations for testing
//!
//! These mocks enable exercising the state machine without real I/O.

use super::types::{PollingConfig, SessionStateConfig};
use crate::messenger::MessengerEvent;
use crate::remote::{
    CodeGenerationStatus, CreateUploadUrlResponse, ExportedArchive, GeneratedFile, RemoteError,
    StartCodeGenerationResponse,
};
use crate::traits::{CodeUploader, RemoteJobClient};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Zero-delay polling with the production iteration cap
pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        interval: Duration::ZERO,
        ..PollingConfig::default()
    }
}

pub fn state_config(
    client: Arc<MockJobClient>,
    uploader: Arc<MockUploader>,
    root: &Path,
) -> SessionStateConfig {
    SessionStateConfig::new("conv-1", root.to_path_buf(), client, uploader)
        .with_polling(fast_polling())
}

/// Collect every event the messenger has emitted so far
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<MessengerEvent>) -> Vec<MessengerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Mock Remote Job Client
// ============================================================================

/// A call recorded by `MockJobClient`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateConversation,
    CreateUploadUrl,
    GeneratePlan {
        upload_id: String,
        message: String,
    },
    StartCodeGeneration {
        upload_id: String,
        message: Option<String>,
    },
    GetCodeGeneration,
    ExportResultArchive,
}

/// Mock client that replays queued plans and statuses
pub struct MockJobClient {
    conversation_id: String,
    fixed_upload_id: Option<String>,
    kms_key_arn: Option<String>,
    upload_counter: Mutex<u32>,
    code_generation_counter: Mutex<u32>,
    plans: Mutex<VecDeque<Result<Option<String>, RemoteError>>>,
    statuses: Mutex<VecDeque<Result<CodeGenerationStatus, RemoteError>>>,
    default_status: Option<String>,
    start_errors: Mutex<VecDeque<RemoteError>>,
    archive: Mutex<ExportedArchive>,
    cancel_on_export: Mutex<Option<CancellationToken>>,
    /// Record of all calls made
    pub calls: Mutex<Vec<RemoteCall>>,
}

impl MockJobClient {
    pub fn new() -> Self {
        Self {
            conversation_id: "conv-1".to_string(),
            fixed_upload_id: None,
            kms_key_arn: None,
            upload_counter: Mutex::new(0),
            code_generation_counter: Mutex::new(0),
            plans: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            default_status: None,
            start_errors: Mutex::new(VecDeque::new()),
            archive: Mutex::new(ExportedArchive::default()),
            cancel_on_export: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_upload_id(mut self, upload_id: impl Into<String>) -> Self {
        self.fixed_upload_id = Some(upload_id.into());
        self
    }

    pub fn with_kms_key(mut self, arn: impl Into<String>) -> Self {
        self.kms_key_arn = Some(arn.into());
        self
    }

    pub fn with_statuses<'a>(self, statuses: impl IntoIterator<Item = &'a str>) -> Self {
        for status in statuses {
            self.queue_status(status);
        }
        self
    }

    /// Status reported once the queue is empty
    pub fn with_default_status(mut self, status: impl Into<String>) -> Self {
        self.default_status = Some(status.into());
        self
    }

    pub fn with_archive(self, files: Vec<GeneratedFile>) -> Self {
        self.archive.lock().unwrap().new_file_contents = files;
        self
    }

    pub fn with_deleted_files<'a>(self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.archive.lock().unwrap().deleted_files = paths.into_iter().map(String::from).collect();
        self
    }

    pub fn queue_plan(&self, plan: Option<&str>) {
        self.plans.lock().unwrap().push_back(Ok(plan.map(String::from)));
    }

    pub fn queue_plan_error(&self, error: RemoteError) {
        self.plans.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_status(&self, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Ok(CodeGenerationStatus::new(status)));
    }

    pub fn queue_status_error(&self, error: RemoteError) {
        self.statuses.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_start_error(&self, error: RemoteError) {
        self.start_errors.lock().unwrap().push_back(error);
    }

    /// Cancel `token` while the result archive is exported, after the job
    /// has already reported completion
    pub fn cancel_on_export(&self, token: CancellationToken) {
        *self.cancel_on_export.lock().unwrap() = Some(token);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &RemoteCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for MockJobClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteJobClient for MockJobClient {
    async fn create_conversation(&self) -> Result<String, RemoteError> {
        self.record(RemoteCall::CreateConversation);
        Ok(self.conversation_id.clone())
    }

    async fn create_upload_url(
        &self,
        _conversation_id: &str,
        _content_checksum: &str,
    ) -> Result<CreateUploadUrlResponse, RemoteError> {
        self.record(RemoteCall::CreateUploadUrl);
        let upload_id = self.fixed_upload_id.clone().unwrap_or_else(|| {
            let mut counter = self.upload_counter.lock().unwrap();
            *counter += 1;
            format!("upload-{counter}")
        });
        Ok(CreateUploadUrlResponse {
            upload_url: format!("https://upload.test/{upload_id}"),
            upload_id,
            kms_key_arn: self.kms_key_arn.clone(),
        })
    }

    async fn generate_plan(
        &self,
        _conversation_id: &str,
        upload_id: &str,
        message: &str,
    ) -> Result<Option<String>, RemoteError> {
        self.record(RemoteCall::GeneratePlan {
            upload_id: upload_id.to_string(),
            message: message.to_string(),
        });
        self.plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::network("No mock plan queued")))
    }

    async fn start_code_generation(
        &self,
        _conversation_id: &str,
        upload_id: &str,
        message: Option<&str>,
    ) -> Result<StartCodeGenerationResponse, RemoteError> {
        self.record(RemoteCall::StartCodeGeneration {
            upload_id: upload_id.to_string(),
            message: message.map(String::from),
        });
        if let Some(error) = self.start_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut counter = self.code_generation_counter.lock().unwrap();
        *counter += 1;
        Ok(StartCodeGenerationResponse {
            code_generation_id: format!("cg-{counter}"),
        })
    }

    async fn get_code_generation(
        &self,
        _conversation_id: &str,
        _code_generation_id: &str,
    ) -> Result<CodeGenerationStatus, RemoteError> {
        self.record(RemoteCall::GetCodeGeneration);
        let queued = self.statuses.lock().unwrap().pop_front();
        match (queued, &self.default_status) {
            (Some(result), _) => result,
            (None, Some(status)) => Ok(CodeGenerationStatus::new(status.clone())),
            (None, None) => Err(RemoteError::network("No mock status queued")),
        }
    }

    async fn export_result_archive(
        &self,
        _conversation_id: &str,
    ) -> Result<ExportedArchive, RemoteError> {
        self.record(RemoteCall::ExportResultArchive);
        if let Some(token) = self.cancel_on_export.lock().unwrap().take() {
            token.cancel();
        }
        Ok(self.archive.lock().unwrap().clone())
    }
}

// ============================================================================
// Mock Uploader
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub url: String,
    pub size: usize,
    pub content: Vec<u8>,
    pub checksum: String,
    pub kms_key_arn: Option<String>,
}

/// Uploader that records transfers instead of performing them
pub struct MockUploader {
    fail: bool,
    uploads: Mutex<Vec<RecordedUpload>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self {
            fail: false,
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Uploader whose every transfer fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Default for MockUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeUploader for MockUploader {
    async fn upload(
        &self,
        url: &str,
        content: Vec<u8>,
        checksum: &str,
        kms_key_arn: Option<&str>,
    ) -> Result<(), RemoteError> {
        if self.fail {
            return Err(RemoteError::network("connection reset"));
        }
        self.uploads.lock().unwrap().push(RecordedUpload {
            url: url.to_string(),
            size: content.len(),
            content,
            checksum: checksum.to_string(),
            kms_key_arn: kms_key_arn.map(String::from),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_replays_statuses_then_default() {
        let client = MockJobClient::new()
            .with_statuses(["InProgress"])
            .with_default_status("Complete");

        let first = client.get_code_generation("c", "g").await.unwrap();
        let second = client.get_code_generation("c", "g").await.unwrap();
        assert_eq!(first.status, "InProgress");
        assert_eq!(second.status, "Complete");
        assert_eq!(client.count(&RemoteCall::GetCodeGeneration), 2);
    }

    #[tokio::test]
    async fn test_mock_client_errors_without_queued_plan() {
        let client = MockJobClient::new();
        assert!(client.generate_plan("c", "u", "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_uploader_records_kms_key() {
        let uploader = MockUploader::new();
        uploader
            .upload("https://u", vec![1, 2, 3], "sum", Some("arn:key"))
            .await
            .unwrap();
        let uploads = uploader.recorded_uploads();
        assert_eq!(uploads[0].size, 3);
        assert_eq!(uploads[0].kms_key_arn.as_deref(), Some("arn:key"));
    }
}
