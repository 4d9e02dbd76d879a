//! Trait abstractions for the collaborators the session core talks to
//!
//! These traits enable testing the state machine with mock implementations.

use crate::messenger::Answer;
use crate::remote::{
    CodeGenerationStatus, CreateUploadUrlResponse, ExportedArchive, RemoteError,
    StartCodeGenerationResponse,
};
use crate::session::Phase;
use crate::vfs::{NewFileInfo, VirtualUri};
use async_trait::async_trait;

/// Client for the remote planning / code-generation service
///
/// Every method fails with a [`RemoteError`] classified by kind.
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Start a conversation and return its server-assigned id
    ///
    /// # Errors
    ///
    /// Transport or service failure.
    async fn create_conversation(&self) -> Result<String, RemoteError>;

    /// Reserve an upload slot for a workspace snapshot with the given checksum
    ///
    /// # Errors
    ///
    /// Transport or service failure.
    async fn create_upload_url(
        &self,
        conversation_id: &str,
        content_checksum: &str,
    ) -> Result<CreateUploadUrlResponse, RemoteError>;

    /// Generate (or regenerate) the approach for the latest upload
    ///
    /// # Errors
    ///
    /// Transport or service failure.
    async fn generate_plan(
        &self,
        conversation_id: &str,
        upload_id: &str,
        message: &str,
    ) -> Result<Option<String>, RemoteError>;

    /// # Errors
    ///
    /// Transport or service failure.
    async fn start_code_generation(
        &self,
        conversation_id: &str,
        upload_id: &str,
        message: Option<&str>,
    ) -> Result<StartCodeGenerationResponse, RemoteError>;

    /// # Errors
    ///
    /// Transport or service failure.
    async fn get_code_generation(
        &self,
        conversation_id: &str,
        code_generation_id: &str,
    ) -> Result<CodeGenerationStatus, RemoteError>;

    /// Fetch the result archive of the last completed job
    ///
    /// # Errors
    ///
    /// Transport or service failure.
    async fn export_result_archive(
        &self,
        conversation_id: &str,
    ) -> Result<ExportedArchive, RemoteError>;
}

/// Physical transfer of a workspace snapshot to a presigned URL
#[async_trait]
pub trait CodeUploader: Send + Sync {
    /// # Errors
    ///
    /// Transport failure or a rejected transfer.
    async fn upload(
        &self,
        url: &str,
        content: Vec<u8>,
        checksum: &str,
        kms_key_arn: Option<&str>,
    ) -> Result<(), RemoteError>;
}

/// In-memory registry of staged files
///
/// Registration overwrites any earlier content for the same URI.
pub trait VirtualFileSystem: Send + Sync {
    fn register_provider(&self, uri: &VirtualUri, content: Vec<u8>);

    fn read(&self, uri: &VirtualUri) -> Option<Vec<u8>>;
}

/// One-way notification channel to the UI surface
pub trait Messenger: Send + Sync {
    fn send_answer(&self, answer: Answer);

    fn send_error_message(&self, message: &str, tab_id: &str, retries: u32, phase: Phase);

    fn send_code_result(
        &self,
        files: &[NewFileInfo],
        deleted_files: &[String],
        tab_id: &str,
        upload_id: &str,
    );

    fn send_async_event_progress(&self, tab_id: &str, in_progress: bool, message: Option<&str>);

    fn send_update_placeholder(&self, tab_id: &str, text: &str);

    fn send_chat_input_enabled(&self, tab_id: &str, enabled: bool);
}
