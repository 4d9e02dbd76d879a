//! Bounded polling of a remote code-generation job

use super::types::{CodeGenResult, PollingConfig};
use crate::error::{ServerErrorCode, SessionError};
use crate::remote::JobStatus;
use crate::traits::{RemoteJobClient, VirtualFileSystem};
use crate::vfs::register_new_files;
use tokio_util::sync::CancellationToken;

/// Polls one job until it completes, fails, is cancelled or runs out of
/// iterations. Shared by the code-generation states.
pub struct CodeGenPoller<'a> {
    client: &'a dyn RemoteJobClient,
    conversation_id: &'a str,
    upload_id: &'a str,
    polling: PollingConfig,
    cancel: &'a CancellationToken,
}

impl<'a> CodeGenPoller<'a> {
    #[must_use]
    pub fn new(
        client: &'a dyn RemoteJobClient,
        conversation_id: &'a str,
        upload_id: &'a str,
        polling: PollingConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            conversation_id,
            upload_id,
            polling,
            cancel,
        }
    }

    /// Wait for `code_generation_id` and stage its files under the upload id
    ///
    /// Cancellation is checked between polls only; a request already in
    /// flight is allowed to finish. A cancelled run yields an empty result
    /// with `completed` unset.
    ///
    /// # Errors
    ///
    /// Fails on a remote error, a failed or unrecognised job status, or when
    /// the iteration budget runs out.
    pub async fn generate_code(
        &self,
        fs: &dyn VirtualFileSystem,
        code_generation_id: &str,
    ) -> Result<CodeGenResult, SessionError> {
        for iteration in 0..self.polling.max_iterations {
            if self.cancel.is_cancelled() {
                break;
            }

            let response = self
                .client
                .get_code_generation(self.conversation_id, code_generation_id)
                .await
                .map_err(|e| SessionError::server_side(ServerErrorCode::CodeGen, e))?;

            tracing::debug!(
                conv_id = %self.conversation_id,
                code_generation_id,
                iteration,
                status = %response.status,
                "Polled code generation"
            );

            let status = response.job_status();
            if status.is_pending() {
                tokio::time::sleep(self.polling.interval).await;
                continue;
            }
            if status.is_failure() {
                tracing::warn!(
                    conv_id = %self.conversation_id,
                    status = %response.status,
                    "Code generation failed"
                );
                return Err(SessionError::CodeGenFailed);
            }
            if let JobStatus::Unknown(raw) = status {
                tracing::error!(conv_id = %self.conversation_id, status = %raw, "Unknown code generation status");
                return Err(SessionError::UnknownCodeGenStatus(raw));
            }

            let archive = self
                .client
                .export_result_archive(self.conversation_id)
                .await
                .map_err(|e| SessionError::server_side(ServerErrorCode::CodeGen, e))?;
            let files = register_new_files(fs, &archive.new_file_contents, self.upload_id);
            tracing::info!(
                conv_id = %self.conversation_id,
                upload_id = %self.upload_id,
                files = files.len(),
                deleted = archive.deleted_files.len(),
                "Code generation complete"
            );
            return Ok(CodeGenResult::new(files, archive.deleted_files));
        }

        if self.cancel.is_cancelled() {
            tracing::info!(conv_id = %self.conversation_id, "Code generation cancelled");
            return Ok(CodeGenResult::default());
        }

        tracing::warn!(
            conv_id = %self.conversation_id,
            max_iterations = self.polling.max_iterations,
            "Code generation timed out"
        );
        Err(SessionError::CodeGenTimeout)
    }
}
