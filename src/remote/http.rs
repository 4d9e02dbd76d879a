//! HTTP adapters for the remote service and the snapshot upload

use super::types::*;
use super::RemoteError;
use crate::traits::{CodeUploader, RemoteJobClient};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// JSON-over-HTTP client for the code-generation service
pub struct HttpJobClient {
    client: Client,
    base_url: String,
}

impl HttpJobClient {
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        decode(response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, RemoteError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        decode(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status.as_u16(), body.trim()))
}

async fn decode<R: DeserializeOwned>(response: Response) -> Result<R, RemoteError> {
    let response = check_status(response).await?;
    Ok(response.json::<R>().await?)
}

#[async_trait]
impl RemoteJobClient for HttpJobClient {
    async fn create_conversation(&self) -> Result<String, RemoteError> {
        let response: CreateConversationResponse =
            self.post_json("conversations", &serde_json::json!({})).await?;
        Ok(response.conversation_id)
    }

    async fn create_upload_url(
        &self,
        conversation_id: &str,
        content_checksum: &str,
    ) -> Result<CreateUploadUrlResponse, RemoteError> {
        let request = CreateUploadUrlRequest {
            content_checksum_sha256: content_checksum.to_string(),
        };
        self.post_json(&format!("conversations/{conversation_id}/upload-url"), &request)
            .await
    }

    async fn generate_plan(
        &self,
        conversation_id: &str,
        upload_id: &str,
        message: &str,
    ) -> Result<Option<String>, RemoteError> {
        let request = GeneratePlanRequest {
            upload_id: upload_id.to_string(),
            message: message.to_string(),
        };
        let response: GeneratePlanResponse = self
            .post_json(&format!("conversations/{conversation_id}/plan"), &request)
            .await?;
        Ok(response.plan)
    }

    async fn start_code_generation(
        &self,
        conversation_id: &str,
        upload_id: &str,
        message: Option<&str>,
    ) -> Result<StartCodeGenerationResponse, RemoteError> {
        let request = StartCodeGenerationRequest {
            upload_id: upload_id.to_string(),
            message: message.map(str::to_string),
        };
        self.post_json(
            &format!("conversations/{conversation_id}/code-generations"),
            &request,
        )
        .await
    }

    async fn get_code_generation(
        &self,
        conversation_id: &str,
        code_generation_id: &str,
    ) -> Result<CodeGenerationStatus, RemoteError> {
        self.get_json(&format!(
            "conversations/{conversation_id}/code-generations/{code_generation_id}"
        ))
        .await
    }

    async fn export_result_archive(
        &self,
        conversation_id: &str,
    ) -> Result<ExportedArchive, RemoteError> {
        self.get_json(&format!("conversations/{conversation_id}/result-archive"))
            .await
    }
}

/// Uploads snapshots with a `PUT` to the presigned URL
pub struct HttpUploader {
    client: Client,
}

impl HttpUploader {
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CodeUploader for HttpUploader {
    async fn upload(
        &self,
        url: &str,
        content: Vec<u8>,
        checksum: &str,
        kms_key_arn: Option<&str>,
    ) -> Result<(), RemoteError> {
        let mut request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "application/zip")
            .header("x-amz-checksum-sha256", checksum)
            .body(content);

        if let Some(key) = kms_key_arn {
            request = request
                .header("x-amz-server-side-encryption", "aws:kms")
                .header("x-amz-server-side-encryption-aws-kms-key-id", key);
        }

        let response = request.send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteErrorKind;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = HttpJobClient::new("https://jobs.example.com/api/").unwrap();
        assert_eq!(
            client.url("conversations/c-1/plan"),
            "https://jobs.example.com/api/conversations/c-1/plan"
        );
        assert_eq!(
            client.url("/conversations"),
            "https://jobs.example.com/api/conversations"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retryable_network_error() {
        // Port 9 on localhost is not expected to accept connections
        let client = HttpJobClient::new("http://127.0.0.1:9").unwrap();
        let err = client.create_conversation().await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Network);
        assert!(err.kind.is_retryable());
    }
}
