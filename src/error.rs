//! Session error types

use crate::remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

/// Where an unrecognized remote failure surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorCode {
    Conversation,
    Upload,
    Approach,
    CodeGen,
}

impl ServerErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "UnhandledConversationServerSideError",
            Self::Upload => "UnhandledUploadServerSideError",
            Self::Approach => "UnhandledApproachServerSideError",
            Self::CodeGen => "UnhandledCodeGenServerSideError",
        }
    }
}

/// Errors surfaced by `interact` and the session driver
///
/// Messages of the user-facing variants are shown to the user verbatim.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("It looks like you didn't provide an input. Please enter your message in the text bar.")]
    UserMessageNotFound,

    #[error("Illegal transition between states, restart the conversation")]
    IllegalStateTransition,

    #[error("Conversation id must exist before starting code generation")]
    ConversationIdNotFound,

    #[error("Upload id has to be initialized before it's read")]
    UploadIdNotFound,

    #[error("Sorry, I ran into an issue while trying to upload your code. Please try again.")]
    PrepareRepoFailed(#[source] std::io::Error),

    #[error(
        "The project you have selected for source code is too large to use as context \
         ({size} bytes, limit {limit} bytes). Please select a different folder to use."
    )]
    ContentLength { size: u64, limit: u64 },

    #[error("I'm sorry, I couldn't upload your workspace artifacts to help you with this task. Please try again.")]
    UploadCode(#[source] RemoteError),

    #[error("Server side error: {source}")]
    ServerSide {
        code: ServerErrorCode,
        #[source]
        source: RemoteError,
    },

    #[error("Code generation failed")]
    CodeGenFailed,

    #[error("Unknown status: {0}")]
    UnknownCodeGenStatus(String),

    #[error("Code generation did not finish within the expected time")]
    CodeGenTimeout,

    #[error("Failed to write {}: {source}", .path.display())]
    WorkspaceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    #[must_use]
    pub fn server_side(code: ServerErrorCode, source: RemoteError) -> Self {
        Self::ServerSide { code, source }
    }

    /// Stable identifier for logs
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserMessageNotFound => "UserMessageNotFound",
            Self::IllegalStateTransition => "IllegalStateTransition",
            Self::ConversationIdNotFound => "ConversationIdNotFound",
            Self::UploadIdNotFound => "UploadIdNotFound",
            Self::PrepareRepoFailed(_) => "PrepareRepoFailed",
            Self::ContentLength { .. } => "ContentLengthError",
            Self::UploadCode(_) => "UploadCodeError",
            Self::ServerSide { code, .. } => code.as_str(),
            Self::CodeGenFailed => "CodeGenFailed",
            Self::UnknownCodeGenStatus(_) => "UnknownCodeGenError",
            Self::CodeGenTimeout => "CodeGenTimeout",
            Self::WorkspaceWrite { .. } => "WorkspaceWriteError",
        }
    }

    /// Whether repeating the request could succeed
    ///
    /// Only a remote failure of a permanent kind (authentication, a rejected
    /// request) rules a retry out.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        match self {
            Self::ServerSide { source, .. } => source.kind.is_retryable(),
            _ => true,
        }
    }

    /// Errors whose own message is the copy to show, rather than the
    /// phase-specific apology
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::UserMessageNotFound
                | Self::IllegalStateTransition
                | Self::PrepareRepoFailed(_)
                | Self::ContentLength { .. }
                | Self::UploadCode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_side_wraps_remote_error() {
        let err = SessionError::server_side(
            ServerErrorCode::Approach,
            RemoteError::server_error("HTTP 500"),
        );
        assert_eq!(err.code(), "UnhandledApproachServerSideError");
        assert_eq!(err.to_string(), "Server side error: HTTP 500");
        assert!(!err.is_user_facing());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_permanent_remote_failures_cannot_retry() {
        let auth = SessionError::server_side(ServerErrorCode::CodeGen, RemoteError::auth("HTTP 403"));
        let bad = SessionError::server_side(
            ServerErrorCode::Approach,
            RemoteError::invalid_request("HTTP 400"),
        );
        let busy = SessionError::server_side(ServerErrorCode::CodeGen, RemoteError::throttled("HTTP 429"));

        assert!(!auth.can_retry());
        assert!(!bad.can_retry());
        assert!(busy.can_retry());
        assert!(SessionError::CodeGenTimeout.can_retry());
    }

    #[test]
    fn test_unknown_status_carries_raw_value() {
        let err = SessionError::UnknownCodeGenStatus("weird-status".to_string());
        assert!(err.to_string().contains("weird-status"));
        assert_eq!(err.code(), "UnknownCodeGenError");
    }

    #[test]
    fn test_user_facing_classification() {
        assert!(SessionError::UserMessageNotFound.is_user_facing());
        assert!(SessionError::ContentLength { size: 2, limit: 1 }.is_user_facing());
        assert!(!SessionError::CodeGenTimeout.is_user_facing());
        assert!(!SessionError::CodeGenFailed.is_user_facing());
    }
}
