//! Shared session types: phases, configuration, actions and interactions

use super::state::SessionState;
use crate::error::SessionError;
use crate::traits::{CodeUploader, Messenger, RemoteJobClient, VirtualFileSystem};
use crate::vfs::NewFileInfo;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default delay between two polls of a running job
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

/// Default number of polls before giving up (about 30 minutes)
pub const DEFAULT_POLL_MAX_ITERATIONS: u32 = 180;

/// Default upper bound for a workspace snapshot
pub const DEFAULT_MAX_REPO_SIZE_BYTES: u64 = 200 * 1024 * 1024;

/// Coarse grouping of states, used to pick user-facing copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    Approach,
    Codegen,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "Init",
            Phase::Approach => "Approach",
            Phase::Codegen => "Codegen",
        };
        f.write_str(name)
    }
}

/// Poll interval and cap for the code-generation loop
///
/// `interval * max_iterations` is the effective timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub max_iterations: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_iterations: DEFAULT_POLL_MAX_ITERATIONS,
        }
    }
}

/// Configuration threaded through every state
///
/// Never mutated in place: a transition that needs a different upload id
/// builds a new copy with [`SessionStateConfig::with_upload_id`].
#[derive(Clone)]
pub struct SessionStateConfig {
    pub conversation_id: String,
    pub upload_id: Option<String>,
    pub workspace_root: PathBuf,
    pub client: Arc<dyn RemoteJobClient>,
    pub uploader: Arc<dyn CodeUploader>,
    pub polling: PollingConfig,
    pub max_repo_size_bytes: u64,
}

impl SessionStateConfig {
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        workspace_root: PathBuf,
        client: Arc<dyn RemoteJobClient>,
        uploader: Arc<dyn CodeUploader>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            upload_id: None,
            workspace_root,
            client,
            uploader,
            polling: PollingConfig::default(),
            max_repo_size_bytes: DEFAULT_MAX_REPO_SIZE_BYTES,
        }
    }

    #[must_use]
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    #[must_use]
    pub fn with_max_repo_size(mut self, bytes: u64) -> Self {
        self.max_repo_size_bytes = bytes;
        self
    }

    /// Copy of this config pointing at a newer upload
    #[must_use]
    pub fn with_upload_id(&self, upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: Some(upload_id.into()),
            ..self.clone()
        }
    }

    /// # Errors
    ///
    /// `UploadIdNotFound` before the workspace has been uploaded.
    pub fn upload_id(&self) -> Result<&str, SessionError> {
        self.upload_id.as_deref().ok_or(SessionError::UploadIdNotFound)
    }
}

impl fmt::Debug for SessionStateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStateConfig")
            .field("conversation_id", &self.conversation_id)
            .field("upload_id", &self.upload_id)
            .field("workspace_root", &self.workspace_root)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

/// What the user did, handed to `interact`
#[derive(Clone, Copy)]
pub struct SessionStateAction<'a> {
    pub msg: Option<&'a str>,
    pub messenger: &'a dyn Messenger,
    pub fs: &'a dyn VirtualFileSystem,
}

impl<'a> SessionStateAction<'a> {
    #[must_use]
    pub fn new(
        msg: Option<&'a str>,
        messenger: &'a dyn Messenger,
        fs: &'a dyn VirtualFileSystem,
    ) -> Self {
        Self { msg, messenger, fs }
    }

    /// The message, for states that cannot proceed without one
    ///
    /// # Errors
    ///
    /// `UserMessageNotFound` when the message is missing or blank.
    pub fn user_message(&self) -> Result<&'a str, SessionError> {
        match self.msg {
            Some(msg) if !msg.trim().is_empty() => Ok(msg),
            _ => Err(SessionError::UserMessageNotFound),
        }
    }
}

/// User-visible output of a single `interact` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interaction {
    pub content: Option<String>,
}

impl Interaction {
    #[must_use]
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// Result of `interact`: output for this call plus the state for the next one
#[derive(Debug)]
pub struct SessionStateInteraction {
    pub next_state: SessionState,
    pub interaction: Interaction,
}

/// Files staged by a code-generation round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeGenResult {
    pub files: Vec<NewFileInfo>,
    pub file_paths: Vec<String>,
    pub deleted_files: Vec<String>,
    /// False when the run was cancelled before the job finished
    pub completed: bool,
}

impl CodeGenResult {
    /// Result of a job that reached `Complete`
    #[must_use]
    pub fn new(files: Vec<NewFileInfo>, deleted_files: Vec<String>) -> Self {
        let file_paths = files.iter().map(|f| f.virtual_uri.path().to_string()).collect();
        Self {
            files,
            file_paths,
            deleted_files,
            completed: true,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.deleted_files.is_empty()
    }
}
