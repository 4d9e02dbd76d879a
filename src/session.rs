//! Feature-development conversation sessions
//!
//! A `Session` owns the current [`SessionState`] and the retry budget. Every
//! user action is forwarded to `interact`; on success the returned state
//! replaces the current one, on failure nothing changes.

mod codegen;
mod sanitize;
mod state;
mod types;
mod upload;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod testing;

pub use codegen::CodeGenPoller;
pub use sanitize::sanitize_html;
pub use state::{
    CodeGen, CodeGenIteration, ConversationNotStarted, MockCodeGen, PrepareIteration,
    PrepareRefinement, Refinement, RefinementIteration, SessionState, APPROACH_FALLBACK,
    MOCK_CODE_SENTINEL, MOCK_DATA_DIR,
};
pub use types::{
    CodeGenResult, Interaction, Phase, PollingConfig, SessionStateAction, SessionStateConfig,
    SessionStateInteraction, DEFAULT_MAX_REPO_SIZE_BYTES, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_MAX_ITERATIONS,
};
pub use upload::{collect_files, prepare_repo_data, upload_workspace, CollectedFile, RepoData};

use crate::config::SessionConfig;
use crate::error::{ServerErrorCode, SessionError};
use crate::messenger::{Answer, ChatItemType};
use crate::traits::{CodeUploader, Messenger, RemoteJobClient, VirtualFileSystem};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const APPROACH_ERROR: &str =
    "I'm sorry, I'm having technical difficulties and couldn't generate an approach. Please try again.";
const CODEGEN_ERROR: &str =
    "I'm sorry, I'm having technical difficulties and couldn't generate code. Please try again.";
const DEFAULT_ERROR: &str = "I'm sorry, I ran into an issue processing your request. Please try again.";
const RETRIES_EXHAUSTED: &str =
    "I'm sorry, I ran into an issue and can't continue with this conversation. Please start a new one.";

const WRITING_CODE_PLACEHOLDER: &str = "Writing code...";
const FEEDBACK_PLACEHOLDER: &str = "Provide feedback or comments";

/// Copy shown to the user for `error` after `retries_left` was updated
#[must_use]
pub fn error_copy(error: &SessionError, phase: Phase, retries_left: u32) -> String {
    if error.is_user_facing() {
        return error.to_string();
    }
    if retries_left == 0 {
        return RETRIES_EXHAUSTED.to_string();
    }
    match phase {
        Phase::Approach => APPROACH_ERROR,
        Phase::Codegen => CODEGEN_ERROR,
        Phase::Init => DEFAULT_ERROR,
    }
    .to_string()
}

/// Counts of what [`Session::accept_changes`] did to the workspace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptedChanges {
    pub written: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// One conversation in one chat tab
pub struct Session {
    config: SessionConfig,
    tab_id: String,
    state: SessionState,
    retries: u32,
    task: Option<String>,
    last_message: Option<String>,
    client: Arc<dyn RemoteJobClient>,
    uploader: Arc<dyn CodeUploader>,
    messenger: Arc<dyn Messenger>,
    fs: Arc<dyn VirtualFileSystem>,
}

impl Session {
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        tab_id: impl Into<String>,
        client: Arc<dyn RemoteJobClient>,
        uploader: Arc<dyn CodeUploader>,
        messenger: Arc<dyn Messenger>,
        fs: Arc<dyn VirtualFileSystem>,
    ) -> Self {
        let tab_id = tab_id.into();
        Self {
            config: config.clone(),
            state: SessionState::ConversationNotStarted(ConversationNotStarted::new(tab_id.clone())),
            tab_id,
            retries: config.retries,
            task: None,
            last_message: None,
            client,
            uploader,
            messenger,
            fs,
        }
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The message the conversation was started with
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.state.config().map(|c| c.conversation_id.as_str())
    }

    /// Token of the current state; cancelling it stops that state's polling
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.cancel_token().clone()
    }

    /// Start the conversation once; later calls do nothing
    ///
    /// # Errors
    ///
    /// A server-side `Conversation` error when the service refuses.
    pub async fn preloader(&mut self, msg: &str) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::ConversationNotStarted(_)) {
            return Ok(());
        }

        let conversation_id = self
            .client
            .create_conversation()
            .await
            .map_err(|e| SessionError::server_side(ServerErrorCode::Conversation, e))?;
        tracing::info!(conv_id = %conversation_id, tab_id = %self.tab_id, "Conversation started");

        let config = SessionStateConfig::new(
            conversation_id,
            self.config.workspace_root.clone(),
            self.client.clone(),
            self.uploader.clone(),
        )
        .with_polling(self.config.polling)
        .with_max_repo_size(self.config.max_repo_size_bytes);

        self.task = Some(msg.to_string());
        self.state =
            SessionState::PrepareRefinement(PrepareRefinement::new(config, "", self.tab_id.clone()));
        Ok(())
    }

    /// Forward a user message to the current state
    ///
    /// # Errors
    ///
    /// Whatever the current state's `interact` returns; the state is kept.
    pub async fn send(&mut self, msg: &str) -> Result<Interaction, SessionError> {
        self.last_message = Some(msg.to_string());
        self.next_interaction(Some(msg)).await
    }

    /// Repeat the last user action against the current state
    ///
    /// # Errors
    ///
    /// Same as [`Session::send`].
    pub async fn retry(&mut self) -> Result<Interaction, SessionError> {
        let msg = self.last_message.clone();
        self.next_interaction(msg.as_deref()).await
    }

    async fn next_interaction(&mut self, msg: Option<&str>) -> Result<Interaction, SessionError> {
        let from = self.state.name();
        self.messenger
            .send_async_event_progress(&self.tab_id, true, None);

        let action = SessionStateAction::new(msg, self.messenger.as_ref(), self.fs.as_ref());
        let result = self.state.interact(action).await;

        self.messenger
            .send_async_event_progress(&self.tab_id, false, None);
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                // The state stays for a retry, which must not inherit a
                // cancellation aimed at the failed attempt
                self.state.reset_cancel();
                return Err(e);
            }
        };

        self.state.cancel_token().cancel();
        self.state = response.next_state;
        tracing::info!(
            tab_id = %self.tab_id,
            from,
            to = self.state.name(),
            "Session state transition"
        );
        Ok(response.interaction)
    }

    /// Leave the approach phase and stage a code-generation state
    ///
    /// A code-generation state kept after a failed round is reused as is.
    ///
    /// # Errors
    ///
    /// `ConversationIdNotFound` before the conversation exists,
    /// `IllegalStateTransition` when there is no approach to generate from,
    /// `UploadIdNotFound` when nothing has been uploaded.
    pub fn init_codegen(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::CodeGen(_)) {
            return Ok(());
        }
        let SessionState::RefinementIteration(current) = &self.state else {
            return Err(match self.state.config() {
                None => SessionError::ConversationIdNotFound,
                Some(_) => SessionError::IllegalStateTransition,
            });
        };

        let config = self
            .state
            .config()
            .ok_or(SessionError::ConversationIdNotFound)?;
        config.upload_id()?;

        self.state = SessionState::CodeGen(CodeGen::new(
            config.clone(),
            current.approach.clone(),
            self.tab_id.clone(),
            0,
        ));
        Ok(())
    }

    /// Generate code for the current approach and wait for the result
    ///
    /// Stages the code-generation state first unless [`Session::init_codegen`]
    /// already did, so callers can grab its cancellation token in between.
    ///
    /// # Errors
    ///
    /// Errors of [`Session::init_codegen`] and of the code-generation round.
    pub async fn start_code_generation(&mut self) -> Result<Interaction, SessionError> {
        self.init_codegen()?;
        self.messenger.send_chat_input_enabled(&self.tab_id, false);
        self.messenger
            .send_update_placeholder(&self.tab_id, WRITING_CODE_PLACEHOLDER);

        let result = self.next_interaction(None).await;

        self.messenger.send_chat_input_enabled(&self.tab_id, true);
        self.messenger
            .send_update_placeholder(&self.tab_id, FEEDBACK_PLACEHOLDER);
        result
    }

    /// Write the staged files into the workspace and remove deleted ones
    ///
    /// # Errors
    ///
    /// `WorkspaceWrite` when a file cannot be written or removed.
    pub async fn accept_changes(&self) -> Result<AcceptedChanges, SessionError> {
        let root = self.config.workspace_root.clone();
        let mut summary = AcceptedChanges::default();

        for file in self.state.files() {
            let Some(path) = workspace_path(&root, &file.file_path) else {
                tracing::warn!(path = %file.file_path, "Skipping file outside the workspace");
                summary.skipped += 1;
                continue;
            };
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| SessionError::WorkspaceWrite {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            tokio::fs::write(&path, &file.file_content)
                .await
                .map_err(|source| SessionError::WorkspaceWrite {
                    path: path.clone(),
                    source,
                })?;
            summary.written += 1;
        }

        for deleted in self.state.deleted_files() {
            let Some(path) = workspace_path(&root, deleted) else {
                tracing::warn!(path = %deleted, "Skipping deletion outside the workspace");
                summary.skipped += 1;
                continue;
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => summary.deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(SessionError::WorkspaceWrite { path, source }),
            }
        }

        tracing::info!(
            tab_id = %self.tab_id,
            written = summary.written,
            deleted = summary.deleted,
            skipped = summary.skipped,
            "Accepted generated changes"
        );
        self.messenger.send_answer(
            Answer::new(ChatItemType::Answer, &self.tab_id)
                .with_message("Code has been updated. Would you like to work on another task?"),
        );
        Ok(summary)
    }

    /// Report `error` to the user, spending one retry unless the user caused it
    ///
    /// A permanent remote failure spends the whole budget.
    pub fn handle_error(&mut self, error: &SessionError) {
        if !error.is_user_facing() {
            self.retries = if error.can_retry() {
                self.retries.saturating_sub(1)
            } else {
                0
            };
        }
        let phase = self.state.phase();
        let message = error_copy(error, phase, self.retries);

        tracing::error!(
            tab_id = %self.tab_id,
            code = error.code(),
            error = %error,
            %phase,
            retries = self.retries,
            "Session error"
        );
        self.messenger
            .send_error_message(&message, &self.tab_id, self.retries, phase);
    }
}

/// Resolve a generated relative path under `root`, refusing to escape it
fn workspace_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                pushed = true;
            }
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    pushed.then_some(path)
}
