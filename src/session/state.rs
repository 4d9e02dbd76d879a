//! Conversation state types
//!
//! Each variant owns everything it needs for one `interact` call. A
//! transition never reshapes a state in place: it returns a freshly built
//! successor, and the owning `Session` swaps it in.

use super::codegen::CodeGenPoller;
use super::sanitize::sanitize_html;
use super::types::{
    Interaction, Phase, SessionStateAction, SessionStateConfig, SessionStateInteraction,
};
use super::upload::{collect_files, upload_workspace, CollectedFile};
use crate::error::{ServerErrorCode, SessionError};
use crate::messenger::{approach_follow_ups, code_result_follow_ups, Answer, ChatItemType};
use crate::remote::GeneratedFile;
use crate::vfs::{register_new_files, NewFileInfo};
use tokio_util::sync::CancellationToken;

/// Substring that diverts refinement into local mock code generation.
///
/// A debugging convenience; anyone who can type a message can trigger it, so
/// it must never gate anything sensitive.
pub const MOCK_CODE_SENTINEL: &str = "MOCK CODE";

/// Workspace-relative directory read by mock code generation
pub const MOCK_DATA_DIR: &str = "mock-data";

/// Shown in place of an empty plan
pub const APPROACH_FALLBACK: &str =
    "There has been a problem generating an approach. Please type \"CLEAR\" and start over.";

const GENERATING_CODE: &str = "Generating code ...";

// ============================================================================
// Session State
// ============================================================================

/// Every state the conversation can be in
#[derive(Debug)]
pub enum SessionState {
    /// No conversation exists yet
    ConversationNotStarted(ConversationNotStarted),
    /// Workspace not uploaded yet
    PrepareRefinement(PrepareRefinement),
    /// First approach for an uploaded workspace
    Refinement(Refinement),
    /// Approach exists and may be revised
    RefinementIteration(RefinementIteration),
    /// User accepted the approach
    CodeGen(CodeGen),
    /// Local stand-in for code generation
    MockCodeGen(MockCodeGen),
    /// Waiting for feedback on generated code
    PrepareIteration(PrepareIteration),
    /// Regenerating code with feedback
    CodeGenIteration(CodeGenIteration),
}

impl SessionState {
    /// Consume a user action; fails without changing anything on error
    ///
    /// # Errors
    ///
    /// Returns the variant's failure: a missing message, an illegal
    /// transition, an upload problem or a wrapped remote error.
    pub async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        match self {
            SessionState::ConversationNotStarted(s) => s.interact(action),
            SessionState::PrepareRefinement(s) => s.interact(action).await,
            SessionState::Refinement(s) => s.interact(action).await,
            SessionState::RefinementIteration(s) => s.interact(action).await,
            SessionState::CodeGen(s) => s.interact(action).await,
            SessionState::MockCodeGen(s) => s.interact(action).await,
            SessionState::PrepareIteration(s) => s.interact(action).await,
            SessionState::CodeGenIteration(s) => s.interact(action).await,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::ConversationNotStarted(_) => "conversation_not_started",
            SessionState::PrepareRefinement(_) => "prepare_refinement",
            SessionState::Refinement(_) => "refinement",
            SessionState::RefinementIteration(_) => "refinement_iteration",
            SessionState::CodeGen(_) => "code_gen",
            SessionState::MockCodeGen(_) => "mock_code_gen",
            SessionState::PrepareIteration(_) => "prepare_iteration",
            SessionState::CodeGenIteration(_) => "code_gen_iteration",
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            SessionState::ConversationNotStarted(_) => Phase::Init,
            SessionState::PrepareRefinement(_)
            | SessionState::Refinement(_)
            | SessionState::RefinementIteration(_) => Phase::Approach,
            SessionState::CodeGen(_)
            | SessionState::MockCodeGen(_)
            | SessionState::PrepareIteration(_)
            | SessionState::CodeGenIteration(_) => Phase::Codegen,
        }
    }

    #[must_use]
    pub fn approach(&self) -> &str {
        match self {
            SessionState::ConversationNotStarted(s) => &s.approach,
            SessionState::PrepareRefinement(s) => &s.approach,
            SessionState::Refinement(s) => &s.approach,
            SessionState::RefinementIteration(s) => &s.approach,
            SessionState::CodeGen(s) => &s.approach,
            SessionState::MockCodeGen(s) => &s.approach,
            SessionState::PrepareIteration(s) => &s.approach,
            SessionState::CodeGenIteration(s) => &s.approach,
        }
    }

    #[must_use]
    pub fn tab_id(&self) -> &str {
        match self {
            SessionState::ConversationNotStarted(s) => &s.tab_id,
            SessionState::PrepareRefinement(s) => &s.tab_id,
            SessionState::Refinement(s) => &s.tab_id,
            SessionState::RefinementIteration(s) => &s.tab_id,
            SessionState::CodeGen(s) => &s.tab_id,
            SessionState::MockCodeGen(s) => &s.tab_id,
            SessionState::PrepareIteration(s) => &s.tab_id,
            SessionState::CodeGenIteration(s) => &s.tab_id,
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        match self {
            SessionState::ConversationNotStarted(s) => &s.cancel,
            SessionState::PrepareRefinement(s) => &s.cancel,
            SessionState::Refinement(s) => &s.cancel,
            SessionState::RefinementIteration(s) => &s.cancel,
            SessionState::CodeGen(s) => &s.cancel,
            SessionState::MockCodeGen(s) => &s.cancel,
            SessionState::PrepareIteration(s) => &s.cancel,
            SessionState::CodeGenIteration(s) => &s.cancel,
        }
    }

    /// Configuration, once a conversation exists
    #[must_use]
    pub fn config(&self) -> Option<&SessionStateConfig> {
        match self {
            SessionState::ConversationNotStarted(_) => None,
            SessionState::PrepareRefinement(s) => Some(&s.config),
            SessionState::Refinement(s) => Some(&s.config),
            SessionState::RefinementIteration(s) => Some(&s.config),
            SessionState::CodeGen(s) => Some(&s.config),
            SessionState::MockCodeGen(s) => Some(&s.config),
            SessionState::PrepareIteration(s) => Some(&s.config),
            SessionState::CodeGenIteration(s) => Some(&s.config),
        }
    }

    /// Replace a cancelled token so the state can run again
    ///
    /// Used when an interaction fails and the state is kept for a retry.
    pub(crate) fn reset_cancel(&mut self) {
        let cancel = match self {
            SessionState::ConversationNotStarted(s) => &mut s.cancel,
            SessionState::PrepareRefinement(s) => &mut s.cancel,
            SessionState::Refinement(s) => &mut s.cancel,
            SessionState::RefinementIteration(s) => &mut s.cancel,
            SessionState::CodeGen(s) => &mut s.cancel,
            SessionState::MockCodeGen(s) => &mut s.cancel,
            SessionState::PrepareIteration(s) => &mut s.cancel,
            SessionState::CodeGenIteration(s) => &mut s.cancel,
        };
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
    }

    /// Files staged by the latest code-generation round
    #[must_use]
    pub fn files(&self) -> &[NewFileInfo] {
        match self {
            SessionState::CodeGen(s) => &s.files,
            SessionState::MockCodeGen(s) => &s.files,
            SessionState::PrepareIteration(s) => &s.files,
            SessionState::CodeGenIteration(s) => &s.files,
            _ => &[],
        }
    }

    #[must_use]
    pub fn deleted_files(&self) -> &[String] {
        match self {
            SessionState::CodeGen(s) => &s.deleted_files,
            SessionState::PrepareIteration(s) => &s.deleted_files,
            SessionState::CodeGenIteration(s) => &s.deleted_files,
            _ => &[],
        }
    }
}

// ============================================================================
// Shared steps
// ============================================================================

/// Ask for an approach and make it safe to display
async fn request_approach(
    config: &SessionStateConfig,
    message: &str,
) -> Result<String, SessionError> {
    let upload_id = config.upload_id()?;
    let plan = config
        .client
        .generate_plan(&config.conversation_id, upload_id, message)
        .await
        .map_err(|e| SessionError::server_side(ServerErrorCode::Approach, e))?;

    let plan = plan
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| APPROACH_FALLBACK.to_string());
    let approach = sanitize_html(&plan);
    tracing::debug!(conv_id = %config.conversation_id, approach = %approach, "Approach response");
    Ok(approach)
}

fn announce_approach(action: &SessionStateAction<'_>, tab_id: &str, approach: &str) {
    action.messenger.send_answer(
        Answer::new(ChatItemType::Answer, tab_id)
            .with_message(approach)
            .with_follow_ups(approach_follow_ups()),
    );
}

fn announce_code_result(
    action: &SessionStateAction<'_>,
    tab_id: &str,
    upload_id: &str,
    files: &[NewFileInfo],
    deleted_files: &[String],
) {
    action
        .messenger
        .send_code_result(files, deleted_files, tab_id, upload_id);
    action.messenger.send_answer(
        Answer::new(ChatItemType::SystemPrompt, tab_id).with_follow_ups(code_result_follow_ups()),
    );
}

/// Start a job, poll it to completion and report the staged files
async fn run_code_generation(
    config: &SessionStateConfig,
    action: &SessionStateAction<'_>,
    tab_id: &str,
    message: Option<&str>,
    cancel: &CancellationToken,
) -> Result<(Vec<NewFileInfo>, Vec<String>), SessionError> {
    let upload_id = config.upload_id()?;
    let started = config
        .client
        .start_code_generation(&config.conversation_id, upload_id, message)
        .await
        .map_err(|e| SessionError::server_side(ServerErrorCode::CodeGen, e))?;

    tracing::info!(
        conv_id = %config.conversation_id,
        upload_id = %upload_id,
        code_generation_id = %started.code_generation_id,
        "Started code generation"
    );
    action.messenger.send_answer(
        Answer::new(ChatItemType::AnswerPart, tab_id).with_message(GENERATING_CODE),
    );

    let result = CodeGenPoller::new(
        config.client.as_ref(),
        &config.conversation_id,
        upload_id,
        config.polling,
        cancel,
    )
    .generate_code(action.fs, &started.code_generation_id)
    .await?;

    // Files staged by a completed job are announced even if cancellation
    // arrived during the export
    if !result.completed {
        tracing::info!(conv_id = %config.conversation_id, "Skipping code result for cancelled run");
    } else {
        announce_code_result(action, tab_id, upload_id, &result.files, &result.deleted_files);
    }
    Ok((result.files, result.deleted_files))
}

// ============================================================================
// Variants
// ============================================================================

#[derive(Debug)]
pub struct ConversationNotStarted {
    pub approach: String,
    tab_id: String,
    cancel: CancellationToken,
}

impl ConversationNotStarted {
    #[must_use]
    pub fn new(tab_id: impl Into<String>) -> Self {
        Self {
            approach: String::new(),
            tab_id: tab_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    #[allow(clippy::unused_self)]
    fn interact(
        &mut self,
        _action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        Err(SessionError::IllegalStateTransition)
    }
}

#[derive(Debug)]
pub struct PrepareRefinement {
    config: SessionStateConfig,
    pub approach: String,
    tab_id: String,
    cancel: CancellationToken,
}

impl PrepareRefinement {
    #[must_use]
    pub fn new(config: SessionStateConfig, approach: impl Into<String>, tab_id: impl Into<String>) -> Self {
        Self {
            config,
            approach: approach.into(),
            tab_id: tab_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        action.user_message()?;

        let upload_id = upload_workspace(&self.config).await?;
        let mut refinement = Refinement::new(
            self.config.with_upload_id(upload_id),
            self.approach.clone(),
            self.tab_id.clone(),
            0,
        )
        .with_cancel(self.cancel.child_token());
        refinement.interact(action).await
    }
}

#[derive(Debug)]
pub struct Refinement {
    config: SessionStateConfig,
    pub approach: String,
    tab_id: String,
    iteration: u32,
    cancel: CancellationToken,
}

impl Refinement {
    #[must_use]
    pub fn new(
        config: SessionStateConfig,
        approach: impl Into<String>,
        tab_id: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            config,
            approach: approach.into(),
            tab_id: tab_id.into(),
            iteration,
            cancel: CancellationToken::new(),
        }
    }

    fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        let message = action.user_message()?;
        self.approach = request_approach(&self.config, message).await?;
        announce_approach(&action, &self.tab_id, &self.approach);

        Ok(SessionStateInteraction {
            next_state: SessionState::RefinementIteration(RefinementIteration::new(
                self.config.clone(),
                self.approach.clone(),
                self.tab_id.clone(),
                self.iteration + 1,
            )),
            interaction: Interaction::with_content(format!("{}\n", self.approach)),
        })
    }
}

#[derive(Debug)]
pub struct RefinementIteration {
    config: SessionStateConfig,
    pub approach: String,
    tab_id: String,
    iteration: u32,
    cancel: CancellationToken,
}

impl RefinementIteration {
    #[must_use]
    pub fn new(
        config: SessionStateConfig,
        approach: impl Into<String>,
        tab_id: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            config,
            approach: approach.into(),
            tab_id: tab_id.into(),
            iteration,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        if action.msg.is_some_and(|m| m.contains(MOCK_CODE_SENTINEL)) {
            tracing::info!(conv_id = %self.config.conversation_id, "Switching to mock code generation");
            let mut mock = MockCodeGen::new(self.config.clone(), self.approach.clone(), self.tab_id.clone())
                .with_cancel(self.cancel.child_token());
            return mock.interact(action).await;
        }

        let message = action.user_message()?;
        self.approach = request_approach(&self.config, message).await?;
        announce_approach(&action, &self.tab_id, &self.approach);

        Ok(SessionStateInteraction {
            next_state: SessionState::RefinementIteration(RefinementIteration::new(
                self.config.clone(),
                self.approach.clone(),
                self.tab_id.clone(),
                self.iteration + 1,
            )),
            interaction: Interaction::with_content(format!("{}\n", self.approach)),
        })
    }
}

#[derive(Debug)]
pub struct CodeGen {
    config: SessionStateConfig,
    pub approach: String,
    tab_id: String,
    iteration: u32,
    files: Vec<NewFileInfo>,
    deleted_files: Vec<String>,
    cancel: CancellationToken,
}

impl CodeGen {
    #[must_use]
    pub fn new(
        config: SessionStateConfig,
        approach: impl Into<String>,
        tab_id: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            config,
            approach: approach.into(),
            tab_id: tab_id.into(),
            iteration,
            files: Vec::new(),
            deleted_files: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        let (files, deleted_files) =
            run_code_generation(&self.config, &action, &self.tab_id, None, &self.cancel).await?;
        self.files = files;
        self.deleted_files = deleted_files;

        Ok(SessionStateInteraction {
            next_state: SessionState::PrepareIteration(PrepareIteration::new(
                self.config.clone(),
                self.approach.clone(),
                self.files.clone(),
                self.deleted_files.clone(),
                self.tab_id.clone(),
                self.iteration + 1,
            )),
            interaction: Interaction::default(),
        })
    }
}

#[derive(Debug)]
pub struct MockCodeGen {
    config: SessionStateConfig,
    pub approach: String,
    tab_id: String,
    upload_id: String,
    files: Vec<NewFileInfo>,
    cancel: CancellationToken,
}

impl MockCodeGen {
    #[must_use]
    pub fn new(config: SessionStateConfig, approach: impl Into<String>, tab_id: impl Into<String>) -> Self {
        Self {
            config,
            approach: approach.into(),
            tab_id: tab_id.into(),
            upload_id: uuid::Uuid::new_v4().to_string(),
            files: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        let mock_dir = self.config.workspace_root.join(MOCK_DATA_DIR);

        let collected = if mock_dir.is_dir() {
            tokio::task::spawn_blocking(move || collect_files(&mock_dir, false))
                .await
                .map_err(std::io::Error::other)
                .and_then(|r| r)
        } else {
            tracing::debug!(path = %mock_dir.display(), "No mock data directory");
            Ok(Vec::new())
        };

        Ok(self.stage_mock_files(&action, collected))
    }

    /// Stage collected mock files; a read failure is logged and leaves
    /// nothing staged
    fn stage_mock_files(
        &mut self,
        action: &SessionStateAction<'_>,
        collected: std::io::Result<Vec<CollectedFile>>,
    ) -> SessionStateInteraction {
        match collected {
            Ok(collected) => {
                let generated: Vec<GeneratedFile> = collected
                    .into_iter()
                    .map(|f| {
                        GeneratedFile::new(f.relative_path, String::from_utf8_lossy(&f.content))
                    })
                    .collect();
                self.files = register_new_files(action.fs, &generated, &self.upload_id);
                announce_code_result(action, &self.tab_id, &self.upload_id, &self.files, &[]);
            }
            Err(e) => {
                tracing::error!(error = %e, "Unable to use mock code generation");
            }
        }

        SessionStateInteraction {
            next_state: SessionState::Refinement(Refinement::new(
                self.config.clone(),
                self.approach.clone(),
                self.tab_id.clone(),
                0,
            )),
            interaction: Interaction::default(),
        }
    }
}

#[derive(Debug)]
pub struct PrepareIteration {
    config: SessionStateConfig,
    pub approach: String,
    tab_id: String,
    iteration: u32,
    files: Vec<NewFileInfo>,
    deleted_files: Vec<String>,
    cancel: CancellationToken,
}

impl PrepareIteration {
    #[must_use]
    pub fn new(
        config: SessionStateConfig,
        approach: impl Into<String>,
        files: Vec<NewFileInfo>,
        deleted_files: Vec<String>,
        tab_id: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            config,
            approach: approach.into(),
            tab_id: tab_id.into(),
            iteration,
            files,
            deleted_files,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        action.user_message()?;

        let upload_id = upload_workspace(&self.config).await?;
        let mut iteration = CodeGenIteration::new(
            self.config.with_upload_id(upload_id),
            self.approach.clone(),
            self.tab_id.clone(),
            self.iteration,
        )
        .with_cancel(self.cancel.child_token());
        iteration.interact(action).await
    }
}

#[derive(Debug)]
pub struct CodeGenIteration {
    config: SessionStateConfig,
    pub approach: String,
    tab_id: String,
    iteration: u32,
    files: Vec<NewFileInfo>,
    deleted_files: Vec<String>,
    cancel: CancellationToken,
}

impl CodeGenIteration {
    #[must_use]
    pub fn new(
        config: SessionStateConfig,
        approach: impl Into<String>,
        tab_id: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            config,
            approach: approach.into(),
            tab_id: tab_id.into(),
            iteration,
            files: Vec::new(),
            deleted_files: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn interact(
        &mut self,
        action: SessionStateAction<'_>,
    ) -> Result<SessionStateInteraction, SessionError> {
        let message = action.user_message()?;
        let (files, deleted_files) = run_code_generation(
            &self.config,
            &action,
            &self.tab_id,
            Some(message),
            &self.cancel,
        )
        .await?;
        self.files = files;
        self.deleted_files = deleted_files;

        Ok(SessionStateInteraction {
            next_state: SessionState::PrepareIteration(PrepareIteration::new(
                self.config.clone(),
                self.approach.clone(),
                self.files.clone(),
                self.deleted_files.clone(),
                self.tab_id.clone(),
                self.iteration + 1,
            )),
            interaction: Interaction::default(),
        })
    }
}
