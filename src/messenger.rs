//! Messages sent from the session core to the UI surface

use crate::session::Phase;
use crate::traits::Messenger;
use crate::vfs::NewFileInfo;
use serde::Serialize;
use tokio::sync::mpsc;

/// How the UI should render an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatItemType {
    Answer,
    AnswerPart,
    AnswerStream,
    SystemPrompt,
}

/// Action offered to the user as a clickable pill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FollowUpType {
    GenerateCode,
    AcceptCode,
    ProvideFeedbackAndRegenerateCode,
    NewPlan,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Success,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub pill_text: String,
    #[serde(rename = "type")]
    pub kind: FollowUpType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FollowUpStatus>,
}

impl FollowUp {
    #[must_use]
    pub fn new(pill_text: impl Into<String>, kind: FollowUpType) -> Self {
        Self {
            pill_text: pill_text.into(),
            kind,
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: FollowUpStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChatItemType,
    #[serde(rename = "tabID")]
    pub tab_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub follow_ups: Vec<FollowUp>,
}

impl Answer {
    #[must_use]
    pub fn new(kind: ChatItemType, tab_id: impl Into<String>) -> Self {
        Self {
            message: None,
            kind,
            tab_id: tab_id.into(),
            follow_ups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_follow_ups(mut self, follow_ups: impl IntoIterator<Item = FollowUp>) -> Self {
        self.follow_ups.extend(follow_ups);
        self
    }
}

/// Follow-ups offered after an approach has been generated
#[must_use]
pub fn approach_follow_ups() -> Vec<FollowUp> {
    vec![
        FollowUp::new("Write Code", FollowUpType::GenerateCode).with_status(FollowUpStatus::Info),
        FollowUp::new("Discuss a new plan", FollowUpType::NewPlan),
    ]
}

/// Follow-ups offered after generated code has been staged
#[must_use]
pub fn code_result_follow_ups() -> Vec<FollowUp> {
    vec![
        FollowUp::new("Accept changes", FollowUpType::AcceptCode)
            .with_status(FollowUpStatus::Success),
        FollowUp::new(
            "Provide feedback and regenerate",
            FollowUpType::ProvideFeedbackAndRegenerateCode,
        )
        .with_status(FollowUpStatus::Info),
    ]
}

/// Events delivered to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessengerEvent {
    Answer {
        answer: Answer,
    },
    ErrorMessage {
        message: String,
        tab_id: String,
        retries: u32,
        phase: Phase,
    },
    CodeResult {
        file_paths: Vec<String>,
        deleted_files: Vec<String>,
        tab_id: String,
        upload_id: String,
    },
    AsyncEventProgress {
        tab_id: String,
        in_progress: bool,
        message: Option<String>,
    },
    UpdatePlaceholder {
        tab_id: String,
        text: String,
    },
    ChatInputEnabled {
        tab_id: String,
        enabled: bool,
    },
}

/// `Messenger` that forwards every notification over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelMessenger {
    tx: mpsc::UnboundedSender<MessengerEvent>,
}

impl ChannelMessenger {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MessengerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: MessengerEvent) {
        // Fire-and-forget: a closed UI is not the session's problem
        if self.tx.send(event).is_err() {
            tracing::debug!("Messenger receiver dropped, discarding event");
        }
    }
}

impl Messenger for ChannelMessenger {
    fn send_answer(&self, answer: Answer) {
        self.emit(MessengerEvent::Answer { answer });
    }

    fn send_error_message(&self, message: &str, tab_id: &str, retries: u32, phase: Phase) {
        self.emit(MessengerEvent::ErrorMessage {
            message: message.to_string(),
            tab_id: tab_id.to_string(),
            retries,
            phase,
        });
    }

    fn send_code_result(
        &self,
        files: &[NewFileInfo],
        deleted_files: &[String],
        tab_id: &str,
        upload_id: &str,
    ) {
        self.emit(MessengerEvent::CodeResult {
            file_paths: files.iter().map(|f| f.file_path.clone()).collect(),
            deleted_files: deleted_files.to_vec(),
            tab_id: tab_id.to_string(),
            upload_id: upload_id.to_string(),
        });
    }

    fn send_async_event_progress(&self, tab_id: &str, in_progress: bool, message: Option<&str>) {
        self.emit(MessengerEvent::AsyncEventProgress {
            tab_id: tab_id.to_string(),
            in_progress,
            message: message.map(str::to_string),
        });
    }

    fn send_update_placeholder(&self, tab_id: &str, text: &str) {
        self.emit(MessengerEvent::UpdatePlaceholder {
            tab_id: tab_id.to_string(),
            text: text.to_string(),
        });
    }

    fn send_chat_input_enabled(&self, tab_id: &str, enabled: bool) {
        self.emit(MessengerEvent::ChatInputEnabled {
            tab_id: tab_id.to_string(),
            enabled,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_answer_wire_shape() {
        let answer = Answer::new(ChatItemType::AnswerPart, "tab-1").with_message("Generating code ...");
        let value = serde_json::to_value(MessengerEvent::Answer { answer }).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "answer",
                "answer": {
                    "message": "Generating code ...",
                    "type": "answer-part",
                    "tabID": "tab-1"
                }
            })
        );
    }

    #[test]
    fn test_follow_ups_serialize_kebab_case() {
        let value = serde_json::to_value(code_result_follow_ups()).unwrap();
        assert_eq!(value[0]["type"], "accept-code");
        assert_eq!(value[0]["status"], "success");
        assert_eq!(value[1]["type"], "provide-feedback-and-regenerate-code");
    }

    #[test]
    fn test_channel_messenger_forwards_in_order() {
        let (messenger, mut rx) = ChannelMessenger::new();
        messenger.send_update_placeholder("t", "Waiting");
        messenger.send_chat_input_enabled("t", false);
        messenger.send_error_message("oops", "t", 2, Phase::Codegen);

        assert!(matches!(rx.try_recv().unwrap(), MessengerEvent::UpdatePlaceholder { .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            MessengerEvent::ChatInputEnabled { enabled: false, .. }
        ));
        match rx.try_recv().unwrap() {
            MessengerEvent::ErrorMessage { retries, phase, .. } => {
                assert_eq!(retries, 2);
                assert_eq!(phase, Phase::Codegen);
            }
            other => panic!("Expected ErrorMessage, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (messenger, rx) = ChannelMessenger::new();
        drop(rx);
        messenger.send_async_event_progress("t", true, Some("working"));
    }
}
