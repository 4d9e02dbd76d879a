//! Property-based tests for plan sanitizing and refinement routing

use super::sanitize::sanitize_html;
use super::state::{RefinementIteration, SessionState, MOCK_CODE_SENTINEL};
use super::testing::{state_config, MockJobClient, MockUploader};
use super::types::SessionStateAction;
use crate::messenger::ChannelMessenger;
use crate::vfs::InMemoryFileSystem;
use proptest::prelude::*;
use std::sync::Arc;

fn arb_markup_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 .,]{0,20}",
        Just("<script>".to_string()),
        Just("</script>".to_string()),
        Just("<SCRIPT type=\"text/javascript\">".to_string()),
        Just("<scr".to_string()),
        Just("ipt>".to_string()),
        Just("<!--".to_string()),
        Just("-->".to_string()),
        Just("<img src=x onerror=alert(1)>".to_string()),
        Just("<".to_string()),
        Just(">".to_string()),
        Just("<b>".to_string()),
    ]
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Sanitized text never contains a raw angle bracket, so no tag survives
    #[test]
    fn prop_sanitized_text_has_no_markup(
        fragments in proptest::collection::vec(arb_markup_fragment(), 0..12)
    ) {
        let input = fragments.concat();
        let output = sanitize_html(&input);
        prop_assert!(!output.contains('<'), "input {:?} -> {:?}", input, output);
        prop_assert!(!output.contains('>'), "input {:?} -> {:?}", input, output);
    }

    #[test]
    fn prop_plain_text_is_unchanged(text in "[a-zA-Z0-9 .,:;\n-]{0,80}") {
        prop_assert_eq!(sanitize_html(&text), text);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // The sentinel anywhere in a message diverts to mock generation without
    // touching the remote service
    #[test]
    fn prop_mock_sentinel_never_reaches_remote(
        prefix in "[a-z ]{0,16}",
        suffix in "[a-z ]{0,16}",
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let client = Arc::new(MockJobClient::new());
        let config = state_config(client.clone(), Arc::new(MockUploader::new()), dir.path())
            .with_upload_id("upload-0");
        let (messenger, _events) = ChannelMessenger::new();
        let fs = InMemoryFileSystem::new();
        let message = format!("{prefix}{MOCK_CODE_SENTINEL}{suffix}");

        let mut state = SessionState::RefinementIteration(RefinementIteration::new(config, "plan", "tab", 1));
        let result = run(state.interact(SessionStateAction::new(Some(message.as_str()), &messenger, &fs))).unwrap();

        prop_assert!(matches!(result.next_state, SessionState::Refinement(_)));
        prop_assert!(client.calls().is_empty());
    }
}
