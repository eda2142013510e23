mod common;

use common::{launch, settle};
use extension::host_page::HostPage;
use shared::events::{BridgeMessage, FrameId};
use shared::widget;

#[tokio::test(start_paused = true)]
async fn test_conversation_uses_stored_key_and_cached_code() {
    let h = launch(HostPage::problem("/problems/two-sum-1234", "cpp"), Some("AIza-real"));
    settle().await;
    h.page
        .window
        .local_storage()
        .set_item("course_42_1234_cpp", "int main() { return 1; }");
    let session = h.ext.sessions.current().unwrap();

    session.send_message("is this right?").await;
    session.send_message("what about edge cases?").await;

    assert_eq!(h.model.keys.lock().clone(), vec!["AIza-real", "AIza-real"]);
    let prompts = h.model.prompts.lock().clone();
    assert!(prompts[0].contains("Problem: Problem 1234"));
    assert!(prompts[0].contains("int main() { return 1; }"));
    assert!(!prompts[1].contains("Problem: Problem 1234"));
    assert!(prompts[1].contains("Assistant: reply #1"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_key_prompts_for_configuration() {
    let h = launch(HostPage::problem("/problems/two-sum-1234", "cpp"), None);
    let doc = h.page.window.document().clone();
    settle().await;
    let session = h.ext.sessions.current().unwrap();

    session.send_message("hello?").await;

    assert_eq!(h.model.calls(), 0);
    assert_eq!(session.history().len(), 1);
    assert!(doc.query_selector(".error-message").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_spoofed_key_results_are_ignored() {
    let h = launch(HostPage::problem("/problems/two-sum-1234", "cpp"), None);
    settle().await;

    let window = h.page.window.clone();
    let mut rx = window.subscribe_messages();
    tokio::spawn(async move {
        while let Ok(envelope) = rx.recv().await {
            if envelope.payload == BridgeMessage::GetKey {
                window.post_message_from(
                    FrameId(u64::MAX - 1),
                    "https://evil.example",
                    BridgeMessage::KeyResult {
                        key: Some("attacker-key".into()),
                    },
                );
            }
        }
    });

    let session = h.ext.sessions.current().unwrap();
    session.send_message("hi").await;

    assert_eq!(h.model.calls(), 0);
    assert!(h.model.keys.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_enter_submits_and_shift_enter_does_not() {
    let h = launch(HostPage::problem("/problems/two-sum-1234", "cpp"), Some("k"));
    let doc = h.page.window.document().clone();
    settle().await;
    let input = doc.get_element_by_id(widget::INPUT_ID).unwrap();

    doc.set_value(input, "first line");
    doc.key_down(widget::INPUT_ID, "Enter", true);
    settle().await;
    assert_eq!(h.model.calls(), 0);

    doc.key_down(widget::INPUT_ID, "Enter", false);
    settle().await;
    assert_eq!(h.model.calls(), 1);
    assert_eq!(doc.value(input), "");
}

#[tokio::test(start_paused = true)]
async fn test_blank_submission_never_reaches_network() {
    let h = launch(HostPage::problem("/problems/two-sum-1234", "cpp"), Some("k"));
    let doc = h.page.window.document().clone();
    settle().await;
    let input = doc.get_element_by_id(widget::INPUT_ID).unwrap();

    doc.set_value(input, "   ");
    doc.click(widget::SEND_BUTTON_ID);
    settle().await;

    assert_eq!(h.model.calls(), 0);
    assert!(h.ext.sessions.current().unwrap().history().is_empty());
}
