use evoc::engine::ShareService;
use evoc::error::ShareError;
use evoc::fakes::ScriptedBackend;
use evoc::model::RunId;
use evoc::view::{RunView, ShareForm};
use std::sync::Arc;

fn setup() -> (Arc<ScriptedBackend>, ShareService, RunView) {
    let backend = Arc::new(ScriptedBackend::completing_after("run-9", 0));
    let service = ShareService::new(backend.clone());
    let mut view = RunView::attached(RunId::new("run-9"));
    view.open_share();
    (backend, service, view)
}

#[tokio::test]
async fn accepted_share_clears_the_form_only_after_the_response() {
    let (backend, service, mut view) = setup();
    backend.push_share_reply(200, "{}");

    view.set_share_input("a@x.com, b@y.com");
    let request = view.begin_share().unwrap().unwrap();
    assert!(view.share_form().is_pending());
    assert_eq!(view.share_form().input(), Some("a@x.com, b@y.com"));

    let result = service.send(request).await;
    // Still pending until the view is told about the response.
    assert!(view.share_form().is_pending());

    view.resolve_share(&result);
    let receipt = result.unwrap();
    assert_eq!(receipt.recipients, vec!["a@x.com", "b@y.com"]);
    assert_eq!(view.share_form(), &ShareForm::Closed);
    assert!(view.notice().is_some());

    let sent = backend.shares();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].run_id, RunId::new("run-9"));
    assert_eq!(sent[0].recipients, vec!["a@x.com", "b@y.com"]);
}

#[tokio::test]
async fn unauthorized_is_distinct_from_rejected() {
    let (backend, service, _) = setup();
    backend.push_share_reply(401, "");
    backend.push_share_reply(400, r#"{"message":"User c@z.io not found"}"#);

    let unauthorized = service
        .share(&RunId::new("run-9"), "a@x.com")
        .await
        .unwrap_err();
    let rejected = service
        .share(&RunId::new("run-9"), "c@z.io")
        .await
        .unwrap_err();

    assert_eq!(unauthorized, ShareError::Unauthorized);
    assert_eq!(
        rejected,
        ShareError::Rejected {
            message: "User c@z.io not found".into()
        }
    );
    assert_ne!(unauthorized, rejected);
}

#[tokio::test]
async fn rejected_share_clears_input_and_shows_the_message() {
    let (backend, service, mut view) = setup();
    backend.push_share_reply(400, r#"{"message":"User nobody@x.com not found"}"#);

    view.set_share_input("nobody@x.com");
    let request = view.begin_share().unwrap().unwrap();
    let result = service.send(request).await;
    view.resolve_share(&result);

    match view.share_form() {
        ShareForm::Editing { input, error } => {
            assert!(input.is_empty());
            assert_eq!(error.as_deref(), Some("User nobody@x.com not found"));
        }
        other => panic!("unexpected form state {other:?}"),
    }
}

#[tokio::test]
async fn transport_failure_keeps_input_for_retry() {
    let (backend, service, mut view) = setup();
    backend.push_share_failure("connection reset");

    view.set_share_input("a@x.com");
    let request = view.begin_share().unwrap().unwrap();
    let result = service.send(request).await;
    assert!(matches!(result, Err(ShareError::Transport(_))));
    view.resolve_share(&result);

    assert_eq!(view.share_form().input(), Some("a@x.com"));
    assert!(!view.share_form().is_pending());
}

#[tokio::test]
async fn blank_recipient_list_sends_nothing() {
    let (backend, service, _) = setup();

    let err = service
        .share(&RunId::new("run-9"), " , ,")
        .await
        .unwrap_err();

    assert_eq!(err, ShareError::NoRecipients);
    assert!(backend.shares().is_empty());
}
