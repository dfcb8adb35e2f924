use super::*;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use futures::stream;
use shared::error::{ProviderErrorKind, GENERIC_FAILURE_MESSAGE};

use crate::{Fragment, FragmentStream};

struct ScriptedProvider {
    open_error: Option<ProviderError>,
    items: Vec<Result<Fragment, ProviderError>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    fn fragments(texts: &[&str]) -> Self {
        Self::items(texts.iter().map(|text| Ok(Fragment::new(*text))).collect())
    }

    fn items(items: Vec<Result<Fragment, ProviderError>>) -> Self {
        Self {
            open_error: None,
            items,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn refusing(error: ProviderError) -> Self {
        let mut provider = Self::items(Vec::new());
        provider.open_error = Some(error);
        provider
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn stream_generate(&self, request: GenerationRequest) -> Result<FragmentStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        Ok(Box::pin(stream::iter(self.items.clone())))
    }
}

fn controller_with_outline(outline: &str) -> SessionController {
    let mut controller = SessionController::new("gemini-test");
    controller.set_outline(outline);
    controller
}

fn started(controller: &mut SessionController) -> GenerationTicket {
    match controller.start_generation().expect("valid form") {
        StartOutcome::Started(ticket) => ticket,
        StartOutcome::AlreadyGenerating => panic!("expected a new session"),
    }
}

async fn run_to_end(
    controller: &mut SessionController,
    provider: &ScriptedProvider,
) -> SessionOutcome {
    let ticket = started(controller);
    let mut events = Vec::new();
    let outcome = drive_session(provider, ticket, |event| {
        events.push(event);
        ControlFlow::Continue(())
    })
    .await;
    for event in events {
        assert!(controller.apply(event));
    }
    outcome
}

#[test]
fn starts_idle_and_empty() {
    let controller = SessionController::new("gemini-test");
    let state = controller.state();
    assert_eq!(state.phase(), SessionPhase::Idle);
    assert_eq!(state.accumulated_text(), "");
    assert_eq!(state.error_message(), "");
    assert_eq!(controller.active_session(), None);
}

#[tokio::test]
async fn blank_outlines_fail_validation_without_calling_provider() {
    let provider = ScriptedProvider::fragments(&["never"]);
    for outline in ["", " ", "\n\t  \r\n", "\u{3000}"] {
        let mut controller = controller_with_outline(outline);
        let started = controller.start_generation();
        if let Ok(StartOutcome::Started(ticket)) = started.clone() {
            drive_session(&provider, ticket, |_| ControlFlow::Continue(())).await;
        }

        assert_eq!(started, Err(ValidationError::EmptyOutline));
        assert_eq!(controller.state().error_message(), "请输入故事大纲");
        assert_eq!(controller.state().phase(), SessionPhase::Idle);
        assert_eq!(controller.active_session(), None);
    }
    assert_eq!(provider.calls(), 0);
}

#[test]
fn validation_failure_keeps_previous_output() {
    let mut controller = controller_with_outline("旧故事");
    let ticket = started(&mut controller);
    controller.apply(SessionEvent::Fragment {
        session_id: ticket.session_id,
        text: "# 旧标题".into(),
    });
    controller.apply(SessionEvent::Completed {
        session_id: ticket.session_id,
    });

    controller.set_outline("   ");
    assert!(controller.start_generation().is_err());
    assert_eq!(controller.state().accumulated_text(), "# 旧标题");
}

#[tokio::test]
async fn fragments_are_appended_in_arrival_order() {
    let provider = ScriptedProvider::fragments(&["A", "B", "C"]);
    let mut controller = controller_with_outline("outline");

    let outcome = run_to_end(&mut controller, &provider).await;

    assert_eq!(outcome, SessionOutcome::Completed { fragments: 3 });
    assert_eq!(controller.state().accumulated_text(), "ABC");
    assert_eq!(controller.state().phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn empty_and_textless_fragments_contribute_nothing() {
    let provider = ScriptedProvider::items(vec![
        Ok(Fragment::new("A")),
        Ok(Fragment::new("")),
        Ok(Fragment::default()),
        Ok(Fragment::new("C")),
    ]);
    let mut controller = controller_with_outline("outline");

    run_to_end(&mut controller, &provider).await;

    assert_eq!(controller.state().accumulated_text(), "AC");
}

#[test]
fn second_start_while_generating_is_a_no_op() {
    let mut controller = controller_with_outline("outline");
    let ticket = started(&mut controller);
    controller.apply(SessionEvent::Fragment {
        session_id: ticket.session_id,
        text: "partial".into(),
    });

    let outcome = controller.start_generation().expect("guard is not an error");

    assert_eq!(outcome, StartOutcome::AlreadyGenerating);
    assert_eq!(controller.active_session(), Some(ticket.session_id));
    assert_eq!(controller.state().accumulated_text(), "partial");
    assert!(controller.state().is_generating());
}

#[test]
fn guard_applies_even_when_outline_was_cleared_mid_generation() {
    let mut controller = controller_with_outline("outline");
    started(&mut controller);
    controller.set_outline("");

    assert_eq!(
        controller.start_generation().expect("no validation while busy"),
        StartOutcome::AlreadyGenerating
    );
    assert_eq!(controller.state().error_message(), "");
}

#[tokio::test]
async fn failure_after_partial_output_keeps_text_and_sets_error() {
    let provider = ScriptedProvider::items(vec![
        Ok(Fragment::new("Once ")),
        Ok(Fragment::new("upon")),
        Err(ProviderError::transport("connection reset")),
    ]);
    let mut controller = controller_with_outline("outline");

    let outcome = run_to_end(&mut controller, &provider).await;

    assert_eq!(outcome, SessionOutcome::Failed { fragments: 2 });
    assert_eq!(controller.state().accumulated_text(), "Once upon");
    assert_eq!(controller.state().error_message(), "connection reset");
    assert_eq!(controller.state().phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn failure_to_open_stream_surfaces_provider_message() {
    let provider = ScriptedProvider::refusing(ProviderError::missing_credential());
    let mut controller = controller_with_outline("outline");

    let outcome = run_to_end(&mut controller, &provider).await;

    assert_eq!(outcome, SessionOutcome::Failed { fragments: 0 });
    assert!(controller.state().error_message().contains("GEMINI_API_KEY"));
    assert!(!controller.state().is_generating());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn blank_provider_error_uses_generic_message() {
    let provider = ScriptedProvider::items(vec![Err(ProviderError::api(Some(500), ""))]);
    let mut controller = controller_with_outline("outline");

    run_to_end(&mut controller, &provider).await;

    assert_eq!(controller.state().error_message(), GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn retry_after_failure_resets_error_and_text() {
    let failing = ScriptedProvider::items(vec![
        Ok(Fragment::new("half")),
        Err(ProviderError::malformed("bad chunk")),
    ]);
    let mut controller = controller_with_outline("outline");
    run_to_end(&mut controller, &failing).await;
    assert!(controller.state().has_error());

    let ticket = started(&mut controller);
    assert_eq!(controller.state().error_message(), "");
    assert_eq!(controller.state().accumulated_text(), "");

    controller.apply(SessionEvent::Fragment {
        session_id: ticket.session_id,
        text: "fresh".into(),
    });
    controller.apply(SessionEvent::Completed {
        session_id: ticket.session_id,
    });
    assert_eq!(controller.state().accumulated_text(), "fresh");
    assert!(!controller.state().has_error());
}

#[test]
fn stale_session_events_are_discarded() {
    let mut controller = controller_with_outline("outline");
    let first = started(&mut controller);
    controller.apply(SessionEvent::Failed {
        session_id: first.session_id,
        error: ProviderError::transport("dropped"),
    });

    let second = started(&mut controller);
    assert!(second.session_id > first.session_id);

    let applied = controller.apply(SessionEvent::Fragment {
        session_id: first.session_id,
        text: "late fragment".into(),
    });
    assert!(!applied);
    let applied = controller.apply(SessionEvent::Completed {
        session_id: first.session_id,
    });
    assert!(!applied);

    assert_eq!(controller.state().accumulated_text(), "");
    assert!(controller.state().is_generating());
}

#[test]
fn events_after_completion_are_ignored() {
    let mut controller = controller_with_outline("outline");
    let ticket = started(&mut controller);
    controller.apply(SessionEvent::Completed {
        session_id: ticket.session_id,
    });

    let applied = controller.apply(SessionEvent::Fragment {
        session_id: ticket.session_id,
        text: "tail".into(),
    });
    assert!(!applied);
    assert_eq!(controller.state().accumulated_text(), "");
}

#[tokio::test]
async fn form_edits_after_success_do_not_touch_output() {
    let provider = ScriptedProvider::fragments(&["# 标题\n\n", "## 第一章\n\n正文"]);
    let mut controller = controller_with_outline("outline");
    run_to_end(&mut controller, &provider).await;
    let before = controller.state().clone();

    controller.set_genre(Genre::Mystery);
    controller.set_target_length(TargetLength::Long);
    controller.set_outline("另一个故事");

    assert_eq!(controller.state(), &before);
}

#[test]
fn ticket_snapshots_form_at_start() {
    let mut controller = controller_with_outline("原始大纲");
    controller.set_genre(Genre::Xianxia);
    let ticket = started(&mut controller);

    controller.set_outline("修改后的大纲");
    controller.set_genre(Genre::Urban);

    assert!(ticket.request.prompt.contains("原始大纲"));
    assert!(ticket.request.prompt.contains("修仙题材"));
    assert!(!ticket.request.prompt.contains("修改后的大纲"));
}

#[tokio::test]
async fn end_to_end_scifi_medium_generation() {
    let provider = ScriptedProvider::fragments(&[
        "# 现实编辑者\n\n",
        "## 第一章 异常的代码\n\n",
        "凌晨两点，屏幕上的光标还在闪烁。",
    ]);
    let mut controller = controller_with_outline("A programmer discovers reality-editing code");
    controller.set_genre(Genre::Scifi);
    controller.set_target_length(TargetLength::Medium);

    let outcome = run_to_end(&mut controller, &provider).await;

    assert_eq!(outcome, SessionOutcome::Completed { fragments: 3 });
    let requests = provider.requests.lock().expect("requests lock");
    let prompt = &requests[0].prompt;
    assert!(prompt.contains("科幻题材"));
    assert!(prompt.contains("20000"));
    assert!(prompt.contains("A programmer discovers reality-editing code"));
    assert_eq!(requests[0].model, "gemini-test");

    let state = controller.state();
    assert_eq!(state.phase(), SessionPhase::Idle);
    assert_eq!(state.error_message(), "");
    assert!(!state.accumulated_text().is_empty());
    assert!(state.accumulated_text().starts_with("# 现实编辑者"));
}

#[tokio::test]
async fn closed_sink_abandons_the_stream() {
    let provider = ScriptedProvider::fragments(&["one", "two", "three"]);
    let mut controller = controller_with_outline("outline");
    let ticket = started(&mut controller);

    let mut seen = 0;
    let outcome = drive_session(&provider, ticket, |_| {
        seen += 1;
        if seen == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .await;

    assert_eq!(outcome, SessionOutcome::Abandoned { fragments: 2 });
}

#[tokio::test]
async fn driver_emits_exactly_one_terminal_event() {
    let provider = ScriptedProvider::items(vec![
        Ok(Fragment::new("x")),
        Err(ProviderError::api(Some(429), "quota exceeded")),
    ]);
    let mut controller = controller_with_outline("outline");
    let ticket = started(&mut controller);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    drive_session(&provider, ticket, move |event| {
        sink.lock().expect("events lock").push(event);
        ControlFlow::Continue(())
    })
    .await;

    let events = events.lock().expect("events lock");
    let terminal: Vec<&SessionEvent> = events.iter().filter(|event| event.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    match terminal[0] {
        SessionEvent::Failed { error, .. } => {
            assert_eq!(error.kind, ProviderErrorKind::Api);
            assert_eq!(error.status, Some(429));
        }
        other => panic!("unexpected terminal event {other:?}"),
    }
    assert!(events.last().expect("events").is_terminal());
}

#[test]
fn character_count_ignores_whitespace() {
    let mut controller = controller_with_outline("outline");
    let ticket = started(&mut controller);
    controller.apply(SessionEvent::Fragment {
        session_id: ticket.session_id,
        text: "# 标题\n\n正文 abc".into(),
    });
    assert_eq!(controller.state().character_count(), 8);
}
