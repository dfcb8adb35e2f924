//! Runtime bridge between UI command queue and backend event intake.

use std::{ops::ControlFlow, sync::Arc, thread};

use client_core::{
    drive_session, GeminiClient, GenerationProvider, GenerationSettings, SessionEvent,
};
use crossbeam_channel::{Receiver, Sender};
use shared::error::ProviderError;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

/// Wakes the UI after an event has been queued.
pub type RepaintHandle = Arc<dyn Fn() + Send + Sync>;

pub fn launch(
    settings: GenerationSettings,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
    repaint: RepaintHandle,
) -> thread::JoinHandle<()> {
    let provider: Arc<dyn GenerationProvider> = Arc::new(GeminiClient::new(&settings));
    launch_with_provider(provider, cmd_rx, ui_tx, repaint)
}

pub fn launch_with_provider(
    provider: Arc<dyn GenerationProvider>,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
    repaint: RepaintHandle,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                tracing::error!("failed to build backend runtime: {err}");
                let message = format!("backend worker startup failure: failed to build runtime: {err}");
                let _ = ui_tx.send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    message.clone(),
                )));
                repaint();
                reject_pending_commands(&cmd_rx, &ui_tx, &repaint, &message);
                return;
            }
        };

        runtime.block_on(async move {
            let _ = ui_tx.send(UiEvent::Info("就绪".to_string()));
            repaint();

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::Generate(ticket) => {
                        let provider = Arc::clone(&provider);
                        let ui_tx = ui_tx.clone();
                        let repaint = Arc::clone(&repaint);
                        tokio::spawn(async move {
                            let outcome = drive_session(provider.as_ref(), ticket, |event| {
                                forward_event(&ui_tx, &repaint, event)
                            })
                            .await;
                            tracing::debug!(?outcome, "generation task finished");
                        });
                    }
                }
            }
            tracing::info!("ui command channel closed; backend worker exiting");
        });
    })
}

fn forward_event(
    ui_tx: &Sender<UiEvent>,
    repaint: &RepaintHandle,
    event: SessionEvent,
) -> ControlFlow<()> {
    match ui_tx.send(UiEvent::Session(event)) {
        Ok(()) => {
            repaint();
            ControlFlow::Continue(())
        }
        Err(_) => ControlFlow::Break(()),
    }
}

/// Without a runtime every queued session fails so the form unlocks.
fn reject_pending_commands(
    cmd_rx: &Receiver<BackendCommand>,
    ui_tx: &Sender<UiEvent>,
    repaint: &RepaintHandle,
    message: &str,
) {
    while let Ok(cmd) = cmd_rx.recv() {
        let event = SessionEvent::Failed {
            session_id: cmd.session_id(),
            error: ProviderError::transport(message),
        };
        if forward_event(ui_tx, repaint, event).is_break() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use client_core::{Fragment, FragmentStream, GenerationRequest, GenerationTicket};
    use crossbeam_channel::{bounded, unbounded};
    use futures::stream;
    use shared::domain::{FormInput, SessionId};

    struct FixedProvider(Vec<&'static str>);

    #[async_trait]
    impl GenerationProvider for FixedProvider {
        async fn stream_generate(&self, _request: GenerationRequest) -> Result<FragmentStream, ProviderError> {
            let items: Vec<Result<Fragment, ProviderError>> =
                self.0.iter().map(|text| Ok(Fragment::new(*text))).collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn ticket(id: u64) -> GenerationTicket {
        GenerationTicket {
            session_id: SessionId(id),
            request: GenerationRequest::from_form("gemini-test", &FormInput::default()),
        }
    }

    #[test]
    fn forwards_session_events_in_order_and_requests_repaint() {
        let (cmd_tx, cmd_rx) = bounded(4);
        let (ui_tx, ui_rx) = unbounded();
        let repaints = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&repaints);
        let handle = launch_with_provider(
            Arc::new(FixedProvider(vec!["A", "B", "C"])),
            cmd_rx,
            ui_tx,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        cmd_tx
            .send(BackendCommand::Generate(ticket(7)))
            .expect("queue command");

        let mut texts = String::new();
        loop {
            match ui_rx.recv_timeout(Duration::from_secs(5)).expect("ui event") {
                UiEvent::Session(SessionEvent::Fragment { session_id, text }) => {
                    assert_eq!(session_id, SessionId(7));
                    texts.push_str(&text);
                }
                UiEvent::Session(SessionEvent::Completed { session_id }) => {
                    assert_eq!(session_id, SessionId(7));
                    break;
                }
                UiEvent::Session(SessionEvent::Failed { error, .. }) => panic!("unexpected failure {error}"),
                UiEvent::Info(_) | UiEvent::Error(_) => {}
            }
        }
        assert_eq!(texts, "ABC");
        assert!(repaints.load(Ordering::SeqCst) >= 4);

        drop(cmd_tx);
        handle.join().expect("backend thread");
    }

    #[test]
    fn rejected_commands_fail_their_session() {
        let (cmd_tx, cmd_rx) = bounded(4);
        let (ui_tx, ui_rx) = unbounded();
        cmd_tx
            .send(BackendCommand::Generate(ticket(3)))
            .expect("queue command");
        drop(cmd_tx);

        reject_pending_commands(&cmd_rx, &ui_tx, &(Arc::new(|| {}) as RepaintHandle), "no runtime");

        match ui_rx.try_recv().expect("event") {
            UiEvent::Session(SessionEvent::Failed { session_id, error }) => {
                assert_eq!(session_id, SessionId(3));
                assert_eq!(error.message, "no runtime");
            }
            _ => panic!("expected a failed session"),
        }
    }
}
