//! Generation session state machine and stream driver.

use std::ops::ControlFlow;

use futures::StreamExt;
use shared::{
    domain::{FormInput, Genre, SessionId, TargetLength},
    error::{ProviderError, ValidationError},
};
use tracing::{debug, error, info, trace, warn};

use crate::{prompt::GenerationRequest, GenerationProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Generating,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    phase: SessionPhase,
    accumulated_text: String,
    error_message: String,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_generating(&self) -> bool {
        self.phase == SessionPhase::Generating
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn has_error(&self) -> bool {
        !self.error_message.is_empty()
    }

    /// Characters produced so far; a CJK word count is a character count.
    pub fn character_count(&self) -> usize {
        self.accumulated_text
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .count()
    }
}

/// An accepted attempt, ready to be driven against a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTicket {
    pub session_id: SessionId,
    pub request: GenerationRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(GenerationTicket),
    AlreadyGenerating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Fragment {
        session_id: SessionId,
        text: String,
    },
    Completed {
        session_id: SessionId,
    },
    Failed {
        session_id: SessionId,
        error: ProviderError,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Fragment { session_id, .. }
            | Self::Completed { session_id }
            | Self::Failed { session_id, .. } => *session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment { .. })
    }
}

/// Owns the form and the session state. All mutation happens on the caller's thread.
#[derive(Debug)]
pub struct SessionController {
    model: String,
    form: FormInput,
    state: SessionState,
    active_session: Option<SessionId>,
    last_session: SessionId,
}

impl SessionController {
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_form(model, FormInput::default())
    }

    pub fn with_form(model: impl Into<String>, form: FormInput) -> Self {
        Self {
            model: model.into(),
            form,
            state: SessionState::default(),
            active_session: None,
            last_session: SessionId(0),
        }
    }

    pub fn form(&self) -> &FormInput {
        &self.form
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    pub fn set_outline(&mut self, outline: impl Into<String>) {
        self.form.outline = outline.into();
    }

    pub fn set_genre(&mut self, genre: Genre) {
        self.form.genre = genre;
    }

    pub fn set_target_length(&mut self, target_length: TargetLength) {
        self.form.target_length = target_length;
    }

    pub fn start_generation(&mut self) -> Result<StartOutcome, ValidationError> {
        if self.state.is_generating() {
            debug!(
                session = ?self.active_session,
                "generation already in progress; ignoring start request"
            );
            return Ok(StartOutcome::AlreadyGenerating);
        }

        if !self.form.has_outline() {
            let err = ValidationError::EmptyOutline;
            self.state.error_message = err.to_string();
            return Err(err);
        }

        let session_id = self.last_session.next();
        self.last_session = session_id;
        self.active_session = Some(session_id);
        self.state.error_message.clear();
        self.state.accumulated_text.clear();
        self.state.phase = SessionPhase::Generating;

        info!(
            session = %session_id,
            genre = %self.form.genre,
            length = %self.form.target_length,
            "generation session accepted"
        );
        Ok(StartOutcome::Started(GenerationTicket {
            session_id,
            request: GenerationRequest::from_form(self.model.clone(), &self.form),
        }))
    }

    /// Applies one stream event. Events from any session but the active one are dropped.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        if self.active_session != Some(event.session_id()) {
            debug!(
                session = %event.session_id(),
                active = ?self.active_session,
                "discarding event from stale session"
            );
            return false;
        }

        match event {
            SessionEvent::Fragment { session_id, text } => {
                trace!(session = %session_id, len = text.len(), "fragment appended");
                self.state.accumulated_text.push_str(&text);
            }
            SessionEvent::Completed { session_id } => {
                self.finish();
                info!(
                    session = %session_id,
                    chars = self.state.character_count(),
                    "generation session completed"
                );
            }
            SessionEvent::Failed { session_id, error } => {
                self.finish();
                self.state.error_message = error.user_message();
                warn!(
                    session = %session_id,
                    kind = ?error.kind,
                    kept_chars = self.state.character_count(),
                    "generation session failed: {}",
                    error.message
                );
            }
        }
        true
    }

    fn finish(&mut self) {
        self.state.phase = SessionPhase::Idle;
        self.active_session = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { fragments: usize },
    Failed { fragments: usize },
    /// The event sink went away before the stream ended.
    Abandoned { fragments: usize },
}

/// Consumes one provider stream, forwarding every fragment then exactly one terminal event.
pub async fn drive_session<P, F>(provider: &P, ticket: GenerationTicket, mut emit: F) -> SessionOutcome
where
    P: GenerationProvider + ?Sized,
    F: FnMut(SessionEvent) -> ControlFlow<()>,
{
    let GenerationTicket {
        session_id,
        request,
    } = ticket;

    let mut stream = match provider.stream_generate(request).await {
        Ok(stream) => stream,
        Err(error) => {
            error!(session = %session_id, "failed to open generation stream: {error}");
            let _ = emit(SessionEvent::Failed { session_id, error });
            return SessionOutcome::Failed { fragments: 0 };
        }
    };

    let mut fragments = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                fragments += 1;
                let event = SessionEvent::Fragment {
                    session_id,
                    text: fragment.text.unwrap_or_default(),
                };
                if emit(event).is_break() {
                    warn!(session = %session_id, fragments, "event sink closed; abandoning stream");
                    return SessionOutcome::Abandoned { fragments };
                }
            }
            Err(error) => {
                error!(session = %session_id, fragments, "generation stream failed: {error}");
                let _ = emit(SessionEvent::Failed { session_id, error });
                return SessionOutcome::Failed { fragments };
            }
        }
    }

    info!(session = %session_id, fragments, "generation stream finished");
    let _ = emit(SessionEvent::Completed { session_id });
    SessionOutcome::Completed { fragments }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
