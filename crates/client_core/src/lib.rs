use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::error::ProviderError;

pub mod config;
pub mod gemini;
pub mod prompt;
pub mod session;
pub mod sse;

pub use config::{load_settings, GenerationSettings};
pub use gemini::GeminiClient;
pub use prompt::{build_prompt, GenerationRequest, GENERATION_TEMPERATURE, SYSTEM_INSTRUCTION};
pub use session::{
    drive_session, GenerationTicket, SessionController, SessionEvent, SessionOutcome, SessionPhase,
    SessionState, StartOutcome,
};

/// One incremental piece of generated text. A missing `text` contributes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub text: Option<String>,
}

impl Fragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

pub type FragmentStream = BoxStream<'static, Result<Fragment, ProviderError>>;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Opens one streaming generation. Failures before the first fragment are returned here;
    /// later failures arrive as the stream's final item.
    async fn stream_generate(&self, request: GenerationRequest) -> Result<FragmentStream, ProviderError>;
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
