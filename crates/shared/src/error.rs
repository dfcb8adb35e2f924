use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shown when the provider fails without a usable description.
pub const GENERIC_FAILURE_MESSAGE: &str = "生成过程中发生错误，请重试。";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("请输入故事大纲")]
    EmptyOutline,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseOptionError {
    #[error("unknown genre id '{0}'")]
    UnknownGenre(String),
    #[error("unknown length id '{0}'")]
    UnknownLength(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    MissingCredential,
    Transport,
    Api,
    MalformedStream,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn missing_credential() -> Self {
        Self::new(
            ProviderErrorKind::MissingCredential,
            "GEMINI_API_KEY is not set; configure an API key and retry",
        )
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message)
    }

    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Api,
            status,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedStream, message)
    }

    /// Text for the error banner; blank provider messages fall back to the generic one.
    pub fn user_message(&self) -> String {
        let message = self.message.trim();
        if message.is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_provider_message_falls_back_to_generic_text() {
        let err = ProviderError::api(Some(500), "   ");
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn provider_message_is_surfaced_trimmed() {
        let err = ProviderError::transport(" connection reset by peer\n");
        assert_eq!(err.user_message(), "connection reset by peer");
        assert_eq!(err.kind, ProviderErrorKind::Transport);
        assert_eq!(err.status, None);
    }

    #[test]
    fn validation_error_reads_as_user_prompt() {
        assert_eq!(ValidationError::EmptyOutline.to_string(), "请输入故事大纲");
    }
}
