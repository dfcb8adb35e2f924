//! UI/backend events and error modeling for the desktop GUI controller.

use client_core::SessionEvent;
use shared::error::{ProviderError, ProviderErrorKind};

pub enum UiEvent {
    Info(String),
    Session(SessionEvent),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Credential,
    Quota,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Generation,
    Clipboard,
    General,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("api key")
            || message_lower.contains("api_key")
            || message_lower.contains("401")
            || message_lower.contains("403")
            || message_lower.contains("permission denied")
            || message_lower.contains("unauthenticated")
        {
            UiErrorCategory::Credential
        } else if message_lower.contains("429")
            || message_lower.contains("quota")
            || message_lower.contains("resource_exhausted")
            || message_lower.contains("rate limit")
        {
            UiErrorCategory::Quota
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("transport")
            || message_lower.contains("unavailable")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("malformed")
        {
            UiErrorCategory::Validation
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn from_provider(error: &ProviderError) -> Self {
        let category = match (error.kind, error.status) {
            (ProviderErrorKind::MissingCredential, _) => UiErrorCategory::Credential,
            (ProviderErrorKind::Transport, _) => UiErrorCategory::Transport,
            (ProviderErrorKind::MalformedStream, _) => UiErrorCategory::Validation,
            (ProviderErrorKind::Api, Some(401 | 403)) => UiErrorCategory::Credential,
            (ProviderErrorKind::Api, Some(429)) => UiErrorCategory::Quota,
            (ProviderErrorKind::Api, _) => {
                return Self::from_message(UiErrorContext::Generation, error.message.clone())
            }
        };
        Self {
            category,
            context: UiErrorContext::Generation,
            message: error.message.clone(),
        }
    }

    pub fn requires_reconfigure(&self) -> bool {
        self.category == UiErrorCategory::Credential
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Shown next to the session error when the fix lives outside the form.
    pub fn hint(&self) -> Option<&'static str> {
        match self.category() {
            UiErrorCategory::Credential => {
                Some("请检查 GEMINI_API_KEY 或配置文件中的 api_key。")
            }
            UiErrorCategory::Quota => Some("请求过于频繁或额度已用尽，请稍后再试。"),
            UiErrorCategory::Transport => Some("网络连接异常，请检查网络后重试。"),
            UiErrorCategory::Validation | UiErrorCategory::Unknown => None,
        }
    }
}
