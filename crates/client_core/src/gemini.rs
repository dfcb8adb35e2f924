use std::{collections::VecDeque, fmt::Display};

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use reqwest::Client;
use shared::{
    error::ProviderError,
    protocol::{ErrorEnvelope, GenerateContentChunk, GenerateContentRequest},
};
use tracing::{debug, info, warn};

use crate::{
    config::GenerationSettings, prompt::GenerationRequest, sse::SseDecoder, Fragment,
    FragmentStream, GenerationProvider,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Streaming client for the Gemini generative-language REST API.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(settings: &GenerationSettings) -> Self {
        Self::with_http_client(Client::new(), settings)
    }

    pub fn with_http_client(http: Client, settings: &GenerationSettings) -> Self {
        Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        )
    }
}

#[async_trait]
impl GenerationProvider for GeminiClient {
    async fn stream_generate(&self, request: GenerationRequest) -> Result<FragmentStream, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(ProviderError::missing_credential)?;

        let body = GenerateContentRequest::from(&request);
        let url = self.stream_url(&request.model);
        debug!(model = %request.model, "opening gemini stream");

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::transport(format!("failed to reach generation endpoint: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = api_error_message(&raw)
                .unwrap_or_else(|| format!("generation endpoint returned {status}"));
            warn!(status = status.as_u16(), "gemini request rejected: {message}");
            return Err(ProviderError::api(Some(status.as_u16()), message));
        }

        info!(model = %request.model, "gemini stream opened");
        Ok(decode_fragment_stream(response.bytes_stream()))
    }
}

fn api_error_message(raw: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(raw)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .filter(|message| !message.trim().is_empty())
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turns a raw SSE byte stream into fragments, ending after the first error.
pub fn decode_fragment_stream<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                let item = parse_payload(&payload);
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            let decoded = match state.body.next().await {
                Some(Ok(chunk)) => state.decoder.push(chunk.as_ref()),
                Some(Err(err)) => Err(ProviderError::transport(format!(
                    "generation stream interrupted: {err}"
                ))),
                None => {
                    state.finished = true;
                    state.decoder.finish()
                }
            };
            match decoded {
                Ok(payloads) => state.pending.extend(payloads),
                Err(err) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
    .boxed()
}

fn parse_payload(payload: &str) -> Result<Fragment, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|err| ProviderError::malformed(format!("invalid stream payload: {err}")))?;

    if value.get("error").is_some() {
        let envelope: ErrorEnvelope = serde_json::from_value(value)
            .map_err(|err| ProviderError::malformed(format!("invalid error payload: {err}")))?;
        return Err(ProviderError::api(
            envelope.error.code,
            envelope.error.message.unwrap_or_default(),
        ));
    }

    let chunk: GenerateContentChunk = serde_json::from_value(value)
        .map_err(|err| ProviderError::malformed(format!("invalid response chunk: {err}")))?;
    if let Some(reason) = chunk.block_reason() {
        warn!(reason, "provider blocked the prompt");
    }
    Ok(Fragment { text: chunk.text() })
}
