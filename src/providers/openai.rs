// OpenAI-compatible provider implementation
//
// Works for any server speaking the OpenAI chat completions format (LM Studio,
// vLLM, llama.cpp's /v1 endpoints, ...). Streaming uses SSE:
// `data: {"choices":[{"delta":{"content":"..."}}]}` lines, then `data: [DONE]`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::BackendError;
use super::http::HttpTransport;
use super::types::{
    AdapterOptions, BackendDescriptor, ChatMessage, GenerationRequest, GenerationResult,
};
use super::LlmProvider;
use crate::stream::framing::strip_sse_data;
use crate::stream::{Frame, FrameDecoder};

pub struct OpenAiCompatProvider {
    http: HttpTransport,
}

impl OpenAiCompatProvider {
    pub fn new(descriptor: BackendDescriptor, options: AdapterOptions) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpTransport::new(descriptor, options)?,
        })
    }

    fn to_openai_request<'a>(&'a self, request: &'a GenerationRequest) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: self.http.model_for(request),
            messages: request.messages(),
            stream: request.stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn descriptor(&self) -> &BackendDescriptor {
        self.http.descriptor()
    }

    fn name(&self) -> &str {
        self.http.name()
    }

    async fn probe(&self) -> bool {
        self.http.probe("/v1/models").await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        let body = self.to_openai_request(request);

        if request.stream {
            let session = self
                .http
                .post_stream("/v1/chat/completions", &body, SseDecoder)
                .await?;
            return Ok(GenerationResult::Stream(session));
        }

        let response: OpenAiResponse = self.http.post_json("/v1/chat/completions", &body).await?;

        tracing::debug!("Received response from {}", self.name());

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::protocol(self.name(), "response has no choices"))?;
        let content = choice
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| BackendError::protocol(self.name(), "first choice has no message content"))?;

        Ok(GenerationResult::Complete(content))
    }

    fn active_connections(&self) -> usize {
        self.http.active_connections()
    }
}

// ---- wire types ----

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: Option<OpenAiMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// SSE decoder for chat completion chunks.
///
/// A `finish_reason` chunk does not end the stream; only `[DONE]` does.
pub(crate) struct SseDecoder;

impl FrameDecoder for SseDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Frame, String> {
        // Comments (": keep-alive") and other SSE fields carry no text
        let Some(data) = strip_sse_data(line) else {
            return Ok(Frame::Skip);
        };

        if data == "[DONE]" {
            return Ok(Frame::Done(String::new()));
        }

        let chunk: OpenAiStreamChunk =
            serde_json::from_str(data).map_err(|e| format!("invalid SSE chunk: {}", e))?;

        let text = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| {
                if let Some(reason) = &choice.finish_reason {
                    tracing::trace!("finish_reason: {}", reason);
                }
                choice.delta.and_then(|d| d.content)
            })
            .unwrap_or_default();

        Ok(Frame::Text(text))
    }
}
