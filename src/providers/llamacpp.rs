// llama.cpp server provider implementation
//
// POST /completion. The native stream is SSE with `{"content": "...", "stop": bool}`
// payloads, but servers fronting llama.cpp differ, so the decoder also accepts
// bare JSON lines, OpenAI `choices` deltas and Ollama `{response, done}` objects.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::error::BackendError;
use super::http::HttpTransport;
use super::types::{AdapterOptions, BackendDescriptor, GenerationRequest, GenerationResult};
use super::LlmProvider;
use crate::stream::framing::strip_sse_data;
use crate::stream::{Frame, FrameDecoder};

pub struct LlamaCppProvider {
    http: HttpTransport,
}

impl LlamaCppProvider {
    pub fn new(descriptor: BackendDescriptor, options: AdapterOptions) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpTransport::new(descriptor, options)?,
        })
    }

    fn to_completion_request(&self, request: &GenerationRequest) -> CompletionRequest {
        let transcript = request.transcript();
        let prompt = match &request.system_context {
            Some(system) => format!("{}\n\n{}", system, transcript),
            None => transcript,
        };
        CompletionRequest {
            prompt,
            stream: request.stream,
            n_predict: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for LlamaCppProvider {
    fn descriptor(&self) -> &BackendDescriptor {
        self.http.descriptor()
    }

    fn name(&self) -> &str {
        self.http.name()
    }

    async fn probe(&self) -> bool {
        self.http.probe("/health").await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        let body = self.to_completion_request(request);

        if request.stream {
            let session = self
                .http
                .post_stream("/completion", &body, NormalizingDecoder::default())
                .await?;
            return Ok(GenerationResult::Stream(session));
        }

        let response: Value = self.http.post_json("/completion", &body).await?;
        if let Some(error) = error_message(&response) {
            return Err(BackendError::protocol(self.name(), error));
        }
        extract_text(&response)
            .map(GenerationResult::Complete)
            .ok_or_else(|| BackendError::protocol(self.name(), "response carries no generated text"))
    }

    fn active_connections(&self) -> usize {
        self.http.active_connections()
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    n_predict: u32,
    temperature: f32,
}

/// Text from whichever response shape the server used.
fn extract_text(value: &Value) -> Option<String> {
    let as_string = |v: &Value| v.as_str().map(str::to_string);

    if let Some(text) = value.get("content").and_then(as_string) {
        return Some(text);
    }
    if let Some(text) = value.get("response").and_then(as_string) {
        return Some(text);
    }
    let choice = value.get("choices")?.get(0)?;
    choice
        .pointer("/delta/content")
        .and_then(as_string)
        .or_else(|| choice.get("text").and_then(as_string))
        .or_else(|| choice.pointer("/message/content").and_then(as_string))
}

fn error_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(Value::Object(obj.clone()).to_string())),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn is_final(value: &Value) -> bool {
    let flag = |key: &str| value.get(key).and_then(Value::as_bool).unwrap_or(false);
    flag("stop") || flag("done")
}

fn has_finish_reason(value: &Value) -> bool {
    value
        .pointer("/choices/0/finish_reason")
        .map(|v| !v.is_null())
        .unwrap_or(false)
}

/// Accepts every frame shape listed in the module header.
#[derive(Default)]
pub(crate) struct NormalizingDecoder {
    finished_choice: bool,
}

impl FrameDecoder for NormalizingDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Frame, String> {
        let payload = match strip_sse_data(line) {
            Some(data) => data,
            None if line.starts_with(':') || line.starts_with("event:") => return Ok(Frame::Skip),
            None => line.trim(),
        };

        if payload == "[DONE]" {
            return Ok(Frame::Done(String::new()));
        }

        let value: Value =
            serde_json::from_str(payload).map_err(|e| format!("invalid stream frame: {}", e))?;
        if let Some(error) = error_message(&value) {
            return Err(error);
        }

        let text = extract_text(&value).unwrap_or_default();
        if is_final(&value) {
            return Ok(Frame::Done(text));
        }
        if has_finish_reason(&value) {
            self.finished_choice = true;
        }
        Ok(Frame::Text(text))
    }

    /// OpenAI-style streams sometimes close right after the finish_reason chunk.
    fn finish(&mut self) -> Result<(), String> {
        if self.finished_choice {
            Ok(())
        } else {
            Err("stream ended before the completion marker".to_string())
        }
    }
}
