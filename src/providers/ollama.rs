// Ollama provider implementation
//
// POST /api/generate, NDJSON streaming (`{"response": "...", "done": false}`
// per line, `done: true` on the last one). Health check is GET /api/tags.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::BackendError;
use super::http::HttpTransport;
use super::types::{AdapterOptions, BackendDescriptor, GenerationRequest, GenerationResult};
use super::LlmProvider;
use crate::config::constants::{OLLAMA_REPEAT_PENALTY, OLLAMA_TOP_P};
use crate::stream::{Frame, FrameDecoder};

pub struct OllamaProvider {
    http: HttpTransport,
}

impl OllamaProvider {
    pub fn new(descriptor: BackendDescriptor, options: AdapterOptions) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpTransport::new(descriptor, options)?,
        })
    }

    fn to_ollama_request<'a>(&'a self, request: &'a GenerationRequest) -> OllamaRequest<'a> {
        OllamaRequest {
            model: self.http.model_for(request),
            prompt: request.transcript(),
            system: request.system_context.as_deref(),
            stream: request.stream,
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: OLLAMA_TOP_P,
                repeat_penalty: OLLAMA_REPEAT_PENALTY,
                num_ctx: request.num_ctx,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn descriptor(&self) -> &BackendDescriptor {
        self.http.descriptor()
    }

    fn name(&self) -> &str {
        self.http.name()
    }

    async fn probe(&self) -> bool {
        self.http.probe("/api/tags").await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        let body = self.to_ollama_request(request);

        if request.stream {
            let session = self
                .http
                .post_stream("/api/generate", &body, NdjsonDecoder)
                .await?;
            return Ok(GenerationResult::Stream(session));
        }

        let response: OllamaResponse = self.http.post_json("/api/generate", &body).await?;
        if let Some(error) = response.error {
            return Err(BackendError::protocol(self.name(), error));
        }
        match response.response {
            Some(text) => Ok(GenerationResult::Complete(text)),
            None => Err(BackendError::protocol(
                self.name(),
                "response body has no 'response' field",
            )),
        }
    }

    fn active_connections(&self) -> usize {
        self.http.active_connections()
    }
}

// ---- wire types ----

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    num_ctx: u32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// One JSON object per line; `done: true` terminates.
pub(crate) struct NdjsonDecoder;

impl FrameDecoder for NdjsonDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Frame, String> {
        let chunk: OllamaResponse =
            serde_json::from_str(line).map_err(|e| format!("invalid NDJSON frame: {}", e))?;

        if let Some(error) = chunk.error {
            return Err(error);
        }
        let text = chunk.response.unwrap_or_default();
        if chunk.done {
            Ok(Frame::Done(text))
        } else {
            Ok(Frame::Text(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::BackendKind;
    use crate::stream::StreamEvent;
    use mockito::Matcher;
    use serde_json::json;

    fn provider(url: &str) -> OllamaProvider {
        OllamaProvider::new(
            BackendDescriptor::new(BackendKind::Ollama, url, 0),
            AdapterOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let p = provider("http://localhost:11434");
        let req = GenerationRequest::new("list files")
            .with_system("You are a shell assistant")
            .with_temperature(0.2)
            .with_max_tokens(128);
        let value = serde_json::to_value(p.to_ollama_request(&req)).unwrap();
        assert_eq!(value["model"], "gemma2:2b");
        assert_eq!(value["prompt"], "list files");
        assert_eq!(value["system"], "You are a shell assistant");
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 128);
        assert_eq!(value["options"]["num_ctx"], 4096);
        assert!(value["options"]["top_p"].as_f64().is_some());
    }

    #[test]
    fn test_system_omitted_when_absent() {
        let p = provider("http://localhost:11434");
        let req = GenerationRequest::new("x");
        let value = serde_json::to_value(p.to_ollama_request(&req)).unwrap();
        assert!(value.get("system").is_none());
    }

    #[test]
    fn test_ndjson_decoder() {
        let mut d = NdjsonDecoder;
        assert_eq!(
            d.decode_line(r#"{"model":"m","response":"ls","done":false}"#).unwrap(),
            Frame::Text("ls".to_string())
        );
        assert_eq!(
            d.decode_line(r#"{"response":"","done":true,"total_duration":1}"#).unwrap(),
            Frame::Done(String::new())
        );
        assert!(d.decode_line(r#"{"error":"model not found"}"#).is_err());
        assert!(d.decode_line("not json").is_err());
    }

    #[tokio::test]
    async fn test_generate_complete() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"stream": false, "model": "gemma2:2b"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"model":"gemma2:2b","response":"{\"cmd\": \"ls -la\"}","done":true}"#)
            .create_async()
            .await;

        let p = provider(&server.url());
        let result = p.generate(&GenerationRequest::new("list")).await.unwrap();
        assert!(!result.is_stream());
        assert_eq!(result.into_text().await.unwrap(), "{\"cmd\": \"ls -la\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_stream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(
                "{\"response\":\"git \",\"done\":false}\n\
                 {\"response\":\"status\",\"done\":false}\n\
                 {\"response\":\"\",\"done\":true}\n",
            )
            .create_async()
            .await;

        let p = provider(&server.url());
        let result = p
            .generate(&GenerationRequest::new("status").with_stream(true))
            .await
            .unwrap();
        let GenerationResult::Stream(mut session) = result else {
            panic!("expected a stream");
        };
        assert_eq!(session.next_fragment().await, Some(StreamEvent::Fragment("git ".into())));
        assert_eq!(session.next_fragment().await, Some(StreamEvent::Fragment("status".into())));
        assert_eq!(session.next_fragment().await, Some(StreamEvent::End));
        assert_eq!(session.next_fragment().await, None);
    }

    #[tokio::test]
    async fn test_stream_without_done_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("{\"response\":\"ls\",\"done\":false}\n")
            .create_async()
            .await;

        let p = provider(&server.url());
        let result = p
            .generate(&GenerationRequest::new("x").with_stream(true))
            .await
            .unwrap();
        let err = result.into_text().await.unwrap_err();
        assert!(matches!(err, BackendError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_missing_response_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"done":true}"#)
            .create_async()
            .await;

        let p = provider(&server.url());
        let err = p.generate(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, BackendError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_probe() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[]}"#)
            .create_async()
            .await;

        assert!(provider(&server.url()).probe().await);
        assert!(!provider("http://127.0.0.1:1").probe().await);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let p = provider("http://127.0.0.1:1");
        let err = p.generate(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
        assert_eq!(p.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_stream_matches_complete() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"stream": false})))
            .with_status(200)
            .with_body(r#"{"response":"tar -czf logs.tgz logs/","done":true}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(
                "{\"response\":\"tar -czf \",\"done\":false}\n\
                 {\"response\":\"logs.tgz\",\"done\":false}\n\
                 {\"response\":\" logs/\",\"done\":true}\n",
            )
            .create_async()
            .await;

        let p = provider(&server.url());
        let request = GenerationRequest::new("archive the logs");

        let complete = p.generate(&request).await.unwrap();
        let GenerationResult::Complete(expected) = complete else {
            panic!("expected a complete result");
        };
        let streamed = p.generate(&request.clone().with_stream(true)).await.unwrap();
        assert!(streamed.is_stream());
        assert_eq!(streamed.into_text().await.unwrap(), expected);
    }
}
