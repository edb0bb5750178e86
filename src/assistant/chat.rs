// Chat session with streamed replies

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::providers::{ChatMessage, GenerationResult, GenerationSettings, Orchestrator, RouteError, Routed};
use crate::stream::StreamEvent;

/// A conversation with the routed model.
///
/// History is append-only. Only the last `window` messages are sent with each
/// request, and a turn is recorded only once its reply completed.
pub struct ChatSession {
    orchestrator: Arc<Orchestrator>,
    settings: GenerationSettings,
    system_prompt: String,
    history: Vec<ChatMessage>,
    window: usize,
}

impl ChatSession {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        settings: GenerationSettings,
        system_prompt: impl Into<String>,
        window: usize,
    ) -> Self {
        Self {
            orchestrator,
            settings,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            window,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The slice of history sent with the next request.
    pub fn window(&self) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(self.window);
        &self.history[start..]
    }

    /// Send `message` and wait for the whole reply.
    pub async fn send(&mut self, message: &str) -> Result<Routed<String>, RouteError> {
        let cancel = CancellationToken::new();
        self.send_streaming(message, &cancel, |_| {}).await
    }

    /// Send `message`, handing each fragment to `on_fragment` as it arrives.
    ///
    /// Cancelling `cancel` stops the stream and closes its connection; the
    /// partial reply is discarded and history is left unchanged.
    pub async fn send_streaming<F>(
        &mut self,
        message: &str,
        cancel: &CancellationToken,
        mut on_fragment: F,
    ) -> Result<Routed<String>, RouteError>
    where
        F: FnMut(&str),
    {
        let message = message.trim();
        let request = self
            .settings
            .request(message)
            .with_system(self.system_prompt.clone())
            .with_history(self.window().to_vec())
            .with_stream(true);

        let routed = self.orchestrator.route_cancellable(&request, cancel).await?;
        let backend = routed.backend.clone();

        let reply = match routed.value {
            GenerationResult::Complete(text) => {
                on_fragment(&text);
                text
            }
            GenerationResult::Stream(mut session) => {
                let mut reply = String::new();
                loop {
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            session.cancel();
                            tracing::debug!("[STREAM] chat reply from {} cancelled", backend);
                            return Err(RouteError::Cancelled);
                        }
                        event = session.next_fragment() => event,
                    };
                    match event {
                        Some(StreamEvent::Fragment(text)) => {
                            on_fragment(&text);
                            reply.push_str(&text);
                        }
                        Some(StreamEvent::End) | None => break,
                        Some(StreamEvent::Error(e)) => return Err(RouteError::from_stream(&backend, e)),
                    }
                }
                reply
            }
        };

        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(reply.clone()));

        Ok(Routed {
            backend: routed.backend,
            value: reply,
            skipped: routed.skipped,
        })
    }
}
