// StreamingSession - the caller-facing half of a streaming generation

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::providers::BackendError;

/// One item of a streaming generation.
///
/// A session yields zero or more `Fragment`s followed by exactly one
/// terminal event (`End` or `Error`).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    End,
    Error(BackendError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment(_))
    }
}

/// Lazy sequence of text fragments from one backend.
///
/// Dropping the session or calling [`cancel`](Self::cancel) stops the reader
/// task and closes the underlying connection.
pub struct StreamingSession {
    backend: String,
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    idle_timeout: Duration,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    delivered: usize,
}

impl StreamingSession {
    pub fn new(
        backend: impl Into<String>,
        rx: mpsc::Receiver<StreamEvent>,
        cancel: CancellationToken,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            backend: backend.into(),
            rx,
            cancel,
            idle_timeout,
            pending: VecDeque::new(),
            finished: false,
            delivered: 0,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Token observed by the reader task. Cancelling it ends the session
    /// with `Error(Cancelled)` at the next poll.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of fragments handed to the caller so far.
    pub fn fragments_delivered(&self) -> usize {
        self.delivered
    }

    /// Next event, or `None` once the terminal event has been returned.
    pub async fn next_fragment(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = match self.pending.pop_front() {
            Some(event) => event,
            None => self.receive().await,
        };
        self.account(&event);
        Some(event)
    }

    /// Look at the next event without consuming it.
    pub(crate) async fn peek(&mut self) -> Option<&StreamEvent> {
        if self.finished {
            return None;
        }
        if self.pending.is_empty() {
            let event = self.receive().await;
            self.pending.push_back(event);
        }
        self.pending.front()
    }

    async fn receive(&mut self) -> StreamEvent {
        if self.cancel.is_cancelled() {
            return StreamEvent::Error(BackendError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => StreamEvent::Error(BackendError::Cancelled),
            received = tokio::time::timeout(self.idle_timeout, self.rx.recv()) => match received {
                Ok(Some(event)) => event,
                Ok(None) => StreamEvent::Error(BackendError::protocol(
                    &self.backend,
                    "stream reader stopped unexpectedly",
                )),
                Err(_) => {
                    tracing::warn!(
                        "[STREAM] {} idle for {:?}, giving up",
                        self.backend,
                        self.idle_timeout
                    );
                    StreamEvent::Error(BackendError::timeout(&self.backend, self.idle_timeout))
                }
            },
        }
    }

    fn account(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Fragment(_) => self.delivered += 1,
            _ => {
                self.finished = true;
                // Stops the reader if it is still running (timeout, cancel)
                self.cancel.cancel();
            }
        }
    }

    /// Drain the session into one string.
    pub async fn collect_text(mut self) -> Result<String, BackendError> {
        let mut text = String::new();
        while let Some(event) = self.next_fragment().await {
            match event {
                StreamEvent::Fragment(fragment) => text.push_str(&fragment),
                StreamEvent::End => return Ok(text),
                StreamEvent::Error(e) => return Err(e),
            }
        }
        Ok(text)
    }

    /// Adapt the session into a `futures::Stream` of events.
    pub fn into_events(self) -> impl Stream<Item = StreamEvent> {
        stream::unfold(self, |mut session| async move {
            let event = session.next_fragment().await?;
            Some((event, session))
        })
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("backend", &self.backend)
            .field("finished", &self.finished)
            .field("delivered", &self.delivered)
            .finish()
    }
}
