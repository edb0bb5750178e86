// Backend orchestrator - priority-ordered routing with fallback
//
// Backends are tried strictly in the order given at construction. A backend is
// skipped when its probe fails or when generate() fails before anything has
// reached the caller. Once a streaming backend has produced its first event it
// is committed: later failures surface as RouteError::Stream instead of
// switching to another server mid-answer.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::error::{AttemptOutcome, BackendAttempt, BackendError, RouteError};
use super::factory::create_providers;
use super::types::{AdapterOptions, BackendDescriptor, BackendKind, GenerationRequest, GenerationResult};
use super::LlmProvider;
use crate::config::Config;
use crate::stream::StreamEvent;

/// A routed value together with where it came from.
#[derive(Debug)]
pub struct Routed<T> {
    /// Display name of the backend that answered
    pub backend: String,
    pub value: T,
    /// Backends passed over before the winner, in order
    pub skipped: Vec<BackendAttempt>,
}

impl<T> Routed<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Routed<U> {
        Routed {
            backend: self.backend,
            value: f(self.value),
            skipped: self.skipped,
        }
    }
}

/// One line of `tern backends`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub name: String,
    pub kind: BackendKind,
    pub available: bool,
}

pub struct Orchestrator {
    backends: Vec<Arc<dyn LlmProvider>>,
}

impl Orchestrator {
    /// Use `backends` in exactly the given order.
    pub fn new(backends: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { backends }
    }

    pub fn from_descriptors(descriptors: &[BackendDescriptor], options: &AdapterOptions) -> Result<Self> {
        Ok(Self::new(create_providers(descriptors, options)?))
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_descriptors(&config.descriptors(), &config.adapter_options())
    }

    pub fn backends(&self) -> &[Arc<dyn LlmProvider>] {
        &self.backends
    }

    /// Probe every backend (sequentially, in order).
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let available = backend.probe().await;
            reports.push(ProbeReport {
                name: backend.name().to_string(),
                kind: backend.kind(),
                available,
            });
        }
        reports
    }

    /// Route `request` to the first healthy backend.
    pub async fn route(&self, request: &GenerationRequest) -> Result<Routed<GenerationResult>, RouteError> {
        let mut skipped = Vec::new();

        for backend in &self.backends {
            let name = backend.name().to_string();

            if !backend.probe().await {
                tracing::warn!("Backend {} is not reachable, skipping", name);
                skipped.push(attempt(backend.as_ref(), AttemptOutcome::ProbeFailed));
                continue;
            }

            tracing::debug!("Routing request to {}", name);

            let failure = match backend.generate(request).await {
                Ok(GenerationResult::Complete(text)) => {
                    tracing::info!("{} answered ({} chars)", name, text.len());
                    return Ok(Routed {
                        backend: name,
                        value: GenerationResult::Complete(text),
                        skipped,
                    });
                }
                Ok(GenerationResult::Stream(mut session)) => {
                    // Commit only once the stream has produced something
                    let first_error = match session.peek().await {
                        Some(StreamEvent::Error(e)) => Some(e.clone()),
                        _ => None,
                    };
                    match first_error {
                        None => {
                            tracing::info!("{} is streaming", name);
                            return Ok(Routed {
                                backend: name,
                                value: GenerationResult::Stream(session),
                                skipped,
                            });
                        }
                        Some(e) => e,
                    }
                }
                Err(e) => e,
            };

            if !failure.triggers_fallback() {
                tracing::debug!("Routing cancelled while waiting on {}", name);
                return Err(RouteError::Cancelled);
            }
            log_fallback(&name, &failure);
            skipped.push(attempt(backend.as_ref(), AttemptOutcome::Failed(failure)));
        }

        tracing::warn!(
            "All {} backend(s) unavailable, degraded mode",
            self.backends.len()
        );
        Err(RouteError::AllBackendsUnavailable { attempts: skipped })
    }

    /// `route`, abandoned as soon as `cancel` fires.
    ///
    /// Abandoning drops any in-flight request or session, which closes its
    /// connection.
    pub async fn route_cancellable(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Routed<GenerationResult>, RouteError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RouteError::Cancelled),
            routed = self.route(request) => routed,
        }
    }

    /// Route and collect the full text. Streams are concatenated in order.
    pub async fn complete(&self, request: &GenerationRequest) -> Result<Routed<String>, RouteError> {
        let routed = self.route(request).await?;
        let backend = routed.backend.clone();
        let text = match routed.value {
            GenerationResult::Complete(text) => text,
            GenerationResult::Stream(session) => session
                .collect_text()
                .await
                .map_err(|e| RouteError::from_stream(&backend, e))?,
        };
        Ok(Routed {
            backend: routed.backend,
            value: text,
            skipped: routed.skipped,
        })
    }
}

fn attempt(backend: &dyn LlmProvider, outcome: AttemptOutcome) -> BackendAttempt {
    BackendAttempt {
        backend: backend.name().to_string(),
        kind: backend.kind(),
        outcome,
    }
}

fn log_fallback(name: &str, error: &BackendError) {
    match error {
        BackendError::Unavailable { message, .. } => {
            tracing::warn!("Backend {} unavailable ({}), trying next", name, message)
        }
        BackendError::Protocol { message, .. } => {
            tracing::warn!("Backend {} sent a malformed response ({}), trying next", name, message)
        }
        BackendError::Timeout { after, .. } => {
            tracing::warn!("Backend {} timed out after {:?}, trying next", name, after)
        }
        BackendError::Cancelled => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::stream::StreamingSession;

    enum Script {
        Text(&'static str),
        Fail(BackendError),
        Events(Vec<StreamEvent>),
    }

    struct FakeBackend {
        descriptor: BackendDescriptor,
        name: String,
        up: bool,
        script: Script,
        generate_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(port: u16, up: bool, script: Script) -> Arc<Self> {
            let descriptor =
                BackendDescriptor::new(BackendKind::Ollama, format!("http://fake:{}", port), 0);
            Arc::new(Self {
                name: descriptor.display_name(),
                descriptor,
                up,
                script,
                generate_calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.generate_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for FakeBackend {
        fn descriptor(&self) -> &BackendDescriptor {
            &self.descriptor
        }
        fn name(&self) -> &str {
            &self.name
        }
        async fn probe(&self) -> bool {
            self.up
        }
        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResult, BackendError> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Text(t) => Ok(GenerationResult::Complete(t.to_string())),
                Script::Fail(e) => Err(e.clone()),
                Script::Events(events) => {
                    let (tx, rx) = mpsc::channel(16);
                    for ev in events {
                        tx.try_send(ev.clone()).unwrap();
                    }
                    Ok(GenerationResult::Stream(StreamingSession::new(
                        self.name.clone(),
                        rx,
                        CancellationToken::new(),
                        Duration::from_secs(5),
                    )))
                }
            }
        }
    }

    fn orchestrator(backends: &[Arc<FakeBackend>]) -> Orchestrator {
        Orchestrator::new(
            backends
                .iter()
                .map(|b| Arc::clone(b) as Arc<dyn LlmProvider>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_unreachable_backends_never_generate() {
        let a = FakeBackend::new(1, false, Script::Text("a"));
        let b = FakeBackend::new(2, false, Script::Text("b"));
        let c = FakeBackend::new(3, true, Script::Text("c"));
        let routed = orchestrator(&[a.clone(), b.clone(), c.clone()])
            .complete(&GenerationRequest::new("x"))
            .await
            .unwrap();
        assert_eq!(routed.value, "c");
        assert_eq!(routed.backend, "ollama@http://fake:3");
        assert_eq!(routed.skipped.len(), 2);
        assert_eq!(a.calls() + b.calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_failure_falls_through() {
        let a = FakeBackend::new(1, true, Script::Fail(BackendError::protocol("a", "bad")));
        let b = FakeBackend::new(2, true, Script::Text("b"));
        let routed = orchestrator(&[a, b]).complete(&GenerationRequest::new("x")).await.unwrap();
        assert_eq!(routed.value, "b");
        assert!(matches!(
            routed.skipped[0].outcome,
            AttemptOutcome::Failed(BackendError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_first_winner_stops_routing() {
        let a = FakeBackend::new(1, true, Script::Text("a"));
        let b = FakeBackend::new(2, true, Script::Text("b"));
        let routed = orchestrator(&[a, b.clone()]).complete(&GenerationRequest::new("x")).await.unwrap();
        assert_eq!(routed.value, "a");
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_down() {
        let a = FakeBackend::new(1, false, Script::Text("a"));
        let err = orchestrator(&[a]).route(&GenerationRequest::new("x")).await.unwrap_err();
        match err {
            RouteError::AllBackendsUnavailable { attempts } => assert_eq!(attempts.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        let err = orchestrator(&[]).route(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(err.is_degraded());
    }

    #[tokio::test]
    async fn test_stream_error_before_output_falls_through() {
        let a = FakeBackend::new(
            1,
            true,
            Script::Events(vec![StreamEvent::Error(BackendError::timeout("a", Duration::from_secs(1)))]),
        );
        let b = FakeBackend::new(
            2,
            true,
            Script::Events(vec![StreamEvent::Fragment("ok".into()), StreamEvent::End]),
        );
        let routed = orchestrator(&[a, b]).complete(&GenerationRequest::new("x")).await.unwrap();
        assert_eq!(routed.value, "ok");
        assert_eq!(routed.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_after_output_surfaces() {
        let a = FakeBackend::new(
            1,
            true,
            Script::Events(vec![
                StreamEvent::Fragment("partial".into()),
                StreamEvent::Error(BackendError::unavailable("a", "reset")),
            ]),
        );
        let b = FakeBackend::new(2, true, Script::Text("b"));
        let err = orchestrator(&[a, b.clone()])
            .complete(&GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Stream { .. }));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_is_not_fallback() {
        let a = FakeBackend::new(1, true, Script::Fail(BackendError::Cancelled));
        let b = FakeBackend::new(2, true, Script::Text("b"));
        let err = orchestrator(&[a, b.clone()]).route(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, RouteError::Cancelled));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_route_cancellable_precancelled() {
        let a = FakeBackend::new(1, true, Script::Text("a"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator(&[a])
            .route_cancellable(&GenerationRequest::new("x"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Cancelled));
    }

    #[tokio::test]
    async fn test_probe_all_reports_in_order() {
        let a = FakeBackend::new(1, false, Script::Text("a"));
        let b = FakeBackend::new(2, true, Script::Text("b"));
        let reports = orchestrator(&[a, b]).probe_all().await;
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].available);
        assert!(reports[1].available);
        assert_eq!(reports[1].name, "ollama@http://fake:2");
    }
}
