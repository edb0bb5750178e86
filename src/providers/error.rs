// Backend and routing error types

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::types::BackendKind;

/// Failure of a single backend adapter call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Transport/connection failure (refused, reset, 5xx)
    #[error("{backend} unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// The server answered, but not in the expected shape
    #[error("{backend} protocol error: {message}")]
    Protocol { backend: String, message: String },

    /// No data within the configured budget
    #[error("{backend} timed out after {after:?}")]
    Timeout { backend: String, after: Duration },

    /// Caller cancelled the generation
    #[error("generation cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn protocol(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn timeout(backend: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            backend: backend.into(),
            after,
        }
    }

    /// Map a reqwest transport error onto the taxonomy.
    pub fn from_transport(backend: &str, err: &reqwest::Error, budget: Duration) -> Self {
        if err.is_timeout() {
            Self::timeout(backend, budget)
        } else if err.is_decode() {
            Self::protocol(backend, err.to_string())
        } else {
            Self::unavailable(backend, err.to_string())
        }
    }

    /// Whether the orchestrator should move on to the next backend.
    pub fn triggers_fallback(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Short label used in logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::Protocol { .. } => "protocol",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::Unavailable { backend, .. }
            | Self::Protocol { backend, .. }
            | Self::Timeout { backend, .. } => Some(backend),
            Self::Cancelled => None,
        }
    }
}

/// Why a backend was passed over during routing.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Health check failed; `generate` was never called
    ProbeFailed,
    /// `generate` (or the stream before its first fragment) failed
    Failed(BackendError),
}

/// Diagnostic record of one skipped backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendAttempt {
    pub backend: String,
    pub kind: BackendKind,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for BackendAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::ProbeFailed => write!(f, "{}: not reachable", self.backend),
            AttemptOutcome::Failed(err) => write!(f, "{}: {} ({})", self.backend, err, err.kind()),
        }
    }
}

fn describe_attempts(attempts: &[BackendAttempt]) -> String {
    if attempts.is_empty() {
        return "no backends configured".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of `Orchestrator::route`.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Every backend was skipped. Callers switch to heuristic mode.
    #[error("all backends unavailable: {}", describe_attempts(.attempts))]
    AllBackendsUnavailable { attempts: Vec<BackendAttempt> },

    /// A stream failed after output had already been surfaced
    #[error("stream from {backend} failed after partial output: {source}")]
    Stream {
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("generation cancelled")]
    Cancelled,
}

impl RouteError {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::AllBackendsUnavailable { .. })
    }

    /// Wrap an error observed while consuming a committed stream.
    pub fn from_stream(backend: &str, err: BackendError) -> Self {
        match err {
            BackendError::Cancelled => Self::Cancelled,
            source => Self::Stream {
                backend: backend.to_string(),
                source,
            },
        }
    }
}
