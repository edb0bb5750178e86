// Local model server support
//
// This module provides an abstraction layer over the model servers tern can
// talk to (Ollama, OpenAI-compatible servers such as LM Studio, llama.cpp)
// and the orchestrator that tries them in priority order.

use async_trait::async_trait;

pub mod error;
pub mod types;

// HTTP plumbing shared by the adapters
pub mod http;

// Provider implementations
pub mod llamacpp;
pub mod ollama;
pub mod openai;

// Provider factory
pub mod factory;

// Priority-ordered fallback routing
pub mod orchestrator;

// Re-export commonly used types
pub use error::{AttemptOutcome, BackendAttempt, BackendError, RouteError};
pub use factory::{create_provider, create_providers};
pub use llamacpp::LlamaCppProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;
pub use orchestrator::{Orchestrator, ProbeReport, Routed};
pub use types::{
    AdapterOptions, BackendDescriptor, BackendKind, ChatMessage, GenerationRequest,
    GenerationResult, GenerationSettings, Role,
};

/// Trait for backend adapters
///
/// All adapters (Ollama, OpenAI-compatible, llama.cpp) implement this trait.
/// They differ only in wire format; adapters hold no per-request state and are
/// safely shared across requests.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Immutable configuration this adapter was built from
    fn descriptor(&self) -> &BackendDescriptor;

    /// Display name used in logs and diagnostics (e.g. "ollama@http://localhost:11434")
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind {
        self.descriptor().kind
    }

    /// Health check. Never fails: any network or protocol error is `false`.
    async fn probe(&self) -> bool;

    /// Run one generation.
    ///
    /// Non-streaming requests return `GenerationResult::Complete`; streaming
    /// requests return a session as soon as the response headers arrive.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError>;

    /// Requests (including open streams) currently holding a connection
    fn active_connections(&self) -> usize {
        0
    }
}
