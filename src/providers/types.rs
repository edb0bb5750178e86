// Request/response types shared by every backend adapter
//
// A GenerationRequest is protocol-neutral. Each adapter turns it into its own
// wire format (see ollama.rs, openai.rs, llamacpp.rs).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LLAMACPP_URL, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_NUM_CTX, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_COMPAT_URL,
    DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE,
};
use crate::stream::StreamingSession;

use super::error::BackendError;

/// The kind of model server behind a backend.
///
/// Serialized in config files as `ollama`, `openai` (alias `lmstudio`) and
/// `llamacpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Local model-serving daemon (Ollama `/api/generate`, NDJSON streaming)
    #[serde(rename = "ollama")]
    Ollama,
    /// OpenAI-compatible server (LM Studio, vLLM, ...), SSE streaming
    #[serde(rename = "openai", alias = "lmstudio", alias = "openai-compatible")]
    OpenAiCompatible,
    /// Minimal inference server (llama.cpp `/completion`)
    #[serde(rename = "llamacpp", alias = "llama.cpp", alias = "llama-cpp")]
    LlamaCpp,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAiCompatible => "openai",
            Self::LlamaCpp => "llamacpp",
        }
    }

    /// Parse the names accepted in config files and `TERN_BACKENDS`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "lmstudio" | "openai-compatible" => Some(Self::OpenAiCompatible),
            "llamacpp" | "llama.cpp" | "llama-cpp" => Some(Self::LlamaCpp),
            _ => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_URL,
            Self::OpenAiCompatible => DEFAULT_OPENAI_COMPAT_URL,
            Self::LlamaCpp => DEFAULT_LLAMACPP_URL,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured model server. Immutable once loaded; `priority` orders the
/// fallback sequence (lower runs first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    pub base_url: String,
    pub priority: usize,
    /// Server-specific model name; overrides the request model when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl BackendDescriptor {
    pub fn new(kind: BackendKind, base_url: impl Into<String>, priority: usize) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            priority,
            model: None,
        }
    }

    /// Descriptor pointing at the kind's conventional localhost port.
    pub fn with_default_url(kind: BackendKind, priority: usize) -> Self {
        Self::new(kind, kind.default_base_url(), priority)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Display name used in logs and diagnostics, e.g. `ollama@http://localhost:11434`
    pub fn display_name(&self) -> String {
        format!("{}@{}", self.kind, self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Protocol-neutral generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_context: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Context window hint (Ollama `num_ctx`)
    pub num_ctx: u32,
    pub stream: bool,
    pub conversation_history: Vec<ChatMessage>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_context: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            num_ctx: DEFAULT_NUM_CTX,
            stream: false,
            conversation_history: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_context = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.conversation_history = history;
        self
    }

    /// Chat-style message list: system context, history, then the prompt.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.conversation_history.len() + 2);
        if let Some(system) = &self.system_context {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(self.conversation_history.iter().cloned());
        messages.push(ChatMessage::user(self.prompt.clone()));
        messages
    }

    /// Single-prompt rendering for completion-style endpoints.
    ///
    /// History turns are written as a transcript ending with an open
    /// `Assistant:` line. Without history the prompt is returned unchanged.
    pub fn transcript(&self) -> String {
        if self.conversation_history.is_empty() {
            return self.prompt.clone();
        }
        let mut out = String::new();
        for turn in &self.conversation_history {
            let label = match turn.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            out.push_str(&format!("{}: {}\n", label, turn.content));
        }
        out.push_str(&format!("User: {}\nAssistant:", self.prompt));
        out
    }
}

/// Model parameters applied to every request built by the assistant and the
/// plan engine. Derived from `Config`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub num_ctx: u32,
    pub stream: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            num_ctx: DEFAULT_NUM_CTX,
            stream: true,
        }
    }
}

impl GenerationSettings {
    pub fn request(&self, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            num_ctx: self.num_ctx,
            stream: self.stream,
            ..GenerationRequest::new(prompt)
        }
    }
}

/// Network budgets shared by all adapters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdapterOptions {
    /// TCP connect budget
    pub connect_timeout: Duration,
    /// Health-check budget; probes give up quietly after this
    pub probe_timeout: Duration,
    /// Wall-clock limit for a non-streaming generation
    pub request_timeout: Duration,
    /// Maximum silence between streamed fragments
    pub idle_timeout: Duration,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

/// Result of a successful `generate` call.
///
/// Non-streaming requests yield `Complete`; streaming requests yield a lazy
/// session that ends with exactly one terminal marker.
#[derive(Debug)]
pub enum GenerationResult {
    Complete(String),
    Stream(StreamingSession),
}

impl GenerationResult {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Collapse either variant to the full generated text.
    pub async fn into_text(self) -> Result<String, BackendError> {
        match self {
            Self::Complete(text) => Ok(text),
            Self::Stream(session) => session.collect_text().await,
        }
    }
}
