// Project-wide constants
//
// Centralised here so port numbers and other magic values have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Local model-serving daemon (Ollama).
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// OpenAI-compatible server. 1234 is LM Studio's default port.
pub const DEFAULT_OPENAI_COMPAT_URL: &str = "http://localhost:1234";

/// llama.cpp `server` binary.
pub const DEFAULT_LLAMACPP_URL: &str = "http://localhost:8080";

/// Small instruction model that runs comfortably on a laptop CPU.
pub const DEFAULT_MODEL: &str = "gemma2:2b";

/// Low temperature keeps generated commands stable between runs.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default maximum tokens per generation (Ollama `num_predict`).
pub const DEFAULT_MAX_TOKENS: u32 = 512;

pub const DEFAULT_NUM_CTX: u32 = 4096;

/// Ollama sampling options sent with every request.
pub const OLLAMA_TOP_P: f32 = 0.9;
pub const OLLAMA_REPEAT_PENALTY: f32 = 1.05;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 800;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Chat turns (user + assistant messages) sent along with each new message.
pub const DEFAULT_CHAT_HISTORY_WINDOW: usize = 10;

/// Directory entries included in the prompt context.
pub const DEFAULT_CONTEXT_ENTRIES: usize = 50;

/// Config file location relative to the home directory.
pub const CONFIG_RELATIVE_PATH: &str = ".config/tern/config.toml";
