// Configuration structs

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constants::{
    DEFAULT_CHAT_HISTORY_WINDOW, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_NUM_CTX, DEFAULT_PROBE_TIMEOUT_MS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE,
};
use crate::planning::GatePolicy;
use crate::providers::{AdapterOptions, BackendDescriptor, BackendKind, GenerationSettings};
use crate::safety::RiskTier;

/// One entry of the `[[backends]]` array. Order in the file is fallback order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEntry {
    pub kind: BackendKind,
    /// Defaults to the kind's conventional localhost URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Overrides the global `model` for this server only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl BackendEntry {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            base_url: None,
            model: None,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }
}

/// Network budgets, stored in the friendliest unit for each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    pub probe_ms: u64,
    pub request_secs: u64,
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            probe_ms: DEFAULT_PROBE_TIMEOUT_MS,
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            idle_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

/// Risk gating behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Ask before handing over any plan step. When false, steps up to
    /// Dangerous are auto-confirmed (Critical never is).
    pub confirm: bool,

    /// Refuse Critical commands outright
    pub block_critical: bool,

    /// Highest tier that is confirmed without asking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_confirm_max: Option<RiskTier>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            confirm: true,           // Safe default: every step is confirmed
            block_critical: true,
            auto_confirm_max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model requested from every backend unless the backend overrides it
    pub model: String,

    pub temperature: f32,

    /// Context window hint (Ollama only)
    pub num_ctx: u32,

    /// Maximum tokens per generation
    pub num_predict: u32,

    /// Stream responses token by token (default: true)
    pub stream: bool,

    /// Backends in fallback order
    pub backends: Vec<BackendEntry>,

    pub timeouts: TimeoutConfig,

    pub safety: SafetyConfig,

    /// Number of chat messages sent with each new message
    pub chat_history_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            num_ctx: DEFAULT_NUM_CTX,
            num_predict: DEFAULT_MAX_TOKENS,
            stream: true,
            backends: vec![BackendEntry::new(BackendKind::Ollama)],
            timeouts: TimeoutConfig::default(),
            safety: SafetyConfig::default(),
            chat_history_window: DEFAULT_CHAT_HISTORY_WINDOW,
        }
    }
}

impl Config {
    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backends.is_empty() {
            bail!(
                "No backends configured.\n\n\
                 Add at least one [[backends]] entry to the config file, e.g.:\n  \
                 [[backends]]\n  kind = \"ollama\""
            );
        }

        for (idx, entry) in self.backends.iter().enumerate() {
            let url = entry.base_url();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!(
                    "Invalid base_url '{}' in backends[{}]: must start with http:// or https://",
                    url,
                    idx
                );
            }
        }

        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature must be between 0.0 and 2.0 (got {})", self.temperature);
        }
        if self.num_predict == 0 {
            bail!("num_predict must be greater than zero");
        }
        let t = &self.timeouts;
        if t.connect_ms == 0 || t.probe_ms == 0 || t.request_secs == 0 || t.idle_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.safety.auto_confirm_max == Some(RiskTier::Critical) {
            bail!("safety.auto_confirm_max cannot be \"critical\"");
        }

        Ok(())
    }

    /// Backend descriptors in fallback order.
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.backends
            .iter()
            .enumerate()
            .map(|(priority, entry)| {
                let descriptor = BackendDescriptor::new(entry.kind, entry.base_url(), priority);
                match &entry.model {
                    Some(model) => descriptor.with_model(model.clone()),
                    None => descriptor,
                }
            })
            .collect()
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            connect_timeout: Duration::from_millis(self.timeouts.connect_ms),
            probe_timeout: Duration::from_millis(self.timeouts.probe_ms),
            request_timeout: Duration::from_secs(self.timeouts.request_secs),
            idle_timeout: Duration::from_secs(self.timeouts.idle_secs),
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.num_predict,
            num_ctx: self.num_ctx,
            stream: self.stream,
        }
    }

    pub fn gate_policy(&self) -> GatePolicy {
        let auto_confirm_max = if self.safety.confirm {
            self.safety.auto_confirm_max
        } else {
            Some(RiskTier::Dangerous)
        };
        GatePolicy {
            block_critical: self.safety.block_critical,
            auto_confirm_max,
        }
    }
}
