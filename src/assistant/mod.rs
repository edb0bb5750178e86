// Assistant - one-shot command suggestions, explanations and chat
//
// Ties the orchestrator to the risk classifier. Nothing here executes a
// command; callers decide what to do with a suggestion.

pub mod chat;
pub mod command;
pub mod prompts;

pub use chat::ChatSession;
pub use command::{extract_command, extract_explanation, strip_markdown_fences};

use anyhow::Result;
use std::fmt;
use std::sync::Arc;

use crate::config::constants::DEFAULT_CHAT_HISTORY_WINDOW;
use crate::config::Config;
use crate::context::SystemInfo;
use crate::local::fallback_command;
use crate::providers::{GenerationSettings, Orchestrator, RouteError, Routed};
use crate::safety::{RiskAssessment, RiskClassifier};

/// Where a suggested command came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    Model { backend: String },
    /// Degraded mode: keyword heuristics, no model involved
    Heuristic { reason: String },
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model { backend } => write!(f, "model ({})", backend),
            Self::Heuristic { reason } => write!(f, "heuristic fallback ({})", reason),
        }
    }
}

/// A proposed command with its risk assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub command: String,
    pub assessment: RiskAssessment,
    pub source: CommandSource,
}

impl Suggestion {
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, CommandSource::Heuristic { .. })
    }
}

pub struct Assistant {
    orchestrator: Arc<Orchestrator>,
    classifier: RiskClassifier,
    settings: GenerationSettings,
    system: SystemInfo,
    history_window: usize,
}

impl Assistant {
    pub fn new(orchestrator: Arc<Orchestrator>, classifier: RiskClassifier) -> Self {
        Self {
            orchestrator,
            classifier,
            settings: GenerationSettings::default(),
            system: SystemInfo::detect(),
            history_window: DEFAULT_CHAT_HISTORY_WINDOW,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let orchestrator = Arc::new(Orchestrator::from_config(config)?);
        Ok(Self::new(orchestrator, RiskClassifier::default())
            .with_settings(config.generation_settings())
            .with_history_window(config.chat_history_window))
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_system(mut self, system: SystemInfo) -> Self {
        self.system = system;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn system(&self) -> &SystemInfo {
        &self.system
    }

    /// Suggest one command for `query`.
    ///
    /// Falls back to keyword heuristics when every backend is unavailable or
    /// the model's reply holds no command; the source says which happened.
    pub async fn suggest(&self, query: &str, context: Option<&str>) -> Result<Suggestion, RouteError> {
        let request = self
            .settings
            .request(query.trim())
            .with_system(prompts::command_prompt(&self.system, context))
            .with_stream(false);

        let (command, source) = match self.orchestrator.complete(&request).await {
            Ok(routed) => match extract_command(&routed.value) {
                Some(command) => (command, CommandSource::Model { backend: routed.backend }),
                None => {
                    tracing::warn!("{} returned no usable command, using heuristics", routed.backend);
                    self.heuristic(query, "model returned no command")
                }
            },
            Err(RouteError::AllBackendsUnavailable { attempts }) => {
                tracing::warn!(
                    "No backend answered ({} tried), using heuristics",
                    attempts.len()
                );
                self.heuristic(query, "no backend available")
            }
            Err(e) => return Err(e),
        };

        Ok(Suggestion {
            assessment: self.classifier.classify(&command),
            command,
            source,
        })
    }

    /// Explain `command` in a few sentences.
    pub async fn explain(&self, command: &str) -> Result<Routed<String>, RouteError> {
        let request = self
            .settings
            .request(prompts::explain_message(command))
            .with_system(prompts::explain_prompt(&self.system))
            .with_stream(false);

        let routed = self.orchestrator.complete(&request).await?;
        Ok(routed.map(|text| extract_explanation(&text).unwrap_or_else(|| text.trim().to_string())))
    }

    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(
            Arc::clone(&self.orchestrator),
            self.settings.clone(),
            prompts::chat_prompt(&self.system),
            self.history_window,
        )
    }

    fn heuristic(&self, query: &str, reason: &str) -> (String, CommandSource) {
        (
            fallback_command(query),
            CommandSource::Heuristic {
                reason: reason.to_string(),
            },
        )
    }
}
