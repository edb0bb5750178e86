// Tern - terminal copilot over local LLM servers
// Library exports

pub mod assistant;
pub mod cli;
pub mod config;
pub mod context;
pub mod local;
pub mod logging;
pub mod planning;
pub mod providers;
pub mod safety;
pub mod stream;

pub use assistant::{Assistant, CommandSource, Suggestion};
pub use config::Config;
pub use planning::{Plan, PlanEngine};
pub use providers::{BackendError, LlmProvider, Orchestrator, RouteError};
pub use safety::{RiskAssessment, RiskClassifier, RiskTier};
