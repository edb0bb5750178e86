// Command risk classification
//
// Maps a candidate shell command to a risk tier using a prioritized table of
// regex rules. Classification is pure: no I/O, no mutable state.

mod classifier;
mod rules;

pub use classifier::{RiskAssessment, RiskClassifier, SAFE_RULE_ID};
pub use rules::{RiskRule, RiskTier, RuleSet};
