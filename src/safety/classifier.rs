// Risk classifier

use serde::Serialize;

use super::rules::{RiskTier, RuleSet};

/// Rule id reported when nothing matched.
pub const SAFE_RULE_ID: &str = "default.safe";

/// Outcome of classifying one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    /// Id of the most severe matching rule (first in table order)
    pub matched_rule: String,
    pub rationale: String,
    /// Every matching rule at the winning tier, in table order
    pub reasons: Vec<String>,
    /// Advice for Dangerous and Critical commands
    pub suggestion: Option<String>,
}

impl RiskAssessment {
    fn safe() -> Self {
        Self {
            tier: RiskTier::Safe,
            matched_rule: SAFE_RULE_ID.to_string(),
            rationale: "No risk pattern matched".to_string(),
            reasons: Vec::new(),
            suggestion: None,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.tier == RiskTier::Safe
    }

    /// Critical commands are refused unless safety is explicitly disabled.
    pub fn is_blocked(&self) -> bool {
        self.tier == RiskTier::Critical
    }

    pub fn requires_confirmation(&self) -> bool {
        self.tier >= RiskTier::Caution
    }
}

fn suggestion_for(tier: RiskTier) -> Option<String> {
    match tier {
        RiskTier::Critical => Some("This command is extremely dangerous. Please reconsider.".to_string()),
        RiskTier::Dangerous => Some("Consider adding --dry-run or --interactive flag first.".to_string()),
        _ => None,
    }
}

/// Classifies commands against a rule table.
///
/// Each command is matched in two views: the whitespace-collapsed text, and
/// the text re-joined after shell-word splitting so that quoting
/// (`rm -rf "/"`, `r''m`) does not hide a pattern. A rule fires if it matches
/// either view, so the second view can only add matches.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    rules: RuleSet,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(RuleSet::standard())
    }
}

impl RiskClassifier {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify(&self, command: &str) -> RiskAssessment {
        let views = normalized_views(command);
        if views.is_empty() {
            return RiskAssessment::safe();
        }

        let mut matched = self
            .rules
            .rules()
            .iter()
            .filter(|rule| views.iter().any(|view| rule.matches(view)));

        let Some(top) = matched.next() else {
            tracing::trace!("classified as safe: {}", command);
            return RiskAssessment::safe();
        };

        // Rules are sorted by tier, so the rest of the winning tier follows
        let mut reasons = vec![top.reason()];
        reasons.extend(
            matched
                .take_while(|rule| rule.tier == top.tier)
                .map(|rule| rule.reason()),
        );

        tracing::debug!("classified as {} ({}): {}", top.tier, top.id, command);

        RiskAssessment {
            tier: top.tier,
            matched_rule: top.id.clone(),
            rationale: top.rationale.clone(),
            reasons,
            suggestion: suggestion_for(top.tier),
        }
    }
}

/// Whitespace-collapsed text, plus the shell-word view when it differs.
fn normalized_views(command: &str) -> Vec<String> {
    let collapsed = command.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Vec::new();
    }

    let mut views = vec![collapsed];
    if let Ok(words) = shell_words::split(command) {
        let joined = words.join(" ");
        if joined != views[0] && !joined.trim().is_empty() {
            views.push(joined);
        }
    }
    views
}
