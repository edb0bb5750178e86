// Risk tiers and the rule table

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Destructive potential of a command, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Safe,
    Caution,
    Dangerous,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Dangerous => "dangerous",
            Self::Critical => "critical",
        }
    }

    /// Prefix used for the human-readable reasons list
    fn reason_label(&self) -> &'static str {
        match self {
            Self::Safe => "Safe",
            Self::Caution => "Caution",
            Self::Dangerous => "DANGER",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pattern in the table.
#[derive(Debug, Clone)]
pub struct RiskRule {
    /// Stable identifier, e.g. `critical.rm-root`
    pub id: String,
    pub tier: RiskTier,
    pub pattern: Regex,
    pub rationale: String,
}

impl RiskRule {
    pub fn new(
        id: impl Into<String>,
        tier: RiskTier,
        pattern: &str,
        rationale: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            id: id.into(),
            tier,
            pattern: Regex::new(pattern)?,
            rationale: rationale.into(),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub(crate) fn reason(&self) -> String {
        format!("{}: {}", self.tier.reason_label(), self.rationale)
    }
}

/// Rules kept in evaluation order: most severe tier first, definition order
/// within a tier.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RiskRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table.
    pub fn standard() -> Self {
        STANDARD_RULES.clone()
    }

    pub fn with_rule(mut self, rule: RiskRule) -> Self {
        self.push(rule);
        self
    }

    pub fn push(&mut self, rule: RiskRule) {
        // Insert after the last rule of the same or higher tier
        let at = self
            .rules
            .iter()
            .position(|r| r.tier < rule.tier)
            .unwrap_or(self.rules.len());
        self.rules.insert(at, rule);
    }

    pub fn rules(&self) -> &[RiskRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RiskRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

type RuleSpec = (&'static str, RiskTier, &'static str, &'static str);

const STANDARD_RULE_SPECS: &[RuleSpec] = &[
    // ---- critical ----
    (
        "critical.rm-root",
        RiskTier::Critical,
        r"\brm\s+(?:-{1,2}[\w-]+\s+)*(?:/(?:(?:bin|boot|dev|etc|home|lib\w*|opt|root|sbin|srv|sys|usr|var)/?)?\*?|~/?\*?|\$HOME/?\*?|\$\{HOME\}/?\*?)(?:\s|$|[;&|])|\brm\b.*--no-preserve-root",
        "Deleting root, home or a top-level system directory",
    ),
    (
        "critical.mkfs",
        RiskTier::Critical,
        r"\bmkfs(?:\.\w+)?\b",
        "Formatting filesystem",
    ),
    (
        "critical.dd-device",
        RiskTier::Critical,
        r"\bdd\s+.*\bof=/dev/",
        "Writing directly to block device",
    ),
    (
        "critical.fork-bomb",
        RiskTier::Critical,
        r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        "Fork bomb detected",
    ),
    (
        "critical.overwrite-device",
        RiskTier::Critical,
        r">\s*/dev/(?:sd[a-z]|hd[a-z]|vd[a-z]|xvd[a-z]|nvme\d|mmcblk\d|disk\d)",
        "Overwriting block device",
    ),
    (
        "critical.chmod-root",
        RiskTier::Critical,
        r"\bchmod\s+(?:-{1,2}[\w-]+\s+)*0?777\s+/(?:\s|$|[;&|])",
        "Removing all permissions on root",
    ),
    (
        "critical.chown-root",
        RiskTier::Critical,
        r"\bchown\s+(?:-{1,2}[\w-]+\s+)*\S+\s+/(?:\s|$|[;&|])",
        "Changing ownership of root",
    ),
    // ---- dangerous ----
    (
        "dangerous.rm-recursive-force",
        RiskTier::Dangerous,
        r"\brm\s(?:[^;&|]*\s)?(?:-[a-zA-Z]*[rRf]|--recursive|--force)",
        "Recursive or forced file deletion",
    ),
    (
        "dangerous.sudo-rm",
        RiskTier::Dangerous,
        r"\bsudo\s+(?:-\S+\s+)*rm\b",
        "Privileged file deletion",
    ),
    (
        "dangerous.sudo-dd",
        RiskTier::Dangerous,
        r"\bsudo\s+(?:-\S+\s+)*dd\b",
        "Privileged disk operation",
    ),
    (
        "dangerous.kill-9",
        RiskTier::Dangerous,
        r"\bkill\s+(?:-9|-KILL|-SIGKILL|-s\s+KILL)\b",
        "Force-killing process",
    ),
    (
        "dangerous.killall",
        RiskTier::Dangerous,
        r"\b(?:killall|pkill)\b",
        "Killing multiple processes",
    ),
    (
        "dangerous.systemctl-stop",
        RiskTier::Dangerous,
        r"\bsystemctl\s+(?:--\S+\s+)*(?:stop|disable|mask)\b",
        "Stopping/disabling system service",
    ),
    (
        "dangerous.iptables-flush",
        RiskTier::Dangerous,
        r"\biptables\s+(?:-t\s+\w+\s+)?(?:-F|--flush)\b",
        "Flushing firewall rules",
    ),
    (
        "dangerous.overwrite-etc",
        RiskTier::Dangerous,
        r">\s*/etc/",
        "Overwriting system config",
    ),
    (
        "dangerous.curl-pipe-shell",
        RiskTier::Dangerous,
        r"\bcurl\b[^|]*\|\s*(?:sudo\s+)?(?:bash|sh|zsh)\b",
        "Piping URL to shell",
    ),
    (
        "dangerous.wget-pipe-shell",
        RiskTier::Dangerous,
        r"\bwget\b[^|]*\|\s*(?:sudo\s+)?(?:bash|sh|zsh)\b",
        "Piping URL to shell",
    ),
    // ---- caution ----
    ("caution.rm", RiskTier::Caution, r"\brm\b", "File deletion"),
    ("caution.sudo", RiskTier::Caution, r"\bsudo\b", "Elevated privileges"),
    ("caution.mv", RiskTier::Caution, r"\bmv\s+", "Moving files"),
    ("caution.chmod", RiskTier::Caution, r"\bchmod\b", "Changing permissions"),
    ("caution.chown", RiskTier::Caution, r"\bchown\b", "Changing ownership"),
    (
        "caution.git-force-push",
        RiskTier::Caution,
        r"\bgit\s+push\s+(?:\S+\s+)*?(?:-f\b|--force)",
        "Force pushing to git",
    ),
    (
        "caution.git-reset-hard",
        RiskTier::Caution,
        r"\bgit\s+reset\s+(?:\S+\s+)*?--hard\b",
        "Hard git reset",
    ),
    (
        "caution.drop-database",
        RiskTier::Caution,
        r"(?i)\bdrop\s+database\b",
        "Dropping database",
    ),
    ("caution.truncate", RiskTier::Caution, r"\btruncate\b", "Truncating table/file"),
    ("caution.shutdown", RiskTier::Caution, r"\bshutdown\b", "System shutdown"),
    ("caution.reboot", RiskTier::Caution, r"\breboot\b", "System reboot"),
];

static STANDARD_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let mut set = RuleSet::empty();
    for (id, tier, pattern, rationale) in STANDARD_RULE_SPECS {
        // Patterns are literals; test_every_standard_rule_compiles covers them
        let rule = RiskRule::new(*id, *tier, pattern, *rationale)
            .expect("built-in risk rule must compile");
        set.push(rule);
    }
    set
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(RiskTier::Critical > RiskTier::Dangerous);
        assert!(RiskTier::Dangerous > RiskTier::Caution);
        assert!(RiskTier::Caution > RiskTier::Safe);
    }

    #[test]
    fn test_tier_serde() {
        assert_eq!(serde_json::to_string(&RiskTier::Dangerous).unwrap(), "\"dangerous\"");
        let tier: RiskTier = serde_json::from_str("\"caution\"").unwrap();
        assert_eq!(tier, RiskTier::Caution);
    }

    #[test]
    fn test_standard_table_shape() {
        let set = RuleSet::standard();
        let count = |tier| set.rules().iter().filter(|r| r.tier == tier).count();
        assert_eq!(count(RiskTier::Critical), 7);
        assert_eq!(count(RiskTier::Dangerous), 10);
        assert_eq!(count(RiskTier::Caution), 11);
        assert!(set.get("dangerous.curl-pipe-shell").is_some());
    }

    #[test]
    fn test_every_standard_rule_compiles() {
        for (id, tier, pattern, rationale) in STANDARD_RULE_SPECS {
            assert!(RiskRule::new(*id, *tier, pattern, *rationale).is_ok(), "{}", id);
        }
    }

    #[test]
    fn test_standard_table_sorted_by_severity() {
        let set = RuleSet::standard();
        let tiers: Vec<RiskTier> = set.rules().iter().map(|r| r.tier).collect();
        let mut sorted = tiers.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(tiers, sorted);
    }

    #[test]
    fn test_push_keeps_order() {
        let set = RuleSet::empty()
            .with_rule(RiskRule::new("c", RiskTier::Caution, "c", "c").unwrap())
            .with_rule(RiskRule::new("x", RiskTier::Critical, "x", "x").unwrap())
            .with_rule(RiskRule::new("c2", RiskTier::Caution, "c2", "c2").unwrap())
            .with_rule(RiskRule::new("d", RiskTier::Dangerous, "d", "d").unwrap());
        let ids: Vec<&str> = set.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "d", "c", "c2"]);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(RiskRule::new("bad", RiskTier::Caution, "(unclosed", "x").is_err());
    }
}
