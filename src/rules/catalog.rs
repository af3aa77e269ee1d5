//! Rule catalog: pattern matching and policy resolution.

use serde::{Deserialize, Serialize};

use super::RuleError;

/// Treatment of a class reference during rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Kept as-is; resolved by the host runtime library.
    PassThrough,
    /// Renamed into the sandbox namespace and loaded per node.
    Remap,
    /// Any reference fails the rewrite.
    Forbid,
    /// Renamed like `Remap`, but one copy is shared by the whole hierarchy.
    Pin,
}

impl Policy {
    /// Tie-break order among equally specific rules.
    fn restrictiveness(self) -> u8 {
        match self {
            Self::Forbid => 3,
            Self::Remap => 2,
            Self::Pin => 1,
            Self::PassThrough => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PassThrough => "pass-through",
            Self::Remap => "remap",
            Self::Forbid => "forbid",
            Self::Pin => "pin",
        }
    }

    /// Whether references under this policy carry the namespace prefix.
    pub fn is_sandboxed(self) -> bool {
        matches!(self, Self::Remap | Self::Pin)
    }
}

/// Class-name pattern: `pkg/Name` exact, `pkg/*` one package level,
/// `pkg/**` the package and everything below it, `**` everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternKind {
    Exact(String),
    /// Prefix includes the trailing `/` (empty for top-level `*`).
    Package(String),
    Recursive(String),
}

impl Pattern {
    /// Parse a pattern. Dotted names are normalized to internal names.
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        let invalid = |reason: &str| RuleError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.is_empty() {
            return Err(invalid("empty pattern"));
        }
        let normalized = raw.replace('.', "/");
        let raw = normalized.as_str();

        let kind = if let Some(prefix) = raw.strip_suffix("**") {
            if !(prefix.is_empty() || prefix.ends_with('/')) {
                return Err(invalid("'**' must follow a '/'"));
            }
            PatternKind::Recursive(prefix.to_string())
        } else if let Some(prefix) = raw.strip_suffix('*') {
            if !(prefix.is_empty() || prefix.ends_with('/')) {
                return Err(invalid("'*' must follow a '/'"));
            }
            PatternKind::Package(prefix.to_string())
        } else {
            PatternKind::Exact(raw.to_string())
        };

        let literal = match &kind {
            PatternKind::Exact(s) | PatternKind::Package(s) | PatternKind::Recursive(s) => s,
        };
        if literal.contains('*') {
            return Err(invalid("wildcards are only allowed as the final segment"));
        }
        if literal.contains("//") || literal.starts_with('/') {
            return Err(invalid("empty path segment"));
        }
        Ok(Self { raw: raw.to_string(), kind })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.kind {
            PatternKind::Exact(exact) => name == exact,
            PatternKind::Package(prefix) => name
                .strip_prefix(prefix.as_str())
                .map(|rest| !rest.is_empty() && !rest.contains('/'))
                .unwrap_or(false),
            PatternKind::Recursive(prefix) => name
                .strip_prefix(prefix.as_str())
                .map(|rest| !rest.is_empty())
                .unwrap_or(false),
        }
    }

    /// Orders matches: exact patterns beat wildcards, then longer literals win.
    fn specificity(&self) -> (bool, usize) {
        match &self.kind {
            PatternKind::Exact(s) => (true, s.len()),
            PatternKind::Package(s) | PatternKind::Recursive(s) => (false, s.len()),
        }
    }
}

impl TryFrom<String> for Pattern {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pattern::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRule {
    pub pattern: Pattern,
    pub policy: Policy,
}

impl NamespaceRule {
    pub fn new(pattern: &str, policy: Policy) -> Result<Self, RuleError> {
        Ok(Self { pattern: Pattern::parse(pattern)?, policy })
    }
}

/// Ordered collection of namespace rules plus the fallback policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCatalog {
    #[serde(default = "default_policy")]
    pub default_policy: Policy,
    #[serde(default, rename = "rule")]
    pub rules: Vec<NamespaceRule>,
}

fn default_policy() -> Policy {
    Policy::Remap
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleCatalog {
    /// Catalog with no rules; every name gets `default_policy`.
    pub fn new(default_policy: Policy) -> Self {
        Self { default_policy, rules: Vec::new() }
    }

    /// Host runtime library passes through, host I/O, networking, threads and
    /// class loaders are forbidden, everything else is remapped.
    pub fn standard() -> Self {
        let table: &[(&str, Policy)] = &[
            ("rt/**", Policy::PassThrough),
            ("rt/io/**", Policy::Forbid),
            ("rt/net/**", Policy::Forbid),
            ("rt/concurrent/**", Policy::Forbid),
            ("rt/ClassLoader", Policy::Forbid),
        ];
        let rules = table
            .iter()
            .filter_map(|(pattern, policy)| NamespaceRule::new(pattern, *policy).ok())
            .collect();
        Self { default_policy: Policy::Remap, rules }
    }

    pub fn with_rule(mut self, pattern: &str, policy: Policy) -> Result<Self, RuleError> {
        self.rules.push(NamespaceRule::new(pattern, policy)?);
        Ok(self)
    }

    /// Parse a TOML rules document:
    ///
    /// ```toml
    /// default_policy = "remap"
    ///
    /// [[rule]]
    /// pattern = "com/acme/shared/**"
    /// policy = "pin"
    /// ```
    pub fn from_toml(source: &str) -> Result<Self, RuleError> {
        toml::from_str(source).map_err(|e| RuleError::Parse(e.to_string()))
    }

    /// Resolve the policy for an internal class name. Total: falls back to
    /// `default_policy` when no rule matches.
    pub fn classify(&self, name: &str) -> Policy {
        let mut best: Option<&NamespaceRule> = None;
        for rule in self.rules.iter().filter(|r| r.pattern.matches(name)) {
            best = match best {
                None => Some(rule),
                Some(current) => {
                    let (a, b) = (rule.pattern.specificity(), current.pattern.specificity());
                    let better = a > b
                        || (a == b
                            && rule.policy.restrictiveness() > current.policy.restrictiveness());
                    if better {
                        Some(rule)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.map(|r| r.policy).unwrap_or(self.default_policy)
    }

    /// Classify a name that may already carry the sandbox prefix; prefixed
    /// names are judged by their original name.
    pub fn classify_with_prefix(&self, name: &str, prefix: &str) -> Policy {
        self.classify(name.strip_prefix(prefix).unwrap_or(name))
    }
}
