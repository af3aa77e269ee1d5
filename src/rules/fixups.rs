//! Determinism fixups for host runtime members.

use serde::{Deserialize, Serialize};

use crate::classfile::MemberRef;

use super::RuleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixupAction {
    /// Redirect the call to a deterministic static replacement. Instance
    /// calls pass the receiver as the first argument.
    Replace { owner: String, name: String, descriptor: String },
    /// The class fails to load.
    Reject { reason: String },
    /// The call site is replaced by a trap that aborts when reached.
    Trap { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixupRule {
    pub owner: String,
    pub name: String,
    /// `None` matches every overload.
    #[serde(default)]
    pub descriptor: Option<String>,
    pub action: FixupAction,
}

impl FixupRule {
    pub fn matches(&self, member: &MemberRef) -> bool {
        self.owner == member.owner
            && self.name == member.name
            && self
                .descriptor
                .as_deref()
                .map(|d| d == member.descriptor)
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixupPolicy {
    #[serde(default, rename = "fixup")]
    pub rules: Vec<FixupRule>,
}

fn replace(owner: &str, name: &str, descriptor: Option<&str>, to: (&str, &str, &str)) -> FixupRule {
    FixupRule {
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.map(str::to_string),
        action: FixupAction::Replace {
            owner: to.0.to_string(),
            name: to.1.to_string(),
            descriptor: to.2.to_string(),
        },
    }
}

fn reject(owner: &str, name: &str, reason: &str) -> FixupRule {
    FixupRule {
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: None,
        action: FixupAction::Reject { reason: reason.to_string() },
    }
}

fn trap(owner: &str, name: &str) -> FixupRule {
    FixupRule {
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: None,
        action: FixupAction::Trap {
            message: format!("Disallowed reference to API; {}.{}", owner.replace('/', "."), name),
        },
    }
}

impl FixupPolicy {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fixups for the host runtime library: clocks, randomness and identity
    /// hashes become deterministic, threads are rejected, class-loader and
    /// protection-domain access traps.
    pub fn standard() -> Self {
        const SANDBOX: &str = "rt/Sandbox";
        let rules = vec![
            replace("rt/System", "currentTimeMillis", Some("()J"), (SANDBOX, "currentTimeMillis", "()J")),
            replace("rt/System", "nanoTime", Some("()J"), (SANDBOX, "nanoTime", "()J")),
            replace(
                "rt/System",
                "identityHashCode",
                Some("(Lrt/Object;)J"),
                (SANDBOX, "hashCode", "(Lrt/Object;)J"),
            ),
            replace("rt/Object", "hashCode", Some("()J"), (SANDBOX, "hashCode", "(Lrt/Object;)J")),
            replace("rt/Random", "nextLong", Some("()J"), (SANDBOX, "nextLong", "(Lrt/Random;)J")),
            replace(
                "rt/String",
                "intern",
                Some("()Lrt/String;"),
                (SANDBOX, "intern", "(Lrt/String;)Lrt/String;"),
            ),
            reject("rt/Thread", "start", "Thread creation is not deterministic"),
            reject("rt/Thread", "sleep", "Thread scheduling is not deterministic"),
            reject("rt/System", "gc", "Garbage collection is not observable"),
            trap("rt/Class", "getClassLoader"),
            trap("rt/Class", "getProtectionDomain"),
        ];
        Self { rules }
    }

    /// Parse `[[fixup]]` tables from a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, RuleError> {
        toml::from_str(source).map_err(|e| RuleError::Parse(e.to_string()))
    }

    /// Place `overrides` ahead of the current rules.
    pub fn overlay(mut self, overrides: FixupPolicy) -> Self {
        let mut rules = overrides.rules;
        rules.append(&mut self.rules);
        self.rules = rules;
        self
    }

    /// First rule matching the member, if any.
    pub fn find(&self, member: &MemberRef) -> Option<&FixupRule> {
        self.rules.iter().find(|r| r.matches(member))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_replaces_clock() {
        let policy = FixupPolicy::standard();
        let rule = policy
            .find(&MemberRef::new("rt/System", "currentTimeMillis", "()J"))
            .unwrap();
        assert!(matches!(&rule.action, FixupAction::Replace { owner, .. } if owner == "rt/Sandbox"));
    }

    #[test]
    fn test_descriptor_wildcard() {
        let policy = FixupPolicy::standard();
        assert!(policy
            .find(&MemberRef::new("rt/Thread", "start", "(Lrt/Function;)V"))
            .is_some());
        assert!(policy
            .find(&MemberRef::new("rt/System", "currentTimeMillis", "(J)J"))
            .is_none());
    }

    #[test]
    fn test_trap_message() {
        let policy = FixupPolicy::standard();
        let rule = policy
            .find(&MemberRef::new("rt/Class", "getProtectionDomain", "()Lrt/Object;"))
            .unwrap();
        assert_eq!(
            rule.action,
            FixupAction::Trap {
                message: "Disallowed reference to API; rt.Class.getProtectionDomain".to_string()
            }
        );
    }

    #[test]
    fn test_overlay_takes_precedence() {
        let custom = FixupPolicy::from_toml(
            r#"
            [[fixup]]
            owner = "rt/System"
            name = "currentTimeMillis"
            action = { reject = { reason = "no clocks here" } }
            "#,
        )
        .unwrap();
        let policy = FixupPolicy::standard().overlay(custom);
        let rule = policy
            .find(&MemberRef::new("rt/System", "currentTimeMillis", "()J"))
            .unwrap();
        assert!(matches!(rule.action, FixupAction::Reject { .. }));
    }
}
