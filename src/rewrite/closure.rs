//! Closure consistency: a synthetic closure class and the class that creates
//! it must land on the same side of the namespace boundary.

use crate::classfile::{ClassDescriptor, Instruction};
use crate::rules::Policy;

use super::{RewriteContext, RewriteError};

pub(super) fn check(class: &ClassDescriptor, ctx: &RewriteContext<'_>) -> Result<(), RewriteError> {
    let own = ctx.classify(&class.name);

    if let Some(enclosing) = &class.enclosing_class {
        let outer = ctx.classify(enclosing);
        if outer != Policy::Forbid && own.is_sandboxed() != outer.is_sandboxed() {
            return Err(inconsistent(&class.name, &class.name, own, enclosing, outer));
        }
    }

    for method in &class.methods {
        let Some(code) = &method.code else { continue };
        for insn in &code.instructions {
            if let Instruction::MakeClosure { class: closure, .. } = insn {
                let policy = ctx.classify(closure);
                if policy != Policy::Forbid && policy.is_sandboxed() != own.is_sandboxed() {
                    return Err(inconsistent(&class.name, closure, policy, &class.name, own));
                }
            }
        }
    }
    Ok(())
}

fn inconsistent(class: &str, closure: &str, closure_policy: Policy, outer: &str, outer_policy: Policy) -> RewriteError {
    RewriteError::Inconsistent {
        class: class.to_string(),
        reason: format!(
            "closure {} ({}) does not match enclosing {} ({})",
            closure,
            closure_policy.as_str(),
            outer,
            outer_policy.as_str()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassBuilder;
    use crate::rules::{FixupPolicy, RuleCatalog};

    #[test]
    fn test_matching_closure_passes() {
        let rules = RuleCatalog::standard();
        let fixups = FixupPolicy::empty();
        let ctx = RewriteContext { namespace_prefix: "sandbox/", rules: &rules, fixups: &fixups };
        let closure = ClassBuilder::new("com/acme/Task$1").enclosed_by("com/acme/Task").build();
        assert!(check(&closure, &ctx).is_ok());
    }

    #[test]
    fn test_mismatched_closure_fails() {
        let rules = RuleCatalog::standard()
            .with_rule("com/acme/Task$1", Policy::PassThrough)
            .unwrap();
        let fixups = FixupPolicy::empty();
        let ctx = RewriteContext { namespace_prefix: "sandbox/", rules: &rules, fixups: &fixups };
        let closure = ClassBuilder::new("com/acme/Task$1").enclosed_by("com/acme/Task").build();
        assert!(matches!(check(&closure, &ctx), Err(RewriteError::Inconsistent { .. })));
    }
}
