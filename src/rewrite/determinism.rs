//! Determinism fixups and native-method stubbing.

use crate::classfile::descriptor::{self, display_name};
use crate::classfile::{access, ClassDescriptor, Code, Instruction, InvokeKind, MemberRef, MethodDescriptor};
use crate::rules::FixupAction;
use crate::telemetry::{log_security_event, SecurityEvent};

use super::{RewriteContext, RewriteError, RewriteStats};

/// Native registration hook that becomes a no-op instead of a trap.
const REGISTER_NATIVES: (&str, &str) = ("registerNatives", "()V");

pub(super) fn apply(
    class: &mut ClassDescriptor,
    ctx: &RewriteContext<'_>,
    stats: &mut RewriteStats,
) -> Result<(), RewriteError> {
    let class_name = class.name.clone();
    for method in class.methods.iter_mut() {
        if method.is_native() {
            stub_native(&class_name, method);
            stats.natives_stubbed += 1;
            continue;
        }
        if let Some(code) = method.code.as_mut() {
            stats.fixups_applied += fix_calls(&class_name, code, ctx)?;
        }
    }
    Ok(())
}

fn fix_calls(class: &str, code: &mut Code, ctx: &RewriteContext<'_>) -> Result<usize, RewriteError> {
    let mut applied = 0;
    for insn in code.instructions.iter_mut() {
        let Instruction::Invoke { method, .. } = insn else {
            continue;
        };
        let lookup = MemberRef {
            owner: ctx.original_name(&method.owner).to_string(),
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
        };
        let Some(rule) = ctx.fixups.find(&lookup) else {
            continue;
        };
        match &rule.action {
            FixupAction::Replace { owner, name, descriptor } => {
                *insn = Instruction::Invoke {
                    kind: InvokeKind::Static,
                    method: MemberRef::new(owner, name, descriptor),
                };
            }
            FixupAction::Reject { reason } => {
                log_security_event(
                    SecurityEvent::NonDeterministicCall,
                    "Rejected call to non-deterministic API",
                    &[("class", class), ("member", lookup.to_string().as_str())],
                );
                return Err(RewriteError::RuleViolation {
                    class: class.to_string(),
                    reason: format!("{}: {}", reason, lookup),
                });
            }
            FixupAction::Trap { message } => {
                *insn = Instruction::Trap(message.clone());
            }
        }
        applied += 1;
    }
    Ok(applied)
}

/// Give a native method a body: `registerNatives()V` returns, anything
/// else traps when called.
fn stub_native(class: &str, method: &mut MethodDescriptor) {
    method.access &= !access::NATIVE;
    let params = descriptor::method_shape(&method.descriptor)
        .map(|s| s.params)
        .unwrap_or(0);
    let receiver = usize::from(!method.is_static());
    let max_locals = u16::try_from(params + receiver).unwrap_or(u16::MAX);

    let body = if (method.name.as_str(), method.descriptor.as_str()) == REGISTER_NATIVES {
        vec![Instruction::Return]
    } else {
        log_security_event(
            SecurityEvent::NativeMethodStubbed,
            "Native method replaced by trap",
            &[("class", class), ("method", method.name.as_str())],
        );
        vec![Instruction::Trap(format!(
            "Native method has been deleted; {}.{}{}",
            display_name(class),
            method.name,
            method.descriptor
        ))]
    };
    method.code = Some(Code { max_locals, instructions: body, handlers: Vec::new() });
}
