//! Rewriter tests: idempotency, forbidden references, fixups.

mod common;

use common::*;
use detbox_core::classfile::{
    access, parse, ClassBuilder, ClassDescriptor, ClassWriter, Instruction, InvokeKind, MemberRef,
    MethodBuilder,
};
use detbox_core::rewrite::{rewrite, RewriteContext, RewriteError};
use detbox_core::rules::{FixupPolicy, Policy, RuleCatalog};

fn rewrite_with(class: ClassDescriptor, rules: &RuleCatalog, fixups: &FixupPolicy) -> Result<ClassDescriptor, RewriteError> {
    let ctx = RewriteContext { namespace_prefix: "sandbox/", rules, fixups };
    rewrite(class, ctx).map(|outcome| outcome.descriptor)
}

fn standard(class: ClassDescriptor) -> Result<ClassDescriptor, RewriteError> {
    rewrite_with(class, &RuleCatalog::standard(), &FixupPolicy::standard())
}

// =============================================================================
// Idempotency
// =============================================================================

#[test]
fn pass_through_graph_rewrite_is_idempotent() {
    let rules = RuleCatalog::new(Policy::PassThrough);
    let fixups = FixupPolicy::empty();
    let class = multiplier().remove(0);
    let once = rewrite_with(class, &rules, &fixups).unwrap();
    let twice = rewrite_with(once.clone(), &rules, &fixups).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once.name, "com/acme/Multiplier");
}

#[test]
fn remapped_rewrite_is_idempotent() {
    for class in multiplier().into_iter().chain(tagged_user_data()).chain(thrower()) {
        let once = standard(class).unwrap();
        let twice = standard(once.clone()).unwrap();
        assert_eq!(once, twice, "{} changed on second rewrite", once.name);
    }
}

#[test]
fn rewritten_class_survives_serialization() {
    let once = standard(clock_and_hash()).unwrap();
    let bytes = ClassWriter::write(&once).unwrap();
    assert_eq!(parse(&bytes).unwrap(), once);
}

// =============================================================================
// Namespace remapping
// =============================================================================

#[test]
fn references_remapped_into_namespace() {
    let class = standard(point_sum().remove(1)).unwrap();
    assert_eq!(class.name, "sandbox/com/acme/SumPoint");
    let apply = &class.methods.iter().find(|m| m.name == "apply").unwrap();
    assert_eq!(apply.descriptor, "(Lsandbox/com/acme/Point;)J");
    let code = apply.code.as_ref().unwrap();
    assert!(code.instructions.contains(&Instruction::GetField(MemberRef::new(
        "sandbox/com/acme/Point",
        "x",
        "J"
    ))));
}

#[test]
fn host_runtime_passes_through() {
    let class = standard(thrower().remove(0)).unwrap();
    assert_eq!(class.name, "sandbox/com/acme/Oops");
    assert_eq!(class.super_name.as_deref(), Some("rt/RuntimeException"));
}

// =============================================================================
// Forbidden references
// =============================================================================

#[test]
fn forbidden_type_anywhere_fails() {
    let as_field = ClassBuilder::new("com/acme/Holder").field(0, "socket", "Lrt/net/Socket;").build();
    let as_super = ClassBuilder::new("com/acme/Loader").super_class("rt/ClassLoader").build();
    for class in [file_reader(), as_field, as_super] {
        let err = standard(class).unwrap_err();
        assert!(err.is_rule_violation(), "{:?}", err);
    }
}

#[test]
fn violation_names_original_type() {
    match standard(file_reader()) {
        Err(RewriteError::RuleViolation { class, reason }) => {
            assert_eq!(class, "com/acme/ReadsFiles");
            assert_eq!(reason, "Disallowed reference to rt.io.File");
        }
        other => panic!("expected a rule violation, got {:?}", other),
    }
}

// =============================================================================
// Determinism fixups
// =============================================================================

#[test]
fn clock_and_identity_hash_redirected() {
    let class = standard(clock_and_hash()).unwrap();
    let code = class.methods[1].code.as_ref().unwrap();
    let calls: Vec<&MemberRef> = code
        .instructions
        .iter()
        .filter_map(|insn| match insn {
            Instruction::Invoke { method, .. } => Some(method),
            _ => None,
        })
        .collect();
    assert!(calls.iter().any(|m| m.owner == "rt/Sandbox" && m.name == "currentTimeMillis"));
    assert!(calls.iter().any(|m| m.owner == "rt/Sandbox" && m.name == "hashCode"));
    assert!(!calls.iter().any(|m| m.owner == "rt/System"));
}

#[test]
fn without_fixups_host_calls_remain() {
    let class = rewrite_with(clock_and_hash(), &RuleCatalog::standard(), &FixupPolicy::empty()).unwrap();
    let code = class.methods[1].code.as_ref().unwrap();
    assert!(code.instructions.iter().any(|insn| matches!(
        insn,
        Instruction::Invoke { method, .. } if method.owner == "rt/System"
    )));
}

#[test]
fn thread_start_rejected() {
    let class = task(
        "com/acme/Spawner",
        "(J)J",
        vec![
            Instruction::New("rt/Thread".to_string()),
            invoke(InvokeKind::Virtual, "rt/Thread", "start", "()V"),
            Instruction::Load(1),
            Instruction::ReturnValue,
        ],
    );
    assert!(standard(class).unwrap_err().is_rule_violation());
}

#[test]
fn native_methods_stubbed() {
    let class = ClassBuilder::new("com/acme/Native")
        .method(MethodBuilder::new("registerNatives", "()V").access(access::STATIC | access::NATIVE))
        .method(MethodBuilder::new("peek", "(J)J").access(access::PUBLIC | access::NATIVE))
        .build();
    let class = standard(class).unwrap();
    for method in &class.methods {
        assert!(!method.is_native());
        assert!(method.code.is_some());
    }
    let peek = class.find_method("peek", "(J)J").unwrap();
    assert!(peek
        .code
        .as_ref()
        .unwrap()
        .instructions
        .iter()
        .any(|insn| matches!(insn, Instruction::Trap(_))));
}

// =============================================================================
// Closures
// =============================================================================

#[test]
fn closure_split_across_boundary_rejected() {
    let rules = RuleCatalog::standard()
        .with_rule("com/acme/Multiplier$1", Policy::PassThrough)
        .unwrap();
    let err = rewrite_with(multiplier().remove(0), &rules, &FixupPolicy::standard()).unwrap_err();
    assert!(matches!(err, RewriteError::Inconsistent { .. }));
}
