//! Sandbox classloading hierarchy tests.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use detbox_core::classfile::{ClassWriter, Instruction};
use detbox_core::hierarchy::{
    DirectoryResolver, HierarchyError, LoadError, MemoryResolver, SandboxConfig, SandboxNode,
};
use detbox_core::rules::{Policy, RuleCatalog};

fn pinned_rules() -> RuleCatalog {
    RuleCatalog::standard().with_rule("com/acme/shared/**", Policy::Pin).unwrap()
}

// =============================================================================
// Loading and naming
// =============================================================================

#[test]
fn loaded_class_carries_sandbox_name() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let class = root.load_class("com.acme.Widget").unwrap();
    assert_eq!(class.name(), "sandbox/com/acme/Widget");
    assert_eq!(class.original_name(), "com/acme/Widget");
    assert_eq!(class.defining_node(), root.id());
    assert_eq!(class.digest().len(), 64);
    assert_eq!(root.runtime_name("com.acme.Widget"), "sandbox/com/acme/Widget");
}

#[test]
fn prefixed_and_original_names_hit_same_entry() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let a = root.load_class("com/acme/Widget").unwrap();
    let b = root.load_class("sandbox/com/acme/Widget").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(root.stats().rewrites, 1);
    assert_eq!(root.stats().cache_hits, 1);
}

#[test]
fn custom_prefix_applies() {
    let config = SandboxConfig::default().with_namespace_prefix("box/");
    let root = root_with_config(config, &[plain("com/acme/Widget")]);
    assert_eq!(root.load_class("com.acme.Widget").unwrap().name(), "box/com/acme/Widget");
}

#[test]
fn malformed_bytes_fail_only_that_class() {
    let resolver = resolver_with(&[plain("com/acme/Good")]);
    resolver.insert("com/acme/Bad", vec![0xde, 0xad]);
    let root = SandboxNode::create_root(SandboxConfig::default(), resolver).unwrap();
    assert!(matches!(root.load_class("com.acme.Bad"), Err(LoadError::Malformed { .. })));
    assert!(root.load_class("com.acme.Good").is_ok());
}

#[test]
fn bytes_under_wrong_name_are_malformed() {
    let resolver = Arc::new(MemoryResolver::new());
    let bytes = ClassWriter::write(&plain("com/acme/Real")).unwrap();
    resolver.insert("com/acme/Alias", bytes);
    let root = SandboxNode::create_root(SandboxConfig::default(), resolver).unwrap();
    assert!(matches!(root.load_class("com.acme.Alias"), Err(LoadError::Malformed { .. })));
}

// =============================================================================
// Failures are never cached
// =============================================================================

#[test]
fn missing_class_can_appear_later() {
    let resolver = Arc::new(MemoryResolver::new());
    let root = SandboxNode::create_root(SandboxConfig::default(), resolver.clone()).unwrap();
    assert!(root.load_class("com.acme.Late").unwrap_err().is_not_found());
    resolver.insert_class(&plain("com/acme/Late")).unwrap();
    assert!(root.load_class("com.acme.Late").is_ok());
    assert_eq!(root.stats().failures, 1);
}

#[test]
fn forbidden_class_never_cached() {
    let root = root_with(&[file_reader()]);
    for _ in 0..2 {
        let err = root.load_class("com.acme.ReadsFiles").unwrap_err();
        assert!(err.is_rule_violation());
    }
    assert_eq!(root.cached_count(), 0);
    assert_eq!(root.stats().failures, 2);
}

#[test]
fn forbidden_name_rejected_directly() {
    let root = root_with(&[]);
    match root.load_class("rt.io.File") {
        Err(LoadError::RuleViolation { reason, .. }) => {
            assert_eq!(reason, "Disallowed reference to rt.io.File");
        }
        other => panic!("expected RuleViolation, got {:?}", other),
    }
}

// =============================================================================
// Parenting
// =============================================================================

#[test]
fn child_reuses_ancestor_rewrite() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let from_root = root.load_class("com.acme.Widget").unwrap();
    let child = root.create_child().unwrap();
    let grandchild = child.create_child().unwrap();
    let from_grandchild = grandchild.load_class("com.acme.Widget").unwrap();
    assert!(Arc::ptr_eq(&from_root, &from_grandchild));
    assert_eq!(grandchild.stats().ancestor_hits, 1);
    assert_eq!(grandchild.cached_count(), 0);
}

#[test]
fn loaded_state_visible_from_descendants_only() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let child = root.create_child().unwrap();
    assert!(!root.is_loaded("com.acme.Widget"));
    assert!(!child.is_loaded("com.acme.Widget"));

    child.load_class("com.acme.Widget").unwrap();
    assert!(child.is_loaded("sandbox/com/acme/Widget"));
    assert!(!root.is_loaded("com/acme/Widget"));

    root.load_class("com.acme.Widget").unwrap();
    let sibling = root.create_child().unwrap();
    assert!(sibling.is_loaded("com/acme/Widget"));
    assert_eq!(sibling.cached_count(), 0);
}

#[test]
fn siblings_rewrite_independently() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let a = root.create_child().unwrap();
    let b = root.create_child().unwrap();
    let from_a = a.load_class("com.acme.Widget").unwrap();
    let from_b = b.load_class("com.acme.Widget").unwrap();
    assert!(!Arc::ptr_eq(&from_a, &from_b));
    assert_eq!(from_a.defining_node(), a.id());
    assert_eq!(from_b.defining_node(), b.id());
    assert_eq!(from_a.digest(), from_b.digest(), "same rules, same bytes");
}

#[test]
fn pinned_class_shared_across_siblings() {
    let config = SandboxConfig::default().with_rules(pinned_rules());
    let root = root_with_config(config, &[plain("com/acme/shared/Key")]);
    let a = root.create_child().unwrap();
    let b = root.create_child().unwrap();
    let from_a = a.load_class("com.acme.shared.Key").unwrap();
    let from_b = b.load_class("com.acme.shared.Key").unwrap();
    assert!(Arc::ptr_eq(&from_a, &from_b));
    assert_eq!(from_a.defining_node(), root.id());
    assert_eq!(root.cached_classes(), vec!["com/acme/shared/Key".to_string()]);
}

#[test]
fn child_with_different_rules_rewrites_locally() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let from_root = root.load_class("com.acme.Widget").unwrap();
    let child = root
        .create_child_with(|config| config.with_rules(RuleCatalog::new(Policy::PassThrough)))
        .unwrap();
    let from_child = child.load_class("com.acme.Widget").unwrap();
    assert!(!Arc::ptr_eq(&from_root, &from_child));
    assert_eq!(from_child.name(), "com/acme/Widget");
    assert_eq!(from_child.defining_node(), child.id());
}

#[test]
fn child_config_validated() {
    let root = root_with(&[]);
    let err = root
        .create_child_with(|config| config.with_namespace_prefix("bad"))
        .unwrap_err();
    assert!(matches!(err, HierarchyError::InvalidConfig(_)));
}

// =============================================================================
// Destruction
// =============================================================================

#[test]
fn destroy_requires_children_gone() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let child = root.create_child().unwrap();
    assert_eq!(root.destroy(), Err(HierarchyError::NodeHasChildren { count: 1 }));
    child.destroy().unwrap();
    root.destroy().unwrap();
    assert!(root.is_destroyed());
    assert_eq!(root.destroy(), Err(HierarchyError::NodeDestroyed));
}

#[test]
fn destroyed_node_refuses_operations() {
    let root = root_with(&[plain("com/acme/Widget")]);
    let child = root.create_child().unwrap();
    root.load_class("com.acme.Widget").unwrap();
    child.destroy().unwrap();
    assert!(matches!(
        child.load_class("com.acme.Widget"),
        Err(LoadError::Hierarchy(HierarchyError::NodeDestroyed))
    ));
    assert_eq!(child.create_child().unwrap_err(), HierarchyError::NodeDestroyed);
    assert!(root.load_class("com.acme.Widget").is_ok(), "parent unaffected");
}

#[test]
fn dropped_child_releases_parent() {
    let root = root_with(&[]);
    {
        let _child = root.create_child().unwrap();
    }
    assert!(root.destroy().is_ok());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn concurrent_loads_define_once() {
    let root = root_with(&multiplier());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let node = root.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                node.load_class("com.acme.Multiplier").unwrap()
            })
        })
        .collect();
    let loaded: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(loaded.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(root.stats().rewrites, 1);
}

#[test]
fn sibling_nodes_load_in_parallel() {
    let root = root_with(&multiplier());
    let children: Vec<SandboxNode> = (0..4).map(|_| root.create_child().unwrap()).collect();
    let handles: Vec<_> = children
        .iter()
        .cloned()
        .map(|node| thread::spawn(move || node.load_class("com.acme.Multiplier$1").unwrap()))
        .collect();
    let loaded: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (class, node) in loaded.iter().zip(&children) {
        assert_eq!(class.defining_node(), node.id());
    }
}

// =============================================================================
// Directory resolver
// =============================================================================

#[test]
fn directory_resolver_feeds_node() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("com/acme")).unwrap();
    let bytes = ClassWriter::write(&plain("com/acme/Widget")).unwrap();
    std::fs::write(dir.path().join("com/acme/Widget.class"), bytes).unwrap();

    let root = SandboxNode::create_root(
        SandboxConfig::default(),
        Arc::new(DirectoryResolver::new(dir.path())),
    )
    .unwrap();
    let class = root.load_class("com.acme.Widget").unwrap();
    assert_eq!(class.name(), "sandbox/com/acme/Widget");
    assert!(matches!(root.load_class("com.acme.Missing"), Err(LoadError::NotFound(_))));
}

#[test]
fn rewritten_code_is_instrumented() {
    let root = root_with(&multiplier());
    let class = root.load_class("com.acme.Multiplier").unwrap();
    let apply = class.descriptor().find_method("apply", "(J)J").unwrap();
    let code = apply.code.as_ref().unwrap();
    assert_eq!(code.instructions[0], Instruction::MeterInvocation);
    assert!(code.instructions.contains(&Instruction::MeterAllocation));
    assert!(class.was_modified());
}
