//! Task execution bridge tests.

mod common;

use common::*;
use detbox_core::bridge::{self, ExecutionFailure, HostValue};
use detbox_core::classfile::{access, ClassBuilder, Instruction, InvokeKind, MethodBuilder};
use detbox_core::hierarchy::{HierarchyError, SandboxConfig};
use detbox_core::runtime::{ExecutionContext, HASH_OFFSET, ISO_COUNTRIES, ISO_LANGUAGES};

// =============================================================================
// Successful invocations
// =============================================================================

#[test]
fn closure_capturing_value_multiplies() {
    let root = root_with(&multiplier());
    let summary = bridge::invoke(&root, "com.acme.Multiplier", &HostValue::Long(1234)).unwrap();
    assert_eq!(summary.result, Ok(HostValue::Long(123_400)));
    assert!(summary.costs.invocations >= 2, "apply and call are both metered");
    assert_eq!(summary.costs.allocations, 1, "one closure allocated");
}

#[test]
fn internal_names_accepted_for_entry() {
    let root = root_with(&multiplier());
    let summary = bridge::invoke(&root, "com/acme/Multiplier", &HostValue::Long(2)).unwrap();
    assert_eq!(summary.result, Ok(HostValue::Long(200)));
}

#[test]
fn object_input_marshaled_into_namespace() {
    let root = root_with(&point_sum());
    let input = HostValue::object("com.acme.Point")
        .with_field("x", HostValue::Long(3))
        .with_field("y", HostValue::Long(4));
    let summary = bridge::invoke(&root, "com.acme.SumPoint", &input).unwrap();
    assert_eq!(summary.result, Ok(HostValue::Long(7)));
}

#[test]
fn missing_object_fields_default_to_zero() {
    let root = root_with(&point_sum());
    let input = HostValue::object("com.acme.Point").with_field("x", HostValue::Long(5));
    let summary = bridge::invoke(&root, "com.acme.SumPoint", &input).unwrap();
    assert_eq!(summary.result, Ok(HostValue::Long(5)));
}

#[test]
fn object_result_reported_under_original_name() {
    let mut classes = point_sum();
    classes.push(task(
        "com/acme/MakePoint",
        "(J)Lcom/acme/Point;",
        vec![
            Instruction::New("com/acme/Point".to_string()),
            Instruction::ReturnValue,
        ],
    ));
    let root = root_with(&classes);
    let summary = bridge::invoke(&root, "com.acme.MakePoint", &HostValue::Long(0)).unwrap();
    let expected = HostValue::object("com.acme.Point")
        .with_field("x", HostValue::Long(0))
        .with_field("y", HostValue::Long(0));
    assert_eq!(summary.result, Ok(expected));
}

#[test]
fn sandboxed_handler_catches_fault() {
    let root = root_with(&[guarded_division()]);
    let summary = bridge::invoke(&root, "com.acme.Guarded", &HostValue::Long(9)).unwrap();
    assert_eq!(summary.result, Ok(HostValue::Long(-1)));
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn repeated_invocations_are_identical() {
    let root = root_with(&[clock_and_hash()]);
    let first = bridge::invoke(&root, "com.acme.Clock", &HostValue::Long(0)).unwrap();
    let second = bridge::invoke(&root, "com.acme.Clock", &HostValue::Long(0)).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.result, Ok(HostValue::Long(HASH_OFFSET + 1)));
}

#[test]
fn inherited_hash_code_is_deterministic() {
    let hash_self = task(
        "com/acme/HashSelf",
        "(J)J",
        vec![
            Instruction::Load(0),
            invoke(InvokeKind::Virtual, "com/acme/HashSelf", "hashCode", "()J"),
            Instruction::ReturnValue,
        ],
    );
    let root = root_with(&[hash_self]);
    for _ in 0..5 {
        let summary = bridge::invoke(&root, "com.acme.HashSelf", &HostValue::Long(0)).unwrap();
        assert_eq!(summary.result, Ok(HostValue::Long(HASH_OFFSET + 1)));
    }
}

#[test]
fn inherited_rejected_member_is_rule_violation() {
    let worker = ClassBuilder::new("com/acme/Worker").super_class("rt/Thread").default_constructor().build();
    let starts = task(
        "com/acme/Starts",
        "(J)J",
        vec![
            Instruction::New("com/acme/Worker".to_string()),
            Instruction::Dup,
            invoke(InvokeKind::Special, "com/acme/Worker", "<init>", "()V"),
            invoke(InvokeKind::Virtual, "com/acme/Worker", "start", "()V"),
            Instruction::Load(1),
            Instruction::ReturnValue,
        ],
    );
    let root = root_with(&[worker, starts]);
    let summary = bridge::invoke(&root, "com.acme.Starts", &HostValue::Long(1)).unwrap();
    assert!(matches!(summary.result, Err(ExecutionFailure::RuleViolation { .. })));
}

#[test]
fn identical_configs_agree_across_roots() {
    let a = root_with(&multiplier());
    let b = root_with(&multiplier());
    let input = HostValue::Long(77);
    assert_eq!(
        bridge::invoke(&a, "com.acme.Multiplier", &input).unwrap(),
        bridge::invoke(&b, "com.acme.Multiplier", &input).unwrap()
    );
}

#[test]
fn random_stream_follows_seed() {
    let dice = task(
        "com/acme/Dice",
        "(J)J",
        vec![
            Instruction::New("rt/Random".to_string()),
            Instruction::Dup,
            invoke(InvokeKind::Special, "rt/Random", "<init>", "()V"),
            invoke(InvokeKind::Virtual, "rt/Random", "nextLong", "()J"),
            Instruction::Load(1),
            Instruction::Sub,
            Instruction::ReturnValue,
        ],
    );
    let seeded = |seed: u64| {
        let root = root_with_config(SandboxConfig::default().with_random_seed(seed), &[dice.clone()]);
        bridge::invoke(&root, "com.acme.Dice", &HostValue::Long(5)).unwrap().result
    };
    let expected = ExecutionContext::new(7).next_random().wrapping_sub(5);
    assert_eq!(seeded(7), Ok(HostValue::Long(expected)));
    assert_eq!(seeded(7), seeded(7));
    assert_ne!(seeded(7), seeded(8));
}

#[test]
fn locale_lookups_in_parented_sandbox() {
    let lookup = task(
        "com/acme/LookupLocale",
        "(Lrt/String;)Lrt/String;",
        vec![
            Instruction::Load(1),
            invoke(InvokeKind::Static, "rt/Locale", "forLanguageTag", "(Lrt/String;)Lrt/Locale;"),
            invoke(InvokeKind::Virtual, "rt/Locale", "toString", "()Lrt/String;"),
            Instruction::ReturnValue,
        ],
    );
    let listing = |name: &str, method: &str| {
        task(
            name,
            "(J)Lrt/String;",
            vec![invoke(InvokeKind::Static, "rt/Locale", method, "()Lrt/String;"), Instruction::ReturnValue],
        )
    };
    let parent = root_with(&[
        lookup,
        listing("com/acme/Languages", "getISOLanguages"),
        listing("com/acme/Countries", "getISOCountries"),
    ]);
    let child = parent.create_child().unwrap();

    for (tag, expected) in [("en", "en"), ("en-GB", "en_GB"), ("en-US", "en_US"), ("en-CA", "en_CA"), ("en-AU", "en_AU")] {
        let summary = bridge::invoke(&child, "com.acme.LookupLocale", &HostValue::string(tag)).unwrap();
        assert_eq!(summary.result, Ok(HostValue::string(expected)));
    }

    let codes = |entry: &str| match bridge::invoke(&child, entry, &HostValue::Long(0)).unwrap().result {
        Ok(HostValue::String(joined)) => joined.split(',').map(str::to_string).collect::<Vec<_>>(),
        other => panic!("expected a string, got {:?}", other),
    };
    let languages = codes("com.acme.Languages");
    assert_eq!(languages.len(), ISO_LANGUAGES.len());
    assert!(["en", "fr", "hu", "it", "ru", "zh"].iter().all(|c| languages.iter().any(|l| l == c)));
    let countries = codes("com.acme.Countries");
    assert_eq!(countries.len(), ISO_COUNTRIES.len());
    assert!(["AU", "DE", "FR", "GB", "MX", "US"].iter().all(|c| countries.iter().any(|l| l == c)));
}

// =============================================================================
// Enforcement
// =============================================================================

#[test]
fn unbounded_recursion_stops_at_stack_limit() {
    let config = SandboxConfig::default().with_max_stack_depth(32);
    let root = root_with_config(config, &[runaway_recursion()]);
    let summary = bridge::invoke(&root, "com.acme.Recurse", &HostValue::Long(1)).unwrap();
    match summary.result {
        Err(ExecutionFailure::StackDepthExceeded { depth, limit }) => {
            assert_eq!(limit, 32);
            assert!(depth > limit);
        }
        other => panic!("expected StackDepthExceeded, got {:?}", other),
    }
}

#[test]
fn busy_loop_exhausts_cost_budget() {
    let config = SandboxConfig::default().with_cost_budget(1_000);
    let root = root_with_config(config, &[busy_loop()]);
    let summary = bridge::invoke(&root, "com.acme.Spin", &HostValue::Long(0)).unwrap();
    let failure = summary.failure().expect("loop must not finish");
    assert!(matches!(failure, ExecutionFailure::CostBudgetExceeded { .. }));
    assert!(failure.is_security_concern());
    assert!(summary.costs.jumps > 0);
}

#[test]
fn string_doubling_exhausts_cost_budget() {
    let mut body = vec![string("ab")];
    for _ in 0..27 {
        body.push(Instruction::Dup);
        body.push(invoke(InvokeKind::Virtual, "rt/String", "concat", "(Lrt/String;)Lrt/String;"));
    }
    body.push(invoke(InvokeKind::Virtual, "rt/String", "length", "()J"));
    body.push(Instruction::ReturnValue);
    let config = SandboxConfig::default().with_cost_budget(100);
    let root = root_with_config(config, &[task("com/acme/Doubler", "(J)J", body)]);

    let summary = bridge::invoke(&root, "com.acme.Doubler", &HostValue::Long(0)).unwrap();
    let failure = summary.failure().expect("doubling must not finish");
    assert!(matches!(failure, ExecutionFailure::CostBudgetExceeded { .. }));
    assert!(summary.costs.allocations > summary.costs.invocations);
}

#[test]
fn intrinsic_calls_are_charged() {
    let body = vec![
        long(3),
        long(4),
        invoke(InvokeKind::Static, "rt/Math", "max", "(JJ)J"),
        long(2),
        invoke(InvokeKind::Static, "rt/Math", "min", "(JJ)J"),
        Instruction::ReturnValue,
    ];
    let root = root_with(&[task("com/acme/Clamp", "(J)J", body)]);
    let summary = bridge::invoke(&root, "com.acme.Clamp", &HostValue::Long(0)).unwrap();
    assert_eq!(summary.result, Ok(HostValue::Long(2)));
    assert!(summary.costs.invocations >= 2);
}

#[test]
fn node_usable_after_enforcement_trip() {
    let mut classes = multiplier();
    classes.push(runaway_recursion());
    let root = root_with(&classes);
    let tripped = bridge::invoke(&root, "com.acme.Recurse", &HostValue::Long(1)).unwrap();
    assert!(!tripped.is_success());
    let ok = bridge::invoke(&root, "com.acme.Multiplier", &HostValue::Long(1)).unwrap();
    assert_eq!(ok.result, Ok(HostValue::Long(100)));
}

// =============================================================================
// Faults and refusals
// =============================================================================

#[test]
fn arithmetic_fault_reported() {
    let root = root_with(&[divide_by_zero()]);
    let summary = bridge::invoke(&root, "com.acme.Divide", &HostValue::Long(1)).unwrap();
    assert_eq!(
        summary.result,
        Err(ExecutionFailure::SandboxedFault {
            exception: "rt.ArithmeticException".to_string(),
            message: Some("/ by zero".to_string()),
        })
    );
}

#[test]
fn user_exception_reported_under_original_name() {
    let root = root_with(&thrower());
    let summary = bridge::invoke(&root, "com.acme.Thrower", &HostValue::Long(1)).unwrap();
    assert_eq!(
        summary.result,
        Err(ExecutionFailure::SandboxedFault {
            exception: "com.acme.Oops".to_string(),
            message: Some("boom".to_string()),
        })
    );
}

#[test]
fn forbidden_reference_is_rule_violation() {
    let root = root_with(&[file_reader()]);
    let summary = bridge::invoke(&root, "com.acme.ReadsFiles", &HostValue::Long(1)).unwrap();
    match summary.result {
        Err(ExecutionFailure::RuleViolation { reason }) => {
            assert!(reason.contains("Disallowed reference to rt.io.File"), "{}", reason);
        }
        other => panic!("expected RuleViolation, got {:?}", other),
    }
}

#[test]
fn unknown_entry_is_class_not_found() {
    let root = root_with(&[]);
    let summary = bridge::invoke(&root, "com.acme.Nowhere", &HostValue::Null).unwrap();
    assert!(matches!(summary.result, Err(ExecutionFailure::ClassNotFound { .. })));
    assert_eq!(summary.costs.total, 0);
}

#[test]
fn class_without_apply_is_not_a_task() {
    let root = root_with(&[plain("com/acme/Plain")]);
    let summary = bridge::invoke(&root, "com.acme.Plain", &HostValue::Null).unwrap();
    assert!(matches!(summary.result, Err(ExecutionFailure::NotATask { .. })));
}

#[test]
fn wrong_shapes_are_not_tasks() {
    let no_arg = task("com/acme/NoArg", "()J", vec![long(1), Instruction::ReturnValue]);
    let void = task("com/acme/Void", "(J)V", vec![Instruction::Return]);
    let static_apply = ClassBuilder::new("com/acme/Static")
        .method(
            MethodBuilder::new("apply", "(J)J")
                .access(access::PUBLIC | access::STATIC)
                .max_locals(1)
                .code(vec![Instruction::Load(0), Instruction::ReturnValue]),
        )
        .build();
    let root = root_with(&[no_arg, void, static_apply]);
    for entry in ["com.acme.NoArg", "com.acme.Void", "com.acme.Static"] {
        let summary = bridge::invoke(&root, entry, &HostValue::Long(1)).unwrap();
        assert!(
            matches!(summary.result, Err(ExecutionFailure::NotATask { .. })),
            "{} accepted as a task",
            entry
        );
    }
}

#[test]
fn not_a_task_checked_before_marshaling() {
    let root = root_with(&[plain("com/acme/Plain")]);
    let input = HostValue::object("com.acme.Missing");
    let summary = bridge::invoke(&root, "com.acme.Plain", &input).unwrap();
    assert!(matches!(summary.result, Err(ExecutionFailure::NotATask { .. })));
}

#[test]
fn unloadable_input_class_rejected() {
    let root = root_with(&point_sum());
    let input = HostValue::object("com.acme.Missing");
    let summary = bridge::invoke(&root, "com.acme.SumPoint", &input).unwrap();
    assert!(matches!(summary.result, Err(ExecutionFailure::UnmarshalableInput { .. })));
}

#[test]
fn unknown_or_mistyped_input_field_rejected() {
    let root = root_with(&point_sum());
    let unknown = HostValue::object("com.acme.Point").with_field("z", HostValue::Long(1));
    let mistyped = HostValue::object("com.acme.Point").with_field("x", HostValue::string("3"));
    for input in [unknown, mistyped] {
        let summary = bridge::invoke(&root, "com.acme.SumPoint", &input).unwrap();
        assert!(matches!(summary.result, Err(ExecutionFailure::UnmarshalableInput { .. })));
    }
}

#[test]
fn class_literal_result_is_unmarshalable() {
    let literal = task(
        "com/acme/Literal",
        "(J)Lrt/Class;",
        vec![
            Instruction::ClassLiteral("rt/String".to_string()),
            Instruction::ReturnValue,
        ],
    );
    let root = root_with(&[literal]);
    let summary = bridge::invoke(&root, "com.acme.Literal", &HostValue::Long(0)).unwrap();
    assert!(matches!(summary.result, Err(ExecutionFailure::UnmarshalableResult { .. })));
}

#[test]
fn trap_reached_at_runtime_is_rule_violation() {
    let grabs_loader = task(
        "com/acme/Loader",
        "(J)J",
        vec![
            Instruction::ClassLiteral("com/acme/Loader".to_string()),
            invoke(InvokeKind::Virtual, "rt/Class", "getClassLoader", "()Lrt/Object;"),
            Instruction::Pop,
            Instruction::Load(1),
            Instruction::ReturnValue,
        ],
    );
    let root = root_with(&[grabs_loader]);
    let summary = bridge::invoke(&root, "com.acme.Loader", &HostValue::Long(1)).unwrap();
    assert!(matches!(summary.result, Err(ExecutionFailure::RuleViolation { .. })));
}

// =============================================================================
// Hierarchy misuse
// =============================================================================

#[test]
fn destroyed_node_is_an_error() {
    let root = root_with(&multiplier());
    let child = root.create_child().unwrap();
    child.destroy().unwrap();
    let err = bridge::invoke(&child, "com.acme.Multiplier", &HostValue::Long(1)).unwrap_err();
    assert_eq!(err, HierarchyError::NodeDestroyed);
}

#[test]
fn summary_serializes_to_json() {
    let root = root_with(&[divide_by_zero()]);
    let summary = bridge::invoke(&root, "com.acme.Divide", &HostValue::Long(1)).unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["result"]["Err"]["kind"], "sandboxed_fault");
    assert!(json["costs"]["invocations"].as_u64().unwrap() >= 1);
}
