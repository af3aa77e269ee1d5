//! Shared class fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use detbox_core::classfile::{
    access, AnnotationEntry, ClassBuilder, ClassDescriptor, Constant, ElementValue, Instruction,
    InvokeKind, MemberRef, MethodBuilder,
};
use detbox_core::hierarchy::{MemoryResolver, SandboxConfig, SandboxNode};

pub fn long(v: i64) -> Instruction {
    Instruction::Const(Constant::Long(v))
}

pub fn string(s: &str) -> Instruction {
    Instruction::Const(Constant::Str(s.to_string()))
}

pub fn invoke(kind: InvokeKind, owner: &str, name: &str, descriptor: &str) -> Instruction {
    Instruction::Invoke { kind, method: MemberRef::new(owner, name, descriptor) }
}

pub fn get_field(owner: &str, name: &str, descriptor: &str) -> Instruction {
    Instruction::GetField(MemberRef::new(owner, name, descriptor))
}

/// A task class whose `apply` has the given descriptor and body.
pub fn task(name: &str, descriptor: &str, body: Vec<Instruction>) -> ClassDescriptor {
    ClassBuilder::new(name)
        .default_constructor()
        .method(MethodBuilder::new("apply", descriptor).max_locals(2).code(body))
        .build()
}

/// `apply(J)J` that captures its argument in a closure and returns
/// `closure.call()`, which multiplies the captured value by 100.
pub fn multiplier() -> Vec<ClassDescriptor> {
    let task = task(
        "com/acme/Multiplier",
        "(J)J",
        vec![
            Instruction::Load(1),
            Instruction::MakeClosure { class: "com/acme/Multiplier$1".to_string(), captures: 1 },
            invoke(InvokeKind::Virtual, "com/acme/Multiplier$1", "call", "()J"),
            Instruction::ReturnValue,
        ],
    );
    let closure = ClassBuilder::new("com/acme/Multiplier$1")
        .enclosed_by("com/acme/Multiplier")
        .field(access::PRIVATE | access::FINAL, "captured", "J")
        .method(MethodBuilder::new("call", "()J").max_locals(1).code(vec![
            Instruction::Load(0),
            get_field("com/acme/Multiplier$1", "captured", "J"),
            long(100),
            Instruction::Mul,
            Instruction::ReturnValue,
        ]))
        .build();
    vec![task, closure]
}

/// `apply` calls itself forever.
pub fn runaway_recursion() -> ClassDescriptor {
    task(
        "com/acme/Recurse",
        "(J)J",
        vec![
            Instruction::Load(0),
            Instruction::Load(1),
            invoke(InvokeKind::Virtual, "com/acme/Recurse", "apply", "(J)J"),
            Instruction::ReturnValue,
        ],
    )
}

/// `apply` spins in a loop forever.
pub fn busy_loop() -> ClassDescriptor {
    task("com/acme/Spin", "(J)J", vec![Instruction::Nop, Instruction::Goto(0)])
}

/// `apply` divides by zero.
pub fn divide_by_zero() -> ClassDescriptor {
    task(
        "com/acme/Divide",
        "(J)J",
        vec![Instruction::Load(1), long(0), Instruction::Div, Instruction::ReturnValue],
    )
}

/// `apply` divides by zero inside a handler that returns -1.
pub fn guarded_division() -> ClassDescriptor {
    ClassBuilder::new("com/acme/Guarded")
        .default_constructor()
        .method(
            MethodBuilder::new("apply", "(J)J")
                .max_locals(2)
                .code(vec![
                    Instruction::Load(1),
                    long(0),
                    Instruction::Div,
                    Instruction::ReturnValue,
                    Instruction::Pop,
                    long(-1),
                    Instruction::ReturnValue,
                ])
                .handler(0, 4, 4, Some("rt/ArithmeticException")),
        )
        .build()
}

/// A user exception and a task that throws it with message "boom".
pub fn thrower() -> Vec<ClassDescriptor> {
    let oops = ClassBuilder::new("com/acme/Oops").super_class("rt/RuntimeException").build();
    let task = task(
        "com/acme/Thrower",
        "(J)J",
        vec![
            Instruction::New("com/acme/Oops".to_string()),
            Instruction::Dup,
            string("boom"),
            invoke(InvokeKind::Special, "com/acme/Oops", "<init>", "(Lrt/String;)V"),
            Instruction::Throw,
        ],
    );
    vec![oops, task]
}

/// `apply(Lcom/acme/Point;)J` returns `x + y`.
pub fn point_sum() -> Vec<ClassDescriptor> {
    let point = ClassBuilder::new("com/acme/Point")
        .default_constructor()
        .field(access::PUBLIC, "x", "J")
        .field(access::PUBLIC, "y", "J")
        .build();
    let task = task(
        "com/acme/SumPoint",
        "(Lcom/acme/Point;)J",
        vec![
            Instruction::Load(1),
            get_field("com/acme/Point", "x", "J"),
            Instruction::Load(1),
            get_field("com/acme/Point", "y", "J"),
            Instruction::Add,
            Instruction::ReturnValue,
        ],
    );
    vec![point, task]
}

/// `apply` reads the host clock and a fresh object's identity hash and
/// returns their sum.
pub fn clock_and_hash() -> ClassDescriptor {
    task(
        "com/acme/Clock",
        "(J)J",
        vec![
            invoke(InvokeKind::Static, "rt/System", "currentTimeMillis", "()J"),
            Instruction::New("rt/Object".to_string()),
            Instruction::Dup,
            invoke(InvokeKind::Special, "rt/Object", "<init>", "()V"),
            invoke(InvokeKind::Virtual, "rt/Object", "hashCode", "()J"),
            Instruction::Add,
            Instruction::ReturnValue,
        ],
    )
}

/// A class that opens a host file.
pub fn file_reader() -> ClassDescriptor {
    task(
        "com/acme/ReadsFiles",
        "(J)J",
        vec![
            Instruction::New("rt/io/File".to_string()),
            Instruction::Pop,
            Instruction::Load(1),
            Instruction::ReturnValue,
        ],
    )
}

/// Annotation type `com/acme/Tag` and `com/acme/UserData` annotated
/// `@Tag(value = "X")`.
pub fn tagged_user_data() -> Vec<ClassDescriptor> {
    let tag = ClassBuilder::new("com/acme/Tag")
        .access(access::PUBLIC | access::INTERFACE | access::ABSTRACT | access::ANNOTATION)
        .method(MethodBuilder::new("value", "()Lrt/String;").access(access::PUBLIC | access::ABSTRACT))
        .build();
    let user_data = ClassBuilder::new("com/acme/UserData")
        .annotation(AnnotationEntry::new("com/acme/Tag").with("value", ElementValue::Str("X".to_string())))
        .default_constructor()
        .build();
    vec![tag, user_data]
}

/// Plain class with no behaviour.
pub fn plain(name: &str) -> ClassDescriptor {
    ClassBuilder::new(name).default_constructor().build()
}

pub fn resolver_with(classes: &[ClassDescriptor]) -> Arc<MemoryResolver> {
    let resolver = Arc::new(MemoryResolver::new());
    for class in classes {
        resolver.insert_class(class).expect("fixture serializes");
    }
    resolver
}

pub fn root_with(classes: &[ClassDescriptor]) -> SandboxNode {
    root_with_config(SandboxConfig::default(), classes)
}

pub fn root_with_config(config: SandboxConfig, classes: &[ClassDescriptor]) -> SandboxNode {
    SandboxNode::create_root(config, resolver_with(classes)).expect("valid config")
}
