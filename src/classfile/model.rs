//! In-memory class model.

use super::annotation::AnnotationSet;

/// Access flags shared by classes, fields and methods.
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

impl Default for ClassVersion {
    fn default() -> Self {
        Self { major: super::SUPPORTED_MAJOR_VERSION, minor: 0 }
    }
}

/// A parsed class. Type names are internal names (`com/acme/Widget`).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    pub version: ClassVersion,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
    pub methods: Vec<MethodDescriptor>,
    pub annotations: AnnotationSet,
    pub signature: Option<String>,
    /// Set on synthetic closure classes; names the class that created them.
    pub enclosing_class: Option<String>,
    /// Attributes this crate does not interpret, preserved verbatim.
    pub unknown_attributes: Vec<RawAttribute>,
}

impl ClassDescriptor {
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.access & access::SYNTHETIC != 0
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn find_method_index(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Instance (non-static) fields in declaration order.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.access & access::STATIC == 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub annotations: AnnotationSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub annotations: AnnotationSet,
    pub code: Option<Code>,
}

impl MethodDescriptor {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn is_native(&self) -> bool {
        self.access & access::NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access & access::ABSTRACT != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.access & access::SYNTHETIC != 0
    }
}

/// Method body. Branch targets and handler bounds are instruction indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Code {
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub handlers: Vec<ExceptionHandler>,
}

/// Covers instructions `start..end`; `catch_type` of `None` catches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl std::fmt::Display for MemberRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.owner.replace('/', "."), self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Virtual,
    Special,
}

/// Comparison applied by conditional branches. `Eq`..`Le` compare against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    Null,
    NonNull,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    Const(Constant),
    ClassLiteral(String),
    Load(u16),
    Store(u16),
    Pop,
    Dup,
    Swap,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    /// Pops b, a; pushes -1, 0 or 1.
    Compare,
    If { cond: Condition, target: u32 },
    Goto(u32),
    New(String),
    GetField(MemberRef),
    PutField(MemberRef),
    Invoke { kind: InvokeKind, method: MemberRef },
    /// Instantiates a synthetic closure class, filling its first `captures`
    /// instance fields from the operand stack.
    MakeClosure { class: String, captures: u8 },
    Return,
    ReturnValue,
    Throw,
    /// Aborts the invocation with a rule violation carrying the message.
    Trap(String),
    MeterInvocation,
    MeterJump,
    MeterAllocation,
    MeterThrow,
}

impl Instruction {
    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Self::If { target, .. } | Self::Goto(target) => Some(*target),
            _ => None,
        }
    }

    pub fn is_meter(&self) -> bool {
        matches!(
            self,
            Self::MeterInvocation | Self::MeterJump | Self::MeterAllocation | Self::MeterThrow
        )
    }
}

/// An attribute this crate does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    pub data: Vec<u8>,
}
