//! Class-file format: in-memory model, binary reader and writer.
//!
//! A class file is a self-describing big-endian container:
//! magic, version, constant pool, class header, fields, methods, attributes.
//! `parse` rejects anything structurally invalid; `ClassWriter::write`
//! produces bytes that `parse` maps back to an equal descriptor.

pub mod annotation;
mod builder;
pub mod descriptor;
mod model;
pub mod opcodes;
mod reader;
mod writer;

pub use annotation::{AnnotationEntry, AnnotationSet, ElementValue};
pub use builder::{ClassBuilder, MethodBuilder};
pub use model::{
    access, ClassDescriptor, ClassVersion, Code, Condition, Constant, ExceptionHandler,
    FieldDescriptor, Instruction, InvokeKind, MemberRef, MethodDescriptor, RawAttribute,
};
pub use reader::parse;
pub use writer::ClassWriter;

use thiserror::Error;

/// Magic number opening every class file.
pub const CLASS_MAGIC: u32 = 0xDE7B_0C5A;

/// The only major version this crate reads and writes.
pub const SUPPORTED_MAJOR_VERSION: u16 = 1;

/// Structural errors raised while reading or writing class files.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("Truncated class file: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Bad magic number: {0:#010x}")]
    BadMagic(u32),

    #[error("Unsupported class version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid constant pool index {index}")]
    BadConstantIndex { index: u16 },

    #[error("Constant pool entry {index} has wrong type: expected {expected}")]
    ConstantTypeMismatch { index: u16, expected: &'static str },

    #[error("Unknown constant pool tag {tag} at entry {index}")]
    UnknownConstantTag { index: u16, tag: u8 },

    #[error("Invalid UTF-8 in constant pool entry {index}")]
    InvalidUtf8 { index: u16 },

    #[error("Unknown opcode {opcode:#04x} at instruction {position}")]
    UnknownOpcode { position: usize, opcode: u8 },

    #[error("Branch target {target} out of range in {method} (length {length})")]
    BranchOutOfRange { method: String, target: u32, length: usize },

    #[error("Invalid exception table entry in {method}: {reason}")]
    BadExceptionTable { method: String, reason: String },

    #[error("Local variable {index} out of range in {method} (max_locals {max_locals})")]
    LocalOutOfRange { method: String, index: u16, max_locals: u16 },

    #[error("Invalid annotation element tag {0:?}")]
    BadElementTag(char),

    #[error("Malformed {attribute} attribute: {reason}")]
    BadAttribute { attribute: String, reason: String },

    #[error("Malformed class: {0}")]
    Invalid(String),

    #[error("Trailing {0} bytes after class body")]
    TrailingBytes(usize),

    #[error("Class too large to encode: {0}")]
    TooLarge(String),
}
