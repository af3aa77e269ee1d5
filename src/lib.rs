//! detbox core
//!
//! A deterministic sandbox for class-file bytecode. Untrusted classes are
//! parsed, rewritten into an isolated namespace and run by an iterative
//! interpreter under cost and stack limits.
//!
//! # Pipeline
//!
//! - **Rules**: a catalog classifies every referenced class name as
//!   pass-through, remap, forbid or pin. Fixups redirect non-deterministic
//!   host members to deterministic replacements.
//! - **Rewrite**: names are remapped under the namespace prefix, fixups
//!   applied, annotations stitched and cost meters inserted.
//! - **Hierarchy**: sandbox nodes own per-node caches of rewritten classes.
//!   Children reuse classes their ancestors already rewrote under the same
//!   rules.
//! - **Bridge**: a task class is invoked with a host value and the outcome
//!   is reported as an `ExecutionSummary`, never as a host fault.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use detbox_core::bridge::{self, HostValue};
//! use detbox_core::hierarchy::{DirectoryResolver, SandboxConfig, SandboxNode};
//!
//! let resolver = Arc::new(DirectoryResolver::new("classes"));
//! let root = SandboxNode::create_root(SandboxConfig::default(), resolver).unwrap();
//! let summary = bridge::invoke(&root, "com.acme.Multiplier", &HostValue::Long(1234)).unwrap();
//! println!("{:?}", summary.result);
//! ```

pub mod bridge;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod hierarchy;
pub mod reflect;
pub mod rewrite;
pub mod rules;
pub mod runtime;
pub mod telemetry;

pub use bridge::{invoke, ExecutionFailure, ExecutionSummary, HostValue};
pub use hierarchy::{ClassResolver, LoadError, SandboxConfig, SandboxNode};
