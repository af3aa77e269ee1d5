//! Class byte resolvers.
//!
//! A resolver maps an internal class name to raw class-file bytes. It is the
//! only place bytes enter the system; everything it returns still goes
//! through `parse` and the rewriter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::classfile::descriptor::is_valid_internal_name;
use crate::classfile::{ClassDescriptor, ClassFormatError, ClassWriter};
use crate::telemetry::{log_security_event, SecurityEvent};

/// File extension used by `DirectoryResolver`.
pub const CLASS_FILE_EXTENSION: &str = "class";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Class not found: {0}")]
    NotFound(String),

    #[error("Invalid class name: {0:?}")]
    InvalidName(String),

    #[error("Class path escapes resolver root: {0}")]
    PathNotAllowed(PathBuf),

    #[error("IO error reading {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub trait ClassResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Vec<u8>, ResolveError>;
}

/// In-memory resolver, mainly for embedding and tests.
#[derive(Default)]
pub struct MemoryResolver {
    classes: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, bytes: Vec<u8>) {
        self.classes.write().insert(name.to_string(), bytes.into());
    }

    /// Serialize and register a descriptor under its own name.
    pub fn insert_class(&self, class: &ClassDescriptor) -> Result<(), ClassFormatError> {
        let bytes = ClassWriter::write(class)?;
        self.insert(&class.name, bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl ClassResolver for MemoryResolver {
    fn resolve(&self, name: &str) -> Result<Vec<u8>, ResolveError> {
        self.classes
            .read()
            .get(name)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }
}

/// Reads `<root>/<internal name>.class`. Names are validated and the final
/// path must stay inside the root.
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_path(&self, name: &str) -> Result<PathBuf, ResolveError> {
        let suspicious = name.split('/').any(|seg| seg == ".." || seg == ".")
            || name.contains('\\')
            || name.contains('\0');
        if suspicious || !is_valid_internal_name(name) {
            if suspicious {
                log_security_event(
                    SecurityEvent::PathTraversalAttempt,
                    "Rejected class name with path components",
                    &[("name", name)],
                );
            }
            return Err(ResolveError::InvalidName(name.to_string()));
        }

        let full_path = self.root.join(format!("{}.{}", name, CLASS_FILE_EXTENSION));
        let canonical = full_path
            .canonicalize()
            .map_err(|_| ResolveError::NotFound(name.to_string()))?;
        let root = self
            .root
            .canonicalize()
            .map_err(|_| ResolveError::NotFound(name.to_string()))?;
        if !canonical.starts_with(&root) {
            log_security_event(
                SecurityEvent::PathTraversalAttempt,
                "Class path resolved outside resolver root",
                &[("name", name)],
            );
            return Err(ResolveError::PathNotAllowed(canonical));
        }
        Ok(canonical)
    }
}

impl ClassResolver for DirectoryResolver {
    fn resolve(&self, name: &str) -> Result<Vec<u8>, ResolveError> {
        let path = self.validate_path(name)?;
        std::fs::read(&path).map_err(|source| ResolveError::Io { name: name.to_string(), source })
    }
}

/// Tries each resolver in order; the first hit wins.
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn ClassResolver>>,
}

impl ChainResolver {
    pub fn new(resolvers: Vec<Arc<dyn ClassResolver>>) -> Self {
        Self { resolvers }
    }
}

impl ClassResolver for ChainResolver {
    fn resolve(&self, name: &str) -> Result<Vec<u8>, ResolveError> {
        for resolver in &self.resolvers {
            match resolver.resolve(name) {
                Err(ResolveError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(ResolveError::NotFound(name.to_string()))
    }
}
