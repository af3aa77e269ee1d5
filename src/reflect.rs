//! Reflective view of sandboxed classes for the host.
//!
//! Annotation queries report the stitched set: every declared (sandboxed)
//! entry in declaration order, followed by the original-namespace twins of
//! annotation types the node retains. A twin is only reported once its type
//! is defined in the node or one of its ancestors.

use crate::classfile::descriptor::{display_name, simple_name};
use crate::classfile::{AnnotationEntry, AnnotationSet};
use crate::hierarchy::{LoadError, SandboxNode};

/// Entries of `set` visible from `node`.
pub fn visible_annotations(node: &SandboxNode, set: &AnnotationSet) -> Vec<AnnotationEntry> {
    let config = node.config();
    set.visible(|type_name| config.retains_annotation(type_name) && node.is_loaded(type_name))
        .into_iter()
        .cloned()
        .collect()
}

/// Visible entry whose type is exactly `type_name` (dotted or internal).
pub fn find_annotation(node: &SandboxNode, set: &AnnotationSet, type_name: &str) -> Option<AnnotationEntry> {
    let wanted = type_name.replace('.', "/");
    visible_annotations(node, set)
        .into_iter()
        .find(|entry| entry.type_name == wanted)
}

pub struct Reflection;

impl Reflection {
    /// Class-level annotations of `class` as loaded in `node`.
    pub fn annotations(node: &SandboxNode, class: &str) -> Result<Vec<AnnotationEntry>, LoadError> {
        let loaded = node.load_class(class)?;
        Ok(visible_annotations(node, &loaded.descriptor().annotations))
    }

    /// Single annotation lookup. `type_name` may be the sandboxed or the
    /// original type; the original only resolves when the node retains it
    /// and the type is already loaded.
    pub fn annotation(
        node: &SandboxNode,
        class: &str,
        type_name: &str,
    ) -> Result<Option<AnnotationEntry>, LoadError> {
        let loaded = node.load_class(class)?;
        Ok(find_annotation(node, &loaded.descriptor().annotations, type_name))
    }

    pub fn method_annotations(
        node: &SandboxNode,
        class: &str,
        method: &str,
    ) -> Result<Vec<AnnotationEntry>, LoadError> {
        let loaded = node.load_class(class)?;
        Ok(loaded
            .descriptor()
            .methods
            .iter()
            .filter(|m| m.name == method)
            .flat_map(|m| visible_annotations(node, &m.annotations))
            .collect())
    }

    pub fn field_annotations(
        node: &SandboxNode,
        class: &str,
        field: &str,
    ) -> Result<Vec<AnnotationEntry>, LoadError> {
        let loaded = node.load_class(class)?;
        Ok(loaded
            .descriptor()
            .find_field(field)
            .map(|f| visible_annotations(node, &f.annotations))
            .unwrap_or_default())
    }

    /// Qualified runtime name, e.g. `sandbox.com.acme.Widget`.
    pub fn class_name(node: &SandboxNode, class: &str) -> Result<String, LoadError> {
        let loaded = node.load_class(class)?;
        Ok(display_name(loaded.name()))
    }

    pub fn simple_name(node: &SandboxNode, class: &str) -> Result<String, LoadError> {
        let loaded = node.load_class(class)?;
        Ok(simple_name(loaded.name()).to_string())
    }
}
