//! Annotation model.
//!
//! Every annotated element carries two lists. `declared` holds what reflection
//! always reports: sandboxed annotation types after rewriting, or pass-through
//! types unchanged. `stitched` holds the original-namespace twins created by
//! the rewriter; they are only reported to nodes that retain them.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Str(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    /// Internal name of a class literal.
    Class(String),
    Annotation(Box<AnnotationEntry>),
    Array(Vec<ElementValue>),
}

impl fmt::Display for ElementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", s),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Class(name) => write!(f, "{}.class", name.replace('/', ".")),
            Self::Annotation(entry) => write!(f, "{}", entry),
            Self::Array(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// One annotation instance: type plus named element values.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    /// Internal name of the annotation type.
    pub type_name: String,
    pub values: Vec<(String, ElementValue)>,
}

impl AnnotationEntry {
    pub fn new(type_name: &str) -> Self {
        Self { type_name: type_name.to_string(), values: Vec::new() }
    }

    pub fn with(mut self, name: &str, value: ElementValue) -> Self {
        self.values.push((name.to_string(), value));
        self
    }

    pub fn value(&self, name: &str) -> Option<&ElementValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Dotted type name, e.g. `sandbox.com.acme.Tag`.
    pub fn display_type(&self) -> String {
        self.type_name.replace('/', ".")
    }
}

/// Renders as `pkg.Type(name=value, ...)`.
impl fmt::Display for AnnotationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.display_type())?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationSet {
    pub declared: Vec<AnnotationEntry>,
    pub stitched: Vec<AnnotationEntry>,
}

impl AnnotationSet {
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty() && self.stitched.is_empty()
    }

    pub fn push(&mut self, entry: AnnotationEntry) {
        self.declared.push(entry);
    }

    pub fn find_declared(&self, type_name: &str) -> Option<&AnnotationEntry> {
        self.declared.iter().find(|a| a.type_name == type_name)
    }

    pub fn find_stitched(&self, type_name: &str) -> Option<&AnnotationEntry> {
        self.stitched.iter().find(|a| a.type_name == type_name)
    }

    /// Annotations visible to a reader that retains the given original types.
    /// Declared entries come first, then retained stitched twins.
    pub fn visible<'a, F>(&'a self, mut retained: F) -> Vec<&'a AnnotationEntry>
    where
        F: FnMut(&str) -> bool,
    {
        let mut out: Vec<&AnnotationEntry> = self.declared.iter().collect();
        for entry in &self.stitched {
            if retained(&entry.type_name) && !out.iter().any(|e| e.type_name == entry.type_name) {
                out.push(entry);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_reflective_format() {
        let tag = AnnotationEntry::new("sandbox/com/acme/Tag")
            .with("value", ElementValue::Str("X".to_string()));
        assert_eq!(tag.to_string(), "sandbox.com.acme.Tag(value=X)");
    }

    #[test]
    fn test_display_nested_and_array() {
        let inner = AnnotationEntry::new("com/acme/Inner").with("n", ElementValue::Long(3));
        let outer = AnnotationEntry::new("com/acme/Outer")
            .with("inner", ElementValue::Annotation(Box::new(inner)))
            .with(
                "flags",
                ElementValue::Array(vec![ElementValue::Bool(true), ElementValue::Bool(false)]),
            )
            .with("type", ElementValue::Class("com/acme/Widget".to_string()));
        assert_eq!(
            outer.to_string(),
            "com.acme.Outer(inner=com.acme.Inner(n=3), flags={true, false}, type=com.acme.Widget.class)"
        );
    }

    #[test]
    fn test_visible_filters_stitched() {
        let mut set = AnnotationSet::default();
        set.declared.push(AnnotationEntry::new("sandbox/com/acme/Tag"));
        set.stitched.push(AnnotationEntry::new("com/acme/Tag"));

        assert_eq!(set.visible(|_| false).len(), 1);
        let all = set.visible(|name| name == "com/acme/Tag");
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].type_name, "com/acme/Tag");
    }
}
