//! Annotation stitching.
//!
//! A sandboxed annotation type gets a declared entry under its sandboxed name
//! plus a stitched twin under the original name. Pass-through types keep a
//! single entry. Which stitched twins a reader sees is decided at query time
//! by the node's retained annotation types.

use crate::classfile::{AnnotationEntry, AnnotationSet, ClassDescriptor, ElementValue};
use crate::rules::Policy;

use super::{Remapper, RewriteError};

/// Returns the number of stitched twins created.
pub(super) fn apply(class: &mut ClassDescriptor, remapper: &mut Remapper<'_>) -> Result<usize, RewriteError> {
    let mut stitched = stitch_set(&mut class.annotations, remapper)?;
    for field in class.fields.iter_mut() {
        stitched += stitch_set(&mut field.annotations, remapper)?;
    }
    for method in class.methods.iter_mut() {
        stitched += stitch_set(&mut method.annotations, remapper)?;
    }
    Ok(stitched)
}

fn stitch_set(set: &mut AnnotationSet, remapper: &mut Remapper<'_>) -> Result<usize, RewriteError> {
    let mut declared: Vec<AnnotationEntry> = Vec::with_capacity(set.declared.len());
    let mut stitched = std::mem::take(&mut set.stitched);
    let mut created = 0;

    for entry in std::mem::take(&mut set.declared) {
        let already_sandboxed = entry.type_name.starts_with(remapper.prefix());
        match remapper.policy(&entry.type_name) {
            Policy::Remap | Policy::Pin if !already_sandboxed => {
                let sandboxed = remap_entry(&entry, remapper)?;
                push_unique(&mut declared, sandboxed);
                if push_unique(&mut stitched, entry) {
                    created += 1;
                }
            }
            _ => {
                let kept = remap_entry(&entry, remapper)?;
                push_unique(&mut declared, kept);
            }
        }
    }

    set.declared = declared;
    set.stitched = stitched;
    Ok(created)
}

/// Sandboxed copy of an entry: type and nested class references remapped.
fn remap_entry(entry: &AnnotationEntry, remapper: &mut Remapper<'_>) -> Result<AnnotationEntry, RewriteError> {
    let type_name = remapper.map_name(&entry.type_name)?;
    let mut values = Vec::with_capacity(entry.values.len());
    for (name, value) in &entry.values {
        values.push((name.clone(), remap_value(value, remapper)?));
    }
    Ok(AnnotationEntry { type_name, values })
}

fn remap_value(value: &ElementValue, remapper: &mut Remapper<'_>) -> Result<ElementValue, RewriteError> {
    Ok(match value {
        ElementValue::Class(name) => ElementValue::Class(remapper.map_name(name)?),
        ElementValue::Annotation(nested) => ElementValue::Annotation(Box::new(remap_entry(nested, remapper)?)),
        ElementValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(remap_value(item, remapper)?);
            }
            ElementValue::Array(out)
        }
        other => other.clone(),
    })
}

fn push_unique(list: &mut Vec<AnnotationEntry>, entry: AnnotationEntry) -> bool {
    if list.iter().any(|e| e.type_name == entry.type_name) {
        return false;
    }
    list.push(entry);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::RewriteContext;
    use crate::rules::{FixupPolicy, RuleCatalog};

    fn tag(type_name: &str, value: &str) -> AnnotationEntry {
        AnnotationEntry::new(type_name).with("value", ElementValue::Str(value.to_string()))
    }

    #[test]
    fn test_remapped_type_gets_twin() {
        let rules = RuleCatalog::standard();
        let fixups = FixupPolicy::empty();
        let ctx = RewriteContext { namespace_prefix: "sandbox/", rules: &rules, fixups: &fixups };
        let mut remapper = Remapper::new(&ctx, "com/acme/Widget");

        let mut set = AnnotationSet::default();
        set.push(tag("com/acme/Tag", "X"));
        set.push(tag("rt/annotation/Retention", "RUNTIME"));

        let created = stitch_set(&mut set, &mut remapper).unwrap();
        assert_eq!(created, 1);
        assert_eq!(set.declared.len(), 2);
        assert_eq!(set.declared[0].to_string(), "sandbox.com.acme.Tag(value=X)");
        assert_eq!(set.declared[1].type_name, "rt/annotation/Retention");
        assert_eq!(set.stitched.len(), 1);
        assert_eq!(set.stitched[0].to_string(), "com.acme.Tag(value=X)");
    }

    #[test]
    fn test_restitching_is_stable() {
        let rules = RuleCatalog::standard();
        let fixups = FixupPolicy::empty();
        let ctx = RewriteContext { namespace_prefix: "sandbox/", rules: &rules, fixups: &fixups };
        let mut remapper = Remapper::new(&ctx, "com/acme/Widget");

        let mut set = AnnotationSet::default();
        set.push(tag("com/acme/Tag", "X"));
        stitch_set(&mut set, &mut remapper).unwrap();
        let once = set.clone();
        assert_eq!(stitch_set(&mut set, &mut remapper).unwrap(), 0);
        assert_eq!(set, once);
    }

    #[test]
    fn test_forbidden_annotation_type() {
        let rules = RuleCatalog::standard();
        let fixups = FixupPolicy::empty();
        let ctx = RewriteContext { namespace_prefix: "sandbox/", rules: &rules, fixups: &fixups };
        let mut remapper = Remapper::new(&ctx, "com/acme/Widget");

        let mut set = AnnotationSet::default();
        set.push(AnnotationEntry::new("rt/io/Marker"));
        assert!(stitch_set(&mut set, &mut remapper).unwrap_err().is_rule_violation());
    }
}
