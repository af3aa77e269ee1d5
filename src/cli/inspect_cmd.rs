//! `detbox inspect` and `detbox annotations`: look at a class as a node
//! loads it.

use serde_json::json;
use tracing::debug;

use crate::classfile::descriptor::display_name;
use crate::reflect::Reflection;

use super::{open_root, EXIT_FAILURE, EXIT_OK};

/// Print the rewritten shape of `class` as JSON.
pub fn run_inspect(class: &str) -> i32 {
    let (_, root) = match open_root() {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let loaded = match root.load_class(class) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            return EXIT_FAILURE;
        }
    };

    let descriptor = loaded.descriptor();
    let report = json!({
        "name": display_name(loaded.name()),
        "original_name": display_name(loaded.original_name()),
        "policy": root.classify(loaded.original_name()).as_str(),
        "digest": loaded.digest(),
        "modified": loaded.was_modified(),
        "rewrite": loaded.rewrite_stats(),
        "super": descriptor.super_name.as_deref().map(display_name),
        "interfaces": descriptor.interfaces.iter().map(|i| display_name(i)).collect::<Vec<_>>(),
        "fields": descriptor
            .fields
            .iter()
            .map(|f| format!("{} {}", f.name, f.descriptor))
            .collect::<Vec<_>>(),
        "methods": descriptor
            .methods
            .iter()
            .map(|m| format!("{}{}", m.name, m.descriptor))
            .collect::<Vec<_>>(),
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => {
            println!("{}", text);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Cannot serialize report: {}", e);
            EXIT_FAILURE
        }
    }
}

/// Print the stitched class-level annotations of `class`, one per line.
///
/// Retained annotation types are loaded first, so their originals show up
/// when the class path provides them.
pub fn run_annotations(class: &str) -> i32 {
    let (_, root) = match open_root() {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let retained: Vec<String> = root.config().visible_annotations.iter().cloned().collect();
    for type_name in retained {
        if let Err(e) = root.load_class(&type_name) {
            debug!(annotation = %type_name, error = %e, "Retained annotation type not loadable");
        }
    }
    match Reflection::annotations(&root, class) {
        Ok(entries) => {
            for entry in entries {
                println!("{}", entry);
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}", e);
            EXIT_FAILURE
        }
    }
}
