//! Fuzz target for the rewrite pipeline.
//!
//! Parsed classes must rewrite without panicking, and a successful rewrite
//! must be a fixed point of a second rewrite.

#![no_main]

use libfuzzer_sys::fuzz_target;

use detbox_core::classfile::parse;
use detbox_core::rewrite::{rewrite, RewriteContext};
use detbox_core::rules::{FixupPolicy, RuleCatalog};

fuzz_target!(|data: &[u8]| {
    let Ok(class) = parse(data) else { return };
    let rules = RuleCatalog::standard();
    let fixups = FixupPolicy::standard();
    let ctx = RewriteContext { namespace_prefix: "sandbox/", rules: &rules, fixups: &fixups };
    if let Ok(once) = rewrite(class, ctx) {
        if let Ok(twice) = rewrite(once.descriptor.clone(), ctx) {
            assert_eq!(once.descriptor, twice.descriptor);
        }
    }
});
