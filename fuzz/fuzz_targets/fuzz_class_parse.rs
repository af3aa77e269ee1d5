//! Fuzz target for the class-file reader.
//!
//! Any input must parse or fail with a `ClassFormatError`, never panic.
//! Whatever parses must serialize back to bytes that parse to the same class.

#![no_main]

use libfuzzer_sys::fuzz_target;

use detbox_core::classfile::{parse, ClassWriter};

fuzz_target!(|data: &[u8]| {
    if let Ok(class) = parse(data) {
        if let Ok(bytes) = ClassWriter::write(&class) {
            assert_eq!(parse(&bytes).ok(), Some(class));
        }
    }
});
