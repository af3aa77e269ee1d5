//! Opcode table.
//!
//! Operand layout follows each opcode: `u16` constant pool index, `u16` local
//! slot, or `u32` instruction index for branches.

pub const NOP: u8 = 0x00;
pub const CONST_NULL: u8 = 0x01;
pub const CONST_TRUE: u8 = 0x02;
pub const CONST_FALSE: u8 = 0x03;
/// `u16` index of a Long, Double or String constant.
pub const LDC: u8 = 0x12;
/// `u16` index of a Class constant.
pub const LDC_CLASS: u8 = 0x13;
pub const LOAD: u8 = 0x15;
pub const STORE: u8 = 0x36;
pub const POP: u8 = 0x57;
pub const DUP: u8 = 0x59;
pub const SWAP: u8 = 0x5f;
pub const ADD: u8 = 0x61;
pub const SUB: u8 = 0x65;
pub const MUL: u8 = 0x69;
pub const DIV: u8 = 0x6d;
pub const REM: u8 = 0x71;
pub const NEG: u8 = 0x75;
pub const CMP: u8 = 0x94;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const GOTO: u8 = 0xa7;
pub const RETURN_VALUE: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
/// `u16` class index, `u8` capture count.
pub const MAKE_CLOSURE: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const THROW: u8 = 0xbf;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
/// `u16` index of a Utf8 message.
pub const TRAP: u8 = 0xca;
pub const METER_INVOCATION: u8 = 0xe0;
pub const METER_JUMP: u8 = 0xe1;
pub const METER_ALLOCATION: u8 = 0xe2;
pub const METER_THROW: u8 = 0xe3;

/// Constant pool tags.
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const LONG: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const NAME_AND_TYPE: u8 = 12;
}

/// Attribute names.
pub mod attr {
    pub const CODE: &str = "Code";
    pub const ANNOTATIONS: &str = "Annotations";
    pub const STITCHED_ANNOTATIONS: &str = "StitchedAnnotations";
    pub const SIGNATURE: &str = "Signature";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const ENCLOSING_CLASS: &str = "EnclosingClass";
}

/// Annotation element value tags.
pub mod element {
    pub const STRING: u8 = b's';
    pub const LONG: u8 = b'J';
    pub const DOUBLE: u8 = b'D';
    pub const BOOL: u8 = b'Z';
    pub const CLASS: u8 = b'c';
    pub const ANNOTATION: u8 = b'@';
    pub const ARRAY: u8 = b'[';
}
