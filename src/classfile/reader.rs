//! Binary class-file reader.

use std::collections::HashSet;

use super::annotation::{AnnotationEntry, AnnotationSet, ElementValue};
use super::descriptor;
use super::model::{
    access, ClassDescriptor, ClassVersion, Code, Condition, Constant, ExceptionHandler,
    FieldDescriptor, Instruction, InvokeKind, MemberRef, MethodDescriptor, RawAttribute,
};
use super::opcodes::{self as op, attr, element, tag};
use super::{ClassFormatError, CLASS_MAGIC, SUPPORTED_MAJOR_VERSION};

/// Nesting limit for annotation element values.
const MAX_ELEMENT_DEPTH: usize = 32;

/// Parse and validate a class file.
///
/// Never panics on arbitrary input; every structural defect maps to a
/// `ClassFormatError`.
pub fn parse(bytes: &[u8]) -> Result<ClassDescriptor, ClassFormatError> {
    let mut r = ByteReader::new(bytes);

    let magic = r.u32()?;
    if magic != CLASS_MAGIC {
        return Err(ClassFormatError::BadMagic(magic));
    }
    let minor = r.u16()?;
    let major = r.u16()?;
    if major != SUPPORTED_MAJOR_VERSION {
        return Err(ClassFormatError::UnsupportedVersion { major, minor });
    }

    let pool = ConstantPool::read(&mut r)?;

    let access_flags = r.u16()?;
    let name = pool.class_name(r.u16()?)?;
    check_internal_name(&name)?;
    let super_index = r.u16()?;
    let super_name = if super_index == 0 {
        None
    } else {
        Some(pool.class_name(super_index)?)
    };

    let interface_count = r.u16()? as usize;
    let mut interfaces = Vec::with_capacity(interface_count.min(r.remaining()));
    for _ in 0..interface_count {
        interfaces.push(pool.class_name(r.u16()?)?);
    }

    let field_count = r.u16()? as usize;
    let mut fields = Vec::with_capacity(field_count.min(r.remaining()));
    let mut field_names = HashSet::new();
    for _ in 0..field_count {
        let field = read_field(&mut r, &pool)?;
        if !field_names.insert(field.name.clone()) {
            return Err(ClassFormatError::Invalid(format!("duplicate field {}", field.name)));
        }
        fields.push(field);
    }

    let method_count = r.u16()? as usize;
    let mut methods = Vec::with_capacity(method_count.min(r.remaining()));
    let mut method_keys = HashSet::new();
    for _ in 0..method_count {
        let method = read_method(&mut r, &pool)?;
        if !method_keys.insert((method.name.clone(), method.descriptor.clone())) {
            return Err(ClassFormatError::Invalid(format!(
                "duplicate method {}{}",
                method.name, method.descriptor
            )));
        }
        methods.push(method);
    }

    let mut class = ClassDescriptor {
        version: ClassVersion { major, minor },
        access: access_flags,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        annotations: AnnotationSet::default(),
        signature: None,
        enclosing_class: None,
        unknown_attributes: Vec::new(),
    };

    let mut seen = HashSet::new();
    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        let (attr_name, data) = read_attribute(&mut r, &pool)?;
        if !seen.insert(attr_name.clone()) {
            return Err(duplicate_attribute(&attr_name));
        }
        match attr_name.as_str() {
            attr::ANNOTATIONS => class.annotations.declared = read_annotations(data, &pool)?,
            attr::STITCHED_ANNOTATIONS => {
                class.annotations.stitched = read_annotations(data, &pool)?
            }
            attr::SIGNATURE => class.signature = Some(read_signature(data, &pool)?),
            attr::ENCLOSING_CLASS => {
                let mut sub = ByteReader::new(data);
                let enclosing = pool.class_name(sub.u16()?)?;
                sub.finish(attr::ENCLOSING_CLASS)?;
                class.enclosing_class = Some(enclosing);
            }
            attr::CODE | attr::EXCEPTIONS => {
                return Err(ClassFormatError::BadAttribute {
                    attribute: attr_name,
                    reason: "not allowed on a class".to_string(),
                })
            }
            _ => class.unknown_attributes.push(RawAttribute {
                name: attr_name,
                data: data.to_vec(),
            }),
        }
    }

    if r.remaining() > 0 {
        return Err(ClassFormatError::TrailingBytes(r.remaining()));
    }
    Ok(class)
}

fn read_field(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<FieldDescriptor, ClassFormatError> {
    let access_flags = r.u16()?;
    let name = pool.utf8(r.u16()?)?;
    let desc = pool.utf8(r.u16()?)?;
    if name.is_empty() {
        return Err(ClassFormatError::Invalid("empty field name".to_string()));
    }
    if !descriptor::is_valid_field_descriptor(&desc) {
        return Err(ClassFormatError::Invalid(format!("bad field descriptor {}", desc)));
    }

    let mut field = FieldDescriptor {
        access: access_flags,
        name,
        descriptor: desc,
        signature: None,
        annotations: AnnotationSet::default(),
    };

    let mut seen = HashSet::new();
    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        let (attr_name, data) = read_attribute(r, pool)?;
        if !seen.insert(attr_name.clone()) {
            return Err(duplicate_attribute(&attr_name));
        }
        match attr_name.as_str() {
            attr::ANNOTATIONS => field.annotations.declared = read_annotations(data, pool)?,
            attr::STITCHED_ANNOTATIONS => field.annotations.stitched = read_annotations(data, pool)?,
            attr::SIGNATURE => field.signature = Some(read_signature(data, pool)?),
            _ => {
                return Err(ClassFormatError::BadAttribute {
                    attribute: attr_name,
                    reason: "not allowed on a field".to_string(),
                })
            }
        }
    }
    Ok(field)
}

fn read_method(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<MethodDescriptor, ClassFormatError> {
    let access_flags = r.u16()?;
    let name = pool.utf8(r.u16()?)?;
    let desc = pool.utf8(r.u16()?)?;
    if name.is_empty() {
        return Err(ClassFormatError::Invalid("empty method name".to_string()));
    }
    if descriptor::method_shape(&desc).is_none() {
        return Err(ClassFormatError::Invalid(format!("bad method descriptor {}", desc)));
    }

    let mut method = MethodDescriptor {
        access: access_flags,
        name,
        descriptor: desc,
        signature: None,
        exceptions: Vec::new(),
        annotations: AnnotationSet::default(),
        code: None,
    };
    let label = format!("{}{}", method.name, method.descriptor);

    let mut seen = HashSet::new();
    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        let (attr_name, data) = read_attribute(r, pool)?;
        if !seen.insert(attr_name.clone()) {
            return Err(duplicate_attribute(&attr_name));
        }
        match attr_name.as_str() {
            attr::CODE => method.code = Some(read_code(data, pool, &label)?),
            attr::ANNOTATIONS => method.annotations.declared = read_annotations(data, pool)?,
            attr::STITCHED_ANNOTATIONS => method.annotations.stitched = read_annotations(data, pool)?,
            attr::SIGNATURE => method.signature = Some(read_signature(data, pool)?),
            attr::EXCEPTIONS => {
                let mut sub = ByteReader::new(data);
                let count = sub.u16()?;
                for _ in 0..count {
                    method.exceptions.push(pool.class_name(sub.u16()?)?);
                }
                sub.finish(attr::EXCEPTIONS)?;
            }
            _ => {
                return Err(ClassFormatError::BadAttribute {
                    attribute: attr_name,
                    reason: "not allowed on a method".to_string(),
                })
            }
        }
    }

    let bodiless = access_flags & (access::NATIVE | access::ABSTRACT) != 0;
    match (bodiless, method.code.is_some()) {
        (true, true) => {
            return Err(ClassFormatError::Invalid(format!(
                "native or abstract method {} has a body",
                label
            )))
        }
        (false, false) => {
            return Err(ClassFormatError::Invalid(format!("method {} has no body", label)))
        }
        _ => {}
    }
    Ok(method)
}

fn read_code(data: &[u8], pool: &ConstantPool, method: &str) -> Result<Code, ClassFormatError> {
    let mut r = ByteReader::new(data);
    let max_locals = r.u16()?;
    let count = r.u32()? as usize;
    let mut instructions = Vec::with_capacity(count.min(r.remaining()));
    for position in 0..count {
        instructions.push(read_instruction(&mut r, pool, position)?);
    }

    let handler_count = r.u16()? as usize;
    let mut handlers = Vec::with_capacity(handler_count.min(r.remaining()));
    for _ in 0..handler_count {
        let start = r.u32()?;
        let end = r.u32()?;
        let handler = r.u32()?;
        let catch_index = r.u16()?;
        let catch_type = if catch_index == 0 {
            None
        } else {
            Some(pool.class_name(catch_index)?)
        };
        handlers.push(ExceptionHandler { start, end, handler, catch_type });
    }
    r.finish(attr::CODE)?;

    let code = Code { max_locals, instructions, handlers };
    validate_code(&code, method)?;
    Ok(code)
}

fn validate_code(code: &Code, method: &str) -> Result<(), ClassFormatError> {
    let length = code.instructions.len();
    for insn in &code.instructions {
        if let Some(target) = insn.branch_target() {
            if target as usize >= length {
                return Err(ClassFormatError::BranchOutOfRange {
                    method: method.to_string(),
                    target,
                    length,
                });
            }
        }
        if let Instruction::Load(index) | Instruction::Store(index) = insn {
            if *index >= code.max_locals {
                return Err(ClassFormatError::LocalOutOfRange {
                    method: method.to_string(),
                    index: *index,
                    max_locals: code.max_locals,
                });
            }
        }
    }
    for h in &code.handlers {
        let reason = if h.start >= h.end {
            Some("empty range")
        } else if h.end as usize > length {
            Some("range past end of code")
        } else if h.handler as usize >= length {
            Some("handler past end of code")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ClassFormatError::BadExceptionTable {
                method: method.to_string(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

fn read_instruction(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    position: usize,
) -> Result<Instruction, ClassFormatError> {
    let opcode = r.u8()?;
    let insn = match opcode {
        op::NOP => Instruction::Nop,
        op::CONST_NULL => Instruction::Const(Constant::Null),
        op::CONST_TRUE => Instruction::Const(Constant::Bool(true)),
        op::CONST_FALSE => Instruction::Const(Constant::Bool(false)),
        op::LDC => Instruction::Const(pool.loadable(r.u16()?)?),
        op::LDC_CLASS => Instruction::ClassLiteral(pool.class_name(r.u16()?)?),
        op::LOAD => Instruction::Load(r.u16()?),
        op::STORE => Instruction::Store(r.u16()?),
        op::POP => Instruction::Pop,
        op::DUP => Instruction::Dup,
        op::SWAP => Instruction::Swap,
        op::ADD => Instruction::Add,
        op::SUB => Instruction::Sub,
        op::MUL => Instruction::Mul,
        op::DIV => Instruction::Div,
        op::REM => Instruction::Rem,
        op::NEG => Instruction::Neg,
        op::CMP => Instruction::Compare,
        op::IFEQ => branch(r, Condition::Eq)?,
        op::IFNE => branch(r, Condition::Ne)?,
        op::IFLT => branch(r, Condition::Lt)?,
        op::IFGE => branch(r, Condition::Ge)?,
        op::IFGT => branch(r, Condition::Gt)?,
        op::IFLE => branch(r, Condition::Le)?,
        op::IFNULL => branch(r, Condition::Null)?,
        op::IFNONNULL => branch(r, Condition::NonNull)?,
        op::GOTO => Instruction::Goto(r.u32()?),
        op::NEW => Instruction::New(pool.class_name(r.u16()?)?),
        op::GETFIELD => Instruction::GetField(pool.member_ref(r.u16()?, tag::FIELD_REF)?),
        op::PUTFIELD => Instruction::PutField(pool.member_ref(r.u16()?, tag::FIELD_REF)?),
        op::INVOKEVIRTUAL => invoke(r, pool, InvokeKind::Virtual)?,
        op::INVOKESPECIAL => invoke(r, pool, InvokeKind::Special)?,
        op::INVOKESTATIC => invoke(r, pool, InvokeKind::Static)?,
        op::MAKE_CLOSURE => {
            let class = pool.class_name(r.u16()?)?;
            let captures = r.u8()?;
            Instruction::MakeClosure { class, captures }
        }
        op::RETURN => Instruction::Return,
        op::RETURN_VALUE => Instruction::ReturnValue,
        op::THROW => Instruction::Throw,
        op::TRAP => Instruction::Trap(pool.utf8(r.u16()?)?),
        op::METER_INVOCATION => Instruction::MeterInvocation,
        op::METER_JUMP => Instruction::MeterJump,
        op::METER_ALLOCATION => Instruction::MeterAllocation,
        op::METER_THROW => Instruction::MeterThrow,
        other => return Err(ClassFormatError::UnknownOpcode { position, opcode: other }),
    };
    Ok(insn)
}

fn branch(r: &mut ByteReader<'_>, cond: Condition) -> Result<Instruction, ClassFormatError> {
    Ok(Instruction::If { cond, target: r.u32()? })
}

fn invoke(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    kind: InvokeKind,
) -> Result<Instruction, ClassFormatError> {
    let method = pool.member_ref(r.u16()?, tag::METHOD_REF)?;
    if descriptor::method_shape(&method.descriptor).is_none() {
        return Err(ClassFormatError::Invalid(format!(
            "bad method descriptor {}",
            method.descriptor
        )));
    }
    Ok(Instruction::Invoke { kind, method })
}

fn read_attribute<'a>(
    r: &mut ByteReader<'a>,
    pool: &ConstantPool,
) -> Result<(String, &'a [u8]), ClassFormatError> {
    let name = pool.utf8(r.u16()?)?;
    let length = r.u32()? as usize;
    let data = r.take(length)?;
    Ok((name, data))
}

fn read_signature(data: &[u8], pool: &ConstantPool) -> Result<String, ClassFormatError> {
    let mut r = ByteReader::new(data);
    let signature = pool.utf8(r.u16()?)?;
    r.finish(attr::SIGNATURE)?;
    Ok(signature)
}

fn read_annotations(data: &[u8], pool: &ConstantPool) -> Result<Vec<AnnotationEntry>, ClassFormatError> {
    let mut r = ByteReader::new(data);
    let count = r.u16()? as usize;
    let mut entries = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        entries.push(read_annotation(&mut r, pool, 0)?);
    }
    r.finish(attr::ANNOTATIONS)?;
    Ok(entries)
}

fn read_annotation(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    depth: usize,
) -> Result<AnnotationEntry, ClassFormatError> {
    let type_name = pool.utf8(r.u16()?)?;
    check_internal_name(&type_name)?;
    let pair_count = r.u16()? as usize;
    let mut values = Vec::with_capacity(pair_count.min(r.remaining()));
    for _ in 0..pair_count {
        let name = pool.utf8(r.u16()?)?;
        let value = read_element(r, pool, depth)?;
        values.push((name, value));
    }
    Ok(AnnotationEntry { type_name, values })
}

fn read_element(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    depth: usize,
) -> Result<ElementValue, ClassFormatError> {
    if depth >= MAX_ELEMENT_DEPTH {
        return Err(ClassFormatError::BadAttribute {
            attribute: attr::ANNOTATIONS.to_string(),
            reason: "element values nested too deeply".to_string(),
        });
    }
    let value = match r.u8()? {
        element::STRING => ElementValue::Str(pool.utf8(r.u16()?)?),
        element::LONG => match pool.loadable(r.u16()?)? {
            Constant::Long(v) => ElementValue::Long(v),
            _ => return Err(ClassFormatError::BadElementTag('J')),
        },
        element::DOUBLE => match pool.loadable(r.u16()?)? {
            Constant::Double(v) => ElementValue::Double(v),
            _ => return Err(ClassFormatError::BadElementTag('D')),
        },
        element::BOOL => ElementValue::Bool(r.u8()? != 0),
        element::CLASS => ElementValue::Class(pool.utf8(r.u16()?)?),
        element::ANNOTATION => {
            ElementValue::Annotation(Box::new(read_annotation(r, pool, depth + 1)?))
        }
        element::ARRAY => {
            let count = r.u16()? as usize;
            let mut items = Vec::with_capacity(count.min(r.remaining()));
            for _ in 0..count {
                items.push(read_element(r, pool, depth + 1)?);
            }
            ElementValue::Array(items)
        }
        other => return Err(ClassFormatError::BadElementTag(other as char)),
    };
    Ok(value)
}

fn check_internal_name(name: &str) -> Result<(), ClassFormatError> {
    if descriptor::is_valid_internal_name(name) {
        Ok(())
    } else {
        Err(ClassFormatError::Invalid(format!("bad class name {:?}", name)))
    }
}

fn duplicate_attribute(name: &str) -> ClassFormatError {
    ClassFormatError::BadAttribute {
        attribute: name.to_string(),
        reason: "duplicate attribute".to_string(),
    }
}

// ============================================================================
// Constant pool
// ============================================================================

#[derive(Debug)]
enum PoolEntry {
    Utf8(String),
    Long(i64),
    Double(f64),
    Class(u16),
    Str(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    NameAndType(u16, u16),
}

struct ConstantPool {
    entries: Vec<PoolEntry>,
}

impl ConstantPool {
    fn read(r: &mut ByteReader<'_>) -> Result<Self, ClassFormatError> {
        let count = r.u16()?;
        if count == 0 {
            return Err(ClassFormatError::Invalid("constant pool count is zero".to_string()));
        }
        let mut entries = Vec::with_capacity((count as usize).min(r.remaining()));
        for index in 1..count {
            let entry = match r.u8()? {
                tag::UTF8 => {
                    let length = r.u16()? as usize;
                    let raw = r.take(length)?;
                    let text = std::str::from_utf8(raw)
                        .map_err(|_| ClassFormatError::InvalidUtf8 { index })?;
                    PoolEntry::Utf8(text.to_string())
                }
                tag::LONG => PoolEntry::Long(r.u64()? as i64),
                tag::DOUBLE => PoolEntry::Double(f64::from_bits(r.u64()?)),
                tag::CLASS => PoolEntry::Class(r.u16()?),
                tag::STRING => PoolEntry::Str(r.u16()?),
                tag::FIELD_REF => PoolEntry::FieldRef(r.u16()?, r.u16()?),
                tag::METHOD_REF => PoolEntry::MethodRef(r.u16()?, r.u16()?),
                tag::NAME_AND_TYPE => PoolEntry::NameAndType(r.u16()?, r.u16()?),
                other => return Err(ClassFormatError::UnknownConstantTag { index, tag: other }),
            };
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&PoolEntry, ClassFormatError> {
        if index == 0 {
            return Err(ClassFormatError::BadConstantIndex { index });
        }
        self.entries
            .get(index as usize - 1)
            .ok_or(ClassFormatError::BadConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.get(index)? {
            PoolEntry::Utf8(s) => Ok(s.clone()),
            _ => Err(ClassFormatError::ConstantTypeMismatch { index, expected: "Utf8" }),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassFormatError> {
        match self.get(index)? {
            PoolEntry::Class(name) => {
                let name = self.utf8(*name)?;
                if name.is_empty() {
                    return Err(ClassFormatError::Invalid("empty class reference".to_string()));
                }
                Ok(name)
            }
            _ => Err(ClassFormatError::ConstantTypeMismatch { index, expected: "Class" }),
        }
    }

    fn loadable(&self, index: u16) -> Result<Constant, ClassFormatError> {
        match self.get(index)? {
            PoolEntry::Long(v) => Ok(Constant::Long(*v)),
            PoolEntry::Double(v) => Ok(Constant::Double(*v)),
            PoolEntry::Str(s) => Ok(Constant::Str(self.utf8(*s)?)),
            _ => Err(ClassFormatError::ConstantTypeMismatch {
                index,
                expected: "Long, Double or String",
            }),
        }
    }

    fn member_ref(&self, index: u16, expected_tag: u8) -> Result<MemberRef, ClassFormatError> {
        let (class, nat) = match (self.get(index)?, expected_tag) {
            (PoolEntry::FieldRef(c, n), tag::FIELD_REF) => (*c, *n),
            (PoolEntry::MethodRef(c, n), tag::METHOD_REF) => (*c, *n),
            _ => {
                let expected = if expected_tag == tag::FIELD_REF { "FieldRef" } else { "MethodRef" };
                return Err(ClassFormatError::ConstantTypeMismatch { index, expected });
            }
        };
        let owner = self.class_name(class)?;
        let (name, descriptor) = match self.get(nat)? {
            PoolEntry::NameAndType(n, d) => (self.utf8(*n)?, self.utf8(*d)?),
            _ => {
                return Err(ClassFormatError::ConstantTypeMismatch {
                    index: nat,
                    expected: "NameAndType",
                })
            }
        };
        Ok(MemberRef { owner, name, descriptor })
    }
}

// ============================================================================
// Byte cursor
// ============================================================================

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ClassFormatError> {
        if self.remaining() < n {
            return Err(ClassFormatError::Truncated { offset: self.pos, needed: n });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ClassFormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFormatError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFormatError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, ClassFormatError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    /// Attribute payloads must be consumed exactly.
    fn finish(&self, attribute: &str) -> Result<(), ClassFormatError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(ClassFormatError::BadAttribute {
                attribute: attribute.to_string(),
                reason: format!("{} unread bytes", self.remaining()),
            })
        }
    }
}
