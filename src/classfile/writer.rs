//! Binary class-file writer.

use std::collections::HashMap;

use super::annotation::{AnnotationEntry, ElementValue};
use super::model::{
    ClassDescriptor, Code, Condition, Constant, FieldDescriptor, Instruction, InvokeKind,
    MemberRef, MethodDescriptor,
};
use super::opcodes::{self as op, attr, element, tag};
use super::{ClassFormatError, CLASS_MAGIC};

/// Serializes descriptors. Constant pool entries are deduplicated, so two
/// equal descriptors always produce identical bytes.
pub struct ClassWriter;

impl ClassWriter {
    pub fn write(class: &ClassDescriptor) -> Result<Vec<u8>, ClassFormatError> {
        let mut pool = PoolBuilder::default();
        let mut body = Vec::new();

        put_u16(&mut body, class.access);
        put_u16(&mut body, pool.class(&class.name)?);
        match &class.super_name {
            Some(name) => put_u16(&mut body, pool.class(name)?),
            None => put_u16(&mut body, 0),
        }
        put_u16(&mut body, count16(class.interfaces.len(), "interfaces")?);
        for iface in &class.interfaces {
            put_u16(&mut body, pool.class(iface)?);
        }

        put_u16(&mut body, count16(class.fields.len(), "fields")?);
        for field in &class.fields {
            write_field(&mut body, &mut pool, field)?;
        }
        put_u16(&mut body, count16(class.methods.len(), "methods")?);
        for method in &class.methods {
            write_method(&mut body, &mut pool, method)?;
        }

        let mut attrs = AttributeList::default();
        if !class.annotations.declared.is_empty() {
            let data = annotations(&mut pool, &class.annotations.declared)?;
            attrs.push(&mut pool, attr::ANNOTATIONS, data)?;
        }
        if !class.annotations.stitched.is_empty() {
            let data = annotations(&mut pool, &class.annotations.stitched)?;
            attrs.push(&mut pool, attr::STITCHED_ANNOTATIONS, data)?;
        }
        if let Some(sig) = &class.signature {
            let data = pool_index(pool.utf8(sig)?);
            attrs.push(&mut pool, attr::SIGNATURE, data)?;
        }
        if let Some(enclosing) = &class.enclosing_class {
            let data = pool_index(pool.class(enclosing)?);
            attrs.push(&mut pool, attr::ENCLOSING_CLASS, data)?;
        }
        for raw in &class.unknown_attributes {
            let data = raw.data.clone();
            attrs.push(&mut pool, &raw.name, data)?;
        }
        attrs.write(&mut body)?;

        let mut out = Vec::with_capacity(body.len() + pool.bytes.len() + 10);
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        put_u16(&mut out, class.version.minor);
        put_u16(&mut out, class.version.major);
        put_u16(&mut out, pool.count + 1);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

fn write_field(
    out: &mut Vec<u8>,
    pool: &mut PoolBuilder,
    field: &FieldDescriptor,
) -> Result<(), ClassFormatError> {
    put_u16(out, field.access);
    put_u16(out, pool.utf8(&field.name)?);
    put_u16(out, pool.utf8(&field.descriptor)?);

    let mut attrs = AttributeList::default();
    if !field.annotations.declared.is_empty() {
        let data = annotations(pool, &field.annotations.declared)?;
        attrs.push(pool, attr::ANNOTATIONS, data)?;
    }
    if !field.annotations.stitched.is_empty() {
        let data = annotations(pool, &field.annotations.stitched)?;
        attrs.push(pool, attr::STITCHED_ANNOTATIONS, data)?;
    }
    if let Some(sig) = &field.signature {
        let data = pool_index(pool.utf8(sig)?);
        attrs.push(pool, attr::SIGNATURE, data)?;
    }
    attrs.write(out)
}

fn write_method(
    out: &mut Vec<u8>,
    pool: &mut PoolBuilder,
    method: &MethodDescriptor,
) -> Result<(), ClassFormatError> {
    put_u16(out, method.access);
    put_u16(out, pool.utf8(&method.name)?);
    put_u16(out, pool.utf8(&method.descriptor)?);

    let mut attrs = AttributeList::default();
    if let Some(code) = &method.code {
        let data = write_code(pool, code)?;
        attrs.push(pool, attr::CODE, data)?;
    }
    if !method.exceptions.is_empty() {
        let mut data = Vec::new();
        put_u16(&mut data, count16(method.exceptions.len(), "exceptions")?);
        for exception in &method.exceptions {
            put_u16(&mut data, pool.class(exception)?);
        }
        attrs.push(pool, attr::EXCEPTIONS, data)?;
    }
    if !method.annotations.declared.is_empty() {
        let data = annotations(pool, &method.annotations.declared)?;
        attrs.push(pool, attr::ANNOTATIONS, data)?;
    }
    if !method.annotations.stitched.is_empty() {
        let data = annotations(pool, &method.annotations.stitched)?;
        attrs.push(pool, attr::STITCHED_ANNOTATIONS, data)?;
    }
    if let Some(sig) = &method.signature {
        let data = pool_index(pool.utf8(sig)?);
        attrs.push(pool, attr::SIGNATURE, data)?;
    }
    attrs.write(out)
}

fn write_code(pool: &mut PoolBuilder, code: &Code) -> Result<Vec<u8>, ClassFormatError> {
    let mut out = Vec::new();
    put_u16(&mut out, code.max_locals);
    let count = u32::try_from(code.instructions.len())
        .map_err(|_| ClassFormatError::TooLarge("instruction count".to_string()))?;
    out.extend_from_slice(&count.to_be_bytes());
    for insn in &code.instructions {
        write_instruction(&mut out, pool, insn)?;
    }
    put_u16(&mut out, count16(code.handlers.len(), "exception table")?);
    for h in &code.handlers {
        out.extend_from_slice(&h.start.to_be_bytes());
        out.extend_from_slice(&h.end.to_be_bytes());
        out.extend_from_slice(&h.handler.to_be_bytes());
        match &h.catch_type {
            Some(name) => put_u16(&mut out, pool.class(name)?),
            None => put_u16(&mut out, 0),
        }
    }
    Ok(out)
}

fn write_instruction(
    out: &mut Vec<u8>,
    pool: &mut PoolBuilder,
    insn: &Instruction,
) -> Result<(), ClassFormatError> {
    match insn {
        Instruction::Nop => out.push(op::NOP),
        Instruction::Const(Constant::Null) => out.push(op::CONST_NULL),
        Instruction::Const(Constant::Bool(true)) => out.push(op::CONST_TRUE),
        Instruction::Const(Constant::Bool(false)) => out.push(op::CONST_FALSE),
        Instruction::Const(constant) => {
            out.push(op::LDC);
            put_u16(out, pool.loadable(constant)?);
        }
        Instruction::ClassLiteral(name) => {
            out.push(op::LDC_CLASS);
            put_u16(out, pool.class(name)?);
        }
        Instruction::Load(slot) => {
            out.push(op::LOAD);
            put_u16(out, *slot);
        }
        Instruction::Store(slot) => {
            out.push(op::STORE);
            put_u16(out, *slot);
        }
        Instruction::Pop => out.push(op::POP),
        Instruction::Dup => out.push(op::DUP),
        Instruction::Swap => out.push(op::SWAP),
        Instruction::Add => out.push(op::ADD),
        Instruction::Sub => out.push(op::SUB),
        Instruction::Mul => out.push(op::MUL),
        Instruction::Div => out.push(op::DIV),
        Instruction::Rem => out.push(op::REM),
        Instruction::Neg => out.push(op::NEG),
        Instruction::Compare => out.push(op::CMP),
        Instruction::If { cond, target } => {
            out.push(match cond {
                Condition::Eq => op::IFEQ,
                Condition::Ne => op::IFNE,
                Condition::Lt => op::IFLT,
                Condition::Ge => op::IFGE,
                Condition::Gt => op::IFGT,
                Condition::Le => op::IFLE,
                Condition::Null => op::IFNULL,
                Condition::NonNull => op::IFNONNULL,
            });
            out.extend_from_slice(&target.to_be_bytes());
        }
        Instruction::Goto(target) => {
            out.push(op::GOTO);
            out.extend_from_slice(&target.to_be_bytes());
        }
        Instruction::New(name) => {
            out.push(op::NEW);
            put_u16(out, pool.class(name)?);
        }
        Instruction::GetField(field) => {
            out.push(op::GETFIELD);
            put_u16(out, pool.member(tag::FIELD_REF, field)?);
        }
        Instruction::PutField(field) => {
            out.push(op::PUTFIELD);
            put_u16(out, pool.member(tag::FIELD_REF, field)?);
        }
        Instruction::Invoke { kind, method } => {
            out.push(match kind {
                InvokeKind::Virtual => op::INVOKEVIRTUAL,
                InvokeKind::Special => op::INVOKESPECIAL,
                InvokeKind::Static => op::INVOKESTATIC,
            });
            put_u16(out, pool.member(tag::METHOD_REF, method)?);
        }
        Instruction::MakeClosure { class, captures } => {
            out.push(op::MAKE_CLOSURE);
            put_u16(out, pool.class(class)?);
            out.push(*captures);
        }
        Instruction::Return => out.push(op::RETURN),
        Instruction::ReturnValue => out.push(op::RETURN_VALUE),
        Instruction::Throw => out.push(op::THROW),
        Instruction::Trap(message) => {
            out.push(op::TRAP);
            put_u16(out, pool.utf8(message)?);
        }
        Instruction::MeterInvocation => out.push(op::METER_INVOCATION),
        Instruction::MeterJump => out.push(op::METER_JUMP),
        Instruction::MeterAllocation => out.push(op::METER_ALLOCATION),
        Instruction::MeterThrow => out.push(op::METER_THROW),
    }
    Ok(())
}

fn annotations(pool: &mut PoolBuilder, entries: &[AnnotationEntry]) -> Result<Vec<u8>, ClassFormatError> {
    let mut out = Vec::new();
    put_u16(&mut out, count16(entries.len(), "annotations")?);
    for entry in entries {
        write_annotation(&mut out, pool, entry)?;
    }
    Ok(out)
}

fn write_annotation(
    out: &mut Vec<u8>,
    pool: &mut PoolBuilder,
    entry: &AnnotationEntry,
) -> Result<(), ClassFormatError> {
    put_u16(out, pool.utf8(&entry.type_name)?);
    put_u16(out, count16(entry.values.len(), "annotation values")?);
    for (name, value) in &entry.values {
        put_u16(out, pool.utf8(name)?);
        write_element(out, pool, value)?;
    }
    Ok(())
}

fn write_element(out: &mut Vec<u8>, pool: &mut PoolBuilder, value: &ElementValue) -> Result<(), ClassFormatError> {
    match value {
        ElementValue::Str(s) => {
            out.push(element::STRING);
            put_u16(out, pool.utf8(s)?);
        }
        ElementValue::Long(v) => {
            out.push(element::LONG);
            put_u16(out, pool.loadable(&Constant::Long(*v))?);
        }
        ElementValue::Double(v) => {
            out.push(element::DOUBLE);
            put_u16(out, pool.loadable(&Constant::Double(*v))?);
        }
        ElementValue::Bool(v) => {
            out.push(element::BOOL);
            out.push(u8::from(*v));
        }
        ElementValue::Class(name) => {
            out.push(element::CLASS);
            put_u16(out, pool.utf8(name)?);
        }
        ElementValue::Annotation(nested) => {
            out.push(element::ANNOTATION);
            write_annotation(out, pool, nested)?;
        }
        ElementValue::Array(items) => {
            out.push(element::ARRAY);
            put_u16(out, count16(items.len(), "annotation array")?);
            for item in items {
                write_element(out, pool, item)?;
            }
        }
    }
    Ok(())
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn pool_index(index: u16) -> Vec<u8> {
    index.to_be_bytes().to_vec()
}

fn count16(len: usize, what: &str) -> Result<u16, ClassFormatError> {
    u16::try_from(len).map_err(|_| ClassFormatError::TooLarge(what.to_string()))
}

#[derive(Default)]
struct AttributeList {
    count: u16,
    bytes: Vec<u8>,
}

impl AttributeList {
    fn push(&mut self, pool: &mut PoolBuilder, name: &str, data: Vec<u8>) -> Result<(), ClassFormatError> {
        put_u16(&mut self.bytes, pool.utf8(name)?);
        let length = u32::try_from(data.len())
            .map_err(|_| ClassFormatError::TooLarge(format!("{} attribute", name)))?;
        self.bytes.extend_from_slice(&length.to_be_bytes());
        self.bytes.extend_from_slice(&data);
        self.count = self
            .count
            .checked_add(1)
            .ok_or_else(|| ClassFormatError::TooLarge("attribute count".to_string()))?;
        Ok(())
    }

    fn write(self, out: &mut Vec<u8>) -> Result<(), ClassFormatError> {
        put_u16(out, self.count);
        out.extend_from_slice(&self.bytes);
        Ok(())
    }
}

// ============================================================================
// Constant pool builder
// ============================================================================

#[derive(PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Long(i64),
    Double(u64),
    Class(String),
    Str(String),
    Member(u8, String, String, String),
    NameAndType(String, String),
}

#[derive(Default)]
struct PoolBuilder {
    index: HashMap<PoolKey, u16>,
    bytes: Vec<u8>,
    count: u16,
}

impl PoolBuilder {
    fn intern(&mut self, key: PoolKey, encode: impl FnOnce(&mut Vec<u8>)) -> Result<u16, ClassFormatError> {
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }
        if self.count >= u16::MAX - 1 {
            return Err(ClassFormatError::TooLarge("constant pool".to_string()));
        }
        self.count += 1;
        encode(&mut self.bytes);
        self.index.insert(key, self.count);
        Ok(self.count)
    }

    fn utf8(&mut self, value: &str) -> Result<u16, ClassFormatError> {
        let length = count16(value.len(), "utf8 constant")?;
        self.intern(PoolKey::Utf8(value.to_string()), |b| {
            b.push(tag::UTF8);
            put_u16(b, length);
            b.extend_from_slice(value.as_bytes());
        })
    }

    fn class(&mut self, name: &str) -> Result<u16, ClassFormatError> {
        let key = PoolKey::Class(name.to_string());
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }
        let name_index = self.utf8(name)?;
        self.intern(key, |b| {
            b.push(tag::CLASS);
            put_u16(b, name_index);
        })
    }

    fn loadable(&mut self, constant: &Constant) -> Result<u16, ClassFormatError> {
        match constant {
            Constant::Long(v) => {
                let v = *v;
                self.intern(PoolKey::Long(v), |b| {
                    b.push(tag::LONG);
                    b.extend_from_slice(&v.to_be_bytes());
                })
            }
            Constant::Double(v) => {
                let bits = v.to_bits();
                self.intern(PoolKey::Double(bits), |b| {
                    b.push(tag::DOUBLE);
                    b.extend_from_slice(&bits.to_be_bytes());
                })
            }
            Constant::Str(s) => {
                let key = PoolKey::Str(s.clone());
                if let Some(&index) = self.index.get(&key) {
                    return Ok(index);
                }
                let utf8 = self.utf8(s)?;
                self.intern(key, |b| {
                    b.push(tag::STRING);
                    put_u16(b, utf8);
                })
            }
            Constant::Null | Constant::Bool(_) => Err(ClassFormatError::Invalid(
                "null and boolean constants have dedicated opcodes".to_string(),
            )),
        }
    }

    fn member(&mut self, kind: u8, member: &MemberRef) -> Result<u16, ClassFormatError> {
        let key = PoolKey::Member(
            kind,
            member.owner.clone(),
            member.name.clone(),
            member.descriptor.clone(),
        );
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }
        let class_index = self.class(&member.owner)?;
        let nat_key = PoolKey::NameAndType(member.name.clone(), member.descriptor.clone());
        let nat_index = match self.index.get(&nat_key) {
            Some(&index) => index,
            None => {
                let name_index = self.utf8(&member.name)?;
                let desc_index = self.utf8(&member.descriptor)?;
                self.intern(nat_key, |b| {
                    b.push(tag::NAME_AND_TYPE);
                    put_u16(b, name_index);
                    put_u16(b, desc_index);
                })?
            }
        };
        self.intern(key, |b| {
            b.push(kind);
            put_u16(b, class_index);
            put_u16(b, nat_index);
        })
    }
}
