//! Namespace remapping of type references.

use crate::classfile::descriptor::{self, RemapError};
use crate::classfile::{ClassDescriptor, Code, Instruction, MemberRef};
use crate::rules::Policy;

use super::{RewriteContext, RewriteError};

/// Maps class names into the sandbox namespace according to the catalog.
pub struct Remapper<'a> {
    ctx: &'a RewriteContext<'a>,
    class: String,
    remapped: usize,
}

impl<'a> Remapper<'a> {
    pub fn new(ctx: &'a RewriteContext<'a>, class: &str) -> Self {
        Self { ctx, class: class.to_string(), remapped: 0 }
    }

    pub fn remapped(&self) -> usize {
        self.remapped
    }

    pub fn prefix(&self) -> &str {
        self.ctx.namespace_prefix
    }

    pub fn policy(&self, name: &str) -> Policy {
        self.ctx.classify(name)
    }

    /// Map one internal name. Already-prefixed names are kept unless their
    /// original name is forbidden.
    pub fn map_name(&mut self, name: &str) -> Result<String, RewriteError> {
        if name.starts_with('[') {
            return self.map_descriptor(name);
        }
        let policy = self.ctx.classify(name);
        if policy == Policy::Forbid {
            return Err(self.violation(self.ctx.original_name(name)));
        }
        if name.starts_with(self.ctx.namespace_prefix) || !policy.is_sandboxed() {
            return Ok(name.to_string());
        }
        self.remapped += 1;
        Ok(format!("{}{}", self.ctx.namespace_prefix, name))
    }

    pub fn map_descriptor(&mut self, desc: &str) -> Result<String, RewriteError> {
        let class = self.class.clone();
        descriptor::remap_descriptor(desc, |name| self.map_name(name))
            .map_err(|e| flatten(e, &class))
    }

    pub fn map_signature(&mut self, sig: &str) -> Result<String, RewriteError> {
        let class = self.class.clone();
        descriptor::remap_signature(sig, |name| self.map_name(name))
            .map_err(|e| flatten(e, &class))
    }

    fn map_member(&mut self, member: &MemberRef) -> Result<MemberRef, RewriteError> {
        Ok(MemberRef {
            owner: self.map_name(&member.owner)?,
            name: member.name.clone(),
            descriptor: self.map_descriptor(&member.descriptor)?,
        })
    }

    fn violation(&self, name: &str) -> RewriteError {
        RewriteError::RuleViolation {
            class: self.class.clone(),
            reason: format!("Disallowed reference to {}", descriptor::display_name(name)),
        }
    }

    /// Remap every type reference except annotations.
    pub fn apply(&mut self, class: &mut ClassDescriptor) -> Result<(), RewriteError> {
        class.name = self.map_name(&class.name)?;
        if let Some(super_name) = &class.super_name {
            class.super_name = Some(self.map_name(super_name)?);
        }
        for iface in class.interfaces.iter_mut() {
            *iface = self.map_name(iface)?;
        }
        if let Some(sig) = &class.signature {
            class.signature = Some(self.map_signature(sig)?);
        }
        if let Some(enclosing) = &class.enclosing_class {
            class.enclosing_class = Some(self.map_name(enclosing)?);
        }

        for field in class.fields.iter_mut() {
            field.descriptor = self.map_descriptor(&field.descriptor)?;
            if let Some(sig) = &field.signature {
                field.signature = Some(self.map_signature(sig)?);
            }
        }

        for method in class.methods.iter_mut() {
            method.descriptor = self.map_descriptor(&method.descriptor)?;
            if let Some(sig) = &method.signature {
                method.signature = Some(self.map_signature(sig)?);
            }
            for exception in method.exceptions.iter_mut() {
                *exception = self.map_name(exception)?;
            }
            if let Some(code) = method.code.as_mut() {
                self.map_code(code)?;
            }
        }
        Ok(())
    }

    fn map_code(&mut self, code: &mut Code) -> Result<(), RewriteError> {
        for insn in code.instructions.iter_mut() {
            match insn {
                Instruction::ClassLiteral(name) | Instruction::New(name) => {
                    *name = self.map_name(name)?;
                }
                Instruction::MakeClosure { class, .. } => *class = self.map_name(class)?,
                Instruction::GetField(member) | Instruction::PutField(member) => {
                    *member = self.map_member(member)?;
                }
                Instruction::Invoke { method, .. } => *method = self.map_member(method)?,
                _ => {}
            }
        }
        for handler in code.handlers.iter_mut() {
            if let Some(catch_type) = &handler.catch_type {
                handler.catch_type = Some(self.map_name(catch_type)?);
            }
        }
        Ok(())
    }
}

fn flatten(error: RemapError<RewriteError>, class: &str) -> RewriteError {
    match error {
        RemapError::Rejected(e) => e,
        RemapError::Malformed(text) => RewriteError::Inconsistent {
            class: class.to_string(),
            reason: format!("malformed descriptor or signature {:?}", text),
        },
    }
}
