//! Fluent construction of class descriptors.

use super::annotation::{AnnotationEntry, AnnotationSet};
use super::model::{
    access, ClassDescriptor, ClassVersion, Code, ExceptionHandler, FieldDescriptor, Instruction,
    MethodDescriptor,
};

/// Superclass assigned when none is given.
pub const OBJECT_CLASS: &str = "rt/Object";

pub struct ClassBuilder {
    class: ClassDescriptor,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            class: ClassDescriptor {
                version: ClassVersion::default(),
                access: access::PUBLIC,
                name: name.to_string(),
                super_name: Some(OBJECT_CLASS.to_string()),
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                annotations: AnnotationSet::default(),
                signature: None,
                enclosing_class: None,
                unknown_attributes: Vec::new(),
            },
        }
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.class.access = flags;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.class.super_name = Some(name.to_string());
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.class.interfaces.push(name.to_string());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.class.signature = Some(signature.to_string());
        self
    }

    /// Marks the class as a synthetic closure created by `enclosing`.
    pub fn enclosed_by(mut self, enclosing: &str) -> Self {
        self.class.enclosing_class = Some(enclosing.to_string());
        self.class.access |= access::SYNTHETIC | access::FINAL;
        self
    }

    pub fn field(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        self.class.fields.push(FieldDescriptor {
            access: flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
            annotations: AnnotationSet::default(),
        });
        self
    }

    pub fn annotated_field(mut self, flags: u16, name: &str, descriptor: &str, annotation: AnnotationEntry) -> Self {
        self = self.field(flags, name, descriptor);
        if let Some(field) = self.class.fields.last_mut() {
            field.annotations.push(annotation);
        }
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.class.methods.push(method.build());
        self
    }

    pub fn annotation(mut self, annotation: AnnotationEntry) -> Self {
        self.class.annotations.push(annotation);
        self
    }

    /// Adds a public no-arg constructor that returns immediately.
    pub fn default_constructor(self) -> Self {
        self.method(MethodBuilder::new("<init>", "()V").max_locals(1).code(vec![Instruction::Return]))
    }

    pub fn build(self) -> ClassDescriptor {
        self.class
    }
}

pub struct MethodBuilder {
    method: MethodDescriptor,
    max_locals: u16,
    instructions: Option<Vec<Instruction>>,
    handlers: Vec<ExceptionHandler>,
}

impl MethodBuilder {
    /// A public instance method. Add `access::STATIC` through `access` as needed.
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            method: MethodDescriptor {
                access: access::PUBLIC,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                signature: None,
                exceptions: Vec::new(),
                annotations: AnnotationSet::default(),
                code: None,
            },
            max_locals: 0,
            instructions: None,
            handlers: Vec::new(),
        }
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.method.access = flags;
        self
    }

    pub fn max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = max_locals;
        self
    }

    pub fn code(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = Some(instructions);
        self
    }

    pub fn handler(mut self, start: u32, end: u32, handler: u32, catch_type: Option<&str>) -> Self {
        self.handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    pub fn throws(mut self, exception: &str) -> Self {
        self.method.exceptions.push(exception.to_string());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.method.signature = Some(signature.to_string());
        self
    }

    pub fn annotation(mut self, annotation: AnnotationEntry) -> Self {
        self.method.annotations.push(annotation);
        self
    }

    pub fn build(self) -> MethodDescriptor {
        let mut method = self.method;
        if let Some(instructions) = self.instructions {
            method.code = Some(Code {
                max_locals: self.max_locals,
                instructions,
                handlers: self.handlers,
            });
        }
        method
    }
}
