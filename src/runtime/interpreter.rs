//! Iterative bytecode interpreter.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::classfile::descriptor::method_shape;
use crate::classfile::{access, Condition, Constant, Instruction, InvokeKind, MemberRef};
use crate::hierarchy::{LoadedClass, SandboxNode};
use crate::telemetry::{log_security_event, SecurityEvent};

use super::context::ExecutionContext;
use super::cost::{CostCategory, CostCounters, RuntimeCostSummary};
use super::intrinsics::{intrinsic_super, is_intrinsic_class, is_throwable_class};
use super::value::{Object, Value};
use super::RuntimeError;

/// Superclass chains longer than this are treated as cyclic.
const MAX_HIERARCHY_DEPTH: usize = 64;

struct Frame {
    class: Arc<LoadedClass>,
    method: usize,
    pc: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

enum Flow {
    Next,
    Return(Option<Value>),
    Throw(Value),
}

pub(super) enum Completion {
    Value(Option<Value>),
    Thrown(Value),
}

enum Target {
    Bytecode(Arc<LoadedClass>, usize),
    Intrinsic(String),
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Runs methods of one node's classes for a single invocation.
pub struct Interpreter<'n> {
    pub(super) node: &'n SandboxNode,
    pub(super) context: ExecutionContext,
    costs: RuntimeCostSummary,
    max_stack_depth: usize,
    frames: Vec<Frame>,
    classes: HashMap<String, Arc<LoadedClass>>,
}

impl<'n> Interpreter<'n> {
    pub fn new(node: &'n SandboxNode) -> Self {
        let config = node.config();
        Self {
            node,
            context: ExecutionContext::new(config.random_seed),
            costs: RuntimeCostSummary::new(
                &config.profile,
                config.cost_budget,
                Box::new(config.cost_weights),
            ),
            max_stack_depth: config.max_stack_depth,
            frames: Vec::new(),
            classes: HashMap::new(),
        }
    }

    pub fn costs(&self) -> CostCounters {
        self.costs.snapshot()
    }

    pub fn node(&self) -> &SandboxNode {
        self.node
    }

    /// Load a class by runtime or original name, memoized per invocation.
    pub fn load(&mut self, name: &str) -> Result<Arc<LoadedClass>, RuntimeError> {
        if let Some(class) = self.classes.get(name) {
            return Ok(class.clone());
        }
        let class = self.node.load_class(name)?;
        self.classes.insert(name.to_string(), class.clone());
        Ok(class)
    }

    /// Allocate an instance with every instance field at its zero value.
    /// Runs no constructor.
    pub fn instantiate(&mut self, class: &Arc<LoadedClass>) -> Result<Value, RuntimeError> {
        let mut object = Object::new(class.name(), Some(class.clone()), self.context.next_object_id());
        let mut current = Some(class.clone());
        let mut depth = 0;
        while let Some(c) = current {
            for field in c.descriptor().instance_fields() {
                object
                    .fields
                    .entry(field.name.clone())
                    .or_insert_with(|| Value::default_for(&field.descriptor));
            }
            depth += 1;
            current = match &c.descriptor().super_name {
                Some(s) if !is_intrinsic_class(s) && depth < MAX_HIERARCHY_DEPTH => Some(self.load(s)?),
                _ => None,
            };
        }
        Ok(Value::object(object))
    }

    /// Build a host-library exception carrying `message`.
    pub fn exception(&mut self, class: &str, message: &str) -> Value {
        let mut object = Object::new(class, None, self.context.next_object_id());
        object.fields.insert("message".to_string(), Value::str(message));
        Value::object(object)
    }

    /// Run a method to completion and return its result.
    pub fn invoke_method(
        &mut self,
        class: Arc<LoadedClass>,
        method: usize,
        args: Vec<Value>,
    ) -> Result<Option<Value>, RuntimeError> {
        let base = self.frames.len();
        self.push_frame(class, method, args)?;
        let result = self.run(base);
        self.frames.truncate(base);
        result
    }

    fn run(&mut self, base: usize) -> Result<Option<Value>, RuntimeError> {
        loop {
            match self.step()? {
                Flow::Next => {}
                Flow::Return(value) => {
                    self.frames.pop();
                    if self.frames.len() <= base {
                        return Ok(value);
                    }
                    if let Some(value) = value {
                        self.push(value)?;
                    }
                }
                Flow::Throw(exception) => self.unwind(base, exception)?,
            }
        }
    }

    fn step(&mut self) -> Result<Flow, RuntimeError> {
        let (class, method, pc) = {
            let frame = self.frame()?;
            let pc = frame.pc;
            frame.pc += 1;
            (frame.class.clone(), frame.method, pc)
        };
        let code = class
            .descriptor()
            .methods
            .get(method)
            .and_then(|m| m.code.as_ref())
            .ok_or_else(|| verify(&class, "frame without code"))?;
        let insn = code
            .instructions
            .get(pc)
            .ok_or_else(|| verify(&class, "execution ran past the end of the code"))?;
        self.execute(&class, insn)
    }

    fn execute(&mut self, class: &Arc<LoadedClass>, insn: &Instruction) -> Result<Flow, RuntimeError> {
        match insn {
            Instruction::Nop => {}
            Instruction::Const(constant) => {
                let value = match constant {
                    Constant::Null => Value::Null,
                    Constant::Bool(b) => Value::Bool(*b),
                    Constant::Long(v) => Value::Long(*v),
                    Constant::Double(v) => Value::Double(*v),
                    Constant::Str(s) => Value::str(s),
                };
                self.push(value)?;
            }
            Instruction::ClassLiteral(name) => self.push(Value::Class(name.as_str().into()))?,
            Instruction::Load(index) => {
                let value = self
                    .frame()?
                    .locals
                    .get(usize::from(*index))
                    .cloned()
                    .ok_or_else(|| verify(class, "local index out of range"))?;
                self.push(value)?;
            }
            Instruction::Store(index) => {
                let value = self.pop()?;
                let slot = self
                    .frame()?
                    .locals
                    .get_mut(usize::from(*index))
                    .ok_or_else(|| verify(class, "local index out of range"))?;
                *slot = value;
            }
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Dup => {
                let value = self.pop()?;
                self.push(value.clone())?;
                self.push(value)?;
            }
            Instruction::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(a)?;
            }
            Instruction::Add => return self.arith(ArithOp::Add),
            Instruction::Sub => return self.arith(ArithOp::Sub),
            Instruction::Mul => return self.arith(ArithOp::Mul),
            Instruction::Div => return self.arith(ArithOp::Div),
            Instruction::Rem => return self.arith(ArithOp::Rem),
            Instruction::Neg => {
                let value = match self.pop()? {
                    Value::Long(v) => Value::Long(v.wrapping_neg()),
                    Value::Double(v) => Value::Double(-v),
                    other => return Err(RuntimeError::Verify(format!("cannot negate {}", other))),
                };
                self.push(value)?;
            }
            Instruction::Compare => {
                let b = self.pop()?;
                let a = self.pop()?;
                let ordering = match (&a, &b) {
                    (Value::Double(x), Value::Double(y)) => x.partial_cmp(y).map(|o| o as i64).unwrap_or(-1),
                    _ => match (a.as_long(), b.as_long()) {
                        (Some(x), Some(y)) => x.cmp(&y) as i64,
                        _ => return Err(RuntimeError::Verify(format!("cannot compare {} and {}", a, b))),
                    },
                };
                self.push(Value::Long(ordering))?;
            }
            Instruction::If { cond, target } => {
                let value = self.pop()?;
                if self.condition(*cond, &value)? {
                    self.frame()?.pc = *target as usize;
                }
            }
            Instruction::Goto(target) => self.frame()?.pc = *target as usize,
            Instruction::New(name) => return self.allocate(name),
            Instruction::GetField(member) => return self.get_field(member),
            Instruction::PutField(member) => return self.put_field(member),
            Instruction::Invoke { kind, method } => return self.invoke(*kind, method),
            Instruction::MakeClosure { class: closure, captures } => {
                return self.make_closure(closure, usize::from(*captures));
            }
            Instruction::Return => return Ok(Flow::Return(None)),
            Instruction::ReturnValue => return Ok(Flow::Return(Some(self.pop()?))),
            Instruction::Throw => {
                let value = self.pop()?;
                if value.is_null() {
                    return Ok(Flow::Throw(self.exception("rt/NullPointerException", "throw null")));
                }
                return Ok(Flow::Throw(value));
            }
            Instruction::Trap(message) => {
                log_security_event(
                    SecurityEvent::RuleViolationTrap,
                    message,
                    &[("class", class.original_name())],
                );
                return Err(RuntimeError::RuleViolation(message.clone()));
            }
            Instruction::MeterInvocation => {
                self.charge(CostCategory::Invocation)?;
                let depth = self.frames.len();
                if depth > self.max_stack_depth {
                    log_security_event(
                        SecurityEvent::StackDepthExceeded,
                        "Sandboxed call stack too deep",
                        &[("class", class.original_name())],
                    );
                    return Err(RuntimeError::StackDepthExceeded { depth, limit: self.max_stack_depth });
                }
            }
            Instruction::MeterJump => self.charge(CostCategory::Jump)?,
            Instruction::MeterAllocation => self.charge(CostCategory::Allocation)?,
            Instruction::MeterThrow => self.charge(CostCategory::Throw)?,
        }
        Ok(Flow::Next)
    }

    fn charge(&mut self, category: CostCategory) -> Result<(), RuntimeError> {
        self.charge_units(category, 1)
    }

    pub(super) fn charge_units(&mut self, category: CostCategory, units: u64) -> Result<(), RuntimeError> {
        self.costs.record_units(category, units).map_err(|violation| {
            log_security_event(
                SecurityEvent::CostBudgetExceeded,
                "Sandboxed code exceeded its cost budget",
                &[("counter", violation.counter.as_str())],
            );
            RuntimeError::CostExceeded(violation)
        })
    }

    fn arith(&mut self, op: ArithOp) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Long(x), Value::Long(y)) => {
                let (x, y) = (*x, *y);
                Value::Long(match op {
                    ArithOp::Add => x.wrapping_add(y),
                    ArithOp::Sub => x.wrapping_sub(y),
                    ArithOp::Mul => x.wrapping_mul(y),
                    ArithOp::Div | ArithOp::Rem if y == 0 => {
                        return Ok(Flow::Throw(self.exception("rt/ArithmeticException", "/ by zero")));
                    }
                    ArithOp::Div => x.wrapping_div(y),
                    ArithOp::Rem => x.wrapping_rem(y),
                })
            }
            (Value::Double(x), Value::Double(y)) => Value::Double(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Rem => x % y,
            }),
            _ => return Err(RuntimeError::Verify(format!("arithmetic on {} and {}", a, b))),
        };
        self.push(result)?;
        Ok(Flow::Next)
    }

    fn condition(&self, cond: Condition, value: &Value) -> Result<bool, RuntimeError> {
        match cond {
            Condition::Null => return Ok(value.is_null()),
            Condition::NonNull => return Ok(!value.is_null()),
            _ => {}
        }
        let v = value
            .as_long()
            .ok_or_else(|| RuntimeError::Verify(format!("branch on non-integral {}", value)))?;
        Ok(match cond {
            Condition::Eq => v == 0,
            Condition::Ne => v != 0,
            Condition::Lt => v < 0,
            Condition::Ge => v >= 0,
            Condition::Gt => v > 0,
            Condition::Le => v <= 0,
            Condition::Null | Condition::NonNull => false,
        })
    }

    fn allocate(&mut self, name: &str) -> Result<Flow, RuntimeError> {
        let value = if is_intrinsic_class(name) {
            if name != "rt/Object" && name != "rt/Random" && !is_throwable_class(name) {
                return Ok(Flow::Throw(self.exception("rt/InstantiationError", name)));
            }
            Value::object(Object::new(name, None, self.context.next_object_id()))
        } else {
            let class = self.load(name)?;
            if class.descriptor().is_interface() || class.descriptor().access & access::ABSTRACT != 0 {
                return Ok(Flow::Throw(self.exception("rt/InstantiationError", name)));
            }
            self.instantiate(&class)?
        };
        self.push(value)?;
        Ok(Flow::Next)
    }

    fn make_closure(&mut self, name: &str, captures: usize) -> Result<Flow, RuntimeError> {
        let class = self.load(name)?;
        let captured = self.pop_n(captures)?;
        let field_names: Vec<String> = class
            .descriptor()
            .instance_fields()
            .take(captures)
            .map(|f| f.name.clone())
            .collect();
        if field_names.len() != captures {
            return Err(verify(&class, "closure captures more values than it has fields"));
        }
        let value = self.instantiate(&class)?;
        if let Value::Object(object) = &value {
            let mut object = object.borrow_mut();
            for (field, captured) in field_names.into_iter().zip(captured) {
                object.fields.insert(field, captured);
            }
        }
        self.push(value)?;
        Ok(Flow::Next)
    }

    fn get_field(&mut self, member: &MemberRef) -> Result<Flow, RuntimeError> {
        let found = match self.pop()? {
            Value::Null => {
                let message = format!("Cannot read field {}", member.name);
                return Ok(Flow::Throw(self.exception("rt/NullPointerException", &message)));
            }
            Value::Object(object) => {
                let object = object.borrow();
                let value = object.fields.get(&member.name).cloned();
                match value {
                    Some(value) => Some(value),
                    // host-library objects have no declared field list
                    None if object.class.is_none() => Some(Value::default_for(&member.descriptor)),
                    None => None,
                }
            }
            _ => None,
        };
        match found {
            Some(value) => {
                self.push(value)?;
                Ok(Flow::Next)
            }
            None => Ok(Flow::Throw(self.exception("rt/NoSuchFieldError", &member.to_string()))),
        }
    }

    fn put_field(&mut self, member: &MemberRef) -> Result<Flow, RuntimeError> {
        let value = self.pop()?;
        let stored = match self.pop()? {
            Value::Null => {
                let message = format!("Cannot assign field {}", member.name);
                return Ok(Flow::Throw(self.exception("rt/NullPointerException", &message)));
            }
            Value::Object(object) => {
                let mut object = object.borrow_mut();
                if object.class.is_some() && !object.fields.contains_key(&member.name) {
                    false
                } else {
                    object.fields.insert(member.name.clone(), value);
                    true
                }
            }
            _ => false,
        };
        if stored {
            Ok(Flow::Next)
        } else {
            Ok(Flow::Throw(self.exception("rt/NoSuchFieldError", &member.to_string())))
        }
    }

    fn invoke(&mut self, kind: InvokeKind, member: &MemberRef) -> Result<Flow, RuntimeError> {
        let shape = method_shape(&member.descriptor)
            .ok_or_else(|| RuntimeError::Verify(format!("bad method descriptor {}", member.descriptor)))?;
        let has_receiver = kind != InvokeKind::Static;
        let args = self.pop_n(shape.params + usize::from(has_receiver))?;

        let start = if has_receiver {
            match args.first() {
                Some(Value::Null) | None => {
                    let message = format!("Cannot invoke {}", member);
                    return Ok(Flow::Throw(self.exception("rt/NullPointerException", &message)));
                }
                Some(receiver) if kind == InvokeKind::Virtual => {
                    receiver.class_name().map(|n| n.to_string()).unwrap_or_else(|| member.owner.clone())
                }
                Some(_) => member.owner.clone(),
            }
        } else {
            member.owner.clone()
        };

        trace!(method = %member, "invoke");
        match self.resolve_method(&start, &member.name, &member.descriptor)? {
            Some(Target::Bytecode(class, index)) => {
                self.push_frame(class, index, args)?;
                Ok(Flow::Next)
            }
            Some(Target::Intrinsic(owner)) => {
                self.charge(CostCategory::Invocation)?;
                self.complete_intrinsic(&owner, member, args)
            }
            None => Ok(Flow::Throw(self.exception("rt/NoSuchMethodError", &member.to_string()))),
        }
    }

    fn complete_intrinsic(&mut self, owner: &str, member: &MemberRef, args: Vec<Value>) -> Result<Flow, RuntimeError> {
        match self.call_intrinsic(owner, member, args)? {
            Completion::Value(value) => {
                if let Some(value) = value {
                    self.push(value)?;
                }
                Ok(Flow::Next)
            }
            Completion::Thrown(exception) => Ok(Flow::Throw(exception)),
        }
    }

    /// Walk the superclass chain from `start` to the first class that
    /// implements the method. Host-library classes end the walk.
    fn resolve_method(&mut self, start: &str, name: &str, descriptor: &str) -> Result<Option<Target>, RuntimeError> {
        let mut current = start.to_string();
        for _ in 0..MAX_HIERARCHY_DEPTH {
            if is_intrinsic_class(&current) {
                return Ok(Some(Target::Intrinsic(current)));
            }
            let class = self.load(&current)?;
            let found = class
                .descriptor()
                .methods
                .iter()
                .position(|m| m.name == name && m.descriptor == descriptor && m.code.is_some());
            if let Some(index) = found {
                return Ok(Some(Target::Bytecode(class, index)));
            }
            match &class.descriptor().super_name {
                Some(super_name) => current = super_name.clone(),
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Whether `value` is an instance of `target` (by runtime name).
    pub fn is_instance(&mut self, value: &Value, target: &str) -> bool {
        let Some(mut current) = value.class_name().map(|n| n.to_string()) else {
            return false;
        };
        for _ in 0..MAX_HIERARCHY_DEPTH {
            if current == target {
                return true;
            }
            let next = if is_intrinsic_class(&current) {
                intrinsic_super(&current).map(str::to_string)
            } else {
                self.load(&current).ok().and_then(|c| c.descriptor().super_name.clone())
            };
            match next {
                Some(next) => current = next,
                None => return false,
            }
        }
        false
    }

    /// Find a handler for `exception`, popping frames that have none.
    /// Returns the exception once every frame above `base` is gone.
    fn unwind(&mut self, base: usize, exception: Value) -> Result<(), RuntimeError> {
        while self.frames.len() > base {
            let (class, method, fault_pc) = {
                let frame = self.frame()?;
                (frame.class.clone(), frame.method, frame.pc.saturating_sub(1) as u32)
            };
            let handlers = class
                .descriptor()
                .methods
                .get(method)
                .and_then(|m| m.code.as_ref())
                .map(|c| c.handlers.as_slice())
                .unwrap_or(&[]);
            let mut target = None;
            for handler in handlers {
                if handler.start > fault_pc || fault_pc >= handler.end {
                    continue;
                }
                let matches = match &handler.catch_type {
                    None => true,
                    Some(catch_type) => self.is_instance(&exception, catch_type),
                };
                if matches {
                    target = Some(handler.handler as usize);
                    break;
                }
            }
            if let Some(handler) = target {
                let frame = self.frame()?;
                frame.stack.clear();
                frame.stack.push(exception);
                frame.pc = handler;
                return Ok(());
            }
            self.frames.pop();
        }
        Err(RuntimeError::Thrown(exception))
    }

    fn push_frame(&mut self, class: Arc<LoadedClass>, method: usize, args: Vec<Value>) -> Result<(), RuntimeError> {
        let max_locals = class
            .descriptor()
            .methods
            .get(method)
            .and_then(|m| m.code.as_ref())
            .map(|c| usize::from(c.max_locals))
            .ok_or_else(|| verify(&class, "invoked method has no code"))?;
        let mut locals = vec![Value::Null; max_locals.max(args.len())];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = arg;
        }
        self.frames.push(Frame { class, method, pc: 0, locals, stack: Vec::new() });
        Ok(())
    }

    fn frame(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeError::Verify("no active frame".to_string()))
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.frame()?.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.frame()?
            .stack
            .pop()
            .ok_or_else(|| RuntimeError::Verify("operand stack underflow".to_string()))
    }

    /// Pop `n` values, returned in push order.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let stack = &mut self.frame()?.stack;
        if stack.len() < n {
            return Err(RuntimeError::Verify("operand stack underflow".to_string()));
        }
        Ok(stack.split_off(stack.len() - n))
    }
}

fn verify(class: &LoadedClass, reason: &str) -> RuntimeError {
    RuntimeError::Verify(format!("{}: {}", class.original_name(), reason))
}
