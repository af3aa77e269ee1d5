//! Task invocation across the sandbox boundary.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::classfile::access;
use crate::classfile::descriptor::{display_name, method_shape};
use crate::hierarchy::{HierarchyError, LoadError, LoadedClass, SandboxNode};
use crate::runtime::{Interpreter, RuntimeError, Value};
use crate::telemetry::{record_invocation, InvocationSpan, SpanExt};

use super::marshal::{to_host, to_sandbox};
use super::summary::{ExecutionFailure, ExecutionSummary, HostValue};

/// Name of the single method a task class exposes.
pub const TASK_METHOD: &str = "apply";

/// Ways a run can stop: a reportable failure, or hierarchy misuse that
/// escapes the bridge.
enum Interrupted {
    Failed(ExecutionFailure),
    Hierarchy(HierarchyError),
}

impl From<ExecutionFailure> for Interrupted {
    fn from(failure: ExecutionFailure) -> Self {
        Self::Failed(failure)
    }
}

/// Run the task class `entry` in `node` on `input`.
///
/// Every failure of the task itself is reported in the summary. Only a
/// destroyed node (or ancestor) is returned as an error.
pub fn invoke(node: &SandboxNode, entry: &str, input: &HostValue) -> Result<ExecutionSummary, HierarchyError> {
    node.ensure_alive()?;

    let span = InvocationSpan::new(&node.id().to_string(), entry);
    let _guard = span.enter();

    let mut interpreter = Interpreter::new(node);
    let outcome = run_task(&mut interpreter, entry, input);
    let costs = interpreter.costs();
    span.record("cost_total", costs.total);

    let result = match outcome {
        Ok(value) => Ok(value),
        Err(Interrupted::Failed(failure)) => Err(failure),
        Err(Interrupted::Hierarchy(err)) => {
            span.record_result::<(), _>(&Err(&err));
            record_invocation("node_destroyed", costs.total);
            return Err(err);
        }
    };

    span.record_result(&result);
    match &result {
        Ok(_) => {
            debug!(entry = %entry, cost = costs.total, "Task completed");
            record_invocation("ok", costs.total);
        }
        Err(failure) => {
            if failure.is_security_concern() {
                warn!(entry = %entry, kind = failure.kind(), error = %failure, "Task stopped by sandbox");
            } else {
                debug!(entry = %entry, kind = failure.kind(), error = %failure, "Task failed");
            }
            record_invocation(failure.kind(), costs.total);
        }
    }
    Ok(ExecutionSummary { result, costs })
}

fn run_task(interpreter: &mut Interpreter<'_>, entry: &str, input: &HostValue) -> Result<HostValue, Interrupted> {
    let class = interpreter.load(entry).map_err(interrupted)?;
    let method = task_method(&class)?;

    let argument = to_sandbox(interpreter, input)?;

    let task = interpreter.instantiate(&class).map_err(interrupted)?;
    if let Some(init) = class.descriptor().find_method_index("<init>", "()V") {
        interpreter
            .invoke_method(class.clone(), init, vec![task.clone()])
            .map_err(interrupted)?;
    }

    let returned = interpreter
        .invoke_method(class, method, vec![task, argument])
        .map_err(interrupted)?;
    Ok(to_host(&returned.unwrap_or(Value::Null))?)
}

/// Index of the task method, checked before anything is marshaled.
fn task_method(class: &Arc<LoadedClass>) -> Result<usize, ExecutionFailure> {
    let descriptor = class.descriptor();
    let not_a_task = |reason: &str| ExecutionFailure::NotATask {
        class: display_name(class.original_name()),
        reason: reason.to_string(),
    };

    if descriptor.is_interface() || descriptor.access & access::ABSTRACT != 0 {
        return Err(not_a_task("class cannot be instantiated"));
    }

    let candidates: Vec<usize> = descriptor
        .methods
        .iter()
        .enumerate()
        .filter(|(_, m)| m.name == TASK_METHOD && !m.is_static() && !m.is_synthetic())
        .map(|(index, _)| index)
        .collect();
    let index = match candidates.as_slice() {
        [] => return Err(not_a_task("no instance method named apply")),
        [index] => *index,
        _ => return Err(not_a_task("apply is overloaded")),
    };

    let method = &descriptor.methods[index];
    if method.is_abstract() || method.code.is_none() {
        return Err(not_a_task("apply has no body"));
    }
    match method_shape(&method.descriptor) {
        Some(shape) if shape.params == 1 && shape.returns_value => Ok(index),
        _ => Err(not_a_task("apply must take one argument and return a value")),
    }
}

fn interrupted(err: RuntimeError) -> Interrupted {
    match err {
        RuntimeError::Thrown(exception) => Interrupted::Failed(fault(&exception)),
        RuntimeError::CostExceeded(violation) => Interrupted::Failed(ExecutionFailure::CostBudgetExceeded {
            counter: violation.counter,
            value: violation.value,
            threshold: violation.threshold,
        }),
        RuntimeError::StackDepthExceeded { depth, limit } => {
            Interrupted::Failed(ExecutionFailure::StackDepthExceeded { depth, limit })
        }
        RuntimeError::RuleViolation(reason) => Interrupted::Failed(ExecutionFailure::RuleViolation { reason }),
        RuntimeError::Load(err) => load_failure(err),
        RuntimeError::Verify(reason) => Interrupted::Failed(ExecutionFailure::SandboxedFault {
            exception: "rt.VerifyError".to_string(),
            message: Some(reason),
        }),
    }
}

fn load_failure(err: LoadError) -> Interrupted {
    let failure = match err {
        LoadError::NotFound(class) | LoadError::Resolve { class, .. } => {
            ExecutionFailure::ClassNotFound { class: display_name(&class) }
        }
        LoadError::Malformed { class, source } => ExecutionFailure::MalformedClass {
            class: display_name(&class),
            reason: source.to_string(),
        },
        LoadError::RuleViolation { reason, .. } => ExecutionFailure::RuleViolation { reason },
        LoadError::Rewrite { class, reason } => ExecutionFailure::RewriteError {
            class: display_name(&class),
            reason,
        },
        LoadError::Hierarchy(err) => return Interrupted::Hierarchy(err),
    };
    Interrupted::Failed(failure)
}

/// Report an uncaught sandboxed exception under its host-facing name.
fn fault(exception: &Value) -> ExecutionFailure {
    let Value::Object(object) = exception else {
        return ExecutionFailure::SandboxedFault { exception: exception.to_string(), message: None };
    };
    let object = object.borrow();
    let name = match &object.class {
        Some(class) => class.original_name().to_string(),
        None => object.class_name.to_string(),
    };
    let message = match object.field("message") {
        Some(Value::Str(message)) => Some(message.to_string()),
        _ => None,
    };
    ExecutionFailure::SandboxedFault { exception: display_name(&name), message }
}
