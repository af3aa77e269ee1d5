//! Moving values across the sandbox boundary.

use std::collections::BTreeMap;

use crate::classfile::descriptor::display_name;
use crate::runtime::{Interpreter, Value};

use super::summary::{ExecutionFailure, HostValue};

/// Object graphs nested deeper than this are refused in either direction.
pub const MAX_MARSHAL_DEPTH: usize = 32;

fn input_error(reason: String) -> ExecutionFailure {
    ExecutionFailure::UnmarshalableInput { reason }
}

fn result_error(reason: String) -> ExecutionFailure {
    ExecutionFailure::UnmarshalableResult { reason }
}

/// Marshal a host value into the interpreter's node. Objects must name a
/// class the node can load; their fields must exist on it and agree with
/// the declared field kind.
pub fn to_sandbox(interpreter: &mut Interpreter<'_>, value: &HostValue) -> Result<Value, ExecutionFailure> {
    to_sandbox_at(interpreter, value, 0)
}

fn to_sandbox_at(interpreter: &mut Interpreter<'_>, value: &HostValue, depth: usize) -> Result<Value, ExecutionFailure> {
    if depth > MAX_MARSHAL_DEPTH {
        return Err(input_error(format!("nesting deeper than {}", MAX_MARSHAL_DEPTH)));
    }
    let value = match value {
        HostValue::Null => Value::Null,
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Long(v) => Value::Long(*v),
        HostValue::Double(v) => Value::Double(*v),
        HostValue::String(s) => Value::str(s),
        HostValue::Object { class, fields } => {
            let loaded = interpreter
                .load(class)
                .map_err(|e| input_error(format!("class {} is not loadable: {}", class, e)))?;
            let instance = interpreter
                .instantiate(&loaded)
                .map_err(|e| input_error(format!("class {} cannot be instantiated: {}", class, e)))?;
            let Value::Object(object) = &instance else {
                return Err(input_error(format!("class {} did not produce an object", class)));
            };
            for (name, field_value) in fields {
                let converted = to_sandbox_at(interpreter, field_value, depth + 1)?;
                let mut object = object.borrow_mut();
                let slot = object
                    .fields
                    .get_mut(name)
                    .ok_or_else(|| input_error(format!("{} has no field {}", class, name)))?;
                if !same_kind(slot, &converted) {
                    return Err(input_error(format!("field {}.{} cannot hold {}", class, name, field_value)));
                }
                *slot = converted;
            }
            instance
        }
    };
    Ok(value)
}

/// Whether `value` may replace a field currently holding its zero value.
fn same_kind(zero: &Value, value: &Value) -> bool {
    matches!(
        (zero, value),
        (Value::Long(_), Value::Long(_))
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Double(_), Value::Double(_))
            | (Value::Null, Value::Null | Value::Str(_) | Value::Object(_))
    )
}

/// Marshal a sandbox value back to the host.
pub fn to_host(value: &Value) -> Result<HostValue, ExecutionFailure> {
    to_host_at(value, 0)
}

fn to_host_at(value: &Value, depth: usize) -> Result<HostValue, ExecutionFailure> {
    if depth > MAX_MARSHAL_DEPTH {
        return Err(result_error(format!("nesting deeper than {}", MAX_MARSHAL_DEPTH)));
    }
    Ok(match value {
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Long(v) => HostValue::Long(*v),
        Value::Double(v) => HostValue::Double(*v),
        Value::Str(s) => HostValue::String(s.to_string()),
        Value::Class(name) => {
            return Err(result_error(format!("class literal {} has no host form", display_name(name))));
        }
        Value::Object(object) => {
            let object = object
                .try_borrow()
                .map_err(|_| result_error("object graph is being mutated".to_string()))?;
            let class = match &object.class {
                Some(loaded) => display_name(loaded.original_name()),
                None => display_name(&object.class_name),
            };
            let mut fields = BTreeMap::new();
            for (name, field) in &object.fields {
                fields.insert(name.clone(), to_host_at(field, depth + 1)?);
            }
            HostValue::Object { class, fields }
        }
    })
}
