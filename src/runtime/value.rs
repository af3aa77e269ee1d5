//! Interpreter values and heap objects.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::hierarchy::LoadedClass;

pub type ObjectRef = Rc<RefCell<Object>>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Str(Rc<str>),
    /// Class literal, by runtime internal name.
    Class(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    pub fn object(object: Object) -> Self {
        Self::Object(Rc::new(RefCell::new(object)))
    }

    /// Zero value for a field descriptor.
    pub fn default_for(descriptor: &str) -> Self {
        match descriptor.as_bytes().first() {
            Some(b'J') | Some(b'I') => Self::Long(0),
            Some(b'Z') => Self::Bool(false),
            Some(b'D') => Self::Double(0.0),
            _ => Self::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime class name of a non-null value.
    pub fn class_name(&self) -> Option<Rc<str>> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(Rc::from("rt/Boolean")),
            Self::Long(_) => Some(Rc::from("rt/Long")),
            Self::Double(_) => Some(Rc::from("rt/Double")),
            Self::Str(_) => Some(Rc::from("rt/String")),
            Self::Class(_) => Some(Rc::from("rt/Class")),
            Self::Object(obj) => Some(obj.borrow().class_name.clone()),
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Reference identity for objects, value equality for everything else.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Class(a), Self::Class(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Str(s) => write!(f, "{}", s),
            Self::Class(name) => write!(f, "class {}", name.replace('/', ".")),
            Self::Object(obj) => {
                let obj = obj.borrow();
                write!(f, "{}@{:x}", obj.class_name.replace('/', "."), obj.id)
            }
        }
    }
}

/// A heap object. Objects of host runtime classes (`rt/...`) have no
/// loaded class behind them.
#[derive(Debug)]
pub struct Object {
    pub class_name: Rc<str>,
    pub class: Option<Arc<LoadedClass>>,
    pub fields: BTreeMap<String, Value>,
    /// Allocation sequence number within the invocation.
    pub id: u64,
    /// Identity hash, assigned on first request.
    pub hash: Cell<Option<i64>>,
}

impl Object {
    pub fn new(class_name: &str, class: Option<Arc<LoadedClass>>, id: u64) -> Self {
        Self {
            class_name: Rc::from(class_name),
            class,
            fields: BTreeMap::new(),
            id,
            hash: Cell::new(None),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert!(matches!(Value::default_for("J"), Value::Long(0)));
        assert!(matches!(Value::default_for("Z"), Value::Bool(false)));
        assert!(Value::default_for("Lrt/String;").is_null());
    }

    #[test]
    fn test_identity() {
        let a = Value::object(Object::new("rt/Object", None, 1));
        let b = Value::object(Object::new("rt/Object", None, 1));
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert!(Value::str("x").same(&Value::str("x")));
    }
}
