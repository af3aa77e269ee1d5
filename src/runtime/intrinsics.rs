//! Host runtime library (`rt/...`) implemented natively.
//!
//! `rt/Sandbox` holds the deterministic replacements the standard fixups
//! redirect to. The original `rt/System` and `rt/Random` members still
//! behave like the host would, so code rewritten without fixups is visibly
//! non-deterministic.

use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::classfile::descriptor::{display_name, simple_name};
use crate::classfile::MemberRef;
use crate::reflect;
use crate::rules::FixupAction;
use crate::telemetry::{log_security_event, SecurityEvent};

use super::cost::CostCategory;
use super::interpreter::{Completion, Interpreter};
use super::locale::{LocaleTag, ISO_COUNTRIES, ISO_LANGUAGES};
use super::value::{Object, Value};
use super::RuntimeError;

pub fn is_intrinsic_class(name: &str) -> bool {
    name.starts_with("rt/")
}

/// Superclass of a host-library class. Unknown `rt/` classes extend
/// `rt/Object`.
pub fn intrinsic_super(name: &str) -> Option<&'static str> {
    match name {
        "rt/Object" => None,
        "rt/Throwable" => Some("rt/Object"),
        "rt/Exception" | "rt/Error" => Some("rt/Throwable"),
        "rt/RuntimeException" => Some("rt/Exception"),
        "rt/ArithmeticException"
        | "rt/NullPointerException"
        | "rt/ClassCastException"
        | "rt/IllegalArgumentException"
        | "rt/IllegalStateException"
        | "rt/UnsupportedOperationException" => Some("rt/RuntimeException"),
        "rt/LinkageError" => Some("rt/Error"),
        "rt/NoSuchMethodError" | "rt/NoSuchFieldError" | "rt/InstantiationError" => {
            Some("rt/LinkageError")
        }
        _ => Some("rt/Object"),
    }
}

pub fn is_throwable_class(name: &str) -> bool {
    let mut current = Some(name);
    while let Some(class) = current {
        if class == "rt/Throwable" {
            return true;
        }
        current = intrinsic_super(class);
    }
    false
}

fn arg(args: &[Value], index: usize) -> Result<&Value, RuntimeError> {
    args.get(index)
        .ok_or_else(|| RuntimeError::Verify("missing intrinsic argument".to_string()))
}

fn string(value: &Value) -> Result<Rc<str>, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(RuntimeError::Verify(format!("expected a string, found {}", other))),
    }
}

fn long(value: &Value) -> Result<i64, RuntimeError> {
    value
        .as_long()
        .ok_or_else(|| RuntimeError::Verify(format!("expected a long, found {}", value)))
}

/// FNV-1a, for content-derived hashes of immutable values.
fn content_hash(bytes: &[u8]) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as i64
}

fn locale_field(value: &Value, name: &str) -> Value {
    match value {
        Value::Object(object) => object.borrow().field(name).cloned().unwrap_or_else(|| Value::str("")),
        _ => Value::str(""),
    }
}

fn host_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Bytes of string data covered by one allocation unit.
const STRING_CHUNK_BYTES: usize = 64;

fn string_units(len: usize) -> u64 {
    1 + (len / STRING_CHUNK_BYTES) as u64
}

fn returns(value: Value) -> Completion {
    Completion::Value(Some(value))
}

impl<'n> Interpreter<'n> {
    /// Call a host-library member, searching `owner` and its superclasses.
    ///
    /// Fixups apply to the class that declares the member, so a call that
    /// only reaches `rt/Object.hashCode` by inheritance is redirected the
    /// same way as a direct one.
    pub(super) fn call_intrinsic(
        &mut self,
        owner: &str,
        member: &MemberRef,
        args: Vec<Value>,
    ) -> Result<Completion, RuntimeError> {
        let node = self.node;
        let mut current = Some(owner);
        while let Some(class) = current {
            let declared = MemberRef::new(class, &member.name, &member.descriptor);
            if let Some(rule) = node.config().fixups.find(&declared) {
                return self.apply_fixup(&rule.action, &declared, &args);
            }
            if let Some(done) = self.intrinsic_member(class, &member.name, &member.descriptor, &args)? {
                return Ok(done);
            }
            current = intrinsic_super(class);
        }
        Ok(Completion::Thrown(self.exception("rt/NoSuchMethodError", &member.to_string())))
    }

    fn apply_fixup(
        &mut self,
        action: &FixupAction,
        declared: &MemberRef,
        args: &[Value],
    ) -> Result<Completion, RuntimeError> {
        match action {
            FixupAction::Replace { owner, name, descriptor } => {
                match self.intrinsic_member(owner, name, descriptor, args)? {
                    Some(done) => Ok(done),
                    None => {
                        let target = MemberRef::new(owner, name, descriptor);
                        Ok(Completion::Thrown(self.exception("rt/NoSuchMethodError", &target.to_string())))
                    }
                }
            }
            FixupAction::Reject { reason } => {
                let member = declared.to_string();
                log_security_event(SecurityEvent::RuleViolationTrap, reason, &[("member", member.as_str())]);
                Err(RuntimeError::RuleViolation(format!("{}: {}", reason, member)))
            }
            FixupAction::Trap { message } => {
                let member = declared.to_string();
                log_security_event(SecurityEvent::RuleViolationTrap, message, &[("member", member.as_str())]);
                Err(RuntimeError::RuleViolation(message.clone()))
            }
        }
    }

    /// Charge for a string of `len` bytes before it is built.
    fn charge_string(&mut self, len: usize) -> Result<(), RuntimeError> {
        self.charge_units(CostCategory::Allocation, string_units(len))
    }

    fn returns_string(&mut self, text: String) -> Result<Completion, RuntimeError> {
        self.charge_string(text.len())?;
        Ok(returns(Value::str(&text)))
    }

    fn intrinsic_member(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Completion>, RuntimeError> {
        let done = match (class, name, descriptor) {
            ("rt/Object", "<init>", "()V") => Completion::Value(None),
            ("rt/Object", "equals", "(Lrt/Object;)Z") => {
                returns(Value::Bool(arg(args, 0)?.same(arg(args, 1)?)))
            }
            ("rt/Object", "toString", "()Lrt/String;") => self.returns_string(arg(args, 0)?.to_string())?,
            ("rt/Object", "hashCode", "()J") => returns(Value::Long(self.host_identity_hash(arg(args, 0)?))),
            ("rt/Object", "getClass", "()Lrt/Class;") => {
                let class_name = arg(args, 0)?.class_name().unwrap_or_else(|| Rc::from("rt/Object"));
                returns(Value::Class(class_name))
            }

            ("rt/Throwable", "<init>", "()V") => Completion::Value(None),
            ("rt/Throwable", "<init>", "(Lrt/String;)V") => {
                if let Value::Object(object) = arg(args, 0)? {
                    object
                        .borrow_mut()
                        .fields
                        .insert("message".to_string(), arg(args, 1)?.clone());
                }
                Completion::Value(None)
            }
            ("rt/Throwable", "getMessage", "()Lrt/String;") => {
                let message = match arg(args, 0)? {
                    Value::Object(object) => object.borrow().field("message").cloned().unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                returns(message)
            }

            ("rt/String", "length", "()J") => {
                returns(Value::Long(string(arg(args, 0)?)?.chars().count() as i64))
            }
            ("rt/String", "concat", "(Lrt/String;)Lrt/String;") => match arg(args, 1)? {
                Value::Null => Completion::Thrown(self.exception("rt/NullPointerException", "concat(null)")),
                other => {
                    let (head, tail) = (string(arg(args, 0)?)?, string(other)?);
                    self.charge_string(head.len() + tail.len())?;
                    let mut joined = String::with_capacity(head.len() + tail.len());
                    joined.push_str(&head);
                    joined.push_str(&tail);
                    returns(Value::str(&joined))
                }
            },
            ("rt/String", "equals", "(Lrt/Object;)Z") => {
                returns(Value::Bool(arg(args, 0)?.same(arg(args, 1)?)))
            }
            ("rt/String", "hashCode", "()J") => {
                returns(Value::Long(content_hash(string(arg(args, 0)?)?.as_bytes())))
            }
            ("rt/String", "intern", "()Lrt/String;") => returns(arg(args, 0)?.clone()),
            ("rt/String", "valueOf", _) if descriptor.ends_with(")Lrt/String;") => {
                self.returns_string(arg(args, 0)?.to_string())?
            }

            ("rt/Math", "multiplyExact", "(JJ)J") => {
                self.exact(long(arg(args, 0)?)?.checked_mul(long(arg(args, 1)?)?))
            }
            ("rt/Math", "addExact", "(JJ)J") => {
                self.exact(long(arg(args, 0)?)?.checked_add(long(arg(args, 1)?)?))
            }
            ("rt/Math", "subtractExact", "(JJ)J") => {
                self.exact(long(arg(args, 0)?)?.checked_sub(long(arg(args, 1)?)?))
            }
            ("rt/Math", "abs", "(J)J") => returns(Value::Long(long(arg(args, 0)?)?.wrapping_abs())),
            ("rt/Math", "max", "(JJ)J") => returns(Value::Long(long(arg(args, 0)?)?.max(long(arg(args, 1)?)?))),
            ("rt/Math", "min", "(JJ)J") => returns(Value::Long(long(arg(args, 0)?)?.min(long(arg(args, 1)?)?))),

            ("rt/System", "currentTimeMillis", "()J") => returns(Value::Long(host_millis())),
            ("rt/System", "nanoTime", "()J") => returns(Value::Long(host_millis().wrapping_mul(1_000_000))),
            ("rt/System", "identityHashCode", "(Lrt/Object;)J") => {
                returns(Value::Long(self.host_identity_hash(arg(args, 0)?)))
            }
            ("rt/Random", "<init>", "()V") => Completion::Value(None),
            ("rt/Random", "nextLong", "()J") => returns(Value::Long(rand::random::<i64>())),

            ("rt/Sandbox", "currentTimeMillis", "()J") | ("rt/Sandbox", "nanoTime", "()J") => {
                returns(Value::Long(0))
            }
            ("rt/Sandbox", "nextLong", "(Lrt/Random;)J") => returns(Value::Long(self.context.next_random())),
            ("rt/Sandbox", "hashCode", "(Lrt/Object;)J") => {
                returns(Value::Long(self.sandbox_hash(arg(args, 0)?)))
            }
            ("rt/Sandbox", "intern", "(Lrt/String;)Lrt/String;") => match arg(args, 0)? {
                Value::Str(s) => returns(Value::Str(self.context.intern(s))),
                other => returns(other.clone()),
            },

            ("rt/Locale", "forLanguageTag", "(Lrt/String;)Lrt/Locale;") => match arg(args, 0)? {
                Value::Null => Completion::Thrown(self.exception("rt/NullPointerException", "forLanguageTag(null)")),
                tag => {
                    let parsed = LocaleTag::parse(&string(tag)?);
                    returns(self.locale(parsed))
                }
            },
            ("rt/Locale", "getDefault", "()Lrt/Locale;") => returns(self.locale(LocaleTag::default_locale())),
            ("rt/Locale", "getLanguage", "()Lrt/String;") => returns(locale_field(arg(args, 0)?, "language")),
            ("rt/Locale", "getCountry", "()Lrt/String;") => returns(locale_field(arg(args, 0)?, "country")),
            ("rt/Locale", "toString", "()Lrt/String;") => {
                let tag = LocaleTag {
                    language: locale_field(arg(args, 0)?, "language").to_string(),
                    country: locale_field(arg(args, 0)?, "country").to_string(),
                };
                self.returns_string(tag.to_string())?
            }
            // No arrays in the sandbox, so the ISO tables come back comma-separated.
            ("rt/Locale", "getISOLanguages", "()Lrt/String;") => self.returns_string(ISO_LANGUAGES.join(","))?,
            ("rt/Locale", "getISOCountries", "()Lrt/String;") => self.returns_string(ISO_COUNTRIES.join(","))?,

            ("rt/Class", "getName", "()Lrt/String;") => {
                let name = display_name(&self.class_literal(arg(args, 0)?)?);
                self.returns_string(name)?
            }
            ("rt/Class", "getSimpleName", "()Lrt/String;") => {
                returns(Value::str(simple_name(&self.class_literal(arg(args, 0)?)?)))
            }
            ("rt/Class", "getAnnotation", "(Lrt/Class;)Lrt/String;") => {
                let target = self.class_literal(arg(args, 0)?)?;
                let annotation_type = self.class_literal(arg(args, 1)?)?;
                returns(self.annotation_of(&target, &annotation_type)?)
            }

            _ => return Ok(None),
        };
        Ok(Some(done))
    }

    fn locale(&mut self, tag: LocaleTag) -> Value {
        let mut object = Object::new("rt/Locale", None, self.context.next_object_id());
        object.fields.insert("language".to_string(), Value::str(&tag.language));
        object.fields.insert("country".to_string(), Value::str(&tag.country));
        Value::object(object)
    }

    fn exact(&mut self, result: Option<i64>) -> Completion {
        match result {
            Some(v) => returns(Value::Long(v)),
            None => Completion::Thrown(self.exception("rt/ArithmeticException", "long overflow")),
        }
    }

    fn class_literal(&self, value: &Value) -> Result<Rc<str>, RuntimeError> {
        match value {
            Value::Class(name) => Ok(name.clone()),
            other => Err(RuntimeError::Verify(format!("expected a class, found {}", other))),
        }
    }

    /// Rendered annotation from the stitched view, or null.
    fn annotation_of(&mut self, target: &str, annotation_type: &str) -> Result<Value, RuntimeError> {
        if is_intrinsic_class(target) {
            return Ok(Value::Null);
        }
        let class = self.load(target)?;
        let found = reflect::find_annotation(self.node, &class.descriptor().annotations, annotation_type);
        Ok(found.map(|entry| Value::str(&entry.to_string())).unwrap_or(Value::Null))
    }

    /// Identity hash as the host would hand it out: random per object.
    fn host_identity_hash(&mut self, value: &Value) -> i64 {
        match value {
            Value::Object(object) => {
                let object = object.borrow();
                match object.hash.get() {
                    Some(hash) => hash,
                    None => {
                        let hash = i64::from(rand::random::<i32>());
                        object.hash.set(Some(hash));
                        hash
                    }
                }
            }
            other => self.value_hash(other),
        }
    }

    /// Deterministic identity hash: sequential per invocation.
    fn sandbox_hash(&mut self, value: &Value) -> i64 {
        match value {
            Value::Object(object) => {
                let object = object.borrow();
                match object.hash.get() {
                    Some(hash) => hash,
                    None => {
                        let hash = self.context.next_hash();
                        object.hash.set(Some(hash));
                        hash
                    }
                }
            }
            other => self.value_hash(other),
        }
    }

    fn value_hash(&self, value: &Value) -> i64 {
        match value {
            Value::Null => 0,
            Value::Bool(true) => 1231,
            Value::Bool(false) => 1237,
            Value::Long(v) => *v,
            Value::Double(v) => v.to_bits() as i64,
            Value::Str(s) | Value::Class(s) => content_hash(s.as_bytes()),
            Value::Object(object) => object.borrow().id as i64,
        }
    }
}
