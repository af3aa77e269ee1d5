//! Type descriptors and generic signatures.
//!
//! Descriptors use the JVM grammar: `Z` boolean, `J` long, `I` int, `D` double,
//! `Lpkg/Name;` references, `[` arrays, `V` void returns. Generic signatures
//! add type parameters, type variables (`TT;`) and type arguments.

/// Error from a remapping pass: either the input was malformed or the mapper
/// rejected a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapError<E> {
    Malformed(String),
    Rejected(E),
}

/// Parameter count and return kind of a method descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodShape {
    pub params: usize,
    pub returns_value: bool,
}

/// `com/acme/Widget` style names: non-empty segments, no descriptor punctuation.
pub fn is_valid_internal_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('/')
            .all(|seg| !seg.is_empty() && !seg.contains(['.', ';', '[', '<', '>', ':']))
}

pub fn is_valid_field_descriptor(desc: &str) -> bool {
    let bytes = desc.as_bytes();
    matches!(field_type_end(bytes, 0), Some(end) if end == bytes.len())
}

/// Parse a method descriptor `(params)ret`. Returns `None` when malformed.
pub fn method_shape(desc: &str) -> Option<MethodShape> {
    let bytes = desc.as_bytes();
    if bytes.first() != Some(&b'(') {
        return None;
    }
    let mut pos = 1;
    let mut params = 0;
    while *bytes.get(pos)? != b')' {
        pos = field_type_end(bytes, pos)?;
        params += 1;
    }
    pos += 1;
    let returns_value = match bytes.get(pos)? {
        b'V' => {
            pos += 1;
            false
        }
        _ => {
            pos = field_type_end(bytes, pos)?;
            true
        }
    };
    (pos == bytes.len()).then_some(MethodShape { params, returns_value })
}

fn field_type_end(bytes: &[u8], pos: usize) -> Option<usize> {
    match *bytes.get(pos)? {
        b'Z' | b'J' | b'I' | b'D' => Some(pos + 1),
        b'[' => field_type_end(bytes, pos + 1),
        b'L' => {
            let rel = bytes[pos + 1..].iter().position(|&b| b == b';')?;
            let name = std::str::from_utf8(&bytes[pos + 1..pos + 1 + rel]).ok()?;
            is_valid_internal_name(name).then_some(pos + rel + 2)
        }
        _ => None,
    }
}

/// Rewrite every class name inside a field or method descriptor.
pub fn remap_descriptor<E, F>(desc: &str, mut map: F) -> Result<String, RemapError<E>>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..=start]);
        let tail = &rest[start + 1..];
        let end = tail
            .find(';')
            .ok_or_else(|| RemapError::Malformed(desc.to_string()))?;
        out.push_str(&map(&tail[..end]).map_err(RemapError::Rejected)?);
        out.push(';');
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Rewrite every class name inside a generic class, method or field signature.
/// Type variable and inner-class simple names are left untouched.
pub fn remap_signature<E, F>(sig: &str, map: F) -> Result<String, RemapError<E>>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let mut scanner = SignatureScanner { src: sig, pos: 0, out: String::with_capacity(sig.len()), map };
    scanner.run()?;
    Ok(scanner.out)
}

struct SignatureScanner<'a, F> {
    src: &'a str,
    pos: usize,
    out: String,
    map: F,
}

impl<'a, E, F> SignatureScanner<'a, F>
where
    F: FnMut(&str) -> Result<String, E>,
{
    fn run(&mut self) -> Result<(), RemapError<E>> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        while let Some(c) = self.peek() {
            match c {
                b'L' | b'T' => self.reference_type()?,
                b'[' | b'(' | b')' | b'^' | b'Z' | b'J' | b'I' | b'D' | b'V' => self.copy(1),
                _ => return Err(self.malformed()),
            }
        }
        Ok(())
    }

    fn type_parameters(&mut self) -> Result<(), RemapError<E>> {
        self.copy(1);
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.copy(1);
                    return Ok(());
                }
                Some(_) => {
                    let ident = self.until(&[b':'])?;
                    if ident == 0 {
                        return Err(self.malformed());
                    }
                    self.copy(ident);
                    while self.peek() == Some(b':') {
                        self.copy(1);
                        if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                            self.reference_type()?;
                        }
                    }
                }
                None => return Err(self.malformed()),
            }
        }
    }

    fn reference_type(&mut self) -> Result<(), RemapError<E>> {
        match self.peek() {
            Some(b'L') => self.class_type(),
            Some(b'T') => {
                let len = self.until(&[b';'])?;
                self.copy(len + 1);
                Ok(())
            }
            Some(b'[') => {
                self.copy(1);
                match self.peek() {
                    Some(b'Z' | b'J' | b'I' | b'D') => {
                        self.copy(1);
                        Ok(())
                    }
                    _ => self.reference_type(),
                }
            }
            _ => Err(self.malformed()),
        }
    }

    fn class_type(&mut self) -> Result<(), RemapError<E>> {
        self.copy(1);
        let len = self.until(&[b'<', b'.', b';'])?;
        let src = self.src;
        let name = &src[self.pos..self.pos + len];
        let mapped = (self.map)(name).map_err(RemapError::Rejected)?;
        self.out.push_str(&mapped);
        self.pos += len;
        loop {
            match self.peek() {
                Some(b'<') => self.type_arguments()?,
                Some(b'.') => {
                    self.copy(1);
                    let len = self.until(&[b'<', b'.', b';'])?;
                    self.copy(len);
                }
                Some(b';') => {
                    self.copy(1);
                    return Ok(());
                }
                _ => return Err(self.malformed()),
            }
        }
    }

    fn type_arguments(&mut self) -> Result<(), RemapError<E>> {
        self.copy(1);
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.copy(1);
                    return Ok(());
                }
                Some(b'*') => self.copy(1),
                Some(b'+' | b'-') => {
                    self.copy(1);
                    self.reference_type()?;
                }
                Some(_) => self.reference_type()?,
                None => return Err(self.malformed()),
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn copy(&mut self, n: usize) {
        self.out.push_str(&self.src[self.pos..self.pos + n]);
        self.pos += n;
    }

    /// Length up to the first of `stops`; fails if none occurs.
    fn until(&self, stops: &[u8]) -> Result<usize, RemapError<E>> {
        self.src.as_bytes()[self.pos..]
            .iter()
            .position(|b| stops.contains(b))
            .ok_or_else(|| self.malformed())
    }

    fn malformed(&self) -> RemapError<E> {
        RemapError::Malformed(self.src.to_string())
    }
}

/// `com/acme/Widget` -> `com.acme.Widget`.
pub fn display_name(internal: &str) -> String {
    internal.replace('/', ".")
}

/// Last path segment of an internal name.
pub fn simple_name(internal: &str) -> &str {
    internal.rsplit('/').next().unwrap_or(internal)
}
