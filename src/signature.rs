use anyhow::{Context, Result, bail};

use crate::atype::PrimitiveKind;

/// A JVM field type signature; plain descriptors parse as the erased subset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TypeSig {
    Base(PrimitiveKind),
    Void,
    /// Internal name with `$` between nested segments; arguments of the last segment.
    Class {
        name: String,
        args: Vec<TypeArgSig>,
    },
    TypeVar(String),
    Array(Box<TypeSig>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TypeArgSig {
    Any,
    Extends(TypeSig),
    Super(TypeSig),
    Exact(TypeSig),
}

/// A formal type parameter. `bounds` is empty when only `Object` bounds it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TypeParamSig {
    pub(crate) name: String,
    pub(crate) bounds: Vec<TypeSig>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ClassSig {
    pub(crate) type_params: Vec<TypeParamSig>,
    pub(crate) superclass: Option<TypeSig>,
    pub(crate) interfaces: Vec<TypeSig>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MethodSig {
    pub(crate) type_params: Vec<TypeParamSig>,
    pub(crate) params: Vec<TypeSig>,
    pub(crate) ret: TypeSig,
}

impl TypeSig {
    pub(crate) fn class(name: &str) -> Self {
        TypeSig::Class {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Erased internal name of a class type.
    pub(crate) fn class_name(&self) -> Option<&str> {
        match self {
            TypeSig::Class { name, .. } => Some(name),
            _ => None,
        }
    }
}

pub(crate) fn parse_field_signature(signature: &str) -> Result<TypeSig> {
    let mut cursor = Cursor::new(signature);
    let ty = cursor
        .type_sig()
        .with_context(|| format!("parse field signature {signature}"))?;
    cursor.expect_end(signature)?;
    Ok(ty)
}

pub(crate) fn parse_method_signature(signature: &str) -> Result<MethodSig> {
    let mut cursor = Cursor::new(signature);
    let parsed = (|| -> Result<MethodSig> {
        let type_params = cursor.type_params()?;
        cursor.expect(b'(')?;
        let mut params = Vec::new();
        while cursor.peek() != Some(b')') {
            params.push(cursor.type_sig()?);
        }
        cursor.expect(b')')?;
        let ret = if cursor.peek() == Some(b'V') {
            cursor.pos += 1;
            TypeSig::Void
        } else {
            cursor.type_sig()?
        };
        while cursor.peek() == Some(b'^') {
            cursor.pos += 1;
            cursor.type_sig()?;
        }
        Ok(MethodSig {
            type_params,
            params,
            ret,
        })
    })()
    .with_context(|| format!("parse method signature {signature}"))?;
    cursor.expect_end(signature)?;
    Ok(parsed)
}

pub(crate) fn parse_class_signature(signature: &str) -> Result<ClassSig> {
    let mut cursor = Cursor::new(signature);
    let parsed = (|| -> Result<ClassSig> {
        let type_params = cursor.type_params()?;
        let superclass = cursor.type_sig()?;
        let mut interfaces = Vec::new();
        while cursor.peek().is_some() {
            interfaces.push(cursor.type_sig()?);
        }
        Ok(ClassSig {
            type_params,
            superclass: Some(superclass),
            interfaces,
        })
    })()
    .with_context(|| format!("parse class signature {signature}"))?;
    Ok(parsed)
}

/// Best-effort canonical name for an internal name without `InnerClasses` information.
pub(crate) fn canonical_name(internal: &str) -> String {
    internal.replace(['/', '$'], ".")
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<u8> {
        let byte = self.peek().context("unexpected end of signature")?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        let found = self.next()?;
        if found != expected {
            bail!(
                "expected '{}' at {} but found '{}'",
                expected as char,
                self.pos - 1,
                found as char
            );
        }
        Ok(())
    }

    fn expect_end(&self, signature: &str) -> Result<()> {
        if self.pos != self.bytes.len() {
            bail!("trailing characters in signature {signature}");
        }
        Ok(())
    }

    fn identifier(&mut self, stops: &[u8]) -> Result<String> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if stops.contains(&byte) {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            bail!("empty identifier at {start}");
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn type_params(&mut self) -> Result<Vec<TypeParamSig>> {
        let mut params = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(params);
        }
        self.pos += 1;
        while self.peek() != Some(b'>') {
            let name = self.identifier(b":")?;
            let mut bounds = Vec::new();
            while self.peek() == Some(b':') {
                self.pos += 1;
                if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                    bounds.push(self.type_sig()?);
                }
            }
            params.push(TypeParamSig { name, bounds });
        }
        self.expect(b'>')?;
        Ok(params)
    }

    fn type_sig(&mut self) -> Result<TypeSig> {
        let tag = self.next()?;
        if let Some(primitive) = PrimitiveKind::from_descriptor(tag as char) {
            return Ok(TypeSig::Base(primitive));
        }
        match tag {
            b'V' => Ok(TypeSig::Void),
            b'[' => Ok(TypeSig::Array(Box::new(self.type_sig()?))),
            b'T' => {
                let name = self.identifier(b";")?;
                self.expect(b';')?;
                Ok(TypeSig::TypeVar(name))
            }
            b'L' => self.class_type(),
            other => bail!("unexpected signature tag '{}'", other as char),
        }
    }

    fn class_type(&mut self) -> Result<TypeSig> {
        let mut name = self.identifier(b"<.;")?;
        let mut args = self.type_args()?;
        while self.peek() == Some(b'.') {
            self.pos += 1;
            let inner = self.identifier(b"<.;")?;
            name.push('$');
            name.push_str(&inner);
            args = self.type_args()?;
        }
        self.expect(b';')?;
        Ok(TypeSig::Class { name, args })
    }

    fn type_args(&mut self) -> Result<Vec<TypeArgSig>> {
        let mut args = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(args);
        }
        self.pos += 1;
        while self.peek() != Some(b'>') {
            let arg = match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    TypeArgSig::Any
                }
                Some(b'+') => {
                    self.pos += 1;
                    TypeArgSig::Extends(self.type_sig()?)
                }
                Some(b'-') => {
                    self.pos += 1;
                    TypeArgSig::Super(self.type_sig()?)
                }
                _ => TypeArgSig::Exact(self.type_sig()?),
            };
            args.push(arg);
        }
        self.expect(b'>')?;
        Ok(args)
    }
}
