use std::collections::BTreeMap;

use crate::ast::{AnnotationExpr, Expr, Position, TypeRef, TypeRefKind};
use crate::classfile::ConstantValue;
use crate::diagnostics::Reporter;
use crate::imports::ImportTable;
use crate::model::{FieldElement, ProgramModel, TypeElement};
use crate::qualifier::{AnnotationValue, MemberType, Qualifier, QualifierDef};

/// Where an annotation-use appears, for resolving unqualified type names.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Scope<'a> {
    pub(crate) package: Option<&'a str>,
    /// Canonical names of the enclosing overlay types, outermost first.
    pub(crate) enclosing: &'a [String],
}

/// Turns annotation-use expressions into qualifiers, caching constant lookups.
pub(crate) struct ValueEvaluator<'m> {
    model: &'m dyn ProgramModel,
    constants: BTreeMap<String, AnnotationValue>,
}

impl<'m> ValueEvaluator<'m> {
    pub(crate) fn new(model: &'m dyn ProgramModel) -> Self {
        Self {
            model,
            constants: BTreeMap::new(),
        }
    }

    /// Evaluate every argument of `expr` against `definition`. Any bad argument
    /// drops the whole annotation-use.
    pub(crate) fn qualifier(
        &mut self,
        expr: &AnnotationExpr,
        definition: &QualifierDef,
        imports: &ImportTable<'m>,
        scope: Scope<'_>,
        reporter: &Reporter<'_>,
    ) -> Option<Qualifier> {
        let mut arguments = BTreeMap::new();
        for argument in &expr.arguments {
            let Some(member) = definition.members.get(&argument.name) else {
                reporter.mismatch(
                    expr.position,
                    format!(
                        "Annotation {} has no element named {}",
                        definition.name, argument.name
                    ),
                );
                return None;
            };
            let mut context = Context {
                evaluator: self,
                imports,
                scope,
                reporter,
            };
            let value = context.evaluate(&argument.value, member)?;
            arguments.insert(argument.name.clone(), value);
        }
        Some(definition.instantiate(arguments))
    }
}

struct Context<'e, 'm, 'a> {
    evaluator: &'e mut ValueEvaluator<'m>,
    imports: &'a ImportTable<'m>,
    scope: Scope<'a>,
    reporter: &'a Reporter<'a>,
}

impl<'m> Context<'_, 'm, '_> {
    fn model(&self) -> &'m dyn ProgramModel {
        self.evaluator.model
    }

    fn evaluate(&mut self, expr: &Expr, member: &MemberType) -> Option<AnnotationValue> {
        if let MemberType::Array(component) = member {
            return match expr {
                Expr::Array { values, .. } => {
                    let mut evaluated = Vec::with_capacity(values.len());
                    for value in values {
                        evaluated.push(self.evaluate(value, component)?);
                    }
                    Some(AnnotationValue::Array(evaluated))
                }
                single => Some(AnnotationValue::Array(vec![self.evaluate(single, component)?])),
            };
        }
        match expr {
            Expr::Array { position, .. } => {
                self.reporter.mismatch(
                    *position,
                    "Array value given for an annotation element that is not an array",
                );
                None
            }
            Expr::Null { position } => {
                self.reporter
                    .unsupported(*position, "Illegal annotation value null");
                None
            }
            Expr::Annotation(annotation) => {
                self.unexpected(annotation.position, &format!("@{}", annotation.name))
            }
            Expr::Binary {
                operator, position, ..
            } => self.unexpected(*position, &format!("binary {operator}")),
            Expr::ClassLiteral { ty, position } => {
                if *member != MemberType::Class {
                    self.reporter.mismatch(
                        *position,
                        format!("Class literal {ty} given for a non-Class annotation element"),
                    );
                    return None;
                }
                self.class_literal(ty, *position).map(AnnotationValue::Class)
            }
            Expr::Name { name, position } => {
                if let MemberType::Enum(owner) = member
                    && !name.contains('.')
                    && let Some(value) = self.enum_constant(owner, name)
                {
                    return Some(value);
                }
                let value = self.constant(name, *position)?;
                self.convert(value, member, *position)
            }
            Expr::Unary {
                operator,
                operand,
                position,
            } => self.unary(*operator, operand, member, *position),
            literal => {
                let value = self.literal(literal, false)?;
                self.convert(value, member, literal.position())
            }
        }
    }

    fn unexpected(&self, position: Position, what: &str) -> Option<AnnotationValue> {
        self.reporter
            .unsupported(position, format!("Unexpected annotation expression: {what}"));
        None
    }

    fn unary(
        &mut self,
        operator: char,
        operand: &Expr,
        member: &MemberType,
        position: Position,
    ) -> Option<AnnotationValue> {
        if operator == '-'
            && matches!(
                operand,
                Expr::Integer { .. } | Expr::Long { .. } | Expr::Float { .. } | Expr::Double { .. }
            )
        {
            let value = self.literal(operand, true)?;
            return self.convert(value, member, position);
        }
        let value = match operand {
            Expr::Name { name, position } => self.constant(name, *position)?,
            Expr::Unary {
                operator,
                operand,
                position,
            } => self.unary(*operator, operand, member, *position)?,
            other => self.literal(other, false)?,
        };
        let result = match (operator, value) {
            ('+', value) => Some(value),
            ('-', AnnotationValue::Int(value)) => Some(AnnotationValue::Int(value.wrapping_neg())),
            ('-', AnnotationValue::Long(value)) => Some(AnnotationValue::Long(value.wrapping_neg())),
            ('-', AnnotationValue::Short(value)) => Some(AnnotationValue::Int(-i32::from(value))),
            ('-', AnnotationValue::Byte(value)) => Some(AnnotationValue::Int(-i32::from(value))),
            ('-', AnnotationValue::Float(value)) => Some(AnnotationValue::Float(-value)),
            ('-', AnnotationValue::Double(value)) => Some(AnnotationValue::Double(-value)),
            ('!', AnnotationValue::Boolean(value)) => Some(AnnotationValue::Boolean(!value)),
            ('~', AnnotationValue::Int(value)) => Some(AnnotationValue::Int(!value)),
            ('~', AnnotationValue::Long(value)) => Some(AnnotationValue::Long(!value)),
            _ => None,
        };
        match result {
            Some(value) => self.convert(value, member, position),
            None => self.unexpected(position, &format!("unary {operator}")),
        }
    }

    fn literal(&self, expr: &Expr, negative: bool) -> Option<AnnotationValue> {
        let value = match expr {
            Expr::Integer { text, .. } => {
                parse_integral(text, negative, 32).map(|value| AnnotationValue::Int(value as i32))
            }
            Expr::Long { text, .. } => {
                parse_integral(text, negative, 64).map(AnnotationValue::Long)
            }
            Expr::Float { text, .. } => text
                .parse::<f32>()
                .ok()
                .map(|value| AnnotationValue::Float(if negative { -value } else { value })),
            Expr::Double { text, .. } => text
                .parse::<f64>()
                .ok()
                .map(|value| AnnotationValue::Double(if negative { -value } else { value })),
            Expr::Char { value, .. } => Some(AnnotationValue::Char(*value)),
            Expr::String { value, .. } => Some(AnnotationValue::String(value.clone())),
            Expr::Boolean { value, .. } => Some(AnnotationValue::Boolean(*value)),
            other => {
                self.unexpected(other.position(), "literal expected");
                return None;
            }
        };
        if value.is_none() {
            self.reporter.mismatch(
                expr.position(),
                "Numeric literal out of range for its type",
            );
        }
        value
    }

    /// Assignment conversion of a constant to the element type.
    fn convert(
        &self,
        value: AnnotationValue,
        member: &MemberType,
        position: Position,
    ) -> Option<AnnotationValue> {
        let converted = match (member, &value) {
            (MemberType::Boolean, AnnotationValue::Boolean(_))
            | (MemberType::String, AnnotationValue::String(_))
            | (MemberType::Class, AnnotationValue::Class(_)) => Some(value.clone()),
            (MemberType::Enum(owner), AnnotationValue::Enum { owner: found, .. })
                if owner == found =>
            {
                Some(value.clone())
            }
            (MemberType::Char, AnnotationValue::Char(_)) => Some(value.clone()),
            (MemberType::Char, other) => integral(other)
                .and_then(|value| char::from_u32(value as u16 as u32))
                .map(AnnotationValue::Char),
            (MemberType::Byte, other) => integral(other).map(|value| AnnotationValue::Byte(value as i8)),
            (MemberType::Short, other) => {
                integral(other).map(|value| AnnotationValue::Short(value as i16))
            }
            (MemberType::Int, other) => integral(other).map(|value| AnnotationValue::Int(value as i32)),
            (MemberType::Long, other) => integral(other).map(AnnotationValue::Long),
            (MemberType::Float, other) => {
                floating(other).map(|value| AnnotationValue::Float(value as f32))
            }
            (MemberType::Double, other) => floating(other).map(AnnotationValue::Double),
            _ => None,
        };
        if converted.is_none() {
            self.reporter.mismatch(
                position,
                format!("Value {value} is not compatible with element type {member:?}"),
            );
        }
        converted
    }

    fn enum_constant(&self, owner: &str, name: &str) -> Option<AnnotationValue> {
        let element = self.model().find_type(owner)?;
        element
            .enum_constants()
            .any(|constant| constant.name == name)
            .then(|| AnnotationValue::Enum {
                owner: element.canonical_name.clone(),
                name: name.to_string(),
            })
    }

    /// Resolve a simple or dotted constant reference.
    fn constant(&mut self, name: &str, position: Position) -> Option<AnnotationValue> {
        let key = format!("{}|{name}", self.scope.package.unwrap_or_default());
        if let Some(value) = self.evaluator.constants.get(&key) {
            return Some(value.clone());
        }
        let value = match name.rsplit_once('.') {
            Some((owner, field)) => {
                let Some(element) = self.find_type_of_name(owner) else {
                    self.reporter.not_found(
                        position,
                        format!("Could not find type {owner} of constant {name}"),
                    );
                    return None;
                };
                let Some(value) = field_value(element, field) else {
                    self.reporter.not_found(
                        position,
                        format!("Static field {field} of {owner} is not a constant"),
                    );
                    return None;
                };
                value
            }
            None => {
                let Some(imported) = self.imports.constant(name) else {
                    self.reporter
                        .not_found(position, format!("Static field {name} is not imported"));
                    return None;
                };
                let value = self
                    .model()
                    .find_type(&imported.owner)
                    .and_then(|element| field_value(element, &imported.name));
                let Some(value) = value else {
                    self.reporter
                        .not_found(position, format!("{name} was imported but not found"));
                    return None;
                };
                value
            }
        };
        self.evaluator.constants.insert(key, value.clone());
        Some(value)
    }

    fn class_literal(&self, ty: &TypeRef, position: Position) -> Option<String> {
        match &ty.kind {
            TypeRefKind::Primitive(primitive) => Some(primitive.keyword().to_string()),
            TypeRefKind::Void => Some("void".to_string()),
            TypeRefKind::Array(component) => self
                .class_literal(component, position)
                .map(|name| format!("{name}[]")),
            TypeRefKind::Class(_) => {
                let name = ty.class_name().unwrap_or_default();
                match self.find_type_of_name(&name) {
                    Some(element) => Some(element.canonical_name.clone()),
                    None => {
                        self.reporter
                            .not_found(position, format!("Could not resolve class literal {name}.class"));
                        None
                    }
                }
            }
            TypeRefKind::Wildcard { .. } => {
                self.unexpected(position, "wildcard class literal");
                None
            }
        }
    }

    /// Imported types, then the name as written, the current package, the
    /// enclosing types (innermost first) and `java.lang`.
    fn find_type_of_name(&self, name: &str) -> Option<&'m TypeElement> {
        let model = self.model();
        let (first, rest) = match name.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        if let Some(imported) = self.imports.imported_type(first) {
            let candidate = match rest {
                Some(rest) => format!("{imported}.{rest}"),
                None => imported.to_string(),
            };
            if let Some(element) = model.find_type(&candidate) {
                return Some(element);
            }
        }
        if let Some(element) = model.find_type(name) {
            return Some(element);
        }
        if let Some(package) = self.scope.package
            && let Some(element) = model.find_type(&format!("{package}.{name}"))
        {
            return Some(element);
        }
        for enclosing in self.scope.enclosing.iter().rev() {
            if let Some(element) = model.find_type(&format!("{enclosing}.{name}")) {
                return Some(element);
            }
        }
        model.find_type(&format!("java.lang.{name}"))
    }
}

fn field_value(element: &TypeElement, name: &str) -> Option<AnnotationValue> {
    let field = element.field(name)?;
    if field.is_enum_constant() {
        return Some(AnnotationValue::Enum {
            owner: element.canonical_name.clone(),
            name: field.name.clone(),
        });
    }
    if !field.is_static() {
        return None;
    }
    constant_value(field)
}

fn constant_value(field: &FieldElement) -> Option<AnnotationValue> {
    let value = match (field.descriptor.as_str(), field.constant.as_ref()?) {
        ("Z", ConstantValue::Int(value)) => AnnotationValue::Boolean(*value != 0),
        ("B", ConstantValue::Int(value)) => AnnotationValue::Byte(*value as i8),
        ("S", ConstantValue::Int(value)) => AnnotationValue::Short(*value as i16),
        ("C", ConstantValue::Int(value)) => {
            AnnotationValue::Char(char::from_u32(*value as u32).unwrap_or('\u{fffd}'))
        }
        (_, ConstantValue::Int(value)) => AnnotationValue::Int(*value),
        (_, ConstantValue::Long(value)) => AnnotationValue::Long(*value),
        (_, ConstantValue::Float(value)) => AnnotationValue::Float(*value),
        (_, ConstantValue::Double(value)) => AnnotationValue::Double(*value),
        (_, ConstantValue::String(value)) => AnnotationValue::String(value.clone()),
    };
    Some(value)
}

fn integral(value: &AnnotationValue) -> Option<i64> {
    match value {
        AnnotationValue::Byte(value) => Some(i64::from(*value)),
        AnnotationValue::Short(value) => Some(i64::from(*value)),
        AnnotationValue::Int(value) => Some(i64::from(*value)),
        AnnotationValue::Long(value) => Some(*value),
        AnnotationValue::Char(value) => Some(i64::from(u32::from(*value))),
        _ => None,
    }
}

fn floating(value: &AnnotationValue) -> Option<f64> {
    match value {
        AnnotationValue::Float(value) => Some(f64::from(*value)),
        AnnotationValue::Double(value) => Some(*value),
        other => integral(other).map(|value| value as f64),
    }
}

/// Parse a Java integer literal. Decimal literals may reach `2^(bits-1)` only
/// when negated; other radixes may use every bit.
fn parse_integral(text: &str, negative: bool, bits: u32) -> Option<i64> {
    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(binary) = text.strip_prefix("0b") {
        (binary, 2)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };
    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    let value = if radix == 10 {
        let limit = 1u64 << (bits - 1);
        if magnitude > limit || (magnitude == limit && !negative) {
            return None;
        }
        magnitude as i128
    } else {
        if bits < 64 && magnitude >> bits != 0 {
            return None;
        }
        if bits == 32 {
            i128::from(magnitude as u32 as i32)
        } else {
            i128::from(magnitude as i64)
        }
    };
    let value = if negative { -value } else { value };
    i64::try_from(value).ok()
}
