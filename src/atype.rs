use std::fmt;

use serde::Serialize;

use crate::qualifier::QualifierSet;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    pub(crate) fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "boolean" => PrimitiveKind::Boolean,
            "byte" => PrimitiveKind::Byte,
            "short" => PrimitiveKind::Short,
            "char" => PrimitiveKind::Char,
            "int" => PrimitiveKind::Int,
            "long" => PrimitiveKind::Long,
            "float" => PrimitiveKind::Float,
            "double" => PrimitiveKind::Double,
            _ => return None,
        };
        Some(kind)
    }

    pub(crate) fn from_descriptor(tag: char) -> Option<Self> {
        let kind = match tag {
            'Z' => PrimitiveKind::Boolean,
            'B' => PrimitiveKind::Byte,
            'S' => PrimitiveKind::Short,
            'C' => PrimitiveKind::Char,
            'I' => PrimitiveKind::Int,
            'J' => PrimitiveKind::Long,
            'F' => PrimitiveKind::Float,
            'D' => PrimitiveKind::Double,
            _ => return None,
        };
        Some(kind)
    }
}

/// A type with qualifiers on every node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct AnnotatedType {
    #[serde(skip_serializing_if = "QualifierSet::is_empty")]
    pub(crate) qualifiers: QualifierSet,
    #[serde(flatten)]
    pub(crate) kind: TypeKind,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum TypeKind {
    Primitive {
        primitive: PrimitiveKind,
    },
    Void,
    Array {
        component: Box<AnnotatedType>,
    },
    Declared {
        name: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        type_arguments: Vec<AnnotatedType>,
    },
    TypeVariable {
        name: String,
        upper: Box<AnnotatedType>,
        lower: Box<AnnotatedType>,
    },
    Wildcard {
        extends: Box<AnnotatedType>,
        super_bound: Box<AnnotatedType>,
    },
    Intersection {
        bounds: Vec<AnnotatedType>,
    },
    Null,
}

impl AnnotatedType {
    pub(crate) fn new(kind: TypeKind) -> Self {
        Self {
            qualifiers: QualifierSet::default(),
            kind,
        }
    }

    pub(crate) fn primitive(primitive: PrimitiveKind) -> Self {
        Self::new(TypeKind::Primitive { primitive })
    }

    pub(crate) fn void() -> Self {
        Self::new(TypeKind::Void)
    }

    pub(crate) fn null() -> Self {
        Self::new(TypeKind::Null)
    }

    pub(crate) fn array(component: AnnotatedType) -> Self {
        Self::new(TypeKind::Array {
            component: Box::new(component),
        })
    }

    pub(crate) fn declared(name: &str, type_arguments: Vec<AnnotatedType>) -> Self {
        Self::new(TypeKind::Declared {
            name: name.to_string(),
            type_arguments,
        })
    }

    pub(crate) fn object() -> Self {
        Self::declared("java.lang.Object", Vec::new())
    }

    pub(crate) fn type_variable(name: &str, upper: AnnotatedType, lower: AnnotatedType) -> Self {
        Self::new(TypeKind::TypeVariable {
            name: name.to_string(),
            upper: Box::new(upper),
            lower: Box::new(lower),
        })
    }

    pub(crate) fn wildcard(extends: AnnotatedType, super_bound: AnnotatedType) -> Self {
        Self::new(TypeKind::Wildcard {
            extends: Box::new(extends),
            super_bound: Box::new(super_bound),
        })
    }

    pub(crate) fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self.kind {
            TypeKind::Primitive { .. } => "primitive",
            TypeKind::Void => "void",
            TypeKind::Array { .. } => "array",
            TypeKind::Declared { .. } => "declared",
            TypeKind::TypeVariable { .. } => "type variable",
            TypeKind::Wildcard { .. } => "wildcard",
            TypeKind::Intersection { .. } => "intersection",
            TypeKind::Null => "null",
        }
    }

    /// Canonical name of a declared type, or the variable name of a type variable.
    pub(crate) fn name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Declared { name, .. } | TypeKind::TypeVariable { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Run `f` on the innermost component of an array, or on a non-array type itself.
    pub(crate) fn with_innermost_component(&mut self, f: impl FnOnce(&mut AnnotatedType)) {
        match &mut self.kind {
            TypeKind::Array { component } => component.with_innermost_component(f),
            _ => f(self),
        }
    }

    /// Structural copy with every qualifier removed.
    pub(crate) fn without_qualifiers(&self) -> Self {
        let mut copy = self.clone();
        copy.visit_mut(&mut |node| node.qualifiers.clear());
        copy
    }

    pub(crate) fn is_unqualified(&self) -> bool {
        let mut empty = true;
        self.visit(&mut |node| empty &= node.qualifiers.is_empty());
        empty
    }

    /// Replace, node by node, the qualifiers of every hierarchy present in `other`.
    pub(crate) fn replace_from(&mut self, other: &AnnotatedType) {
        self.zip_mut(other, &mut |target, source| {
            target.qualifiers.replace_all(&source.qualifiers)
        });
    }

    /// Copy, node by node, qualifiers from `other` only where this type has none for the hierarchy.
    pub(crate) fn fill_from(&mut self, other: &AnnotatedType) {
        self.zip_mut(other, &mut |target, source| {
            target.qualifiers.fill_from(&source.qualifiers)
        });
    }

    fn zip_mut<F>(&mut self, other: &AnnotatedType, f: &mut F)
    where
        F: FnMut(&mut AnnotatedType, &AnnotatedType),
    {
        f(self, other);
        match (&mut self.kind, &other.kind) {
            (TypeKind::Array { component }, TypeKind::Array { component: source }) => {
                component.zip_mut(source, f)
            }
            (
                TypeKind::Declared { type_arguments, .. },
                TypeKind::Declared {
                    type_arguments: source,
                    ..
                },
            ) if type_arguments.len() == source.len() => {
                for (target, source) in type_arguments.iter_mut().zip(source) {
                    target.zip_mut(source, f);
                }
            }
            (
                TypeKind::TypeVariable { upper, lower, .. },
                TypeKind::TypeVariable {
                    upper: source_upper,
                    lower: source_lower,
                    ..
                },
            ) => {
                upper.zip_mut(source_upper, f);
                lower.zip_mut(source_lower, f);
            }
            (
                TypeKind::Wildcard {
                    extends,
                    super_bound,
                },
                TypeKind::Wildcard {
                    extends: source_extends,
                    super_bound: source_super,
                },
            ) => {
                extends.zip_mut(source_extends, f);
                super_bound.zip_mut(source_super, f);
            }
            (TypeKind::Intersection { bounds }, TypeKind::Intersection { bounds: source })
                if bounds.len() == source.len() =>
            {
                for (target, source) in bounds.iter_mut().zip(source) {
                    target.zip_mut(source, f);
                }
            }
            _ => {}
        }
    }

    fn visit<F>(&self, f: &mut F)
    where
        F: FnMut(&AnnotatedType),
    {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    fn visit_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut AnnotatedType),
    {
        f(self);
        match &mut self.kind {
            TypeKind::Array { component } => component.visit_mut(f),
            TypeKind::Declared { type_arguments, .. } => {
                for argument in type_arguments {
                    argument.visit_mut(f);
                }
            }
            TypeKind::TypeVariable { upper, lower, .. } => {
                upper.visit_mut(f);
                lower.visit_mut(f);
            }
            TypeKind::Wildcard {
                extends,
                super_bound,
            } => {
                extends.visit_mut(f);
                super_bound.visit_mut(f);
            }
            TypeKind::Intersection { bounds } => {
                for bound in bounds {
                    bound.visit_mut(f);
                }
            }
            TypeKind::Primitive { .. } | TypeKind::Void | TypeKind::Null => {}
        }
    }

    fn children(&self) -> Vec<&AnnotatedType> {
        match &self.kind {
            TypeKind::Array { component } => vec![component],
            TypeKind::Declared { type_arguments, .. } => type_arguments.iter().collect(),
            TypeKind::TypeVariable { upper, lower, .. } => vec![upper, lower],
            TypeKind::Wildcard {
                extends,
                super_bound,
            } => vec![extends, super_bound],
            TypeKind::Intersection { bounds } => bounds.iter().collect(),
            TypeKind::Primitive { .. } | TypeKind::Void | TypeKind::Null => Vec::new(),
        }
    }
}

impl fmt::Display for AnnotatedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Array { component } => {
                write!(f, "{component} {}[]", self.qualifiers)
            }
            TypeKind::Primitive { primitive } => {
                write!(f, "{}{}", self.qualifiers, primitive.keyword())
            }
            TypeKind::Void => write!(f, "{}void", self.qualifiers),
            TypeKind::Null => write!(f, "{}null", self.qualifiers),
            TypeKind::Declared {
                name,
                type_arguments,
            } => {
                write!(f, "{}{name}", self.qualifiers)?;
                if !type_arguments.is_empty() {
                    write!(f, "<")?;
                    for (index, argument) in type_arguments.iter().enumerate() {
                        if index > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{argument}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeKind::TypeVariable { name, .. } => write!(f, "{}{name}", self.qualifiers),
            TypeKind::Wildcard {
                extends,
                super_bound,
            } => write!(f, "{}? extends {extends} super {super_bound}", self.qualifiers),
            TypeKind::Intersection { bounds } => {
                for (index, bound) in bounds.iter().enumerate() {
                    if index > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{bound}")?;
                }
                Ok(())
            }
        }
    }
}

/// Type of a method or constructor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct ExecutableType {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) type_variables: Vec<AnnotatedType>,
    pub(crate) return_type: AnnotatedType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) receiver: Option<AnnotatedType>,
    pub(crate) parameters: Vec<AnnotatedType>,
}

impl ExecutableType {
    fn parts(&self) -> Vec<&AnnotatedType> {
        let mut parts: Vec<&AnnotatedType> = self.type_variables.iter().collect();
        parts.push(&self.return_type);
        parts.extend(self.receiver.iter());
        parts.extend(self.parameters.iter());
        parts
    }

    fn parts_mut(&mut self) -> Vec<&mut AnnotatedType> {
        let mut parts: Vec<&mut AnnotatedType> = self.type_variables.iter_mut().collect();
        parts.push(&mut self.return_type);
        parts.extend(self.receiver.iter_mut());
        parts.extend(self.parameters.iter_mut());
        parts
    }
}

/// Type of a class: its own declared type plus its direct supertypes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct ClassType {
    pub(crate) declared: AnnotatedType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) supertypes: Vec<AnnotatedType>,
}

/// The type representation attached to one program element.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub(crate) enum ElementType {
    Class(ClassType),
    Executable(ExecutableType),
    Variable { ty: AnnotatedType },
}

impl ElementType {
    pub(crate) fn variable(ty: AnnotatedType) -> Self {
        ElementType::Variable { ty }
    }

    pub(crate) fn as_variable(&self) -> Option<&AnnotatedType> {
        match self {
            ElementType::Variable { ty } => Some(ty),
            _ => None,
        }
    }

    pub(crate) fn as_executable(&self) -> Option<&ExecutableType> {
        match self {
            ElementType::Executable(executable) => Some(executable),
            _ => None,
        }
    }

    pub(crate) fn as_class(&self) -> Option<&ClassType> {
        match self {
            ElementType::Class(class) => Some(class),
            _ => None,
        }
    }

    fn parts(&self) -> Vec<&AnnotatedType> {
        match self {
            ElementType::Class(class) => {
                let mut parts = vec![&class.declared];
                parts.extend(class.supertypes.iter());
                parts
            }
            ElementType::Executable(executable) => executable.parts(),
            ElementType::Variable { ty } => vec![ty],
        }
    }

    fn parts_mut(&mut self) -> Vec<&mut AnnotatedType> {
        match self {
            ElementType::Class(class) => {
                let mut parts = vec![&mut class.declared];
                parts.extend(class.supertypes.iter_mut());
                parts
            }
            ElementType::Executable(executable) => executable.parts_mut(),
            ElementType::Variable { ty } => vec![ty],
        }
    }

    pub(crate) fn without_qualifiers(&self) -> Self {
        let mut copy = self.clone();
        for part in copy.parts_mut() {
            *part = part.without_qualifiers();
        }
        copy
    }

    pub(crate) fn is_unqualified(&self) -> bool {
        self.parts().iter().all(|part| part.is_unqualified())
    }

    /// Per-node, per-hierarchy replace. Shapes that disagree are left alone.
    pub(crate) fn replace_from(&mut self, other: &ElementType) {
        self.zip_parts(other, |target, source| target.replace_from(source));
    }

    pub(crate) fn fill_from(&mut self, other: &ElementType) {
        self.zip_parts(other, |target, source| target.fill_from(source));
    }

    fn zip_parts<F>(&mut self, other: &ElementType, mut f: F)
    where
        F: FnMut(&mut AnnotatedType, &AnnotatedType),
    {
        let same_form = matches!(
            (&*self, other),
            (ElementType::Class(_), ElementType::Class(_))
                | (ElementType::Executable(_), ElementType::Executable(_))
                | (ElementType::Variable { .. }, ElementType::Variable { .. })
        );
        if !same_form {
            return;
        }
        let sources = other.parts();
        let targets = self.parts_mut();
        if sources.len() != targets.len() {
            return;
        }
        for (target, source) in targets.into_iter().zip(sources) {
            f(target, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifier::Qualifier;

    fn qualified(mut ty: AnnotatedType, name: &str, hierarchy: &str) -> AnnotatedType {
        ty.qualifiers.replace(Qualifier::marker(name, hierarchy));
        ty
    }

    #[test]
    fn replace_from_walks_type_arguments() {
        let mut target = AnnotatedType::declared(
            "java.util.List",
            vec![qualified(
                AnnotatedType::declared("java.lang.String", Vec::new()),
                "a.Nullable",
                "nullness",
            )],
        );
        let source = AnnotatedType::declared(
            "java.util.List",
            vec![qualified(
                AnnotatedType::declared("java.lang.String", Vec::new()),
                "a.NonNull",
                "nullness",
            )],
        );

        target.replace_from(&source);

        let TypeKind::Declared { type_arguments, .. } = &target.kind else {
            panic!("declared");
        };
        assert!(type_arguments[0].qualifiers.contains("a.NonNull"));
        assert!(!type_arguments[0].qualifiers.contains("a.Nullable"));
    }

    #[test]
    fn fill_from_keeps_existing_and_adds_missing() {
        let mut target = qualified(AnnotatedType::object(), "a.Nullable", "nullness");
        let source = qualified(
            qualified(AnnotatedType::object(), "a.NonNull", "nullness"),
            "a.Tainted",
            "taint",
        );

        target.fill_from(&source);

        assert!(target.qualifiers.contains("a.Nullable"));
        assert!(target.qualifiers.contains("a.Tainted"));
    }

    #[test]
    fn without_qualifiers_clears_every_node() {
        let ty = qualified(
            AnnotatedType::array(qualified(
                AnnotatedType::primitive(PrimitiveKind::Int),
                "a.X",
                "x",
            )),
            "a.Y",
            "y",
        );

        let cleared = ty.without_qualifiers();

        assert!(cleared.is_unqualified());
        assert!(!ty.is_unqualified());
        assert!(cleared.is_array());
    }

    #[test]
    fn element_type_replace_ignores_different_forms() {
        let mut variable = ElementType::variable(AnnotatedType::object());
        let class = ElementType::Class(ClassType {
            declared: qualified(AnnotatedType::object(), "a.X", "x"),
            supertypes: Vec::new(),
        });

        variable.replace_from(&class);

        assert!(variable.is_unqualified());
    }

    #[test]
    fn innermost_component_reaches_through_every_dimension() {
        let mut matrix = AnnotatedType::array(AnnotatedType::array(AnnotatedType::primitive(
            PrimitiveKind::Int,
        )));
        matrix.with_innermost_component(|node| {
            node.qualifiers.replace(Qualifier::marker("a.X", "x"));
        });

        let TypeKind::Array { component } = &matrix.kind else {
            panic!("array");
        };
        let TypeKind::Array { component: innermost } = &component.kind else {
            panic!("array");
        };
        assert!(innermost.qualifiers.contains("a.X"));
        assert!(!component.qualifiers.contains("a.X"));
        assert!(!matrix.qualifiers.contains("a.X"));

        let mut scalar = AnnotatedType::object();
        scalar.with_innermost_component(|node| {
            node.qualifiers.replace(Qualifier::marker("a.X", "x"));
        });
        assert!(scalar.qualifiers.contains("a.X"));
    }
}
