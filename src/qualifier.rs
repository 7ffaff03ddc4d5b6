use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

/// Package holding the qualifiers that ship with the built-in overlays.
pub(crate) const BUILTIN_QUALIFIER_PACKAGE: &str = "stubweave.qual";
/// Synthetic declaration marker recorded on every element an overlay touched.
pub(crate) const FROM_OVERLAY: &str = "stubweave.qual.FromOverlay";
/// Marker that silences "type not found" diagnostics for a declaration.
pub(crate) const NO_OVERLAY_WARNING: &str = "NoOverlayWarning";

/// Evaluated value of one annotation argument.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub(crate) enum AnnotationValue {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Char(char),
    Float(f32),
    Double(f64),
    String(String),
    /// Canonical name of a class literal, e.g. `java.lang.String[]` or `int`.
    Class(String),
    Enum { owner: String, name: String },
    Array(Vec<AnnotationValue>),
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::Boolean(value) => write!(f, "{value}"),
            AnnotationValue::Byte(value) => write!(f, "{value}"),
            AnnotationValue::Short(value) => write!(f, "{value}"),
            AnnotationValue::Int(value) => write!(f, "{value}"),
            AnnotationValue::Long(value) => write!(f, "{value}L"),
            AnnotationValue::Char(value) => write!(f, "'{value}'"),
            AnnotationValue::Float(value) => write!(f, "{value}f"),
            AnnotationValue::Double(value) => write!(f, "{value}"),
            AnnotationValue::String(value) => write!(f, "{value:?}"),
            AnnotationValue::Class(name) => write!(f, "{name}.class"),
            AnnotationValue::Enum { owner, name } => write!(f, "{owner}.{name}"),
            AnnotationValue::Array(values) => {
                write!(f, "{{")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A resolved annotation: definition name, hierarchy and evaluated arguments.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Qualifier {
    pub(crate) name: String,
    #[serde(skip)]
    pub(crate) hierarchy: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) arguments: BTreeMap<String, AnnotationValue>,
}

impl Qualifier {
    pub(crate) fn marker(name: &str, hierarchy: &str) -> Self {
        Self {
            name: name.to_string(),
            hierarchy: hierarchy.to_string(),
            arguments: BTreeMap::new(),
        }
    }

    pub(crate) fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.simple_name())?;
        if self.arguments.is_empty() {
            return Ok(());
        }
        write!(f, "(")?;
        for (index, (name, value)) in self.arguments.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

/// Qualifiers on one type node: at most one per hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub(crate) struct QualifierSet {
    by_hierarchy: BTreeMap<String, Qualifier>,
}

impl QualifierSet {
    /// Install `qualifier`, dropping whatever the set held for its hierarchy.
    pub(crate) fn replace(&mut self, qualifier: Qualifier) {
        self.by_hierarchy
            .insert(qualifier.hierarchy.clone(), qualifier);
    }

    pub(crate) fn replace_all(&mut self, other: &QualifierSet) {
        for qualifier in other.iter() {
            self.replace(qualifier.clone());
        }
    }

    /// Copy qualifiers from `other` only for hierarchies this set leaves empty.
    pub(crate) fn fill_from(&mut self, other: &QualifierSet) {
        for qualifier in other.iter() {
            self.by_hierarchy
                .entry(qualifier.hierarchy.clone())
                .or_insert_with(|| qualifier.clone());
        }
    }

    pub(crate) fn get(&self, hierarchy: &str) -> Option<&Qualifier> {
        self.by_hierarchy.get(hierarchy)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.by_hierarchy
            .values()
            .any(|qualifier| qualifier.name == name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Qualifier> {
        self.by_hierarchy.values()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_hierarchy.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_hierarchy.len()
    }

    pub(crate) fn clear(&mut self) {
        self.by_hierarchy.clear();
    }
}

impl fmt::Display for QualifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for qualifier in self.iter() {
            write!(f, "{qualifier} ")?;
        }
        Ok(())
    }
}

/// `java.lang.annotation.ElementType` constants an annotation may target.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub(crate) enum DeclarationTarget {
    Type,
    Field,
    Method,
    Parameter,
    Constructor,
    LocalVariable,
    AnnotationType,
    Package,
    TypeParameter,
    TypeUse,
    Module,
    RecordComponent,
}

impl DeclarationTarget {
    pub(crate) fn from_element_type(name: &str) -> Option<Self> {
        let target = match name {
            "TYPE" => DeclarationTarget::Type,
            "FIELD" => DeclarationTarget::Field,
            "METHOD" => DeclarationTarget::Method,
            "PARAMETER" => DeclarationTarget::Parameter,
            "CONSTRUCTOR" => DeclarationTarget::Constructor,
            "LOCAL_VARIABLE" => DeclarationTarget::LocalVariable,
            "ANNOTATION_TYPE" => DeclarationTarget::AnnotationType,
            "PACKAGE" => DeclarationTarget::Package,
            "TYPE_PARAMETER" => DeclarationTarget::TypeParameter,
            "TYPE_USE" => DeclarationTarget::TypeUse,
            "MODULE" => DeclarationTarget::Module,
            "RECORD_COMPONENT" => DeclarationTarget::RecordComponent,
            _ => return None,
        };
        Some(target)
    }

    /// Targets of an annotation type without `@Target`: every declaration context.
    pub(crate) fn implicit() -> BTreeSet<Self> {
        [
            DeclarationTarget::Type,
            DeclarationTarget::Field,
            DeclarationTarget::Method,
            DeclarationTarget::Parameter,
            DeclarationTarget::Constructor,
            DeclarationTarget::LocalVariable,
            DeclarationTarget::AnnotationType,
            DeclarationTarget::Package,
            DeclarationTarget::Module,
            DeclarationTarget::RecordComponent,
        ]
        .into_iter()
        .collect()
    }
}

/// Declared type of an annotation member, used to convert argument literals.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum MemberType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Char,
    Float,
    Double,
    String,
    Class,
    /// Any other reference type; arguments must name one of its constants.
    Enum(String),
    Array(Box<MemberType>),
}

impl MemberType {
    pub(crate) fn component(&self) -> &MemberType {
        match self {
            MemberType::Array(component) => component,
            other => other,
        }
    }
}

/// A qualifier type known to the program model.
#[derive(Clone, Debug)]
pub(crate) struct QualifierDef {
    pub(crate) name: String,
    pub(crate) simple_name: String,
    pub(crate) targets: BTreeSet<DeclarationTarget>,
    pub(crate) members: BTreeMap<String, MemberType>,
    pub(crate) hierarchy: String,
    pub(crate) is_type_qualifier: bool,
}

impl QualifierDef {
    pub(crate) fn new(
        name: &str,
        targets: BTreeSet<DeclarationTarget>,
        members: BTreeMap<String, MemberType>,
        hierarchies: &Hierarchies,
    ) -> Self {
        let configured = hierarchies.hierarchy_of(name);
        let is_type_qualifier = configured.is_some() || targets.contains(&DeclarationTarget::TypeUse);
        Self {
            name: name.to_string(),
            simple_name: name.rsplit('.').next().unwrap_or(name).to_string(),
            targets,
            members,
            hierarchy: configured.unwrap_or(name).to_string(),
            is_type_qualifier,
        }
    }

    pub(crate) fn instantiate(&self, arguments: BTreeMap<String, AnnotationValue>) -> Qualifier {
        Qualifier {
            name: self.name.clone(),
            hierarchy: self.hierarchy.clone(),
            arguments,
        }
    }
}

/// Mapping from qualifier names to the hierarchy they belong to.
///
/// Qualifiers that are not configured form a hierarchy of their own.
#[derive(Clone, Debug, Default)]
pub(crate) struct Hierarchies {
    by_qualifier: BTreeMap<String, String>,
}

impl Hierarchies {
    pub(crate) fn new(config: &BTreeMap<String, Vec<String>>) -> Self {
        let mut by_qualifier = BTreeMap::new();
        for (hierarchy, qualifiers) in config {
            for qualifier in qualifiers {
                by_qualifier
                    .entry(qualifier.clone())
                    .or_insert_with(|| hierarchy.clone());
            }
        }
        Self { by_qualifier }
    }

    /// Hierarchies for the qualifiers used by the built-in overlays.
    pub(crate) fn builtin() -> BTreeMap<String, Vec<String>> {
        let mut config = BTreeMap::new();
        config.insert(
            "nullness".to_string(),
            vec![
                format!("{BUILTIN_QUALIFIER_PACKAGE}.NonNull"),
                format!("{BUILTIN_QUALIFIER_PACKAGE}.Nullable"),
                format!("{BUILTIN_QUALIFIER_PACKAGE}.PolyNull"),
            ],
        );
        config
    }

    pub(crate) fn hierarchy_of(&self, qualifier: &str) -> Option<&str> {
        self.by_qualifier.get(qualifier).map(|value| value.as_str())
    }
}

/// Definitions of the qualifiers in `stubweave.qual`, available without a class path.
pub(crate) fn builtin_definitions(hierarchies: &Hierarchies) -> Vec<QualifierDef> {
    let type_use: BTreeSet<_> = [DeclarationTarget::TypeUse, DeclarationTarget::TypeParameter]
        .into_iter()
        .collect();
    let executable: BTreeSet<_> = [DeclarationTarget::Method, DeclarationTarget::Constructor]
        .into_iter()
        .collect();
    let declarations: BTreeSet<_> = [DeclarationTarget::Type, DeclarationTarget::Package]
        .into_iter()
        .collect();
    let mut definitions = Vec::new();
    for name in ["NonNull", "Nullable", "PolyNull"] {
        definitions.push(QualifierDef::new(
            &format!("{BUILTIN_QUALIFIER_PACKAGE}.{name}"),
            type_use.clone(),
            BTreeMap::new(),
            hierarchies,
        ));
    }
    for name in ["Pure", "SideEffectFree", "Deterministic"] {
        definitions.push(QualifierDef::new(
            &format!("{BUILTIN_QUALIFIER_PACKAGE}.{name}"),
            executable.clone(),
            BTreeMap::new(),
            hierarchies,
        ));
    }
    definitions.push(QualifierDef::new(
        &format!("{BUILTIN_QUALIFIER_PACKAGE}.{NO_OVERLAY_WARNING}"),
        declarations,
        BTreeMap::new(),
        hierarchies,
    ));
    definitions.push(QualifierDef::new(
        FROM_OVERLAY,
        DeclarationTarget::implicit(),
        BTreeMap::new(),
        hierarchies,
    ));
    definitions
}
