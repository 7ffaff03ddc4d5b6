use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::atype::{AnnotatedType, ClassType, ElementType, ExecutableType, TypeKind};
use crate::classfile::{
    ACC_ANNOTATION, ACC_BRIDGE, ACC_ENUM, ACC_INTERFACE, ACC_PRIVATE, ACC_STATIC, ACC_SYNTHETIC,
    ACC_VARARGS, ClassFile, ConstantValue, RawAnnotation, TypeAnnotation, TypeAnnotationTarget,
    TypePathStep,
};
use crate::descriptor::{annotation_member_type, leads_with_outer_instance, method_param_count};
use crate::qualifier::{
    AnnotationValue, BUILTIN_QUALIFIER_PACKAGE, DeclarationTarget, Hierarchies, Qualifier,
    QualifierDef, builtin_definitions,
};
use crate::signature::{
    ClassSig, MethodSig, TypeArgSig, TypeParamSig, TypeSig, canonical_name, parse_class_signature,
    parse_field_signature, parse_method_signature,
};

const TARGET_ANNOTATION: &str = "java/lang/annotation/Target";
const OBJECT: &str = "java/lang/Object";
const RECORD: &str = "java/lang/Record";

/// Stable handle of a real program element.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub(crate) enum ElementId {
    Package {
        name: String,
    },
    Type {
        internal: String,
    },
    Field {
        owner: String,
        name: String,
    },
    Method {
        owner: String,
        name: String,
        descriptor: String,
    },
    Parameter {
        owner: String,
        name: String,
        descriptor: String,
        index: usize,
    },
    TypeParameter {
        owner: Box<ElementId>,
        index: usize,
    },
}

impl ElementId {
    pub(crate) fn package(name: &str) -> Self {
        ElementId::Package {
            name: name.to_string(),
        }
    }

    pub(crate) fn of_type(internal: &str) -> Self {
        ElementId::Type {
            internal: internal.to_string(),
        }
    }

    pub(crate) fn field(owner: &str, name: &str) -> Self {
        ElementId::Field {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn method(owner: &str, name: &str, descriptor: &str) -> Self {
        ElementId::Method {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// Parameter `index` of this method; `None` for other elements.
    pub(crate) fn parameter(&self, index: usize) -> Option<Self> {
        match self {
            ElementId::Method {
                owner,
                name,
                descriptor,
            } => Some(ElementId::Parameter {
                owner: owner.clone(),
                name: name.clone(),
                descriptor: descriptor.clone(),
                index,
            }),
            _ => None,
        }
    }

    pub(crate) fn type_parameter(&self, index: usize) -> Self {
        ElementId::TypeParameter {
            owner: Box::new(self.clone()),
            index,
        }
    }

    /// Internal name of the outermost class that contains this element.
    pub(crate) fn outermost_class(&self) -> Option<&str> {
        let owner = match self {
            ElementId::Package { .. } => return None,
            ElementId::Type { internal } => internal,
            ElementId::Field { owner, .. }
            | ElementId::Method { owner, .. }
            | ElementId::Parameter { owner, .. } => owner,
            ElementId::TypeParameter { owner, .. } => return owner.outermost_class(),
        };
        Some(owner.split('$').next().unwrap_or(owner))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Package { name } => write!(f, "package {name}"),
            ElementId::Type { internal } => write!(f, "{}", internal.replace('/', ".")),
            ElementId::Field { owner, name } => write!(f, "{}#{name}", owner.replace('/', ".")),
            ElementId::Method {
                owner,
                name,
                descriptor,
            } => write!(f, "{}#{name}{descriptor}", owner.replace('/', ".")),
            ElementId::Parameter {
                owner,
                name,
                descriptor,
                index,
            } => write!(
                f,
                "{}#{name}{descriptor} parameter {index}",
                owner.replace('/', ".")
            ),
            ElementId::TypeParameter { owner, index } => {
                write!(f, "{owner} type parameter {index}")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl ClassKind {
    fn from_flags(flags: u16) -> Self {
        if flags & ACC_ANNOTATION != 0 {
            ClassKind::Annotation
        } else if flags & ACC_ENUM != 0 {
            ClassKind::Enum
        } else if flags & ACC_INTERFACE != 0 {
            ClassKind::Interface
        } else {
            ClassKind::Class
        }
    }

    pub(crate) fn describe(self) -> &'static str {
        match self {
            ClassKind::Class => "a class",
            ClassKind::Interface => "an interface",
            ClassKind::Enum => "an enum",
            ClassKind::Annotation => "an annotation type",
        }
    }
}

/// A class, interface, enum or annotation type of the program.
#[derive(Clone, Debug)]
pub(crate) struct TypeElement {
    pub(crate) internal_name: String,
    pub(crate) canonical_name: String,
    pub(crate) simple_name: String,
    pub(crate) package: String,
    pub(crate) kind: ClassKind,
    pub(crate) access_flags: u16,
    pub(crate) is_record: bool,
    pub(crate) enclosing: Option<String>,
    pub(crate) nested: Vec<String>,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) signature: ClassSig,
    pub(crate) fields: Vec<FieldElement>,
    pub(crate) methods: Vec<MethodElement>,
    annotations: Vec<RawAnnotation>,
    type_annotations: Vec<TypeAnnotation>,
}

#[derive(Clone, Debug)]
pub(crate) struct FieldElement {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access_flags: u16,
    pub(crate) ty: TypeSig,
    pub(crate) constant: Option<ConstantValue>,
    annotations: Vec<RawAnnotation>,
    type_annotations: Vec<TypeAnnotation>,
}

#[derive(Clone, Debug)]
pub(crate) struct MethodElement {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access_flags: u16,
    /// Source-level signature; synthetic leading parameters are already dropped.
    pub(crate) signature: MethodSig,
    annotations: Vec<RawAnnotation>,
    parameter_annotations: Vec<Vec<RawAnnotation>>,
    type_annotations: Vec<TypeAnnotation>,
}

impl TypeElement {
    pub(crate) fn id(&self) -> ElementId {
        ElementId::of_type(&self.internal_name)
    }

    pub(crate) fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub(crate) fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    /// Nested class that captures an outer instance.
    pub(crate) fn is_inner(&self) -> bool {
        self.enclosing.is_some() && !self.is_static() && self.kind == ClassKind::Class
    }

    pub(crate) fn field(&self, name: &str) -> Option<&FieldElement> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub(crate) fn methods_named(&self, name: &str) -> Vec<&MethodElement> {
        self.methods
            .iter()
            .filter(|method| method.name == name)
            .collect()
    }

    pub(crate) fn enum_constants(&self) -> impl Iterator<Item = &FieldElement> {
        self.fields.iter().filter(|field| field.is_enum_constant())
    }
}

impl FieldElement {
    pub(crate) fn id(&self, owner: &TypeElement) -> ElementId {
        ElementId::field(&owner.internal_name, &self.name)
    }

    pub(crate) fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub(crate) fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    pub(crate) fn is_enum_constant(&self) -> bool {
        self.access_flags & ACC_ENUM != 0
    }
}

impl MethodElement {
    pub(crate) fn id(&self, owner: &TypeElement) -> ElementId {
        ElementId::method(&owner.internal_name, &self.name, &self.descriptor)
    }

    pub(crate) fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub(crate) fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub(crate) fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    pub(crate) fn is_varargs(&self) -> bool {
        self.access_flags & ACC_VARARGS != 0
    }
}

/// Lookup service over the real program the overlays describe.
pub(crate) trait ProgramModel {
    fn has_package(&self, name: &str) -> bool;
    /// Find a type by canonical name, e.g. `java.util.Map.Entry`.
    fn find_type(&self, canonical: &str) -> Option<&TypeElement>;
    fn type_by_internal(&self, internal: &str) -> Option<&TypeElement>;
    fn types_in_package(&self, package: &str) -> Vec<&TypeElement>;
    /// Fresh type representation carrying the qualifiers found in the class files.
    fn element_type(&self, element: &ElementId) -> Option<ElementType>;
    /// Declaration qualifiers found in the class files.
    fn declaration_qualifiers(&self, element: &ElementId) -> Vec<Qualifier>;
    fn qualifier_definition(&self, canonical: &str) -> Option<&QualifierDef>;
    /// Qualifiers declared directly in a package or as members of a type.
    fn qualifiers_in_scope(&self, scope: &str) -> Vec<&QualifierDef>;
    fn is_subtype(&self, sub: &str, sup: &str) -> bool;
}

/// Program model backed by parsed class files.
pub(crate) struct ClassIndex {
    types: BTreeMap<String, TypeElement>,
    by_canonical: BTreeMap<String, String>,
    packages: BTreeMap<String, Vec<RawAnnotation>>,
    qualifiers: BTreeMap<String, QualifierDef>,
}

impl ClassIndex {
    pub(crate) fn new(classes: Vec<ClassFile>, hierarchies: &Hierarchies) -> Self {
        let mut packages: BTreeMap<String, Vec<RawAnnotation>> = BTreeMap::new();
        let mut types = BTreeMap::new();
        for class in classes {
            let package = package_of(&class.name);
            if class.name.ends_with("/package-info") || class.name == "package-info" {
                packages.entry(package).or_default().extend(class.annotations);
                continue;
            }
            packages.entry(package).or_default();
            let element = type_element(class);
            if types.contains_key(&element.internal_name) {
                debug!("duplicate class ignored: {}", element.internal_name);
                continue;
            }
            types.insert(element.internal_name.clone(), element);
        }

        let internals: Vec<String> = types.keys().cloned().collect();
        let mut by_canonical = BTreeMap::new();
        for internal in internals {
            let canonical = compute_canonical(&internal, &types);
            if let Some(element) = types.get_mut(&internal) {
                element.canonical_name = canonical.clone();
            }
            by_canonical.insert(canonical, internal);
        }

        packages
            .entry(BUILTIN_QUALIFIER_PACKAGE.to_string())
            .or_default();
        let mut qualifiers = BTreeMap::new();
        for definition in builtin_definitions(hierarchies) {
            qualifiers.insert(definition.name.clone(), definition);
        }
        for element in types.values() {
            if element.kind == ClassKind::Annotation {
                let definition = annotation_definition(element, hierarchies);
                qualifiers.insert(definition.name.clone(), definition);
            }
        }

        Self {
            types,
            by_canonical,
            packages,
            qualifiers,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.types.len()
    }

    fn canonical_of(&self, internal: &str) -> String {
        self.types
            .get(internal)
            .map(|element| element.canonical_name.clone())
            .unwrap_or_else(|| canonical_name(internal))
    }

    fn declared_type(&self, element: &TypeElement) -> AnnotatedType {
        let mut builder = TypeBuilder::new(self, self.class_scopes(element));
        let arguments = element
            .signature
            .type_params
            .iter()
            .map(|param| builder.type_variable(&param.name))
            .collect();
        AnnotatedType::declared(&element.canonical_name, arguments)
    }

    fn class_scopes<'a>(&'a self, element: &'a TypeElement) -> Vec<&'a [TypeParamSig]> {
        let mut scopes = vec![element.signature.type_params.as_slice()];
        let mut current = element;
        while let Some(enclosing) = current
            .enclosing
            .as_deref()
            .and_then(|internal| self.types.get(internal))
        {
            scopes.push(enclosing.signature.type_params.as_slice());
            current = enclosing;
        }
        scopes
    }

    fn class_type(&self, element: &TypeElement) -> ClassType {
        let mut builder = TypeBuilder::new(self, self.class_scopes(element));
        let mut supertypes = Vec::new();
        if let Some(superclass) = &element.signature.superclass {
            supertypes.push(builder.build(superclass));
        }
        for interface in &element.signature.interfaces {
            supertypes.push(builder.build(interface));
        }
        let mut declared = self.declared_type(element);
        let has_superclass = element.signature.superclass.is_some();
        for annotation in &element.type_annotations {
            let Some(qualifier) = self.type_qualifier(&annotation.annotation) else {
                continue;
            };
            if let TypeAnnotationTarget::Supertype(index) = annotation.target {
                let position = if index == u16::MAX {
                    has_superclass.then_some(0)
                } else {
                    Some(index as usize + usize::from(has_superclass))
                };
                if let Some(node) = position
                    .and_then(|position| supertypes.get_mut(position))
                    .and_then(|supertype| self.node_at_path(supertype, &annotation.path))
                {
                    node.qualifiers.replace(qualifier);
                }
            }
        }
        for annotation in &element.annotations {
            if let Some(qualifier) = self.type_qualifier(annotation) {
                declared.qualifiers.replace(qualifier);
            }
        }
        ClassType {
            declared,
            supertypes,
        }
    }

    fn field_type(&self, owner: &TypeElement, field: &FieldElement) -> AnnotatedType {
        let mut builder = TypeBuilder::new(self, self.class_scopes(owner));
        let mut ty = builder.build(&field.ty);
        for annotation in &field.type_annotations {
            if annotation.target == TypeAnnotationTarget::Field
                && let Some(qualifier) = self.type_qualifier(&annotation.annotation)
                && let Some(node) = self.node_at_path(&mut ty, &annotation.path)
            {
                node.qualifiers.replace(qualifier);
            }
        }
        ty
    }

    fn executable_type(&self, owner: &TypeElement, method: &MethodElement) -> ExecutableType {
        let mut scopes = vec![method.signature.type_params.as_slice()];
        scopes.extend(self.class_scopes(owner));
        let mut builder = TypeBuilder::new(self, scopes);
        let type_variables = method
            .signature
            .type_params
            .iter()
            .map(|param| builder.type_variable(&param.name))
            .collect();
        let mut return_type = if method.is_constructor() {
            self.declared_type(owner)
        } else {
            builder.build(&method.signature.ret)
        };
        let mut parameters: Vec<AnnotatedType> = method
            .signature
            .params
            .iter()
            .map(|param| builder.build(param))
            .collect();
        let mut receiver = if method.is_constructor() {
            owner
                .is_inner()
                .then(|| owner.enclosing.as_deref())
                .flatten()
                .and_then(|outer| self.types.get(outer))
                .map(|outer| self.declared_type(outer))
        } else if method.is_static() {
            None
        } else {
            Some(self.declared_type(owner))
        };

        for annotation in &method.type_annotations {
            let Some(qualifier) = self.type_qualifier(&annotation.annotation) else {
                continue;
            };
            let target = match annotation.target {
                TypeAnnotationTarget::Return => Some(&mut return_type),
                TypeAnnotationTarget::Receiver => receiver.as_mut(),
                TypeAnnotationTarget::Parameter(index) => parameters.get_mut(index as usize),
                _ => None,
            };
            if let Some(node) = target.and_then(|target| self.node_at_path(target, &annotation.path))
            {
                node.qualifiers.replace(qualifier);
            }
        }

        ExecutableType {
            type_variables,
            return_type,
            receiver,
            parameters,
        }
    }

    /// The node of `ty` a bytecode type annotation with `path` lands on, or
    /// `None` when the path leaves the structure the signature produced.
    fn node_at_path<'t>(
        &self,
        ty: &'t mut AnnotatedType,
        path: &[TypePathStep],
    ) -> Option<&'t mut AnnotatedType> {
        // Nested steps select an inner class within `Outer.Inner`; only the
        // innermost class has a node, so the count must reach its depth.
        let nested = path
            .iter()
            .take_while(|step| **step == TypePathStep::Nested)
            .count();
        let path = &path[nested..];
        if let TypeKind::Declared { name, .. } = &ty.kind
            && nested != self.inner_depth(name)
        {
            return None;
        }
        let Some((step, rest)) = path.split_first() else {
            return Some(ty);
        };
        let next = match (step, &mut ty.kind) {
            (TypePathStep::ArrayComponent, TypeKind::Array { component }) => component.as_mut(),
            (TypePathStep::TypeArgument(index), TypeKind::Declared { type_arguments, .. }) => {
                type_arguments.get_mut(*index as usize)?
            }
            (
                TypePathStep::WildcardBound,
                TypeKind::Wildcard {
                    extends,
                    super_bound,
                },
            ) => {
                if matches!(super_bound.kind, TypeKind::Null) {
                    extends.as_mut()
                } else {
                    super_bound.as_mut()
                }
            }
            _ => return None,
        };
        self.node_at_path(next, rest)
    }

    /// How many enclosing classes of `canonical` capture an outer instance.
    fn inner_depth(&self, canonical: &str) -> usize {
        let mut depth = 0;
        let mut current = self.find_type(canonical);
        while let Some(element) = current
            && element.is_inner()
        {
            depth += 1;
            current = element
                .enclosing
                .as_deref()
                .and_then(|outer| self.types.get(outer));
        }
        depth
    }

    fn locate_method<'a>(
        &'a self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(&'a TypeElement, &'a MethodElement)> {
        let element = self.types.get(owner)?;
        let method = element
            .methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)?;
        Some((element, method))
    }

    /// Resolve a class-file annotation to a type qualifier, if it is one.
    fn type_qualifier(&self, annotation: &RawAnnotation) -> Option<Qualifier> {
        let definition = self.qualifier_definition(&self.canonical_of(&annotation.type_name))?;
        definition
            .is_type_qualifier
            .then(|| definition.instantiate(annotation.elements.clone()))
    }

    fn declaration_qualifier(&self, annotation: &RawAnnotation) -> Option<Qualifier> {
        let definition = self.qualifier_definition(&self.canonical_of(&annotation.type_name))?;
        Some(definition.instantiate(annotation.elements.clone()))
    }

    fn qualifiers_of(&self, annotations: &[RawAnnotation]) -> Vec<Qualifier> {
        annotations
            .iter()
            .filter_map(|annotation| self.declaration_qualifier(annotation))
            .collect()
    }
}

impl ProgramModel for ClassIndex {
    fn has_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    fn find_type(&self, canonical: &str) -> Option<&TypeElement> {
        let internal = self.by_canonical.get(canonical)?;
        self.types.get(internal)
    }

    fn type_by_internal(&self, internal: &str) -> Option<&TypeElement> {
        self.types.get(internal)
    }

    fn types_in_package(&self, package: &str) -> Vec<&TypeElement> {
        self.types
            .values()
            .filter(|element| element.package == package)
            .collect()
    }

    fn element_type(&self, element: &ElementId) -> Option<ElementType> {
        match element {
            ElementId::Package { .. } => None,
            ElementId::Type { internal } => {
                let element = self.types.get(internal)?;
                Some(ElementType::Class(self.class_type(element)))
            }
            ElementId::Field { owner, name } => {
                let owner = self.types.get(owner)?;
                let field = owner.field(name)?;
                Some(ElementType::variable(self.field_type(owner, field)))
            }
            ElementId::Method {
                owner,
                name,
                descriptor,
            } => {
                let (owner, method) = self.locate_method(owner, name, descriptor)?;
                Some(ElementType::Executable(self.executable_type(owner, method)))
            }
            ElementId::Parameter {
                owner,
                name,
                descriptor,
                index,
            } => {
                let (owner, method) = self.locate_method(owner, name, descriptor)?;
                let executable = self.executable_type(owner, method);
                let parameter = executable.parameters.get(*index)?;
                Some(ElementType::variable(parameter.clone()))
            }
            ElementId::TypeParameter { owner, index } => {
                let variable = match self.element_type(owner)? {
                    ElementType::Class(class) => match class.declared.kind {
                        TypeKind::Declared {
                            mut type_arguments, ..
                        } if *index < type_arguments.len() => type_arguments.swap_remove(*index),
                        _ => return None,
                    },
                    ElementType::Executable(mut executable)
                        if *index < executable.type_variables.len() =>
                    {
                        executable.type_variables.swap_remove(*index)
                    }
                    _ => return None,
                };
                Some(ElementType::variable(variable))
            }
        }
    }

    fn declaration_qualifiers(&self, element: &ElementId) -> Vec<Qualifier> {
        match element {
            ElementId::Package { name } => self
                .packages
                .get(name)
                .map(|annotations| self.qualifiers_of(annotations))
                .unwrap_or_default(),
            ElementId::Type { internal } => self
                .types
                .get(internal)
                .map(|element| self.qualifiers_of(&element.annotations))
                .unwrap_or_default(),
            ElementId::Field { owner, name } => self
                .types
                .get(owner)
                .and_then(|owner| owner.field(name))
                .map(|field| self.qualifiers_of(&field.annotations))
                .unwrap_or_default(),
            ElementId::Method {
                owner,
                name,
                descriptor,
            } => self
                .locate_method(owner, name, descriptor)
                .map(|(_, method)| self.qualifiers_of(&method.annotations))
                .unwrap_or_default(),
            ElementId::Parameter {
                owner,
                name,
                descriptor,
                index,
            } => {
                let Some((_, method)) = self.locate_method(owner, name, descriptor) else {
                    return Vec::new();
                };
                // Synthetic leading parameters may be counted in the attribute.
                let skipped = method
                    .parameter_annotations
                    .len()
                    .saturating_sub(method.signature.params.len());
                method
                    .parameter_annotations
                    .get(index + skipped)
                    .map(|annotations| self.qualifiers_of(annotations))
                    .unwrap_or_default()
            }
            ElementId::TypeParameter { .. } => Vec::new(),
        }
    }

    fn qualifier_definition(&self, canonical: &str) -> Option<&QualifierDef> {
        self.qualifiers.get(canonical)
    }

    fn qualifiers_in_scope(&self, scope: &str) -> Vec<&QualifierDef> {
        self.qualifiers
            .values()
            .filter(|definition| {
                definition
                    .name
                    .rsplit_once('.')
                    .is_some_and(|(prefix, _)| prefix == scope)
            })
            .collect()
    }

    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([sub.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(element) = self.types.get(&current) else {
                continue;
            };
            for parent in element.super_name.iter().chain(element.interfaces.iter()) {
                if parent == sup {
                    return true;
                }
                queue.push_back(parent.clone());
            }
        }
        false
    }
}

/// Builds type representations from signatures, resolving type variables
/// through the enclosing generic declarations.
struct TypeBuilder<'a> {
    index: &'a ClassIndex,
    scopes: Vec<&'a [TypeParamSig]>,
    visiting: BTreeSet<String>,
}

impl<'a> TypeBuilder<'a> {
    fn new(index: &'a ClassIndex, scopes: Vec<&'a [TypeParamSig]>) -> Self {
        Self {
            index,
            scopes,
            visiting: BTreeSet::new(),
        }
    }

    fn build(&mut self, sig: &TypeSig) -> AnnotatedType {
        match sig {
            TypeSig::Base(primitive) => AnnotatedType::primitive(*primitive),
            TypeSig::Void => AnnotatedType::void(),
            TypeSig::Array(component) => AnnotatedType::array(self.build(component)),
            TypeSig::Class { name, args } => {
                let arguments = args.iter().map(|arg| self.build_argument(arg)).collect();
                AnnotatedType::declared(&self.index.canonical_of(name), arguments)
            }
            TypeSig::TypeVar(name) => self.type_variable(name),
        }
    }

    fn build_argument(&mut self, arg: &TypeArgSig) -> AnnotatedType {
        match arg {
            TypeArgSig::Any => AnnotatedType::wildcard(AnnotatedType::object(), AnnotatedType::null()),
            TypeArgSig::Extends(bound) => {
                AnnotatedType::wildcard(self.build(bound), AnnotatedType::null())
            }
            TypeArgSig::Super(bound) => {
                AnnotatedType::wildcard(AnnotatedType::object(), self.build(bound))
            }
            TypeArgSig::Exact(ty) => self.build(ty),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a [TypeSig]> {
        self.scopes.iter().find_map(|scope| {
            scope
                .iter()
                .find(|param| param.name == name)
                .map(|param| param.bounds.as_slice())
        })
    }

    fn type_variable(&mut self, name: &str) -> AnnotatedType {
        let bounds = self.lookup(name).unwrap_or(&[]);
        let upper = if self.visiting.contains(name) {
            self.erased_bound(bounds)
        } else {
            self.visiting.insert(name.to_string());
            let upper = match bounds {
                [] => AnnotatedType::object(),
                [bound] => self.build(bound),
                bounds => AnnotatedType::new(TypeKind::Intersection {
                    bounds: bounds.iter().map(|bound| self.build(bound)).collect(),
                }),
            };
            self.visiting.remove(name);
            upper
        };
        AnnotatedType::type_variable(name, upper, AnnotatedType::null())
    }

    fn erased_bound(&self, bounds: &[TypeSig]) -> AnnotatedType {
        match bounds.first() {
            Some(TypeSig::Class { name, .. }) => {
                AnnotatedType::declared(&self.index.canonical_of(name), Vec::new())
            }
            _ => AnnotatedType::object(),
        }
    }
}

fn package_of(internal: &str) -> String {
    internal
        .rsplit_once('/')
        .map(|(package, _)| package.replace('/', "."))
        .unwrap_or_default()
}

fn type_element(class: ClassFile) -> TypeElement {
    let own_entry = class
        .inner_classes
        .iter()
        .find(|entry| entry.inner == class.name)
        .cloned();
    let nested = class
        .inner_classes
        .iter()
        .filter(|entry| entry.outer.as_deref() == Some(class.name.as_str()))
        .map(|entry| entry.inner.clone())
        .collect();
    let access_flags = own_entry
        .as_ref()
        .map(|entry| entry.access_flags)
        .unwrap_or(class.access_flags);
    let enclosing = own_entry.as_ref().and_then(|entry| entry.outer.clone());
    let simple_name = own_entry
        .as_ref()
        .and_then(|entry| entry.simple_name.clone())
        .unwrap_or_else(|| {
            let tail = class.name.rsplit('/').next().unwrap_or(&class.name);
            tail.rsplit('$').next().unwrap_or(tail).to_string()
        });

    let signature = class
        .signature
        .as_deref()
        .and_then(|signature| match parse_class_signature(signature) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!("ignoring class signature of {}: {err:#}", class.name);
                None
            }
        })
        .unwrap_or_else(|| ClassSig {
            type_params: Vec::new(),
            superclass: class.super_name.as_deref().map(TypeSig::class),
            interfaces: class.interfaces.iter().map(|name| TypeSig::class(name)).collect(),
        });

    let is_record = class.is_record || class.super_name.as_deref() == Some(RECORD);
    let mut element = TypeElement {
        internal_name: class.name.clone(),
        canonical_name: String::new(),
        simple_name,
        package: package_of(&class.name),
        kind: ClassKind::from_flags(class.access_flags),
        access_flags,
        is_record,
        enclosing,
        nested,
        super_name: class.super_name,
        interfaces: class.interfaces,
        signature,
        fields: Vec::new(),
        methods: Vec::new(),
        annotations: class.annotations,
        type_annotations: class.type_annotations,
    };

    for field in class.fields {
        if field.access_flags & ACC_SYNTHETIC != 0 {
            continue;
        }
        let signature = field.signature.as_deref().unwrap_or(&field.descriptor);
        let ty = match parse_field_signature(signature)
            .or_else(|_| parse_field_signature(&field.descriptor))
        {
            Ok(ty) => ty,
            Err(err) => {
                debug!("skipping field {}.{}: {err:#}", class.name, field.name);
                continue;
            }
        };
        element.fields.push(FieldElement {
            name: field.name,
            descriptor: field.descriptor,
            access_flags: field.access_flags,
            ty,
            constant: field.constant,
            annotations: field.annotations,
            type_annotations: field.type_annotations,
        });
    }

    for method in class.methods {
        // Bridges share name and erased parameters with the method they forward to.
        if method.name == "<clinit>" || method.access_flags & (ACC_SYNTHETIC | ACC_BRIDGE) != 0 {
            continue;
        }
        let signature = match method_signature(
            &element,
            &method.name,
            &method.descriptor,
            method.signature.as_deref(),
        ) {
            Ok(signature) => signature,
            Err(err) => {
                debug!("skipping method {}.{}: {err:#}", class.name, method.name);
                continue;
            }
        };
        element.methods.push(MethodElement {
            name: method.name,
            descriptor: method.descriptor,
            access_flags: method.access_flags,
            signature,
            annotations: method.annotations,
            parameter_annotations: method.parameter_annotations,
            type_annotations: method.type_annotations,
        });
    }
    element
}

fn method_signature(
    owner: &TypeElement,
    name: &str,
    descriptor: &str,
    signature: Option<&str>,
) -> anyhow::Result<MethodSig> {
    if let Some(signature) = signature
        && let Ok(parsed) = parse_method_signature(signature)
    {
        return Ok(parsed);
    }
    let mut parsed = parse_method_signature(descriptor)?;
    if parsed.params.len() != method_param_count(descriptor)? {
        anyhow::bail!("descriptor parameter count mismatch for {descriptor}");
    }
    if name == "<init>"
        && owner.is_inner()
        && let Some(outer) = owner.enclosing.as_deref()
        && leads_with_outer_instance(descriptor, outer)?
    {
        parsed.params.remove(0);
    }
    Ok(parsed)
}

fn compute_canonical(internal: &str, types: &BTreeMap<String, TypeElement>) -> String {
    let mut segments = Vec::new();
    let mut current = internal;
    let mut seen = BTreeSet::new();
    while let Some(element) = types.get(current) {
        if !seen.insert(current) {
            break;
        }
        match element.enclosing.as_deref() {
            Some(outer) => {
                segments.push(element.simple_name.clone());
                current = outer;
            }
            None => break,
        }
    }
    let mut canonical = canonical_name(current);
    for segment in segments.iter().rev() {
        canonical.push('.');
        canonical.push_str(segment);
    }
    canonical
}

fn annotation_definition(element: &TypeElement, hierarchies: &Hierarchies) -> QualifierDef {
    let targets = element
        .annotations
        .iter()
        .find(|annotation| annotation.type_name == TARGET_ANNOTATION)
        .and_then(|annotation| annotation.elements.get("value"))
        .map(|value| {
            let values = match value {
                AnnotationValue::Array(values) => values.as_slice(),
                single => std::slice::from_ref(single),
            };
            values
                .iter()
                .filter_map(|value| match value {
                    AnnotationValue::Enum { name, .. } => DeclarationTarget::from_element_type(name),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_else(DeclarationTarget::implicit);
    let members = element
        .methods
        .iter()
        .filter(|method| !method.is_static() && !method.is_constructor())
        .filter_map(|method| {
            annotation_member_type(&method.descriptor)
                .ok()
                .map(|member| (method.name.clone(), member))
        })
        .collect();
    QualifierDef::new(&element.canonical_name, targets, members, hierarchies)
}
