//! Resolves one parsed overlay file against the program model.
//!
//! The output is a set of contributions: for every element the file touched, a
//! copy of the element's type that carries only the file's qualifiers, plus the
//! declaration qualifiers and fake overrides the file declared. The engine
//! decides how contributions of different files combine.

use std::collections::BTreeMap;

use crate::ast::{
    AnnotationExpr, CompilationUnit, EnumConstantDecl, FieldDecl, Member, MethodDecl, Modifiers,
    OverlayFile, Parameter, TypeDecl, TypeDeclKind, TypeParameter,
};
use crate::atype::{AnnotatedType, ElementType, ExecutableType, TypeKind};
use crate::diagnostics::Reporter;
use crate::imports::ImportTable;
use crate::matcher::{candidate_methods, describe_parameters, find_inherited, find_nested};
use crate::merger::{QualifierSource, TypeMerger, TypeVariableScope};
use crate::model::{ClassKind, ElementId, ProgramModel, TypeElement};
use crate::qualifier::{DeclarationTarget, NO_OVERLAY_WARNING, Qualifier, QualifierDef};
use crate::values::{Scope, ValueEvaluator};

/// Where an overlay file came from; decides precedence and private-member handling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) enum OverlayKind {
    /// Built-in or platform-tree overlays describing the runtime library.
    Platform,
    /// Overlays named by the user.
    User,
    /// Overlays standing in for a compilation unit's own source.
    Shadow,
}

impl OverlayKind {
    pub(crate) fn skips_private(self, merge_with_source: bool) -> bool {
        match self {
            OverlayKind::Platform => true,
            OverlayKind::User => !merge_with_source,
            OverlayKind::Shadow => false,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            OverlayKind::Platform => "platform",
            OverlayKind::User => "user",
            OverlayKind::Shadow => "shadow",
        }
    }
}

/// An overlay method declared on a type that only inherits the real method.
#[derive(Clone, Debug)]
pub(crate) struct FakeOverride {
    /// The inherited real method.
    pub(crate) method: ElementId,
    /// Internal name of the type whose overlay declared the method.
    pub(crate) declaring: String,
    pub(crate) ty: ExecutableType,
}

/// Everything one overlay file contributes.
#[derive(Debug, Default)]
pub(crate) struct Contributions {
    pub(crate) types: BTreeMap<ElementId, ElementType>,
    pub(crate) declarations: BTreeMap<ElementId, Vec<Qualifier>>,
    pub(crate) fake_overrides: Vec<FakeOverride>,
}

impl Contributions {
    fn record_type(&mut self, id: ElementId, ty: ElementType) {
        match self.types.get_mut(&id) {
            Some(existing) => existing.replace_from(&ty),
            None => {
                self.types.insert(id, ty);
            }
        }
    }

    fn record_declarations(&mut self, id: ElementId, qualifiers: Vec<Qualifier>) {
        if qualifiers.is_empty() {
            return;
        }
        let recorded = self.declarations.entry(id).or_default();
        for qualifier in qualifiers {
            recorded.retain(|existing| existing.name != qualifier.name);
            recorded.push(qualifier);
        }
    }

    /// Elements with any contribution.
    pub(crate) fn touched(&self) -> impl Iterator<Item = &ElementId> {
        self.types.keys().chain(
            self.declarations
                .keys()
                .filter(|id| !self.types.contains_key(*id)),
        )
    }
}

/// Resolves annotation-uses of one file to qualifiers.
struct Annotator<'m, 'r> {
    imports: ImportTable<'m>,
    evaluator: ValueEvaluator<'m>,
    package: Option<String>,
    enclosing: Vec<String>,
    reporter: Reporter<'r>,
}

impl<'m> Annotator<'m, '_> {
    fn resolve_all(&mut self, annotations: &[AnnotationExpr]) -> Vec<(Qualifier, &'m QualifierDef)> {
        let mut resolved = Vec::new();
        for annotation in annotations {
            let Some(definition) = self.imports.qualifier(&annotation.name) else {
                self.reporter.not_found(
                    annotation.position,
                    format!("Unknown annotation: @{}", annotation.name),
                );
                continue;
            };
            let scope = Scope {
                package: self.package.as_deref(),
                enclosing: &self.enclosing,
            };
            if let Some(qualifier) = self.evaluator.qualifier(
                annotation,
                definition,
                &self.imports,
                scope,
                &self.reporter,
            ) {
                resolved.push((qualifier, definition));
            }
        }
        resolved
    }

    /// Qualifiers that belong on the declaration rather than on its type.
    fn declaration_qualifiers(&mut self, annotations: &[AnnotationExpr]) -> Vec<Qualifier> {
        self.resolve_all(annotations)
            .into_iter()
            .filter(|(_, definition)| {
                !definition.is_type_qualifier
                    || definition.targets.iter().any(|target| {
                        !matches!(
                            target,
                            DeclarationTarget::TypeUse | DeclarationTarget::TypeParameter
                        )
                    })
            })
            .map(|(qualifier, _)| qualifier)
            .collect()
    }
}

impl QualifierSource for Annotator<'_, '_> {
    fn type_qualifiers(&mut self, annotations: &[AnnotationExpr]) -> Vec<Qualifier> {
        self.resolve_all(annotations)
            .into_iter()
            .filter(|(_, definition)| definition.is_type_qualifier)
            .map(|(qualifier, _)| qualifier)
            .collect()
    }
}

fn suppresses_warnings(annotations: &[AnnotationExpr]) -> bool {
    annotations
        .iter()
        .any(|annotation| annotation.simple_name() == NO_OVERLAY_WARNING)
}

/// Resolve every declaration of `file` and collect what it contributes.
pub(crate) fn process_file(
    model: &dyn ProgramModel,
    file: &OverlayFile,
    kind: OverlayKind,
    merge_with_source: bool,
    reporter: Reporter<'_>,
) -> Contributions {
    let imports = ImportTable::build(model, &file.units, &reporter);
    let mut processor = FileProcessor {
        model,
        annotator: Annotator {
            imports,
            evaluator: ValueEvaluator::new(model),
            package: None,
            enclosing: Vec::new(),
            reporter,
        },
        reporter,
        skip_private: kind.skips_private(merge_with_source),
        out: Contributions::default(),
    };
    for unit in &file.units {
        processor.process_unit(unit);
    }
    processor.out
}

struct FileProcessor<'m, 'r> {
    model: &'m dyn ProgramModel,
    annotator: Annotator<'m, 'r>,
    reporter: Reporter<'r>,
    skip_private: bool,
    out: Contributions,
}

impl<'m> FileProcessor<'m, '_> {
    fn process_unit(&mut self, unit: &CompilationUnit) {
        let mut quiet = false;
        self.annotator.package = None;
        if let Some(package) = &unit.package {
            quiet = suppresses_warnings(&package.annotations);
            self.annotator.package = Some(package.name.clone());
            if self.model.has_package(&package.name) {
                let qualifiers = self
                    .annotator
                    .resolve_all(&package.annotations)
                    .into_iter()
                    .map(|(qualifier, _)| qualifier)
                    .collect();
                self.out
                    .record_declarations(ElementId::package(&package.name), qualifiers);
            } else if !quiet {
                self.reporter.not_found(
                    package.position,
                    format!("Package not found: {}", package.name),
                );
            }
        }
        for decl in &unit.types {
            if decl.kind == TypeDeclKind::Empty {
                continue;
            }
            let canonical = match &self.annotator.package {
                Some(package) => format!("{package}.{}", decl.name),
                None => decl.name.clone(),
            };
            let model = self.model;
            match model.find_type(&canonical) {
                Some(element) => {
                    self.process_type(decl, element, &TypeVariableScope::new(), &[]);
                }
                None if quiet || suppresses_warnings(&decl.annotations) => {}
                None => self
                    .reporter
                    .not_found(decl.position, format!("Type not found: {canonical}")),
            }
        }
    }

    fn process_type(
        &mut self,
        decl: &TypeDecl,
        element: &'m TypeElement,
        outer_scope: &TypeVariableScope,
        outer_params: &[&[TypeParameter]],
    ) {
        if decl.kind == TypeDeclKind::Annotation {
            self.reporter.unsupported(
                decl.position,
                format!("Skipping annotation type {}", element.canonical_name),
            );
            return;
        }
        if self.skip_private && (decl.modifiers.is_private || element.is_private()) {
            return;
        }
        let declared_enum = decl.kind == TypeDeclKind::Enum;
        if declared_enum != (element.kind == ClassKind::Enum) {
            self.reporter.mismatch(
                decl.position,
                format!(
                    "{} is {}, but the overlay declares it as {}",
                    element.canonical_name,
                    element.kind.describe(),
                    describe_decl_kind(decl.kind)
                ),
            );
            return;
        }

        self.annotator.enclosing.push(element.canonical_name.clone());
        let mut scope = if element.is_inner() {
            outer_scope.clone()
        } else {
            TypeVariableScope::new()
        };
        let mut params: Vec<&[TypeParameter]> = if element.is_inner() {
            outer_params.to_vec()
        } else {
            Vec::new()
        };
        params.insert(0, decl.type_parameters.as_slice());

        self.process_class_type(decl, element, &mut scope);
        for constant in &decl.enum_constants {
            self.process_enum_constant(decl, element, constant, &scope);
        }
        if !decl.record_components.is_empty() {
            self.process_record_components(decl, element, &scope, &params);
        }
        for member in &decl.members {
            match member {
                Member::Field(field) => self.process_field(element, field, &scope),
                Member::Method(method) => self.process_method(element, method, &scope, &params),
                Member::Type(nested) => {
                    if nested.kind == TypeDeclKind::Empty {
                        continue;
                    }
                    let model = self.model;
                    match find_nested(model, element, &nested.name) {
                        Some(inner) => self.process_type(nested, inner, &scope, &params),
                        None if suppresses_warnings(&nested.annotations) => {}
                        None => self.reporter.not_found(
                            nested.position,
                            format!(
                                "Class/interface {} not found in type {}",
                                nested.name, element.canonical_name
                            ),
                        ),
                    }
                }
            }
        }
        self.annotator.enclosing.pop();
    }

    /// Class annotations, type parameters and supertypes.
    fn process_class_type(
        &mut self,
        decl: &TypeDecl,
        element: &TypeElement,
        scope: &mut TypeVariableScope,
    ) {
        let id = element.id();
        let Some(mut layer) = self.layer(&id) else {
            return;
        };
        let ElementType::Class(class) = &mut layer else {
            return;
        };

        let outer = scope.clone();
        let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, &outer);
        merger.annotate(&decl.annotations, &mut class.declared);
        if let TypeKind::Declared { type_arguments, .. } = &mut class.declared.kind {
            if !decl.type_parameters.is_empty() && decl.type_parameters.len() != type_arguments.len() {
                self.reporter.mismatch(
                    decl.position,
                    format!(
                        "{} declares {} type parameters, but the real type has {}",
                        element.canonical_name,
                        decl.type_parameters.len(),
                        type_arguments.len()
                    ),
                );
            } else {
                for (index, (parameter, real)) in decl
                    .type_parameters
                    .iter()
                    .zip(type_arguments.iter_mut())
                    .enumerate()
                {
                    merger.merge_type_parameter(parameter, real);
                    scope.insert(parameter.name.clone(), real.clone());
                    self.out
                        .record_type(id.type_parameter(index), ElementType::variable(real.clone()));
                }
            }
        }

        let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, scope);
        for supertype in decl.extends.iter().chain(decl.implements.iter()) {
            let written = supertype.class_name().unwrap_or_default();
            let simple = written.rsplit('.').next().unwrap_or(&written);
            let matched = class.supertypes.iter_mut().find(|real| {
                real.name()
                    .is_some_and(|name| name == written || name.rsplit('.').next() == Some(simple))
            });
            match matched {
                Some(real) => merger.merge(supertype, &[], real),
                None => self.reporter.not_found(
                    supertype.position,
                    format!(
                        "Supertype {written} not found for {}",
                        element.canonical_name
                    ),
                ),
            }
        }

        let declarations = self.annotator.declaration_qualifiers(&decl.annotations);
        self.out.record_declarations(id.clone(), declarations);
        self.out.record_type(id, layer);
    }

    fn process_enum_constant(
        &mut self,
        decl: &TypeDecl,
        element: &TypeElement,
        constant: &EnumConstantDecl,
        scope: &TypeVariableScope,
    ) {
        let Some(field) = element
            .enum_constants()
            .find(|field| field.name == constant.name)
        else {
            if !suppresses_warnings(&decl.annotations) {
                self.reporter.not_found(
                    constant.position,
                    format!(
                        "Enum constant {} not found in type {}",
                        constant.name, element.canonical_name
                    ),
                );
            }
            return;
        };
        let id = field.id(element);
        let Some(mut layer) = self.layer(&id) else {
            return;
        };
        if let ElementType::Variable { ty } = &mut layer {
            let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, scope);
            merger.annotate(&constant.annotations, ty);
        }
        let declarations = self.annotator.declaration_qualifiers(&constant.annotations);
        self.out.record_declarations(id.clone(), declarations);
        self.out.record_type(id, layer);
    }

    /// Each component reaches its field, its accessor and the matching parameter
    /// of the canonical constructor. Members the overlay declares itself win.
    fn process_record_components(
        &mut self,
        decl: &TypeDecl,
        element: &'m TypeElement,
        scope: &TypeVariableScope,
        params: &[&[TypeParameter]],
    ) {
        if !element.is_record {
            self.reporter.mismatch(
                decl.position,
                format!(
                    "{} is {}, but the overlay declares it as a record",
                    element.canonical_name,
                    element.kind.describe()
                ),
            );
            return;
        }
        for component in &decl.record_components {
            if !declares_field(decl, &component.name) {
                self.transfer_to_field(element, component, scope);
            }
            if !declares_accessor(decl, &component.name) {
                self.transfer_to_accessor(element, component, scope);
            }
        }
        if declares_canonical_constructor(decl) {
            return;
        }
        let constructor = MethodDecl {
            name: decl.name.clone(),
            modifiers: Modifiers::default(),
            annotations: Vec::new(),
            type_parameters: Vec::new(),
            return_type: None,
            receiver: None,
            parameters: decl.record_components.clone(),
            position: decl.position,
        };
        self.process_method(element, &constructor, scope, params);
    }

    fn transfer_to_field(
        &mut self,
        element: &TypeElement,
        component: &Parameter,
        scope: &TypeVariableScope,
    ) {
        let Some(field) = element.field(&component.name) else {
            self.reporter.not_found(
                component.position,
                format!(
                    "Record component {} has no field in type {}",
                    component.name, element.canonical_name
                ),
            );
            return;
        };
        if self.skip_private && field.is_private() {
            return;
        }
        let id = field.id(element);
        let Some(mut layer) = self.layer(&id) else {
            return;
        };
        if let ElementType::Variable { ty } = &mut layer {
            let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, scope);
            merge_parameter(&mut merger, self.reporter, component, ty);
        }
        let declarations = self.annotator.declaration_qualifiers(&component.annotations);
        self.out.record_declarations(id.clone(), declarations);
        self.out.record_type(id, layer);
    }

    fn transfer_to_accessor(
        &mut self,
        element: &TypeElement,
        component: &Parameter,
        scope: &TypeVariableScope,
    ) {
        let accessor = element
            .methods_named(&component.name)
            .into_iter()
            .find(|method| !method.is_static() && method.signature.params.is_empty());
        let Some(accessor) = accessor else {
            self.reporter.not_found(
                component.position,
                format!(
                    "Record component {} has no accessor in type {}",
                    component.name, element.canonical_name
                ),
            );
            return;
        };
        let id = accessor.id(element);
        let Some(mut layer) = self.layer(&id) else {
            return;
        };
        if let ElementType::Executable(executable) = &mut layer {
            let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, scope);
            merge_parameter(&mut merger, self.reporter, component, &mut executable.return_type);
        }
        let declarations = self.annotator.declaration_qualifiers(&component.annotations);
        self.out.record_declarations(id.clone(), declarations);
        self.out.record_type(id, layer);
    }

    fn process_field(&mut self, element: &TypeElement, decl: &FieldDecl, scope: &TypeVariableScope) {
        for variable in &decl.variables {
            let Some(field) = element.field(&variable.name) else {
                self.reporter.not_found(
                    variable.position,
                    format!(
                        "Field {} not found in type {}",
                        variable.name, element.canonical_name
                    ),
                );
                continue;
            };
            if self.skip_private && (decl.modifiers.is_private || field.is_private()) {
                continue;
            }
            let id = field.id(element);
            let Some(mut layer) = self.layer(&id) else {
                continue;
            };
            if let ElementType::Variable { ty } = &mut layer {
                let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, scope);
                merger.merge(&variable.ty, &decl.annotations, ty);
            }
            let declarations = self.annotator.declaration_qualifiers(&decl.annotations);
            self.out.record_declarations(id.clone(), declarations);
            self.out.record_type(id, layer);
        }
    }

    fn process_method(
        &mut self,
        element: &'m TypeElement,
        decl: &MethodDecl,
        scope: &TypeVariableScope,
        outer_params: &[&[TypeParameter]],
    ) {
        let mut params = vec![decl.type_parameters.as_slice()];
        params.extend_from_slice(outer_params);
        let model = self.model;
        let candidates =
            candidate_methods(model, element, decl, &params, Some(&self.annotator.imports));
        if candidates.len() > 1 {
            let found: Vec<&str> = candidates
                .iter()
                .map(|method| method.descriptor.as_str())
                .collect();
            self.reporter.mismatch(
                decl.position,
                format!(
                    "{}({}) in type {} matches several members: {}",
                    describe_callable(decl, element),
                    describe_parameters(&decl.parameters),
                    element.canonical_name,
                    found.join(", ")
                ),
            );
            return;
        }
        if let Some(method) = candidates.first().copied() {
            if self.skip_private && (decl.modifiers.is_private || method.is_private()) {
                return;
            }
            let id = method.id(element);
            let Some(mut layer) = self.layer(&id) else {
                return;
            };
            if let ElementType::Executable(executable) = &mut layer {
                let is_inner = element.is_inner();
                self.process_callable(decl, executable, scope, Some(&id), method.is_static(), is_inner);
            }
            let declarations = self.annotator.declaration_qualifiers(&decl.annotations);
            self.out.record_declarations(id.clone(), declarations);
            self.out.record_type(id, layer);
            return;
        }

        let inherited =
            find_inherited(model, element, decl, &params, Some(&self.annotator.imports));
        if let Some((declaring, method)) = inherited {
            if self.skip_private && decl.modifiers.is_private {
                return;
            }
            let id = method.id(declaring);
            let Some(ElementType::Executable(real)) = model.element_type(&id) else {
                return;
            };
            let mut executable = ElementType::Executable(real).without_qualifiers();
            if let ElementType::Executable(executable) = &mut executable {
                self.process_callable(decl, executable, scope, None, method.is_static(), true);
                self.out.fake_overrides.push(FakeOverride {
                    method: id,
                    declaring: element.internal_name.clone(),
                    ty: executable.clone(),
                });
            }
            return;
        }

        self.reporter.not_found(
            decl.position,
            format!(
                "{}({}) not found in type {}",
                describe_callable(decl, element),
                describe_parameters(&decl.parameters),
                element.canonical_name
            ),
        );
    }

    /// Merge a method or constructor declaration onto `executable`. With an
    /// `id`, parameters and type parameters are also recorded as elements.
    fn process_callable(
        &mut self,
        decl: &MethodDecl,
        executable: &mut ExecutableType,
        outer_scope: &TypeVariableScope,
        id: Option<&ElementId>,
        is_static: bool,
        receiver_allowed: bool,
    ) {
        let mut scope = outer_scope.clone();
        if !decl.type_parameters.is_empty() {
            if decl.type_parameters.len() != executable.type_variables.len() {
                self.reporter.mismatch(
                    decl.position,
                    format!(
                        "Method {} declares {} type parameters, but the real method has {}",
                        decl.name,
                        decl.type_parameters.len(),
                        executable.type_variables.len()
                    ),
                );
            } else {
                let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, outer_scope);
                for (index, (parameter, real)) in decl
                    .type_parameters
                    .iter()
                    .zip(executable.type_variables.iter_mut())
                    .enumerate()
                {
                    merger.merge_type_parameter(parameter, real);
                    scope.insert(parameter.name.clone(), real.clone());
                    if let Some(id) = id {
                        self.out
                            .record_type(id.type_parameter(index), ElementType::variable(real.clone()));
                    }
                }
            }
        }

        let mut merger = TypeMerger::new(&mut self.annotator, self.reporter, &scope);
        match &decl.return_type {
            Some(return_type) => merger.merge(return_type, &decl.annotations, &mut executable.return_type),
            None => merger.annotate(&decl.annotations, &mut executable.return_type),
        }

        if let Some(receiver) = &decl.receiver {
            match executable.receiver.as_mut() {
                Some(real) => merger.merge(&receiver.ty, &receiver.annotations, real),
                None => {
                    let what = if decl.is_constructor() && !receiver_allowed {
                        "a top-level constructor"
                    } else if is_static {
                        "a static method"
                    } else {
                        "a member without a receiver"
                    };
                    self.reporter.mismatch(
                        decl.position,
                        format!(
                            "Receiver parameter declared on {what}: {}",
                            decl.name
                        ),
                    );
                }
            }
        }

        let offset = executable
            .parameters
            .len()
            .saturating_sub(decl.parameters.len());
        for (index, parameter) in decl.parameters.iter().enumerate() {
            if let Some(real) = executable.parameters.get_mut(offset + index) {
                merge_parameter(&mut merger, self.reporter, parameter, real);
            }
        }

        let Some(id) = id else {
            return;
        };
        for (index, parameter) in decl.parameters.iter().enumerate() {
            let Some(real) = executable.parameters.get(offset + index) else {
                continue;
            };
            let Some(parameter_id) = id.parameter(offset + index) else {
                continue;
            };
            self.out
                .record_type(parameter_id.clone(), ElementType::variable(real.clone()));
            let declarations = self.annotator.declaration_qualifiers(&parameter.annotations);
            self.out.record_declarations(parameter_id, declarations);
        }
    }

    /// The file's current contribution for `id`, or an unqualified copy of its real type.
    fn layer(&mut self, id: &ElementId) -> Option<ElementType> {
        if let Some(existing) = self.out.types.remove(id) {
            return Some(existing);
        }
        self.model
            .element_type(id)
            .map(|ty| ty.without_qualifiers())
    }
}

/// Merge a formal parameter onto its real type. A varargs parameter spells the
/// component of a real array; its `...` annotations belong to the array itself.
fn merge_parameter(
    merger: &mut TypeMerger<'_>,
    reporter: Reporter<'_>,
    parameter: &Parameter,
    real: &mut AnnotatedType,
) {
    if !parameter.is_varargs {
        merger.merge(&parameter.ty, &parameter.annotations, real);
        return;
    }
    let TypeKind::Array { component } = &mut real.kind else {
        reporter.mismatch(
            parameter.position,
            format!(
                "Varargs parameter {} does not match a real array parameter",
                parameter.name
            ),
        );
        return;
    };
    merger.merge(&parameter.ty, &parameter.annotations, component);
    merger.annotate(&parameter.varargs_annotations, real);
}

fn declares_field(decl: &TypeDecl, name: &str) -> bool {
    decl.members.iter().any(|member| {
        matches!(member, Member::Field(field)
            if field.variables.iter().any(|variable| variable.name == name))
    })
}

fn declares_accessor(decl: &TypeDecl, name: &str) -> bool {
    decl.members.iter().any(|member| {
        matches!(member, Member::Method(method)
            if !method.is_constructor() && method.name == name && method.parameters.is_empty())
    })
}

fn declares_canonical_constructor(decl: &TypeDecl) -> bool {
    decl.members.iter().any(|member| {
        matches!(member, Member::Method(method)
            if method.is_constructor() && method.parameters.len() == decl.record_components.len())
    })
}

fn describe_callable(decl: &MethodDecl, element: &TypeElement) -> String {
    if decl.is_constructor() {
        format!("Constructor {}", element.simple_name)
    } else {
        format!("Method {}", decl.name)
    }
}

fn describe_decl_kind(kind: TypeDeclKind) -> &'static str {
    match kind {
        TypeDeclKind::Class => "a class",
        TypeDeclKind::Interface => "an interface",
        TypeDeclKind::Enum => "an enum",
        TypeDeclKind::Annotation => "an annotation type",
        TypeDeclKind::Empty => "an empty declaration",
    }
}
