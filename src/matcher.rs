use std::collections::BTreeSet;

use crate::ast::{MethodDecl, Parameter, TypeParameter, TypeRef, TypeRefKind};
use crate::imports::ImportTable;
use crate::model::{ClassKind, MethodElement, ProgramModel, TypeElement};
use crate::signature::{TypeParamSig, TypeSig, canonical_name};

/// Bound lookups stop at this depth so `T extends U, U extends T` terminates.
const MAX_BOUND_DEPTH: usize = 8;

/// Every method or constructor of `owner` an overlay declaration can denote.
///
/// Parameters are compared after erasure: annotations and type arguments are
/// dropped and a type variable matches either by its own name or by the
/// erasure of its first bound. A qualified class name must equal the real
/// canonical name, or end with it at a `.` for a nested type written relative
/// to its outer class. An unqualified name resolves through `imports` when the
/// file imports it and otherwise compares by simple name.
pub(crate) fn candidate_methods<'m>(
    model: &'m dyn ProgramModel,
    owner: &'m TypeElement,
    decl: &MethodDecl,
    overlay_params: &[&[TypeParameter]],
    imports: Option<&ImportTable<'_>>,
) -> Vec<&'m MethodElement> {
    let name = if decl.is_constructor() {
        "<init>"
    } else {
        decl.name.as_str()
    };
    let declared: Vec<Vec<String>> = decl
        .parameters
        .iter()
        .map(|parameter| parameter_spellings(parameter, overlay_params, imports))
        .collect();
    let real_scopes = real_scopes(model, owner);
    owner
        .methods_named(name)
        .into_iter()
        .filter(|method| {
            let mut params = method.signature.params.as_slice();
            if method.is_constructor() && owner.kind == ClassKind::Enum {
                params = strip_enum_prefix(params, declared.len());
            }
            if params.len() != declared.len() {
                return false;
            }
            let mut scopes = vec![method.signature.type_params.as_slice()];
            scopes.extend(real_scopes.iter().copied());
            params.iter().zip(&declared).all(|(real, declared)| {
                let real = real_spellings(model, real, &scopes, 0);
                declared
                    .iter()
                    .any(|spelling| real.iter().any(|real| spelling_matches(spelling, real)))
            })
        })
        .collect()
}

/// The single method `decl` denotes, if exactly one matches.
pub(crate) fn find_method<'m>(
    model: &'m dyn ProgramModel,
    owner: &'m TypeElement,
    decl: &MethodDecl,
    overlay_params: &[&[TypeParameter]],
    imports: Option<&ImportTable<'_>>,
) -> Option<&'m MethodElement> {
    match candidate_methods(model, owner, decl, overlay_params, imports).as_slice() {
        [method] => Some(*method),
        _ => None,
    }
}

/// Search the supertypes of `owner` (superclass before interfaces, depth
/// first) for the method an overlay declared on a type that only inherits it.
pub(crate) fn find_inherited<'m>(
    model: &'m dyn ProgramModel,
    owner: &'m TypeElement,
    decl: &MethodDecl,
    overlay_params: &[&[TypeParameter]],
    imports: Option<&ImportTable<'_>>,
) -> Option<(&'m TypeElement, &'m MethodElement)> {
    if decl.is_constructor() {
        return None;
    }
    let mut visited = BTreeSet::new();
    search_supertypes(model, owner, decl, overlay_params, imports, &mut visited)
}

fn search_supertypes<'m>(
    model: &'m dyn ProgramModel,
    element: &'m TypeElement,
    decl: &MethodDecl,
    overlay_params: &[&[TypeParameter]],
    imports: Option<&ImportTable<'_>>,
    visited: &mut BTreeSet<String>,
) -> Option<(&'m TypeElement, &'m MethodElement)> {
    for parent in element.super_name.iter().chain(element.interfaces.iter()) {
        if !visited.insert(parent.clone()) {
            continue;
        }
        let Some(parent) = model.type_by_internal(parent) else {
            continue;
        };
        if let Some(method) = find_method(model, parent, decl, overlay_params, imports)
            && !method.is_private()
        {
            return Some((parent, method));
        }
        if let Some(found) =
            search_supertypes(model, parent, decl, overlay_params, imports, visited)
        {
            return Some(found);
        }
    }
    None
}

/// Member type of `owner` with the given simple name.
pub(crate) fn find_nested<'m>(
    model: &'m dyn ProgramModel,
    owner: &TypeElement,
    name: &str,
) -> Option<&'m TypeElement> {
    owner
        .nested
        .iter()
        .filter_map(|internal| model.type_by_internal(internal))
        .find(|nested| nested.simple_name == name)
}

/// The erased spelling of a parameter list, for messages.
pub(crate) fn describe_parameters(parameters: &[Parameter]) -> String {
    let spelled: Vec<String> = parameters
        .iter()
        .map(|parameter| {
            let mut spelling = erased(&parameter.ty);
            if parameter.is_varargs {
                spelling.push_str("...");
            }
            spelling
        })
        .collect();
    spelled.join(", ")
}

fn erased(ty: &TypeRef) -> String {
    match &ty.kind {
        TypeRefKind::Primitive(primitive) => primitive.keyword().to_string(),
        TypeRefKind::Void => "void".to_string(),
        TypeRefKind::Array(component) => format!("{}[]", erased(component)),
        TypeRefKind::Class(_) => ty.class_name().unwrap_or_default(),
        TypeRefKind::Wildcard { .. } => "?".to_string(),
    }
}

/// javac prepends the constant name and ordinal to enum constructors.
fn strip_enum_prefix(params: &[TypeSig], declared: usize) -> &[TypeSig] {
    if params.len() == declared + 2
        && matches!(&params[0], TypeSig::Class { name, .. } if name == "java/lang/String")
        && matches!(&params[1], TypeSig::Base(primitive) if primitive.keyword() == "int")
    {
        &params[2..]
    } else {
        params
    }
}

fn real_scopes<'m>(model: &'m dyn ProgramModel, owner: &'m TypeElement) -> Vec<&'m [TypeParamSig]> {
    let mut scopes = vec![owner.signature.type_params.as_slice()];
    let mut current = owner;
    while let Some(enclosing) = current
        .enclosing
        .as_deref()
        .and_then(|internal| model.type_by_internal(internal))
    {
        scopes.push(enclosing.signature.type_params.as_slice());
        current = enclosing;
    }
    scopes
}

fn parameter_spellings(
    parameter: &Parameter,
    scopes: &[&[TypeParameter]],
    imports: Option<&ImportTable<'_>>,
) -> Vec<String> {
    let spellings = declared_spellings(&parameter.ty, scopes, imports, 0);
    if parameter.is_varargs {
        spellings.into_iter().map(|spelling| spelling + "[]").collect()
    } else {
        spellings
    }
}

/// Erased spellings of an overlay type. Class names are qualified when written
/// qualified or imported, and simple otherwise.
fn declared_spellings(
    ty: &TypeRef,
    scopes: &[&[TypeParameter]],
    imports: Option<&ImportTable<'_>>,
    depth: usize,
) -> Vec<String> {
    match &ty.kind {
        TypeRefKind::Primitive(primitive) => vec![primitive.keyword().to_string()],
        TypeRefKind::Void => vec!["void".to_string()],
        TypeRefKind::Array(component) => declared_spellings(component, scopes, imports, depth)
            .into_iter()
            .map(|spelling| spelling + "[]")
            .collect(),
        TypeRefKind::Class(segments) => {
            if segments.len() > 1 {
                return vec![ty.class_name().unwrap_or_default()];
            }
            let simple = segments
                .last()
                .map(|segment| segment.name.clone())
                .unwrap_or_default();
            let variable = scopes
                .iter()
                .find_map(|scope| scope.iter().find(|param| param.name == simple));
            let Some(variable) = variable else {
                let imported = imports.and_then(|imports| imports.imported_type(&simple));
                return vec![imported.map(str::to_string).unwrap_or(simple)];
            };
            let mut spellings = vec![simple];
            match variable.bounds.first() {
                Some(bound) if depth < MAX_BOUND_DEPTH => {
                    spellings.extend(declared_spellings(bound, scopes, imports, depth + 1));
                }
                Some(_) => {}
                None => spellings.push("Object".to_string()),
            }
            spellings
        }
        TypeRefKind::Wildcard { .. } => vec!["Object".to_string()],
    }
}

/// Erased spellings of a real type: both simple and canonical for classes.
fn real_spellings(
    model: &dyn ProgramModel,
    sig: &TypeSig,
    scopes: &[&[TypeParamSig]],
    depth: usize,
) -> Vec<String> {
    match sig {
        TypeSig::Base(primitive) => vec![primitive.keyword().to_string()],
        TypeSig::Void => vec!["void".to_string()],
        TypeSig::Array(component) => real_spellings(model, component, scopes, depth)
            .into_iter()
            .map(|spelling| spelling + "[]")
            .collect(),
        TypeSig::Class { name, .. } => {
            let canonical = model
                .type_by_internal(name)
                .map(|element| element.canonical_name.clone())
                .unwrap_or_else(|| canonical_name(name));
            vec![simple_of_internal(name).to_string(), canonical]
        }
        TypeSig::TypeVar(name) => {
            let mut spellings = vec![name.clone()];
            let bound = scopes
                .iter()
                .find_map(|scope| scope.iter().find(|param| &param.name == name))
                .and_then(|param| param.bounds.first());
            match bound {
                Some(bound) if depth < MAX_BOUND_DEPTH => {
                    spellings.extend(real_spellings(model, bound, scopes, depth + 1));
                }
                Some(_) => {}
                None => spellings.push("Object".to_string()),
            }
            spellings
        }
    }
}

fn spelling_matches(declared: &str, real: &str) -> bool {
    if declared == real {
        return true;
    }
    declared.contains('.')
        && real
            .strip_suffix(declared)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn simple_of_internal(internal: &str) -> &str {
    let tail = internal.rsplit('/').next().unwrap_or(internal);
    tail.rsplit('$').next().unwrap_or(tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Member, TypeDecl};
    use crate::diagnostics::{DiagnosticSink, Reporter};
    use crate::parser::parse_overlay;
    use crate::test_harness::{ClassBuilder, model};

    fn overlay_type(source: &str) -> TypeDecl {
        let file = parse_overlay(source).expect("parse");
        file.units[0].types[0].clone()
    }

    fn methods(decl: &TypeDecl) -> Vec<&MethodDecl> {
        decl.members
            .iter()
            .filter_map(|member| match member {
                Member::Method(method) => Some(method),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn overloads_are_told_apart_by_erased_parameters() {
        let api = ClassBuilder::class("p/Api")
            .method("put", "(I)V")
            .method("put", "(Ljava/util/List;)V")
            .method("put", "([Ljava/lang/String;)V")
            .build();
        let index = model(vec![api]);
        let owner = index.find_type("p.Api").expect("type");
        let decl = overlay_type(
            "class Api { void put(java.util.List<String> a); void put(String... a); void put(int a); }",
        );
        let found: Vec<&str> = methods(&decl)
            .into_iter()
            .map(|method| {
                find_method(&index, owner, method, &[], None)
                    .map(|method| method.descriptor.as_str())
                    .unwrap_or("missing")
            })
            .collect();

        assert_eq!(
            found,
            vec!["(Ljava/util/List;)V", "([Ljava/lang/String;)V", "(I)V"]
        );
    }

    #[test]
    fn type_variables_match_by_name_or_bound() {
        let api = ClassBuilder::class("p/Api")
            .generic_method(
                "first",
                "([Ljava/lang/Number;)Ljava/lang/Number;",
                "<T:Ljava/lang/Number;>([TT;)TT;",
            )
            .build();
        let index = model(vec![api]);
        let owner = index.find_type("p.Api").expect("type");
        let by_name = overlay_type("class Api { <T extends Number> T first(T[] values); }");
        let by_bound = overlay_type("class Api { Number first(Number[] values); }");

        let params = &by_name.members;
        let Member::Method(method) = &params[0] else {
            panic!("method");
        };
        let scopes = [method.type_parameters.as_slice()];
        assert!(find_method(&index, owner, method, &scopes, None).is_some());
        assert!(find_method(&index, owner, methods(&by_bound)[0], &[], None).is_some());
    }

    #[test]
    fn constructors_match_by_parameters() {
        let api = ClassBuilder::class("p/Api")
            .method("<init>", "()V")
            .method("<init>", "(Ljava/lang/String;)V")
            .build();
        let index = model(vec![api]);
        let owner = index.find_type("p.Api").expect("type");
        let decl = overlay_type("class Api { Api(String name); }");

        let found = find_method(&index, owner, methods(&decl)[0], &[], None).expect("constructor");
        assert_eq!(found.descriptor, "(Ljava/lang/String;)V");
    }

    #[test]
    fn inherited_methods_are_found_through_superclass_first() {
        let iface = ClassBuilder::interface("p/Runner").method("run", "()V").build();
        let base = ClassBuilder::class("p/Base").method("run", "()V").build();
        let sub = ClassBuilder::class("p/Sub")
            .extends("p/Base")
            .implements("p/Runner")
            .build();
        let index = model(vec![iface, base, sub]);
        let owner = index.find_type("p.Sub").expect("type");
        let decl = overlay_type("class Sub { void run(); }");
        let method = methods(&decl)[0];

        assert!(find_method(&index, owner, method, &[], None).is_none());
        let (declaring, _) = find_inherited(&index, owner, method, &[], None).expect("inherited");
        assert_eq!(declaring.internal_name, "p/Base");
    }

    #[test]
    fn nested_types_match_by_simple_name() {
        let outer = ClassBuilder::class("p/Outer")
            .nested("p/Outer$Entry", "p/Outer", "Entry", 0x0009)
            .build();
        let entry = ClassBuilder::class("p/Outer$Entry")
            .nested("p/Outer$Entry", "p/Outer", "Entry", 0x0009)
            .build();
        let index = model(vec![outer, entry]);
        let owner = index.find_type("p.Outer").expect("type");

        assert_eq!(
            find_nested(&index, owner, "Entry").map(|t| t.internal_name.as_str()),
            Some("p/Outer$Entry")
        );
        assert!(find_nested(&index, owner, "Missing").is_none());
    }

    #[test]
    fn describes_parameters_for_messages() {
        let decl = overlay_type("class A { void m(int[] a, java.util.List<String> b, Object... c); }");
        assert_eq!(
            describe_parameters(&methods(&decl)[0].parameters),
            "int[], java.util.List, Object..."
        );
    }

    fn descriptors<'m>(methods: Vec<&'m MethodElement>) -> Vec<&'m str> {
        methods
            .into_iter()
            .map(|method| method.descriptor.as_str())
            .collect()
    }

    #[test]
    fn qualified_parameter_types_compare_by_canonical_name() {
        let api = ClassBuilder::class("p/Api")
            .method("put", "(Ljava/awt/List;)V")
            .method("put", "(Ljava/util/List;)V")
            .build();
        let only_awt = ClassBuilder::class("p/Legacy")
            .method("put", "(Ljava/awt/List;)V")
            .build();
        let index = model(vec![api, only_awt]);
        let decl = overlay_type("class Api { void put(java.util.List<String> a); }");
        let method = methods(&decl)[0];

        let owner = index.find_type("p.Api").expect("type");
        assert_eq!(
            find_method(&index, owner, method, &[], None).map(|m| m.descriptor.as_str()),
            Some("(Ljava/util/List;)V")
        );
        let legacy = index.find_type("p.Legacy").expect("type");
        assert!(find_method(&index, legacy, method, &[], None).is_none());
    }

    #[test]
    fn unqualified_parameter_types_resolve_through_imports() {
        let api = ClassBuilder::class("p/Api")
            .method("put", "(Ljava/awt/List;)V")
            .method("put", "(Ljava/util/List;)V")
            .build();
        let list = ClassBuilder::interface("java/util/List").build();
        let index = model(vec![api, list]);
        let owner = index.find_type("p.Api").expect("type");
        let file = parse_overlay("import java.util.List;\nclass Api { void put(List a); }")
            .expect("parse");
        let sink = DiagnosticSink::default();
        let reporter = Reporter::new(&sink, "test.astub", false);
        let imports = ImportTable::build(&index, &file.units, &reporter);
        let method = methods(&file.units[0].types[0])[0];

        assert_eq!(
            descriptors(candidate_methods(&index, owner, method, &[], Some(&imports))),
            vec!["(Ljava/util/List;)V"]
        );
        assert_eq!(
            descriptors(candidate_methods(&index, owner, method, &[], None)),
            vec!["(Ljava/awt/List;)V", "(Ljava/util/List;)V"]
        );
        assert!(find_method(&index, owner, method, &[], None).is_none());
    }

    #[test]
    fn nested_types_may_be_written_relative_to_their_outer_class() {
        let map = ClassBuilder::interface("java/util/Map")
            .nested("java/util/Map$Entry", "java/util/Map", "Entry", 0x0609)
            .build();
        let entry = ClassBuilder::interface("java/util/Map$Entry")
            .nested("java/util/Map$Entry", "java/util/Map", "Entry", 0x0609)
            .build();
        let api = ClassBuilder::class("p/Api")
            .method("accept", "(Ljava/util/Map$Entry;)V")
            .build();
        let index = model(vec![map, entry, api]);
        let owner = index.find_type("p.Api").expect("type");
        let relative = overlay_type("class Api { void accept(Map.Entry<K, V> e); }");
        let wrong = overlay_type("class Api { void accept(Set.Entry e); }");

        assert!(find_method(&index, owner, methods(&relative)[0], &[], None).is_some());
        assert!(find_method(&index, owner, methods(&wrong)[0], &[], None).is_none());
    }

    #[test]
    fn bridge_methods_are_not_candidates() {
        let api = ClassBuilder::class("p/Names")
            .bridge_method("get", "()Ljava/lang/Object;")
            .method("get", "()Ljava/lang/String;")
            .build();
        let index = model(vec![api]);
        let owner = index.find_type("p.Names").expect("type");
        let decl = overlay_type("class Names { String get(); }");

        let found = candidate_methods(&index, owner, methods(&decl)[0], &[], None);
        assert_eq!(descriptors(found), vec!["()Ljava/lang/String;"]);
    }
}
