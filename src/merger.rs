//! Lock-step walk of an overlay type reference and a real type representation.
//!
//! Every qualifier the overlay writes replaces, on the matching real node,
//! whatever qualifier that node held for the same hierarchy. Structural
//! disagreements are reported and the disagreeing subtree is left untouched.

use std::collections::BTreeMap;

use crate::ast::{AnnotationExpr, TypeParameter, TypeRef, TypeRefKind};
use crate::atype::{AnnotatedType, TypeKind};
use crate::diagnostics::Reporter;
use crate::qualifier::Qualifier;

/// Turns annotation-uses written at a type position into type qualifiers.
pub(crate) trait QualifierSource {
    fn type_qualifiers(&mut self, annotations: &[AnnotationExpr]) -> Vec<Qualifier>;
}

/// Declared type parameters in scope, by name, already merged.
pub(crate) type TypeVariableScope = BTreeMap<String, AnnotatedType>;

pub(crate) struct TypeMerger<'a> {
    source: &'a mut dyn QualifierSource,
    reporter: Reporter<'a>,
    type_variables: &'a TypeVariableScope,
}

impl<'a> TypeMerger<'a> {
    pub(crate) fn new(
        source: &'a mut dyn QualifierSource,
        reporter: Reporter<'a>,
        type_variables: &'a TypeVariableScope,
    ) -> Self {
        Self {
            source,
            reporter,
            type_variables,
        }
    }

    /// Merge `declared` and the annotations of its declaration onto `real`.
    ///
    /// Declaration annotations land on the innermost component of an array and
    /// otherwise stand in for the primary annotations when the type carries none.
    pub(crate) fn merge(
        &mut self,
        declared: &TypeRef,
        declaration: &[AnnotationExpr],
        real: &mut AnnotatedType,
    ) {
        if !real.is_array() {
            if let TypeRefKind::Array(_) = declared.kind {
                self.reporter.mismatch(
                    declared.position,
                    format!(
                        "Overlay type {declared} is an array, but the real type is {}",
                        real.kind_name()
                    ),
                );
                return;
            }
            self.merge_node(declared, declaration, real);
            return;
        }

        let qualifiers = self.source.type_qualifiers(declaration);
        real.with_innermost_component(|innermost| apply(innermost, qualifiers));

        let mut declared = declared;
        let mut real = real;
        loop {
            match (&declared.kind, real.is_array()) {
                (TypeRefKind::Array(declared_component), true) => {
                    let qualifiers = self.source.type_qualifiers(&declared.annotations);
                    apply(real, qualifiers);
                    let TypeKind::Array { component } = &mut real.kind else {
                        return;
                    };
                    declared = &**declared_component;
                    real = &mut **component;
                }
                (TypeRefKind::Array(_), false) | (_, true) => {
                    self.reporter.mismatch(
                        declared.position,
                        format!("Array dimensions of overlay type {declared} do not match the real type"),
                    );
                    return;
                }
                _ => break,
            }
        }
        self.merge_node(declared, &[], real);
    }

    /// Apply annotations to `real` without consulting any type syntax.
    pub(crate) fn annotate(&mut self, annotations: &[AnnotationExpr], real: &mut AnnotatedType) {
        let qualifiers = self.source.type_qualifiers(annotations);
        apply(real, qualifiers);
    }

    /// Merge a declared type parameter onto the real type variable.
    ///
    /// Without bounds the parameter's annotations reach both bounds; with bounds
    /// they reach the lower bound and the bound types merge into the upper bound.
    pub(crate) fn merge_type_parameter(&mut self, declared: &TypeParameter, real: &mut AnnotatedType) {
        let TypeKind::TypeVariable { upper, lower, .. } = &mut real.kind else {
            self.reporter.mismatch(
                declared.position,
                format!(
                    "Type parameter {} does not match a real type variable",
                    declared.name
                ),
            );
            return;
        };
        let qualifiers = self.source.type_qualifiers(&declared.annotations);
        match declared.bounds.as_slice() {
            [] => {
                apply(upper, qualifiers.clone());
                apply(lower, qualifiers);
            }
            [bound] if !matches!(upper.kind, TypeKind::Intersection { .. }) => {
                apply(lower, qualifiers);
                self.merge(bound, &[], upper);
            }
            bounds => {
                apply(lower, qualifiers);
                let TypeKind::Intersection { bounds: real_bounds } = &mut upper.kind else {
                    self.bound_count_mismatch(declared, 1);
                    return;
                };
                if real_bounds.len() != bounds.len() {
                    let count = real_bounds.len();
                    self.bound_count_mismatch(declared, count);
                    return;
                }
                for (bound, real_bound) in bounds.iter().zip(real_bounds.iter_mut()) {
                    self.merge(bound, &[], real_bound);
                }
            }
        }
    }

    fn bound_count_mismatch(&self, declared: &TypeParameter, real: usize) {
        self.reporter.mismatch(
            declared.position,
            format!(
                "Type parameter {} declares {} bounds, but the real type variable has {real}",
                declared.name,
                declared.bounds.len()
            ),
        );
    }

    fn merge_node(
        &mut self,
        declared: &TypeRef,
        declaration: &[AnnotationExpr],
        real: &mut AnnotatedType,
    ) {
        let primary = if declared.annotations.is_empty() {
            declaration
        } else {
            &declared.annotations
        };
        let qualifiers = self.source.type_qualifiers(primary);

        match (&declared.kind, &mut real.kind) {
            (TypeRefKind::Primitive(expected), TypeKind::Primitive { primitive })
                if *expected == *primitive =>
            {
                apply(real, qualifiers);
            }
            (TypeRefKind::Void, TypeKind::Void) => apply(real, qualifiers),
            (TypeRefKind::Class(_), TypeKind::Declared { type_arguments, .. }) => {
                if let Some(arguments) = declared.type_arguments()
                    && !arguments.is_empty()
                {
                    if arguments.len() != type_arguments.len() {
                        self.reporter.mismatch(
                            declared.position,
                            format!(
                                "Overlay type {declared} has {} type arguments, but the real type has {}",
                                arguments.len(),
                                type_arguments.len()
                            ),
                        );
                    } else {
                        for (argument, real_argument) in arguments.iter().zip(type_arguments.iter_mut()) {
                            self.merge(argument, &[], real_argument);
                        }
                    }
                }
                apply(real, qualifiers);
            }
            (TypeRefKind::Class(_), TypeKind::TypeVariable { name, upper, lower }) => {
                let written = declared.class_name().unwrap_or_default();
                if written == *name
                    && let Some(TypeKind::TypeVariable {
                        upper: declared_upper,
                        lower: declared_lower,
                        ..
                    }) = self.type_variables.get(name.as_str()).map(|ty| &ty.kind)
                {
                    upper.replace_from(declared_upper);
                    lower.replace_from(declared_lower);
                }
                apply(real, qualifiers);
            }
            (TypeRefKind::Class(_), TypeKind::Intersection { .. }) => apply(real, qualifiers),
            (
                TypeRefKind::Wildcard {
                    extends,
                    super_bound,
                },
                TypeKind::Wildcard {
                    extends: real_extends,
                    super_bound: real_super,
                },
            ) => match (extends, super_bound) {
                (Some(bound), _) => {
                    self.merge(bound, &[], real_extends);
                    apply(real_super, qualifiers);
                }
                (None, Some(bound)) => {
                    self.merge(bound, &[], real_super);
                    apply(real_extends, qualifiers);
                }
                (None, None) => {
                    apply(real_extends, qualifiers.clone());
                    apply(real_super, qualifiers);
                }
            },
            (_, TypeKind::Wildcard { .. }) => {
                self.reporter.mismatch(
                    declared.position,
                    format!("Overlay type {declared} is not a wildcard, but the real type is"),
                );
            }
            _ => {
                self.reporter.mismatch(
                    declared.position,
                    format!(
                        "Overlay type {declared} does not match the real {} type {}",
                        real.kind_name(),
                        real.without_qualifiers()
                    ),
                );
            }
        }
    }
}

/// Install `qualifiers` on one node, one per hierarchy, replacing incumbents.
pub(crate) fn apply(target: &mut AnnotatedType, qualifiers: Vec<Qualifier>) {
    for qualifier in qualifiers {
        target.qualifiers.replace(qualifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Member;
    use crate::atype::PrimitiveKind;
    use crate::diagnostics::DiagnosticSink;
    use crate::parser::parse_overlay;

    /// Resolves every annotation-use to a marker in a hierarchy named after it,
    /// except `Nullable`/`NonNull`, which share one.
    struct Markers;

    impl QualifierSource for Markers {
        fn type_qualifiers(&mut self, annotations: &[AnnotationExpr]) -> Vec<Qualifier> {
            annotations
                .iter()
                .map(|annotation| {
                    let hierarchy = match annotation.simple_name() {
                        "Nullable" | "NonNull" => "nullness",
                        other => other,
                    };
                    Qualifier::marker(&annotation.name, hierarchy)
                })
                .collect()
        }
    }

    fn field(source: &str) -> (TypeRef, Vec<AnnotationExpr>) {
        let file = parse_overlay(source).expect("parse");
        let Member::Field(field) = &file.units[0].types[0].members[0] else {
            panic!("field");
        };
        (field.variables[0].ty.clone(), field.annotations.clone())
    }

    fn merge(source: &str, real: &mut AnnotatedType) -> DiagnosticSink {
        let sink = DiagnosticSink::default();
        let (declared, declaration) = field(source);
        let scope = TypeVariableScope::new();
        let mut markers = Markers;
        let mut merger =
            TypeMerger::new(&mut markers, Reporter::new(&sink, "t.astub", false), &scope);
        merger.merge(&declared, &declaration, real);
        sink
    }

    fn names(ty: &AnnotatedType) -> Vec<String> {
        ty.qualifiers.iter().map(|q| q.name.clone()).collect()
    }

    #[test]
    fn array_levels_map_outer_to_inner() {
        let mut real = AnnotatedType::array(AnnotatedType::array(AnnotatedType::primitive(
            PrimitiveKind::Int,
        )));

        let sink = merge("class A { @X int @Y [] @Z [] f; }", &mut real);

        assert_eq!(sink.len(), 0);
        assert_eq!(names(&real), vec!["Y"]);
        let TypeKind::Array { component } = &real.kind else {
            panic!("array");
        };
        assert_eq!(names(component), vec!["Z"]);
        let TypeKind::Array { component: innermost } = &component.kind else {
            panic!("array");
        };
        assert_eq!(names(innermost), vec!["X"]);
    }

    #[test]
    fn type_arguments_receive_their_annotations() {
        let mut real = AnnotatedType::declared(
            "java.util.List",
            vec![AnnotatedType::declared("java.lang.String", Vec::new())],
        );

        merge("class A { java.util.List<@X String> f; }", &mut real);

        let TypeKind::Declared { type_arguments, .. } = &real.kind else {
            panic!("declared");
        };
        assert!(real.qualifiers.is_empty());
        assert_eq!(names(&type_arguments[0]), vec!["X"]);
    }

    #[test]
    fn later_merges_replace_within_a_hierarchy_only() {
        let mut real = AnnotatedType::declared("java.lang.String", Vec::new());

        merge("class A { @Nullable @Tainted String f; }", &mut real);
        merge("class A { @NonNull String f; }", &mut real);

        assert!(real.qualifiers.contains("NonNull"));
        assert!(real.qualifiers.contains("Tainted"));
        assert!(!real.qualifiers.contains("Nullable"));
    }

    #[test]
    fn wildcard_primary_goes_to_the_opposite_bound() {
        let mut real = AnnotatedType::declared(
            "java.util.List",
            vec![AnnotatedType::wildcard(
                AnnotatedType::declared("java.lang.Number", Vec::new()),
                AnnotatedType::null(),
            )],
        );

        merge("class A { java.util.List<@X ? extends @Y Number> f; }", &mut real);

        let TypeKind::Declared { type_arguments, .. } = &real.kind else {
            panic!("declared");
        };
        let TypeKind::Wildcard {
            extends,
            super_bound,
        } = &type_arguments[0].kind
        else {
            panic!("wildcard");
        };
        assert_eq!(names(extends), vec!["Y"]);
        assert_eq!(names(super_bound), vec!["X"]);
    }

    #[test]
    fn mismatched_shapes_are_reported_and_skipped() {
        let mut real = AnnotatedType::primitive(PrimitiveKind::Int);

        let sink = merge("class A { @X int[] f; }", &mut real);

        assert_eq!(sink.len(), 1);
        assert!(real.qualifiers.is_empty());

        let mut generic = AnnotatedType::declared("java.util.Map", vec![AnnotatedType::object()]);
        let sink = merge("class A { java.util.Map<@X String, @Y String> f; }", &mut generic);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn unbounded_type_parameter_annotates_both_bounds() {
        let file = parse_overlay("class Box<@X T, U extends @Y Number> {}").expect("parse");
        let params = &file.units[0].types[0].type_parameters;
        let sink = DiagnosticSink::default();
        let scope = TypeVariableScope::new();
        let mut markers = Markers;
        let mut merger =
            TypeMerger::new(&mut markers, Reporter::new(&sink, "t.astub", false), &scope);
        let mut first =
            AnnotatedType::type_variable("T", AnnotatedType::object(), AnnotatedType::null());
        let mut second = AnnotatedType::type_variable(
            "U",
            AnnotatedType::declared("java.lang.Number", Vec::new()),
            AnnotatedType::null(),
        );

        merger.merge_type_parameter(&params[0], &mut first);
        merger.merge_type_parameter(&params[1], &mut second);

        let TypeKind::TypeVariable { upper, lower, .. } = &first.kind else {
            panic!("type variable");
        };
        assert_eq!(names(upper), vec!["X"]);
        assert_eq!(names(lower), vec!["X"]);
        let TypeKind::TypeVariable { upper, lower, .. } = &second.kind else {
            panic!("type variable");
        };
        assert_eq!(names(upper), vec!["Y"]);
        assert!(lower.qualifiers.is_empty());
    }

    #[test]
    fn type_variable_uses_inherit_declared_bounds() {
        let mut declared_t = AnnotatedType::type_variable(
            "T",
            AnnotatedType::object(),
            AnnotatedType::null(),
        );
        if let TypeKind::TypeVariable { upper, .. } = &mut declared_t.kind {
            upper.qualifiers.replace(Qualifier::marker("q.Nullable", "nullness"));
        }
        let mut scope = TypeVariableScope::new();
        scope.insert("T".to_string(), declared_t);
        let (declared, declaration) = field("class A { T f; }");
        let sink = DiagnosticSink::default();
        let mut markers = Markers;
        let mut merger =
            TypeMerger::new(&mut markers, Reporter::new(&sink, "t.astub", false), &scope);
        let mut real =
            AnnotatedType::type_variable("T", AnnotatedType::object(), AnnotatedType::null());

        merger.merge(&declared, &declaration, &mut real);

        let TypeKind::TypeVariable { upper, .. } = &real.kind else {
            panic!("type variable");
        };
        assert!(upper.qualifiers.contains("q.Nullable"));
    }

    fn merge_parameters(source: &str, reals: &mut [AnnotatedType]) -> DiagnosticSink {
        let file = parse_overlay(source).expect("parse");
        let params = &file.units[0].types[0].type_parameters;
        let sink = DiagnosticSink::default();
        let scope = TypeVariableScope::new();
        let mut markers = Markers;
        let mut merger =
            TypeMerger::new(&mut markers, Reporter::new(&sink, "t.astub", false), &scope);
        for (param, real) in params.iter().zip(reals.iter_mut()) {
            merger.merge_type_parameter(param, real);
        }
        sink
    }

    fn bounded_by(name: &str, bounds: &[&str]) -> AnnotatedType {
        let bounds = bounds
            .iter()
            .map(|bound| AnnotatedType::declared(bound, Vec::new()))
            .collect();
        AnnotatedType::type_variable(
            name,
            AnnotatedType::new(TypeKind::Intersection { bounds }),
            AnnotatedType::null(),
        )
    }

    #[test]
    fn intersection_bounds_merge_one_by_one() {
        let mut reals = [bounded_by(
            "T",
            &["java.lang.Number", "java.io.Serializable"],
        )];

        let sink = merge_parameters(
            "class Box<@X T extends @Y Number & @Z java.io.Serializable> {}",
            &mut reals,
        );

        assert_eq!(sink.len(), 0);
        let TypeKind::TypeVariable { upper, lower, .. } = &reals[0].kind else {
            panic!("type variable");
        };
        assert_eq!(names(lower), vec!["X"]);
        assert!(upper.qualifiers.is_empty());
        let TypeKind::Intersection { bounds } = &upper.kind else {
            panic!("intersection");
        };
        assert_eq!(names(&bounds[0]), vec!["Y"]);
        assert_eq!(names(&bounds[1]), vec!["Z"]);
    }

    #[test]
    fn intersection_bound_counts_must_agree() {
        let mut reals = [
            bounded_by("T", &["java.lang.Number", "java.io.Serializable"]),
            AnnotatedType::type_variable(
                "U",
                AnnotatedType::declared("java.lang.Number", Vec::new()),
                AnnotatedType::null(),
            ),
        ];

        let sink = merge_parameters(
            "class Box<T extends @Y Number & A & B, U extends @Y Number & A> {}",
            &mut reals,
        );

        assert_eq!(sink.len(), 2);
        for real in &reals {
            let TypeKind::TypeVariable { upper, .. } = &real.kind else {
                panic!("type variable");
            };
            assert!(upper.is_unqualified());
        }
    }

    #[test]
    fn super_bounded_wildcard_primary_goes_to_the_extends_bound() {
        let mut real = AnnotatedType::declared(
            "java.util.List",
            vec![AnnotatedType::wildcard(
                AnnotatedType::object(),
                AnnotatedType::declared("java.lang.Integer", Vec::new()),
            )],
        );

        let sink = merge("class A { java.util.List<@X ? super @Y Integer> f; }", &mut real);

        assert_eq!(sink.len(), 0);
        let TypeKind::Declared { type_arguments, .. } = &real.kind else {
            panic!("declared");
        };
        let TypeKind::Wildcard {
            extends,
            super_bound,
        } = &type_arguments[0].kind
        else {
            panic!("wildcard");
        };
        assert_eq!(names(super_bound), vec!["Y"]);
        assert_eq!(names(extends), vec!["X"]);
    }

    #[test]
    fn unbounded_wildcard_primary_reaches_both_bounds() {
        let mut real = AnnotatedType::declared(
            "java.util.List",
            vec![AnnotatedType::wildcard(
                AnnotatedType::object(),
                AnnotatedType::null(),
            )],
        );

        merge("class A { java.util.List<@X ?> f; }", &mut real);

        let TypeKind::Declared { type_arguments, .. } = &real.kind else {
            panic!("declared");
        };
        let TypeKind::Wildcard {
            extends,
            super_bound,
        } = &type_arguments[0].kind
        else {
            panic!("wildcard");
        };
        assert_eq!(names(extends), vec!["X"]);
        assert_eq!(names(super_bound), vec!["X"]);
    }
}
