//! Overlay source manager: loads platform, user and shadow overlays and answers
//! queries against the merged result.
//!
//! Every file's contributions are kept as a separate layer per element. Layers are
//! ordered by overlay kind first (platform below user below shadow) and by arrival
//! within a kind, so a platform overlay that is loaded on demand after the user
//! overlays still ranks below them. Query results are composed from the layers and
//! cached until another layer arrives for the element.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use tracing::{debug, info, warn};

use crate::ast::Position;
use crate::atype::{ElementType, ExecutableType};
use crate::config::EngineOptions;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Reporter};
use crate::model::{ClassKind, ElementId, ProgramModel};
use crate::parser::parse_overlay;
use crate::processor::{Contributions, OverlayKind, process_file};
use crate::qualifier::{FROM_OVERLAY, Qualifier};
use crate::scan::{OverlayLocation, collect_overlays, index_platform_tree};
use crate::telemetry::{Phase, Telemetry, overlay_attributes, record_overlay_outcome, with_span};

include!(concat!(env!("OUT_DIR"), "/builtin_overlays.rs"));

/// Built-in overlay loaded for every platform version.
const BASE_PLATFORM_OVERLAY: &str = "jdk.astub";

#[derive(Clone, Debug)]
struct Layer<T> {
    kind: OverlayKind,
    value: T,
}

fn push_layer<T>(layers: &mut Vec<Layer<T>>, kind: OverlayKind, value: T) {
    let at = layers
        .iter()
        .position(|layer| layer.kind > kind)
        .unwrap_or(layers.len());
    layers.insert(at, Layer { kind, value });
}

#[derive(Default)]
struct State {
    types: BTreeMap<ElementId, Vec<Layer<ElementType>>>,
    declarations: BTreeMap<ElementId, Vec<Layer<Vec<Qualifier>>>>,
    /// Keyed by the inherited method and the internal name of the declaring type.
    fake_overrides: BTreeMap<(ElementId, String), Vec<Layer<ExecutableType>>>,
    composed: BTreeMap<ElementId, ElementType>,
    /// Canonical top-level class name to its not yet parsed platform overlay.
    pending: BTreeMap<String, OverlayLocation>,
    files_loaded: usize,
}

/// Everything the engine merged, for export.
#[derive(Debug, Default)]
pub(crate) struct MergeResults {
    pub(crate) types: BTreeMap<ElementId, ElementType>,
    pub(crate) declarations: BTreeMap<ElementId, Vec<Qualifier>>,
    pub(crate) from_overlay: BTreeSet<ElementId>,
    pub(crate) fake_overrides: Vec<MergedFakeOverride>,
}

#[derive(Debug)]
pub(crate) struct MergedFakeOverride {
    pub(crate) method: ElementId,
    pub(crate) declaring: String,
    pub(crate) ty: ExecutableType,
}

/// Merges overlays onto one program model. Not `Sync`: queries take `&self` and
/// load pending platform overlays through interior mutability.
pub(crate) struct OverlayEngine<'m> {
    model: &'m dyn ProgramModel,
    options: EngineOptions,
    sink: DiagnosticSink,
    state: RefCell<State>,
    loading: Cell<bool>,
    telemetry: Option<&'m Telemetry>,
}

impl<'m> OverlayEngine<'m> {
    /// Load platform overlays, then user overlays, then shadow overlays.
    pub(crate) fn new(
        model: &'m dyn ProgramModel,
        options: EngineOptions,
        telemetry: Option<&'m Telemetry>,
    ) -> Result<Self> {
        let sink = DiagnosticSink::new(options.warn_if_not_found, options.debug_overlays);
        let engine = Self {
            model,
            options,
            sink,
            state: RefCell::new(State::default()),
            loading: Cell::new(false),
            telemetry,
        };

        let attributes = [KeyValue::new(
            "stubweave.platform_version",
            i64::from(engine.options.platform_version),
        )];
        with_span(telemetry, Phase::PlatformOverlays, &attributes, || {
            engine.load_platform()
        })?;
        with_span(telemetry, Phase::UserOverlays, &[], || {
            for path in &engine.options.user_overlays {
                for overlay in collect_overlays(path)
                    .with_context(|| format!("failed to read user overlays {}", path.display()))?
                {
                    engine.load_overlay_text(&overlay.name, &overlay.text, OverlayKind::User);
                }
            }
            for path in &engine.options.shadow_overlays {
                for overlay in collect_overlays(path).with_context(|| {
                    format!("failed to read shadow overlays {}", path.display())
                })? {
                    engine.load_overlay_text(&overlay.name, &overlay.text, OverlayKind::Shadow);
                }
            }
            anyhow::Ok(())
        })?;

        {
            let state = engine.state.borrow();
            info!(
                "loaded {} overlay files, {} platform classes deferred, {} diagnostics",
                state.files_loaded,
                state.pending.len(),
                engine.sink.len()
            );
        }
        Ok(engine)
    }

    fn load_platform(&self) -> Result<()> {
        if self.options.ignore_platform {
            debug!("platform overlays ignored");
            return Ok(());
        }
        let versioned = format!("jdk{}.astub", self.options.platform_version);
        for name in [BASE_PLATFORM_OVERLAY, versioned.as_str()] {
            match BUILTIN_OVERLAYS.iter().find(|(builtin, _)| *builtin == name) {
                Some((builtin, text)) => {
                    self.load_overlay_text(builtin, text, OverlayKind::Platform);
                }
                None if self.options.allow_missing_platform => {
                    warn!("no built-in platform overlay {name}; continuing without it");
                }
                None => anyhow::bail!(
                    "no built-in platform overlay {name}; use --allow-missing-platform to continue without it"
                ),
            }
        }

        let Some(root) = &self.options.platform_overlays else {
            return Ok(());
        };
        let tree = match index_platform_tree(root) {
            Ok(tree) => tree,
            Err(err) if self.options.allow_missing_platform => {
                warn!("{err:#}; continuing without platform overlay tree");
                return Ok(());
            }
            Err(err) => return Err(err.context("failed to index platform overlays")),
        };
        debug!("indexed {} platform overlays under {}", tree.len(), root.display());
        for location in &tree.package_infos {
            self.load_location(location, OverlayKind::Platform)?;
        }
        if self.options.parse_all_platform {
            for location in tree.classes.values() {
                self.load_location(location, OverlayKind::Platform)?;
            }
        } else {
            self.state.borrow_mut().pending = tree.classes;
        }
        Ok(())
    }

    fn load_location(&self, location: &OverlayLocation, kind: OverlayKind) -> Result<()> {
        let text = location.read()?;
        self.load_overlay_text(&location.to_string(), &text, kind);
        Ok(())
    }

    /// Parse one overlay and merge what it declares. Anomalies become diagnostics.
    pub(crate) fn load_overlay_text(&self, name: &str, text: &str, kind: OverlayKind) {
        if text.trim().is_empty() {
            debug!("skipping empty overlay {name}");
            return;
        }
        let attributes = overlay_attributes(name, kind);
        with_span(self.telemetry, Phase::OverlayFile, &attributes, || {
            let reported = self.sink.len();
            let reporter = Reporter::new(&self.sink, name, kind == OverlayKind::Platform);
            let file = match parse_overlay(text) {
                Ok(file) => file,
                Err(failure) => {
                    for error in failure.errors {
                        reporter.report(
                            DiagnosticKind::Parse,
                            error.position,
                            format!("Parse error: {}", error.message),
                        );
                    }
                    return;
                }
            };
            let was_loading = self.loading.replace(true);
            let contributions = process_file(
                self.model,
                &file,
                kind,
                self.options.merge_with_source,
                reporter,
            );
            self.loading.set(was_loading);
            let diagnostics = self.sink.len().saturating_sub(reported);
            record_overlay_outcome(contributions.touched().count(), diagnostics);
            self.ingest(contributions, kind);
            debug!("merged {} overlay {name}", kind.label());
        });
    }

    fn ingest(&self, mut contributions: Contributions, kind: OverlayKind) {
        let touched: Vec<ElementId> = contributions.touched().cloned().collect();
        let mut state = self.state.borrow_mut();
        state.files_loaded += 1;
        for id in touched {
            let qualifiers = contributions.declarations.remove(&id).unwrap_or_default();
            push_layer(
                state.declarations.entry(id.clone()).or_default(),
                kind,
                qualifiers,
            );
            if let Some(ty) = contributions.types.remove(&id) {
                state.composed.remove(&id);
                push_layer(state.types.entry(id).or_default(), kind, ty);
            }
        }
        for fake in contributions.fake_overrides {
            push_layer(
                state
                    .fake_overrides
                    .entry((fake.method, fake.declaring))
                    .or_default(),
                kind,
                fake.ty,
            );
        }
    }

    /// Parse the platform overlay of the class that contains `element`, if one is pending.
    fn ensure_loaded(&self, element: &ElementId) {
        if self.loading.get() {
            return;
        }
        let Some(outermost) = element.outermost_class() else {
            return;
        };
        let canonical = outermost.replace('/', ".");
        let Some(location) = self.state.borrow_mut().pending.remove(&canonical) else {
            return;
        };
        let attributes = [KeyValue::new("stubweave.class", canonical.clone())];
        with_span(self.telemetry, Phase::OnDemandOverlay, &attributes, || {
            if let Err(err) = self.load_location(&location, OverlayKind::Platform) {
                self.sink.report(
                    DiagnosticKind::NotFound,
                    &location.to_string(),
                    Position::new(1, 1),
                    format!("Could not read platform overlay for {canonical}: {err:#}"),
                    true,
                );
            }
        });
    }

    fn compose(&self, real: &ElementType, layers: &[Layer<ElementType>]) -> ElementType {
        let mut merged = real.clone();
        for layer in layers {
            merged.replace_from(&layer.value);
            if self.options.merge_with_source && layer.kind != OverlayKind::Shadow {
                merged.replace_from(real);
            }
        }
        merged
    }

    /// The element's type with overlay qualifiers merged; `None` when no overlay
    /// touched it or while a load is in progress.
    pub(crate) fn type_of(&self, element: &ElementId) -> Option<ElementType> {
        if self.loading.get() {
            return None;
        }
        self.ensure_loaded(element);
        if let Some(cached) = self.state.borrow().composed.get(element) {
            return Some(cached.clone());
        }
        let composed = {
            let state = self.state.borrow();
            let layers = state.types.get(element)?;
            let real = self.model.element_type(element)?;
            self.compose(&real, layers)
        };
        self.state
            .borrow_mut()
            .composed
            .insert(element.clone(), composed.clone());
        Some(composed)
    }

    /// Declaration qualifiers the overlays attach to `element`.
    pub(crate) fn declaration_annotations_of(&self, element: &ElementId) -> Vec<Qualifier> {
        if self.loading.get() {
            return Vec::new();
        }
        self.ensure_loaded(element);
        let state = self.state.borrow();
        let Some(layers) = state.declarations.get(element) else {
            return Vec::new();
        };
        let real = if self.options.merge_with_source {
            self.model.declaration_qualifiers(element)
        } else {
            Vec::new()
        };
        let mut merged: Vec<Qualifier> = Vec::new();
        let mut apply = |qualifiers: &[Qualifier]| {
            for qualifier in qualifiers {
                merged.retain(|existing| existing.name != qualifier.name);
                merged.push(qualifier.clone());
            }
        };
        for layer in layers {
            apply(layer.value.as_slice());
            if layer.kind != OverlayKind::Shadow {
                apply(real.as_slice());
            }
        }
        if layers.iter().any(|layer| layer.kind != OverlayKind::Platform) {
            merged.push(Qualifier::marker(FROM_OVERLAY, FROM_OVERLAY));
        }
        merged
    }

    /// Whether a user or shadow overlay declared `element`.
    pub(crate) fn is_from_overlay(&self, element: &ElementId) -> bool {
        self.state
            .borrow()
            .declarations
            .get(element)
            .is_some_and(|layers| {
                layers
                    .iter()
                    .any(|layer| layer.kind != OverlayKind::Platform)
            })
    }

    /// Type of the inherited `method` as overlays declare it for `receiver`, taken
    /// from the most specific declaring type the receiver is a subtype of.
    pub(crate) fn fake_override(
        &self,
        method: &ElementId,
        receiver: &str,
    ) -> Option<ExecutableType> {
        if self.loading.get() {
            return None;
        }
        self.ensure_loaded(method);
        self.ensure_loaded(&ElementId::of_type(receiver));
        let state = self.state.borrow();
        let candidates: Vec<&str> = state
            .fake_overrides
            .keys()
            .filter(|(id, declaring)| {
                id == method && (declaring == receiver || self.model.is_subtype(receiver, declaring))
            })
            .map(|(_, declaring)| declaring.as_str())
            .collect();
        let chosen = self.most_specific(receiver, &candidates)?;
        let layers = state
            .fake_overrides
            .get(&(method.clone(), chosen.to_string()))?;
        let real = self.model.element_type(method)?;
        let executable_layers: Vec<Layer<ElementType>> = layers
            .iter()
            .map(|layer| Layer {
                kind: layer.kind,
                value: ElementType::Executable(layer.value.clone()),
            })
            .collect();
        match self.compose(&real, &executable_layers) {
            ElementType::Executable(executable) => Some(executable),
            _ => None,
        }
    }

    fn most_specific<'a>(&self, receiver: &str, candidates: &[&'a str]) -> Option<&'a str> {
        if let Some(exact) = candidates.iter().find(|declaring| **declaring == receiver) {
            return Some(*exact);
        }
        let minimal: Vec<&'a str> = candidates
            .iter()
            .copied()
            .filter(|candidate| {
                !candidates
                    .iter()
                    .any(|other| other != candidate && self.model.is_subtype(other, candidate))
            })
            .collect();
        let is_class = |internal: &str| {
            self.model
                .type_by_internal(internal)
                .is_some_and(|element| element.kind != ClassKind::Interface)
        };
        minimal
            .iter()
            .copied()
            .find(|candidate| is_class(*candidate))
            .or_else(|| minimal.first().copied())
    }

    /// Parse pending platform overlays of classes the program contains.
    fn load_pending_present(&self) {
        let present: Vec<String> = self
            .state
            .borrow()
            .pending
            .keys()
            .filter(|canonical| self.model.find_type(canonical).is_some())
            .cloned()
            .collect();
        for canonical in present {
            let internal = canonical.replace('.', "/");
            self.ensure_loaded(&ElementId::of_type(&internal));
        }
    }

    /// Merge everything relevant to the program and return the merged facts.
    pub(crate) fn results(&self) -> MergeResults {
        with_span(self.telemetry, Phase::Results, &[], || {
            self.load_pending_present();
            let (type_ids, declaration_ids, fake_keys) = {
                let state = self.state.borrow();
                (
                    state.types.keys().cloned().collect::<Vec<_>>(),
                    state.declarations.keys().cloned().collect::<Vec<_>>(),
                    state.fake_overrides.keys().cloned().collect::<Vec<_>>(),
                )
            };
            let mut results = MergeResults::default();
            for id in type_ids {
                if let Some(ty) = self.type_of(&id) {
                    results.types.insert(id, ty);
                }
            }
            for id in declaration_ids {
                let qualifiers = self.declaration_annotations_of(&id);
                if !qualifiers.is_empty() {
                    results.declarations.insert(id.clone(), qualifiers);
                }
                if self.is_from_overlay(&id) {
                    results.from_overlay.insert(id);
                }
            }
            for (method, declaring) in fake_keys {
                if let Some(ty) = self.fake_override(&method, &declaring) {
                    results.fake_overrides.push(MergedFakeOverride {
                        method,
                        declaring,
                        ty,
                    });
                }
            }
            results
        })
    }

    pub(crate) fn diagnostics(&self) -> Vec<Diagnostic> {
        self.sink.diagnostics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atype::AnnotatedType;
    use crate::classfile::{RawAnnotation, TypeAnnotation, TypeAnnotationTarget};
    use crate::model::ClassIndex;
    use crate::test_harness::{ClassBuilder, marker, model};
    use std::fs;

    const NULLABLE: &str = "stubweave.qual.Nullable";
    const NON_NULL: &str = "stubweave.qual.NonNull";

    fn options() -> EngineOptions {
        EngineOptions {
            ignore_platform: true,
            ..EngineOptions::default()
        }
    }

    fn overlay(body: &str) -> String {
        format!("package p;\nimport stubweave.qual.*;\n{body}")
    }

    fn load(engine: &OverlayEngine<'_>, name: &str, body: &str, kind: OverlayKind) {
        engine.load_overlay_text(name, &overlay(body), kind);
    }

    fn api_model() -> ClassIndex {
        let api = ClassBuilder::class("p/Api")
            .field("name", "Ljava/lang/String;")
            .method("find", "(Ljava/lang/String;)Ljava/lang/Object;")
            .build();
        model(vec![api])
    }

    fn field_type(engine: &OverlayEngine<'_>, owner: &str, name: &str) -> AnnotatedType {
        engine
            .type_of(&ElementId::field(owner, name))
            .and_then(|ty| ty.as_variable().cloned())
            .expect("field type")
    }

    fn has(ty: &AnnotatedType, qualifier: &str) -> bool {
        ty.qualifiers.contains(qualifier)
    }

    #[test]
    fn user_overlays_beat_platform_overlays() {
        let index = api_model();
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");

        engine.load_overlay_text(
            "user.astub",
            &overlay("class Api { @NonNull String name; }"),
            OverlayKind::User,
        );
        engine.load_overlay_text(
            "platform.astub",
            &overlay("class Api { @Nullable String name; }"),
            OverlayKind::Platform,
        );

        let name = field_type(&engine, "p/Api", "name");
        assert!(has(&name, NON_NULL));
        assert!(!has(&name, NULLABLE));
    }

    #[test]
    fn user_overlays_win_whatever_the_load_order() {
        let index = api_model();
        let platform = "class Api { @Nullable String name; }";
        let user = "class Api { @NonNull String name; }";

        let user_first = OverlayEngine::new(&index, options(), None).expect("engine");
        load(&user_first, "user.astub", user, OverlayKind::User);
        load(&user_first, "platform.astub", platform, OverlayKind::Platform);

        let platform_first = OverlayEngine::new(&index, options(), None).expect("engine");
        load(&platform_first, "platform.astub", platform, OverlayKind::Platform);
        load(&platform_first, "user.astub", user, OverlayKind::User);

        for engine in [&user_first, &platform_first] {
            let name = field_type(engine, "p/Api", "name");
            assert!(has(&name, NON_NULL));
            assert!(!has(&name, NULLABLE));
        }
    }

    #[test]
    fn overlays_of_different_kinds_keep_each_others_hierarchies() {
        let api = ClassBuilder::class("p/Api")
            .field("name", "Ljava/lang/String;")
            .build();
        let tainted = ClassBuilder::annotation("q/Tainted", &["TYPE_USE"]).build();
        let index = model(vec![api, tainted]);
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");

        load(
            &engine,
            "platform.astub",
            "class Api { @Nullable String name; }",
            OverlayKind::Platform,
        );
        engine.load_overlay_text(
            "user.astub",
            "package p;\nimport q.Tainted;\nclass Api { @Tainted String name; }",
            OverlayKind::User,
        );

        let name = field_type(&engine, "p/Api", "name");
        assert!(has(&name, NULLABLE));
        assert!(has(&name, "q.Tainted"));
    }

    #[test]
    fn later_overlays_of_the_same_kind_win() {
        let index = api_model();
        let nullable = "class Api { @Nullable String name; }";
        let non_null = "class Api { @NonNull String name; }";

        let first = OverlayEngine::new(&index, options(), None).expect("engine");
        load(&first, "a.astub", nullable, OverlayKind::User);
        load(&first, "b.astub", non_null, OverlayKind::User);

        let second = OverlayEngine::new(&index, options(), None).expect("engine");
        load(&second, "b.astub", non_null, OverlayKind::User);
        load(&second, "a.astub", nullable, OverlayKind::User);

        assert!(has(&field_type(&first, "p/Api", "name"), NON_NULL));
        assert!(has(&field_type(&second, "p/Api", "name"), NULLABLE));
    }

    #[test]
    fn loading_the_same_overlay_twice_changes_nothing() {
        let index = api_model();
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");
        let text = overlay("class Api { @Nullable Object find(@NonNull String key); }");
        let id = ElementId::method("p/Api", "find", "(Ljava/lang/String;)Ljava/lang/Object;");

        engine.load_overlay_text("a.astub", &text, OverlayKind::User);
        let once = engine.type_of(&id).expect("type");
        engine.load_overlay_text("a.astub", &text, OverlayKind::User);
        let twice = engine.type_of(&id).expect("type");

        assert_eq!(once, twice);
        assert_eq!(engine.diagnostics().len(), 0);
    }

    #[test]
    fn real_qualifiers_win_in_merge_with_source_mode_except_over_shadow() {
        let api = ClassBuilder::class("p/Api")
            .field("name", "Ljava/lang/String;")
            .last_field(|field| {
                field.type_annotations.push(TypeAnnotation {
                    target: TypeAnnotationTarget::Field,
                    path: Vec::new(),
                    annotation: RawAnnotation {
                        type_name: "stubweave/qual/Nullable".to_string(),
                        elements: Default::default(),
                    },
                })
            })
            .build();
        let index = model(vec![api]);
        let merging = EngineOptions {
            merge_with_source: true,
            ..options()
        };
        let body = overlay("class Api { @NonNull String name; }");

        let user = OverlayEngine::new(&index, merging.clone(), None).expect("engine");
        user.load_overlay_text("user.astub", &body, OverlayKind::User);
        assert!(has(&field_type(&user, "p/Api", "name"), NULLABLE));

        let shadow = OverlayEngine::new(&index, merging, None).expect("engine");
        shadow.load_overlay_text("shadow.astub", &body, OverlayKind::Shadow);
        assert!(has(&field_type(&shadow, "p/Api", "name"), NON_NULL));

        let plain = OverlayEngine::new(&index, options(), None).expect("engine");
        plain.load_overlay_text("user.astub", &body, OverlayKind::User);
        assert!(has(&field_type(&plain, "p/Api", "name"), NON_NULL));
    }

    #[test]
    fn untouched_elements_have_no_overlay_type() {
        let index = api_model();
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");
        load(&engine, "a.astub", "class Api { @Nullable String name; }", OverlayKind::User);

        let find = ElementId::method("p/Api", "find", "(Ljava/lang/String;)Ljava/lang/Object;");
        assert!(engine.type_of(&find).is_none());
        assert!(engine.declaration_annotations_of(&find).is_empty());
        assert!(!engine.is_from_overlay(&find));
    }

    #[test]
    fn queries_return_nothing_while_loading() {
        let index = api_model();
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");
        load(&engine, "a.astub", "class Api { @Nullable String name; }", OverlayKind::User);

        engine.loading.set(true);
        assert!(engine.type_of(&ElementId::field("p/Api", "name")).is_none());
        assert!(
            engine
                .declaration_annotations_of(&ElementId::field("p/Api", "name"))
                .is_empty()
        );
        engine.loading.set(false);
        assert!(engine.type_of(&ElementId::field("p/Api", "name")).is_some());
    }

    #[test]
    fn user_overlays_mark_elements_as_from_overlay() {
        let api = ClassBuilder::class("p/Api").method("run", "()V").build();
        let index = model(vec![api]);
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");
        let run = ElementId::method("p/Api", "run", "()V");

        load(&engine, "platform.astub", "class Api { @Pure void run(); }", OverlayKind::Platform);
        assert!(!engine.is_from_overlay(&run));
        let names: Vec<_> = engine
            .declaration_annotations_of(&run)
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(names, vec!["stubweave.qual.Pure".to_string()]);

        load(&engine, "user.astub", "class Api { void run(); }", OverlayKind::User);
        assert!(engine.is_from_overlay(&run));
        let names: Vec<_> = engine
            .declaration_annotations_of(&run)
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(
            names,
            vec!["stubweave.qual.Pure".to_string(), FROM_OVERLAY.to_string()]
        );
    }

    #[test]
    fn real_declaration_annotations_survive_in_merge_with_source_mode() {
        let api = ClassBuilder::class("p/Api")
            .method("run", "()V")
            .last_method(|method| method.annotations.push(marker("stubweave/qual/SideEffectFree")))
            .build();
        let index = model(vec![api]);
        let engine = OverlayEngine::new(
            &index,
            EngineOptions {
                merge_with_source: true,
                ..options()
            },
            None,
        )
        .expect("engine");
        let run = ElementId::method("p/Api", "run", "()V");

        load(&engine, "user.astub", "class Api { @Pure void run(); }", OverlayKind::User);

        let names: Vec<_> = engine
            .declaration_annotations_of(&run)
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "stubweave.qual.Pure".to_string(),
                "stubweave.qual.SideEffectFree".to_string(),
                FROM_OVERLAY.to_string(),
            ]
        );
    }

    #[test]
    fn parse_failures_abandon_only_the_broken_file() {
        let index = api_model();
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");

        engine.load_overlay_text(
            "broken.astub",
            "package p;\nclass Api { String name }",
            OverlayKind::User,
        );
        load(&engine, "good.astub", "class Api { @Nullable String name; }", OverlayKind::User);
        engine.load_overlay_text("blank.astub", "  \n\t", OverlayKind::User);

        let diagnostics = engine.diagnostics();
        assert!(!diagnostics.is_empty());
        assert!(
            diagnostics
                .iter()
                .all(|d| d.kind == DiagnosticKind::Parse && d.file == "broken.astub")
        );
        assert!(has(&field_type(&engine, "p/Api", "name"), NULLABLE));
    }

    #[test]
    fn fake_overrides_pick_the_most_specific_declaring_type() {
        let base = ClassBuilder::class("p/Base")
            .method("get", "()Ljava/lang/Object;")
            .build();
        let shape = ClassBuilder::interface("p/Shape").build();
        let middle = ClassBuilder::class("p/Middle")
            .extends("p/Base")
            .implements("p/Shape")
            .build();
        let leaf = ClassBuilder::class("p/Leaf").extends("p/Middle").build();
        let index = model(vec![base, shape, middle, leaf]);
        let engine = OverlayEngine::new(&index, options(), None).expect("engine");
        let get = ElementId::method("p/Base", "get", "()Ljava/lang/Object;");

        load(
            &engine,
            "a.astub",
            "class Middle { @NonNull Object get(); }\nclass Leaf { @Nullable Object get(); }",
            OverlayKind::User,
        );

        let leaf_view = engine.fake_override(&get, "p/Leaf").expect("leaf");
        assert!(has(&leaf_view.return_type, NULLABLE));
        let middle_view = engine.fake_override(&get, "p/Middle").expect("middle");
        assert!(has(&middle_view.return_type, NON_NULL));
        assert!(engine.fake_override(&get, "p/Base").is_none());
        assert!(engine.type_of(&get).is_none());

        let results = engine.results();
        assert_eq!(results.fake_overrides.len(), 2);
    }

    #[test]
    fn platform_trees_load_on_first_query_and_rank_below_user_overlays() {
        let index = api_model();
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir_all(dir.path().join("p")).expect("create dir");
        fs::write(
            dir.path().join("p/Api.astub"),
            overlay("class Api { @Nullable String name; @Nullable Object find(String key); }"),
        )
        .expect("write overlay");
        let user_dir = tempfile::tempdir().expect("temp dir");
        let user = user_dir.path().join("user.astub");
        fs::write(&user, overlay("class Api { @NonNull String name; }")).expect("write overlay");
        let engine = OverlayEngine::new(
            &index,
            EngineOptions {
                platform_overlays: Some(dir.path().to_path_buf()),
                user_overlays: vec![user],
                ..EngineOptions::default()
            },
            None,
        )
        .expect("engine");

        assert!(engine.state.borrow().pending.contains_key("p.Api"));
        let name = field_type(&engine, "p/Api", "name");
        assert!(has(&name, NON_NULL));
        assert!(engine.state.borrow().pending.is_empty());
        let find = ElementId::method("p/Api", "find", "(Ljava/lang/String;)Ljava/lang/Object;");
        let find = engine.type_of(&find).expect("find");
        let find = find.as_executable().expect("executable");
        assert!(has(&find.return_type, NULLABLE));
    }

    #[test]
    fn missing_platform_tree_is_fatal_unless_allowed() {
        let index = api_model();
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = EngineOptions {
            platform_overlays: Some(dir.path().join("absent")),
            ..EngineOptions::default()
        };
        assert!(OverlayEngine::new(&index, missing.clone(), None).is_err());

        let allowed = EngineOptions {
            allow_missing_platform: true,
            ..missing
        };
        assert!(OverlayEngine::new(&index, allowed, None).is_ok());
    }

    #[test]
    fn unknown_platform_versions_are_fatal_unless_allowed() {
        let index = api_model();
        let unknown = EngineOptions {
            platform_version: 3,
            ..EngineOptions::default()
        };
        let err = OverlayEngine::new(&index, unknown.clone(), None)
            .err()
            .expect("missing overlay");
        assert!(err.to_string().contains("jdk3.astub"));

        let allowed = EngineOptions {
            allow_missing_platform: true,
            ..unknown
        };
        assert!(OverlayEngine::new(&index, allowed, None).is_ok());
    }
}
