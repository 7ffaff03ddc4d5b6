use std::collections::BTreeMap;

use crate::ast::{CompilationUnit, Position};
use crate::diagnostics::Reporter;
use crate::model::ProgramModel;
use crate::qualifier::QualifierDef;

/// A name brought into scope by a static import.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ImportedConstant {
    /// Canonical name of the declaring type.
    pub(crate) owner: String,
    pub(crate) name: String,
}

/// Names an overlay file may use unqualified: qualifiers, types and constants.
pub(crate) struct ImportTable<'m> {
    model: &'m dyn ProgramModel,
    qualifiers: BTreeMap<String, String>,
    types: BTreeMap<String, String>,
    constants: BTreeMap<String, ImportedConstant>,
}

impl<'m> ImportTable<'m> {
    /// Build the table from every import of the file.
    pub(crate) fn build(
        model: &'m dyn ProgramModel,
        units: &[CompilationUnit],
        reporter: &Reporter<'_>,
    ) -> Self {
        let mut table = Self {
            model,
            qualifiers: BTreeMap::new(),
            types: BTreeMap::new(),
            constants: BTreeMap::new(),
        };
        for unit in units {
            for import in &unit.imports {
                match (import.is_static, import.is_wildcard) {
                    (true, true) => table.import_members(&import.name, import.position, reporter),
                    (false, true) => table.import_package(&import.name, import.position, reporter),
                    (true, false) => {
                        table.import_static(&import.name, import.position, reporter)
                    }
                    (false, false) => table.import_type(&import.name, import.position, reporter),
                }
            }
        }
        if table.qualifiers.is_empty() {
            reporter.not_found(
                Position::new(1, 1),
                format!(
                    "No supported annotations found! Does overlay file {} import them?",
                    reporter.file()
                ),
            );
        }
        for definition in model.qualifiers_in_scope("java.lang") {
            table.register_qualifier(definition);
        }
        table
    }

    /// Resolve an annotation-use name, falling back to a fully qualified lookup.
    pub(crate) fn qualifier(&mut self, name: &str) -> Option<&'m QualifierDef> {
        if let Some(canonical) = self.qualifiers.get(name) {
            return self.model.qualifier_definition(canonical);
        }
        let definition = self.model.qualifier_definition(name)?;
        self.register_qualifier(definition);
        Some(definition)
    }

    pub(crate) fn imported_type(&self, simple_name: &str) -> Option<&str> {
        self.types.get(simple_name).map(|name| name.as_str())
    }

    pub(crate) fn constant(&self, simple_name: &str) -> Option<&ImportedConstant> {
        self.constants.get(simple_name)
    }

    fn register_qualifier(&mut self, definition: &QualifierDef) {
        self.qualifiers
            .entry(definition.simple_name.clone())
            .or_insert_with(|| definition.name.clone());
        self.qualifiers
            .entry(definition.name.clone())
            .or_insert_with(|| definition.name.clone());
    }

    fn register_type(&mut self, simple_name: &str, canonical: &str) {
        self.types
            .entry(simple_name.to_string())
            .or_insert_with(|| canonical.to_string());
    }

    /// `import static a.B.*;`
    fn import_members(&mut self, owner: &str, position: Position, reporter: &Reporter<'_>) {
        let model = self.model;
        let Some(element) = model.find_type(owner) else {
            reporter.not_found(position, format!("Imported type not found: {owner}"));
            return;
        };
        for definition in model.qualifiers_in_scope(owner) {
            self.register_qualifier(definition);
        }
        for field in &element.fields {
            let is_constant = field.is_static() && field.constant.is_some();
            if is_constant || field.is_enum_constant() {
                self.constants
                    .entry(field.name.clone())
                    .or_insert_with(|| ImportedConstant {
                        owner: element.canonical_name.clone(),
                        name: field.name.clone(),
                    });
            }
        }
    }

    /// `import a.b.*;` which may also name a type whose members are imported.
    fn import_package(&mut self, package: &str, position: Position, reporter: &Reporter<'_>) {
        let model = self.model;
        let definitions = model.qualifiers_in_scope(package);
        let nested_types = model
            .find_type(package)
            .map(|element| element.nested.clone())
            .unwrap_or_default();
        if definitions.is_empty() && nested_types.is_empty() && !model.has_package(package) {
            reporter.not_found(position, format!("Imported package not found: {package}"));
            return;
        }
        for definition in definitions {
            self.register_qualifier(definition);
        }
        let mut imported = model.types_in_package(package);
        imported.extend(
            nested_types
                .iter()
                .filter_map(|internal| model.type_by_internal(internal)),
        );
        for element in imported {
            if element.enclosing.is_none() || nested_types.contains(&element.internal_name) {
                self.register_type(&element.simple_name, &element.canonical_name);
            }
        }
    }

    /// `import static a.B.NAME;`
    fn import_static(&mut self, name: &str, position: Position, reporter: &Reporter<'_>) {
        let Some((owner, member)) = name.rsplit_once('.') else {
            reporter.not_found(position, format!("Imported member not found: {name}"));
            return;
        };
        if let Some(definition) = self.model.qualifier_definition(name) {
            self.register_qualifier(definition);
            return;
        }
        self.constants
            .entry(member.to_string())
            .or_insert_with(|| ImportedConstant {
                owner: owner.to_string(),
                name: member.to_string(),
            });
    }

    /// `import a.b.C;`
    fn import_type(&mut self, name: &str, position: Position, reporter: &Reporter<'_>) {
        let model = self.model;
        if let Some(definition) = model.qualifier_definition(name) {
            self.register_qualifier(definition);
            return;
        }
        match model.find_type(name) {
            Some(element) => self.register_type(&element.simple_name, &element.canonical_name),
            None => reporter.not_found(position, format!("Imported type not found: {name}")),
        }
    }
}
