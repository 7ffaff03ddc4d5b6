use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::atype::{ElementType, ExecutableType};
use crate::engine::MergeResults;
use crate::model::ElementId;
use crate::qualifier::Qualifier;

/// Merged overlay facts, in the form downstream analyses read them.
#[derive(Debug, Serialize)]
pub(crate) struct FactBase {
    pub(crate) tool: &'static str,
    pub(crate) version: &'static str,
    pub(crate) elements: Vec<ElementFact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) fake_overrides: Vec<FakeOverrideFact>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ElementFact {
    /// Human-readable element name.
    pub(crate) name: String,
    pub(crate) id: ElementId,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) ty: Option<ElementType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) declaration_annotations: Vec<Qualifier>,
    pub(crate) from_overlay: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct FakeOverrideFact {
    pub(crate) method: ElementId,
    /// Canonical name of the type the override applies to.
    pub(crate) receiver: String,
    #[serde(rename = "type")]
    pub(crate) ty: ExecutableType,
}

pub(crate) fn build_fact_base(mut results: MergeResults) -> FactBase {
    let ids: BTreeSet<ElementId> = results
        .types
        .keys()
        .chain(results.declarations.keys())
        .cloned()
        .collect();
    let elements = ids
        .into_iter()
        .map(|id| ElementFact {
            name: id.to_string(),
            ty: results.types.remove(&id),
            declaration_annotations: results.declarations.remove(&id).unwrap_or_default(),
            from_overlay: results.from_overlay.contains(&id),
            id,
        })
        .collect();
    let fake_overrides = results
        .fake_overrides
        .into_iter()
        .map(|fake| FakeOverrideFact {
            method: fake.method,
            receiver: fake.declaring.replace(['/', '$'], "."),
            ty: fake.ty,
        })
        .collect();

    FactBase {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        elements,
        fake_overrides,
    }
}

pub(crate) fn write_fact_base(writer: &mut dyn Write, facts: &FactBase) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, facts)
        .context("failed to serialize fact base")?;
    writer
        .write_all(b"\n")
        .context("failed to write fact base")?;
    Ok(())
}
