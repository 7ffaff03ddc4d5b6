use std::collections::BTreeMap;

use serde_json::json;
use serde_sarif::sarif::{
    ArtifactLocation, Invocation, Location, Message, MultiformatMessageString, PhysicalLocation,
    PropertyBag, Region, ReportingDescriptor, Result as SarifResult, Run, SCHEMA_URL, Sarif,
    Tool, ToolComponent,
};

use crate::diagnostics::{Diagnostic, DiagnosticKind};

/// Metadata captured for SARIF invocation properties.
pub(crate) struct InvocationStats {
    pub(crate) scan_duration_ms: u128,
    pub(crate) merge_duration_ms: u128,
    pub(crate) class_count: usize,
    pub(crate) element_count: usize,
    pub(crate) trace_id: Option<String>,
}

pub(crate) fn build_invocation(stats: &InvocationStats) -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");
    let mut properties = BTreeMap::new();
    properties.insert("stubweave.scan_ms".to_string(), json!(stats.scan_duration_ms));
    properties.insert(
        "stubweave.merge_ms".to_string(),
        json!(stats.merge_duration_ms),
    );
    properties.insert("stubweave.class_count".to_string(), json!(stats.class_count));
    properties.insert(
        "stubweave.element_count".to_string(),
        json!(stats.element_count),
    );
    if let Some(trace_id) = &stats.trace_id {
        properties.insert("stubweave.trace_id".to_string(), json!(trace_id));
    }

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .properties(PropertyBag::builder().additional_properties(properties).build())
        .build()
}

fn rule_descriptor(kind: DiagnosticKind) -> ReportingDescriptor {
    ReportingDescriptor::builder()
        .id(kind.rule_id())
        .name(kind.rule_id())
        .short_description(
            MultiformatMessageString::builder()
                .text(kind.description())
                .build(),
        )
        .build()
}

fn diagnostic_result(diagnostic: &Diagnostic) -> SarifResult {
    let artifact_location = ArtifactLocation::builder()
        .uri(diagnostic.file.clone())
        .build();
    let region = Region::builder()
        .start_line(i64::from(diagnostic.line))
        .start_column(i64::from(diagnostic.column))
        .build();
    let physical = PhysicalLocation::builder()
        .artifact_location(artifact_location)
        .region(region)
        .build();
    SarifResult::builder()
        .rule_id(diagnostic.kind.rule_id())
        .message(Message::builder().text(diagnostic.message.clone()).build())
        .locations(vec![Location::builder().physical_location(physical).build()])
        .build()
}

/// SARIF log with one rule per diagnostic kind and one result per diagnostic,
/// ordered by file and position.
pub(crate) fn build_sarif(diagnostics: &[Diagnostic], invocation: Invocation) -> Sarif {
    let rules: Vec<ReportingDescriptor> =
        DiagnosticKind::all().into_iter().map(rule_descriptor).collect();
    let mut sorted: Vec<&Diagnostic> = diagnostics.iter().collect();
    sorted.sort_by(|left, right| {
        (&left.file, left.line, left.column, &left.message).cmp(&(
            &right.file,
            right.line,
            right.column,
            &right.message,
        ))
    });
    let results: Vec<SarifResult> = sorted.into_iter().map(diagnostic_result).collect();

    let driver = ToolComponent::builder()
        .name("stubweave")
        .version(env!("CARGO_PKG_VERSION"))
        .rules(rules)
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = Run::builder()
        .tool(tool)
        .invocations(vec![invocation])
        .results(results)
        .build();

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn stats() -> InvocationStats {
        InvocationStats {
            scan_duration_ms: 1,
            merge_duration_ms: 2,
            class_count: 3,
            element_count: 4,
            trace_id: None,
        }
    }

    fn diagnostic(file: &str, line: u32, message: &str) -> Diagnostic {
        Diagnostic {
            kind: DiagnosticKind::NotFound,
            file: file.to_string(),
            line,
            column: 5,
            message: message.to_string(),
        }
    }

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let sarif = build_sarif(&[], build_invocation(&stats()));
        let value = serde_json::to_value(&sarif).expect("serialize");

        assert_eq!(value["version"], "2.1.0");
        let run = &value["runs"][0];
        assert_eq!(run["tool"]["driver"]["name"], "stubweave");
        assert_eq!(
            run["tool"]["driver"]["rules"]
                .as_array()
                .expect("rules")
                .len(),
            4
        );
        assert_eq!(
            run["invocations"][0]["properties"]["stubweave.class_count"],
            3
        );
        assert!(run["results"].as_array().expect("results").is_empty());
    }

    #[test]
    fn diagnostics_become_located_results_in_file_order() {
        let diagnostics = vec![
            diagnostic("b.astub", 1, "Type not found: p.B"),
            diagnostic("a.astub", 9, "Field x not found in type p.A"),
        ];
        let sarif = build_sarif(&diagnostics, build_invocation(&stats()));
        let value: Value = serde_json::to_value(&sarif).expect("serialize");

        let results = value["runs"][0]["results"].as_array().expect("results");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["ruleId"], "OVERLAY_NOT_FOUND");
        assert_eq!(results[0]["message"]["text"], "Field x not found in type p.A");
        let location = &results[0]["locations"][0]["physicalLocation"];
        assert_eq!(location["artifactLocation"]["uri"], "a.astub");
        assert_eq!(location["region"]["startLine"], 9);
        assert_eq!(location["region"]["startColumn"], 5);
    }
}
