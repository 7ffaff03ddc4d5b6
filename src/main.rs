mod ast;
mod atype;
mod classfile;
mod config;
mod descriptor;
mod diagnostics;
mod engine;
mod export;
mod imports;
mod lexer;
mod matcher;
mod merger;
mod model;
mod parser;
mod processor;
mod qualifier;
mod report;
mod scan;
mod signature;
mod telemetry;
#[cfg(test)]
mod test_harness;
mod values;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::config::{EngineOptions, load_config};
use crate::engine::OverlayEngine;
use crate::export::{build_fact_base, write_fact_base};
use crate::model::ClassIndex;
use crate::report::{InvocationStats, build_invocation, build_sarif};
use crate::scan::scan_classpath;
use crate::telemetry::{Phase, Telemetry, current_trace_id, init_logging, with_span};

/// CLI arguments for stubweave execution.
#[derive(Parser, Debug)]
#[command(
    name = "stubweave",
    about = "Merge type-qualifier overlay files onto JVM class files and export the result.",
    version
)]
struct Cli {
    /// Class directories, jar files or class files that form the program.
    #[arg(long, value_name = "PATH", required = true)]
    classpath: Vec<PathBuf>,
    /// User overlay file, directory or jar. Repeatable.
    #[arg(long, value_name = "PATH")]
    stubs: Vec<PathBuf>,
    /// Overlay standing in for the program's own source. Repeatable.
    #[arg(long, value_name = "PATH")]
    shadow: Vec<PathBuf>,
    /// Directory or jar with one platform overlay per class, parsed on demand.
    #[arg(long, value_name = "PATH")]
    platform_overlays: Option<PathBuf>,
    #[arg(long, value_name = "VERSION")]
    platform_version: Option<u32>,
    #[arg(long)]
    ignore_platform: bool,
    #[arg(long)]
    allow_missing_platform: bool,
    #[arg(long)]
    parse_all_platform: bool,
    /// Let annotations found in the class files win over user and platform overlays.
    #[arg(long)]
    merge_with_source: bool,
    #[arg(long)]
    warn_if_not_found: bool,
    /// Also report anomalies in platform overlays.
    #[arg(long)]
    debug_overlays: bool,
    /// JSON configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Fact base output; `-` or absent writes to stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Write every overlay diagnostic as SARIF.
    #[arg(long, value_name = "PATH")]
    diagnostics: Option<PathBuf>,
    /// OTLP HTTP endpoint for trace export.
    #[arg(long, value_name = "URL")]
    otel: Option<String>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let telemetry = cli.otel.clone().map(Telemetry::new).transpose()?;
    let result = with_span(telemetry.as_ref(), Phase::Run, &[], || {
        run(&cli, telemetry.as_ref())
    });
    if let Some(telemetry) = &telemetry {
        telemetry.shutdown()?;
    }
    result
}

fn run(cli: &Cli, telemetry: Option<&Telemetry>) -> Result<()> {
    let options = engine_options(cli)?;

    let started_at = Instant::now();
    let scan = with_span(telemetry, Phase::ClasspathScan, &[], || {
        scan_classpath(&cli.classpath, telemetry)
    })?;
    let scan_duration_ms = started_at.elapsed().as_millis();
    let class_count = scan.classes.len();
    let entry_count = scan.entries.len();
    let index = ClassIndex::new(scan.classes, &options.hierarchies());

    let merge_started_at = Instant::now();
    let engine = OverlayEngine::new(&index, options, telemetry)?;
    let facts = build_fact_base(engine.results());
    let merge_duration_ms = merge_started_at.elapsed().as_millis();
    let diagnostics = engine.diagnostics();
    info!(
        "merged overlays onto {} elements with {} diagnostics",
        facts.elements.len(),
        diagnostics.len()
    );

    with_span(telemetry, Phase::Export, &[], || -> Result<()> {
        let mut writer = output_writer(cli.output.as_deref())?;
        write_fact_base(&mut writer, &facts)
    })?;

    if let Some(path) = &cli.diagnostics {
        let invocation = build_invocation(&InvocationStats {
            scan_duration_ms,
            merge_duration_ms,
            class_count,
            element_count: facts.elements.len(),
            trace_id: current_trace_id(),
        });
        let sarif = build_sarif(&diagnostics, invocation);
        let mut writer = output_writer(Some(path))?;
        serde_json::to_writer_pretty(&mut writer, &sarif)
            .context("failed to serialize SARIF output")?;
        writer
            .write_all(b"\n")
            .context("failed to write SARIF output")?;
    }

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} scan_ms={} merge_ms={} entries={} classes={} elements={} diagnostics={}",
            started_at.elapsed().as_millis(),
            scan_duration_ms,
            merge_duration_ms,
            entry_count,
            class_count,
            facts.elements.len(),
            diagnostics.len()
        );
    }

    Ok(())
}

fn engine_options(cli: &Cli) -> Result<EngineOptions> {
    let mut options = EngineOptions {
        ignore_platform: cli.ignore_platform,
        platform_overlays: cli.platform_overlays.clone(),
        allow_missing_platform: cli.allow_missing_platform,
        parse_all_platform: cli.parse_all_platform,
        merge_with_source: cli.merge_with_source,
        warn_if_not_found: cli.warn_if_not_found,
        debug_overlays: cli.debug_overlays,
        user_overlays: cli.stubs.clone(),
        shadow_overlays: cli.shadow.clone(),
        ..EngineOptions::default()
    };
    if let Some(path) = &cli.config {
        options.apply_config(load_config(path)?);
    }
    // The command line wins over the configuration file.
    if let Some(version) = cli.platform_version {
        options.platform_version = version;
    }
    Ok(options)
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
