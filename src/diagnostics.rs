use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ast::Position;

/// Category of a recovered overlay anomaly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DiagnosticKind {
    /// Syntax error; the whole file was abandoned.
    Parse,
    /// A declared element, qualifier or constant is absent from the program.
    NotFound,
    /// Declared and real structure disagree.
    Mismatch,
    /// Syntax the engine understands but does not apply.
    Unsupported,
}

impl DiagnosticKind {
    pub(crate) fn rule_id(self) -> &'static str {
        match self {
            DiagnosticKind::Parse => "OVERLAY_PARSE_ERROR",
            DiagnosticKind::NotFound => "OVERLAY_NOT_FOUND",
            DiagnosticKind::Mismatch => "OVERLAY_MISMATCH",
            DiagnosticKind::Unsupported => "OVERLAY_UNSUPPORTED",
        }
    }

    pub(crate) fn description(self) -> &'static str {
        match self {
            DiagnosticKind::Parse => "Overlay file could not be parsed and was skipped",
            DiagnosticKind::NotFound => {
                "Overlay names an element, qualifier or constant missing from the program"
            }
            DiagnosticKind::Mismatch => "Overlay type structure disagrees with the real type",
            DiagnosticKind::Unsupported => "Overlay construct is not applied",
        }
    }

    pub(crate) fn all() -> [DiagnosticKind; 4] {
        [
            DiagnosticKind::Parse,
            DiagnosticKind::NotFound,
            DiagnosticKind::Mismatch,
            DiagnosticKind::Unsupported,
        ]
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct Diagnostic {
    pub(crate) kind: DiagnosticKind,
    pub(crate) file: String,
    pub(crate) line: u32,
    pub(crate) column: u32,
    pub(crate) message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

/// Collects diagnostics for one engine, printing each distinct message once.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticSink {
    warn_if_not_found: bool,
    debug_builtin: bool,
    seen: RefCell<BTreeSet<String>>,
    recorded: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub(crate) fn new(warn_if_not_found: bool, debug_builtin: bool) -> Self {
        Self {
            warn_if_not_found,
            debug_builtin,
            ..Self::default()
        }
    }

    /// Record a diagnostic. `builtin` marks overlays shipped with the tool, whose
    /// anomalies stay silent unless debugging.
    pub(crate) fn report(
        &self,
        kind: DiagnosticKind,
        file: &str,
        position: Position,
        message: impl Into<String>,
        builtin: bool,
    ) {
        let diagnostic = Diagnostic {
            kind,
            file: file.to_string(),
            line: position.line,
            column: position.column,
            message: message.into(),
        };
        let rendered = diagnostic.to_string();
        if !self.seen.borrow_mut().insert(rendered.clone()) {
            return;
        }
        let loud = (!builtin || self.debug_builtin)
            && (kind != DiagnosticKind::NotFound || self.warn_if_not_found);
        if loud {
            warn!("{rendered}");
        } else {
            debug!("{rendered}");
        }
        self.recorded.borrow_mut().push(diagnostic);
    }

    pub(crate) fn diagnostics(&self) -> Vec<Diagnostic> {
        self.recorded.borrow().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.recorded.borrow().len()
    }
}

/// A sink bound to the overlay file being processed.
#[derive(Clone, Copy)]
pub(crate) struct Reporter<'a> {
    sink: &'a DiagnosticSink,
    file: &'a str,
    builtin: bool,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: &'a DiagnosticSink, file: &'a str, builtin: bool) -> Self {
        Self {
            sink,
            file,
            builtin,
        }
    }

    pub(crate) fn report(&self, kind: DiagnosticKind, position: Position, message: impl Into<String>) {
        self.sink
            .report(kind, self.file, position, message, self.builtin);
    }

    pub(crate) fn not_found(&self, position: Position, message: impl Into<String>) {
        self.report(DiagnosticKind::NotFound, position, message);
    }

    pub(crate) fn mismatch(&self, position: Position, message: impl Into<String>) {
        self.report(DiagnosticKind::Mismatch, position, message);
    }

    pub(crate) fn unsupported(&self, position: Position, message: impl Into<String>) {
        self.report(DiagnosticKind::Unsupported, position, message);
    }

    pub(crate) fn file(&self) -> &'a str {
        self.file
    }
}
