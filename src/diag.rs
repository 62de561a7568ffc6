use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use codespan_reporting::term::{emit, Config};

use crate::errors::{CompileError, CompileErrorKind, Severity};

pub type Span = std::ops::Range<usize>;

/// Collects diagnostics for one translation unit and renders them as they
/// arrive. The engine is borrowed by the parser and the analyzer for the
/// duration of the pass; it never decides the exit status itself, the driver
/// asks `had_errors` afterwards.
pub struct DiagnosticsEngine {
    file: SimpleFile<String, String>,
    errors: Vec<CompileError>,
    render: bool,
}

impl DiagnosticsEngine {
    pub fn new(filename: &str, src: &str) -> Self {
        Self {
            file: SimpleFile::new(filename.to_string(), src.to_string()),
            errors: Vec::new(),
            render: true,
        }
    }

    /// An engine that records diagnostics without printing them. Used by the
    /// test suite and by `-verify` runs.
    pub fn quiet(filename: &str, src: &str) -> Self {
        let mut engine = Self::new(filename, src);
        engine.render = false;
        engine
    }

    pub fn report(
        &mut self,
        span: Span,
        kind: CompileErrorKind,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let message = message.into();
        self.render(severity, &message, &span, None);
        self.errors
            .push(CompileError::new(kind, severity, message, span));
    }

    pub fn error(&mut self, span: Span, kind: CompileErrorKind, message: impl Into<String>) {
        self.report(span, kind, Severity::Error, message);
    }

    pub fn warning(&mut self, span: Span, kind: CompileErrorKind, message: impl Into<String>) {
        self.report(span, kind, Severity::Warning, message);
    }

    pub fn remark(&mut self, span: Span, kind: CompileErrorKind, message: impl Into<String>) {
        self.report(span, kind, Severity::Remark, message);
    }

    /// Error with a secondary label, e.g. pointing at a previous declaration.
    pub fn error_with_note(
        &mut self,
        span: Span,
        kind: CompileErrorKind,
        message: impl Into<String>,
        note_span: Span,
        note: &str,
    ) {
        let message = message.into();
        self.render(Severity::Error, &message, &span, Some((&note_span, note)));
        self.errors
            .push(CompileError::new(kind, Severity::Error, message, span));
    }

    fn render(
        &self,
        severity: Severity,
        message: &str,
        span: &Span,
        note: Option<(&Span, &str)>,
    ) {
        if !self.render {
            return;
        }
        let mut labels = vec![Label::primary((), span.clone())];
        if let Some((note_span, note_msg)) = note {
            labels.push(Label::secondary((), note_span.clone()).with_message(note_msg));
        }
        let diag = match severity {
            Severity::Error => Diagnostic::error(),
            Severity::Warning => Diagnostic::warning(),
            Severity::Note => Diagnostic::note(),
            Severity::Remark => Diagnostic::help(),
        };
        let diag = diag.with_message(message).with_labels(labels);
        let mut stderr = StandardStream::stderr(ColorChoice::Auto);
        let _ = emit(&mut stderr, &Config::default(), &self.file, &diag);
    }

    pub fn had_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity == Severity::Error)
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    fn line_of(&self, offset: usize) -> usize {
        self.file.source()[..offset.min(self.file.source().len())]
            .bytes()
            .filter(|&b| b == b'\n')
            .count()
            + 1
    }

    /// `-verify` support: checks `! expected-error {{...}}` annotations in
    /// the source against the recorded diagnostics. Returns the list of
    /// mismatches; empty means the run matched the expectations.
    pub fn verify_expectations(&self) -> Vec<String> {
        let src = self.file.source().clone();
        let mut failures = Vec::new();
        let mut matched = vec![false; self.errors.len()];

        for (lineno, line) in src.lines().enumerate() {
            let lineno = lineno + 1;
            let mut rest = line;
            while let Some(at) = rest.find("! expected-error {{") {
                let tail = &rest[at + "! expected-error {{".len()..];
                let Some(end) = tail.find("}}") else { break };
                let expected = &tail[..end];
                let hit = self.errors.iter().enumerate().position(|(i, e)| {
                    !matched[i]
                        && e.severity == Severity::Error
                        && self.line_of(e.span.start) == lineno
                        && e.message.contains(expected)
                });
                match hit {
                    Some(i) => matched[i] = true,
                    None => failures.push(format!(
                        "line {}: expected error '{}' was not produced",
                        lineno, expected
                    )),
                }
                rest = &tail[end..];
            }
        }

        for (i, e) in self.errors.iter().enumerate() {
            if e.severity == Severity::Error && !matched[i] {
                failures.push(format!(
                    "line {}: unexpected error '{}'",
                    self.line_of(e.span.start),
                    e.message
                ));
            }
        }
        failures
    }
}
