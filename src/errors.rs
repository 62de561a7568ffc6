use thiserror::Error;

/// What stage of the front end produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Lex,
    Parse,
    Name,
    Type,
    Flow,
    Internal,
}

/// How severe a diagnostic is. The driver's exit status only looks at
/// `Error`; everything else is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Remark,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub severity: Severity,
    pub message: String,
    pub span: std::ops::Range<usize>,
}

impl CompileError {
    pub fn new(
        kind: CompileErrorKind,
        severity: Severity,
        message: impl Into<String>,
        span: std::ops::Range<usize>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            span,
        }
    }
}
