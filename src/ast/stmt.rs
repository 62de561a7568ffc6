use super::{ArraySpec, DeclId, ExprId, QualType, StmtId};
use crate::ident::Symbol;

/// A reference to a statement label: either already resolved to its target
/// statement, still waiting on a label declared later in the unit, or a
/// sentinel left behind when resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtLabelRef {
    Empty,
    /// The label expression whose integer value names the target.
    Unresolved(ExprId),
    Resolved(StmtId),
}

impl StmtLabelRef {
    pub fn is_resolved(&self) -> bool {
        matches!(self, StmtLabelRef::Resolved(_))
    }
}

/// Format specifier of an I/O statement.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatSpec {
    /// `*` list-directed formatting.
    Star,
    /// A character expression.
    CharExpr(ExprId),
    /// A FORMAT statement label.
    Label(StmtLabelRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleNature {
    Unspecified,
    Intrinsic,
    NonIntrinsic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Program { name: Option<Symbol> },
    EndProgram { name: Option<Symbol> },
    Use {
        nature: ModuleNature,
        module: Symbol,
        only: bool,
        renames: Vec<(Symbol, Symbol)>,
    },
    Import { names: Vec<Symbol> },
    /// `IMPLICIT NONE` when `spec` is None, a rule list otherwise.
    Implicit {
        spec: Option<(QualType, Vec<LetterSpec>)>,
    },
    Parameter { pairs: Vec<(Symbol, ExprId)> },
    Dimension {
        name: Symbol,
        dims: Vec<ArraySpec>,
    },
    External { names: Vec<Symbol> },
    Intrinsic { names: Vec<Symbol> },
    Asynchronous { names: Vec<Symbol> },
    /// `name(args) = expr` statement function definition.
    StmtFunction { function: DeclId },
    Assignment { lhs: ExprId, rhs: ExprId },
    /// `ASSIGN label TO var`
    Assign {
        address: StmtLabelRef,
        var: ExprId,
    },
    /// `GO TO var [, (labels)]`
    AssignedGoto {
        var: ExprId,
        allowed: Vec<StmtLabelRef>,
    },
    Goto { destination: StmtLabelRef },
    /// Both the logical IF (then_stmt set at creation) and the block IF
    /// (else_stmt patched by ELSE IF / ELSE).
    If {
        condition: ExprId,
        then_stmt: Option<StmtId>,
        else_stmt: Option<StmtId>,
    },
    Else,
    EndIf,
    Do {
        terminator: StmtLabelRef,
        var: ExprId,
        init: ExprId,
        limit: ExprId,
        step: Option<ExprId>,
    },
    Continue,
    Stop { code: Option<ExprId> },
    Print {
        format: FormatSpec,
        items: Vec<ExprId>,
    },
    Where {
        mask: ExprId,
        body: StmtId,
    },
    Block { body: Vec<StmtId> },
}

/// A letter or letter range of an IMPLICIT rule, e.g. `A-H` or `I`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterSpec {
    pub first: char,
    pub last: Option<char>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: std::ops::Range<usize>,
    /// The statement's own label, if it carried one.
    pub label: Option<ExprId>,
    /// Set when a later check invalidated the statement (e.g. a DO whose
    /// terminating statement is not allowed to terminate a loop).
    pub invalid: bool,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: std::ops::Range<usize>, label: Option<ExprId>) -> Self {
        Self {
            kind,
            span,
            label,
            invalid: false,
        }
    }
}
