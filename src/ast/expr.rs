use super::{DeclId, ExprId, QualType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Eqv,
    Neqv,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow
        )
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Eqv | BinaryOp::Neqv
        )
    }
}

/// Arithmetic conversion inserted by the analyzer when assignment or DO
/// bound kinds differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Int,
    Real,
    Dble,
    Cmplx,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntConstant(i64),
    RealConstant(f64),
    ComplexConstant { re: f64, im: f64 },
    CharConstant(String),
    LogicalConstant(bool),
    /// Reference to a declared entity.
    Var(DeclId),
    Unary {
        op: UnaryOp,
        expr: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// Promotion inserted while typing a binary expression.
    ImplicitCast { expr: ExprId },
    /// Explicit arithmetic conversion of a known kind.
    Conversion {
        kind: ConversionKind,
        expr: ExprId,
    },
    ArrayConstructor { items: Vec<ExprId> },
    ArrayElement {
        array: DeclId,
        subscripts: Vec<ExprId>,
    },
    IntrinsicCall {
        function: DeclId,
        args: Vec<ExprId>,
    },
    Call {
        function: DeclId,
        args: Vec<ExprId>,
    },
    /// Marker for an expression that failed to parse or type-check;
    /// downstream passes treat it as opaque.
    Error,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// None for `Error` markers.
    pub ty: Option<QualType>,
    pub span: std::ops::Range<usize>,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: QualType, span: std::ops::Range<usize>) -> Self {
        Self {
            kind,
            ty: Some(ty),
            span,
        }
    }

    pub fn error(span: std::ops::Range<usize>) -> Self {
        Self {
            kind: ExprKind::Error,
            ty: None,
            span,
        }
    }
}
