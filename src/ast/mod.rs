pub mod context;
pub mod decl;
pub mod expr;
pub mod stmt;
pub mod types;

pub use context::ASTContext;
pub use decl::{Decl, DeclContext, DeclKind, VarKind};
pub use expr::{BinaryOp, ConversionKind, Expr, ExprKind, UnaryOp};
pub use stmt::{FormatSpec, Stmt, StmtKind, StmtLabelRef};
pub use types::{ArraySpec, BuiltinSpec, ExtAttr, IntentAttr, QualType, Qualifiers, Type, TypeKind};

/// Arena handles. All AST nodes live in per-translation-unit arenas owned by
/// the `ASTContext`; nodes refer to each other through these ids, which keeps
/// the mutually referential parts of the tree (declarations and their
/// contexts, records containing pointers to themselves) free of ownership
/// cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclContextId(pub u32);
