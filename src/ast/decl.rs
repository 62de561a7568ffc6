use std::collections::HashMap;

use super::{DeclContextId, DeclId, ExprId, QualType, StmtId};
use crate::ident::{IntrinsicResult, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Local,
    Argument,
    Parameter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    TranslationUnit { ctx: DeclContextId },
    MainProgram { ctx: DeclContextId },
    Function {
        ctx: DeclContextId,
        result: Option<QualType>,
        args: Vec<DeclId>,
        /// Statement functions are declared by `name(args) = expr`.
        stmt_function_body: Option<ExprId>,
    },
    Subroutine {
        ctx: DeclContextId,
        args: Vec<DeclId>,
    },
    IntrinsicFunction { result: IntrinsicResult },
    Module { ctx: DeclContextId },
    Submodule { ctx: DeclContextId },
    Record { ctx: DeclContextId },
    Field { ty: QualType },
    Var {
        ty: Option<QualType>,
        kind: VarKind,
        init: Option<ExprId>,
    },
    EnumConstant { ty: QualType, value: i64 },
    FileScopeAsm { text: String },
}

/// A declaration. Owned by exactly one declaration context (`dc` is None
/// only for the translation unit itself).
#[derive(Debug)]
pub struct Decl {
    pub kind: DeclKind,
    pub dc: Option<DeclContextId>,
    pub name: Option<Symbol>,
    pub span: std::ops::Range<usize>,
    /// Generated by the implementation (e.g. implicit typing) rather than
    /// written in the source.
    pub implicit: bool,
    /// A semantic error occurred on this declaration.
    pub invalid: bool,
}

impl Decl {
    pub fn var_type(&self) -> Option<QualType> {
        match &self.kind {
            DeclKind::Var { ty, .. } => *ty,
            DeclKind::Field { ty } => Some(*ty),
            _ => None,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::Var {
                kind: VarKind::Parameter,
                ..
            }
        )
    }

    pub fn init(&self) -> Option<ExprId> {
        match &self.kind {
            DeclKind::Var { init, .. } => *init,
            _ => None,
        }
    }

    /// The declaration context this declaration itself opens, if it is one
    /// of the context-forming kinds.
    pub fn context_of(&self) -> Option<DeclContextId> {
        match &self.kind {
            DeclKind::TranslationUnit { ctx }
            | DeclKind::MainProgram { ctx }
            | DeclKind::Function { ctx, .. }
            | DeclKind::Subroutine { ctx, .. }
            | DeclKind::Module { ctx }
            | DeclKind::Submodule { ctx }
            | DeclKind::Record { ctx } => Some(*ctx),
            _ => None,
        }
    }
}

/// A lexical scope owning declarations in source order, plus a lazily built
/// name-lookup index. Contexts form a parent tree rooted at the translation
/// unit. The executable statements of a program unit are owned here too.
#[derive(Debug)]
pub struct DeclContext {
    pub owner: Option<DeclId>,
    pub parent: Option<DeclContextId>,
    pub decls: Vec<DeclId>,
    /// Declarations made visible here without transferring ownership.
    pub visible: Vec<DeclId>,
    pub body: Vec<StmtId>,
    /// Built on first lookup, discarded on any mutation.
    pub(super) lookup: Option<HashMap<Symbol, Vec<DeclId>>>,
}

impl DeclContext {
    pub fn new(parent: Option<DeclContextId>) -> Self {
        Self {
            owner: None,
            parent,
            decls: Vec::new(),
            visible: Vec::new(),
            body: Vec::new(),
            lookup: None,
        }
    }
}
