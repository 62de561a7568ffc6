use std::collections::HashMap;

use super::decl::{Decl, DeclContext, DeclKind};
use super::expr::Expr;
use super::stmt::Stmt;
use super::types::{ArraySpec, BuiltinSpec, QualType, Qualifiers, Type, TypeKind};
use super::{DeclContextId, DeclId, ExprId, StmtId, TypeId};
use crate::ident::{IdentifierTable, Symbol};
use crate::options::LangOptions;

/// Owns every AST node of one translation unit. Storage is arena-like:
/// nodes are handed out as ids and never freed individually; the whole
/// context is dropped when the unit is discarded.
pub struct ASTContext {
    pub idents: IdentifierTable,
    pub opts: LangOptions,

    types: Vec<Type>,
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    decls: Vec<Decl>,
    contexts: Vec<DeclContext>,

    /// Fold set for structural type uniquing.
    type_uniq: HashMap<TypeKind, TypeId>,

    pub integer_ty: TypeId,
    pub real_ty: TypeId,
    pub double_precision_ty: TypeId,
    pub complex_ty: TypeId,
    pub character_ty: TypeId,
    pub logical_ty: TypeId,

    tu_decl: DeclId,
    tu_ctx: DeclContextId,
}

impl ASTContext {
    pub fn new(opts: LangOptions) -> Self {
        let mut ctx = ASTContext {
            idents: IdentifierTable::new(),
            opts,
            types: Vec::new(),
            exprs: Vec::new(),
            stmts: Vec::new(),
            decls: Vec::new(),
            contexts: Vec::new(),
            type_uniq: HashMap::new(),
            integer_ty: TypeId(0),
            real_ty: TypeId(0),
            double_precision_ty: TypeId(0),
            complex_ty: TypeId(0),
            character_ty: TypeId(0),
            logical_ty: TypeId(0),
            tu_decl: DeclId(0),
            tu_ctx: DeclContextId(0),
        };

        ctx.integer_ty = ctx.intern_type(TypeKind::Builtin {
            spec: BuiltinSpec::Integer,
            kind: None,
            len: None,
        });
        ctx.real_ty = ctx.intern_type(TypeKind::Builtin {
            spec: BuiltinSpec::Real,
            kind: None,
            len: None,
        });
        ctx.double_precision_ty = ctx.intern_type(TypeKind::Builtin {
            spec: BuiltinSpec::DoublePrecision,
            kind: None,
            len: None,
        });
        ctx.complex_ty = ctx.intern_type(TypeKind::Builtin {
            spec: BuiltinSpec::Complex,
            kind: None,
            len: None,
        });
        ctx.character_ty = ctx.intern_type(TypeKind::Builtin {
            spec: BuiltinSpec::Character,
            kind: None,
            len: None,
        });
        ctx.logical_ty = ctx.intern_type(TypeKind::Builtin {
            spec: BuiltinSpec::Logical,
            kind: None,
            len: None,
        });

        let tu_ctx = ctx.create_context(None);
        let tu_decl = ctx.alloc_decl(Decl {
            kind: DeclKind::TranslationUnit { ctx: tu_ctx },
            dc: None,
            name: None,
            span: 0..0,
            implicit: false,
            invalid: false,
        });
        ctx.contexts[tu_ctx.0 as usize].owner = Some(tu_decl);
        ctx.tu_decl = tu_decl;
        ctx.tu_ctx = tu_ctx;
        ctx
    }

    pub fn translation_unit(&self) -> DeclId {
        self.tu_decl
    }

    pub fn translation_unit_context(&self) -> DeclContextId {
        self.tu_ctx
    }

    // -------------------------------------------------------------- types

    /// Interns a type, returning the canonical instance for structurally
    /// identical payloads.
    pub fn intern_type(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.type_uniq.get(&kind) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        // The canonical form of a builtin carrying selectors is the plain
        // builtin; every other type is canonical by itself.
        let canonical = match &kind {
            TypeKind::Builtin { spec, kind: k, len } if k.is_some() || len.is_some() => {
                self.builtin(*spec)
            }
            _ => id,
        };
        self.types.push(Type {
            kind: kind.clone(),
            canonical,
        });
        self.type_uniq.insert(kind, id);
        id
    }

    pub fn builtin(&mut self, spec: BuiltinSpec) -> TypeId {
        self.intern_type(TypeKind::Builtin {
            spec,
            kind: None,
            len: None,
        })
    }

    pub fn get_builtin_type(
        &mut self,
        spec: BuiltinSpec,
        kind: Option<ExprId>,
        len: Option<ExprId>,
    ) -> TypeId {
        self.intern_type(TypeKind::Builtin { spec, kind, len })
    }

    pub fn get_array_type(&mut self, element: QualType, dims: Vec<ArraySpec>) -> TypeId {
        self.intern_type(TypeKind::Array { element, dims })
    }

    pub fn get_pointer_type(&mut self, pointee: TypeId, dims: u32) -> TypeId {
        self.intern_type(TypeKind::Pointer { pointee, dims })
    }

    pub fn get_record_type(&mut self, fields: Vec<DeclId>) -> TypeId {
        self.intern_type(TypeKind::Record { fields })
    }

    /// Builds a qualified type from a canonical type, a qualifier set, and
    /// optional kind/length selectors.
    pub fn qualify(
        &mut self,
        ty: TypeId,
        quals: Qualifiers,
        kind_selector: Option<ExprId>,
        length_selector: Option<ExprId>,
    ) -> QualType {
        let ty = if kind_selector.is_some() || length_selector.is_some() {
            match self.type_(ty).kind.clone() {
                TypeKind::Builtin { spec, .. } => {
                    self.get_builtin_type(spec, kind_selector, length_selector)
                }
                _ => ty,
            }
        } else {
            ty
        };
        QualType::with_quals(ty, quals)
    }

    pub fn type_(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn canonical(&self, id: TypeId) -> TypeId {
        self.types[id.0 as usize].canonical
    }

    fn canonical_builtin_spec(&self, qt: QualType) -> Option<BuiltinSpec> {
        match &self.type_(self.canonical(qt.ty)).kind {
            TypeKind::Builtin { spec, .. } => Some(*spec),
            _ => None,
        }
    }

    pub fn is_integer_type(&self, qt: QualType) -> bool {
        self.canonical_builtin_spec(qt) == Some(BuiltinSpec::Integer)
    }

    pub fn is_real_type(&self, qt: QualType) -> bool {
        self.canonical_builtin_spec(qt) == Some(BuiltinSpec::Real)
    }

    pub fn is_double_precision_type(&self, qt: QualType) -> bool {
        self.canonical_builtin_spec(qt) == Some(BuiltinSpec::DoublePrecision)
    }

    pub fn is_complex_type(&self, qt: QualType) -> bool {
        self.canonical_builtin_spec(qt) == Some(BuiltinSpec::Complex)
    }

    pub fn is_character_type(&self, qt: QualType) -> bool {
        self.canonical_builtin_spec(qt) == Some(BuiltinSpec::Character)
    }

    pub fn is_logical_type(&self, qt: QualType) -> bool {
        self.canonical_builtin_spec(qt) == Some(BuiltinSpec::Logical)
    }

    pub fn is_arithmetic_type(&self, qt: QualType) -> bool {
        matches!(
            self.canonical_builtin_spec(qt),
            Some(BuiltinSpec::Integer)
                | Some(BuiltinSpec::Real)
                | Some(BuiltinSpec::DoublePrecision)
                | Some(BuiltinSpec::Complex)
        )
    }

    pub fn is_array_type(&self, qt: QualType) -> bool {
        matches!(self.type_(qt.ty).kind, TypeKind::Array { .. })
    }

    /// Element type and dimensions of an array type.
    pub fn array_parts(&self, qt: QualType) -> Option<(QualType, &[ArraySpec])> {
        match &self.type_(qt.ty).kind {
            TypeKind::Array { element, dims } => Some((*element, dims)),
            _ => None,
        }
    }

    pub fn display_type(&self, qt: QualType) -> String {
        match &self.type_(qt.ty).kind {
            TypeKind::Builtin { spec, .. } => match spec {
                BuiltinSpec::Integer => "INTEGER".into(),
                BuiltinSpec::Real => "REAL".into(),
                BuiltinSpec::DoublePrecision => "DOUBLE PRECISION".into(),
                BuiltinSpec::Complex => "COMPLEX".into(),
                BuiltinSpec::Character => "CHARACTER".into(),
                BuiltinSpec::Logical => "LOGICAL".into(),
            },
            TypeKind::Array { element, dims } => {
                format!(
                    "{}-dimensional array of {}",
                    dims.len(),
                    self.display_type(*element)
                )
            }
            TypeKind::Record { .. } => "derived type".into(),
            TypeKind::Pointer { .. } => "POINTER".into(),
        }
    }

    // -------------------------------------------------------- expressions

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    // --------------------------------------------------------- statements

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.0 as usize]
    }

    // ------------------------------------------------------- declarations

    pub fn alloc_decl(&mut self, decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        id
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> {
        (0..self.decls.len() as u32).map(DeclId)
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.0 as usize]
    }

    pub fn decl_name(&self, id: DeclId) -> &str {
        self.decl(id)
            .name
            .map(|s| self.idents.name(s))
            .unwrap_or("")
    }

    // ------------------------------------------------ declaration contexts

    pub fn create_context(&mut self, parent: Option<DeclContextId>) -> DeclContextId {
        let id = DeclContextId(self.contexts.len() as u32);
        self.contexts.push(DeclContext::new(parent));
        id
    }

    pub fn context(&self, id: DeclContextId) -> &DeclContext {
        &self.contexts[id.0 as usize]
    }

    pub fn context_mut(&mut self, id: DeclContextId) -> &mut DeclContext {
        &mut self.contexts[id.0 as usize]
    }

    /// Appends a declaration to the context's lexical list and takes
    /// ownership; named declarations become visible to lookup.
    pub fn add_decl(&mut self, dc: DeclContextId, decl: DeclId) {
        debug_assert!(
            self.decl(decl).dc.is_none() || self.decl(decl).dc == Some(dc),
            "declaration already owned by another context"
        );
        self.decl_mut(decl).dc = Some(dc);
        let ctx = self.context_mut(dc);
        ctx.decls.push(decl);
        ctx.lookup = None;
    }

    /// Unlinks a declaration from its context. Rare; used in error recovery.
    pub fn remove_decl(&mut self, dc: DeclContextId, decl: DeclId) {
        let ctx = self.context_mut(dc);
        ctx.decls.retain(|&d| d != decl);
        ctx.visible.retain(|&d| d != decl);
        ctx.lookup = None;
        self.decl_mut(decl).dc = None;
    }

    /// Makes a declaration visible to lookup in `dc` without transferring
    /// ownership.
    pub fn make_visible(&mut self, dc: DeclContextId, decl: DeclId) {
        let ctx = self.context_mut(dc);
        ctx.visible.push(decl);
        ctx.lookup = None;
    }

    /// Finds the visible declarations named `name` in this context only (no
    /// parent walk). The index is built on first use after any mutation.
    pub fn lookup(&mut self, dc: DeclContextId, name: Symbol) -> Vec<DeclId> {
        if self.contexts[dc.0 as usize].lookup.is_none() {
            let mut index: HashMap<Symbol, Vec<DeclId>> = HashMap::new();
            let ids: Vec<DeclId> = {
                let ctx = &self.contexts[dc.0 as usize];
                ctx.decls.iter().chain(ctx.visible.iter()).copied().collect()
            };
            for id in ids {
                if let Some(sym) = self.decl(id).name {
                    index.entry(sym).or_default().push(id);
                }
            }
            self.contexts[dc.0 as usize].lookup = Some(index);
        }
        self.contexts[dc.0 as usize]
            .lookup
            .as_ref()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_stmt_to_context(&mut self, dc: DeclContextId, stmt: StmtId) {
        self.context_mut(dc).body.push(stmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::decl::VarKind;
    use crate::ast::expr::{Expr, ExprKind};

    fn ctx() -> ASTContext {
        ASTContext::new(LangOptions::default())
    }

    #[test]
    fn structurally_identical_types_share_a_handle() {
        let mut c = ctx();
        let elem = QualType::new(c.real_ty);
        let bound = c.alloc_expr(Expr::new(
            ExprKind::IntConstant(10),
            QualType::new(c.integer_ty),
            0..0,
        ));
        let dims = vec![ArraySpec::ExplicitShape {
            lower: None,
            upper: bound,
        }];
        let a = c.get_array_type(elem, dims.clone());
        let b = c.get_array_type(elem, dims);
        assert_eq!(a, b);
    }

    #[test]
    fn pointer_types_unique_on_pointee_and_rank() {
        let mut c = ctx();
        let a = c.get_pointer_type(c.real_ty, 2);
        let b = c.get_pointer_type(c.real_ty, 2);
        let other = c.get_pointer_type(c.real_ty, 1);
        assert_eq!(a, b);
        assert_ne!(a, other);
    }

    #[test]
    fn qualify_then_strip_returns_canonical_type() {
        let mut c = ctx();
        let mut quals = Qualifiers::new();
        quals.add_parameter();
        let qt = c.qualify(c.integer_ty, quals, None, None);
        assert_eq!(qt.unqualified(), QualType::new(c.integer_ty));
    }

    #[test]
    fn character_with_length_canonicalizes_to_character() {
        let mut c = ctx();
        let len = c.alloc_expr(Expr::new(
            ExprKind::IntConstant(8),
            QualType::new(c.integer_ty),
            0..0,
        ));
        let qt = c.qualify(c.character_ty, Qualifiers::new(), None, Some(len));
        assert_ne!(qt.ty, c.character_ty);
        assert!(c.is_character_type(qt));
    }

    #[test]
    fn lookup_is_lazy_and_rebuilt_after_mutation() {
        let mut c = ctx();
        let dc = c.translation_unit_context();
        let name = c.idents.intern("x");
        let int = QualType::new(c.integer_ty);
        let d = c.alloc_decl(Decl {
            kind: DeclKind::Var {
                ty: Some(int),
                kind: VarKind::Local,
                init: None,
            },
            dc: None,
            name: Some(name),
            span: 0..0,
            implicit: false,
            invalid: false,
        });
        c.add_decl(dc, d);
        assert_eq!(c.lookup(dc, name), vec![d]);
        c.remove_decl(dc, d);
        assert!(c.lookup(dc, name).is_empty());
    }
}
