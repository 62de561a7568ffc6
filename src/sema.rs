use log::debug;

use crate::ast::expr::{BinaryOp, ConversionKind, Expr, ExprKind, UnaryOp};
use crate::ast::stmt::{FormatSpec, LetterSpec, ModuleNature, Stmt, StmtKind, StmtLabelRef};
use crate::ast::{
    ASTContext, ArraySpec, Decl, DeclContextId, DeclId, DeclKind, ExprId, QualType, Qualifiers,
    StmtId, VarKind,
};
use crate::diag::{DiagnosticsEngine, Span};
use crate::errors::CompileErrorKind;
use crate::ident::{lookup_builtin, IntrinsicResult, Symbol};
use crate::scope::{
    ForwardRef, ImplicitRuleKind, ImplicitTypingScope, LabelSlot, StmtLabelScope, StmtLabelValue,
};

/// Base type named by a declaration statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSpec {
    Integer,
    Real,
    DoublePrecision,
    Complex,
    Character,
    Logical,
}

/// Everything a type-declaration statement said about an entity: the base
/// type, selectors, attributes, and the per-entity dimension list.
#[derive(Debug, Clone)]
pub struct DeclSpec {
    pub type_spec: TypeSpec,
    pub kind_selector: Option<ExprId>,
    pub length_selector: Option<ExprId>,
    pub quals: Qualifiers,
    pub dims: Option<Vec<ArraySpec>>,
}

impl DeclSpec {
    pub fn new(type_spec: TypeSpec) -> Self {
        Self {
            type_spec,
            kind_selector: None,
            length_selector: None,
            quals: Qualifiers::new(),
            dims: None,
        }
    }
}

/// The semantic analyzer. Builds AST nodes out of the parse stream, manages
/// the declaration-context stack and the per-unit control-flow scopes, and
/// resolves statement labels when a program unit ends.
pub struct Sema<'a> {
    pub ctx: &'a mut ASTContext,
    pub diags: &'a mut DiagnosticsEngine,
    cur_context: DeclContextId,
    context_stack: Vec<DeclContextId>,
    stmt_labels: StmtLabelScope,
    implicit: ImplicitTypingScope,
    if_stack: Vec<StmtId>,
    do_list: Vec<StmtId>,
}

impl<'a> Sema<'a> {
    pub fn new(ctx: &'a mut ASTContext, diags: &'a mut DiagnosticsEngine) -> Self {
        let tu = ctx.translation_unit_context();
        Sema {
            ctx,
            diags,
            cur_context: tu,
            context_stack: Vec::new(),
            stmt_labels: StmtLabelScope::new(),
            implicit: ImplicitTypingScope::new(),
            if_stack: Vec::new(),
            do_list: Vec::new(),
        }
    }

    pub fn current_context(&self) -> DeclContextId {
        self.cur_context
    }

    // ------------------------------------------------------------- scopes

    fn push_decl_context(&mut self, dc: DeclContextId) {
        debug_assert_eq!(
            self.ctx.context(dc).parent,
            Some(self.cur_context),
            "the next declaration context should be lexically contained in the current one"
        );
        self.context_stack.push(self.cur_context);
        self.cur_context = dc;
    }

    fn pop_decl_context(&mut self) {
        let parent = self
            .context_stack
            .pop()
            .expect("declaration context imbalance");
        self.cur_context = parent;
    }

    fn push_executable_program_unit(&mut self) {
        debug_assert!(self.stmt_labels.decls_empty());
        debug_assert!(self.if_stack.is_empty());
        debug_assert!(self.do_list.is_empty());
        let parent = std::mem::take(&mut self.implicit);
        self.implicit = ImplicitTypingScope::with_parent(parent);
    }

    /// Fixes the forward statement-label references of the unit, reports the
    /// ones that never resolved, and checks the DO terminator constraints.
    fn pop_executable_program_unit(&mut self, loc: Span) {
        let forward: Vec<ForwardRef> = self.stmt_labels.forward_references().to_vec();
        for reference in forward {
            let value = self.label_value(reference.label);
            let target = self.stmt_labels.resolve(value);
            if target.is_none() {
                let span = self.ctx.expr(reference.label).span.clone();
                self.diags.error(
                    span,
                    CompileErrorKind::Flow,
                    format!("use of undeclared statement label '{}'", value),
                );
            }
            self.patch_label_slot(reference, target);
        }
        self.stmt_labels.reset();

        for _ in self.if_stack.drain(..) {
            self.diags
                .error(loc.clone(), CompileErrorKind::Flow, "expected 'END IF'");
        }

        let do_list = std::mem::take(&mut self.do_list);
        for do_stmt in do_list {
            let terminator = match &self.ctx.stmt(do_stmt).kind {
                StmtKind::Do { terminator, .. } => *terminator,
                _ => continue,
            };
            // An unresolved terminator was already reported above.
            if let StmtLabelRef::Resolved(target) = terminator {
                if !self.is_valid_do_terminating_statement(target) {
                    let span = self.ctx.stmt(target).span.clone();
                    self.diags.error(
                        span,
                        CompileErrorKind::Flow,
                        "invalid DO terminating statement",
                    );
                    self.ctx.stmt_mut(do_stmt).invalid = true;
                }
            }
        }

        self.implicit = std::mem::take(&mut self.implicit)
            .into_parent()
            .unwrap_or_default();
    }

    fn label_value(&self, label: ExprId) -> StmtLabelValue {
        match &self.ctx.expr(label).kind {
            ExprKind::IntConstant(v) if *v >= 0 => *v as StmtLabelValue,
            // An error marker from a malformed label literal; the literal
            // was already diagnosed.
            ExprKind::Error => 0,
            _ => {
                debug_assert!(false, "invalid statement label expression");
                0
            }
        }
    }

    fn patch_label_slot(&mut self, reference: ForwardRef, target: Option<StmtId>) {
        let resolved = target
            .map(StmtLabelRef::Resolved)
            .unwrap_or(StmtLabelRef::Empty);
        let stmt = self.ctx.stmt_mut(reference.statement);
        match (reference.slot, &mut stmt.kind) {
            (LabelSlot::GotoDestination, StmtKind::Goto { destination }) => {
                *destination = resolved;
            }
            (LabelSlot::AssignedGotoAt(i), StmtKind::AssignedGoto { allowed, .. }) => {
                allowed[i] = resolved;
            }
            (LabelSlot::DoTerminator, StmtKind::Do { terminator, .. }) => {
                *terminator = resolved;
            }
            (LabelSlot::AssignAddress, StmtKind::Assign { address, .. }) => {
                *address = resolved;
            }
            _ => debug_assert!(false, "label slot does not match the issuing statement"),
        }
    }

    /// The terminal statement of a DO loop must not be a GO TO, assigned
    /// GO TO, STOP, DO, ELSE, or END IF; a terminating logical IF may hold
    /// any statement but a DO, IF, ELSE, or END IF.
    fn is_valid_do_terminating_statement(&self, stmt: StmtId) -> bool {
        match &self.ctx.stmt(stmt).kind {
            StmtKind::Goto { .. }
            | StmtKind::AssignedGoto { .. }
            | StmtKind::Stop { .. }
            | StmtKind::Do { .. }
            | StmtKind::Else
            | StmtKind::EndIf => false,
            StmtKind::If { then_stmt, .. } => match then_stmt {
                Some(then_stmt) => !matches!(
                    self.ctx.stmt(*then_stmt).kind,
                    StmtKind::Do { .. } | StmtKind::If { .. } | StmtKind::Else | StmtKind::EndIf
                ),
                None => false,
            },
            _ => true,
        }
    }

    fn declare_statement_label(&mut self, label: ExprId, stmt: StmtId) {
        let value = self.label_value(label);
        if self.stmt_labels.resolve(value).is_some() {
            let span = self.ctx.expr(label).span.clone();
            self.diags.error(
                span,
                CompileErrorKind::Name,
                format!("redefinition of statement label '{}'", value),
            );
        } else {
            self.stmt_labels.declare(value, stmt);
        }
    }

    fn attach_label(&mut self, label: Option<ExprId>, stmt: StmtId) {
        if let Some(label) = label {
            self.declare_statement_label(label, stmt);
        }
    }

    /// Appends an accepted statement to the body of the current unit.
    pub fn append_to_body(&mut self, stmt: StmtId) {
        self.ctx.add_stmt_to_context(self.cur_context, stmt);
    }

    /// Whether `name` is visible in the current context as an array entity.
    /// The parser uses this to tell an array-element assignment from a
    /// statement-function definition.
    pub fn is_array_entity(&mut self, name: Symbol) -> bool {
        let found = self.ctx.lookup(self.cur_context, name);
        found
            .first()
            .and_then(|&d| self.ctx.decl(d).var_type())
            .map(|ty| self.ctx.is_array_type(ty))
            .unwrap_or(false)
    }

    // ------------------------------------------------------ program units

    pub fn act_on_main_program(&mut self, name: Option<Symbol>, loc: Span) -> DeclId {
        let dc = self.ctx.create_context(Some(self.cur_context));
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::MainProgram { ctx: dc },
            dc: None,
            name,
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.context_mut(dc).owner = Some(decl);
        let parent = self.cur_context;
        self.ctx.add_decl(parent, decl);
        self.push_decl_context(dc);
        self.push_executable_program_unit();
        decl
    }

    pub fn act_on_end_main_program(&mut self, loc: Span, end_name: Option<(Symbol, Span)>) {
        let owner = self.ctx.context(self.cur_context).owner;
        if let (Some(owner), Some((end_sym, end_span))) = (owner, end_name) {
            if let Some(prog_name) = self.ctx.decl(owner).name {
                if prog_name != end_sym {
                    let expected = self.ctx.idents.name(prog_name).to_string();
                    self.diags.error(
                        end_span,
                        CompileErrorKind::Name,
                        format!("expected label '{}' for END PROGRAM statement", expected),
                    );
                }
            }
        }
        self.pop_decl_context();
        self.pop_executable_program_unit(loc);
    }

    pub fn act_on_function(
        &mut self,
        name: Symbol,
        result: Option<QualType>,
        loc: Span,
    ) -> DeclId {
        let dc = self.ctx.create_context(Some(self.cur_context));
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Function {
                ctx: dc,
                result,
                args: Vec::new(),
                stmt_function_body: None,
            },
            dc: None,
            name: Some(name),
            span: loc.clone(),
            implicit: false,
            invalid: false,
        });
        self.ctx.context_mut(dc).owner = Some(decl);
        let parent = self.cur_context;
        self.ctx.add_decl(parent, decl);
        self.push_decl_context(dc);
        self.push_executable_program_unit();

        // The function name acts as the result variable inside the body.
        let result_var = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Var {
                ty: result,
                kind: VarKind::Local,
                init: None,
            },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: true,
            invalid: false,
        });
        self.ctx.add_decl(dc, result_var);
        decl
    }

    pub fn act_on_subroutine(&mut self, name: Symbol, loc: Span) -> DeclId {
        let dc = self.ctx.create_context(Some(self.cur_context));
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Subroutine {
                ctx: dc,
                args: Vec::new(),
            },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.context_mut(dc).owner = Some(decl);
        let parent = self.cur_context;
        self.ctx.add_decl(parent, decl);
        self.push_decl_context(dc);
        self.push_executable_program_unit();
        decl
    }

    /// Declares one dummy argument of the subprogram being defined.
    pub fn act_on_subprogram_arg(&mut self, subprogram: DeclId, name: Symbol, loc: Span) {
        let arg = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Var {
                ty: None,
                kind: VarKind::Argument,
                init: None,
            },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.add_decl(self.cur_context, arg);
        match &mut self.ctx.decl_mut(subprogram).kind {
            DeclKind::Function { args, .. } | DeclKind::Subroutine { args, .. } => args.push(arg),
            _ => {}
        }
    }

    pub fn act_on_end_subprogram(&mut self, loc: Span) {
        // A function without a declared result type takes it from the
        // result variable of the same name.
        if let Some(owner) = self.ctx.context(self.cur_context).owner {
            let needs_result = matches!(
                self.ctx.decl(owner).kind,
                DeclKind::Function { result: None, .. }
            );
            if needs_result {
                if let Some(name) = self.ctx.decl(owner).name {
                    let found = self.ctx.lookup(self.cur_context, name);
                    let ty = found
                        .iter()
                        .find_map(|&d| self.ctx.decl(d).var_type());
                    if let DeclKind::Function { result, .. } = &mut self.ctx.decl_mut(owner).kind {
                        *result = ty;
                    }
                }
            }
        }
        self.pop_decl_context();
        self.pop_executable_program_unit(loc);
    }

    pub fn act_on_module(&mut self, name: Symbol, loc: Span) -> DeclId {
        let dc = self.ctx.create_context(Some(self.cur_context));
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Module { ctx: dc },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.context_mut(dc).owner = Some(decl);
        let parent = self.cur_context;
        self.ctx.add_decl(parent, decl);
        self.push_decl_context(dc);
        decl
    }

    pub fn act_on_end_module(&mut self) {
        self.pop_decl_context();
    }

    // -------------------------------------------------------------- types

    /// Converts a declaration spec to a canonical qualified type; the
    /// dimension list, if any, wraps the element type in an array type.
    pub fn act_on_type_name(&mut self, ds: &DeclSpec) -> QualType {
        let base = match ds.type_spec {
            TypeSpec::Integer => self.ctx.integer_ty,
            TypeSpec::Real => self.ctx.real_ty,
            TypeSpec::DoublePrecision => self.ctx.double_precision_ty,
            TypeSpec::Complex => self.ctx.complex_ty,
            TypeSpec::Character => self.ctx.character_ty,
            TypeSpec::Logical => self.ctx.logical_ty,
        };
        let element =
            self.ctx
                .qualify(base, ds.quals, ds.kind_selector, ds.length_selector);
        // POINTER entities get a pointer type carrying the pointee and its
        // dimensionality instead of a materialized array type.
        if ds.quals.ext_attr() == crate::ast::ExtAttr::Pointer {
            let dims = ds.dims.as_ref().map(|d| d.len() as u32).unwrap_or(0);
            let ptr = self.ctx.get_pointer_type(element.ty, dims);
            return QualType::with_quals(ptr, ds.quals);
        }
        match &ds.dims {
            Some(dims) => {
                let arr = self.ctx.get_array_type(element, dims.clone());
                QualType::new(arr)
            }
            None => element,
        }
    }

    // ------------------------------------------------------- declarations

    pub fn act_on_entity_decl(
        &mut self,
        ds: &DeclSpec,
        loc: Span,
        name: Symbol,
        init: Option<ExprId>,
    ) -> Option<DeclId> {
        let existing = self.ctx.lookup(self.cur_context, name);
        if let Some(&prev) = existing.first() {
            // A dummy argument or function result picks up its type from
            // the declaration.
            let untyped = matches!(
                self.ctx.decl(prev).kind,
                DeclKind::Var { ty: None, .. }
            );
            if untyped {
                let ty = self.act_on_type_name(ds);
                if let DeclKind::Var { ty: slot, .. } = &mut self.ctx.decl_mut(prev).kind {
                    *slot = Some(ty);
                }
                return Some(prev);
            }
            let prev_span = self.ctx.decl(prev).span.clone();
            let shown = self.ctx.idents.name(name).to_string();
            self.diags.error_with_note(
                loc,
                CompileErrorKind::Name,
                format!("variable '{}' already declared", shown),
                prev_span,
                "previous declaration",
            );
            return None;
        }

        let ty = self.act_on_type_name(ds);
        let kind = if ds.quals.has_parameter() && init.is_some() {
            VarKind::Parameter
        } else {
            VarKind::Local
        };
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Var {
                ty: Some(ty),
                kind,
                init,
            },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.add_decl(self.cur_context, decl);
        debug!("declared entity '{}'", self.ctx.idents.name(name));
        Some(decl)
    }

    /// Declares an entity that was referenced without a prior declaration.
    /// `IMPLICIT NONE` makes this an error; otherwise the nearest letter
    /// rule, or the default I-N integer / otherwise real rule, applies.
    pub fn act_on_implicit_entity_decl(&mut self, loc: Span, name: Symbol) -> Option<DeclId> {
        let letter = self
            .ctx
            .idents
            .name(name)
            .chars()
            .next()
            .unwrap_or('a');
        let ty = match self.implicit.resolve(letter) {
            (ImplicitRuleKind::None, _) => {
                let shown = self.ctx.idents.name(name).to_string();
                self.diags.error(
                    loc,
                    CompileErrorKind::Name,
                    format!("undeclared identifier '{}'", shown),
                );
                return None;
            }
            (ImplicitRuleKind::Rule, Some(ty)) => ty,
            _ => {
                if matches!(letter.to_ascii_lowercase(), 'i'..='n') {
                    QualType::new(self.ctx.integer_ty)
                } else {
                    QualType::new(self.ctx.real_ty)
                }
            }
        };
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Var {
                ty: Some(ty),
                kind: VarKind::Local,
                init: None,
            },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: true,
            invalid: false,
        });
        self.ctx.add_decl(self.cur_context, decl);
        Some(decl)
    }

    pub fn act_on_derived_type_decl(&mut self, loc: Span, name: Symbol) -> DeclId {
        let dc = self.ctx.create_context(Some(self.cur_context));
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Record { ctx: dc },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.context_mut(dc).owner = Some(decl);
        let parent = self.cur_context;
        self.ctx.add_decl(parent, decl);
        self.push_decl_context(dc);
        decl
    }

    pub fn act_on_derived_type_field(
        &mut self,
        ds: &DeclSpec,
        loc: Span,
        name: Symbol,
    ) -> Option<DeclId> {
        let existing = self.ctx.lookup(self.cur_context, name);
        if let Some(&prev) = existing.first() {
            let prev_span = self.ctx.decl(prev).span.clone();
            let shown = self.ctx.idents.name(name).to_string();
            self.diags.error_with_note(
                loc,
                CompileErrorKind::Name,
                format!("field '{}' already declared", shown),
                prev_span,
                "previous declaration",
            );
            return None;
        }
        let ty = self.act_on_type_name(ds);
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Field { ty },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.add_decl(self.cur_context, decl);
        Some(decl)
    }

    pub fn act_on_end_derived_type_decl(&mut self, record: DeclId) {
        // Intern the record type now that the field list is complete.
        let fields = match &self.ctx.decl(record).kind {
            DeclKind::Record { ctx } => self.ctx.context(*ctx).decls.clone(),
            _ => Vec::new(),
        };
        self.ctx.get_record_type(fields);
        self.pop_decl_context();
    }

    // --------------------------------------------- specification actions

    pub fn act_on_use(
        &mut self,
        loc: Span,
        nature: ModuleNature,
        module: Symbol,
        only: bool,
        renames: Vec<(Symbol, Symbol)>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::Use {
                nature,
                module,
                only,
                renames,
            },
            loc,
            label,
        ));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_import(
        &mut self,
        loc: Span,
        names: Vec<Symbol>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Import { names }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_implicit_none(&mut self, loc: Span, label: Option<ExprId>) -> StmtId {
        if !self.implicit.apply_none() {
            self.diags.error(
                loc.clone(),
                CompileErrorKind::Name,
                "IMPLICIT NONE must precede any IMPLICIT rule",
            );
        }
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Implicit { spec: None }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_implicit(
        &mut self,
        loc: Span,
        ds: &DeclSpec,
        letter_specs: Vec<LetterSpec>,
        label: Option<ExprId>,
    ) -> StmtId {
        let ty = self.act_on_type_name(ds);
        for spec in &letter_specs {
            if !self.implicit.apply(*spec, ty) {
                self.diags.error(
                    loc.clone(),
                    CompileErrorKind::Name,
                    format!(
                        "implicit rule for letter '{}' conflicts with a previous rule",
                        spec.first
                    ),
                );
            }
        }
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::Implicit {
                spec: Some((ty, letter_specs)),
            },
            loc,
            label,
        ));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_parameter(
        &mut self,
        loc: Span,
        pairs: Vec<(Symbol, Span, ExprId)>,
        label: Option<ExprId>,
    ) -> StmtId {
        let mut accepted = Vec::new();
        for (name, name_span, value) in pairs {
            let existing = self.ctx.lookup(self.cur_context, name);
            if let Some(&prev) = existing.first() {
                let prev_span = self.ctx.decl(prev).span.clone();
                let shown = self.ctx.idents.name(name).to_string();
                self.diags.error_with_note(
                    name_span,
                    CompileErrorKind::Name,
                    format!("variable '{}' already defined", shown),
                    prev_span,
                    "previous definition",
                );
                continue;
            }
            let ty = self
                .ctx
                .expr(value)
                .ty
                .unwrap_or(QualType::new(self.ctx.integer_ty));
            let decl = self.ctx.alloc_decl(Decl {
                kind: DeclKind::Var {
                    ty: Some(ty),
                    kind: VarKind::Parameter,
                    init: Some(value),
                },
                dc: None,
                name: Some(name),
                span: name_span,
                implicit: false,
                invalid: false,
            });
            self.ctx.add_decl(self.cur_context, decl);
            accepted.push((name, value));
        }
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Parameter { pairs: accepted }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_dimension(
        &mut self,
        loc: Span,
        name: Symbol,
        name_span: Span,
        dims: Vec<ArraySpec>,
        label: Option<ExprId>,
    ) -> StmtId {
        let existing = self.ctx.lookup(self.cur_context, name);
        if let Some(&prev) = existing.first() {
            match self.ctx.decl(prev).var_type() {
                Some(element) if !self.ctx.is_array_type(element) => {
                    let arr = self.ctx.get_array_type(element, dims.clone());
                    if let DeclKind::Var { ty, .. } = &mut self.ctx.decl_mut(prev).kind {
                        *ty = Some(QualType::new(arr));
                    }
                }
                _ => {
                    let shown = self.ctx.idents.name(name).to_string();
                    self.diags.error(
                        name_span.clone(),
                        CompileErrorKind::Name,
                        format!("'{}' already has a dimension specification", shown),
                    );
                }
            }
        } else if let Some(decl) = self.act_on_implicit_entity_decl(name_span.clone(), name) {
            if let Some(element) = self.ctx.decl(decl).var_type() {
                let arr = self.ctx.get_array_type(element, dims.clone());
                if let DeclKind::Var { ty, .. } = &mut self.ctx.decl_mut(decl).kind {
                    *ty = Some(QualType::new(arr));
                }
            }
        }
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Dimension { name, dims }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_external(
        &mut self,
        loc: Span,
        names: Vec<Symbol>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::External { names }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_intrinsic(
        &mut self,
        loc: Span,
        names: Vec<Symbol>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Intrinsic { names }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_asynchronous(
        &mut self,
        loc: Span,
        names: Vec<Symbol>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Asynchronous { names }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    // -------------------------------------------------- statement functions

    /// Begins a `name(args) = expr` statement function: creates the function
    /// declaration, enters its context, and declares the dummy arguments so
    /// the body can refer to them. Unlike a subprogram, a statement function
    /// shares the host's statement-label and implicit-typing scopes.
    pub fn start_stmt_function(
        &mut self,
        loc: Span,
        name: Symbol,
        params: Vec<(Symbol, Span)>,
    ) -> DeclId {
        let dc = self.ctx.create_context(Some(self.cur_context));
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Function {
                ctx: dc,
                result: None,
                args: Vec::new(),
                stmt_function_body: None,
            },
            dc: None,
            name: Some(name),
            span: loc,
            implicit: false,
            invalid: false,
        });
        self.ctx.context_mut(dc).owner = Some(decl);
        let parent = self.cur_context;
        self.ctx.add_decl(parent, decl);
        self.push_decl_context(dc);
        // The function is visible to its own body, which is how direct
        // recursion is caught.
        self.ctx.make_visible(dc, decl);
        for (param, span) in params {
            self.act_on_subprogram_arg(decl, param, span);
        }
        decl
    }

    pub fn finish_stmt_function(
        &mut self,
        function: DeclId,
        body: Option<ExprId>,
        loc: Span,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        self.pop_decl_context();
        let body = body?;
        if self.references_function(body, function) {
            let shown = self.ctx.decl_name(function).to_string();
            self.diags.error(
                loc,
                CompileErrorKind::Name,
                format!("recursive statement function '{}'", shown),
            );
            self.ctx.decl_mut(function).invalid = true;
            return None;
        }
        let result = self.ctx.expr(body).ty;
        if let DeclKind::Function {
            stmt_function_body,
            result: result_slot,
            ..
        } = &mut self.ctx.decl_mut(function).kind
        {
            *stmt_function_body = Some(body);
            *result_slot = result;
        }
        let span = self.ctx.decl(function).span.clone();
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::StmtFunction { function }, span, label));
        self.attach_label(label, stmt);
        Some(stmt)
    }

    fn references_function(&self, expr: ExprId, function: DeclId) -> bool {
        match &self.ctx.expr(expr).kind {
            ExprKind::Call { function: f, args } | ExprKind::IntrinsicCall { function: f, args } => {
                *f == function || args.iter().any(|&a| self.references_function(a, function))
            }
            ExprKind::Var(d) => *d == function,
            ExprKind::Unary { expr, .. }
            | ExprKind::ImplicitCast { expr }
            | ExprKind::Conversion { expr, .. } => self.references_function(*expr, function),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.references_function(*lhs, function) || self.references_function(*rhs, function)
            }
            ExprKind::ArrayConstructor { items } => {
                items.iter().any(|&i| self.references_function(i, function))
            }
            ExprKind::ArrayElement { subscripts, .. } => subscripts
                .iter()
                .any(|&s| self.references_function(s, function)),
            _ => false,
        }
    }

    // --------------------------------------------------------- statements

    pub fn act_on_program_stmt(
        &mut self,
        loc: Span,
        name: Option<Symbol>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Program { name }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_end_program_stmt(
        &mut self,
        loc: Span,
        name: Option<Symbol>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::EndProgram { name }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    /// Type-checks an assignment. Arithmetic targets accept any arithmetic
    /// source with a conversion inserted when the kinds differ; logical and
    /// character targets require sources of their own class.
    pub fn act_on_assignment_stmt(
        &mut self,
        loc: Span,
        lhs: ExprId,
        mut rhs: ExprId,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        match self.ctx.expr(lhs).kind {
            ExprKind::Var(_) | ExprKind::ArrayElement { .. } | ExprKind::Error => {}
            _ => {
                self.diags.error(
                    self.ctx.expr(lhs).span.clone(),
                    CompileErrorKind::Type,
                    "expression is not assignable",
                );
                return None;
            }
        }
        let lhs_ty = self.ctx.expr(lhs).ty?;
        let rhs_ty = self.ctx.expr(rhs).ty?;

        let lhs_elem = self.element_type(lhs_ty);
        let rhs_elem = self.element_type(rhs_ty);
        let rhs_arithmetic = self.ctx.is_arithmetic_type(rhs_elem);

        if self.ctx.is_integer_type(lhs_elem) {
            if self.ctx.is_integer_type(rhs_elem) {
            } else if rhs_arithmetic {
                rhs = self.conversion(ConversionKind::Int, rhs, lhs_elem);
            } else {
                return self.assignment_type_error(loc, lhs_ty, rhs_ty);
            }
        } else if self.ctx.is_real_type(lhs_elem) {
            if self.ctx.is_real_type(rhs_elem) {
            } else if rhs_arithmetic {
                rhs = self.conversion(ConversionKind::Real, rhs, lhs_elem);
            } else {
                return self.assignment_type_error(loc, lhs_ty, rhs_ty);
            }
        } else if self.ctx.is_double_precision_type(lhs_elem) {
            if self.ctx.is_double_precision_type(rhs_elem) {
            } else if rhs_arithmetic {
                rhs = self.conversion(ConversionKind::Dble, rhs, lhs_elem);
            } else {
                return self.assignment_type_error(loc, lhs_ty, rhs_ty);
            }
        } else if self.ctx.is_complex_type(lhs_elem) {
            if self.ctx.is_complex_type(rhs_elem) {
            } else if rhs_arithmetic {
                rhs = self.conversion(ConversionKind::Cmplx, rhs, lhs_elem);
            } else {
                return self.assignment_type_error(loc, lhs_ty, rhs_ty);
            }
        } else if self.ctx.is_logical_type(lhs_elem) {
            if !self.ctx.is_logical_type(rhs_elem) {
                return self.assignment_type_error(loc, lhs_ty, rhs_ty);
            }
        } else if self.ctx.is_character_type(lhs_elem) {
            if !self.ctx.is_character_type(rhs_elem) {
                return self.assignment_type_error(loc, lhs_ty, rhs_ty);
            }
        } else {
            return self.assignment_type_error(loc, lhs_ty, rhs_ty);
        }

        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Assignment { lhs, rhs }, loc, label));
        self.attach_label(label, stmt);
        Some(stmt)
    }

    fn assignment_type_error(
        &mut self,
        loc: Span,
        lhs: QualType,
        rhs: QualType,
    ) -> Option<StmtId> {
        let lhs_str = self.ctx.display_type(lhs);
        let rhs_str = self.ctx.display_type(rhs);
        self.diags.error(
            loc,
            CompileErrorKind::Type,
            format!(
                "assigning to '{}' from incompatible type '{}'",
                lhs_str, rhs_str
            ),
        );
        None
    }

    fn element_type(&self, qt: QualType) -> QualType {
        match self.ctx.array_parts(qt) {
            Some((element, _)) => element,
            None => qt,
        }
    }

    fn conversion(&mut self, kind: ConversionKind, expr: ExprId, ty: QualType) -> ExprId {
        let span = self.ctx.expr(expr).span.clone();
        self.ctx.alloc_expr(Expr::new(
            ExprKind::Conversion { kind, expr },
            ty,
            span,
        ))
    }

    pub fn act_on_assign_stmt(
        &mut self,
        loc: Span,
        address: ExprId,
        var: ExprId,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        if let Some(ty) = self.ctx.expr(var).ty {
            if !self.ctx.is_integer_type(ty) {
                let shown = self.ctx.display_type(ty);
                self.diags.error(
                    self.ctx.expr(var).span.clone(),
                    CompileErrorKind::Type,
                    format!(
                        "expected an integer variable in ASSIGN statement, found '{}'",
                        shown
                    ),
                );
                return None;
            }
        }
        let resolved = self.stmt_labels.resolve(self.label_value(address));
        let reference = match resolved {
            Some(target) => StmtLabelRef::Resolved(target),
            None => StmtLabelRef::Unresolved(address),
        };
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::Assign {
                address: reference,
                var,
            },
            loc,
            label,
        ));
        if resolved.is_none() {
            self.stmt_labels.declare_forward_reference(ForwardRef {
                label: address,
                statement: stmt,
                slot: LabelSlot::AssignAddress,
            });
        }
        self.attach_label(label, stmt);
        Some(stmt)
    }

    pub fn act_on_assigned_goto_stmt(
        &mut self,
        loc: Span,
        var: ExprId,
        allowed_values: Vec<ExprId>,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        let mut allowed = Vec::with_capacity(allowed_values.len());
        let mut pending = Vec::new();
        for (index, &value) in allowed_values.iter().enumerate() {
            match self.stmt_labels.resolve(self.label_value(value)) {
                Some(target) => allowed.push(StmtLabelRef::Resolved(target)),
                None => {
                    allowed.push(StmtLabelRef::Unresolved(value));
                    pending.push((index, value));
                }
            }
        }
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::AssignedGoto { var, allowed },
            loc,
            label,
        ));
        for (index, value) in pending {
            self.stmt_labels.declare_forward_reference(ForwardRef {
                label: value,
                statement: stmt,
                slot: LabelSlot::AssignedGotoAt(index),
            });
        }
        self.attach_label(label, stmt);
        Some(stmt)
    }

    pub fn act_on_goto_stmt(
        &mut self,
        loc: Span,
        destination: ExprId,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        let resolved = self.stmt_labels.resolve(self.label_value(destination));
        let reference = match resolved {
            Some(target) => StmtLabelRef::Resolved(target),
            None => StmtLabelRef::Unresolved(destination),
        };
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::Goto {
                destination: reference,
            },
            loc,
            label,
        ));
        if resolved.is_none() {
            self.stmt_labels.declare_forward_reference(ForwardRef {
                label: destination,
                statement: stmt,
                slot: LabelSlot::GotoDestination,
            });
        }
        self.attach_label(label, stmt);
        Some(stmt)
    }

    fn check_logical_condition(&mut self, condition: ExprId) -> bool {
        match self.ctx.expr(condition).ty {
            Some(ty) if self.ctx.is_logical_type(self.element_type(ty)) => true,
            Some(ty) => {
                let shown = self.ctx.display_type(ty);
                self.diags.error(
                    self.ctx.expr(condition).span.clone(),
                    CompileErrorKind::Type,
                    format!("expected a logical expression, found '{}'", shown),
                );
                false
            }
            None => false,
        }
    }

    /// Logical IF: `IF (cond) stmt`.
    pub fn act_on_if_stmt(
        &mut self,
        loc: Span,
        condition: ExprId,
        then_stmt: StmtId,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        if !self.check_logical_condition(condition) {
            return None;
        }
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::If {
                condition,
                then_stmt: Some(then_stmt),
                else_stmt: None,
            },
            loc,
            label,
        ));
        self.attach_label(label, stmt);
        Some(stmt)
    }

    /// Block IF: `IF (cond) THEN`.
    pub fn act_on_block_if_stmt(
        &mut self,
        loc: Span,
        condition: ExprId,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        if !self.check_logical_condition(condition) {
            return None;
        }
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::If {
                condition,
                then_stmt: None,
                else_stmt: None,
            },
            loc,
            label,
        ));
        self.if_stack.push(stmt);
        self.attach_label(label, stmt);
        Some(stmt)
    }

    pub fn act_on_else_if_stmt(
        &mut self,
        loc: Span,
        condition: ExprId,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        if !self.check_logical_condition(condition) {
            return None;
        }
        if self.if_stack.is_empty() {
            self.diags.error(
                loc,
                CompileErrorKind::Flow,
                "'ELSE IF' without a matching 'IF'",
            );
            return None;
        }
        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::If {
                condition,
                then_stmt: None,
                else_stmt: None,
            },
            loc,
            label,
        ));
        let outer = self.if_stack.pop().unwrap();
        if let StmtKind::If { else_stmt, .. } = &mut self.ctx.stmt_mut(outer).kind {
            *else_stmt = Some(stmt);
        }
        self.if_stack.push(stmt);
        self.attach_label(label, stmt);
        Some(stmt)
    }

    pub fn act_on_else_stmt(&mut self, loc: Span, label: Option<ExprId>) -> Option<StmtId> {
        if self.if_stack.is_empty() {
            self.diags.error(
                loc,
                CompileErrorKind::Flow,
                "'ELSE' without a matching 'IF'",
            );
            return None;
        }
        let stmt = self.ctx.alloc_stmt(Stmt::new(StmtKind::Else, loc, label));
        self.attach_label(label, stmt);
        Some(stmt)
    }

    pub fn act_on_end_if_stmt(&mut self, loc: Span, label: Option<ExprId>) -> Option<StmtId> {
        if self.if_stack.is_empty() {
            self.diags.error(
                loc,
                CompileErrorKind::Flow,
                "'END IF' without a matching 'IF'",
            );
            return None;
        }
        self.if_stack.pop();
        let stmt = self.ctx.alloc_stmt(Stmt::new(StmtKind::EndIf, loc, label));
        self.attach_label(label, stmt);
        Some(stmt)
    }

    fn check_do_expr(&mut self, expr: ExprId, what: &str) -> bool {
        match self.ctx.expr(expr).ty {
            Some(ty)
                if self.ctx.is_integer_type(ty)
                    || self.ctx.is_real_type(ty)
                    || self.ctx.is_double_precision_type(ty) =>
            {
                true
            }
            Some(ty) => {
                let shown = self.ctx.display_type(ty);
                self.diags.error(
                    self.ctx.expr(expr).span.clone(),
                    CompileErrorKind::Type,
                    format!(
                        "expected {} of integer, real or double precision type, found '{}'",
                        what, shown
                    ),
                );
                false
            }
            None => false,
        }
    }

    fn apply_do_conversion(&mut self, expr: ExprId, ty: QualType) -> ExprId {
        let expr_ty = match self.ctx.expr(expr).ty {
            Some(t) => t,
            None => return expr,
        };
        if self.ctx.is_integer_type(ty) {
            if self.ctx.is_integer_type(expr_ty) {
                expr
            } else {
                self.conversion(ConversionKind::Int, expr, ty)
            }
        } else if self.ctx.is_real_type(ty) {
            if self.ctx.is_real_type(expr_ty) {
                expr
            } else {
                self.conversion(ConversionKind::Real, expr, ty)
            }
        } else if self.ctx.is_double_precision_type(expr_ty) {
            expr
        } else {
            self.conversion(ConversionKind::Dble, expr, ty)
        }
    }

    pub fn act_on_do_stmt(
        &mut self,
        loc: Span,
        terminator: ExprId,
        var: ExprId,
        init: ExprId,
        limit: ExprId,
        step: Option<ExprId>,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        let mut has_errors = !self.check_do_expr(var, "a DO loop variable");
        has_errors |= !self.check_do_expr(init, "an expression");
        has_errors |= !self.check_do_expr(limit, "an expression");
        if let Some(step) = step {
            has_errors |= !self.check_do_expr(step, "an expression");
        }
        if has_errors {
            return None;
        }

        let var_ty = self.ctx.expr(var).ty?;
        let init = self.apply_do_conversion(init, var_ty);
        let limit = self.apply_do_conversion(limit, var_ty);
        let step = step.map(|s| self.apply_do_conversion(s, var_ty));

        // The terminating label must not be declared above the DO.
        let value = self.label_value(terminator);
        if self.stmt_labels.resolve(value).is_some() {
            let span = self.ctx.expr(terminator).span.clone();
            self.diags.error(
                span,
                CompileErrorKind::Flow,
                format!(
                    "statement label '{}' must be declared after the 'DO' statement",
                    value
                ),
            );
            return None;
        }

        let stmt = self.ctx.alloc_stmt(Stmt::new(
            StmtKind::Do {
                terminator: StmtLabelRef::Unresolved(terminator),
                var,
                init,
                limit,
                step,
            },
            loc,
            label,
        ));
        self.stmt_labels.declare_forward_reference(ForwardRef {
            label: terminator,
            statement: stmt,
            slot: LabelSlot::DoTerminator,
        });
        self.do_list.push(stmt);
        self.attach_label(label, stmt);
        Some(stmt)
    }

    pub fn act_on_continue_stmt(&mut self, loc: Span, label: Option<ExprId>) -> StmtId {
        let stmt = self.ctx.alloc_stmt(Stmt::new(StmtKind::Continue, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_stop_stmt(
        &mut self,
        loc: Span,
        code: Option<ExprId>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Stop { code }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_print_stmt(
        &mut self,
        loc: Span,
        format: FormatSpec,
        items: Vec<ExprId>,
        label: Option<ExprId>,
    ) -> StmtId {
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Print { format, items }, loc, label));
        self.attach_label(label, stmt);
        stmt
    }

    pub fn act_on_where_stmt(
        &mut self,
        loc: Span,
        mask: ExprId,
        body: StmtId,
        label: Option<ExprId>,
    ) -> Option<StmtId> {
        match self.ctx.expr(mask).ty {
            Some(ty) if self.ctx.is_logical_type(self.element_type(ty)) => {}
            Some(ty) => {
                let shown = self.ctx.display_type(ty);
                self.diags.error(
                    self.ctx.expr(mask).span.clone(),
                    CompileErrorKind::Type,
                    format!("expected a logical mask expression, found '{}'", shown),
                );
                return None;
            }
            None => return None,
        }
        let stmt = self
            .ctx
            .alloc_stmt(Stmt::new(StmtKind::Where { mask, body }, loc, label));
        self.attach_label(label, stmt);
        Some(stmt)
    }

    pub fn act_on_block(&mut self, loc: Span, body: Vec<StmtId>) -> StmtId {
        self.ctx
            .alloc_stmt(Stmt::new(StmtKind::Block { body }, loc, None))
    }

    // -------------------------------------------------------- expressions

    pub fn act_on_int_literal(&mut self, loc: Span, spelling: &str) -> ExprId {
        match spelling.parse::<i64>() {
            Ok(value) => {
                let ty = QualType::new(self.ctx.integer_ty);
                self.ctx
                    .alloc_expr(Expr::new(ExprKind::IntConstant(value), ty, loc))
            }
            Err(_) => {
                self.diags.error(
                    loc.clone(),
                    CompileErrorKind::Lex,
                    format!("integer literal '{}' is too large", spelling),
                );
                self.ctx.alloc_expr(Expr::error(loc))
            }
        }
    }

    pub fn act_on_real_literal(&mut self, loc: Span, spelling: &str) -> ExprId {
        // A D exponent makes the constant DOUBLE PRECISION.
        let is_double = spelling.bytes().any(|b| b == b'd' || b == b'D');
        let normalized: String = spelling
            .chars()
            .map(|c| match c {
                'd' | 'D' => 'e',
                c => c,
            })
            .collect();
        match normalized.parse::<f64>() {
            Ok(value) => {
                let ty = if is_double {
                    QualType::new(self.ctx.double_precision_ty)
                } else {
                    QualType::new(self.ctx.real_ty)
                };
                self.ctx
                    .alloc_expr(Expr::new(ExprKind::RealConstant(value), ty, loc))
            }
            Err(_) => {
                self.diags.error(
                    loc.clone(),
                    CompileErrorKind::Lex,
                    format!("invalid real literal '{}'", spelling),
                );
                self.ctx.alloc_expr(Expr::error(loc))
            }
        }
    }

    pub fn act_on_char_literal(&mut self, loc: Span, value: String) -> ExprId {
        let ty = QualType::new(self.ctx.character_ty);
        self.ctx
            .alloc_expr(Expr::new(ExprKind::CharConstant(value), ty, loc))
    }

    pub fn act_on_logical_literal(&mut self, loc: Span, value: bool) -> ExprId {
        let ty = QualType::new(self.ctx.logical_ty);
        self.ctx
            .alloc_expr(Expr::new(ExprKind::LogicalConstant(value), ty, loc))
    }

    pub fn act_on_complex_constant(&mut self, loc: Span, re: f64, im: f64) -> ExprId {
        let ty = QualType::new(self.ctx.complex_ty);
        self.ctx
            .alloc_expr(Expr::new(ExprKind::ComplexConstant { re, im }, ty, loc))
    }

    /// Builds a reference to a named entity, declaring it implicitly if it
    /// was never declared.
    pub fn act_on_variable(&mut self, loc: Span, name: Symbol) -> ExprId {
        let found = self.ctx.lookup(self.cur_context, name);
        let decl = match found.first() {
            Some(&decl) => decl,
            None => match self.act_on_implicit_entity_decl(loc.clone(), name) {
                Some(decl) => decl,
                None => return self.ctx.alloc_expr(Expr::error(loc)),
            },
        };
        // An untyped dummy argument or function result picks up its type
        // from the implicit rules on first reference.
        if self.ctx.decl(decl).var_type().is_none() {
            if let DeclKind::Var { .. } = self.ctx.decl(decl).kind {
                let letter = self
                    .ctx
                    .idents
                    .name(name)
                    .chars()
                    .next()
                    .unwrap_or('a');
                let ty = match self.implicit.resolve(letter) {
                    (ImplicitRuleKind::None, _) => {
                        let shown = self.ctx.idents.name(name).to_string();
                        self.diags.error(
                            loc.clone(),
                            CompileErrorKind::Name,
                            format!("undeclared identifier '{}'", shown),
                        );
                        return self.ctx.alloc_expr(Expr::error(loc));
                    }
                    (ImplicitRuleKind::Rule, Some(ty)) => ty,
                    _ => {
                        if matches!(letter.to_ascii_lowercase(), 'i'..='n') {
                            QualType::new(self.ctx.integer_ty)
                        } else {
                            QualType::new(self.ctx.real_ty)
                        }
                    }
                };
                if let DeclKind::Var { ty: slot, .. } = &mut self.ctx.decl_mut(decl).kind {
                    *slot = Some(ty);
                }
            }
        }
        match self.ctx.decl(decl).var_type() {
            Some(ty) => self
                .ctx
                .alloc_expr(Expr::new(ExprKind::Var(decl), ty, loc)),
            None => self.ctx.alloc_expr(Expr::error(loc)),
        }
    }

    /// `name(...)` is an array element access, an intrinsic call, or a user
    /// call, in that order of preference.
    pub fn act_on_subscript_or_call(
        &mut self,
        loc: Span,
        name: Symbol,
        args: Vec<ExprId>,
    ) -> ExprId {
        let found = self.ctx.lookup(self.cur_context, name);
        if let Some(&decl) = found.first() {
            let kind = self.ctx.decl(decl).kind.clone();
            match kind {
                DeclKind::Var { ty: Some(ty), .. } => {
                    if let Some((element, dims)) = self.ctx.array_parts(ty) {
                        if dims.len() != args.len() {
                            let shown = self.ctx.idents.name(name).to_string();
                            self.diags.error(
                                loc.clone(),
                                CompileErrorKind::Type,
                                format!("wrong number of subscripts for '{}'", shown),
                            );
                            return self.ctx.alloc_expr(Expr::error(loc));
                        }
                        return self.ctx.alloc_expr(Expr::new(
                            ExprKind::ArrayElement {
                                array: decl,
                                subscripts: args,
                            },
                            element,
                            loc,
                        ));
                    }
                    let shown = self.ctx.idents.name(name).to_string();
                    self.diags.error(
                        loc.clone(),
                        CompileErrorKind::Type,
                        format!("'{}' is not an array or a function", shown),
                    );
                    return self.ctx.alloc_expr(Expr::error(loc));
                }
                DeclKind::Function { result, .. } => {
                    let ty = result.unwrap_or(QualType::new(self.ctx.real_ty));
                    return self.ctx.alloc_expr(Expr::new(
                        ExprKind::Call {
                            function: decl,
                            args,
                        },
                        ty,
                        loc,
                    ));
                }
                DeclKind::IntrinsicFunction { result } => {
                    let ty = self.intrinsic_result_type(result, &args);
                    return self.ctx.alloc_expr(Expr::new(
                        ExprKind::IntrinsicCall {
                            function: decl,
                            args,
                        },
                        ty,
                        loc,
                    ));
                }
                _ => {}
            }
        }

        let spelling = self.ctx.idents.name(name).to_string();
        if let Some(result) = lookup_builtin(&spelling) {
            let decl = self.ctx.alloc_decl(Decl {
                kind: DeclKind::IntrinsicFunction { result },
                dc: None,
                name: Some(name),
                span: loc.clone(),
                implicit: true,
                invalid: false,
            });
            self.ctx.add_decl(self.cur_context, decl);
            let ty = self.intrinsic_result_type(result, &args);
            return self.ctx.alloc_expr(Expr::new(
                ExprKind::IntrinsicCall {
                    function: decl,
                    args,
                },
                ty,
                loc,
            ));
        }

        // An unknown called name becomes an implicitly typed external
        // function.
        let letter = spelling.chars().next().unwrap_or('a');
        let result = match self.implicit.resolve(letter) {
            (ImplicitRuleKind::None, _) => {
                self.diags.error(
                    loc.clone(),
                    CompileErrorKind::Name,
                    format!("undeclared identifier '{}'", spelling),
                );
                return self.ctx.alloc_expr(Expr::error(loc));
            }
            (ImplicitRuleKind::Rule, Some(ty)) => ty,
            _ => {
                if matches!(letter.to_ascii_lowercase(), 'i'..='n') {
                    QualType::new(self.ctx.integer_ty)
                } else {
                    QualType::new(self.ctx.real_ty)
                }
            }
        };
        let dc = self.ctx.create_context(Some(self.cur_context));
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Function {
                ctx: dc,
                result: Some(result),
                args: Vec::new(),
                stmt_function_body: None,
            },
            dc: None,
            name: Some(name),
            span: loc.clone(),
            implicit: true,
            invalid: false,
        });
        self.ctx.context_mut(dc).owner = Some(decl);
        self.ctx.add_decl(self.cur_context, decl);
        self.ctx.alloc_expr(Expr::new(
            ExprKind::Call {
                function: decl,
                args,
            },
            result,
            loc,
        ))
    }

    fn intrinsic_result_type(&mut self, result: IntrinsicResult, args: &[ExprId]) -> QualType {
        match result {
            IntrinsicResult::Integer => QualType::new(self.ctx.integer_ty),
            IntrinsicResult::Real => QualType::new(self.ctx.real_ty),
            IntrinsicResult::DoublePrecision => QualType::new(self.ctx.double_precision_ty),
            IntrinsicResult::Complex => QualType::new(self.ctx.complex_ty),
            IntrinsicResult::Logical => QualType::new(self.ctx.logical_ty),
            IntrinsicResult::Character => QualType::new(self.ctx.character_ty),
            IntrinsicResult::SameAsArgument => args
                .first()
                .and_then(|&a| self.ctx.expr(a).ty)
                .unwrap_or(QualType::new(self.ctx.real_ty)),
        }
    }

    pub fn act_on_unary_expr(&mut self, loc: Span, op: UnaryOp, expr: ExprId) -> ExprId {
        let Some(ty) = self.ctx.expr(expr).ty else {
            return self.ctx.alloc_expr(Expr::error(loc));
        };
        let elem = self.element_type(ty);
        let ok = match op {
            UnaryOp::Not => self.ctx.is_logical_type(elem),
            UnaryOp::Plus | UnaryOp::Minus => self.ctx.is_arithmetic_type(elem),
        };
        if !ok {
            let shown = self.ctx.display_type(ty);
            self.diags.error(
                loc.clone(),
                CompileErrorKind::Type,
                format!("invalid operand to unary expression ('{}')", shown),
            );
            return self.ctx.alloc_expr(Expr::error(loc));
        }
        self.ctx
            .alloc_expr(Expr::new(ExprKind::Unary { op, expr }, ty, loc))
    }

    fn arithmetic_rank(&self, qt: QualType) -> Option<u8> {
        if self.ctx.is_integer_type(qt) {
            Some(0)
        } else if self.ctx.is_real_type(qt) {
            Some(1)
        } else if self.ctx.is_double_precision_type(qt) {
            Some(2)
        } else if self.ctx.is_complex_type(qt) {
            Some(3)
        } else {
            None
        }
    }

    pub fn act_on_binary_expr(
        &mut self,
        loc: Span,
        op: BinaryOp,
        mut lhs: ExprId,
        mut rhs: ExprId,
    ) -> ExprId {
        let (Some(lhs_ty), Some(rhs_ty)) = (self.ctx.expr(lhs).ty, self.ctx.expr(rhs).ty) else {
            return self.ctx.alloc_expr(Expr::error(loc));
        };
        let lhs_elem = self.element_type(lhs_ty);
        let rhs_elem = self.element_type(rhs_ty);
        let lhs_array = self.ctx.is_array_type(lhs_ty);
        let rhs_array = self.ctx.is_array_type(rhs_ty);

        let ty = if op.is_arithmetic() {
            let (Some(lrank), Some(rrank)) =
                (self.arithmetic_rank(lhs_elem), self.arithmetic_rank(rhs_elem))
            else {
                return self.binary_type_error(loc, lhs_ty, rhs_ty);
            };
            let promoted = if lrank >= rrank { lhs_elem } else { rhs_elem };
            if lhs_array {
                lhs_ty
            } else if rhs_array {
                rhs_ty
            } else {
                // Promote the lower-ranked scalar side.
                if lrank < rrank {
                    lhs = self.implicit_cast(lhs, promoted);
                } else if rrank < lrank {
                    rhs = self.implicit_cast(rhs, promoted);
                }
                promoted
            }
        } else if op == BinaryOp::Concat {
            if !self.ctx.is_character_type(lhs_elem) || !self.ctx.is_character_type(rhs_elem) {
                return self.binary_type_error(loc, lhs_ty, rhs_ty);
            }
            QualType::new(self.ctx.character_ty)
        } else if op.is_relational() {
            let arithmetic =
                self.ctx.is_arithmetic_type(lhs_elem) && self.ctx.is_arithmetic_type(rhs_elem);
            let character =
                self.ctx.is_character_type(lhs_elem) && self.ctx.is_character_type(rhs_elem);
            if !arithmetic && !character {
                return self.binary_type_error(loc, lhs_ty, rhs_ty);
            }
            let logical = QualType::new(self.ctx.logical_ty);
            // Comparing an array yields a mask with the array's shape.
            if lhs_array || rhs_array {
                let dims = self
                    .ctx
                    .array_parts(if lhs_array { lhs_ty } else { rhs_ty })
                    .map(|(_, dims)| dims.to_vec())
                    .unwrap_or_default();
                QualType::new(self.ctx.get_array_type(logical, dims))
            } else {
                logical
            }
        } else {
            // .AND. / .OR. / .EQV. / .NEQV.
            if !self.ctx.is_logical_type(lhs_elem) || !self.ctx.is_logical_type(rhs_elem) {
                return self.binary_type_error(loc, lhs_ty, rhs_ty);
            }
            if lhs_array {
                lhs_ty
            } else if rhs_array {
                rhs_ty
            } else {
                QualType::new(self.ctx.logical_ty)
            }
        };

        self.ctx
            .alloc_expr(Expr::new(ExprKind::Binary { op, lhs, rhs }, ty, loc))
    }

    fn binary_type_error(&mut self, loc: Span, lhs: QualType, rhs: QualType) -> ExprId {
        let lhs_str = self.ctx.display_type(lhs);
        let rhs_str = self.ctx.display_type(rhs);
        self.diags.error(
            loc.clone(),
            CompileErrorKind::Type,
            format!(
                "invalid operands to binary expression ('{}' and '{}')",
                lhs_str, rhs_str
            ),
        );
        self.ctx.alloc_expr(Expr::error(loc))
    }

    fn implicit_cast(&mut self, expr: ExprId, ty: QualType) -> ExprId {
        let span = self.ctx.expr(expr).span.clone();
        self.ctx
            .alloc_expr(Expr::new(ExprKind::ImplicitCast { expr }, ty, span))
    }

    pub fn act_on_array_constructor(&mut self, loc: Span, items: Vec<ExprId>) -> ExprId {
        let element = items
            .first()
            .and_then(|&i| self.ctx.expr(i).ty)
            .unwrap_or(QualType::new(self.ctx.real_ty));
        let count = self.act_on_int_literal(loc.clone(), &items.len().to_string());
        let arr = self.ctx.get_array_type(
            element,
            vec![ArraySpec::ExplicitShape {
                lower: None,
                upper: count,
            }],
        );
        self.ctx.alloc_expr(Expr::new(
            ExprKind::ArrayConstructor { items },
            QualType::new(arr),
            loc,
        ))
    }

    /// Builds the label expression of a statement label or branch target.
    pub fn act_on_label_literal(&mut self, loc: Span, spelling: &str) -> ExprId {
        self.act_on_int_literal(loc, spelling)
    }
}
