//! End-to-end checks of the front end: source text in, typed AST and
//! diagnostics out.

use ffc::arrayplan;
use ffc::ast::expr::{BinaryOp, ConversionKind, ExprKind};
use ffc::ast::stmt::{StmtKind, StmtLabelRef};
use ffc::ast::{ASTContext, DeclContextId, DeclId, DeclKind, StmtId, VarKind};
use ffc::diag::DiagnosticsEngine;
use ffc::errors::Severity;
use ffc::eval;
use ffc::options::{LangOptions, SourceForm};

fn check(src: &str) -> (ASTContext, DiagnosticsEngine) {
    ffc::analyze_quiet(src, "test.f90", &LangOptions::default())
}

fn error_messages(diags: &DiagnosticsEngine) -> Vec<String> {
    diags
        .errors()
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .map(|e| e.message.clone())
        .collect()
}

fn main_program(ctx: &ASTContext) -> (DeclId, DeclContextId) {
    for id in ctx.decl_ids() {
        if let DeclKind::MainProgram { ctx: dc } = ctx.decl(id).kind {
            return (id, dc);
        }
    }
    panic!("no main program declaration");
}

fn body_of(ctx: &ASTContext, dc: DeclContextId) -> Vec<StmtId> {
    ctx.context(dc).body.clone()
}

fn assignments(ctx: &ASTContext, dc: DeclContextId) -> Vec<StmtId> {
    body_of(ctx, dc)
        .into_iter()
        .filter(|&s| matches!(ctx.stmt(s).kind, StmtKind::Assignment { .. }))
        .collect()
}

fn assignment_rhs(ctx: &ASTContext, stmt: StmtId) -> ffc::ast::ExprId {
    match &ctx.stmt(stmt).kind {
        StmtKind::Assignment { rhs, .. } => *rhs,
        other => panic!("expected an assignment, found {:?}", other),
    }
}

fn goto_destination(ctx: &ASTContext, stmt: StmtId) -> StmtLabelRef {
    match &ctx.stmt(stmt).kind {
        StmtKind::Goto { destination } => *destination,
        other => panic!("expected a GOTO, found {:?}", other),
    }
}

#[test]
fn typed_program_with_integer_addition() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         INTEGER :: X\n\
         X = 2 + 3\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let (prog, dc) = main_program(&ctx);
    assert_eq!(ctx.decl_name(prog), "p");

    let x = ctx
        .decl_ids()
        .find(|&d| ctx.decl_name(d) == "x" && matches!(ctx.decl(d).kind, DeclKind::Var { .. }))
        .expect("declaration of X");
    let ty = ctx.decl(x).var_type().unwrap();
    assert!(ctx.is_integer_type(ty));
    assert!(matches!(
        ctx.decl(x).kind,
        DeclKind::Var {
            kind: VarKind::Local,
            ..
        }
    ));

    let assigns = assignments(&ctx, dc);
    assert_eq!(assigns.len(), 1);
    let rhs = assignment_rhs(&ctx, assigns[0]);
    let ExprKind::Binary { op, lhs, rhs } = &ctx.expr(rhs).kind else {
        panic!("expected a binary RHS");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(ctx.expr(*lhs).kind, ExprKind::IntConstant(2)));
    assert!(matches!(ctx.expr(*rhs).kind, ExprKind::IntConstant(3)));
}

#[test]
fn integer_to_real_assignment_inserts_a_conversion() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         REAL :: X\n\
         X = 1\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let (_, dc) = main_program(&ctx);
    let assigns = assignments(&ctx, dc);
    assert_eq!(assigns.len(), 1);
    let rhs = assignment_rhs(&ctx, assigns[0]);
    let ExprKind::Conversion { kind, expr } = &ctx.expr(rhs).kind else {
        panic!("expected a REAL conversion around the RHS");
    };
    assert_eq!(*kind, ConversionKind::Real);
    assert!(matches!(ctx.expr(*expr).kind, ExprKind::IntConstant(1)));
    assert!(ctx.is_real_type(ctx.expr(rhs).ty.unwrap()));
}

#[test]
fn forward_goto_resolves_at_the_labeled_continue() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         GO TO 10\n\
         10 CONTINUE\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let (_, dc) = main_program(&ctx);
    let body = body_of(&ctx, dc);
    let goto = body
        .iter()
        .find(|&&s| matches!(ctx.stmt(s).kind, StmtKind::Goto { .. }))
        .copied()
        .expect("a GOTO statement");
    let StmtLabelRef::Resolved(target) = goto_destination(&ctx, goto) else {
        panic!("destination not resolved");
    };
    assert!(matches!(ctx.stmt(target).kind, StmtKind::Continue));
    assert!(ctx.stmt(target).label.is_some());
}

#[test]
fn goto_as_do_terminator_is_invalid() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         DO 20 I = 1, 10\n\
         20 GO TO 30\n\
         30 CONTINUE\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(messages, vec!["invalid DO terminating statement".to_string()]);

    let (_, dc) = main_program(&ctx);
    let body = body_of(&ctx, dc);
    let do_stmt = body
        .iter()
        .find(|&&s| matches!(ctx.stmt(s).kind, StmtKind::Do { .. }))
        .copied()
        .expect("a DO statement");
    assert!(ctx.stmt(do_stmt).invalid);

    // The CONTINUE at 30 still resolves normally.
    let goto = body
        .iter()
        .find(|&&s| matches!(ctx.stmt(s).kind, StmtKind::Goto { .. }))
        .copied()
        .unwrap();
    assert!(matches!(
        goto_destination(&ctx, goto),
        StmtLabelRef::Resolved(_)
    ));
}

#[test]
fn implicit_none_makes_undeclared_identifiers_an_error() {
    let (_, diags) = check(
        "PROGRAM P\n\
         IMPLICIT NONE\n\
         X = 1.0\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(messages, vec!["undeclared identifier 'x'".to_string()]);
    assert!(diags.had_errors());
}

#[test]
fn parameter_sized_array_bound_is_materialized() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         INTEGER, PARAMETER :: N = 4\n\
         INTEGER :: A(N)\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let a = ctx
        .decl_ids()
        .find(|&d| ctx.decl_name(d) == "a")
        .expect("declaration of A");
    let ty = ctx.decl(a).var_type().unwrap();
    let dims_len = {
        let (_, dims) = ctx.array_parts(ty).expect("A is an array");
        assert_eq!(eval::evaluate_bounds(&ctx, &dims[0]), Some((1, 4)));
        dims.len()
    };
    assert_eq!(dims_len, 1);
    assert_eq!(eval::evaluate_array_size(&ctx, ty), Some(4));
}

#[test]
fn default_implicit_rule_types_i_through_n_as_integer() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         K = 1\n\
         X = 1\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let k = ctx.decl_ids().find(|&d| ctx.decl_name(d) == "k").unwrap();
    assert!(ctx.is_integer_type(ctx.decl(k).var_type().unwrap()));
    assert!(ctx.decl(k).implicit);
    let x = ctx.decl_ids().find(|&d| ctx.decl_name(d) == "x").unwrap();
    assert!(ctx.is_real_type(ctx.decl(x).var_type().unwrap()));

    // The real target gets a conversion; the integer one does not.
    let (_, dc) = main_program(&ctx);
    let assigns = assignments(&ctx, dc);
    let k_rhs = assignment_rhs(&ctx, assigns[0]);
    assert!(matches!(ctx.expr(k_rhs).kind, ExprKind::IntConstant(1)));
    let x_rhs = assignment_rhs(&ctx, assigns[1]);
    assert!(matches!(ctx.expr(x_rhs).kind, ExprKind::Conversion { .. }));
}

#[test]
fn implicit_letter_rules_override_the_default() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         IMPLICIT INTEGER (A-C)\n\
         A = 1\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());
    let a = ctx.decl_ids().find(|&d| ctx.decl_name(d) == "a").unwrap();
    assert!(ctx.is_integer_type(ctx.decl(a).var_type().unwrap()));
}

#[test]
fn never_declared_do_terminator_is_one_diagnostic_at_unit_end() {
    let (_, diags) = check(
        "PROGRAM P\n\
         DO 20 I = 1, 10\n\
         CONTINUE\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(
        messages,
        vec!["use of undeclared statement label '20'".to_string()]
    );
}

#[test]
fn redeclaration_is_rejected_with_the_original_noted() {
    let (_, diags) = check(
        "PROGRAM P\n\
         INTEGER :: X\n\
         REAL :: X\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(messages, vec!["variable 'x' already declared".to_string()]);
}

#[test]
fn duplicate_statement_labels_are_rejected() {
    let (_, diags) = check(
        "PROGRAM P\n\
         10 CONTINUE\n\
         10 CONTINUE\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(
        messages,
        vec!["redefinition of statement label '10'".to_string()]
    );
}

#[test]
fn end_program_name_must_match() {
    let (_, diags) = check(
        "PROGRAM P\n\
         END PROGRAM Q\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(
        messages,
        vec!["expected label 'p' for END PROGRAM statement".to_string()]
    );
}

#[test]
fn incompatible_assignment_is_a_type_error() {
    let (_, diags) = check(
        "PROGRAM P\n\
         LOGICAL :: L\n\
         L = 1\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("incompatible type"));
}

#[test]
fn else_without_if_is_reported_and_siblings_continue() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         INTEGER :: X\n\
         END IF\n\
         X = 1\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(messages, vec!["'END IF' without a matching 'IF'".to_string()]);
    let (_, dc) = main_program(&ctx);
    assert_eq!(assignments(&ctx, dc).len(), 1);
}

#[test]
fn block_if_chain_links_else_if() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         INTEGER :: X\n\
         X = 0\n\
         IF (X > 1) THEN\n\
         X = 1\n\
         ELSE IF (X > 2) THEN\n\
         X = 2\n\
         ELSE\n\
         X = 3\n\
         END IF\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());
    let (_, dc) = main_program(&ctx);
    let body = body_of(&ctx, dc);
    let ifs: Vec<StmtId> = body
        .iter()
        .filter(|&&s| matches!(ctx.stmt(s).kind, StmtKind::If { .. }))
        .copied()
        .collect();
    assert_eq!(ifs.len(), 2);
    let StmtKind::If { else_stmt, .. } = &ctx.stmt(ifs[0]).kind else {
        unreachable!()
    };
    assert_eq!(*else_stmt, Some(ifs[1]));
}

#[test]
fn statement_function_is_declared_and_recursion_is_rejected() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         F(Y) = Y + 1.0\n\
         X = F(2.0)\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());
    let f = ctx
        .decl_ids()
        .find(|&d| {
            ctx.decl_name(d) == "f" && matches!(ctx.decl(d).kind, DeclKind::Function { .. })
        })
        .expect("statement function F");
    let DeclKind::Function {
        stmt_function_body, ..
    } = &ctx.decl(f).kind
    else {
        unreachable!()
    };
    assert!(stmt_function_body.is_some());

    let (_, diags) = check(
        "PROGRAM P\n\
         F(Y) = F(Y)\n\
         END PROGRAM P\n",
    );
    let messages = error_messages(&diags);
    assert_eq!(
        messages,
        vec!["recursive statement function 'f'".to_string()]
    );
}

#[test]
fn whole_array_assignment_plans_a_loop_nest() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         REAL :: A(10), B(10), C(10)\n\
         REAL :: S\n\
         S = 2.0\n\
         A = B + C * S\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let (_, dc) = main_program(&ctx);
    let assigns = assignments(&ctx, dc);
    let plan = arrayplan::plan_assignment(&ctx, *assigns.last().unwrap())
        .expect("array assignment plans");
    assert_eq!(plan.loops.len(), 1);
    assert_eq!(plan.loops[0].extent, arrayplan::Extent::Const(10));
    assert_eq!(plan.operands.len(), 2);
    // The scalar multiplier is cached once.
    assert_eq!(plan.scalars.len(), 1);
    assert!(plan.mask.is_none());
    assert!(matches!(plan.dest, arrayplan::Destination::Existing(_)));
}

#[test]
fn where_statement_plans_a_masked_nest() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         REAL :: A(10), B(10)\n\
         WHERE (B > 0.0) A = B\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let (_, dc) = main_program(&ctx);
    let where_stmt = body_of(&ctx, dc)
        .into_iter()
        .find(|&s| matches!(ctx.stmt(s).kind, StmtKind::Where { .. }))
        .expect("a WHERE statement");
    let plans = arrayplan::plan_where(&ctx, where_stmt);
    assert_eq!(plans.len(), 1);
    assert!(plans[0].mask.is_some());
}

#[test]
fn fixed_form_program_with_labels() {
    let mut opts = LangOptions::default();
    opts.source_form = SourceForm::Fixed;
    let src = "\
      PROGRAM P\n\
      INTEGER X\n\
      X = 1\n\
      GO TO 10\n\
   10 CONTINUE\n\
      END\n";
    let (ctx, diags) = ffc::analyze_quiet(src, "test.f", &opts);
    let messages = error_messages(&diags);
    assert!(messages.is_empty(), "unexpected errors: {:?}", messages);
    let (_, dc) = main_program(&ctx);
    let goto = body_of(&ctx, dc)
        .into_iter()
        .find(|&s| matches!(ctx.stmt(s).kind, StmtKind::Goto { .. }))
        .unwrap();
    assert!(matches!(
        goto_destination(&ctx, goto),
        StmtLabelRef::Resolved(_)
    ));
}

#[test]
fn assign_and_assigned_goto_resolve_forward() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         INTEGER :: I\n\
         ASSIGN 10 TO I\n\
         GO TO I, (10, 20)\n\
         10 CONTINUE\n\
         20 CONTINUE\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let (_, dc) = main_program(&ctx);
    let body = body_of(&ctx, dc);
    let assign = body
        .iter()
        .find(|&&s| matches!(ctx.stmt(s).kind, StmtKind::Assign { .. }))
        .copied()
        .unwrap();
    let StmtKind::Assign { address, .. } = &ctx.stmt(assign).kind else {
        unreachable!()
    };
    assert!(matches!(*address, StmtLabelRef::Resolved(_)));

    let agoto = body
        .iter()
        .find(|&&s| matches!(ctx.stmt(s).kind, StmtKind::AssignedGoto { .. }))
        .copied()
        .unwrap();
    let StmtKind::AssignedGoto { allowed, .. } = &ctx.stmt(agoto).kind else {
        unreachable!()
    };
    assert_eq!(allowed.len(), 2);
    assert!(allowed.iter().all(|r| r.is_resolved()));
}

#[test]
fn printing_then_reparsing_is_idempotent() {
    let (ctx, diags) = check(
        "PROGRAM P\n\
         X = 1.0 + Y * 2.0\n\
         IF (X > 0.0) GO TO 10\n\
         DO 20 I = 1, 10, 2\n\
         20 CONTINUE\n\
         10 X = X - 1.0\n\
         END PROGRAM P\n",
    );
    assert!(error_messages(&diags).is_empty());

    let first = ffc::printer::print_main_program(&ctx).expect("printable unit");
    let (ctx2, diags2) = check(&first);
    assert!(
        error_messages(&diags2).is_empty(),
        "printed source must re-parse: {}\n{:?}",
        first,
        error_messages(&diags2)
    );
    let second = ffc::printer::print_main_program(&ctx2).unwrap();
    assert_eq!(first, second);
}

#[test]
fn verify_mode_matches_expected_diagnostics() {
    let src = "PROGRAM P\n\
               IMPLICIT NONE\n\
               X = 1.0 ! expected-error {{undeclared identifier 'x'}}\n\
               END PROGRAM P\n";
    let (_, diags) = ffc::analyze_quiet(src, "test.f90", &LangOptions::default());
    assert!(diags.verify_expectations().is_empty());

    let stale = "PROGRAM P\n\
                 X = 1.0 ! expected-error {{undeclared identifier 'x'}}\n\
                 END PROGRAM P\n";
    let (_, diags) = ffc::analyze_quiet(stale, "test.f90", &LangOptions::default());
    assert!(!diags.verify_expectations().is_empty());
}

#[test]
fn function_units_get_abi_descriptors() {
    let (ctx, diags) = check(
        "FUNCTION F(A, B)\n\
         INTEGER :: A\n\
         REAL :: B\n\
         F = A + B\n\
         END FUNCTION F\n",
    );
    let messages = error_messages(&diags);
    assert!(messages.is_empty(), "unexpected errors: {:?}", messages);

    let descriptors = ffc::abi::compute_all(&ctx, &ffc::abi::DefaultTargetAbi);
    let explicit: Vec<_> = descriptors
        .iter()
        .filter(|(d, _)| !ctx.decl(*d).implicit)
        .collect();
    assert_eq!(explicit.len(), 1);
    let (_, abi) = explicit[0];
    assert_eq!(abi.args.len(), 2);
    assert!(abi
        .args
        .iter()
        .all(|a| a.passing == ffc::abi::AbiArgPassing::Reference));
    assert_eq!(abi.ret, ffc::abi::AbiRetPassing::Value);
}
