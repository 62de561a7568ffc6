//! Source-form printing of the typed AST. The output is valid free-form
//! Fortran; printing a parsed unit and re-parsing it yields the same tree,
//! so print(parse(print(x))) == print(x).

use std::fmt::Write;

use crate::ast::expr::{BinaryOp, ExprKind, UnaryOp};
use crate::ast::stmt::{FormatSpec, StmtKind, StmtLabelRef};
use crate::ast::{ASTContext, DeclId, DeclKind, ExprId, StmtId};

pub fn print_expr(ctx: &ASTContext, expr: ExprId) -> String {
    let mut out = String::new();
    write_expr(ctx, expr, &mut out);
    out
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Pow => "**",
        BinaryOp::Concat => "//",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "/=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => ".AND.",
        BinaryOp::Or => ".OR.",
        BinaryOp::Eqv => ".EQV.",
        BinaryOp::Neqv => ".NEQV.",
    }
}

fn write_expr(ctx: &ASTContext, expr: ExprId, out: &mut String) {
    match &ctx.expr(expr).kind {
        ExprKind::IntConstant(v) => {
            let _ = write!(out, "{}", v);
        }
        ExprKind::RealConstant(v) => {
            let _ = write!(out, "{:?}", v);
        }
        ExprKind::ComplexConstant { re, im } => {
            let _ = write!(out, "({:?}, {:?})", re, im);
        }
        ExprKind::CharConstant(s) => {
            let _ = write!(out, "'{}'", s.replace('\'', "''"));
        }
        ExprKind::LogicalConstant(true) => out.push_str(".TRUE."),
        ExprKind::LogicalConstant(false) => out.push_str(".FALSE."),
        ExprKind::Var(decl) => out.push_str(ctx.decl_name(*decl)),
        ExprKind::Unary { op, expr } => {
            out.push('(');
            out.push_str(match op {
                UnaryOp::Plus => "+",
                UnaryOp::Minus => "-",
                UnaryOp::Not => ".NOT. ",
            });
            write_expr(ctx, *expr, out);
            out.push(')');
        }
        ExprKind::Binary { op, lhs, rhs } => {
            out.push('(');
            write_expr(ctx, *lhs, out);
            let _ = write!(out, " {} ", binary_op_str(*op));
            write_expr(ctx, *rhs, out);
            out.push(')');
        }
        // Inserted nodes print as their subject; the analyzer re-inserts
        // them on a re-parse.
        ExprKind::ImplicitCast { expr } | ExprKind::Conversion { expr, .. } => {
            write_expr(ctx, *expr, out);
        }
        ExprKind::ArrayConstructor { items } => {
            out.push_str("(/ ");
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(ctx, item, out);
            }
            out.push_str(" /)");
        }
        ExprKind::ArrayElement { array, subscripts } => {
            out.push_str(ctx.decl_name(*array));
            out.push('(');
            for (i, &sub) in subscripts.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(ctx, sub, out);
            }
            out.push(')');
        }
        ExprKind::IntrinsicCall { function, args } | ExprKind::Call { function, args } => {
            out.push_str(ctx.decl_name(*function));
            out.push('(');
            for (i, &arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(ctx, arg, out);
            }
            out.push(')');
        }
        ExprKind::Error => out.push_str("<error>"),
    }
}

fn label_ref_value(ctx: &ASTContext, reference: &StmtLabelRef) -> Option<i64> {
    match reference {
        StmtLabelRef::Resolved(stmt) => {
            let label = ctx.stmt(*stmt).label?;
            match ctx.expr(label).kind {
                ExprKind::IntConstant(v) => Some(v),
                _ => None,
            }
        }
        StmtLabelRef::Unresolved(expr) => match ctx.expr(*expr).kind {
            ExprKind::IntConstant(v) => Some(v),
            _ => None,
        },
        StmtLabelRef::Empty => None,
    }
}

fn write_stmt(ctx: &ASTContext, stmt: StmtId, out: &mut String) {
    let s = ctx.stmt(stmt);
    if let Some(label) = s.label {
        if let ExprKind::IntConstant(v) = ctx.expr(label).kind {
            let _ = write!(out, "{} ", v);
        }
    }
    match &s.kind {
        StmtKind::Program { name } => {
            out.push_str("PROGRAM");
            if let Some(name) = name {
                let _ = write!(out, " {}", ctx.idents.name(*name));
            }
        }
        StmtKind::EndProgram { name } => {
            out.push_str("END PROGRAM");
            if let Some(name) = name {
                let _ = write!(out, " {}", ctx.idents.name(*name));
            }
        }
        StmtKind::Assignment { lhs, rhs } => {
            write_expr(ctx, *lhs, out);
            out.push_str(" = ");
            write_expr(ctx, *rhs, out);
        }
        StmtKind::Goto { destination } => {
            let _ = write!(
                out,
                "GO TO {}",
                label_ref_value(ctx, destination).unwrap_or(0)
            );
        }
        StmtKind::AssignedGoto { var, allowed } => {
            out.push_str("GO TO ");
            write_expr(ctx, *var, out);
            if !allowed.is_empty() {
                out.push_str(", (");
                for (i, reference) in allowed.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}", label_ref_value(ctx, reference).unwrap_or(0));
                }
                out.push(')');
            }
        }
        StmtKind::Assign { address, var } => {
            let _ = write!(out, "ASSIGN {} TO ", label_ref_value(ctx, address).unwrap_or(0));
            write_expr(ctx, *var, out);
        }
        StmtKind::If {
            condition,
            then_stmt,
            ..
        } => {
            out.push_str("IF (");
            write_expr(ctx, *condition, out);
            out.push(')');
            match then_stmt {
                Some(then_stmt) => {
                    out.push(' ');
                    write_stmt(ctx, *then_stmt, out);
                }
                None => out.push_str(" THEN"),
            }
        }
        StmtKind::Else => out.push_str("ELSE"),
        StmtKind::EndIf => out.push_str("END IF"),
        StmtKind::Do {
            terminator,
            var,
            init,
            limit,
            step,
        } => {
            let _ = write!(out, "DO {} ", label_ref_value(ctx, terminator).unwrap_or(0));
            write_expr(ctx, *var, out);
            out.push_str(" = ");
            write_expr(ctx, *init, out);
            out.push_str(", ");
            write_expr(ctx, *limit, out);
            if let Some(step) = step {
                out.push_str(", ");
                write_expr(ctx, *step, out);
            }
        }
        StmtKind::Continue => out.push_str("CONTINUE"),
        StmtKind::Stop { code } => {
            out.push_str("STOP");
            if let Some(code) = code {
                out.push(' ');
                write_expr(ctx, *code, out);
            }
        }
        StmtKind::Print { format, items } => {
            out.push_str("PRINT ");
            match format {
                FormatSpec::Star => out.push('*'),
                FormatSpec::CharExpr(expr) => write_expr(ctx, *expr, out),
                FormatSpec::Label(reference) => {
                    let _ = write!(out, "{}", label_ref_value(ctx, reference).unwrap_or(0));
                }
            }
            for &item in items {
                out.push_str(", ");
                write_expr(ctx, item, out);
            }
        }
        StmtKind::Where { mask, body } => {
            out.push_str("WHERE (");
            write_expr(ctx, *mask, out);
            out.push_str(") ");
            write_stmt(ctx, *body, out);
        }
        StmtKind::Block { body } => {
            for (i, &inner) in body.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                write_stmt(ctx, inner, out);
            }
        }
        StmtKind::StmtFunction { function } => {
            out.push_str(ctx.decl_name(*function));
            out.push('(');
            if let DeclKind::Function { args, .. } = &ctx.decl(*function).kind {
                for (i, &arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(ctx.decl_name(arg));
                }
            }
            out.push_str(") = ");
            if let DeclKind::Function {
                stmt_function_body: Some(body),
                ..
            } = &ctx.decl(*function).kind
            {
                write_expr(ctx, *body, out);
            }
        }
        // The remaining specification statements round-trip through the
        // declarations they produced.
        _ => out.push_str("! specification statement"),
    }
}

/// Prints the executable body of a program unit as free-form source.
pub fn print_program_unit(ctx: &ASTContext, unit: DeclId) -> String {
    let Some(dc) = ctx.decl(unit).context_of() else {
        return String::new();
    };
    let mut out = String::new();
    for &stmt in &ctx.context(dc).body {
        write_stmt(ctx, stmt, &mut out);
        out.push('\n');
    }
    out
}

pub fn print_main_program(ctx: &ASTContext) -> Option<String> {
    let main = ctx.decl_ids().find(|&id| {
        matches!(ctx.decl(id).kind, DeclKind::MainProgram { .. })
    })?;
    Some(print_program_unit(ctx, main))
}
