use crate::ast::expr::ExprKind;
use crate::ast::stmt::StmtKind;
use crate::ast::{ASTContext, ArraySpec, DeclId, ExprId, QualType, StmtId};
use crate::eval;

/// A bound or index component of a section; constant when it folded,
/// otherwise the expression the backend must evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Const(i64),
    Expr(ExprId),
}

/// The element count of one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extent {
    Const(u64),
    /// `upper - lower + 1`, evaluated at runtime.
    Runtime {
        lower: Option<ExprId>,
        upper: ExprId,
    },
    /// Assumed or deferred shape; the extent comes from the descriptor.
    Deferred,
}

/// One dimension of an array section: where it starts, how many elements it
/// covers, and how indices advance. A per-iteration index is computed as
/// `offset + counter * stride`.
#[derive(Debug, Clone)]
pub struct Section {
    pub lower: Bound,
    pub extent: Extent,
    pub stride: Bound,
    pub offset: Bound,
}

#[derive(Debug, Clone)]
pub struct ArrayOperand {
    pub array: DeclId,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone)]
pub enum Destination {
    /// The assignment target.
    Existing(DeclId),
    /// A fresh temporary of the given (array) type.
    Temporary(QualType),
}

#[derive(Debug, Clone)]
pub struct LoopDim {
    pub extent: Extent,
}

/// The plan for one element-wise array operation: an N-deep counted loop
/// nest over the destination's sections, with the innermost loop running
/// over the first dimension (column-major traversal).
#[derive(Debug, Clone)]
pub struct ElementwisePlan {
    pub dest: Destination,
    /// Outermost loop first; the last entry is the innermost loop.
    pub loops: Vec<LoopDim>,
    /// Scalar subexpressions, evaluated once before the nest and reused in
    /// every iteration.
    pub scalars: Vec<ExprId>,
    /// The array operands loaded per iteration.
    pub operands: Vec<ArrayOperand>,
    /// The element expression, computed once per iteration from cached
    /// scalars and indexed array loads.
    pub element: ExprId,
    /// For WHERE forms, the mask expression guarding each iteration.
    pub mask: Option<ExprId>,
}

fn section_of(ctx: &ASTContext, spec: &ArraySpec) -> Section {
    let (lower, extent) = match spec {
        ArraySpec::ExplicitShape { lower, upper } => match eval::evaluate_bounds(ctx, spec) {
            Some((lb, ub)) => (
                Bound::Const(lb),
                Extent::Const(ub.saturating_sub(lb).saturating_add(1).max(0) as u64),
            ),
            None => (
                (*lower).map(Bound::Expr).unwrap_or(Bound::Const(1)),
                Extent::Runtime {
                    lower: *lower,
                    upper: *upper,
                },
            ),
        },
        ArraySpec::AssumedShape { lower } => (
            (*lower).map(Bound::Expr).unwrap_or(Bound::Const(1)),
            Extent::Deferred,
        ),
        ArraySpec::AssumedSize => (Bound::Const(1), Extent::Deferred),
    };
    Section {
        lower,
        extent,
        stride: Bound::Const(1),
        offset: Bound::Const(0),
    }
}

fn sections_of(ctx: &ASTContext, ty: QualType) -> Vec<Section> {
    match ctx.array_parts(ty) {
        Some((_, dims)) => dims.iter().map(|d| section_of(ctx, d)).collect(),
        None => Vec::new(),
    }
}

fn contains_array_operand(ctx: &ASTContext, expr: ExprId) -> bool {
    match &ctx.expr(expr).kind {
        ExprKind::Var(decl) => ctx
            .decl(*decl)
            .var_type()
            .map(|ty| ctx.is_array_type(ty))
            .unwrap_or(false),
        ExprKind::ArrayConstructor { .. } => true,
        ExprKind::Unary { expr, .. }
        | ExprKind::ImplicitCast { expr }
        | ExprKind::Conversion { expr, .. } => contains_array_operand(ctx, *expr),
        ExprKind::Binary { lhs, rhs, .. } => {
            contains_array_operand(ctx, *lhs) || contains_array_operand(ctx, *rhs)
        }
        ExprKind::IntrinsicCall { args, .. } | ExprKind::Call { args, .. } => {
            args.iter().any(|&a| contains_array_operand(ctx, a))
        }
        _ => false,
    }
}

/// Walks the element expression, separating array operands (with their
/// sections) from maximal scalar subexpressions. Scalars are recorded once
/// and reused; bare constants are not worth caching.
fn collect_operands(
    ctx: &ASTContext,
    expr: ExprId,
    scalars: &mut Vec<ExprId>,
    operands: &mut Vec<ArrayOperand>,
) {
    if !contains_array_operand(ctx, expr) {
        let trivial = matches!(
            ctx.expr(expr).kind,
            ExprKind::IntConstant(_)
                | ExprKind::RealConstant(_)
                | ExprKind::ComplexConstant { .. }
                | ExprKind::CharConstant(_)
                | ExprKind::LogicalConstant(_)
        );
        if !trivial && !scalars.contains(&expr) {
            scalars.push(expr);
        }
        return;
    }
    match &ctx.expr(expr).kind {
        ExprKind::Var(decl) => {
            if !operands.iter().any(|o| o.array == *decl) {
                let sections = ctx
                    .decl(*decl)
                    .var_type()
                    .map(|ty| sections_of(ctx, ty))
                    .unwrap_or_default();
                operands.push(ArrayOperand {
                    array: *decl,
                    sections,
                });
            }
        }
        ExprKind::Unary { expr, .. }
        | ExprKind::ImplicitCast { expr }
        | ExprKind::Conversion { expr, .. } => {
            collect_operands(ctx, *expr, scalars, operands);
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_operands(ctx, *lhs, scalars, operands);
            collect_operands(ctx, *rhs, scalars, operands);
        }
        ExprKind::IntrinsicCall { args, .. } | ExprKind::Call { args, .. } => {
            for &arg in args {
                collect_operands(ctx, arg, scalars, operands);
            }
        }
        ExprKind::ArrayConstructor { items } => {
            for &item in items {
                collect_operands(ctx, item, scalars, operands);
            }
        }
        _ => {}
    }
}

/// Plans one whole-array assignment, `dest = element` element-wise. With no
/// destination variable a fresh temporary of the element expression's type
/// is materialized.
pub fn plan_elementwise(
    ctx: &ASTContext,
    dest: Option<ExprId>,
    element: ExprId,
    mask: Option<ExprId>,
) -> Option<ElementwisePlan> {
    let (dest, dest_sections) = match dest {
        Some(dest) => match &ctx.expr(dest).kind {
            ExprKind::Var(decl) => {
                let ty = ctx.decl(*decl).var_type()?;
                if !ctx.is_array_type(ty) {
                    return None;
                }
                (Destination::Existing(*decl), sections_of(ctx, ty))
            }
            _ => return None,
        },
        None => {
            let ty = ctx.expr(element).ty?;
            if !ctx.is_array_type(ty) {
                return None;
            }
            (Destination::Temporary(ty), sections_of(ctx, ty))
        }
    };

    let mut scalars = Vec::new();
    let mut operands = Vec::new();
    collect_operands(ctx, element, &mut scalars, &mut operands);
    if let Some(mask) = mask {
        collect_operands(ctx, mask, &mut scalars, &mut operands);
    }

    // Column-major: the nest iterates the last dimension outermost and the
    // first dimension innermost.
    let loops = dest_sections
        .iter()
        .rev()
        .map(|s| LoopDim {
            extent: s.extent.clone(),
        })
        .collect();

    Some(ElementwisePlan {
        dest,
        loops,
        scalars,
        operands,
        element,
        mask,
    })
}

/// Plans an assignment statement when its target is a whole array.
pub fn plan_assignment(ctx: &ASTContext, stmt: StmtId) -> Option<ElementwisePlan> {
    match &ctx.stmt(stmt).kind {
        StmtKind::Assignment { lhs, rhs } => plan_elementwise(ctx, Some(*lhs), *rhs, None),
        _ => None,
    }
}

/// Plans the body of a WHERE statement or construct; every element
/// assignment is guarded by the mask.
pub fn plan_where(ctx: &ASTContext, stmt: StmtId) -> Vec<ElementwisePlan> {
    let StmtKind::Where { mask, body } = &ctx.stmt(stmt).kind else {
        return Vec::new();
    };
    let assignments: Vec<StmtId> = match &ctx.stmt(*body).kind {
        StmtKind::Block { body } => body.clone(),
        _ => vec![*body],
    };
    assignments
        .iter()
        .filter_map(|&s| match &ctx.stmt(s).kind {
            StmtKind::Assignment { lhs, rhs } => {
                plan_elementwise(ctx, Some(*lhs), *rhs, Some(*mask))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::Expr;
    use crate::ast::{Decl, DeclKind, VarKind};
    use crate::options::LangOptions;

    fn array_var(ctx: &mut ASTContext, name: &str, dims: Vec<ArraySpec>) -> DeclId {
        let elem = QualType::new(ctx.real_ty);
        let arr = ctx.get_array_type(elem, dims);
        let sym = ctx.idents.intern(name);
        ctx.alloc_decl(Decl {
            kind: DeclKind::Var {
                ty: Some(QualType::new(arr)),
                kind: VarKind::Local,
                init: None,
            },
            dc: None,
            name: Some(sym),
            span: 0..0,
            implicit: false,
            invalid: false,
        })
    }

    #[test]
    fn constant_bounds_fold_into_constant_sections() {
        let mut ctx = ASTContext::new(LangOptions::default());
        let int = QualType::new(ctx.integer_ty);
        let two = ctx.alloc_expr(Expr::new(ExprKind::IntConstant(2), int, 0..0));
        let ten = ctx.alloc_expr(Expr::new(ExprKind::IntConstant(10), int, 0..0));
        let spec = ArraySpec::ExplicitShape {
            lower: Some(two),
            upper: ten,
        };
        let section = section_of(&ctx, &spec);
        assert_eq!(section.lower, Bound::Const(2));
        assert_eq!(section.extent, Extent::Const(9));
        assert_eq!(section.stride, Bound::Const(1));
    }

    #[test]
    fn loop_nest_is_column_major() {
        let mut ctx = ASTContext::new(LangOptions::default());
        let int = QualType::new(ctx.integer_ty);
        let three = ctx.alloc_expr(Expr::new(ExprKind::IntConstant(3), int, 0..0));
        let five = ctx.alloc_expr(Expr::new(ExprKind::IntConstant(5), int, 0..0));
        let a = array_var(
            &mut ctx,
            "a",
            vec![
                ArraySpec::ExplicitShape {
                    lower: None,
                    upper: three,
                },
                ArraySpec::ExplicitShape {
                    lower: None,
                    upper: five,
                },
            ],
        );
        let ty = ctx.decl(a).var_type().unwrap();
        let lhs = ctx.alloc_expr(Expr::new(ExprKind::Var(a), ty, 0..0));
        let rhs = ctx.alloc_expr(Expr::new(ExprKind::Var(a), ty, 0..0));
        let plan = plan_elementwise(&ctx, Some(lhs), rhs, None).unwrap();
        // The second (last) dimension drives the outermost loop.
        assert_eq!(plan.loops.len(), 2);
        assert_eq!(plan.loops[0].extent, Extent::Const(5));
        assert_eq!(plan.loops[1].extent, Extent::Const(3));
    }
}
