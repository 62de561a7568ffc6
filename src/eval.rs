use crate::ast::{ASTContext, ArraySpec, ExprId, ExprKind, QualType};
use crate::ast::expr::BinaryOp;
use crate::ast::expr::UnaryOp;

/// Evaluates an integer-typed expression at compile time using signed 64-bit
/// arithmetic. Returns None on overflow at any intermediate step, on a
/// non-integer subexpression, or on anything that is not a compile-time
/// constant.
pub fn evaluate_as_int(ctx: &ASTContext, expr: ExprId) -> Option<i64> {
    let e = ctx.expr(expr);
    let ty = e.ty?;
    if !ctx.is_integer_type(ty) {
        return None;
    }
    match &e.kind {
        ExprKind::IntConstant(v) => Some(*v),
        ExprKind::Unary {
            op: UnaryOp::Plus,
            expr,
        } => evaluate_as_int(ctx, *expr),
        ExprKind::Unary {
            op: UnaryOp::Minus,
            expr,
        } => 0i64.checked_sub(evaluate_as_int(ctx, *expr)?),
        ExprKind::Binary { op, lhs, rhs } => {
            let rhs = evaluate_as_int(ctx, *rhs)?;
            let lhs = evaluate_as_int(ctx, *lhs)?;
            match op {
                BinaryOp::Add => lhs.checked_add(rhs),
                BinaryOp::Sub => lhs.checked_sub(rhs),
                BinaryOp::Mul => lhs.checked_mul(rhs),
                BinaryOp::Div => lhs.checked_div(rhs),
                BinaryOp::Pow => {
                    if rhs < 0 {
                        return None;
                    }
                    match lhs {
                        0 => Some(if rhs == 0 { 1 } else { 0 }),
                        1 => Some(1),
                        -1 => Some(if rhs % 2 == 0 { 1 } else { -1 }),
                        _ => {
                            // Repeated multiplication, checking for overflow
                            // at every step.
                            let mut acc = 1i64;
                            for _ in 0..rhs {
                                acc = acc.checked_mul(lhs)?;
                            }
                            Some(acc)
                        }
                    }
                }
                _ => None,
            }
        }
        ExprKind::Var(decl) => {
            let d = ctx.decl(*decl);
            if d.is_parameter() {
                evaluate_as_int(ctx, d.init()?)
            } else {
                None
            }
        }
        ExprKind::ImplicitCast { expr } | ExprKind::Conversion { expr, .. } => {
            evaluate_as_int(ctx, *expr)
        }
        _ => None,
    }
}

/// Checks whether an expression is a compile-time constant without computing
/// its value.
pub fn is_evaluatable(ctx: &ASTContext, expr: ExprId) -> bool {
    verify(ctx, expr, &mut None)
}

/// Walks the expression and collects the subexpressions that prevent
/// compile-time evaluation. If nothing specific can be blamed, the whole
/// expression is reported.
pub fn gather_non_evaluatable(ctx: &ASTContext, expr: ExprId, result: &mut Vec<ExprId>) {
    let mut out = Some(std::mem::take(result));
    verify(ctx, expr, &mut out);
    *result = out.unwrap();
    if result.is_empty() {
        result.push(expr);
    }
}

fn verify(ctx: &ASTContext, expr: ExprId, non_constants: &mut Option<Vec<ExprId>>) -> bool {
    match &ctx.expr(expr).kind {
        ExprKind::IntConstant(_)
        | ExprKind::RealConstant(_)
        | ExprKind::ComplexConstant { .. }
        | ExprKind::CharConstant(_)
        | ExprKind::LogicalConstant(_) => true,
        ExprKind::Unary { expr, .. } => verify(ctx, *expr, non_constants),
        ExprKind::Binary { lhs, rhs, .. } => {
            let lhs_ok = verify(ctx, *lhs, non_constants);
            let rhs_ok = verify(ctx, *rhs, non_constants);
            lhs_ok && rhs_ok
        }
        ExprKind::ImplicitCast { expr } | ExprKind::Conversion { expr, .. } => {
            verify(ctx, *expr, non_constants)
        }
        ExprKind::Var(decl) => {
            let d = ctx.decl(*decl);
            if d.is_parameter() {
                if let Some(init) = d.init() {
                    return verify(ctx, init, non_constants);
                }
            }
            if let Some(out) = non_constants {
                out.push(expr);
            }
            false
        }
        _ => {
            if let Some(out) = non_constants {
                out.push(expr);
            }
            false
        }
    }
}

/// Evaluates the bounds of one explicit-shape dimension. The lower bound
/// defaults to 1 when absent. Deferred and assumed shapes are runtime-only.
pub fn evaluate_bounds(ctx: &ASTContext, spec: &ArraySpec) -> Option<(i64, i64)> {
    match spec {
        ArraySpec::ExplicitShape { lower, upper } => {
            let lb = match lower {
                Some(e) => evaluate_as_int(ctx, *e)?,
                None => 1,
            };
            let ub = evaluate_as_int(ctx, *upper)?;
            Some((lb, ub))
        }
        _ => None,
    }
}

/// Storage size of a type in bytes, honoring an explicit kind selector when
/// it folds and the session's default kinds otherwise. CHARACTER sizes
/// follow the length selector; record sizes sum their fields; array sizes
/// need every bound to fold. Pointers and runtime-sized types return None.
pub fn type_size_in_bytes(ctx: &ASTContext, qt: QualType) -> Option<u32> {
    use crate::ast::{BuiltinSpec, TypeKind};
    match &ctx.type_(qt.ty).kind {
        TypeKind::Builtin { spec, kind, len } => {
            if let Some(kind) = kind {
                return evaluate_as_int(ctx, *kind)
                    .filter(|&k| k > 0)
                    .map(|k| k as u32);
            }
            match spec {
                BuiltinSpec::Integer => Some(ctx.opts.default_integer_kind as u32),
                BuiltinSpec::Real => Some(ctx.opts.default_real_kind as u32),
                BuiltinSpec::DoublePrecision => Some(2 * ctx.opts.default_real_kind as u32),
                BuiltinSpec::Complex => Some(2 * ctx.opts.default_real_kind as u32),
                BuiltinSpec::Logical => Some(ctx.opts.default_integer_kind as u32),
                BuiltinSpec::Character => match len {
                    Some(len) => evaluate_as_int(ctx, *len)
                        .filter(|&l| l >= 0)
                        .map(|l| l as u32),
                    None => Some(1),
                },
            }
        }
        TypeKind::Record { fields } => {
            let mut size = 0u32;
            for &field in fields {
                let field_ty = ctx.decl(field).var_type()?;
                size = size.checked_add(type_size_in_bytes(ctx, field_ty)?)?;
            }
            Some(size)
        }
        TypeKind::Array { element, .. } => {
            let element_size = type_size_in_bytes(ctx, *element)?;
            let count = evaluate_array_size(ctx, qt)?;
            u32::try_from(count)
                .ok()
                .and_then(|c| element_size.checked_mul(c))
        }
        TypeKind::Pointer { .. } => None,
    }
}

/// Materializes the element count of an array type when every bound is
/// compile-time evaluable; otherwise the size is deferred to runtime.
pub fn evaluate_array_size(ctx: &ASTContext, qt: QualType) -> Option<u64> {
    let (_, dims) = ctx.array_parts(qt)?;
    let mut size: u64 = 1;
    for dim in dims {
        let (lb, ub) = evaluate_bounds(ctx, dim)?;
        let extent = ub.checked_sub(lb)?.checked_add(1)?.max(0) as u64;
        size = size.checked_mul(extent)?;
    }
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::Expr;
    use crate::options::LangOptions;

    fn ctx() -> ASTContext {
        ASTContext::new(LangOptions::default())
    }

    fn int(c: &mut ASTContext, v: i64) -> ExprId {
        let ty = QualType::new(c.integer_ty);
        c.alloc_expr(Expr::new(ExprKind::IntConstant(v), ty, 0..0))
    }

    fn binary(c: &mut ASTContext, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let ty = QualType::new(c.integer_ty);
        c.alloc_expr(Expr::new(ExprKind::Binary { op, lhs, rhs }, ty, 0..0))
    }

    #[test]
    fn arithmetic_and_power() {
        let mut c = ctx();
        let two = int(&mut c, 2);
        let ten = int(&mut c, 10);
        let pow = binary(&mut c, BinaryOp::Pow, two, ten);
        assert_eq!(evaluate_as_int(&c, pow), Some(1024));
        let three = int(&mut c, 3);
        let sum = binary(&mut c, BinaryOp::Add, pow, three);
        assert_eq!(evaluate_as_int(&c, sum), Some(1027));
    }

    #[test]
    fn overflow_fails_at_any_intermediate_step() {
        let mut c = ctx();
        let big = int(&mut c, i64::MAX);
        let two = int(&mut c, 2);
        let mul = binary(&mut c, BinaryOp::Mul, big, two);
        assert_eq!(evaluate_as_int(&c, mul), None);
        // 2 ** 63 overflows even though 2 ** 62 fits.
        let base = int(&mut c, 2);
        let exp = int(&mut c, 63);
        let pow = binary(&mut c, BinaryOp::Pow, base, exp);
        assert_eq!(evaluate_as_int(&c, pow), None);
    }

    #[test]
    fn negative_exponent_fails() {
        let mut c = ctx();
        let two = int(&mut c, 2);
        let neg = int(&mut c, -1);
        let pow = binary(&mut c, BinaryOp::Pow, two, neg);
        assert_eq!(evaluate_as_int(&c, pow), None);
    }

    #[test]
    fn division_by_zero_fails() {
        let mut c = ctx();
        let one = int(&mut c, 1);
        let zero = int(&mut c, 0);
        let div = binary(&mut c, BinaryOp::Div, one, zero);
        assert_eq!(evaluate_as_int(&c, div), None);
    }

    #[test]
    fn non_constants_are_gathered() {
        let mut c = ctx();
        let real_ty = QualType::new(c.real_ty);
        let opaque = c.alloc_expr(Expr::new(ExprKind::Error, real_ty, 0..0));
        let one = int(&mut c, 1);
        let sum = binary(&mut c, BinaryOp::Add, one, opaque);
        assert!(!is_evaluatable(&c, sum));
        let mut bad = Vec::new();
        gather_non_evaluatable(&c, sum, &mut bad);
        assert_eq!(bad, vec![opaque]);
    }

    #[test]
    fn default_kinds_drive_type_sizes() {
        use crate::ast::Qualifiers;
        let mut c = ctx();
        assert_eq!(type_size_in_bytes(&c, QualType::new(c.integer_ty)), Some(4));
        assert_eq!(
            type_size_in_bytes(&c, QualType::new(c.double_precision_ty)),
            Some(8)
        );
        let len = int(&mut c, 16);
        let char16 = c.qualify(c.character_ty, Qualifiers::new(), None, Some(len));
        assert_eq!(type_size_in_bytes(&c, char16), Some(16));
        let four = int(&mut c, 4);
        let arr = c.get_array_type(
            QualType::new(c.real_ty),
            vec![ArraySpec::ExplicitShape {
                lower: None,
                upper: four,
            }],
        );
        assert_eq!(type_size_in_bytes(&c, QualType::new(arr)), Some(16));
    }

    #[test]
    fn explicit_shape_lower_bound_defaults_to_one() {
        let mut c = ctx();
        let upper = int(&mut c, 4);
        let spec = ArraySpec::ExplicitShape {
            lower: None,
            upper,
        };
        assert_eq!(evaluate_bounds(&c, &spec), Some((1, 4)));
        let elem = QualType::new(c.integer_ty);
        let arr = c.get_array_type(elem, vec![spec]);
        assert_eq!(evaluate_array_size(&c, QualType::new(arr)), Some(4));
    }
}
