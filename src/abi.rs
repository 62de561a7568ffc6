use crate::ast::types::ExtAttr;
use crate::ast::{ASTContext, DeclId, DeclKind, QualType, TypeKind};

/// How one Fortran argument is passed to a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiArgPassing {
    /// By value: a simple scalar, or an aggregate passed whole.
    Value,
    /// A pointer to the argument's storage.
    Reference,
    /// An opaque `void*` plus a 32-bit element-size argument.
    ReferenceAsVoidExtraSize,
    /// The aggregate splits into separate arguments: a complex becomes
    /// (re, im), a character becomes (pointer, length).
    Expand,
    /// The character pointer is passed in place of the argument and its
    /// length is appended to the call's trailing integer argument list.
    ExpandCharacterLengthAsAdditionalIntArg,
    /// A complex packed into a two-element vector.
    ComplexValueAsVector,
}

/// How a callable's result comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiRetPassing {
    Nothing,
    Value,
    /// A hidden output pointer argument carries the character result.
    CharacterValueAsArg,
}

/// The complex/character strategies are target dependent; the analyzer
/// never chooses them itself.
pub trait TargetAbi {
    fn complex_value_passing(&self) -> AbiArgPassing {
        AbiArgPassing::Expand
    }
    fn character_arg_passing(&self) -> AbiArgPassing {
        AbiArgPassing::Expand
    }
}

#[derive(Debug, Default)]
pub struct DefaultTargetAbi;

impl TargetAbi for DefaultTargetAbi {}

/// A target whose calling convention packs complex scalars into vectors and
/// moves character lengths to the end of the argument list.
#[derive(Debug, Default)]
pub struct VectorComplexTargetAbi;

impl TargetAbi for VectorComplexTargetAbi {
    fn complex_value_passing(&self) -> AbiArgPassing {
        AbiArgPassing::ComplexValueAsVector
    }
    fn character_arg_passing(&self) -> AbiArgPassing {
        AbiArgPassing::ExpandCharacterLengthAsAdditionalIntArg
    }
}

#[derive(Debug, Clone)]
pub struct AbiArgInfo {
    pub decl: DeclId,
    pub passing: AbiArgPassing,
    /// The 32-bit size argument accompanying `ReferenceAsVoidExtraSize`,
    /// when it is known at compile time.
    pub element_size: Option<u32>,
}

/// Per-callable descriptor handed to the backend so the call emitter knows
/// how to marshal arguments and interpret results.
#[derive(Debug, Clone)]
pub struct FunctionAbi {
    pub args: Vec<AbiArgInfo>,
    pub ret: AbiRetPassing,
}

pub fn classify_argument(
    ctx: &ASTContext,
    ty: Option<QualType>,
    target: &dyn TargetAbi,
) -> AbiArgPassing {
    let Some(ty) = ty else {
        return AbiArgPassing::Reference;
    };
    if ctx.is_character_type(ty) {
        return target.character_arg_passing();
    }
    match &ctx.type_(ty.ty).kind {
        TypeKind::Array { .. } => AbiArgPassing::Reference,
        TypeKind::Record { .. } => AbiArgPassing::ReferenceAsVoidExtraSize,
        _ => {
            if ty.quals.ext_attr() == ExtAttr::Value {
                if ctx.is_complex_type(ty) {
                    target.complex_value_passing()
                } else {
                    AbiArgPassing::Value
                }
            } else {
                AbiArgPassing::Reference
            }
        }
    }
}

pub fn classify_return(ctx: &ASTContext, result: Option<QualType>) -> AbiRetPassing {
    match result {
        None => AbiRetPassing::Nothing,
        Some(ty) if ctx.is_character_type(ty) => AbiRetPassing::CharacterValueAsArg,
        Some(_) => AbiRetPassing::Value,
    }
}

/// Builds the descriptor for one function or subroutine declaration.
pub fn compute_function_abi(
    ctx: &ASTContext,
    decl: DeclId,
    target: &dyn TargetAbi,
) -> Option<FunctionAbi> {
    let (args, result) = match &ctx.decl(decl).kind {
        DeclKind::Function { args, result, .. } => (args.clone(), *result),
        DeclKind::Subroutine { args, .. } => (args.clone(), None),
        _ => return None,
    };
    let args = args
        .iter()
        .map(|&arg| {
            let ty = ctx.decl(arg).var_type();
            let passing = classify_argument(ctx, ty, target);
            let element_size = match passing {
                AbiArgPassing::ReferenceAsVoidExtraSize => {
                    ty.and_then(|ty| crate::eval::type_size_in_bytes(ctx, ty))
                }
                _ => None,
            };
            AbiArgInfo {
                decl: arg,
                passing,
                element_size,
            }
        })
        .collect();
    Some(FunctionAbi {
        args,
        ret: classify_return(ctx, result),
    })
}

/// Descriptors for every callable in the translation unit, in declaration
/// order.
pub fn compute_all(ctx: &ASTContext, target: &dyn TargetAbi) -> Vec<(DeclId, FunctionAbi)> {
    ctx.decl_ids()
        .filter_map(|id| compute_function_abi(ctx, id, target).map(|abi| (id, abi)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, DeclKind, QualType, Qualifiers, VarKind};
    use crate::options::LangOptions;

    fn arg(ctx: &mut ASTContext, ty: QualType) -> DeclId {
        let name = ctx.idents.intern("a");
        ctx.alloc_decl(Decl {
            kind: DeclKind::Var {
                ty: Some(ty),
                kind: VarKind::Argument,
                init: None,
            },
            dc: None,
            name: Some(name),
            span: 0..0,
            implicit: false,
            invalid: false,
        })
    }

    #[test]
    fn scalars_pass_by_reference_unless_value() {
        let ctx = ASTContext::new(LangOptions::default());
        let target = DefaultTargetAbi;
        let int = QualType::new(ctx.integer_ty);
        assert_eq!(
            classify_argument(&ctx, Some(int), &target),
            AbiArgPassing::Reference
        );
        let mut quals = Qualifiers::new();
        quals.set_ext_attr(ExtAttr::Value);
        let by_value = QualType::with_quals(ctx.integer_ty, quals);
        assert_eq!(
            classify_argument(&ctx, Some(by_value), &target),
            AbiArgPassing::Value
        );
    }

    #[test]
    fn complex_and_character_strategies_come_from_the_target() {
        let ctx = ASTContext::new(LangOptions::default());
        let mut quals = Qualifiers::new();
        quals.set_ext_attr(ExtAttr::Value);
        let complex = QualType::with_quals(ctx.complex_ty, quals);
        let character = QualType::new(ctx.character_ty);

        let default = DefaultTargetAbi;
        assert_eq!(
            classify_argument(&ctx, Some(complex), &default),
            AbiArgPassing::Expand
        );
        assert_eq!(
            classify_argument(&ctx, Some(character), &default),
            AbiArgPassing::Expand
        );

        let vector = VectorComplexTargetAbi;
        assert_eq!(
            classify_argument(&ctx, Some(complex), &vector),
            AbiArgPassing::ComplexValueAsVector
        );
        assert_eq!(
            classify_argument(&ctx, Some(character), &vector),
            AbiArgPassing::ExpandCharacterLengthAsAdditionalIntArg
        );
    }

    #[test]
    fn character_functions_return_through_an_argument() {
        let mut ctx = ASTContext::new(LangOptions::default());
        let character = QualType::new(ctx.character_ty);
        assert_eq!(
            classify_return(&ctx, Some(character)),
            AbiRetPassing::CharacterValueAsArg
        );
        assert_eq!(classify_return(&ctx, None), AbiRetPassing::Nothing);

        let dc = ctx.create_context(Some(ctx.translation_unit_context()));
        let name = ctx.idents.intern("f");
        let int = QualType::new(ctx.integer_ty);
        let a = arg(&mut ctx, int);
        let f = ctx.alloc_decl(Decl {
            kind: DeclKind::Function {
                ctx: dc,
                result: Some(character),
                args: vec![a],
                stmt_function_body: None,
            },
            dc: None,
            name: Some(name),
            span: 0..0,
            implicit: false,
            invalid: false,
        });
        let abi = compute_function_abi(&ctx, f, &DefaultTargetAbi).unwrap();
        assert_eq!(abi.ret, AbiRetPassing::CharacterValueAsArg);
        assert_eq!(abi.args.len(), 1);
        assert_eq!(abi.args[0].passing, AbiArgPassing::Reference);
    }
}
