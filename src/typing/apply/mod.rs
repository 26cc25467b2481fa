//! Application of a solved constraint system to an expression tree,
//! producing a fully typed, desugared tree: type variables are substituted
//! away, implicit conversions become explicit nodes, overloads resolve to
//! concrete declarations, and generic references are specialized.

mod call;
mod coerce;
mod literal;
mod member;
mod simplify;
mod substitute;
mod walk;

#[cfg(test)]
pub(crate) mod fixtures;

pub use walk::ExprWalker;

use std::collections::HashMap;

use crate::ast::{
    CheckedCastKind, DeclId, Expr, ExprKind, MagicIdentifierKind, NodeId,
};
use crate::errors::AsterResult;
use crate::span::Source;
use crate::typing::context::KnownProtocolKind;
use crate::typing::locator::{Locator, PathElt};
use crate::typing::solution::Solution;
use crate::typing::ty::Ty;
use crate::typing::TypeChecker;

/// The lexical context the rewriter is currently working in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeclContext {
    TopLevel,
    Closure(NodeId),
}

/// Rewrites an expression by applying a solution to it.
pub struct ExprRewriter<'a> {
    pub tc: &'a TypeChecker,
    pub solution: &'a Solution,
    pub dc: DeclContext,

    /// Partial applications of value-type methods, by node identity, with
    /// the number of argument clauses still to be applied. Such methods
    /// would capture `self` by reference and hide mutation, so they must be
    /// fully applied.
    pub(crate) value_type_member_applications: HashMap<NodeId, (usize, Source)>,
}

impl<'a> ExprRewriter<'a> {
    pub fn new(tc: &'a TypeChecker, solution: &'a Solution) -> ExprRewriter<'a> {
        ExprRewriter {
            tc,
            solution,
            dc: DeclContext::TopLevel,
            value_type_member_applications: HashMap::new(),
        }
    }

    pub fn simplify_ty(&self, ty: &Ty) -> Ty {
        self.solution.simplify_type(self.tc, ty)
    }

    /// Simplify the expression's type and return the expression.
    pub fn simplify_expr_ty(&self, mut expr: Box<Expr>) -> Box<Expr> {
        expr.ty = self.simplify_ty(&expr.ty);
        expr
    }

    /// Rewrite a single expression node, dispatching on its kind. Children
    /// are expected to have been rewritten already.
    pub fn visit(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        log::debug!("rewriting {}", expr.desc());
        match &expr.kind {
            ExprKind::Error => Ok(expr),

            ExprKind::IntegerLiteral(_) => self.handle_integer_literal(expr),
            ExprKind::FloatLiteral(_) => self.handle_float_literal(expr),
            ExprKind::CharacterLiteral(_) => self.handle_character_literal(expr),
            ExprKind::StringLiteral(_) => self.handle_string_literal(expr),
            ExprKind::MagicIdentifierLiteral(kind) => match kind {
                MagicIdentifierKind::File => self.handle_string_literal(expr),
                MagicIdentifierKind::Line | MagicIdentifierKind::Column => {
                    self.handle_integer_literal(expr)
                }
            },
            ExprKind::InterpolatedStringLiteral { .. } => self.visit_interpolated_string(expr),
            ExprKind::ArrayLiteral { .. } => self.visit_array_literal(expr),
            ExprKind::DictionaryLiteral { .. } => self.visit_dictionary_literal(expr),

            ExprKind::DeclRef { .. } => self.visit_decl_ref(expr),
            ExprKind::OverloadedDeclRef { .. } => self.visit_overloaded_decl_ref(expr),
            ExprKind::UnresolvedSpecialize { .. } => self.visit_unresolved_specialize(expr),
            ExprKind::OtherConstructorRef { .. } => self.visit_other_constructor_ref(expr),
            ExprKind::UnresolvedConstructor { .. } => self.visit_unresolved_constructor(expr),
            ExprKind::UnresolvedDot { .. } => self.visit_unresolved_dot(expr),
            ExprKind::UnresolvedMember { .. } => self.visit_unresolved_member(expr),
            ExprKind::OverloadedMemberRef { .. } => self.visit_overloaded_member_ref(expr),
            ExprKind::MemberRef { .. } => self.visit_member_ref(expr),
            ExprKind::ArchetypeMemberRef { .. } => self.visit_archetype_member_ref(expr),
            ExprKind::ExistentialMemberRef { .. } => {
                unreachable!("existential member reference is already type-checked")
            }
            ExprKind::DynamicMemberRef { .. } => self.visit_dynamic_member_ref(expr),
            ExprKind::TupleElement { .. } => Ok(self.simplify_expr_ty(expr)),
            ExprKind::Subscript { .. }
            | ExprKind::ArchetypeSubscript { .. }
            | ExprKind::ExistentialSubscript { .. }
            | ExprKind::DynamicSubscript { .. } => self.visit_subscript(expr),
            ExprKind::SuperRef => Ok(self.simplify_expr_ty(expr)),
            ExprKind::Metatype { .. } => self.visit_metatype(expr),
            ExprKind::DotSyntaxBaseIgnored { .. } => Ok(self.simplify_expr_ty(expr)),
            ExprKind::Specialize { .. } => Ok(expr),

            ExprKind::Paren(_) => {
                let mut expr = expr;
                let sub = variant!(&expr.kind, if ExprKind::Paren(sub));
                let sub_ty = sub.ty.clone();
                expr.ty = sub_ty;
                Ok(expr)
            }
            ExprKind::Tuple { .. } => Ok(self.simplify_expr_ty(expr)),
            ExprKind::Call { .. } => self.visit_apply(expr),
            ExprKind::Closure { .. } => {
                unreachable!("closures are handled by the walker directly")
            }
            ExprKind::ImplicitClosure { .. } => {
                unreachable!("implicit closures are already type-checked")
            }
            ExprKind::If { .. } => self.visit_if(expr),
            ExprKind::Assign { .. } => self.visit_assign(expr),
            ExprKind::DiscardAssignment => Ok(self.simplify_expr_ty(expr)),
            ExprKind::AddressOf { .. } => self.visit_address_of(expr),
            ExprKind::ForceValue { .. } => self.visit_force_value(expr),
            ExprKind::BindOptional { .. } => self.visit_bind_optional(expr),
            ExprKind::OptionalEvaluation { .. } => self.visit_optional_evaluation(expr),
            ExprKind::Is { .. } => self.visit_is(expr),
            ExprKind::ConditionalCheckedCast { .. } => self.visit_conditional_checked_cast(expr),
            ExprKind::NewArray { .. } => self.visit_new_array(expr),
            ExprKind::DefaultValue(_) => Ok(expr),
            ExprKind::ZeroValue => Ok(self.simplify_expr_ty(expr)),
            ExprKind::OpaqueValue => Ok(expr),

            ExprKind::Load { .. }
            | ExprKind::Requalify { .. }
            | ExprKind::Materialize { .. }
            | ExprKind::DerivedToBase { .. }
            | ExprKind::ArchetypeToSuper { .. }
            | ExprKind::Erasure { .. }
            | ExprKind::InjectIntoOptional { .. }
            | ExprKind::FunctionConversion { .. }
            | ExprKind::BridgeToBlock { .. }
            | ExprKind::MetatypeConversion { .. }
            | ExprKind::TupleShuffle { .. }
            | ExprKind::ScalarToTuple { .. } => {
                unreachable!("implicit conversions are already type-checked")
            }
        }
    }

    fn visit_unresolved_specialize(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let (sub, args) = match expr.kind {
            ExprKind::UnresolvedSpecialize { sub, args } => (sub, args),
            _ => unreachable!(),
        };
        let mut sub = sub;
        if let ExprKind::DeclRef { generic_args, specialized, .. } = &mut sub.kind {
            if generic_args.is_empty() {
                *generic_args = args;
                *specialized = true;
            }
        }
        Ok(sub)
    }

    fn visit_other_constructor_ref(&mut self, mut expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        if let ExprKind::OtherConstructorRef { decl } = &expr.kind {
            if let crate::ast::DeclKind::Constructor(ctor) = &self.tc.decl(*decl).kind {
                expr.ty = ctor.initializer_ty.clone();
            }
        }
        Ok(expr)
    }

    fn visit_metatype(&mut self, mut expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        if let ExprKind::Metatype { base: Some(_), .. } = &expr.kind {
            let base = match &mut expr.kind {
                ExprKind::Metatype { base, .. } => base.take().unwrap(),
                _ => unreachable!(),
            };
            let base = self.tc.coerce_to_rvalue(base);
            expr.ty = Ty::metatype(base.ty.clone());
            if let ExprKind::Metatype { base: slot, .. } = &mut expr.kind {
                *slot = Some(base);
            }
            return Ok(expr);
        }
        Ok(expr)
    }

    fn visit_if(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let result_ty = self.simplify_ty(&expr.ty);
        expr.ty = result_ty.clone();
        let anchor = expr.id;

        let (then_expr, else_expr) = match &mut expr.kind {
            ExprKind::If {
                then_expr,
                else_expr,
                ..
            } => (
                std::mem::replace(then_expr, Box::new(error_expr())),
                std::mem::replace(else_expr, Box::new(error_expr())),
            ),
            _ => unreachable!(),
        };

        let then_expr =
            self.coerce_to_type(then_expr, &result_ty, &Locator::new(anchor).with(PathElt::IfThen))?;
        let else_expr =
            self.coerce_to_type(else_expr, &result_ty, &Locator::new(anchor).with(PathElt::IfElse))?;

        if let ExprKind::If {
            then_expr: t,
            else_expr: e,
            ..
        } = &mut expr.kind
        {
            *t = then_expr;
            *e = else_expr;
        }
        Ok(expr)
    }

    pub(crate) fn visit_assign(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let (dest_ty, src_anchor) = match &expr.kind {
            ExprKind::Assign { dest, src } => (self.compute_assign_dest_ty(dest), src.id),
            _ => unreachable!(),
        };
        let dest_ty = dest_ty?;

        let src = match &mut expr.kind {
            ExprKind::Assign { src, .. } => std::mem::replace(src, Box::new(error_expr())),
            _ => unreachable!(),
        };

        let assign_locator = Locator::new(src_anchor).with(PathElt::AssignSource);
        let src = self.coerce_to_type(src, &dest_ty, &assign_locator)?;

        if let ExprKind::Assign { src: slot, .. } = &mut expr.kind {
            *slot = src;
        }
        Ok(expr)
    }

    /// The type the source of an assignment must be converted to.
    fn compute_assign_dest_ty(&self, dest: &Expr) -> AsterResult<Ty> {
        match &dest.kind {
            ExprKind::DiscardAssignment => Ok(self.simplify_ty(&dest.ty)),
            _ => match &dest.ty {
                Ty::LValue(object, _) => Ok((**object).clone()),
                ty => Err(crate::errors::AsterError::new(
                    crate::errors::AsterErrorKind::Type,
                    format!("cannot assign to a value of type {}", ty),
                    dest.src.clone(),
                )),
            },
        }
    }

    fn visit_address_of(&mut self, mut expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let (object, quals) = match &expr.kind {
            ExprKind::AddressOf { sub } => match &sub.ty {
                Ty::LValue(object, quals) => {
                    assert!(quals.is_settable(), "address-of a non-settable lvalue?");
                    ((**object).clone(), *quals)
                }
                _ => panic!("subexpression of address-of is not an lvalue"),
            },
            _ => unreachable!(),
        };
        expr.ty = Ty::lvalue(object, quals.without_implicit());
        Ok(expr)
    }

    fn visit_optional_evaluation(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let opt_ty = self.simplify_ty(&expr.ty);
        let anchor = expr.id;
        let sub = match &mut expr.kind {
            ExprKind::OptionalEvaluation { sub } => {
                std::mem::replace(sub, Box::new(error_expr()))
            }
            _ => unreachable!(),
        };
        let sub = self.coerce_to_type(sub, &opt_ty, &Locator::new(anchor))?;
        if let ExprKind::OptionalEvaluation { sub: slot } = &mut expr.kind {
            *slot = sub;
        }
        expr.ty = opt_ty;
        Ok(expr)
    }

    fn visit_force_value(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let value_ty = self.simplify_ty(&expr.ty);
        let opt_ty = Ty::optional(value_ty.clone());
        let anchor = expr.id;

        let sub = match &mut expr.kind {
            ExprKind::ForceValue { sub } => std::mem::replace(sub, Box::new(error_expr())),
            _ => unreachable!(),
        };

        let sub = if self.is_dynamic_lookup_ty(&sub.ty) {
            // Dynamic lookup: introduce a conditional cast down to the value
            // type, producing an optional.
            let sub = self.tc.coerce_to_rvalue(sub);
            let is_archetype = value_ty.is_archetype();
            let src = sub.src.clone();
            let cast = Expr::implicit(
                ExprKind::ConditionalCheckedCast {
                    sub,
                    cast_ty: value_ty.clone(),
                    cast_kind: Some(if is_archetype {
                        CheckedCastKind::ExistentialToArchetype
                    } else {
                        CheckedCastKind::ExistentialToConcrete
                    }),
                },
                opt_ty.clone(),
                src,
            );
            cast
        } else {
            let sub_rvalue_ty = sub.ty.rvalue_ty().clone();
            let sub = self.coerce_to_type(sub, &opt_ty, &Locator::new(anchor))?;
            if matches!(sub.kind, ExprKind::InjectIntoOptional { .. }) {
                self.tc.diags.warn(
                    format!(
                        "forcing a value of non-optional type {}; the operand is never nil",
                        sub_rvalue_ty
                    ),
                    sub.src.clone(),
                );
            }
            sub
        };

        if let ExprKind::ForceValue { sub: slot } = &mut expr.kind {
            *slot = sub;
        }
        expr.ty = value_ty;
        Ok(expr)
    }

    fn visit_bind_optional(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let value_ty = self.simplify_ty(&expr.ty);
        let opt_ty = self.tc.get_optional_type(&expr.src, value_ty.clone())?;
        let anchor = expr.id;

        let sub = match &mut expr.kind {
            ExprKind::BindOptional { sub } => std::mem::replace(sub, Box::new(error_expr())),
            _ => unreachable!(),
        };

        let sub_rvalue_ty = sub.ty.rvalue_ty().clone();
        let sub = self.coerce_to_type(sub, &opt_ty, &Locator::new(anchor))?;
        if matches!(sub.kind, ExprKind::InjectIntoOptional { .. }) {
            self.tc.diags.warn(
                format!(
                    "binding a value of non-optional type {}; the operand is never nil",
                    sub_rvalue_ty
                ),
                sub.src.clone(),
            );
        }

        if let ExprKind::BindOptional { sub: slot } = &mut expr.kind {
            *slot = sub;
        }
        expr.ty = value_ty;
        Ok(expr)
    }

    /// Whether this is the dynamic-lookup existential or an implicit lvalue
    /// of it.
    fn is_dynamic_lookup_ty(&self, ty: &Ty) -> bool {
        let ty = match ty {
            Ty::LValue(object, quals) => {
                if !quals.implicit {
                    return false;
                }
                object
            }
            ty => ty,
        };
        match ty {
            Ty::Protocol(decl) => self
                .tc
                .ctx
                .is_known_protocol(*decl, KnownProtocolKind::DynamicLookup),
            _ => false,
        }
    }

    fn visit_is(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        if self.tc.ctx.stdlib.bool_decl.is_none() {
            self.tc
                .diags
                .error("logic-value intrinsics are not available", expr.src.clone());
            // Continue anyway.
        }

        let kind = self.check_checked_cast(&mut expr)?;
        match kind {
            CheckedCastKind::Unresolved => {
                return Err(crate::errors::AsterError::new(
                    crate::errors::AsterErrorKind::Type,
                    "invalid type check",
                    expr.src.clone(),
                ))
            }
            CheckedCastKind::InvalidCoercible => {
                let (sub_ty, cast_ty) = match &expr.kind {
                    ExprKind::Is { sub, cast_ty, .. } => (sub.ty.clone(), cast_ty.clone()),
                    _ => unreachable!(),
                };
                self.tc.diags.warn(
                    format!("checking a value of type {} against {} always succeeds", sub_ty, cast_ty),
                    expr.src.clone(),
                );
            }
            _ => {
                if let ExprKind::Is { cast_kind, .. } = &mut expr.kind {
                    *cast_kind = Some(kind);
                }
            }
        }
        expr.ty = self.simplify_ty(&expr.ty);
        Ok(expr)
    }

    fn visit_conditional_checked_cast(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let cast_ty = match &expr.kind {
            ExprKind::ConditionalCheckedCast { cast_ty, .. } => cast_ty.clone(),
            _ => unreachable!(),
        };
        expr.ty = self.tc.get_optional_type(&expr.src, cast_ty.clone())?;

        let kind = self.check_checked_cast(&mut expr)?;
        match kind {
            CheckedCastKind::Unresolved => {
                return Err(crate::errors::AsterError::new(
                    crate::errors::AsterErrorKind::Type,
                    "invalid conditional cast",
                    expr.src.clone(),
                ))
            }
            CheckedCastKind::InvalidCoercible => {
                let (sub, implicit, src) = match expr.kind {
                    ExprKind::ConditionalCheckedCast { sub, .. } => {
                        (sub, expr.implicit, expr.src.clone())
                    }
                    _ => unreachable!(),
                };
                if !implicit {
                    self.tc.diags.warn(
                        format!(
                            "conditional cast from {} to its supertype {} always succeeds",
                            sub.ty, cast_ty
                        ),
                        src,
                    );
                }

                // The cast is really a coercion; wrap it in an optional
                // injection to preserve the expected optional type.
                if self.tc.ctx.tys_equal(&sub.ty, &cast_ty) {
                    return Ok(sub);
                }
                let anchor = sub.id;
                let coerced = self.coerce_to_type(sub, &cast_ty, &Locator::new(anchor))?;
                let src = coerced.src.clone();
                return Ok(Expr::implicit(
                    ExprKind::InjectIntoOptional { sub: coerced },
                    Ty::optional(cast_ty),
                    src,
                ));
            }
            _ => {
                if let ExprKind::ConditionalCheckedCast { cast_kind, .. } = &mut expr.kind {
                    *cast_kind = Some(kind);
                }
            }
        }
        Ok(expr)
    }

    /// Classify a checked cast node. The subexpression was type-checked
    /// separately; it only needs an rvalue conversion here.
    fn check_checked_cast(&mut self, expr: &mut Expr) -> AsterResult<CheckedCastKind> {
        let loc = expr.src.clone();
        let (sub_slot, cast_ty) = match &mut expr.kind {
            ExprKind::Is { sub, cast_ty, .. }
            | ExprKind::ConditionalCheckedCast { sub, cast_ty, .. } => (sub, cast_ty.clone()),
            _ => unreachable!(),
        };
        let sub = std::mem::replace(sub_slot, Box::new(error_expr()));
        let sub = self.tc.coerce_to_rvalue(sub);
        let from_ty = sub.ty.clone();
        *sub_slot = sub;
        Ok(self.tc.type_check_checked_cast(&from_ty, &cast_ty, &loc))
    }

    /// Emit the partial-application diagnostics for any value-type method
    /// that was never fully applied.
    pub fn finalize(&self) {
        for (_, (_, src)) in self.value_type_member_applications.iter() {
            self.tc.diags.error(
                "partial application of a method on a value type is not allowed",
                src.clone(),
            );
        }
    }
}

impl TypeChecker {
    /// Apply a solution to an expression, producing a fully type-checked
    /// expression.
    pub fn apply_solution(&self, solution: &Solution, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut rewriter = ExprRewriter::new(self, solution);
        let result = {
            let mut walker = ExprWalker::new(&mut rewriter);
            walker.walk(expr)?
        };
        rewriter.finalize();
        Ok(result)
    }

    /// Rewrite only the given node, without walking its children.
    pub fn apply_solution_shallow(
        &self,
        solution: &Solution,
        expr: Box<Expr>,
    ) -> AsterResult<Box<Expr>> {
        let mut rewriter = ExprRewriter::new(self, solution);
        rewriter.visit(expr)
    }

    /// A narrow stand-in for full expression checking, sufficient for the
    /// expressions the rewriter synthesizes: literals are converted to the
    /// context type, anything else is coerced to it.
    pub fn type_check_expression(
        &self,
        mut expr: Box<Expr>,
        context_ty: Option<&Ty>,
    ) -> AsterResult<Box<Expr>> {
        let empty = Solution::new();
        let mut rewriter = ExprRewriter::new(self, &empty);
        match (&expr.kind, context_ty) {
            (
                ExprKind::IntegerLiteral(_)
                | ExprKind::FloatLiteral(_)
                | ExprKind::StringLiteral(_)
                | ExprKind::CharacterLiteral(_)
                | ExprKind::MagicIdentifierLiteral(_),
                Some(ty),
            ) => {
                expr.ty = ty.clone();
                rewriter.visit(expr)
            }
            (_, Some(ty)) => {
                let anchor = expr.id;
                rewriter.coerce_to_type(expr, ty, &Locator::new(anchor))
            }
            (_, None) => Ok(expr),
        }
    }
}

impl Solution {
    /// Coerce an expression to the given type, as recorded by this solution.
    pub fn coerce_to_type(
        &self,
        tc: &TypeChecker,
        expr: Box<Expr>,
        to_ty: &Ty,
        locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        let mut rewriter = ExprRewriter::new(tc, self);
        rewriter.coerce_to_type(expr, to_ty, locator)
    }
}

pub(crate) fn error_expr() -> Expr {
    Expr {
        id: 0,
        kind: ExprKind::Error,
        ty: Ty::unit(),
        src: Source::default(),
        implicit: true,
    }
}

/// Visit each direct child of an expression.
pub fn for_each_child(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    match &expr.kind {
        ExprKind::Error
        | ExprKind::IntegerLiteral(_)
        | ExprKind::FloatLiteral(_)
        | ExprKind::StringLiteral(_)
        | ExprKind::CharacterLiteral(_)
        | ExprKind::MagicIdentifierLiteral(_)
        | ExprKind::DeclRef { .. }
        | ExprKind::OverloadedDeclRef { .. }
        | ExprKind::OtherConstructorRef { .. }
        | ExprKind::UnresolvedMember { .. }
        | ExprKind::SuperRef
        | ExprKind::DiscardAssignment
        | ExprKind::ZeroValue
        | ExprKind::OpaqueValue => {}

        ExprKind::InterpolatedStringLiteral { segments, semantic } => {
            segments.iter().for_each(|s| f(s));
            if let Some(semantic) = semantic {
                f(semantic);
            }
        }
        ExprKind::ArrayLiteral { sub, semantic } | ExprKind::DictionaryLiteral { sub, semantic } => {
            f(sub);
            if let Some(semantic) = semantic {
                f(semantic);
            }
        }
        ExprKind::UnresolvedSpecialize { sub, .. }
        | ExprKind::UnresolvedConstructor { sub }
        | ExprKind::Paren(sub)
        | ExprKind::AddressOf { sub }
        | ExprKind::ForceValue { sub }
        | ExprKind::BindOptional { sub }
        | ExprKind::OptionalEvaluation { sub }
        | ExprKind::Is { sub, .. }
        | ExprKind::ConditionalCheckedCast { sub, .. }
        | ExprKind::DefaultValue(sub)
        | ExprKind::Load { sub }
        | ExprKind::Requalify { sub, .. }
        | ExprKind::Materialize { sub }
        | ExprKind::DerivedToBase { sub }
        | ExprKind::ArchetypeToSuper { sub }
        | ExprKind::Erasure { sub, .. }
        | ExprKind::InjectIntoOptional { sub }
        | ExprKind::FunctionConversion { sub }
        | ExprKind::BridgeToBlock { sub }
        | ExprKind::MetatypeConversion { sub }
        | ExprKind::Specialize { sub, .. } => f(sub),

        ExprKind::TupleShuffle {
            sub,
            caller_defaults,
            injection_fn,
            ..
        } => {
            f(sub);
            caller_defaults.iter().for_each(|d| f(d));
            if let Some(injection_fn) = injection_fn {
                f(injection_fn);
            }
        }
        ExprKind::ScalarToTuple {
            sub,
            elements,
            injection_fn,
        } => {
            f(sub);
            for element in elements {
                if let crate::ast::ScalarToTupleElt::CallerDefault(d) = element {
                    f(d);
                }
            }
            if let Some(injection_fn) = injection_fn {
                f(injection_fn);
            }
        }

        ExprKind::UnresolvedDot { base, .. } | ExprKind::OverloadedMemberRef { base, .. } => {
            f(base)
        }
        ExprKind::MemberRef { base, .. }
        | ExprKind::ArchetypeMemberRef { base, .. }
        | ExprKind::ExistentialMemberRef { base, .. }
        | ExprKind::DynamicMemberRef { base, .. }
        | ExprKind::TupleElement { base, .. } => f(base),
        ExprKind::Subscript { base, index, .. }
        | ExprKind::ArchetypeSubscript { base, index, .. }
        | ExprKind::ExistentialSubscript { base, index, .. }
        | ExprKind::DynamicSubscript { base, index, .. } => {
            f(base);
            f(index);
        }
        ExprKind::Metatype { base, .. } => {
            if let Some(base) = base {
                f(base);
            }
        }
        ExprKind::DotSyntaxBaseIgnored { base, rhs } => {
            f(base);
            f(rhs);
        }
        ExprKind::Tuple { elements, .. } => elements.iter().for_each(|e| f(e)),
        ExprKind::Call { callee, arg, .. } => {
            f(callee);
            f(arg);
        }
        ExprKind::Closure { body, .. } => {
            if let crate::ast::ClosureBody::Single(body) = body {
                f(body);
            }
        }
        ExprKind::ImplicitClosure { body, .. } => f(body),
        ExprKind::If {
            cond,
            then_expr,
            else_expr,
        } => {
            f(cond);
            f(then_expr);
            f(else_expr);
        }
        ExprKind::Assign { dest, src } => {
            f(dest);
            f(src);
        }
        ExprKind::NewArray {
            bounds,
            injection_fn,
            construction_fn,
            ..
        } => {
            for bound in bounds {
                if let Some(value) = &bound.value {
                    f(value);
                }
            }
            if let Some(injection_fn) = injection_fn {
                f(injection_fn);
            }
            if let Some(construction_fn) = construction_fn {
                f(construction_fn);
            }
        }
    }
}

/// Find the declaration that owns the default arguments for the tuple a
/// locator points into. The constraint generator attaches owners directly
/// to the solution; the locator walk remains as a fallback.
pub(crate) fn find_default_args_owner(
    solution: &Solution,
    locator: &Locator,
) -> Option<DeclId> {
    if let Some(&owner) = solution.default_arg_owners.get(locator) {
        return Some(owner);
    }

    if locator.last() != Some(PathElt::ApplyArgument) {
        return None;
    }
    let parent = locator.parent()?;

    // Interpolation arguments dig out the constructor instead.
    let fn_locator = if parent.path.len() == 1
        && matches!(parent.path[0], PathElt::InterpolationArgument(_))
    {
        parent.with(PathElt::ConstructorMember)
    } else {
        parent.with(PathElt::ApplyFunction)
    };

    if let Some((choice, _)) = solution.overload_choice_if_available(&fn_locator) {
        return choice.decl();
    }

    // Simplification may leave the anchor pointing at the function itself.
    let anchor = Locator::new(locator.anchor);
    solution
        .overload_choice_if_available(&anchor)
        .and_then(|(choice, _)| choice.decl())
}
