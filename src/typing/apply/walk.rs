use crate::ast::{ClosureBody, Expr, ExprKind};
use crate::errors::AsterResult;
use crate::typing::apply::{error_expr, DeclContext, ExprRewriter};
use crate::typing::locator::{Locator, PathElt};

/// Walks an expression tree, rewriting it bottom-up. A handful of node
/// kinds are handled before their children: their subtrees are either
/// already type-checked or need custom traversal order. Statements and
/// declarations are never traversed.
pub struct ExprWalker<'r, 'a> {
    rewriter: &'r mut ExprRewriter<'a>,
    left_side_of_assignment: u32,
}

impl<'r, 'a> ExprWalker<'r, 'a> {
    pub fn new(rewriter: &'r mut ExprRewriter<'a>) -> ExprWalker<'r, 'a> {
        ExprWalker {
            rewriter,
            left_side_of_assignment: 0,
        }
    }

    pub fn walk(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;

        match &expr.kind {
            // A new-array expression rewrites in place; its children were
            // already type-checked.
            ExprKind::NewArray { .. } => return self.rewriter.visit_new_array(expr),

            // Conditionals walk their branches manually; the condition was
            // checked separately.
            ExprKind::If { .. } => {
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
                let then_expr = self.walk(then_expr)?;
                let else_expr = self.walk(else_expr)?;
                if let ExprKind::If {
                    then_expr: t,
                    else_expr: e,
                    ..
                } = &mut expr.kind
                {
                    *t = then_expr;
                    *e = else_expr;
                }
                return self.rewriter.visit(expr);
            }

            // Checked casts had their subexpressions type-checked
            // separately; visit only the node.
            ExprKind::Is { .. } | ExprKind::ConditionalCheckedCast { .. } => {
                return self.rewriter.visit(expr)
            }

            // Default-value expressions are untouched.
            ExprKind::DefaultValue(_) => return Ok(expr),

            // Closures update their parameter types and have their bodies
            // checked within the closure's context.
            ExprKind::Closure { .. } => return self.walk_closure(expr),

            // A metatype with an explicit type representation is already
            // fully typed.
            ExprKind::Metatype {
                has_type_repr: true,
                ..
            } => return Ok(expr),

            // Assignments walk the destination with the left-side counter
            // raised, so discards can be verified to occur only there.
            ExprKind::Assign { .. } => {
                let (dest, src) = match &mut expr.kind {
                    ExprKind::Assign { dest, src } => (
                        std::mem::replace(dest, Box::new(error_expr())),
                        std::mem::replace(src, Box::new(error_expr())),
                    ),
                    _ => unreachable!(),
                };

                self.left_side_of_assignment += 1;
                let dest = self.walk(dest)?;
                self.left_side_of_assignment -= 1;

                let src = self.walk(src)?;

                if let ExprKind::Assign { dest: d, src: s } = &mut expr.kind {
                    *d = dest;
                    *s = src;
                }
                return self.rewriter.visit_assign(expr);
            }

            ExprKind::DiscardAssignment => {
                if self.left_side_of_assignment == 0 {
                    self.rewriter.tc.diags.error(
                        "'_' can only appear on the left side of an assignment",
                        expr.src.clone(),
                    );
                }
            }

            _ => {}
        }

        self.walk_children(&mut expr)?;
        self.rewriter.visit(expr)
    }

    fn walk_closure(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = self.rewriter.simplify_expr_ty(expr);
        let fun = expr
            .ty
            .as_func()
            .expect("closure does not have function type")
            .clone();

        // Re-coerce the parameter pattern, in case something was resolved.
        let closure_id = expr.id;
        if let ExprKind::Closure { pattern, .. } = &mut expr.kind {
            let mut taken = std::mem::replace(pattern, crate::ast::Pattern::Any);
            self.rewriter.coerce_pattern_to_type(&mut taken, &fun.input);
            *pattern = taken;
        }

        let single_body = match &mut expr.kind {
            ExprKind::Closure { body, .. } => match body {
                ClosureBody::Single(body) => {
                    Some(std::mem::replace(body, Box::new(error_expr())))
                }
                ClosureBody::Block => None,
            },
            _ => unreachable!(),
        };

        match single_body {
            Some(body) => {
                // Check the body within the closure's own context.
                let saved_dc = self.rewriter.dc;
                self.rewriter.dc = DeclContext::Closure(closure_id);
                let walked = self.walk(body);
                let coerced = walked.and_then(|body| {
                    self.rewriter.coerce_to_type(
                        body,
                        &fun.result,
                        &Locator::new(closure_id).with(PathElt::ClosureResult),
                    )
                });
                self.rewriter.dc = saved_dc;
                let body = coerced?;

                let mut captures = vec![];
                self.rewriter.tc.compute_captures(&body, &mut captures);
                if let ExprKind::Closure {
                    body: slot,
                    captures: cap_slot,
                    ..
                } = &mut expr.kind
                {
                    *slot = ClosureBody::Single(body);
                    *cap_slot = captures;
                }
            }
            None => {
                self.rewriter.tc.type_check_closure_body(&expr)?;
            }
        }

        Ok(expr)
    }

    /// Walk each direct child of the expression, replacing it with its
    /// rewritten form.
    fn walk_children(&mut self, expr: &mut Expr) -> AsterResult<()> {
        macro_rules! walk_slot {
            ($slot:expr) => {{
                let child = std::mem::replace($slot, Box::new(error_expr()));
                *$slot = self.walk(child)?;
            }};
        }
        macro_rules! walk_opt {
            ($slot:expr) => {{
                if let Some(slot) = $slot {
                    walk_slot!(slot);
                }
            }};
        }
        macro_rules! walk_vec {
            ($vec:expr) => {{
                for element in $vec.iter_mut() {
                    let child = Box::new(std::mem::replace(element, error_expr()));
                    *element = *self.walk(child)?;
                }
            }};
        }

        match &mut expr.kind {
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

            ExprKind::Metatype { base, .. } => walk_opt!(base),

            ExprKind::InterpolatedStringLiteral { segments, .. } => walk_vec!(segments),
            ExprKind::ArrayLiteral { sub, .. } | ExprKind::DictionaryLiteral { sub, .. } => {
                walk_slot!(sub)
            }

            ExprKind::UnresolvedSpecialize { sub, .. }
            | ExprKind::UnresolvedConstructor { sub }
            | ExprKind::Paren(sub)
            | ExprKind::AddressOf { sub }
            | ExprKind::ForceValue { sub }
            | ExprKind::BindOptional { sub }
            | ExprKind::OptionalEvaluation { sub }
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
            | ExprKind::Specialize { sub, .. }
            | ExprKind::TupleShuffle { sub, .. }
            | ExprKind::ScalarToTuple { sub, .. } => walk_slot!(sub),

            ExprKind::UnresolvedDot { base, .. }
            | ExprKind::OverloadedMemberRef { base, .. }
            | ExprKind::MemberRef { base, .. }
            | ExprKind::ArchetypeMemberRef { base, .. }
            | ExprKind::ExistentialMemberRef { base, .. }
            | ExprKind::DynamicMemberRef { base, .. }
            | ExprKind::TupleElement { base, .. } => walk_slot!(base),

            ExprKind::Subscript { base, index, .. }
            | ExprKind::ArchetypeSubscript { base, index, .. }
            | ExprKind::ExistentialSubscript { base, index, .. }
            | ExprKind::DynamicSubscript { base, index, .. } => {
                walk_slot!(base);
                walk_slot!(index);
            }

            ExprKind::DotSyntaxBaseIgnored { base, rhs } => {
                walk_slot!(base);
                walk_slot!(rhs);
            }

            ExprKind::Tuple { elements, .. } => walk_vec!(elements),

            ExprKind::Call { callee, arg, .. } => {
                walk_slot!(callee);
                walk_slot!(arg);
            }

            ExprKind::ImplicitClosure { body, .. } => walk_slot!(body),

            ExprKind::NewArray { bounds, .. } => {
                for bound in bounds.iter_mut() {
                    walk_opt!(&mut bound.value);
                }
            }

            // Handled in the pre-order hooks above.
            ExprKind::If { .. }
            | ExprKind::Assign { .. }
            | ExprKind::Closure { .. }
            | ExprKind::Is { .. }
            | ExprKind::ConditionalCheckedCast { .. }
            | ExprKind::DefaultValue(_) => unreachable!("handled before walking children"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CheckedCastKind;
    use crate::typing::apply::fixtures::TestWorld;
    use crate::typing::solution::Solution;
    use crate::typing::ty::{Quals, Ty};

    fn collect_tys(expr: &Expr, out: &mut Vec<Ty>) {
        out.push(expr.ty.clone());
        crate::typing::apply::for_each_child(expr, &mut |child| collect_tys(child, out));
    }

    #[test]
    fn test_assign_coerces_source_through_assign_locator() {
        // a = b with a : @lvalue Int32 and b : Int64 rewrites the source
        // to a conversion; the destination stays an lvalue.
        let mut world = TestWorld::new();
        world.register_int64_to_int32_conversion();

        let dest = world.lvalue_quals_expr(world.int32(), Quals::EXPLICIT);
        let src = world.typed_expr(world.int64());
        let src_id = src.id;
        let assign = Expr::new(
            ExprKind::Assign { dest, src },
            Ty::unit(),
            Default::default(),
        );

        let mut solution = Solution::new();
        world.record_int64_to_int32_choice(
            &mut solution,
            Locator::new(src_id).with(PathElt::AssignSource),
        );

        let tc = world.tc();
        let result = tc.apply_solution(&solution, assign).unwrap();
        match &result.kind {
            ExprKind::Assign { dest, src } => {
                assert!(dest.ty.is_lvalue());
                assert_eq!(src.ty, world.int32());
            }
            kind => panic!("expected an assignment, found {:?}", kind),
        }
    }

    #[test]
    fn test_discard_is_legal_only_left_of_assignment() {
        let world = TestWorld::new();

        // `_ = x` is accepted.
        let discard = Expr::new(
            ExprKind::DiscardAssignment,
            world.int32(),
            Default::default(),
        );
        let src = world.typed_expr(world.int32());
        let assign = Expr::new(
            ExprKind::Assign { dest: discard, src },
            Ty::unit(),
            Default::default(),
        );
        let solution = Solution::new();
        let tc = world.tc();
        tc.apply_solution(&solution, assign).unwrap();
        assert!(tc.diags.is_empty());

        // `_` anywhere else is diagnosed.
        let stray = Expr::new(
            ExprKind::DiscardAssignment,
            world.int32(),
            Default::default(),
        );
        tc.apply_solution(&solution, stray).unwrap();
        assert_eq!(tc.diags.len(), 1);
    }

    #[test]
    fn test_no_type_variables_remain_after_rewrite() {
        let mut world = TestWorld::new();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution.type_bindings.insert(tv, world.int32());

        let literal = world.int_literal("42", Ty::Var(tv));
        let condition = world.typed_expr(Ty::BuiltinInt(1));
        let other = world.int_literal("7", Ty::Var(tv));
        let if_expr = Expr::new(
            ExprKind::If {
                cond: condition,
                then_expr: literal,
                else_expr: other,
            },
            Ty::Var(tv),
            Default::default(),
        );

        let tc = world.tc();
        let result = tc.apply_solution(&solution, if_expr).unwrap();

        let mut tys = vec![];
        collect_tys(&result, &mut tys);
        for ty in tys {
            assert!(!ty.has_type_variable(), "type variable survived in {}", ty);
        }
    }

    #[test]
    fn test_conditional_cast_classification() {
        // x as? Dog where x : Animal (existential) classifies as
        // existential-to-concrete and produces an optional.
        let mut world = TestWorld::new();
        let animal = world.simple_protocol("Animal");
        let dog = world.class_decl("Dog");
        let x = world.typed_expr(Ty::Protocol(animal));

        let cast = Expr::new(
            ExprKind::ConditionalCheckedCast {
                sub: x,
                cast_ty: Ty::Nominal(dog),
                cast_kind: None,
            },
            Ty::Var(world.fresh_tyvar()),
            Default::default(),
        );

        let mut solution = Solution::new();
        let tv = match &cast.ty {
            Ty::Var(tv) => *tv,
            _ => unreachable!(),
        };
        solution
            .type_bindings
            .insert(tv, Ty::optional(Ty::Nominal(dog)));

        let tc = world.tc();
        let result = tc.apply_solution(&solution, cast).unwrap();
        match &result.kind {
            ExprKind::ConditionalCheckedCast { cast_kind, .. } => {
                assert_eq!(*cast_kind, Some(CheckedCastKind::ExistentialToConcrete));
            }
            kind => panic!("expected a conditional cast, found {:?}", kind),
        }
        assert_eq!(result.ty, Ty::optional(Ty::Nominal(dog)));
    }

    #[test]
    fn test_single_expression_closure_body_is_coerced() {
        let world = TestWorld::new();
        let body = world.typed_expr(world.int32());
        let closure = Expr::new(
            ExprKind::Closure {
                pattern: crate::ast::Pattern::Named {
                    name: str!("x"),
                    ty: Ty::unit(),
                },
                body: crate::ast::ClosureBody::Single(body),
                captures: vec![],
            },
            Ty::func(world.int32(), Ty::optional(world.int32())),
            Default::default(),
        );

        let solution = Solution::new();
        let tc = world.tc();
        let result = tc.apply_solution(&solution, closure).unwrap();
        match &result.kind {
            ExprKind::Closure { pattern, body, .. } => {
                // The parameter pattern picked up the input type.
                match pattern {
                    crate::ast::Pattern::Named { ty, .. } => assert_eq!(*ty, world.int32()),
                    pattern => panic!("unexpected pattern {:?}", pattern),
                }
                // The body was wrapped into the optional result type.
                match body {
                    crate::ast::ClosureBody::Single(body) => {
                        assert!(matches!(body.kind, ExprKind::InjectIntoOptional { .. }));
                    }
                    crate::ast::ClosureBody::Block => panic!("expected a single-expression body"),
                }
            }
            kind => panic!("expected a closure, found {:?}", kind),
        }
    }
}
