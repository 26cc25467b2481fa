use crate::ast::{CallKind, DeclId, Expr, ExprKind, NewArrayBound};
use crate::errors::{AsterError, AsterErrorKind, AsterResult};
use crate::typing::apply::ExprRewriter;
use crate::typing::context::{ConformanceSource, KnownProtocolKind};
use crate::typing::locator::{Locator, PathElt};
use crate::typing::solution::{OverloadChoice, Solution};
use crate::typing::ty::{Ty, TupleField};
use crate::typing::TypeChecker;

impl<'a> ExprRewriter<'a> {
    /// Finish a function application: coerce the function and argument,
    /// set the result type, and specialize or desugar as needed. Finishing
    /// a type-constructor call re-enters with the resolved constructor.
    pub(crate) fn finish_apply(
        &mut self,
        apply: Box<Expr>,
        opened_ty: Ty,
        locator: Locator,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let mut apply = apply;

        let (callee, arg, call_kind) = match apply.kind {
            ExprKind::Call {
                callee,
                arg,
                call_kind,
                ..
            } => (callee, arg, call_kind),
            _ => unreachable!("finishing a non-apply expression"),
        };

        // The function is always an rvalue.
        let callee = tc.coerce_to_rvalue(callee);
        let is_super = arg.is_super_ref();

        if let Ty::Func(fun) = callee.ty.clone() {
            // An ordinary function application: convert the argument to the
            // function's input type.
            let arg = if call_kind.is_self_apply() {
                self.coerce_object_argument_to_type(
                    arg,
                    &fun.input,
                    &Locator::new(apply.id),
                )?
            } else {
                self.coerce_to_type(arg, &fun.input, &locator.with(PathElt::ApplyArgument))?
            };

            apply.kind = ExprKind::Call {
                callee,
                arg,
                call_kind,
                is_super,
            };
            apply.ty = fun.result.clone();

            if let Ty::Poly(poly) = &apply.ty {
                let poly = (**poly).clone();
                return self.solution.specialize(tc, apply, &poly, &opened_ty);
            }

            tc.substitute_input_sugar_type_for_result(&mut apply);
            return Ok(apply);
        }

        // A type constructor.
        let instance_ty = callee
            .ty
            .as_metatype()
            .unwrap_or_else(|| panic!("cannot finish applying {}", callee.ty))
            .clone();

        // "Constructing" a tuple type is simply a conversion.
        if instance_ty.as_tuple().is_some() {
            return self.coerce_to_type(arg, &instance_ty, &locator);
        }

        assert!(
            instance_ty.nominal_decl().is_some() || instance_ty.is_archetype(),
            "constructing a non-nominal type"
        );
        let selected = self
            .solution
            .overload_choice_if_available(&locator.with(PathElt::ConstructorMember))
            .cloned();

        // Without a constructor choice, or with the identity choice, the
        // call is a coercion.
        let (choice, ctor_opened_ty) = match selected {
            None => return self.coerce_to_type(arg, &instance_ty, &locator),
            Some((OverloadChoice::IdentityFunction, _)) => {
                return self.coerce_to_type(arg, &instance_ty, &locator)
            }
            Some(selected) => selected,
        };
        let ctor = choice.decl().expect("constructor choice without declaration");

        // The constructor reference is implicit; the call keeps the
        // apply's own implicitness.
        let apply_implicit = apply.implicit;
        let callee_loc = callee.src.clone();
        let mut decl_ref =
            self.build_member_ref(callee, ctor, &callee_loc, ctor_opened_ty, &locator, true)?;
        decl_ref.implicit = apply_implicit;

        apply.kind = ExprKind::Call {
            callee: decl_ref,
            arg,
            call_kind,
            is_super,
        };

        // Tail-recurse to call the constructor itself.
        self.finish_apply(apply, opened_ty, locator)
    }

    pub(crate) fn visit_apply(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let opened_ty = expr.ty.clone();
        let locator = Locator::new(expr.id);

        // The callee of a tracked partial application, before finishing.
        let tracked_callee = match &expr.kind {
            ExprKind::Call { callee, .. } => {
                let id = callee.semantics_providing().id;
                self.value_type_member_applications
                    .contains_key(&id)
                    .then(|| id)
            }
            _ => None,
        };

        let result = self.finish_apply(expr, opened_ty, locator)?;

        // This application advanced a partial value-type application.
        if let Some(id) = tracked_callee {
            let (count, src) = self
                .value_type_member_applications
                .remove(&id)
                .expect("tracked application disappeared");
            assert!(count > 0);
            if count > 1 {
                self.value_type_member_applications
                    .insert(result.id, (count - 1, src));
            }
        }

        Ok(result)
    }

    /// Allocation of a new array: extract the element type, attach the
    /// injection function, and resolve the construction function.
    pub(crate) fn visit_new_array(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let mut expr = expr;

        let result_ty = self.simplify_ty(&expr.ty);
        let element_ty = tc
            .ctx
            .as_slice(&result_ty)
            .expect("new-array expression with a non-slice type");

        // Keep the result in slice-sugar form even if canonicalization
        // stripped it.
        let result_ty = match &result_ty {
            Ty::Slice(_) => result_ty.clone(),
            _ => tc.get_array_slice_type(&expr.src, element_ty.clone())?,
        };
        expr.ty = result_ty.clone();

        let bound_ty = match &expr.kind {
            ExprKind::NewArray { bounds, .. } => bounds
                .first()
                .and_then(|bound: &NewArrayBound| bound.value.as_ref())
                .map(|value| value.ty.clone())
                .unwrap_or(Ty::BuiltinInt(64)),
            _ => unreachable!(),
        };
        let injection = tc.build_array_injection_fn_ref(&result_ty, &bound_ty, &expr.src)?;

        let has_construction_fn = match &expr.kind {
            ExprKind::NewArray {
                construction_fn, ..
            } => construction_fn.is_some(),
            _ => unreachable!(),
        };

        let construction_fn = if has_construction_fn {
            // An explicit construction closure has IndexType -> ElementType
            // type; the index type is the default integer literal type.
            let int_proto = tc.get_protocol(&expr.src, KnownProtocolKind::IntegerLiteralConvertible)?;
            let int_ty = tc
                .get_default_ty(int_proto)
                .expect("no default integer literal type");
            let construction_ty = Ty::func(int_ty, element_ty.clone());

            let prev = match &mut expr.kind {
                ExprKind::NewArray {
                    construction_fn, ..
                } => construction_fn.take().unwrap(),
                _ => unreachable!(),
            };
            Some(tc.type_check_expression(prev, Some(&construction_ty))?)
        } else {
            // Form a partial application of the element's default
            // constructor.
            let (choice, _) = self
                .solution
                .overload_choice(&Locator::new(expr.id).with(PathElt::NewArrayElement))
                .clone();
            let ctor = choice.decl().expect("array element constructor missing");

            // Dig down to the innermost element type of a nested array.
            let mut base_element_ty = element_ty.clone();
            while let Some(inner) = tc.ctx.as_slice(&base_element_ty) {
                base_element_ty = inner;
            }

            let ctor_ref = tc.build_ref_expr(ctor, &expr.src, true);
            let ctor_result_ty = ctor_ref
                .ty
                .as_func()
                .map(|fun| fun.result.clone())
                .unwrap_or_else(Ty::unit);
            let meta = Expr::implicit(
                ExprKind::Metatype {
                    base: None,
                    has_type_repr: false,
                },
                Ty::metatype(base_element_ty),
                expr.src.clone(),
            );
            let apply = Expr::implicit(
                ExprKind::Call {
                    callee: ctor_ref,
                    arg: meta,
                    call_kind: CallKind::ConstructorRef,
                    is_super: false,
                },
                Ty::unit(),
                expr.src.clone(),
            );
            let apply_locator = Locator::new(apply.id);
            Some(self.finish_apply(apply, ctor_result_ty, apply_locator)?)
        };

        if let ExprKind::NewArray {
            injection_fn,
            construction_fn: slot,
            element_ty: elem_slot,
            ..
        } = &mut expr.kind
        {
            *injection_fn = Some(injection);
            *slot = construction_fn;
            *elem_slot = Some(element_ty);
        }
        Ok(expr)
    }

    /// Build and finish a call to a named protocol requirement against a
    /// concrete witness.
    pub(crate) fn call_witness(
        &mut self,
        base: Box<Expr>,
        proto: DeclId,
        _conformance: ConformanceSource,
        name: &str,
        arguments: Vec<Box<Expr>>,
        broken_msg: &str,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;

        // The witness is found on the instance type of a metatype base.
        let mut witness_ty = base.ty.clone();
        if let Some(instance) = witness_ty.as_metatype() {
            witness_ty = instance.clone();
        }
        let witness =
            tc.find_named_witness(witness_ty.rvalue_ty(), proto, name, broken_msg)?;

        // Form the call argument.
        let mut arguments = arguments;
        let arg = if arguments.len() == 1 {
            arguments.pop().unwrap()
        } else {
            let fields = arguments
                .iter()
                .map(|a| TupleField::new(a.ty.clone()))
                .collect::<Vec<_>>();
            let names = arguments.iter().map(|_| None).collect();
            let src = base.src.clone();
            Expr::implicit(
                ExprKind::Tuple {
                    elements: arguments.into_iter().map(|a| *a).collect(),
                    names,
                },
                Ty::tuple(fields),
                src,
            )
        };

        // Reference the witness as a member of the base.
        let unopened = tc.get_unopened_type_of_reference(witness);
        let opened_ty = match unopened.as_func() {
            Some(fun) => fun.result.clone(),
            None => unopened.clone(),
        };
        let base_loc = base.src.clone();
        let member_ref = self.build_member_ref(
            base,
            witness,
            &base_loc,
            opened_ty,
            &Locator::new(0),
            true,
        )?;

        // Call it.
        let member_ty = member_ref.ty.clone();
        let src = member_ref.src.clone();
        let apply = Expr::implicit(
            ExprKind::Call {
                callee: member_ref,
                arg,
                call_kind: CallKind::Plain,
                is_super: false,
            },
            Ty::unit(),
            src,
        );
        let apply_locator = Locator::new(apply.id);
        self.finish_apply(apply, member_ty, apply_locator)
    }
}

/// Convert an expression through a builtin protocol: call the general
/// requirement if the builtin member is absent, then call the builtin
/// member on the result.
fn convert_via_builtin_protocol(
    solution: &Solution,
    tc: &TypeChecker,
    expr: Box<Expr>,
    proto: DeclId,
    general_name: &str,
    builtin_name: &str,
    broken_protocol_msg: &str,
    broken_builtin_msg: &str,
) -> AsterResult<Box<Expr>> {
    let mut rewriter = ExprRewriter::new(tc, solution);
    let mut expr = expr;

    // Without the builtin member, call the general requirement through the
    // witness table first.
    let mut witnesses = tc.lookup_member(expr.ty.rvalue_ty(), builtin_name);
    if witnesses.is_empty() {
        let witness =
            tc.find_named_witness(expr.ty.rvalue_ty(), proto, general_name, broken_protocol_msg)?;

        let unopened = tc.get_unopened_type_of_reference(witness);
        let opened_ty = match unopened.as_func() {
            Some(fun) => fun.result.clone(),
            None => unopened.clone(),
        };
        let src = expr.src.clone();
        let member_ref =
            rewriter.build_member_ref(expr, witness, &src, opened_ty.clone(), &Locator::new(0), true)?;

        let arg = Expr::implicit(
            ExprKind::Tuple {
                elements: vec![],
                names: vec![],
            },
            Ty::unit(),
            src.clone(),
        );
        let apply = Expr::implicit(
            ExprKind::Call {
                callee: member_ref,
                arg,
                call_kind: CallKind::Plain,
                is_super: false,
            },
            Ty::unit(),
            src,
        );
        let apply_locator = Locator::new(apply.id);
        expr = rewriter.finish_apply(apply, opened_ty, apply_locator)?;

        // The result must now expose the builtin member.
        witnesses = tc.lookup_member(expr.ty.rvalue_ty(), builtin_name);
        if witnesses.is_empty() {
            let loc = tc.decl(proto).loc.clone();
            tc.diags.error(broken_protocol_msg, loc.clone());
            return Err(AsterError::new(
                AsterErrorKind::BrokenProtocol,
                broken_protocol_msg,
                loc,
            ));
        }
    }

    if witnesses.len() != 1 || !tc.decl(witnesses[0]).is_func() {
        let loc = tc.decl(proto).loc.clone();
        tc.diags.error(broken_builtin_msg, loc.clone());
        return Err(AsterError::new(
            AsterErrorKind::BrokenProtocol,
            broken_builtin_msg,
            loc,
        ));
    }
    let builtin_method = witnesses[0];

    // Call the builtin method with no arguments.
    let unopened = tc.get_unopened_type_of_reference(builtin_method);
    let opened_ty = match unopened.as_func() {
        Some(fun) => fun.result.clone(),
        None => unopened.clone(),
    };
    let src = expr.src.clone();
    let member_ref =
        rewriter.build_member_ref(expr, builtin_method, &src, opened_ty.clone(), &Locator::new(0), true)?;
    let arg = Expr::implicit(
        ExprKind::Tuple {
            elements: vec![],
            names: vec![],
        },
        Ty::unit(),
        src.clone(),
    );
    let apply = Expr::implicit(
        ExprKind::Call {
            callee: member_ref,
            arg,
            call_kind: CallKind::Plain,
            is_super: false,
        },
        Ty::unit(),
        src,
    );
    let apply_locator = Locator::new(apply.id);
    rewriter.finish_apply(apply, opened_ty, apply_locator)
}

impl Solution {
    /// Convert an expression to a builtin 1-bit logic value via the
    /// LogicValue protocol.
    pub fn convert_to_logic_value(
        &self,
        tc: &TypeChecker,
        expr: Box<Expr>,
        _locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        // Already a builtin logic value.
        if expr.ty.rvalue_ty().is_builtin_int(1) {
            return Ok(tc.coerce_to_rvalue(expr));
        }

        let loc = expr.src.clone();
        let proto = tc.get_protocol(&loc, KnownProtocolKind::LogicValue)?;
        let result = convert_via_builtin_protocol(
            self,
            tc,
            expr,
            proto,
            "getLogicValue",
            "_getBuiltinLogicValue",
            "broken LogicValue protocol",
            "broken builtin logic value",
        )?;

        if !result.ty.rvalue_ty().is_builtin_int(1) {
            let msg = "broken builtin logic value";
            tc.diags.error(msg, loc.clone());
            return Err(AsterError::new(AsterErrorKind::BrokenProtocol, msg, loc));
        }
        Ok(result)
    }

    /// Convert an expression to a builtin integer array bound via the
    /// ArrayBound protocol.
    pub fn convert_to_array_bound(
        &self,
        tc: &TypeChecker,
        expr: Box<Expr>,
        _locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        // Already a builtin integer.
        if expr.ty.rvalue_ty().is_any_builtin_int() {
            return Ok(tc.coerce_to_rvalue(expr));
        }

        let loc = expr.src.clone();
        let proto = tc.get_protocol(&loc, KnownProtocolKind::ArrayBound)?;
        let result = convert_via_builtin_protocol(
            self,
            tc,
            expr,
            proto,
            "getArrayBoundValue",
            "_getBuiltinArrayBoundValue",
            "broken ArrayBound protocol",
            "broken builtin array bound",
        )?;

        if !result.ty.rvalue_ty().is_any_builtin_int() {
            let msg = "broken builtin array bound";
            tc.diags.error(msg, loc.clone());
            return Err(AsterError::new(AsterErrorKind::BrokenProtocol, msg, loc));
        }
        Ok(result)
    }

    /// The solution's score: user-defined conversions are penalized, and
    /// literal bindings at their protocol's default type are rewarded.
    /// Cached on first call.
    pub fn fixed_score(&self, tc: &TypeChecker) -> i64 {
        if let Some(score) = self.cached_score() {
            return score;
        }

        let mut score = 0;

        for (choice, _) in self.overload_choices.values() {
            let decl = match choice {
                OverloadChoice::Decl(decl) => *decl,
                _ => continue,
            };
            if tc.decl(decl).attrs.conversion {
                score -= 2;
            }
        }

        for (&tv, bound_ty) in self.type_bindings.iter() {
            let info = tc.ctx.tyvar_info(tv);

            // Only variables anchored directly at a literal expression
            // count.
            match &info.locator {
                Some(locator) if locator.path.is_empty() => {}
                _ => continue,
            }
            let literal_kind = match info.literal_anchor {
                Some(kind) => kind,
                None => continue,
            };
            let proto = match tc.ctx.known_protocol(literal_kind) {
                Some(proto) => proto,
                None => continue,
            };
            let default_ty = match tc.get_default_ty(proto) {
                Some(ty) => ty,
                None => continue,
            };

            // Literal types are nominal, so comparing the nominal
            // declaration covers sugared spellings.
            if default_ty.nominal_decl().is_some()
                && default_ty.nominal_decl() == bound_ty.nominal_decl()
            {
                score += 1;
            }
        }

        self.cache_score(score);
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::apply::fixtures::TestWorld;

    #[test]
    fn test_finish_apply_coerces_argument_and_sets_result() {
        let mut world = TestWorld::new();
        let f = world.int_to_int_fn();
        let tc = world.tc();
        let callee = tc.build_checked_ref_expr(f, &Default::default(), false);
        let arg = world.typed_expr(world.int32());
        let apply = Expr::new(
            ExprKind::Call {
                callee,
                arg,
                call_kind: CallKind::Plain,
                is_super: false,
            },
            Ty::unit(),
            Default::default(),
        );

        let solution = Solution::new();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let opened = Ty::unit();
        let locator = Locator::new(apply.id);
        let result = rewriter.finish_apply(apply, opened, locator).unwrap();
        assert_eq!(result.ty, world.int32());
    }

    #[test]
    fn test_finish_apply_metatype_without_ctor_is_coercion() {
        // Constructing a tuple type, or a type with the identity
        // constructor, is just a conversion of the argument.
        let world = TestWorld::new();
        let callee = world.typed_expr(Ty::metatype(Ty::tuple(vec![
            TupleField::new(world.int32()),
        ])));
        let arg = world.typed_expr(world.int32());
        let apply = Expr::new(
            ExprKind::Call {
                callee,
                arg,
                call_kind: CallKind::Plain,
                is_super: false,
            },
            Ty::unit(),
            Default::default(),
        );

        let solution = Solution::new();
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let locator = Locator::new(apply.id);
        let result = rewriter.finish_apply(apply, Ty::unit(), locator).unwrap();
        // Scalar-to-tuple conversion of the argument.
        assert!(matches!(result.kind, ExprKind::ScalarToTuple { .. }));
    }

    #[test]
    fn test_convert_to_logic_value_shortcuts_builtin() {
        let world = TestWorld::new();
        let expr = world.typed_expr(Ty::BuiltinInt(1));
        let id = expr.id;
        let solution = Solution::new();
        let result = solution
            .convert_to_logic_value(world.tc(), expr, &Locator::new(0))
            .unwrap();
        assert_eq!(result.id, id);
    }

    #[test]
    fn test_fixed_score_penalizes_conversions_and_rewards_defaults() {
        let mut world = TestWorld::new();
        let conversion = world.conversion_fn();
        let tv = world.literal_anchored_tyvar();

        let mut solution = Solution::new();
        solution.overload_choices.insert(
            Locator::new(1),
            (OverloadChoice::Decl(conversion), Ty::unit()),
        );
        solution.type_bindings.insert(tv, world.int32());
        world.set_integer_literal_default(world.int32());

        let score = solution.fixed_score(world.tc());
        assert_eq!(score, -2 + 1);
        // The score is cached.
        assert_eq!(solution.fixed_score(world.tc()), -1);
    }
}
