use crate::ast::{
    CallKind, ConcreteDeclRef, DeclContainer, DeclId, DeclKind, Expr, ExprKind,
};
use crate::errors::AsterResult;
use crate::span::Source;
use crate::typing::apply::substitute::subst_for_base_conversion;
use crate::typing::apply::{error_expr, ExprRewriter};
use crate::typing::locator::{Locator, PathElt};
use crate::typing::solution::OverloadChoice;
use crate::typing::subst::{ApplySubst, Subst};
use crate::typing::ty::Ty;

impl<'a> ExprRewriter<'a> {
    /// Construct a fully typed member access from a base expression and a
    /// selected declaration, dispatching on the kind of container the
    /// declaration lives in.
    pub(crate) fn build_member_ref(
        &mut self,
        base: Box<Expr>,
        member: DeclId,
        name_loc: &Source,
        opened_ty: Ty,
        locator: &Locator,
        implicit: bool,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;

        // The actual base type, and whether we have an instance of it or
        // its metatype.
        let mut base_ty = base.ty.rvalue_ty().clone();
        let mut base_is_instance = true;
        if let Some(instance) = base_ty.as_metatype() {
            base_is_instance = false;
            base_ty = instance.clone();
        }

        let container = tc.decl(member).container;
        let container_ty = tc.ctx.declared_ty_of_context(container);

        // A protocol requirement accessed through an archetype or
        // existential base.
        if matches!(container, DeclContainer::Protocol(_))
            && (base_ty.is_archetype() || base_ty.is_existential())
        {
            log::debug!("member ref: protocol requirement on {}", base_ty);
            let base = if base_is_instance {
                self.coerce_object_argument_to_type(
                    base,
                    &base_ty,
                    &locator.with(PathElt::MemberRefBase),
                )?
            } else {
                tc.coerce_to_rvalue(base)
            };

            let base_implicit = base.implicit;
            let kind = if base_ty.is_existential() {
                ExprKind::ExistentialMemberRef { base, member }
            } else {
                ExprKind::ArchetypeMemberRef { base, member }
            };
            let mut result = Expr::new(kind, Ty::unit(), name_loc.clone());
            result.implicit = implicit || base_implicit;

            // A polymorphic requirement needs its result specialized.
            if tc.decl(member).is_func() {
                if let Some(fun) = tc.decl(member).reference_ty().as_func() {
                    let mut result_ty = fun.result.clone();
                    if let Ty::Poly(poly) = &result_ty {
                        let poly = (**poly).clone();
                        if base_ty.is_archetype() {
                            // Substitute `self` through the requirement's
                            // signature.
                            let proto = match container {
                                DeclContainer::Protocol(proto) => proto,
                                _ => unreachable!(),
                            };
                            let self_archetype = match &tc.decl(proto).kind {
                                DeclKind::Protocol(p) => p.self_archetype,
                                _ => unreachable!(),
                            };
                            let subs = Subst::from_types(
                                std::iter::once(self_archetype),
                                std::iter::once(base_ty.clone()),
                            );
                            result_ty = result_ty.apply_subst(&subs);
                        }
                        result.ty = result_ty;
                        return self.solution.specialize(tc, result, &poly, &opened_ty);
                    }
                }
            }

            result.ty = self.simplify_ty(&opened_ty);
            return Ok(result);
        }

        // A member of an unspecialized generic owner.
        if let Some(container_ty) = &container_ty {
            if tc.ctx.is_unspecialized_generic(container_ty) {
                log::debug!("member ref: generic owner {}", container_ty);
                let mut other_tys = [
                    tc.get_unopened_type_of_reference(member),
                    tc.ctx
                        .declared_ty_in_context(container)
                        .expect("generic owner has no declared type"),
                ];
                let (subs, conformances, generic_params) = subst_for_base_conversion(
                    tc,
                    member,
                    &base_ty,
                    &mut other_tys,
                    name_loc,
                )?;
                let [subst_ty, container_ty] = other_tys;

                let base = if base_is_instance {
                    self.coerce_object_argument_to_type(
                        base,
                        &container_ty,
                        &locator.with(PathElt::MemberRefBase),
                    )?
                } else {
                    let base = self.coerce_to_type(
                        base,
                        &Ty::metatype(container_ty.clone()),
                        &locator.with(PathElt::MemberRefBase),
                    )?;
                    tc.coerce_to_rvalue(base)
                };

                let member_decl = tc.decl(member);
                if matches!(
                    member_decl.kind,
                    DeclKind::Func(_) | DeclKind::EnumElement(_) | DeclKind::Constructor(_)
                ) {
                    // Bind the reference to the underlying declaration,
                    // specialized with the types deduced from the object
                    // argument.
                    let reference = tc.build_checked_ref_expr(member, name_loc, implicit);
                    let specialized = tc.build_specialize_expr(
                        reference,
                        subst_ty,
                        &subs,
                        &conformances,
                    );

                    let is_ctor = matches!(member_decl.kind, DeclKind::Constructor(_));
                    if !is_ctor && !base_is_instance && member_decl.is_instance_member() {
                        let rhs_ty = specialized.ty.clone();
                        return Ok(Expr::new(
                            ExprKind::DotSyntaxBaseIgnored {
                                base,
                                rhs: specialized,
                            },
                            rhs_ty,
                            name_loc.clone(),
                        ));
                    }

                    assert!(
                        is_ctor || !base_is_instance || member_decl.is_instance_member(),
                        "cannot call a static method on an instance"
                    );
                    let call_kind = if is_ctor {
                        CallKind::ConstructorRef
                    } else {
                        CallKind::DotSyntaxSelf
                    };
                    let apply = Expr::new(
                        ExprKind::Call {
                            callee: specialized,
                            arg: base,
                            call_kind,
                            is_super: false,
                        },
                        Ty::unit(),
                        name_loc.clone(),
                    );
                    let apply_locator = Locator::new(apply.id);
                    return self.finish_apply(apply, opened_ty, apply_locator);
                }

                // A generic member reference carrying its encoded
                // substitutions.
                let encoded = tc.encode_substitutions(&generic_params, &subs, &conformances);
                let mut result = Expr::new(
                    ExprKind::MemberRef {
                        base,
                        member: ConcreteDeclRef {
                            decl: member,
                            substitutions: encoded,
                        },
                    },
                    subst_ty,
                    name_loc.clone(),
                );
                result.implicit = implicit;
                return Ok(result);
            }
        }

        // A variable member of a type.
        if matches!(tc.decl(member).kind, DeclKind::Var(_)) {
            assert!(base_is_instance, "can only access variables of an instance");
            let container_ty = container_ty.expect("variable member outside a type");
            let base =
                self.coerce_object_argument_to_type(base, &container_ty, locator)?;
            let mut result = Expr::new(
                ExprKind::MemberRef {
                    base,
                    member: member.into(),
                },
                self.simplify_ty(&opened_ty),
                name_loc.clone(),
            );
            result.implicit = implicit;
            return Ok(result);
        }

        // Everything else: build a reference to the declaration itself.
        let reference = tc.build_checked_ref_expr(member, name_loc, implicit);
        let member_decl = tc.decl(member);

        let binds_self = (member_decl.is_func() && container.is_type_context())
            || matches!(
                member_decl.kind,
                DeclKind::EnumElement(_) | DeclKind::Constructor(_)
            );
        if binds_self {
            if matches!(member_decl.kind, DeclKind::Constructor(_)) {
                let apply = Expr::new(
                    ExprKind::Call {
                        callee: reference,
                        arg: base,
                        call_kind: CallKind::ConstructorRef,
                        is_super: false,
                    },
                    Ty::unit(),
                    name_loc.clone(),
                );
                let apply_locator = Locator::new(apply.id);
                return self.finish_apply(apply, opened_ty, apply_locator);
            }

            if base_is_instance == member_decl.is_instance_member() {
                let apply = Expr::new(
                    ExprKind::Call {
                        callee: reference,
                        arg: base,
                        call_kind: CallKind::DotSyntaxSelf,
                        is_super: false,
                    },
                    Ty::unit(),
                    name_loc.clone(),
                );
                let apply_locator = Locator::new(apply.id);
                return self.finish_apply(apply, opened_ty, apply_locator);
            }

            assert!(
                !base_is_instance || member_decl.is_instance_member(),
                "cannot call a static method on an instance"
            );
        }

        // A reference where the base is evaluated and ignored.
        let rhs_ty = reference.ty.clone();
        let result = Expr::new(
            ExprKind::DotSyntaxBaseIgnored {
                base,
                rhs: reference,
            },
            rhs_ty,
            name_loc.clone(),
        );
        if let Some(poly) = result.ty.as_poly() {
            let poly = poly.clone();
            return self.solution.specialize(tc, result, &poly, &opened_ty);
        }
        Ok(result)
    }

    /// Build a member access resolved dynamically at runtime.
    pub(crate) fn build_dynamic_member_ref(
        &mut self,
        base: Box<Expr>,
        member: DeclId,
        name_loc: &Source,
        opened_ty: Ty,
        _locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;

        // If the member's result is polymorphic, attach the substitutions
        // deduced for it.
        let mut member_ref: ConcreteDeclRef = member.into();
        if tc.decl(member).is_func() {
            if let Some(fun) = tc.decl(member).reference_ty().as_func() {
                if let Some(poly) = fun.result.as_poly() {
                    let mut substitutions = vec![];
                    // The substituted type is intentionally unused here.
                    let poly = poly.clone();
                    self.solution.compute_substitutions(
                        tc,
                        &poly,
                        &opened_ty,
                        &mut substitutions,
                    )?;
                    member_ref.substitutions = substitutions;
                }
            }
        }

        let base = tc.coerce_to_rvalue(base);
        Ok(Expr::new(
            ExprKind::DynamicMemberRef {
                base,
                member: member_ref,
            },
            self.simplify_ty(&opened_ty),
            name_loc.clone(),
        ))
    }

    /// Build a fully typed subscript access.
    pub(crate) fn build_subscript(
        &mut self,
        base: Box<Expr>,
        index: Box<Expr>,
        src: &Source,
        locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&locator.with(PathElt::SubscriptMember))
            .clone();
        let subscript = choice.decl().expect("subscript choice without declaration");

        let base_ty = base.ty.rvalue_ty().clone();
        let container = tc.decl(subscript).container;
        let container_ty = tc.ctx.declared_ty_of_context(container);

        let subscript_ty = self.simplify_ty(&opened_ty);
        let fun = subscript_ty
            .as_func()
            .expect("subscript does not have function type")
            .clone();
        let index_ty = fun.input.clone();
        let result_ty = fun.result.rvalue_ty().clone();

        let index = self.coerce_to_type(index, &index_ty, &locator.with(PathElt::SubscriptIndex))?;

        // Dynamic lookup.
        if matches!(choice, OverloadChoice::DeclViaDynamic(_)) {
            let base = self.coerce_object_argument_to_type(base, &base_ty, locator)?;
            return Ok(Expr::new(
                ExprKind::DynamicSubscript {
                    base,
                    index,
                    subscript,
                },
                result_ty,
                src.clone(),
            ));
        }

        // Subscripting an archetype through a protocol requirement.
        if base_ty.is_archetype() && matches!(container, DeclContainer::Protocol(_)) {
            let base = self.coerce_object_argument_to_type(base, &base_ty, locator)?;
            return Ok(Expr::new(
                ExprKind::ArchetypeSubscript {
                    base,
                    index,
                    subscript,
                },
                result_ty,
                src.clone(),
            ));
        }

        // The remaining subscript kinds produce lvalues.
        let result_ty = tc.member_access_lvalue(result_ty);

        // Subscripting a generic type.
        if let Some(container_ty) = &container_ty {
            if tc.ctx.is_unspecialized_generic(container_ty) {
                let mut other_tys = [tc
                    .ctx
                    .declared_ty_in_context(container)
                    .expect("generic owner has no declared type")];
                let (subs, conformances, generic_params) = subst_for_base_conversion(
                    tc,
                    subscript,
                    &base_ty,
                    &mut other_tys,
                    &index.src,
                )?;
                let [container_ty] = other_tys;

                let base =
                    self.coerce_object_argument_to_type(base, &container_ty, locator)?;
                let encoded = tc.encode_substitutions(&generic_params, &subs, &conformances);
                return Ok(Expr::new(
                    ExprKind::Subscript {
                        base,
                        index,
                        subscript: ConcreteDeclRef {
                            decl: subscript,
                            substitutions: encoded,
                        },
                    },
                    result_ty,
                    src.clone(),
                ));
            }
        }

        // Subscripting an existential.
        if base_ty.is_existential() {
            let base = self.coerce_object_argument_to_type(base, &base_ty, locator)?;
            return Ok(Expr::new(
                ExprKind::ExistentialSubscript {
                    base,
                    index,
                    subscript,
                },
                result_ty,
                src.clone(),
            ));
        }

        // An ordinary subscript.
        let container_ty = container_ty.expect("subscript outside a type");
        let base = self.coerce_object_argument_to_type(base, &container_ty, locator)?;
        Ok(Expr::new(
            ExprKind::Subscript {
                base,
                index,
                subscript: subscript.into(),
            },
            result_ty,
            src.clone(),
        ))
    }

    /// Build a reference to an operator requirement of a protocol. The base
    /// type is recovered from the `Self` type variable of the opened
    /// operator type.
    pub(crate) fn build_protocol_operator_ref(
        &mut self,
        proto: DeclId,
        value: DeclId,
        name_loc: &Source,
        opened_ty: &Ty,
        locator: &Locator,
        implicit: bool,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        assert!(tc.decl(value).is_operator(), "only operators allowed");

        let self_archetype = match &tc.decl(proto).kind {
            DeclKind::Protocol(p) => p.self_archetype,
            _ => panic!("protocol operator outside a protocol"),
        };

        let mut base_ty = None;
        opened_ty.walk(&mut |ty| {
            if let Ty::Var(tv) = ty {
                if tc.ctx.tyvar_info(*tv).archetype == Some(self_archetype) {
                    base_ty = Some(self.solution.fixed_ty(*tv).clone());
                    return false;
                }
            }
            true
        });
        let base_ty = base_ty.expect("unable to find base type for protocol operator ref");

        let base = Expr::implicit(
            ExprKind::Metatype {
                base: None,
                has_type_repr: false,
            },
            Ty::metatype(base_ty),
            name_loc.clone(),
        );
        self.build_member_ref(base, value, name_loc, opened_ty.clone(), locator, implicit)
    }

    /// The type of a reference to a declaration, respecting explicit
    /// specialization syntax.
    fn type_of_decl_reference(&self, decl: DeclId, specialized: bool) -> Ty {
        let tc = self.tc;
        if tc.decl(decl).is_type_decl() {
            return Ty::metatype(tc.resolve_type_in_context(decl, specialized));
        }
        tc.get_unopened_type_of_reference(decl)
    }

    pub(crate) fn visit_decl_ref(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let from_ty = expr.ty.clone();
        let (decl, specialized) = match &expr.kind {
            ExprKind::DeclRef {
                decl, specialized, ..
            } => (*decl, *specialized),
            _ => unreachable!(),
        };

        // An operator requirement of a protocol resolves through the
        // protocol's Self.
        if let DeclContainer::Protocol(proto) = self.tc.decl(decl).container {
            let locator = Locator::new(expr.id);
            let implicit = expr.implicit;
            let src = expr.src.clone();
            return self.build_protocol_operator_ref(
                proto, decl, &src, &from_ty, &locator, implicit,
            );
        }

        expr.ty = self.type_of_decl_reference(decl, specialized);

        // Without type variables in the original type, there is nothing to
        // resolve.
        if !from_ty.has_type_variable() {
            return Ok(expr);
        }

        if let Some(poly) = expr.ty.as_poly() {
            let poly = poly.clone();
            return self.solution.specialize(self.tc, expr, &poly, &from_ty);
        }

        expr.ty = self.simplify_ty(&expr.ty);

        // A reference to an unspecialized generic type is typed as the
        // deduced bound generic type.
        if let Some(instance) = expr.ty.as_metatype() {
            if self.tc.ctx.is_unspecialized_generic(instance) {
                expr.ty = self.simplify_ty(&from_ty);
                return Ok(expr);
            }
        }

        expr.ty = self.simplify_ty(&expr.ty);
        Ok(expr)
    }

    pub(crate) fn visit_overloaded_decl_ref(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let locator = Locator::new(expr.id);
        let (choice, opened_ty) = self.solution.overload_choice(&locator).clone();
        let decl = choice.decl().expect("overloaded reference without declaration");

        if let DeclContainer::Protocol(proto) = self.tc.decl(decl).container {
            let src = expr.src.clone();
            let implicit = expr.implicit;
            return self.build_protocol_operator_ref(
                proto, decl, &src, &opened_ty, &locator, implicit,
            );
        }

        let ty = self.type_of_decl_reference(decl, false);
        let mut result = Expr::new(
            ExprKind::DeclRef {
                decl,
                specialized: false,
                generic_args: vec![],
            },
            ty,
            expr.src.clone(),
        );
        result.implicit = expr.implicit;

        if let Some(poly) = result.ty.as_poly() {
            let poly = poly.clone();
            return self.solution.specialize(self.tc, result, &poly, &opened_ty);
        }
        Ok(result)
    }

    pub(crate) fn visit_overloaded_member_ref(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let locator = Locator::new(expr.id);
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&locator.with(PathElt::Member))
            .clone();
        let member = choice.decl().expect("member reference without declaration");
        let (base, src, implicit) = match expr.kind {
            ExprKind::OverloadedMemberRef { base, .. } => (base, expr.src, expr.implicit),
            _ => unreachable!(),
        };
        self.build_member_ref(base, member, &src, opened_ty, &locator, implicit)
    }

    pub(crate) fn visit_member_ref(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let locator = Locator::new(expr.id);
        let opened_ty = expr.ty.clone();
        let (base, member, src, implicit) = match expr.kind {
            ExprKind::MemberRef { base, member } => {
                (base, member.decl, expr.src, expr.implicit)
            }
            _ => unreachable!(),
        };
        self.build_member_ref(base, member, &src, opened_ty, &locator, implicit)
    }

    pub(crate) fn visit_archetype_member_ref(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let locator = Locator::new(expr.id);
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&locator.with(PathElt::Member))
            .clone();
        let member = choice.decl().expect("member reference without declaration");
        let (base, src, implicit) = match expr.kind {
            ExprKind::ArchetypeMemberRef { base, .. } => (base, expr.src, expr.implicit),
            _ => unreachable!(),
        };
        self.build_member_ref(base, member, &src, opened_ty, &locator, implicit)
    }

    pub(crate) fn visit_dynamic_member_ref(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let locator = Locator::new(expr.id);
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&locator.with(PathElt::Member))
            .clone();
        let member = choice.decl().expect("member reference without declaration");
        let (base, src) = match expr.kind {
            ExprKind::DynamicMemberRef { base, .. } => (base, expr.src),
            _ => unreachable!(),
        };
        self.build_dynamic_member_ref(base, member, &src, opened_ty, &locator)
    }

    pub(crate) fn visit_unresolved_member(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        // The base is the metatype of the enum, which is either this
        // expression's type or its function result for element payloads.
        let mut enum_ty = self.simplify_ty(&expr.ty);
        if let Some(fun) = enum_ty.as_func() {
            enum_ty = fun.result.clone();
        }

        let locator = Locator::new(expr.id);
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&locator.with(PathElt::UnresolvedMember))
            .clone();
        let member = choice.decl().expect("member reference without declaration");

        let base = Expr::implicit(
            ExprKind::Metatype {
                base: None,
                has_type_repr: false,
            },
            Ty::metatype(enum_ty),
            expr.src.clone(),
        );
        let src = expr.src.clone();
        self.build_member_ref(base, member, &src, opened_ty, &locator, expr.implicit)
    }

    pub(crate) fn visit_unresolved_dot(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let locator = Locator::new(expr.id);
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&locator.with(PathElt::MemberRefBase))
            .clone();

        match choice {
            OverloadChoice::Decl(member) => {
                let (base, src, implicit) = match expr.kind {
                    ExprKind::UnresolvedDot { base, .. } => (base, expr.src, expr.implicit),
                    _ => unreachable!(),
                };
                let member_expr =
                    self.build_member_ref(base, member, &src, opened_ty, &locator, implicit)?;

                // An application of a value-type method must eventually be
                // fully applied.
                if let ExprKind::Call { callee, arg, .. } = &member_expr.kind {
                    if arg.ty.is_lvalue() {
                        if let ExprKind::DeclRef { decl, .. } =
                            &callee.semantics_providing().kind
                        {
                            if let Some(fun) = self.tc.decl(*decl).as_func() {
                                if fun.is_instance {
                                    self.value_type_member_applications.insert(
                                        member_expr.id,
                                        (fun.natural_arg_count - 1, member_expr.src.clone()),
                                    );
                                }
                            }
                        }
                    }
                }
                Ok(member_expr)
            }

            OverloadChoice::DeclViaDynamic(member) => {
                let (base, src) = match expr.kind {
                    ExprKind::UnresolvedDot { base, .. } => (base, expr.src),
                    _ => unreachable!(),
                };
                self.build_dynamic_member_ref(base, member, &src, opened_ty, &locator)
            }

            OverloadChoice::TupleIndex(index) => {
                let ty = self.simplify_ty(&expr.ty);
                let (base, src) = match expr.kind {
                    ExprKind::UnresolvedDot { base, .. } => (base, expr.src),
                    _ => unreachable!(),
                };
                // A rvalue base must be made materializable before
                // projecting an element out of it.
                let base = if base.ty.is_lvalue() {
                    base
                } else {
                    self.tc.coerce_to_materializable(base)
                };
                Ok(Expr::new(
                    ExprKind::TupleElement { base, index },
                    ty,
                    src,
                ))
            }

            OverloadChoice::BaseType => {
                let base = match expr.kind {
                    ExprKind::UnresolvedDot { base, .. } => base,
                    _ => unreachable!(),
                };
                Ok(base)
            }

            OverloadChoice::TypeDecl(_)
            | OverloadChoice::FunctionReturningBaseType
            | OverloadChoice::IdentityFunction => {
                unreachable!("nonsensical overload choice for a member reference")
            }
        }
    }

    pub(crate) fn visit_subscript(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let locator = Locator::new(expr.id);
        let src = expr.src.clone();
        let (base, index) = match expr.kind {
            ExprKind::Subscript { base, index, .. }
            | ExprKind::ArchetypeSubscript { base, index, .. }
            | ExprKind::ExistentialSubscript { base, index, .. }
            | ExprKind::DynamicSubscript { base, index, .. } => (base, index),
            _ => unreachable!(),
        };
        self.build_subscript(base, index, &src, &locator)
    }

    /// A constructor applied with `x.init(...)` syntax: resolve the
    /// constructor, reference its initializer, and finish the self-apply.
    pub(crate) fn visit_unresolved_constructor(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let locator = Locator::new(expr.id);
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&locator.with(PathElt::ConstructorMember))
            .clone();
        let ctor = choice.decl().expect("constructor choice without declaration");

        let initializer_ty = match &tc.decl(ctor).kind {
            DeclKind::Constructor(c) => c.initializer_ty.clone(),
            _ => panic!("unresolved constructor resolved to a non-constructor"),
        };

        let (sub, src, expr_ty) = match expr.kind {
            ExprKind::UnresolvedConstructor { sub } => (sub, expr.src, expr.ty),
            _ => unreachable!(),
        };

        let mut ctor_ref = Expr::new(
            ExprKind::OtherConstructorRef { decl: ctor },
            initializer_ty,
            src.clone(),
        );

        if let Some(poly) = ctor_ref.ty.as_poly() {
            let poly = poly.clone();
            // Re-attach the type of `self` to the opened type of the
            // overload, since the initializer binds it as an lvalue for
            // value types.
            let mut self_ty = opened_ty
                .as_func()
                .expect("constructor reference is not a function")
                .result
                .clone();
            if !tc.ctx.has_reference_semantics(self_ty.rvalue_ty()) {
                self_ty = tc.member_access_lvalue(self_ty);
            }
            let specialized_ty = Ty::func(self_ty, opened_ty.clone());
            ctor_ref = self.solution.specialize(tc, ctor_ref, &poly, &specialized_ty)?;
        }

        let call = Expr::new(
            ExprKind::Call {
                callee: ctor_ref,
                arg: sub,
                call_kind: CallKind::DotSyntaxSelf,
                is_super: false,
            },
            Ty::unit(),
            src,
        );
        self.finish_apply(call, expr_ty, locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::apply::fixtures::TestWorld;
    use crate::typing::solution::Solution;

    #[test]
    fn test_unresolved_dot_tuple_index() {
        let mut world = TestWorld::new();
        let pair_ty = tuple_ty_for_test(&world);
        let base = world.typed_expr(pair_ty.clone());
        let dot = Expr::new(
            ExprKind::UnresolvedDot {
                base,
                name: str!("1"),
            },
            Ty::Var(world.fresh_tyvar()),
            Default::default(),
        );

        let mut solution = Solution::new();
        let tv = match &dot.ty {
            Ty::Var(tv) => *tv,
            _ => unreachable!(),
        };
        solution.type_bindings.insert(tv, world.int32());
        solution.overload_choices.insert(
            Locator::new(dot.id).with(PathElt::MemberRefBase),
            (OverloadChoice::TupleIndex(1), pair_ty),
        );

        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.visit_unresolved_dot(dot).unwrap();
        match &result.kind {
            ExprKind::TupleElement { index, .. } => assert_eq!(*index, 1),
            kind => panic!("expected a tuple element, found {:?}", kind),
        }
        assert_eq!(result.ty, world.int32());
    }

    #[test]
    fn test_unresolved_dot_base_type_choice_returns_base() {
        let mut world = TestWorld::new();
        let base = world.typed_expr(world.int32());
        let base_id = base.id;
        let dot = Expr::new(
            ExprKind::UnresolvedDot {
                base,
                name: str!("0"),
            },
            Ty::Var(world.fresh_tyvar()),
            Default::default(),
        );

        let mut solution = Solution::new();
        solution.overload_choices.insert(
            Locator::new(dot.id).with(PathElt::MemberRefBase),
            (OverloadChoice::BaseType, world.int32()),
        );

        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.visit_unresolved_dot(dot).unwrap();
        assert_eq!(result.id, base_id);
    }

    #[test]
    fn test_partial_application_of_value_type_method_is_tracked() {
        // `value.method` with no outer apply leaves a tracked entry, which
        // finalize turns into a diagnostic.
        let mut world = TestWorld::new();
        let point = world.value_type_with_method();
        let base = world.lvalue_expr(Ty::Nominal(point.decl));
        let dot = Expr::new(
            ExprKind::UnresolvedDot {
                base,
                name: str!("translate"),
            },
            Ty::Var(world.fresh_tyvar()),
            Default::default(),
        );

        let unopened = world.tc().get_unopened_type_of_reference(point.method);
        let method_ty = unopened.as_func().unwrap().result.clone();
        let mut solution = Solution::new();
        solution.overload_choices.insert(
            Locator::new(dot.id).with(PathElt::MemberRefBase),
            (OverloadChoice::Decl(point.method), method_ty),
        );

        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.visit_unresolved_dot(dot).unwrap();
        assert_eq!(
            rewriter
                .value_type_member_applications
                .get(&result.id)
                .map(|(count, _)| *count),
            Some(1)
        );

        rewriter.finalize();
        assert_eq!(world.tc().diags.len(), 1);
    }

    #[test]
    fn test_monomorphic_decl_ref_is_not_specialized() {
        let mut world = TestWorld::new();
        let f = world.int_to_int_fn();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution
            .type_bindings
            .insert(tv, Ty::func(world.int32(), world.int32()));

        let tc = world.tc();
        let mut reference = tc.build_checked_ref_expr(f, &Default::default(), false);
        reference.ty = Ty::Var(tv);
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.visit_decl_ref(reference).unwrap();

        assert!(matches!(result.kind, ExprKind::DeclRef { .. }));
        assert_eq!(result.ty, Ty::func(world.int32(), world.int32()));
    }

    fn tuple_ty_for_test(world: &TestWorld) -> Ty {
        Ty::tuple(vec![
            crate::typing::ty::TupleField::new(world.int32()),
            crate::typing::ty::TupleField::new(world.int32()),
        ])
    }
}
