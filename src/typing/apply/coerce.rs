use crate::ast::{
    CallKind, DeclId, Expr, ExprKind, MagicIdentifierKind, ScalarToTupleElt, ShuffleSource,
};
use crate::errors::{AsterError, AsterErrorKind, AsterResult};
use crate::span::Source;
use crate::typing::apply::{error_expr, find_default_args_owner, ExprRewriter};
use crate::typing::locator::{Locator, PathElt};
use crate::typing::solution::{ConversionRestriction, OverloadChoice};
use crate::typing::ty::{DefaultArgKind, Ty, TupleField};

impl<'a> ExprRewriter<'a> {
    /// Coerce an expression to the given type by inserting the conversion
    /// nodes the solver's restrictions and the built-in conversion lattice
    /// call for. Never fails on a pair the solver recorded.
    pub fn coerce_to_type(
        &mut self,
        expr: Box<Expr>,
        to_ty: &Ty,
        locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let from_ty = expr.ty.clone();

        // Equivalent types require no conversion.
        if tc.ctx.tys_equal(&from_ty, to_ty) {
            return Ok(expr);
        }

        log::debug!("coercing {} to {}", from_ty, to_ty);

        // If the solver recorded what to do here, do it immediately.
        let canonical_from = tc.ctx.canonicalize(&from_ty);
        let canonical_to = tc.ctx.canonicalize(to_ty);
        if let Some(restriction) = self.solution.restriction(&canonical_from, &canonical_to) {
            match restriction {
                ConversionRestriction::TupleToTuple => {
                    unreachable!("cannot apply tuple-to-tuple conversion directly")
                }

                ConversionRestriction::ScalarToTuple => {
                    let scalar_idx = to_ty
                        .field_for_scalar_init()
                        .expect("scalar-to-tuple conversion without a scalar field");
                    return self.coerce_scalar_to_tuple(expr, to_ty, scalar_idx, locator);
                }

                ConversionRestriction::Superclass => {
                    return self.coerce_superclass(expr, to_ty);
                }

                ConversionRestriction::Existential => {
                    return self.coerce_existential(expr, to_ty);
                }

                ConversionRestriction::ValueToOptional => {
                    let value_ty = tc
                        .ctx
                        .as_optional(&canonical_to)
                        .expect("value-to-optional conversion to a non-optional type");
                    tc.require_optional_intrinsics(&expr.src)?;
                    let expr = self.coerce_to_type(expr, &value_ty, locator)?;
                    let src = expr.src.clone();
                    return Ok(Expr::implicit(
                        ExprKind::InjectIntoOptional { sub: expr },
                        to_ty.clone(),
                        src,
                    ));
                }

                ConversionRestriction::User => {
                    return self.coerce_via_user_conversion(expr, to_ty, locator);
                }
            }
        }

        // Coercions to a tuple type.
        if let Some(to_fields) = to_ty.as_tuple() {
            if let Some(from_fields) = from_ty.as_tuple() {
                if let Some((sources, variadic_args)) =
                    compute_tuple_shuffle(from_fields, to_fields)
                {
                    let from_fields = from_fields.to_vec();
                    let to_fields = to_fields.to_vec();
                    return self.coerce_tuple_to_tuple(
                        expr,
                        from_fields,
                        to_fields,
                        locator,
                        sources,
                        variadic_args,
                    );
                }
            }

            if let Some(scalar_idx) = to_ty.field_for_scalar_init() {
                return self.coerce_scalar_to_tuple(expr, to_ty, scalar_idx, locator);
            }
        }

        // Coercions from an lvalue: requalify and load first, since they
        // are often the first step of a multi-step coercion.
        if let Ty::LValue(object, quals) = &from_ty {
            let mut expr = expr;
            let mut object = (**object).clone();
            let quals = *quals;

            // Refine the type of a `super` reference in place, so no
            // redundant derived-to-base conversion is inserted above it.
            if expr.is_super_ref() {
                assert!(
                    tc.is_subtype_of(&object, to_ty.rvalue_ty()),
                    "coercing super reference to a non-supertype?"
                );
                object = to_ty.rvalue_ty().clone();
                expr.ty = Ty::lvalue(object.clone(), quals);
            }

            let expr = if let Ty::LValue(_, to_quals) = to_ty {
                let src = expr.src.clone();
                Expr::implicit(
                    ExprKind::Requalify {
                        sub: expr,
                        for_object: false,
                    },
                    Ty::lvalue(object, *to_quals),
                    src,
                )
            } else {
                let src = expr.src.clone();
                Expr::implicit(ExprKind::Load { sub: expr }, object, src)
            };
            return self.coerce_to_type(expr, to_ty, locator);
        }

        // Coercions to an lvalue: materialize the value.
        if let Ty::LValue(object, _) = to_ty {
            let expr = self.coerce_to_type(expr, object, locator)?;
            let src = expr.src.clone();
            return Ok(Expr::implicit(
                ExprKind::Materialize { sub: expr },
                to_ty.clone(),
                src,
            ));
        }

        // Coercion from a subclass to a superclass.
        if tc.ctx.may_have_superclass(&from_ty) && tc.ctx.is_class_ty(to_ty) {
            let mut superclass = tc.get_super_class_of(&from_ty);
            while let Some(s) = superclass {
                if tc.ctx.tys_equal(&s, to_ty) {
                    return self.coerce_superclass(expr, to_ty);
                }
                superclass = tc.get_super_class_of(&s);
            }
        }

        // Coercions to a function type.
        if let Ty::Func(to_fun) = to_ty {
            // An autoclosure parameter wraps its argument in an implicit
            // closure taking no parameters.
            if to_fun.auto_closure {
                let expr =
                    self.coerce_to_type(expr, &to_fun.result, &locator.with(PathElt::Load))?;
                let src = expr.src.clone();
                let mut captures = vec![];
                tc.compute_captures(&expr, &mut captures);
                return Ok(Expr::implicit(
                    ExprKind::ImplicitClosure {
                        body: expr,
                        captures,
                    },
                    to_ty.clone(),
                    src,
                ));
            }

            let from_fun = from_ty.as_func();

            // Bridging to a block function type goes through the non-block
            // form.
            if to_fun.block && from_fun.map_or(true, |f| !f.block) {
                let non_block = Ty::func(to_fun.input.clone(), to_fun.result.clone());
                let expr = self.coerce_to_type(expr, &non_block, locator)?;
                let src = expr.src.clone();
                return Ok(Expr::implicit(
                    ExprKind::BridgeToBlock { sub: expr },
                    to_ty.clone(),
                    src,
                ));
            }

            if from_fun.is_some() {
                let src = expr.src.clone();
                return Ok(Expr::implicit(
                    ExprKind::FunctionConversion { sub: expr },
                    to_ty.clone(),
                    src,
                ));
            }
        }

        // Coercions to an existential type.
        if to_ty.is_existential() {
            return self.coerce_existential(expr, to_ty);
        }

        // Coercion to an optional type.
        if let Some(value_ty) = tc.ctx.as_optional(to_ty) {
            tc.require_optional_intrinsics(&expr.src)?;
            let expr = self.coerce_to_type(expr, &value_ty, locator)?;
            let src = expr.src.clone();
            return Ok(Expr::implicit(
                ExprKind::InjectIntoOptional { sub: expr },
                to_ty.clone(),
                src,
            ));
        }

        // Coercion via a conversion function or constructor.
        if from_ty.nominal_decl().is_some()
            || from_ty.is_archetype()
            || to_ty.nominal_decl().is_some()
            || to_ty.is_archetype()
        {
            return self.coerce_via_user_conversion(expr, to_ty, locator);
        }

        // Coercion from one metatype to another.
        if from_ty.as_metatype().is_some() && to_ty.as_metatype().is_some() {
            let src = expr.src.clone();
            return Ok(Expr::implicit(
                ExprKind::MetatypeConversion { sub: expr },
                to_ty.clone(),
                src,
            ));
        }

        unreachable!("unhandled coercion from {} to {}", from_ty, to_ty)
    }

    /// Superclass coercion: an archetype is first converted to its concrete
    /// superclass bound, then upcast to the destination.
    fn coerce_superclass(&mut self, expr: Box<Expr>, to_ty: &Ty) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let mut expr = expr;
        if let Some(archetype) = expr.ty.rvalue_ty().as_archetype() {
            let superclass = tc
                .ctx
                .archetype(archetype)
                .superclass
                .clone()
                .expect("archetype-to-superclass coercion without a superclass bound");
            let src = expr.src.clone();
            expr = Expr::implicit(ExprKind::ArchetypeToSuper { sub: expr }, superclass, src);
            if tc.ctx.tys_equal(&expr.ty, to_ty) {
                return Ok(expr);
            }
        }
        let src = expr.src.clone();
        Ok(Expr::implicit(
            ExprKind::DerivedToBase { sub: expr },
            to_ty.clone(),
            src,
        ))
    }

    /// Erase a value into an existential, collecting the conformance
    /// witnesses for each composed protocol.
    pub(crate) fn coerce_existential(
        &mut self,
        expr: Box<Expr>,
        to_ty: &Ty,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let from_ty = expr.ty.clone();
        let protocols = to_ty
            .existential_protocols()
            .expect("not converting to an existential?");

        let mut conformances = vec![];
        for proto in protocols {
            let conformance = tc
                .conforms_to_protocol(&from_ty, proto)
                .expect("type does not conform to protocol?");
            conformances.push(conformance);
        }

        let src = expr.src.clone();
        Ok(Expr::implicit(
            ExprKind::Erasure {
                sub: expr,
                conformances,
            },
            to_ty.clone(),
            src,
        ))
    }

    /// Convert via a user-defined conversion function, or via a constructor
    /// of the destination type for interpolated strings.
    pub(crate) fn coerce_via_user_conversion(
        &mut self,
        expr: Box<Expr>,
        to_ty: &Ty,
        locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;

        let conversion_locator = locator.with(PathElt::ConversionMember);
        if let Some((choice, opened_ty)) = self
            .solution
            .overload_choice_if_available(&conversion_locator)
            .cloned()
        {
            let member = choice.decl().expect("conversion member without declaration");
            let src = expr.src.clone();
            let member_ref =
                self.build_member_ref(expr, member, &src, opened_ty.clone(), locator, true)?;

            // Call the conversion function with an empty argument list.
            let args = Expr::implicit(
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
                    arg: args,
                    call_kind: CallKind::Plain,
                    is_super: false,
                },
                Ty::unit(),
                src,
            );
            let opened_result = opened_ty
                .as_func()
                .expect("conversion member is not a function")
                .result
                .clone();
            let apply_locator = Locator::new(apply.id);
            let expr = self.finish_apply(apply, opened_result, apply_locator)?;
            return self.coerce_to_type(expr, to_ty, locator);
        }

        // Without a conversion member there must be a constructor member;
        // this path is reached for interpolated string literals, which allow
        // construction or conversion.
        let ctor_locator = locator.with(PathElt::ConstructorMember);
        let (choice, opened_ty) = self
            .solution
            .overload_choice(&ctor_locator)
            .clone();

        // The identity constructor reduces to a coercion through the
        // argument position.
        if matches!(choice, OverloadChoice::IdentityFunction) {
            return self.coerce_to_type(expr, to_ty, &locator.with(PathElt::ApplyArgument));
        }

        let member = choice.decl().expect("constructor member without declaration");
        let src = expr.src.clone();
        let type_base = Expr::implicit(
            ExprKind::Metatype {
                base: None,
                has_type_repr: false,
            },
            Ty::metatype(to_ty.clone()),
            src.clone(),
        );
        let decl_ref =
            self.build_member_ref(type_base, member, &src, opened_ty, &ctor_locator, true)?;
        let apply = Expr::implicit(
            ExprKind::Call {
                callee: decl_ref,
                arg: expr,
                call_kind: CallKind::Plain,
                is_super: false,
            },
            Ty::unit(),
            src,
        );
        let expr = self.finish_apply(apply, to_ty.clone(), locator.clone())?;
        self.coerce_to_type(expr, to_ty, locator)
    }

    /// Coerce an object argument, e.g. the base of a member access, to the
    /// given container type. Value types are passed as lvalues so they can
    /// be mutated.
    pub(crate) fn coerce_object_argument_to_type(
        &mut self,
        expr: Box<Expr>,
        to_ty: &Ty,
        locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let container_ty = to_ty.rvalue_ty().clone();

        // Reference semantics and metatypes are passed by value.
        if tc.ctx.has_reference_semantics(&container_ty)
            || container_ty.as_metatype().is_some()
        {
            return self.coerce_to_type(expr, &container_ty, locator);
        }

        let dest_ty = tc.member_access_lvalue(container_ty.clone());

        if tc.ctx.tys_equal(&expr.ty, &dest_ty) {
            return Ok(expr);
        }

        let mut expr = expr;
        if let Ty::LValue(object, _) = &expr.ty {
            if tc.ctx.tys_equal(object, &container_ty) {
                let src = expr.src.clone();
                return Ok(Expr::implicit(
                    ExprKind::Requalify {
                        sub: expr,
                        for_object: true,
                    },
                    dest_ty,
                    src,
                ));
            }

            // Different object type: convert to the container, then
            // materialize below.
            expr = self.coerce_to_type(expr, &container_ty, locator)?;
        }

        let src = expr.src.clone();
        Ok(Expr::implicit(
            ExprKind::Materialize { sub: expr },
            dest_ty,
            src,
        ))
    }

    /// Coerce one tuple expression to another tuple type according to the
    /// computed shuffle.
    pub(crate) fn coerce_tuple_to_tuple(
        &mut self,
        expr: Box<Expr>,
        from_fields: Vec<TupleField>,
        to_fields: Vec<TupleField>,
        locator: &Locator,
        mut sources: Vec<ShuffleSource>,
        variadic_args: Vec<usize>,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let mut expr = expr;
        let has_tuple_literal = inner_tuple_expr_mut(&mut expr).is_some();

        let mut has_var_arg = false;
        let mut anything_shuffled = false;
        let mut has_inits = false;
        let mut to_sugar_fields: Vec<TupleField> = vec![];
        let mut from_expr_fields: Vec<Option<TupleField>> = vec![None; from_fields.len()];
        let mut caller_defaults: Vec<Expr> = vec![];
        let mut defaults_owner: Option<DeclId> = None;

        for (i, to_elt) in to_fields.iter().enumerate() {
            match sources[i] {
                ShuffleSource::DefaultInitialize => {
                    // Dig out the owner of the default arguments.
                    let owner = self.default_args_owner(&mut defaults_owner, locator);

                    anything_shuffled = true;
                    has_inits = true;
                    to_sugar_fields.push(to_elt.clone());

                    let loc = expr.src.clone();
                    if let Some(default) = self.get_caller_default_arg(owner, i, &loc) {
                        caller_defaults.push(*default);
                        sources[i] = ShuffleSource::CallerDefaultInitialize;
                    }
                }

                ShuffleSource::Variadic => {
                    assert!(i == to_fields.len() - 1, "variadic field not at the end?");
                    to_sugar_fields.push(to_elt.clone());
                    has_var_arg = true;
                    anything_shuffled = true;
                }

                ShuffleSource::CallerDefaultInitialize => {
                    unreachable!("caller defaults are only introduced here")
                }

                ShuffleSource::Field(idx) => {
                    if idx != i {
                        anything_shuffled = true;
                    }

                    let from_elt = &from_fields[idx];
                    if tc.ctx.tys_equal(&from_elt.ty, &to_elt.ty) {
                        // Carry the sugared type of the source element.
                        let mut sugar_ty = from_elt.ty.clone();
                        if let Some(tuple) = inner_tuple_expr_mut(&mut expr) {
                            if let ExprKind::Tuple { elements, .. } = &tuple.kind {
                                sugar_ty = elements[idx].ty.clone();
                            }
                        }
                        to_sugar_fields.push(TupleField {
                            name: to_elt.name.clone(),
                            ty: sugar_ty,
                            default: to_elt.default,
                            variadic: to_elt.variadic,
                        });
                        from_expr_fields[idx] = Some(from_elt.clone());
                        has_inits |= to_elt.has_default();
                        continue;
                    }

                    // The element itself needs conversion, which requires a
                    // tuple literal to rewrite in place.
                    if !has_tuple_literal {
                        return Err(self.tuple_conversion_not_expressible(&expr));
                    }

                    let converted = self.coerce_tuple_element(
                        &mut expr,
                        idx,
                        &to_elt.ty,
                        &locator.with(PathElt::TupleElement(idx)),
                    )?;
                    to_sugar_fields.push(TupleField {
                        name: to_elt.name.clone(),
                        ty: converted.clone(),
                        default: to_elt.default,
                        variadic: to_elt.variadic,
                    });
                    let from_elt = &from_fields[idx];
                    from_expr_fields[idx] = Some(TupleField {
                        name: from_elt.name.clone(),
                        ty: converted,
                        default: from_elt.default,
                        variadic: from_elt.variadic,
                    });
                    has_inits |= to_elt.has_default();
                }
            }
        }

        // Convert the variadic arguments to the destination element type.
        let mut injection_fn = None;
        if has_var_arg {
            let last = to_fields.last().expect("variadic tuple with no fields");
            let to_elt_ty = last.vararg_base_ty().clone();
            for &idx in &variadic_args {
                let from_elt = &from_fields[idx];
                if tc.ctx.tys_equal(&to_elt_ty, &from_elt.ty) {
                    from_expr_fields[idx] = Some(from_elt.clone());
                    continue;
                }

                if !has_tuple_literal {
                    return Err(self.tuple_conversion_not_expressible(&expr));
                }

                let converted = self.coerce_tuple_element(
                    &mut expr,
                    idx,
                    &to_elt_ty,
                    &locator.with(PathElt::TupleElement(idx)),
                )?;
                from_expr_fields[idx] = Some(TupleField {
                    name: from_elt.name.clone(),
                    ty: converted,
                    default: from_elt.default,
                    variadic: from_elt.variadic,
                });
            }

            injection_fn = Some(tc.build_array_injection_fn_ref(
                &last.ty,
                &Ty::BuiltinInt(64),
                &expr.src,
            )?);
        }

        // The source tuple's type may have changed under in-place element
        // conversions.
        let from_tuple_ty = Ty::Tuple(
            from_expr_fields
                .into_iter()
                .enumerate()
                .map(|(idx, field)| field.unwrap_or_else(|| from_fields[idx].clone()))
                .collect(),
        );
        if has_tuple_literal {
            set_tuple_and_paren_tys(&mut expr, &from_tuple_ty);
        }

        let to_sugar_ty = if has_inits {
            Ty::Tuple(to_fields)
        } else {
            Ty::Tuple(to_sugar_fields)
        };

        // Without any shuffling the retyped tuple literal is the result.
        if !anything_shuffled && has_tuple_literal {
            set_tuple_and_paren_tys(&mut expr, &to_sugar_ty);
            return Ok(expr);
        }

        let src = expr.src.clone();
        Ok(Expr::implicit(
            ExprKind::TupleShuffle {
                sub: expr,
                sources,
                variadic_args,
                default_args_owner: defaults_owner,
                caller_defaults,
                injection_fn,
            },
            to_sugar_ty,
            src,
        ))
    }

    /// Coerce a scalar value to a tuple type with a distinguished scalar
    /// field.
    pub(crate) fn coerce_scalar_to_tuple(
        &mut self,
        expr: Box<Expr>,
        to_ty: &Ty,
        scalar_idx: usize,
        locator: &Locator,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let to_fields = to_ty
            .as_tuple()
            .expect("scalar-to-tuple conversion to a non-tuple type")
            .to_vec();

        // If the destination is variadic, it needs the injection function.
        let mut injection_fn = None;
        let last = to_fields.last().expect("scalar-to-tuple with no fields");
        if last.variadic {
            injection_fn = Some(tc.build_array_injection_fn_ref(
                &last.ty,
                &Ty::BuiltinInt(64),
                &expr.src,
            )?);
        }

        // Initializing the variadic list uses its element type.
        let field = &to_fields[scalar_idx];
        let to_scalar_ty = if field.variadic {
            field.vararg_base_ty().clone()
        } else {
            field.ty.clone()
        };

        let expr = self.coerce_to_type(expr, &to_scalar_ty, &locator.with(PathElt::ScalarToTuple))?;

        // Preserve the sugar of the scalar field, unless a field carries an
        // initializer.
        let mut sugar_fields = vec![];
        let mut has_init = false;
        for (i, field) in to_fields.iter().enumerate() {
            if field.has_default() {
                has_init = true;
                break;
            }

            if i == scalar_idx {
                if field.variadic {
                    assert!(
                        tc.ctx.tys_equal(&expr.ty, field.vararg_base_ty()),
                        "scalar field is not equivalent to the variadic element type?"
                    );
                    sugar_fields.push(field.clone());
                } else {
                    assert!(
                        tc.ctx.tys_equal(&expr.ty, &field.ty),
                        "scalar field is not equivalent to the destination field?"
                    );
                    sugar_fields.push(TupleField {
                        name: field.name.clone(),
                        ty: expr.ty.clone(),
                        default: DefaultArgKind::None,
                        variadic: false,
                    });
                }
            } else {
                sugar_fields.push(field.clone());
            }
        }

        // Compute the elements of the resulting tuple.
        let mut elements = vec![];
        let mut defaults_owner: Option<DeclId> = None;
        for (i, field) in to_fields.iter().enumerate() {
            if i == scalar_idx {
                elements.push(ScalarToTupleElt::Scalar);
                continue;
            }
            if field.variadic {
                continue;
            }

            assert!(field.has_default(), "expected a default argument");
            let owner = self.default_args_owner(&mut defaults_owner, locator);

            let loc = expr.src.clone();
            match self.get_caller_default_arg(owner, i, &loc) {
                Some(default) => elements.push(ScalarToTupleElt::CallerDefault(default)),
                None => elements.push(ScalarToTupleElt::DefaultOwner(owner)),
            }
        }

        let dest_sugar_ty = if has_init {
            to_ty.clone()
        } else {
            Ty::Tuple(sugar_fields)
        };

        let src = expr.src.clone();
        Ok(Expr::implicit(
            ExprKind::ScalarToTuple {
                sub: expr,
                elements,
                injection_fn,
            },
            dest_sugar_ty,
            src,
        ))
    }

    /// Resolve (once) and cache the owner of the default arguments for the
    /// tuple this locator points into.
    fn default_args_owner(&self, cache: &mut Option<DeclId>, locator: &Locator) -> DeclId {
        match cache {
            Some(owner) => *owner,
            None => {
                let owner = find_default_args_owner(self.solution, locator)
                    .expect("missing default arguments owner?");
                *cache = Some(owner);
                owner
            }
        }
    }

    /// Produce the caller-side default argument for a defaulted field, or
    /// None when the callee supplies it.
    pub(crate) fn get_caller_default_arg(
        &mut self,
        owner: DeclId,
        index: usize,
        loc: &Source,
    ) -> Option<Box<Expr>> {
        let (kind, field_ty) = self
            .tc
            .decl(owner)
            .default_args()
            .get(index)
            .cloned()
            .expect("field without a recorded default argument");

        let magic_kind = match kind {
            DefaultArgKind::None => unreachable!("no default argument here?"),
            DefaultArgKind::Normal => return None,
            DefaultArgKind::File => MagicIdentifierKind::File,
            DefaultArgKind::Line => MagicIdentifierKind::Line,
            DefaultArgKind::Column => MagicIdentifierKind::Column,
        };

        // The default is a magic identifier literal converted to the
        // field's type; the field accepts the literal by construction.
        let literal = Expr::implicit(
            ExprKind::MagicIdentifierLiteral(magic_kind),
            field_ty.clone(),
            loc.clone(),
        );
        let converted = self
            .tc
            .type_check_expression(literal, Some(&field_ty))
            .unwrap_or_else(|_| panic!("caller default argument conversion cannot fail"));
        Some(converted)
    }

    /// Coerce the element at `idx` of the inner tuple literal in place,
    /// returning the converted element type.
    fn coerce_tuple_element(
        &mut self,
        expr: &mut Expr,
        idx: usize,
        to_ty: &Ty,
        locator: &Locator,
    ) -> AsterResult<Ty> {
        let tuple = inner_tuple_expr_mut(expr).expect("tuple literal disappeared?");
        let element = match &mut tuple.kind {
            ExprKind::Tuple { elements, .. } => {
                Box::new(std::mem::replace(&mut elements[idx], error_expr()))
            }
            _ => unreachable!(),
        };
        let converted = self.coerce_to_type(element, to_ty, locator)?;
        let converted_ty = converted.ty.clone();
        let tuple = inner_tuple_expr_mut(expr).expect("tuple literal disappeared?");
        if let ExprKind::Tuple { elements, .. } = &mut tuple.kind {
            elements[idx] = *converted;
        }
        Ok(converted_ty)
    }

    fn tuple_conversion_not_expressible(&self, expr: &Expr) -> AsterError {
        let msg = "cannot convert this tuple expression between the given tuple types";
        self.tc.diags.error(msg, expr.src.clone());
        AsterError::new(AsterErrorKind::Type, msg, expr.src.clone())
    }

    /// Retype a closure parameter pattern against the function's input
    /// type.
    pub(crate) fn coerce_pattern_to_type(&self, pattern: &mut crate::ast::Pattern, ty: &Ty) {
        use crate::ast::Pattern;
        match pattern {
            Pattern::Any => {}
            Pattern::Paren(sub) => self.coerce_pattern_to_type(sub, ty),
            Pattern::Typed(sub, declared) => {
                let declared = declared.clone();
                self.coerce_pattern_to_type(sub, &declared);
            }
            Pattern::Named { ty: slot, .. } => {
                *slot = self.simplify_ty(ty);
            }
            Pattern::Tuple(pats) => {
                if let Some(fields) = ty.as_tuple() {
                    for (pat, field) in pats.iter_mut().zip(fields.iter()) {
                        self.coerce_pattern_to_type(pat, &field.ty);
                    }
                }
            }
        }
    }
}

/// The tuple literal inside a chain of parentheses, if there is one.
fn inner_tuple_expr_mut(mut expr: &mut Expr) -> Option<&mut Expr> {
    loop {
        match &expr.kind {
            ExprKind::Paren(_) => {}
            ExprKind::Tuple { .. } => return Some(expr),
            _ => return None,
        }
        match &mut expr.kind {
            ExprKind::Paren(sub) => expr = sub,
            _ => unreachable!(),
        }
    }
}

/// Set the type of the inner tuple literal and every paren around it.
fn set_tuple_and_paren_tys(expr: &mut Expr, ty: &Ty) {
    expr.ty = ty.clone();
    if let ExprKind::Paren(sub) = &mut expr.kind {
        set_tuple_and_paren_tys(sub, ty);
    }
}

/// Compute the shuffle turning one tuple shape into another: a permutation
/// of source indices, defaults for unmatched destination fields, and the
/// sources collected into the trailing variadic field. Returns None when the
/// shapes do not line up.
pub(crate) fn compute_tuple_shuffle(
    from_fields: &[TupleField],
    to_fields: &[TupleField],
) -> Option<(Vec<ShuffleSource>, Vec<usize>)> {
    let mut claimed = vec![false; from_fields.len()];
    let mut sources = Vec::with_capacity(to_fields.len());
    let mut variadic_args = vec![];

    for (i, to_field) in to_fields.iter().enumerate() {
        // The variadic field collects every remaining source, in source
        // order; it must be the last destination field.
        if to_field.variadic {
            if i != to_fields.len() - 1 {
                return None;
            }
            sources.push(ShuffleSource::Variadic);
            for (j, from_field) in from_fields.iter().enumerate() {
                if claimed[j] {
                    continue;
                }
                if from_field.name.is_some() && from_field.name != to_field.name {
                    return None;
                }
                claimed[j] = true;
                variadic_args.push(j);
            }
            continue;
        }

        // Match by name first.
        if let Some(name) = &to_field.name {
            if let Some(j) = from_fields
                .iter()
                .enumerate()
                .position(|(j, f)| !claimed[j] && f.name.as_ref() == Some(name))
            {
                claimed[j] = true;
                sources.push(ShuffleSource::Field(j));
                continue;
            }
        }

        // Otherwise take the next unclaimed positional source.
        if let Some(j) = from_fields
            .iter()
            .enumerate()
            .position(|(j, f)| !claimed[j] && (f.name.is_none() || f.name == to_field.name))
        {
            claimed[j] = true;
            sources.push(ShuffleSource::Field(j));
            continue;
        }

        if to_field.has_default() {
            sources.push(ShuffleSource::DefaultInitialize);
            continue;
        }

        return None;
    }

    // Every source field must have been consumed.
    if claimed.iter().any(|c| !c) {
        return None;
    }

    Some((sources, variadic_args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::apply::fixtures::TestWorld;
    use crate::typing::solution::Solution;

    #[test]
    fn test_coerce_to_same_type_is_identity() {
        let world = TestWorld::new();
        let expr = world.typed_expr(world.int32());
        let id = expr.id;
        let solution = Solution::new();
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter
            .coerce_to_type(expr, &world.int32(), &Locator::new(0))
            .unwrap();
        assert_eq!(result.id, id);
    }

    #[test]
    fn test_coerce_lvalue_to_rvalue_loads() {
        let world = TestWorld::new();
        let expr = world.lvalue_expr(world.int32());
        let solution = Solution::new();
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter
            .coerce_to_type(expr, &world.int32(), &Locator::new(0))
            .unwrap();
        assert!(matches!(result.kind, ExprKind::Load { .. }));
        assert_eq!(result.ty, world.int32());
    }

    #[test]
    fn test_coerce_value_to_optional_injects() {
        let world = TestWorld::new();
        let expr = world.typed_expr(world.int32());
        let solution = Solution::new();
        let to_ty = Ty::optional(world.int32());
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter
            .coerce_to_type(expr, &to_ty, &Locator::new(0))
            .unwrap();
        match &result.kind {
            ExprKind::InjectIntoOptional { sub } => assert_eq!(sub.ty, world.int32()),
            kind => panic!("expected an optional injection, found {:?}", kind),
        }
        assert_eq!(result.ty, to_ty);
    }

    #[test]
    fn test_coerce_superclass_restriction() {
        let mut world = TestWorld::new();
        let (base, derived) = world.class_pair();
        let expr = world.typed_expr(Ty::Nominal(derived));

        let mut solution = Solution::new();
        solution.constraint_restrictions.insert(
            (Ty::Nominal(derived), Ty::Nominal(base)),
            ConversionRestriction::Superclass,
        );

        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter
            .coerce_to_type(expr, &Ty::Nominal(base), &Locator::new(0))
            .unwrap();
        assert!(matches!(result.kind, ExprKind::DerivedToBase { .. }));
        assert_eq!(result.ty, Ty::Nominal(base));
    }

    #[test]
    fn test_coerce_to_existential_erases() {
        let mut world = TestWorld::new();
        let proto = world.simple_protocol("Printable");
        world.conform(world.int32(), proto);
        let expr = world.typed_expr(world.int32());

        let solution = Solution::new();
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter
            .coerce_to_type(expr, &Ty::Protocol(proto), &Locator::new(0))
            .unwrap();
        match &result.kind {
            ExprKind::Erasure { conformances, .. } => assert_eq!(conformances.len(), 1),
            kind => panic!("expected an erasure, found {:?}", kind),
        }
    }

    #[test]
    fn test_coerce_function_conversion() {
        let world = TestWorld::new();
        let from = Ty::func(world.int32(), Ty::unit());
        let mut to_fun = crate::typing::ty::FnTy::new(world.int32(), Ty::unit());
        to_fun.block = true;
        let to = Ty::Func(Box::new(to_fun));

        let expr = world.typed_expr(from);
        let solution = Solution::new();
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.coerce_to_type(expr, &to, &Locator::new(0)).unwrap();
        assert!(matches!(result.kind, ExprKind::BridgeToBlock { .. }));
    }

    #[test]
    fn test_coerce_autoclosure_wraps_in_implicit_closure() {
        let world = TestWorld::new();
        let mut to_fun = crate::typing::ty::FnTy::new(Ty::unit(), world.int32());
        to_fun.auto_closure = true;
        let to = Ty::Func(Box::new(to_fun));

        let expr = world.typed_expr(world.int32());
        let solution = Solution::new();
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.coerce_to_type(expr, &to, &Locator::new(0)).unwrap();
        match &result.kind {
            ExprKind::ImplicitClosure { body, .. } => assert_eq!(body.ty, world.int32()),
            kind => panic!("expected an implicit closure, found {:?}", kind),
        }
    }

    #[test]
    fn test_tuple_shuffle_with_caller_default() {
        // f(1, y: "hi") where f(x: Int32, y: String, z: Int32 = #line):
        // sources are [0, 1, caller-default] and the owner is f.
        let mut world = TestWorld::new();
        let f = world.fn_with_line_default();

        let arg = world.tuple_expr(vec![
            (None, world.int_literal_typed("1", world.int32())),
            (Some(str!("y")), world.string_literal_typed("hi", world.string_ty())),
        ]);
        let param_ty = world.tc().decl(f).as_func().unwrap().ty.clone();
        let param_fields = match &param_ty {
            Ty::Func(fun) => fun.input.as_tuple().unwrap().to_vec(),
            _ => panic!("expected a function type"),
        };

        let apply_anchor = 7777;
        let locator = Locator::new(apply_anchor).with(PathElt::ApplyArgument);
        let mut solution = Solution::new();
        solution.default_arg_owners.insert(locator.clone(), f);

        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter
            .coerce_to_type(arg, &Ty::Tuple(param_fields), &locator)
            .unwrap();

        match &result.kind {
            ExprKind::TupleShuffle {
                sources,
                default_args_owner,
                caller_defaults,
                ..
            } => {
                assert_eq!(
                    sources,
                    &vec![
                        ShuffleSource::Field(0),
                        ShuffleSource::Field(1),
                        ShuffleSource::CallerDefaultInitialize,
                    ]
                );
                assert_eq!(*default_args_owner, Some(f));
                assert_eq!(caller_defaults.len(), 1);
                // The synthesized default is the converted #line literal.
                assert_eq!(caller_defaults[0].ty, world.int32());
            }
            kind => panic!("expected a tuple shuffle, found {:?}", kind),
        }
    }

    #[test]
    fn test_compute_tuple_shuffle_invariants() {
        let from = vec![
            TupleField::new(Ty::BuiltinInt(64)),
            TupleField::named("y", Ty::BuiltinInt(64)),
        ];
        let mut z = TupleField::named("z", Ty::BuiltinInt(64));
        z.default = DefaultArgKind::Normal;
        let to = vec![
            TupleField::named("y", Ty::BuiltinInt(64)),
            TupleField::new(Ty::BuiltinInt(64)),
            z,
        ];

        let (sources, variadic_args) = compute_tuple_shuffle(&from, &to).unwrap();
        assert_eq!(sources.len(), to.len());
        assert!(variadic_args.is_empty());
        assert_eq!(sources[0], ShuffleSource::Field(1));
        assert_eq!(sources[1], ShuffleSource::Field(0));
        assert_eq!(sources[2], ShuffleSource::DefaultInitialize);
    }

    #[test]
    fn test_compute_tuple_shuffle_variadic_collects_tail() {
        let from = vec![
            TupleField::new(Ty::BuiltinInt(64)),
            TupleField::new(Ty::BuiltinInt(64)),
            TupleField::new(Ty::BuiltinInt(64)),
        ];
        let mut rest = TupleField::new(Ty::slice(Ty::BuiltinInt(64)));
        rest.variadic = true;
        let to = vec![TupleField::new(Ty::BuiltinInt(64)), rest];

        let (sources, variadic_args) = compute_tuple_shuffle(&from, &to).unwrap();
        assert_eq!(sources[0], ShuffleSource::Field(0));
        assert_eq!(sources[1], ShuffleSource::Variadic);
        assert_eq!(variadic_args, vec![1, 2]);
        // The variadic marker appears exactly once, in the last position.
        assert_eq!(
            sources
                .iter()
                .filter(|s| matches!(s, ShuffleSource::Variadic))
                .count(),
            1
        );
    }

    #[test]
    fn test_compute_tuple_shuffle_rejects_missing_field() {
        let from = vec![TupleField::new(Ty::BuiltinInt(64))];
        let to = vec![
            TupleField::new(Ty::BuiltinInt(64)),
            TupleField::new(Ty::BuiltinInt(64)),
        ];
        assert!(compute_tuple_shuffle(&from, &to).is_none());
    }
}
