use crate::ast::{DeclId, Expr, ExprKind};
use crate::errors::AsterResult;
use crate::typing::apply::ExprRewriter;
use crate::typing::context::KnownProtocolKind;
use crate::typing::locator::Locator;
use crate::typing::ty::{Ty, TupleField};

/// Either a direct type or the name of an associated type to be resolved
/// through a conformance.
#[derive(Clone, Debug)]
pub enum TypeOrName {
    Ty(Ty),
    Name(&'static str),
}

impl<'a> ExprRewriter<'a> {
    pub(crate) fn handle_integer_literal(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let protocol =
            tc.get_protocol(&expr.src, KnownProtocolKind::IntegerLiteralConvertible)?;
        let builtin_protocol =
            tc.get_protocol(&expr.src, KnownProtocolKind::BuiltinIntegerLiteralConvertible)?;

        // For type-sugar reasons, prefer the spelling of the default
        // literal type.
        let mut ty = self.simplify_ty(&expr.ty);
        if let Some(default_ty) = tc.get_default_ty(protocol) {
            if tc.ctx.tys_equal(&default_ty, &ty) {
                ty = default_ty;
            }
        }
        if let Some(float_protocol) =
            tc.ctx.known_protocol(KnownProtocolKind::FloatLiteralConvertible)
        {
            if let Some(default_float_ty) = tc.get_default_ty(float_protocol) {
                if tc.ctx.tys_equal(&default_float_ty, &ty) {
                    ty = default_float_ty;
                }
            }
        }

        let max_ty = tc.ctx.stdlib.max_builtin_int.clone();
        let opened = expr.ty.clone();
        self.convert_literal(
            expr,
            ty,
            &opened,
            Some(protocol),
            TypeOrName::Name("IntegerLiteralType"),
            "convertFromIntegerLiteral",
            builtin_protocol,
            TypeOrName::Ty(max_ty),
            "_convertFromBuiltinIntegerLiteral",
            None,
            "broken IntegerLiteralConvertible protocol",
            "broken BuiltinIntegerLiteralConvertible protocol",
        )
    }

    pub(crate) fn handle_float_literal(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let protocol = tc.get_protocol(&expr.src, KnownProtocolKind::FloatLiteralConvertible)?;
        let builtin_protocol =
            tc.get_protocol(&expr.src, KnownProtocolKind::BuiltinFloatLiteralConvertible)?;

        let mut ty = self.simplify_ty(&expr.ty);
        if let Some(default_ty) = tc.get_default_ty(protocol) {
            if tc.ctx.tys_equal(&default_ty, &ty) {
                ty = default_ty;
            }
        }

        let max_ty = tc.ctx.stdlib.max_builtin_float.clone();
        let opened = expr.ty.clone();
        self.convert_literal(
            expr,
            ty,
            &opened,
            Some(protocol),
            TypeOrName::Name("FloatLiteralType"),
            "convertFromFloatLiteral",
            builtin_protocol,
            TypeOrName::Ty(max_ty),
            "_convertFromBuiltinFloatLiteral",
            None,
            "broken FloatLiteralConvertible protocol",
            "broken BuiltinFloatLiteralConvertible protocol",
        )
    }

    pub(crate) fn handle_character_literal(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let protocol =
            tc.get_protocol(&expr.src, KnownProtocolKind::CharacterLiteralConvertible)?;
        let builtin_protocol =
            tc.get_protocol(&expr.src, KnownProtocolKind::BuiltinCharacterLiteralConvertible)?;

        let mut ty = self.simplify_ty(&expr.ty);
        if let Some(default_ty) = tc.get_default_ty(protocol) {
            if tc.ctx.tys_equal(&default_ty, &ty) {
                ty = default_ty;
            }
        }

        let opened = expr.ty.clone();
        self.convert_literal(
            expr,
            ty,
            &opened,
            Some(protocol),
            TypeOrName::Name("CharacterLiteralType"),
            "convertFromCharacterLiteral",
            builtin_protocol,
            TypeOrName::Ty(Ty::BuiltinInt(21)),
            "_convertFromBuiltinCharacterLiteral",
            Some(|ty: &Ty| ty.is_builtin_int(21)),
            "broken CharacterLiteralConvertible protocol",
            "broken BuiltinCharacterLiteralConvertible protocol",
        )
    }

    pub(crate) fn handle_string_literal(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let tc = self.tc;
        let protocol = tc.get_protocol(&expr.src, KnownProtocolKind::StringLiteralConvertible)?;
        let builtin_protocol =
            tc.get_protocol(&expr.src, KnownProtocolKind::BuiltinStringLiteralConvertible)?;

        let mut ty = self.simplify_ty(&expr.ty);
        if let Some(default_ty) = tc.get_default_ty(protocol) {
            if tc.ctx.tys_equal(&default_ty, &ty) {
                ty = default_ty;
            }
        }

        // A builtin string literal is a (pointer, length, is-ascii) triple.
        let builtin_arg_ty = Ty::tuple(vec![
            TupleField::new(Ty::BuiltinRawPointer),
            TupleField::new(Ty::BuiltinInt(64)),
            TupleField::new(Ty::BuiltinInt(1)),
        ]);

        let opened = expr.ty.clone();
        self.convert_literal(
            expr,
            ty,
            &opened,
            Some(protocol),
            TypeOrName::Name("StringLiteralType"),
            "convertFromStringLiteral",
            builtin_protocol,
            TypeOrName::Ty(builtin_arg_ty),
            "_convertFromBuiltinStringLiteral",
            None,
            "broken StringLiteralConvertible protocol",
            "broken BuiltinStringLiteralConvertible protocol",
        )
    }

    /// Convert a literal expression to its final type via the two-level
    /// protocol scheme: if the type conforms to the builtin protocol, call
    /// the builtin witness directly; otherwise convert through the general
    /// protocol's literal type first, then call the general witness.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn convert_literal(
        &mut self,
        literal: Box<Expr>,
        ty: Ty,
        _opened: &Ty,
        protocol: Option<DeclId>,
        literal_ty: TypeOrName,
        literal_fn_name: &str,
        builtin_protocol: DeclId,
        builtin_literal_ty: TypeOrName,
        builtin_fn_name: &str,
        is_builtin_arg_ty: Option<fn(&Ty) -> bool>,
        broken_protocol_msg: &str,
        broken_builtin_msg: &str,
    ) -> AsterResult<Box<Expr>> {
        let tc = self.tc;

        if let Some(builtin_conformance) = tc.conforms_to_protocol(&ty, builtin_protocol) {
            // The type conforms to the builtin protocol directly.
            let arg_ty = match &builtin_literal_ty {
                TypeOrName::Ty(arg_ty) => arg_ty.clone(),
                TypeOrName::Name(name) => tc.get_witness_ty(
                    &ty,
                    builtin_protocol,
                    builtin_conformance,
                    name,
                    broken_builtin_msg,
                )?,
            };

            if let Some(is_builtin_arg_ty) = is_builtin_arg_ty {
                if !is_builtin_arg_ty(&arg_ty) {
                    let loc = tc.decl(builtin_protocol).loc.clone();
                    tc.diags.error(broken_builtin_msg, loc.clone());
                    return Err(crate::errors::AsterError::new(
                        crate::errors::AsterErrorKind::BrokenProtocol,
                        broken_builtin_msg,
                        loc,
                    ));
                }
            }

            // The literal itself has the builtin argument type.
            let mut literal = literal;
            literal.ty = arg_ty;

            let src = literal.src.clone();
            let base = Expr::implicit(
                ExprKind::Metatype {
                    base: None,
                    has_type_repr: false,
                },
                Ty::metatype(ty.clone()),
                src,
            );
            let mut result = self.call_witness(
                base,
                builtin_protocol,
                builtin_conformance,
                builtin_fn_name,
                vec![literal],
                broken_builtin_msg,
            )?;
            result.ty = ty;
            return Ok(result);
        }

        // Otherwise the type conforms to the general protocol.
        let protocol = protocol.expect("literal requirements should have stopped recursion");
        let conformance = tc
            .conforms_to_protocol(&ty, protocol)
            .expect("type must conform to the literal protocol");

        let arg_ty = match &literal_ty {
            TypeOrName::Ty(arg_ty) => arg_ty.clone(),
            TypeOrName::Name(name) => {
                tc.get_witness_ty(&ty, protocol, conformance, name, broken_protocol_msg)?
            }
        };

        // Convert the literal to the argument type through the builtin
        // protocol first.
        let literal = self.convert_literal(
            literal,
            arg_ty.clone(),
            &arg_ty,
            None,
            TypeOrName::Name(""),
            "",
            builtin_protocol,
            builtin_literal_ty,
            builtin_fn_name,
            is_builtin_arg_ty,
            broken_protocol_msg,
            broken_builtin_msg,
        )?;

        // Then convert the result to the final literal type.
        let src = literal.src.clone();
        let base = Expr::implicit(
            ExprKind::Metatype {
                base: None,
                has_type_repr: false,
            },
            Ty::metatype(ty.clone()),
            src,
        );
        let mut result = self.call_witness(
            base,
            protocol,
            conformance,
            literal_fn_name,
            vec![literal],
            broken_protocol_msg,
        )?;
        result.ty = ty;
        Ok(result)
    }

    pub(crate) fn visit_interpolated_string(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let tc = self.tc;
        let opened = expr.ty.clone();
        let ty = self.simplify_ty(&opened);
        expr.ty = ty.clone();

        let interpolation_proto =
            tc.get_protocol(&expr.src, KnownProtocolKind::StringInterpolationConvertible)?;
        let witness = tc.find_named_witness(
            &ty,
            interpolation_proto,
            "convertFromStringInterpolation",
            "broken StringInterpolationConvertible protocol",
        )?;

        // Build a reference to the conversion member on the string type.
        let type_ref = Expr::implicit(
            ExprKind::Metatype {
                base: None,
                has_type_repr: false,
            },
            Ty::metatype(ty.clone()),
            expr.src.clone(),
        );
        let anchor = expr.id;
        let member_ref = self.build_member_ref(
            type_ref,
            witness,
            &expr.src.clone(),
            tc.get_unopened_type_of_reference(witness),
            &Locator::new(anchor),
            true,
        )?;

        // Coerce every segment to the destination type.
        let segments = match &mut expr.kind {
            ExprKind::InterpolatedStringLiteral { segments, .. } => std::mem::take(segments),
            _ => unreachable!(),
        };
        let mut coerced = vec![];
        for (index, segment) in segments.into_iter().enumerate() {
            let locator =
                Locator::new(anchor).with(crate::typing::locator::PathElt::InterpolationArgument(index));
            coerced.push(*self.coerce_to_type(Box::new(segment), &ty, &locator)?);
        }

        let argument = if coerced.len() == 1 {
            Box::new(coerced.pop().unwrap())
        } else {
            let fields = coerced
                .iter()
                .map(|_| TupleField::new(ty.clone()))
                .collect::<Vec<_>>();
            let names = coerced.iter().map(|_| None).collect();
            Expr::implicit(
                ExprKind::Tuple {
                    elements: coerced,
                    names,
                },
                Ty::tuple(fields),
                expr.src.clone(),
            )
        };

        let member_ty = member_ref.ty.clone();
        let call = Expr::implicit(
            ExprKind::Call {
                callee: member_ref,
                arg: argument,
                call_kind: crate::ast::CallKind::Plain,
                is_super: false,
            },
            Ty::unit(),
            expr.src.clone(),
        );
        let semantic = self.finish_apply(call, member_ty, Locator::new(anchor))?;

        if let ExprKind::InterpolatedStringLiteral { semantic: slot, .. } = &mut expr.kind {
            *slot = Some(semantic);
        }
        Ok(expr)
    }

    pub(crate) fn visit_array_literal(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        self.visit_collection_literal(
            expr,
            KnownProtocolKind::ArrayLiteralConvertible,
            "convertFromArrayLiteral",
            "broken ArrayLiteralConvertible protocol",
        )
    }

    pub(crate) fn visit_dictionary_literal(&mut self, expr: Box<Expr>) -> AsterResult<Box<Expr>> {
        self.visit_collection_literal(
            expr,
            KnownProtocolKind::DictionaryLiteralConvertible,
            "convertFromDictionaryLiteral",
            "broken DictionaryLiteralConvertible protocol",
        )
    }

    /// Array and dictionary literals lower to a call to the collection
    /// protocol's conversion witness, attached as the semantic form.
    fn visit_collection_literal(
        &mut self,
        expr: Box<Expr>,
        proto_kind: KnownProtocolKind,
        witness_name: &str,
        broken_msg: &str,
    ) -> AsterResult<Box<Expr>> {
        let mut expr = expr;
        let tc = self.tc;
        let ty = self.simplify_ty(&expr.ty);

        let proto = tc.get_protocol(&expr.src, proto_kind)?;
        let conformance = tc
            .conforms_to_protocol(&ty, proto)
            .expect("type does not conform to collection literal protocol?");

        let sub = match &mut expr.kind {
            ExprKind::ArrayLiteral { sub, .. } | ExprKind::DictionaryLiteral { sub, .. } => {
                std::mem::replace(sub, Box::new(crate::typing::apply::error_expr()))
            }
            _ => unreachable!(),
        };

        let type_ref = Expr::implicit(
            ExprKind::Metatype {
                base: None,
                has_type_repr: false,
            },
            Ty::metatype(ty.clone()),
            expr.src.clone(),
        );
        let semantic = self.call_witness(
            type_ref,
            proto,
            conformance,
            witness_name,
            vec![sub],
            broken_msg,
        )?;

        match &mut expr.kind {
            ExprKind::ArrayLiteral { semantic: slot, .. }
            | ExprKind::DictionaryLiteral { semantic: slot, .. } => {
                *slot = Some(semantic);
            }
            _ => unreachable!(),
        }
        expr.ty = ty;
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::apply::fixtures::TestWorld;
    use crate::typing::solution::Solution;

    #[test]
    fn test_integer_literal_builtin_conversion() {
        // `42` with target Int32, which conforms to both protocols:
        // Int32._convertFromBuiltinIntegerLiteral(42 : Builtin.Int2048).
        let mut world = TestWorld::new();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution.type_bindings.insert(tv, world.int32());

        let literal = world.int_literal("42", Ty::Var(tv));
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.handle_integer_literal(literal).unwrap();

        assert_eq!(result.ty, world.int32());
        // The conversion is a single call to the builtin witness with the
        // retyped literal as its only argument.
        let (callee, arg) = match &result.kind {
            ExprKind::Call { callee, arg, .. } => (callee, arg),
            kind => panic!("expected a call, found {:?}", kind),
        };
        assert_eq!(
            arg.semantics_providing().ty,
            world.tc().ctx.stdlib.max_builtin_int
        );
        let callee_decl = match &callee.semantics_providing().kind {
            ExprKind::Call { callee, .. } => match &callee.semantics_providing().kind {
                ExprKind::DeclRef { decl, .. } => *decl,
                kind => panic!("expected a declaration reference, found {:?}", kind),
            },
            ExprKind::DeclRef { decl, .. } => *decl,
            kind => panic!("expected a witness reference, found {:?}", kind),
        };
        assert_eq!(
            world.tc().decl(callee_decl).name,
            "_convertFromBuiltinIntegerLiteral"
        );
    }

    #[test]
    fn test_integer_literal_two_step_conversion() {
        // A type conforming only to the general protocol converts its
        // literal through the builtin literal type first.
        let mut world = TestWorld::new();
        let wrapper = world.int_wrapper();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution.type_bindings.insert(tv, Ty::Nominal(wrapper));

        let literal = world.int_literal("7", Ty::Var(tv));
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.handle_integer_literal(literal).unwrap();

        assert_eq!(result.ty, Ty::Nominal(wrapper));
        // The outer call's callee is the general witness.
        match &result.kind {
            ExprKind::Call { arg, .. } => {
                // The inner argument was converted through the builtin
                // protocol and has the wrapper's literal type.
                assert_eq!(arg.semantics_providing().ty, world.int32());
            }
            kind => panic!("expected a call, found {:?}", kind),
        }
    }

    #[test]
    fn test_array_literal_lowers_to_conversion_witness_call() {
        // [1, 2, 3] with target IntList: the semantic form becomes a call
        // to IntList.convertFromArrayLiteral with the element tuple as
        // argument.
        let mut world = TestWorld::new();
        let list = world.array_literal_list();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution
            .type_bindings
            .insert(tv, crate::typing::ty::Ty::Nominal(list));

        let sub = world.tuple_expr(vec![
            (None, world.typed_expr(world.int32())),
            (None, world.typed_expr(world.int32())),
            (None, world.typed_expr(world.int32())),
        ]);
        let literal = Expr::new(
            ExprKind::ArrayLiteral {
                sub,
                semantic: None,
            },
            crate::typing::ty::Ty::Var(tv),
            Default::default(),
        );

        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.visit_array_literal(literal).unwrap();

        assert_eq!(result.ty, crate::typing::ty::Ty::Nominal(list));
        match &result.kind {
            ExprKind::ArrayLiteral { semantic, .. } => {
                let semantic = semantic.as_ref().expect("missing semantic form");
                assert_eq!(semantic.ty, crate::typing::ty::Ty::Nominal(list));
                match &semantic.kind {
                    ExprKind::Call { arg, .. } => {
                        // The elements were collected into the variadic
                        // parameter by a tuple shuffle.
                        assert!(matches!(arg.kind, ExprKind::TupleShuffle { .. }));
                    }
                    kind => panic!("expected a call, found {:?}", kind),
                }
            }
            kind => panic!("expected an array literal, found {:?}", kind),
        }
    }

    #[test]
    fn test_integer_literal_prefers_default_sugar() {
        let mut world = TestWorld::new();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        // Bound to the canonical form of the default literal type.
        solution.type_bindings.insert(tv, world.int32());
        world.set_integer_literal_default(world.int32());

        let literal = world.int_literal("1", Ty::Var(tv));
        let tc = world.tc();
        let mut rewriter = ExprRewriter::new(tc, &solution);
        let result = rewriter.handle_integer_literal(literal).unwrap();
        assert_eq!(result.ty, world.int32());
    }
}
