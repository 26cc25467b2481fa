use crate::ast::{Decl, DeclId, DeclKind, Expr, ExprKind};
use crate::errors::{AsterError, AsterErrorKind, AsterResult, Diagnostics};
use crate::span::Source;
use crate::typing::context::{ConformanceSource, KnownProtocolKind, TyCtx};
use crate::typing::subst::{ApplySubst, ConformanceMap, Subst, Substitution};
use crate::typing::ty::{GenericParamList, Quals, Ty};
use crate::ast::CheckedCastKind;

/// The type-checker surface the rewriter calls into. Owns the context and
/// the diagnostics sink.
#[derive(Debug, Default)]
pub struct TypeChecker {
    pub ctx: TyCtx,
    pub diags: Diagnostics,
}

impl TypeChecker {
    pub fn new(ctx: TyCtx) -> TypeChecker {
        TypeChecker {
            ctx,
            diags: Diagnostics::new(),
        }
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        self.ctx.decl(id)
    }

    /// Retrieve a known protocol, diagnosing its absence.
    pub fn get_protocol(&self, loc: &Source, kind: KnownProtocolKind) -> AsterResult<DeclId> {
        self.ctx.known_protocol(kind).ok_or_else(|| {
            AsterError::new(
                AsterErrorKind::BrokenProtocol,
                format!("standard library protocol {} is not available", kind),
                loc.clone(),
            )
        })
    }

    pub fn get_default_ty(&self, proto: DeclId) -> Option<Ty> {
        self.ctx.default_ty(proto).cloned()
    }

    pub fn conforms_to_protocol(&self, ty: &Ty, proto: DeclId) -> Option<ConformanceSource> {
        self.ctx.conforms_to_protocol(ty, proto)
    }

    /// Find the witness for a named requirement of `proto` on `ty`. For an
    /// archetype there is no witness table and the requirement itself is
    /// returned.
    pub fn find_named_witness(
        &self,
        ty: &Ty,
        proto: DeclId,
        name: &str,
        broken_msg: &str,
    ) -> AsterResult<DeclId> {
        let requirement = match self.ctx.protocol_requirement(proto, name) {
            Some(req) => req,
            None => {
                let loc = self.decl(proto).loc.clone();
                self.diags.error(broken_msg, loc.clone());
                return Err(AsterError::new(AsterErrorKind::BrokenProtocol, broken_msg, loc));
            }
        };

        let source = self
            .conforms_to_protocol(ty, proto)
            .expect("protocol conformance broken?");

        if ty.rvalue_ty().is_archetype() {
            return Ok(requirement);
        }

        match self.ctx.witness(source, proto, name) {
            Some(witness) => Ok(witness),
            None => {
                let loc = self.decl(proto).loc.clone();
                self.diags.error(broken_msg, loc.clone());
                Err(AsterError::new(AsterErrorKind::BrokenProtocol, broken_msg, loc))
            }
        }
    }

    /// The type witness for an associated type of `proto` on `ty`.
    pub fn get_witness_ty(
        &self,
        ty: &Ty,
        proto: DeclId,
        source: ConformanceSource,
        name: &str,
        broken_msg: &str,
    ) -> AsterResult<Ty> {
        self.ctx.type_witness(source, proto, name).ok_or_else(|| {
            let loc = self.decl(proto).loc.clone();
            self.diags.error(broken_msg, loc.clone());
            AsterError::new(AsterErrorKind::BrokenProtocol, broken_msg, loc)
        })
    }

    pub fn lookup_member(&self, ty: &Ty, name: &str) -> Vec<DeclId> {
        self.ctx.lookup_member(ty, name)
    }

    /// Load from an lvalue, if the expression is one.
    pub fn coerce_to_rvalue(&self, expr: Box<Expr>) -> Box<Expr> {
        if let Ty::LValue(object, _) = &expr.ty {
            let object = (**object).clone();
            let src = expr.src.clone();
            return Expr::implicit(ExprKind::Load { sub: expr }, object, src);
        }
        expr
    }

    /// Make the expression and everything inside it materializable: loads
    /// are inserted at lvalue positions, recursing through tuple literals
    /// and parentheses.
    pub fn coerce_to_materializable(&self, expr: Box<Expr>) -> Box<Expr> {
        let mut expr = expr;
        match &mut expr.kind {
            ExprKind::Paren(sub) => {
                let inner = std::mem::replace(sub, Box::new(placeholder_expr()));
                *sub = self.coerce_to_materializable(inner);
                expr.ty = sub.ty.clone();
                expr
            }
            ExprKind::Tuple { elements, .. } => {
                for element in elements.iter_mut() {
                    let inner = Box::new(std::mem::replace(element, placeholder_expr()));
                    *element = *self.coerce_to_materializable(inner);
                }
                if let Ty::Tuple(fields) = &mut expr.ty {
                    for (field, element) in fields.iter_mut().zip(elements.iter()) {
                        field.ty = element.ty.clone();
                    }
                }
                expr
            }
            _ => self.coerce_to_rvalue(expr),
        }
    }

    /// The type of a reference to the given declaration, before opening.
    pub fn get_unopened_type_of_reference(&self, decl: DeclId) -> Ty {
        self.decl(decl).reference_ty().clone()
    }

    /// Build a reference to a declaration that has already survived
    /// validation.
    pub fn build_checked_ref_expr(&self, decl: DeclId, loc: &Source, implicit: bool) -> Box<Expr> {
        let ty = self.get_unopened_type_of_reference(decl);
        let kind = ExprKind::DeclRef {
            decl,
            specialized: false,
            generic_args: vec![],
        };
        if implicit {
            Expr::implicit(kind, ty, loc.clone())
        } else {
            Expr::new(kind, ty, loc.clone())
        }
    }

    pub fn build_ref_expr(&self, decl: DeclId, loc: &Source, implicit: bool) -> Box<Expr> {
        self.build_checked_ref_expr(decl, loc, implicit)
    }

    /// Wrap a declaration reference in a specialization node carrying the
    /// encoded substitutions.
    pub fn build_specialize_expr(
        &self,
        reference: Box<Expr>,
        subst_ty: Ty,
        subs: &Subst,
        conformances: &ConformanceMap,
    ) -> Box<Expr> {
        let generic_params = self
            .decl_generic_params(&reference)
            .cloned()
            .unwrap_or_default();
        let substitutions = self.encode_substitutions(&generic_params, subs, conformances);
        let src = reference.src.clone();
        let implicit = reference.implicit;
        let mut expr = Expr::new(
            ExprKind::Specialize {
                sub: reference,
                substitutions,
            },
            subst_ty,
            src,
        );
        expr.implicit = implicit;
        expr
    }

    fn decl_generic_params(&self, reference: &Expr) -> Option<&GenericParamList> {
        match &reference.semantics_providing().kind {
            ExprKind::DeclRef { decl, .. } | ExprKind::OtherConstructorRef { decl } => {
                self.decl(*decl).generic_params()
            }
            _ => None,
        }
    }

    /// Flatten an archetype substitution map into the encoded substitution
    /// list attached to concrete declaration references.
    pub fn encode_substitutions(
        &self,
        generic_params: &GenericParamList,
        subs: &Subst,
        conformances: &ConformanceMap,
    ) -> Vec<Substitution> {
        let mut encoded = vec![];
        for archetype in generic_params.archetypes() {
            let replacement = match subs.get(&archetype) {
                Some(replacement) => replacement.clone(),
                None => continue,
            };
            let required = &self.ctx.archetype(archetype).protocols;
            let confs = required
                .iter()
                .map(|proto| {
                    conformances
                        .get(&archetype)
                        .and_then(|m| m.get(proto))
                        .copied()
                        .unwrap_or(ConformanceSource::Abstract)
                })
                .collect();
            encoded.push(Substitution {
                archetype,
                replacement,
                conformances: confs,
            });
        }
        encoded
    }

    /// Verify a substitution map against the declared conformance
    /// requirements of its archetypes, producing the conformance map. The
    /// solver should have prevented any failure here.
    pub fn check_substitutions(
        &self,
        subs: &Subst,
        loc: &Source,
    ) -> AsterResult<ConformanceMap> {
        let mut conformances = ConformanceMap::new();
        for (&archetype, replacement) in subs.iter() {
            let required = self.ctx.archetype(archetype).protocols.clone();
            let entry = conformances.entry(archetype).or_default();
            for proto in required {
                match self.conforms_to_protocol(replacement, proto) {
                    Some(source) => {
                        entry.insert(proto, source);
                    }
                    None => {
                        let msg = format!(
                            "substitution {} does not satisfy a conformance requirement",
                            replacement
                        );
                        self.diags.error(&msg, loc.clone());
                        return Err(AsterError::new(AsterErrorKind::BrokenProtocol, msg, loc.clone()));
                    }
                }
            }
        }
        Ok(conformances)
    }

    pub fn subst_type(&self, ty: Ty, subs: &Subst) -> Ty {
        ty.apply_subst(subs)
    }

    /// Resolve a reference to a type declaration in the current context.
    pub fn resolve_type_in_context(&self, decl: DeclId, specialized: bool) -> Ty {
        match &self.decl(decl).kind {
            DeclKind::TypeAlias(alias) => alias.underlying.clone(),
            DeclKind::Protocol(_) => Ty::Protocol(decl),
            DeclKind::Nominal(nominal) => {
                if nominal.generic_params.is_some() && !specialized {
                    Ty::Nominal(decl)
                } else {
                    self.ctx
                        .declared_ty_in_context(crate::ast::DeclContainer::Nominal(decl))
                        .unwrap_or(Ty::Nominal(decl))
                }
            }
            _ => panic!("not a type declaration"),
        }
    }

    pub fn get_optional_type(&self, loc: &Source, value: Ty) -> AsterResult<Ty> {
        self.require_optional_intrinsics(loc)?;
        Ok(Ty::optional(value))
    }

    pub fn require_optional_intrinsics(&self, loc: &Source) -> AsterResult<()> {
        if self.ctx.stdlib.optional_decl.is_none() {
            let msg = "optional intrinsics are not available";
            self.diags.error(msg, loc.clone());
            return Err(AsterError::new(AsterErrorKind::BrokenProtocol, msg, loc.clone()));
        }
        Ok(())
    }

    pub fn get_array_slice_type(&self, loc: &Source, elem: Ty) -> AsterResult<Ty> {
        if self.ctx.stdlib.slice_decl.is_none() {
            let msg = "array slice intrinsics are not available";
            self.diags.error(msg, loc.clone());
            return Err(AsterError::new(AsterErrorKind::BrokenProtocol, msg, loc.clone()));
        }
        Ok(Ty::slice(elem))
    }

    pub fn get_super_class_of(&self, ty: &Ty) -> Option<Ty> {
        self.ctx.superclass_of(ty)
    }

    pub fn is_subtype_of(&self, ty: &Ty, of: &Ty) -> bool {
        self.ctx.is_subtype_of(ty, of)
    }

    /// Build a reference to the array injection function specialized for the
    /// given slice type.
    pub fn build_array_injection_fn_ref(
        &self,
        slice_ty: &Ty,
        _bound_ty: &Ty,
        loc: &Source,
    ) -> AsterResult<Box<Expr>> {
        let decl = self.ctx.stdlib.array_injection_fn.ok_or_else(|| {
            let msg = "array injection function is not available";
            self.diags.error(msg, loc.clone());
            AsterError::new(AsterErrorKind::BrokenProtocol, msg, loc.clone())
        })?;

        let elem_ty = self
            .ctx
            .as_slice(slice_ty)
            .expect("injection requires a slice type");

        let reference = self.build_checked_ref_expr(decl, loc, true);
        match self.decl(decl).generic_params() {
            Some(params) => {
                let subs =
                    Subst::from_types(params.archetypes(), std::iter::once(elem_ty));
                let conformances = self.check_substitutions(&subs, loc)?;
                let subst_ty = match self.subst_type(reference.ty.clone(), &subs) {
                    Ty::Poly(poly) => Ty::Func(Box::new(poly.fun)),
                    ty => ty,
                };
                Ok(self.build_specialize_expr(reference, subst_ty, &subs, &conformances))
            }
            None => Ok(reference),
        }
    }

    /// Classify a checked cast between two fully resolved types.
    pub fn type_check_checked_cast(&self, from: &Ty, to: &Ty, loc: &Source) -> CheckedCastKind {
        let from = from.rvalue_ty();

        // A cast that can be proven statically is really a coercion.
        if self.is_subtype_of(from, to) {
            return CheckedCastKind::InvalidCoercible;
        }

        if from.is_existential() {
            return if to.is_archetype() {
                CheckedCastKind::ExistentialToArchetype
            } else {
                CheckedCastKind::ExistentialToConcrete
            };
        }

        if from.is_archetype() {
            return if to.is_archetype() {
                CheckedCastKind::ArchetypeToArchetype
            } else {
                CheckedCastKind::ArchetypeToConcrete
            };
        }

        if self.ctx.is_class_ty(from) && to.is_archetype() {
            return CheckedCastKind::SuperToArchetype;
        }

        if self.ctx.is_class_ty(from) && self.is_subtype_of(to, from) {
            return CheckedCastKind::Downcast;
        }

        self.diags.error(
            format!("cannot convert {} to unrelated type {}", from, to),
            loc.clone(),
        );
        CheckedCastKind::Unresolved
    }

    /// The literal protocol corresponding to a literal expression, if it is
    /// one.
    pub fn get_literal_protocol(&self, expr: &Expr) -> Option<DeclId> {
        let kind = match &expr.kind {
            ExprKind::IntegerLiteral(_) => KnownProtocolKind::IntegerLiteralConvertible,
            ExprKind::FloatLiteral(_) => KnownProtocolKind::FloatLiteralConvertible,
            ExprKind::StringLiteral(_) | ExprKind::InterpolatedStringLiteral { .. } => {
                KnownProtocolKind::StringLiteralConvertible
            }
            ExprKind::CharacterLiteral(_) => KnownProtocolKind::CharacterLiteralConvertible,
            ExprKind::ArrayLiteral { .. } => KnownProtocolKind::ArrayLiteralConvertible,
            ExprKind::DictionaryLiteral { .. } => KnownProtocolKind::DictionaryLiteralConvertible,
            _ => return None,
        };
        self.ctx.known_protocol(kind)
    }

    /// Replace the result type of an application with the sugared spelling
    /// of its argument types, when they agree canonically.
    pub fn substitute_input_sugar_type_for_result(&self, apply: &mut Expr) {
        let arg = match &apply.kind {
            ExprKind::Call { arg, .. } => arg,
            _ => return,
        };

        let mut sugar: Option<Ty> = None;
        let candidates: Vec<&Ty> = match &arg.semantics_providing().kind {
            ExprKind::Tuple { elements, .. } => elements.iter().map(|e| &e.ty).collect(),
            _ => vec![&arg.ty],
        };
        for candidate in candidates {
            match &sugar {
                None => sugar = Some(candidate.clone()),
                Some(existing) if self.ctx.tys_equal(existing, candidate) => {}
                Some(_) => return,
            }
        }

        if let Some(sugar) = sugar {
            if self.ctx.tys_equal(&apply.ty, &sugar) {
                apply.ty = sugar;
            }
        }
    }

    /// Compute the capture set of a closure body: the value declarations it
    /// references.
    pub fn compute_captures(&self, body: &Expr, captures: &mut Vec<DeclId>) {
        captures.clear();
        collect_decl_refs(body, captures);
        captures.sort();
        captures.dedup();
    }

    /// Hook for multi-statement closure bodies, whose checking is not part
    /// of solution application.
    pub fn type_check_closure_body(&self, _closure: &Expr) -> AsterResult<()> {
        Ok(())
    }

    /// The qualifiers given to the result of a member access.
    pub fn member_access_lvalue(&self, object: Ty) -> Ty {
        Ty::lvalue(object, Quals::DEFAULT_FOR_MEMBER_ACCESS)
    }

    /// Collapse a polymorphic function type whose generic parameters have
    /// all been substituted away.
    pub fn collapse_specialized_poly_fn(&self, ty: Ty, subs: &Subst) -> Ty {
        if let Ty::Poly(poly) = &ty {
            let all_replaced = poly
                .params
                .archetypes()
                .all(|archetype| subs.contains_key(&archetype));
            if all_replaced {
                let poly = match ty {
                    Ty::Poly(poly) => poly,
                    _ => unreachable!(),
                };
                return Ty::Func(Box::new(poly.fun));
            }
        }
        ty
    }
}

fn collect_decl_refs(expr: &Expr, out: &mut Vec<DeclId>) {
    if let ExprKind::DeclRef { decl, .. } = &expr.kind {
        out.push(*decl);
    }
    crate::typing::apply::for_each_child(expr, &mut |child| collect_decl_refs(child, out));
}

fn placeholder_expr() -> Expr {
    Expr {
        id: 0,
        kind: ExprKind::Error,
        ty: Ty::unit(),
        src: Source::default(),
        implicit: true,
    }
}
