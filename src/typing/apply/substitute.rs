use crate::ast::{DeclContainer, DeclId, Expr, ExprKind};
use crate::errors::AsterResult;
use crate::span::Source;
use crate::typing::solution::Solution;
use crate::typing::subst::{ConformanceMap, Subst, Substitution};
use crate::typing::ty::{GenericParamList, PolyFnTy, Ty};
use crate::typing::TypeChecker;

impl Solution {
    /// Derive the archetype-to-concrete-type map from an opened type: every
    /// type variable is annotated with the archetype it was opened from, and
    /// its fixed type is that archetype's replacement. The opened type is
    /// re-expressed with substitution sugar to keep diagnostics pretty.
    pub(crate) fn substitution_map(&self, tc: &TypeChecker, opened: &Ty) -> (Ty, Subst) {
        let mut subs = Subst::new();
        let ty = opened.clone().transform(&mut |t| match t {
            Ty::Var(tv) => {
                let simplified = self.simplify_type(tc, t);
                match tc.ctx.tyvar_info(*tv).archetype {
                    Some(archetype) => {
                        subs.insert(archetype, simplified.clone());
                        Some(Ty::Substituted(archetype, Box::new(simplified)))
                    }
                    None => Some(simplified),
                }
            }
            _ => None,
        });
        (ty, subs)
    }

    /// Specialize a reference to a polymorphic declaration with the
    /// substitutions this solution deduced for its opened type.
    pub fn specialize(
        &self,
        tc: &TypeChecker,
        expr: Box<Expr>,
        poly: &PolyFnTy,
        opened: &Ty,
    ) -> AsterResult<Box<Expr>> {
        let (ty, subs) = self.substitution_map(tc, opened);
        log::debug!("specializing {} with {}", expr.desc(), subs);

        // The solver should guarantee these substitutions always work;
        // verification is defense in depth.
        let conformances = tc.check_substitutions(&subs, &expr.src)?;

        let encoded = tc.encode_substitutions(&poly.params, &subs, &conformances);
        let src = expr.src.clone();
        let implicit = expr.implicit;
        let mut result = Expr::new(
            ExprKind::Specialize {
                sub: expr,
                substitutions: encoded,
            },
            ty,
            src,
        );
        result.implicit = implicit;
        Ok(result)
    }

    /// Compute the encoded substitution list for a polymorphic declaration
    /// reference, returning the substituted type.
    pub fn compute_substitutions(
        &self,
        tc: &TypeChecker,
        poly: &PolyFnTy,
        opened: &Ty,
        out: &mut Vec<Substitution>,
    ) -> AsterResult<Ty> {
        let (ty, subs) = self.substitution_map(tc, opened);
        let conformances = tc.check_substitutions(&subs, &Source::default())?;
        out.extend(tc.encode_substitutions(&poly.params, &subs, &conformances));
        Ok(ty)
    }
}

/// The substitutions required to convert an object type to the owner type of
/// a member access on a generic type. The sub-problem has a unique solution:
/// walk the object's class chain to the owning declaration and read off its
/// type arguments.
pub(crate) fn subst_for_base_conversion(
    tc: &TypeChecker,
    member: DeclId,
    object_ty: &Ty,
    other_tys: &mut [Ty],
    loc: &Source,
) -> AsterResult<(Subst, ConformanceMap, GenericParamList)> {
    let owner = match tc.decl(member).container {
        DeclContainer::Nominal(decl) => decl,
        _ => panic!("base conversion requires a nominal owner"),
    };
    let generic_params = tc
        .decl(owner)
        .generic_params()
        .cloned()
        .unwrap_or_default();

    // Find the specialization of the owner in the object's class chain.
    let mut ty = tc.ctx.canonicalize(object_ty.rvalue_ty());
    let args = loop {
        match &ty {
            Ty::BoundGeneric(decl, args) if *decl == owner => break args.clone(),
            Ty::Nominal(decl) if *decl == owner => break vec![],
            _ => match tc.ctx.superclass_of(&ty) {
                Some(superclass) => ty = tc.ctx.canonicalize(&superclass),
                None => panic!(
                    "object type {} is not convertible to its member's owner",
                    object_ty
                ),
            },
        }
    };

    let subs = Subst::from_types(generic_params.archetypes(), args);
    let conformances = tc.check_substitutions(&subs, loc)?;

    for other in other_tys.iter_mut() {
        let substituted = tc.subst_type(other.clone(), &subs);
        *other = tc.collapse_specialized_poly_fn(substituted, &subs);
    }

    Ok((subs, conformances, generic_params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::apply::fixtures::TestWorld;
    use crate::typing::ty::TupleField;

    #[test]
    fn test_specialize_wraps_reference() {
        let mut world = TestWorld::new();
        let generic = world.generic_identity_fn();
        let tv = world.fresh_tyvar_from(generic.archetype);
        let opened = Ty::func(
            Ty::tuple(vec![Ty::Var(tv).into()]),
            Ty::Var(tv),
        );

        let mut solution = Solution::new();
        solution.type_bindings.insert(tv, world.int32());

        let tc = world.tc();
        let reference = tc.build_checked_ref_expr(generic.decl, &Source::default(), false);
        let poly = match tc.get_unopened_type_of_reference(generic.decl) {
            Ty::Poly(poly) => poly,
            _ => panic!("expected a polymorphic reference"),
        };
        let specialized = solution
            .specialize(tc, reference, &poly, &opened)
            .unwrap();

        match &specialized.kind {
            ExprKind::Specialize { substitutions, .. } => {
                assert_eq!(substitutions.len(), 1);
                assert_eq!(substitutions[0].archetype, generic.archetype);
                assert_eq!(substitutions[0].replacement, world.int32());
            }
            kind => panic!("expected a specialization, found {:?}", kind),
        }

        // The specialized type carries substitution sugar but is
        // structurally the concrete function type.
        let canonical = world.tc().ctx.canonicalize(&specialized.ty);
        assert_eq!(
            canonical,
            Ty::func(
                Ty::tuple(vec![TupleField::new(world.int32())]),
                world.int32()
            )
        );
    }

    #[test]
    fn test_subst_for_base_conversion_reads_type_arguments() {
        let mut world = TestWorld::new();
        let stack = world.generic_stack();

        let object_ty = Ty::BoundGeneric(stack.decl, vec![world.int32()]);
        let mut other = [world.tc().get_unopened_type_of_reference(stack.push)];
        let (subs, _, params) = subst_for_base_conversion(
            world.tc(),
            stack.push,
            &object_ty,
            &mut other,
            &Source::default(),
        )
        .unwrap();

        assert_eq!(params.params.len(), 1);
        assert_eq!(subs.get(&stack.archetype), Some(&world.int32()));
        assert!(!other[0].has_type_variable());
        // The member's signature is now monomorphic over Int32.
        let canonical = world.tc().ctx.canonicalize(&other[0]);
        let fun = canonical.as_func().expect("expected a function type");
        assert_eq!(
            world.tc().ctx.canonicalize(&fun.input).rvalue_ty(),
            &world.tc().ctx.canonicalize(&Ty::BoundGeneric(
                stack.decl,
                vec![world.int32()]
            ))
        );
    }
}
