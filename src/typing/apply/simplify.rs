use crate::typing::solution::Solution;
use crate::typing::ty::Ty;
use crate::typing::TypeChecker;

impl Solution {
    /// Substitute every type variable in `ty` with its fixed type, producing
    /// a type free of variables. Sugar constructors are preserved.
    pub fn simplify_type(&self, tc: &TypeChecker, ty: &Ty) -> Ty {
        ty.clone().transform(&mut |t| match t {
            Ty::Var(tv) => {
                let fixed = self.fixed_ty(*tv).clone();
                // A binding may itself mention variables fixed elsewhere.
                Some(self.simplify_type(tc, &fixed))
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::typing::apply::fixtures::TestWorld;
    use crate::typing::solution::Solution;
    use crate::typing::ty::{Ty, TupleField, TyVar};

    #[test]
    fn test_simplify_replaces_bindings() {
        let mut world = TestWorld::new();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution
            .type_bindings
            .insert(tv, world.int32());

        let ty = Ty::tuple(vec![
            TupleField::named("x", Ty::Var(tv)),
            TupleField::new(Ty::BuiltinInt(64)),
        ]);
        let simplified = solution.simplify_type(&world.tc(), &ty);
        assert!(!simplified.has_type_variable());
        // Field names are sugar and survive simplification.
        assert_eq!(
            simplified.as_tuple().unwrap()[0].name.as_deref(),
            Some("x")
        );
    }

    #[test]
    fn test_simplify_is_idempotent() {
        let mut world = TestWorld::new();
        let tv = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution.type_bindings.insert(tv, world.int32());

        let ty = Ty::func(Ty::tuple(vec![Ty::Var(tv).into()]), Ty::Var(tv));
        let once = solution.simplify_type(&world.tc(), &ty);
        let twice = solution.simplify_type(&world.tc(), &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_simplify_chases_chained_bindings() {
        let mut world = TestWorld::new();
        let tv0 = world.fresh_tyvar();
        let tv1 = world.fresh_tyvar();
        let mut solution = Solution::new();
        solution.type_bindings.insert(tv0, Ty::Var(tv1));
        solution.type_bindings.insert(tv1, world.int32());

        let simplified = solution.simplify_type(&world.tc(), &Ty::Var(tv0));
        assert_eq!(simplified, world.int32());
    }

    #[test]
    #[should_panic(expected = "no type binding")]
    fn test_simplify_missing_binding_panics() {
        let world = TestWorld::new();
        let solution = Solution::new();
        solution.simplify_type(&world.tc(), &Ty::Var(TyVar(99)));
    }
}
