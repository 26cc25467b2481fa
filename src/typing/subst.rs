use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
};

use crate::ast::DeclId;
use crate::typing::context::ConformanceSource;
use crate::typing::ty::{ArchetypeId, Ty};

/// A mapping from archetypes to their concrete replacements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subst(HashMap<ArchetypeId, Ty>);

impl Deref for Subst {
    type Target = HashMap<ArchetypeId, Ty>;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Subst {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<HashMap<ArchetypeId, Ty>> for Subst {
    fn as_ref(&self) -> &HashMap<ArchetypeId, Ty> {
        &self.0
    }
}

impl std::fmt::Display for Subst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .finish()
    }
}

impl std::iter::FromIterator<(ArchetypeId, Ty)> for Subst {
    fn from_iter<T: IntoIterator<Item = (ArchetypeId, Ty)>>(iter: T) -> Self {
        Subst(iter.into_iter().collect())
    }
}

impl Subst {
    pub fn new() -> Subst {
        Subst(HashMap::new())
    }

    pub fn from_types<P, A>(params: P, args: A) -> Subst
    where
        P: IntoIterator<Item = ArchetypeId>,
        A: IntoIterator<Item = Ty>,
    {
        let mut sub = Subst::new();
        for (p, a) in params.into_iter().zip(args.into_iter()) {
            sub.insert(p, a);
        }
        sub
    }
}

pub trait ApplySubst<T = Self> {
    fn apply_subst(self, subst: &Subst) -> T;
}

pub trait ApplySubstMut {
    fn apply_subst_mut(&mut self, subst: &Subst);
}

impl<T: ApplySubst + Clone> ApplySubstMut for T {
    fn apply_subst_mut(&mut self, subst: &Subst) {
        let t = self.clone();
        let _ = std::mem::replace(self, t.apply_subst(subst));
    }
}

impl ApplySubst for Ty {
    fn apply_subst(self, subst: &Subst) -> Ty {
        self.transform(&mut |ty| match ty {
            Ty::Archetype(archetype) => subst.get(archetype).cloned(),
            Ty::Substituted(archetype, _) => subst
                .get(archetype)
                .cloned()
                .map(|replacement| Ty::Substituted(*archetype, Box::new(replacement))),
            _ => None,
        })
    }
}

impl<T: ApplySubst> ApplySubst<Vec<T>> for Vec<T> {
    fn apply_subst(self, subst: &Subst) -> Vec<T> {
        self.into_iter().map(|x| x.apply_subst(subst)).collect()
    }
}

/// The conformances required to witness each constraint on each substituted
/// archetype.
pub type ConformanceMap = HashMap<ArchetypeId, HashMap<DeclId, ConformanceSource>>;

/// One encoded substitution, suitable for attaching to a concrete
/// declaration reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Substitution {
    pub archetype: ArchetypeId,
    pub replacement: Ty,
    pub conformances: Vec<ConformanceSource>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::ty::TyVar;

    #[test]
    fn test_apply_subst_replaces_archetypes() {
        let a = ArchetypeId(0);
        let sub = subst! { a => Ty::BuiltinInt(64) };
        let ty = Ty::func(Ty::tuple(vec![Ty::Archetype(a).into()]), Ty::Archetype(a));
        let ty = ty.apply_subst(&sub);
        assert_eq!(
            ty,
            Ty::func(Ty::tuple(vec![Ty::BuiltinInt(64).into()]), Ty::BuiltinInt(64))
        );
    }

    #[test]
    fn test_apply_subst_keeps_substituted_sugar() {
        let a = ArchetypeId(0);
        let sub = subst! { a => Ty::BuiltinInt(64) };
        let ty = Ty::Substituted(a, Box::new(Ty::Var(TyVar(0))));
        let ty = ty.apply_subst(&sub);
        assert_eq!(ty, Ty::Substituted(a, Box::new(Ty::BuiltinInt(64))));
    }
}
