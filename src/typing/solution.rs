use std::cell::Cell;
use std::collections::HashMap;

use crate::ast::DeclId;
use crate::typing::locator::Locator;
use crate::typing::ty::{Ty, TyVar};

/// One resolution of an overloaded reference, recorded by the solver.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OverloadChoice {
    Decl(DeclId),
    DeclViaDynamic(DeclId),
    TupleIndex(usize),
    BaseType,
    FunctionReturningBaseType,
    IdentityFunction,
    TypeDecl(DeclId),
}

impl OverloadChoice {
    pub fn decl(&self) -> Option<DeclId> {
        match self {
            OverloadChoice::Decl(decl)
            | OverloadChoice::DeclViaDynamic(decl)
            | OverloadChoice::TypeDecl(decl) => Some(*decl),
            _ => None,
        }
    }
}

/// The coercion kind the solver attached to a conversion between two
/// canonical types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConversionRestriction {
    TupleToTuple,
    ScalarToTuple,
    Superclass,
    Existential,
    ValueToOptional,
    User,
}

/// A solution produced by the constraint solver: fixed types for the type
/// variables, an overload choice per overloaded reference, the conversion
/// restrictions the solver committed to, and the default-argument owners the
/// constraint generator attached. Read-only during application.
#[derive(Clone, Debug, Default)]
pub struct Solution {
    pub type_bindings: HashMap<TyVar, Ty>,
    pub overload_choices: HashMap<Locator, (OverloadChoice, Ty)>,
    pub constraint_restrictions: HashMap<(Ty, Ty), ConversionRestriction>,
    pub default_arg_owners: HashMap<Locator, DeclId>,
    fixed_score: Cell<Option<i64>>,
}

impl Solution {
    pub fn new() -> Solution {
        Solution::default()
    }

    /// The fixed type of a type variable. Every type variable reachable from
    /// the expression tree has a binding.
    pub fn fixed_ty(&self, tv: TyVar) -> &Ty {
        self.type_bindings
            .get(&tv)
            .unwrap_or_else(|| panic!("no type binding for {}", tv))
    }

    pub fn overload_choice_if_available(
        &self,
        locator: &Locator,
    ) -> Option<&(OverloadChoice, Ty)> {
        self.overload_choices.get(locator)
    }

    pub fn overload_choice(&self, locator: &Locator) -> &(OverloadChoice, Ty) {
        self.overload_choice_if_available(locator)
            .unwrap_or_else(|| panic!("no overload choice recorded for {}", locator))
    }

    pub fn restriction(&self, from: &Ty, to: &Ty) -> Option<ConversionRestriction> {
        self.constraint_restrictions
            .get(&(from.clone(), to.clone()))
            .copied()
    }

    pub(crate) fn cached_score(&self) -> Option<i64> {
        self.fixed_score.get()
    }

    pub(crate) fn cache_score(&self, score: i64) {
        self.fixed_score.set(Some(score));
    }
}
