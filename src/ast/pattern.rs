use crate::typing::ty::Ty;

/// Parameter patterns for closures. Only the shapes the rewriter needs to
/// retype survive to this stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Any,
    Paren(Box<Pattern>),
    Typed(Box<Pattern>, Ty),
    Named { name: String, ty: Ty },
    Tuple(Vec<Pattern>),
}

impl Pattern {
    pub fn ty(&self) -> Ty {
        match self {
            Pattern::Any => Ty::unit(),
            Pattern::Paren(sub) => sub.ty(),
            Pattern::Typed(_, ty) => ty.clone(),
            Pattern::Named { ty, .. } => ty.clone(),
            Pattern::Tuple(elts) => Ty::tuple(elts.iter().map(|p| p.ty().into()).collect()),
        }
    }
}
