use std::fmt;

use itertools::Itertools;

use crate::ast::NodeId;

/// One step of a locator's path through the expression tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathElt {
    ApplyArgument,
    ApplyFunction,
    MemberRefBase,
    Member,
    ConstructorMember,
    ConversionMember,
    SubscriptMember,
    SubscriptIndex,
    TupleElement(usize),
    ScalarToTuple,
    InterpolationArgument(usize),
    IfThen,
    IfElse,
    ClosureResult,
    Load,
    NewArrayElement,
    AssignSource,
    UnresolvedMember,
}

impl fmt::Display for PathElt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElt::ApplyArgument => write!(f, "apply argument"),
            PathElt::ApplyFunction => write!(f, "apply function"),
            PathElt::MemberRefBase => write!(f, "member reference base"),
            PathElt::Member => write!(f, "member"),
            PathElt::ConstructorMember => write!(f, "constructor member"),
            PathElt::ConversionMember => write!(f, "conversion member"),
            PathElt::SubscriptMember => write!(f, "subscript member"),
            PathElt::SubscriptIndex => write!(f, "subscript index"),
            PathElt::TupleElement(i) => write!(f, "tuple element {}", i),
            PathElt::ScalarToTuple => write!(f, "scalar to tuple"),
            PathElt::InterpolationArgument(i) => write!(f, "interpolation argument {}", i),
            PathElt::IfThen => write!(f, "if then"),
            PathElt::IfElse => write!(f, "if else"),
            PathElt::ClosureResult => write!(f, "closure result"),
            PathElt::Load => write!(f, "load"),
            PathElt::NewArrayElement => write!(f, "new array element"),
            PathElt::AssignSource => write!(f, "assign source"),
            PathElt::UnresolvedMember => write!(f, "unresolved member"),
        }
    }
}

/// A structured key identifying a position in the source expression tree:
/// an anchor expression plus a path. Locators are plain values with
/// structural hashing, used directly as keys into the solution's maps.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator {
    pub anchor: NodeId,
    pub path: Vec<PathElt>,
}

impl Locator {
    pub fn new(anchor: NodeId) -> Locator {
        Locator {
            anchor,
            path: vec![],
        }
    }

    /// Extend this locator with another path element.
    pub fn with(&self, elt: PathElt) -> Locator {
        let mut path = self.path.clone();
        path.push(elt);
        Locator {
            anchor: self.anchor,
            path,
        }
    }

    /// The locator with its last path element removed, or None for an
    /// empty path.
    pub fn parent(&self) -> Option<Locator> {
        if self.path.is_empty() {
            return None;
        }
        let mut path = self.path.clone();
        path.pop();
        Some(Locator {
            anchor: self.anchor,
            path,
        })
    }

    pub fn last(&self) -> Option<PathElt> {
        self.path.last().copied()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}[{}]",
            self.anchor,
            self.path.iter().map(|elt| elt.to_string()).join(" -> ")
        )
    }
}
