#[macro_use]
mod macros;

mod check;
mod context;
mod locator;
mod solution;
mod subst;

pub mod apply;
pub mod ty;

pub use check::*;
pub use context::*;
pub use locator::*;
pub use solution::*;
pub use subst::*;
