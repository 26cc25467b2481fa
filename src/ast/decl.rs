use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::Source;
use crate::typing::ty::{ArchetypeId, DefaultArgKind, GenericParamList, Ty};

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DeclId(pub u32);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decl#{}", self.0)
    }
}

/// The context a declaration lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeclContainer {
    TopLevel,
    Nominal(DeclId),
    Protocol(DeclId),
}

impl DeclContainer {
    pub fn is_type_context(&self) -> bool {
        !matches!(self, DeclContainer::TopLevel)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeclAttrs {
    /// The declaration is a user-defined conversion function.
    pub conversion: bool,
    /// The declaration is an assignment operator.
    pub assignment: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NominalKind {
    Struct,
    Class,
    Enum,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decl {
    pub name: String,
    pub container: DeclContainer,
    pub loc: Source,
    pub attrs: DeclAttrs,
    pub kind: DeclKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Func(FuncDecl),
    Var(VarDecl),
    Subscript(SubscriptDecl),
    Constructor(ConstructorDecl),
    EnumElement(EnumElementDecl),
    Nominal(NominalDecl),
    Protocol(ProtocolDecl),
    TypeAlias(TypeAliasDecl),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncDecl {
    /// The unopened type of a reference to this function. Methods are curried:
    /// `Self -> Args -> Result`.
    pub ty: Ty,
    pub is_instance: bool,
    pub is_static: bool,
    pub is_operator: bool,
    /// Number of argument clauses, including the `self` clause for methods.
    pub natural_arg_count: usize,
    /// Default-argument kind and declared type per field of the argument tuple.
    pub default_args: Vec<(DefaultArgKind, Ty)>,
    pub generic_params: Option<GenericParamList>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarDecl {
    pub ty: Ty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptDecl {
    /// `Index -> Result`
    pub ty: Ty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructorDecl {
    /// The type of a reference to the constructor: `Metatype -> Args -> Self`.
    pub ty: Ty,
    /// The initializer's type, as referenced from `x.init`: `Args -> Self`.
    pub initializer_ty: Ty,
    pub default_args: Vec<(DefaultArgKind, Ty)>,
    pub generic_params: Option<GenericParamList>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumElementDecl {
    pub ty: Ty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NominalDecl {
    pub nominal_kind: NominalKind,
    pub generic_params: Option<GenericParamList>,
    pub superclass: Option<Ty>,
    pub members: Vec<DeclId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolDecl {
    pub members: Vec<DeclId>,
    pub assoc_types: Vec<String>,
    /// The `Self` archetype of the protocol.
    pub self_archetype: ArchetypeId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeAliasDecl {
    pub underlying: Ty,
}

impl Decl {
    /// The type of a reference to this declaration, before any opening.
    pub fn reference_ty(&self) -> &Ty {
        match &self.kind {
            DeclKind::Func(f) => &f.ty,
            DeclKind::Var(v) => &v.ty,
            DeclKind::Subscript(s) => &s.ty,
            DeclKind::Constructor(c) => &c.ty,
            DeclKind::EnumElement(e) => &e.ty,
            DeclKind::TypeAlias(t) => &t.underlying,
            DeclKind::Nominal(_) | DeclKind::Protocol(_) => {
                panic!("type declarations are resolved in context")
            }
        }
    }

    pub fn is_instance_member(&self) -> bool {
        match &self.kind {
            DeclKind::Func(f) => f.is_instance,
            DeclKind::Var(_) | DeclKind::Subscript(_) => true,
            DeclKind::Constructor(_) | DeclKind::EnumElement(_) => false,
            _ => false,
        }
    }

    pub fn is_func(&self) -> bool {
        matches!(self.kind, DeclKind::Func(_))
    }

    pub fn is_operator(&self) -> bool {
        matches!(&self.kind, DeclKind::Func(f) if f.is_operator)
    }

    pub fn is_type_decl(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::Nominal(_) | DeclKind::Protocol(_) | DeclKind::TypeAlias(_)
        )
    }

    pub fn as_func(&self) -> Option<&FuncDecl> {
        if let DeclKind::Func(f) = &self.kind {
            Some(f)
        } else {
            None
        }
    }

    /// The default-argument table of a callable declaration, if it has one.
    pub fn default_args(&self) -> &[(DefaultArgKind, Ty)] {
        match &self.kind {
            DeclKind::Func(f) => &f.default_args,
            DeclKind::Constructor(c) => &c.default_args,
            _ => &[],
        }
    }

    pub fn generic_params(&self) -> Option<&GenericParamList> {
        match &self.kind {
            DeclKind::Func(f) => f.generic_params.as_ref(),
            DeclKind::Constructor(c) => c.generic_params.as_ref(),
            DeclKind::Nominal(n) => n.generic_params.as_ref(),
            _ => None,
        }
    }
}
