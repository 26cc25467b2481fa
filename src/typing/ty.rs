use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::ast::DeclId;

/// A type variable introduced by opening a generic reference. The variable's
/// originating archetype and locator live in the context's side table.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TyVar(pub u64);

impl fmt::Display for TyVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?t{}", self.0)
    }
}

/// A rigid variable standing for an opened generic parameter.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ArchetypeId(pub u32);

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Lvalue qualifiers. The default for member access marks the lvalue as
/// implicit.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Quals {
    pub implicit: bool,
    pub non_settable: bool,
}

impl Quals {
    pub const EXPLICIT: Quals = Quals {
        implicit: false,
        non_settable: false,
    };

    pub const DEFAULT_FOR_MEMBER_ACCESS: Quals = Quals {
        implicit: true,
        non_settable: false,
    };

    pub fn is_settable(&self) -> bool {
        !self.non_settable
    }

    pub fn without_implicit(self) -> Quals {
        Quals {
            implicit: false,
            ..self
        }
    }
}

impl fmt::Display for Quals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.implicit {
            write!(f, "implicit")?;
        }
        if self.non_settable {
            if self.implicit {
                write!(f, ",")?;
            }
            write!(f, "nonsettable")?;
        }
        Ok(())
    }
}

/// How a tuple field's value may be defaulted at a call site.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DefaultArgKind {
    /// No default.
    None,
    /// The callee materializes the declared default value.
    Normal,
    /// The caller substitutes the current file name.
    File,
    /// The caller substitutes the current line.
    Line,
    /// The caller substitutes the current column.
    Column,
}

impl DefaultArgKind {
    pub fn has_default(&self) -> bool {
        !matches!(self, DefaultArgKind::None)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleField {
    pub name: Option<String>,
    pub ty: Ty,
    pub default: DefaultArgKind,
    pub variadic: bool,
}

impl TupleField {
    pub fn new(ty: Ty) -> TupleField {
        TupleField {
            name: None,
            ty,
            default: DefaultArgKind::None,
            variadic: false,
        }
    }

    pub fn named<S: ToString>(name: S, ty: Ty) -> TupleField {
        TupleField {
            name: Some(name.to_string()),
            ty,
            default: DefaultArgKind::None,
            variadic: false,
        }
    }

    pub fn has_default(&self) -> bool {
        self.default.has_default()
    }

    /// The element type of a variadic field, whose declared type is a slice.
    pub fn vararg_base_ty(&self) -> &Ty {
        match &self.ty {
            Ty::Slice(elem) => elem,
            ty => ty,
        }
    }
}

impl From<Ty> for TupleField {
    fn from(ty: Ty) -> TupleField {
        TupleField::new(ty)
    }
}

impl fmt::Display for TupleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}: ", name)?;
        }
        write!(f, "{}", self.ty)?;
        if self.variadic {
            write!(f, "...")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FnTy {
    pub input: Ty,
    pub result: Ty,
    pub auto_closure: bool,
    pub block: bool,
}

impl FnTy {
    pub fn new(input: Ty, result: Ty) -> FnTy {
        FnTy {
            input,
            result,
            auto_closure: false,
            block: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericParam {
    pub name: String,
    pub archetype: ArchetypeId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericParamList {
    pub params: Vec<GenericParam>,
}

impl GenericParamList {
    pub fn new(params: Vec<GenericParam>) -> GenericParamList {
        GenericParamList { params }
    }

    pub fn archetypes(&self) -> impl Iterator<Item = ArchetypeId> + '_ {
        self.params.iter().map(|p| p.archetype)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolyFnTy {
    pub params: GenericParamList,
    pub fun: FnTy,
}

/// The polymorphic type IR. Sugar constructors (`Optional`, `Slice`,
/// `Substituted`) are preserved through rewrites and erased only by
/// canonicalization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Var(TyVar),
    BuiltinInt(u32),
    BuiltinFloat(u32),
    BuiltinRawPointer,
    Tuple(Vec<TupleField>),
    Func(Box<FnTy>),
    Poly(Box<PolyFnTy>),
    LValue(Box<Ty>, Quals),
    Metatype(Box<Ty>),
    Nominal(DeclId),
    BoundGeneric(DeclId, Vec<Ty>),
    Archetype(ArchetypeId),
    Protocol(DeclId),
    ProtocolComposition(Vec<Ty>),
    Optional(Box<Ty>),
    Slice(Box<Ty>),
    Substituted(ArchetypeId, Box<Ty>),
}

impl Ty {
    pub fn unit() -> Ty {
        Ty::Tuple(vec![])
    }

    pub fn tuple(fields: Vec<TupleField>) -> Ty {
        Ty::Tuple(fields)
    }

    pub fn func(input: Ty, result: Ty) -> Ty {
        Ty::Func(Box::new(FnTy::new(input, result)))
    }

    pub fn lvalue(object: Ty, quals: Quals) -> Ty {
        Ty::LValue(Box::new(object), quals)
    }

    pub fn metatype(instance: Ty) -> Ty {
        Ty::Metatype(Box::new(instance))
    }

    pub fn optional(value: Ty) -> Ty {
        Ty::Optional(Box::new(value))
    }

    pub fn slice(elem: Ty) -> Ty {
        Ty::Slice(Box::new(elem))
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self, Ty::LValue(..))
    }

    /// The type with any outer lvalue stripped.
    pub fn rvalue_ty(&self) -> &Ty {
        match self {
            Ty::LValue(object, _) => object,
            ty => ty,
        }
    }

    pub fn lvalue_quals(&self) -> Option<Quals> {
        match self {
            Ty::LValue(_, quals) => Some(*quals),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FnTy> {
        match self {
            Ty::Func(f) => Some(f),
            Ty::Poly(p) => Some(&p.fun),
            _ => None,
        }
    }

    pub fn as_poly(&self) -> Option<&PolyFnTy> {
        match self {
            Ty::Poly(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[TupleField]> {
        match self {
            Ty::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_metatype(&self) -> Option<&Ty> {
        match self {
            Ty::Metatype(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn is_existential(&self) -> bool {
        matches!(self, Ty::Protocol(_) | Ty::ProtocolComposition(_))
    }

    /// The protocols composing an existential type.
    pub fn existential_protocols(&self) -> Option<Vec<DeclId>> {
        match self {
            Ty::Protocol(p) => Some(vec![*p]),
            Ty::ProtocolComposition(parts) => {
                let mut protos = vec![];
                for part in parts {
                    protos.extend(part.existential_protocols()?);
                }
                Some(protos)
            }
            _ => None,
        }
    }

    pub fn is_archetype(&self) -> bool {
        matches!(self, Ty::Archetype(_))
    }

    pub fn as_archetype(&self) -> Option<ArchetypeId> {
        match self {
            Ty::Archetype(a) => Some(*a),
            _ => None,
        }
    }

    pub fn is_builtin_int(&self, width: u32) -> bool {
        matches!(self, Ty::BuiltinInt(w) if *w == width)
    }

    pub fn is_any_builtin_int(&self) -> bool {
        matches!(self, Ty::BuiltinInt(_))
    }

    /// The nominal declaration underlying this type, if any.
    pub fn nominal_decl(&self) -> Option<DeclId> {
        match self {
            Ty::Nominal(decl) | Ty::BoundGeneric(decl, _) => Some(*decl),
            Ty::Substituted(_, replacement) => replacement.nominal_decl(),
            _ => None,
        }
    }

    pub fn has_type_variable(&self) -> bool {
        let mut found = false;
        self.walk(&mut |ty| {
            if matches!(ty, Ty::Var(_)) {
                found = true;
                return false;
            }
            true
        });
        found
    }

    /// The index of the unique field a scalar value must initialize: every
    /// other field has a default or is variadic.
    pub fn field_for_scalar_init(&self) -> Option<usize> {
        let fields = self.as_tuple()?;
        let mut candidate = None;
        for (i, field) in fields.iter().enumerate() {
            if field.has_default() || field.variadic {
                continue;
            }
            if candidate.is_some() {
                return None;
            }
            candidate = Some(i);
        }
        candidate
    }

    /// Visit every type reachable from this one, pre-order. The callback
    /// returns false to stop the walk.
    pub fn walk(&self, f: &mut impl FnMut(&Ty) -> bool) -> bool {
        if !f(self) {
            return false;
        }
        match self {
            Ty::Var(_)
            | Ty::BuiltinInt(_)
            | Ty::BuiltinFloat(_)
            | Ty::BuiltinRawPointer
            | Ty::Nominal(_)
            | Ty::Archetype(_)
            | Ty::Protocol(_) => true,
            Ty::Tuple(fields) => fields.iter().all(|field| field.ty.walk(f)),
            Ty::Func(fun) => fun.input.walk(f) && fun.result.walk(f),
            Ty::Poly(poly) => poly.fun.input.walk(f) && poly.fun.result.walk(f),
            Ty::LValue(object, _) => object.walk(f),
            Ty::Metatype(instance) => instance.walk(f),
            Ty::BoundGeneric(_, args) => args.iter().all(|arg| arg.walk(f)),
            Ty::ProtocolComposition(parts) => parts.iter().all(|part| part.walk(f)),
            Ty::Optional(value) => value.walk(f),
            Ty::Slice(elem) => elem.walk(f),
            Ty::Substituted(_, replacement) => replacement.walk(f),
        }
    }

    /// Structurally rewrite this type. The callback runs before recursing
    /// into each node; returning `Some` replaces the node without visiting
    /// its children.
    pub fn transform(self, f: &mut impl FnMut(&Ty) -> Option<Ty>) -> Ty {
        if let Some(replacement) = f(&self) {
            return replacement;
        }
        match self {
            Ty::Var(_)
            | Ty::BuiltinInt(_)
            | Ty::BuiltinFloat(_)
            | Ty::BuiltinRawPointer
            | Ty::Nominal(_)
            | Ty::Archetype(_)
            | Ty::Protocol(_) => self,
            Ty::Tuple(fields) => Ty::Tuple(
                fields
                    .into_iter()
                    .map(|field| TupleField {
                        ty: field.ty.transform(f),
                        ..field
                    })
                    .collect(),
            ),
            Ty::Func(fun) => Ty::Func(Box::new(FnTy {
                input: fun.input.transform(f),
                result: fun.result.transform(f),
                auto_closure: fun.auto_closure,
                block: fun.block,
            })),
            Ty::Poly(poly) => Ty::Poly(Box::new(PolyFnTy {
                params: poly.params,
                fun: FnTy {
                    input: poly.fun.input.transform(f),
                    result: poly.fun.result.transform(f),
                    auto_closure: poly.fun.auto_closure,
                    block: poly.fun.block,
                },
            })),
            Ty::LValue(object, quals) => Ty::LValue(Box::new(object.transform(f)), quals),
            Ty::Metatype(instance) => Ty::Metatype(Box::new(instance.transform(f))),
            Ty::BoundGeneric(decl, args) => {
                Ty::BoundGeneric(decl, args.into_iter().map(|arg| arg.transform(f)).collect())
            }
            Ty::ProtocolComposition(parts) => Ty::ProtocolComposition(
                parts.into_iter().map(|part| part.transform(f)).collect(),
            ),
            Ty::Optional(value) => Ty::Optional(Box::new(value.transform(f))),
            Ty::Slice(elem) => Ty::Slice(Box::new(elem.transform(f))),
            Ty::Substituted(archetype, replacement) => {
                Ty::Substituted(archetype, Box::new(replacement.transform(f)))
            }
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(tv) => write!(f, "{}", tv),
            Ty::BuiltinInt(w) => write!(f, "Builtin.Int{}", w),
            Ty::BuiltinFloat(w) => write!(f, "Builtin.Float{}", w),
            Ty::BuiltinRawPointer => write!(f, "Builtin.RawPointer"),
            Ty::Tuple(fields) => write!(
                f,
                "({})",
                fields.iter().map(|field| field.to_string()).join(", ")
            ),
            Ty::Func(fun) => write!(f, "{} -> {}", fun.input, fun.result),
            Ty::Poly(poly) => write!(
                f,
                "<{}> {} -> {}",
                poly.params.params.iter().map(|p| p.name.clone()).join(", "),
                poly.fun.input,
                poly.fun.result
            ),
            Ty::LValue(object, quals) => write!(f, "@lvalue({}) {}", quals, object),
            Ty::Metatype(instance) => write!(f, "{}.metatype", instance),
            Ty::Nominal(decl) => write!(f, "{}", decl),
            Ty::BoundGeneric(decl, args) => write!(
                f,
                "{}<{}>",
                decl,
                args.iter().map(|arg| arg.to_string()).join(", ")
            ),
            Ty::Archetype(archetype) => write!(f, "{}", archetype),
            Ty::Protocol(decl) => write!(f, "{}", decl),
            Ty::ProtocolComposition(parts) => write!(
                f,
                "protocol<{}>",
                parts.iter().map(|part| part.to_string()).join(", ")
            ),
            Ty::Optional(value) => write!(f, "{}?", value),
            Ty::Slice(elem) => write!(f, "{}[]", elem),
            Ty::Substituted(archetype, replacement) => {
                write!(f, "{}/*{}*/", replacement, archetype)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_for_scalar_init() {
        let ty = Ty::tuple(vec![
            TupleField {
                name: Some(str!("x")),
                ty: Ty::BuiltinInt(64),
                default: DefaultArgKind::Normal,
                variadic: false,
            },
            TupleField::named("y", Ty::BuiltinInt(64)),
        ]);
        assert_eq!(ty.field_for_scalar_init(), Some(1));

        let ty = Ty::tuple(vec![
            TupleField::new(Ty::BuiltinInt(64)),
            TupleField::new(Ty::BuiltinInt(64)),
        ]);
        assert_eq!(ty.field_for_scalar_init(), None);
    }

    #[test]
    fn test_transform_replaces_vars() {
        let ty = Ty::func(tuple_ty![Ty::Var(tvar!(0))], Ty::Var(tvar!(1)));
        let ty = ty.transform(&mut |t| match t {
            Ty::Var(_) => Some(Ty::BuiltinInt(64)),
            _ => None,
        });
        assert!(!ty.has_type_variable());
    }

    #[test]
    fn test_walk_stops_early() {
        let ty = tuple_ty![Ty::Var(TyVar(0)), Ty::BuiltinInt(64)];
        let mut seen = 0;
        ty.walk(&mut |_| {
            seen += 1;
            false
        });
        assert_eq!(seen, 1);
    }
}
