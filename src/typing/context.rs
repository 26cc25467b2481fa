use std::collections::HashMap;
use std::fmt;

use crate::ast::{Decl, DeclContainer, DeclId, DeclKind};
use crate::typing::locator::Locator;
use crate::typing::subst::{ApplySubst, Subst};
use crate::typing::ty::{ArchetypeId, GenericParamList, Ty, TyVar};

/// The protocols the rewriter knows by role.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KnownProtocolKind {
    ArrayBound,
    ArrayLiteralConvertible,
    BuiltinCharacterLiteralConvertible,
    BuiltinFloatLiteralConvertible,
    BuiltinIntegerLiteralConvertible,
    BuiltinStringLiteralConvertible,
    CharacterLiteralConvertible,
    DictionaryLiteralConvertible,
    DynamicLookup,
    FloatLiteralConvertible,
    IntegerLiteralConvertible,
    LogicValue,
    StringInterpolationConvertible,
    StringLiteralConvertible,
}

impl fmt::Display for KnownProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An opened generic parameter: its declared conformance requirements and
/// superclass bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Archetype {
    pub name: String,
    pub protocols: Vec<DeclId>,
    pub superclass: Option<Ty>,
}

/// Side information for a type variable: the archetype it was opened from,
/// the locator of the reference that introduced it, and the literal
/// protocol of its anchor when the variable stands for a literal's type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TyVarInfo {
    pub archetype: Option<ArchetypeId>,
    pub locator: Option<Locator>,
    pub literal_anchor: Option<KnownProtocolKind>,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct ConformanceId(pub u32);

/// Where a conformance witness comes from: a concrete witness table, or the
/// abstract requirement itself when the conforming type is an archetype or
/// existential.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConformanceSource {
    Table(ConformanceId),
    Abstract,
}

/// A concrete conformance of a type to a protocol.
#[derive(Clone, Debug, PartialEq)]
pub struct Conformance {
    /// Canonical conforming type.
    pub ty: Ty,
    pub protocol: DeclId,
    /// Value requirement name to witness declaration.
    pub witnesses: HashMap<String, DeclId>,
    /// Associated type name to type witness.
    pub type_witnesses: HashMap<String, Ty>,
}

/// Standard-library wiring the rewriter depends on. Configured, not looked
/// up by name.
#[derive(Clone, Debug, PartialEq)]
pub struct StdlibConfig {
    pub optional_decl: Option<DeclId>,
    pub slice_decl: Option<DeclId>,
    pub array_injection_fn: Option<DeclId>,
    pub bool_decl: Option<DeclId>,
    pub max_builtin_int: Ty,
    pub max_builtin_float: Ty,
}

impl Default for StdlibConfig {
    fn default() -> StdlibConfig {
        StdlibConfig {
            optional_decl: None,
            slice_decl: None,
            array_injection_fn: None,
            bool_decl: None,
            max_builtin_int: Ty::BuiltinInt(2048),
            max_builtin_float: Ty::BuiltinFloat(64),
        }
    }
}

/// Declaration and type context for a compilation: the declaration arena,
/// archetype and type-variable tables, protocol conformances, and stdlib
/// wiring. Read-only while a solution is being applied.
#[derive(Debug, Default)]
pub struct TyCtx {
    decls: Vec<Decl>,
    archetypes: Vec<Archetype>,
    tyvars: Vec<TyVarInfo>,
    conformances: Vec<Conformance>,
    known_protocols: HashMap<KnownProtocolKind, DeclId>,
    default_tys: HashMap<DeclId, Ty>,
    pub stdlib: StdlibConfig,
}

impl TyCtx {
    pub fn new() -> TyCtx {
        TyCtx::default()
    }

    pub fn add_decl(&mut self, decl: Decl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        id
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.0 as usize]
    }

    pub fn add_archetype(&mut self, archetype: Archetype) -> ArchetypeId {
        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetypes.push(archetype);
        id
    }

    pub fn archetype(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.0 as usize]
    }

    pub fn fresh_tyvar(&mut self, archetype: Option<ArchetypeId>, locator: Option<Locator>) -> TyVar {
        let tv = TyVar(self.tyvars.len() as u64);
        self.tyvars.push(TyVarInfo {
            archetype,
            locator,
            literal_anchor: None,
        });
        tv
    }

    /// A type variable standing for the type of a literal expression.
    pub fn fresh_tyvar_for_literal(
        &mut self,
        locator: Locator,
        literal: KnownProtocolKind,
    ) -> TyVar {
        let tv = TyVar(self.tyvars.len() as u64);
        self.tyvars.push(TyVarInfo {
            archetype: None,
            locator: Some(locator),
            literal_anchor: Some(literal),
        });
        tv
    }

    pub fn tyvar_info(&self, tv: TyVar) -> &TyVarInfo {
        &self.tyvars[tv.0 as usize]
    }

    pub fn add_conformance(&mut self, conformance: Conformance) -> ConformanceId {
        let id = ConformanceId(self.conformances.len() as u32);
        self.conformances.push(conformance);
        id
    }

    pub fn conformance(&self, id: ConformanceId) -> &Conformance {
        &self.conformances[id.0 as usize]
    }

    pub fn register_known_protocol(&mut self, kind: KnownProtocolKind, decl: DeclId) {
        self.known_protocols.insert(kind, decl);
    }

    pub fn known_protocol(&self, kind: KnownProtocolKind) -> Option<DeclId> {
        self.known_protocols.get(&kind).copied()
    }

    pub fn is_known_protocol(&self, decl: DeclId, kind: KnownProtocolKind) -> bool {
        self.known_protocol(kind) == Some(decl)
    }

    pub fn set_default_ty(&mut self, proto: DeclId, ty: Ty) {
        self.default_tys.insert(proto, ty);
    }

    pub fn default_ty(&self, proto: DeclId) -> Option<&Ty> {
        self.default_tys.get(&proto)
    }

    /// Erase sugar, producing the canonical form of a type.
    pub fn canonicalize(&self, ty: &Ty) -> Ty {
        let stdlib = &self.stdlib;
        ty.clone().transform(&mut |t| match t {
            Ty::Substituted(_, replacement) => Some(self.canonicalize(replacement)),
            Ty::Optional(value) => {
                let value = self.canonicalize(value);
                Some(match stdlib.optional_decl {
                    Some(decl) => Ty::BoundGeneric(decl, vec![value]),
                    None => Ty::Optional(Box::new(value)),
                })
            }
            Ty::Slice(elem) => {
                let elem = self.canonicalize(elem);
                Some(match stdlib.slice_decl {
                    Some(decl) => Ty::BoundGeneric(decl, vec![elem]),
                    None => Ty::Slice(Box::new(elem)),
                })
            }
            _ => None,
        })
    }

    /// Equality of canonical types.
    pub fn tys_equal(&self, a: &Ty, b: &Ty) -> bool {
        a == b || self.canonicalize(a) == self.canonicalize(b)
    }

    /// Whether the canonical form of `ty` is the optional type.
    pub fn as_optional(&self, ty: &Ty) -> Option<Ty> {
        match ty {
            Ty::Optional(value) => Some((**value).clone()),
            Ty::BoundGeneric(decl, args)
                if Some(*decl) == self.stdlib.optional_decl && args.len() == 1 =>
            {
                Some(args[0].clone())
            }
            _ => None,
        }
    }

    pub fn as_slice(&self, ty: &Ty) -> Option<Ty> {
        match ty {
            Ty::Slice(elem) => Some((**elem).clone()),
            Ty::BoundGeneric(decl, args)
                if Some(*decl) == self.stdlib.slice_decl && args.len() == 1 =>
            {
                Some(args[0].clone())
            }
            _ => None,
        }
    }

    /// The declared superclass of a class type or archetype, with generic
    /// arguments substituted through.
    pub fn superclass_of(&self, ty: &Ty) -> Option<Ty> {
        match ty {
            Ty::Archetype(archetype) => self.archetype(*archetype).superclass.clone(),
            Ty::Nominal(decl) => match &self.decl(*decl).kind {
                DeclKind::Nominal(nominal) => nominal.superclass.clone(),
                _ => None,
            },
            Ty::BoundGeneric(decl, args) => match &self.decl(*decl).kind {
                DeclKind::Nominal(nominal) => {
                    let superclass = nominal.superclass.clone()?;
                    let params = nominal.generic_params.as_ref()?;
                    let subst = Subst::from_types(params.archetypes(), args.iter().cloned());
                    Some(superclass.apply_subst(&subst))
                }
                _ => None,
            },
            Ty::Substituted(_, replacement) => self.superclass_of(replacement),
            _ => None,
        }
    }

    /// Whether a class chain leads from `ty` up to `of`.
    pub fn is_subtype_of(&self, ty: &Ty, of: &Ty) -> bool {
        if self.tys_equal(ty, of) {
            return true;
        }
        let mut superclass = self.superclass_of(ty);
        while let Some(s) = superclass {
            if self.tys_equal(&s, of) {
                return true;
            }
            superclass = self.superclass_of(&s);
        }
        false
    }

    /// Whether values of this type are passed by reference.
    pub fn has_reference_semantics(&self, ty: &Ty) -> bool {
        match ty {
            Ty::Nominal(decl) | Ty::BoundGeneric(decl, _) => match &self.decl(*decl).kind {
                DeclKind::Nominal(nominal) => {
                    nominal.nominal_kind == crate::ast::NominalKind::Class
                }
                _ => false,
            },
            Ty::Archetype(archetype) => self.archetype(*archetype).superclass.is_some(),
            Ty::Substituted(_, replacement) => self.has_reference_semantics(replacement),
            _ => false,
        }
    }

    /// Whether a class chain starting at `ty` may exist at all.
    pub fn may_have_superclass(&self, ty: &Ty) -> bool {
        match ty {
            Ty::Archetype(_) => true,
            _ => self.has_reference_semantics(ty),
        }
    }

    pub fn is_class_ty(&self, ty: &Ty) -> bool {
        self.has_reference_semantics(ty) && !ty.is_archetype()
    }

    /// The unspecialized declared type of a declaration's container, e.g.
    /// `Stack` for a member of `Stack<T>`.
    pub fn declared_ty_of_context(&self, container: DeclContainer) -> Option<Ty> {
        match container {
            DeclContainer::TopLevel => None,
            DeclContainer::Nominal(decl) => Some(Ty::Nominal(decl)),
            DeclContainer::Protocol(decl) => Some(Ty::Protocol(decl)),
        }
    }

    /// The declared type of a declaration's container as seen from inside
    /// it, e.g. `Stack<T>` with `T` an archetype.
    pub fn declared_ty_in_context(&self, container: DeclContainer) -> Option<Ty> {
        match container {
            DeclContainer::TopLevel => None,
            DeclContainer::Protocol(decl) => Some(Ty::Protocol(decl)),
            DeclContainer::Nominal(decl) => match &self.decl(decl).kind {
                DeclKind::Nominal(nominal) => Some(match &nominal.generic_params {
                    Some(params) => Ty::BoundGeneric(
                        decl,
                        params.archetypes().map(Ty::Archetype).collect(),
                    ),
                    None => Ty::Nominal(decl),
                }),
                _ => None,
            },
        }
    }

    /// Whether this is a generic nominal type used without type arguments.
    pub fn is_unspecialized_generic(&self, ty: &Ty) -> bool {
        match ty {
            Ty::Nominal(decl) => match &self.decl(*decl).kind {
                DeclKind::Nominal(nominal) => nominal.generic_params.is_some(),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn generic_params_of_ty(&self, ty: &Ty) -> Option<&GenericParamList> {
        let decl = ty.nominal_decl()?;
        self.decl(decl).generic_params()
    }

    /// Find a conformance of `ty` to `proto`. Archetypes and existentials
    /// conform abstractly through their bounds; concrete types through a
    /// registered witness table.
    pub fn conforms_to_protocol(&self, ty: &Ty, proto: DeclId) -> Option<ConformanceSource> {
        let ty = self.canonicalize(ty);
        match &ty {
            Ty::Archetype(archetype) => {
                if self.archetype_conforms(*archetype, proto) {
                    Some(ConformanceSource::Abstract)
                } else {
                    None
                }
            }
            Ty::Protocol(_) | Ty::ProtocolComposition(_) => {
                let protos = ty.existential_protocols()?;
                if protos.contains(&proto) {
                    Some(ConformanceSource::Abstract)
                } else {
                    None
                }
            }
            _ => self
                .conformances
                .iter()
                .position(|c| c.protocol == proto && self.tys_equal(&c.ty, &ty))
                .map(|i| ConformanceSource::Table(ConformanceId(i as u32))),
        }
    }

    fn archetype_conforms(&self, archetype: ArchetypeId, proto: DeclId) -> bool {
        self.archetype(archetype).protocols.contains(&proto)
    }

    /// The witness for a named protocol requirement. For abstract
    /// conformances this is the requirement itself.
    pub fn witness(
        &self,
        source: ConformanceSource,
        proto: DeclId,
        name: &str,
    ) -> Option<DeclId> {
        match source {
            ConformanceSource::Table(id) => self.conformance(id).witnesses.get(name).copied(),
            ConformanceSource::Abstract => self.protocol_requirement(proto, name),
        }
    }

    /// The type witness for a named associated type.
    pub fn type_witness(
        &self,
        source: ConformanceSource,
        proto: DeclId,
        name: &str,
    ) -> Option<Ty> {
        match source {
            ConformanceSource::Table(id) => self.conformance(id).type_witnesses.get(name).cloned(),
            ConformanceSource::Abstract => {
                // An archetype's associated types stay abstract; there is no
                // concrete witness to produce.
                let _ = (proto, name);
                None
            }
        }
    }

    pub fn protocol_requirement(&self, proto: DeclId, name: &str) -> Option<DeclId> {
        match &self.decl(proto).kind {
            DeclKind::Protocol(p) => p
                .members
                .iter()
                .copied()
                .find(|&member| self.decl(member).name == name),
            _ => None,
        }
    }

    /// All members with the given name visible on a type.
    pub fn lookup_member(&self, ty: &Ty, name: &str) -> Vec<DeclId> {
        let ty = self.canonicalize(ty);
        let mut results = vec![];
        match ty.rvalue_ty() {
            Ty::Nominal(decl) | Ty::BoundGeneric(decl, _) => {
                if let DeclKind::Nominal(nominal) = &self.decl(*decl).kind {
                    results.extend(
                        nominal
                            .members
                            .iter()
                            .copied()
                            .filter(|&m| self.decl(m).name == name),
                    );
                }
            }
            Ty::Archetype(archetype) => {
                for &proto in &self.archetype(*archetype).protocols {
                    results.extend(self.protocol_requirement(proto, name));
                }
            }
            Ty::Protocol(_) | Ty::ProtocolComposition(_) => {
                for proto in ty.existential_protocols().unwrap_or_default() {
                    results.extend(self.protocol_requirement(proto, name));
                }
            }
            _ => {}
        }
        results
    }
}
