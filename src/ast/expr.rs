use crate::ast::{next_node_id, DeclId, NodeId, Pattern};
use crate::span::Source;
use crate::typing::ty::Ty;
use crate::typing::Substitution;

/// A declaration reference together with the substitutions needed to use it
/// at a concrete type.
#[derive(Clone, Debug, PartialEq)]
pub struct ConcreteDeclRef {
    pub decl: DeclId,
    pub substitutions: Vec<Substitution>,
}

impl From<DeclId> for ConcreteDeclRef {
    fn from(decl: DeclId) -> ConcreteDeclRef {
        ConcreteDeclRef {
            decl,
            substitutions: vec![],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MagicIdentifierKind {
    File,
    Line,
    Column,
}

/// How a call node binds its callee.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// An ordinary `f(x)` application.
    Plain,
    /// A constructor reference applied to its metatype base.
    ConstructorRef,
    /// A method reference applied to its `self` base via dot syntax.
    DotSyntaxSelf,
}

impl CallKind {
    /// Self-apply forms bind an object argument rather than an ordinary one.
    pub fn is_self_apply(&self) -> bool {
        matches!(self, CallKind::ConstructorRef | CallKind::DotSyntaxSelf)
    }
}

/// Classification of a checked cast, attached to `is` / `as?` nodes for later
/// lowering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CheckedCastKind {
    Unresolved,
    /// The cast trivially succeeds; it is really a coercion.
    InvalidCoercible,
    Downcast,
    SuperToArchetype,
    ArchetypeToArchetype,
    ArchetypeToConcrete,
    ExistentialToArchetype,
    ExistentialToConcrete,
}

/// One entry of a tuple shuffle's destination mapping.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShuffleSource {
    /// Take the source field at this index.
    Field(usize),
    /// The callee materializes the declared default.
    DefaultInitialize,
    /// A caller-side default was synthesized for this field.
    CallerDefaultInitialize,
    /// This is the variadic destination field; its sources follow in
    /// `variadic_args`.
    Variadic,
}

/// One element of a scalar-to-tuple conversion.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarToTupleElt {
    /// The position the scalar lands in.
    Scalar,
    /// A synthesized caller-side default argument.
    CallerDefault(Box<Expr>),
    /// The owner of the callee-side default, materialized later.
    DefaultOwner(DeclId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewArrayBound {
    pub value: Option<Box<Expr>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClosureBody {
    /// A single-expression body, type-checked by the rewriter itself.
    Single(Box<Expr>),
    /// A multi-statement body, delegated back to the type checker.
    Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub ty: Ty,
    pub src: Source,
    pub implicit: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Error,

    // Literals.
    IntegerLiteral(String),
    FloatLiteral(String),
    StringLiteral(String),
    CharacterLiteral(char),
    MagicIdentifierLiteral(MagicIdentifierKind),
    InterpolatedStringLiteral {
        segments: Vec<Expr>,
        semantic: Option<Box<Expr>>,
    },
    ArrayLiteral {
        sub: Box<Expr>,
        semantic: Option<Box<Expr>>,
    },
    DictionaryLiteral {
        sub: Box<Expr>,
        semantic: Option<Box<Expr>>,
    },

    // References.
    DeclRef {
        decl: DeclId,
        specialized: bool,
        generic_args: Vec<Ty>,
    },
    OverloadedDeclRef {
        name: String,
    },
    UnresolvedSpecialize {
        sub: Box<Expr>,
        args: Vec<Ty>,
    },
    OtherConstructorRef {
        decl: DeclId,
    },
    UnresolvedConstructor {
        sub: Box<Expr>,
    },
    UnresolvedDot {
        base: Box<Expr>,
        name: String,
    },
    UnresolvedMember {
        name: String,
    },
    OverloadedMemberRef {
        base: Box<Expr>,
        name: String,
    },
    MemberRef {
        base: Box<Expr>,
        member: ConcreteDeclRef,
    },
    ArchetypeMemberRef {
        base: Box<Expr>,
        member: DeclId,
    },
    ExistentialMemberRef {
        base: Box<Expr>,
        member: DeclId,
    },
    DynamicMemberRef {
        base: Box<Expr>,
        member: ConcreteDeclRef,
    },
    TupleElement {
        base: Box<Expr>,
        index: usize,
    },
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
        subscript: ConcreteDeclRef,
    },
    ArchetypeSubscript {
        base: Box<Expr>,
        index: Box<Expr>,
        subscript: DeclId,
    },
    ExistentialSubscript {
        base: Box<Expr>,
        index: Box<Expr>,
        subscript: DeclId,
    },
    DynamicSubscript {
        base: Box<Expr>,
        index: Box<Expr>,
        subscript: DeclId,
    },
    SuperRef,
    Metatype {
        base: Option<Box<Expr>>,
        /// The metatype was written with an explicit type representation and
        /// is already fully typed.
        has_type_repr: bool,
    },
    DotSyntaxBaseIgnored {
        base: Box<Expr>,
        rhs: Box<Expr>,
    },
    Specialize {
        sub: Box<Expr>,
        substitutions: Vec<Substitution>,
    },

    // Structure.
    Paren(Box<Expr>),
    Tuple {
        elements: Vec<Expr>,
        names: Vec<Option<String>>,
    },
    Call {
        callee: Box<Expr>,
        arg: Box<Expr>,
        call_kind: CallKind,
        is_super: bool,
    },
    Closure {
        pattern: Pattern,
        body: ClosureBody,
        captures: Vec<DeclId>,
    },
    ImplicitClosure {
        body: Box<Expr>,
        captures: Vec<DeclId>,
    },
    If {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Assign {
        dest: Box<Expr>,
        src: Box<Expr>,
    },
    DiscardAssignment,
    AddressOf {
        sub: Box<Expr>,
    },
    ForceValue {
        sub: Box<Expr>,
    },
    BindOptional {
        sub: Box<Expr>,
    },
    OptionalEvaluation {
        sub: Box<Expr>,
    },
    Is {
        sub: Box<Expr>,
        cast_ty: Ty,
        cast_kind: Option<CheckedCastKind>,
    },
    ConditionalCheckedCast {
        sub: Box<Expr>,
        cast_ty: Ty,
        cast_kind: Option<CheckedCastKind>,
    },
    NewArray {
        bounds: Vec<NewArrayBound>,
        element_ty: Option<Ty>,
        injection_fn: Option<Box<Expr>>,
        construction_fn: Option<Box<Expr>>,
    },
    DefaultValue(Box<Expr>),
    ZeroValue,
    OpaqueValue,

    // Implicit conversions, inserted by coercion.
    Load {
        sub: Box<Expr>,
    },
    Requalify {
        sub: Box<Expr>,
        for_object: bool,
    },
    Materialize {
        sub: Box<Expr>,
    },
    DerivedToBase {
        sub: Box<Expr>,
    },
    ArchetypeToSuper {
        sub: Box<Expr>,
    },
    Erasure {
        sub: Box<Expr>,
        conformances: Vec<crate::typing::ConformanceSource>,
    },
    InjectIntoOptional {
        sub: Box<Expr>,
    },
    FunctionConversion {
        sub: Box<Expr>,
    },
    BridgeToBlock {
        sub: Box<Expr>,
    },
    MetatypeConversion {
        sub: Box<Expr>,
    },
    TupleShuffle {
        sub: Box<Expr>,
        sources: Vec<ShuffleSource>,
        variadic_args: Vec<usize>,
        default_args_owner: Option<DeclId>,
        caller_defaults: Vec<Expr>,
        injection_fn: Option<Box<Expr>>,
    },
    ScalarToTuple {
        sub: Box<Expr>,
        elements: Vec<ScalarToTupleElt>,
        injection_fn: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty, src: Source) -> Box<Expr> {
        Box::new(Expr {
            id: next_node_id(),
            kind,
            ty,
            src,
            implicit: false,
        })
    }

    pub fn implicit(kind: ExprKind, ty: Ty, src: Source) -> Box<Expr> {
        let mut expr = Expr::new(kind, ty, src);
        expr.implicit = true;
        expr
    }

    /// Strip parentheses and semantic sugar, returning the expression that
    /// provides this expression's semantics.
    pub fn semantics_providing(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(sub) => sub.semantics_providing(),
            _ => self,
        }
    }

    pub fn is_super_ref(&self) -> bool {
        matches!(self.semantics_providing().kind, ExprKind::SuperRef)
    }

    pub fn desc(&self) -> &'static str {
        match &self.kind {
            ExprKind::Error => "error",
            ExprKind::IntegerLiteral(..) => "integer literal",
            ExprKind::FloatLiteral(..) => "float literal",
            ExprKind::StringLiteral(..) => "string literal",
            ExprKind::CharacterLiteral(..) => "character literal",
            ExprKind::MagicIdentifierLiteral(..) => "magic identifier literal",
            ExprKind::InterpolatedStringLiteral { .. } => "interpolated string literal",
            ExprKind::ArrayLiteral { .. } => "array literal",
            ExprKind::DictionaryLiteral { .. } => "dictionary literal",
            ExprKind::DeclRef { .. } => "declaration reference",
            ExprKind::OverloadedDeclRef { .. } => "overloaded declaration reference",
            ExprKind::UnresolvedSpecialize { .. } => "specialization",
            ExprKind::OtherConstructorRef { .. } => "constructor reference",
            ExprKind::UnresolvedConstructor { .. } => "constructor call",
            ExprKind::UnresolvedDot { .. } => "member access",
            ExprKind::UnresolvedMember { .. } => "member access",
            ExprKind::OverloadedMemberRef { .. } => "member access",
            ExprKind::MemberRef { .. } => "member reference",
            ExprKind::ArchetypeMemberRef { .. } => "archetype member reference",
            ExprKind::ExistentialMemberRef { .. } => "existential member reference",
            ExprKind::DynamicMemberRef { .. } => "dynamic member reference",
            ExprKind::TupleElement { .. } => "tuple element",
            ExprKind::Subscript { .. } => "subscript",
            ExprKind::ArchetypeSubscript { .. } => "archetype subscript",
            ExprKind::ExistentialSubscript { .. } => "existential subscript",
            ExprKind::DynamicSubscript { .. } => "dynamic subscript",
            ExprKind::SuperRef => "super",
            ExprKind::Metatype { .. } => "metatype",
            ExprKind::DotSyntaxBaseIgnored { .. } => "member access",
            ExprKind::Specialize { .. } => "specialization",
            ExprKind::Paren(..) => "parentheses",
            ExprKind::Tuple { .. } => "tuple",
            ExprKind::Call { .. } => "call",
            ExprKind::Closure { .. } => "closure",
            ExprKind::ImplicitClosure { .. } => "implicit closure",
            ExprKind::If { .. } => "conditional",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::DiscardAssignment => "discard assignment",
            ExprKind::AddressOf { .. } => "address-of",
            ExprKind::ForceValue { .. } => "force unwrap",
            ExprKind::BindOptional { .. } => "optional binding",
            ExprKind::OptionalEvaluation { .. } => "optional evaluation",
            ExprKind::Is { .. } => "type check",
            ExprKind::ConditionalCheckedCast { .. } => "conditional cast",
            ExprKind::NewArray { .. } => "array allocation",
            ExprKind::DefaultValue(..) => "default value",
            ExprKind::ZeroValue => "zero value",
            ExprKind::OpaqueValue => "opaque value",
            ExprKind::Load { .. } => "load",
            ExprKind::Requalify { .. } => "requalification",
            ExprKind::Materialize { .. } => "materialization",
            ExprKind::DerivedToBase { .. } => "derived-to-base conversion",
            ExprKind::ArchetypeToSuper { .. } => "archetype-to-superclass conversion",
            ExprKind::Erasure { .. } => "existential erasure",
            ExprKind::InjectIntoOptional { .. } => "optional injection",
            ExprKind::FunctionConversion { .. } => "function conversion",
            ExprKind::BridgeToBlock { .. } => "block bridge",
            ExprKind::MetatypeConversion { .. } => "metatype conversion",
            ExprKind::TupleShuffle { .. } => "tuple shuffle",
            ExprKind::ScalarToTuple { .. } => "scalar-to-tuple conversion",
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.desc())
    }
}
