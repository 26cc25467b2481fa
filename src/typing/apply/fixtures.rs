//! A small world of declarations, protocols, and conformances for
//! exercising solution application in tests.

use crate::ast::{
    Decl, DeclAttrs, DeclContainer, DeclId, DeclKind, Expr, ExprKind, FuncDecl, NominalDecl,
    NominalKind, ProtocolDecl,
};
use crate::span::Source;
use crate::typing::context::{Archetype, Conformance, KnownProtocolKind, TyCtx};
use crate::typing::locator::{Locator, PathElt};
use crate::typing::solution::{ConversionRestriction, OverloadChoice, Solution};
use crate::typing::ty::{
    ArchetypeId, DefaultArgKind, FnTy, GenericParam, GenericParamList, PolyFnTy, Quals, Ty,
    TupleField, TyVar,
};
use crate::typing::TypeChecker;

use std::collections::HashMap;

pub(crate) struct TestWorld {
    tc: TypeChecker,
    int32: DeclId,
    int64: DeclId,
    string: DeclId,
}

pub(crate) struct GenericFnFixture {
    pub decl: DeclId,
    pub archetype: ArchetypeId,
}

pub(crate) struct StackFixture {
    pub decl: DeclId,
    pub archetype: ArchetypeId,
    pub push: DeclId,
}

pub(crate) struct PointFixture {
    pub decl: DeclId,
    pub method: DeclId,
}

impl TestWorld {
    pub fn new() -> TestWorld {
        let mut ctx = TyCtx::new();

        let int32 = add_struct(&mut ctx, "Int32");
        let int64 = add_struct(&mut ctx, "Int64");
        let string = add_struct(&mut ctx, "String");
        let bool_decl = add_struct(&mut ctx, "Bool");

        // Optional<T> and the slice type back the optional and variadic
        // machinery.
        let optional = add_generic_struct(&mut ctx, "Optional");
        let slice = add_generic_struct(&mut ctx, "Slice");

        ctx.stdlib.optional_decl = Some(optional);
        ctx.stdlib.slice_decl = Some(slice);
        ctx.stdlib.bool_decl = Some(bool_decl);

        // The literal protocol pairs exercised by the tests.
        let int_proto = add_protocol(&mut ctx, "IntegerLiteralConvertible");
        let builtin_int_proto = add_protocol(&mut ctx, "BuiltinIntegerLiteralConvertible");
        let string_proto = add_protocol(&mut ctx, "StringLiteralConvertible");
        let builtin_string_proto = add_protocol(&mut ctx, "BuiltinStringLiteralConvertible");
        ctx.register_known_protocol(KnownProtocolKind::IntegerLiteralConvertible, int_proto);
        ctx.register_known_protocol(
            KnownProtocolKind::BuiltinIntegerLiteralConvertible,
            builtin_int_proto,
        );
        ctx.register_known_protocol(KnownProtocolKind::StringLiteralConvertible, string_proto);
        ctx.register_known_protocol(
            KnownProtocolKind::BuiltinStringLiteralConvertible,
            builtin_string_proto,
        );

        add_requirement(&mut ctx, int_proto, "convertFromIntegerLiteral");
        add_requirement(&mut ctx, builtin_int_proto, "_convertFromBuiltinIntegerLiteral");
        add_requirement(&mut ctx, string_proto, "convertFromStringLiteral");
        add_requirement(&mut ctx, builtin_string_proto, "_convertFromBuiltinStringLiteral");

        // Int32 converts builtin integer literals directly.
        let int32_ty = Ty::Nominal(int32);
        let max_int_ty = ctx.stdlib.max_builtin_int.clone();
        let int32_witness = add_static_method(
            &mut ctx,
            int32,
            "_convertFromBuiltinIntegerLiteral",
            max_int_ty,
            int32_ty.clone(),
        );
        conform(
            &mut ctx,
            int32_ty.clone(),
            builtin_int_proto,
            vec![("_convertFromBuiltinIntegerLiteral", int32_witness)],
            vec![],
        );

        // String converts builtin string literals directly.
        let string_ty = Ty::Nominal(string);
        let builtin_string_arg = Ty::tuple(vec![
            TupleField::new(Ty::BuiltinRawPointer),
            TupleField::new(Ty::BuiltinInt(64)),
            TupleField::new(Ty::BuiltinInt(1)),
        ]);
        let string_witness = add_static_method(
            &mut ctx,
            string,
            "_convertFromBuiltinStringLiteral",
            builtin_string_arg,
            string_ty.clone(),
        );
        conform(
            &mut ctx,
            string_ty,
            builtin_string_proto,
            vec![("_convertFromBuiltinStringLiteral", string_witness)],
            vec![],
        );

        // The injection function that builds a slice from a fixed-size
        // buffer, specialized per element type.
        let inj_archetype = ctx.add_archetype(Archetype {
            name: str!("T"),
            protocols: vec![],
            superclass: None,
        });
        let inj_params = GenericParamList::new(vec![GenericParam {
            name: str!("T"),
            archetype: inj_archetype,
        }]);
        let injection = ctx.add_decl(Decl {
            name: str!("injectIntoSlice"),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Func(FuncDecl {
                ty: Ty::Poly(Box::new(PolyFnTy {
                    params: inj_params.clone(),
                    fun: FnTy::new(
                        Ty::tuple(vec![
                            TupleField::new(Ty::BuiltinRawPointer),
                            TupleField::new(Ty::BuiltinInt(64)),
                        ]),
                        Ty::slice(Ty::Archetype(inj_archetype)),
                    ),
                })),
                is_instance: false,
                is_static: false,
                is_operator: false,
                natural_arg_count: 1,
                default_args: vec![],
                generic_params: Some(inj_params),
            }),
        });
        ctx.stdlib.array_injection_fn = Some(injection);

        TestWorld {
            tc: TypeChecker::new(ctx),
            int32,
            int64,
            string,
        }
    }

    pub fn tc(&self) -> &TypeChecker {
        &self.tc
    }

    pub fn int32(&self) -> Ty {
        Ty::Nominal(self.int32)
    }

    pub fn int64(&self) -> Ty {
        Ty::Nominal(self.int64)
    }

    pub fn string_ty(&self) -> Ty {
        Ty::Nominal(self.string)
    }

    pub fn fresh_tyvar(&mut self) -> TyVar {
        self.tc.ctx.fresh_tyvar(None, None)
    }

    pub fn fresh_tyvar_from(&mut self, archetype: ArchetypeId) -> TyVar {
        self.tc.ctx.fresh_tyvar(Some(archetype), None)
    }

    pub fn literal_anchored_tyvar(&mut self) -> TyVar {
        self.tc.ctx.fresh_tyvar_for_literal(
            Locator::new(42),
            KnownProtocolKind::IntegerLiteralConvertible,
        )
    }

    pub fn set_integer_literal_default(&mut self, ty: Ty) {
        let proto = self
            .tc
            .ctx
            .known_protocol(KnownProtocolKind::IntegerLiteralConvertible)
            .unwrap();
        self.tc.ctx.set_default_ty(proto, ty);
    }

    /// An opaque expression of the given type.
    pub fn typed_expr(&self, ty: Ty) -> Box<Expr> {
        Expr::new(ExprKind::OpaqueValue, ty, Source::default())
    }

    pub fn lvalue_expr(&self, object: Ty) -> Box<Expr> {
        self.lvalue_quals_expr(object, Quals::DEFAULT_FOR_MEMBER_ACCESS)
    }

    pub fn lvalue_quals_expr(&self, object: Ty, quals: Quals) -> Box<Expr> {
        Expr::new(
            ExprKind::OpaqueValue,
            Ty::lvalue(object, quals),
            Source::default(),
        )
    }

    pub fn int_literal(&self, text: &str, ty: Ty) -> Box<Expr> {
        Expr::new(
            ExprKind::IntegerLiteral(text.to_string()),
            ty,
            Source::default(),
        )
    }

    pub fn int_literal_typed(&self, text: &str, ty: Ty) -> Box<Expr> {
        self.int_literal(text, ty)
    }

    pub fn string_literal_typed(&self, text: &str, ty: Ty) -> Box<Expr> {
        Expr::new(
            ExprKind::StringLiteral(text.to_string()),
            ty,
            Source::default(),
        )
    }

    pub fn tuple_expr(&self, elements: Vec<(Option<String>, Box<Expr>)>) -> Box<Expr> {
        let fields = elements
            .iter()
            .map(|(name, expr)| TupleField {
                name: name.clone(),
                ty: expr.ty.clone(),
                default: DefaultArgKind::None,
                variadic: false,
            })
            .collect::<Vec<_>>();
        let (names, exprs): (Vec<_>, Vec<_>) = elements
            .into_iter()
            .map(|(name, expr)| (name, *expr))
            .unzip();
        Expr::new(
            ExprKind::Tuple {
                elements: exprs,
                names,
            },
            Ty::tuple(fields),
            Source::default(),
        )
    }

    /// `func identity<U>(x: U) -> U` at the top level.
    pub fn generic_identity_fn(&mut self) -> GenericFnFixture {
        let archetype = self.tc.ctx.add_archetype(Archetype {
            name: str!("U"),
            protocols: vec![],
            superclass: None,
        });
        let fun = FnTy::new(
            Ty::tuple(vec![TupleField::named("x", Ty::Archetype(archetype))]),
            Ty::Archetype(archetype),
        );
        let params = GenericParamList::new(vec![GenericParam {
            name: str!("U"),
            archetype,
        }]);
        let decl = self.tc.ctx.add_decl(Decl {
            name: str!("identity"),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Func(FuncDecl {
                ty: Ty::Poly(Box::new(PolyFnTy {
                    params: params.clone(),
                    fun,
                })),
                is_instance: false,
                is_static: false,
                is_operator: false,
                natural_arg_count: 1,
                default_args: vec![],
                generic_params: Some(params),
            }),
        });
        GenericFnFixture { decl, archetype }
    }

    /// `struct Stack<T> { func push(value: T) }`
    pub fn generic_stack(&mut self) -> StackFixture {
        let archetype = self.tc.ctx.add_archetype(Archetype {
            name: str!("T"),
            protocols: vec![],
            superclass: None,
        });
        let params = GenericParamList::new(vec![GenericParam {
            name: str!("T"),
            archetype,
        }]);
        let decl = self.tc.ctx.add_decl(Decl {
            name: str!("Stack"),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Nominal(NominalDecl {
                nominal_kind: NominalKind::Struct,
                generic_params: Some(params),
                superclass: None,
                members: vec![],
            }),
        });

        let self_ty = Ty::BoundGeneric(decl, vec![Ty::Archetype(archetype)]);
        let push_ty = Ty::func(
            self_ty,
            Ty::func(
                Ty::tuple(vec![TupleField::named("value", Ty::Archetype(archetype))]),
                Ty::unit(),
            ),
        );
        let push = self.tc.ctx.add_decl(Decl {
            name: str!("push"),
            container: DeclContainer::Nominal(decl),
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Func(FuncDecl {
                ty: push_ty,
                is_instance: true,
                is_static: false,
                is_operator: false,
                natural_arg_count: 2,
                default_args: vec![],
                generic_params: None,
            }),
        });
        add_member(&mut self.tc.ctx, decl, push);

        StackFixture {
            decl,
            archetype,
            push,
        }
    }

    /// A struct conforming only to the general integer literal protocol,
    /// with Int32 as its literal type.
    pub fn int_wrapper(&mut self) -> DeclId {
        let ctx = &mut self.tc.ctx;
        let wrapper = add_struct(ctx, "Celsius");
        let wrapper_ty = Ty::Nominal(wrapper);
        let witness = add_static_method(
            ctx,
            wrapper,
            "convertFromIntegerLiteral",
            Ty::Nominal(self.int32),
            wrapper_ty.clone(),
        );
        let proto = ctx
            .known_protocol(KnownProtocolKind::IntegerLiteralConvertible)
            .unwrap();
        conform(
            ctx,
            wrapper_ty,
            proto,
            vec![("convertFromIntegerLiteral", witness)],
            vec![("IntegerLiteralType", Ty::Nominal(self.int32))],
        );
        wrapper
    }

    /// `struct Point { func translate(delta: Int32) }`
    pub fn value_type_with_method(&mut self) -> PointFixture {
        let ctx = &mut self.tc.ctx;
        let decl = add_struct(ctx, "Point");
        let method_ty = Ty::func(
            Ty::Nominal(decl),
            Ty::func(
                Ty::tuple(vec![TupleField::named("delta", Ty::Nominal(self.int32))]),
                Ty::unit(),
            ),
        );
        let method = ctx.add_decl(Decl {
            name: str!("translate"),
            container: DeclContainer::Nominal(decl),
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Func(FuncDecl {
                ty: method_ty,
                is_instance: true,
                is_static: false,
                is_operator: false,
                natural_arg_count: 2,
                default_args: vec![],
                generic_params: None,
            }),
        });
        add_member(ctx, decl, method);
        PointFixture { decl, method }
    }

    pub fn class_decl(&mut self, name: &str) -> DeclId {
        self.tc.ctx.add_decl(Decl {
            name: name.to_string(),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Nominal(NominalDecl {
                nominal_kind: NominalKind::Class,
                generic_params: None,
                superclass: None,
                members: vec![],
            }),
        })
    }

    pub fn class_pair(&mut self) -> (DeclId, DeclId) {
        let base = self.class_decl("Base");
        let derived = self.tc.ctx.add_decl(Decl {
            name: str!("Derived"),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Nominal(NominalDecl {
                nominal_kind: NominalKind::Class,
                generic_params: None,
                superclass: Some(Ty::Nominal(base)),
                members: vec![],
            }),
        });
        (base, derived)
    }

    pub fn simple_protocol(&mut self, name: &str) -> DeclId {
        add_protocol(&mut self.tc.ctx, name)
    }

    pub fn conform(&mut self, ty: Ty, proto: DeclId) {
        conform(&mut self.tc.ctx, ty, proto, vec![], vec![]);
    }

    /// `func report(x: Int32, y: String, z: Int32 = #line)`
    pub fn fn_with_line_default(&mut self) -> DeclId {
        let mut z = TupleField::named("z", Ty::Nominal(self.int32));
        z.default = DefaultArgKind::Line;
        let input = Ty::tuple(vec![
            TupleField::named("x", Ty::Nominal(self.int32)),
            TupleField::named("y", Ty::Nominal(self.string)),
            z,
        ]);
        self.tc.ctx.add_decl(Decl {
            name: str!("report"),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Func(FuncDecl {
                ty: Ty::func(input, Ty::unit()),
                is_instance: false,
                is_static: false,
                is_operator: false,
                natural_arg_count: 1,
                default_args: vec![
                    (DefaultArgKind::None, Ty::Nominal(self.int32)),
                    (DefaultArgKind::None, Ty::Nominal(self.string)),
                    (DefaultArgKind::Line, Ty::Nominal(self.int32)),
                ],
                generic_params: None,
            }),
        })
    }

    pub fn int_to_int_fn(&mut self) -> DeclId {
        self.tc.ctx.add_decl(Decl {
            name: str!("increment"),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs::default(),
            kind: DeclKind::Func(FuncDecl {
                ty: Ty::func(Ty::Nominal(self.int32), Ty::Nominal(self.int32)),
                is_instance: false,
                is_static: false,
                is_operator: false,
                natural_arg_count: 1,
                default_args: vec![],
                generic_params: None,
            }),
        })
    }

    pub fn conversion_fn(&mut self) -> DeclId {
        self.tc.ctx.add_decl(Decl {
            name: str!("__conversion"),
            container: DeclContainer::TopLevel,
            loc: Source::default(),
            attrs: DeclAttrs {
                conversion: true,
                assignment: false,
            },
            kind: DeclKind::Func(FuncDecl {
                ty: Ty::func(Ty::unit(), Ty::unit()),
                is_instance: false,
                is_static: false,
                is_operator: false,
                natural_arg_count: 1,
                default_args: vec![],
                generic_params: None,
            }),
        })
    }

    /// An instance conversion member on Int64 producing Int32.
    pub fn register_int64_to_int32_conversion(&mut self) {
        let int64 = self.int64;
        let int32 = self.int32;
        let ctx = &mut self.tc.ctx;
        let conv_ty = Ty::func(
            Ty::Nominal(int64),
            Ty::func(Ty::unit(), Ty::Nominal(int32)),
        );
        let conv = ctx.add_decl(Decl {
            name: str!("__conversion"),
            container: DeclContainer::Nominal(int64),
            loc: Source::default(),
            attrs: DeclAttrs {
                conversion: true,
                assignment: false,
            },
            kind: DeclKind::Func(FuncDecl {
                ty: conv_ty,
                is_instance: true,
                is_static: false,
                is_operator: false,
                natural_arg_count: 2,
                default_args: vec![],
                generic_params: None,
            }),
        });
        add_member(ctx, int64, conv);
    }

    /// A list type convertible from array literals of Int32, with a
    /// variadic conversion witness.
    pub fn array_literal_list(&mut self) -> DeclId {
        let int32 = self.int32;
        let ctx = &mut self.tc.ctx;
        let proto = add_protocol(ctx, "ArrayLiteralConvertible");
        ctx.register_known_protocol(KnownProtocolKind::ArrayLiteralConvertible, proto);
        add_requirement(ctx, proto, "convertFromArrayLiteral");

        let list = add_struct(ctx, "IntList");
        let mut elements = TupleField::named("elements", Ty::slice(Ty::Nominal(int32)));
        elements.variadic = true;
        let witness = add_static_method(
            ctx,
            list,
            "convertFromArrayLiteral",
            Ty::tuple(vec![elements]),
            Ty::Nominal(list),
        );
        conform(
            ctx,
            Ty::Nominal(list),
            proto,
            vec![("convertFromArrayLiteral", witness)],
            vec![],
        );
        list
    }

    /// Record a user-conversion restriction from Int64 to Int32 together
    /// with the conversion member choice for the given locator.
    pub fn record_int64_to_int32_choice(&self, solution: &mut Solution, locator: Locator) {
        let conv = self
            .tc
            .ctx
            .lookup_member(&self.int64(), "__conversion")
            .pop()
            .expect("conversion member not registered");
        solution.constraint_restrictions.insert(
            (self.int64(), self.int32()),
            ConversionRestriction::User,
        );
        let opened_ty = self.tc.get_unopened_type_of_reference(conv);
        solution.overload_choices.insert(
            locator.with(PathElt::ConversionMember),
            (OverloadChoice::Decl(conv), opened_ty),
        );
    }
}

fn add_struct(ctx: &mut TyCtx, name: &str) -> DeclId {
    ctx.add_decl(Decl {
        name: name.to_string(),
        container: DeclContainer::TopLevel,
        loc: Source::default(),
        attrs: DeclAttrs::default(),
        kind: DeclKind::Nominal(NominalDecl {
            nominal_kind: NominalKind::Struct,
            generic_params: None,
            superclass: None,
            members: vec![],
        }),
    })
}

fn add_generic_struct(ctx: &mut TyCtx, name: &str) -> DeclId {
    let archetype = ctx.add_archetype(Archetype {
        name: str!("T"),
        protocols: vec![],
        superclass: None,
    });
    let params = GenericParamList::new(vec![GenericParam {
        name: str!("T"),
        archetype,
    }]);
    ctx.add_decl(Decl {
        name: name.to_string(),
        container: DeclContainer::TopLevel,
        loc: Source::default(),
        attrs: DeclAttrs::default(),
        kind: DeclKind::Nominal(NominalDecl {
            nominal_kind: NominalKind::Struct,
            generic_params: Some(params),
            superclass: None,
            members: vec![],
        }),
    })
}

fn add_protocol(ctx: &mut TyCtx, name: &str) -> DeclId {
    let self_archetype = ctx.add_archetype(Archetype {
        name: str!("Self"),
        protocols: vec![],
        superclass: None,
    });
    ctx.add_decl(Decl {
        name: name.to_string(),
        container: DeclContainer::TopLevel,
        loc: Source::default(),
        attrs: DeclAttrs::default(),
        kind: DeclKind::Protocol(ProtocolDecl {
            members: vec![],
            assoc_types: vec![],
            self_archetype,
        }),
    })
}

fn add_requirement(ctx: &mut TyCtx, proto: DeclId, name: &str) -> DeclId {
    let requirement = ctx.add_decl(Decl {
        name: name.to_string(),
        container: DeclContainer::Protocol(proto),
        loc: Source::default(),
        attrs: DeclAttrs::default(),
        kind: DeclKind::Func(FuncDecl {
            ty: Ty::func(Ty::unit(), Ty::unit()),
            is_instance: false,
            is_static: true,
            is_operator: false,
            natural_arg_count: 2,
            default_args: vec![],
            generic_params: None,
        }),
    });
    if let DeclKind::Protocol(p) = &mut ctx.decl_mut(proto).kind {
        p.members.push(requirement);
    }
    requirement
}

fn add_static_method(
    ctx: &mut TyCtx,
    owner: DeclId,
    name: &str,
    arg_ty: Ty,
    result_ty: Ty,
) -> DeclId {
    let ty = Ty::func(
        Ty::metatype(Ty::Nominal(owner)),
        Ty::func(arg_ty, result_ty),
    );
    let method = ctx.add_decl(Decl {
        name: name.to_string(),
        container: DeclContainer::Nominal(owner),
        loc: Source::default(),
        attrs: DeclAttrs::default(),
        kind: DeclKind::Func(FuncDecl {
            ty,
            is_instance: false,
            is_static: true,
            is_operator: false,
            natural_arg_count: 2,
            default_args: vec![],
            generic_params: None,
        }),
    });
    add_member(ctx, owner, method);
    method
}

fn add_member(ctx: &mut TyCtx, owner: DeclId, member: DeclId) {
    if let DeclKind::Nominal(nominal) = &mut ctx.decl_mut(owner).kind {
        nominal.members.push(member);
    }
}

fn conform(
    ctx: &mut TyCtx,
    ty: Ty,
    proto: DeclId,
    witnesses: Vec<(&str, DeclId)>,
    type_witnesses: Vec<(&str, Ty)>,
) {
    let witnesses: HashMap<String, DeclId> = witnesses
        .into_iter()
        .map(|(name, decl)| (name.to_string(), decl))
        .collect();
    let type_witnesses: HashMap<String, Ty> = type_witnesses
        .into_iter()
        .map(|(name, witness)| (name.to_string(), witness))
        .collect();
    ctx.add_conformance(Conformance {
        ty,
        protocol: proto,
        witnesses,
        type_witnesses,
    });
}
