#[macro_export]
macro_rules! subst {
    () => {
        $crate::typing::Subst::new()
    };

    ($($k:expr => $v:expr),+ $(,)?) => {{
        let mut h = $crate::typing::Subst::new();
        $(h.insert($k, $v);)+
        h
    }};
}

#[macro_export]
macro_rules! tvar {
    ($v:expr) => {
        $crate::typing::ty::TyVar($v)
    };
}

#[macro_export]
macro_rules! tuple_ty {
    ($($ty:expr),* $(,)?) => {
        $crate::typing::ty::Ty::tuple(vec![$($crate::typing::ty::TupleField::from($ty)),*])
    };
}
