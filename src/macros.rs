macro_rules! str {
    ($s:expr) => {
        $s.to_string()
    };
}

macro_rules! variant {
    ($x:expr, if $($p:ident)::+ ($($id:ident),*) , else $b:block) => {{
        match $x {
            $($p)::+($($id),*) => ($($id),*),
            _ => $b,
        }
    }};

    ($x:expr, if $($p:ident)::+ ($($id:ident),*)) => {{
        match $x {
            $($p)::+($($id),*) => ($($id),*),
            _ => panic!("Unexpected value found inside '{}'", stringify!($x)),
        }
    }};
}
