// ==============================================================================
// Constructor Shapes
// ==============================================================================
//
// A projection of a term's outermost constructor, carrying only what is
// needed to rule out compatibility without solving. The union prefilter in
// the solver uses this to skip members a lower bound can never match; a
// `true` from `may_overlap` is never a promise of success.

use crate::{ArrTy, ClassId, Literal, PrimitiveTy, Ty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TyShape<'a> {
    Primitive(PrimitiveTy),
    Lit(&'a Literal),
    Null,
    Void,
    Object { exact: bool },
    Instance(ClassId),
    Array,
    Tuple(usize),
    Function,
    Class,
    Enum,
    /// Variables, `any`, `mixed`, joins, generics and projections: nothing
    /// can be ruled out.
    Unknown,
}

impl<'a> TyShape<'a> {
    pub fn of(ty: &'a Ty) -> Self {
        match ty {
            Ty::Primitive(p) => TyShape::Primitive(*p),
            Ty::Literal(l) => TyShape::Lit(l),
            Ty::Null => TyShape::Null,
            Ty::Void => TyShape::Void,
            Ty::Obj(obj) => TyShape::Object {
                exact: obj.flags.exact,
            },
            Ty::Instance(inst) => TyShape::Instance(inst.class_id),
            Ty::Array(arr) => match &**arr {
                ArrTy::Tuple(tup) if tup.elems.iter().all(|e| !e.optional) => {
                    TyShape::Tuple(tup.elems.len())
                }
                _ => TyShape::Array,
            },
            Ty::Fun(_) => TyShape::Function,
            Ty::Class(_) => TyShape::Class,
            Ty::EnumValue(_) => TyShape::Enum,
            _ => TyShape::Unknown,
        }
    }
}

/// Whether two shapes are provably disjoint as lower and upper bound.
pub fn shapes_disjoint(lower: &TyShape, upper: &TyShape) -> bool {
    use TyShape::*;
    match (lower, upper) {
        (Unknown, _) | (_, Unknown) => false,

        (Primitive(a), Primitive(b)) => a != b,
        (Lit(l), Primitive(p)) => l.primitive() != *p,
        (Primitive(_), Lit(_)) => false,
        (Lit(a), Lit(b)) => a != b,

        (Null, Null) | (Void, Void) => false,

        // Functions and instances may carry properties and satisfy an
        // inexact object.
        (Object { .. }, Object { .. }) => false,
        (Instance(_), Object { exact: false }) => false,
        (Function, Object { exact: false }) => false,
        (Class, Object { exact: false }) => false,
        (Instance(_), Instance(_)) => false,

        (Array, Array) | (Tuple(_), Array) | (Array, Tuple(_)) => false,
        (Tuple(a), Tuple(b)) => a != b,

        (Function, Function) | (Class, Function) | (Class, Class) => false,
        (Object { .. }, Function) => false,
        (Enum, Enum) | (Enum, Primitive(_)) => false,

        _ => true,
    }
}

/// Whether `lower` could possibly flow into `upper`. Optional and maybe
/// wrappers on the upper side are looked through.
pub fn may_overlap(lower: &Ty, upper: &Ty) -> bool {
    match upper {
        Ty::Maybe(inner) => {
            matches!(lower, Ty::Null | Ty::Void) || may_overlap(lower, inner)
        }
        Ty::Optional(inner) => matches!(lower, Ty::Void) || may_overlap(lower, inner),
        Ty::Union(members) => members.iter().any(|m| may_overlap(lower, m)),
        _ => match lower {
            Ty::Union(members) => members.iter().any(|m| may_overlap(m, upper)),
            _ => !shapes_disjoint(&TyShape::of(lower), &TyShape::of(upper)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty;

    #[test]
    fn primitives_and_literals() {
        assert!(may_overlap(&ty!(lit "a"), &ty!(String)));
        assert!(!may_overlap(&ty!(lit "a"), &ty!(Number)));
        assert!(!may_overlap(&ty!(Number), &ty!(String)));
        assert!(may_overlap(&ty!(Number), &ty!(lit 1)));
    }

    #[test]
    fn cross_constructor_disjoint() {
        assert!(!may_overlap(&ty!(Number), &ty!({ "a": Number })));
        assert!(!may_overlap(&ty!([Number]), &ty!(fn() -> Void)));
        assert!(!may_overlap(&ty!(Null), &ty!(Void)));
    }

    #[test]
    fn unknown_never_rules_out() {
        assert!(may_overlap(&ty!((# 0)), &ty!(String)));
        assert!(may_overlap(&ty!(Number), &ty!(Mixed)));
        assert!(may_overlap(&ty!(Any), &ty!({})));
    }

    #[test]
    fn wrappers_looked_through() {
        assert!(may_overlap(&ty!(Null), &ty!(? Number)));
        assert!(!may_overlap(&ty!(Null), &ty!(opt Number)));
        assert!(may_overlap(&ty!(Void), &ty!(opt Number)));
        assert!(!may_overlap(&ty!(String), &ty!(? Number)));
    }

    #[test]
    fn tuples_by_length() {
        assert!(!may_overlap(&ty!(tuple [Number]), &ty!(tuple [Number, Number])));
        assert!(may_overlap(&ty!(tuple [Number]), &ty!([Number])));
    }
}
