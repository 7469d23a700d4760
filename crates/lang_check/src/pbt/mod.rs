// ==============================================================================
// Property-Based Tests for the Solver
// ==============================================================================
//
// Generates concrete type terms (no variables, generics or projections) and
// checks the laws every derivation must respect.
//
// Known limitations:
// - Generated objects are exact, sealed and have neutral properties only, so
//   polarity-directed variance is covered by the unit tests instead.
// - Terms are rebuilt before being compared against themselves; otherwise
//   shared children would hit the pointer-equality fast path and the
//   structural rules would never run.

use std::sync::Arc;

use lang_ty::{ArrTy, FunParam, FunTy, ObjTy, TupleElement, TupleTy, Ty, TyRef};
use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest, ProptestConfig};

use crate::{Blame, BlameOp, CheckCtx, SiteId};

fn blame() -> Blame {
    Blame::new(BlameOp::Assignment, SiteId(1))
}

/// Structurally identical copy of `ty` sharing no nodes with it.
fn rebuild(ty: &TyRef) -> TyRef {
    match &**ty {
        Ty::Maybe(inner) => Ty::maybe(rebuild(inner)),
        Ty::Optional(inner) => Ty::optional(rebuild(inner)),
        Ty::Union(members) => Ty::union(members.iter().map(rebuild)),
        Ty::Inter(members) => Ty::inter(members.iter().map(rebuild)),
        Ty::Fun(fun) => {
            let param = |p: &FunParam| FunParam {
                ty: rebuild(&p.ty),
                ..p.clone()
            };
            Ty::Fun(Arc::new(FunTy {
                this: rebuild(&fun.this),
                params: fun.params.iter().map(param).collect(),
                rest: fun.rest.as_ref().map(param),
                ret: rebuild(&fun.ret),
                effect: fun.effect,
            }))
            .into()
        }
        Ty::Obj(obj) => {
            let mut copy = ObjTy::clone(obj);
            for prop in copy.props.values_mut() {
                prop.ty = rebuild(&prop.ty);
            }
            Ty::obj(copy)
        }
        Ty::Array(arr) => match &**arr {
            ArrTy::Array(elem) => Ty::array(rebuild(elem)),
            ArrTy::ReadOnly(elem) => Ty::ro_array(rebuild(elem)),
            ArrTy::Tuple(tup) => {
                let elems = tup.elems.iter().map(|e| TupleElement {
                    ty: rebuild(&e.ty),
                    ..e.clone()
                });
                Ty::Array(Arc::new(ArrTy::Tuple(TupleTy::new(elems)))).into()
            }
        },
        other => other.clone().into(),
    }
}

fn holds(lower: &TyRef, upper: &TyRef) -> bool {
    let mut cx = CheckCtx::default();
    cx.subtype(lower, upper, &blame());
    cx.diagnostics().is_empty()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn reflexive(ty in any::<TyRef>()) {
        let copy = rebuild(&ty);
        prop_assert!(!copy.ptr_eq(&ty));
        prop_assert!(holds(&ty, &copy), "{ty} <: {copy}");
    }

    #[test]
    fn top_and_bottom(ty in any::<TyRef>()) {
        prop_assert!(holds(&ty, &Ty::mixed()));
        prop_assert!(holds(&Ty::empty(), &ty));
    }

    #[test]
    fn any_goes_both_ways(ty in any::<TyRef>()) {
        prop_assert!(holds(&ty, &Ty::any()));
        prop_assert!(holds(&Ty::any(), &ty));
    }

    #[test]
    fn lower_bounds_are_idempotent(ty in any::<TyRef>()) {
        let mut once = CheckCtx::default();
        let v = once.fresh_var();
        once.add_lower_bound(v, &ty, &blame());

        let mut twice = CheckCtx::default();
        let w = twice.fresh_var();
        twice.add_lower_bound(w, &ty, &blame());
        twice.add_lower_bound(w, &ty, &blame());

        prop_assert_eq!(once.lower_bounds(v), twice.lower_bounds(w));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn unions_distribute(a in any::<TyRef>(), b in any::<TyRef>(), c in any::<TyRef>()) {
        let both = Ty::union([a.clone(), b.clone()]);
        prop_assert_eq!(
            holds(&both, &c),
            holds(&a, &c) && holds(&b, &c),
            "{} | {} <: {}", a, b, c
        );
    }
}
