use std::sync::Arc;

use proptest::{
    prelude::{any, prop, prop_oneof, Arbitrary, BoxedStrategy, Just, Strategy},
    prop_compose,
};
use smol_str::SmolStr;

use crate::{ArrTy, Literal, ObjTy, PrimitiveTy, Property, TupleElement, TupleTy, Ty, TyRef};

#[derive(Debug, Clone, Copy)]
pub struct RecursiveParams {
    pub depth: u32,
    pub desired_size: u32,
    pub expected_branch_size: u32,
}

impl Default for RecursiveParams {
    fn default() -> Self {
        Self {
            depth: 3,                // levels deep
            desired_size: 32,        // total nodes
            expected_branch_size: 3, // items per collection
        }
    }
}

pub fn arb_prim() -> impl Strategy<Value = PrimitiveTy> {
    prop_oneof![
        Just(PrimitiveTy::Number),
        Just(PrimitiveTy::String),
        Just(PrimitiveTy::Boolean),
    ]
}

pub fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        prop_oneof![Just("a"), Just("b"), Just("foo")].prop_map(Literal::from),
        (0i32..4).prop_map(Literal::from),
        any::<bool>().prop_map(Literal::from),
    ]
}

prop_compose! {
    // a small key space so that objects share fields often enough to be
    // interesting
    fn arb_key()(key in "[a-d]") -> SmolStr {
        key.into()
    }
}

/// Concrete terms only: no variables, generics or projections.
fn arb_concrete(args: RecursiveParams) -> impl Strategy<Value = TyRef> {
    let leaf = prop_oneof![
        arb_prim().prop_map(|p| TyRef::from(Ty::Primitive(p))),
        arb_literal().prop_map(|l| Ty::lit(l)),
        Just(Ty::null()),
        Just(Ty::void()),
        Just(Ty::mixed()),
        Just(Ty::any()),
    ];

    leaf.prop_recursive(
        args.depth,
        args.desired_size,
        args.expected_branch_size,
        |inner| {
            prop_oneof![
                inner.clone().prop_map(Ty::array),
                inner.clone().prop_map(Ty::ro_array),
                prop::collection::vec(inner.clone(), 0..3).prop_map(|elems| {
                    Ty::Array(Arc::new(ArrTy::Tuple(TupleTy::new(
                        elems.into_iter().map(TupleElement::required),
                    ))))
                    .into()
                }),
                prop::collection::btree_map(arb_key(), inner.clone(), 0..4).prop_map(|map| {
                    Ty::obj(ObjTy {
                        props: map
                            .into_iter()
                            .map(|(k, v)| (k, Property::field(v)))
                            .collect(),
                        flags: crate::ObjFlags {
                            exact: true,
                            sealed: true,
                        },
                        ..Default::default()
                    })
                }),
                (prop::collection::vec(inner.clone(), 0..3), inner.clone())
                    .prop_map(|(params, ret)| Ty::fun(params, ret)),
                prop::collection::vec(inner.clone(), 2..4).prop_map(|ms| Ty::union(ms)),
                inner.clone().prop_map(Ty::maybe),
                inner.prop_map(Ty::optional),
            ]
        },
    )
}

impl Arbitrary for TyRef {
    type Parameters = RecursiveParams;
    type Strategy = BoxedStrategy<TyRef>;

    fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
        arb_concrete(args).boxed()
    }
}

impl Arbitrary for PrimitiveTy {
    type Parameters = ();
    type Strategy = BoxedStrategy<PrimitiveTy>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        arb_prim().boxed()
    }
}
