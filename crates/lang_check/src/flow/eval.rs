// ==============================================================================
// Lazy Projections
// ==============================================================================
//
// `Eval(id, target, destructor)` stands for the result of applying the
// destructor to the target. The first time a projection is dispatched, a
// result variable is created and cached under (id, target) before the target
// is flowed into the destructor, so recursive projections meet the variable
// instead of evaluating again.

use lang_ty::{ArrTy, Destructor, EvalTy, ObjTy, Polarity, TupleElement, Ty, TyRef};
use log::debug;

use crate::blame::Blame;
use crate::constraints::UseTy;
use crate::kit::spread_kit;
use crate::{CheckCtx, FlowAbort, FlowResult};

impl CheckCtx {
    pub(super) fn eval_result(&mut self, ev: &EvalTy, blame: &Blame) -> Result<TyRef, FlowAbort> {
        let key = (ev.id, ev.target.clone());
        if let Some(result) = self.eval_cache.get(&key) {
            return Ok(result.clone());
        }
        let tout = self.fresh_var_ty();
        self.eval_cache.insert(key, tout.clone());
        self.stats.evaluations += 1;
        debug!("evaluate {:?} ({:?}) into {tout:?}", ev.id, ev.destructor);

        let apply = UseTy::EvalDestructor {
            id: ev.id,
            destructor: ev.destructor.clone(),
            tout: tout.clone(),
        };
        self.flow_inner(&ev.target, &apply, blame)?;
        Ok(tout)
    }

    pub(super) fn eval_destructor(
        &mut self,
        lower: &TyRef,
        destructor: &Destructor,
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let into_tout = UseTy::Subtype(tout.clone());
        if matches!(**lower, Ty::Empty) {
            return self.flow_inner(lower, &into_tout, blame);
        }

        let result = match destructor {
            Destructor::PropertyType(name) => {
                return self.flow_inner(lower, &UseTy::get_prop(name.clone(), tout.clone()), blame)
            }
            Destructor::ElementType(key) => {
                let access = UseTy::GetElem {
                    key: key.clone(),
                    tout: tout.clone(),
                };
                return self.flow_inner(lower, &access, blame);
            }
            Destructor::Spread(_) => {
                return match spread_kit(destructor) {
                    Some(kit) => kit.run(self, lower, blame, tout),
                    None => unreachable!("spread destructor without a kit"),
                }
            }
            Destructor::NonMaybe => match &**lower {
                Ty::Null | Ty::Void => return Ok(()),
                _ => lower.clone(),
            },
            Destructor::ReadOnly => read_only(lower),
            Destructor::Partial => match &**lower {
                Ty::Obj(obj) => {
                    let mut partial = ObjTy::clone(obj);
                    for prop in partial.props.values_mut() {
                        if !prop.ty.admits_void() {
                            prop.ty = Ty::optional(prop.ty.clone());
                        }
                    }
                    Ty::obj(partial)
                }
                _ => lower.clone(),
            },
            Destructor::Values => match &**lower {
                Ty::Obj(obj) => Ty::union(
                    obj.props
                        .values()
                        .filter(|p| p.polarity.can_read())
                        .map(|p| p.ty.clone())
                        .chain(obj.dict.iter().map(|d| d.value.clone())),
                ),
                Ty::EnumObject(e) => Ty::EnumValue(e.clone()).into(),
                Ty::Array(arr) => arr.elem_ty(),
                _ => return self.incompatible(lower, upper, blame),
            },
        };
        self.flow_inner(&result, &into_tout, blame)
    }
}

/// Every property and element made covariant.
fn read_only(ty: &TyRef) -> TyRef {
    match &**ty {
        Ty::Obj(obj) => {
            let mut ro = ObjTy::clone(obj);
            for prop in ro.props.values_mut() {
                prop.polarity = Polarity::Positive;
            }
            if let Some(dict) = &mut ro.dict {
                dict.polarity = Polarity::Positive;
            }
            Ty::obj(ro)
        }
        Ty::Array(arr) => match &**arr {
            ArrTy::Array(elem) | ArrTy::ReadOnly(elem) => Ty::ro_array(elem.clone()),
            ArrTy::Tuple(tup) => {
                let elems = tup.elems.iter().map(|e| TupleElement {
                    polarity: Polarity::Positive,
                    ..e.clone()
                });
                Ty::Array(ArrTy::Tuple(lang_ty::TupleTy::new(elems)).into()).into()
            }
        },
        _ => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::{BlameOp, SiteId};
    use lang_ty::{ty, Property};

    fn blame() -> Blame {
        Blame::new(BlameOp::Assignment, SiteId(2))
    }

    fn eval(cx: &mut CheckCtx, target: TyRef, destructor: Destructor) -> TyRef {
        let id = cx.fresh_eval_id();
        let out = cx.fresh_var();
        cx.subtype(&Ty::eval(id, target, destructor), &Ty::var(out), &blame());
        cx.resolve_to_term(out)
    }

    #[test]
    fn property_type() {
        let mut cx = CheckCtx::default();
        let t = eval(&mut cx, ty!({ "a": Number }), Destructor::PropertyType("a".into()));
        assert_eq!(t, ty!(Number));
    }

    #[test]
    fn non_maybe_drops_null_and_void() {
        let mut cx = CheckCtx::default();
        let t = eval(&mut cx, ty!(? String), Destructor::NonMaybe);
        assert_eq!(t, ty!(String));
    }

    #[test]
    fn partial_and_read_only() {
        let mut cx = CheckCtx::default();
        let partial = eval(&mut cx, ty!({ "a": Number }), Destructor::Partial);
        assert_eq!(partial, ty!({ "a": (opt Number) }));

        let ro = eval(&mut cx, ty!({ "a": Number }), Destructor::ReadOnly);
        let expected = Ty::obj(ObjTy::exact([]).with_prop("a", Property::read_only(ty!(Number))));
        assert_eq!(ro, expected);
    }

    #[test]
    fn values_of_object() {
        let mut cx = CheckCtx::default();
        let t = eval(&mut cx, ty!({ "a": Number, "b": String }), Destructor::Values);
        assert_eq!(t, ty!(union [Number, String]));
    }

    #[test]
    fn projection_is_evaluated_once() {
        let mut cx = CheckCtx::default();
        let id = cx.fresh_eval_id();
        let projection = Ty::eval(id, ty!({ "a": Number }), Destructor::PropertyType("a".into()));
        let a = cx.fresh_var_ty();
        let b = cx.fresh_var_ty();
        cx.subtype(&projection, &a, &blame());
        cx.subtype(&projection, &b, &blame());
        assert_eq!(cx.stats().evaluations, 1);
    }

    #[test]
    fn spread_merges_objects() {
        let mut cx = CheckCtx::default();
        let t = eval(
            &mut cx,
            ty!({ "a": Number }),
            Destructor::Spread(vec![ty!({ "b": String })]),
        );
        assert_eq!(t, ty!({ "a": Number, "b": String }));
    }
}
