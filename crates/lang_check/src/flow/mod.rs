// ==============================================================================
// Flow: subtype and use-constraint dispatch
// ==============================================================================
//
// `flow(lower, upper)` decides whether `lower` satisfies `upper`. The entry
// consults the guards, then:
//
//   1. lazy projections are materialized into their cached result variable
//   2. a variable on either side is handed to propagation
//   3. `any` on the lower side is pushed into the upper's substructure
//   4. `empty` on the lower side succeeds, except for the constraints that
//      must still do work (see `UseTy::runs_on_empty`)
//   5. unions (and `?T`, `T | void`) on the lower side are split member by
//      member, unless the constraint keeps them whole
//   6. everything else is a case analysis on the pair's shapes
//
// Side effects are only ever recursive flows, bound writes, or diagnostics.

mod any;
mod arrays;
mod call;
mod eval;
mod props;
mod subtype;

use lang_ty::{PolyTy, Ty, TyRef, TypeAppTy};
use log::{debug, trace};

use crate::blame::{Blame, BlameFrame, SiteId};
use crate::constraints::{ConstraintKind, UseTy};
use crate::diagnostic::DiagnosticKind;
use crate::{CheckCtx, FlowAbort, FlowResult};

impl CheckCtx {
    /// Re-entrant form of [`CheckCtx::flow`] for kits and nested dispatch.
    /// Aborts propagate to the caller instead of being reported.
    pub fn flow_inner(&mut self, lower: &TyRef, upper: &UseTy, blame: &Blame) -> FlowResult {
        if let UseTy::Subtype(u) = upper {
            if lower.ptr_eq(u) || (lower == u && is_leaf(lower)) {
                return Ok(());
            }
        }

        let involves_var =
            lower.is_var() || matches!(upper, UseTy::Subtype(u) if u.is_var());
        let spec = self.active_spec();
        if !involves_var && !self.guard.mark_pair(lower, upper, spec) {
            self.stats.cache_hits += 1;
            return Ok(());
        }

        let result = self.enter_and_dispatch(lower, upper, blame);
        // An aborted trace did not finish its pairs; they must be redone.
        if result.is_err() && !involves_var {
            self.guard.unmark_pair(lower, upper, spec);
        }
        result
    }

    fn enter_and_dispatch(&mut self, lower: &TyRef, upper: &UseTy, blame: &Blame) -> FlowResult {
        if self.guard.tick(self.config.cancel_check_interval) {
            self.poll_cancel()?;
        }
        self.guard.enter(self.config.max_depth)?;
        self.stats.dispatches += 1;
        trace!("{lower:?} ~> {upper:?}");
        let result = self.dispatch(lower, upper, blame);
        self.guard.leave();
        result
    }

    fn dispatch(&mut self, lower: &TyRef, upper: &UseTy, blame: &Blame) -> FlowResult {
        if let Ty::Eval(ev) = &**lower {
            let result = self.eval_result(ev, blame)?;
            return self.flow_inner(&result, upper, blame);
        }
        if let UseTy::Subtype(u) = upper {
            if let Ty::Eval(ev) = &**u {
                let result = self.eval_result(ev, blame)?;
                return self.flow_inner(lower, &UseTy::Subtype(result), blame);
            }
        }

        if let Some(v) = lower.as_var() {
            return self.add_upper_bound_inner(v, upper, blame);
        }
        if let UseTy::Subtype(u) = upper {
            if let Some(w) = u.as_var() {
                return self.add_lower_bound_inner(w, lower, blame);
            }
        }

        if lower.is_any() {
            return self.flow_any_lower(lower, upper, blame);
        }

        if matches!(**lower, Ty::Empty) && !upper.runs_on_empty() {
            return Ok(());
        }

        if !upper.keeps_union_whole() {
            if let Some(members) = split_lower(lower) {
                for (index, member) in members.iter().enumerate() {
                    self.flow_inner(member, upper, &blame.push(BlameFrame::UnionMember { index }))?;
                }
                return Ok(());
            }
        }

        match upper {
            UseTy::Subtype(u) => self.flow_subtype(lower, u, blame),
            _ => {
                if let Some(unwrapped) = self.unwrap_lower(lower, upper, blame)? {
                    return self.flow_inner(&unwrapped, upper, blame);
                }
                if let Ty::Inter(members) = &**lower {
                    return match upper {
                        UseTy::Call(_) | UseTy::Construct(_) => {
                            self.try_overloads(lower, members, upper, blame)
                        }
                        _ => self.try_inter_members(lower, members, upper, blame),
                    };
                }
                self.dispatch_use(lower, upper, blame)
            }
        }
    }

    fn dispatch_use(&mut self, lower: &TyRef, upper: &UseTy, blame: &Blame) -> FlowResult {
        match upper {
            UseTy::Subtype(u) => self.flow_subtype(lower, u, blame),
            UseTy::GetProp { prop, tout } => self.get_prop(lower, prop, tout, upper, blame),
            UseTy::SetProp { prop, value } => self.set_prop(lower, prop, value, upper, blame),
            UseTy::MethodCall { name, call } => self.method_call(lower, name, call, blame),
            UseTy::Call(call) => self.call_value(lower, call, upper, blame),
            UseTy::Construct(call) => self.construct(lower, call, upper, blame),
            UseTy::GetElem { key, tout } => self.get_elem(lower, key, tout, upper, blame),
            UseTy::SetElem { key, value } => self.set_elem(lower, key, value, upper, blame),
            UseTy::ElemOn { obj, action } => self.elem_on(lower, obj, action, blame),
            UseTy::ObjRest { excluded, tout } => self.obj_rest(lower, excluded, tout, upper, blame),
            UseTy::ArrRest { index, tout } => self.arr_rest(lower, *index, tout, upper, blame),
            UseTy::ResolveSpread(spread) => self.resolve_spread(lower, spread, upper, blame),
            UseTy::EvalDestructor {
                destructor, tout, ..
            } => self.eval_destructor(lower, destructor, tout, upper, blame),
            UseTy::Destructure { selector, tout } => self.destructure(lower, selector, tout, blame),
            UseTy::Reposition { tout, .. } => {
                self.flow_inner(lower, &UseTy::Subtype(tout.clone()), blame)
            }
            UseTy::Kit { kit, tout } => kit.run(self, lower, blame, tout),
        }
    }

    /// Generic wrappers that stand for another term whenever the upper side
    /// is not a plain subtype check.
    fn unwrap_lower(
        &mut self,
        lower: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> Result<Option<TyRef>, FlowAbort> {
        let unwrapped = match &**lower {
            Ty::Poly(poly) => {
                let (targs, site) = match upper {
                    UseTy::Call(call) | UseTy::Construct(call) => {
                        (call.targs.as_deref(), call.site)
                    }
                    UseTy::MethodCall { call, .. } => (None, call.site),
                    _ => (None, blame.site()),
                };
                Some(self.instantiate(lower, poly, targs, site, blame)?)
            }
            Ty::TypeApp(app) => Some(expand_type_app(app)),
            Ty::Opaque(opaque) => opaque.underlying.clone().or_else(|| opaque.upper.clone()),
            Ty::Param(param) => Some(param.bound.clone()),
            Ty::EnumValue(e) => Some(e.representation.clone()),
            _ => None,
        };
        Ok(unwrapped)
    }

    /// Substitute `poly`'s parameters, with explicit arguments or fresh
    /// variables. Cached per (poly, explicit arguments, site).
    pub(crate) fn instantiate(
        &mut self,
        lower: &TyRef,
        poly: &PolyTy,
        explicit: Option<&[TyRef]>,
        site: SiteId,
        blame: &Blame,
    ) -> Result<TyRef, FlowAbort> {
        let key = (poly.id, explicit.map(<[TyRef]>::to_vec).unwrap_or_default(), site);
        if let Some(inst) = self.inst_cache.get(&key) {
            return Ok(inst.clone());
        }

        let targs: Vec<TyRef> = match explicit {
            Some(targs) => {
                if targs.len() > poly.tparams.len() {
                    self.report(
                        DiagnosticKind::ArityMismatch {
                            expected: poly.tparams.len(),
                            found: targs.len(),
                        },
                        lower,
                        "explicit type arguments".into(),
                        ConstraintKind::Call,
                        blame,
                    );
                }
                targs.to_vec()
            }
            None => poly.tparams.iter().map(|_| self.fresh_var_ty()).collect(),
        };
        let subst = poly.subst_for(&targs);
        let inst = subst.apply(&poly.body);
        self.inst_cache.insert(key, inst.clone());
        self.stats.instantiations += 1;
        debug!("instantiate {:?} at {site:?}", poly.id);

        let inst_blame = blame.push(BlameFrame::Instantiation);
        for tparam in &poly.tparams {
            let bound = subst.apply(&tparam.bound);
            if matches!(*bound, Ty::Mixed) {
                continue;
            }
            if let Some(arg) = subst.get(&tparam.name) {
                let frame = inst_blame.push(BlameFrame::TypeArg {
                    name: tparam.name.clone(),
                });
                self.flow_inner(arg, &UseTy::Subtype(bound), &frame)?;
            }
        }
        Ok(inst)
    }
}

/// The body of a type application with the constructor's parameters
/// replaced. Non-generic constructors apply to nothing.
pub(crate) fn expand_type_app(app: &TypeAppTy) -> TyRef {
    match &*app.ctor {
        Ty::Poly(poly) => poly.subst_for(&app.targs).apply(&poly.body),
        _ => app.ctor.clone(),
    }
}

/// Members of a lower bound that is dispatched one member at a time.
fn split_lower(lower: &TyRef) -> Option<Vec<TyRef>> {
    match &**lower {
        Ty::Union(members) => Some(members.to_vec()),
        Ty::Maybe(inner) => Some(vec![inner.clone(), Ty::null(), Ty::void()]),
        Ty::Optional(inner) => Some(vec![inner.clone(), Ty::void()]),
        _ => None,
    }
}

fn is_leaf(ty: &Ty) -> bool {
    matches!(
        ty,
        Ty::Mixed | Ty::Empty | Ty::Void | Ty::Null | Ty::Primitive(_) | Ty::Literal(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::BlameOp;
    use crate::SolverConfig;
    use lang_ty::{ty, TypeParam};

    fn blame() -> Blame {
        Blame::new(BlameOp::Assignment, SiteId(3))
    }

    #[test]
    fn repeated_pairs_hit_the_cache() {
        let mut cx = CheckCtx::default();
        let t = ty!({ "a": Number });
        cx.subtype(&t, &ty!({ "a": Number }), &blame());
        let dispatches = cx.stats().dispatches;
        cx.subtype(&t, &ty!({ "a": Number }), &blame());
        assert_eq!(cx.stats().dispatches, dispatches);
        assert!(cx.stats().cache_hits >= 1);
    }

    #[test]
    fn empty_lower_does_nothing_except_on_allow_list() {
        let mut cx = CheckCtx::default();
        let v = cx.fresh_var();
        cx.flow(&ty!(Empty), &UseTy::get_prop("x", Ty::var(v)), &blame());
        assert!(cx.diagnostics().is_empty());
        assert!(cx.lower_bounds(v).is_empty());

        cx.flow(
            &ty!(Empty),
            &UseTy::ArrRest {
                index: 0,
                tout: Ty::var(v),
            },
            &blame(),
        );
        assert_eq!(cx.lower_bounds(v), vec![ty!(Empty)]);
    }

    #[test]
    fn instantiation_is_cached_per_site() {
        let mut cx = CheckCtx::default();
        let id = cx.fresh_poly_id();
        let poly = PolyTy {
            id,
            tparams: vec![TypeParam::new("T")],
            body: Ty::fun([Ty::param("T", ty!(Mixed))], Ty::param("T", ty!(Mixed))),
        };
        let lower = Ty::poly(poly.clone());
        let a = cx.instantiate(&lower, &poly, None, SiteId(9), &blame()).unwrap();
        let b = cx.instantiate(&lower, &poly, None, SiteId(9), &blame()).unwrap();
        let c = cx.instantiate(&lower, &poly, None, SiteId(10), &blame()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cx.stats().instantiations, 2);
    }

    #[test]
    fn bounded_instantiation_checks_explicit_args() {
        let mut cx = CheckCtx::new(SolverConfig::default());
        let id = cx.fresh_poly_id();
        let poly = PolyTy {
            id,
            tparams: vec![TypeParam::bounded("T", ty!(Number))],
            body: Ty::param("T", ty!(Number)),
        };
        let lower = Ty::poly(poly.clone());
        let inst = cx
            .instantiate(&lower, &poly, Some(&[ty!(String)]), SiteId(1), &blame())
            .unwrap();
        assert_eq!(inst, ty!(String));
        assert_eq!(cx.diagnostics().len(), 1);
    }
}
