// ==============================================================================
// Arrays, Elements and Spreads
// ==============================================================================
//
// Spread resolution walks the operands of an array literal or argument list
// left to right. Each spread operand is flowed into a `ResolveSpread` carrying
// the elements resolved so far; once nothing is left the target is built.
// Tuples are expanded element-wise the first time a (site, position) is seen,
// widened to their element type the second time, and dropped after that, so
// self-referential spreads converge.

use std::sync::Arc;

use lang_ty::{ArrTy, Literal, PrimitiveTy, TupleTy, Ty, TyRef};

use crate::blame::{Blame, BlameFrame, SiteId};
use crate::constraints::{
    CallArg, CallTy, ElemAction, ResolvedElem, Selector, SpreadResolve, SpreadTarget, UseTy,
};
use crate::diagnostic::DiagnosticKind;
use crate::guard::ExpansionStep;
use crate::{CheckCtx, FlowResult};

impl CheckCtx {
    pub(super) fn flow_array(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        l: &ArrTy,
        u: &ArrTy,
        blame: &Blame,
    ) -> FlowResult {
        let elem_blame = blame.push(BlameFrame::ArrayElement);
        match (l, u) {
            (ArrTy::Array(a), ArrTy::Array(b)) => self.unify_inner(a, b, &elem_blame),
            (ArrTy::Array(a) | ArrTy::ReadOnly(a), ArrTy::ReadOnly(b)) => {
                self.flow_inner(a, &UseTy::Subtype(b.clone()), &elem_blame)
            }
            (ArrTy::Tuple(t), ArrTy::Array(b) | ArrTy::ReadOnly(b)) => {
                self.flow_inner(&t.general, &UseTy::Subtype(b.clone()), &elem_blame)
            }
            (ArrTy::Tuple(a), ArrTy::Tuple(b)) => self.flow_tuple(lower, upper, a, b, blame),
            _ => {
                self.report_incompatible(lower, &UseTy::Subtype(upper.clone()), blame);
                Ok(())
            }
        }
    }

    fn flow_tuple(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        l: &TupleTy,
        u: &TupleTy,
        blame: &Blame,
    ) -> FlowResult {
        let (lower_required, lower_total) = l.arity();
        let (upper_required, upper_total) = u.arity();
        if lower_total > upper_total || lower_required < upper_required {
            let kind = DiagnosticKind::ArityMismatch {
                expected: upper_total,
                found: lower_total,
            };
            self.report_use(kind, lower, &UseTy::Subtype(upper.clone()), blame);
            return Ok(());
        }
        for (index, (le, ue)) in l.elems.iter().zip(&u.elems).enumerate() {
            let elem_blame = blame.push(BlameFrame::TupleElement { index });
            if !le.polarity.compat(ue.polarity) {
                self.report_incompatible(&le.ty, &UseTy::Subtype(ue.ty.clone()), &elem_blame);
                continue;
            }
            self.flow_by_polarity(&le.ty, &ue.ty, ue.polarity, &elem_blame)?;
        }
        Ok(())
    }

    // ==========================================================================
    // Element access
    // ==========================================================================

    pub(super) fn get_elem(
        &mut self,
        lower: &TyRef,
        key: &TyRef,
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        if defers_on_key(key) {
            let on = UseTy::ElemOn {
                obj: lower.clone(),
                action: ElemAction::Read(tout.clone()),
            };
            return self.flow_inner(key, &on, blame);
        }
        let into_tout = UseTy::Subtype(tout.clone());
        match &**lower {
            Ty::Array(arr) => match &**arr {
                ArrTy::Tuple(tup) => match literal_index(key) {
                    Some(index) => {
                        let elem_blame = blame.push(BlameFrame::TupleElement { index });
                        match tup.elems.get(index) {
                            Some(elem) if elem.polarity.can_read() => {
                                let ty = if elem.optional {
                                    Ty::optional(elem.ty.clone())
                                } else {
                                    elem.ty.clone()
                                };
                                self.flow_inner(&ty, &into_tout, &elem_blame)
                            }
                            _ => self.incompatible(lower, upper, &elem_blame),
                        }
                    }
                    None => {
                        self.flow_inner(key, &UseTy::Subtype(Ty::number()), blame)?;
                        self.flow_inner(&tup.general, &into_tout, blame)
                    }
                },
                ArrTy::Array(elem) | ArrTy::ReadOnly(elem) => {
                    self.flow_inner(key, &UseTy::Subtype(Ty::number()), blame)?;
                    self.flow_inner(elem, &into_tout, &blame.push(BlameFrame::ArrayElement))
                }
            },
            Ty::Obj(obj) => match literal_key(key) {
                Some(name) => self.get_prop(lower, &name, tout, upper, blame),
                None => match &obj.dict {
                    Some(dict) if dict.polarity.can_read() => {
                        self.flow_inner(key, &UseTy::Subtype(dict.key.clone()), blame)?;
                        self.flow_inner(&dict.value, &into_tout, blame)
                    }
                    _ => self.incompatible(lower, upper, blame),
                },
            },
            Ty::Instance(_) | Ty::EnumObject(_) | Ty::Class(_) => match literal_key(key) {
                Some(name) => self.get_prop(lower, &name, tout, upper, blame),
                None => self.incompatible(lower, upper, blame),
            },
            Ty::Primitive(PrimitiveTy::String) | Ty::Literal(Literal::Str(_)) => {
                self.flow_inner(key, &UseTy::Subtype(Ty::number()), blame)?;
                self.flow_inner(&Ty::string(), &into_tout, blame)
            }
            _ => self.incompatible(lower, upper, blame),
        }
    }

    pub(super) fn set_elem(
        &mut self,
        lower: &TyRef,
        key: &TyRef,
        value: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        if defers_on_key(key) {
            let on = UseTy::ElemOn {
                obj: lower.clone(),
                action: ElemAction::Write(value.clone()),
            };
            return self.flow_inner(key, &on, blame);
        }
        match &**lower {
            Ty::Array(arr) => match &**arr {
                ArrTy::ReadOnly(_) => self.incompatible(lower, upper, blame),
                ArrTy::Array(elem) => {
                    self.flow_inner(key, &UseTy::Subtype(Ty::number()), blame)?;
                    let elem_blame = blame.push(BlameFrame::ArrayElement);
                    self.flow_inner(value, &UseTy::Subtype(elem.clone()), &elem_blame)
                }
                ArrTy::Tuple(tup) => {
                    let Some(index) = literal_index(key) else {
                        return self.incompatible(lower, upper, blame);
                    };
                    let elem_blame = blame.push(BlameFrame::TupleElement { index });
                    match tup.elems.get(index) {
                        Some(elem) if elem.polarity.can_write() => {
                            self.flow_inner(value, &UseTy::Subtype(elem.ty.clone()), &elem_blame)
                        }
                        _ => self.incompatible(lower, upper, &elem_blame),
                    }
                }
            },
            Ty::Obj(obj) => match literal_key(key) {
                Some(name) => self.set_prop(lower, &name, value, upper, blame),
                None => match &obj.dict {
                    Some(dict) if dict.polarity.can_write() => {
                        self.flow_inner(key, &UseTy::Subtype(dict.key.clone()), blame)?;
                        self.flow_inner(value, &UseTy::Subtype(dict.value.clone()), blame)
                    }
                    _ => self.incompatible(lower, upper, blame),
                },
            },
            Ty::Instance(_) => match literal_key(key) {
                Some(name) => self.set_prop(lower, &name, value, upper, blame),
                None => self.incompatible(lower, upper, blame),
            },
            _ => self.incompatible(lower, upper, blame),
        }
    }

    /// The key of a pending element access became known.
    pub(super) fn elem_on(
        &mut self,
        key: &TyRef,
        obj: &TyRef,
        action: &ElemAction,
        blame: &Blame,
    ) -> FlowResult {
        let access = match action {
            ElemAction::Read(tout) => UseTy::GetElem {
                key: key.clone(),
                tout: tout.clone(),
            },
            ElemAction::Write(value) => UseTy::SetElem {
                key: key.clone(),
                value: value.clone(),
            },
        };
        self.flow_inner(obj, &access, blame)
    }

    /// `[a, b, ...rest] = lower`: the elements from `index` on.
    pub(super) fn arr_rest(
        &mut self,
        lower: &TyRef,
        index: usize,
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let rest = match &**lower {
            Ty::Empty => Ty::empty(),
            Ty::Array(arr) => match &**arr {
                ArrTy::Tuple(tup) => {
                    let elems = tup.elems.iter().skip(index).cloned();
                    Ty::Array(Arc::new(ArrTy::Tuple(TupleTy::new(elems)))).into()
                }
                ArrTy::Array(elem) | ArrTy::ReadOnly(elem) => Ty::array(elem.clone()),
            },
            _ => return self.incompatible(lower, upper, blame),
        };
        self.flow_inner(&rest, &UseTy::Subtype(tout.clone()), blame)
    }

    pub(super) fn destructure(
        &mut self,
        lower: &TyRef,
        selector: &Selector,
        tout: &TyRef,
        blame: &Blame,
    ) -> FlowResult {
        let step = match selector {
            Selector::Prop(name) => UseTy::get_prop(name.clone(), tout.clone()),
            Selector::Elem(index) => UseTy::GetElem {
                key: Ty::lit(*index as f64),
                tout: tout.clone(),
            },
            Selector::ObjRest(excluded) => UseTy::ObjRest {
                excluded: excluded.clone(),
                tout: tout.clone(),
            },
            Selector::ArrRest(index) => UseTy::ArrRest {
                index: *index,
                tout: tout.clone(),
            },
            Selector::Default(default) => {
                let value = Ty::union([remove_void(lower), default.clone()]);
                return self.flow_inner(&value, &UseTy::Subtype(tout.clone()), blame);
            }
        };
        self.flow_inner(lower, &step, blame)
    }

    // ==========================================================================
    // Spread resolution
    // ==========================================================================

    /// `lower` is the spread operand currently being resolved.
    pub(super) fn resolve_spread(
        &mut self,
        lower: &TyRef,
        spread: &SpreadResolve,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let mut resolved = spread.resolved.clone();
        match &**lower {
            Ty::Array(arr) => match &**arr {
                ArrTy::Tuple(tup) => match self.expansion_visit(spread.site, resolved.len(), lower) {
                    ExpansionStep::Proceed if tup.elems.iter().all(|e| !e.optional) => {
                        resolved.extend(tup.elems.iter().map(|e| ResolvedElem::Elem(e.ty.clone())));
                    }
                    ExpansionStep::Proceed | ExpansionStep::Widen => {
                        resolved.push(ResolvedElem::Spread(tup.general.clone()));
                    }
                    ExpansionStep::Skip => return Ok(()),
                },
                ArrTy::Array(elem) | ArrTy::ReadOnly(elem) => {
                    resolved.push(ResolvedElem::Spread(elem.clone()));
                }
            },
            Ty::Any(_) | Ty::Empty => resolved.push(ResolvedElem::Spread(lower.clone())),
            _ => return self.incompatible(lower, upper, blame),
        }
        let next = SpreadResolve {
            resolved,
            ..spread.clone()
        };
        self.continue_spread(next, blame)
    }

    fn expansion_visit(&mut self, site: SiteId, position: usize, operand: &TyRef) -> ExpansionStep {
        self.stats.expansion_visits += 1;
        let origin = self.guard.origin(site, operand);
        self.guard.visit((site, position, origin))
    }

    /// Move plain operands into `resolved` until the next spread, which is
    /// flowed into a new `ResolveSpread`; with none left, build the target.
    pub(crate) fn continue_spread(&mut self, spread: SpreadResolve, blame: &Blame) -> FlowResult {
        let SpreadResolve {
            site,
            mut resolved,
            todo,
            target,
        } = spread;
        let mut todo = todo.into_iter();
        while let Some(arg) = todo.next() {
            match arg {
                CallArg::Arg(ty) => resolved.push(ResolvedElem::Elem(ty)),
                CallArg::Spread(operand) => {
                    let next = SpreadResolve {
                        site,
                        resolved,
                        todo: todo.collect(),
                        target,
                    };
                    return self.flow_inner(&operand, &UseTy::ResolveSpread(next), blame);
                }
            }
        }
        self.finish_spread(site, resolved, target, blame)
    }

    fn finish_spread(
        &mut self,
        site: SiteId,
        resolved: Vec<ResolvedElem>,
        target: SpreadTarget,
        blame: &Blame,
    ) -> FlowResult {
        match target {
            SpreadTarget::Array { tout } => {
                let all_known = resolved.iter().all(|r| matches!(r, ResolvedElem::Elem(_)));
                let tys = resolved.into_iter().map(|r| match r {
                    ResolvedElem::Elem(t) | ResolvedElem::Spread(t) => t,
                });
                let array = if all_known {
                    let tuple = Ty::tuple(tys);
                    self.guard.record_grown(site, &tuple);
                    tuple
                } else {
                    Ty::array(Ty::union(tys))
                };
                self.flow_inner(&array, &UseTy::Subtype(tout), blame)
            }
            SpreadTarget::Call { fun, call } => {
                let args = resolved
                    .into_iter()
                    .map(|r| match r {
                        ResolvedElem::Elem(t) => CallArg::Arg(t),
                        ResolvedElem::Spread(t) => CallArg::Spread(Ty::array(t)),
                    })
                    .collect();
                self.flow_inner(&fun, &UseTy::Call(CallTy { args, ..call }), blame)
            }
        }
    }
}

/// Keys whose value is not known yet; the access waits on the key.
fn defers_on_key(key: &Ty) -> bool {
    matches!(key, Ty::Var(_) | Ty::Union(_))
}

fn literal_index(key: &Ty) -> Option<usize> {
    match key {
        Ty::Literal(lit) => lit.as_index(),
        _ => None,
    }
}

fn literal_key(key: &Ty) -> Option<smol_str::SmolStr> {
    match key {
        Ty::Literal(lit) => lit.as_key(),
        _ => None,
    }
}

/// The value a defaulted binding sees when the default is not taken.
fn remove_void(ty: &TyRef) -> TyRef {
    match &**ty {
        Ty::Void => Ty::empty(),
        Ty::Optional(inner) => remove_void(inner),
        Ty::Maybe(inner) => Ty::union([remove_void(inner), Ty::null()]),
        Ty::Union(members) => Ty::union(members.iter().map(remove_void)),
        _ => ty.clone(),
    }
}
