// ==============================================================================
// Unification: invariant positions
// ==============================================================================
//
// Two variables are merged by rank; the lower-ranked root is redirected to
// the other. When both are still open, the redirected root's bounds and links
// are replayed onto the surviving root, which cross-flows the two bound sets
// in both directions. Concrete pairs are unified structurally where there is
// a position-for-position rule and otherwise fall back to subtyping both
// ways.

use lang_ty::{ArrTy, Ty, TyRef, TyVarId};
use log::debug;

use crate::blame::{Blame, BlameFrame};
use crate::constraints::{ConstraintKind, UseTy};
use crate::diagnostic::DiagnosticKind;
use crate::storage::VarState;
use crate::{CheckCtx, FlowResult};

impl CheckCtx {
    /// Re-entrant form of [`CheckCtx::unify`] for kits and nested dispatch.
    pub fn unify_inner(&mut self, a: &TyRef, b: &TyRef, blame: &Blame) -> FlowResult {
        if a.ptr_eq(b) || a == b {
            return Ok(());
        }
        self.guard.enter(self.config.max_depth)?;
        let result = match (a.as_var(), b.as_var()) {
            (Some(x), Some(y)) => self.unify_vars(x, y, blame),
            (Some(x), None) => self.unify_var_term(x, b, blame),
            (None, Some(y)) => self.unify_var_term(y, a, blame),
            (None, None) => self.unify_terms(a, b, blame),
        };
        self.guard.leave();
        result
    }

    pub(crate) fn unify_vars(&mut self, x: TyVarId, y: TyVarId, blame: &Blame) -> FlowResult {
        let rx = self.store.find_root(x);
        let ry = self.store.find_root(y);
        if rx == ry {
            return Ok(());
        }
        self.stats.unifications += 1;

        let (rank_x, rank_y) = (self.store.rank(rx), self.store.rank(ry));
        let (root, child) = if rank_x < rank_y { (ry, rx) } else { (rx, ry) };
        let root_state = self.store.state(root).clone();
        let child_state = self.store.state(child).clone();

        self.store.redirect(child, root);
        if rank_x == rank_y {
            self.store.bump_rank(root);
        }
        debug!("unify {child:?} into {root:?}");

        match (root_state, child_state) {
            (VarState::Unresolved(_), VarState::Unresolved(child_bounds)) => {
                for (lower, b) in &child_bounds.lower {
                    self.add_lower_bound_inner(root, lower, b)?;
                }
                for (upper, b) in &child_bounds.upper {
                    self.add_upper_bound_inner(root, upper, b)?;
                }
                for (w, b) in &child_bounds.lowertvars {
                    self.link_inner(*w, root, b)?;
                }
                for (w, b) in &child_bounds.uppertvars {
                    self.link_inner(root, *w, b)?;
                }
                Ok(())
            }
            (VarState::Unresolved(root_bounds), VarState::Resolved(t) | VarState::FullyResolved(t)) => {
                self.store.set_state(root, VarState::Resolved(t.clone()));
                self.flush_bounds(root_bounds, &t)
            }
            (VarState::Resolved(t) | VarState::FullyResolved(t), VarState::Unresolved(child_bounds)) => {
                self.flush_bounds(child_bounds, &t)
            }
            (
                VarState::Resolved(t1) | VarState::FullyResolved(t1),
                VarState::Resolved(t2) | VarState::FullyResolved(t2),
            ) => self.unify_inner(&t1, &t2, blame),
        }
    }

    fn unify_var_term(&mut self, var: TyVarId, term: &TyRef, blame: &Blame) -> FlowResult {
        if term.is_any() {
            // `any` equates with nothing in particular; it flows both ways.
            let v = Ty::var(var);
            self.flow_inner(&v, &UseTy::Subtype(term.clone()), blame)?;
            return self.flow_inner(term, &UseTy::Subtype(v), blame);
        }
        self.resolve_inner(var, term, blame)
    }

    fn unify_terms(&mut self, a: &TyRef, b: &TyRef, blame: &Blame) -> FlowResult {
        match (&**a, &**b) {
            (Ty::Fun(f), Ty::Fun(g)) => {
                if f.params.len() != g.params.len() || f.rest.is_some() != g.rest.is_some() {
                    self.report_unify(
                        DiagnosticKind::ArityMismatch {
                            expected: f.params.len(),
                            found: g.params.len(),
                        },
                        a,
                        b,
                        blame,
                    );
                    return Ok(());
                }
                for (index, (p, q)) in f.params.iter().zip(&g.params).enumerate() {
                    self.unify_inner(&p.ty, &q.ty, &blame.push(BlameFrame::FunParam { index }))?;
                }
                if let (Some(p), Some(q)) = (&f.rest, &g.rest) {
                    self.unify_inner(&p.ty, &q.ty, &blame.push(BlameFrame::FunRest))?;
                }
                self.unify_inner(&f.this, &g.this, blame)?;
                self.unify_inner(&f.ret, &g.ret, &blame.push(BlameFrame::FunReturn))
            }

            (Ty::Obj(x), Ty::Obj(y)) => {
                for (name, p) in &x.props {
                    let frame = blame.push(BlameFrame::PropertyCompatibility { name: name.clone() });
                    match y.props.get(name) {
                        Some(q) if p.polarity == q.polarity => self.unify_inner(&p.ty, &q.ty, &frame)?,
                        Some(_) => self.report_unify(DiagnosticKind::Incompatibility, a, b, &frame),
                        None => self.report_unify(
                            DiagnosticKind::MissingProperty {
                                name: name.clone(),
                                suggestion: None,
                            },
                            b,
                            a,
                            &frame,
                        ),
                    }
                }
                for name in y.props.keys().filter(|n| !x.props.contains_key(*n)) {
                    let frame = blame.push(BlameFrame::PropertyCompatibility { name: name.clone() });
                    self.report_unify(
                        DiagnosticKind::MissingProperty {
                            name: name.clone(),
                            suggestion: None,
                        },
                        a,
                        b,
                        &frame,
                    );
                }
                match (&x.dict, &y.dict) {
                    (Some(d), Some(e)) => {
                        self.unify_inner(&d.key, &e.key, blame)?;
                        self.unify_inner(&d.value, &e.value, blame)
                    }
                    (None, None) => Ok(()),
                    _ => {
                        self.report_unify(DiagnosticKind::Incompatibility, a, b, blame);
                        Ok(())
                    }
                }
            }

            (Ty::Array(x), Ty::Array(y)) => match (&**x, &**y) {
                (ArrTy::Array(e1), ArrTy::Array(e2)) | (ArrTy::ReadOnly(e1), ArrTy::ReadOnly(e2)) => {
                    self.unify_inner(e1, e2, &blame.push(BlameFrame::ArrayElement))
                }
                (ArrTy::Tuple(t1), ArrTy::Tuple(t2)) => {
                    if t1.elems.len() != t2.elems.len() {
                        self.report_unify(
                            DiagnosticKind::ArityMismatch {
                                expected: t1.elems.len(),
                                found: t2.elems.len(),
                            },
                            a,
                            b,
                            blame,
                        );
                        return Ok(());
                    }
                    for (index, (e1, e2)) in t1.elems.iter().zip(&t2.elems).enumerate() {
                        self.unify_inner(
                            &e1.ty,
                            &e2.ty,
                            &blame.push(BlameFrame::TupleElement { index }),
                        )?;
                    }
                    Ok(())
                }
                _ => self.unify_by_flow(a, b, blame),
            },

            (Ty::TypeApp(x), Ty::TypeApp(y))
                if x.ctor == y.ctor && x.targs.len() == y.targs.len() =>
            {
                for (index, (s, t)) in x.targs.iter().zip(&y.targs).enumerate() {
                    let name = type_param_name(&x.ctor, index);
                    self.unify_inner(s, t, &blame.push(BlameFrame::TypeArg { name }))?;
                }
                Ok(())
            }

            (Ty::Instance(x), Ty::Instance(y))
                if x.class_id == y.class_id && x.targs.len() == y.targs.len() =>
            {
                for (s, t) in x.targs.iter().zip(&y.targs) {
                    let frame = blame.push(BlameFrame::TypeArg {
                        name: s.name.clone(),
                    });
                    self.unify_inner(&s.ty, &t.ty, &frame)?;
                }
                Ok(())
            }

            (Ty::Maybe(x), Ty::Maybe(y))
            | (Ty::Optional(x), Ty::Optional(y))
            | (Ty::Class(x), Ty::Class(y)) => self.unify_inner(x, y, blame),

            _ => self.unify_by_flow(a, b, blame),
        }
    }

    /// Fallback for pairs without a structural rule. The reverse direction
    /// is only checked when the forward one held, so a mismatch is reported
    /// once.
    fn unify_by_flow(&mut self, a: &TyRef, b: &TyRef, blame: &Blame) -> FlowResult {
        let before = self.active_diagnostic_count();
        self.flow_inner(a, &UseTy::Subtype(b.clone()), blame)?;
        if self.active_diagnostic_count() == before {
            self.flow_inner(b, &UseTy::Subtype(a.clone()), blame)?;
        }
        Ok(())
    }

    fn report_unify(&mut self, kind: DiagnosticKind, a: &TyRef, b: &TyRef, blame: &Blame) {
        self.report(kind, a, b.to_string().into(), ConstraintKind::Unify, blame);
    }
}

fn type_param_name(ctor: &Ty, index: usize) -> smol_str::SmolStr {
    match ctor {
        Ty::Poly(poly) => poly
            .tparams
            .get(index)
            .map(|tp| tp.name.clone())
            .unwrap_or_else(|| index.to_string().into()),
        _ => index.to_string().into(),
    }
}
