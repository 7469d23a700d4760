// ==============================================================================
// Speculative Matching
// ==============================================================================
//
// A speculation runs a candidate derivation with an isolated diagnostic sink
// and a snapshot of everything it may mutate: the variable store (undo log),
// the evaluation and instantiation caches, and the expansion-guard counters.
// A candidate that emits nothing is committed; otherwise the snapshot is
// restored and its diagnostics are handed back to the caller. Pair-cache
// entries made under the frame's id are dropped either way.

use derive_more::Debug;
use lang_ty::{may_overlap, EvalId, PolyId, Ty, TyRef};
use log::debug;
use rustc_hash::FxHashMap;

use crate::blame::{Blame, BlameFrame, SiteId};
use crate::constraints::UseTy;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Sink};
use crate::guard::ExpansionState;
use crate::{CheckCtx, FlowAbort, FlowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("spec{_0}")]
pub struct SpecId(pub u32);

#[derive(Debug)]
pub(crate) struct SpecFrame {
    pub(crate) id: SpecId,
    pub(crate) sink: Sink,
    eval_cache: FxHashMap<(EvalId, TyRef), TyRef>,
    inst_cache: FxHashMap<(PolyId, Vec<TyRef>, SiteId), TyRef>,
    expansion: ExpansionState,
}

#[derive(Debug, Clone)]
pub enum SpecOutcome {
    Success,
    /// The candidate's diagnostics, never shown unless the caller surfaces
    /// them.
    Failure(Vec<Diagnostic>),
}

impl SpecOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SpecOutcome::Success)
    }
}

impl CheckCtx {
    pub(crate) fn speculate_inner(
        &mut self,
        branch: impl FnOnce(&mut Self) -> FlowResult,
    ) -> Result<SpecOutcome, FlowAbort> {
        let id = SpecId(self.next_spec);
        self.next_spec += 1;
        self.stats.speculations += 1;

        let snapshot = self.store.snapshot();
        self.frames.push(SpecFrame {
            id,
            sink: Sink::default(),
            eval_cache: self.eval_cache.clone(),
            inst_cache: self.inst_cache.clone(),
            expansion: self.guard.expansion_snapshot(),
        });
        debug!("push {id:?} (nesting {})", self.frames.len());

        let result = branch(self);

        let frame = match self.frames.pop() {
            Some(frame) if frame.id == id => frame,
            _ => unreachable!("speculation frames popped out of order"),
        };
        self.guard.drop_spec(id);

        let failure = match result {
            Ok(()) if frame.sink.is_empty() => {
                debug!("pop {id:?}: success");
                self.store.commit(snapshot);
                return Ok(SpecOutcome::Success);
            }
            Ok(()) => None,
            Err(abort) => Some(abort),
        };

        debug!("pop {id:?}: rollback");
        self.store.rollback_to(snapshot);
        self.eval_cache = frame.eval_cache;
        self.inst_cache = frame.inst_cache;
        self.guard.restore_expansion(frame.expansion);

        match failure {
            Some(abort) => Err(abort),
            None => {
                self.stats.failed_speculations += 1;
                Ok(SpecOutcome::Failure(frame.sink.into_vec()))
            }
        }
    }

    /// `lower <: A | B | ...` for a non-union `lower`. Members that cannot
    /// possibly match are skipped; the rest are tried in order and the first
    /// success is committed. When every candidate fails, the first is re-run
    /// for real so the surfaced diagnostic is specific.
    pub(crate) fn try_union_members(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        members: &[TyRef],
        blame: &Blame,
    ) -> FlowResult {
        if members.iter().any(|m| m == lower) {
            return Ok(());
        }

        let candidates: Vec<(usize, &TyRef)> = members
            .iter()
            .enumerate()
            .filter(|(_, m)| !self.config.union_prefilter || may_overlap(lower, m))
            .collect();

        let Some(&(first_index, first)) = candidates.first() else {
            self.report_incompatible(lower, &UseTy::Subtype(upper.clone()), blame);
            return Ok(());
        };

        if candidates.len() > 1 {
            for &(index, member) in &candidates {
                let member_blame = blame.push(BlameFrame::UnionMember { index });
                let outcome = self.speculate_inner(|cx| {
                    cx.flow_inner(lower, &UseTy::Subtype(member.clone()), &member_blame)
                })?;
                if outcome.is_success() {
                    return Ok(());
                }
            }
        }

        let first_blame = blame.push(BlameFrame::UnionMember { index: first_index });
        self.flow_inner(lower, &UseTy::Subtype(first.clone()), &first_blame)
    }

    /// An intersection on the lower side of anything but an overloaded call:
    /// the first member that satisfies `upper` wins.
    pub(crate) fn try_inter_members(
        &mut self,
        lower: &TyRef,
        members: &[TyRef],
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        // A member that declares the property being read answers the read.
        let prop = match upper {
            UseTy::GetProp { prop, .. } => Some(prop),
            UseTy::MethodCall { name, .. } => Some(name),
            _ => None,
        };
        if let Some(name) = prop {
            if let Some(member) = members.iter().find(|m| declares_prop(m, name)) {
                return self.flow_inner(member, upper, blame);
            }
        }

        for member in members {
            let outcome = self.speculate_inner(|cx| cx.flow_inner(member, upper, blame))?;
            if outcome.is_success() {
                return Ok(());
            }
        }

        match members.first() {
            Some(first) => self.flow_inner(first, upper, blame),
            None => {
                self.report_incompatible(lower, upper, blame);
                Ok(())
            }
        }
    }

    /// Calls against an overload set. Every branch failing yields a single
    /// diagnostic naming the whole set, with each branch's failures attached.
    pub(crate) fn try_overloads(
        &mut self,
        lower: &TyRef,
        members: &[TyRef],
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let mut branches = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            let branch_blame = blame.push(BlameFrame::Overload { index });
            match self.speculate_inner(|cx| cx.flow_inner(member, upper, &branch_blame))? {
                SpecOutcome::Success => return Ok(()),
                SpecOutcome::Failure(diagnostics) => branches.push(diagnostics),
            }
        }
        self.report_use(
            DiagnosticKind::SpeculationExhausted { branches },
            lower,
            upper,
            blame,
        );
        Ok(())
    }
}

fn declares_prop(ty: &Ty, name: &str) -> bool {
    match ty {
        Ty::Obj(obj) => obj.props.contains_key(name),
        Ty::Instance(inst) => inst.get(name).is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::BlameOp;
    use crate::SolverConfig;
    use lang_ty::ty;

    fn blame() -> Blame {
        Blame::new(BlameOp::Assignment, SiteId(1))
    }

    #[test]
    fn failed_speculation_rolls_back_bounds() {
        let mut cx = CheckCtx::new(SolverConfig::default());
        let v = cx.fresh_var();
        let outcome = cx
            .speculate_inner(|cx| {
                cx.flow_inner(&ty!(Number), &UseTy::Subtype(Ty::var(v)), &blame())?;
                cx.flow_inner(&ty!(Number), &UseTy::Subtype(ty!(String)), &blame())
            })
            .unwrap();
        assert!(matches!(outcome, SpecOutcome::Failure(ref d) if d.len() == 1));
        assert!(cx.lower_bounds(v).is_empty());
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn successful_speculation_commits() {
        let mut cx = CheckCtx::default();
        let v = cx.fresh_var();
        let outcome = cx
            .speculate_inner(|cx| cx.flow_inner(&ty!(Number), &UseTy::Subtype(Ty::var(v)), &blame()))
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(cx.lower_bounds(v), vec![ty!(Number)]);
    }

    #[test]
    fn vars_created_in_failed_branch_disappear() {
        let mut cx = CheckCtx::default();
        cx.fresh_var();
        let _ = cx
            .speculate_inner(|cx| {
                cx.fresh_var();
                cx.flow_inner(&ty!(Null), &UseTy::Subtype(ty!(Number)), &blame())
            })
            .unwrap();
        assert_eq!(cx.var_count(), 1);
    }

    #[test]
    fn union_prefers_first_matching_member() {
        let mut cx = CheckCtx::default();
        let v = cx.fresh_var();
        let upper = Ty::union([ty!(String), Ty::var(v)]);
        cx.subtype(&ty!(Number), &upper, &blame());
        assert!(cx.diagnostics().is_empty());
        assert_eq!(cx.lower_bounds(v), vec![ty!(Number)]);
    }

    #[test]
    fn union_with_no_candidate_reports_once() {
        let mut cx = CheckCtx::default();
        cx.subtype(&ty!(Null), &ty!(union [Number, String]), &blame());
        let diags = cx.diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::Incompatibility));
    }

    #[test]
    fn exhausted_union_reruns_first_candidate() {
        let mut cx = CheckCtx::default();
        let upper = ty!(union [{ "a": Number }, { "a": String }]);
        cx.subtype(&ty!({ "a": Boolean }), &upper, &blame());
        let diags = cx.diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(diags[0]
            .blame
            .frames()
            .contains(&BlameFrame::UnionMember { index: 0 }));
    }
}
