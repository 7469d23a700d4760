pub mod blame;
pub mod builtins;
pub mod config;
pub mod constraints;
pub mod diagnostic;
mod flow;
mod guard;
pub mod kit;
mod propagate;
mod speculation;
pub(crate) mod storage;
mod unify;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod pbt;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lang_ty::{ClassId, EnumId, EvalId, OpaqueId, PolyId, Ty, TyRef, TyVarId};
use log::warn;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

pub use blame::{Blame, BlameFrame, BlameOp, Reason, SiteId};
pub use builtins::{Builtins, ProtoOwner};
pub use config::{ConfigError, SolverConfig};
pub use constraints::{
    CallArg, CallTy, ConstraintKind, ElemAction, ResolvedElem, Selector, SpreadResolve,
    SpreadTarget, UseTy,
};
pub use diagnostic::{Diagnostic, DiagnosticKind, Sink};
pub use kit::{Kit, KitRef, ObjectSpreadKit};
pub use speculation::{SpecId, SpecOutcome};
pub use storage::{Bounds, VarState};

use guard::Guard;
use speculation::SpecFrame;
use storage::VarStore;

/// Non-local signal that unwinds the current trace. Ordinary
/// incompatibilities are never an `Err`; they are diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowAbort {
    #[error("recursion limit of {limit} exceeded")]
    RecursionLimit { limit: u32 },
    #[error("checking was cancelled")]
    Cancelled,
}

pub type FlowResult = Result<(), FlowAbort>;

/// Counters describing the work done by one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub dispatches: u64,
    pub cache_hits: u64,
    pub bounds_recorded: u64,
    pub unifications: u64,
    pub speculations: u64,
    pub failed_speculations: u64,
    pub instantiations: u64,
    pub evaluations: u64,
    pub expansion_visits: u64,
}

/// One check unit: the variable graph, its caches and guards, and the
/// diagnostics produced so far. Independent units never share a context.
#[derive(Debug)]
pub struct CheckCtx {
    config: SolverConfig,

    store: VarStore,

    guard: Guard,

    /// Open speculation frames, innermost last.
    frames: Vec<SpecFrame>,
    next_spec: u32,

    /// Top-level sink. Speculation frames carry their own.
    sink: Sink,

    builtins: Builtins,

    /// Result variable of each lazy projection, keyed by identity and target
    /// so a projection is evaluated at most once.
    eval_cache: FxHashMap<(EvalId, TyRef), TyRef>,

    /// Instantiations of polymorphic types per (poly, explicit targs, site).
    /// Implicit instantiation uses an empty argument list, so a recursive
    /// generic call at one site reuses the same fresh variables.
    inst_cache: FxHashMap<(PolyId, Vec<TyRef>, SiteId), TyRef>,

    cancel_flag: Option<Arc<AtomicBool>>,
    cancelled: bool,

    next_site: u32,
    next_eval: u32,
    next_poly: u32,
    next_class: u32,
    next_opaque: u32,
    next_enum: u32,

    stats: SolverStats,
}

impl Default for CheckCtx {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl CheckCtx {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            store: VarStore::new(),
            guard: Guard::default(),
            frames: Vec::new(),
            next_spec: 1,
            sink: Sink::default(),
            builtins: Builtins::default(),
            eval_cache: FxHashMap::default(),
            inst_cache: FxHashMap::default(),
            cancel_flag: None,
            cancelled: false,
            // Site 0 is reserved for internal blame.
            next_site: 1,
            next_eval: 0,
            next_poly: 0,
            next_class: 0,
            next_opaque: 0,
            next_enum: 0,
            stats: SolverStats::default(),
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn with_builtins(mut self, builtins: Builtins) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn builtins_mut(&mut self) -> &mut Builtins {
        &mut self.builtins
    }

    // ==========================================================================
    // Identities
    // ==========================================================================

    pub fn fresh_var(&mut self) -> TyVarId {
        self.store.new_var()
    }

    /// A fresh variable as a term.
    pub fn fresh_var_ty(&mut self) -> TyRef {
        Ty::var(self.store.new_var())
    }

    pub fn fresh_site(&mut self) -> SiteId {
        let id = SiteId(self.next_site);
        self.next_site += 1;
        id
    }

    pub fn fresh_eval_id(&mut self) -> EvalId {
        let id = EvalId(self.next_eval);
        self.next_eval += 1;
        id
    }

    pub fn fresh_poly_id(&mut self) -> PolyId {
        let id = PolyId(self.next_poly);
        self.next_poly += 1;
        id
    }

    pub fn fresh_class_id(&mut self) -> ClassId {
        let id = ClassId(self.next_class);
        self.next_class += 1;
        id
    }

    pub fn fresh_opaque_id(&mut self) -> OpaqueId {
        let id = OpaqueId(self.next_opaque);
        self.next_opaque += 1;
        id
    }

    pub fn fresh_enum_id(&mut self) -> EnumId {
        let id = EnumId(self.next_enum);
        self.next_enum += 1;
        id
    }

    // ==========================================================================
    // Driver operations
    // ==========================================================================

    /// Require `lower` to satisfy `upper`. Failures are appended to the active
    /// sink; this never stops the rest of the unit.
    pub fn flow(&mut self, lower: &TyRef, upper: &UseTy, blame: &Blame) {
        self.run_top(lower, upper.describe(), upper.kind(), blame, |cx| {
            cx.flow_inner(lower, upper, blame)
        });
    }

    /// Shorthand for `flow(lower, Subtype(upper))`.
    pub fn subtype(&mut self, lower: &TyRef, upper: &TyRef, blame: &Blame) {
        self.flow(lower, &UseTy::Subtype(upper.clone()), blame);
    }

    /// Require `a` and `b` to be equal.
    pub fn unify(&mut self, a: &TyRef, b: &TyRef, blame: &Blame) {
        self.run_top(a, b.to_string().into(), ConstraintKind::Unify, blame, |cx| {
            cx.unify_inner(a, b, blame)
        });
    }

    /// Give `var` its defining term.
    pub fn resolve(&mut self, var: TyVarId, term: &TyRef, blame: &Blame) {
        self.run_top(&Ty::var(var), term.to_string().into(), ConstraintKind::Unify, blame, |cx| {
            cx.resolve_inner(var, term, blame)
        });
    }

    pub fn add_lower_bound(&mut self, var: TyVarId, lower: &TyRef, blame: &Blame) {
        let upper = Ty::var(var);
        self.run_top(lower, upper.to_string().into(), ConstraintKind::Subtype, blame, |cx| {
            cx.add_lower_bound_inner(var, lower, blame)
        });
    }

    pub fn add_upper_bound(&mut self, var: TyVarId, upper: &UseTy, blame: &Blame) {
        self.run_top(&Ty::var(var), upper.describe(), upper.kind(), blame, |cx| {
            cx.add_upper_bound_inner(var, upper, blame)
        });
    }

    /// Record that `lower` flows into `upper`, both variables.
    pub fn link(&mut self, lower: TyVarId, upper: TyVarId, blame: &Blame) {
        let upper_ty = Ty::var(upper);
        self.run_top(
            &Ty::var(lower),
            upper_ty.to_string().into(),
            ConstraintKind::Subtype,
            blame,
            |cx| cx.link_inner(lower, upper, blame),
        );
    }

    /// Run `branch` as a speculative trial from the top level. A recursion
    /// abort inside the branch counts as a failure of the branch.
    pub fn speculate(&mut self, branch: impl FnOnce(&mut Self) -> FlowResult) -> SpecOutcome {
        let outcome = match self.speculate_inner(branch) {
            Ok(outcome) => outcome,
            Err(abort) => {
                let blame = Blame::internal();
                let what = SmolStr::from("speculation");
                self.report_abort(abort, what.clone(), what, ConstraintKind::Subtype, &blame);
                SpecOutcome::Failure(Vec::new())
            }
        };
        self.guard.reset_depth();
        outcome
    }

    /// Best-effort concrete answer for `var`: its term once resolved,
    /// otherwise the union of its lower bounds (`empty` when it has none).
    pub fn resolve_to_term(&self, var: TyVarId) -> TyRef {
        let root = self.store.root_of(var);
        match self.store.state(root) {
            VarState::Resolved(t) | VarState::FullyResolved(t) => t.clone(),
            VarState::Unresolved(bounds) => Ty::union(bounds.lower.keys().cloned()),
        }
    }

    pub fn lower_bounds(&self, var: TyVarId) -> Vec<TyRef> {
        let root = self.store.root_of(var);
        self.store
            .state(root)
            .bounds()
            .map(|b| b.lower.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn upper_bounds(&self, var: TyVarId) -> Vec<UseTy> {
        let root = self.store.root_of(var);
        self.store
            .state(root)
            .bounds()
            .map(|b| b.upper.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn var_state(&self, var: TyVarId) -> &VarState {
        self.store.state(self.store.root_of(var))
    }

    /// Whether two variables belong to the same equivalence class.
    pub fn same_class(&self, a: TyVarId, b: TyVarId) -> bool {
        self.store.root_of(a) == self.store.root_of(b)
    }

    pub fn var_count(&self) -> usize {
        self.store.len()
    }

    /// Close the unit: every Resolved variable becomes FullyResolved.
    pub fn finalize(&mut self) {
        self.store.finalize();
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.sink.as_slice()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.sink.take()
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    // ==========================================================================
    // Top-level catch
    // ==========================================================================

    fn run_top(
        &mut self,
        lower: &TyRef,
        upper: SmolStr,
        constraint: ConstraintKind,
        blame: &Blame,
        f: impl FnOnce(&mut Self) -> FlowResult,
    ) {
        if self.cancelled {
            return;
        }
        let result = match self.poll_cancel() {
            Ok(()) => f(self),
            Err(abort) => Err(abort),
        };
        if let Err(abort) = result {
            self.report_abort(abort, lower.to_string().into(), upper, constraint, blame);
        }
        self.guard.reset_depth();
    }

    fn report_abort(
        &mut self,
        abort: FlowAbort,
        lower: SmolStr,
        upper: SmolStr,
        constraint: ConstraintKind,
        blame: &Blame,
    ) {
        let kind = match abort {
            FlowAbort::RecursionLimit { limit } => {
                warn!("recursion limit of {limit} exceeded checking {lower} against {upper}");
                DiagnosticKind::RecursionLimitExceeded { limit }
            }
            FlowAbort::Cancelled => {
                if self.cancelled {
                    return;
                }
                warn!("checking cancelled");
                self.cancelled = true;
                DiagnosticKind::Cancelled
            }
        };
        self.active_sink().append(Diagnostic {
            kind,
            lower,
            upper,
            constraint,
            blame: blame.clone(),
        });
    }

    fn poll_cancel(&mut self) -> FlowResult {
        let raised = self
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));
        if raised {
            Err(FlowAbort::Cancelled)
        } else {
            Ok(())
        }
    }

    // ==========================================================================
    // Reporting
    // ==========================================================================

    fn active_sink(&mut self) -> &mut Sink {
        match self.frames.last_mut() {
            Some(frame) => &mut frame.sink,
            None => &mut self.sink,
        }
    }

    pub(crate) fn active_diagnostic_count(&self) -> usize {
        self.frames
            .last()
            .map_or(self.sink.len(), |frame| frame.sink.len())
    }

    pub(crate) fn active_spec(&self) -> Option<SpecId> {
        self.frames.last().map(|f| f.id)
    }

    pub(crate) fn report(
        &mut self,
        kind: DiagnosticKind,
        lower: &TyRef,
        upper: SmolStr,
        constraint: ConstraintKind,
        blame: &Blame,
    ) {
        log::debug!("{}: {lower} against {upper} ({blame})", kind.name());
        self.active_sink().append(Diagnostic {
            kind,
            lower: lower.to_string().into(),
            upper,
            constraint,
            blame: blame.clone(),
        });
    }

    /// Report `kind` for a failed use-constraint.
    pub(crate) fn report_use(
        &mut self,
        kind: DiagnosticKind,
        lower: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) {
        self.report(kind, lower, upper.describe(), upper.kind(), blame);
    }

    pub(crate) fn report_incompatible(&mut self, lower: &TyRef, upper: &UseTy, blame: &Blame) {
        self.report_use(DiagnosticKind::Incompatibility, lower, upper, blame);
    }

    /// Report a structural pair the solver leaves undispatched.
    pub fn report_unsupported(&mut self, lower: &TyRef, what: &str, blame: &Blame) {
        self.report(
            DiagnosticKind::UnsupportedConstruct { what: what.into() },
            lower,
            what.into(),
            ConstraintKind::Kit,
            blame,
        );
    }
}
