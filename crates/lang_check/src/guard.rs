// ==============================================================================
// Guard & Memoization
// ==============================================================================
//
// Three independent mechanisms keep the fixpoint bounded:
//
// - a per-trace depth counter that aborts a path with `FlowAbort::RecursionLimit`
// - a pair cache of `(lower, upper, speculation)` triples already dispatched,
//   inserted into *before* a pair is processed so cycles terminate, and
//   removed again when the pair's trace aborts
// - the expansion guard, a visit counter per (site, position, origin) that
//   widens a request on its second visit and ignores it from the third on.
//   The origin tells tuples a site produced itself (a growing chain, which
//   shares one counter) from independent operands (one counter each).
//
// All of it lives in the per-unit context; nothing here is global.

use lang_ty::TyRef;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::blame::SiteId;
use crate::constraints::UseTy;
use crate::speculation::SpecId;
use crate::FlowAbort;

/// What the expansion guard allows on a given visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStep {
    /// First visit: proceed as requested.
    Proceed,
    /// Second visit: proceed with the widened request.
    Widen,
    /// Any later visit: do nothing.
    Skip,
}

/// Where an operand reaching an expansion site came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Produced by an earlier expansion at the same site. Such an operand is
    /// at least the chain's second visit, so its counter starts at one.
    Grown,
    /// Anything else, identified by the operand itself.
    Operand(TyRef),
}

pub type ExpansionKey = (SiteId, usize, Origin);

/// Visit counters plus the terms each site has produced. Saved and restored
/// as one unit by speculation.
#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    visits: FxHashMap<ExpansionKey, u32>,
    grown: FxHashSet<(SiteId, TyRef)>,
}

#[derive(Debug, Default)]
pub struct Guard {
    depth: u32,
    pair_cache: FxHashSet<(TyRef, UseTy, Option<SpecId>)>,
    expansion: ExpansionState,
    ticks: u64,
}

impl Guard {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Step one level deeper, aborting the trace past `limit`.
    pub fn enter(&mut self, limit: u32) -> Result<(), FlowAbort> {
        if self.depth >= limit {
            return Err(FlowAbort::RecursionLimit { limit });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn reset_depth(&mut self) {
        self.depth = 0;
    }

    /// Record `(lower, upper)` as processed under `spec`. Returns `false` when
    /// it already was.
    pub fn mark_pair(&mut self, lower: &TyRef, upper: &UseTy, spec: Option<SpecId>) -> bool {
        self.pair_cache
            .insert((lower.clone(), upper.clone(), spec))
    }

    /// Forget a pair whose dispatch was aborted before it completed.
    pub fn unmark_pair(&mut self, lower: &TyRef, upper: &UseTy, spec: Option<SpecId>) {
        self.pair_cache.remove(&(lower.clone(), upper.clone(), spec));
    }

    /// Forget every pair recorded under a speculation frame.
    pub fn drop_spec(&mut self, spec: SpecId) {
        let before = self.pair_cache.len();
        self.pair_cache.retain(|(_, _, s)| *s != Some(spec));
        debug!(
            "dropped {} cached pairs of {spec:?}",
            before - self.pair_cache.len()
        );
    }

    pub fn cached_pairs(&self) -> usize {
        self.pair_cache.len()
    }

    /// The origin of `operand` as seen from `site`.
    pub fn origin(&self, site: SiteId, operand: &TyRef) -> Origin {
        if self.expansion.grown.contains(&(site, operand.clone())) {
            Origin::Grown
        } else {
            Origin::Operand(operand.clone())
        }
    }

    /// Remember that `site` produced `term`.
    pub fn record_grown(&mut self, site: SiteId, term: &TyRef) {
        self.expansion.grown.insert((site, term.clone()));
    }

    /// Count a visit to `key` and report what the visit may do.
    pub fn visit(&mut self, key: ExpansionKey) -> ExpansionStep {
        let first = match key.2 {
            Origin::Grown => 1,
            Origin::Operand(_) => 0,
        };
        let count = self.expansion.visits.entry(key.clone()).or_insert(first);
        let step = match *count {
            0 => ExpansionStep::Proceed,
            1 => ExpansionStep::Widen,
            _ => ExpansionStep::Skip,
        };
        *count = count.saturating_add(1);
        if step != ExpansionStep::Proceed {
            debug!("expansion guard at {key:?}: {step:?}");
        }
        step
    }

    pub fn expansion_snapshot(&self) -> ExpansionState {
        self.expansion.clone()
    }

    pub fn restore_expansion(&mut self, saved: ExpansionState) {
        self.expansion = saved;
    }

    /// Count one decomposition. Returns `true` every `interval` ticks, when
    /// the cancellation flag should be polled.
    pub fn tick(&mut self, interval: u32) -> bool {
        self.ticks += 1;
        self.ticks % u64::from(interval.max(1)) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lang_ty::ty;

    #[test]
    fn depth_limit_aborts_without_counting() {
        let mut guard = Guard::default();
        guard.enter(2).unwrap();
        guard.enter(2).unwrap();
        assert!(matches!(
            guard.enter(2),
            Err(FlowAbort::RecursionLimit { limit: 2 })
        ));
        assert_eq!(guard.depth(), 2);
        guard.leave();
        guard.leave();
        assert_eq!(guard.depth(), 0);
    }

    #[test]
    fn pairs_are_scoped_by_speculation() {
        let mut guard = Guard::default();
        let upper = UseTy::Subtype(ty!(String));
        assert!(guard.mark_pair(&ty!(Number), &upper, None));
        assert!(!guard.mark_pair(&ty!(Number), &upper, None));
        assert!(guard.mark_pair(&ty!(Number), &upper, Some(SpecId(1))));
        guard.drop_spec(SpecId(1));
        assert!(guard.mark_pair(&ty!(Number), &upper, Some(SpecId(1))));
        assert_eq!(guard.cached_pairs(), 2);
    }

    #[test]
    fn expansion_policy_is_zero_one_two() {
        let mut guard = Guard::default();
        let key = (SiteId(4), 1, Origin::Operand(ty!(tuple [Number])));
        assert_eq!(guard.visit(key.clone()), ExpansionStep::Proceed);
        assert_eq!(guard.visit(key.clone()), ExpansionStep::Widen);
        assert_eq!(guard.visit(key.clone()), ExpansionStep::Skip);
        assert_eq!(guard.visit(key), ExpansionStep::Skip);

        let grown = (SiteId(4), 1, Origin::Grown);
        assert_eq!(guard.visit(grown.clone()), ExpansionStep::Widen);
        assert_eq!(guard.visit(grown), ExpansionStep::Skip);
    }

    #[test]
    fn independent_operands_count_separately() {
        let mut guard = Guard::default();
        let site = SiteId(3);
        for operand in [ty!(tuple [Number]), ty!(tuple [String]), ty!(tuple [Boolean])] {
            let origin = guard.origin(site, &operand);
            assert_eq!(origin, Origin::Operand(operand.clone()));
            assert_eq!(guard.visit((site, 0, origin)), ExpansionStep::Proceed);
        }

        let grown = ty!(tuple [(lit 1)]);
        guard.record_grown(site, &grown);
        assert_eq!(guard.origin(site, &grown), Origin::Grown);
        assert_eq!(guard.origin(SiteId(9), &grown), Origin::Operand(grown.clone()));
    }

    #[test]
    fn expansion_counters_restore() {
        let mut guard = Guard::default();
        let saved = guard.expansion_snapshot();
        let key = (SiteId(1), 0, Origin::Operand(ty!(Number)));
        guard.visit(key.clone());
        guard.record_grown(SiteId(1), &ty!(Number));
        guard.restore_expansion(saved);
        assert_eq!(guard.visit(key), ExpansionStep::Proceed);
        assert_eq!(
            guard.origin(SiteId(1), &ty!(Number)),
            Origin::Operand(ty!(Number))
        );
    }

    #[test]
    fn aborted_pairs_can_be_forgotten() {
        let mut guard = Guard::default();
        let upper = UseTy::Subtype(ty!(String));
        assert!(guard.mark_pair(&ty!(Number), &upper, None));
        guard.unmark_pair(&ty!(Number), &upper, None);
        assert!(guard.mark_pair(&ty!(Number), &upper, None));
    }

    #[test]
    fn ticks_poll_on_interval() {
        let mut guard = Guard::default();
        let polls = (0..10).filter(|_| guard.tick(4)).count();
        assert_eq!(polls, 2);
    }
}
