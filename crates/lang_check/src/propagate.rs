// ==============================================================================
// Propagation: bound writes and their consequences
// ==============================================================================
//
// Bound sets are kept transitively closed: when `W` is linked below `V`, `V`'s
// lower bounds already include `W`'s, and `W`'s link set already includes
// every variable above `V`. Writing a bound therefore only ever needs one hop
// over the link sets. This layer never judges compatibility; it only
// schedules `flow` calls for the dispatcher.

use lang_ty::{TyRef, TyVarId};
use log::debug;

use crate::blame::Blame;
use crate::constraints::UseTy;
use crate::storage::{Bounds, VarState};
use crate::{CheckCtx, FlowResult};

impl CheckCtx {
    fn term_of(&mut self, var: TyVarId) -> (TyVarId, Option<TyRef>) {
        let root = self.store.find_root(var);
        (root, self.store.state(root).term().cloned())
    }

    /// `lower <: var`.
    pub(crate) fn add_lower_bound_inner(
        &mut self,
        var: TyVarId,
        lower: &TyRef,
        blame: &Blame,
    ) -> FlowResult {
        if let Some(w) = lower.as_var() {
            return self.link_inner(w, var, blame);
        }
        let (root, term) = self.term_of(var);
        if let Some(term) = term {
            return self.flow_inner(lower, &UseTy::Subtype(term), blame);
        }
        let mut targets = vec![root];
        if let Some(bounds) = self.store.state(root).bounds() {
            targets.extend(bounds.uppertvars.keys().copied());
        }
        for target in targets {
            self.add_lower_to(target, lower, blame)?;
        }
        Ok(())
    }

    /// `var <: upper`.
    pub(crate) fn add_upper_bound_inner(
        &mut self,
        var: TyVarId,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        if let UseTy::Subtype(t) = upper {
            if let Some(w) = t.as_var() {
                return self.link_inner(var, w, blame);
            }
        }
        let (root, term) = self.term_of(var);
        if let Some(term) = term {
            return self.flow_inner(&term, upper, blame);
        }
        let mut targets = vec![root];
        if let Some(bounds) = self.store.state(root).bounds() {
            targets.extend(bounds.lowertvars.keys().copied());
        }
        for target in targets {
            self.add_upper_to(target, upper, blame)?;
        }
        Ok(())
    }

    /// Record one lower bound on one variable and check it against the
    /// variable's existing upper constraints.
    fn add_lower_to(&mut self, target: TyVarId, lower: &TyRef, blame: &Blame) -> FlowResult {
        let (root, term) = self.term_of(target);
        if let Some(term) = term {
            return self.flow_inner(lower, &UseTy::Subtype(term), blame);
        }
        if !self.store.add_lower(root, lower.clone(), blame) {
            return Ok(());
        }
        self.stats.bounds_recorded += 1;
        debug!("{lower} <: {root:?}");
        let uppers: Vec<UseTy> = self
            .store
            .state(root)
            .bounds()
            .map(|b| b.upper.keys().cloned().collect())
            .unwrap_or_default();
        for upper in &uppers {
            self.flow_inner(lower, upper, blame)?;
        }
        Ok(())
    }

    fn add_upper_to(&mut self, target: TyVarId, upper: &UseTy, blame: &Blame) -> FlowResult {
        let (root, term) = self.term_of(target);
        if let Some(term) = term {
            return self.flow_inner(&term, upper, blame);
        }
        if !self.store.add_upper(root, upper.clone(), blame) {
            return Ok(());
        }
        self.stats.bounds_recorded += 1;
        debug!("{root:?} <: {upper:?}");
        let lowers: Vec<(TyRef, Blame)> = self
            .store
            .state(root)
            .bounds()
            .map(|b| b.lower.iter().map(|(t, b)| (t.clone(), b.clone())).collect())
            .unwrap_or_default();
        for (lower, lower_blame) in &lowers {
            self.flow_inner(lower, upper, lower_blame)?;
        }
        Ok(())
    }

    /// `lower <: upper` between two variables.
    pub(crate) fn link_inner(&mut self, lower: TyVarId, upper: TyVarId, blame: &Blame) -> FlowResult {
        let (r1, t1) = self.term_of(lower);
        let (r2, t2) = self.term_of(upper);
        if r1 == r2 {
            return Ok(());
        }
        match (t1, t2) {
            (Some(t1), Some(t2)) => return self.flow_inner(&t1, &UseTy::Subtype(t2), blame),
            (Some(t1), None) => return self.add_lower_bound_inner(r2, &t1, blame),
            (None, Some(t2)) => return self.add_upper_bound_inner(r1, &UseTy::Subtype(t2), blame),
            (None, None) => {}
        }

        let (lows, lowers) = match self.store.state(r1) {
            VarState::Unresolved(b) => (
                with_links(r1, b.lowertvars.keys()),
                b.lower.iter().map(|(t, b)| (t.clone(), b.clone())).collect::<Vec<_>>(),
            ),
            _ => (vec![r1], Vec::new()),
        };
        let (ups, uppers) = match self.store.state(r2) {
            VarState::Unresolved(b) => (
                with_links(r2, b.uppertvars.keys()),
                b.upper.iter().map(|(u, b)| (u.clone(), b.clone())).collect::<Vec<_>>(),
            ),
            _ => (vec![r2], Vec::new()),
        };

        let mut added = false;
        for &low in &lows {
            for &up in &ups {
                let low = self.store.find_root(low);
                let up = self.store.find_root(up);
                if low == up {
                    continue;
                }
                let low_open = self.store.state(low).bounds().is_some();
                let up_open = self.store.state(up).bounds().is_some();
                if low_open && up_open {
                    if self.store.add_uppertvar(low, up, blame) {
                        self.store.add_lowertvar(up, low, blame);
                        added = true;
                    }
                } else {
                    // Resolved mid-walk: fall back to concrete flows.
                    self.link_inner(low, up, blame)?;
                }
            }
        }
        if !added {
            return Ok(());
        }
        debug!("link {r1:?} <: {r2:?}");

        for &up in &ups {
            for (l, lower_blame) in &lowers {
                self.add_lower_to(up, l, lower_blame)?;
            }
        }
        for &low in &lows {
            for (u, upper_blame) in &uppers {
                self.add_upper_to(low, u, upper_blame)?;
            }
        }
        Ok(())
    }

    /// Give `var` its defining term, or equate it with the one it has.
    pub(crate) fn resolve_inner(&mut self, var: TyVarId, term: &TyRef, blame: &Blame) -> FlowResult {
        if let Some(w) = term.as_var() {
            return self.unify_vars(var, w, blame);
        }
        let root = self.store.find_root(var);
        match self.store.state(root).clone() {
            VarState::Unresolved(bounds) => {
                debug!("resolve {root:?} := {term}");
                self.store.set_state(root, VarState::Resolved(term.clone()));
                self.flush_bounds(bounds, term)
            }
            VarState::Resolved(old) | VarState::FullyResolved(old) => {
                self.unify_inner(&old, term, blame)
            }
        }
    }

    /// Check bounds recorded while a variable was open against its term.
    pub(crate) fn flush_bounds(&mut self, bounds: Bounds, term: &TyRef) -> FlowResult {
        for (lower, blame) in &bounds.lower {
            self.flow_inner(lower, &UseTy::Subtype(term.clone()), blame)?;
        }
        for (upper, blame) in &bounds.upper {
            self.flow_inner(term, upper, blame)?;
        }
        for (w, blame) in &bounds.lowertvars {
            self.add_upper_bound_inner(*w, &UseTy::Subtype(term.clone()), blame)?;
        }
        for (w, blame) in &bounds.uppertvars {
            self.add_lower_bound_inner(*w, term, blame)?;
        }
        Ok(())
    }
}

fn with_links<'a>(root: TyVarId, links: impl Iterator<Item = &'a TyVarId>) -> Vec<TyVarId> {
    std::iter::once(root).chain(links.copied()).collect()
}
