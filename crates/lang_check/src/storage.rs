// ==============================================================================
// Variable Store: union-find over type variables
// ==============================================================================
//
// Arena-indexed nodes (index = `TyVarId`). A node is either a root carrying
// the variable's state, or a `Goto` redirect left behind by unification. Only
// roots are ever read for state; callers go through `find_root` first.
//
// Every mutation made while a snapshot is open is recorded in an undo log so
// that a failed speculation can be rolled back exactly. Bound sets are
// insertion-ordered and new keys always land at the end, which makes "pop the
// last entry" the precise inverse of a fresh insertion.

use indexmap::IndexMap;
use lang_ty::{TyRef, TyVarId};
use log::debug;

use crate::blame::Blame;
use crate::constraints::UseTy;

/// Bounds recorded on an unresolved variable. The first blame recorded for a
/// bound is kept.
#[derive(Debug, Clone, Default)]
pub struct Bounds {
    pub lower: IndexMap<TyRef, Blame>,
    pub upper: IndexMap<UseTy, Blame>,
    /// Variables known to flow into this one.
    pub lowertvars: IndexMap<TyVarId, Blame>,
    /// Variables this one is known to flow into.
    pub uppertvars: IndexMap<TyVarId, Blame>,
}

#[derive(Debug, Clone)]
pub enum VarState {
    Unresolved(Bounds),
    Resolved(TyRef),
    /// No further mutation is possible.
    FullyResolved(TyRef),
}

impl VarState {
    pub fn term(&self) -> Option<&TyRef> {
        match self {
            VarState::Unresolved(_) => None,
            VarState::Resolved(t) | VarState::FullyResolved(t) => Some(t),
        }
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        match self {
            VarState::Unresolved(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    Goto(TyVarId),
}

#[derive(Debug, Clone)]
struct VarNode {
    rank: u32,
    parent: Parent,
    state: VarState,
}

#[derive(Debug)]
enum UndoEntry {
    Push,
    SetParent(TyVarId, Parent),
    SetRank(TyVarId, u32),
    SetState(TyVarId, VarState),
    PopLower(TyVarId),
    PopUpper(TyVarId),
    PopLowerTvar(TyVarId),
    PopUpperTvar(TyVarId),
}

/// Marks a point the store can be rolled back to.
#[derive(Debug)]
#[must_use]
pub struct Snapshot {
    undo_len: usize,
}

#[derive(Debug, Default)]
pub struct VarStore {
    nodes: Vec<VarNode>,
    undo: Vec<UndoEntry>,
    open_snapshots: usize,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn log(&mut self, entry: UndoEntry) {
        if self.open_snapshots > 0 {
            self.undo.push(entry);
        }
    }

    /// Fresh Unresolved variable with empty bounds and rank 0.
    pub fn new_var(&mut self) -> TyVarId {
        let id = TyVarId::from(self.nodes.len());
        self.nodes.push(VarNode {
            rank: 0,
            parent: Parent::Root,
            state: VarState::Unresolved(Bounds::default()),
        });
        self.log(UndoEntry::Push);
        id
    }

    fn node(&self, id: TyVarId) -> &VarNode {
        &self.nodes[usize::from(id)]
    }

    fn node_mut(&mut self, id: TyVarId) -> &mut VarNode {
        &mut self.nodes[usize::from(id)]
    }

    /// Union-find lookup with path compression.
    pub fn find_root(&mut self, id: TyVarId) -> TyVarId {
        let mut root = id;
        while let Parent::Goto(next) = self.node(root).parent {
            root = next;
        }

        let mut cur = id;
        while let Parent::Goto(next) = self.node(cur).parent {
            if next != root {
                self.log(UndoEntry::SetParent(cur, Parent::Goto(next)));
                self.node_mut(cur).parent = Parent::Goto(root);
            }
            cur = next;
        }
        root
    }

    /// Root lookup without compression, for read-only queries.
    pub fn root_of(&self, id: TyVarId) -> TyVarId {
        let mut root = id;
        while let Parent::Goto(next) = self.node(root).parent {
            root = next;
        }
        root
    }

    pub fn is_root(&self, id: TyVarId) -> bool {
        self.node(id).parent == Parent::Root
    }

    pub fn rank(&self, root: TyVarId) -> u32 {
        self.node(root).rank
    }

    /// State of a root node.
    pub fn state(&self, root: TyVarId) -> &VarState {
        debug_assert!(self.is_root(root), "state read through a redirect");
        &self.node(root).state
    }

    pub fn set_state(&mut self, root: TyVarId, state: VarState) {
        let old = std::mem::replace(&mut self.node_mut(root).state, state);
        self.log(UndoEntry::SetState(root, old));
    }

    /// Point `child` at `root`. Both must currently be roots.
    pub fn redirect(&mut self, child: TyVarId, root: TyVarId) {
        debug!("redirect {child:?} -> {root:?}");
        let old = std::mem::replace(&mut self.node_mut(child).parent, Parent::Goto(root));
        self.log(UndoEntry::SetParent(child, old));
    }

    pub fn bump_rank(&mut self, root: TyVarId) {
        let old = self.node(root).rank;
        self.node_mut(root).rank = old + 1;
        self.log(UndoEntry::SetRank(root, old));
    }

    fn bounds_mut(&mut self, root: TyVarId) -> Option<&mut Bounds> {
        match &mut self.node_mut(root).state {
            VarState::Unresolved(b) => Some(b),
            _ => None,
        }
    }

    /// Record a lower bound. Returns whether it was new.
    pub fn add_lower(&mut self, root: TyVarId, ty: TyRef, blame: &Blame) -> bool {
        let Some(bounds) = self.bounds_mut(root) else {
            return false;
        };
        if bounds.lower.contains_key(&ty) {
            return false;
        }
        bounds.lower.insert(ty, blame.clone());
        self.log(UndoEntry::PopLower(root));
        true
    }

    /// Record an upper constraint. Returns whether it was new.
    pub fn add_upper(&mut self, root: TyVarId, u: UseTy, blame: &Blame) -> bool {
        let Some(bounds) = self.bounds_mut(root) else {
            return false;
        };
        if bounds.upper.contains_key(&u) {
            return false;
        }
        bounds.upper.insert(u, blame.clone());
        self.log(UndoEntry::PopUpper(root));
        true
    }

    pub fn add_lowertvar(&mut self, root: TyVarId, var: TyVarId, blame: &Blame) -> bool {
        let Some(bounds) = self.bounds_mut(root) else {
            return false;
        };
        if bounds.lowertvars.contains_key(&var) {
            return false;
        }
        bounds.lowertvars.insert(var, blame.clone());
        self.log(UndoEntry::PopLowerTvar(root));
        true
    }

    pub fn add_uppertvar(&mut self, root: TyVarId, var: TyVarId, blame: &Blame) -> bool {
        let Some(bounds) = self.bounds_mut(root) else {
            return false;
        };
        if bounds.uppertvars.contains_key(&var) {
            return false;
        }
        bounds.uppertvars.insert(var, blame.clone());
        self.log(UndoEntry::PopUpperTvar(root));
        true
    }

    /// Every current root, in creation order.
    pub fn roots(&self) -> Vec<TyVarId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent == Parent::Root)
            .map(|(i, _)| TyVarId::from(i))
            .collect()
    }

    // ==========================================================================
    // Snapshots
    // ==========================================================================

    pub fn snapshot(&mut self) -> Snapshot {
        self.open_snapshots += 1;
        Snapshot {
            undo_len: self.undo.len(),
        }
    }

    /// Undo every mutation made since `snapshot` was taken.
    pub fn rollback_to(&mut self, snapshot: Snapshot) {
        debug!(
            "rollback of {} store mutations",
            self.undo.len() - snapshot.undo_len
        );
        while self.undo.len() > snapshot.undo_len {
            let Some(entry) = self.undo.pop() else {
                break;
            };
            match entry {
                UndoEntry::Push => {
                    self.nodes.pop();
                }
                UndoEntry::SetParent(id, parent) => self.node_mut(id).parent = parent,
                UndoEntry::SetRank(id, rank) => self.node_mut(id).rank = rank,
                UndoEntry::SetState(id, state) => self.node_mut(id).state = state,
                UndoEntry::PopLower(id) => {
                    self.bounds_mut(id).and_then(|b| b.lower.pop());
                }
                UndoEntry::PopUpper(id) => {
                    self.bounds_mut(id).and_then(|b| b.upper.pop());
                }
                UndoEntry::PopLowerTvar(id) => {
                    self.bounds_mut(id).and_then(|b| b.lowertvars.pop());
                }
                UndoEntry::PopUpperTvar(id) => {
                    self.bounds_mut(id).and_then(|b| b.uppertvars.pop());
                }
            }
        }
        self.open_snapshots -= 1;
    }

    /// Keep every mutation made since `snapshot`. The log is only discarded
    /// once no snapshot remains open, since an enclosing one may still roll
    /// back past this point.
    pub fn commit(&mut self, snapshot: Snapshot) {
        debug_assert!(self.undo.len() >= snapshot.undo_len);
        self.open_snapshots -= 1;
        if self.open_snapshots == 0 {
            self.undo.clear();
        }
    }

    /// Move every Resolved root to FullyResolved.
    pub fn finalize(&mut self) {
        for root in self.roots() {
            if let VarState::Resolved(t) = self.state(root) {
                let t = t.clone();
                self.set_state(root, VarState::FullyResolved(t));
            }
        }
    }
}
