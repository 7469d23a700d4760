use rustc_hash::FxHashSet;

use crate::{Ty, TyRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Joiner {
    Union,
    Inter,
}

/// Flatten nested joins of the same kind, drop duplicates (keeping first
/// occurrence order) and drop the join's identity element.
pub(crate) fn normalize(members: impl IntoIterator<Item = TyRef>, joiner: Joiner) -> TyRef {
    let mut seen: FxHashSet<TyRef> = FxHashSet::default();
    let mut out: Vec<TyRef> = Vec::new();

    let mut push = |m: TyRef, out: &mut Vec<TyRef>| {
        let is_identity = match joiner {
            Joiner::Union => matches!(&*m, Ty::Empty),
            Joiner::Inter => matches!(&*m, Ty::Mixed),
        };
        if !is_identity && seen.insert(m.clone()) {
            out.push(m);
        }
    };

    for member in members {
        match (&*member, joiner) {
            (Ty::Union(inner), Joiner::Union) | (Ty::Inter(inner), Joiner::Inter) => {
                for m in inner.iter() {
                    push(m.clone(), &mut out);
                }
            }
            _ => push(member, &mut out),
        }
    }

    if out.len() == 1 {
        return out.swap_remove(0);
    }
    match out.len() {
        0 => match joiner {
            Joiner::Union => Ty::empty(),
            Joiner::Inter => Ty::mixed(),
        },
        _ => match joiner {
            Joiner::Union => Ty::Union(out.into()).into(),
            Joiner::Inter => Ty::Inter(out.into()).into(),
        },
    }
}
