// ==============================================================================
// Kits
// ==============================================================================
//
// A kit derives sub-constraints from a lower type and submits them back
// through `flow`/`unify`. Kits run inside the dispatch loop, so any recursion
// they do goes through the same depth guard and pair cache as everything
// else.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lang_ty::{Destructor, Dict, ObjFlags, ObjTy, Polarity, Property, Ty, TyRef};

use crate::blame::Blame;
use crate::constraints::UseTy;
use crate::{CheckCtx, FlowResult};

pub trait Kit {
    fn name(&self) -> &str;

    /// Handle one concrete (non-variable) lower type, delivering results
    /// into `tout`.
    fn run(&self, cx: &mut CheckCtx, lower: &TyRef, blame: &Blame, tout: &TyRef) -> FlowResult;
}

/// Shared handle to a kit. Two handles are equal only when they point at the
/// same kit instance.
#[derive(Clone)]
pub struct KitRef(Arc<dyn Kit>);

impl KitRef {
    pub fn new(kit: impl Kit + 'static) -> Self {
        KitRef(Arc::new(kit))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub(crate) fn run(
        &self,
        cx: &mut CheckCtx,
        lower: &TyRef,
        blame: &Blame,
        tout: &TyRef,
    ) -> FlowResult {
        self.0.run(cx, lower, blame, tout)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for KitRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for KitRef {}

impl Hash for KitRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state)
    }
}

impl fmt::Debug for KitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ==============================================================================
// Object Spread
// ==============================================================================

/// Resolves `{...head, ...rest[0], ...rest[1]}` one operand at a time. The
/// accumulated object is carried in the kit itself, so each step produces a
/// new kit for the next operand.
pub struct ObjectSpreadKit {
    acc: ObjTy,
    rest: Vec<TyRef>,
}

impl ObjectSpreadKit {
    pub fn new(rest: Vec<TyRef>) -> Self {
        Self {
            acc: ObjTy::exact([]),
            rest,
        }
    }

    fn merge(&self, lower: &TyRef) -> Option<ObjTy> {
        let mut acc = self.acc.clone();
        match &**lower {
            Ty::Obj(obj) => {
                for (name, prop) in &obj.props {
                    if prop.polarity.can_read() {
                        acc.props.insert(name.clone(), Property::field(prop.ty.clone()));
                    }
                }
                if let Some(dict) = &obj.dict {
                    acc.dict = Some(Dict {
                        polarity: Polarity::Neutral,
                        ..dict.clone()
                    });
                }
                acc.flags = ObjFlags {
                    exact: acc.flags.exact && obj.flags.exact,
                    sealed: true,
                };
            }
            Ty::Instance(inst) => {
                for (name, prop) in &inst.own {
                    acc.props.insert(name.clone(), Property::field(prop.ty.clone()));
                }
            }
            // Spreading these contributes nothing.
            Ty::Null | Ty::Void | Ty::Empty => {}
            Ty::Maybe(inner) | Ty::Optional(inner) => return self.merge(inner),
            Ty::Any(_) | Ty::Mixed => {
                acc.flags.exact = false;
                acc.dict = Some(Dict {
                    key: Ty::string(),
                    value: lower.clone(),
                    polarity: Polarity::Neutral,
                });
            }
            _ => return None,
        }
        Some(acc)
    }
}

impl Kit for ObjectSpreadKit {
    fn name(&self) -> &str {
        "object spread"
    }

    fn run(&self, cx: &mut CheckCtx, lower: &TyRef, blame: &Blame, tout: &TyRef) -> FlowResult {
        let Some(acc) = self.merge(lower) else {
            cx.report_unsupported(lower, "object spread", blame);
            return Ok(());
        };
        match self.rest.split_first() {
            None => cx.flow_inner(&Ty::obj(acc), &UseTy::Subtype(tout.clone()), blame),
            Some((next, rest)) => {
                let kit = KitRef::new(ObjectSpreadKit {
                    acc,
                    rest: rest.to_vec(),
                });
                cx.flow_inner(
                    next,
                    &UseTy::Kit {
                        kit,
                        tout: tout.clone(),
                    },
                    blame,
                )
            }
        }
    }
}

/// Entry used by the `Spread` destructor.
pub(crate) fn spread_kit(destructor: &Destructor) -> Option<KitRef> {
    match destructor {
        Destructor::Spread(rest) => Some(KitRef::new(ObjectSpreadKit::new(rest.clone()))),
        _ => None,
    }
}
