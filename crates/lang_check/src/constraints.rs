// ==============================================================================
// Use-Constraints
// ==============================================================================
//
// The upper side of a flow. A `UseTy` describes what must hold of the lower
// type once it is known. Results are delivered by flowing them into a `tout`
// term, usually a fresh variable owned by the caller.
//
// `UseTy` is hashed and compared structurally so it can be stored in bound
// sets and the pair cache. Blame is passed alongside and never part of it.

use std::fmt;

use derive_more::Debug;
use itertools::Itertools;
use lang_ty::{Destructor, EvalId, TyRef};
use smol_str::SmolStr;

use crate::blame::{Reason, SiteId};
use crate::kit::KitRef;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallArg {
    #[debug("{_0:?}")]
    Arg(TyRef),
    #[debug("...{_0:?}")]
    Spread(TyRef),
}

impl CallArg {
    pub fn ty(&self) -> &TyRef {
        match self {
            CallArg::Arg(t) | CallArg::Spread(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("({args:?}) -> {tout:?}")]
pub struct CallTy {
    pub this: TyRef,
    /// Explicit type arguments, if the call site supplied any.
    pub targs: Option<Vec<TyRef>>,
    pub args: Vec<CallArg>,
    pub tout: TyRef,
    /// Identity of the call site, keying instantiation and spread guards.
    pub site: SiteId,
}

impl CallTy {
    pub fn new(site: SiteId, args: impl IntoIterator<Item = TyRef>, tout: TyRef) -> Self {
        Self {
            this: lang_ty::Ty::void(),
            targs: None,
            args: args.into_iter().map(CallArg::Arg).collect(),
            tout,
            site,
        }
    }

    pub fn has_spread(&self) -> bool {
        self.args.iter().any(|a| matches!(a, CallArg::Spread(_)))
    }
}

/// What to do with an element once the key of `ElemOn` is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElemAction {
    #[debug("read -> {_0:?}")]
    Read(TyRef),
    #[debug("write {_0:?}")]
    Write(TyRef),
}

/// One step of a destructuring pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    #[debug(".{_0}")]
    Prop(SmolStr),
    #[debug("[{_0}]")]
    Elem(usize),
    #[debug("{{...rest excluding {_0:?}}}")]
    ObjRest(Vec<SmolStr>),
    #[debug("[...rest from {_0}]")]
    ArrRest(usize),
    /// `= default`: the value with `void` removed, joined with the default.
    #[debug("= {_0:?}")]
    Default(TyRef),
}

/// An element already collected while resolving spreads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedElem {
    #[debug("{_0:?}")]
    Elem(TyRef),
    /// Elements of an array of unknown length.
    #[debug("...{_0:?}")]
    Spread(TyRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpreadTarget {
    /// Build an array literal (tuple when every length is known).
    #[debug("array -> {tout:?}")]
    Array { tout: TyRef },
    /// Call `fun` with the resolved arguments.
    #[debug("call {fun:?}")]
    Call { fun: TyRef, call: CallTy },
}

/// Resolves the spread elements of an array literal or call, one spread
/// at a time. The lower side is the type of the spread currently being
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("spread@{site:?}({resolved:?} | {todo:?}) => {target:?}")]
pub struct SpreadResolve {
    pub site: SiteId,
    pub resolved: Vec<ResolvedElem>,
    pub todo: Vec<CallArg>,
    pub target: SpreadTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UseTy {
    #[debug("<: {_0:?}")]
    Subtype(TyRef),
    #[debug("GetProp({prop}) -> {tout:?}")]
    GetProp { prop: SmolStr, tout: TyRef },
    #[debug("SetProp({prop}, {value:?})")]
    SetProp { prop: SmolStr, value: TyRef },
    #[debug("MethodCall({name}, {call:?})")]
    MethodCall { name: SmolStr, call: CallTy },
    #[debug("Call{_0:?}")]
    Call(CallTy),
    #[debug("Construct{_0:?}")]
    Construct(CallTy),
    #[debug("GetElem({key:?}) -> {tout:?}")]
    GetElem { key: TyRef, tout: TyRef },
    #[debug("SetElem({key:?}, {value:?})")]
    SetElem { key: TyRef, value: TyRef },
    /// The lower side is the key; `obj` is the container.
    #[debug("ElemOn({obj:?}, {action:?})")]
    ElemOn { obj: TyRef, action: ElemAction },
    #[debug("ObjRest({excluded:?}) -> {tout:?}")]
    ObjRest { excluded: Vec<SmolStr>, tout: TyRef },
    #[debug("ArrRest({index}) -> {tout:?}")]
    ArrRest { index: usize, tout: TyRef },
    #[debug("{_0:?}")]
    ResolveSpread(SpreadResolve),
    #[debug("Eval({id:?}, {destructor:?}) -> {tout:?}")]
    EvalDestructor {
        id: EvalId,
        destructor: Destructor,
        tout: TyRef,
    },
    #[debug("Destructure({selector:?}) -> {tout:?}")]
    Destructure { selector: Selector, tout: TyRef },
    #[debug("Reposition({reason:?}) -> {tout:?}")]
    Reposition { reason: Reason, tout: TyRef },
    #[debug("Kit({kit:?}) -> {tout:?}")]
    Kit { kit: KitRef, tout: TyRef },
}

/// Tag of a use-constraint, reported in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Subtype,
    GetProp,
    SetProp,
    MethodCall,
    Call,
    Construct,
    GetElem,
    SetElem,
    ElemOn,
    ObjRest,
    ArrRest,
    ResolveSpread,
    EvalDestructor,
    Destructure,
    Reposition,
    Kit,
    Unify,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::Subtype => "subtyping",
            ConstraintKind::GetProp => "property read",
            ConstraintKind::SetProp => "property write",
            ConstraintKind::MethodCall => "method call",
            ConstraintKind::Call => "call",
            ConstraintKind::Construct => "construction",
            ConstraintKind::GetElem => "element read",
            ConstraintKind::SetElem => "element write",
            ConstraintKind::ElemOn => "keyed access",
            ConstraintKind::ObjRest => "object rest",
            ConstraintKind::ArrRest => "array rest",
            ConstraintKind::ResolveSpread => "spread",
            ConstraintKind::EvalDestructor => "type projection",
            ConstraintKind::Destructure => "destructuring",
            ConstraintKind::Reposition => "reposition",
            ConstraintKind::Kit => "kit",
            ConstraintKind::Unify => "unification",
        };
        f.write_str(s)
    }
}

impl UseTy {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            UseTy::Subtype(_) => ConstraintKind::Subtype,
            UseTy::GetProp { .. } => ConstraintKind::GetProp,
            UseTy::SetProp { .. } => ConstraintKind::SetProp,
            UseTy::MethodCall { .. } => ConstraintKind::MethodCall,
            UseTy::Call(_) => ConstraintKind::Call,
            UseTy::Construct(_) => ConstraintKind::Construct,
            UseTy::GetElem { .. } => ConstraintKind::GetElem,
            UseTy::SetElem { .. } => ConstraintKind::SetElem,
            UseTy::ElemOn { .. } => ConstraintKind::ElemOn,
            UseTy::ObjRest { .. } => ConstraintKind::ObjRest,
            UseTy::ArrRest { .. } => ConstraintKind::ArrRest,
            UseTy::ResolveSpread(_) => ConstraintKind::ResolveSpread,
            UseTy::EvalDestructor { .. } => ConstraintKind::EvalDestructor,
            UseTy::Destructure { .. } => ConstraintKind::Destructure,
            UseTy::Reposition { .. } => ConstraintKind::Reposition,
            UseTy::Kit { .. } => ConstraintKind::Kit,
        }
    }

    pub fn get_prop(prop: impl Into<SmolStr>, tout: TyRef) -> Self {
        UseTy::GetProp {
            prop: prop.into(),
            tout,
        }
    }

    pub fn set_prop(prop: impl Into<SmolStr>, value: TyRef) -> Self {
        UseTy::SetProp {
            prop: prop.into(),
            value,
        }
    }

    /// Whether a bottom lower bound must still be dispatched against this
    /// constraint rather than trivially succeeding.
    pub(crate) fn runs_on_empty(&self) -> bool {
        match self {
            UseTy::Subtype(t) => t.is_var(),
            UseTy::EvalDestructor { .. }
            | UseTy::Reposition { .. }
            | UseTy::ResolveSpread(_)
            | UseTy::ObjRest { .. }
            | UseTy::ArrRest { .. }
            | UseTy::Kit { .. } => true,
            _ => false,
        }
    }

    /// Whether a union lower bound is dispatched whole instead of member
    /// by member.
    pub(crate) fn keeps_union_whole(&self) -> bool {
        matches!(
            self,
            UseTy::Reposition { .. }
                | UseTy::Destructure {
                    selector: Selector::Default(_),
                    ..
                }
        )
    }

    /// Short rendering of the upper side for diagnostics.
    pub fn describe(&self) -> SmolStr {
        match self {
            UseTy::Subtype(t) => t.to_string().into(),
            UseTy::GetProp { prop, .. } => format!("property `{prop}`").into(),
            UseTy::SetProp { prop, .. } => format!("write to property `{prop}`").into(),
            UseTy::MethodCall { name, call } => format!(
                "call of method `{name}` with ({})",
                call.args.iter().map(describe_arg).join(", ")
            )
            .into(),
            UseTy::Call(call) => {
                format!("call with ({})", call.args.iter().map(describe_arg).join(", ")).into()
            }
            UseTy::Construct(call) => format!(
                "construction with ({})",
                call.args.iter().map(describe_arg).join(", ")
            )
            .into(),
            UseTy::GetElem { key, .. } => format!("element `[{key}]`").into(),
            UseTy::SetElem { key, .. } => format!("write to element `[{key}]`").into(),
            UseTy::ElemOn { obj, .. } => format!("key of `{obj}`").into(),
            UseTy::ObjRest { .. } => "object rest".into(),
            UseTy::ArrRest { index, .. } => format!("array rest from {index}").into(),
            UseTy::ResolveSpread(_) => "spread".into(),
            UseTy::EvalDestructor { destructor, .. } => format!("{destructor:?}").into(),
            UseTy::Destructure { selector, .. } => format!("destructuring {selector:?}").into(),
            UseTy::Reposition { reason, .. } => reason.desc.clone(),
            UseTy::Kit { kit, .. } => kit.name().into(),
        }
    }
}

fn describe_arg(arg: &CallArg) -> String {
    match arg {
        CallArg::Arg(t) => t.to_string(),
        CallArg::Spread(t) => format!("...{t}"),
    }
}

impl From<TyRef> for UseTy {
    fn from(value: TyRef) -> Self {
        UseTy::Subtype(value)
    }
}
