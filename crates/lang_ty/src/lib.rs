mod array;
mod display;
mod eval;
mod fun;
mod generic;
mod object;
mod primitive;
mod shape;
mod union;

#[cfg(feature = "proptest_support")]
pub mod arbitrary;

use std::ops::Deref;
use std::sync::Arc;

use derive_more::Debug;
use smol_str::SmolStr;

pub use array::{ArrTy, TupleElement, TupleTy};
pub use eval::{Destructor, EnumTy, EvalTy};
pub use fun::{Effect, FunParam, FunTy};
pub use generic::{OpaqueTy, ParamTy, PolyTy, Subst, TypeAppTy, TypeArg, TypeParam};
pub use object::{Dict, InstanceTy, ObjFlags, ObjTy, Polarity, Property};
pub use primitive::{Literal, PrimitiveTy};
pub use shape::{may_overlap, TyShape};

// ==============================================================================
// Identities
// ==============================================================================
//
// Every nominal or cached construct carries a stable identity so that the
// solver can compare, cache and instantiate it without structural walks.

/// Identity of a type variable node in the solver's graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("#{_0}")]
pub struct TyVarId(pub u32);

impl From<u32> for TyVarId {
    #[inline]
    fn from(value: u32) -> Self {
        TyVarId(value)
    }
}

impl From<usize> for TyVarId {
    #[inline]
    fn from(value: usize) -> Self {
        u32::try_from(value).expect("TyVarId overflow").into()
    }
}

impl From<TyVarId> for usize {
    #[inline]
    fn from(value: TyVarId) -> Self {
        value.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("poly{_0}")]
pub struct PolyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("class{_0}")]
pub struct ClassId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("opaque{_0}")]
pub struct OpaqueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("enum{_0}")]
pub struct EnumId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[debug("eval{_0}")]
pub struct EvalId(pub u32);

// ==============================================================================
// Type terms
// ==============================================================================

/// Where an `any` came from. Both behave identically in the solver; the
/// source only matters for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnySource {
    Explicit,
    Untyped,
}

/// An immutable type term. Children are shared through [`TyRef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    /// A placeholder resolved by the solver's variable graph.
    #[debug("{_0:?}")]
    Var(TyVarId),

    /// The dynamic escape: compatible in both directions with everything.
    #[debug("Any")]
    Any(AnySource),

    /// Top.
    Mixed,
    /// Bottom.
    Empty,
    Void,
    Null,

    #[debug("{_0:?}")]
    Primitive(PrimitiveTy),
    #[debug("{_0:?}")]
    Literal(Literal),

    /// `?T`: `T | null | void`.
    #[debug("Maybe({_0:?})")]
    Maybe(TyRef),
    /// `T | void`, used for optional properties and parameters.
    #[debug("Optional({_0:?})")]
    Optional(TyRef),

    #[debug("Union({_0:?})")]
    Union(Arc<[TyRef]>),
    #[debug("Inter({_0:?})")]
    Inter(Arc<[TyRef]>),

    #[debug("{_0:?}")]
    Fun(Arc<FunTy>),
    #[debug("{_0:?}")]
    Obj(Arc<ObjTy>),
    #[debug("{_0:?}")]
    Instance(Arc<InstanceTy>),
    /// The class value whose instances are the wrapped instance type.
    #[debug("Class({_0:?})")]
    Class(TyRef),

    #[debug("{_0:?}")]
    Poly(Arc<PolyTy>),
    #[debug("{_0:?}")]
    TypeApp(Arc<TypeAppTy>),
    /// A rigid type parameter inside a polymorphic body.
    #[debug("{_0:?}")]
    Param(Arc<ParamTy>),
    #[debug("{_0:?}")]
    Opaque(Arc<OpaqueTy>),

    #[debug("{_0:?}")]
    Array(Arc<ArrTy>),

    #[debug("EnumValue({_0:?})")]
    EnumValue(Arc<EnumTy>),
    #[debug("EnumObject({_0:?})")]
    EnumObject(Arc<EnumTy>),

    /// A lazily evaluated projection.
    #[debug("{_0:?}")]
    Eval(Arc<EvalTy>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{_0:?}")]
pub struct TyRef(Arc<Ty>);

impl From<Ty> for TyRef {
    fn from(value: Ty) -> Self {
        TyRef(Arc::new(value))
    }
}

impl Deref for TyRef {
    type Target = Ty;

    #[inline]
    fn deref(&self) -> &Ty {
        &self.0
    }
}

impl AsRef<Ty> for TyRef {
    fn as_ref(&self) -> &Ty {
        &self.0
    }
}

impl TyRef {
    pub fn ptr_eq(&self, other: &TyRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Union members, or the type itself as a single member.
    pub fn members(&self) -> Vec<TyRef> {
        match &*self.0 {
            Ty::Union(members) => members.to_vec(),
            _ => vec![self.clone()],
        }
    }
}

// ==============================================================================
// Constructors
// ==============================================================================

impl Ty {
    pub fn var(id: impl Into<TyVarId>) -> TyRef {
        Ty::Var(id.into()).into()
    }

    pub fn any() -> TyRef {
        Ty::Any(AnySource::Explicit).into()
    }

    pub fn mixed() -> TyRef {
        Ty::Mixed.into()
    }

    pub fn empty() -> TyRef {
        Ty::Empty.into()
    }

    pub fn void() -> TyRef {
        Ty::Void.into()
    }

    pub fn null() -> TyRef {
        Ty::Null.into()
    }

    pub fn number() -> TyRef {
        Ty::Primitive(PrimitiveTy::Number).into()
    }

    pub fn string() -> TyRef {
        Ty::Primitive(PrimitiveTy::String).into()
    }

    pub fn boolean() -> TyRef {
        Ty::Primitive(PrimitiveTy::Boolean).into()
    }

    pub fn lit(lit: impl Into<Literal>) -> TyRef {
        Ty::Literal(lit.into()).into()
    }

    pub fn maybe(inner: TyRef) -> TyRef {
        Ty::Maybe(inner).into()
    }

    pub fn optional(inner: TyRef) -> TyRef {
        Ty::Optional(inner).into()
    }

    /// Build a normalized union: nested unions are flattened, duplicates and
    /// `empty` members dropped. Zero members give `empty`, one member is
    /// returned as-is.
    pub fn union(members: impl IntoIterator<Item = TyRef>) -> TyRef {
        union::normalize(members, union::Joiner::Union)
    }

    /// Build a normalized intersection: nested intersections are flattened,
    /// duplicates and `mixed` members dropped. Zero members give `mixed`.
    pub fn inter(members: impl IntoIterator<Item = TyRef>) -> TyRef {
        union::normalize(members, union::Joiner::Inter)
    }

    pub fn fun(params: impl IntoIterator<Item = TyRef>, ret: TyRef) -> TyRef {
        Ty::Fun(Arc::new(FunTy::new(params, ret))).into()
    }

    pub fn obj(obj: ObjTy) -> TyRef {
        Ty::Obj(Arc::new(obj)).into()
    }

    pub fn array(elem: TyRef) -> TyRef {
        Ty::Array(Arc::new(ArrTy::Array(elem))).into()
    }

    pub fn ro_array(elem: TyRef) -> TyRef {
        Ty::Array(Arc::new(ArrTy::ReadOnly(elem))).into()
    }

    pub fn tuple(elems: impl IntoIterator<Item = TyRef>) -> TyRef {
        Ty::Array(Arc::new(ArrTy::Tuple(TupleTy::new(
            elems.into_iter().map(TupleElement::required),
        ))))
        .into()
    }

    pub fn instance(inst: InstanceTy) -> TyRef {
        Ty::Instance(Arc::new(inst)).into()
    }

    pub fn class_of(instance: TyRef) -> TyRef {
        Ty::Class(instance).into()
    }

    pub fn poly(poly: PolyTy) -> TyRef {
        Ty::Poly(Arc::new(poly)).into()
    }

    pub fn type_app(ctor: TyRef, targs: Vec<TyRef>) -> TyRef {
        Ty::TypeApp(Arc::new(TypeAppTy { ctor, targs })).into()
    }

    pub fn param(name: impl Into<SmolStr>, bound: TyRef) -> TyRef {
        Ty::Param(Arc::new(ParamTy {
            name: name.into(),
            bound,
        }))
        .into()
    }

    pub fn opaque(opaque: OpaqueTy) -> TyRef {
        Ty::Opaque(Arc::new(opaque)).into()
    }

    pub fn eval(id: EvalId, target: TyRef, destructor: Destructor) -> TyRef {
        Ty::Eval(Arc::new(EvalTy {
            id,
            target,
            destructor,
        }))
        .into()
    }
}

// ==============================================================================
// Queries
// ==============================================================================

impl Ty {
    pub fn is_var(&self) -> bool {
        matches!(self, Ty::Var(_))
    }

    pub fn as_var(&self) -> Option<TyVarId> {
        match self {
            Ty::Var(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Ty::Any(_))
    }

    /// Whether `void` is an accepted value of this type without further
    /// solving. Used for missing arguments and optional properties.
    pub fn admits_void(&self) -> bool {
        match self {
            Ty::Void | Ty::Mixed | Ty::Any(_) | Ty::Maybe(_) | Ty::Optional(_) => true,
            Ty::Union(members) => members.iter().any(|m| m.admits_void()),
            _ => false,
        }
    }

    /// Collect every variable occurring in this term, in order of first
    /// appearance.
    pub fn free_vars(&self) -> Vec<TyVarId> {
        let mut out = Vec::new();
        self.walk(&mut |ty| {
            if let Ty::Var(id) = ty {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        });
        out
    }

    /// Pre-order walk over this term and every nested term.
    pub fn walk(&self, f: &mut impl FnMut(&Ty)) {
        f(self);
        match self {
            Ty::Var(_)
            | Ty::Any(_)
            | Ty::Mixed
            | Ty::Empty
            | Ty::Void
            | Ty::Null
            | Ty::Primitive(_)
            | Ty::Literal(_) => {}
            Ty::Maybe(t) | Ty::Optional(t) | Ty::Class(t) => t.walk(f),
            Ty::Union(ms) | Ty::Inter(ms) => ms.iter().for_each(|m| m.walk(f)),
            Ty::Fun(fun) => {
                fun.this.walk(f);
                fun.params.iter().for_each(|p| p.ty.walk(f));
                if let Some(rest) = &fun.rest {
                    rest.ty.walk(f);
                }
                fun.ret.walk(f);
            }
            Ty::Obj(obj) => obj.walk(f),
            Ty::Instance(inst) => {
                inst.targs.iter().for_each(|a| a.ty.walk(f));
                inst.own.values().for_each(|p| p.ty.walk(f));
                inst.proto.values().for_each(|p| p.ty.walk(f));
                inst.statics.walk(f);
                if let Some(sup) = &inst.super_ {
                    sup.walk(f);
                }
            }
            Ty::Poly(poly) => {
                poly.tparams.iter().for_each(|p| p.bound.walk(f));
                poly.body.walk(f);
            }
            Ty::TypeApp(app) => {
                app.ctor.walk(f);
                app.targs.iter().for_each(|t| t.walk(f));
            }
            Ty::Param(p) => p.bound.walk(f),
            Ty::Opaque(op) => {
                op.targs.iter().for_each(|a| a.ty.walk(f));
                for t in [&op.underlying, &op.upper, &op.lower].into_iter().flatten() {
                    t.walk(f);
                }
            }
            Ty::Array(arr) => match &**arr {
                ArrTy::Array(e) | ArrTy::ReadOnly(e) => e.walk(f),
                ArrTy::Tuple(tup) => tup.elems.iter().for_each(|e| e.ty.walk(f)),
            },
            Ty::EnumValue(e) | Ty::EnumObject(e) => e.representation.walk(f),
            Ty::Eval(ev) => {
                ev.target.walk(f);
                ev.destructor.walk(f);
            }
        }
    }
}

#[macro_export]
macro_rules! ty {
    // -- Leaves ------------------------------------------------------------
    (Any) => { $crate::Ty::any() };
    (Mixed) => { $crate::Ty::mixed() };
    (Empty) => { $crate::Ty::empty() };
    (Void) => { $crate::Ty::void() };
    (Null) => { $crate::Ty::null() };
    (Number) => { $crate::Ty::number() };
    (String) => { $crate::Ty::string() };
    (Boolean) => { $crate::Ty::boolean() };
    (lit $e:literal) => { $crate::Ty::lit($e) };
    (# $n:expr) => { $crate::Ty::var($n as u32) };

    // -- Wrappers ----------------------------------------------------------
    (? $inner:tt) => { $crate::Ty::maybe($crate::ty!($inner)) };
    (opt $inner:tt) => { $crate::Ty::optional($crate::ty!($inner)) };
    (union [$($m:tt),+ $(,)?]) => { $crate::Ty::union([$($crate::ty!($m)),+]) };
    (inter [$($m:tt),+ $(,)?]) => { $crate::Ty::inter([$($crate::ty!($m)),+]) };
    (tuple [$($m:tt),* $(,)?]) => { $crate::Ty::tuple([$($crate::ty!($m)),*]) };
    (fn ($($arg:tt),* $(,)?) -> $ret:tt) => {
        $crate::Ty::fun([$($crate::ty!($arg)),*], $crate::ty!($ret))
    };

    // -- Objects -----------------------------------------------------------
    (inexact { $($key:literal : $val:tt),* $(,)? }) => {
        $crate::Ty::obj($crate::ObjTy::inexact([$(($key, $crate::ty!($val))),*]))
    };
    ({ $($key:literal : $val:tt),* $(,)? }) => {
        $crate::Ty::obj($crate::ObjTy::exact([$(($key, $crate::ty!($val))),*]))
    };

    // -- Grouping ----------------------------------------------------------
    (($($inner:tt)*)) => { $crate::ty!($($inner)*) };
    ([$($inner:tt)*]) => { $crate::Ty::array($crate::ty!($($inner)*)) };
    ($e:expr) => { $crate::TyRef::clone(&$e) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_and_dedups() {
        let inner = Ty::union([ty!(Number), ty!(String)]);
        let outer = Ty::union([inner, ty!(Number), ty!(Empty), ty!(Null)]);
        assert_eq!(outer, Ty::union([ty!(Number), ty!(String), ty!(Null)]));
        assert_eq!(outer.members().len(), 3);
    }

    #[test]
    fn degenerate_unions_and_intersections() {
        assert_eq!(Ty::union([]), ty!(Empty));
        assert_eq!(Ty::union([ty!(Number)]), ty!(Number));
        assert_eq!(Ty::inter([]), ty!(Mixed));
        assert_eq!(Ty::inter([ty!(Mixed), ty!(String)]), ty!(String));
    }

    #[test]
    fn free_vars_in_order() {
        let t = ty!(fn((# 3), [(# 1)]) -> (union [(# 3), Number]));
        assert_eq!(t.free_vars(), vec![TyVarId(3), TyVarId(1)]);
    }

    #[test]
    fn admits_void() {
        assert!(ty!(? Number).admits_void());
        assert!(ty!(union [Void, String]).admits_void());
        assert!(!ty!(String).admits_void());
    }

    #[test]
    fn macro_builds_objects() {
        let t = ty!({ "foo": Number, "bar": (lit "x") });
        let Ty::Obj(obj) = &*t else {
            panic!("expected object")
        };
        assert!(obj.flags.exact);
        assert_eq!(obj.props.len(), 2);
    }
}
