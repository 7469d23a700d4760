use std::collections::BTreeSet;

use derive_more::Debug;
use smol_str::SmolStr;

use crate::{EnumId, EvalId, Ty, TyRef};

/// A projection applied lazily to a target type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destructor {
    /// `T['name']`
    #[debug("PropertyType({_0})")]
    PropertyType(SmolStr),
    /// `T[K]`
    #[debug("ElementType({_0:?})")]
    ElementType(TyRef),
    /// `$NonMaybeType<T>`
    NonMaybe,
    /// `$ReadOnly<T>`
    ReadOnly,
    /// `Partial<T>`
    Partial,
    /// `$Values<T>`
    Values,
    /// `{...T, ...rest}`: T spread first, followed by each of `rest`.
    #[debug("Spread({_0:?})")]
    Spread(Vec<TyRef>),
}

impl Destructor {
    pub fn walk(&self, f: &mut impl FnMut(&Ty)) {
        match self {
            Destructor::ElementType(t) => t.walk(f),
            Destructor::Spread(ts) => ts.iter().for_each(|t| t.walk(f)),
            Destructor::PropertyType(_)
            | Destructor::NonMaybe
            | Destructor::ReadOnly
            | Destructor::Partial
            | Destructor::Values => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("Eval({id:?}, {target:?}, {destructor:?})")]
pub struct EvalTy {
    pub id: EvalId,
    pub target: TyRef,
    pub destructor: Destructor,
}

/// A nominal enum. `EnumValue` is the type of its members, `EnumObject` the
/// type of the enum object itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("enum {name}")]
pub struct EnumTy {
    pub id: EnumId,
    pub name: SmolStr,
    pub members: BTreeSet<SmolStr>,
    /// The primitive every member value is represented as.
    pub representation: TyRef,
}
