use derive_more::Debug;
use smol_str::SmolStr;

use crate::{Ty, TyRef};

/// What a function may do when called. Hook-ness must agree between a
/// function and the type it flows into; `Any` is compatible with both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Effect {
    #[default]
    Arbitrary,
    Hook,
    Any,
}

impl Effect {
    pub fn compatible(self, upper: Effect) -> bool {
        matches!(
            (self, upper),
            (Effect::Any, _)
                | (_, Effect::Any)
                | (Effect::Arbitrary, Effect::Arbitrary)
                | (Effect::Hook, Effect::Hook)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{name:?}: {ty:?}")]
pub struct FunParam {
    pub name: Option<SmolStr>,
    pub ty: TyRef,
}

impl FunParam {
    pub fn anon(ty: TyRef) -> Self {
        Self { name: None, ty }
    }

    pub fn named(name: impl Into<SmolStr>, ty: TyRef) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("Fun({params:?}, rest: {rest:?}) -> {ret:?}")]
pub struct FunTy {
    pub this: TyRef,
    pub params: Vec<FunParam>,
    /// Element type accepted by the rest parameter.
    pub rest: Option<FunParam>,
    pub ret: TyRef,
    pub effect: Effect,
}

impl FunTy {
    pub fn new(params: impl IntoIterator<Item = TyRef>, ret: TyRef) -> Self {
        Self {
            this: Ty::mixed(),
            params: params.into_iter().map(FunParam::anon).collect(),
            rest: None,
            ret,
            effect: Effect::Arbitrary,
        }
    }

    pub fn with_rest(mut self, elem: TyRef) -> Self {
        self.rest = Some(FunParam::anon(elem));
        self
    }

    pub fn with_this(mut self, this: TyRef) -> Self {
        self.this = this;
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    /// Number of leading parameters a caller must supply.
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .rposition(|p| !p.ty.admits_void())
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty;

    #[test]
    fn effect_compat() {
        assert!(Effect::Any.compatible(Effect::Hook));
        assert!(Effect::Hook.compatible(Effect::Any));
        assert!(!Effect::Hook.compatible(Effect::Arbitrary));
        assert!(Effect::Arbitrary.compatible(Effect::Arbitrary));
    }

    #[test]
    fn required_arity_skips_trailing_optionals() {
        let f = FunTy::new([ty!(Number), ty!(opt String), ty!(? Number)], ty!(Void));
        assert_eq!(f.required_arity(), 1);
        let g = FunTy::new([ty!(opt String), ty!(Number)], ty!(Void));
        assert_eq!(g.required_arity(), 2);
    }
}
