use std::sync::Arc;

use derive_more::Debug;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    ArrTy, Destructor, Dict, EvalTy, FunParam, FunTy, InstanceTy, ObjTy, OpaqueId, Polarity,
    PolyId, Property, TupleElement, TupleTy, Ty, TyRef,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{polarity:?}{name}: {bound:?}")]
pub struct TypeParam {
    pub name: SmolStr,
    pub bound: TyRef,
    pub default: Option<TyRef>,
    pub polarity: Polarity,
}

impl TypeParam {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            bound: Ty::mixed(),
            default: None,
            polarity: Polarity::Neutral,
        }
    }

    pub fn bounded(name: impl Into<SmolStr>, bound: TyRef) -> Self {
        Self {
            bound,
            ..Self::new(name)
        }
    }
}

/// `<T, U: B> body`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("Poly<{tparams:?}>({body:?})")]
pub struct PolyTy {
    pub id: PolyId,
    pub tparams: Vec<TypeParam>,
    pub body: TyRef,
}

/// A rigid reference to a type parameter, opaque to everything except its
/// bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{name}")]
pub struct ParamTy {
    pub name: SmolStr,
    pub bound: TyRef,
}

/// Application of a polymorphic constructor to arguments: `C<A, B>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{ctor:?}<{targs:?}>")]
pub struct TypeAppTy {
    pub ctor: TyRef,
    pub targs: Vec<TyRef>,
}

/// A type argument of a nominal instance or opaque type, with the declared
/// variance of its parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{polarity:?}{name}={ty:?}")]
pub struct TypeArg {
    pub name: SmolStr,
    pub ty: TyRef,
    pub polarity: Polarity,
}

/// A nominal alias. Outside its defining scope only `upper`/`lower` are
/// visible; `underlying` is used when the opaque is transparent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("opaque {name}<{targs:?}>")]
pub struct OpaqueTy {
    pub id: OpaqueId,
    pub name: SmolStr,
    pub underlying: Option<TyRef>,
    pub upper: Option<TyRef>,
    pub lower: Option<TyRef>,
    pub targs: Vec<TypeArg>,
}

// ==============================================================================
// Substitution
// ==============================================================================

/// Replaces rigid [`ParamTy`] references by name. A nested [`PolyTy`] that
/// rebinds a name shadows it for its own body.
#[derive(Debug, Clone, Default)]
pub struct Subst {
    map: FxHashMap<SmolStr, TyRef>,
}

impl Subst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<SmolStr>, ty: TyRef) {
        self.map.insert(name.into(), ty);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TyRef> {
        self.map.get(name)
    }

    pub fn apply(&self, ty: &TyRef) -> TyRef {
        if self.map.is_empty() {
            return ty.clone();
        }
        match &**ty {
            Ty::Var(_)
            | Ty::Any(_)
            | Ty::Mixed
            | Ty::Empty
            | Ty::Void
            | Ty::Null
            | Ty::Primitive(_)
            | Ty::Literal(_) => ty.clone(),
            Ty::Param(p) => match self.map.get(&p.name) {
                Some(replacement) => replacement.clone(),
                None => ty.clone(),
            },
            Ty::Maybe(t) => Ty::maybe(self.apply(t)),
            Ty::Optional(t) => Ty::optional(self.apply(t)),
            Ty::Class(t) => Ty::class_of(self.apply(t)),
            Ty::Union(ms) => Ty::union(ms.iter().map(|m| self.apply(m))),
            Ty::Inter(ms) => Ty::inter(ms.iter().map(|m| self.apply(m))),
            Ty::Fun(fun) => Ty::Fun(Arc::new(self.apply_fun(fun))).into(),
            Ty::Obj(obj) => Ty::obj(self.apply_obj(obj)),
            Ty::Instance(inst) => Ty::instance(InstanceTy {
                class_id: inst.class_id,
                name: inst.name.clone(),
                targs: self.apply_targs(&inst.targs),
                own: self.apply_props(&inst.own),
                proto: self.apply_props(&inst.proto),
                statics: self.apply(&inst.statics),
                super_: inst.super_.as_ref().map(|s| self.apply(s)),
            }),
            Ty::Poly(poly) => {
                let mut inner = self.clone();
                for tp in &poly.tparams {
                    inner.map.remove(&tp.name);
                }
                Ty::poly(PolyTy {
                    id: poly.id,
                    tparams: poly
                        .tparams
                        .iter()
                        .map(|tp| TypeParam {
                            bound: inner.apply(&tp.bound),
                            default: tp.default.as_ref().map(|d| inner.apply(d)),
                            ..tp.clone()
                        })
                        .collect(),
                    body: inner.apply(&poly.body),
                })
            }
            Ty::TypeApp(app) => Ty::type_app(
                self.apply(&app.ctor),
                app.targs.iter().map(|t| self.apply(t)).collect(),
            ),
            Ty::Opaque(op) => Ty::opaque(OpaqueTy {
                id: op.id,
                name: op.name.clone(),
                underlying: op.underlying.as_ref().map(|t| self.apply(t)),
                upper: op.upper.as_ref().map(|t| self.apply(t)),
                lower: op.lower.as_ref().map(|t| self.apply(t)),
                targs: self.apply_targs(&op.targs),
            }),
            Ty::Array(arr) => {
                let arr = match &**arr {
                    ArrTy::Array(e) => ArrTy::Array(self.apply(e)),
                    ArrTy::ReadOnly(e) => ArrTy::ReadOnly(self.apply(e)),
                    ArrTy::Tuple(tup) => ArrTy::Tuple(TupleTy::new(tup.elems.iter().map(|e| {
                        TupleElement {
                            ty: self.apply(&e.ty),
                            ..e.clone()
                        }
                    }))),
                };
                Ty::Array(Arc::new(arr)).into()
            }
            Ty::EnumValue(_) | Ty::EnumObject(_) => ty.clone(),
            Ty::Eval(ev) => Ty::Eval(Arc::new(EvalTy {
                id: ev.id,
                target: self.apply(&ev.target),
                destructor: self.apply_destructor(&ev.destructor),
            }))
            .into(),
        }
    }

    fn apply_fun(&self, fun: &FunTy) -> FunTy {
        let param = |p: &FunParam| FunParam {
            name: p.name.clone(),
            ty: self.apply(&p.ty),
        };
        FunTy {
            this: self.apply(&fun.this),
            params: fun.params.iter().map(param).collect(),
            rest: fun.rest.as_ref().map(param),
            ret: self.apply(&fun.ret),
            effect: fun.effect,
        }
    }

    fn apply_obj(&self, obj: &ObjTy) -> ObjTy {
        ObjTy {
            props: self.apply_props(&obj.props),
            dict: obj.dict.as_ref().map(|d| Dict {
                key: self.apply(&d.key),
                value: self.apply(&d.value),
                polarity: d.polarity,
            }),
            call: obj.call.as_ref().map(|c| self.apply(c)),
            proto: obj.proto.as_ref().map(|p| self.apply(p)),
            flags: obj.flags,
        }
    }

    fn apply_props(
        &self,
        props: &std::collections::BTreeMap<SmolStr, Property>,
    ) -> std::collections::BTreeMap<SmolStr, Property> {
        props
            .iter()
            .map(|(k, p)| {
                (
                    k.clone(),
                    Property {
                        ty: self.apply(&p.ty),
                        polarity: p.polarity,
                    },
                )
            })
            .collect()
    }

    fn apply_targs(&self, targs: &[TypeArg]) -> Vec<TypeArg> {
        targs
            .iter()
            .map(|a| TypeArg {
                ty: self.apply(&a.ty),
                ..a.clone()
            })
            .collect()
    }

    fn apply_destructor(&self, d: &Destructor) -> Destructor {
        match d {
            Destructor::ElementType(t) => Destructor::ElementType(self.apply(t)),
            Destructor::Spread(ts) => Destructor::Spread(ts.iter().map(|t| self.apply(t)).collect()),
            other => other.clone(),
        }
    }
}

impl PolyTy {
    /// Substitution of each parameter by the corresponding argument, falling
    /// back to the parameter's default and then to `any` when too few are
    /// given.
    pub fn subst_for(&self, targs: &[TyRef]) -> Subst {
        let mut subst = Subst::new();
        for (i, tp) in self.tparams.iter().enumerate() {
            let arg = targs
                .get(i)
                .cloned()
                .or_else(|| tp.default.as_ref().map(|d| subst.apply(d)))
                .unwrap_or_else(Ty::any);
            subst.insert(tp.name.clone(), arg);
        }
        subst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty;

    #[test]
    fn subst_replaces_params() {
        let body = Ty::fun([Ty::param("T", ty!(Mixed))], ty!([(Ty::param("T", ty!(Mixed)))]));
        let mut s = Subst::new();
        s.insert("T", ty!(Number));
        assert_eq!(s.apply(&body), ty!(fn(Number) -> [Number]));
    }

    #[test]
    fn subst_respects_shadowing() {
        let inner = Ty::poly(PolyTy {
            id: PolyId(1),
            tparams: vec![TypeParam::new("T")],
            body: Ty::param("T", ty!(Mixed)),
        });
        let outer = ty!(union [(Ty::param("T", ty!(Mixed))), inner]);
        let mut s = Subst::new();
        s.insert("T", ty!(String));
        let applied = s.apply(&outer);
        let members = applied.members();
        assert_eq!(members[0], ty!(String));
        assert_eq!(members[1], inner);
    }

    #[test]
    fn subst_for_uses_defaults() {
        let poly = PolyTy {
            id: PolyId(0),
            tparams: vec![
                TypeParam::new("A"),
                TypeParam {
                    default: Some(ty!(Boolean)),
                    ..TypeParam::new("B")
                },
                TypeParam::new("C"),
            ],
            body: ty!(Void),
        };
        let s = poly.subst_for(&[ty!(Number)]);
        assert_eq!(s.get("A"), Some(&ty!(Number)));
        assert_eq!(s.get("B"), Some(&ty!(Boolean)));
        assert_eq!(s.get("C"), Some(&ty!(Any)));
    }
}
