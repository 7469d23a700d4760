// ==============================================================================
// Structural Subtyping
// ==============================================================================
//
// `lower <: upper` once neither side is a variable, a projection, `any` on the
// lower side, or a lower union. Joins on the upper side come first, then
// generics, then the concrete constructor pairs.

use lang_ty::{
    may_overlap, FunTy, InstanceTy, Literal, ObjTy, Polarity, Property, Ty, TyRef, TypeArg,
    TypeParam,
};
use smol_str::SmolStr;

use super::expand_type_app;
use crate::blame::{Blame, BlameFrame};
use crate::builtins::ProtoOwner;
use crate::constraints::{ConstraintKind, UseTy};
use crate::diagnostic::{suggest_similar, DiagnosticKind};
use crate::{CheckCtx, FlowResult};

impl CheckCtx {
    pub(crate) fn flow_subtype(&mut self, lower: &TyRef, upper: &TyRef, blame: &Blame) -> FlowResult {
        match (&**lower, &**upper) {
            // -- Joins and wrappers on the upper side -------------------------
            (_, Ty::Mixed) => Ok(()),
            (_, Ty::Any(_)) => self.flow_to_any(lower, blame),
            (_, Ty::Union(members)) => self.try_union_members(lower, upper, members, blame),
            (Ty::Null | Ty::Void, Ty::Maybe(_)) | (Ty::Void, Ty::Optional(_)) => Ok(()),
            (_, Ty::Maybe(inner) | Ty::Optional(inner)) => {
                self.flow_inner(lower, &UseTy::Subtype(inner.clone()), blame)
            }
            (_, Ty::Inter(members)) => {
                for member in members.iter() {
                    self.flow_inner(lower, &UseTy::Subtype(member.clone()), blame)?;
                }
                Ok(())
            }
            (Ty::Inter(members), _) => {
                self.try_inter_members(lower, members, &UseTy::Subtype(upper.clone()), blame)
            }

            // -- Generics -----------------------------------------------------
            (Ty::Param(a), Ty::Param(b)) if a.name == b.name => Ok(()),
            (Ty::Poly(a), Ty::Poly(b)) if a.id == b.id => {
                self.flow_inner(&a.body, &UseTy::Subtype(b.body.clone()), blame)
            }
            (_, Ty::Poly(b)) => self.flow_inner(lower, &UseTy::Subtype(b.body.clone()), blame),
            (Ty::Poly(a), _) => {
                let inst = self.instantiate(lower, a, None, blame.site(), blame)?;
                self.flow_inner(&inst, &UseTy::Subtype(upper.clone()), blame)
            }
            (Ty::Param(a), _) => self.flow_inner(&a.bound, &UseTy::Subtype(upper.clone()), blame),
            (Ty::TypeApp(a), Ty::TypeApp(b)) if a.ctor == b.ctor => {
                let tparams: &[TypeParam] = match &*a.ctor {
                    Ty::Poly(poly) => &poly.tparams,
                    _ => &[],
                };
                self.flow_type_app_args(lower, upper, tparams, &a.targs, &b.targs, blame)
            }
            (Ty::TypeApp(a), _) => {
                self.flow_inner(&expand_type_app(a), &UseTy::Subtype(upper.clone()), blame)
            }
            (_, Ty::TypeApp(b)) => {
                self.flow_inner(lower, &UseTy::Subtype(expand_type_app(b)), blame)
            }
            (Ty::Opaque(a), Ty::Opaque(b)) if a.id == b.id => {
                self.flow_type_args(&a.targs, &b.targs, blame)
            }
            (_, Ty::Opaque(b)) => match b.lower.as_ref().or(b.underlying.as_ref()) {
                Some(t) => self.flow_inner(lower, &UseTy::Subtype(t.clone()), blame),
                None => self.mismatch(lower, upper, blame),
            },
            (Ty::Opaque(a), _) => match a.underlying.as_ref().or(a.upper.as_ref()) {
                Some(t) => self.flow_inner(t, &UseTy::Subtype(upper.clone()), blame),
                None => self.mismatch(lower, upper, blame),
            },

            // -- Scalars ------------------------------------------------------
            (Ty::Primitive(a), Ty::Primitive(b)) if a == b => Ok(()),
            (Ty::Literal(l), Ty::Primitive(p)) if l.primitive() == *p => Ok(()),
            (Ty::Literal(a), Ty::Literal(b)) if a == b => Ok(()),
            (Ty::Null, Ty::Null) | (Ty::Void, Ty::Void) => Ok(()),
            (Ty::EnumValue(a), Ty::EnumValue(b)) if a.id == b.id => Ok(()),
            (Ty::EnumValue(_), Ty::EnumValue(_)) => self.mismatch(lower, upper, blame),
            (Ty::EnumValue(a), _) => {
                self.flow_inner(&a.representation, &UseTy::Subtype(upper.clone()), blame)
            }
            (Ty::EnumObject(a), Ty::EnumObject(b)) if a.id == b.id => Ok(()),

            // -- Functions, objects and classes -------------------------------
            (Ty::Fun(l), Ty::Fun(u)) => self.flow_fun(lower, upper, l, u, blame),
            (Ty::Fun(_), Ty::Obj(u)) => self.flow_fun_to_obj(lower, upper, u, blame),
            (Ty::Obj(l), Ty::Fun(_)) => match &l.call {
                Some(call) => self.flow_inner(call, &UseTy::Subtype(upper.clone()), blame),
                None => self.mismatch(lower, upper, blame),
            },
            (Ty::Obj(l), Ty::Obj(u)) => self.flow_obj(lower, upper, l, u, blame),
            (Ty::Instance(l), Ty::Instance(u)) => self.flow_instance(lower, upper, l, u, blame),
            (Ty::Instance(l), Ty::Obj(u)) => {
                self.flow_obj(lower, upper, &instance_view(l), u, blame)
            }
            (Ty::Class(l), Ty::Class(u)) => self.flow_inner(l, &UseTy::Subtype(u.clone()), blame),
            (Ty::Class(l), Ty::Obj(_)) => match &**l {
                Ty::Instance(inst) => {
                    self.flow_inner(&inst.statics, &UseTy::Subtype(upper.clone()), blame)
                }
                _ => self.mismatch(lower, upper, blame),
            },

            (Ty::Array(l), Ty::Array(u)) => self.flow_array(lower, upper, l, u, blame),

            _ => self.mismatch(lower, upper, blame),
        }
    }

    fn mismatch(&mut self, lower: &TyRef, upper: &TyRef, blame: &Blame) -> FlowResult {
        self.report_incompatible(lower, &UseTy::Subtype(upper.clone()), blame);
        Ok(())
    }

    /// Relate two values of a position with the given variance.
    pub(crate) fn flow_by_polarity(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        polarity: Polarity,
        blame: &Blame,
    ) -> FlowResult {
        match polarity {
            Polarity::Positive => self.flow_inner(lower, &UseTy::Subtype(upper.clone()), blame),
            Polarity::Negative => self.flow_inner(upper, &UseTy::Subtype(lower.clone()), blame),
            Polarity::Neutral => self.unify_inner(lower, upper, blame),
        }
    }

    fn flow_type_args(&mut self, lower: &[TypeArg], upper: &[TypeArg], blame: &Blame) -> FlowResult {
        for (l, u) in lower.iter().zip(upper) {
            let arg_blame = blame.push(BlameFrame::TypeArg {
                name: u.name.clone(),
            });
            self.flow_by_polarity(&l.ty, &u.ty, u.polarity, &arg_blame)?;
        }
        Ok(())
    }

    fn flow_type_app_args(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        tparams: &[TypeParam],
        lower_args: &[TyRef],
        upper_args: &[TyRef],
        blame: &Blame,
    ) -> FlowResult {
        if lower_args.len() != upper_args.len() {
            self.report(
                DiagnosticKind::ArityMismatch {
                    expected: upper_args.len(),
                    found: lower_args.len(),
                },
                lower,
                upper.to_string().into(),
                ConstraintKind::Subtype,
                blame,
            );
            return Ok(());
        }
        for (index, (l, u)) in lower_args.iter().zip(upper_args).enumerate() {
            let (name, polarity) = match tparams.get(index) {
                Some(tparam) => (tparam.name.clone(), tparam.polarity),
                None => (SmolStr::from(index.to_string()), Polarity::Neutral),
            };
            self.flow_by_polarity(l, u, polarity, &blame.push(BlameFrame::TypeArg { name }))?;
        }
        Ok(())
    }

    // ==========================================================================
    // Functions
    // ==========================================================================

    fn flow_fun(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        l: &FunTy,
        u: &FunTy,
        blame: &Blame,
    ) -> FlowResult {
        if !l.effect.compatible(u.effect) {
            return self.mismatch(lower, upper, blame);
        }
        if u.rest.is_none() && l.required_arity() > u.params.len() {
            self.report(
                DiagnosticKind::ArityMismatch {
                    expected: u.params.len(),
                    found: l.required_arity(),
                },
                lower,
                upper.to_string().into(),
                ConstraintKind::Subtype,
                blame,
            );
            return Ok(());
        }

        self.flow_inner(&u.this, &UseTy::Subtype(l.this.clone()), blame)?;

        for (index, up) in u.params.iter().enumerate() {
            let param_blame = blame.push(BlameFrame::FunParam { index });
            let target = match (l.params.get(index), &l.rest) {
                (Some(lp), _) => &lp.ty,
                (None, Some(rest)) => &rest.ty,
                // Extra arguments are ignored by the callee.
                (None, None) => continue,
            };
            self.flow_inner(&up.ty, &UseTy::Subtype(target.clone()), &param_blame)?;
        }

        if let Some(upper_rest) = &u.rest {
            let rest_blame = blame.push(BlameFrame::FunRest);
            for lp in l.params.iter().skip(u.params.len()) {
                self.flow_inner(&upper_rest.ty, &UseTy::Subtype(lp.ty.clone()), &rest_blame)?;
            }
            if let Some(lower_rest) = &l.rest {
                self.flow_inner(&upper_rest.ty, &UseTy::Subtype(lower_rest.ty.clone()), &rest_blame)?;
            }
        }

        self.flow_inner(
            &l.ret,
            &UseTy::Subtype(u.ret.clone()),
            &blame.push(BlameFrame::FunReturn),
        )
    }

    /// A function against an object type: the call signature plus the
    /// members functions share through their prototype.
    fn flow_fun_to_obj(&mut self, lower: &TyRef, upper: &TyRef, u: &ObjTy, blame: &Blame) -> FlowResult {
        if u.flags.exact {
            return self.mismatch(lower, upper, blame);
        }
        if let Some(call) = &u.call {
            self.flow_inner(lower, &UseTy::Subtype(call.clone()), blame)?;
        }
        for (name, up) in &u.props {
            match self.builtins.lookup(ProtoOwner::Function, name) {
                Some(lp) => self.flow_prop(name, &lp, up, blame)?,
                None if up.ty.admits_void() => {}
                None => {
                    let candidates = self.builtins.names(ProtoOwner::Function);
                    let suggestion = suggest_similar(name, candidates.iter());
                    self.report_missing(lower, upper, name, suggestion, blame);
                }
            }
        }
        Ok(())
    }

    // ==========================================================================
    // Objects
    // ==========================================================================

    /// One property pair: the lower side's access must allow what the upper
    /// side promises, then the values are related by the upper's variance.
    fn flow_prop(&mut self, name: &SmolStr, lp: &Property, up: &Property, blame: &Blame) -> FlowResult {
        let prop_blame = blame.push(BlameFrame::PropertyCompatibility { name: name.clone() });
        if !lp.polarity.compat(up.polarity) {
            self.report_incompatible(&lp.ty, &UseTy::Subtype(up.ty.clone()), &prop_blame);
            return Ok(());
        }
        self.flow_by_polarity(&lp.ty, &up.ty, up.polarity, &prop_blame)
    }

    fn report_missing(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        name: &SmolStr,
        suggestion: Option<SmolStr>,
        blame: &Blame,
    ) {
        self.report(
            DiagnosticKind::MissingProperty {
                name: name.clone(),
                suggestion,
            },
            lower,
            upper.to_string().into(),
            ConstraintKind::Subtype,
            &blame.push(BlameFrame::PropertyCompatibility { name: name.clone() }),
        );
    }

    fn flow_obj(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        l: &ObjTy,
        u: &ObjTy,
        blame: &Blame,
    ) -> FlowResult {
        if u.flags.exact && !l.flags.exact {
            return self.mismatch(lower, upper, blame);
        }

        for (name, up) in &u.props {
            if let Some(lp) = l.props.get(name) {
                self.flow_prop(name, lp, up, blame)?;
                continue;
            }
            if let Some(dict) = &l.dict {
                if may_overlap(&Ty::Literal(Literal::Str(name.clone())), &dict.key) {
                    let lp = Property {
                        ty: dict.value.clone(),
                        polarity: dict.polarity,
                    };
                    self.flow_prop(name, &lp, up, blame)?;
                    continue;
                }
            }
            if let Some(proto) = &l.proto {
                let read = UseTy::get_prop(name.clone(), up.ty.clone());
                let prop_blame = blame.push(BlameFrame::PropertyCompatibility { name: name.clone() });
                self.flow_inner(proto, &read, &prop_blame)?;
                continue;
            }
            if up.ty.admits_void() || !l.flags.sealed {
                continue;
            }
            let suggestion = suggest_similar(name, l.props.keys());
            self.report_missing(lower, upper, name, suggestion, blame);
        }

        if u.flags.exact && u.dict.is_none() {
            for name in l.props.keys().filter(|name| !u.props.contains_key(*name)) {
                let suggestion = suggest_similar(name, u.props.keys());
                self.report_missing(lower, upper, name, suggestion, blame);
            }
        }

        match (&l.dict, &u.dict) {
            (Some(ld), Some(ud)) => {
                self.flow_inner(&ud.key, &UseTy::Subtype(ld.key.clone()), blame)?;
                let lp = Property {
                    ty: ld.value.clone(),
                    polarity: ld.polarity,
                };
                let up = Property {
                    ty: ud.value.clone(),
                    polarity: ud.polarity,
                };
                self.flow_prop(&SmolStr::new_static("[]"), &lp, &up, blame)?;
            }
            (None, Some(ud)) => {
                let up = Property {
                    ty: ud.value.clone(),
                    polarity: ud.polarity,
                };
                for (name, lp) in &l.props {
                    if may_overlap(&Ty::Literal(Literal::Str(name.clone())), &ud.key) {
                        self.flow_prop(name, lp, &up, blame)?;
                    }
                }
            }
            _ => {}
        }

        match (&l.call, &u.call) {
            (Some(lc), Some(uc)) => self.flow_inner(lc, &UseTy::Subtype(uc.clone()), blame),
            (None, Some(_)) => {
                self.report_use(DiagnosticKind::NotCallable, lower, &UseTy::Subtype(upper.clone()), blame);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ==========================================================================
    // Classes
    // ==========================================================================

    fn flow_instance(
        &mut self,
        lower: &TyRef,
        upper: &TyRef,
        l: &InstanceTy,
        u: &InstanceTy,
        blame: &Blame,
    ) -> FlowResult {
        if l.class_id == u.class_id {
            return self.flow_type_args(&l.targs, &u.targs, blame);
        }
        match &l.super_ {
            Some(sup) => self.flow_inner(sup, &UseTy::Subtype(upper.clone()), blame),
            None => self.mismatch(lower, upper, blame),
        }
    }
}

/// An instance seen as an inexact object: own fields over prototype members,
/// with the superclass as prototype.
fn instance_view(inst: &InstanceTy) -> ObjTy {
    let mut props = inst.proto.clone();
    props.extend(inst.own.iter().map(|(k, v)| (k.clone(), v.clone())));
    ObjTy {
        props,
        proto: inst.super_.clone(),
        ..ObjTy::default()
    }
}
