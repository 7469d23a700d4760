// ==============================================================================
// Any
// ==============================================================================
//
// `any` is compatible with everything in both directions, but it still has to
// reach the variables inside the other side: whatever is read out of an `any`
// is `any`, and whatever is written into one must be compatible with `any`.

use lang_ty::{ArrTy, Polarity, Ty, TyRef};

use crate::blame::Blame;
use crate::constraints::{CallTy, UseTy};
use crate::{CheckCtx, FlowResult};

impl CheckCtx {
    /// `any ~> upper`.
    pub(super) fn flow_any_lower(&mut self, any: &TyRef, upper: &UseTy, blame: &Blame) -> FlowResult {
        match upper {
            UseTy::Subtype(u) => self.any_into(any, u, blame),
            UseTy::GetProp { tout, .. }
            | UseTy::ObjRest { tout, .. }
            | UseTy::ArrRest { tout, .. }
            | UseTy::EvalDestructor { tout, .. }
            | UseTy::Destructure { tout, .. }
            | UseTy::Reposition { tout, .. } => self.into_ty(any, tout, blame),
            UseTy::SetProp { value, .. } => self.into_any(value, any, blame),
            UseTy::MethodCall { call, .. } | UseTy::Call(call) | UseTy::Construct(call) => {
                self.call_any(any, call, blame)
            }
            UseTy::GetElem { key, tout } => {
                self.into_any(key, any, blame)?;
                self.into_ty(any, tout, blame)
            }
            UseTy::SetElem { key, value } => {
                self.into_any(key, any, blame)?;
                self.into_any(value, any, blame)
            }
            UseTy::ElemOn { obj, action } => self.elem_on(any, obj, action, blame),
            UseTy::ResolveSpread(spread) => self.resolve_spread(any, spread, upper, blame),
            UseTy::Kit { kit, tout } => kit.run(self, any, blame, tout),
        }
    }

    /// `lower <: any`.
    pub(super) fn flow_to_any(&mut self, lower: &TyRef, blame: &Blame) -> FlowResult {
        let any = Ty::any();
        match &**lower {
            Ty::Fun(fun) => {
                self.into_ty(&any, &fun.this, blame)?;
                for param in fun.params.iter().chain(&fun.rest) {
                    self.into_ty(&any, &param.ty, blame)?;
                }
                self.into_any(&fun.ret, &any, blame)
            }
            Ty::Obj(obj) => {
                for prop in obj.props.values() {
                    self.any_by_polarity(&any, &prop.ty, prop.polarity, blame)?;
                }
                if let Some(dict) = &obj.dict {
                    self.any_by_polarity(&any, &dict.value, dict.polarity, blame)?;
                }
                match &obj.call {
                    Some(call) => self.into_any(call, &any, blame),
                    None => Ok(()),
                }
            }
            Ty::Array(arr) => self.any_array(&any, arr, blame),
            Ty::Instance(inst) => {
                for arg in &inst.targs {
                    self.any_by_polarity(&any, &arg.ty, arg.polarity, blame)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `any <: upper` for a structured `upper`: the mirror of `flow_to_any`.
    fn any_into(&mut self, any: &TyRef, upper: &TyRef, blame: &Blame) -> FlowResult {
        match &**upper {
            Ty::Fun(fun) => {
                self.into_any(&fun.this, any, blame)?;
                for param in fun.params.iter().chain(&fun.rest) {
                    self.into_any(&param.ty, any, blame)?;
                }
                self.into_ty(any, &fun.ret, blame)
            }
            Ty::Obj(obj) => {
                for prop in obj.props.values() {
                    self.any_by_polarity(any, &prop.ty, prop.polarity, blame)?;
                }
                if let Some(dict) = &obj.dict {
                    self.any_by_polarity(any, &dict.value, dict.polarity, blame)?;
                }
                Ok(())
            }
            Ty::Array(arr) => self.any_array(any, arr, blame),
            Ty::Maybe(inner) | Ty::Optional(inner) => self.into_ty(any, inner, blame),
            Ty::Inter(members) => {
                for member in members.iter() {
                    self.into_ty(any, member, blame)?;
                }
                Ok(())
            }
            Ty::TypeApp(app) => {
                for targ in &app.targs {
                    self.any_by_polarity(any, targ, Polarity::Neutral, blame)?;
                }
                Ok(())
            }
            Ty::Instance(inst) => {
                for arg in &inst.targs {
                    self.any_by_polarity(any, &arg.ty, arg.polarity, blame)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn call_any(&mut self, any: &TyRef, call: &CallTy, blame: &Blame) -> FlowResult {
        self.into_any(&call.this, any, blame)?;
        for arg in &call.args {
            self.into_any(arg.ty(), any, blame)?;
        }
        self.into_ty(any, &call.tout, blame)
    }

    fn any_array(&mut self, any: &TyRef, arr: &ArrTy, blame: &Blame) -> FlowResult {
        match arr {
            ArrTy::Array(elem) => self.any_by_polarity(any, elem, Polarity::Neutral, blame),
            ArrTy::ReadOnly(elem) => self.any_by_polarity(any, elem, Polarity::Positive, blame),
            ArrTy::Tuple(tup) => {
                for elem in &tup.elems {
                    self.any_by_polarity(any, &elem.ty, elem.polarity, blame)?;
                }
                Ok(())
            }
        }
    }

    /// Covariant positions receive `any`; contravariant ones give to it.
    fn any_by_polarity(
        &mut self,
        any: &TyRef,
        ty: &TyRef,
        polarity: Polarity,
        blame: &Blame,
    ) -> FlowResult {
        if polarity.can_read() {
            self.into_ty(any, ty, blame)?;
        }
        if polarity.can_write() {
            self.into_any(ty, any, blame)?;
        }
        Ok(())
    }

    fn into_ty(&mut self, any: &TyRef, ty: &TyRef, blame: &Blame) -> FlowResult {
        self.flow_inner(any, &UseTy::Subtype(ty.clone()), blame)
    }

    fn into_any(&mut self, ty: &TyRef, any: &TyRef, blame: &Blame) -> FlowResult {
        self.flow_inner(ty, &UseTy::Subtype(any.clone()), blame)
    }
}
