// ==============================================================================
// Calls and Construction
// ==============================================================================

use lang_ty::{ArrTy, FunTy, Ty, TyRef};

use crate::blame::{Blame, BlameFrame};
use crate::constraints::{CallArg, CallTy, SpreadResolve, SpreadTarget, UseTy};
use crate::diagnostic::DiagnosticKind;
use crate::{CheckCtx, FlowResult};

impl CheckCtx {
    pub(super) fn call_value(
        &mut self,
        lower: &TyRef,
        call: &CallTy,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        match &**lower {
            Ty::Fun(fun) => {
                if call.args.iter().any(|arg| spread_needs_resolving(arg)) {
                    let spread = SpreadResolve {
                        site: call.site,
                        resolved: Vec::new(),
                        todo: call.args.clone(),
                        target: SpreadTarget::Call {
                            fun: lower.clone(),
                            call: call.clone(),
                        },
                    };
                    return self.continue_spread(spread, blame);
                }
                self.call_fun(lower, fun, call, upper, blame)
            }
            Ty::Obj(obj) => match &obj.call {
                Some(sig) => self.flow_inner(sig, upper, blame),
                None => {
                    self.report_use(DiagnosticKind::NotCallable, lower, upper, blame);
                    Ok(())
                }
            },
            _ => {
                self.report_use(DiagnosticKind::NotCallable, lower, upper, blame);
                Ok(())
            }
        }
    }

    /// Arguments into parameters, receiver into `this`, return into `tout`.
    /// A spread argument of unknown length feeds every remaining parameter
    /// and disables the arity check.
    pub(super) fn call_fun(
        &mut self,
        lower: &TyRef,
        fun: &FunTy,
        call: &CallTy,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let mut index = 0;
        let mut extra = 0;
        let mut saw_spread = false;

        for arg in &call.args {
            match arg {
                CallArg::Arg(ty) => {
                    match (fun.params.get(index), &fun.rest) {
                        (Some(param), _) => {
                            let arg_blame = blame.push(BlameFrame::FunParam { index });
                            self.flow_inner(ty, &UseTy::Subtype(param.ty.clone()), &arg_blame)?;
                        }
                        (None, Some(rest)) => {
                            let rest_blame = blame.push(BlameFrame::FunRest);
                            self.flow_inner(ty, &UseTy::Subtype(rest.ty.clone()), &rest_blame)?;
                        }
                        (None, None) => extra += 1,
                    }
                    index += 1;
                }
                CallArg::Spread(ty) => {
                    saw_spread = true;
                    let elem = match &**ty {
                        Ty::Array(arr) => arr.elem_ty(),
                        _ => {
                            let elem = self.fresh_var_ty();
                            self.flow_inner(ty, &UseTy::Subtype(Ty::ro_array(elem.clone())), blame)?;
                            elem
                        }
                    };
                    for (offset, param) in fun.params.iter().enumerate().skip(index) {
                        let arg_blame = blame.push(BlameFrame::FunParam { index: offset });
                        self.flow_inner(&elem, &UseTy::Subtype(param.ty.clone()), &arg_blame)?;
                    }
                    if let Some(rest) = &fun.rest {
                        let rest_blame = blame.push(BlameFrame::FunRest);
                        self.flow_inner(&elem, &UseTy::Subtype(rest.ty.clone()), &rest_blame)?;
                    }
                }
            }
        }

        if !saw_spread {
            let required = fun.required_arity();
            if index < required {
                let kind = DiagnosticKind::ArityMismatch {
                    expected: required,
                    found: index,
                };
                self.report_use(kind, lower, upper, blame);
            } else if extra > 0 {
                let kind = DiagnosticKind::ArityMismatch {
                    expected: fun.params.len(),
                    found: index,
                };
                self.report_use(kind, lower, upper, blame);
            }
        }

        self.flow_inner(&call.this, &UseTy::Subtype(fun.this.clone()), blame)?;
        self.flow_inner(
            &fun.ret,
            &UseTy::Subtype(call.tout.clone()),
            &blame.push(BlameFrame::FunReturn),
        )
    }

    /// `new C(args)`: the class's `constructor` member is called with the
    /// instance as receiver, and the instance is the result.
    pub(super) fn construct(
        &mut self,
        lower: &TyRef,
        call: &CallTy,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let Ty::Class(instance) = &**lower else {
            self.report_use(DiagnosticKind::NotConstructable, lower, upper, blame);
            return Ok(());
        };
        let Ty::Instance(inst) = &**instance else {
            self.report_use(DiagnosticKind::NotConstructable, lower, upper, blame);
            return Ok(());
        };

        match inst.get("constructor") {
            Some(ctor) => {
                let ctor_call = CallTy {
                    this: instance.clone(),
                    tout: self.fresh_var_ty(),
                    ..call.clone()
                };
                self.flow_inner(&ctor.ty, &UseTy::Call(ctor_call), blame)?;
            }
            None if !call.args.is_empty() => {
                let kind = DiagnosticKind::ArityMismatch {
                    expected: 0,
                    found: call.args.len(),
                };
                self.report_use(kind, lower, upper, blame);
            }
            None => {}
        }
        self.flow_inner(instance, &UseTy::Subtype(call.tout.clone()), blame)
    }
}

/// Spreads of plain arrays are handled by the call itself; anything else
/// (tuples, variables, unions) is resolved to elements first.
fn spread_needs_resolving(arg: &CallArg) -> bool {
    match arg {
        CallArg::Arg(_) => false,
        CallArg::Spread(ty) => !matches!(
            &**ty,
            Ty::Array(arr) if matches!(**arr, ArrTy::Array(_) | ArrTy::ReadOnly(_))
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::{BlameOp, SiteId};
    use lang_ty::{ty, ClassId, InstanceTy, Property};

    fn blame() -> Blame {
        Blame::new(BlameOp::Call, SiteId(4))
    }

    fn call(cx: &mut CheckCtx, fun: &TyRef, args: Vec<CallArg>) -> TyRef {
        let v = cx.fresh_var();
        let call = CallTy {
            args,
            ..CallTy::new(SiteId(4), [], Ty::var(v))
        };
        cx.flow(fun, &UseTy::Call(call), &blame());
        cx.resolve_to_term(v)
    }

    #[test]
    fn call_returns_result() {
        let mut cx = CheckCtx::default();
        let ret = call(&mut cx, &ty!(fn(Number) -> String), vec![CallArg::Arg(ty!(lit 1))]);
        assert_eq!(ret, ty!(String));
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn arity_is_checked() {
        let mut cx = CheckCtx::default();
        call(&mut cx, &ty!(fn(Number, Number) -> Void), vec![CallArg::Arg(ty!(Number))]);
        call(&mut cx, &ty!(fn() -> Void), vec![CallArg::Arg(ty!(Number))]);
        call(&mut cx, &ty!(fn(Number, (opt String)) -> Void), vec![CallArg::Arg(ty!(Number))]);
        let kinds: Vec<_> = cx.diagnostics().iter().map(|d| d.kind.name()).collect();
        assert_eq!(kinds, ["ArityMismatch", "ArityMismatch"]);
    }

    #[test]
    fn rest_params_take_extra_args() {
        let mut cx = CheckCtx::default();
        let fun: TyRef = Ty::Fun(FunTy::new([ty!(String)], ty!(Void)).with_rest(ty!(Number)).into()).into();
        call(
            &mut cx,
            &fun,
            vec![
                CallArg::Arg(ty!(String)),
                CallArg::Arg(ty!(lit 1)),
                CallArg::Arg(ty!(lit 2)),
            ],
        );
        assert!(cx.diagnostics().is_empty());
        call(&mut cx, &fun, vec![CallArg::Arg(ty!(String)), CallArg::Arg(ty!(Null))]);
        assert!(cx.diagnostics()[0]
            .blame
            .frames()
            .contains(&BlameFrame::FunRest));
    }

    #[test]
    fn array_spread_feeds_remaining_params() {
        let mut cx = CheckCtx::default();
        call(
            &mut cx,
            &ty!(fn(Number, Number) -> Void),
            vec![CallArg::Spread(ty!([Number]))],
        );
        assert!(cx.diagnostics().is_empty());
        call(
            &mut cx,
            &ty!(fn(Number, Number) -> Void),
            vec![CallArg::Spread(ty!([String]))],
        );
        // Both parameters fail on the same pair, reported once.
        assert_eq!(cx.diagnostics().len(), 1);
    }

    #[test]
    fn tuple_spread_is_positional() {
        let mut cx = CheckCtx::default();
        call(
            &mut cx,
            &ty!(fn(Number, String) -> Void),
            vec![CallArg::Spread(ty!(tuple [Number, String]))],
        );
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn non_functions_are_not_callable() {
        let mut cx = CheckCtx::default();
        call(&mut cx, &ty!(Number), vec![]);
        assert!(matches!(cx.diagnostics()[0].kind, DiagnosticKind::NotCallable));
    }

    #[test]
    fn construct_calls_constructor() {
        let mut cx = CheckCtx::default();
        let mut inst = InstanceTy::new(ClassId(0), "C");
        inst.proto
            .insert("constructor".into(), Property::read_only(ty!(fn(Number) -> Void)));
        let instance = Ty::instance(inst);
        let class = Ty::class_of(instance.clone());

        let v = cx.fresh_var();
        let new = CallTy::new(SiteId(5), [ty!(lit 3)], Ty::var(v));
        cx.flow(&class, &UseTy::Construct(new), &blame());
        assert!(cx.diagnostics().is_empty());
        assert_eq!(cx.resolve_to_term(v), instance);

        let bad = CallTy::new(SiteId(6), [ty!(String)], cx.fresh_var_ty());
        cx.flow(&class, &UseTy::Construct(bad), &blame());
        assert_eq!(cx.diagnostics().len(), 1);

        cx.flow(&instance, &UseTy::Construct(CallTy::new(SiteId(7), [], ty!(Mixed))), &blame());
        assert!(matches!(
            cx.diagnostics()[1].kind,
            DiagnosticKind::NotConstructable
        ));
    }
}
