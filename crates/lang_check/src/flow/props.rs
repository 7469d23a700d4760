// ==============================================================================
// Property Access
// ==============================================================================
//
// Reads look through own properties, then the indexer, then the prototype
// chain, ending at the builtin tables. Writes only ever hit own properties or
// the indexer; prototype members are not writable through an instance.

use lang_ty::{may_overlap, InstanceTy, Literal, ObjTy, Property, Ty, TyRef};
use smol_str::SmolStr;

use crate::blame::{Blame, BlameFrame};
use crate::builtins::ProtoOwner;
use crate::constraints::{CallTy, UseTy};
use crate::diagnostic::{suggest_similar, DiagnosticKind};
use crate::{CheckCtx, FlowResult};

impl CheckCtx {
    pub(super) fn get_prop(
        &mut self,
        lower: &TyRef,
        prop: &SmolStr,
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let owner = match &**lower {
            Ty::Obj(obj) => return self.get_obj_prop(lower, obj, prop, tout, upper, blame),
            Ty::Instance(inst) => return self.get_instance_prop(lower, inst, prop, tout, upper, blame),
            Ty::Class(inner) => {
                return match &**inner {
                    Ty::Instance(inst) => self.flow_inner(&inst.statics, upper, blame),
                    _ => self.incompatible(lower, upper, blame),
                }
            }
            Ty::EnumObject(e) => {
                if e.members.contains(prop) {
                    let value: TyRef = Ty::EnumValue(e.clone()).into();
                    return self.flow_inner(&value, &UseTy::Subtype(tout.clone()), blame);
                }
                ProtoOwner::Object
            }
            Ty::Fun(_) => ProtoOwner::Function,
            Ty::Primitive(p) => ProtoOwner::Primitive(*p),
            Ty::Literal(l) => ProtoOwner::Primitive(l.primitive()),
            Ty::Array(_) => ProtoOwner::Array,
            _ => return self.incompatible(lower, upper, blame),
        };

        let found = match &**lower {
            Ty::Array(arr) => self.builtins.lookup_array(&arr.elem_ty(), prop),
            _ => self.builtins.lookup(owner, prop),
        };
        match found {
            Some(p) => self.read_prop(lower, &p, tout, upper, blame),
            None => {
                let names = self.builtins.names(owner);
                let suggestion = suggest_similar(prop, names.iter());
                self.missing(lower, prop, suggestion, upper, blame);
                Ok(())
            }
        }
    }

    fn get_obj_prop(
        &mut self,
        lower: &TyRef,
        obj: &ObjTy,
        prop: &SmolStr,
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        if let Some(p) = obj.props.get(prop) {
            return self.read_prop(lower, p, tout, upper, blame);
        }
        if let Some(p) = dict_prop(obj, prop) {
            return self.read_prop(lower, &p, tout, upper, blame);
        }
        if let Some(proto) = &obj.proto {
            return self.flow_inner(proto, upper, blame);
        }
        let shared = match obj.call {
            Some(_) => self.builtins.lookup(ProtoOwner::Function, prop),
            None => self.builtins.lookup(ProtoOwner::Object, prop),
        };
        if let Some(p) = shared {
            return self.read_prop(lower, &p, tout, upper, blame);
        }
        if !obj.flags.sealed {
            let unknown = if obj.flags.exact { Ty::void() } else { Ty::mixed() };
            return self.flow_inner(&unknown, &UseTy::Subtype(tout.clone()), blame);
        }
        let suggestion = suggest_similar(prop, obj.props.keys());
        self.missing(lower, prop, suggestion, upper, blame);
        Ok(())
    }

    fn get_instance_prop(
        &mut self,
        lower: &TyRef,
        inst: &InstanceTy,
        prop: &SmolStr,
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        if let Some(p) = inst.get(prop) {
            return self.read_prop(lower, p, tout, upper, blame);
        }
        if let Some(sup) = &inst.super_ {
            return self.flow_inner(sup, upper, blame);
        }
        if let Some(p) = self.builtins.lookup(ProtoOwner::Object, prop) {
            return self.read_prop(lower, &p, tout, upper, blame);
        }
        let suggestion = suggest_similar(prop, inst.own.keys().chain(inst.proto.keys()));
        self.missing(lower, prop, suggestion, upper, blame);
        Ok(())
    }

    fn read_prop(
        &mut self,
        lower: &TyRef,
        prop: &Property,
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        if !prop.polarity.can_read() {
            return self.incompatible(lower, upper, blame);
        }
        self.flow_inner(&prop.ty, &UseTy::Subtype(tout.clone()), blame)
    }

    pub(super) fn set_prop(
        &mut self,
        lower: &TyRef,
        prop: &SmolStr,
        value: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        match &**lower {
            Ty::Obj(obj) => {
                if let Some(p) = obj.props.get(prop) {
                    return self.write_prop(lower, prop, p, value, upper, blame);
                }
                if let Some(p) = dict_prop(obj, prop) {
                    return self.write_prop(lower, prop, &p, value, upper, blame);
                }
                if !obj.flags.sealed {
                    return Ok(());
                }
                let suggestion = suggest_similar(prop, obj.props.keys());
                self.missing(lower, prop, suggestion, upper, blame);
                Ok(())
            }
            Ty::Instance(inst) => {
                if let Some(p) = inst.get(prop) {
                    return self.write_prop(lower, prop, p, value, upper, blame);
                }
                if let Some(sup) = &inst.super_ {
                    return self.flow_inner(sup, upper, blame);
                }
                let suggestion = suggest_similar(prop, inst.own.keys());
                self.missing(lower, prop, suggestion, upper, blame);
                Ok(())
            }
            Ty::Class(inner) => match &**inner {
                Ty::Instance(inst) => self.flow_inner(&inst.statics, upper, blame),
                _ => self.incompatible(lower, upper, blame),
            },
            _ => self.incompatible(lower, upper, blame),
        }
    }

    fn write_prop(
        &mut self,
        lower: &TyRef,
        name: &SmolStr,
        prop: &Property,
        value: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let prop_blame = blame.push(BlameFrame::PropertyCompatibility { name: name.clone() });
        if !prop.polarity.can_write() {
            return self.incompatible(lower, upper, &prop_blame);
        }
        self.flow_inner(value, &UseTy::Subtype(prop.ty.clone()), &prop_blame)
    }

    /// Read the method, then call it with the receiver as `this`.
    pub(super) fn method_call(
        &mut self,
        lower: &TyRef,
        name: &SmolStr,
        call: &CallTy,
        blame: &Blame,
    ) -> FlowResult {
        let method = self.fresh_var_ty();
        self.flow_inner(lower, &UseTy::get_prop(name.clone(), method.clone()), blame)?;
        let call = CallTy {
            this: lower.clone(),
            ..call.clone()
        };
        self.flow_inner(&method, &UseTy::Call(call), blame)
    }

    /// `{a, ...rest} = lower`: everything readable except `excluded`.
    pub(super) fn obj_rest(
        &mut self,
        lower: &TyRef,
        excluded: &[SmolStr],
        tout: &TyRef,
        upper: &UseTy,
        blame: &Blame,
    ) -> FlowResult {
        let keep = |name: &SmolStr, prop: &Property| !excluded.contains(name) && prop.polarity.can_read();
        let rest = match &**lower {
            Ty::Empty => Ty::empty(),
            Ty::Obj(obj) => {
                let mut rest = ObjTy::clone(obj);
                rest.props.retain(|name, prop| keep(name, prop));
                rest.proto = None;
                rest.call = None;
                Ty::obj(rest)
            }
            Ty::Instance(inst) => {
                let props = inst
                    .own
                    .iter()
                    .filter(|(name, prop)| keep(name, prop))
                    .map(|(name, prop)| (name.clone(), prop.clone()))
                    .collect();
                Ty::obj(ObjTy {
                    props,
                    ..ObjTy::default()
                })
            }
            _ => return self.incompatible(lower, upper, blame),
        };
        self.flow_inner(&rest, &UseTy::Subtype(tout.clone()), blame)
    }

    pub(super) fn incompatible(&mut self, lower: &TyRef, upper: &UseTy, blame: &Blame) -> FlowResult {
        self.report_incompatible(lower, upper, blame);
        Ok(())
    }

    fn missing(
        &mut self,
        lower: &TyRef,
        name: &SmolStr,
        suggestion: Option<SmolStr>,
        upper: &UseTy,
        blame: &Blame,
    ) {
        let kind = DiagnosticKind::MissingProperty {
            name: name.clone(),
            suggestion,
        };
        self.report_use(kind, lower, upper, blame);
    }
}

/// The indexer as a property, when `name` may be one of its keys.
fn dict_prop(obj: &ObjTy, name: &SmolStr) -> Option<Property> {
    let dict = obj.dict.as_ref()?;
    may_overlap(&Ty::Literal(Literal::Str(name.clone())), &dict.key).then(|| Property {
        ty: dict.value.clone(),
        polarity: dict.polarity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::{BlameOp, SiteId};
    use lang_ty::{ty, ClassId, EnumId, EnumTy};
    use std::sync::Arc;

    fn blame() -> Blame {
        Blame::new(BlameOp::GetProperty, SiteId(1))
    }

    fn read(cx: &mut CheckCtx, obj: &TyRef, name: &str) -> TyRef {
        let v = cx.fresh_var();
        cx.flow(obj, &UseTy::get_prop(name, Ty::var(v)), &blame());
        cx.resolve_to_term(v)
    }

    #[test]
    fn own_property_read() {
        let mut cx = CheckCtx::default();
        assert_eq!(read(&mut cx, &ty!({ "a": String }), "a"), ty!(String));
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn indexer_read() {
        let mut cx = CheckCtx::default();
        let obj = Ty::obj(ObjTy::exact([]).with_dict(ty!(String), ty!(Number)));
        assert_eq!(read(&mut cx, &obj, "anything"), ty!(Number));
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn primitive_reads_builtin_table() {
        let mut cx = CheckCtx::default();
        let to_fixed = read(&mut cx, &ty!(lit 1), "toFixed");
        assert!(matches!(*to_fixed, Ty::Fun(_)));
        assert!(cx.diagnostics().is_empty());

        read(&mut cx, &ty!(Number), "toFixd");
        let diags = cx.diagnostics();
        assert!(matches!(
            &diags[0].kind,
            DiagnosticKind::MissingProperty { suggestion: Some(s), .. } if s == "toFixed"
        ));
    }

    #[test]
    fn array_members_see_element_type() {
        let mut cx = CheckCtx::default();
        let pop = read(&mut cx, &ty!([String]), "pop");
        let Ty::Fun(f) = &*pop else {
            panic!("expected a function, got {pop}")
        };
        assert_eq!(f.ret, ty!(opt String));
    }

    #[test]
    fn unsealed_object_reads_are_open() {
        let mut cx = CheckCtx::default();
        let mut obj = ObjTy::inexact([]);
        obj.flags.sealed = false;
        assert_eq!(read(&mut cx, &Ty::obj(obj), "x"), ty!(Mixed));
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn reads_walk_the_superclass() {
        let mut cx = CheckCtx::default();
        let mut base = InstanceTy::new(ClassId(0), "Base");
        base.proto.insert("m".into(), Property::read_only(ty!(fn() -> Number)));
        let derived = InstanceTy {
            super_: Some(Ty::instance(base)),
            ..InstanceTy::new(ClassId(1), "Derived")
        };
        let m = read(&mut cx, &Ty::instance(derived), "m");
        assert_eq!(m, ty!(fn() -> Number));
    }

    #[test]
    fn enum_members() {
        let mut cx = CheckCtx::default();
        let e = Arc::new(EnumTy {
            id: EnumId(0),
            name: "E".into(),
            members: ["A", "B"].into_iter().map(SmolStr::from).collect(),
            representation: Ty::string(),
        });
        let obj: TyRef = Ty::EnumObject(e.clone()).into();
        let a = read(&mut cx, &obj, "A");
        assert_eq!(a, TyRef::from(Ty::EnumValue(e)));
        let v = cx.fresh_var();
        cx.flow(&a, &UseTy::get_prop("length", Ty::var(v)), &blame());
        assert_eq!(cx.resolve_to_term(v), ty!(Number));
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn read_only_props_reject_writes() {
        let mut cx = CheckCtx::default();
        let obj = Ty::obj(ObjTy::exact([]).with_prop("a", Property::read_only(ty!(Number))));
        cx.flow(&obj, &UseTy::set_prop("a", ty!(lit 1)), &blame());
        assert_eq!(cx.diagnostics().len(), 1);

        cx.take_diagnostics();
        cx.flow(&ty!({ "a": Number }), &UseTy::set_prop("a", ty!(lit 1)), &blame());
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn method_call_binds_this() {
        let mut cx = CheckCtx::default();
        let v = cx.fresh_var();
        let call = CallTy::new(SiteId(2), [], Ty::var(v));
        cx.flow(
            &ty!(String),
            &UseTy::MethodCall {
                name: "toUpperCase".into(),
                call,
            },
            &blame(),
        );
        assert_eq!(cx.resolve_to_term(v), ty!(String));
        assert!(cx.diagnostics().is_empty());
    }

    #[test]
    fn object_rest_drops_excluded() {
        let mut cx = CheckCtx::default();
        let v = cx.fresh_var();
        cx.flow(
            &ty!({ "a": Number, "b": String }),
            &UseTy::ObjRest {
                excluded: vec!["a".into()],
                tout: Ty::var(v),
            },
            &blame(),
        );
        assert_eq!(cx.resolve_to_term(v), ty!({ "b": String }));
    }
}
