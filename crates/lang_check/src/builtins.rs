// ==============================================================================
// Builtin Prototypes
// ==============================================================================
//
// Property reads on values that are not objects (`(1).toString`), on
// functions and on arrays are answered from these prototype tables. Array
// members mention the rigid parameter `T`, substituted with the element type
// of the array being read. Callers can replace any table.

use lang_ty::{FunTy, ObjTy, PrimitiveTy, Property, Subst, Ty, TyRef};
use rustc_hash::FxHashMap;

/// Name of the parameter standing for the element type in the array table.
pub const ARRAY_ELEM_PARAM: &str = "T";

#[derive(Debug, Clone)]
pub struct Builtins {
    primitives: FxHashMap<PrimitiveTy, ObjTy>,
    object: ObjTy,
    function: ObjTy,
    array: ObjTy,
}

/// Which prototype table to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoOwner {
    Primitive(PrimitiveTy),
    Object,
    Function,
    Array,
}

fn method(params: impl IntoIterator<Item = TyRef>, ret: TyRef) -> Property {
    Property::read_only(Ty::fun(params, ret))
}

fn table(entries: impl IntoIterator<Item = (&'static str, Property)>) -> ObjTy {
    entries
        .into_iter()
        .fold(ObjTy::inexact([]), |obj, (name, prop)| obj.with_prop(name, prop))
}

impl Default for Builtins {
    fn default() -> Self {
        let to_string = || method([], Ty::string());
        let elem = || Ty::param(ARRAY_ELEM_PARAM, Ty::mixed());

        let number = table([
            ("toString", method([Ty::optional(Ty::number())], Ty::string())),
            ("toFixed", method([Ty::optional(Ty::number())], Ty::string())),
            ("valueOf", method([], Ty::number())),
        ]);
        let string = table([
            ("toString", to_string()),
            ("length", Property::read_only(Ty::number())),
            ("charAt", method([Ty::number()], Ty::string())),
            ("indexOf", method([Ty::string()], Ty::number())),
            ("slice", method([Ty::optional(Ty::number()), Ty::optional(Ty::number())], Ty::string())),
            ("toUpperCase", method([], Ty::string())),
            ("toLowerCase", method([], Ty::string())),
            ("valueOf", method([], Ty::string())),
        ]);
        let boolean = table([
            ("toString", to_string()),
            ("valueOf", method([], Ty::boolean())),
        ]);
        let bigint = table([
            ("toString", to_string()),
            ("valueOf", method([], Ty::Primitive(PrimitiveTy::BigInt).into())),
        ]);
        let symbol = table([
            ("toString", to_string()),
            ("description", Property::read_only(Ty::optional(Ty::string()))),
        ]);

        let object = table([
            ("toString", to_string()),
            ("hasOwnProperty", method([Ty::mixed()], Ty::boolean())),
            ("valueOf", method([], Ty::mixed())),
        ]);
        let function = table([
            ("toString", to_string()),
            ("length", Property::read_only(Ty::number())),
            ("name", Property::read_only(Ty::string())),
            (
                "apply",
                Property::read_only(Ty::Fun(FunTy::new([], Ty::any()).with_rest(Ty::any()).into()).into()),
            ),
            (
                "call",
                Property::read_only(Ty::Fun(FunTy::new([], Ty::any()).with_rest(Ty::any()).into()).into()),
            ),
        ]);
        let array = table([
            ("length", Property::field(Ty::number())),
            (
                "push",
                Property::read_only(Ty::Fun(FunTy::new([], Ty::number()).with_rest(elem()).into()).into()),
            ),
            ("pop", method([], Ty::optional(elem()))),
            ("indexOf", method([elem()], Ty::number())),
            ("includes", method([elem()], Ty::boolean())),
            ("join", method([Ty::optional(Ty::string())], Ty::string())),
            ("slice", method([Ty::optional(Ty::number()), Ty::optional(Ty::number())], Ty::array(elem()))),
            ("toString", to_string()),
        ]);

        let primitives = [
            (PrimitiveTy::Number, number),
            (PrimitiveTy::String, string),
            (PrimitiveTy::Boolean, boolean),
            (PrimitiveTy::BigInt, bigint),
            (PrimitiveTy::Symbol, symbol),
        ]
        .into_iter()
        .collect();

        Self {
            primitives,
            object,
            function,
            array,
        }
    }
}

impl Builtins {
    fn table(&self, owner: ProtoOwner) -> Option<&ObjTy> {
        match owner {
            ProtoOwner::Primitive(p) => self.primitives.get(&p),
            ProtoOwner::Object => Some(&self.object),
            ProtoOwner::Function => Some(&self.function),
            ProtoOwner::Array => Some(&self.array),
        }
    }

    /// Look a property up in one table, falling back to the object table
    /// for everything but the object table itself.
    pub fn lookup(&self, owner: ProtoOwner, name: &str) -> Option<Property> {
        let own = self.table(owner).and_then(|t| t.get(name)).cloned();
        match (own, owner) {
            (Some(prop), _) => Some(prop),
            (None, ProtoOwner::Object) => None,
            (None, _) => self.object.get(name).cloned(),
        }
    }

    /// Look up an array member with `T` bound to `elem`.
    pub fn lookup_array(&self, elem: &TyRef, name: &str) -> Option<Property> {
        let prop = self.lookup(ProtoOwner::Array, name)?;
        let mut subst = Subst::new();
        subst.insert(ARRAY_ELEM_PARAM, elem.clone());
        Some(Property {
            ty: subst.apply(&prop.ty),
            polarity: prop.polarity,
        })
    }

    /// Every name reachable from `owner`, used for typo suggestions.
    pub fn names(&self, owner: ProtoOwner) -> Vec<smol_str::SmolStr> {
        let mut names: Vec<_> = self
            .table(owner)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        if owner != ProtoOwner::Object {
            names.extend(self.object.keys().cloned());
        }
        names
    }

    pub fn set_primitive_proto(&mut self, prim: PrimitiveTy, proto: ObjTy) {
        self.primitives.insert(prim, proto);
    }

    pub fn set_object_proto(&mut self, proto: ObjTy) {
        self.object = proto;
    }

    pub fn set_function_proto(&mut self, proto: ObjTy) {
        self.function = proto;
    }

    pub fn set_array_proto(&mut self, proto: ObjTy) {
        self.array = proto;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lang_ty::ty;

    #[test]
    fn primitive_lookup_falls_back_to_object() {
        let b = Builtins::default();
        let to_fixed = b.lookup(ProtoOwner::Primitive(PrimitiveTy::Number), "toFixed");
        assert!(to_fixed.is_some());
        let has_own = b.lookup(ProtoOwner::Primitive(PrimitiveTy::String), "hasOwnProperty");
        assert!(has_own.is_some());
        assert!(b.lookup(ProtoOwner::Object, "toFixed").is_none());
    }

    #[test]
    fn array_members_are_specialized() {
        let b = Builtins::default();
        let pop = b.lookup_array(&ty!(String), "pop").unwrap();
        assert_eq!(pop.ty, ty!(fn() -> (opt String)));
    }

    #[test]
    fn tables_can_be_replaced() {
        let mut b = Builtins::default();
        b.set_primitive_proto(PrimitiveTy::Boolean, ObjTy::inexact([("flip", ty!(fn() -> Boolean))]));
        assert!(b
            .lookup(ProtoOwner::Primitive(PrimitiveTy::Boolean), "flip")
            .is_some());
        assert!(b
            .lookup(ProtoOwner::Primitive(PrimitiveTy::Boolean), "valueOf")
            .is_none());
    }
}
