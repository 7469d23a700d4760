use std::collections::BTreeMap;

use derive_more::Debug;
use smol_str::SmolStr;

use crate::{ClassId, Ty, TyRef};

/// Variance of a property, dictionary or type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Polarity {
    /// Read-only (covariant).
    #[debug("+")]
    Positive,
    /// Write-only (contravariant).
    #[debug("-")]
    Negative,
    /// Read-write (invariant).
    #[default]
    #[debug("")]
    Neutral,
}

impl Polarity {
    pub fn can_read(self) -> bool {
        matches!(self, Polarity::Positive | Polarity::Neutral)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Polarity::Negative | Polarity::Neutral)
    }

    /// Whether a property with this polarity may stand in for one declared
    /// with `upper`.
    pub fn compat(self, upper: Polarity) -> bool {
        match upper {
            Polarity::Positive => self.can_read(),
            Polarity::Negative => self.can_write(),
            Polarity::Neutral => self == Polarity::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{polarity:?}{ty:?}")]
pub struct Property {
    pub ty: TyRef,
    pub polarity: Polarity,
}

impl Property {
    pub fn field(ty: TyRef) -> Self {
        Self {
            ty,
            polarity: Polarity::Neutral,
        }
    }

    pub fn read_only(ty: TyRef) -> Self {
        Self {
            ty,
            polarity: Polarity::Positive,
        }
    }
}

/// An indexer: `{[key: K]: V}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("[{key:?}]: {polarity:?}{value:?}")]
pub struct Dict {
    pub key: TyRef,
    pub value: TyRef,
    pub polarity: Polarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjFlags {
    /// No properties beyond the listed ones.
    pub exact: bool,
    /// Properties may not be added after creation.
    pub sealed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("Obj({props:?}, dict: {dict:?}, {flags:?})")]
pub struct ObjTy {
    pub props: BTreeMap<SmolStr, Property>,
    pub dict: Option<Dict>,
    /// Call signature, for callable objects.
    pub call: Option<TyRef>,
    pub proto: Option<TyRef>,
    pub flags: ObjFlags,
}

impl Default for ObjTy {
    fn default() -> Self {
        Self {
            props: BTreeMap::new(),
            dict: None,
            call: None,
            proto: None,
            flags: ObjFlags {
                exact: false,
                sealed: true,
            },
        }
    }
}

impl ObjTy {
    fn from_fields<'a>(iter: impl IntoIterator<Item = (&'a str, TyRef)>, exact: bool) -> Self {
        let props = iter
            .into_iter()
            .map(|(name, ty)| (SmolStr::from(name), Property::field(ty)))
            .collect();
        Self {
            props,
            flags: ObjFlags {
                exact,
                sealed: true,
            },
            ..Default::default()
        }
    }

    pub fn exact<'a>(iter: impl IntoIterator<Item = (&'a str, TyRef)>) -> Self {
        Self::from_fields(iter, true)
    }

    pub fn inexact<'a>(iter: impl IntoIterator<Item = (&'a str, TyRef)>) -> Self {
        Self::from_fields(iter, false)
    }

    pub fn with_dict(mut self, key: TyRef, value: TyRef) -> Self {
        self.dict = Some(Dict {
            key,
            value,
            polarity: Polarity::Neutral,
        });
        self
    }

    pub fn with_prop(mut self, name: impl Into<SmolStr>, prop: Property) -> Self {
        self.props.insert(name.into(), prop);
        self
    }

    pub fn with_call(mut self, call: TyRef) -> Self {
        self.call = Some(call);
        self
    }

    pub fn with_proto(mut self, proto: TyRef) -> Self {
        self.proto = Some(proto);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Property> {
        self.props.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> {
        self.props.keys()
    }

    pub fn walk(&self, f: &mut impl FnMut(&Ty)) {
        self.props.values().for_each(|p| p.ty.walk(f));
        if let Some(dict) = &self.dict {
            dict.key.walk(f);
            dict.value.walk(f);
        }
        for t in [&self.call, &self.proto].into_iter().flatten() {
            t.walk(f);
        }
    }
}

/// An instance of a nominal class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{name}{targs:?}")]
pub struct InstanceTy {
    pub class_id: ClassId,
    pub name: SmolStr,
    pub targs: Vec<crate::TypeArg>,
    /// Fields stored on the instance itself.
    pub own: BTreeMap<SmolStr, Property>,
    /// Methods found through the prototype.
    pub proto: BTreeMap<SmolStr, Property>,
    /// The static side (the class object's own properties).
    pub statics: TyRef,
    pub super_: Option<TyRef>,
}

impl InstanceTy {
    pub fn new(class_id: ClassId, name: impl Into<SmolStr>) -> Self {
        Self {
            class_id,
            name: name.into(),
            targs: Vec::new(),
            own: BTreeMap::new(),
            proto: BTreeMap::new(),
            statics: Ty::obj(ObjTy::default()),
            super_: None,
        }
    }

    /// Look up a property on the instance, then its prototype.
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.own.get(key).or_else(|| self.proto.get(key))
    }
}
