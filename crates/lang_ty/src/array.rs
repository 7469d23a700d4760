use derive_more::Debug;

use crate::{Polarity, Ty, TyRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrTy {
    #[debug("Array({_0:?})")]
    Array(TyRef),
    #[debug("ReadOnlyArray({_0:?})")]
    ReadOnly(TyRef),
    #[debug("{_0:?}")]
    Tuple(TupleTy),
}

impl ArrTy {
    /// The type of an arbitrary element read from the array.
    pub fn elem_ty(&self) -> TyRef {
        match self {
            ArrTy::Array(e) | ArrTy::ReadOnly(e) => e.clone(),
            ArrTy::Tuple(tup) => tup.general.clone(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, ArrTy::ReadOnly(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("{polarity:?}{ty:?} (optional: {optional})")]
pub struct TupleElement {
    pub ty: TyRef,
    pub optional: bool,
    pub polarity: Polarity,
}

impl TupleElement {
    pub fn required(ty: TyRef) -> Self {
        Self {
            ty,
            optional: false,
            polarity: Polarity::Neutral,
        }
    }

    pub fn optional(ty: TyRef) -> Self {
        Self {
            ty,
            optional: true,
            polarity: Polarity::Neutral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[debug("Tuple({elems:?})")]
pub struct TupleTy {
    pub elems: Vec<TupleElement>,
    /// Union of every element type, used when the tuple is read as an array.
    pub general: TyRef,
}

impl TupleTy {
    pub fn new(elems: impl IntoIterator<Item = TupleElement>) -> Self {
        let elems: Vec<TupleElement> = elems.into_iter().collect();
        let general = Ty::union(elems.iter().map(|e| {
            if e.optional {
                Ty::optional(e.ty.clone())
            } else {
                e.ty.clone()
            }
        }));
        Self { elems, general }
    }

    /// `(required, total)` element counts.
    pub fn arity(&self) -> (usize, usize) {
        let required = self.elems.iter().filter(|e| !e.optional).count();
        (required, self.elems.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty;

    #[test]
    fn tuple_general_is_union_of_elems() {
        let t = TupleTy::new([
            TupleElement::required(ty!(Number)),
            TupleElement::required(ty!(String)),
            TupleElement::required(ty!(Number)),
        ]);
        assert_eq!(t.general, ty!(union [Number, String]));
        assert_eq!(t.arity(), (3, 3));
    }

    #[test]
    fn empty_tuple_general_is_empty() {
        let t = TupleTy::new([]);
        assert_eq!(t.general, ty!(Empty));
    }

    #[test]
    fn optional_elements_count() {
        let t = TupleTy::new([
            TupleElement::required(ty!(Number)),
            TupleElement::optional(ty!(String)),
        ]);
        assert_eq!(t.arity(), (1, 2));
        assert!(t.general.admits_void());
    }
}
