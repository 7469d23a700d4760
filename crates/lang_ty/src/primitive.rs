use derive_more::Debug;
use ordered_float::OrderedFloat;
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTy {
    Number,
    String,
    Boolean,
    BigInt,
    Symbol,
}

impl PrimitiveTy {
    /// Name of the builtin wrapper whose prototype supplies this primitive's
    /// methods.
    pub fn box_name(&self) -> &'static str {
        match self {
            PrimitiveTy::Number => "Number",
            PrimitiveTy::String => "String",
            PrimitiveTy::Boolean => "Boolean",
            PrimitiveTy::BigInt => "BigInt",
            PrimitiveTy::Symbol => "Symbol",
        }
    }
}

/// A singleton type inhabited by exactly one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    #[debug("{_0:?}")]
    Str(SmolStr),
    #[debug("{_0}")]
    Num(OrderedFloat<f64>),
    #[debug("{_0}")]
    Bool(bool),
    #[debug("{_0}n")]
    BigInt(i64),
}

impl Literal {
    /// The primitive every value of this literal belongs to.
    pub fn primitive(&self) -> PrimitiveTy {
        match self {
            Literal::Str(_) => PrimitiveTy::String,
            Literal::Num(_) => PrimitiveTy::Number,
            Literal::Bool(_) => PrimitiveTy::Boolean,
            Literal::BigInt(_) => PrimitiveTy::BigInt,
        }
    }

    /// Interpret the literal as an array index, if it is a non-negative
    /// integral number.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Literal::Num(n) if n.0 >= 0.0 && n.0.fract() == 0.0 => Some(n.0 as usize),
            _ => None,
        }
    }

    /// Interpret the literal as a property key.
    pub fn as_key(&self) -> Option<SmolStr> {
        match self {
            Literal::Str(s) => Some(s.clone()),
            Literal::Num(n) if n.0.fract() == 0.0 => Some(SmolStr::from(format!("{}", n.0 as i64))),
            _ => None,
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.into())
    }
}

impl From<SmolStr> for Literal {
    fn from(value: SmolStr) -> Self {
        Literal::Str(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Num(OrderedFloat(value))
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Num(OrderedFloat(value as f64))
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_primitives() {
        assert_eq!(Literal::from("x").primitive(), PrimitiveTy::String);
        assert_eq!(Literal::from(1).primitive(), PrimitiveTy::Number);
        assert_eq!(Literal::from(true).primitive(), PrimitiveTy::Boolean);
    }

    #[test]
    fn literal_index_and_key() {
        assert_eq!(Literal::from(2).as_index(), Some(2));
        assert_eq!(Literal::from(1.5).as_index(), None);
        assert_eq!(Literal::from(-1).as_index(), None);
        assert_eq!(Literal::from(3).as_key().as_deref(), Some("3"));
        assert_eq!(Literal::from("foo").as_key().as_deref(), Some("foo"));
    }
}
