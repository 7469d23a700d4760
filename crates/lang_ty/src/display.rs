use std::fmt;

use itertools::join;

use crate::{ArrTy, Destructor, Literal, Polarity, PrimitiveTy, Ty, TyRef};

// Flow-like surface syntax, used in diagnostics and by the CLI.

impl fmt::Display for TyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl fmt::Display for PrimitiveTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveTy::Number => "number",
            PrimitiveTy::String => "string",
            PrimitiveTy::Boolean => "boolean",
            PrimitiveTy::BigInt => "bigint",
            PrimitiveTy::Symbol => "symbol",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Num(n) => write!(f, "{}", n.0),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::BigInt(n) => write!(f, "{n}n"),
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Positive => f.write_str("+"),
            Polarity::Negative => f.write_str("-"),
            Polarity::Neutral => Ok(()),
        }
    }
}

/// Wrap terms that would otherwise bind loosely inside a postfix or
/// join position.
struct Atom<'a>(&'a Ty);

impl fmt::Display for Atom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Ty::Union(_) | Ty::Inter(_) | Ty::Fun(_) | Ty::Poly(_) => write!(f, "({})", self.0),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(id) => write!(f, "#{}", id.0),
            Ty::Any(_) => f.write_str("any"),
            Ty::Mixed => f.write_str("mixed"),
            Ty::Empty => f.write_str("empty"),
            Ty::Void => f.write_str("void"),
            Ty::Null => f.write_str("null"),
            Ty::Primitive(p) => write!(f, "{p}"),
            Ty::Literal(l) => write!(f, "{l}"),
            Ty::Maybe(t) => write!(f, "?{}", Atom(t)),
            Ty::Optional(t) => write!(f, "{} | void", Atom(t)),
            Ty::Union(ms) => f.write_str(&join(ms.iter().map(|m| Atom(m).to_string()), " | ")),
            Ty::Inter(ms) => f.write_str(&join(ms.iter().map(|m| Atom(m).to_string()), " & ")),
            Ty::Fun(fun) => {
                let mut params: Vec<String> = fun
                    .params
                    .iter()
                    .map(|p| match &p.name {
                        Some(name) => format!("{name}: {}", p.ty),
                        None => p.ty.to_string(),
                    })
                    .collect();
                if let Some(rest) = &fun.rest {
                    let name = rest.name.as_deref().unwrap_or("rest");
                    params.push(format!("...{name}: Array<{}>", rest.ty));
                }
                write!(f, "({}) => {}", params.join(", "), fun.ret)
            }
            Ty::Obj(obj) => {
                let mut fields: Vec<String> = obj
                    .props
                    .iter()
                    .map(|(k, p)| format!("{}{k}: {}", p.polarity, p.ty))
                    .collect();
                if let Some(dict) = &obj.dict {
                    fields.push(format!("{}[{}]: {}", dict.polarity, dict.key, dict.value));
                }
                if let Some(call) = &obj.call {
                    fields.push(format!("(call): {call}"));
                }
                if !obj.flags.exact {
                    fields.push("...".to_string());
                }
                write!(f, "{{{}}}", fields.join(", "))
            }
            Ty::Instance(inst) => {
                f.write_str(&inst.name)?;
                if !inst.targs.is_empty() {
                    let targs = join(inst.targs.iter().map(|a| a.ty.to_string()), ", ");
                    write!(f, "<{targs}>")?;
                }
                Ok(())
            }
            Ty::Class(inst) => write!(f, "Class<{inst}>"),
            Ty::Poly(poly) => {
                let tparams = join(
                    poly.tparams.iter().map(|tp| match &*tp.bound {
                        Ty::Mixed => format!("{}{}", tp.polarity, tp.name),
                        _ => format!("{}{}: {}", tp.polarity, tp.name, tp.bound),
                    }),
                    ", ",
                );
                write!(f, "<{tparams}>{}", poly.body)
            }
            Ty::TypeApp(app) => {
                let targs = join(app.targs.iter().map(|t| t.to_string()), ", ");
                write!(f, "{}<{targs}>", Atom(&app.ctor))
            }
            Ty::Param(p) => f.write_str(&p.name),
            Ty::Opaque(op) => {
                f.write_str(&op.name)?;
                if !op.targs.is_empty() {
                    let targs = join(op.targs.iter().map(|a| a.ty.to_string()), ", ");
                    write!(f, "<{targs}>")?;
                }
                Ok(())
            }
            Ty::Array(arr) => match &**arr {
                ArrTy::Array(e) => write!(f, "Array<{e}>"),
                ArrTy::ReadOnly(e) => write!(f, "$ReadOnlyArray<{e}>"),
                ArrTy::Tuple(tup) => {
                    let elems = join(
                        tup.elems.iter().map(|e| {
                            let opt = if e.optional { "?" } else { "" };
                            format!("{}{}{opt}", e.polarity, e.ty)
                        }),
                        ", ",
                    );
                    write!(f, "[{elems}]")
                }
            },
            Ty::EnumValue(e) => f.write_str(&e.name),
            Ty::EnumObject(e) => write!(f, "typeof {}", e.name),
            Ty::Eval(ev) => match &ev.destructor {
                Destructor::PropertyType(name) => write!(f, "{}[{name:?}]", Atom(&ev.target)),
                Destructor::ElementType(k) => write!(f, "{}[{k}]", Atom(&ev.target)),
                Destructor::NonMaybe => write!(f, "$NonMaybeType<{}>", ev.target),
                Destructor::ReadOnly => write!(f, "$ReadOnly<{}>", ev.target),
                Destructor::Partial => write!(f, "Partial<{}>", ev.target),
                Destructor::Values => write!(f, "$Values<{}>", ev.target),
                Destructor::Spread(rest) => {
                    let mut parts = vec![format!("...{}", ev.target)];
                    parts.extend(rest.iter().map(|t| format!("...{t}")));
                    write!(f, "{{{}}}", parts.join(", "))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{ty, ObjTy, Ty};

    #[test]
    fn display_basics() {
        assert_eq!(ty!(Number).to_string(), "number");
        assert_eq!(ty!(lit "a").to_string(), "\"a\"");
        assert_eq!(ty!((# 4)).to_string(), "#4");
        assert_eq!(ty!(? String).to_string(), "?string");
        assert_eq!(ty!(union [Number, Null]).to_string(), "number | null");
    }

    #[test]
    fn display_structures() {
        assert_eq!(
            ty!(fn(Number, [String]) -> Void).to_string(),
            "(number, Array<string>) => void"
        );
        assert_eq!(ty!({ "a": Number }).to_string(), "{a: number}");
        assert_eq!(ty!(inexact { "a": Number }).to_string(), "{a: number, ...}");
        assert_eq!(ty!(tuple [Number, String]).to_string(), "[number, string]");
        assert_eq!(
            Ty::obj(ObjTy::exact([]).with_dict(ty!(String), ty!(Boolean))).to_string(),
            "{[string]: boolean}"
        );
    }

    #[test]
    fn display_parenthesizes_functions_in_unions() {
        let t = ty!(union [(fn() -> Void), Null]);
        assert_eq!(t.to_string(), "(() => void) | null");
    }
}
