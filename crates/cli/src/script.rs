// ==============================================================================
// Constraint Scripts
// ==============================================================================
//
// A script allocates `vars` fresh variables (`{ var = n }`) and runs its
// `[[step]]` entries in order through one context:
//
// ```toml
// vars = 2
//
// [[step]]
// kind = "flow"
// lower = { lit = "x" }
// upper = { var = 0 }
//
// [[step]]
// kind = "unify"
// a = { var = 0 }
// b = { var = 1 }
//
// [[step]]
// kind = "flow"
// lower = { var = 1 }
// use = { get_prop = { prop = "length", tout = "number" } }
//
// [[step]]
// kind = "resolve"
// var = 1
// term = "string"
// ```
//
// Terms are plain data, not a surface syntax: leaves are strings
// (`"number"`, `"mixed"`, ...), everything else is a single-key table.

use std::collections::BTreeMap;

use lang_check::{Blame, BlameOp, CallArg, CallTy, CheckCtx, SiteId, UseTy};
use lang_ty::{FunTy, ObjTy, Property, Ty, TyRef, TyVarId};
use miette::Diagnostic;
use serde::Deserialize;
use smol_str::SmolStr;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ScriptError {
    #[error("invalid script")]
    #[diagnostic(code(flowsolve::script::parse))]
    Parse(#[from] toml::de::Error),

    #[error("step {step} refers to variable {var}, but the script only declares {declared}")]
    #[diagnostic(
        code(flowsolve::script::unknown_var),
        help("raise `vars` at the top of the script")
    )]
    UnknownVar { step: usize, var: u32, declared: u32 },

    #[error("flow step {step} needs exactly one of `upper` or `use`")]
    #[diagnostic(code(flowsolve::script::flow_target))]
    FlowTarget { step: usize },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub vars: u32,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpec {
    Flow {
        lower: TermSpec,
        #[serde(default)]
        upper: Option<TermSpec>,
        #[serde(default, rename = "use")]
        use_: Option<UseSpec>,
    },
    Unify {
        a: TermSpec,
        b: TermSpec,
    },
    Resolve {
        var: u32,
        term: TermSpec,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TermSpec {
    Leaf(LeafSpec),
    Node(NodeSpec),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafSpec {
    Any,
    Mixed,
    Empty,
    Void,
    Null,
    Number,
    String,
    Boolean,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LitSpec {
    Bool(bool),
    Num(f64),
    Str(SmolStr),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSpec {
    Var(u32),
    Lit(LitSpec),
    Maybe(Box<TermSpec>),
    Optional(Box<TermSpec>),
    Union(Vec<TermSpec>),
    Inter(Vec<TermSpec>),
    Array(Box<TermSpec>),
    ReadOnlyArray(Box<TermSpec>),
    Tuple(Vec<TermSpec>),
    Fun {
        #[serde(default)]
        params: Vec<TermSpec>,
        #[serde(default)]
        rest: Option<Box<TermSpec>>,
        ret: Box<TermSpec>,
    },
    Object {
        #[serde(default)]
        props: BTreeMap<SmolStr, TermSpec>,
        #[serde(default)]
        exact: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseSpec {
    GetProp {
        prop: SmolStr,
        tout: TermSpec,
    },
    SetProp {
        prop: SmolStr,
        value: TermSpec,
    },
    Call {
        #[serde(default)]
        args: Vec<TermSpec>,
        tout: TermSpec,
    },
    MethodCall {
        name: SmolStr,
        #[serde(default)]
        args: Vec<TermSpec>,
        tout: TermSpec,
    },
    Construct {
        #[serde(default)]
        args: Vec<TermSpec>,
        tout: TermSpec,
    },
    GetElem {
        key: TermSpec,
        tout: TermSpec,
    },
    SetElem {
        key: TermSpec,
        value: TermSpec,
    },
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        Ok(toml::from_str(source)?)
    }
}

// ==============================================================================
// Running
// ==============================================================================

/// Runs a script's steps against one context.
pub struct ScriptRun<'a> {
    cx: &'a mut CheckCtx,
    vars: Vec<TyVarId>,
    step: usize,
}

impl<'a> ScriptRun<'a> {
    pub fn new(cx: &'a mut CheckCtx, script: &Script) -> Self {
        let vars = (0..script.vars).map(|_| cx.fresh_var()).collect();
        Self { cx, vars, step: 0 }
    }

    pub fn vars(&self) -> &[TyVarId] {
        &self.vars
    }

    pub fn run(&mut self, script: &Script) -> Result<(), ScriptError> {
        for (index, step) in script.steps.iter().enumerate() {
            self.step = index;
            self.run_step(step)?;
        }
        Ok(())
    }

    fn run_step(&mut self, step: &StepSpec) -> Result<(), ScriptError> {
        let site = self.cx.fresh_site();
        match step {
            StepSpec::Flow { lower, upper, use_ } => {
                let lower = self.term(lower)?;
                let upper = match (upper, use_) {
                    (Some(upper), None) => UseTy::Subtype(self.term(upper)?),
                    (None, Some(use_)) => self.use_ty(use_, site)?,
                    _ => return Err(ScriptError::FlowTarget { step: self.step }),
                };
                log::debug!("step {}: {lower} ~> {}", self.step, upper.describe());
                let blame = Blame::new(blame_op(&upper), site);
                self.cx.flow(&lower, &upper, &blame);
            }
            StepSpec::Unify { a, b } => {
                let (a, b) = (self.term(a)?, self.term(b)?);
                log::debug!("step {}: {a} = {b}", self.step);
                self.cx.unify(&a, &b, &Blame::new(BlameOp::Unify, site));
            }
            StepSpec::Resolve { var, term } => {
                let var = self.var(*var)?;
                let term = self.term(term)?;
                self.cx.resolve(var, &term, &Blame::new(BlameOp::Unify, site));
            }
        }
        Ok(())
    }

    fn var(&self, index: u32) -> Result<TyVarId, ScriptError> {
        self.vars
            .get(index as usize)
            .copied()
            .ok_or(ScriptError::UnknownVar {
                step: self.step,
                var: index,
                declared: self.vars.len() as u32,
            })
    }

    fn terms(&self, specs: &[TermSpec]) -> Result<Vec<TyRef>, ScriptError> {
        specs.iter().map(|spec| self.term(spec)).collect()
    }

    fn term(&self, spec: &TermSpec) -> Result<TyRef, ScriptError> {
        let node = match spec {
            TermSpec::Leaf(leaf) => return Ok(leaf_ty(*leaf)),
            TermSpec::Node(node) => node,
        };
        let ty = match node {
            NodeSpec::Var(index) => Ty::var(self.var(*index)?),
            NodeSpec::Lit(LitSpec::Bool(b)) => Ty::lit(*b),
            NodeSpec::Lit(LitSpec::Num(n)) => Ty::lit(*n),
            NodeSpec::Lit(LitSpec::Str(s)) => Ty::lit(s.clone()),
            NodeSpec::Maybe(inner) => Ty::maybe(self.term(inner)?),
            NodeSpec::Optional(inner) => Ty::optional(self.term(inner)?),
            NodeSpec::Union(members) => Ty::union(self.terms(members)?),
            NodeSpec::Inter(members) => Ty::inter(self.terms(members)?),
            NodeSpec::Array(elem) => Ty::array(self.term(elem)?),
            NodeSpec::ReadOnlyArray(elem) => Ty::ro_array(self.term(elem)?),
            NodeSpec::Tuple(elems) => Ty::tuple(self.terms(elems)?),
            NodeSpec::Fun { params, rest, ret } => {
                let mut fun = FunTy::new(self.terms(params)?, self.term(ret)?);
                if let Some(rest) = rest {
                    fun = fun.with_rest(self.term(rest)?);
                }
                Ty::Fun(fun.into()).into()
            }
            NodeSpec::Object { props, exact } => {
                let mut obj = if *exact {
                    ObjTy::exact([])
                } else {
                    ObjTy::inexact([])
                };
                for (name, prop) in props {
                    obj.props
                        .insert(name.clone(), Property::field(self.term(prop)?));
                }
                Ty::obj(obj)
            }
        };
        Ok(ty)
    }

    fn use_ty(&self, spec: &UseSpec, site: SiteId) -> Result<UseTy, ScriptError> {
        let call = |run: &Self, args: &[TermSpec], tout: &TermSpec| -> Result<CallTy, ScriptError> {
            Ok(CallTy {
                args: run.terms(args)?.into_iter().map(CallArg::Arg).collect(),
                ..CallTy::new(site, [], run.term(tout)?)
            })
        };
        let use_ty = match spec {
            UseSpec::GetProp { prop, tout } => UseTy::get_prop(prop.clone(), self.term(tout)?),
            UseSpec::SetProp { prop, value } => UseTy::set_prop(prop.clone(), self.term(value)?),
            UseSpec::Call { args, tout } => UseTy::Call(call(self, args, tout)?),
            UseSpec::MethodCall { name, args, tout } => UseTy::MethodCall {
                name: name.clone(),
                call: call(self, args, tout)?,
            },
            UseSpec::Construct { args, tout } => UseTy::Construct(call(self, args, tout)?),
            UseSpec::GetElem { key, tout } => UseTy::GetElem {
                key: self.term(key)?,
                tout: self.term(tout)?,
            },
            UseSpec::SetElem { key, value } => UseTy::SetElem {
                key: self.term(key)?,
                value: self.term(value)?,
            },
        };
        Ok(use_ty)
    }
}

fn leaf_ty(leaf: LeafSpec) -> TyRef {
    match leaf {
        LeafSpec::Any => Ty::any(),
        LeafSpec::Mixed => Ty::mixed(),
        LeafSpec::Empty => Ty::empty(),
        LeafSpec::Void => Ty::void(),
        LeafSpec::Null => Ty::null(),
        LeafSpec::Number => Ty::number(),
        LeafSpec::String => Ty::string(),
        LeafSpec::Boolean => Ty::boolean(),
    }
}

fn blame_op(upper: &UseTy) -> BlameOp {
    match upper {
        UseTy::GetProp { .. } | UseTy::GetElem { .. } => BlameOp::GetProperty,
        UseTy::SetProp { .. } | UseTy::SetElem { .. } => BlameOp::SetProperty,
        UseTy::Call(_) | UseTy::MethodCall { .. } => BlameOp::Call,
        UseTy::Construct(_) => BlameOp::Construct,
        _ => BlameOp::Assignment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn run(source: &str) -> (CheckCtx, Result<(), ScriptError>) {
        let script = Script::parse(source).expect("script should parse");
        let mut cx = CheckCtx::default();
        let result = ScriptRun::new(&mut cx, &script).run(&script);
        (cx, result)
    }

    #[test]
    fn parses_terms() {
        let script = Script::parse(indoc! {r#"
            vars = 1

            [[step]]
            kind = "flow"
            lower = { fun = { params = ["number", { lit = 1 }], ret = { maybe = "string" } } }
            upper = { object = { props = { a = { var = 0 } }, exact = true } }
        "#})
        .unwrap();
        assert_eq!(script.vars, 1);
        assert!(matches!(
            &script.steps[0],
            StepSpec::Flow { upper: Some(_), use_: None, .. }
        ));
    }

    #[test]
    fn runs_steps_in_order() {
        let (cx, result) = run(indoc! {r#"
            vars = 2

            [[step]]
            kind = "unify"
            a = { var = 0 }
            b = { var = 1 }

            [[step]]
            kind = "flow"
            lower = { lit = "x" }
            upper = { var = 0 }

            [[step]]
            kind = "flow"
            lower = { var = 1 }
            upper = "string"
        "#});
        result.unwrap();
        assert!(cx.diagnostics().is_empty());
        assert_eq!(cx.resolve_to_term(TyVarId(1)), Ty::lit("x"));
    }

    #[test]
    fn property_reads() {
        let (cx, result) = run(indoc! {r#"
            [[step]]
            kind = "flow"
            lower = { object = { props = { a = "number" } } }
            use = { get_prop = { prop = "b", tout = "mixed" } }
        "#});
        result.unwrap();
        assert_eq!(cx.diagnostics().len(), 1);
        assert_eq!(cx.diagnostics()[0].kind.name(), "MissingProperty");
    }

    #[test]
    fn unknown_var_is_an_error() {
        let (_, result) = run(indoc! {r#"
            vars = 1

            [[step]]
            kind = "resolve"
            var = 3
            term = "null"
        "#});
        assert!(matches!(
            result,
            Err(ScriptError::UnknownVar { step: 0, var: 3, declared: 1 })
        ));
    }

    #[test]
    fn flow_needs_one_target() {
        let (_, result) = run(indoc! {r#"
            [[step]]
            kind = "flow"
            lower = "null"
        "#});
        assert!(matches!(result, Err(ScriptError::FlowTarget { step: 0 })));
    }
}
