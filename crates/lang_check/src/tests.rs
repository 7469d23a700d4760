use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use indoc::indoc;
use lang_ty::{ty, Ty, TyRef};

use crate::constraints::{CallArg, CallTy, SpreadResolve, SpreadTarget, UseTy};
use crate::kit::{Kit, KitRef};
use crate::{Blame, BlameFrame, BlameOp, CheckCtx, DiagnosticKind, FlowResult, SiteId, SolverConfig};

fn blame() -> Blame {
    Blame::new(BlameOp::Assignment, SiteId(1))
}

fn kinds(cx: &CheckCtx) -> Vec<&'static str> {
    cx.diagnostics().iter().map(|d| d.kind.name()).collect()
}

#[track_caller]
fn expect_subtype(lower: &TyRef, upper: &TyRef, expected: &[&str]) {
    let mut cx = CheckCtx::default();
    cx.subtype(lower, upper, &blame());
    assert_eq!(kinds(&cx), expected, "{lower} <: {upper}");
}

macro_rules! test_case {
    ($name:ident, $lower:tt <: $upper:tt) => {
        #[test]
        fn $name() {
            expect_subtype(&ty!($lower), &ty!($upper), &[]);
        }
    };
    ($name:ident, $lower:tt <: $upper:tt, [$($kind:literal),+]) => {
        #[test]
        fn $name() {
            expect_subtype(&ty!($lower), &ty!($upper), &[$($kind),+]);
        }
    };
}

// ==============================================================================
// Subtyping
// ==============================================================================

test_case!(literal_widens, (lit "x") <: String);
test_case!(maybe_accepts_null, Null <: (? Number));
test_case!(optional_rejects_null, Null <: (opt Number), ["Incompatibility"]);
test_case!(union_upper, (lit 1) <: (union [String, Number]));
test_case!(
    union_lower_distributes,
    (union [(lit 1), (lit 2)]) <: Number
);
test_case!(
    function_params_are_contravariant,
    (fn(Number) -> (lit "a")) <: (fn((lit 1)) -> String)
);
test_case!(
    function_params_are_not_covariant,
    (fn((lit 1)) -> String) <: (fn(Number) -> String),
    ["Incompatibility"]
);
test_case!(
    object_width,
    (inexact { "a": Number, "b": String }) <: (inexact { "a": Number })
);
test_case!(
    object_missing_property,
    (inexact { "a": Number }) <: (inexact { "a": Number, "b": String }),
    ["MissingProperty"]
);
test_case!(
    mutable_property_is_invariant,
    { "a": (lit 1) } <: { "a": Number },
    ["Incompatibility"]
);
test_case!(tuple_widens_to_array, (tuple [Number, Number]) <: [Number]);
test_case!(array_is_invariant, [(lit 1)] <: [Number], ["Incompatibility"]);
test_case!(any_flows_anywhere, Any <: (fn(String) -> { "a": Number }));
test_case!(everything_flows_to_mixed, (tuple [Null, String]) <: Mixed);
test_case!(empty_flows_anywhere, Empty <: Number);

// ==============================================================================
// Testable properties
// ==============================================================================

fn sample_terms() -> Vec<TyRef> {
    vec![
        ty!(Number),
        ty!((lit "x")),
        ty!(? String),
        ty!(union [Number, Null]),
        ty!(fn(Number, String) -> Boolean),
        ty!({ "a": [Number], "b": (tuple [String, Null]) }),
        ty!(inexact { "f": (fn() -> Void) }),
        ty!(inter [(inexact { "a": Number }), (inexact { "b": String })]),
    ]
}

#[test]
fn reflexivity() {
    // Built twice so the pointer fast path does not apply.
    for (lower, upper) in sample_terms().iter().zip(&sample_terms()) {
        expect_subtype(lower, upper, &[]);
    }
}

#[test]
fn bound_insertion_is_idempotent() {
    let mut cx = CheckCtx::default();
    let v = cx.fresh_var();
    cx.add_lower_bound(v, &ty!(Number), &blame());
    cx.add_lower_bound(v, &ty!(Number), &blame());
    assert_eq!(cx.lower_bounds(v), vec![ty!(Number)]);
}

#[test]
fn bounds_close_transitively() {
    let mut cx = CheckCtx::default();
    let v1 = cx.fresh_var();
    let v2 = cx.fresh_var();
    let v3 = cx.fresh_var();
    cx.link(v1, v2, &blame());
    cx.link(v2, v3, &blame());
    cx.add_lower_bound(v1, &ty!(String), &blame());
    assert!(cx.lower_bounds(v3).contains(&ty!(String)));

    // Order does not matter: an upper bound placed on the end of the chain
    // sees the lower bound placed on its start.
    cx.subtype(&Ty::var(v3), &ty!(Number), &blame());
    assert_eq!(kinds(&cx), ["Incompatibility"]);
}

#[test]
fn union_distribution_names_the_failing_member() {
    let mut cx = CheckCtx::default();
    cx.subtype(&ty!(union [Number, String]), &ty!(Number), &blame());
    let diags = cx.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(
        diags[0].blame.last_frame(),
        Some(&BlameFrame::UnionMember { index: 1 })
    );
}

#[test]
fn speculation_is_isolated() {
    let mut cx = CheckCtx::default();
    let v = cx.fresh_var();
    let outcome = cx.speculate(|cx| {
        cx.flow_inner(&ty!(Number), &UseTy::Subtype(Ty::var(v)), &blame())?;
        cx.flow_inner(&ty!(Number), &UseTy::Subtype(ty!(String)), &blame())
    });
    assert!(!outcome.is_success());
    assert!(cx.lower_bounds(v).is_empty());
    assert!(cx.diagnostics().is_empty());

    // The same pair outside the speculation is checked for real.
    cx.subtype(&ty!(Number), &ty!(String), &blame());
    assert_eq!(kinds(&cx), ["Incompatibility"]);
}

/// Feeds `[lower]` back into itself, so every run is one level deeper.
struct Nest;

impl Kit for Nest {
    fn name(&self) -> &str {
        "nest"
    }

    fn run(&self, cx: &mut CheckCtx, lower: &TyRef, blame: &Blame, tout: &TyRef) -> FlowResult {
        let deeper = UseTy::Kit {
            kit: KitRef::new(Nest),
            tout: tout.clone(),
        };
        cx.flow_inner(&Ty::array(lower.clone()), &deeper, blame)
    }
}

#[test]
fn recursion_limit_is_reported_once() {
    let config = SolverConfig::from_toml_str(indoc! {"
        [solver]
        max_depth = 16
    "})
    .unwrap();
    let mut cx = CheckCtx::new(config);
    let tout = cx.fresh_var_ty();
    let nest = UseTy::Kit {
        kit: KitRef::new(Nest),
        tout,
    };
    cx.flow(&ty!(Number), &nest, &blame());
    assert_eq!(kinds(&cx), ["RecursionLimitExceeded"]);
    assert!(matches!(
        cx.diagnostics()[0].kind,
        DiagnosticKind::RecursionLimitExceeded { limit: 16 }
    ));

    // Still usable.
    cx.subtype(&ty!(Number), &ty!(Number), &blame());
    cx.subtype(&ty!(Null), &ty!(Number), &blame());
    assert_eq!(kinds(&cx), ["RecursionLimitExceeded", "Incompatibility"]);
}

#[test]
fn growing_array_converges() {
    // A = []; loop { A = [...A, 1] }
    let mut cx = CheckCtx::default();
    let a = cx.fresh_var();
    let site = cx.fresh_site();
    cx.add_lower_bound(a, &Ty::tuple([]), &blame());

    let grow = UseTy::ResolveSpread(SpreadResolve {
        site,
        resolved: Vec::new(),
        todo: vec![CallArg::Arg(ty!(lit 1))],
        target: SpreadTarget::Array { tout: Ty::var(a) },
    });
    cx.add_upper_bound(a, &grow, &blame());

    let lowers = cx.lower_bounds(a);
    assert!(lowers.contains(&ty!(tuple [(lit 1)])));
    assert!(lowers.contains(&ty!([(lit 1)])));
    assert_eq!(lowers.len(), 3);
    assert!(cx.stats().expansion_visits <= 3, "{:?}", cx.stats());
    assert!(cx.diagnostics().is_empty());
}

#[test]
fn independent_spread_operands_are_all_checked() {
    // f(...x) where x is one of several unrelated tuples.
    let mut cx = CheckCtx::default();
    let x = cx.fresh_var();
    for tuple in [ty!(tuple [Number]), ty!(tuple [(lit 1)]), ty!(tuple [String])] {
        cx.add_lower_bound(x, &tuple, &blame());
    }

    let site = cx.fresh_site();
    let call = CallTy {
        args: vec![CallArg::Spread(Ty::var(x))],
        ..CallTy::new(site, [], ty!(Mixed))
    };
    cx.flow(&ty!(fn(Number) -> Void), &UseTy::Call(call), &blame());
    assert_eq!(kinds(&cx), ["Incompatibility"]);
    assert_eq!(cx.diagnostics()[0].lower, "string");
}

fn nested_read_only(depth: usize, leaf: TyRef) -> TyRef {
    (0..depth).fold(leaf, |inner, _| Ty::ro_array(inner))
}

#[test]
fn aborted_trace_is_not_cached() {
    let config = SolverConfig::default().with_max_depth(16);
    let mut cx = CheckCtx::new(config);
    cx.subtype(
        &nested_read_only(30, ty!(lit 1)),
        &nested_read_only(30, ty!(Number)),
        &blame(),
    );
    assert_eq!(kinds(&cx), ["RecursionLimitExceeded"]);

    // Its inner pairs were on the aborted trace and are checked afresh.
    cx.subtype(
        &nested_read_only(20, ty!(lit 1)),
        &nested_read_only(20, ty!(Number)),
        &blame(),
    );
    assert_eq!(kinds(&cx), ["RecursionLimitExceeded", "RecursionLimitExceeded"]);

    // Shallow enough to finish: no stale entries hide the failure.
    cx.subtype(
        &nested_read_only(10, ty!(String)),
        &nested_read_only(10, ty!(Number)),
        &blame(),
    );
    assert_eq!(
        kinds(&cx),
        ["RecursionLimitExceeded", "RecursionLimitExceeded", "Incompatibility"]
    );
}

#[test]
fn cancellation_stops_the_unit() {
    let flag = Arc::new(AtomicBool::new(true));
    let mut cx = CheckCtx::default().with_cancel_flag(flag);
    cx.subtype(&ty!(Null), &ty!(Number), &blame());
    cx.subtype(&ty!(Null), &ty!(String), &blame());
    assert!(cx.is_cancelled());
    assert_eq!(kinds(&cx), ["Cancelled"]);
}

// ==============================================================================
// Scenarios
// ==============================================================================

#[test]
fn unified_vars_share_bounds() {
    let mut cx = CheckCtx::default();
    let a = cx.fresh_var();
    let b = cx.fresh_var();
    cx.unify(&Ty::var(a), &Ty::var(b), &blame());
    cx.subtype(&ty!(lit "x"), &Ty::var(a), &blame());
    cx.subtype(&Ty::var(b), &ty!(String), &blame());
    assert!(cx.diagnostics().is_empty());
    assert!(cx.same_class(a, b));

    cx.subtype(&Ty::var(b), &ty!(Number), &blame());
    assert_eq!(kinds(&cx), ["Incompatibility"]);
}

#[test]
fn intersection_answers_property_read() {
    let mut cx = CheckCtx::default();
    let out = cx.fresh_var();
    let both = ty!(inter [(inexact { "foo": Number }), (inexact { "bar": String })]);
    cx.flow(&both, &UseTy::get_prop("foo", Ty::var(out)), &blame());
    assert!(cx.diagnostics().is_empty());
    assert_eq!(cx.resolve_to_term(out), ty!(Number));
}

#[test]
fn union_property_read_checks_every_member() {
    let mut cx = CheckCtx::default();
    let out = cx.fresh_var();
    let either = ty!(union [Number, String]);
    cx.flow(&either, &UseTy::get_prop("toString", Ty::var(out)), &blame());
    assert!(cx.diagnostics().is_empty());
    assert!(!cx.lower_bounds(out).is_empty());

    let fixed = cx.fresh_var_ty();
    cx.flow(&either, &UseTy::get_prop("toFixed", fixed), &blame());
    assert_eq!(kinds(&cx), ["MissingProperty"]);
}

#[test]
fn failed_overloads_report_the_set() {
    let mut cx = CheckCtx::default();
    let overloads = ty!(inter [(fn(Number) -> String), (fn(String) -> Number)]);
    let call = CallTy::new(SiteId(2), [ty!(Boolean)], cx.fresh_var_ty());
    cx.flow(&overloads, &UseTy::Call(call), &blame());

    let diags = cx.diagnostics();
    assert_eq!(diags.len(), 1);
    let DiagnosticKind::SpeculationExhausted { branches } = &diags[0].kind else {
        panic!("expected an exhausted overload set, got {}", diags[0].kind.name());
    };
    assert_eq!(branches.len(), 2);
    assert!(branches.iter().all(|b| !b.is_empty()));
}

#[test]
fn matching_overload_is_chosen() {
    let mut cx = CheckCtx::default();
    let overloads = ty!(inter [(fn(Number) -> String), (fn(String) -> Number)]);
    let out = cx.fresh_var();
    let call = CallTy::new(SiteId(2), [ty!(lit "s")], Ty::var(out));
    cx.flow(&overloads, &UseTy::Call(call), &blame());
    assert!(cx.diagnostics().is_empty());
    assert_eq!(cx.resolve_to_term(out), ty!(Number));
}

#[test]
fn diagnostics_do_not_stop_the_unit() {
    let mut cx = CheckCtx::default();
    let v = cx.fresh_var();
    cx.subtype(&ty!(Null), &ty!(Number), &blame());
    cx.subtype(&ty!(String), &Ty::var(v), &blame());
    cx.subtype(&ty!(Boolean), &ty!(String), &blame());
    assert_eq!(kinds(&cx), ["Incompatibility", "Incompatibility"]);
    assert_eq!(cx.resolve_to_term(v), ty!(String));
}

#[test]
fn resolved_vars_finalize() {
    let mut cx = CheckCtx::default();
    let v = cx.fresh_var();
    cx.subtype(&ty!(lit 1), &Ty::var(v), &blame());
    cx.resolve(v, &ty!(Number), &blame());
    assert!(cx.diagnostics().is_empty());
    cx.finalize();
    assert!(matches!(cx.var_state(v), crate::VarState::FullyResolved(t) if *t == ty!(Number)));
}
