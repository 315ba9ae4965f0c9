//! Integration tests for the generation pipeline: unit structure,
//! guard ordering, zero-fill boundaries, and the layered buffer
//! contract.

use recurgen::catalog;
use recurgen::codegen::{
    DispatcherGenerator, LayeredGenerator, Optimization, PerValueGenerator,
};
use recurgen::dsl::{DslPrinter, RuleParser};
use recurgen::eval::{EvalEnv, Evaluator};
use recurgen::recurrence::Recurrence;

fn fib() -> Recurrence {
    Recurrence::new("Fib", &["n"], &["x"])
        .validity(&["n >= 0"])
        .unwrap()
        .max_index("n", 5)
        .unwrap()
        .base(&[("n", 0)], 1.0)
        .unwrap()
        .base(&[("n", 1)], "x")
        .unwrap()
        .rule("n > 1", "x * E[n-1] + E[n-2]")
        .unwrap()
}

#[test]
fn parser_round_trip_reproduces_structure() {
    let rec = catalog::hermite_e().unwrap();
    let parser = rec.parser();
    let printer = DslPrinter::new(&rec.indices, &rec.accessor);

    let source = "aAB * E[nA-1, nB, t-1] + PA * E[nA-1, nB, t] + (t + 1) * E[nA-1, nB, t+1]";
    let expr = parser.parse_expression(source).unwrap();
    let reparsed = parser.parse_expression(&printer.print(&expr)).unwrap();
    assert_eq!(expr, reparsed);
}

#[test]
fn generated_unit_has_contracted_structure() {
    // Header → primary fallback → base cases → rules (priority order)
    // → footer.
    let rec = fib();
    let code = PerValueGenerator::new(&rec).generate().unwrap();

    let header = code.find("#pragma once").unwrap();
    let primary = code.find("typename Enable = void").unwrap();
    let base0 = code.find("FibCoeff<0, void>").unwrap();
    let base1 = code.find("FibCoeff<1, void>").unwrap();
    let rule = code.find("std::enable_if<(n > 1) && (n >= 0)>").unwrap();

    assert!(header < primary);
    assert!(primary < base0);
    assert!(base0 < base1);
    assert!(base1 < rule);
}

#[test]
fn fallback_returns_zero_value() {
    let rec = fib();
    let code = PerValueGenerator::new(&rec).generate().unwrap();
    let primary_start = code.find("typename Enable = void").unwrap();
    let primary_block = &code[primary_start..code[primary_start..].find("};").unwrap() + primary_start];
    assert!(primary_block.contains("return Vec8d(0.0);"));
}

#[test]
fn priority_ordering_is_deterministic_under_shuffle() {
    // Rules declared in two different orders sort identically:
    // equality-bearing guard first, then the single-constraint guard,
    // then the two-constraint guard.
    let build = |order: &[usize]| {
        let specs = [
            ("n > 0", "x * E[n-1, m]"),
            ("n == 0", "x * E[n, m-1]"),
            ("n > 0 && m > 0", "x * E[n-1, m-1]"),
        ];
        let mut rec = Recurrence::new("R", &["n", "m"], &["x"]);
        for &i in order {
            rec = rec.rule(specs[i].0, specs[i].1).unwrap();
        }
        rec.sorted_rules()
            .iter()
            .map(|r| r.guard.render())
            .collect::<Vec<_>>()
    };

    let a = build(&[0, 1, 2]);
    let b = build(&[2, 0, 1]);
    let c = build(&[1, 2, 0]);
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(
        a,
        vec!["(n == 0)", "(n > 0)", "(n > 0) && (m > 0)"]
    );
}

#[test]
fn zero_fill_beyond_declared_bounds() {
    // With validity n >= 0 and max index 5, n = -1 and n = 6 both
    // resolve to exactly zero through the dispatcher, for any x.
    let rec = fib();
    let eval = Evaluator::new(&rec);
    for x in [0.0, 1.0, -3.5, 1e10] {
        let env = EvalEnv::new().scalar("x", x);
        assert_eq!(eval.dispatch_value(&[-1], &env).unwrap(), 0.0);
        assert_eq!(eval.dispatch_value(&[6], &env).unwrap(), 0.0);
    }

    // The generated dispatcher encodes the same bounds.
    let code = DispatcherGenerator::new(&rec).generate().unwrap();
    assert!(code.contains("if (n < 0 || n > 5)"));
    assert!(code.contains("default: return Vec8d(0.0);"));
}

#[test]
fn fibonacci_regression_oracle() {
    // Direct recursion oracle for the generated semantics: at n=0 the
    // value is 1.0 for any x; at n=1 it is x; at n=5 with x=2 it
    // matches f(n) = x*f(n-1) + f(n-2).
    let rec = fib();
    let eval = Evaluator::new(&rec);

    for x in [0.5, 2.0, -1.0] {
        let env = EvalEnv::new().scalar("x", x);
        assert_eq!(eval.value(&[0], &env).unwrap(), 1.0);
        assert_eq!(eval.value(&[1], &env).unwrap(), x);
    }

    fn direct(n: i64, x: f64) -> f64 {
        match n {
            0 => 1.0,
            1 => x,
            _ => x * direct(n - 1, x) + direct(n - 2, x),
        }
    }
    let env = EvalEnv::new().scalar("x", 2.0);
    assert_eq!(eval.value(&[5], &env).unwrap(), direct(5, 2.0));
}

#[test]
fn unknown_identifier_renders_as_bare_variable() {
    // Documented leniency: an undeclared identifier in a coefficient
    // becomes a runtime variable reference, not an error.
    let rec = Recurrence::new("R", &["n"], &["x"])
        .rule("n > 0", "M_PI * E[n-1]")
        .unwrap();
    let code = PerValueGenerator::with_optimization(&rec, Optimization::None)
        .generate()
        .unwrap();
    assert!(code.contains("M_PI * RCoeff<n - 1>::compute(x)"));
}

#[test]
fn cse_disabled_and_enabled_have_same_specializations() {
    // CSE changes code shape, never which specializations exist or
    // their guards.
    let rec = catalog::hermite_e().unwrap();
    let plain = PerValueGenerator::with_optimization(&rec, Optimization::None)
        .generate()
        .unwrap();
    let cse = PerValueGenerator::with_optimization(&rec, Optimization::Cse)
        .generate()
        .unwrap();

    for guard in [
        "(nA > 0) && (nB == 0) && (t == 0)",
        "(nA > 0) && (nB == 0) && (t > 0)",
        "(nA == 0) && (nB > 0) && (t > 0)",
        "(nA > 0) && (nB > 0) && (t > 0)",
    ] {
        assert!(plain.contains(guard), "missing guard in plain: {}", guard);
        assert!(cse.contains(guard), "missing guard in cse: {}", guard);
    }
    assert!(cse.contains("e_0"));
    assert!(!plain.contains("e_0"));
}

#[test]
fn branch_average_renders_labeled_branches() {
    let rec = catalog::hermite_mcmurchie().unwrap();
    let code = PerValueGenerator::with_optimization(&rec, Optimization::None)
        .generate()
        .unwrap();
    assert!(code.contains("// Branch A"));
    assert!(code.contains("// Branch B"));
    assert!(code.contains(") * Vec8d(0.5);"));
}

#[test]
fn coulomb_layered_buffer_contract() {
    // The base layer for (0,0,0) copies every slot from the Boys
    // array; a derived layer reads two previous-layer buffers sized
    // one slot beyond N_VALUES, zero-initialized.
    let rec = catalog::coulomb_r().unwrap();
    let code = LayeredGenerator::new(&rec).generate().unwrap();

    assert!(code.contains("struct CoulombRCoeffLayer<0, 0, 0, void>"));
    assert!(code.contains("static constexpr int N_VALUES = 4;"));
    assert!(code.contains("for (int N = 0; N < N_VALUES; ++N)"));
    assert!(code.contains("out[N] = Boys[N];"));

    assert!(code.contains("Vec8d prev_0[N_VALUES + 1] = {};"));
    assert!(code.contains("Vec8d prev_1[N_VALUES + 1] = {};"));
    assert!(code.contains("CoulombRCoeffLayer<t - 1, u, v>::compute(prev_0, PCx, PCy, PCz, Boys);"));
    assert!(code.contains("CoulombRCoeffLayer<t - 2, u, v>::compute(prev_1, PCx, PCy, PCz, Boys);"));
}

#[test]
fn layered_accessor_preserves_pervalue_api() {
    let rec = catalog::hermite_e().unwrap();
    let code = LayeredGenerator::new(&rec).generate().unwrap();

    // Same accessor name and signature convention as the per-value
    // generator: HermiteECoeff<nA, nB, t>::compute(PA, PB, aAB).
    assert!(code.contains("struct HermiteECoeff {"));
    assert!(code.contains("template<int nA, int nB, int t>"));
    assert!(code.contains("HermiteECoeffLayer<nA, nB>::compute(layer, PA, PB, aAB);"));
    assert!(code.contains("return layer[t];"));
}

#[test]
fn layer_bound_default_is_detectable() {
    let rec = Recurrence::new("NoBound", &["n", "t"], &["x"])
        .validity(&["n >= 0", "t >= 0"])
        .unwrap()
        .base(&[("n", 0), ("t", 0)], 1.0)
        .unwrap()
        .rule("n > 0 && t == 0", "x * E[n-1, t]")
        .unwrap();
    let bounds = LayeredGenerator::new(&rec).layer_bounds();
    assert!(!bounds.inferred);
    assert_eq!(bounds.n_values, "1");

    let rec = catalog::hermite_e().unwrap();
    assert!(LayeredGenerator::new(&rec).layer_bounds().inferred);
}

#[test]
fn dsl_errors_name_the_offending_fragment() {
    let indices = vec!["n".to_string()];
    let vars = vec!["x".to_string()];
    let parser = RuleParser::new(&indices, &vars, "E");

    let err = parser.parse_expression("2 * x + x * E[n-1]").unwrap_err();
    assert!(err.to_string().contains("2 * x"));

    let err = parser.parse_term("E[q-1]").unwrap_err();
    assert!(err.to_string().contains("q"));

    let rec_err = Recurrence::new("Bad", &["n"], &["x"])
        .rule("n > 1", "x * y")
        .unwrap_err();
    assert!(rec_err.to_string().contains("Bad"));
    assert!(rec_err.to_string().contains("rule 0"));
}
