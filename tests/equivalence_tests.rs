//! Numerical equivalence tests: the per-value and layered evaluation
//! strategies compute the same mathematics two different ways and must
//! agree to the last bit; the optimizer must never change a value.

use proptest::prelude::*;
use recurgen::ast::{BinOp, Expr, RecursiveCall, Term};
use recurgen::catalog;
use recurgen::eval::{EvalEnv, Evaluator};
use recurgen::optimize::{OptimizedExpr, Optimizer};

#[test]
fn hermite_e_layer_matches_per_value_exactly() {
    // The worked example: nA=1, nB=1, t in 0..=2 with PA=0.3, PB=-0.2,
    // aAB=0.25 must agree bit-for-bit, as must every other in-domain
    // point.
    let rec = catalog::hermite_e().unwrap();
    let eval = Evaluator::new(&rec);
    let env = EvalEnv::new()
        .scalar("PA", 0.3)
        .scalar("PB", -0.2)
        .scalar("aAB", 0.25);

    for na in 0..=3i64 {
        for nb in 0..=3i64 {
            let layer = eval.layer(&[na, nb], &env).unwrap();
            assert_eq!(layer.len() as i64, na + nb + 1);
            for t in 0..=(na + nb) {
                let direct = eval.value(&[na, nb, t], &env).unwrap();
                let layered = layer[t as usize];
                assert_eq!(
                    direct.to_bits(),
                    layered.to_bits(),
                    "mismatch at ({}, {}, {}): {} vs {}",
                    na,
                    nb,
                    t,
                    direct,
                    layered
                );
            }
        }
    }
}

#[test]
fn binomial_layer_matches_per_value() {
    let rec = catalog::binomial().unwrap();
    let eval = Evaluator::new(&rec);
    let env = EvalEnv::new();

    for n in 0..=8i64 {
        let layer = eval.layer(&[n], &env).unwrap();
        assert_eq!(layer.len() as i64, n + 1);
        for k in 0..=n {
            let direct = eval.value(&[n, k], &env).unwrap();
            assert_eq!(
                direct.to_bits(),
                layer[k as usize].to_bits(),
                "C({}, {})",
                n,
                k
            );
        }
    }
}

#[test]
fn coulomb_layer_matches_per_value_in_domain() {
    // Equivalence holds where neither side truncates: the tabulated
    // Boys array bounds the reachable auxiliary depth, so compare
    // points with N + t + u + v below the tabulated margin.
    let rec = catalog::coulomb_r().unwrap();
    let eval = Evaluator::new(&rec);
    let env = EvalEnv::new()
        .scalar("PCx", 0.1)
        .scalar("PCy", -0.4)
        .scalar("PCz", 0.7)
        .array("Boys", &[1.0, 0.5, 0.25, 0.125, 0.0625, 0.03125, 0.015625, 0.0078125]);

    let layer_points = [
        [0i64, 0, 0],
        [1, 0, 0],
        [0, 1, 0],
        [0, 0, 1],
        [1, 1, 0],
        [2, 0, 0],
        [1, 1, 1],
    ];
    for point in layer_points {
        let spatial_sum: i64 = point.iter().sum();
        let layer = eval.layer(&point, &env).unwrap();
        for n in 0..=(3 - spatial_sum).max(0) {
            let idx = [point[0], point[1], point[2], n];
            let direct = eval.value(&idx, &env).unwrap();
            assert_eq!(
                direct.to_bits(),
                layer[n as usize].to_bits(),
                "R_{{{},{},{}}}^({})",
                point[0],
                point[1],
                point[2],
                n
            );
        }
    }
}

#[test]
fn coulomb_base_layer_copies_tabulated_values() {
    let rec = catalog::coulomb_r().unwrap();
    let eval = Evaluator::new(&rec);
    let boys = [1.0, 0.5, 0.25, 0.125, 0.0625];
    let env = EvalEnv::new()
        .scalar("PCx", 0.0)
        .scalar("PCy", 0.0)
        .scalar("PCz", 0.0)
        .array("Boys", &boys);

    // Base layer (0,0,0) has N_VALUES = 4 and copies Boys[0..4].
    let layer = eval.layer(&[0, 0, 0], &env).unwrap();
    assert_eq!(layer, boys[..4].to_vec());
}

// Optimizer safety: CSE must not change which values contribute or
// their multiplicities. Random sums of coefficient-weighted calls are
// evaluated with and without optimization against the Fibonacci-like
// recurrence.

fn coeff_strategy() -> impl Strategy<Value = Expr> {
    prop_oneof![
        Just(Expr::Const(1.0)),
        Just(Expr::Const(2.5)),
        Just(Expr::Const(-0.75)),
        Just(Expr::Var("x".to_string())),
        Just(Expr::IndexExpr("2*n-1".to_string())),
        Just(Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::IndexExpr("n".to_string())),
            rhs: Box::new(Expr::Var("x".to_string())),
        }),
    ]
}

fn sum_strategy() -> impl Strategy<Value = Expr> {
    prop::collection::vec((coeff_strategy(), -2i64..=0), 1..6).prop_map(|parts| {
        Expr::Sum(
            parts
                .into_iter()
                .map(|(coeff, shift)| Term {
                    coeff,
                    call: RecursiveCall {
                        target: None,
                        shifts: vec![shift],
                    },
                })
                .collect(),
        )
    })
}

proptest! {
    #[test]
    fn optimizer_preserves_values(expr in sum_strategy(), x in -2.0f64..2.0) {
        let rec = catalog::fibonacci().unwrap();
        let eval = Evaluator::new(&rec);
        let env = EvalEnv::new().scalar("x", x);
        let idx = [5i64];

        let plain = OptimizedExpr { bindings: vec![], result: expr.clone() };
        let direct = eval.eval_optimized(&plain, &idx, &env).unwrap();

        let optimized = Optimizer::new().optimize(&expr);
        let via_cse = eval.eval_optimized(&optimized, &idx, &env).unwrap();

        prop_assert_eq!(direct.to_bits(), via_cse.to_bits());
    }

    #[test]
    fn optimizer_emits_each_signature_once(expr in sum_strategy()) {
        let optimized = Optimizer::new().optimize(&expr);
        let mut seen = std::collections::HashSet::new();
        for (name, binding) in &optimized.bindings {
            if let Expr::Call(call) = binding {
                prop_assert!(seen.insert(call.signature()), "duplicate binding {}", name);
            }
        }
    }
}
