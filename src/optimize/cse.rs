//! Common-subexpression elimination for rule bodies.
//!
//! Recursive calls are the expensive leaves of a rule body: every
//! duplicated call signature re-derives an entire sub-recurrence. The
//! optimizer names each distinct call once, names repeated non-trivial
//! coefficients, and rebuilds the tree over those intermediates.
//! Intermediate names are assigned in first-occurrence order, so
//! repeated runs are reproducible byte-for-byte.

use crate::ast::{BinOp, Expr, Term};
use std::collections::HashMap;

/// An optimized expression: intermediate bindings in dependency order,
/// plus the final expression referencing them.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedExpr {
    /// `(name, expression)` pairs, each emitted once before the result.
    pub bindings: Vec<(String, Expr)>,
    /// The final expression. With no bindings this is the original tree.
    pub result: Expr,
}

impl OptimizedExpr {
    /// True when optimization found nothing to extract.
    pub fn is_noop(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Applies CSE to rule-body expressions.
#[derive(Debug, Clone)]
pub struct Optimizer {
    /// Whether CSE is applied at all.
    pub enable_cse: bool,
    /// Minimum occurrence count for coefficient extraction.
    pub cse_threshold: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            enable_cse: true,
            cse_threshold: 2,
        }
    }
}

impl Optimizer {
    /// Optimizer with default settings (CSE on, threshold 2).
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimize an expression. Always safe to call: with nothing to
    /// extract, the result is the original tree with no bindings.
    pub fn optimize(&self, expr: &Expr) -> OptimizedExpr {
        let calls = expr.collect_calls();
        if !self.enable_cse || calls.len() < self.cse_threshold {
            return OptimizedExpr {
                bindings: Vec::new(),
                result: expr.clone(),
            };
        }

        // Every distinct call becomes an intermediate: even unshared
        // calls are worth naming, since each one is a full recursive
        // template instantiation.
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut bindings: Vec<(String, Expr)> = Vec::new();
        for call in &calls {
            let sig = call.signature();
            if !call_names.contains_key(&sig) {
                let name = format!("e_{}", call_names.len());
                call_names.insert(sig, name.clone());
                bindings.push((name, Expr::Call((*call).clone())));
            }
        }

        // Repeated non-trivial coefficients get named too.
        let mut coeff_counts: HashMap<String, usize> = HashMap::new();
        let mut coeff_order: Vec<(String, Expr)> = Vec::new();
        collect_coefficients(expr, &mut coeff_counts, &mut coeff_order);

        let mut coeff_names: HashMap<String, String> = HashMap::new();
        for (sig, coeff) in &coeff_order {
            if coeff_counts[sig] >= self.cse_threshold && is_nontrivial_coeff(coeff) {
                let name = format!("c_{}", coeff_names.len());
                coeff_names.insert(sig.clone(), name.clone());
                bindings.push((name, coeff.clone()));
            }
        }

        let result = rebuild(expr, &call_names, &coeff_names);
        OptimizedExpr { bindings, result }
    }
}

/// Cheap pre-check for whether CSE is worth attempting: any duplicated
/// call signature, or at least three recursive calls.
pub fn should_apply_cse(expr: &Expr) -> bool {
    let calls = expr.collect_calls();
    if calls.len() < 2 {
        return false;
    }
    let mut seen = std::collections::HashSet::new();
    for call in &calls {
        if !seen.insert(call.signature()) {
            return true;
        }
    }
    calls.len() >= 3
}

/// Canonical signature for structural identity of expressions.
pub fn signature(expr: &Expr) -> String {
    match expr {
        Expr::Const(v) => format!("const:{:?}", v),
        Expr::Literal(text) => format!("lit:{}", text),
        Expr::Var(name) => format!("var:{}", name),
        Expr::IndexExpr(text) => format!("idx:{}", text),
        Expr::Call(call) => format!("call:{}", call.signature()),
        Expr::Binary { op, lhs, rhs } => {
            format!("({}{}{})", signature(lhs), op.symbol(), signature(rhs))
        }
        Expr::Sum(terms) => {
            let parts: Vec<String> = terms
                .iter()
                .map(|t| format!("{}*call:{}", signature(&t.coeff), t.call.signature()))
                .collect();
            format!("sum[{}]", parts.join(","))
        }
        Expr::Scaled { inner, scale, division } => {
            format!("scaled({},{},{})", signature(inner), signature(scale), division)
        }
        Expr::BranchAverage { branches, scale } => {
            let parts: Vec<String> = branches.iter().map(signature).collect();
            format!("avg[{}]*{}", parts.join(","), signature(scale))
        }
        Expr::CseRef(name) => format!("ref:{}", name),
        Expr::FlatSum(exprs) => {
            let parts: Vec<String> = exprs.iter().map(signature).collect();
            format!("flat[{}]", parts.join(","))
        }
    }
}

/// Record coefficient occurrences (term coefficients and scale factors).
fn collect_coefficients(
    expr: &Expr,
    counts: &mut HashMap<String, usize>,
    order: &mut Vec<(String, Expr)>,
) {
    let mut record = |coeff: &Expr, counts: &mut HashMap<String, usize>, order: &mut Vec<(String, Expr)>| {
        let sig = signature(coeff);
        let count = counts.entry(sig.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            order.push((sig, coeff.clone()));
        }
    };

    match expr {
        Expr::Const(_)
        | Expr::Literal(_)
        | Expr::Var(_)
        | Expr::IndexExpr(_)
        | Expr::Call(_)
        | Expr::CseRef(_) => {}
        Expr::Binary { lhs, rhs, .. } => {
            collect_coefficients(lhs, counts, order);
            collect_coefficients(rhs, counts, order);
        }
        Expr::Sum(terms) => {
            for t in terms {
                if !t.is_unit_coeff() {
                    record(&t.coeff, counts, order);
                }
            }
        }
        Expr::Scaled { inner, scale, .. } => {
            collect_coefficients(inner, counts, order);
            record(scale, counts, order);
        }
        Expr::BranchAverage { branches, scale } => {
            for b in branches {
                collect_coefficients(b, counts, order);
            }
            record(scale, counts, order);
        }
        Expr::FlatSum(exprs) => {
            for e in exprs {
                collect_coefficients(e, counts, order);
            }
        }
    }
}

/// Trivial coefficients (bare constants, single variables) are never
/// extracted: naming them adds a line without saving work.
fn is_nontrivial_coeff(coeff: &Expr) -> bool {
    match coeff {
        Expr::Const(_) | Expr::Literal(_) | Expr::Var(_) | Expr::CseRef(_) => false,
        Expr::IndexExpr(text) => match crate::dsl::index_arith::parse(text) {
            Ok(parsed) => !matches!(
                parsed,
                crate::dsl::index_arith::IntExpr::Num(_) | crate::dsl::index_arith::IntExpr::Var(_)
            ),
            Err(_) => false,
        },
        Expr::Binary { .. } => true,
        Expr::Call(_) | Expr::Sum(_) | Expr::Scaled { .. } | Expr::BranchAverage { .. } | Expr::FlatSum(_) => {
            false
        }
    }
}

/// Rebuild the tree over the named intermediates, preserving term
/// order. A `Sum` becomes a `FlatSum` of intermediate references.
fn rebuild(
    expr: &Expr,
    call_names: &HashMap<String, String>,
    coeff_names: &HashMap<String, String>,
) -> Expr {
    match expr {
        Expr::Const(_) | Expr::Literal(_) | Expr::Var(_) | Expr::IndexExpr(_) | Expr::CseRef(_) => {
            expr.clone()
        }
        Expr::Call(call) => match call_names.get(&call.signature()) {
            Some(name) => Expr::CseRef(name.clone()),
            None => expr.clone(),
        },
        Expr::Binary { op, lhs, rhs } => Expr::Binary {
            op: *op,
            lhs: Box::new(rebuild(lhs, call_names, coeff_names)),
            rhs: Box::new(rebuild(rhs, call_names, coeff_names)),
        },
        Expr::Sum(terms) => {
            let exprs = terms
                .iter()
                .map(|t| rebuild_term(t, call_names, coeff_names))
                .collect();
            Expr::FlatSum(exprs)
        }
        Expr::Scaled { inner, scale, division } => Expr::Scaled {
            inner: Box::new(rebuild(inner, call_names, coeff_names)),
            scale: Box::new(rebuild_coeff(scale, call_names, coeff_names)),
            division: *division,
        },
        Expr::BranchAverage { branches, scale } => Expr::BranchAverage {
            branches: branches
                .iter()
                .map(|b| rebuild(b, call_names, coeff_names))
                .collect(),
            scale: Box::new(rebuild_coeff(scale, call_names, coeff_names)),
        },
        Expr::FlatSum(exprs) => Expr::FlatSum(
            exprs
                .iter()
                .map(|e| rebuild(e, call_names, coeff_names))
                .collect(),
        ),
    }
}

fn rebuild_term(
    term: &Term,
    call_names: &HashMap<String, String>,
    coeff_names: &HashMap<String, String>,
) -> Expr {
    let call_ref = match call_names.get(&term.call.signature()) {
        Some(name) => Expr::CseRef(name.clone()),
        None => Expr::Call(term.call.clone()),
    };
    if term.is_unit_coeff() {
        return call_ref;
    }
    Expr::Binary {
        op: BinOp::Mul,
        lhs: Box::new(rebuild_coeff(&term.coeff, call_names, coeff_names)),
        rhs: Box::new(call_ref),
    }
}

fn rebuild_coeff(
    coeff: &Expr,
    call_names: &HashMap<String, String>,
    coeff_names: &HashMap<String, String>,
) -> Expr {
    if let Some(name) = coeff_names.get(&signature(coeff)) {
        return Expr::CseRef(name.clone());
    }
    rebuild(coeff, call_names, coeff_names)
}

/// Arithmetic operation counts for an expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub add: usize,
    pub mul: usize,
    pub div: usize,
    pub calls: usize,
}

/// Count arithmetic operations in an expression.
pub fn count_operations(expr: &Expr) -> OpCounts {
    let mut counts = OpCounts::default();
    count_into(expr, &mut counts);
    counts
}

fn count_into(expr: &Expr, counts: &mut OpCounts) {
    match expr {
        Expr::Const(_) | Expr::Literal(_) | Expr::Var(_) | Expr::IndexExpr(_) | Expr::CseRef(_) => {}
        Expr::Call(_) => counts.calls += 1,
        Expr::Binary { op, lhs, rhs } => {
            match op {
                BinOp::Add | BinOp::Sub => counts.add += 1,
                BinOp::Mul => counts.mul += 1,
                BinOp::Div => counts.div += 1,
            }
            count_into(lhs, counts);
            count_into(rhs, counts);
        }
        Expr::Sum(terms) => {
            if terms.len() > 1 {
                counts.add += terms.len() - 1;
            }
            for t in terms {
                if !t.is_unit_coeff() {
                    counts.mul += 1;
                    count_into(&t.coeff, counts);
                }
                counts.calls += 1;
            }
        }
        Expr::Scaled { inner, scale, division } => {
            if *division {
                counts.div += 1;
            } else {
                counts.mul += 1;
            }
            count_into(inner, counts);
            count_into(scale, counts);
        }
        Expr::BranchAverage { branches, scale } => {
            if branches.len() > 1 {
                counts.add += branches.len() - 1;
            }
            counts.mul += 1;
            for b in branches {
                count_into(b, counts);
            }
            count_into(scale, counts);
        }
        Expr::FlatSum(exprs) => {
            if exprs.len() > 1 {
                counts.add += exprs.len() - 1;
            }
            for e in exprs {
                count_into(e, counts);
            }
        }
    }
}

/// Estimate the relative cost of an expression. Recursive calls
/// dominate: without memoization each one re-derives a sub-recurrence.
pub fn estimate_cost(expr: &Expr) -> f64 {
    let c = count_operations(expr);
    c.add as f64 + 2.0 * c.mul as f64 + 10.0 * c.div as f64 + 50.0 * c.calls as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RecursiveCall;

    fn call(shifts: &[i64]) -> RecursiveCall {
        RecursiveCall {
            target: None,
            shifts: shifts.to_vec(),
        }
    }

    fn term(coeff: Expr, shifts: &[i64]) -> Term {
        Term {
            coeff,
            call: call(shifts),
        }
    }

    #[test]
    fn test_noop_below_threshold() {
        let expr = Expr::Sum(vec![term(Expr::Var("x".into()), &[-1])]);
        let opt = Optimizer::new().optimize(&expr);
        assert!(opt.is_noop());
        assert_eq!(opt.result, expr);
    }

    #[test]
    fn test_duplicate_calls_share_one_binding() {
        // x * E[n-1] + y * E[n-1] + E[n-2]
        let expr = Expr::Sum(vec![
            term(Expr::Var("x".into()), &[-1]),
            term(Expr::Var("y".into()), &[-1]),
            term(Expr::one(), &[-2]),
        ]);
        let opt = Optimizer::new().optimize(&expr);

        let call_bindings: Vec<_> = opt
            .bindings
            .iter()
            .filter(|(_, e)| matches!(e, Expr::Call(_)))
            .collect();
        assert_eq!(call_bindings.len(), 2);
        assert_eq!(call_bindings[0].0, "e_0");
        assert_eq!(call_bindings[1].0, "e_1");

        match &opt.result {
            Expr::FlatSum(exprs) => {
                assert_eq!(exprs.len(), 3);
                // Third term had a unit coefficient: bare reference.
                assert_eq!(exprs[2], Expr::CseRef("e_1".to_string()));
            }
            other => panic!("expected flat sum, got {:?}", other),
        }
    }

    #[test]
    fn test_deterministic_names_across_runs() {
        let expr = Expr::Sum(vec![
            term(Expr::Var("a".into()), &[-1, 0]),
            term(Expr::Var("b".into()), &[0, -1]),
            term(Expr::Var("c".into()), &[-1, 0]),
        ]);
        let a = Optimizer::new().optimize(&expr);
        let b = Optimizer::new().optimize(&expr);
        assert_eq!(a.bindings, b.bindings);
        assert_eq!(a.result, b.result);
    }

    #[test]
    fn test_repeated_coefficient_extracted() {
        let coeff = Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::IndexExpr("2*n-1".into())),
            rhs: Box::new(Expr::Var("x".into())),
        };
        let expr = Expr::Sum(vec![
            term(coeff.clone(), &[-1]),
            term(coeff, &[-2]),
        ]);
        let opt = Optimizer::new().optimize(&expr);

        let coeff_binding = opt.bindings.iter().find(|(n, _)| n == "c_0");
        assert!(coeff_binding.is_some(), "repeated coefficient not extracted");

        match &opt.result {
            Expr::FlatSum(exprs) => {
                for e in exprs {
                    match e {
                        Expr::Binary { lhs, .. } => {
                            assert_eq!(**lhs, Expr::CseRef("c_0".to_string()))
                        }
                        other => panic!("expected product, got {:?}", other),
                    }
                }
            }
            other => panic!("expected flat sum, got {:?}", other),
        }
    }

    #[test]
    fn test_trivial_coefficients_not_extracted() {
        let expr = Expr::Sum(vec![
            term(Expr::Var("x".into()), &[-1]),
            term(Expr::Var("x".into()), &[-2]),
        ]);
        let opt = Optimizer::new().optimize(&expr);
        assert!(opt.bindings.iter().all(|(n, _)| n.starts_with("e_")));
    }

    #[test]
    fn test_scaled_sum_keeps_scale_after_extraction() {
        let inner = Expr::Sum(vec![
            term(Expr::Var("x".into()), &[-1]),
            term(Expr::one(), &[-2]),
        ]);
        let expr = Expr::Scaled {
            inner: Box::new(inner),
            scale: Box::new(Expr::IndexExpr("n".into())),
            division: true,
        };
        let opt = Optimizer::new().optimize(&expr);

        match &opt.result {
            Expr::Scaled { inner, division, .. } => {
                assert!(*division);
                assert!(matches!(**inner, Expr::FlatSum(_)));
            }
            other => panic!("expected scaled result, got {:?}", other),
        }
    }

    #[test]
    fn test_should_apply_cse() {
        let two_distinct = Expr::Sum(vec![
            term(Expr::one(), &[-1]),
            term(Expr::one(), &[-2]),
        ]);
        assert!(!should_apply_cse(&two_distinct));

        let duplicate = Expr::Sum(vec![
            term(Expr::Var("x".into()), &[-1]),
            term(Expr::Var("y".into()), &[-1]),
        ]);
        assert!(should_apply_cse(&duplicate));

        let three = Expr::Sum(vec![
            term(Expr::one(), &[-1, 0]),
            term(Expr::one(), &[0, -1]),
            term(Expr::one(), &[-1, -1]),
        ]);
        assert!(should_apply_cse(&three));
    }

    #[test]
    fn test_count_operations() {
        let expr = Expr::Sum(vec![
            term(Expr::Var("x".into()), &[-1]),
            term(Expr::one(), &[-2]),
        ]);
        let counts = count_operations(&expr);
        assert_eq!(counts.add, 1);
        assert_eq!(counts.mul, 1);
        assert_eq!(counts.calls, 2);
        assert!(estimate_cost(&expr) > 100.0);
    }
}
