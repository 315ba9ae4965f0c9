//! Expression AST for recurrence-relation right-hand sides.
//!
//! Rule bodies are represented as a closed sum type so that every
//! renderer (code emission, CSE signatures, buffer substitution) matches
//! exhaustively and the compiler flags a forgotten variant when a new
//! one is added.
//!
//! Index shifts in [`RecursiveCall`] are keyed by index *slot*: index
//! names are resolved to positions in the recurrence's declared index
//! list once at parse time, so the hot signature-comparison path works
//! on fixed integer vectors instead of string-keyed maps.

use serde::{Serialize, Deserialize};

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// The operator's source symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

/// A reference to a recurrence evaluated at shifted index values.
///
/// `shifts[slot]` is the fixed integer offset applied to the index
/// declared at `slot`; 0 means unchanged. `target` names another
/// recurrence family for cross-recurrence references (e.g. a derivative
/// recurrence reading the base recurrence); `None` means self-recursion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursiveCall {
    /// Referenced recurrence name, when different from the enclosing one.
    pub target: Option<String>,
    /// Per-slot index shifts, aligned with the declared index list.
    pub shifts: Vec<i64>,
}

impl RecursiveCall {
    /// A call with every index unchanged.
    pub fn unshifted(n_indices: usize) -> Self {
        Self {
            target: None,
            shifts: vec![0; n_indices],
        }
    }

    /// Shift for the index at `slot` (0 when out of range).
    pub fn shift(&self, slot: usize) -> i64 {
        self.shifts.get(slot).copied().unwrap_or(0)
    }

    /// Canonical signature for structural identity.
    ///
    /// Two calls with the same target and the same per-slot shifts
    /// compare equal regardless of where they sit in the tree.
    pub fn signature(&self) -> String {
        let shifts = self
            .shifts
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        match &self.target {
            Some(t) => format!("{}[{}]", t, shifts),
            None => format!("[{}]", shifts),
        }
    }

    /// Shifts applied to the layer-index prefix (everything except the
    /// index at `aux_slot`).
    pub fn spatial_signature(&self, aux_slot: usize) -> Vec<i64> {
        self.shifts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != aux_slot)
            .map(|(_, &s)| s)
            .collect()
    }
}

/// A term in a sum: coefficient times one recursive call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    /// The coefficient expression.
    pub coeff: Expr,
    /// The recursive call being scaled.
    pub call: RecursiveCall,
}

impl Term {
    /// True when the coefficient is the literal 1, which elides the
    /// multiplication in rendered output.
    pub fn is_unit_coeff(&self) -> bool {
        matches!(self.coeff, Expr::Const(v) if v == 1.0)
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal, rendered as a lifted vector constant.
    Const(f64),
    /// Raw literal text, rendered verbatim. Escape hatch for named
    /// constants (`M_PI`) and tabulated-array lookups (`Boys[N]`).
    Literal(String),
    /// Runtime (non-index) parameter reference, rendered verbatim.
    Var(String),
    /// Integer arithmetic over compile-time index names, rendered as a
    /// lifted constant of the arithmetic expression.
    IndexExpr(String),
    /// Recursive call at shifted indices.
    Call(RecursiveCall),
    /// Binary arithmetic between two sub-expressions.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Ordered sum of terms. Empty renders as the zero constant; a
    /// single term elides the addition.
    Sum(Vec<Term>),
    /// `inner` divided (or multiplied) by `scale`, for normalized
    /// recurrences like the `1/n` factor in Legendre's.
    Scaled {
        inner: Box<Expr>,
        scale: Box<Expr>,
        division: bool,
    },
    /// Average of equivalent reduction branches: `(b0 + b1 + ...) * scale`.
    /// Built directly by `Recurrence::branch_average`.
    BranchAverage {
        branches: Vec<Expr>,
        scale: Box<Expr>,
    },
    /// Reference to a named optimizer intermediate.
    CseRef(String),
    /// Sum of already-lowered expressions, produced by the optimizer's
    /// rebuild pass in place of a `Sum` whose terms were rewritten.
    FlatSum(Vec<Expr>),
}

impl Expr {
    /// Collect every recursive call in this expression, in source order.
    pub fn collect_calls(&self) -> Vec<&RecursiveCall> {
        let mut calls = Vec::new();
        self.walk_calls(&mut calls);
        calls
    }

    fn walk_calls<'a>(&'a self, out: &mut Vec<&'a RecursiveCall>) {
        match self {
            Expr::Const(_) | Expr::Literal(_) | Expr::Var(_) | Expr::IndexExpr(_) | Expr::CseRef(_) => {}
            Expr::Call(call) => out.push(call),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk_calls(out);
                rhs.walk_calls(out);
            }
            Expr::Sum(terms) => {
                for t in terms {
                    t.coeff.walk_calls(out);
                    out.push(&t.call);
                }
            }
            Expr::Scaled { inner, scale, .. } => {
                inner.walk_calls(out);
                scale.walk_calls(out);
            }
            Expr::BranchAverage { branches, scale } => {
                for b in branches {
                    b.walk_calls(out);
                }
                scale.walk_calls(out);
            }
            Expr::FlatSum(exprs) => {
                for e in exprs {
                    e.walk_calls(out);
                }
            }
        }
    }

    /// Check whether this expression references the given runtime
    /// variable. Identifier matching is token-based, so `x` does not
    /// match inside `two_x`.
    pub fn uses_var(&self, name: &str) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Literal(text) => crate::dsl::index_arith::contains_ident(text, name),
            Expr::Var(var) => var == name,
            Expr::IndexExpr(text) => crate::dsl::index_arith::contains_ident(text, name),
            Expr::Call(_) => false,
            Expr::Binary { lhs, rhs, .. } => lhs.uses_var(name) || rhs.uses_var(name),
            Expr::Sum(terms) => terms.iter().any(|t| t.coeff.uses_var(name)),
            Expr::Scaled { inner, scale, .. } => inner.uses_var(name) || scale.uses_var(name),
            Expr::BranchAverage { branches, scale } => {
                branches.iter().any(|b| b.uses_var(name)) || scale.uses_var(name)
            }
            Expr::CseRef(cse) => cse == name,
            Expr::FlatSum(exprs) => exprs.iter().any(|e| e.uses_var(name)),
        }
    }

    /// The unit coefficient.
    pub fn one() -> Expr {
        Expr::Const(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(shifts: &[i64]) -> RecursiveCall {
        RecursiveCall {
            target: None,
            shifts: shifts.to_vec(),
        }
    }

    #[test]
    fn test_signature_distinguishes_shifts() {
        assert_ne!(call(&[-1, 0]).signature(), call(&[0, -1]).signature());
        assert_eq!(call(&[-1, 0]).signature(), call(&[-1, 0]).signature());
    }

    #[test]
    fn test_signature_distinguishes_target() {
        let mut cross = call(&[0, 0]);
        cross.target = Some("HermiteE".to_string());
        assert_ne!(cross.signature(), call(&[0, 0]).signature());
    }

    #[test]
    fn test_collect_calls_order() {
        let sum = Expr::Sum(vec![
            Term { coeff: Expr::Var("x".into()), call: call(&[-1]) },
            Term { coeff: Expr::one(), call: call(&[-2]) },
        ]);
        let calls = sum.collect_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].shifts, vec![-1]);
        assert_eq!(calls[1].shifts, vec![-2]);
    }

    #[test]
    fn test_uses_var_token_boundaries() {
        let e = Expr::Var("two_x".to_string());
        assert!(!e.uses_var("x"));
        assert!(e.uses_var("two_x"));

        let idx = Expr::IndexExpr("2*n-1".to_string());
        assert!(idx.uses_var("n"));
        assert!(!idx.uses_var("m"));
    }

    #[test]
    fn test_spatial_signature_skips_aux() {
        let c = call(&[-1, 0, 2]);
        assert_eq!(c.spatial_signature(2), vec![-1, 0]);
    }
}
