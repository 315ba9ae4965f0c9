//! Guard constraints for rule specialization.
//!
//! Constraints define when a particular recurrence rule applies, and are
//! rendered into the boolean conditions guarding generated
//! specializations.

use crate::dsl::index_arith;
use crate::utils::errors::ConstraintError;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Comparison operators for constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

impl CmpOp {
    /// The operator's source symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
        }
    }

    /// Parse order: two-character operators first, so `>=` is never
    /// mis-split as `>` followed by a dangling `=`.
    const PARSE_ORDER: [CmpOp; 6] = [CmpOp::Eq, CmpOp::Ne, CmpOp::Le, CmpOp::Ge, CmpOp::Lt, CmpOp::Gt];

    fn compare(&self, l: i64, r: i64) -> bool {
        match self {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Le => l <= r,
            CmpOp::Ge => l >= r,
            CmpOp::Lt => l < r,
            CmpOp::Gt => l > r,
        }
    }
}

/// A single comparison between two index-arithmetic expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Left-hand side (index arithmetic text)
    pub left: String,
    /// Comparison operator
    pub op: CmpOp,
    /// Right-hand side (index arithmetic text)
    pub right: String,
}

impl Constraint {
    /// Parse a constraint from text like `n > 0` or `t <= nA + nB`.
    pub fn parse(text: &str) -> Result<Self, ConstraintError> {
        for op in CmpOp::PARSE_ORDER {
            if let Some(pos) = text.find(op.symbol()) {
                let left = text[..pos].trim();
                let right = text[pos + op.symbol().len()..].trim();
                if left.is_empty() || right.is_empty() {
                    return Err(ConstraintError::new("comparison is missing an operand", text));
                }
                return Ok(Self {
                    left: left.to_string(),
                    op,
                    right: right.to_string(),
                });
            }
        }
        Err(ConstraintError::new("no comparison operator found", text))
    }

    /// Render as a parenthesized boolean condition.
    pub fn render(&self) -> String {
        format!("({} {} {})", self.left, self.op.symbol(), self.right)
    }

    /// Check whether either side references `name` as an identifier.
    pub fn mentions(&self, name: &str) -> bool {
        index_arith::contains_ident(&self.left, name) || index_arith::contains_ident(&self.right, name)
    }

    /// Check whether either side references any of `names`.
    pub fn mentions_any(&self, names: &[String]) -> bool {
        names.iter().any(|n| self.mentions(n))
    }

    /// Evaluate against concrete index values. Returns `None` when a
    /// side fails to parse or references an unknown variable.
    pub fn is_satisfied(&self, lookup: &dyn Fn(&str) -> Option<i64>) -> Option<bool> {
        let l = index_arith::parse(&self.left).ok()?.eval(lookup)?;
        let r = index_arith::parse(&self.right).ok()?.eval(lookup)?;
        Some(self.op.compare(l, r))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op.symbol(), self.right)
    }
}

/// An unordered conjunction of constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// The conjoined constraints
    pub constraints: Vec<Constraint>,
}

impl ConstraintSet {
    /// Parse multiple constraint expressions; each may itself combine
    /// comparisons with `&&`.
    pub fn parse(exprs: &[&str]) -> Result<Self, ConstraintError> {
        let mut constraints = Vec::new();
        for expr in exprs {
            for part in expr.split("&&") {
                let part = part.trim();
                if !part.is_empty() {
                    constraints.push(Constraint::parse(part)?);
                }
            }
        }
        Ok(Self { constraints })
    }

    /// Render as a `&&`-joined boolean condition; empty renders `true`.
    pub fn render(&self) -> String {
        if self.constraints.is_empty() {
            return "true".to_string();
        }
        self.constraints
            .iter()
            .map(|c| c.render())
            .collect::<Vec<_>>()
            .join(" && ")
    }

    /// Merge with another constraint set (AND logic).
    pub fn merge(&self, other: &ConstraintSet) -> ConstraintSet {
        let mut constraints = self.constraints.clone();
        constraints.extend(other.constraints.iter().cloned());
        ConstraintSet { constraints }
    }

    /// Number of equality constraints, used for rule prioritization.
    pub fn eq_count(&self) -> usize {
        self.constraints.iter().filter(|c| c.op == CmpOp::Eq).count()
    }

    /// Total number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// True when the set is empty (renders `true`).
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Evaluate every constraint against concrete index values.
    pub fn all_satisfied(&self, lookup: &dyn Fn(&str) -> Option<i64>) -> Option<bool> {
        for c in &self.constraints {
            if !c.is_satisfied(lookup)? {
                return Some(false);
            }
        }
        Some(true)
    }

    /// Find an upper bound `name <= <expr>` among the constraints and
    /// return the bound expression.
    pub fn upper_bound_of(&self, name: &str) -> Option<&str> {
        self.constraints
            .iter()
            .find(|c| c.op == CmpOp::Le && c.left.trim() == name)
            .map(|c| c.right.as_str())
    }
}
