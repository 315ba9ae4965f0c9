//! Combinatoric and sequence recurrence relations.

use crate::recurrence::Recurrence;
use crate::utils::errors::DefinitionError;

/// Binomial coefficients C(n, k) by Pascal's rule.
pub fn binomial() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("Binomial", &["n", "k"], &[])
        .namespace("combinatorics")
        .max_index("n", 10)?
        .max_index("k", 10)?
        .validity(&["n >= 0", "k >= 0", "k <= n"])?
        .base(&[("n", 0), ("k", 0)], 1.0)?
        .named_rule("k == 0", "E[n-1, k]", "k=0 edge")?
        .named_rule("n == k", "E[n-1, k-1]", "n=k edge")?
        .named_rule("n > k && k > 0", "E[n-1, k-1] + E[n-1, k]", "Pascal's rule")
}

/// Fibonacci-like sequence with parameter x.
pub fn fibonacci() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("Fibonacci", &["n"], &["x"])
        .namespace("sequences")
        .max_index("n", 20)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], 1.0)?
        .base(&[("n", 1)], "x")?
        .named_rule("n > 1", "x * E[n-1] + E[n-2]", "Fibonacci-like")
}
