//! Special function recurrence relations.
//!
//! Parameterized families whose first values depend on runtime
//! parameters (supplied as P0/P1-style runtime variables).

use crate::recurrence::Recurrence;
use crate::utils::errors::DefinitionError;

/// Jacobi polynomials P_n^(alpha,beta)(x). DLMF 18.9.3.
pub fn jacobi() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("Jacobi", &["n"], &["x", "alpha", "beta", "P0", "P1"])
        .namespace("jacobi")
        .max_index("n", 12)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], "P0")?
        .base(&[("n", 1)], "P1")?
        .scaled_rule(
            "n > 1",
            "(2*n + alpha + beta - 1) * ((2*n + alpha + beta) * (2*n + alpha + beta - 2) * x + alpha*alpha - beta*beta) * E[n-1] + \
             (-2) * (n + alpha - 1) * (n + beta - 1) * (2*n + alpha + beta) * E[n-2]",
            "1/(2*n*(n + alpha + beta)*(2*n + alpha + beta - 2))",
            "Three-term recurrence",
        )
}

/// Gegenbauer (ultraspherical) polynomials C_n^(lambda)(x). DLMF 18.9.
pub fn gegenbauer() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("Gegenbauer", &["n"], &["x", "lambda", "C0", "C1"])
        .namespace("gegenbauer")
        .max_index("n", 12)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], "C0")?
        .base(&[("n", 1)], "C1")?
        .scaled_rule(
            "n > 1",
            "2 * (n + lambda - 1) * x * E[n-1] + (-(n + 2*lambda - 2)) * E[n-2]",
            "1/n",
            "Three-term recurrence",
        )
}

/// Associated Laguerre polynomials L_n^(alpha)(x). DLMF 18.3.
pub fn assoc_laguerre() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("AssocLaguerre", &["n"], &["x", "alpha", "L0", "L1"])
        .namespace("laguerre")
        .max_index("n", 12)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], "L0")?
        .base(&[("n", 1)], "L1")?
        .scaled_rule(
            "n > 1",
            "(2*n - 1 + alpha - x) * E[n-1] + (-(n + alpha - 1)) * E[n-2]",
            "1/n",
            "Three-term recurrence",
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_build() {
        assert_eq!(jacobi().unwrap().rules.len(), 1);
        assert_eq!(gegenbauer().unwrap().base_cases.len(), 2);
        assert_eq!(assoc_laguerre().unwrap().runtime_vars.len(), 4);
    }
}
