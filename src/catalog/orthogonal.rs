//! Orthogonal polynomial recurrence relations.
//!
//! Recurrences follow DLMF chapter 18 (<https://dlmf.nist.gov/18>).

use crate::recurrence::Recurrence;
use crate::utils::errors::DefinitionError;

/// Legendre polynomials P_n(x). DLMF 18.9.
pub fn legendre() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("Legendre", &["n"], &["x"])
        .namespace("legendre")
        .max_index("n", 15)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], 1.0)?
        .base(&[("n", 1)], "x")?
        .scaled_rule(
            "n > 1",
            "(2*n-1) * x * E[n-1] + (-(n-1)) * E[n-2]",
            "1/n",
            "Three-term recurrence",
        )
}

/// Chebyshev polynomials of the first kind T_n(x). DLMF 18.3.
pub fn chebyshev_t() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("ChebyshevT", &["n"], &["x"])
        .namespace("chebyshev")
        .max_index("n", 15)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], 1.0)?
        .base(&[("n", 1)], "x")?
        .named_rule("n > 1", "(2) * x * E[n-1] + (-1) * E[n-2]", "Three-term")
}

/// Chebyshev polynomials of the second kind U_n(x). DLMF 18.3.
pub fn chebyshev_u() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("ChebyshevU", &["n"], &["x", "two_x"])
        .namespace("chebyshev")
        .max_index("n", 15)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], 1.0)?
        .base(&[("n", 1)], "two_x")?
        .named_rule("n > 1", "two_x * E[n-1] + (-1) * E[n-2]", "Three-term")
}

/// Probabilist's Hermite polynomials He_n(x). DLMF 18.3.
pub fn hermite_he() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("HermiteHe", &["n"], &["x"])
        .namespace("hermite_poly")
        .max_index("n", 15)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], 1.0)?
        .base(&[("n", 1)], "x")?
        .named_rule("n > 1", "x * E[n-1] + (-(n-1)) * E[n-2]", "Three-term")
}

/// Physicist's Hermite polynomials H_n(x). DLMF 18.3.
pub fn hermite_h() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("HermiteH", &["n"], &["x", "two_x"])
        .namespace("hermite_poly")
        .max_index("n", 15)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], 1.0)?
        .base(&[("n", 1)], "two_x")?
        .named_rule("n > 1", "two_x * E[n-1] + (-2*(n-1)) * E[n-2]", "Three-term")
}

/// Laguerre polynomials L_n(x). DLMF 18.3.
pub fn laguerre() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("Laguerre", &["n"], &["x", "one_minus_x"])
        .namespace("laguerre")
        .max_index("n", 15)?
        .validity(&["n >= 0"])?
        .base(&[("n", 0)], 1.0)?
        .base(&[("n", 1)], "one_minus_x")?
        .scaled_rule(
            "n > 1",
            "(2*n-1-x) * E[n-1] + (-(n-1)) * E[n-2]",
            "1/n",
            "Three-term",
        )
}

/// Associated Legendre functions P_l^m(x). DLMF 14.7.
pub fn assoc_legendre() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("AssocLegendre", &["l", "m"], &["x", "sqrt1mx2"])
        .namespace("legendre")
        .max_index("l", 10)?
        .max_index("m", 10)?
        .validity(&["l >= 0", "m >= 0", "l >= m"])?
        .base(&[("l", 0), ("m", 0)], 1.0)?
        .named_rule("l == m && m > 0", "(-(2*m-1)) * sqrt1mx2 * E[l-1, m-1]", "Diagonal")?
        .named_rule("l == m + 1", "(2*m+1) * x * E[l-1, m]", "First off-diagonal")?
        .scaled_rule(
            "l > m + 1",
            "(2*l-1) * x * E[l-1, m] + (-(l+m-1)) * E[l-2, m]",
            "1/(l-m)",
            "General",
        )
}
