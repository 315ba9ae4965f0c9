//! Catalog of recurrence definitions.
//!
//! These are configuration data for the generators, not part of the
//! pipeline itself: each function builds one [`Recurrence`] via the
//! fluent API.

pub mod orthogonal;
pub mod mcmd;
pub mod combinatorics;
pub mod special;

pub use orthogonal::{
    legendre, chebyshev_t, chebyshev_u, hermite_he, hermite_h, laguerre, assoc_legendre,
};
pub use mcmd::{hermite_e, hermite_mcmurchie, coulomb_r};
pub use combinatorics::{binomial, fibonacci};
pub use special::{jacobi, gegenbauer, assoc_laguerre};

use crate::recurrence::Recurrence;
use crate::utils::errors::DefinitionError;

/// Every catalog recurrence, in a stable order.
pub fn all() -> Result<Vec<Recurrence>, DefinitionError> {
    Ok(vec![
        legendre()?,
        chebyshev_t()?,
        chebyshev_u()?,
        hermite_he()?,
        hermite_h()?,
        laguerre()?,
        assoc_legendre()?,
        jacobi()?,
        gegenbauer()?,
        assoc_laguerre()?,
        hermite_e()?,
        hermite_mcmurchie()?,
        coulomb_r()?,
        binomial()?,
        fibonacci()?,
    ])
}

/// Look up a catalog recurrence by name (case-insensitive).
pub fn by_name(name: &str) -> Result<Option<Recurrence>, DefinitionError> {
    Ok(all()?
        .into_iter()
        .find(|r| r.name.eq_ignore_ascii_case(name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_builds() {
        let recs = all().unwrap();
        assert!(recs.len() >= 10);
        // Names are unique.
        let mut names: Vec<_> = recs.iter().map(|r| r.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), recs.len());
    }

    #[test]
    fn test_by_name() {
        assert!(by_name("legendre").unwrap().is_some());
        assert!(by_name("NoSuchRecurrence").unwrap().is_none());
    }
}
