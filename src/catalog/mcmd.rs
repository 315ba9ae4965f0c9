//! McMurchie-Davidson recurrence relations for Gaussian integrals.
//!
//! References:
//! - McMurchie & Davidson, J. Comput. Phys. 26, 218 (1978)
//! - Helgaker & Taylor 1992, Eq. 7
//! - Helgaker et al., "Molecular Electronic-Structure Theory" Ch. 9

use crate::recurrence::Recurrence;
use crate::utils::errors::DefinitionError;

/// Hermite expansion coefficient E^{nA,nB}_t(PA, PB, aAB).
///
/// Uses Helgaker-Taylor Eq. 7, increment-i only for nA > 0, nB > 0:
///
/// ```text
/// E^{i+1,j}_t = aAB E^{i,j}_{t-1} + PA E^{i,j}_t + (t+1) E^{i,j}_{t+1}
/// ```
///
/// At t = 0 the t-1 term vanishes but the t+1 term must stay.
/// aAB = 1/(2p) with p the combined Gaussian exponent.
pub fn hermite_e() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("HermiteE", &["nA", "nB", "t"], &["PA", "PB", "aAB"])
        .namespace("mcmd_hermite")
        .max_index("nA", 3)?
        .max_index("nB", 3)?
        .max_index("t", 6)?
        .validity(&["nA >= 0", "nB >= 0", "t >= 0", "t <= nA + nB"])?
        .base(&[("nA", 0), ("nB", 0), ("t", 0)], 1.0)?
        .named_rule(
            "nA > 0 && nB == 0 && t == 0",
            "PA * E[nA-1, nB, t] + (t + 1) * E[nA-1, nB, t+1]",
            "A-side t=0",
        )?
        .named_rule(
            "nA > 0 && nB == 0 && t > 0",
            "aAB * E[nA-1, nB, t-1] + PA * E[nA-1, nB, t] + (t + 1) * E[nA-1, nB, t+1]",
            "A-side t>0",
        )?
        .named_rule(
            "nA == 0 && nB > 0 && t == 0",
            "PB * E[nA, nB-1, t] + (t + 1) * E[nA, nB-1, t+1]",
            "B-side t=0",
        )?
        .named_rule(
            "nA == 0 && nB > 0 && t > 0",
            "aAB * E[nA, nB-1, t-1] + PB * E[nA, nB-1, t] + (t + 1) * E[nA, nB-1, t+1]",
            "B-side t>0",
        )?
        .named_rule(
            "nA > 0 && nB > 0 && t == 0",
            "PA * E[nA-1, nB, t] + (t + 1) * E[nA-1, nB, t+1]",
            "General t=0 (increment-i only)",
        )?
        .named_rule(
            "nA > 0 && nB > 0 && t > 0",
            "aAB * E[nA-1, nB, t-1] + PA * E[nA-1, nB, t] + (t + 1) * E[nA-1, nB, t+1]",
            "General t>0 (increment-i only)",
        )
}

/// Hermite coefficients with two-branch averaging for nA > 0, nB > 0.
///
/// When both reduction directions are valid, averaging them is the
/// numerically stable choice.
pub fn hermite_mcmurchie() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("Hermite", &["nA", "nB", "N"], &["PA", "PB", "aAB"])
        .namespace("hermite")
        .max_index("nA", 3)?
        .max_index("nB", 3)?
        .max_index("N", 6)?
        .validity(&["nA >= 0", "nB >= 0", "N >= 0", "nA + nB >= N"])?
        .base(&[("nA", 0), ("nB", 0), ("N", 0)], 1.0)?
        .named_rule(
            "nA == 0 && nB > 0",
            "aAB * E[nA, nB-1, N-1] + PB * E[nA, nB-1, N] + (N+1) * E[nA, nB-1, N+1]",
            "B-side reduction",
        )?
        .named_rule(
            "nB == 0 && nA > 0",
            "aAB * E[nA-1, nB, N-1] + PA * E[nA-1, nB, N] + (N+1) * E[nA-1, nB, N+1]",
            "A-side reduction",
        )?
        .branch_average(
            "nA > 0 && nB > 0",
            &[
                "aAB * E[nA, nB-1, N-1] + PB * E[nA, nB-1, N] + (N+1) * E[nA, nB-1, N+1]",
                "aAB * E[nA-1, nB, N-1] + PA * E[nA-1, nB, N] + (N+1) * E[nA-1, nB, N+1]",
            ],
            "Two-branch average",
        )
}

/// Coulomb auxiliary integral R^{(N)}_{t,u,v}(PCx, PCy, PCz, Boys).
///
/// Hermite Coulomb integrals over 1/|r-C|:
///
/// ```text
/// R_{000}^{(N)} = Boys[N]
/// R_{tuv}^{(N)} = PCx R_{t-1,u,v}^{(N+1)} + (t-1) R_{t-2,u,v}^{(N+1)}   (t > 0)
/// ```
///
/// with analogous u- and v-recurrences at t = 0.
pub fn coulomb_r() -> Result<Recurrence, DefinitionError> {
    Recurrence::new("CoulombR", &["t", "u", "v", "N"], &["PCx", "PCy", "PCz", "Boys"])
        .namespace("mcmd_coulomb")
        .array_param("Boys")?
        .max_index("t", 6)?
        .max_index("u", 6)?
        .max_index("v", 6)?
        .max_index("N", 6)?
        .validity(&["t >= 0", "u >= 0", "v >= 0", "N >= 0"])?
        .base(&[("t", 0), ("u", 0), ("v", 0)], "Boys[N]")?
        .named_rule(
            "t > 0",
            "PCx * E[t-1, u, v, N+1] + (t - 1) * E[t-2, u, v, N+1]",
            "X-recurrence",
        )?
        .named_rule(
            "t == 0 && u > 0",
            "PCy * E[t, u-1, v, N+1] + (u - 1) * E[t, u-2, v, N+1]",
            "Y-recurrence",
        )?
        .named_rule(
            "t == 0 && u == 0 && v > 0",
            "PCz * E[t, u, v-1, N+1] + (v - 1) * E[t, u, v-2, N+1]",
            "Z-recurrence",
        )
}
