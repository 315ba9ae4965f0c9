//! # recurgen - Recurrence Relation Code Generator
//!
//! A domain-specific compiler for linear recurrence relations: takes a
//! declarative description of a recurrence (indices, validity
//! constraints, base cases, guarded rules) and emits specialized,
//! compile-time-dispatchable C++ template code for evaluating it.
//!
//! ## Architecture
//!
//! ```text
//! Recurrence (fluent builder) → DSL Parser → Expr AST → Optimizer (CSE)
//!                                                          ↓
//!                      Per-Value / Layered / Dispatcher Generators → C++ text
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use recurgen::recurrence::Recurrence;
//!
//! let rec = Recurrence::new("Legendre", &["n"], &["x"])
//!     .namespace("legendre")
//!     .validity(&["n >= 0"])?
//!     .base(&[("n", 0)], 1.0)?
//!     .base(&[("n", 1)], "x")?
//!     .scaled_rule("n > 1", "(2*n-1) * x * E[n-1] + (-(n-1)) * E[n-2]",
//!                  "1/n", "Three-term recurrence")?;
//!
//! let header = recurgen::generate(&rec)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(dead_code)] // During development

pub mod ast;
pub mod constraint;
pub mod dsl;
pub mod recurrence;
pub mod optimize;
pub mod codegen;
pub mod eval;
pub mod catalog;
pub mod orchestrator;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::ast::{BinOp, Expr, RecursiveCall, Term};
    pub use crate::constraint::{CmpOp, Constraint, ConstraintSet};
    pub use crate::dsl::{DslPrinter, RuleParser};
    pub use crate::recurrence::{BaseCase, Recurrence, RecurrenceRule};
    pub use crate::optimize::{Optimizer, OptimizedExpr, should_apply_cse};
    pub use crate::codegen::{
        DispatcherGenerator, LayeredGenerator, Optimization, PerValueGenerator,
    };
    pub use crate::eval::{EvalEnv, Evaluator};
    pub use crate::utils::errors::*;
}

use anyhow::Result;
use recurrence::Recurrence;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Generate per-value template code for a recurrence, with default
/// optimization (CSE).
pub fn generate(rec: &Recurrence) -> Result<String> {
    let code = codegen::PerValueGenerator::new(rec).generate()?;
    Ok(code)
}

/// Generate per-value template code with an explicit optimization
/// level.
pub fn generate_with(rec: &Recurrence, optimization: codegen::Optimization) -> Result<String> {
    let code = codegen::PerValueGenerator::with_optimization(rec, optimization).generate()?;
    Ok(code)
}

/// Generate layered template code for a recurrence.
pub fn generate_layered(rec: &Recurrence) -> Result<String> {
    let code = codegen::LayeredGenerator::new(rec).generate()?;
    Ok(code)
}

/// Generate a runtime dispatcher for a recurrence.
pub fn generate_dispatcher(rec: &Recurrence) -> Result<String> {
    let code = codegen::DispatcherGenerator::new(rec).generate()?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_top_level_pipeline() {
        let rec = catalog::legendre().unwrap();
        let code = generate(&rec).unwrap();
        assert!(code.contains("LegendreCoeff"));
    }
}
