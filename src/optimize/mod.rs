//! AST-level optimizations applied before code generation.
//!
//! The only transformation is common-subexpression elimination over
//! recursive calls and repeated non-trivial coefficients. CSE is never
//! required for correctness: skipping it changes the shape of generated
//! code but not its value.

pub mod cse;

pub use cse::{
    Optimizer, OptimizedExpr, OpCounts, count_operations, estimate_cost, should_apply_cse,
};
