//! The einsum-like rule DSL.
//!
//! Rule bodies are written as sums of coefficient-scaled recursive
//! calls:
//!
//! ```text
//! aAB * E[nA-1, nB, t-1] + PA * E[nA-1, nB, t] + (t + 1) * E[nA-1, nB, t+1]
//! ```
//!
//! [`parser`] converts rule strings into the expression AST,
//! [`index_arith`] parses the integer arithmetic inside index
//! expressions, and [`printer`] renders an AST back to DSL text.

pub mod index_arith;
pub mod parser;
pub mod printer;

pub use parser::RuleParser;
pub use printer::DslPrinter;
pub use index_arith::IntExpr;
