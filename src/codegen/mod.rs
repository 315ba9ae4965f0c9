//! Code generation from recurrence definitions.
//!
//! Two code shapes are produced from the same definition:
//! - [`pervalue`]: one compile-time-dispatched specialization per base
//!   case and rule, computing a single value per call.
//! - [`layered`]: templates that compute the entire auxiliary-index
//!   range of a layer in one call, reusing the previous layer's buffer
//!   instead of re-deriving values recursively.
//!
//! [`dispatcher`] additionally maps runtime integer indices onto the
//! per-value specializations.

pub mod render;
pub mod pervalue;
pub mod layered;
pub mod dispatcher;

pub use render::RenderCtx;
pub use pervalue::PerValueGenerator;
pub use layered::{LayeredGenerator, LayerBounds};
pub use dispatcher::DispatcherGenerator;

/// Optimization level for per-value code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimization {
    /// No optimizations, direct code generation
    None,
    /// Common subexpression elimination
    #[default]
    Cse,
}

/// Shared file header: include preamble and the portable force-inline
/// macro, plus the namespace opener.
pub fn file_header(namespace: &str) -> String {
    let ns = if namespace.is_empty() {
        String::new()
    } else {
        format!("namespace {} {{\n", namespace)
    };
    format!(
        r#"#pragma once

#include <type_traits>
#include <recurgen/vectorclass.h>

// Portable force-inline macro for performance-critical compute methods
#ifndef RECURGEN_FORCEINLINE
  #ifdef _MSC_VER
    #define RECURGEN_FORCEINLINE __forceinline
  #elif defined(__GNUC__) || defined(__clang__)
    #define RECURGEN_FORCEINLINE inline __attribute__((always_inline))
  #else
    #define RECURGEN_FORCEINLINE inline
  #endif
#endif

{}"#,
        ns
    )
}

/// Shared file footer: namespace closer.
pub fn file_footer(namespace: &str) -> String {
    if namespace.is_empty() {
        String::new()
    } else {
        format!("}} // namespace {}", namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_contains_macro_and_namespace() {
        let h = file_header("legendre");
        assert!(h.contains("#pragma once"));
        assert!(h.contains("RECURGEN_FORCEINLINE"));
        assert!(h.contains("namespace legendre {"));
        assert_eq!(file_footer("legendre"), "} // namespace legendre");
    }

    #[test]
    fn test_empty_namespace() {
        assert!(!file_header("").contains("namespace"));
        assert_eq!(file_footer(""), "");
    }
}
