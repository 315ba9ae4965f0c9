//! Dispatcher generator.
//!
//! Generated specializations are selected at compile time; callers with
//! runtime index values need a bridge. The dispatcher is a nested
//! switch over each index, bounded by the recurrence's declared
//! per-index maxima, returning the zero value out of range.

use crate::codegen::render::RenderCtx;
use crate::recurrence::Recurrence;
use crate::utils::errors::CodegenError;
use crate::utils::pretty::CodeFormatter;
use log::debug;

/// Generates a runtime-to-compile-time dispatch function.
pub struct DispatcherGenerator<'a> {
    rec: &'a Recurrence,
    ctx: RenderCtx,
}

impl<'a> DispatcherGenerator<'a> {
    /// Create a generator for the given recurrence.
    pub fn new(rec: &'a Recurrence) -> Self {
        Self {
            rec,
            ctx: RenderCtx::from_recurrence(rec),
        }
    }

    /// Generate the complete dispatcher header text.
    pub fn generate(&self) -> Result<String, CodegenError> {
        let case_count: i64 = self.rec.max_indices.iter().map(|m| m + 1).product();
        debug!(
            "dispatcher for `{}` instantiates {} specializations",
            self.rec.name, case_count
        );

        let mut f = CodeFormatter::default_indent();
        f.writeln("#pragma once");
        f.newline();
        f.writeln(&format!("#include \"{}_coeff.hpp\"", self.rec.name.to_lowercase()));
        f.newline();
        if !self.rec.namespace.is_empty() {
            f.writeln(&format!("namespace {} {{", self.rec.namespace));
            f.newline();
        }

        self.dispatch_function(&mut f);

        if !self.rec.namespace.is_empty() {
            f.newline();
            f.writeln(&format!("}} // namespace {}", self.rec.namespace));
        }
        Ok(f.finish())
    }

    fn dispatch_function(&self, f: &mut CodeFormatter) {
        let mut params: Vec<String> = self
            .rec
            .indices
            .iter()
            .map(|i| format!("int {}", i))
            .collect();
        params.extend(self.rec.runtime_vars.iter().map(|v| self.ctx.param_decl(v, true)));

        f.writeln("// Map runtime indices onto the compile-time specializations.");
        f.writeln(&format!(
            "inline {} dispatch_{}({}) {{",
            self.ctx.vec_type,
            self.rec.name,
            params.join(", ")
        ));
        f.indent();

        // Out-of-range indices resolve to the closed-world zero value.
        let bounds = self
            .rec
            .indices
            .iter()
            .zip(&self.rec.max_indices)
            .map(|(idx, max)| format!("{} < 0 || {} > {}", idx, idx, max))
            .collect::<Vec<_>>()
            .join(" || ");
        f.writeln(&format!("if ({}) {{", bounds));
        f.indent();
        f.writeln(&format!("return {};", self.ctx.lift_const(0.0)));
        f.dedent();
        f.writeln("}");
        f.newline();

        let mut chosen = Vec::new();
        self.emit_switch(f, 0, &mut chosen);

        f.dedent();
        f.writeln("}");
    }

    /// Emit nested switches, one level per index slot.
    fn emit_switch(&self, f: &mut CodeFormatter, slot: usize, chosen: &mut Vec<i64>) {
        let idx = &self.rec.indices[slot];
        let max = self.rec.max_indices[slot];

        f.writeln(&format!("switch ({}) {{", idx));
        f.indent();
        for value in 0..=max {
            chosen.push(value);
            if slot + 1 == self.rec.indices.len() {
                let targs = chosen
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                f.writeln(&format!(
                    "case {}: return {}<{}>::compute({});",
                    value,
                    self.ctx.struct_name,
                    targs,
                    self.ctx.runtime_args()
                ));
            } else {
                f.writeln(&format!("case {}:", value));
                f.indent();
                self.emit_switch(f, slot + 1, chosen);
                f.dedent();
            }
            chosen.pop();
        }
        f.writeln(&format!("default: return {};", self.ctx.lift_const(0.0)));
        f.dedent();
        f.writeln("}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_dimensional_dispatcher() {
        let rec = Recurrence::new("Legendre", &["n"], &["x"])
            .namespace("legendre")
            .max_index("n", 5)
            .unwrap();
        let code = DispatcherGenerator::new(&rec).generate().unwrap();

        assert!(code.contains("#include \"legendre_coeff.hpp\""));
        assert!(code.contains("inline Vec8d dispatch_Legendre(int n, Vec8d x)"));
        assert!(code.contains("if (n < 0 || n > 5)"));
        assert!(code.contains("case 0: return LegendreCoeff<0>::compute(x);"));
        assert!(code.contains("case 5: return LegendreCoeff<5>::compute(x);"));
        assert!(!code.contains("case 6:"));
        assert!(code.contains("default: return Vec8d(0.0);"));
    }

    #[test]
    fn test_nested_dispatcher_covers_all_indices() {
        let rec = Recurrence::new("Pair", &["n", "m"], &["x"])
            .max_index("n", 1)
            .unwrap()
            .max_index("m", 2)
            .unwrap();
        let code = DispatcherGenerator::new(&rec).generate().unwrap();

        assert!(code.contains("switch (n)"));
        assert!(code.contains("switch (m)"));
        assert!(code.contains("case 1: return PairCoeff<0, 1>::compute(x);"));
        assert!(code.contains("case 2: return PairCoeff<1, 2>::compute(x);"));
    }
}
