//! Per-value code generator.
//!
//! Renders a recurrence into compile-time-dispatched template
//! specializations: a zero-returning primary template for out-of-domain
//! indices, one specialization per base case, and one SFINAE-guarded
//! specialization per rule, in priority order.

use crate::ast::Expr;
use crate::codegen::render::{render_expr, render_term, RenderCtx};
use crate::codegen::{file_footer, file_header, Optimization};
use crate::optimize::{should_apply_cse, Optimizer};
use crate::recurrence::{BaseCase, Recurrence, RecurrenceRule};
use crate::utils::errors::CodegenError;

/// Generates per-value C++ template code from a recurrence definition.
pub struct PerValueGenerator<'a> {
    rec: &'a Recurrence,
    ctx: RenderCtx,
    optimization: Optimization,
}

impl<'a> PerValueGenerator<'a> {
    /// Generator with default optimization (CSE).
    pub fn new(rec: &'a Recurrence) -> Self {
        Self::with_optimization(rec, Optimization::default())
    }

    /// Generator with an explicit optimization level.
    pub fn with_optimization(rec: &'a Recurrence, optimization: Optimization) -> Self {
        Self {
            rec,
            ctx: RenderCtx::from_recurrence(rec),
            optimization,
        }
    }

    /// Generate the complete header text.
    pub fn generate(&self) -> Result<String, CodegenError> {
        let mut parts = vec![file_header(&self.rec.namespace), self.primary_template()];
        for bc in &self.rec.base_cases {
            parts.push(self.base_case(bc));
        }
        for rule in self.rec.sorted_rules() {
            parts.push(self.rule(rule));
        }
        parts.push(file_footer(&self.rec.namespace));
        Ok(parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Primary template: any index combination matching neither a base
    /// case nor a rule resolves to the zero value. Out-of-domain
    /// queries are expected in vectorized callers and must degrade
    /// gracefully rather than fault.
    fn primary_template(&self) -> String {
        let tparams = self
            .rec
            .indices
            .iter()
            .map(|i| format!("int {}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let unused = self
            .rec
            .runtime_vars
            .iter()
            .map(|v| self.ctx.param_decl(v, false))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "template<{tparams}, typename Enable = void>\n\
             struct {name} {{\n\
             \x20   static RECURGEN_FORCEINLINE {vec} compute({unused}) {{\n\
             \x20       return {zero};\n\
             \x20   }}\n\
             }};",
            tparams = tparams,
            name = self.ctx.struct_name,
            vec = self.ctx.vec_type,
            unused = unused,
            zero = self.ctx.lift_const(0.0),
        )
    }

    /// One specialization per base case. A free auxiliary index stays a
    /// template parameter (partial specialization); pinned indices
    /// become literal arguments.
    fn base_case(&self, bc: &BaseCase) -> String {
        let free: Vec<&str> = self
            .rec
            .indices
            .iter()
            .enumerate()
            .filter(|(slot, _)| bc.value_at(*slot).is_none())
            .map(|(_, name)| name.as_str())
            .collect();
        let tparams = if free.is_empty() {
            "template<>".to_string()
        } else {
            format!(
                "template<{}>",
                free.iter()
                    .map(|n| format!("int {}", n))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        let targs = self
            .rec
            .indices
            .iter()
            .enumerate()
            .map(|(slot, name)| match bc.value_at(slot) {
                Some(v) => v.to_string(),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let params = self
            .rec
            .runtime_vars
            .iter()
            .map(|v| self.ctx.param_decl(v, bc.value.uses_var(v)))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{tparams}\n\
             struct {name}<{targs}, void> {{\n\
             \x20   static RECURGEN_FORCEINLINE {vec} compute({params}) {{\n\
             \x20       return {val};\n\
             \x20   }}\n\
             }};",
            tparams = tparams,
            name = self.ctx.struct_name,
            targs = targs,
            vec = self.ctx.vec_type,
            params = params,
            val = render_expr(&bc.value, &self.ctx),
        )
    }

    /// One SFINAE-guarded specialization per rule. The guard is the
    /// conjunction of the rule's own constraints and the recurrence's
    /// global validity constraints.
    fn rule(&self, rule: &RecurrenceRule) -> String {
        let tparams = self
            .rec
            .indices
            .iter()
            .map(|i| format!("int {}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let targs = self.rec.indices.join(", ");
        let sig = self
            .rec
            .runtime_vars
            .iter()
            .map(|v| self.ctx.param_decl(v, true))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sfinae = rule.guard.render();
        if !self.rec.validity.is_empty() {
            sfinae = format!("{} && {}", sfinae, self.rec.validity.render());
        }

        let comment = if rule.name.is_empty() {
            String::new()
        } else {
            format!("        // {}\n", rule.name)
        };

        format!(
            "template<{tparams}>\n\
             struct {name}<\n\
             \x20   {targs},\n\
             \x20   typename std::enable_if<{sfinae}>::type\n\
             > {{\n\
             \x20   static RECURGEN_FORCEINLINE {vec} compute({sig}) {{\n\
             {comment}{body}\n\
             \x20   }}\n\
             }};",
            tparams = tparams,
            name = self.ctx.struct_name,
            targs = targs,
            sfinae = sfinae,
            vec = self.ctx.vec_type,
            sig = sig,
            comment = comment,
            body = self.body(rule),
        )
    }

    /// Generate a rule body. Strategy depends on expression shape: CSE
    /// when the optimizer judges it beneficial, inline return for small
    /// expressions, otherwise named term temporaries for readability.
    /// All strategies denote the same value.
    fn body(&self, rule: &RecurrenceRule) -> String {
        let expr = &rule.body;
        let calls = expr.collect_calls();

        if self.optimization == Optimization::Cse && should_apply_cse(expr) {
            return self.optimized_body(expr);
        }

        if calls.len() <= 3 {
            return format!("        return {};", render_expr(expr, &self.ctx));
        }

        let mut lines = Vec::new();
        match expr {
            Expr::Sum(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    lines.push(format!(
                        "        {} t{} = {};",
                        self.ctx.vec_type,
                        i + 1,
                        render_term(term, &self.ctx)
                    ));
                }
                let vars = (1..=terms.len())
                    .map(|i| format!("t{}", i))
                    .collect::<Vec<_>>()
                    .join(" + ");
                lines.push(format!("        return {};", vars));
            }
            Expr::Scaled { inner, scale, division } if matches!(**inner, Expr::Sum(_)) => {
                let Expr::Sum(terms) = &**inner else { unreachable!() };
                for (i, term) in terms.iter().enumerate() {
                    lines.push(format!(
                        "        {} t{} = {};",
                        self.ctx.vec_type,
                        i + 1,
                        render_term(term, &self.ctx)
                    ));
                }
                let vars = (1..=terms.len())
                    .map(|i| format!("t{}", i))
                    .collect::<Vec<_>>()
                    .join(" + ");
                let op = if *division { "/" } else { "*" };
                lines.push(format!(
                    "        return ({}) {} {};",
                    vars,
                    op,
                    render_expr(scale, &self.ctx)
                ));
            }
            Expr::BranchAverage { branches, scale } => {
                let mut all_vars = Vec::new();
                for (b, branch) in branches.iter().enumerate() {
                    let label = (b'a' + (b as u8 % 26)) as char;
                    lines.push(format!("        // Branch {}", (b'A' + (b as u8 % 26)) as char));
                    match branch {
                        Expr::Sum(terms) => {
                            for (i, term) in terms.iter().enumerate() {
                                let var = format!("{}{}", label, i + 1);
                                lines.push(format!(
                                    "        {} {} = {};",
                                    self.ctx.vec_type,
                                    var,
                                    render_term(term, &self.ctx)
                                ));
                                all_vars.push(var);
                            }
                        }
                        other => {
                            let var = format!("{}1", label);
                            lines.push(format!(
                                "        {} {} = {};",
                                self.ctx.vec_type,
                                var,
                                render_expr(other, &self.ctx)
                            ));
                            all_vars.push(var);
                        }
                    }
                }
                lines.push(format!(
                    "        return ({}) * {};",
                    all_vars.join(" + "),
                    render_expr(scale, &self.ctx)
                ));
            }
            other => {
                lines.push(format!("        return {};", render_expr(other, &self.ctx)));
            }
        }
        lines.join("\n")
    }

    fn optimized_body(&self, expr: &Expr) -> String {
        let opt = Optimizer::new().optimize(expr);

        let mut lines = Vec::new();
        if !opt.bindings.is_empty() {
            lines.push("        // CSE: cache each distinct recursive call".to_string());
        }
        for (name, intermediate) in &opt.bindings {
            lines.push(format!(
                "        {} {} = {};",
                self.ctx.vec_type,
                name,
                render_expr(intermediate, &self.ctx)
            ));
        }
        lines.push(format!("        return {};", render_expr(&opt.result, &self.ctx)));
        lines.join("\n")
    }
}
