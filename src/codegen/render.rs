//! Expression rendering to C++.
//!
//! One exhaustive match per renderer: adding an AST variant without
//! updating the renderers is a compile error, not a silent fallthrough.

use crate::ast::{Expr, RecursiveCall, Term};
use crate::recurrence::Recurrence;
use crate::utils::pretty::format_list;

/// Naming and typing context for code generation.
#[derive(Debug, Clone)]
pub struct RenderCtx {
    /// Struct name of the recurrence being generated (e.g. `LegendreCoeff`).
    pub struct_name: String,
    /// Compile-time index names, in slot order.
    pub indices: Vec<String>,
    /// Runtime parameter names.
    pub runtime_vars: Vec<String>,
    /// Runtime parameters that are tabulated arrays.
    pub array_params: Vec<String>,
    /// SIMD vector type of generated code.
    pub vec_type: String,
}

impl RenderCtx {
    /// Build a context from a recurrence definition.
    pub fn from_recurrence(rec: &Recurrence) -> Self {
        Self {
            struct_name: rec.struct_name(),
            indices: rec.indices.clone(),
            runtime_vars: rec.runtime_vars.clone(),
            array_params: rec.array_params.clone(),
            vec_type: rec.vec_type.clone(),
        }
    }

    /// Lift a numeric constant into the vector type.
    pub fn lift_const(&self, v: f64) -> String {
        format!("{}({:?})", self.vec_type, v)
    }

    /// Lift index arithmetic into the vector type.
    pub fn lift_index_expr(&self, text: &str) -> String {
        format!("{}({})", self.vec_type, text)
    }

    /// Comma-joined runtime arguments for a compute call.
    pub fn runtime_args(&self) -> String {
        format_list(&self.runtime_vars, ", ")
    }

    /// Parameter declaration for one runtime variable; unused
    /// parameters keep their slot but are commented out.
    pub fn param_decl(&self, name: &str, used: bool) -> String {
        let is_array = self.array_params.iter().any(|a| a == name);
        match (is_array, used) {
            (true, true) => format!("const {}* {}", self.vec_type, name),
            (true, false) => format!("const {}* /*{}*/", self.vec_type, name),
            (false, true) => format!("{} {}", self.vec_type, name),
            (false, false) => format!("{} /*{}*/", self.vec_type, name),
        }
    }

    /// Struct name a call resolves to: cross-recurrence references use
    /// their own accessor name.
    pub fn call_struct_name(&self, call: &RecursiveCall) -> String {
        match &call.target {
            Some(target) => format!("{}Coeff", target),
            None => self.struct_name.clone(),
        }
    }
}

/// Render an index name with a shift applied: `t`, `t + 1`, `t - 1`.
pub fn shifted_index(name: &str, shift: i64) -> String {
    if shift == 0 {
        name.to_string()
    } else if shift > 0 {
        format!("{} + {}", name, shift)
    } else {
        format!("{} - {}", name, -shift)
    }
}

/// Render a recursive call as a specialized compute invocation.
pub fn render_call(call: &RecursiveCall, ctx: &RenderCtx) -> String {
    let template_args = ctx
        .indices
        .iter()
        .enumerate()
        .map(|(slot, name)| shifted_index(name, call.shift(slot)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}<{}>::compute({})",
        ctx.call_struct_name(call),
        template_args,
        ctx.runtime_args()
    )
}

/// Render a term: coefficient times call, with unit coefficients elided.
pub fn render_term(term: &Term, ctx: &RenderCtx) -> String {
    let call = render_call(&term.call, ctx);
    if term.is_unit_coeff() {
        call
    } else {
        format!("{} * {}", render_expr(&term.coeff, ctx), call)
    }
}

/// Render an expression to C++.
pub fn render_expr(expr: &Expr, ctx: &RenderCtx) -> String {
    match expr {
        Expr::Const(v) => ctx.lift_const(*v),
        Expr::Literal(text) => text.clone(),
        Expr::Var(name) => name.clone(),
        Expr::IndexExpr(text) => ctx.lift_index_expr(text),
        Expr::Call(call) => render_call(call, ctx),
        Expr::Binary { op, lhs, rhs } => {
            let mut l = render_expr(lhs, ctx);
            let mut r = render_expr(rhs, ctx);
            if needs_parens(lhs) {
                l = format!("({})", l);
            }
            if needs_parens(rhs) {
                r = format!("({})", r);
            }
            format!("{} {} {}", l, op.symbol(), r)
        }
        Expr::Sum(terms) => {
            if terms.is_empty() {
                return ctx.lift_const(0.0);
            }
            terms
                .iter()
                .map(|t| render_term(t, ctx))
                .collect::<Vec<_>>()
                .join(" + ")
        }
        Expr::Scaled { inner, scale, division } => {
            let op = if *division { "/" } else { "*" };
            format!(
                "({}) {} ({})",
                render_expr(inner, ctx),
                op,
                render_expr(scale, ctx)
            )
        }
        Expr::BranchAverage { branches, scale } => {
            let joined = branches
                .iter()
                .map(|b| format!("({})", render_expr(b, ctx)))
                .collect::<Vec<_>>()
                .join(" + ");
            format!("({}) * {}", joined, render_expr(scale, ctx))
        }
        Expr::CseRef(name) => name.clone(),
        Expr::FlatSum(exprs) => {
            if exprs.is_empty() {
                return ctx.lift_const(0.0);
            }
            exprs
                .iter()
                .map(|e| render_expr(e, ctx))
                .collect::<Vec<_>>()
                .join(" + ")
        }
    }
}

fn needs_parens(expr: &Expr) -> bool {
    matches!(expr, Expr::Binary { .. } | Expr::FlatSum(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;
    use crate::recurrence::Recurrence;

    fn legendre_ctx() -> RenderCtx {
        let rec = Recurrence::new("Legendre", &["n"], &["x"]);
        RenderCtx::from_recurrence(&rec)
    }

    #[test]
    fn test_render_call_with_shifts() {
        let ctx = legendre_ctx();
        let call = RecursiveCall {
            target: None,
            shifts: vec![-1],
        };
        assert_eq!(render_call(&call, &ctx), "LegendreCoeff<n - 1>::compute(x)");
    }

    #[test]
    fn test_render_cross_recurrence_call() {
        let rec = Recurrence::new("HermiteDx", &["nA", "nB", "t"], &["PA"]);
        let ctx = RenderCtx::from_recurrence(&rec);
        let call = RecursiveCall {
            target: Some("HermiteE".to_string()),
            shifts: vec![0, 0, -1],
        };
        assert_eq!(
            render_call(&call, &ctx),
            "HermiteECoeff<nA, nB, t - 1>::compute(PA)"
        );
    }

    #[test]
    fn test_unit_coefficient_elided() {
        let ctx = legendre_ctx();
        let term = Term {
            coeff: Expr::one(),
            call: RecursiveCall {
                target: None,
                shifts: vec![-2],
            },
        };
        assert_eq!(render_term(&term, &ctx), "LegendreCoeff<n - 2>::compute(x)");
    }

    #[test]
    fn test_empty_sum_is_zero() {
        let ctx = legendre_ctx();
        assert_eq!(render_expr(&Expr::Sum(vec![]), &ctx), "Vec8d(0.0)");
    }

    #[test]
    fn test_nested_binary_parenthesized() {
        let ctx = legendre_ctx();
        let e = Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::Var("a".into())),
                rhs: Box::new(Expr::Var("b".into())),
            }),
            rhs: Box::new(Expr::Var("c".into())),
        };
        assert_eq!(render_expr(&e, &ctx), "(a + b) * c");
    }

    #[test]
    fn test_scaled_renders_both_sides_parenthesized() {
        let ctx = legendre_ctx();
        let e = Expr::Scaled {
            inner: Box::new(Expr::Var("s".into())),
            scale: Box::new(Expr::IndexExpr("n".into())),
            division: true,
        };
        assert_eq!(render_expr(&e, &ctx), "(s) / (Vec8d(n))");
    }

    #[test]
    fn test_array_param_decl() {
        let rec = Recurrence::new("CoulombR", &["t", "u", "v", "N"], &["PCx", "Boys"])
            .array_param("Boys")
            .unwrap();
        let ctx = RenderCtx::from_recurrence(&rec);
        assert_eq!(ctx.param_decl("Boys", true), "const Vec8d* Boys");
        assert_eq!(ctx.param_decl("PCx", false), "Vec8d /*PCx*/");
    }
}
