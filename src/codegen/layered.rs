//! Layered code generator.
//!
//! Computes the entire auxiliary-index range of a layer in one call.
//! Evaluating `f(i, j, t)` independently for every t re-derives the
//! shared `(i-1, j, .)` sub-layer once per t; the layered shape
//! computes that sub-layer exactly once into a stack buffer and derives
//! every output from buffer reads. The buffer size is a compile-time
//! function of the layer indices, so there is no runtime cache and no
//! heap allocation.

use crate::ast::{Expr, Term};
use crate::codegen::render::{render_expr, shifted_index, RenderCtx};
use crate::codegen::{file_footer, file_header};
use crate::dsl::index_arith::{self, IntExpr, IntOp};
use crate::recurrence::{BaseCase, Recurrence, RecurrenceRule};
use crate::utils::errors::{CodegenError, CodegenErrorKind};
use log::warn;
use std::collections::BTreeMap;

/// Extra auxiliary-range margin for tabulated (Coulomb-style)
/// recurrences: a two-step recurrence reads the previous layer at an
/// auxiliary offset up to 2 beyond what a single-step recurrence needs,
/// on both descent paths.
pub const TABULATED_AUX_MARGIN: i64 = 4;

/// The inferred (or defaulted) auxiliary range of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBounds {
    /// Expression for the number of values in a layer (`N_VALUES`).
    pub n_values: String,
    /// False when no validity bound was found and the size defaulted
    /// to a single-value layer.
    pub inferred: bool,
}

/// How the auxiliary index is bound while rewriting a rule body.
enum AuxBinding<'a> {
    /// Inside the general loop: the loop variable (the aux index name).
    LoopVar(&'a str),
    /// Unrolled boundary case: a literal value.
    Literal(i64),
    /// Symbolic position, e.g. `N_VALUES - 1` for the top boundary.
    Symbolic(&'a str),
}

/// Generates layer-batched C++ template code from a recurrence
/// definition.
pub struct LayeredGenerator<'a> {
    rec: &'a Recurrence,
    ctx: RenderCtx,
}

impl<'a> LayeredGenerator<'a> {
    /// Create a generator for the given recurrence.
    pub fn new(rec: &'a Recurrence) -> Self {
        Self {
            rec,
            ctx: RenderCtx::from_recurrence(rec),
        }
    }

    fn tabulated(&self) -> bool {
        !self.rec.array_params.is_empty()
    }

    /// Infer the auxiliary range of a layer.
    ///
    /// Tabulated recurrences get the inflated sum-of-layer-indices
    /// bound; otherwise the bound comes from an `aux <= expr` validity
    /// constraint. With neither, the size defaults to 1, which usually
    /// means a missing validity constraint; the flag makes that
    /// detectable and a warning is logged.
    pub fn layer_bounds(&self) -> LayerBounds {
        if self.tabulated() {
            let sum = self.rec.layer_names().join(" + ");
            return LayerBounds {
                n_values: format!("{} + {}", sum, TABULATED_AUX_MARGIN),
                inferred: true,
            };
        }
        if let Some(rhs) = self.rec.validity.upper_bound_of(self.rec.aux_name()) {
            let n_values = match index_arith::parse(rhs) {
                Ok(bound) => IntExpr::Bin {
                    op: IntOp::Add,
                    lhs: Box::new(bound),
                    rhs: Box::new(IntExpr::Num(1)),
                }
                .simplify()
                .to_string(),
                Err(_) => format!("({}) + 1", rhs),
            };
            return LayerBounds { n_values, inferred: true };
        }
        warn!(
            "{}: no `{} <= ...` validity constraint; defaulting layer size to 1",
            self.rec.name,
            self.rec.aux_name()
        );
        LayerBounds {
            n_values: "1".to_string(),
            inferred: false,
        }
    }

    /// Generate the complete header text.
    pub fn generate(&self) -> Result<String, CodegenError> {
        if self.rec.indices.len() < 2 {
            return Err(CodegenError::new(
                CodegenErrorKind::MissingLayerIndex,
                format!(
                    "recurrence `{}` has no layer index; layered generation needs at least two indices",
                    self.rec.name
                ),
            ));
        }

        let bounds = self.layer_bounds();

        let mut parts = vec![file_header(&self.rec.namespace), self.primary_template()];
        for bc in &self.rec.base_cases {
            parts.push(self.base_layer(bc));
        }
        for (key, rules) in self.layer_groups() {
            parts.push(self.layer_group(&key, &rules, &bounds)?);
        }
        parts.push(self.accessor_template(&bounds));
        parts.push(file_footer(&self.rec.namespace));

        Ok(parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    fn layer_tparams(&self) -> String {
        self.rec
            .layer_names()
            .iter()
            .map(|n| format!("int {}", n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn layer_targs(&self) -> String {
        self.rec.layer_names().join(", ")
    }

    fn signature(&self, used: impl Fn(&str) -> bool) -> String {
        self.rec
            .runtime_vars
            .iter()
            .map(|v| self.ctx.param_decl(v, used(v)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Fallback layer: out-of-domain layer indices write nothing.
    fn primary_template(&self) -> String {
        let unused = self.signature(|_| false);
        format!(
            "template<{tparams}, typename Enable = void>\n\
             struct {name} {{\n\
             \x20   static constexpr int N_VALUES = 0;\n\
             \n\
             \x20   static RECURGEN_FORCEINLINE void compute({vec}* /*out*/, {unused}) {{\n\
             \x20       // Out-of-domain layer: nothing to write.\n\
             \x20   }}\n\
             }};",
            tparams = self.layer_tparams(),
            name = self.rec.layer_struct_name(),
            vec = self.ctx.vec_type,
            unused = unused,
        )
    }

    /// The tabulated-array lookup text of a base case value, if any.
    fn tabulated_base<'b>(&self, bc: &'b BaseCase) -> Option<&'b str> {
        if let Expr::Literal(text) = &bc.value {
            for array in &self.rec.array_params {
                if text.starts_with(&format!("{}[", array)) {
                    return Some(text);
                }
            }
        }
        None
    }

    /// One layer specialization per base case.
    fn base_layer(&self, bc: &BaseCase) -> String {
        let layer_slots = self.rec.layer_slots();
        let targs = layer_slots
            .iter()
            .map(|&s| bc.value_at(s).unwrap_or(0).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let layer_sum: i64 = layer_slots.iter().map(|&s| bc.value_at(s).unwrap_or(0)).sum();

        let aux = self.rec.aux_name();
        let params = self.signature(|v| bc.value.uses_var(v));

        let (n_values, body) = if let Some(lookup) = self.tabulated_base(bc) {
            // Whole base layer copied from the tabulated function.
            let body = format!(
                "        // Base layer: copy the tabulated function values.\n\
                 \x20       for (int {aux} = 0; {aux} < N_VALUES; ++{aux}) {{\n\
                 \x20           out[{aux}] = {lookup};\n\
                 \x20       }}",
                aux = aux,
                lookup = lookup,
            );
            (layer_sum + TABULATED_AUX_MARGIN, body)
        } else {
            let aux_value = bc.value_at(self.rec.aux);
            let slot = aux_value.unwrap_or(0);
            let body = format!(
                "        // Remaining slots rely on the caller's zero-initialized buffer.\n\
                 \x20       out[{}] = {};",
                slot,
                render_expr(&bc.value, &self.ctx),
            );
            (slot + 1, body)
        };

        format!(
            "template<>\n\
             struct {name}<{targs}, void> {{\n\
             \x20   static constexpr int N_VALUES = {n_values};\n\
             \n\
             \x20   static RECURGEN_FORCEINLINE void compute({vec}* out, {params}) {{\n\
             {body}\n\
             \x20   }}\n\
             }};",
            name = self.rec.layer_struct_name(),
            targs = targs,
            n_values = n_values,
            vec = self.ctx.vec_type,
            params = params,
            body = body,
        )
    }

    /// Rules grouped by their layer-index constraints (auxiliary-index
    /// constraints excluded). Keys are sorted for deterministic output.
    fn layer_groups(&self) -> Vec<(String, Vec<&RecurrenceRule>)> {
        let mut groups: BTreeMap<String, Vec<&RecurrenceRule>> = BTreeMap::new();
        for rule in &self.rec.rules {
            groups.entry(self.layer_key(rule)).or_default().push(rule);
        }
        groups.into_iter().collect()
    }

    fn layer_key(&self, rule: &RecurrenceRule) -> String {
        let aux = self.rec.aux_name();
        let layer_names: Vec<String> = self
            .rec
            .layer_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut parts: Vec<String> = rule
            .guard
            .constraints
            .iter()
            .filter(|c| c.mentions_any(&layer_names) && !c.mentions(aux))
            .map(|c| c.render())
            .collect();
        parts.sort();
        parts.join(" && ")
    }

    /// The rule's role within its layer: the `aux == 0` boundary, the
    /// general case, or the `aux == max` boundary.
    fn aux_role(&self, rule: &RecurrenceRule) -> AuxRole {
        let aux = self.rec.aux_name();
        for c in &rule.guard.constraints {
            if !c.mentions(aux) {
                continue;
            }
            return match c.op {
                crate::constraint::CmpOp::Eq => {
                    if c.right.trim() == "0" {
                        AuxRole::Zero
                    } else {
                        AuxRole::Max
                    }
                }
                _ => AuxRole::General,
            };
        }
        AuxRole::General
    }

    /// Generate one layer template for a group of rules sharing layer
    /// constraints.
    fn layer_group(
        &self,
        key: &str,
        rules: &[&RecurrenceRule],
        bounds: &LayerBounds,
    ) -> Result<String, CodegenError> {
        let mut zero: Option<&RecurrenceRule> = None;
        let mut general: Option<&RecurrenceRule> = None;
        let mut max_rule: Option<&RecurrenceRule> = None;
        for rule in rules {
            let slot = match self.aux_role(rule) {
                AuxRole::Zero => &mut zero,
                AuxRole::General => &mut general,
                AuxRole::Max => &mut max_rule,
            };
            if slot.is_some() {
                warn!(
                    "{}: layer group `{}` has more than one rule in the same auxiliary role; keeping the first",
                    self.rec.name, key
                );
            } else {
                *slot = Some(rule);
            }
        }
        // Cross-recurrence calls cannot be redirected into a previous
        // layer buffer of this recurrence.
        for rule in rules {
            for call in rule.body.collect_calls() {
                if call.target.is_some() {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnsupportedShape,
                        format!(
                            "recurrence `{}`: cross-recurrence calls are not supported in layered generation",
                            self.rec.name
                        ),
                    ));
                }
                if call.spatial_signature(self.rec.aux).iter().all(|&s| s == 0) {
                    return Err(CodegenError::new(
                        CodegenErrorKind::UnsupportedShape,
                        format!(
                            "recurrence `{}`: rule reads its own layer (no layer-index shift)",
                            self.rec.name
                        ),
                    ));
                }
            }
        }

        // One previous-layer buffer per distinct spatial-shift
        // signature, nearest layer first.
        let mut sigs: Vec<Vec<i64>> = Vec::new();
        let mut max_shift: i64 = 0;
        let mut min_shift: i64 = 0;
        for rule in rules {
            for call in rule.body.collect_calls() {
                let sig = call.spatial_signature(self.rec.aux);
                if !sigs.contains(&sig) {
                    sigs.push(sig);
                }
                max_shift = max_shift.max(call.shift(self.rec.aux).abs());
                min_shift = min_shift.min(call.shift(self.rec.aux));
            }
        }

        // Negative auxiliary shifts read below the loop start. The
        // unrolled `aux == 0` case absorbs a -1 shift; anything deeper
        // has no in-bounds rendering.
        let loop_start = if zero.is_some() { 1 } else { 0 };
        if general.is_some() && min_shift < -loop_start {
            return Err(CodegenError::new(
                CodegenErrorKind::UnsupportedShape,
                format!(
                    "recurrence `{}`: rule reads auxiliary offset {} but the layer loop starts at {}; \
                     add an `{} == 0` boundary rule",
                    self.rec.name,
                    min_shift,
                    loop_start,
                    self.rec.aux_name()
                ),
            ));
        }
        sigs.sort_by_key(|s| (s.iter().map(|v| v.abs()).sum::<i64>(), s.clone()));

        let buffers: BTreeMap<Vec<i64>, String> = if sigs.len() == 1 {
            BTreeMap::from([(sigs[0].clone(), "prev".to_string())])
        } else {
            sigs.iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), format!("prev_{}", i)))
                .collect()
        };

        let prev_size = if max_shift > 0 {
            format!("N_VALUES + {}", max_shift)
        } else {
            "N_VALUES".to_string()
        };

        let mut lines: Vec<String> = Vec::new();
        lines.push(
            "        // Compute each previous layer once; the zero-initialized tail".to_string(),
        );
        lines.push(
            "        // covers reads shifted past that layer's own range.".to_string(),
        );
        for sig in &sigs {
            let name = &buffers[sig];
            let targs = self
                .rec
                .layer_names()
                .iter()
                .zip(sig.iter())
                .map(|(idx, &shift)| shifted_index(idx, shift))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "        {} {}[{}] = {{}};",
                self.ctx.vec_type, name, prev_size
            ));
            lines.push(format!(
                "        {}<{}>::compute({}, {});",
                self.rec.layer_struct_name(),
                targs,
                name,
                self.ctx.runtime_args()
            ));
        }
        lines.push(String::new());

        if let Some(rule) = zero {
            if rule.body.collect_calls().iter().any(|c| c.shift(self.rec.aux) < 0) {
                return Err(CodegenError::new(
                    CodegenErrorKind::UnsupportedShape,
                    format!(
                        "recurrence `{}`: the `{} == 0` rule reads below the layer start",
                        self.rec.name,
                        self.rec.aux_name()
                    ),
                ));
            }
        }

        let aux = self.rec.aux_name();
        if let Some(rule) = zero {
            lines.push(format!("        // {} == 0 unrolled at the boundary.", aux));
            lines.push(format!(
                "        out[0] = {};",
                self.rewrite(&rule.body, &AuxBinding::Literal(0), &buffers)
            ));
        }
        if let Some(rule) = general {
            if zero.is_some() {
                lines.push(String::new());
            }
            let start = if zero.is_some() { 1 } else { 0 };
            let end = if max_rule.is_some() {
                "N_VALUES - 1"
            } else {
                "N_VALUES"
            };
            lines.push("        // General case.".to_string());
            lines.push(format!(
                "        for (int {aux} = {start}; {aux} < {end}; ++{aux}) {{",
                aux = aux,
                start = start,
                end = end,
            ));
            lines.push(format!(
                "            out[{}] = {};",
                aux,
                self.rewrite(&rule.body, &AuxBinding::LoopVar(aux), &buffers)
            ));
            lines.push("        }".to_string());
        }
        if let Some(rule) = max_rule {
            lines.push(String::new());
            lines.push(format!("        // {} == max boundary.", aux));
            lines.push("        if (N_VALUES > 1) {".to_string());
            lines.push(format!(
                "            out[N_VALUES - 1] = {};",
                self.rewrite(&rule.body, &AuxBinding::Symbolic("N_VALUES - 1"), &buffers)
            ));
            lines.push("        }".to_string());
        }

        let mut sfinae_parts: Vec<String> = Vec::new();
        if !key.is_empty() {
            sfinae_parts.push(key.to_string());
        }
        let layer_validity: Vec<String> = self
            .rec
            .validity
            .constraints
            .iter()
            .filter(|c| !c.mentions(aux))
            .map(|c| c.render())
            .collect();
        if !layer_validity.is_empty() {
            sfinae_parts.push(layer_validity.join(" && "));
        }
        let sfinae = if sfinae_parts.is_empty() {
            "true".to_string()
        } else {
            sfinae_parts.join(" && ")
        };

        Ok(format!(
            "template<{tparams}>\n\
             struct {name}<\n\
             \x20   {targs},\n\
             \x20   typename std::enable_if<{sfinae}>::type\n\
             > {{\n\
             \x20   static constexpr int N_VALUES = {n_values};\n\
             \n\
             \x20   static RECURGEN_FORCEINLINE void compute({vec}* out, {sig}) {{\n\
             {body}\n\
             \x20   }}\n\
             }};",
            tparams = self.layer_tparams(),
            name = self.rec.layer_struct_name(),
            targs = self.layer_targs(),
            sfinae = sfinae,
            n_values = bounds.n_values,
            vec = self.ctx.vec_type,
            sig = self.signature(|_| true),
            body = lines.join("\n"),
        ))
    }

    /// Pure substitution pass: every recursive call becomes a buffer
    /// read at the bound auxiliary position plus the call's shift; all
    /// other nodes render unchanged, preserving arithmetic structure.
    fn rewrite(
        &self,
        expr: &Expr,
        binding: &AuxBinding<'_>,
        buffers: &BTreeMap<Vec<i64>, String>,
    ) -> String {
        match expr {
            Expr::Const(v) => self.ctx.lift_const(*v),
            Expr::Literal(text) => text.clone(),
            Expr::Var(name) => name.clone(),
            Expr::IndexExpr(text) => self.rewrite_index_expr(text, binding),
            Expr::Call(call) => {
                let buffer = buffers
                    .get(&call.spatial_signature(self.rec.aux))
                    .cloned()
                    .unwrap_or_else(|| "prev".to_string());
                let shift = call.shift(self.rec.aux);
                let index = match binding {
                    AuxBinding::LoopVar(name) => shifted_index(name, shift),
                    AuxBinding::Literal(v) => (v + shift).to_string(),
                    AuxBinding::Symbolic(text) => {
                        if shift == 0 {
                            (*text).to_string()
                        } else if shift > 0 {
                            format!("{} + {}", text, shift)
                        } else {
                            format!("{} - {}", text, -shift)
                        }
                    }
                };
                format!("{}[{}]", buffer, index)
            }
            Expr::Binary { op, lhs, rhs } => {
                let mut l = self.rewrite(lhs, binding, buffers);
                let mut r = self.rewrite(rhs, binding, buffers);
                if matches!(**lhs, Expr::Binary { .. } | Expr::FlatSum(_)) {
                    l = format!("({})", l);
                }
                if matches!(**rhs, Expr::Binary { .. } | Expr::FlatSum(_)) {
                    r = format!("({})", r);
                }
                format!("{} {} {}", l, op.symbol(), r)
            }
            Expr::Sum(terms) => {
                if terms.is_empty() {
                    return self.ctx.lift_const(0.0);
                }
                terms
                    .iter()
                    .map(|t| self.rewrite_term(t, binding, buffers))
                    .collect::<Vec<_>>()
                    .join(" + ")
            }
            Expr::Scaled { inner, scale, division } => {
                let op = if *division { "/" } else { "*" };
                format!(
                    "({}) {} ({})",
                    self.rewrite(inner, binding, buffers),
                    op,
                    self.rewrite(scale, binding, buffers)
                )
            }
            Expr::BranchAverage { branches, scale } => {
                let joined = branches
                    .iter()
                    .map(|b| format!("({})", self.rewrite(b, binding, buffers)))
                    .collect::<Vec<_>>()
                    .join(" + ");
                format!("({}) * {}", joined, self.rewrite(scale, binding, buffers))
            }
            Expr::CseRef(name) => name.clone(),
            Expr::FlatSum(exprs) => {
                if exprs.is_empty() {
                    return self.ctx.lift_const(0.0);
                }
                exprs
                    .iter()
                    .map(|e| self.rewrite(e, binding, buffers))
                    .collect::<Vec<_>>()
                    .join(" + ")
            }
        }
    }

    fn rewrite_term(
        &self,
        term: &Term,
        binding: &AuxBinding<'_>,
        buffers: &BTreeMap<Vec<i64>, String>,
    ) -> String {
        let call = self.rewrite(&Expr::Call(term.call.clone()), binding, buffers);
        if term.is_unit_coeff() {
            call
        } else {
            format!("{} * {}", self.rewrite(&term.coeff, binding, buffers), call)
        }
    }

    /// Index expressions referencing the auxiliary index fold when it
    /// is bound to a literal, so the unrolled boundary case emits
    /// constants instead of dead arithmetic.
    fn rewrite_index_expr(&self, text: &str, binding: &AuxBinding<'_>) -> String {
        let aux = self.rec.aux_name();
        if !index_arith::contains_ident(text, aux) {
            return self.ctx.lift_index_expr(text);
        }
        match binding {
            AuxBinding::LoopVar(_) => self.ctx.lift_index_expr(text),
            AuxBinding::Literal(v) => match index_arith::parse(text) {
                Ok(parsed) => {
                    let folded = parsed.substitute(aux, *v).simplify();
                    match folded.as_constant() {
                        Some(c) => self.ctx.lift_const(c as f64),
                        None => self.ctx.lift_index_expr(&folded.to_string()),
                    }
                }
                Err(_) => self.ctx.lift_index_expr(text),
            },
            AuxBinding::Symbolic(replacement) => {
                let replaced =
                    index_arith::replace_ident(text, aux, &format!("({})", replacement));
                self.ctx.lift_index_expr(&replaced)
            }
        }
    }

    /// Single-value accessor: callers wanting one value still run the
    /// layered computation underneath, preserving the per-value API.
    fn accessor_template(&self, bounds: &LayerBounds) -> String {
        let tparams = self
            .rec
            .indices
            .iter()
            .map(|i| format!("int {}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let aux = self.rec.aux_name();
        let n = &bounds.n_values;

        format!(
            "// API compatibility: single-value accessor over the layered computation.\n\
             template<{tparams}>\n\
             struct {name} {{\n\
             \x20   static RECURGEN_FORCEINLINE {vec} compute({sig}) {{\n\
             \x20       if constexpr ({aux} < 0 || {aux} >= ({n})) {{\n\
             \x20           return {zero};\n\
             \x20       }} else {{\n\
             \x20           {vec} layer[{n}] = {{}};\n\
             \x20           {layer_name}<{layer_targs}>::compute(layer, {args});\n\
             \x20           return layer[{aux}];\n\
             \x20       }}\n\
             \x20   }}\n\
             }};",
            tparams = tparams,
            name = self.ctx.struct_name,
            vec = self.ctx.vec_type,
            sig = self.signature(|_| true),
            aux = aux,
            n = n,
            zero = self.ctx.lift_const(0.0),
            layer_name = self.rec.layer_struct_name(),
            layer_targs = self.layer_targs(),
            args = self.ctx.runtime_args(),
        )
    }
}

enum AuxRole {
    Zero,
    General,
    Max,
}
