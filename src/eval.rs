//! Reference evaluator for recurrence definitions.
//!
//! Evaluates a definition directly, without generating code, in the two
//! shapes the generators emit: per-value by naive recursion over base
//! cases and priority-ordered rules, and layer-wise with explicit
//! previous-layer buffers mirroring the layered generator's algorithm.
//! The two must agree to the last bit on every in-domain point, which
//! is exactly what the equivalence tests assert.

use crate::ast::Expr;
use crate::codegen::layered::TABULATED_AUX_MARGIN;
use crate::optimize::OptimizedExpr;
use crate::recurrence::{Recurrence, RecurrenceRule};
use crate::dsl::index_arith;
use crate::utils::errors::{EvalError, EvalErrorKind};
use std::collections::HashMap;

/// Recursion depth limit; exceeding it almost always means a
/// non-terminating definition. Recurrence depth grows with the sum of
/// the indices, which is single-digit-times-bounded in practice.
const RECURSION_LIMIT: usize = 512;

/// Runtime variable values for evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalEnv {
    scalars: HashMap<String, f64>,
    arrays: HashMap<String, Vec<f64>>,
}

impl EvalEnv {
    /// Empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a scalar runtime variable.
    pub fn scalar(mut self, name: &str, value: f64) -> Self {
        self.scalars.insert(name.to_string(), value);
        self
    }

    /// Bind a tabulated array parameter.
    pub fn array(mut self, name: &str, values: &[f64]) -> Self {
        self.arrays.insert(name.to_string(), values.to_vec());
        self
    }
}

/// How recursive calls are resolved during expression evaluation.
enum CallMode<'m> {
    /// Per-value semantics: recurse into the shifted index point.
    Recurse { idx: &'m [i64], depth: usize },
    /// Layered semantics: read the previous-layer buffer for the
    /// call's spatial signature; out-of-range reads are zero, matching
    /// the generated code's zero-initialized buffers.
    Buffer {
        buffers: &'m HashMap<Vec<i64>, Vec<f64>>,
        aux_value: i64,
    },
}

/// Evaluates a recurrence definition at concrete points.
pub struct Evaluator<'a> {
    rec: &'a Recurrence,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator for the given recurrence.
    pub fn new(rec: &'a Recurrence) -> Self {
        Self { rec }
    }

    /// Evaluate one value by direct recursion. Index combinations
    /// matching neither a base case nor a rule (including validity
    /// failures) resolve to zero.
    pub fn value(&self, idx: &[i64], env: &EvalEnv) -> Result<f64, EvalError> {
        if idx.len() != self.rec.indices.len() {
            return Err(EvalError::new(
                EvalErrorKind::Unsupported,
                format!(
                    "`{}` takes {} indices, got {}",
                    self.rec.name,
                    self.rec.indices.len(),
                    idx.len()
                ),
            ));
        }
        self.value_at_depth(idx, env, 0)
    }

    /// Evaluate with dispatcher semantics: indices outside the
    /// declared `0..=max` bounds resolve to zero without recursing.
    pub fn dispatch_value(&self, idx: &[i64], env: &EvalEnv) -> Result<f64, EvalError> {
        for (&v, &max) in idx.iter().zip(&self.rec.max_indices) {
            if v < 0 || v > max {
                return Ok(0.0);
            }
        }
        self.value(idx, env)
    }

    /// Evaluate an optimizer result: bindings first, in order, then the
    /// final expression over them.
    pub fn eval_optimized(
        &self,
        opt: &OptimizedExpr,
        idx: &[i64],
        env: &EvalEnv,
    ) -> Result<f64, EvalError> {
        let lookup = |name: &str| self.rec.index_slot(name).map(|s| idx[s]);
        let mut bindings = HashMap::new();
        for (name, expr) in &opt.bindings {
            let mode = CallMode::Recurse { idx, depth: 0 };
            let v = self.eval_expr(expr, &lookup, env, &bindings, &mode)?;
            bindings.insert(name.clone(), v);
        }
        let mode = CallMode::Recurse { idx, depth: 0 };
        self.eval_expr(&opt.result, &lookup, env, &bindings, &mode)
    }

    /// Evaluate an entire layer with the layered generator's buffer
    /// semantics: previous layers computed once, outputs derived from
    /// buffer reads.
    pub fn layer(&self, layer_idx: &[i64], env: &EvalEnv) -> Result<Vec<f64>, EvalError> {
        if self.rec.indices.len() < 2 {
            return Err(EvalError::new(
                EvalErrorKind::Unsupported,
                format!("recurrence `{}` has no layer index", self.rec.name),
            ));
        }
        if layer_idx.len() != self.rec.indices.len() - 1 {
            return Err(EvalError::new(
                EvalErrorKind::Unsupported,
                format!(
                    "`{}` layers take {} indices, got {}",
                    self.rec.name,
                    self.rec.indices.len() - 1,
                    layer_idx.len()
                ),
            ));
        }
        self.layer_at_depth(layer_idx, env, 0)
    }

    fn value_at_depth(&self, idx: &[i64], env: &EvalEnv, depth: usize) -> Result<f64, EvalError> {
        if depth > RECURSION_LIMIT {
            return Err(EvalError::new(
                EvalErrorKind::RecursionLimit,
                format!("recursion limit exceeded evaluating `{}`", self.rec.name),
            ));
        }
        let lookup = |name: &str| self.rec.index_slot(name).map(|s| idx[s]);

        match self.rec.validity.all_satisfied(&lookup) {
            Some(true) => {}
            Some(false) => return Ok(0.0),
            None => {
                return Err(EvalError::new(
                    EvalErrorKind::Unsupported,
                    format!("validity constraint of `{}` failed to evaluate", self.rec.name),
                ))
            }
        }

        let bindings = HashMap::new();
        for bc in &self.rec.base_cases {
            let matches = bc
                .index_values
                .iter()
                .enumerate()
                .all(|(slot, v)| v.map_or(true, |v| v == idx[slot]));
            if matches {
                let mode = CallMode::Recurse { idx, depth };
                return self.eval_expr(&bc.value, &lookup, env, &bindings, &mode);
            }
        }

        for rule in self.rec.sorted_rules() {
            match rule.guard.all_satisfied(&lookup) {
                Some(true) => {
                    let mode = CallMode::Recurse { idx, depth };
                    return self.eval_expr(&rule.body, &lookup, env, &bindings, &mode);
                }
                Some(false) => continue,
                None => {
                    return Err(EvalError::new(
                        EvalErrorKind::Unsupported,
                        format!("guard of `{}` failed to evaluate", self.rec.name),
                    ))
                }
            }
        }

        // Closed-world default: no base case or rule matched.
        Ok(0.0)
    }

    fn layer_n_values(&self, layer_idx: &[i64]) -> Result<i64, EvalError> {
        if !self.rec.array_params.is_empty() {
            return Ok(layer_idx.iter().sum::<i64>() + TABULATED_AUX_MARGIN);
        }
        let layer_slots = self.rec.layer_slots();
        let lookup = |name: &str| {
            self.rec
                .index_slot(name)
                .and_then(|s| layer_slots.iter().position(|&ls| ls == s))
                .map(|pos| layer_idx[pos])
        };
        if let Some(rhs) = self.rec.validity.upper_bound_of(self.rec.aux_name()) {
            let bound = index_arith::parse(rhs)
                .ok()
                .and_then(|e| e.eval(&lookup))
                .ok_or_else(|| {
                    EvalError::new(
                        EvalErrorKind::Unsupported,
                        format!("auxiliary bound `{}` failed to evaluate", rhs),
                    )
                })?;
            return Ok(bound + 1);
        }
        Ok(1)
    }

    fn layer_at_depth(
        &self,
        layer_idx: &[i64],
        env: &EvalEnv,
        depth: usize,
    ) -> Result<Vec<f64>, EvalError> {
        if depth > RECURSION_LIMIT {
            return Err(EvalError::new(
                EvalErrorKind::RecursionLimit,
                format!("recursion limit exceeded evaluating `{}` layers", self.rec.name),
            ));
        }

        let n_values = self.layer_n_values(layer_idx)?;
        if n_values <= 0 {
            return Ok(Vec::new());
        }
        let mut out = vec![0.0; n_values as usize];

        let aux = self.rec.aux_name().to_string();
        let layer_slots = self.rec.layer_slots();
        let layer_lookup = |name: &str| {
            self.rec
                .index_slot(name)
                .and_then(|s| layer_slots.iter().position(|&ls| ls == s))
                .map(|pos| layer_idx[pos])
        };

        // Layer-level validity: out-of-domain layers stay zero.
        for c in &self.rec.validity.constraints {
            if c.mentions(&aux) {
                continue;
            }
            match c.is_satisfied(&layer_lookup) {
                Some(true) => {}
                Some(false) => return Ok(out),
                None => {
                    return Err(EvalError::new(
                        EvalErrorKind::Unsupported,
                        format!("validity constraint `{}` failed to evaluate", c),
                    ))
                }
            }
        }

        // Base layer?
        for bc in &self.rec.base_cases {
            let matches = layer_slots
                .iter()
                .enumerate()
                .all(|(pos, &slot)| bc.value_at(slot) == Some(layer_idx[pos]));
            if !matches {
                continue;
            }
            if let Some((array, _)) = self.tabulated_lookup(&bc.value) {
                let values = env.arrays.get(array).ok_or_else(|| {
                    EvalError::new(
                        EvalErrorKind::MissingArray,
                        format!("array parameter `{}` not supplied", array),
                    )
                })?;
                if values.len() < out.len() {
                    return Err(EvalError::new(
                        EvalErrorKind::MissingArray,
                        format!(
                            "array parameter `{}` has {} values, layer needs {}",
                            array,
                            values.len(),
                            out.len()
                        ),
                    ));
                }
                let n = out.len();
                out.copy_from_slice(&values[..n]);
            } else {
                let slot = bc.value_at(self.rec.aux).unwrap_or(0);
                let value = {
                    let bindings = HashMap::new();
                    let buffers = HashMap::new();
                    let mode = CallMode::Buffer {
                        buffers: &buffers,
                        aux_value: slot,
                    };
                    let lookup = |name: &str| {
                        if name == aux {
                            Some(slot)
                        } else {
                            layer_lookup(name)
                        }
                    };
                    self.eval_expr(&bc.value, &lookup, env, &bindings, &mode)?
                };
                if slot >= 0 && (slot as usize) < out.len() {
                    out[slot as usize] = value;
                }
            }
            return Ok(out);
        }

        // Applicable rules: every guard constraint not involving the
        // auxiliary index must hold for this layer.
        let mut zero: Option<&RecurrenceRule> = None;
        let mut general: Option<&RecurrenceRule> = None;
        let mut max_rule: Option<&RecurrenceRule> = None;
        'rules: for rule in &self.rec.rules {
            for c in &rule.guard.constraints {
                if c.mentions(&aux) {
                    continue;
                }
                match c.is_satisfied(&layer_lookup) {
                    Some(true) => {}
                    Some(false) => continue 'rules,
                    None => {
                        return Err(EvalError::new(
                            EvalErrorKind::Unsupported,
                            format!("guard constraint `{}` failed to evaluate", c),
                        ))
                    }
                }
            }
            let slot = match self.aux_role(rule, &aux) {
                AuxRole::Zero => &mut zero,
                AuxRole::General => &mut general,
                AuxRole::Max => &mut max_rule,
            };
            if slot.is_none() {
                *slot = Some(rule);
            }
        }

        if zero.is_none() && general.is_none() && max_rule.is_none() {
            return Ok(out);
        }

        // Previous-layer buffers, one per spatial signature.
        let mut buffers: HashMap<Vec<i64>, Vec<f64>> = HashMap::new();
        for rule in [zero, general, max_rule].into_iter().flatten() {
            for call in rule.body.collect_calls() {
                if call.target.is_some() {
                    return Err(EvalError::new(
                        EvalErrorKind::Unsupported,
                        "cross-recurrence calls are not supported in layer evaluation",
                    ));
                }
                let sig = call.spatial_signature(self.rec.aux);
                if buffers.contains_key(&sig) {
                    continue;
                }
                if sig.iter().all(|&s| s == 0) {
                    return Err(EvalError::new(
                        EvalErrorKind::Unsupported,
                        "rule reads its own layer (no layer-index shift)",
                    ));
                }
                let prev_idx: Vec<i64> = layer_idx
                    .iter()
                    .zip(sig.iter())
                    .map(|(&v, &s)| v + s)
                    .collect();
                let buf = self.layer_at_depth(&prev_idx, env, depth + 1)?;
                buffers.insert(sig, buf);
            }
        }

        let eval_at = |rule: &RecurrenceRule, aux_value: i64| -> Result<f64, EvalError> {
            let bindings = HashMap::new();
            let mode = CallMode::Buffer {
                buffers: &buffers,
                aux_value,
            };
            let lookup = |name: &str| {
                if name == aux {
                    Some(aux_value)
                } else {
                    layer_lookup(name)
                }
            };
            self.eval_expr(&rule.body, &lookup, env, &bindings, &mode)
        };

        let start = if zero.is_some() { 1 } else { 0 };
        let end = if max_rule.is_some() {
            n_values - 1
        } else {
            n_values
        };
        if let Some(rule) = zero {
            out[0] = eval_at(rule, 0)?;
        }
        if let Some(rule) = general {
            for t in start..end {
                out[t as usize] = eval_at(rule, t)?;
            }
        }
        if let Some(rule) = max_rule {
            if n_values > 1 {
                out[(n_values - 1) as usize] = eval_at(rule, n_values - 1)?;
            }
        }
        Ok(out)
    }

    fn aux_role(&self, rule: &RecurrenceRule, aux: &str) -> AuxRole {
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

    /// `(array, index_text)` when the expression is a tabulated lookup
    /// like `Boys[N]`.
    fn tabulated_lookup<'e>(&self, expr: &'e Expr) -> Option<(&'e str, &'e str)> {
        let Expr::Literal(text) = expr else {
            return None;
        };
        let open = text.find('[')?;
        let close = text.rfind(']')?;
        let array = &text[..open];
        if !self.rec.is_array_param(array) {
            return None;
        }
        Some((array, &text[open + 1..close]))
    }

    fn eval_expr(
        &self,
        expr: &Expr,
        lookup: &dyn Fn(&str) -> Option<i64>,
        env: &EvalEnv,
        bindings: &HashMap<String, f64>,
        mode: &CallMode<'_>,
    ) -> Result<f64, EvalError> {
        match expr {
            Expr::Const(v) => Ok(*v),
            Expr::Literal(text) => {
                if let Some((array, index_text)) = self.tabulated_lookup(expr) {
                    let values = env.arrays.get(array).ok_or_else(|| {
                        EvalError::new(
                            EvalErrorKind::MissingArray,
                            format!("array parameter `{}` not supplied", array),
                        )
                    })?;
                    let index = index_arith::parse(index_text)
                        .ok()
                        .and_then(|e| e.eval(lookup))
                        .ok_or_else(|| {
                            EvalError::new(
                                EvalErrorKind::Unsupported,
                                format!("array index `{}` failed to evaluate", index_text),
                            )
                        })?;
                    return values.get(index.max(0) as usize).copied().ok_or_else(|| {
                        EvalError::new(
                            EvalErrorKind::MissingArray,
                            format!("array `{}` has no element {}", array, index),
                        )
                    });
                }
                Err(EvalError::new(
                    EvalErrorKind::Unsupported,
                    format!("literal `{}` is not evaluable", text),
                ))
            }
            Expr::Var(name) => {
                if let Some(v) = bindings.get(name) {
                    return Ok(*v);
                }
                env.scalars.get(name).copied().ok_or_else(|| {
                    EvalError::new(
                        EvalErrorKind::MissingVariable,
                        format!("runtime variable `{}` not supplied", name),
                    )
                })
            }
            Expr::IndexExpr(text) => {
                let v = index_arith::parse(text)
                    .ok()
                    .and_then(|e| e.eval(lookup))
                    .ok_or_else(|| {
                        EvalError::new(
                            EvalErrorKind::Unsupported,
                            format!("index expression `{}` failed to evaluate", text),
                        )
                    })?;
                Ok(v as f64)
            }
            Expr::Call(call) => match mode {
                CallMode::Recurse { idx, depth } => {
                    if call.target.is_some() {
                        return Err(EvalError::new(
                            EvalErrorKind::Unsupported,
                            "cross-recurrence calls are not supported by the evaluator",
                        ));
                    }
                    let shifted: Vec<i64> = idx
                        .iter()
                        .enumerate()
                        .map(|(slot, &v)| v + call.shift(slot))
                        .collect();
                    self.value_at_depth(&shifted, env, depth + 1)
                }
                CallMode::Buffer { buffers, aux_value } => {
                    let sig = call.spatial_signature(self.rec.aux);
                    let buf = buffers.get(&sig).ok_or_else(|| {
                        EvalError::new(
                            EvalErrorKind::Unsupported,
                            "call reads a layer that was not precomputed",
                        )
                    })?;
                    let index = aux_value + call.shift(self.rec.aux);
                    if index < 0 {
                        return Ok(0.0);
                    }
                    Ok(buf.get(index as usize).copied().unwrap_or(0.0))
                }
            },
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval_expr(lhs, lookup, env, bindings, mode)?;
                let r = self.eval_expr(rhs, lookup, env, bindings, mode)?;
                Ok(match op {
                    crate::ast::BinOp::Add => l + r,
                    crate::ast::BinOp::Sub => l - r,
                    crate::ast::BinOp::Mul => l * r,
                    crate::ast::BinOp::Div => l / r,
                })
            }
            Expr::Sum(terms) => {
                let mut acc = 0.0;
                for t in terms {
                    let call = self.eval_expr(&Expr::Call(t.call.clone()), lookup, env, bindings, mode)?;
                    let term = if t.is_unit_coeff() {
                        call
                    } else {
                        self.eval_expr(&t.coeff, lookup, env, bindings, mode)? * call
                    };
                    acc += term;
                }
                Ok(acc)
            }
            Expr::Scaled { inner, scale, division } => {
                let i = self.eval_expr(inner, lookup, env, bindings, mode)?;
                let s = self.eval_expr(scale, lookup, env, bindings, mode)?;
                Ok(if *division { i / s } else { i * s })
            }
            Expr::BranchAverage { branches, scale } => {
                let mut acc = 0.0;
                for b in branches {
                    acc += self.eval_expr(b, lookup, env, bindings, mode)?;
                }
                let s = self.eval_expr(scale, lookup, env, bindings, mode)?;
                Ok(acc * s)
            }
            Expr::CseRef(name) => bindings.get(name).copied().ok_or_else(|| {
                EvalError::new(
                    EvalErrorKind::Unsupported,
                    format!("unresolved intermediate reference `{}`", name),
                )
            }),
            Expr::FlatSum(exprs) => {
                let mut acc = 0.0;
                for e in exprs {
                    acc += self.eval_expr(e, lookup, env, bindings, mode)?;
                }
                Ok(acc)
            }
        }
    }
}

enum AuxRole {
    Zero,
    General,
    Max,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::Recurrence;

    fn fib() -> Recurrence {
        Recurrence::new("Fib", &["n"], &["x"])
            .validity(&["n >= 0"])
            .unwrap()
            .base(&[("n", 0)], 1.0)
            .unwrap()
            .base(&[("n", 1)], "x")
            .unwrap()
            .rule("n > 1", "x * E[n-1] + E[n-2]")
            .unwrap()
    }

    #[test]
    fn test_base_cases() {
        let rec = fib();
        let eval = Evaluator::new(&rec);
        let env = EvalEnv::new().scalar("x", 7.5);
        assert_eq!(eval.value(&[0], &env).unwrap(), 1.0);
        assert_eq!(eval.value(&[1], &env).unwrap(), 7.5);
    }

    #[test]
    fn test_recursion_matches_direct_computation() {
        let rec = fib();
        let eval = Evaluator::new(&rec);
        let env = EvalEnv::new().scalar("x", 2.0);

        // f(0)=1, f(1)=x, f(n) = x*f(n-1) + f(n-2)
        let mut f = vec![1.0, 2.0];
        for n in 2..=5 {
            let v = 2.0 * f[n - 1] + f[n - 2];
            f.push(v);
        }
        assert_eq!(eval.value(&[5], &env).unwrap(), f[5]);
    }

    #[test]
    fn test_out_of_domain_is_zero() {
        let rec = fib();
        let eval = Evaluator::new(&rec);
        let env = EvalEnv::new().scalar("x", 3.0);
        assert_eq!(eval.value(&[-1], &env).unwrap(), 0.0);
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let rec = fib();
        let eval = Evaluator::new(&rec);
        let err = eval.value(&[1], &EvalEnv::new()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::MissingVariable);
    }

    #[test]
    fn test_dispatch_bounds() {
        let rec = fib().max_index("n", 5).unwrap();
        let eval = Evaluator::new(&rec);
        let env = EvalEnv::new().scalar("x", 2.0);
        assert_eq!(eval.dispatch_value(&[6], &env).unwrap(), 0.0);
        assert_eq!(eval.dispatch_value(&[-1], &env).unwrap(), 0.0);
        assert!(eval.dispatch_value(&[5], &env).unwrap() > 0.0);
    }

    #[test]
    fn test_recursion_limit() {
        // A rule that never reaches a base case.
        let rec = Recurrence::new("Loop", &["n"], &[])
            .rule("n > 0", "E[n]")
            .unwrap();
        let eval = Evaluator::new(&rec);
        let err = eval.value(&[1], &EvalEnv::new()).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::RecursionLimit);
    }
}
