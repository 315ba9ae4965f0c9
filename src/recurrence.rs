//! Recurrence definitions via a fluent builder API.
//!
//! A [`Recurrence`] aggregates everything the generators consume:
//! compile-time index names, runtime parameter names, validity
//! constraints, base cases, and guarded rules. Rule bodies are parsed
//! from the DSL at definition time, so a finished `Recurrence` is pure
//! data handed unchanged to a generator.
//!
//! ```no_run
//! use recurgen::recurrence::Recurrence;
//!
//! let rec = Recurrence::new("Legendre", &["n"], &["x"])
//!     .namespace("legendre")
//!     .validity(&["n >= 0"])?
//!     .base(&[("n", 0)], 1.0)?
//!     .base(&[("n", 1)], "x")?
//!     .scaled_rule("n > 1", "(2*n-1) * x * E[n-1] + (-(n-1)) * E[n-2]", "1/n", "Three-term recurrence")?;
//! # Ok::<(), recurgen::utils::errors::DefinitionError>(())
//! ```

use crate::ast::Expr;
use crate::constraint::ConstraintSet;
use crate::dsl::index_arith;
use crate::dsl::parser::RuleParser;
use crate::utils::errors::DefinitionError;
use serde::{Serialize, Deserialize};

/// Default maximum index value used for dispatcher generation when no
/// explicit bound is declared.
pub const DEFAULT_MAX_INDEX: i64 = 20;

/// Default accessor name for recursive calls in rule bodies.
pub const DEFAULT_ACCESSOR: &str = "E";

/// A base case: indices pinned to concrete values, plus the result
/// expression.
///
/// Every layer index must be pinned; the auxiliary index may be left
/// free for tabulated base cases that produce a whole layer at once
/// (e.g. `R_{000}^{(N)} = Boys[N]` for all N).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseCase {
    /// Per-slot index values, aligned with the declared index list.
    /// `None` marks a free auxiliary index.
    pub index_values: Vec<Option<i64>>,
    /// The value this base case produces.
    pub value: Expr,
}

impl BaseCase {
    /// The pinned value of the index at `slot`, if any.
    pub fn value_at(&self, slot: usize) -> Option<i64> {
        self.index_values.get(slot).copied().flatten()
    }
}

/// A guarded recurrence rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    /// When this rule applies.
    pub guard: ConstraintSet,
    /// The rule body.
    pub body: Expr,
    /// Optional human-readable name, emitted as a comment.
    pub name: String,
}

impl RecurrenceRule {
    /// Priority key for sorting rules: equality-bearing guards first,
    /// then fewer total constraints, with the rendered guard as a final
    /// tie-break so the order is total and independent of input order.
    pub fn priority_key(&self) -> (i64, i64, String) {
        (
            -(self.guard.eq_count() as i64),
            self.guard.len() as i64,
            self.guard.render(),
        )
    }
}

/// A base-case value: numeric, or symbolic text resolved against the
/// recurrence's runtime variables.
#[derive(Debug, Clone)]
pub enum BaseValue {
    Num(f64),
    Text(String),
}

impl From<f64> for BaseValue {
    fn from(v: f64) -> Self {
        BaseValue::Num(v)
    }
}

impl From<i64> for BaseValue {
    fn from(v: i64) -> Self {
        BaseValue::Num(v as f64)
    }
}

impl From<&str> for BaseValue {
    fn from(s: &str) -> Self {
        BaseValue::Text(s.to_string())
    }
}

impl From<String> for BaseValue {
    fn from(s: String) -> Self {
        BaseValue::Text(s)
    }
}

/// A recurrence relation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    /// Name of the recurrence (e.g. "Legendre").
    pub name: String,
    /// Compile-time index names, in declaration order.
    pub indices: Vec<String>,
    /// Runtime parameter names, in declaration order.
    pub runtime_vars: Vec<String>,
    /// Vector type of generated code.
    pub vec_type: String,
    /// C++ namespace for generated code (empty for none).
    pub namespace: String,
    /// Accessor name used for recursive calls in rule bodies.
    pub accessor: String,
    /// Slot of the auxiliary index (the one a layer ranges over).
    pub aux: usize,
    /// Per-slot maximum index values, for dispatcher generation.
    pub max_indices: Vec<i64>,
    /// Runtime variables that are tabulated array parameters.
    pub array_params: Vec<String>,
    /// Global domain restriction applied to every generated guard.
    pub validity: ConstraintSet,
    /// Declared base cases.
    pub base_cases: Vec<BaseCase>,
    /// Declared rules, in definition order.
    pub rules: Vec<RecurrenceRule>,
}

impl Recurrence {
    /// Create a new recurrence definition.
    ///
    /// The auxiliary index defaults to the last declared index; use
    /// [`aux_index`](Self::aux_index) to designate a different one.
    pub fn new(name: &str, indices: &[&str], runtime_vars: &[&str]) -> Self {
        let indices: Vec<String> = indices.iter().map(|s| s.to_string()).collect();
        let n = indices.len();
        Self {
            name: name.to_string(),
            indices,
            runtime_vars: runtime_vars.iter().map(|s| s.to_string()).collect(),
            vec_type: "Vec8d".to_string(),
            namespace: String::new(),
            accessor: DEFAULT_ACCESSOR.to_string(),
            aux: n.saturating_sub(1),
            max_indices: vec![DEFAULT_MAX_INDEX; n],
            array_params: Vec::new(),
            validity: ConstraintSet::default(),
            base_cases: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Set the C++ namespace for generated code.
    pub fn namespace(mut self, ns: &str) -> Self {
        self.namespace = ns.to_string();
        self
    }

    /// Set the vector type used in generated code.
    pub fn vec_type(mut self, ty: &str) -> Self {
        self.vec_type = ty.to_string();
        self
    }

    /// Set the accessor name used in rule bodies (default `E`).
    pub fn accessor(mut self, accessor: &str) -> Self {
        self.accessor = accessor.to_string();
        self
    }

    /// Designate the auxiliary index explicitly.
    pub fn aux_index(mut self, name: &str) -> Result<Self, DefinitionError> {
        match self.index_slot(name) {
            Some(slot) => {
                self.aux = slot;
                Ok(self)
            }
            None => Err(DefinitionError::new(
                &self.name,
                format!("auxiliary index `{}` is not a declared index", name),
            )),
        }
    }

    /// Set the maximum value for one index (dispatcher bound).
    pub fn max_index(mut self, name: &str, max: i64) -> Result<Self, DefinitionError> {
        match self.index_slot(name) {
            Some(slot) => {
                self.max_indices[slot] = max;
                Ok(self)
            }
            None => Err(DefinitionError::new(
                &self.name,
                format!("`{}` is not a declared index", name),
            )),
        }
    }

    /// Declare a runtime variable as a tabulated array parameter
    /// (rendered as a pointer and copied element-wise in base layers).
    pub fn array_param(mut self, name: &str) -> Result<Self, DefinitionError> {
        if !self.runtime_vars.iter().any(|v| v == name) {
            return Err(DefinitionError::new(
                &self.name,
                format!("array parameter `{}` is not a declared runtime variable", name),
            ));
        }
        if !self.array_params.iter().any(|v| v == name) {
            self.array_params.push(name.to_string());
        }
        Ok(self)
    }

    /// Set the validity constraints (the recurrence's global domain).
    pub fn validity(mut self, constraints: &[&str]) -> Result<Self, DefinitionError> {
        let set = ConstraintSet::parse(constraints)
            .map_err(|e| DefinitionError::new(&self.name, e.to_string()))?;
        self.check_constraint_identifiers(&set)?;
        self.validity = set;
        Ok(self)
    }

    /// Add a base case. Every layer index must be assigned exactly
    /// once; the auxiliary index may be omitted to define a whole base
    /// layer (tabulated pattern).
    pub fn base(
        mut self,
        assignments: &[(&str, i64)],
        value: impl Into<BaseValue>,
    ) -> Result<Self, DefinitionError> {
        let mut index_values = vec![None; self.indices.len()];
        for (name, v) in assignments {
            let slot = self.index_slot(name).ok_or_else(|| {
                DefinitionError::new(
                    &self.name,
                    format!("base case assigns unknown index `{}`", name),
                )
            })?;
            if index_values[slot].is_some() {
                return Err(DefinitionError::new(
                    &self.name,
                    format!("base case assigns index `{}` twice", name),
                ));
            }
            index_values[slot] = Some(*v);
        }
        for (slot, v) in index_values.iter().enumerate() {
            if v.is_none() && slot != self.aux {
                return Err(DefinitionError::new(
                    &self.name,
                    format!("base case is missing index `{}`", self.indices[slot]),
                ));
            }
        }

        let value = self.convert_base_value(value.into());
        self.base_cases.push(BaseCase { index_values, value });
        Ok(self)
    }

    /// Add a recurrence rule.
    pub fn rule(self, guard: &str, body: &str) -> Result<Self, DefinitionError> {
        self.add_rule(guard, body, None, "")
    }

    /// Add a named recurrence rule.
    pub fn named_rule(self, guard: &str, body: &str, name: &str) -> Result<Self, DefinitionError> {
        self.add_rule(guard, body, None, name)
    }

    /// Add a rule whose body is scaled, e.g. by `1/n` for normalized
    /// recurrences.
    pub fn scaled_rule(
        self,
        guard: &str,
        body: &str,
        scale: &str,
        name: &str,
    ) -> Result<Self, DefinitionError> {
        self.add_rule(guard, body, Some(scale), name)
    }

    /// Add a rule that averages multiple equivalent branches, for
    /// recurrences where several reduction paths are valid and the
    /// numerically stable choice is their mean.
    pub fn branch_average(
        mut self,
        guard: &str,
        branches: &[&str],
        name: &str,
    ) -> Result<Self, DefinitionError> {
        let rule_index = self.rules.len();
        let guard_set = self
            .parse_guard(guard)
            .map_err(|e| e.with_rule_index(rule_index))?;

        let parser = RuleParser::new(&self.indices, &self.runtime_vars, &self.accessor);
        let mut parsed = Vec::with_capacity(branches.len());
        for branch in branches {
            let expr = parser.parse_expression(branch).map_err(|e| {
                DefinitionError::new(&self.name, e.to_string()).with_rule_index(rule_index)
            })?;
            parsed.push(expr);
        }

        let body = match parsed.len() {
            0 => {
                return Err(DefinitionError::new(&self.name, "branch average needs at least one branch")
                    .with_rule_index(rule_index))
            }
            1 => parsed.into_iter().next().unwrap(),
            n => Expr::BranchAverage {
                branches: parsed,
                scale: Box::new(Expr::Const(1.0 / n as f64)),
            },
        };

        self.rules.push(RecurrenceRule {
            guard: guard_set,
            body,
            name: name.to_string(),
        });
        Ok(self)
    }

    fn add_rule(
        mut self,
        guard: &str,
        body: &str,
        scale: Option<&str>,
        name: &str,
    ) -> Result<Self, DefinitionError> {
        let rule_index = self.rules.len();
        let guard_set = self
            .parse_guard(guard)
            .map_err(|e| e.with_rule_index(rule_index))?;

        let parser = RuleParser::new(&self.indices, &self.runtime_vars, &self.accessor);
        let mut body = parser.parse_expression(body).map_err(|e| {
            DefinitionError::new(&self.name, e.to_string()).with_rule_index(rule_index)
        })?;

        if let Some(scale) = scale {
            let scale_expr = parser.parse_scale(scale).map_err(|e| {
                DefinitionError::new(&self.name, e.to_string()).with_rule_index(rule_index)
            })?;
            body = Expr::Scaled {
                inner: Box::new(body),
                scale: Box::new(scale_expr),
                division: scale.trim().starts_with("1/"),
            };
        }

        self.rules.push(RecurrenceRule {
            guard: guard_set,
            body,
            name: name.to_string(),
        });
        Ok(self)
    }

    fn parse_guard(&self, guard: &str) -> Result<ConstraintSet, DefinitionError> {
        let set = ConstraintSet::parse(&[guard])
            .map_err(|e| DefinitionError::new(&self.name, e.to_string()))?;
        self.check_constraint_identifiers(&set)?;
        Ok(set)
    }

    fn check_constraint_identifiers(&self, set: &ConstraintSet) -> Result<(), DefinitionError> {
        for c in &set.constraints {
            for side in [&c.left, &c.right] {
                for ident in index_arith::identifiers(side) {
                    if self.index_slot(&ident).is_none() {
                        return Err(DefinitionError::new(
                            &self.name,
                            format!("constraint `{}` references unknown index `{}`", c, ident),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn convert_base_value(&self, value: BaseValue) -> Expr {
        match value {
            BaseValue::Num(v) => Expr::Const(v),
            BaseValue::Text(text) => {
                if self.runtime_vars.iter().any(|v| *v == text) {
                    Expr::Var(text)
                } else if let Ok(v) = text.parse::<f64>() {
                    Expr::Const(v)
                } else {
                    // Raw literal escape hatch: named constants and
                    // tabulated-array lookups like `Boys[N]`.
                    Expr::Literal(text)
                }
            }
        }
    }

    /// Slot of the given index name.
    pub fn index_slot(&self, name: &str) -> Option<usize> {
        self.indices.iter().position(|i| i == name)
    }

    /// Name of the auxiliary index.
    pub fn aux_name(&self) -> &str {
        &self.indices[self.aux]
    }

    /// Slots of the layer indices (all but the auxiliary one).
    pub fn layer_slots(&self) -> Vec<usize> {
        (0..self.indices.len()).filter(|&s| s != self.aux).collect()
    }

    /// Names of the layer indices.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layer_slots()
            .into_iter()
            .map(|s| self.indices[s].as_str())
            .collect()
    }

    /// True when the given runtime variable is a tabulated array.
    pub fn is_array_param(&self, name: &str) -> bool {
        self.array_params.iter().any(|v| v == name)
    }

    /// Struct name of the per-value accessor in generated code.
    pub fn struct_name(&self) -> String {
        format!("{}Coeff", self.name)
    }

    /// Struct name of the layer accessor in generated code.
    pub fn layer_struct_name(&self) -> String {
        format!("{}CoeffLayer", self.name)
    }

    /// Rules sorted by priority (most specific guard first). The sort
    /// key is total, so the result is deterministic for any input order.
    pub fn sorted_rules(&self) -> Vec<&RecurrenceRule> {
        let mut rules: Vec<&RecurrenceRule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.priority_key());
        rules
    }

    /// A rule parser configured for this recurrence's shape.
    pub fn parser(&self) -> RuleParser<'_> {
        RuleParser::new(&self.indices, &self.runtime_vars, &self.accessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::CmpOp;

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
    fn test_fluent_build() {
        let rec = fib();
        assert_eq!(rec.base_cases.len(), 2);
        assert_eq!(rec.rules.len(), 1);
        assert_eq!(rec.base_cases[0].index_values, vec![Some(0)]);
        assert_eq!(rec.base_cases[1].value, Expr::Var("x".to_string()));
        assert_eq!(rec.struct_name(), "FibCoeff");
    }

    #[test]
    fn test_base_requires_all_indices() {
        let err = Recurrence::new("R", &["n", "m"], &[])
            .base(&[("n", 0)], 1.0)
            .unwrap_err();
        assert!(err.to_string().contains("missing index `m`"));
    }

    #[test]
    fn test_guard_rejects_unknown_index() {
        let err = Recurrence::new("R", &["n"], &["x"])
            .rule("q > 0", "E[n-1]")
            .unwrap_err();
        assert!(err.to_string().contains("unknown index `q`"));
        assert!(err.to_string().contains("rule 0"));
    }

    #[test]
    fn test_rule_error_carries_rule_index() {
        let err = fib().rule("n > 2", "x * y").unwrap_err();
        assert_eq!(err.rule_index, Some(1));
        assert_eq!(err.recurrence, "Fib");
    }

    #[test]
    fn test_aux_index_validation() {
        let rec = Recurrence::new("R", &["a", "b"], &[]).aux_index("a").unwrap();
        assert_eq!(rec.aux, 0);
        assert_eq!(rec.layer_slots(), vec![1]);

        assert!(Recurrence::new("R", &["a"], &[]).aux_index("z").is_err());
    }

    #[test]
    fn test_aux_defaults_to_last_index() {
        let rec = Recurrence::new("R", &["nA", "nB", "t"], &[]);
        assert_eq!(rec.aux_name(), "t");
        assert_eq!(rec.layer_names(), vec!["nA", "nB"]);
    }

    #[test]
    fn test_priority_ordering() {
        let rec = Recurrence::new("R", &["n", "m"], &["x"])
            .rule("n > 0", "E[n-1]")
            .unwrap()
            .rule("n == 0", "E[n-1]")
            .unwrap()
            .rule("n > 0 && m > 0", "E[n-1]")
            .unwrap();

        let sorted = rec.sorted_rules();
        assert_eq!(sorted[0].guard.constraints[0].op, CmpOp::Eq);
        assert_eq!(sorted[1].guard.len(), 1);
        assert_eq!(sorted[2].guard.len(), 2);
    }

    #[test]
    fn test_priority_is_input_order_independent() {
        let a = Recurrence::new("R", &["n", "m"], &["x"])
            .rule("n > 0", "E[n-1]")
            .unwrap()
            .rule("n == 0", "E[n-1]")
            .unwrap()
            .rule("n > 0 && m > 0", "E[n-1]")
            .unwrap();
        let b = Recurrence::new("R", &["n", "m"], &["x"])
            .rule("n > 0 && m > 0", "E[n-1]")
            .unwrap()
            .rule("n > 0", "E[n-1]")
            .unwrap()
            .rule("n == 0", "E[n-1]")
            .unwrap();

        let keys_a: Vec<_> = a.sorted_rules().iter().map(|r| r.guard.render()).collect();
        let keys_b: Vec<_> = b.sorted_rules().iter().map(|r| r.guard.render()).collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn test_branch_average_builds_dedicated_node() {
        let rec = Recurrence::new("Hermite", &["nA", "nB", "N"], &["PA", "PB", "aAB"])
            .branch_average(
                "nA > 0 && nB > 0",
                &[
                    "aAB * E[nA, nB-1, N-1] + PB * E[nA, nB-1, N]",
                    "aAB * E[nA-1, nB, N-1] + PA * E[nA-1, nB, N]",
                ],
                "Two-branch average",
            )
            .unwrap();

        match &rec.rules[0].body {
            Expr::BranchAverage { branches, scale } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(**scale, Expr::Const(0.5));
            }
            other => panic!("expected branch average, got {:?}", other),
        }
    }

    #[test]
    fn test_array_param_must_be_declared() {
        assert!(Recurrence::new("R", &["n"], &["Boys"]).array_param("Boys").is_ok());
        assert!(Recurrence::new("R", &["n"], &[]).array_param("Boys").is_err());
    }

    #[test]
    fn test_base_value_literal_escape_hatch() {
        let rec = Recurrence::new("CoulombR", &["t", "u", "v", "N"], &["PCx", "Boys"])
            .array_param("Boys")
            .unwrap()
            .base(&[("t", 0), ("u", 0), ("v", 0)], "Boys[N]")
            .unwrap();
        assert_eq!(rec.base_cases[0].value, Expr::Literal("Boys[N]".to_string()));
        assert_eq!(rec.base_cases[0].value_at(3), None);
        assert_eq!(rec.base_cases[0].value_at(0), Some(0));
    }

    #[test]
    fn test_base_may_leave_aux_free_but_not_layer_indices() {
        // Omitting a layer index is an error; omitting the aux is not.
        let err = Recurrence::new("R", &["n", "m", "t"], &[])
            .base(&[("n", 0), ("t", 0)], 1.0)
            .unwrap_err();
        assert!(err.to_string().contains("missing index `m`"));
    }
}
