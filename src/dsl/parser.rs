//! Parser for recurrence rule bodies.
//!
//! Splitting is depth-aware rather than token-stream based: a rule body
//! is a `+`-separated list of terms, each term a `*`-separated
//! coefficient chain followed by exactly one bracketed recursive call.
//! Unknown identifiers in coefficients are deliberately lenient: they
//! become runtime variable references (so ad hoc constants like `M_PI`
//! work) and are logged rather than rejected. Everything else fails
//! fast with the offending fragment, since a silently-wrong AST
//! produces silently-wrong numerical code.

use crate::ast::{BinOp, Expr, RecursiveCall, Term};
use crate::dsl::index_arith;
use crate::utils::errors::{DslError, DslErrorKind};
use log::debug;
use unicode_xid::UnicodeXID;

/// Parser for rule-body expressions, configured with the recurrence's
/// index names, runtime variable names, and call accessor.
pub struct RuleParser<'a> {
    indices: &'a [String],
    runtime_vars: &'a [String],
    accessor: &'a str,
}

impl<'a> RuleParser<'a> {
    /// Create a parser for the given recurrence shape.
    pub fn new(indices: &'a [String], runtime_vars: &'a [String], accessor: &'a str) -> Self {
        Self {
            indices,
            runtime_vars,
            accessor,
        }
    }

    /// Parse a full rule body: a sum of terms.
    pub fn parse_expression(&self, text: &str) -> Result<Expr, DslError> {
        if text.trim().is_empty() {
            return Err(DslError::new(DslErrorKind::Empty, "empty rule expression", text));
        }
        let pieces = split_top_level(text, '+')?;
        let mut terms = Vec::with_capacity(pieces.len());
        for piece in pieces {
            terms.push(self.parse_term(&piece)?);
        }
        Ok(Expr::Sum(terms))
    }

    /// Parse a single term: `[coefficient *] IDENT[shift, ...]`.
    pub fn parse_term(&self, text: &str) -> Result<Term, DslError> {
        let s = text.trim();
        if s.is_empty() {
            return Err(DslError::new(DslErrorKind::Empty, "empty term", text));
        }

        let (ident_start, bracket_open) = find_call_bracket(s).ok_or_else(|| {
            DslError::new(DslErrorKind::MissingCall, "no recursive call found in term", s)
        })?;
        let ident = &s[ident_start..bracket_open];
        if ident.is_empty() {
            return Err(DslError::new(
                DslErrorKind::MissingCall,
                "recursive call is missing an accessor name",
                s,
            ));
        }

        let bracket_close = find_matching_bracket(s, bracket_open).ok_or_else(|| {
            DslError::new(DslErrorKind::UnbalancedDelimiter, "unclosed `[` in term", s)
        })?;
        let trailing = s[bracket_close + 1..].trim();
        if !trailing.is_empty() {
            return Err(DslError::new(
                DslErrorKind::TrailingInput,
                format!("unexpected input `{}` after recursive call", trailing),
                s,
            ));
        }

        let shifts = self.parse_shift_list(&s[bracket_open + 1..bracket_close])?;
        let target = if ident == self.accessor {
            None
        } else {
            debug!("cross-recurrence reference to `{}`", ident);
            Some(ident.to_string())
        };
        let call = RecursiveCall { target, shifts };

        let mut coeff_part = s[..ident_start].trim();
        if let Some(stripped) = coeff_part.strip_suffix('*') {
            coeff_part = stripped.trim();
        }
        let coeff = self.parse_coefficient_chain(coeff_part)?;

        Ok(Term { coeff, call })
    }

    /// Parse a chained coefficient: factors joined by top-level `*`.
    pub fn parse_coefficient_chain(&self, text: &str) -> Result<Expr, DslError> {
        let s = text.trim();
        if s.is_empty() || s == "1" {
            return Ok(Expr::one());
        }
        let factors = split_top_level(s, '*')?;
        let mut iter = factors.into_iter();
        let first = iter.next().ok_or_else(|| {
            DslError::new(DslErrorKind::Empty, "empty coefficient", text)
        })?;
        let mut coeff = self.parse_coefficient(&first)?;
        for factor in iter {
            coeff = Expr::Binary {
                op: BinOp::Mul,
                lhs: Box::new(coeff),
                rhs: Box::new(self.parse_coefficient(&factor)?),
            };
        }
        Ok(coeff)
    }

    /// Classify a single coefficient factor.
    pub fn parse_coefficient(&self, text: &str) -> Result<Expr, DslError> {
        let s = text.trim();
        if s.is_empty() || s == "1" {
            return Ok(Expr::one());
        }

        if let Some(inner) = unwrap_parens(s) {
            let has_idx = self.indices.iter().any(|i| index_arith::contains_ident(inner, i));
            let has_var = self
                .runtime_vars
                .iter()
                .any(|v| index_arith::contains_ident(inner, v));

            if has_idx && has_var {
                // Known limitation: mixed index/runtime coefficients stay
                // one uninterpreted arithmetic string.
                debug!("mixed coefficient `{}` kept as opaque index expression", inner);
                return Ok(Expr::IndexExpr(inner.to_string()));
            }
            if has_idx {
                return Ok(Expr::IndexExpr(inner.to_string()));
            }
            if has_var {
                return Ok(Expr::Var(inner.to_string()));
            }
            if let Ok(parsed) = index_arith::parse(inner) {
                if let Some(v) = parsed.as_constant() {
                    return Ok(Expr::Const(v as f64));
                }
            }
            return Ok(Expr::IndexExpr(inner.to_string()));
        }

        if self.runtime_vars.iter().any(|v| v == s) {
            return Ok(Expr::Var(s.to_string()));
        }
        if self.indices.iter().any(|i| i == s) {
            return Ok(Expr::IndexExpr(s.to_string()));
        }
        if let Ok(v) = s.parse::<f64>() {
            return Ok(Expr::Const(v));
        }
        if self.indices.iter().any(|i| index_arith::contains_ident(s, i)) {
            return Ok(Expr::IndexExpr(s.to_string()));
        }

        // Deliberate leniency: unknown identifiers become runtime
        // variable references so externally-supplied constants work.
        debug!("unknown identifier `{}` treated as runtime variable", s);
        Ok(Expr::Var(s.to_string()))
    }

    /// Parse a scale string. `1/<expr>` classifies the denominator;
    /// anything else parses as a plain coefficient chain.
    pub fn parse_scale(&self, text: &str) -> Result<Expr, DslError> {
        let s = text.trim();
        if let Some(denom) = s.strip_prefix("1/") {
            let mut d = denom.trim();
            if let Some(inner) = unwrap_parens(d) {
                d = inner;
            }
            if self.indices.iter().any(|i| index_arith::contains_ident(d, i)) {
                return Ok(Expr::IndexExpr(d.to_string()));
            }
            if let Ok(v) = d.parse::<f64>() {
                return Ok(Expr::Const(v));
            }
            return Ok(Expr::Var(d.to_string()));
        }
        self.parse_coefficient_chain(s)
    }

    /// Parse a shift list like `nA-1, nB, t+1` into per-slot shifts.
    ///
    /// Components are keyed by the index name they mention, not by
    /// position; unmentioned indices default to shift 0.
    fn parse_shift_list(&self, text: &str) -> Result<Vec<i64>, DslError> {
        let mut shifts = vec![0i64; self.indices.len()];
        let mut seen = vec![false; self.indices.len()];

        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(DslError::new(
                    DslErrorKind::MalformedShift,
                    "empty shift component",
                    text,
                ));
            }

            let ident_len = ident_prefix_len(part);
            if ident_len == 0 {
                return Err(DslError::new(
                    DslErrorKind::MalformedShift,
                    format!("shift `{}` must be a bare index or index±integer", part),
                    text,
                ));
            }
            let (ident, rest) = part.split_at(ident_len);
            let slot = self
                .indices
                .iter()
                .position(|i| i == ident)
                .ok_or_else(|| {
                    DslError::new(
                        DslErrorKind::UnknownIndex,
                        format!("unknown index `{}` in shift list", ident),
                        text,
                    )
                })?;
            if seen[slot] {
                return Err(DslError::new(
                    DslErrorKind::DuplicateShift,
                    format!("index `{}` shifted twice", ident),
                    text,
                ));
            }
            seen[slot] = true;

            let rest = rest.trim();
            if rest.is_empty() {
                continue;
            }
            let (sign, digits) = match rest.as_bytes()[0] {
                b'+' => (1i64, rest[1..].trim()),
                b'-' => (-1i64, rest[1..].trim()),
                _ => {
                    return Err(DslError::new(
                        DslErrorKind::MalformedShift,
                        format!("shift `{}` must be a bare index or index±integer", part),
                        text,
                    ))
                }
            };
            let magnitude: i64 = digits.parse().map_err(|_| {
                DslError::new(
                    DslErrorKind::MalformedShift,
                    format!("shift offset `{}` is not an integer", digits),
                    text,
                )
            })?;
            shifts[slot] = sign * magnitude;
        }

        Ok(shifts)
    }
}

/// Split on a separator at bracket/paren depth 0.
fn split_top_level(text: &str, sep: char) -> Result<Vec<String>, DslError> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;

    for c in text.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth -= 1;
                if depth < 0 {
                    return Err(DslError::new(
                        DslErrorKind::UnbalancedDelimiter,
                        "unbalanced closing delimiter",
                        text,
                    ));
                }
            }
            _ => {}
        }
        if c == sep && depth == 0 {
            pieces.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
    }

    if depth != 0 {
        return Err(DslError::new(
            DslErrorKind::UnbalancedDelimiter,
            "unbalanced opening delimiter",
            text,
        ));
    }
    pieces.push(current);
    Ok(pieces)
}

/// Locate the call's `[`, returning (identifier start, bracket position).
fn find_call_bracket(s: &str) -> Option<(usize, usize)> {
    let mut depth = 0i32;
    for (pos, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '[' if depth == 0 => {
                // Walk back over the identifier preceding the bracket.
                let ident_start = s[..pos]
                    .char_indices()
                    .rev()
                    .take_while(|(_, c)| c.is_xid_continue())
                    .last()
                    .map(|(i, _)| i)
                    .unwrap_or(pos);
                return Some((ident_start, pos));
            }
            _ => {}
        }
    }
    None
}

/// Position of the `]` matching the `[` at `open`.
fn find_matching_bracket(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (pos, c) in s[open..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + pos);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip one pair of fully-enclosing parentheses, if present.
fn unwrap_parens(s: &str) -> Option<&str> {
    if !s.starts_with('(') || !s.ends_with(')') {
        return None;
    }
    let mut depth = 0i32;
    for (pos, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && pos != s.len() - 1 {
                    // First paren closes early: not a simple wrap.
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(s[1..s.len() - 1].trim())
}

/// Length of the identifier prefix of `s`, 0 if it has none.
fn ident_prefix_len(s: &str) -> usize {
    let mut len = 0;
    for (i, c) in s.char_indices() {
        let ok = if i == 0 {
            c.is_xid_start() || c == '_'
        } else {
            c.is_xid_continue()
        };
        if !ok {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser_for<'a>(indices: &'a [String], vars: &'a [String]) -> RuleParser<'a> {
        RuleParser::new(indices, vars, "E")
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_legendre_rule() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        let expr = p
            .parse_expression("(2*n-1) * x * E[n-1] + (-(n-1)) * E[n-2]")
            .unwrap();
        let Expr::Sum(terms) = &expr else {
            panic!("expected sum");
        };
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].call.shifts, vec![-1]);
        assert_eq!(terms[1].call.shifts, vec![-2]);

        // First coefficient: (2*n-1) * x
        match &terms[0].coeff {
            Expr::Binary { op: BinOp::Mul, lhs, rhs } => {
                assert_eq!(**lhs, Expr::IndexExpr("2*n-1".to_string()));
                assert_eq!(**rhs, Expr::Var("x".to_string()));
            }
            other => panic!("unexpected coefficient: {:?}", other),
        }
        assert_eq!(terms[1].coeff, Expr::IndexExpr("-(n-1)".to_string()));
    }

    #[test]
    fn test_parse_multi_index_shifts() {
        let indices = names(&["nA", "nB", "t"]);
        let vars = names(&["PA", "PB", "aAB"]);
        let p = parser_for(&indices, &vars);

        let term = p.parse_term("aAB * E[nA-1, nB, t+1]").unwrap();
        assert_eq!(term.call.shifts, vec![-1, 0, 1]);
        assert_eq!(term.coeff, Expr::Var("aAB".to_string()));
    }

    #[test]
    fn test_shift_keyed_by_name_not_position() {
        let indices = names(&["nA", "nB", "t"]);
        let vars = names(&["PA"]);
        let p = parser_for(&indices, &vars);

        // Components may omit indices; unmentioned ones default to 0.
        let term = p.parse_term("E[t-1]").unwrap();
        assert_eq!(term.call.shifts, vec![0, 0, -1]);
    }

    #[test]
    fn test_unit_coefficient_elided() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        let term = p.parse_term("E[n-2]").unwrap();
        assert!(term.is_unit_coeff());
    }

    #[test]
    fn test_missing_call_is_error() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        let err = p.parse_term("2 * x").unwrap_err();
        assert_eq!(err.kind, DslErrorKind::MissingCall);
        assert!(err.to_string().contains("2 * x"));
    }

    #[test]
    fn test_malformed_shift_is_error() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        assert_eq!(
            p.parse_term("E[n*2]").unwrap_err().kind,
            DslErrorKind::MalformedShift
        );
        assert_eq!(
            p.parse_term("E[n-x]").unwrap_err().kind,
            DslErrorKind::MalformedShift
        );
        assert_eq!(
            p.parse_term("E[m-1]").unwrap_err().kind,
            DslErrorKind::UnknownIndex
        );
    }

    #[test]
    fn test_trailing_input_is_error() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        assert_eq!(
            p.parse_term("E[n-1] * x").unwrap_err().kind,
            DslErrorKind::TrailingInput
        );
    }

    #[test]
    fn test_unbalanced_brackets() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        assert_eq!(
            p.parse_expression("x * E[n-1").unwrap_err().kind,
            DslErrorKind::UnbalancedDelimiter
        );
    }

    #[test]
    fn test_unknown_identifier_becomes_var() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        let term = p.parse_term("M_PI * E[n-1]").unwrap();
        assert_eq!(term.coeff, Expr::Var("M_PI".to_string()));
    }

    #[test]
    fn test_mixed_paren_coefficient_is_opaque() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        let coeff = p.parse_coefficient("(2*n-1-x)").unwrap();
        assert_eq!(coeff, Expr::IndexExpr("2*n-1-x".to_string()));
    }

    #[test]
    fn test_cross_recurrence_target() {
        let indices = names(&["nA", "nB", "t"]);
        let vars = names(&["PA"]);
        let p = parser_for(&indices, &vars);

        let term = p.parse_term("HermiteE[nA-1, nB, t]").unwrap();
        assert_eq!(term.call.target.as_deref(), Some("HermiteE"));
    }

    #[test]
    fn test_parse_scale() {
        let indices = names(&["n"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        assert_eq!(p.parse_scale("1/n").unwrap(), Expr::IndexExpr("n".to_string()));
        assert_eq!(p.parse_scale("1/(2*n)").unwrap(), Expr::IndexExpr("2*n".to_string()));
        assert_eq!(p.parse_scale("1/2").unwrap(), Expr::Const(2.0));
    }

    #[test]
    fn test_parse_scale_with_compound_denominator() {
        let indices = names(&["l", "m"]);
        let vars = names(&["x"]);
        let p = parser_for(&indices, &vars);

        assert_eq!(
            p.parse_scale("1/(l-m)").unwrap(),
            Expr::IndexExpr("l-m".to_string())
        );
    }
}
