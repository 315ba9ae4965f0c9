//! Integer arithmetic over compile-time index names.
//!
//! `IndexExpr` nodes carry their arithmetic as text (`2*n-1`); this
//! module parses that text into a small expression tree for the places
//! that need more than verbatim rendering: constraint evaluation, the
//! reference evaluator, and the layered generator's unrolled `aux == 0`
//! case (substitute a literal, fold, and re-render).

use crate::utils::errors::{DslError, DslErrorKind};
use serde::{Serialize, Deserialize};
use std::fmt;
use unicode_xid::UnicodeXID;

/// Arithmetic operator inside an index expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntOp {
    Add,
    Sub,
    Mul,
}

impl IntOp {
    fn symbol(&self) -> &'static str {
        match self {
            IntOp::Add => "+",
            IntOp::Sub => "-",
            IntOp::Mul => "*",
        }
    }
}

/// A parsed integer arithmetic expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntExpr {
    /// Integer literal
    Num(i64),
    /// Index (or other) variable reference
    Var(String),
    /// Unary negation
    Neg(Box<IntExpr>),
    /// Binary operation
    Bin {
        op: IntOp,
        lhs: Box<IntExpr>,
        rhs: Box<IntExpr>,
    },
}

impl IntExpr {
    /// Evaluate with the given variable lookup.
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<i64>) -> Option<i64> {
        match self {
            IntExpr::Num(v) => Some(*v),
            IntExpr::Var(name) => lookup(name),
            IntExpr::Neg(inner) => inner.eval(lookup).map(|v| -v),
            IntExpr::Bin { op, lhs, rhs } => {
                let l = lhs.eval(lookup)?;
                let r = rhs.eval(lookup)?;
                Some(match op {
                    IntOp::Add => l + r,
                    IntOp::Sub => l - r,
                    IntOp::Mul => l * r,
                })
            }
        }
    }

    /// Collect referenced variable names in source order.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            IntExpr::Num(_) => {}
            IntExpr::Var(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            IntExpr::Neg(inner) => inner.collect_variables(out),
            IntExpr::Bin { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }

    /// Replace one variable by a literal value.
    pub fn substitute(&self, name: &str, value: i64) -> IntExpr {
        match self {
            IntExpr::Num(v) => IntExpr::Num(*v),
            IntExpr::Var(var) => {
                if var == name {
                    IntExpr::Num(value)
                } else {
                    IntExpr::Var(var.clone())
                }
            }
            IntExpr::Neg(inner) => IntExpr::Neg(Box::new(inner.substitute(name, value))),
            IntExpr::Bin { op, lhs, rhs } => IntExpr::Bin {
                op: *op,
                lhs: Box::new(lhs.substitute(name, value)),
                rhs: Box::new(rhs.substitute(name, value)),
            },
        }
    }

    /// Constant value if the expression is fully constant.
    pub fn as_constant(&self) -> Option<i64> {
        self.eval(&|_| None)
    }

    /// Flatten addition/subtraction chains and combine constant terms.
    ///
    /// `((nA - 1) + nB) + 1 + 1` becomes `nA + nB + 1`. Products and
    /// other non-additive sub-expressions are treated as opaque atoms.
    pub fn simplify(&self) -> IntExpr {
        let mut atoms: Vec<(i64, IntExpr)> = Vec::new();
        let mut constant = 0i64;
        self.flatten_sum(1, &mut atoms, &mut constant);

        let mut result: Option<IntExpr> = None;
        for (sign, atom) in atoms {
            result = Some(match result {
                None => {
                    if sign >= 0 {
                        atom
                    } else {
                        IntExpr::Neg(Box::new(atom))
                    }
                }
                Some(acc) => IntExpr::Bin {
                    op: if sign >= 0 { IntOp::Add } else { IntOp::Sub },
                    lhs: Box::new(acc),
                    rhs: Box::new(atom),
                },
            });
        }

        match result {
            None => IntExpr::Num(constant),
            Some(acc) if constant == 0 => acc,
            Some(acc) => IntExpr::Bin {
                op: if constant > 0 { IntOp::Add } else { IntOp::Sub },
                lhs: Box::new(acc),
                rhs: Box::new(IntExpr::Num(constant.abs())),
            },
        }
    }

    fn flatten_sum(&self, sign: i64, atoms: &mut Vec<(i64, IntExpr)>, constant: &mut i64) {
        match self {
            IntExpr::Num(v) => *constant += sign * v,
            IntExpr::Var(_) => atoms.push((sign, self.clone())),
            IntExpr::Neg(inner) => inner.flatten_sum(-sign, atoms, constant),
            IntExpr::Bin { op: IntOp::Add, lhs, rhs } => {
                lhs.flatten_sum(sign, atoms, constant);
                rhs.flatten_sum(sign, atoms, constant);
            }
            IntExpr::Bin { op: IntOp::Sub, lhs, rhs } => {
                lhs.flatten_sum(sign, atoms, constant);
                rhs.flatten_sum(-sign, atoms, constant);
            }
            IntExpr::Bin { op: IntOp::Mul, .. } => {
                if let Some(v) = self.as_constant() {
                    *constant += sign * v;
                } else {
                    atoms.push((sign, self.clone()));
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            IntExpr::Num(_) | IntExpr::Var(_) => 3,
            IntExpr::Neg(_) => 2,
            IntExpr::Bin { op: IntOp::Mul, .. } => 2,
            IntExpr::Bin { .. } => 1,
        }
    }
}

impl fmt::Display for IntExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntExpr::Num(v) => write!(f, "{}", v),
            IntExpr::Var(name) => write!(f, "{}", name),
            IntExpr::Neg(inner) => {
                if inner.precedence() < 3 {
                    write!(f, "-({})", inner)
                } else {
                    write!(f, "-{}", inner)
                }
            }
            IntExpr::Bin { op, lhs, rhs } => {
                let prec = self.precedence();
                if lhs.precedence() < prec {
                    write!(f, "({})", lhs)?;
                } else {
                    write!(f, "{}", lhs)?;
                }
                write!(f, " {} ", op.symbol())?;
                // Subtraction and mixed precedence need parentheses on
                // the right to preserve grouping.
                let rhs_needs_parens = rhs.precedence() < prec
                    || (*op == IntOp::Sub && rhs.precedence() == prec);
                if rhs_needs_parens {
                    write!(f, "({})", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
        }
    }
}

/// Parse an index-arithmetic expression.
pub fn parse(text: &str) -> Result<IntExpr, DslError> {
    let mut parser = ArithParser::new(text);
    let expr = parser.parse_expr()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input in index expression"));
    }
    Ok(expr)
}

/// Check whether `text` contains `name` as a whole identifier token.
///
/// Token-based, so `n` does not match inside `nA` or `one_minus_x`.
pub fn contains_ident(text: &str, name: &str) -> bool {
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_xid_start() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(i, nc)) = chars.peek() {
                if nc.is_xid_continue() {
                    end = i + nc.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            if &text[start..end] == name {
                return true;
            }
        }
    }
    false
}

/// Replace every whole-identifier occurrence of `name` in `text`.
pub fn replace_ident(text: &str, name: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_xid_start() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(i, nc)) = chars.peek() {
                if nc.is_xid_continue() {
                    end = i + nc.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            if &text[start..end] == name {
                out.push_str(replacement);
            } else {
                out.push_str(&text[start..end]);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Collect every identifier token in `text`, in source order.
pub fn identifiers(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_xid_start() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(i, nc)) = chars.peek() {
                if nc.is_xid_continue() {
                    end = i + nc.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let ident = text[start..end].to_string();
            if !out.contains(&ident) {
                out.push(ident);
            }
        }
    }
    out
}

/// Recursive descent parser over a single arithmetic expression.
struct ArithParser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> ArithParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> DslError {
        DslError::new(DslErrorKind::InvalidIndexExpr, message, self.text)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<IntExpr, DslError> {
        let mut lhs = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => IntOp::Add,
                Some('-') => IntOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = IntExpr::Bin {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// term := factor ('*' factor)*
    fn parse_term(&mut self) -> Result<IntExpr, DslError> {
        let mut lhs = self.parse_factor()?;
        loop {
            self.skip_whitespace();
            if self.peek() != Some('*') {
                break;
            }
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = IntExpr::Bin {
                op: IntOp::Mul,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// factor := NUMBER | IDENT | '-' factor | '(' expr ')'
    fn parse_factor(&mut self) -> Result<IntExpr, DslError> {
        self.skip_whitespace();
        match self.peek() {
            Some('-') => {
                self.advance();
                let inner = self.parse_factor()?;
                Ok(IntExpr::Neg(Box::new(inner)))
            }
            Some('(') => {
                self.advance();
                let inner = self.parse_expr()?;
                self.skip_whitespace();
                if self.peek() != Some(')') {
                    return Err(self.error("missing closing parenthesis in index expression"));
                }
                self.advance();
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() => {
                let mut value = String::new();
                while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                    value.push(self.advance().unwrap());
                }
                value
                    .parse::<i64>()
                    .map(IntExpr::Num)
                    .map_err(|_| self.error("integer literal out of range"))
            }
            Some(c) if c.is_xid_start() || c == '_' => {
                let mut name = String::new();
                name.push(self.advance().unwrap());
                while matches!(self.peek(), Some(nc) if nc.is_xid_continue()) {
                    name.push(self.advance().unwrap());
                }
                Ok(IntExpr::Var(name))
            }
            Some(c) => Err(self.error(&format!("unexpected character `{}` in index expression", c))),
            None => Err(self.error("unexpected end of index expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_with(text: &str, vars: &[(&str, i64)]) -> i64 {
        let expr = parse(text).unwrap();
        expr.eval(&|name| {
            vars.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
        })
        .unwrap()
    }

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(eval_with("2*n-1", &[("n", 5)]), 9);
        assert_eq!(eval_with("-(n-1)", &[("n", 4)]), -3);
        assert_eq!(eval_with("nA + nB", &[("nA", 1), ("nB", 2)]), 3);
        assert_eq!(eval_with("(2*m+1)", &[("m", 3)]), 7);
    }

    #[test]
    fn test_parse_failure() {
        assert!(parse("2 +").is_err());
        assert!(parse("(n").is_err());
        assert!(parse("n ? 1").is_err());
    }

    #[test]
    fn test_substitute_and_fold() {
        let expr = parse("t + 1").unwrap();
        let folded = expr.substitute("t", 0).simplify();
        assert_eq!(folded, IntExpr::Num(1));
    }

    #[test]
    fn test_simplify_combines_constants() {
        let expr = parse("((nA - 1) + nB) + 1 + 1").unwrap();
        assert_eq!(expr.simplify().to_string(), "nA + nB + 1");
    }

    #[test]
    fn test_display_preserves_grouping() {
        let expr = parse("2*(n-1)").unwrap();
        let rendered = expr.to_string();
        assert_eq!(eval_with(&rendered, &[("n", 5)]), 8);
    }

    #[test]
    fn test_contains_ident() {
        assert!(contains_ident("2*n-1", "n"));
        assert!(!contains_ident("nA + nB", "n"));
        assert!(contains_ident("Boys[N]", "Boys"));
        assert!(!contains_ident("one_minus_x", "x"));
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(identifiers("2*l - m + l"), vec!["l".to_string(), "m".to_string()]);
    }

    #[test]
    fn test_replace_ident() {
        assert_eq!(replace_ident("t + 1", "t", "(N_VALUES - 1)"), "(N_VALUES - 1) + 1");
        assert_eq!(replace_ident("nA + nB", "n", "0"), "nA + nB");
    }
}
