//! Render an expression AST back to DSL text.
//!
//! The printer is the inverse of [`super::parser`] for sum-of-terms
//! expressions: printing and re-parsing reproduces identical shift
//! vectors and structurally-equal coefficients.

use crate::ast::{BinOp, Expr, RecursiveCall, Term};
use crate::utils::pretty::PrettyPrint;
use pretty::{DocAllocator, DocBuilder};

/// DSL printer bound to a recurrence's index names and accessor.
pub struct DslPrinter<'a> {
    indices: &'a [String],
    accessor: &'a str,
}

impl<'a> DslPrinter<'a> {
    /// Create a printer for the given recurrence shape.
    pub fn new(indices: &'a [String], accessor: &'a str) -> Self {
        Self { indices, accessor }
    }

    /// Render an expression to DSL text.
    pub fn print(&self, expr: &Expr) -> String {
        Printable { printer: self, expr }.pretty()
    }

    fn expr_doc<'b, D: DocAllocator<'b>>(&self, expr: &Expr, alloc: &'b D) -> DocBuilder<'b, D> {
        match expr {
            Expr::Const(v) => alloc.text(format_number(*v)),
            Expr::Literal(text) => alloc.text(text.clone()),
            Expr::Var(name) => alloc.text(name.clone()),
            Expr::IndexExpr(text) => alloc.text(format!("({})", text)),
            Expr::Call(call) => self.call_doc(call, alloc),
            Expr::Binary { op, lhs, rhs } => self
                .expr_doc(lhs, alloc)
                .append(alloc.text(format!(" {} ", op.symbol())))
                .append(self.expr_doc(rhs, alloc)),
            Expr::Sum(terms) => {
                if terms.is_empty() {
                    return alloc.text("0");
                }
                join_docs(terms.iter().map(|t| self.term_doc(t, alloc)), " + ", alloc)
            }
            Expr::Scaled { inner, scale, division } => {
                let op = if *division { "/" } else { "*" };
                alloc
                    .text("(")
                    .append(self.expr_doc(inner, alloc))
                    .append(alloc.text(format!(") {} (", op)))
                    .append(self.expr_doc(scale, alloc))
                    .append(alloc.text(")"))
            }
            Expr::BranchAverage { branches, scale } => {
                let docs = branches.iter().map(|b| {
                    alloc
                        .text("(")
                        .append(self.expr_doc(b, alloc))
                        .append(alloc.text(")"))
                });
                alloc
                    .text("(")
                    .append(join_docs(docs, " + ", alloc))
                    .append(alloc.text(") * "))
                    .append(self.expr_doc(scale, alloc))
            }
            Expr::CseRef(name) => alloc.text(name.clone()),
            Expr::FlatSum(exprs) => {
                if exprs.is_empty() {
                    return alloc.text("0");
                }
                join_docs(exprs.iter().map(|e| self.expr_doc(e, alloc)), " + ", alloc)
            }
        }
    }

    fn term_doc<'b, D: DocAllocator<'b>>(&self, term: &Term, alloc: &'b D) -> DocBuilder<'b, D> {
        let call = self.call_doc(&term.call, alloc);
        if term.is_unit_coeff() {
            call
        } else {
            self.expr_doc(&term.coeff, alloc)
                .append(alloc.text(" * "))
                .append(call)
        }
    }

    fn call_doc<'b, D: DocAllocator<'b>>(
        &self,
        call: &RecursiveCall,
        alloc: &'b D,
    ) -> DocBuilder<'b, D> {
        let accessor = call.target.as_deref().unwrap_or(self.accessor);
        let components = self
            .indices
            .iter()
            .enumerate()
            .map(|(slot, name)| {
                let shift = call.shift(slot);
                if shift == 0 {
                    name.clone()
                } else if shift > 0 {
                    format!("{}+{}", name, shift)
                } else {
                    format!("{}-{}", name, -shift)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        alloc.text(format!("{}[{}]", accessor, components))
    }
}

/// Join documents with a textual separator.
fn join_docs<'b, D: DocAllocator<'b>>(
    docs: impl Iterator<Item = DocBuilder<'b, D>>,
    sep: &'static str,
    alloc: &'b D,
) -> DocBuilder<'b, D> {
    let mut result: Option<DocBuilder<'b, D>> = None;
    for doc in docs {
        result = Some(match result {
            None => doc,
            Some(acc) => acc.append(alloc.text(sep)).append(doc),
        });
    }
    result.unwrap_or_else(|| alloc.nil())
}

/// Numbers that are whole print without a fractional part, so the
/// parser classifies them back into the same `Const`.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

struct Printable<'a, 'b> {
    printer: &'a DslPrinter<'b>,
    expr: &'a Expr,
}

impl PrettyPrint for Printable<'_, '_> {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        self.printer.expr_doc(self.expr, allocator)
    }
}
