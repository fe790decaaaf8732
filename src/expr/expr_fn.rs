use crate::expr::{BinaryOperator, Expr, UnresolvedAttribute};
use crate::Operator;

/// Return a new expression `left <op> right`
pub fn binary_expr(left: Expr, op: Operator, right: Expr) -> Expr {
    Expr::BinaryOperator(BinaryOperator::new(Box::new(left), op, Box::new(right)))
}

/// Unresolved column reference by name.
pub fn col(name: impl Into<String>) -> Expr {
    UnresolvedAttribute::quoted(name)
}

/// Unresolved column reference qualified by relation alias.
pub fn qualified_col(qualifier: impl Into<String>, name: impl Into<String>) -> Expr {
    UnresolvedAttribute::qualified(qualifier, name)
}
