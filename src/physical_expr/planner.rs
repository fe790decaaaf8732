use std::sync::Arc;

use crate::expr::{BinaryOperator, Cast as LogicalCast, Expr};
use crate::physical_expr::*;
use crate::{Operator, QueryError, Result};

/// Compile a bound logical expression into its interpretable form.
/// Attribute references must have been rewritten to bound references
/// first; aggregates and generators are driven by their operators and
/// never appear below this entry point.
pub fn create_physical_expr(e: &Expr) -> Result<Arc<dyn PhysicalExpr>> {
    Ok(match e {
        Expr::Literal(l) => Arc::new(Literal::new(l.value.clone(), l.data_type.clone())),
        Expr::BoundReference(b) => Arc::new(BoundReference::new(b.index, b.data_type.clone())),
        Expr::Alias(a) => create_physical_expr(&a.child)?,
        Expr::Cast(LogicalCast { child, data_type }) => {
            Arc::new(Cast::new(create_physical_expr(child)?, data_type.clone())?)
        }
        Expr::Not(child) => Arc::new(Not::new(create_physical_expr(child)?)),
        Expr::IsNull(child) => Arc::new(IsNull::new(create_physical_expr(child)?)),
        Expr::IsNotNull(child) => Arc::new(IsNotNull::new(create_physical_expr(child)?)),
        Expr::BinaryOperator(BinaryOperator { left, op, right }) => {
            let left = create_physical_expr(left)?;
            let right = create_physical_expr(right)?;
            match op {
                Operator::And => Arc::new(And::new(left, right)),
                Operator::Or => Arc::new(Or::new(left, right)),
                op if op.is_arithmetic() => Arc::new(BinaryArithmetic::new(left, *op, right)?),
                op => Arc::new(BinaryComparison::new(left, *op, right)?),
            }
        }
        Expr::ScalarFunction(f) => f.create_physical_expr()?,
        Expr::AttributeReference(a) => {
            return Err(QueryError::internal(format!(
                "attribute {}#{} was not bound before physical planning",
                a.name, a.expr_id
            )));
        }
        e => {
            return Err(QueryError::UnsupportedOperation(format!(
                "no physical form for expression {e}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{GenericRow, Row, Value};
    use crate::expr::BoundReference as LogicalBound;
    use crate::types::DataType;

    #[test]
    fn test_create_and_eval_arithmetic() {
        let col0 = Expr::BoundReference(LogicalBound::new(0, DataType::Int, true));
        let col1 = Expr::BoundReference(LogicalBound::new(1, DataType::Int, true));
        let expr = col0 + col1 + Expr::int_lit(10);
        let physical = create_physical_expr(&expr).unwrap();
        let mut row = GenericRow::new(vec![Value::Int(101), Value::Int(102)]);
        assert_eq!(physical.eval(&row).unwrap(), Value::Int(213));
        row.update(1, Value::Null);
        assert_eq!(physical.eval(&row).unwrap(), Value::Null);
    }

    #[test]
    fn test_unbound_attribute_is_rejected() {
        let attr = Expr::AttributeReference(crate::expr::AttributeReference::new(
            "a",
            DataType::Int,
            true,
        ));
        assert!(create_physical_expr(&attr).is_err());
    }
}
