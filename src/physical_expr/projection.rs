use std::sync::Arc;

use crate::data::{GenericRow, JoinedRow, Row};
use crate::expr::{AttributeReference, BoundReference, Expr};
use crate::physical_expr::{create_physical_expr, PhysicalExpr};
use crate::Result;

fn compile(expressions: &[Expr]) -> Result<Vec<(usize, Arc<dyn PhysicalExpr>)>> {
    expressions
        .iter()
        .enumerate()
        .filter(|(_, expr)| !matches!(expr, Expr::NoOp))
        .map(|(i, expr)| create_physical_expr(expr).map(|e| (i, e)))
        .collect()
}

/// Evaluates a list of bound expressions into a fresh output row.
/// `NoOp` slots are left null for an imperative owner to fill.
#[derive(Debug)]
pub struct Projection {
    exprs: Vec<(usize, Arc<dyn PhysicalExpr>)>,
    width: usize,
}

impl Projection {
    pub fn new(expressions: Vec<Expr>) -> Result<Self> {
        let exprs = compile(&expressions)?;
        Ok(Self { exprs, width: expressions.len() })
    }

    pub fn new_with_input_attrs(
        expressions: Vec<Expr>,
        input: Vec<AttributeReference>,
    ) -> Result<Self> {
        let expressions = BoundReference::bind_references(expressions, &[input])?;
        Self::new(expressions)
    }

    pub fn apply(&self, input: &dyn Row) -> Result<GenericRow> {
        let mut row = GenericRow::new_with_size(self.width);
        self.apply_target(&mut row, input)?;
        Ok(row)
    }

    pub fn apply_target(&self, row: &mut GenericRow, input: &dyn Row) -> Result<()> {
        for (i, expr) in self.exprs.iter() {
            row.update(*i, expr.eval(input)?);
        }
        Ok(())
    }
}

/// Projection over `(buffer ++ input)` writing back into the buffer:
/// the update step of declarative aggregation. Slots are evaluated in
/// order and later slots observe earlier writes.
#[derive(Debug)]
pub struct MutableProjection {
    exprs: Vec<(usize, Arc<dyn PhysicalExpr>)>,
}

impl MutableProjection {
    pub fn new(expressions: Vec<Expr>) -> Result<Self> {
        let exprs = compile(&expressions)?;
        Ok(Self { exprs })
    }

    pub fn new_with_input_attrs(
        expressions: Vec<Expr>,
        inputs: &[Vec<AttributeReference>],
    ) -> Result<Self> {
        let expressions = BoundReference::bind_references(expressions, inputs)?;
        Self::new(expressions)
    }

    pub fn apply(&self, target: &mut GenericRow, input: &dyn Row) -> Result<()> {
        for (i, expr) in self.exprs.iter() {
            let value = {
                let joined = JoinedRow::new(target, input);
                expr.eval(&joined)?
            };
            target.update(*i, value);
        }
        Ok(())
    }
}
