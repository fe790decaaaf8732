use std::any::Any;
use std::sync::Arc;

use crate::data::{Row, Value};
use crate::physical_expr::PhysicalExpr;
use crate::types::DataType;
use crate::Result;

/// Lazy conditional: only the taken branch is evaluated, and a null
/// predicate takes the false branch.
#[derive(Debug)]
pub struct If {
    pub predicate: Arc<dyn PhysicalExpr>,
    pub true_value: Arc<dyn PhysicalExpr>,
    pub false_value: Arc<dyn PhysicalExpr>,
}

impl If {
    pub fn new(
        predicate: Arc<dyn PhysicalExpr>,
        true_value: Arc<dyn PhysicalExpr>,
        false_value: Arc<dyn PhysicalExpr>,
    ) -> Self {
        Self { predicate, true_value, false_value }
    }
}

impl PhysicalExpr for If {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        self.true_value.data_type()
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        if self.predicate.eval(input)?.is_true() {
            self.true_value.eval(input)
        } else {
            self.false_value.eval(input)
        }
    }
}
