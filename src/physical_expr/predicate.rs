use std::any::Any;
use std::sync::Arc;

use crate::data::{Row, Value};
use crate::physical_expr::PhysicalExpr;
use crate::types::DataType;
use crate::Result;

#[derive(Debug)]
pub struct Not {
    pub child: Arc<dyn PhysicalExpr>,
}

impl Not {
    pub fn new(child: Arc<dyn PhysicalExpr>) -> Self {
        Not { child }
    }
}

impl PhysicalExpr for Not {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let value = self.child.eval(input)?;
        if value.is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::Boolean(!value.get_boolean()))
    }
}
