use std::any::Any;
use std::sync::Arc;

use crate::data::{Row, Value};
use crate::physical_expr::PhysicalExpr;
use crate::types::DataType;
use crate::Result;

// IsNull and IsNotNull are the only predicates that observe nullness
// directly; both always return a non-null boolean.

#[derive(Debug)]
pub struct IsNull {
    pub child: Arc<dyn PhysicalExpr>,
}

impl IsNull {
    pub fn new(child: Arc<dyn PhysicalExpr>) -> Self {
        IsNull { child }
    }
}

impl PhysicalExpr for IsNull {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let value = self.child.eval(input)?;
        Ok(Value::Boolean(value.is_null()))
    }
}

#[derive(Debug)]
pub struct IsNotNull {
    pub child: Arc<dyn PhysicalExpr>,
}

impl IsNotNull {
    pub fn new(child: Arc<dyn PhysicalExpr>) -> Self {
        IsNotNull { child }
    }
}

impl PhysicalExpr for IsNotNull {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let value = self.child.eval(input)?;
        Ok(Value::Boolean(!value.is_null()))
    }
}

#[derive(Debug)]
pub struct Coalesce {
    children: Vec<Arc<dyn PhysicalExpr>>,
}

impl Coalesce {
    pub fn new(children: Vec<Arc<dyn PhysicalExpr>>) -> Coalesce {
        Coalesce { children }
    }
}

impl PhysicalExpr for Coalesce {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        self.children[0].data_type()
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        for child in &self.children {
            let value = child.eval(input)?;
            if !value.is_null() {
                return Ok(value);
            }
        }
        Ok(Value::Null)
    }
}
