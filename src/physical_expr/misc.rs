use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use rand::Rng;

use crate::data::{Row, Value};
use crate::expr::UdfImpl;
use crate::physical_expr::PhysicalExpr;
use crate::types::DataType;
use crate::Result;

/// Uniform random double in `[0, 1)`.
#[derive(Debug)]
pub struct Rand;

impl PhysicalExpr for Rand {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        DataType::Double
    }

    fn eval(&self, _input: &dyn Row) -> Result<Value> {
        Ok(Value::Double(rand::rng().random::<f64>()))
    }
}

/// Evaluates the argument expressions and hands the values to the
/// user's function. Argument nulls are not filtered here.
pub struct ScalarUdfExpr {
    pub name: String,
    pub data_type: DataType,
    pub children: Vec<Arc<dyn PhysicalExpr>>,
    fun: Arc<UdfImpl>,
}

impl ScalarUdfExpr {
    pub fn new(
        name: String,
        data_type: DataType,
        children: Vec<Arc<dyn PhysicalExpr>>,
        fun: Arc<UdfImpl>,
    ) -> Self {
        Self { name, data_type, children, fun }
    }
}

impl Debug for ScalarUdfExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarUdfExpr")
            .field("name", &self.name)
            .field("children", &self.children)
            .finish()
    }
}

impl PhysicalExpr for ScalarUdfExpr {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let mut args = Vec::with_capacity(self.children.len());
        for child in &self.children {
            args.push(child.eval(input)?);
        }
        (self.fun)(&args)
    }
}
