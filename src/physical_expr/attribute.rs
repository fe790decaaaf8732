use std::any::Any;

use crate::data::{Row, Value};
use crate::physical_expr::PhysicalExpr;
use crate::types::DataType;
use crate::{QueryError, Result};

/// Direct indexed access into the (flattened) input row.
#[derive(Clone, Debug)]
pub struct BoundReference {
    pub index: usize,
    pub data_type: DataType,
}

impl BoundReference {
    pub fn new(index: usize, data_type: DataType) -> Self {
        Self { index, data_type }
    }
}

impl PhysicalExpr for BoundReference {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        if self.index >= input.len() {
            return Err(QueryError::IndexOutOfBounds { index: self.index, len: input.len() });
        }
        Ok(input.get(self.index).clone())
    }
}
