use std::any::Any;
use std::fmt::Debug;

use crate::data::{Row, Value};
use crate::types::DataType;
use crate::Result;

/// An expression bound to input ordinals and ready to interpret over a
/// single row. Kernels are selected once at construction; `eval` does
/// no type dispatch of its own.
pub trait PhysicalExpr: Send + Sync + Debug {
    /// Returns the physical expression as [`Any`] so that it can be
    /// downcast to a specific implementation.
    fn as_any(&self) -> &dyn Any;

    fn data_type(&self) -> DataType;

    fn eval(&self, input: &dyn Row) -> Result<Value>;
}

/// Null-intolerant binary expressions: a null on either side is the
/// result, the kernel only ever sees non-null values.
pub trait BinaryExpr {
    fn left(&self) -> &dyn PhysicalExpr;
    fn right(&self) -> &dyn PhysicalExpr;

    fn null_safe_eval(&self, left_value: Value, right_value: Value) -> Result<Value>;

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let left_value = self.left().eval(input)?;
        if left_value.is_null() {
            return Ok(Value::Null);
        }
        let right_value = self.right().eval(input)?;
        if right_value.is_null() {
            return Ok(Value::Null);
        }
        self.null_safe_eval(left_value, right_value)
    }
}
