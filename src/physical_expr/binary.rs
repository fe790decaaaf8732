use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use bigdecimal::Zero;

use crate::data::{Row, Value};
use crate::physical_expr::{BinaryExpr, PhysicalExpr};
use crate::types::DataType;
use crate::{Operator, QueryError, Result};

pub type BinaryFunc = dyn Fn(Value, Value) -> Result<Value> + Send + Sync;

/// Arithmetic over two operands of the same (post-coercion) numeric
/// type. The kernel is picked once from the operand type.
pub struct BinaryArithmetic {
    pub left: Arc<dyn PhysicalExpr>,
    pub op: Operator,
    pub right: Arc<dyn PhysicalExpr>,
    f: Box<BinaryFunc>,
}

impl BinaryArithmetic {
    pub fn new(left: Arc<dyn PhysicalExpr>, op: Operator, right: Arc<dyn PhysicalExpr>) -> Result<Self> {
        let f = get_binary_arithmetic_func(op, left.data_type())?;
        Ok(Self { left, op, right, f })
    }
}

impl Debug for BinaryArithmetic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryArithmetic")
            .field("left", &self.left)
            .field("op", &self.op)
            .field("right", &self.right)
            .finish()
    }
}

impl BinaryExpr for BinaryArithmetic {
    fn left(&self) -> &dyn PhysicalExpr {
        self.left.as_ref()
    }

    fn right(&self) -> &dyn PhysicalExpr {
        self.right.as_ref()
    }

    fn null_safe_eval(&self, left_value: Value, right_value: Value) -> Result<Value> {
        (self.f)(left_value, right_value)
    }
}

impl PhysicalExpr for BinaryArithmetic {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        self.left.data_type()
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        BinaryExpr::eval(self, input)
    }
}

macro_rules! arith_kernel {
    ($name:ident, $variant:ident, $op:tt) => {
        fn $name(left: Value, right: Value) -> Result<Value> {
            match (left, right) {
                (Value::$variant(x), Value::$variant(y)) => Ok(Value::$variant(x $op y)),
                (l, r) => Err(QueryError::internal(format!(
                    "arithmetic kernel got {l:?} and {r:?}"
                ))),
            }
        }
    };
}

// integral division and remainder by zero abort evaluation; the
// fractional kernels follow IEEE and produce infinities/NaN instead
macro_rules! int_div_kernel {
    ($name:ident, $variant:ident, $op:tt) => {
        fn $name(left: Value, right: Value) -> Result<Value> {
            match (left, right) {
                (Value::$variant(x), Value::$variant(y)) => {
                    if y == 0 {
                        Err(QueryError::DivisionByZero)
                    } else {
                        Ok(Value::$variant(x $op y))
                    }
                }
                (l, r) => Err(QueryError::internal(format!(
                    "arithmetic kernel got {l:?} and {r:?}"
                ))),
            }
        }
    };
}

arith_kernel!(byte_add, Byte, +);
arith_kernel!(short_add, Short, +);
arith_kernel!(int_add, Int, +);
arith_kernel!(long_add, Long, +);
arith_kernel!(float_add, Float, +);
arith_kernel!(double_add, Double, +);
arith_kernel!(byte_subtract, Byte, -);
arith_kernel!(short_subtract, Short, -);
arith_kernel!(int_subtract, Int, -);
arith_kernel!(long_subtract, Long, -);
arith_kernel!(float_subtract, Float, -);
arith_kernel!(double_subtract, Double, -);
arith_kernel!(byte_multiply, Byte, *);
arith_kernel!(short_multiply, Short, *);
arith_kernel!(int_multiply, Int, *);
arith_kernel!(long_multiply, Long, *);
arith_kernel!(float_multiply, Float, *);
arith_kernel!(double_multiply, Double, *);
arith_kernel!(float_divide, Float, /);
arith_kernel!(double_divide, Double, /);
arith_kernel!(float_remainder, Float, %);
arith_kernel!(double_remainder, Double, %);
int_div_kernel!(byte_divide, Byte, /);
int_div_kernel!(short_divide, Short, /);
int_div_kernel!(int_divide, Int, /);
int_div_kernel!(long_divide, Long, /);
int_div_kernel!(byte_remainder, Byte, %);
int_div_kernel!(short_remainder, Short, %);
int_div_kernel!(int_remainder, Int, %);
int_div_kernel!(long_remainder, Long, %);

fn decimal_values(left: Value, right: Value) -> Result<(Arc<bigdecimal::BigDecimal>, Arc<bigdecimal::BigDecimal>)> {
    match (left, right) {
        (Value::Decimal(x), Value::Decimal(y)) => Ok((x, y)),
        (l, r) => Err(QueryError::internal(format!("arithmetic kernel got {l:?} and {r:?}"))),
    }
}

fn decimal_add(left: Value, right: Value) -> Result<Value> {
    let (x, y) = decimal_values(left, right)?;
    Ok(Value::decimal(x.as_ref() + y.as_ref()))
}

fn decimal_subtract(left: Value, right: Value) -> Result<Value> {
    let (x, y) = decimal_values(left, right)?;
    Ok(Value::decimal(x.as_ref() - y.as_ref()))
}

fn decimal_multiply(left: Value, right: Value) -> Result<Value> {
    let (x, y) = decimal_values(left, right)?;
    Ok(Value::decimal(x.as_ref() * y.as_ref()))
}

fn decimal_divide(left: Value, right: Value) -> Result<Value> {
    let (x, y) = decimal_values(left, right)?;
    if y.is_zero() {
        return Err(QueryError::DivisionByZero);
    }
    Ok(Value::decimal(x.as_ref() / y.as_ref()))
}

fn decimal_remainder(left: Value, right: Value) -> Result<Value> {
    let (x, y) = decimal_values(left, right)?;
    if y.is_zero() {
        return Err(QueryError::DivisionByZero);
    }
    Ok(Value::decimal(x.as_ref() % y.as_ref()))
}

fn get_binary_arithmetic_func(op: Operator, data_type: DataType) -> Result<Box<BinaryFunc>> {
    let f: Box<BinaryFunc> = match op {
        Operator::Plus => match data_type {
            DataType::Byte => Box::new(byte_add),
            DataType::Short => Box::new(short_add),
            DataType::Int => Box::new(int_add),
            DataType::Long => Box::new(long_add),
            DataType::Float => Box::new(float_add),
            DataType::Double => Box::new(double_add),
            DataType::Decimal => Box::new(decimal_add),
            _ => return unsupported(op, &data_type),
        },
        Operator::Minus => match data_type {
            DataType::Byte => Box::new(byte_subtract),
            DataType::Short => Box::new(short_subtract),
            DataType::Int => Box::new(int_subtract),
            DataType::Long => Box::new(long_subtract),
            DataType::Float => Box::new(float_subtract),
            DataType::Double => Box::new(double_subtract),
            DataType::Decimal => Box::new(decimal_subtract),
            _ => return unsupported(op, &data_type),
        },
        Operator::Multiply => match data_type {
            DataType::Byte => Box::new(byte_multiply),
            DataType::Short => Box::new(short_multiply),
            DataType::Int => Box::new(int_multiply),
            DataType::Long => Box::new(long_multiply),
            DataType::Float => Box::new(float_multiply),
            DataType::Double => Box::new(double_multiply),
            DataType::Decimal => Box::new(decimal_multiply),
            _ => return unsupported(op, &data_type),
        },
        Operator::Divide => match data_type {
            DataType::Byte => Box::new(byte_divide),
            DataType::Short => Box::new(short_divide),
            DataType::Int => Box::new(int_divide),
            DataType::Long => Box::new(long_divide),
            DataType::Float => Box::new(float_divide),
            DataType::Double => Box::new(double_divide),
            DataType::Decimal => Box::new(decimal_divide),
            _ => return unsupported(op, &data_type),
        },
        Operator::Remainder => match data_type {
            DataType::Byte => Box::new(byte_remainder),
            DataType::Short => Box::new(short_remainder),
            DataType::Int => Box::new(int_remainder),
            DataType::Long => Box::new(long_remainder),
            DataType::Float => Box::new(float_remainder),
            DataType::Double => Box::new(double_remainder),
            DataType::Decimal => Box::new(decimal_remainder),
            _ => return unsupported(op, &data_type),
        },
        _ => return unsupported(op, &data_type),
    };
    Ok(f)
}

fn unsupported(op: Operator, data_type: &DataType) -> Result<Box<BinaryFunc>> {
    Err(QueryError::UnsupportedOperation(format!("{op} over {data_type}")))
}

// Binary comparison. Equality follows three-valued logic: a null on
// either side (handled by BinaryExpr::eval) makes the comparison null,
// including `null = null`.

fn get_binary_comparison_func(op: Operator) -> Result<Box<BinaryFunc>> {
    let f: Box<BinaryFunc> = match op {
        Operator::Eq => Box::new(binary_eq),
        Operator::NotEq => Box::new(binary_ne),
        Operator::Lt => Box::new(binary_lt),
        Operator::LtEq => Box::new(binary_lte),
        Operator::Gt => Box::new(binary_gt),
        Operator::GtEq => Box::new(binary_gte),
        _ => return Err(QueryError::UnsupportedOperation(format!("{op} is not a comparison"))),
    };
    Ok(f)
}

fn binary_eq(left: Value, right: Value) -> Result<Value> {
    Ok(Value::Boolean(left == right))
}

fn binary_ne(left: Value, right: Value) -> Result<Value> {
    Ok(Value::Boolean(left != right))
}

macro_rules! cmp_kernel {
    ($name:ident, $($pat:pat => $result:expr),+) => {
        fn $name(left: Value, right: Value) -> Result<Value> {
            Ok(match left.partial_cmp(&right) {
                $(Some($pat) => $result,)+
                None => Value::Null,
            })
        }
    };
}

cmp_kernel!(binary_lt,
    std::cmp::Ordering::Less => Value::Boolean(true),
    _ => Value::Boolean(false));
cmp_kernel!(binary_lte,
    std::cmp::Ordering::Greater => Value::Boolean(false),
    _ => Value::Boolean(true));
cmp_kernel!(binary_gt,
    std::cmp::Ordering::Greater => Value::Boolean(true),
    _ => Value::Boolean(false));
cmp_kernel!(binary_gte,
    std::cmp::Ordering::Less => Value::Boolean(false),
    _ => Value::Boolean(true));

pub struct BinaryComparison {
    pub left: Arc<dyn PhysicalExpr>,
    pub op: Operator,
    pub right: Arc<dyn PhysicalExpr>,
    f: Box<BinaryFunc>,
}

impl BinaryComparison {
    pub fn new(left: Arc<dyn PhysicalExpr>, op: Operator, right: Arc<dyn PhysicalExpr>) -> Result<Self> {
        let f = get_binary_comparison_func(op)?;
        Ok(Self { left, op, right, f })
    }
}

impl Debug for BinaryComparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryComparison")
            .field("left", &self.left)
            .field("op", &self.op)
            .field("right", &self.right)
            .finish()
    }
}

impl BinaryExpr for BinaryComparison {
    fn left(&self) -> &dyn PhysicalExpr {
        self.left.as_ref()
    }

    fn right(&self) -> &dyn PhysicalExpr {
        self.right.as_ref()
    }

    fn null_safe_eval(&self, left_value: Value, right_value: Value) -> Result<Value> {
        (self.f)(left_value, right_value)
    }
}

impl PhysicalExpr for BinaryComparison {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        BinaryExpr::eval(self, input)
    }
}

/// Three-valued AND: false short-circuits, null wins over true.
#[derive(Debug)]
pub struct And {
    pub left: Arc<dyn PhysicalExpr>,
    pub right: Arc<dyn PhysicalExpr>,
}

impl And {
    pub fn new(left: Arc<dyn PhysicalExpr>, right: Arc<dyn PhysicalExpr>) -> Self {
        Self { left, right }
    }
}

impl PhysicalExpr for And {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let left_value = self.left.eval(input)?;
        let left_is_null = left_value.is_null();
        if !left_is_null && !left_value.get_boolean() {
            return Ok(Value::Boolean(false));
        }
        let right_value = self.right.eval(input)?;
        let right_is_null = right_value.is_null();
        if !right_is_null && !right_value.get_boolean() {
            Ok(Value::Boolean(false))
        } else if !left_is_null && !right_is_null {
            Ok(Value::Boolean(true))
        } else {
            Ok(Value::Null)
        }
    }
}

/// Three-valued OR: true short-circuits, null wins over false.
#[derive(Debug)]
pub struct Or {
    pub left: Arc<dyn PhysicalExpr>,
    pub right: Arc<dyn PhysicalExpr>,
}

impl Or {
    pub fn new(left: Arc<dyn PhysicalExpr>, right: Arc<dyn PhysicalExpr>) -> Self {
        Self { left, right }
    }
}

impl PhysicalExpr for Or {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let left_value = self.left.eval(input)?;
        let left_is_null = left_value.is_null();
        if !left_is_null && left_value.get_boolean() {
            return Ok(Value::Boolean(true));
        }
        let right_value = self.right.eval(input)?;
        let right_is_null = right_value.is_null();
        if !right_is_null && right_value.get_boolean() {
            Ok(Value::Boolean(true))
        } else if !left_is_null && !right_is_null {
            Ok(Value::Boolean(false))
        } else {
            Ok(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GenericRow;
    use crate::physical_expr::{BoundReference, Literal};

    fn col(i: usize, dt: DataType) -> Arc<dyn PhysicalExpr> {
        Arc::new(BoundReference::new(i, dt))
    }

    fn lit(v: Value, dt: DataType) -> Arc<dyn PhysicalExpr> {
        Arc::new(Literal::new(v, dt))
    }

    #[test]
    fn test_int_arithmetic_and_null_propagation() {
        let expr = BinaryArithmetic::new(
            Arc::new(BinaryArithmetic::new(
                col(0, DataType::Int),
                Operator::Plus,
                col(1, DataType::Int),
            ).unwrap()),
            Operator::Plus,
            lit(Value::Int(10), DataType::Int),
        )
        .unwrap();
        let row = GenericRow::new(vec![Value::Int(101), Value::Int(102)]);
        assert_eq!(PhysicalExpr::eval(&expr, &row).unwrap(), Value::Int(213));
        let row = GenericRow::new(vec![Value::Int(101), Value::Null]);
        assert_eq!(PhysicalExpr::eval(&expr, &row).unwrap(), Value::Null);
    }

    #[test]
    fn test_integral_division_by_zero_fails() {
        let expr = BinaryArithmetic::new(
            lit(Value::Long(7), DataType::Long),
            Operator::Divide,
            lit(Value::Long(0), DataType::Long),
        )
        .unwrap();
        let err = PhysicalExpr::eval(&expr, empty()).unwrap_err();
        assert_eq!(err, QueryError::DivisionByZero);
    }

    #[test]
    fn test_fractional_division_by_zero_is_infinite() {
        let expr = BinaryArithmetic::new(
            lit(Value::Double(7.0), DataType::Double),
            Operator::Divide,
            lit(Value::Double(0.0), DataType::Double),
        )
        .unwrap();
        match PhysicalExpr::eval(&expr, empty()).unwrap() {
            Value::Double(d) => assert!(d.is_infinite()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_null_equality_is_null() {
        let expr = BinaryComparison::new(
            lit(Value::Null, DataType::Int),
            Operator::Eq,
            lit(Value::Null, DataType::Int),
        )
        .unwrap();
        assert_eq!(PhysicalExpr::eval(&expr, empty()).unwrap(), Value::Null);
    }

    #[test]
    fn test_three_valued_and_or() {
        let null = || lit(Value::Null, DataType::Boolean);
        let t = || lit(Value::Boolean(true), DataType::Boolean);
        let f = || lit(Value::Boolean(false), DataType::Boolean);
        assert_eq!(And::new(null(), t()).eval(empty()).unwrap(), Value::Null);
        assert_eq!(And::new(null(), f()).eval(empty()).unwrap(), Value::Boolean(false));
        assert_eq!(And::new(f(), null()).eval(empty()).unwrap(), Value::Boolean(false));
        assert_eq!(Or::new(null(), t()).eval(empty()).unwrap(), Value::Boolean(true));
        assert_eq!(Or::new(null(), f()).eval(empty()).unwrap(), Value::Null);
        assert_eq!(Or::new(t(), null()).eval(empty()).unwrap(), Value::Boolean(true));
    }

    fn empty() -> &'static dyn Row {
        crate::data::empty_row()
    }
}
