use std::any::Any;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};

use crate::data::{Row, Value};
use crate::physical_expr::PhysicalExpr;
use crate::types::DataType;
use crate::{QueryError, Result};

pub type CastFunc = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// Pure conversion to a target type. Null casts to null; string
/// parsing failures abort with `CastFailed`; narrowing numeric casts
/// truncate toward zero.
pub struct Cast {
    pub child: Arc<dyn PhysicalExpr>,
    pub data_type: DataType,
    cast: Box<CastFunc>,
}

impl Cast {
    pub fn new(child: Arc<dyn PhysicalExpr>, data_type: DataType) -> Result<Self> {
        let cast = get_cast_func(&child.data_type(), &data_type)?;
        Ok(Cast { child, data_type, cast })
    }
}

impl Debug for Cast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cast")
            .field("child", &self.child)
            .field("data_type", &self.data_type)
            .finish()
    }
}

impl PhysicalExpr for Cast {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn eval(&self, input: &dyn Row) -> Result<Value> {
        let value = self.child.eval(input)?;
        if value.is_null() {
            return Ok(Value::Null);
        }
        (self.cast)(value)
    }
}

fn identity(v: Value) -> Result<Value> {
    Ok(v)
}

fn cast_failed(value: &Value, target: &DataType) -> QueryError {
    QueryError::CastFailed { value: value.to_string(), target: target.clone() }
}

/// Non-null numeric value as f64, the pivot for narrowing casts.
fn numeric_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Byte(x) => Some(*x as f64),
        Value::Short(x) => Some(*x as f64),
        Value::Int(x) => Some(*x as f64),
        Value::Long(x) => Some(*x as f64),
        Value::Float(x) => Some(*x as f64),
        Value::Double(x) => Some(*x),
        Value::Decimal(d) => d.to_f64(),
        _ => None,
    }
}

fn to_string_value(v: Value) -> Result<Value> {
    let s = match &v {
        Value::Boolean(x) => x.to_string(),
        Value::Byte(x) => x.to_string(),
        Value::Short(x) => x.to_string(),
        Value::Int(x) => x.to_string(),
        Value::Long(x) => x.to_string(),
        // shortest decimal form, no trailing zeros
        Value::Float(x) => x.to_string(),
        Value::Double(x) => x.to_string(),
        Value::Decimal(x) => x.normalized().to_string(),
        Value::String(x) => x.as_ref().clone(),
        Value::Binary(b) => String::from_utf8_lossy(b).into_owned(),
        v => v.to_string(),
    };
    Ok(Value::string(s))
}

macro_rules! to_integral {
    ($name:ident, $variant:ident, $prim:ty, $target:expr) => {
        fn $name(v: Value) -> Result<Value> {
            match &v {
                // integral strings parse directly, fractional ones
                // truncate toward zero
                Value::String(s) => match s.trim().parse::<$prim>() {
                    Ok(x) => Ok(Value::$variant(x)),
                    Err(_) => match s.trim().parse::<f64>() {
                        Ok(x) => Ok(Value::$variant(x.trunc() as $prim)),
                        Err(_) => Err(cast_failed(&v, &$target)),
                    },
                },
                Value::Boolean(b) => Ok(Value::$variant(if *b { 1 } else { 0 })),
                Value::Byte(x) => Ok(Value::$variant(*x as $prim)),
                Value::Short(x) => Ok(Value::$variant(*x as $prim)),
                Value::Int(x) => Ok(Value::$variant(*x as $prim)),
                Value::Long(x) => Ok(Value::$variant(*x as $prim)),
                Value::Float(x) => Ok(Value::$variant(x.trunc() as $prim)),
                Value::Double(x) => Ok(Value::$variant(x.trunc() as $prim)),
                Value::Decimal(d) => match d.to_i64() {
                    Some(x) => Ok(Value::$variant(x as $prim)),
                    None => Err(cast_failed(&v, &$target)),
                },
                _ => Err(cast_failed(&v, &$target)),
            }
        }
    };
}

to_integral!(to_byte, Byte, i8, DataType::Byte);
to_integral!(to_short, Short, i16, DataType::Short);
to_integral!(to_int, Int, i32, DataType::Int);
to_integral!(to_long, Long, i64, DataType::Long);

macro_rules! to_fractional {
    ($name:ident, $variant:ident, $prim:ty, $target:expr) => {
        fn $name(v: Value) -> Result<Value> {
            if let Value::String(s) = &v {
                return match s.trim().parse::<$prim>() {
                    Ok(x) => Ok(Value::$variant(x)),
                    Err(_) => Err(cast_failed(&v, &$target)),
                };
            }
            if let Value::Boolean(b) = &v {
                return Ok(Value::$variant(if *b { 1.0 } else { 0.0 }));
            }
            match numeric_as_f64(&v) {
                Some(x) => Ok(Value::$variant(x as $prim)),
                None => Err(cast_failed(&v, &$target)),
            }
        }
    };
}

to_fractional!(to_float, Float, f32, DataType::Float);
to_fractional!(to_double, Double, f64, DataType::Double);

fn to_decimal(v: Value) -> Result<Value> {
    match &v {
        Value::String(s) => BigDecimal::from_str(s.trim())
            .map(Value::decimal)
            .map_err(|_| cast_failed(&v, &DataType::Decimal)),
        Value::Byte(x) => Ok(Value::decimal(BigDecimal::from(*x as i64))),
        Value::Short(x) => Ok(Value::decimal(BigDecimal::from(*x as i64))),
        Value::Int(x) => Ok(Value::decimal(BigDecimal::from(*x as i64))),
        Value::Long(x) => Ok(Value::decimal(BigDecimal::from(*x))),
        Value::Float(x) => BigDecimal::from_f32(*x)
            .map(Value::decimal)
            .ok_or_else(|| cast_failed(&v, &DataType::Decimal)),
        Value::Double(x) => BigDecimal::from_f64(*x)
            .map(Value::decimal)
            .ok_or_else(|| cast_failed(&v, &DataType::Decimal)),
        Value::Boolean(b) => Ok(Value::decimal(BigDecimal::from(if *b { 1 } else { 0 }))),
        _ => Err(cast_failed(&v, &DataType::Decimal)),
    }
}

fn to_boolean(v: Value) -> Result<Value> {
    match &v {
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(Value::Boolean(true)),
            "false" | "f" | "0" => Ok(Value::Boolean(false)),
            _ => Err(cast_failed(&v, &DataType::Boolean)),
        },
        _ => match numeric_as_f64(&v) {
            Some(x) => Ok(Value::Boolean(x != 0.0)),
            None => Err(cast_failed(&v, &DataType::Boolean)),
        },
    }
}

fn string_to_binary(v: Value) -> Result<Value> {
    if let Value::String(s) = &v {
        Ok(Value::Binary(Arc::new(s.as_bytes().to_vec())))
    } else {
        Err(cast_failed(&v, &DataType::Binary))
    }
}

pub fn get_cast_func(from: &DataType, to: &DataType) -> Result<Box<CastFunc>> {
    if !can_cast(from, to) {
        return Err(QueryError::IncompatibleTypes(from.clone(), to.clone()));
    }
    let f: Box<CastFunc> = match to {
        t if t == from => Box::new(identity),
        _ if *from == DataType::Null => Box::new(identity),
        DataType::String => Box::new(to_string_value),
        DataType::Boolean => Box::new(to_boolean),
        DataType::Byte => Box::new(to_byte),
        DataType::Short => Box::new(to_short),
        DataType::Int => Box::new(to_int),
        DataType::Long => Box::new(to_long),
        DataType::Float => Box::new(to_float),
        DataType::Double => Box::new(to_double),
        DataType::Decimal => Box::new(to_decimal),
        DataType::Binary => Box::new(string_to_binary),
        _ => return Err(QueryError::IncompatibleTypes(from.clone(), to.clone())),
    };
    Ok(f)
}

pub fn can_cast(from: &DataType, to: &DataType) -> bool {
    match (from, to) {
        (f, t) if f == t => true,
        (DataType::Null, _) => true,
        (_, DataType::String) => true,
        (DataType::String, DataType::Binary) => true,
        (DataType::String | DataType::Boolean, t) if t.is_numeric_type() => true,
        (DataType::String, DataType::Boolean) => true,
        (f, DataType::Boolean) if f.is_numeric_type() => true,
        (f, t) if f.is_numeric_type() && t.is_numeric_type() => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::empty_row;
    use crate::physical_expr::Literal;

    fn cast_value(v: Value, from: DataType, to: DataType) -> Result<Value> {
        Cast::new(Arc::new(Literal::new(v, from)), to)?.eval(empty_row())
    }

    #[test]
    fn test_double_to_string_no_trailing_zeros() {
        let v = cast_value(Value::Double(1.50), DataType::Double, DataType::String).unwrap();
        assert_eq!(v, Value::string("1.5"));
        let v = cast_value(Value::Double(2.0), DataType::Double, DataType::String).unwrap();
        assert_eq!(v, Value::string("2"));
    }

    #[test]
    fn test_string_to_int_parses_or_fails() {
        let v = cast_value(Value::string(" 42 "), DataType::String, DataType::Int).unwrap();
        assert_eq!(v, Value::Int(42));
        let err = cast_value(Value::string("4x2"), DataType::String, DataType::Int).unwrap_err();
        assert!(matches!(err, QueryError::CastFailed { .. }));
    }

    #[test]
    fn test_narrowing_truncates_toward_zero() {
        let v = cast_value(Value::Double(-3.9), DataType::Double, DataType::Int).unwrap();
        assert_eq!(v, Value::Int(-3));
        let v = cast_value(Value::Double(3.9), DataType::Double, DataType::Long).unwrap();
        assert_eq!(v, Value::Long(3));
    }

    #[test]
    fn test_null_casts_to_null() {
        let v = cast_value(Value::Null, DataType::Null, DataType::Int).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_int_widens_to_long_and_double() {
        assert_eq!(
            cast_value(Value::Int(7), DataType::Int, DataType::Long).unwrap(),
            Value::Long(7)
        );
        assert_eq!(
            cast_value(Value::Int(7), DataType::Int, DataType::Double).unwrap(),
            Value::Double(7.0)
        );
    }
}
