use std::fmt::{Display, Formatter};
use std::sync::Arc;

use bigdecimal::BigDecimal;

use crate::data::Value;
use crate::error::QueryError;
use crate::expr::AttributeReference;
use crate::Result;

/// Closed lattice of column types. Composite types carry the
/// nullability of their elements/values/fields.
#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub enum DataType {
    Null,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    String,
    Binary,
    Array(Box<DataType>, bool),
    Map(Box<DataType>, Box<DataType>, bool),
    Struct(Fields),
}

/// Numeric promotion order, least to greatest.
static NUMERIC_PRECEDENCE: [DataType; 7] = [
    DataType::Byte,
    DataType::Short,
    DataType::Int,
    DataType::Long,
    DataType::Float,
    DataType::Double,
    DataType::Decimal,
];

impl DataType {
    pub fn is_numeric_type(&self) -> bool {
        matches!(
            self,
            DataType::Byte
                | DataType::Short
                | DataType::Int
                | DataType::Long
                | DataType::Float
                | DataType::Double
                | DataType::Decimal
        )
    }

    pub fn is_integral_type(&self) -> bool {
        matches!(self, DataType::Byte | DataType::Short | DataType::Int | DataType::Long)
    }

    pub fn is_fractional_type(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    pub fn is_atomic_type(&self) -> bool {
        !matches!(self, DataType::Array(..) | DataType::Map(..) | DataType::Struct(_) | DataType::Null)
    }

    /// Types with a total order usable in comparisons and sorts.
    pub fn is_comparable(&self) -> bool {
        self.is_numeric_type()
            || matches!(self, DataType::Boolean | DataType::String | DataType::Binary | DataType::Null)
    }

    /// Least upper bound of two types under the numeric promotion
    /// order. Null absorbs into anything; equal types are their own
    /// bound. No widening exists for anything else.
    pub fn widen(left: &DataType, right: &DataType) -> Result<DataType> {
        match (left, right) {
            (l, r) if l == r => Ok(l.clone()),
            (l, DataType::Null) => Ok(l.clone()),
            (DataType::Null, r) => Ok(r.clone()),
            (l, r) if l.is_numeric_type() && r.is_numeric_type() => Ok(NUMERIC_PRECEDENCE
                .iter()
                .rfind(|t| *t == l || *t == r)
                .cloned()
                .unwrap()),
            (l, r) => Err(QueryError::IncompatibleTypes(l.clone(), r.clone())),
        }
    }

    /// The zero-ish value used to seed mutable aggregation buffers.
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Boolean => Value::Boolean(false),
            DataType::Byte => Value::Byte(0),
            DataType::Short => Value::Short(0),
            DataType::Int => Value::Int(0),
            DataType::Long => Value::Long(0),
            DataType::Float => Value::Float(0.0),
            DataType::Double => Value::Double(0.0),
            DataType::Decimal => Value::Decimal(Arc::new(BigDecimal::from(0))),
            DataType::String => Value::empty_string(),
            _ => Value::Null,
        }
    }

    pub fn boolean_type() -> &'static DataType {
        &DataType::Boolean
    }

    pub fn int_type() -> &'static DataType {
        &DataType::Int
    }

    pub fn long_type() -> &'static DataType {
        &DataType::Long
    }

    pub fn double_type() -> &'static DataType {
        &DataType::Double
    }

    pub fn string_type() -> &'static DataType {
        &DataType::String
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Byte => write!(f, "byte"),
            DataType::Short => write!(f, "short"),
            DataType::Int => write!(f, "int"),
            DataType::Long => write!(f, "long"),
            DataType::Float => write!(f, "float"),
            DataType::Double => write!(f, "double"),
            DataType::Decimal => write!(f, "decimal"),
            DataType::String => write!(f, "string"),
            DataType::Binary => write!(f, "binary"),
            DataType::Array(elem, _) => write!(f, "array<{elem}>"),
            DataType::Map(k, v, _) => write!(f, "map<{k},{v}>"),
            DataType::Struct(fields) => {
                write!(f, "struct<")?;
                for (i, field) in fields.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", field.name, field.data_type)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// Abstract argument types a function can declare it expects; used by
/// implicit-cast insertion during type coercion.
#[derive(Clone, PartialEq, Debug)]
pub enum AbstractDataType {
    Numeric,
    Any,
    Type(DataType),
    Collection(Vec<AbstractDataType>),
}

impl AbstractDataType {
    pub fn accepts_type(&self, tp: &DataType) -> bool {
        match self {
            AbstractDataType::Numeric => tp.is_numeric_type(),
            AbstractDataType::Any => true,
            AbstractDataType::Type(t) => t == tp,
            AbstractDataType::Collection(ts) => ts.iter().any(|t| t.accepts_type(tp)),
        }
    }

    pub fn default_concrete_type(&self) -> DataType {
        match self {
            AbstractDataType::Numeric => DataType::Double,
            AbstractDataType::Any => DataType::String,
            AbstractDataType::Type(t) => t.clone(),
            AbstractDataType::Collection(ts) => ts[0].default_concrete_type(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Field {
        Field { name: name.into(), data_type, nullable: true }
    }

    pub fn new_not_null(name: impl Into<String>, data_type: DataType) -> Field {
        Field { name: name.into(), data_type, nullable: false }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct Fields(pub Vec<Field>);

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Schema {
        Schema { fields }
    }

    pub fn to_struct_type(&self) -> DataType {
        DataType::Struct(Fields(self.fields.clone()))
    }

    /// Mint fresh attributes for the schema, one id per field.
    pub fn to_attributes(&self) -> Vec<AttributeReference> {
        self.fields
            .iter()
            .map(|f| AttributeReference::new(f.name.clone(), f.data_type.clone(), f.nullable))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_numeric_promotion() {
        assert_eq!(DataType::widen(&DataType::Byte, &DataType::Short).unwrap(), DataType::Short);
        assert_eq!(DataType::widen(&DataType::Int, &DataType::Long).unwrap(), DataType::Long);
        assert_eq!(DataType::widen(&DataType::Long, &DataType::Float).unwrap(), DataType::Float);
        assert_eq!(DataType::widen(&DataType::Double, &DataType::Int).unwrap(), DataType::Double);
        assert_eq!(DataType::widen(&DataType::Double, &DataType::Decimal).unwrap(), DataType::Decimal);
        assert_eq!(DataType::widen(&DataType::Int, &DataType::Int).unwrap(), DataType::Int);
    }

    #[test]
    fn test_widen_null_absorbs() {
        assert_eq!(DataType::widen(&DataType::Null, &DataType::String).unwrap(), DataType::String);
        assert_eq!(DataType::widen(&DataType::Long, &DataType::Null).unwrap(), DataType::Long);
    }

    #[test]
    fn test_widen_incompatible() {
        let err = DataType::widen(&DataType::String, &DataType::Boolean).unwrap_err();
        assert!(matches!(err, QueryError::IncompatibleTypes(_, _)));
    }

    #[test]
    fn test_schema_attributes_have_distinct_ids() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int),
            Field::new("name", DataType::String),
        ]);
        let attrs = schema.to_attributes();
        assert_eq!(attrs.len(), 2);
        assert_ne!(attrs[0].expr_id, attrs[1].expr_id);
    }
}
