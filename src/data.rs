use std::any::Any;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use bigdecimal::BigDecimal;

static EMPTY_STRING_VALUE: LazyLock<Value> = LazyLock::new(|| Value::String(Arc::new("".to_string())));
static EMPTY_ROW: LazyLock<Arc<GenericRow>> = LazyLock::new(|| Arc::new(GenericRow::new(Vec::new())));
static EMPTY_VALUES: LazyLock<Arc<Vec<Value>>> = LazyLock::new(|| Arc::new(Vec::new()));

// Float wrapper over f32/f64. Just because we cannot build
// std::hash::Hash for floats directly we have to do it through a type
// wrapper.
struct Fl<T>(T);

macro_rules! hash_float_value {
    ($(($t:ty, $i:ty)),+) => {
        $(impl std::hash::Hash for Fl<$t> {
            #[inline]
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                state.write(&<$i>::from_ne_bytes(self.0.to_ne_bytes()).to_ne_bytes())
            }
        })+
    };
}

hash_float_value!((f64, u64), (f32, u32));

/// Opaque boxed state stored in a row cell, used by imperative
/// aggregate buffers (a distinct-set, for example).
pub trait Object: Send + Sync + Debug + ExtendObject {}

pub trait ExtendObject {
    fn clone_box(&self) -> Box<dyn Object>;
    fn as_any(&self) -> &dyn Any;
    fn as_mut_any(&mut self) -> &mut dyn Any;
}

impl<T: Object + Clone + Debug + Send + Sync + 'static> ExtendObject for T {
    fn clone_box(&self) -> Box<dyn Object> {
        Box::new(self.clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_mut_any(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn Object> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A single cell. Strings, binaries and composites are behind `Arc` so
/// row copies stay cheap.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Arc<BigDecimal>),
    String(Arc<String>),
    Binary(Arc<Vec<u8>>),
    Array(Arc<Vec<Value>>),
    Map(Arc<Vec<(Value, Value)>>),
    Struct(Arc<dyn BaseRow>),
    Object(Box<dyn Object>),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{}", v.normalized()),
            Value::String(v) => write!(f, "'{v}'"),
            Value::Binary(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
            Value::Array(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
            Value::Map(v) => {
                write!(f, "{{")?;
                for (i, (k, x)) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {x}")?;
                }
                write!(f, "}}")
            }
            Value::Struct(v) => write!(f, "{v}"),
            Value::Object(v) => write!(f, "{v:?}"),
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Arc::new(s.into()))
    }

    pub fn decimal(d: BigDecimal) -> Self {
        Value::Decimal(Arc::new(d))
    }

    pub fn empty_string() -> Self {
        EMPTY_STRING_VALUE.clone()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Boolean(false))
    }

    pub fn get_boolean(&self) -> bool {
        if let Value::Boolean(v) = self {
            *v
        } else {
            panic!("{:?} is not a boolean", self)
        }
    }

    pub fn get_int(&self) -> i32 {
        if let Value::Int(v) = self {
            *v
        } else {
            panic!("{:?} is not an int", self)
        }
    }

    pub fn get_long(&self) -> i64 {
        if let Value::Long(v) = self {
            *v
        } else {
            panic!("{:?} is not a long", self)
        }
    }

    pub fn get_double(&self) -> f64 {
        if let Value::Double(v) = self {
            *v
        } else {
            panic!("{:?} is not a double", self)
        }
    }

    pub fn get_string(&self) -> &str {
        if let Value::String(v) = self {
            v.as_str()
        } else {
            panic!("{:?} is not a string", self)
        }
    }

    pub fn get_array(&self) -> Arc<Vec<Value>> {
        if let Value::Array(v) = self {
            v.clone()
        } else {
            panic!("{:?} is not an array", self)
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        match self {
            Null => 0.hash(state),
            Boolean(v) => v.hash(state),
            Byte(v) => v.hash(state),
            Short(v) => v.hash(state),
            Int(v) => v.hash(state),
            Long(v) => v.hash(state),
            Float(v) => Fl(*v).hash(state),
            Double(v) => Fl(*v).hash(state),
            Decimal(v) => v.hash(state),
            String(v) => v.hash(state),
            Binary(v) => v.hash(state),
            Array(v) => v.hash(state),
            Map(v) => v.hash(state),
            Struct(v) => v.hash(state),
            Object(_) => 1.hash(state),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(v1), Boolean(v2)) => v1 == v2,
            (Byte(v1), Byte(v2)) => v1 == v2,
            (Short(v1), Short(v2)) => v1 == v2,
            (Int(v1), Int(v2)) => v1 == v2,
            (Long(v1), Long(v2)) => v1 == v2,
            (Float(v1), Float(v2)) => v1 == v2,
            (Double(v1), Double(v2)) => v1 == v2,
            (Decimal(v1), Decimal(v2)) => v1 == v2,
            (String(v1), String(v2)) => v1 == v2,
            (Binary(v1), Binary(v2)) => v1 == v2,
            (Array(v1), Array(v2)) => v1 == v2,
            (Map(v1), Map(v2)) => v1 == v2,
            (Struct(v1), Struct(v2)) => v1 == v2,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Boolean(v1), Boolean(v2)) => v1.partial_cmp(v2),
            (Byte(v1), Byte(v2)) => v1.partial_cmp(v2),
            (Short(v1), Short(v2)) => v1.partial_cmp(v2),
            (Int(v1), Int(v2)) => v1.partial_cmp(v2),
            (Long(v1), Long(v2)) => v1.partial_cmp(v2),
            (Float(v1), Float(v2)) => Some(v1.total_cmp(v2)),
            (Double(v1), Double(v2)) => Some(v1.total_cmp(v2)),
            (Decimal(v1), Decimal(v2)) => v1.partial_cmp(v2),
            (String(v1), String(v2)) => v1.partial_cmp(v2),
            (Binary(v1), Binary(v2)) => v1.partial_cmp(v2),
            (Array(v1), Array(v2)) => v1.partial_cmp(v2),
            (Struct(v1), Struct(v2)) => v1.as_row().partial_cmp(v2.as_row()),
            _ => None,
        }
    }
}

/// An ordered sequence of typed cells. `GenericRow` is the mutable
/// variant used for aggregation buffers; `JoinedRow` concatenates two
/// rows without copying either.
pub trait Row: Debug + Display {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn is_null(&self, i: usize) -> bool;
    fn get(&self, i: usize) -> &Value;
    fn set_null_at(&mut self, i: usize);
    fn update(&mut self, i: usize, value: Value);

    fn get_boolean(&self, i: usize) -> bool {
        if let Value::Boolean(v) = self.get(i) { *v } else { false }
    }

    fn get_int(&self, i: usize) -> i32 {
        if let Value::Int(v) = self.get(i) { *v } else { 0 }
    }

    fn get_long(&self, i: usize) -> i64 {
        if let Value::Long(v) = self.get(i) { *v } else { 0 }
    }

    fn get_double(&self, i: usize) -> f64 {
        if let Value::Double(v) = self.get(i) { *v } else { 0f64 }
    }

    fn get_string(&self, i: usize) -> &str {
        if let Value::String(v) = self.get(i) { v } else { "" }
    }

    fn get_array(&self, i: usize) -> Arc<Vec<Value>> {
        if let Value::Array(v) = self.get(i) { v.clone() } else { EMPTY_VALUES.clone() }
    }

    fn to_generic_row(&self) -> GenericRow {
        let mut row = GenericRow::new_with_size(self.len());
        for i in 0..self.len() {
            row.update(i, self.get(i).clone());
        }
        row
    }
}

/// Object-safe row handle storable inside a [`Value::Struct`].
pub trait BaseRow: Row + Send + Sync {
    fn as_row(&self) -> &dyn Row;
}

impl<T: Row + Send + Sync + 'static> BaseRow for T {
    fn as_row(&self) -> &dyn Row {
        self
    }
}

pub fn empty_row() -> &'static dyn Row {
    EMPTY_ROW.as_ref()
}

impl<'a> PartialEq for dyn Row + 'a {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        (0..self.len()).all(|i| self.get(i) == other.get(i))
    }
}

impl<'a> PartialEq for dyn BaseRow + 'a {
    fn eq(&self, other: &Self) -> bool {
        self.as_row() == other.as_row()
    }
}

impl<'a> PartialOrd for dyn Row + 'a {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.len() != other.len() {
            return None;
        }
        for i in 0..self.len() {
            match self.get(i).partial_cmp(other.get(i)) {
                None => return None,
                Some(Ordering::Equal) => continue,
                Some(ord) => return Some(ord),
            }
        }
        Some(Ordering::Equal)
    }
}

impl<'a> Hash for dyn BaseRow + 'a {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for i in 0..self.len() {
            self.get(i).hash(state);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GenericRow {
    values: Vec<Value>,
}

impl GenericRow {
    pub fn new(values: Vec<Value>) -> GenericRow {
        GenericRow { values }
    }

    pub fn new_with_size(size: usize) -> GenericRow {
        let mut values = Vec::with_capacity(size);
        values.resize(size, Value::Null);
        GenericRow { values }
    }

    pub fn fill_null(&mut self) {
        self.values.fill(Value::Null);
    }

    pub fn get_mut(&mut self, i: usize) -> &mut Value {
        &mut self.values[i]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Display for GenericRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

impl Row for GenericRow {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn is_null(&self, i: usize) -> bool {
        matches!(&self.values[i], Value::Null)
    }

    fn get(&self, i: usize) -> &Value {
        &self.values[i]
    }

    fn set_null_at(&mut self, i: usize) {
        self.values[i] = Value::Null;
    }

    fn update(&mut self, i: usize, value: Value) {
        self.values[i] = value;
    }
}

impl Hash for GenericRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for v in &self.values {
            v.hash(state);
        }
    }
}

impl PartialEq for GenericRow {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for GenericRow {}

/// Two rows viewed as one, the second starting where the first ends.
/// This is how multi-tuple inputs (join sides, aggregation buffer plus
/// input) reach the evaluator without copying.
#[derive(Debug)]
pub struct JoinedRow<'a> {
    row1: &'a dyn Row,
    row2: &'a dyn Row,
}

impl<'a> JoinedRow<'a> {
    pub fn new(row1: &'a dyn Row, row2: &'a dyn Row) -> JoinedRow<'a> {
        JoinedRow { row1, row2 }
    }
}

impl<'a> Display for JoinedRow<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.row1, self.row2)
    }
}

impl<'a> Row for JoinedRow<'a> {
    fn len(&self) -> usize {
        self.row1.len() + self.row2.len()
    }

    fn is_null(&self, i: usize) -> bool {
        if i < self.row1.len() {
            self.row1.is_null(i)
        } else {
            self.row2.is_null(i - self.row1.len())
        }
    }

    fn get(&self, i: usize) -> &Value {
        if i < self.row1.len() {
            self.row1.get(i)
        } else {
            self.row2.get(i - self.row1.len())
        }
    }

    fn set_null_at(&mut self, _i: usize) {
        unreachable!("JoinedRow::set_null_at is not implemented")
    }

    fn update(&mut self, _i: usize, _value: Value) {
        unreachable!("JoinedRow::update is not implemented")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let row = GenericRow::new(vec![
            Value::Int(42),
            Value::string("alice"),
            Value::Boolean(false),
            Value::Null,
        ]);
        assert_eq!(row.get_int(0), 42);
        assert_eq!(row.get_string(1), "alice");
        assert!(!row.get_boolean(2));
        assert!(row.is_null(3));
        assert!(!row.is_null(0));
    }

    #[test]
    fn test_joined_row_spans_both_sides() {
        let left = GenericRow::new(vec![Value::Int(1), Value::Int(2)]);
        let right = GenericRow::new(vec![Value::string("x")]);
        let joined = JoinedRow::new(&left, &right);
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.get_int(1), 2);
        assert_eq!(joined.get_string(2), "x");
    }

    #[test]
    fn test_value_equality_and_hash_for_keys() {
        use std::collections::HashMap;
        let mut map: HashMap<GenericRow, i32> = HashMap::new();
        map.insert(GenericRow::new(vec![Value::Int(1), Value::string("a")]), 10);
        let key = GenericRow::new(vec![Value::Int(1), Value::string("a")]);
        assert_eq!(map.get(&key), Some(&10));
        // null != null under SQL semantics lives in the evaluator; row
        // keys use plain structural equality
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Int(1), Value::Long(1));
    }

    #[test]
    fn test_decimal_display_drops_trailing_zeros() {
        use std::str::FromStr;
        let d = Value::decimal(BigDecimal::from_str("1.2300").unwrap());
        assert_eq!(format!("{d}"), "1.23");
    }
}
