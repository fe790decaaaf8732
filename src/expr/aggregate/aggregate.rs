use std::any::Any;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;

use crate::data::{GenericRow, Row, Value};
use crate::expr::expr::{check_expected_input_types, compare_args};
use crate::expr::{AttributeReference, Expr};
use crate::types::{AbstractDataType, DataType};
use crate::Result;

/// An aggregate described entirely by expressions: a buffer schema,
/// initial values, an update expression per buffer slot evaluated over
/// `(buffer ++ input)`, merge expressions over `(buffer ++ partial
/// buffer)`, and a final evaluate expression. The decomposition is what
/// makes two-level (partial then final) execution possible.
pub trait AggregateFunction: Debug + Send + Sync + ExtendAggregateFunction {
    fn name(&self) -> &str;
    fn data_type(&self) -> &DataType;

    fn nullable(&self) -> bool {
        true
    }

    /// Mutable per-group state, one attribute per buffer cell.
    fn agg_buffer_attributes(&self) -> Vec<AttributeReference>;

    /// The same cells as seen from an upstream partial aggregate, under
    /// fresh ids.
    fn input_agg_buffer_attributes(&self) -> Vec<AttributeReference>;

    /// Attribute the final value is published under.
    fn result_attribute(&self) -> AttributeReference;

    fn initial_values(&self) -> Vec<Expr>;
    fn update_expressions(&self) -> Vec<Expr>;
    fn merge_expressions(&self) -> Vec<Expr>;
    fn evaluate_expression(&self) -> Expr;

    /// The value the aggregate reports over zero input rows.
    fn empty_result(&self) -> Value;

    fn args(&self) -> Vec<&Expr>;

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        None
    }

    fn check_input_data_types(&self) -> Result<()> {
        check_expected_input_types(self.name(), &self.args(), self.expects_input_types())
    }
}

pub trait CreateAggregateFunction {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>>
    where
        Self: Sized;

    fn create_function_expr(args: Vec<Expr>) -> Result<Expr>
    where
        Self: Sized,
    {
        Ok(Expr::AggregateFunction(Self::from_args(args)?))
    }
}

pub trait ExtendAggregateFunction {
    fn clone_box(&self) -> Box<dyn AggregateFunction>;
    fn as_any(&self) -> &dyn Any;
    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn AggregateFunction>;
}

impl<T: AggregateFunction + CreateAggregateFunction + Clone + 'static> ExtendAggregateFunction for T {
    fn clone_box(&self) -> Box<dyn AggregateFunction> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn AggregateFunction> {
        Self::from_args(args).unwrap()
    }
}

impl Clone for Box<dyn AggregateFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn AggregateFunction> {
    fn eq(&self, other: &Self) -> bool {
        if self.as_any().type_id() != other.as_any().type_id() || self.name() != other.name() {
            return false;
        }
        let args1 = self.args();
        let args2 = other.args();
        args1.len() == args2.len() && args1.iter().zip(args2.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for Box<dyn AggregateFunction> {}

impl PartialOrd for Box<dyn AggregateFunction> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        compare_args(&self.args(), &other.args())
    }
}

impl Hash for Box<dyn AggregateFunction> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for x in self.args() {
            x.hash(state);
        }
    }
}

/// An aggregate whose state cannot be expressed as update expressions
/// (a distinct-set, say). It owns one buffer slot holding opaque state
/// and is updated imperatively. Typed aggregates do not decompose, so
/// their presence forces single-level execution.
pub trait TypedAggregateFunction: Debug + Send + Sync + ExtendTypedAggregateFunction {
    fn name(&self) -> &str;
    fn data_type(&self) -> &DataType;
    fn args(&self) -> Vec<&Expr>;

    /// Attribute of the single opaque buffer slot.
    fn buffer_attribute(&self) -> AttributeReference;

    fn result_attribute(&self) -> AttributeReference;

    /// The value the aggregate reports over zero input rows.
    fn empty_result(&self) -> Value;

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        None
    }

    fn check_input_data_types(&self) -> Result<()> {
        check_expected_input_types(self.name(), &self.args(), self.expects_input_types())
    }

    /// Fix the buffer slot this instance writes to.
    fn with_buffer_offset(&self, offset: usize) -> Box<dyn TypedAggregateFunction>;

    /// Evaluable counterpart; arguments must be bound first.
    fn physical_function(&self) -> Result<Box<dyn PhysicalTypedAggregate>>;
}

pub trait ExtendTypedAggregateFunction {
    fn clone_box(&self) -> Box<dyn TypedAggregateFunction>;
    fn as_any(&self) -> &dyn Any;
    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn TypedAggregateFunction>;
}

impl Clone for Box<dyn TypedAggregateFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn TypedAggregateFunction> {
    fn eq(&self, other: &Self) -> bool {
        if self.as_any().type_id() != other.as_any().type_id() || self.name() != other.name() {
            return false;
        }
        let args1 = self.args();
        let args2 = other.args();
        args1.len() == args2.len() && args1.iter().zip(args2.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for Box<dyn TypedAggregateFunction> {}

impl PartialOrd for Box<dyn TypedAggregateFunction> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        compare_args(&self.args(), &other.args())
    }
}

impl Hash for Box<dyn TypedAggregateFunction> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for x in self.args() {
            x.hash(state);
        }
    }
}

/// Imperative driver for a [`TypedAggregateFunction`], owning a fixed
/// buffer slot in the aggregation row.
pub trait PhysicalTypedAggregate: Debug + Send + Sync {
    fn initialize(&self, buffer: &mut GenericRow);
    fn update(&self, buffer: &mut GenericRow, input: &dyn Row) -> Result<()>;
    fn eval(&self, buffer: &GenericRow) -> Result<Value>;
}
