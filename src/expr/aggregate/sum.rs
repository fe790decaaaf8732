use std::fmt::{Debug, Formatter};
use std::sync::Mutex;

use crate::data::Value;
use crate::expr::aggregate::{AggregateFunction, CreateAggregateFunction};
use crate::expr::conditional::coalesce2;
use crate::expr::{AttributeReference, Expr};
use crate::types::{AbstractDataType, DataType};
use crate::{QueryError, Result};

/// `sum(x)`: null over empty (or all-null) input, otherwise the sum in
/// the widened accumulator type.
pub struct Sum {
    child: Box<Expr>,
    data_type: DataType,
    sum: Mutex<Option<AttributeReference>>,
    input_agg_attrs: Mutex<Vec<AttributeReference>>,
    result_attr: Mutex<Option<AttributeReference>>,
}

impl Sum {
    pub fn new(child: Box<Expr>) -> Self {
        let data_type = if child.resolved() {
            match child.data_type() {
                DataType::Byte | DataType::Short | DataType::Int | DataType::Long => DataType::Long,
                DataType::Decimal => DataType::Decimal,
                _ => DataType::Double,
            }
        } else {
            DataType::Long
        };
        Self {
            child,
            data_type,
            sum: Mutex::new(None),
            input_agg_attrs: Mutex::new(vec![]),
            result_attr: Mutex::new(None),
        }
    }

    fn sum_attr(&self) -> AttributeReference {
        let mut guard = self.sum.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("sum", self.data_type.clone(), true));
        }
        guard.as_ref().unwrap().clone()
    }

    fn input_agg_attrs(&self) -> Vec<AttributeReference> {
        let mut guard = self.input_agg_attrs.lock().unwrap();
        if guard.is_empty() {
            *guard = vec![self.sum_attr().new_instance()];
        }
        guard.clone()
    }

    fn result_attr(&self) -> AttributeReference {
        let mut guard = self.result_attr.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("sum", self.data_type.clone(), true));
        }
        guard.as_ref().unwrap().clone()
    }

    fn sum(&self) -> Expr {
        Expr::AttributeReference(self.sum_attr())
    }

    fn sum_right(&self) -> Expr {
        Expr::AttributeReference(self.input_agg_attrs()[0].clone())
    }

    fn zero(&self) -> Expr {
        Expr::lit(self.data_type.default_value(), self.data_type.clone())
    }

    fn child_cast(&self) -> Expr {
        if self.child.data_type() == &self.data_type {
            self.child.as_ref().clone()
        } else {
            self.child.as_ref().clone().cast(self.data_type.clone())
        }
    }
}

impl CreateAggregateFunction for Sum {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(QueryError::analysis(
                format!("sum requires 1 argument, found {}", args.len()),
                "",
            ));
        }
        let mut iter = args.into_iter();
        Ok(Box::new(Self::new(Box::new(iter.next().unwrap()))))
    }
}

impl Debug for Sum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sum")
            .field("child", &self.child)
            .field("data_type", &self.data_type)
            .finish()
    }
}

impl Clone for Sum {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            data_type: self.data_type.clone(),
            sum: Mutex::new(self.sum.lock().unwrap().clone()),
            input_agg_attrs: Mutex::new(self.input_agg_attrs.lock().unwrap().clone()),
            result_attr: Mutex::new(self.result_attr.lock().unwrap().clone()),
        }
    }
}

impl AggregateFunction for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn agg_buffer_attributes(&self) -> Vec<AttributeReference> {
        vec![self.sum_attr()]
    }

    fn input_agg_buffer_attributes(&self) -> Vec<AttributeReference> {
        self.input_agg_attrs()
    }

    fn result_attribute(&self) -> AttributeReference {
        self.result_attr()
    }

    fn initial_values(&self) -> Vec<Expr> {
        vec![Expr::null_lit(self.data_type.clone())]
    }

    fn update_expressions(&self) -> Vec<Expr> {
        // null child leaves the buffer untouched, so an all-null group
        // evaluates to null
        vec![coalesce2(coalesce2(self.sum(), self.zero()) + self.child_cast(), self.sum())]
    }

    fn merge_expressions(&self) -> Vec<Expr> {
        vec![coalesce2(coalesce2(self.sum(), self.zero()) + self.sum_right(), self.sum())]
    }

    fn evaluate_expression(&self) -> Expr {
        self.sum()
    }

    fn empty_result(&self) -> Value {
        Value::Null
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        Some(vec![AbstractDataType::Numeric])
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }
}
