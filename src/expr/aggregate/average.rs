use std::fmt::{Debug, Formatter};
use std::sync::Mutex;

use crate::data::Value;
use crate::expr::aggregate::{AggregateFunction, CreateAggregateFunction};
use crate::expr::conditional::{coalesce2, If};
use crate::expr::{AttributeReference, Expr};
use crate::types::{AbstractDataType, DataType};
use crate::{QueryError, Result};

/// `average(x)`: maintains `(sum: Double, count: Long)`; the result is
/// `sum / count` as Double, null when no non-null input was seen.
pub struct Average {
    child: Box<Expr>,
    sum: Mutex<Option<AttributeReference>>,
    count: Mutex<Option<AttributeReference>>,
    input_agg_attrs: Mutex<Vec<AttributeReference>>,
    result_attr: Mutex<Option<AttributeReference>>,
}

impl Average {
    pub fn new(child: Box<Expr>) -> Self {
        Self {
            child,
            sum: Mutex::new(None),
            count: Mutex::new(None),
            input_agg_attrs: Mutex::new(vec![]),
            result_attr: Mutex::new(None),
        }
    }

    fn sum_attr(&self) -> AttributeReference {
        let mut guard = self.sum.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("sum", DataType::Double, false));
        }
        guard.as_ref().unwrap().clone()
    }

    fn count_attr(&self) -> AttributeReference {
        let mut guard = self.count.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("count", DataType::Long, false));
        }
        guard.as_ref().unwrap().clone()
    }

    fn input_agg_attrs(&self) -> Vec<AttributeReference> {
        let mut guard = self.input_agg_attrs.lock().unwrap();
        if guard.is_empty() {
            *guard = vec![self.sum_attr().new_instance(), self.count_attr().new_instance()];
        }
        guard.clone()
    }

    fn result_attr(&self) -> AttributeReference {
        let mut guard = self.result_attr.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("average", DataType::Double, true));
        }
        guard.as_ref().unwrap().clone()
    }

    fn sum(&self) -> Expr {
        Expr::AttributeReference(self.sum_attr())
    }

    fn count(&self) -> Expr {
        Expr::AttributeReference(self.count_attr())
    }

    fn sum_right(&self) -> Expr {
        Expr::AttributeReference(self.input_agg_attrs()[0].clone())
    }

    fn count_right(&self) -> Expr {
        Expr::AttributeReference(self.input_agg_attrs()[1].clone())
    }

    fn child_cast(&self) -> Expr {
        self.child.as_ref().clone().cast(DataType::Double)
    }
}

impl CreateAggregateFunction for Average {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(QueryError::analysis(
                format!("average requires 1 argument, found {}", args.len()),
                "",
            ));
        }
        let mut iter = args.into_iter();
        Ok(Box::new(Self::new(Box::new(iter.next().unwrap()))))
    }
}

impl Debug for Average {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Average").field("child", &self.child).finish()
    }
}

impl Clone for Average {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            sum: Mutex::new(self.sum.lock().unwrap().clone()),
            count: Mutex::new(self.count.lock().unwrap().clone()),
            input_agg_attrs: Mutex::new(self.input_agg_attrs.lock().unwrap().clone()),
            result_attr: Mutex::new(self.result_attr.lock().unwrap().clone()),
        }
    }
}

impl AggregateFunction for Average {
    fn name(&self) -> &str {
        "average"
    }

    fn data_type(&self) -> &DataType {
        DataType::double_type()
    }

    fn agg_buffer_attributes(&self) -> Vec<AttributeReference> {
        vec![self.sum_attr(), self.count_attr()]
    }

    fn input_agg_buffer_attributes(&self) -> Vec<AttributeReference> {
        self.input_agg_attrs()
    }

    fn result_attribute(&self) -> AttributeReference {
        self.result_attr()
    }

    fn initial_values(&self) -> Vec<Expr> {
        vec![Expr::double_lit(0.0), Expr::long_lit(0)]
    }

    fn update_expressions(&self) -> Vec<Expr> {
        let sum = self.sum() + coalesce2(self.child_cast(), Expr::double_lit(0.0));
        let count = Expr::ScalarFunction(Box::new(If::new(
            Box::new(self.child.as_ref().clone().is_null()),
            Box::new(self.count()),
            Box::new(self.count() + Expr::long_lit(1)),
        )));
        vec![sum, count]
    }

    fn merge_expressions(&self) -> Vec<Expr> {
        vec![self.sum() + self.sum_right(), self.count() + self.count_right()]
    }

    fn evaluate_expression(&self) -> Expr {
        // guard the zero-count group so empty input reports null rather
        // than an IEEE NaN
        Expr::ScalarFunction(Box::new(If::new(
            Box::new(self.count().eq_expr(Expr::long_lit(0))),
            Box::new(Expr::null_lit(DataType::Double)),
            Box::new(self.sum() / self.count().cast(DataType::Double)),
        )))
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
