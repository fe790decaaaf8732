use std::fmt::{Debug, Formatter};
use std::sync::Mutex;

use crate::data::Value;
use crate::expr::aggregate::{AggregateFunction, CreateAggregateFunction};
use crate::expr::conditional::If;
use crate::expr::{AttributeReference, Expr, Literal};
use crate::types::DataType;
use crate::{QueryError, Result};

/// `count(x)`: number of non-null inputs. Counts every row when the
/// argument is a non-null literal.
pub struct Count {
    child: Box<Expr>,
    count: Mutex<Option<AttributeReference>>,
    input_agg_attrs: Mutex<Vec<AttributeReference>>,
    result_attr: Mutex<Option<AttributeReference>>,
}

impl Count {
    pub fn new(child: Box<Expr>) -> Self {
        Self {
            child,
            count: Mutex::new(None),
            input_agg_attrs: Mutex::new(vec![]),
            result_attr: Mutex::new(None),
        }
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
            *guard = vec![self.count_attr().new_instance()];
        }
        guard.clone()
    }

    fn result_attr(&self) -> AttributeReference {
        let mut guard = self.result_attr.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("count", DataType::Long, false));
        }
        guard.as_ref().unwrap().clone()
    }

    fn count(&self) -> Expr {
        Expr::AttributeReference(self.count_attr())
    }

    fn count_right(&self) -> Expr {
        Expr::AttributeReference(self.input_agg_attrs()[0].clone())
    }
}

impl CreateAggregateFunction for Count {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn AggregateFunction>> {
        if args.len() != 1 {
            return Err(QueryError::analysis(
                format!("count requires 1 argument, found {}", args.len()),
                "",
            ));
        }
        let mut iter = args.into_iter();
        Ok(Box::new(Self::new(Box::new(iter.next().unwrap()))))
    }
}

impl Debug for Count {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Count")
            .field("child", &self.child)
            .field("count", &self.count.lock().unwrap())
            .finish()
    }
}

impl Clone for Count {
    fn clone(&self) -> Self {
        Self {
            child: self.child.clone(),
            count: Mutex::new(self.count.lock().unwrap().clone()),
            input_agg_attrs: Mutex::new(self.input_agg_attrs.lock().unwrap().clone()),
            result_attr: Mutex::new(self.result_attr.lock().unwrap().clone()),
        }
    }
}

impl AggregateFunction for Count {
    fn name(&self) -> &str {
        "count"
    }

    fn data_type(&self) -> &DataType {
        DataType::long_type()
    }

    fn nullable(&self) -> bool {
        false
    }

    fn agg_buffer_attributes(&self) -> Vec<AttributeReference> {
        vec![self.count_attr()]
    }

    fn input_agg_buffer_attributes(&self) -> Vec<AttributeReference> {
        self.input_agg_attrs()
    }

    fn result_attribute(&self) -> AttributeReference {
        self.result_attr()
    }

    fn initial_values(&self) -> Vec<Expr> {
        vec![Expr::long_lit(0)]
    }

    fn update_expressions(&self) -> Vec<Expr> {
        let expr = match self.child.as_ref() {
            Expr::Literal(Literal { value, .. }) if !value.is_null() => {
                self.count() + Expr::long_lit(1)
            }
            _ => Expr::ScalarFunction(Box::new(If::new(
                Box::new(self.child.clone().is_null()),
                Box::new(self.count()),
                Box::new(self.count() + Expr::long_lit(1)),
            ))),
        };
        vec![expr]
    }

    fn merge_expressions(&self) -> Vec<Expr> {
        vec![self.count() + self.count_right()]
    }

    fn evaluate_expression(&self) -> Expr {
        self.count()
    }

    fn empty_result(&self) -> Value {
        Value::Long(0)
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }
}
