use std::fmt::{Debug, Formatter};
use std::sync::Mutex;

use ahash::AHashSet;

use crate::data::{GenericRow, Object, Row, Value};
use crate::expr::aggregate::{
    ExtendTypedAggregateFunction, PhysicalTypedAggregate, TypedAggregateFunction,
};
use crate::expr::{AttributeReference, Expr};
use crate::physical_expr::{create_physical_expr, PhysicalExpr};
use crate::types::DataType;
use crate::{QueryError, Result};

/// `count(distinct x, ...)`: number of distinct non-null argument
/// tuples. State is a set, so it does not decompose into partial
/// aggregates.
pub struct CountDistinct {
    children: Vec<Expr>,
    buffer_offset: usize,
    buffer_attr: Mutex<Option<AttributeReference>>,
    result_attr: Mutex<Option<AttributeReference>>,
}

impl CountDistinct {
    pub fn new(children: Vec<Expr>) -> Self {
        Self {
            children,
            buffer_offset: 0,
            buffer_attr: Mutex::new(None),
            result_attr: Mutex::new(None),
        }
    }

    pub fn from_args(args: Vec<Expr>) -> Result<Box<dyn TypedAggregateFunction>> {
        if args.is_empty() {
            return Err(QueryError::analysis("count distinct requires at least 1 argument", ""));
        }
        Ok(Box::new(Self::new(args)))
    }

    pub fn create_function_expr(args: Vec<Expr>) -> Result<Expr> {
        Ok(Expr::TypedAggregateFunction(Self::from_args(args)?))
    }
}

impl Debug for CountDistinct {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountDistinct")
            .field("children", &self.children)
            .field("buffer_offset", &self.buffer_offset)
            .finish()
    }
}

impl Clone for CountDistinct {
    fn clone(&self) -> Self {
        Self {
            children: self.children.clone(),
            buffer_offset: self.buffer_offset,
            buffer_attr: Mutex::new(self.buffer_attr.lock().unwrap().clone()),
            result_attr: Mutex::new(self.result_attr.lock().unwrap().clone()),
        }
    }
}

impl ExtendTypedAggregateFunction for CountDistinct {
    fn clone_box(&self) -> Box<dyn TypedAggregateFunction> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn TypedAggregateFunction> {
        let mut f = Self::new(args);
        f.buffer_offset = self.buffer_offset;
        Box::new(f)
    }
}

impl TypedAggregateFunction for CountDistinct {
    fn name(&self) -> &str {
        "count_distinct"
    }

    fn data_type(&self) -> &DataType {
        DataType::long_type()
    }

    fn args(&self) -> Vec<&Expr> {
        self.children.iter().collect()
    }

    fn buffer_attribute(&self) -> AttributeReference {
        let mut guard = self.buffer_attr.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("distinct_set", DataType::Long, true));
        }
        guard.as_ref().unwrap().clone()
    }

    fn result_attribute(&self) -> AttributeReference {
        let mut guard = self.result_attr.lock().unwrap();
        if guard.is_none() {
            *guard = Some(AttributeReference::new("count_distinct", DataType::Long, false));
        }
        guard.as_ref().unwrap().clone()
    }

    fn empty_result(&self) -> Value {
        Value::Long(0)
    }

    fn with_buffer_offset(&self, offset: usize) -> Box<dyn TypedAggregateFunction> {
        let mut f = self.clone();
        f.buffer_offset = offset;
        Box::new(f)
    }

    fn physical_function(&self) -> Result<Box<dyn PhysicalTypedAggregate>> {
        let children = self
            .children
            .iter()
            .map(create_physical_expr)
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(PhysicalCountDistinct { children, buffer_offset: self.buffer_offset }))
    }
}

#[derive(Clone, Debug)]
struct DistinctSet(AHashSet<GenericRow>);

impl Object for DistinctSet {}

#[derive(Debug)]
struct PhysicalCountDistinct {
    children: Vec<std::sync::Arc<dyn PhysicalExpr>>,
    buffer_offset: usize,
}

impl PhysicalTypedAggregate for PhysicalCountDistinct {
    fn initialize(&self, buffer: &mut GenericRow) {
        buffer.update(self.buffer_offset, Value::Object(Box::new(DistinctSet(AHashSet::new()))));
    }

    fn update(&self, buffer: &mut GenericRow, input: &dyn Row) -> Result<()> {
        let mut key = GenericRow::new_with_size(self.children.len());
        for (i, child) in self.children.iter().enumerate() {
            let v = child.eval(input)?;
            if v.is_null() {
                return Ok(());
            }
            key.update(i, v);
        }
        match buffer.get_mut(self.buffer_offset) {
            Value::Object(o) => match o.as_mut_any().downcast_mut::<DistinctSet>() {
                Some(set) => {
                    set.0.insert(key);
                    Ok(())
                }
                None => Err(QueryError::internal("count_distinct buffer holds a foreign object")),
            },
            other => Err(QueryError::internal(format!(
                "count_distinct buffer slot holds {other:?}"
            ))),
        }
    }

    fn eval(&self, buffer: &GenericRow) -> Result<Value> {
        match buffer.get(self.buffer_offset) {
            Value::Object(o) => match o.as_any().downcast_ref::<DistinctSet>() {
                Some(set) => Ok(Value::Long(set.0.len() as i64)),
                None => Err(QueryError::internal("count_distinct buffer holds a foreign object")),
            },
            other => Err(QueryError::internal(format!(
                "count_distinct buffer slot holds {other:?}"
            ))),
        }
    }
}
