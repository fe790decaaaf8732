use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::data::Value;
use crate::expr::{Expr, ScalarFunction};
use crate::physical_expr::{self as phy, create_physical_expr, PhysicalExpr};
use crate::types::{AbstractDataType, DataType};
use crate::{QueryError, Result};

/// Uniform random double in `[0, 1)`. The one non-deterministic
/// built-in; never foldable.
#[derive(Debug, Clone)]
pub struct Rand;

impl Rand {
    pub fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if !args.is_empty() {
            return Err(QueryError::analysis("rand takes no arguments", ""));
        }
        Ok(Box::new(Rand))
    }
}

impl ScalarFunction for Rand {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "rand"
    }

    fn data_type(&self) -> &DataType {
        DataType::double_type()
    }

    fn nullable(&self) -> bool {
        false
    }

    fn foldable(&self) -> bool {
        false
    }

    fn args(&self) -> Vec<&Expr> {
        vec![]
    }

    fn rewrite_args(&self, _args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Rand)
    }

    fn create_physical_expr(&self) -> Result<Arc<dyn PhysicalExpr>> {
        Ok(Arc::new(phy::Rand))
    }
}

pub type UdfImpl = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A resolved user-defined scalar function. The implementation promises
/// to honour the declared return type; nulls are passed through to the
/// function as-is so null-aware UDFs stay possible.
#[derive(Clone)]
pub struct ScalarUdf {
    pub name: String,
    pub data_type: DataType,
    pub input_types: Option<Vec<AbstractDataType>>,
    pub children: Vec<Expr>,
    pub fun: Arc<UdfImpl>,
}

impl ScalarUdf {
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        input_types: Option<Vec<AbstractDataType>>,
        children: Vec<Expr>,
        fun: Arc<UdfImpl>,
    ) -> Self {
        Self { name: name.into(), data_type, input_types, children, fun }
    }
}

impl Debug for ScalarUdf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarUdf")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("children", &self.children)
            .finish()
    }
}

impl ScalarFunction for ScalarUdf {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn args(&self) -> Vec<&Expr> {
        self.children.iter().collect()
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        self.input_types.clone()
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(ScalarUdf {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            input_types: self.input_types.clone(),
            children: args,
            fun: self.fun.clone(),
        })
    }

    fn create_physical_expr(&self) -> Result<Arc<dyn PhysicalExpr>> {
        let children = self
            .children
            .iter()
            .map(create_physical_expr)
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(phy::ScalarUdfExpr::new(
            self.name.clone(),
            self.data_type.clone(),
            children,
            self.fun.clone(),
        )))
    }
}
