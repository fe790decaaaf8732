use std::any::Any;
use std::sync::Arc;

use crate::expr::{Expr, ScalarFunction};
use crate::physical_expr::{self as phy, create_physical_expr, PhysicalExpr};
use crate::types::DataType;
use crate::{QueryError, Result};

/// `if(predicate, value, value)`. Branches are evaluated lazily, so a
/// guarded branch never observes the inputs the guard excludes.
#[derive(Debug, Clone)]
pub struct If {
    pub predicate: Box<Expr>,
    pub true_value: Box<Expr>,
    pub false_value: Box<Expr>,
}

impl If {
    pub fn new(predicate: Box<Expr>, true_value: Box<Expr>, false_value: Box<Expr>) -> Self {
        Self { predicate, true_value, false_value }
    }

    pub fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.len() != 3 {
            return Err(QueryError::analysis(
                format!("if requires 3 arguments, found {}", args.len()),
                "",
            ));
        }
        let mut iter = args.into_iter();
        Ok(Box::new(Self::new(
            Box::new(iter.next().unwrap()),
            Box::new(iter.next().unwrap()),
            Box::new(iter.next().unwrap()),
        )))
    }
}

impl ScalarFunction for If {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "if"
    }

    fn data_type(&self) -> &DataType {
        self.true_value.data_type()
    }

    fn nullable(&self) -> bool {
        self.true_value.nullable() || self.false_value.nullable()
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.predicate, &self.true_value, &self.false_value]
    }

    fn check_input_data_types(&self) -> Result<()> {
        if self.predicate.data_type() != DataType::boolean_type() {
            Err(QueryError::analysis(
                format!("if predicate must be boolean, got {}", self.predicate.data_type()),
                self.predicate.to_string(),
            ))
        } else if self.true_value.data_type() != self.false_value.data_type() {
            Err(QueryError::IncompatibleTypes(
                self.true_value.data_type().clone(),
                self.false_value.data_type().clone(),
            ))
        } else {
            Ok(())
        }
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Self::from_args(args).unwrap()
    }

    fn create_physical_expr(&self) -> Result<Arc<dyn PhysicalExpr>> {
        Ok(Arc::new(phy::If::new(
            create_physical_expr(&self.predicate)?,
            create_physical_expr(&self.true_value)?,
            create_physical_expr(&self.false_value)?,
        )))
    }
}

/// First non-null argument, null when all are.
#[derive(Debug, Clone)]
pub struct Coalesce {
    pub children: Vec<Expr>,
}

impl Coalesce {
    pub fn new(children: Vec<Expr>) -> Self {
        Self { children }
    }

    pub fn from_args(args: Vec<Expr>) -> Result<Box<dyn ScalarFunction>> {
        if args.is_empty() {
            return Err(QueryError::analysis("coalesce requires at least 1 argument", ""));
        }
        Ok(Box::new(Self::new(args)))
    }
}

/// `coalesce(a, b)` without going through the registry.
pub fn coalesce2(a: Expr, b: Expr) -> Expr {
    Expr::ScalarFunction(Box::new(Coalesce::new(vec![a, b])))
}

impl ScalarFunction for Coalesce {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &str {
        "coalesce"
    }

    fn data_type(&self) -> &DataType {
        self.children[0].data_type()
    }

    fn nullable(&self) -> bool {
        self.children.iter().all(|c| c.nullable())
    }

    fn args(&self) -> Vec<&Expr> {
        self.children.iter().collect()
    }

    fn check_input_data_types(&self) -> Result<()> {
        let first = self.children[0].data_type();
        for c in &self.children[1..] {
            if c.data_type() != first {
                return Err(QueryError::IncompatibleTypes(first.clone(), c.data_type().clone()));
            }
        }
        Ok(())
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction> {
        Box::new(Self::new(args))
    }

    fn create_physical_expr(&self) -> Result<Arc<dyn PhysicalExpr>> {
        let children = self
            .children
            .iter()
            .map(create_physical_expr)
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(phy::Coalesce::new(children)))
    }
}
