use std::any::Any;
use std::cmp::Ordering;
use std::hash::Hash;
use std::fmt::Debug;

use crate::expr::expr::{check_expected_input_types, compare_args};
use crate::expr::{AttributeReference, Expr};
use crate::physical_expr::{create_physical_expr, PhysicalGenerator};
use crate::types::{AbstractDataType, DataType, Field, Schema};
use crate::{QueryError, Result};

/// An expression producing zero or more rows per input row, consumed by
/// the `Generate` operator. Generators are stateless across rows; a
/// close/cleanup notification is not part of the contract and
/// implementations must not depend on one.
pub trait Generator: Debug + Send + Sync + ExtendGenerator {
    fn name(&self) -> &str;

    /// Schema of a single produced row.
    fn element_schema(&self) -> Schema;

    fn data_type(&self) -> &DataType;

    fn args(&self) -> Vec<&Expr>;

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        None
    }

    fn check_input_data_types(&self) -> Result<()> {
        check_expected_input_types(self.name(), &self.args(), self.expects_input_types())
    }

    /// The attribute list the generator contributes to its operator's
    /// output, one fresh attribute per element-schema field.
    fn make_output(&self) -> Vec<AttributeReference> {
        self.element_schema().to_attributes()
    }

    /// Evaluable counterpart; arguments must be bound first.
    fn physical_generator(&self) -> Result<Box<dyn PhysicalGenerator>>;
}

pub trait ExtendGenerator {
    fn clone_box(&self) -> Box<dyn Generator>;
    fn as_any(&self) -> &dyn Any;
    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn Generator>;
}

impl<T: Generator + Clone + GeneratorFromArgs + 'static> ExtendGenerator for T {
    fn clone_box(&self) -> Box<dyn Generator> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn Generator> {
        Self::from_args(args).unwrap()
    }
}

pub trait GeneratorFromArgs {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn Generator>>
    where
        Self: Sized;

    fn create_function_expr(args: Vec<Expr>) -> Result<Expr>
    where
        Self: Sized,
    {
        Ok(Expr::Generator(Self::from_args(args)?))
    }
}

impl Clone for Box<dyn Generator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn Generator> {
    fn eq(&self, other: &Self) -> bool {
        if self.as_any().type_id() != other.as_any().type_id() || self.name() != other.name() {
            return false;
        }
        let args1 = self.args();
        let args2 = other.args();
        args1.len() == args2.len() && args1.iter().zip(args2.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for Box<dyn Generator> {}

impl PartialOrd for Box<dyn Generator> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        compare_args(&self.args(), &other.args())
    }
}

impl Hash for Box<dyn Generator> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for x in self.args() {
            x.hash(state);
        }
    }
}

/// `explode(array)`: one output row per array element.
#[derive(Debug, Clone)]
pub struct Explode {
    pub child: Box<Expr>,
    pub element_schema: Schema,
    pub data_type: DataType,
}

impl Explode {
    pub fn new(child: Box<Expr>) -> Self {
        let tp = if child.resolved() {
            match child.data_type() {
                DataType::Array(t, _) => t.as_ref().clone(),
                _ => DataType::Null,
            }
        } else {
            DataType::Null
        };
        let element_schema = Schema::new(vec![Field::new("col", tp)]);
        let data_type = DataType::Array(Box::new(element_schema.to_struct_type()), true);
        Self { child, element_schema, data_type }
    }
}

impl GeneratorFromArgs for Explode {
    fn from_args(args: Vec<Expr>) -> Result<Box<dyn Generator>> {
        if args.len() != 1 {
            return Err(QueryError::analysis(
                format!("explode requires 1 argument, found {}", args.len()),
                "",
            ));
        }
        let mut iter = args.into_iter();
        Ok(Box::new(Self::new(Box::new(iter.next().unwrap()))))
    }
}

impl Generator for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    fn element_schema(&self) -> Schema {
        self.element_schema.clone()
    }

    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn args(&self) -> Vec<&Expr> {
        vec![&self.child]
    }

    fn check_input_data_types(&self) -> Result<()> {
        match self.child.data_type() {
            DataType::Array(..) => Ok(()),
            other => Err(QueryError::analysis(
                format!("explode requires an array argument, got {other}"),
                self.child.to_string(),
            )),
        }
    }

    fn physical_generator(&self) -> Result<Box<dyn PhysicalGenerator>> {
        let child = create_physical_expr(self.child.as_ref())?;
        Ok(Box::new(crate::physical_expr::ExplodeExec::new(child)))
    }
}
