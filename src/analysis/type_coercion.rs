use crate::expr::{BinaryOperator, Expr};
use crate::logical_plan::LogicalPlan;
use crate::rules::Rule;
use crate::tree_node::Transformed;
use crate::types::{AbstractDataType, DataType};
use crate::Result;

pub fn type_coercion_rules() -> Vec<Box<dyn Rule<LogicalPlan>>> {
    vec![Box::new(PromoteStrings), Box::new(ImplicitTypeCasts), Box::new(FunctionArgumentCasts)]
}

fn cast_if_not_same_type(expr: Expr, dt: &DataType) -> Expr {
    if expr.data_type() == dt {
        expr
    } else {
        expr.cast(dt.clone())
    }
}

/// A string compared with or combined arithmetically with a number is
/// read as a number; both sides land on Double.
#[derive(Debug)]
pub struct PromoteStrings;

fn string_numeric_promotion(left: &DataType, right: &DataType) -> Option<DataType> {
    match (left, right) {
        (DataType::String, r) if r.is_numeric_type() => Some(DataType::Double),
        (l, DataType::String) if l.is_numeric_type() => Some(DataType::Double),
        _ => None,
    }
}

impl Rule<LogicalPlan> for PromoteStrings {
    fn name(&self) -> &str {
        "PromoteStrings"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            e if !e.children_resolved() => Ok(Transformed::no(e)),
            Expr::BinaryOperator(BinaryOperator { left, op, right })
                if (op.is_comparison() || op.is_arithmetic())
                    && string_numeric_promotion(left.data_type(), right.data_type()).is_some() =>
            {
                let common = string_numeric_promotion(left.data_type(), right.data_type()).unwrap();
                Ok(Transformed::yes(Expr::BinaryOperator(BinaryOperator {
                    left: Box::new(cast_if_not_same_type(*left, &common)),
                    op,
                    right: Box::new(cast_if_not_same_type(*right, &common)),
                })))
            }
            e => Ok(Transformed::no(e)),
        })
    }
}

/// Widen the operands of binary nodes to their least upper bound,
/// inserting casts where the types differ. Declarative: each node only
/// inspects its direct children, the fixpoint does the rest. A pair
/// with no least upper bound is reported as incompatible.
#[derive(Debug)]
pub struct ImplicitTypeCasts;

impl Rule<LogicalPlan> for ImplicitTypeCasts {
    fn name(&self) -> &str {
        "ImplicitTypeCasts"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            e if !e.children_resolved() => Ok(Transformed::no(e)),
            Expr::BinaryOperator(BinaryOperator { left, op, right })
                if left.data_type() != right.data_type() =>
            {
                let common = DataType::widen(left.data_type(), right.data_type())?;
                Ok(Transformed::yes(Expr::BinaryOperator(BinaryOperator {
                    left: Box::new(cast_if_not_same_type(*left, &common)),
                    op,
                    right: Box::new(cast_if_not_same_type(*right, &common)),
                })))
            }
            e => Ok(Transformed::no(e)),
        })
    }
}

fn implicit_cast(in_type: &DataType, expected: &AbstractDataType) -> Option<DataType> {
    match (in_type, expected) {
        (t, expected) if expected.accepts_type(t) => Some(t.clone()),
        (DataType::Null, expected) => Some(expected.default_concrete_type()),
        // a string fed to a numeric slot follows the numeric-promotion
        // convention and becomes a double
        (DataType::String, AbstractDataType::Numeric) => Some(DataType::Double),
        (t, expected) if t.is_numeric_type() && matches!(expected, AbstractDataType::Numeric) => {
            Some(t.clone())
        }
        (t, AbstractDataType::Type(target))
            if t.is_numeric_type() && target.is_numeric_type() =>
        {
            Some(target.clone())
        }
        (t, AbstractDataType::Type(DataType::String)) if t.is_atomic_type() => {
            Some(DataType::String)
        }
        (t, AbstractDataType::Collection(options)) => {
            options.iter().find_map(|o| implicit_cast(t, o))
        }
        _ => None,
    }
}

/// Cast function arguments the registry's entry does not accept into
/// the type it expects, where an implicit cast exists.
#[derive(Debug)]
pub struct FunctionArgumentCasts;

fn coerce_args(args: Vec<Expr>, expected: &[AbstractDataType]) -> (bool, Vec<Expr>) {
    let mut changed = false;
    let coerced = args
        .into_iter()
        .zip(expected.iter())
        .map(|(arg, expectation)| {
            if expectation.accepts_type(arg.data_type()) {
                arg
            } else {
                match implicit_cast(arg.data_type(), expectation) {
                    Some(tp) if &tp != arg.data_type() => {
                        changed = true;
                        arg.cast(tp)
                    }
                    _ => arg,
                }
            }
        })
        .collect();
    (changed, coerced)
}

impl Rule<LogicalPlan> for FunctionArgumentCasts {
    fn name(&self) -> &str {
        "FunctionArgumentCasts"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match &expr {
            e if !e.children_resolved() => Ok(Transformed::no(expr)),
            Expr::ScalarFunction(f) => {
                if let Some(expected) = f.expects_input_types() {
                    let args: Vec<Expr> = f.args().into_iter().cloned().collect();
                    let (changed, coerced) = coerce_args(args, &expected);
                    if changed {
                        return Ok(Transformed::yes(Expr::ScalarFunction(f.rewrite_args(coerced))));
                    }
                }
                Ok(Transformed::no(expr))
            }
            Expr::AggregateFunction(f) => {
                if let Some(expected) = f.expects_input_types() {
                    let args: Vec<Expr> = f.args().into_iter().cloned().collect();
                    let (changed, coerced) = coerce_args(args, &expected);
                    if changed {
                        return Ok(Transformed::yes(Expr::AggregateFunction(
                            f.rewrite_args(coerced),
                        )));
                    }
                }
                Ok(Transformed::no(expr))
            }
            _ => Ok(Transformed::no(expr)),
        })
    }
}
