use log::debug;

use crate::data::empty_row;
use crate::expr::{BinaryOperator, Cast, Expr, Literal};
use crate::logical_plan::{Filter, LogicalPlan};
use crate::physical_expr::create_physical_expr;
use crate::rules::Rule;
use crate::tree_node::{Transformed, TreeNode};
use crate::{Operator, Result};

/// Subquery aliases only exist for name resolution; analysis is done,
/// so drop them.
#[derive(Debug)]
pub struct EliminateSubqueries;

impl Rule<LogicalPlan> for EliminateSubqueries {
    fn name(&self) -> &str {
        "EliminateSubqueries"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::SubqueryAlias(s) => Ok(Transformed::yes(s.child.as_ref().clone())),
            p => Ok(Transformed::no(p)),
        })
    }
}

/// Merge adjacent filters into one conjunction.
#[derive(Debug)]
pub struct CombineFilters;

impl Rule<LogicalPlan> for CombineFilters {
    fn name(&self) -> &str {
        "CombineFilters"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Filter(Filter { condition, child }) => match child.as_ref() {
                LogicalPlan::Filter(inner) => Ok(Transformed::yes(LogicalPlan::Filter(Filter::new(
                    inner.condition.clone().and(condition),
                    inner.child.clone(),
                )))),
                _ => Ok(Transformed::no(LogicalPlan::Filter(Filter { condition, child }))),
            },
            p => Ok(Transformed::no(p)),
        })
    }
}

/// Evaluate every foldable subtree through the interpreter and replace
/// it with the literal it produces. Works bottom-up, so the largest
/// constant subtrees collapse in one pass.
#[derive(Debug)]
pub struct ConstantFolding;

impl Rule<LogicalPlan> for ConstantFolding {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            e @ Expr::Literal(_) => Ok(Transformed::no(e)),
            e if e.foldable() => {
                let physical = create_physical_expr(&e)?;
                let value = physical.eval(empty_row())?;
                let new_expr = Expr::lit(value, physical.data_type());
                debug!("fold {e} -> {new_expr}");
                Ok(Transformed::yes(new_expr))
            }
            e => Ok(Transformed::no(e)),
        })
    }
}

/// Boolean literal identities: `true AND x -> x`, `false AND x ->
/// false` and the duals for OR. Sound under three-valued logic.
#[derive(Debug)]
pub struct BooleanSimplification;

impl Rule<LogicalPlan> for BooleanSimplification {
    fn name(&self) -> &str {
        "BooleanSimplification"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        fn boolean_literal(e: &Expr) -> Option<bool> {
            match e {
                Expr::Literal(Literal { value, .. }) if value.is_true() => Some(true),
                Expr::Literal(Literal { value, .. }) if value.is_false() => Some(false),
                _ => None,
            }
        }
        plan.transform_up_expressions(|expr| match &expr {
            Expr::BinaryOperator(BinaryOperator { left, op: Operator::And, right }) => {
                if boolean_literal(left) == Some(false) || boolean_literal(right) == Some(false) {
                    Ok(Transformed::yes(Expr::boolean_lit(false)))
                } else if boolean_literal(left) == Some(true) {
                    Ok(Transformed::yes(right.as_ref().clone()))
                } else if boolean_literal(right) == Some(true) {
                    Ok(Transformed::yes(left.as_ref().clone()))
                } else {
                    Ok(Transformed::no(expr))
                }
            }
            Expr::BinaryOperator(BinaryOperator { left, op: Operator::Or, right }) => {
                if boolean_literal(left) == Some(true) || boolean_literal(right) == Some(true) {
                    Ok(Transformed::yes(Expr::boolean_lit(true)))
                } else if boolean_literal(left) == Some(false) {
                    Ok(Transformed::yes(right.as_ref().clone()))
                } else if boolean_literal(right) == Some(false) {
                    Ok(Transformed::yes(left.as_ref().clone()))
                } else {
                    Ok(Transformed::no(expr))
                }
            }
            _ => Ok(Transformed::no(expr)),
        })
    }
}

/// Drop casts whose child already has the target type.
#[derive(Debug)]
pub struct SimplifyCasts;

impl Rule<LogicalPlan> for SimplifyCasts {
    fn name(&self) -> &str {
        "SimplifyCasts"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up_expressions(|expr| match expr {
            Expr::Cast(Cast { child, data_type }) if child.data_type() == &data_type => {
                Ok(Transformed::yes(*child))
            }
            e => Ok(Transformed::no(e)),
        })
    }
}
