pub mod rules;

pub use rules::*;

use crate::logical_plan::LogicalPlan;
use crate::rules::{Batch, Invariant, RuleExecutor, Strategy};
use crate::Result;

const FIXED_POINT: usize = 100;

/// Semantics-preserving rewrites over an analyzed plan. Every rule
/// either strictly shrinks the tree (subquery elimination), strictly
/// reduces the number of non-literal nodes (folding, simplification)
/// or leaves the plan alone, so the fixpoint converges.
pub struct Optimizer {
    executor: RuleExecutor<LogicalPlan>,
}

impl Optimizer {
    pub fn new() -> Self {
        let executor = RuleExecutor::with_invariants(
            vec![
                Batch::new("Finish analysis", Strategy::Once, vec![Box::new(EliminateSubqueries)]),
                Batch::new(
                    "Operator optimization",
                    Strategy::FixedPoint(FIXED_POINT),
                    vec![
                        Box::new(CombineFilters),
                        Box::new(ConstantFolding),
                        Box::new(BooleanSimplification),
                        Box::new(SimplifyCasts),
                    ],
                ),
            ],
            vec![Invariant::new("optimized plan stays resolved", |p: &LogicalPlan| p.resolved())],
        );
        Self { executor }
    }

    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        self.executor.execute(plan)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::Value;
    use crate::expr::{AttributeReference, Expr, Literal as ExprLiteral};
    use crate::logical_plan::*;
    use crate::types::DataType;

    fn relation() -> (Vec<AttributeReference>, Arc<LogicalPlan>) {
        let attrs = vec![
            AttributeReference::new("a", DataType::Int, true),
            AttributeReference::new("b", DataType::Int, true),
            AttributeReference::new("c", DataType::Int, true),
        ];
        let plan = Arc::new(LogicalPlan::Relation(Relation::new("r", attrs.clone())));
        (attrs, plan)
    }

    fn literal_of(e: &Expr) -> Option<&Value> {
        match e {
            Expr::Literal(ExprLiteral { value, .. }) => Some(value),
            _ => None,
        }
    }

    #[test]
    fn test_constant_folding_of_filter_and_project() {
        // Filter((1=1 AND 2>3) OR 3>2) under a constant projection
        let (_, rel) = relation();
        let condition = (Expr::int_lit(1).eq_expr(Expr::int_lit(1)))
            .and(Expr::int_lit(2).gt(Expr::int_lit(3)))
            .or(Expr::int_lit(3).gt(Expr::int_lit(2)));
        let plan = LogicalPlan::Project(Project::new(
            vec![(Expr::int_lit(2) + Expr::int_lit(3) + Expr::int_lit(4)).alias("x")],
            Arc::new(LogicalPlan::Filter(Filter::new(condition, rel))),
        ));
        let optimized = Optimizer::new().optimize(plan).unwrap();
        let LogicalPlan::Project(project) = &optimized else {
            panic!("expected Project, got {optimized:?}")
        };
        match &project.project_list[0] {
            Expr::Alias(alias) => {
                assert_eq!(literal_of(&alias.child), Some(&Value::Int(9)));
                assert_eq!(alias.name, "x");
            }
            other => panic!("expected alias, got {other:?}"),
        }
        let LogicalPlan::Filter(filter) = project.child.as_ref() else {
            panic!("expected Filter under Project")
        };
        assert_eq!(literal_of(&filter.condition), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_folding_stops_at_attributes() {
        // 2+3+a folds the constant prefix only; 2*a+4 is untouched
        let (attrs, rel) = relation();
        let a = || Expr::AttributeReference(attrs[0].clone());
        let plan = LogicalPlan::Project(Project::new(
            vec![
                (Expr::int_lit(2) + Expr::int_lit(3) + a()).alias("c1"),
                (Expr::int_lit(2) * a() + Expr::int_lit(4)).alias("c3"),
            ],
            rel,
        ));
        let optimized = Optimizer::new().optimize(plan).unwrap();
        let LogicalPlan::Project(project) = &optimized else { panic!("expected Project") };
        match &project.project_list[0] {
            Expr::Alias(alias) => match alias.child.as_ref() {
                Expr::BinaryOperator(b) => {
                    assert_eq!(literal_of(&b.left), Some(&Value::Int(5)));
                    assert!(matches!(b.right.as_ref(), Expr::AttributeReference(_)));
                }
                other => panic!("expected 5 + a, got {other}"),
            },
            other => panic!("expected alias, got {other}"),
        }
        match &project.project_list[1] {
            Expr::Alias(alias) => match alias.child.as_ref() {
                Expr::BinaryOperator(b) => {
                    assert!(matches!(b.left.as_ref(), Expr::BinaryOperator(_)));
                    assert_eq!(literal_of(&b.right), Some(&Value::Int(4)));
                }
                other => panic!("expected 2*a + 4, got {other}"),
            },
            other => panic!("expected alias, got {other}"),
        }
    }

    #[test]
    fn test_boolean_simplification() {
        let (attrs, rel) = relation();
        let a = Expr::AttributeReference(attrs[0].clone());
        let pred = Expr::boolean_lit(true).and(a.clone().gt(Expr::int_lit(1)));
        let plan = LogicalPlan::Filter(Filter::new(pred, rel));
        let optimized = Optimizer::new().optimize(plan).unwrap();
        let LogicalPlan::Filter(filter) = &optimized else { panic!("expected Filter") };
        // `true AND (a > 1)` became `a > 1`
        assert!(matches!(&filter.condition, Expr::BinaryOperator(b) if b.op == crate::Operator::Gt));
    }

    #[test]
    fn test_combine_filters() {
        let (attrs, rel) = relation();
        let a = || Expr::AttributeReference(attrs[0].clone());
        let b = || Expr::AttributeReference(attrs[1].clone());
        let plan = LogicalPlan::Filter(Filter::new(
            a().gt(Expr::int_lit(1)),
            Arc::new(LogicalPlan::Filter(Filter::new(b().gt(Expr::int_lit(2)), rel))),
        ));
        let optimized = Optimizer::new().optimize(plan).unwrap();
        let LogicalPlan::Filter(filter) = &optimized else { panic!("expected Filter") };
        assert!(matches!(filter.child.as_ref(), LogicalPlan::Relation(_)));
        assert!(
            matches!(&filter.condition, Expr::BinaryOperator(op) if op.op == crate::Operator::And)
        );
    }

    #[test]
    fn test_simplify_casts() {
        let (attrs, rel) = relation();
        let a = Expr::AttributeReference(attrs[0].clone());
        let plan = LogicalPlan::Project(Project::new(
            vec![a.cast(DataType::Int).alias("a")],
            rel,
        ));
        let optimized = Optimizer::new().optimize(plan).unwrap();
        let LogicalPlan::Project(project) = &optimized else { panic!("expected Project") };
        match &project.project_list[0] {
            Expr::Alias(alias) => assert!(matches!(alias.child.as_ref(), Expr::AttributeReference(_))),
            other => panic!("expected alias, got {other}"),
        }
    }

    #[test]
    fn test_eliminate_subqueries() {
        let (_, rel) = relation();
        let plan = LogicalPlan::SubqueryAlias(SubqueryAlias::new("x", rel));
        let optimized = Optimizer::new().optimize(plan).unwrap();
        assert!(matches!(optimized, LogicalPlan::Relation(_)));
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let (attrs, rel) = relation();
        let a = || Expr::AttributeReference(attrs[0].clone());
        let plan = LogicalPlan::Project(Project::new(
            vec![
                (Expr::int_lit(2) + Expr::int_lit(3) + a()).alias("c1"),
                (a().gt(Expr::int_lit(1)).and(Expr::boolean_lit(true))).alias("c2"),
            ],
            Arc::new(LogicalPlan::Filter(Filter::new(
                Expr::boolean_lit(true).or(a().gt(Expr::int_lit(0))),
                rel,
            ))),
        ));
        let optimizer = Optimizer::new();
        let once = optimizer.optimize(plan).unwrap();
        let twice = optimizer.optimize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
