use std::sync::Arc;

use crate::analysis::rules::*;
use crate::analysis::type_coercion::type_coercion_rules;
use crate::analysis::FunctionRegistry;
use crate::catalog::Catalog;
use crate::expr::Expr;
use crate::logical_plan::LogicalPlan;
use crate::rules::{Batch, Rule, RuleExecutor, Strategy};
use crate::tree_node::{Transformed, TreeNode, TreeNodeRecursion};
use crate::{QueryError, Result};

const FIXED_POINT: usize = 50;

/// Name resolution: turns a parser-produced plan with unresolved
/// relations, attributes, stars and functions into a fully typed one.
/// Fails with the most specific unresolved error it can find.
#[derive(Debug)]
pub struct Analyzer {
    catalog: Arc<dyn Catalog>,
    registry: Arc<FunctionRegistry>,
}

impl Analyzer {
    pub fn new(catalog: Arc<dyn Catalog>, registry: Arc<FunctionRegistry>) -> Self {
        Self { catalog, registry }
    }

    pub fn analyze(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let executor = RuleExecutor::new(vec![
            Batch::new(
                "Resolution",
                Strategy::FixedPoint(FIXED_POINT),
                vec![
                    Box::new(ResolveRelations { catalog: self.catalog.clone() }),
                    Box::new(ResolveReferences),
                    Box::new(ExpandStars),
                    Box::new(ResolveFunctions { registry: self.registry.clone() }),
                    Box::new(AliasUnnamedExpressions),
                    Box::new(ResolveGeneratorOutput),
                    Box::new(GlobalAggregates),
                ],
            ),
            Batch::new("Type coercion", Strategy::FixedPoint(FIXED_POINT), type_coercion_rules()),
            Batch::new("Aggregation", Strategy::Once, vec![Box::new(CheckAggregates)]),
            Batch::new("Check analysis", Strategy::Once, vec![Box::new(CheckAnalysis)]),
        ]);
        executor.execute(plan)
    }
}

/// Final gate: anything still unresolved is turned into the most
/// precise error available, with the offending subtree attached.
#[derive(Debug)]
struct CheckAnalysis;

impl Rule<LogicalPlan> for CheckAnalysis {
    fn name(&self) -> &str {
        "CheckAnalysis"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.apply(|node| {
            if let LogicalPlan::UnresolvedRelation(r) = node {
                return Err(QueryError::RelationNotFound(r.name.clone()));
            }
            for expr in node.expressions() {
                // report unresolved leaves before type-checking their
                // parents, whose data_type would be undefined
                expr.apply(|e| {
                    match e {
                        Expr::UnresolvedAttribute(u) => {
                            return Err(QueryError::UnresolvedAttribute {
                                name: u.name_parts.join("."),
                                plan: node.tree_string(),
                            });
                        }
                        Expr::UnresolvedFunction(f) => {
                            return Err(QueryError::FunctionNotFound(f.name.clone()));
                        }
                        Expr::Star(_) => {
                            return Err(QueryError::analysis(
                                "unexpanded * outside a projection list",
                                node.tree_string(),
                            ));
                        }
                        _ => {}
                    }
                    Ok(TreeNodeRecursion::Continue)
                })?;
                expr.apply(|e| {
                    e.check_input_data_types()?;
                    Ok(TreeNodeRecursion::Continue)
                })?;
            }
            Ok(TreeNodeRecursion::Continue)
        })?;
        if !plan.resolved() {
            return Err(QueryError::analysis("plan is not fully resolved", plan.tree_string()));
        }
        Ok(Transformed::no(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, Table};
    use crate::expr::{col, qualified_col, UnresolvedFunction};
    use crate::logical_plan::*;
    use crate::types::{DataType, Field, Schema};

    fn test_catalog() -> Arc<MemoryCatalog> {
        let catalog = MemoryCatalog::new();
        catalog.register_table(Table::new(
            "t",
            Schema::new(vec![
                Field::new("a", DataType::Int),
                Field::new("b", DataType::Long),
                Field::new("s", DataType::String),
            ]),
            vec![],
        ));
        Arc::new(catalog)
    }

    fn analyzer(catalog: Arc<MemoryCatalog>) -> Analyzer {
        Analyzer::new(catalog, Arc::new(FunctionRegistry::builtin()))
    }

    fn scan(name: &str) -> Arc<LogicalPlan> {
        Arc::new(LogicalPlan::UnresolvedRelation(UnresolvedRelation::new(name, None)))
    }

    #[test]
    fn test_resolve_project_over_relation() {
        let catalog = test_catalog();
        let plan = LogicalPlan::Project(Project::new(vec![col("a"), col("b")], scan("t")));
        let analyzed = analyzer(catalog).analyze(plan).unwrap();
        assert!(analyzed.resolved());
        let output = analyzed.output();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].name, "a");
        assert_eq!(output[0].data_type, DataType::Int);
    }

    #[test]
    fn test_unknown_relation_fails() {
        let catalog = test_catalog();
        let plan = LogicalPlan::Project(Project::new(vec![col("a")], scan("missing")));
        let err = analyzer(catalog).analyze(plan).unwrap_err();
        assert_eq!(err, QueryError::RelationNotFound("missing".to_string()));
    }

    #[test]
    fn test_unknown_attribute_fails() {
        let catalog = test_catalog();
        let plan = LogicalPlan::Project(Project::new(vec![col("zz")], scan("t")));
        let err = analyzer(catalog).analyze(plan).unwrap_err();
        assert!(matches!(err, QueryError::UnresolvedAttribute { name, .. } if name == "zz"));
    }

    #[test]
    fn test_ambiguous_reference_across_join_sides() {
        let catalog = test_catalog();
        let plan = LogicalPlan::Project(Project::new(
            vec![col("a")],
            Arc::new(LogicalPlan::Join(Join::new(
                scan("t"),
                scan("t"),
                JoinType::Inner,
                None,
            ))),
        ));
        let err = analyzer(catalog).analyze(plan).unwrap_err();
        assert!(matches!(err, QueryError::AmbiguousReference { .. }));
    }

    #[test]
    fn test_qualified_reference_through_subquery_alias() {
        let catalog = test_catalog();
        let left = Arc::new(LogicalPlan::SubqueryAlias(SubqueryAlias::new("x", scan("t"))));
        let right = Arc::new(LogicalPlan::SubqueryAlias(SubqueryAlias::new("y", scan("t"))));
        let plan = LogicalPlan::Project(Project::new(
            vec![qualified_col("x", "a"), qualified_col("y", "a")],
            Arc::new(LogicalPlan::Join(Join::new(left, right, JoinType::Inner, None))),
        ));
        let analyzed = analyzer(catalog).analyze(plan).unwrap();
        let output = analyzed.output();
        assert_eq!(output.len(), 2);
        assert_ne!(output[0].expr_id, output[1].expr_id);
    }

    #[test]
    fn test_star_expansion() {
        let catalog = test_catalog();
        let plan = LogicalPlan::Project(Project::new(vec![Expr::Star(None)], scan("t")));
        let analyzed = analyzer(catalog).analyze(plan).unwrap();
        assert_eq!(
            analyzed.output().iter().map(|a| a.name.clone()).collect::<Vec<_>>(),
            vec!["a", "b", "s"]
        );
    }

    #[test]
    fn test_qualified_star_expansion() {
        let catalog = test_catalog();
        let aliased = Arc::new(LogicalPlan::SubqueryAlias(SubqueryAlias::new("x", scan("t"))));
        let plan = LogicalPlan::Project(Project::new(vec![Expr::Star(Some("x".into()))], aliased));
        let analyzed = analyzer(catalog).analyze(plan).unwrap();
        assert_eq!(analyzed.output().len(), 3);
    }

    #[test]
    fn test_type_coercion_widens_int_plus_long() {
        let catalog = test_catalog();
        let plan = LogicalPlan::Project(Project::new(
            vec![(col("a") + col("b")).alias("x")],
            scan("t"),
        ));
        let analyzed = analyzer(catalog).analyze(plan).unwrap();
        assert_eq!(analyzed.output()[0].data_type, DataType::Long);
        // the int side received a cast
        let casts = analyzed.expressions()[0]
            .collect(|e| if matches!(e, Expr::Cast(_)) { Some(()) } else { None })
            .unwrap();
        assert_eq!(casts.len(), 1);
    }

    #[test]
    fn test_incompatible_types_rejected() {
        let catalog = test_catalog();
        let plan = LogicalPlan::Project(Project::new(
            vec![(col("a") + Expr::boolean_lit(true)).alias("x")],
            scan("t"),
        ));
        let err = analyzer(catalog).analyze(plan).unwrap_err();
        assert!(matches!(err, QueryError::IncompatibleTypes(_, _)));
    }

    #[test]
    fn test_function_resolution_and_global_aggregate() {
        let catalog = test_catalog();
        let count = Expr::UnresolvedFunction(UnresolvedFunction::new("count", vec![col("a")]));
        let plan = LogicalPlan::Project(Project::new(vec![count.alias("n")], scan("t")));
        let analyzed = analyzer(catalog).analyze(plan).unwrap();
        match &analyzed {
            LogicalPlan::Aggregate(agg) => {
                assert!(agg.grouping_exprs.is_empty());
                assert!(agg.aggregate_exprs[0].contains_aggregate());
            }
            other => panic!("expected Aggregate, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function_fails() {
        let catalog = test_catalog();
        let f = Expr::UnresolvedFunction(UnresolvedFunction::new("mystery", vec![col("a")]));
        let plan = LogicalPlan::Project(Project::new(vec![f.alias("x")], scan("t")));
        let err = analyzer(catalog).analyze(plan).unwrap_err();
        assert_eq!(err, QueryError::FunctionNotFound("mystery".to_string()));
    }

    #[test]
    fn test_non_grouping_reference_rejected() {
        let catalog = test_catalog();
        let count = Expr::UnresolvedFunction(UnresolvedFunction::new("count", vec![col("a")]));
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![col("s")],
            vec![col("b").alias("b"), count.alias("n")],
            scan("t"),
        ));
        let err = analyzer(catalog).analyze(plan).unwrap_err();
        assert!(matches!(err, QueryError::NonGroupingReference { .. }));
    }

    #[test]
    fn test_grouping_expression_is_allowed_in_output() {
        let catalog = test_catalog();
        let count = Expr::UnresolvedFunction(UnresolvedFunction::new("count", vec![col("a")]));
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![col("s")],
            vec![col("s"), count.alias("n")],
            scan("t"),
        ));
        let analyzed = analyzer(catalog).analyze(plan).unwrap();
        assert!(analyzed.resolved());
    }
}
