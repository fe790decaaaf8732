use std::sync::Arc;

use itertools::Itertools;

use crate::analysis::FunctionRegistry;
use crate::catalog::Catalog;
use crate::expr::*;
use crate::logical_plan::{Aggregate, Generate, LogicalPlan, Project};
use crate::rules::Rule;
use crate::tree_node::{Transformed, TreeNode};
use crate::{QueryError, Result};

/// Replace `UnresolvedRelation` leaves with catalog relations. Unknown
/// names abort analysis immediately.
#[derive(Debug)]
pub struct ResolveRelations {
    pub catalog: Arc<dyn Catalog>,
}

impl Rule<LogicalPlan> for ResolveRelations {
    fn name(&self) -> &str {
        "ResolveRelations"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match &plan {
            LogicalPlan::UnresolvedRelation(r) => {
                let resolved = self.catalog.lookup_relation(&r.name, r.alias.as_deref())?;
                Ok(Transformed::yes(resolved))
            }
            _ => Ok(Transformed::no(plan)),
        })
    }
}

/// Bind `UnresolvedAttribute`s against the child output of the
/// enclosing operator. A name matches an attribute either bare or as
/// `qualifier.name`; several matches are ambiguous, zero matches are
/// left for a later pass to resolve or reject.
#[derive(Debug)]
pub struct ResolveReferences;

fn resolve_against(
    name_parts: &[String],
    attributes: &[AttributeReference],
) -> Result<Option<AttributeReference>> {
    let candidates: Vec<&AttributeReference> = match name_parts {
        [name] => attributes.iter().filter(|a| &a.name == name).collect(),
        [qualifier, name] => attributes
            .iter()
            .filter(|a| a.qualifier.as_ref() == Some(qualifier) && &a.name == name)
            .collect(),
        _ => vec![],
    };
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(Some(candidates[0].clone())),
        _ => Err(QueryError::AmbiguousReference {
            name: name_parts.join("."),
            candidates: candidates.iter().map(|a| format!("{}#{}", a.name, a.expr_id)).join(", "),
        }),
    }
}

impl Rule<LogicalPlan> for ResolveReferences {
    fn name(&self) -> &str {
        "ResolveReferences"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            p => {
                let attributes = p.child_attributes();
                p.map_expressions(|expr| {
                    expr.transform_up(|expr| match &expr {
                        Expr::UnresolvedAttribute(u) => {
                            match resolve_against(&u.name_parts, &attributes)? {
                                Some(a) => Ok(Transformed::yes(Expr::AttributeReference(a))),
                                None => Ok(Transformed::no(expr)),
                            }
                        }
                        _ => Ok(Transformed::no(expr)),
                    })
                })
            }
        })
    }
}

/// Expand `*` (optionally qualified) in projection lists to the child
/// output.
#[derive(Debug)]
pub struct ExpandStars;

impl Rule<LogicalPlan> for ExpandStars {
    fn name(&self) -> &str {
        "ExpandStars"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match &plan {
            LogicalPlan::Project(Project { project_list, child })
                if child.resolved()
                    && project_list.iter().any(|e| matches!(e, Expr::Star(_))) =>
            {
                let child_output = child.output();
                let mut expanded = Vec::with_capacity(project_list.len());
                for e in project_list {
                    match e {
                        Expr::Star(None) => expanded
                            .extend(child_output.iter().cloned().map(Expr::AttributeReference)),
                        Expr::Star(Some(q)) => {
                            let matched: Vec<_> = child_output
                                .iter()
                                .filter(|a| a.qualifier.as_ref() == Some(q))
                                .cloned()
                                .map(Expr::AttributeReference)
                                .collect();
                            if matched.is_empty() {
                                return Err(QueryError::analysis(
                                    format!("cannot expand {q}.*"),
                                    child.tree_string(),
                                ));
                            }
                            expanded.extend(matched);
                        }
                        e => expanded.push(e.clone()),
                    }
                }
                Ok(Transformed::yes(LogicalPlan::Project(Project::new(
                    expanded,
                    child.clone(),
                ))))
            }
            _ => Ok(Transformed::no(plan)),
        })
    }
}

/// Look up `UnresolvedFunction`s once their arguments are resolved.
#[derive(Debug)]
pub struct ResolveFunctions {
    pub registry: Arc<FunctionRegistry>,
}

impl Rule<LogicalPlan> for ResolveFunctions {
    fn name(&self) -> &str {
        "ResolveFunctions"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            p if !p.children_resolved() => Ok(Transformed::no(p)),
            p => p.map_expressions(|expr| {
                expr.transform_up(|expr| match &expr {
                    Expr::UnresolvedFunction(UnresolvedFunction { name, arguments })
                        if arguments.iter().all(|a| a.resolved()) =>
                    {
                        let resolved = self.registry.lookup_function(name, arguments.clone())?;
                        Ok(Transformed::yes(resolved))
                    }
                    _ => Ok(Transformed::no(expr)),
                })
            }),
        })
    }
}

/// Name anonymous projection/aggregation columns positionally (`c0`,
/// `c1`, ...) so every output column has a stable attribute.
#[derive(Debug)]
pub struct AliasUnnamedExpressions;

fn alias_list(exprs: Vec<Expr>) -> (bool, Vec<Expr>) {
    let mut changed = false;
    let aliased = exprs
        .into_iter()
        .enumerate()
        .map(|(i, e)| match e {
            Expr::Alias(_) | Expr::AttributeReference(_) | Expr::UnresolvedAttribute(_) | Expr::Star(_) => e,
            e => {
                changed = true;
                e.alias(format!("c{i}"))
            }
        })
        .collect();
    (changed, aliased)
}

impl Rule<LogicalPlan> for AliasUnnamedExpressions {
    fn name(&self) -> &str {
        "AliasUnnamedExpressions"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match plan {
            LogicalPlan::Project(Project { project_list, child }) => {
                let (changed, project_list) = alias_list(project_list);
                Ok(Transformed::new_transformed(
                    LogicalPlan::Project(Project { project_list, child }),
                    changed,
                ))
            }
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }) => {
                let (changed, aggregate_exprs) = alias_list(aggregate_exprs);
                Ok(Transformed::new_transformed(
                    LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }),
                    changed,
                ))
            }
            p => Ok(Transformed::no(p)),
        })
    }
}

/// Turn a `Project` whose list contains aggregate calls into a
/// grouping-free `Aggregate`.
#[derive(Debug)]
pub struct GlobalAggregates;

impl Rule<LogicalPlan> for GlobalAggregates {
    fn name(&self) -> &str {
        "GlobalAggregates"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match &plan {
            LogicalPlan::Project(Project { project_list, child })
                if project_list.iter().any(|e| e.contains_aggregate()) =>
            {
                Ok(Transformed::yes(LogicalPlan::Aggregate(Aggregate::new(
                    vec![],
                    project_list.clone(),
                    child.clone(),
                ))))
            }
            _ => Ok(Transformed::no(plan)),
        })
    }
}

/// Materialize a `Generate` operator's output attributes from its
/// generator's element schema, using the user-provided column names
/// when present.
#[derive(Debug)]
pub struct ResolveGeneratorOutput;

impl Rule<LogicalPlan> for ResolveGeneratorOutput {
    fn name(&self) -> &str {
        "ResolveGeneratorOutput"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.transform_up(|plan| match &plan {
            LogicalPlan::Generate(g)
                if g.generator.resolved()
                    && (g.generator_output.is_empty()
                        || !g.generator_output.iter().all(|e| matches!(e, Expr::AttributeReference(_)))) =>
            {
                let Expr::Generator(generator) = &g.generator else {
                    return Err(QueryError::analysis(
                        format!("{} is not a generator", g.generator),
                        plan.tree_string(),
                    ));
                };
                let schema = generator.element_schema();
                if !g.generator_output.is_empty()
                    && g.generator_output.len() != schema.fields.len()
                {
                    return Err(QueryError::analysis(
                        format!(
                            "generator produces {} columns, {} names given",
                            schema.fields.len(),
                            g.generator_output.len()
                        ),
                        plan.tree_string(),
                    ));
                }
                let output = schema
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, field)| {
                        let name = match g.generator_output.get(i) {
                            Some(Expr::UnresolvedAttribute(u)) => {
                                u.name_parts.last().unwrap().clone()
                            }
                            _ => field.name.clone(),
                        };
                        Expr::AttributeReference(AttributeReference::new(
                            name,
                            field.data_type.clone(),
                            field.nullable,
                        ))
                    })
                    .collect();
                Ok(Transformed::yes(LogicalPlan::Generate(Generate {
                    generator: g.generator.clone(),
                    join: g.join,
                    outer: g.outer,
                    qualifier: g.qualifier.clone(),
                    generator_output: output,
                    child: g.child.clone(),
                })))
            }
            _ => Ok(Transformed::no(plan)),
        })
    }
}

/// Enforce the aggregation typing rule: inside an `Aggregate`, a
/// subexpression of an output column that is not under an aggregate
/// call must match one of the grouping expressions.
#[derive(Debug)]
pub struct CheckAggregates;

fn check_aggregate_expr(e: &Expr, grouping: &[Expr]) -> Result<()> {
    match e {
        Expr::AggregateFunction(_) | Expr::TypedAggregateFunction(_) => Ok(()),
        e if grouping.contains(e) => Ok(()),
        Expr::AttributeReference(_) => Err(QueryError::NonGroupingReference {
            expr: e.to_string(),
            grouping: grouping.iter().map(|g| g.to_string()).join(", "),
        }),
        Expr::Alias(a) => check_aggregate_expr(&a.child, grouping),
        e => {
            for child in e.children() {
                check_aggregate_expr(child, grouping)?;
            }
            Ok(())
        }
    }
}

impl Rule<LogicalPlan> for CheckAggregates {
    fn name(&self) -> &str {
        "CheckAggregates"
    }

    fn apply(&self, plan: LogicalPlan) -> Result<Transformed<LogicalPlan>> {
        plan.apply(|p| {
            if let LogicalPlan::Aggregate(agg) = p {
                if p.resolved() {
                    for e in &agg.aggregate_exprs {
                        check_aggregate_expr(e, &agg.grouping_exprs)?;
                    }
                }
            }
            Ok(crate::tree_node::TreeNodeRecursion::Continue)
        })?;
        Ok(Transformed::no(plan))
    }
}
