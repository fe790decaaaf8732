use crate::expr::Expr;
use crate::logical_plan::*;
use crate::tree_node::{Transformed, TreeNode, TreeNodeContainer, TreeNodeRecursion};
use crate::Result;

impl TreeNode for LogicalPlan {
    fn apply_children<'n, F: FnMut(&'n Self) -> Result<TreeNodeRecursion>>(
        &'n self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        for x in self.children() {
            if f(x)? == TreeNodeRecursion::Stop {
                return Ok(TreeNodeRecursion::Stop);
            }
        }
        Ok(TreeNodeRecursion::Continue)
    }

    fn map_children<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        Ok(match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::Relation(_)
            | LogicalPlan::LocalRelation(_)
            | LogicalPlan::OneRowRelation => Transformed::no(self),
            LogicalPlan::SubqueryAlias(SubqueryAlias { alias, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::SubqueryAlias(SubqueryAlias { alias, child })),
            LogicalPlan::Project(Project { project_list, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Project(Project { project_list, child })),
            LogicalPlan::Filter(Filter { condition, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Filter(Filter { condition, child })),
            LogicalPlan::Join(Join { left, right, join_type, condition }) => (left, right)
                .map_elements(&mut f)?
                .update_data(|(left, right)| {
                    LogicalPlan::Join(Join { left, right, join_type, condition })
                }),
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }) => child
                .map_elements(f)?
                .update_data(|child| {
                    LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child })
                }),
            LogicalPlan::Sort(Sort { order, global, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Sort(Sort { order, global, child })),
            LogicalPlan::Limit(Limit { n, child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Limit(Limit { n, child })),
            LogicalPlan::Union(Union { children }) => children
                .map_elements(&mut f)?
                .update_data(|children| LogicalPlan::Union(Union { children })),
            LogicalPlan::Distinct(Distinct { child }) => child
                .map_elements(f)?
                .update_data(|child| LogicalPlan::Distinct(Distinct { child })),
            LogicalPlan::Generate(Generate { generator, join, outer, qualifier, generator_output, child }) => {
                child.map_elements(f)?.update_data(|child| {
                    LogicalPlan::Generate(Generate {
                        generator,
                        join,
                        outer,
                        qualifier,
                        generator_output,
                        child,
                    })
                })
            }
            LogicalPlan::InsertInto(InsertInto { table, partition_spec, overwrite, child }) => child
                .map_elements(f)?
                .update_data(|child| {
                    LogicalPlan::InsertInto(InsertInto { table, partition_spec, overwrite, child })
                }),
        })
    }
}

impl LogicalPlan {
    /// Rewrite the operator's own top-level expressions with `f`. Does
    /// not recurse into children or into the expressions themselves.
    pub fn map_expressions<F: FnMut(Expr) -> Result<Transformed<Expr>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        Ok(match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::Relation(_)
            | LogicalPlan::LocalRelation(_)
            | LogicalPlan::OneRowRelation
            | LogicalPlan::SubqueryAlias(_)
            | LogicalPlan::Limit(_)
            | LogicalPlan::Union(_)
            | LogicalPlan::Distinct(_)
            | LogicalPlan::InsertInto(_) => Transformed::no(self),
            LogicalPlan::Project(Project { project_list, child }) => project_list
                .map_elements(f)?
                .update_data(|project_list| LogicalPlan::Project(Project { project_list, child })),
            LogicalPlan::Filter(Filter { condition, child }) => {
                f(condition)?.update_data(|condition| LogicalPlan::Filter(Filter { condition, child }))
            }
            LogicalPlan::Join(Join { left, right, join_type, condition }) => condition
                .map_elements(f)?
                .update_data(|condition| {
                    LogicalPlan::Join(Join { left, right, join_type, condition })
                }),
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child }) => {
                (grouping_exprs, aggregate_exprs)
                    .map_elements(&mut f)?
                    .update_data(|(grouping_exprs, aggregate_exprs)| {
                        LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, child })
                    })
            }
            LogicalPlan::Sort(Sort { order, global, child }) => {
                let mut transformed = false;
                let mut new_order = Vec::with_capacity(order.len());
                for SortOrder { expr, direction } in order {
                    let t = f(expr)?;
                    transformed |= t.transformed;
                    new_order.push(SortOrder { expr: t.data, direction });
                }
                Transformed::new_transformed(
                    LogicalPlan::Sort(Sort { order: new_order, global, child }),
                    transformed,
                )
            }
            LogicalPlan::Generate(Generate { generator, join, outer, qualifier, generator_output, child }) => {
                f(generator)?.update_data(|generator| {
                    LogicalPlan::Generate(Generate {
                        generator,
                        join,
                        outer,
                        qualifier,
                        generator_output,
                        child,
                    })
                })
            }
        })
    }

    /// Post-order rewrite of every expression in every operator of the
    /// plan.
    pub fn transform_up_expressions<F: FnMut(Expr) -> Result<Transformed<Expr>> + Copy>(
        self,
        f: F,
    ) -> Result<Transformed<Self>> {
        self.transform_up(|plan| plan.map_expressions(|expr| expr.transform_up(f)))
    }
}
