use std::any::Any;
use std::sync::Arc;

use log::debug;

use crate::catalog::Catalog;
use crate::expr::{AttributeReference, BinaryOperator, Expr};
use crate::logical_plan::{self as logical, JoinType, LogicalPlan};
use crate::physical_plan::aggregate::{Aggregate, AggregateMode};
use crate::physical_plan::basic::{Filter, Limit, Project, Sort, Union};
use crate::physical_plan::exchange::Exchange;
use crate::physical_plan::generate::Generate;
use crate::physical_plan::joins::{BroadcastNestedLoopJoin, CartesianProduct, HashEquiJoin};
use crate::physical_plan::scan::{LocalTableScan, TableScan};
use crate::physical_plan::sink::InsertIntoTable;
use crate::physical_plan::{check_arity, Distribution, Partitioning, PhysicalPlan, RowIterator};
use crate::{Operator, QueryError, Result};

/// Split a conjunction into its parts.
pub fn split_conjunctive_predicates(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::BinaryOperator(BinaryOperator { left, op: Operator::And, right }) => {
            let mut parts = split_conjunctive_predicates(left);
            parts.extend(split_conjunctive_predicates(right));
            parts
        }
        e => vec![e.clone()],
    }
}

/// Rebuild a conjunction; `None` for an empty list.
pub fn combine_conjuncts(mut predicates: Vec<Expr>) -> Option<Expr> {
    if predicates.is_empty() {
        return None;
    }
    let first = predicates.remove(0);
    Some(predicates.into_iter().fold(first, |acc, p| acc.and(p)))
}

fn references_subset(expr: &Expr, attrs: &[AttributeReference]) -> bool {
    expr.references().iter().all(|r| attrs.iter().any(|a| a.expr_id == r.expr_id))
}

/// Placeholder for a child the emitting strategy chose not to plan;
/// the planner replaces it by planning the wrapped logical subtree.
#[derive(Debug)]
pub struct PlanLater {
    pub plan: LogicalPlan,
}

impl PlanLater {
    fn arc(plan: &LogicalPlan) -> Arc<dyn PhysicalPlan> {
        Arc::new(PlanLater { plan: plan.clone() })
    }
}

impl PhysicalPlan for PlanLater {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "PlanLater"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.plan.output()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![]
    }

    fn with_new_children(&self, children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 0, &children)?;
        Ok(Arc::new(PlanLater { plan: self.plan.clone() }))
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::Unknown(1)
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        Err(QueryError::internal("PlanLater placeholder survived planning"))
    }
}

/// A partial mapping from one logical operator to physical candidates.
/// Children a strategy does not want to handle are wrapped in
/// [`PlanLater`]. An empty candidate list means "not applicable".
pub trait Strategy: std::fmt::Debug {
    fn name(&self) -> &str;

    fn apply(&self, plan: &LogicalPlan, planner: &QueryPlanner)
        -> Result<Vec<Arc<dyn PhysicalPlan>>>;
}

/// Maps an optimized logical plan to an executable physical plan:
/// strategies are tried in priority order per node, the first
/// candidate wins, and a final pass inserts exchanges wherever a
/// child's partitioning does not satisfy its parent's requirement.
#[derive(Debug)]
pub struct QueryPlanner {
    pub catalog: Arc<dyn Catalog>,
    pub num_partitions: usize,
    strategies: Vec<Box<dyn Strategy>>,
}

impl QueryPlanner {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self::with_partitions(catalog, 2)
    }

    pub fn with_partitions(catalog: Arc<dyn Catalog>, num_partitions: usize) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(DataSinks),
            Box::new(TableScans),
            Box::new(PartitionPruning),
            Box::new(EquiJoin),
            Box::new(Aggregation),
            Box::new(BroadcastNestedLoopJoins),
            Box::new(CartesianProducts),
            Box::new(BasicOperators),
        ];
        Self { catalog, num_partitions, strategies }
    }

    pub fn plan(&self, plan: &LogicalPlan) -> Result<Arc<dyn PhysicalPlan>> {
        let physical = self.plan_node(plan)?;
        self.ensure_requirements(physical)
    }

    /// Plan one node through the strategy list and then recursively
    /// replace the `PlanLater` placeholders it left behind.
    pub fn plan_node(&self, plan: &LogicalPlan) -> Result<Arc<dyn PhysicalPlan>> {
        for strategy in &self.strategies {
            let mut candidates = strategy.apply(plan, self)?;
            if !candidates.is_empty() {
                debug!("strategy {} planned {}", strategy.name(), plan.node_name());
                let candidate = candidates.remove(0);
                return self.resolve_plan_later(candidate);
            }
        }
        Err(QueryError::Plan(format!("no strategy can plan:\n{}", plan.tree_string())))
    }

    fn resolve_plan_later(&self, plan: Arc<dyn PhysicalPlan>) -> Result<Arc<dyn PhysicalPlan>> {
        if let Some(later) = plan.as_any().downcast_ref::<PlanLater>() {
            return self.plan_node(&later.plan);
        }
        let children = plan.children();
        if children.is_empty() {
            return Ok(plan);
        }
        let new_children = children
            .into_iter()
            .map(|c| self.resolve_plan_later(c))
            .collect::<Result<Vec<_>>>()?;
        plan.with_new_children(new_children)
    }

    /// Insert exchanges under operators whose children do not satisfy
    /// their required distribution. Co-clustered operators (joins)
    /// additionally need matching partition counts on the clustered
    /// sides, so a repartition of one side forces the other.
    fn ensure_requirements(&self, plan: Arc<dyn PhysicalPlan>) -> Result<Arc<dyn PhysicalPlan>> {
        let children = plan
            .children()
            .into_iter()
            .map(|c| self.ensure_requirements(c))
            .collect::<Result<Vec<_>>>()?;
        if children.is_empty() {
            return Ok(plan);
        }
        let required = plan.required_child_distribution();
        let needs: Vec<bool> = children
            .iter()
            .zip(required.iter())
            .map(|(c, r)| !c.output_partitioning().satisfies(r))
            .collect();

        let clustered: Vec<usize> = required
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Distribution::Clustered(_)))
            .map(|(i, _)| i)
            .collect();
        let mut force_clustered = false;
        if clustered.len() >= 2 {
            let any_exchange = clustered.iter().any(|i| needs[*i]);
            let counts: Vec<usize> = clustered
                .iter()
                .map(|i| children[*i].output_partitioning().num_partitions())
                .collect();
            let mismatched = counts.windows(2).any(|w| w[0] != w[1]);
            force_clustered = any_exchange || mismatched;
        }

        let mut new_children = Vec::with_capacity(children.len());
        for (i, (child, req)) in children.into_iter().zip(required.iter()).enumerate() {
            let exchange_needed =
                needs[i] || (force_clustered && matches!(req, Distribution::Clustered(_)));
            if exchange_needed {
                new_children.push(Exchange::for_distribution(req, self.num_partitions, child)?);
            } else {
                new_children.push(child);
            }
        }
        plan.with_new_children(new_children)
    }
}

/// Write operators come first so nothing else claims their shape.
#[derive(Debug)]
struct DataSinks;

impl Strategy for DataSinks {
    fn name(&self) -> &str {
        "DataSinks"
    }

    fn apply(&self, plan: &LogicalPlan, planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        match plan {
            LogicalPlan::InsertInto(insert) => {
                let table = planner.catalog.lookup_table(&insert.table)?;
                Ok(vec![Arc::new(InsertIntoTable::new(
                    table,
                    insert.partition_spec.clone(),
                    insert.overwrite,
                    PlanLater::arc(&insert.child),
                ))])
            }
            _ => Ok(vec![]),
        }
    }
}

/// Scans, with projection push-through when the projection above the
/// relation is only bare attributes.
#[derive(Debug)]
struct TableScans;

impl Strategy for TableScans {
    fn name(&self) -> &str {
        "TableScans"
    }

    fn apply(&self, plan: &LogicalPlan, planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        match plan {
            LogicalPlan::Project(logical::Project { project_list, child })
                if matches!(child.as_ref(), LogicalPlan::Relation(_))
                    && project_list.iter().all(|e| matches!(e, Expr::AttributeReference(_))) =>
            {
                let LogicalPlan::Relation(relation) = child.as_ref() else { unreachable!() };
                let table = planner.catalog.lookup_table(&relation.name)?;
                let narrowed = project_list
                    .iter()
                    .map(|e| e.to_attribute().unwrap())
                    .collect::<Vec<_>>();
                Ok(vec![Arc::new(TableScan::new(table, narrowed, None)?)])
            }
            LogicalPlan::Relation(relation) => {
                let table = planner.catalog.lookup_table(&relation.name)?;
                Ok(vec![Arc::new(TableScan::new(table, relation.output.clone(), None)?)])
            }
            _ => Ok(vec![]),
        }
    }
}

/// A filter over a partitioned relation splits into a pruning
/// predicate on the partition columns (pushed into the scan) and a
/// residual row filter.
#[derive(Debug)]
struct PartitionPruning;

impl Strategy for PartitionPruning {
    fn name(&self) -> &str {
        "PartitionPruning"
    }

    fn apply(&self, plan: &LogicalPlan, planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        let LogicalPlan::Filter(logical::Filter { condition, child }) = plan else {
            return Ok(vec![]);
        };
        let LogicalPlan::Relation(relation) = child.as_ref() else { return Ok(vec![]) };
        if relation.partition_cols.is_empty() {
            return Ok(vec![]);
        }
        let partition_attrs: Vec<AttributeReference> = relation
            .output
            .iter()
            .filter(|a| relation.partition_cols.contains(&a.name))
            .cloned()
            .collect();
        let (pruning, residual): (Vec<Expr>, Vec<Expr>) = split_conjunctive_predicates(condition)
            .into_iter()
            .partition(|p| references_subset(p, &partition_attrs));
        if pruning.is_empty() {
            return Ok(vec![]);
        }
        let table = planner.catalog.lookup_table(&relation.name)?;
        let scan: Arc<dyn PhysicalPlan> = Arc::new(TableScan::new(
            table,
            relation.output.clone(),
            combine_conjuncts(pruning),
        )?);
        Ok(vec![match combine_conjuncts(residual) {
            Some(residual) => Arc::new(Filter::new(residual, scan)),
            None => scan,
        }])
    }
}

/// Inner joins with at least one `left-side = right-side` conjunct
/// become a hash join on the extracted keys, the remaining conjuncts
/// staying behind in a filter above it.
#[derive(Debug)]
struct EquiJoin;

impl Strategy for EquiJoin {
    fn name(&self) -> &str {
        "EquiJoin"
    }

    fn apply(&self, plan: &LogicalPlan, _planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        let LogicalPlan::Join(join) = plan else { return Ok(vec![]) };
        if join.join_type != JoinType::Inner {
            return Ok(vec![]);
        }
        let Some(condition) = &join.condition else { return Ok(vec![]) };
        let left_output = join.left.output();
        let right_output = join.right.output();
        let mut left_keys = Vec::new();
        let mut right_keys = Vec::new();
        let mut others = Vec::new();
        for predicate in split_conjunctive_predicates(condition) {
            match &predicate {
                Expr::BinaryOperator(BinaryOperator { left, op: Operator::Eq, right }) => {
                    if references_subset(left, &left_output)
                        && references_subset(right, &right_output)
                    {
                        left_keys.push(left.as_ref().clone());
                        right_keys.push(right.as_ref().clone());
                    } else if references_subset(left, &right_output)
                        && references_subset(right, &left_output)
                    {
                        left_keys.push(right.as_ref().clone());
                        right_keys.push(left.as_ref().clone());
                    } else {
                        others.push(predicate);
                    }
                }
                _ => others.push(predicate),
            }
        }
        if left_keys.is_empty() {
            return Ok(vec![]);
        }
        let hash_join: Arc<dyn PhysicalPlan> = Arc::new(HashEquiJoin::new(
            left_keys,
            right_keys,
            PlanLater::arc(&join.left),
            PlanLater::arc(&join.right),
        ));
        Ok(vec![match combine_conjuncts(others) {
            Some(residual) => Arc::new(Filter::new(residual, hash_join)),
            None => hash_join,
        }])
    }
}

/// Two-level aggregation whenever every aggregate decomposes into
/// partials; otherwise a single clustered aggregate.
#[derive(Debug)]
struct Aggregation;

impl Strategy for Aggregation {
    fn name(&self) -> &str {
        "Aggregation"
    }

    fn apply(&self, plan: &LogicalPlan, _planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        let LogicalPlan::Aggregate(aggregate) = plan else { return Ok(vec![]) };
        let (group_exprs, agg_exprs, result_exprs, child) = aggregate.extract_exprs();
        let partial_supported =
            agg_exprs.iter().all(|e| matches!(e, Expr::AggregateFunction(_)));
        if partial_supported {
            let partial = Arc::new(Aggregate::new(
                AggregateMode::Partial,
                group_exprs.clone(),
                agg_exprs.clone(),
                vec![],
                PlanLater::arc(&child),
            ));
            let final_group = group_exprs
                .iter()
                .map(|e| Ok(Expr::AttributeReference(e.to_attribute()?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(vec![Arc::new(Aggregate::new(
                AggregateMode::Final,
                final_group,
                agg_exprs,
                result_exprs,
                partial,
            ))])
        } else {
            Ok(vec![Arc::new(Aggregate::new(
                AggregateMode::Complete,
                group_exprs,
                agg_exprs,
                result_exprs,
                PlanLater::arc(&child),
            ))])
        }
    }
}

/// Joins with no usable equi-predicate: broadcast one side, stream the
/// other. Also the only strategy handling outer joins.
#[derive(Debug)]
struct BroadcastNestedLoopJoins;

impl Strategy for BroadcastNestedLoopJoins {
    fn name(&self) -> &str {
        "BroadcastNestedLoopJoins"
    }

    fn apply(&self, plan: &LogicalPlan, _planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        let LogicalPlan::Join(join) = plan else { return Ok(vec![]) };
        if join.join_type == JoinType::Inner && join.condition.is_none() {
            return Ok(vec![]);
        }
        Ok(vec![Arc::new(BroadcastNestedLoopJoin::new(
            join.join_type,
            join.condition.clone(),
            PlanLater::arc(&join.left),
            PlanLater::arc(&join.right),
        ))])
    }
}

/// A join with no condition at all.
#[derive(Debug)]
struct CartesianProducts;

impl Strategy for CartesianProducts {
    fn name(&self) -> &str {
        "CartesianProducts"
    }

    fn apply(&self, plan: &LogicalPlan, _planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        match plan {
            LogicalPlan::Join(join) if join.condition.is_none() => {
                Ok(vec![Arc::new(CartesianProduct::new(
                    PlanLater::arc(&join.left),
                    PlanLater::arc(&join.right),
                ))])
            }
            _ => Ok(vec![]),
        }
    }
}

/// One-to-one mappings for the remaining operators.
#[derive(Debug)]
struct BasicOperators;

impl Strategy for BasicOperators {
    fn name(&self) -> &str {
        "BasicOperators"
    }

    fn apply(&self, plan: &LogicalPlan, planner: &QueryPlanner) -> Result<Vec<Arc<dyn PhysicalPlan>>> {
        Ok(match plan {
            LogicalPlan::Project(p) => vec![Arc::new(Project::new(
                p.project_list.clone(),
                PlanLater::arc(&p.child),
            ))],
            LogicalPlan::Filter(f) => {
                vec![Arc::new(Filter::new(f.condition.clone(), PlanLater::arc(&f.child)))]
            }
            LogicalPlan::Sort(s) => {
                vec![Arc::new(Sort::new(s.order.clone(), s.global, PlanLater::arc(&s.child)))]
            }
            LogicalPlan::Limit(l) => vec![Arc::new(Limit::new(l.n, PlanLater::arc(&l.child)))],
            LogicalPlan::Union(u) => {
                let children = u.children.iter().map(|c| PlanLater::arc(c)).collect();
                vec![Arc::new(Union::new(children))]
            }
            LogicalPlan::Distinct(d) => {
                // distinct is a grouping-only aggregate over the output
                let attrs: Vec<Expr> = d
                    .child
                    .output()
                    .into_iter()
                    .map(Expr::AttributeReference)
                    .collect();
                vec![Arc::new(Aggregate::new(
                    AggregateMode::Complete,
                    attrs.clone(),
                    vec![],
                    attrs,
                    PlanLater::arc(&d.child),
                ))]
            }
            LogicalPlan::Generate(g) => vec![Arc::new(Generate::new(
                g.generator.clone(),
                g.join,
                g.outer,
                g.qualified_generator_output(),
                PlanLater::arc(&g.child),
            ))],
            LogicalPlan::LocalRelation(l) => {
                vec![Arc::new(LocalTableScan::new(l.output.clone(), l.rows.clone()))]
            }
            LogicalPlan::OneRowRelation => vec![Arc::new(LocalTableScan::one_empty_row())],
            LogicalPlan::SubqueryAlias(_) => {
                return Err(QueryError::Plan(
                    "subquery alias survived optimization".to_string(),
                ));
            }
            LogicalPlan::UnresolvedRelation(r) => {
                return Err(QueryError::RelationNotFound(r.name.clone()));
            }
            _ => vec![],
        })
    }
}
