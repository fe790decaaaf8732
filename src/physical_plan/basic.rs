use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

use itertools::Itertools;

use crate::data::{GenericRow, Row};
use crate::expr::{AttributeReference, BoundReference, Expr};
use crate::logical_plan::{SortDirection, SortOrder};
use crate::physical_expr::{create_physical_expr, PhysicalExpr, Projection};
use crate::physical_plan::{
    check_arity, collect_partition, Distribution, Partitioning, PhysicalPlan, RowIterator,
};
use crate::Result;

/// Evaluates a projection list over each input row.
#[derive(Debug)]
pub struct Project {
    pub project_list: Vec<Expr>,
    pub child: Arc<dyn PhysicalPlan>,
}

impl Project {
    pub fn new(project_list: Vec<Expr>, child: Arc<dyn PhysicalPlan>) -> Self {
        Self { project_list, child }
    }
}

impl PhysicalPlan for Project {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Project"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.project_list.iter().map(|e| e.to_attribute().unwrap()).collect()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(Project::new(self.project_list.clone(), children.remove(0))))
    }

    fn output_partitioning(&self) -> Partitioning {
        self.child.output_partitioning()
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let projection = Arc::new(Projection::new_with_input_attrs(
            self.project_list.clone(),
            self.child.output(),
        )?);
        let partitions = self
            .child
            .execute()?
            .into_iter()
            .map(|partition| {
                let projection = projection.clone();
                Box::new(partition.map(move |row| projection.apply(&row?))) as RowIterator
            })
            .collect();
        Ok(partitions)
    }

    fn simple_string(&self) -> String {
        format!("Project [{}]", self.project_list.iter().map(|e| e.to_string()).join(", "))
    }
}

/// Keeps rows for which the predicate evaluates to true; false and
/// null (three-valued logic) both drop the row.
#[derive(Debug)]
pub struct Filter {
    pub condition: Expr,
    pub child: Arc<dyn PhysicalPlan>,
}

impl Filter {
    pub fn new(condition: Expr, child: Arc<dyn PhysicalPlan>) -> Self {
        Self { condition, child }
    }
}

impl PhysicalPlan for Filter {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Filter"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.child.output()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(Filter::new(self.condition.clone(), children.remove(0))))
    }

    fn output_partitioning(&self) -> Partitioning {
        self.child.output_partitioning()
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let bound =
            BoundReference::bind_reference(self.condition.clone(), &[self.child.output()])?;
        let predicate: Arc<dyn PhysicalExpr> = create_physical_expr(&bound)?;
        let partitions = self
            .child
            .execute()?
            .into_iter()
            .map(|partition| {
                let predicate = predicate.clone();
                Box::new(partition.filter_map(move |row| match row {
                    Ok(row) => match predicate.eval(&row) {
                        Ok(v) if v.is_true() => Some(Ok(row)),
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    },
                    Err(e) => Some(Err(e)),
                })) as RowIterator
            })
            .collect();
        Ok(partitions)
    }

    fn simple_string(&self) -> String {
        format!("Filter [{}]", self.condition)
    }
}

/// First `n` rows. Requires all tuples in one partition, so a gather
/// exchange precedes it in any multi-partition plan.
#[derive(Debug)]
pub struct Limit {
    pub n: usize,
    pub child: Arc<dyn PhysicalPlan>,
}

impl Limit {
    pub fn new(n: usize, child: Arc<dyn PhysicalPlan>) -> Self {
        Self { n, child }
    }
}

impl PhysicalPlan for Limit {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Limit"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.child.output()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(Limit::new(self.n, children.remove(0))))
    }

    fn required_child_distribution(&self) -> Vec<Distribution> {
        vec![Distribution::AllTuples]
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::Single
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let mut partitions = self.child.execute()?;
        let first = partitions.remove(0);
        Ok(vec![Box::new(first.take(self.n))])
    }

    fn simple_string(&self) -> String {
        format!("Limit {}", self.n)
    }
}

/// Compare two rows under a sort order; nulls sort first ascending.
pub(crate) fn compare_rows(a: &GenericRow, b: &GenericRow, directions: &[SortDirection]) -> Ordering {
    use crate::data::Row;
    for (i, direction) in directions.iter().enumerate() {
        let (va, vb) = (a.get(i), b.get(i));
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => va.partial_cmp(vb).unwrap_or(Ordering::Equal),
        };
        let ord = match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Sorts each partition. For a global ordering the planner places a
/// range-partitioning exchange underneath, making the partition-local
/// sort a total one.
#[derive(Debug)]
pub struct Sort {
    pub order: Vec<SortOrder>,
    pub global: bool,
    pub child: Arc<dyn PhysicalPlan>,
}

impl Sort {
    pub fn new(order: Vec<SortOrder>, global: bool, child: Arc<dyn PhysicalPlan>) -> Self {
        Self { order, global, child }
    }
}

impl PhysicalPlan for Sort {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Sort"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.child.output()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(Sort::new(self.order.clone(), self.global, children.remove(0))))
    }

    fn required_child_distribution(&self) -> Vec<Distribution> {
        if self.global {
            vec![Distribution::Ordered(self.order.clone())]
        } else {
            vec![Distribution::Unspecified]
        }
    }

    fn output_partitioning(&self) -> Partitioning {
        self.child.output_partitioning()
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let key_exprs = BoundReference::bind_references(
            self.order.iter().map(|o| o.expr.clone()).collect(),
            &[self.child.output()],
        )?;
        let keys: Vec<Arc<dyn PhysicalExpr>> =
            key_exprs.iter().map(create_physical_expr).collect::<Result<_>>()?;
        let directions: Vec<SortDirection> = self.order.iter().map(|o| o.direction).collect();
        let mut partitions: Vec<RowIterator> = Vec::new();
        for partition in self.child.execute()? {
            let rows = collect_partition(partition)?;
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let mut key = GenericRow::new_with_size(keys.len());
                for (i, k) in keys.iter().enumerate() {
                    key.update(i, k.eval(&row)?);
                }
                keyed.push((key, row));
            }
            keyed.sort_by(|(ka, _), (kb, _)| compare_rows(ka, kb, &directions));
            partitions.push(Box::new(keyed.into_iter().map(|(_, row)| Ok(row))));
        }
        Ok(partitions)
    }

    fn simple_string(&self) -> String {
        let order = self
            .order
            .iter()
            .map(|o| format!("{} {:?}", o.expr, o.direction))
            .join(", ");
        format!("Sort [{order}] global={}", self.global)
    }
}

/// Concatenation of the children's partitions.
#[derive(Debug)]
pub struct Union {
    pub children: Vec<Arc<dyn PhysicalPlan>>,
}

impl Union {
    pub fn new(children: Vec<Arc<dyn PhysicalPlan>>) -> Self {
        Self { children }
    }
}

impl PhysicalPlan for Union {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Union"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.children[0].output()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        self.children.clone()
    }

    fn with_new_children(&self, children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), self.children.len(), &children)?;
        Ok(Arc::new(Union::new(children)))
    }

    fn output_partitioning(&self) -> Partitioning {
        let n = self.children.iter().map(|c| c.output_partitioning().num_partitions()).sum();
        Partitioning::Unknown(n)
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let mut partitions = Vec::new();
        for child in &self.children {
            partitions.extend(child.execute()?);
        }
        Ok(partitions)
    }
}
