use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::data::GenericRow;
use crate::expr::{AttributeReference, Expr};
use crate::logical_plan::SortOrder;
use crate::{QueryError, Result};

/// Lazy per-partition stream of rows. Evaluation errors surface
/// through the item type so operators stay composable.
pub type RowIterator = Box<dyn Iterator<Item = Result<GenericRow>>>;

/// An executable operator. `execute` returns one row iterator per
/// partition; inside a partition the operator is the only reader.
/// Exchange is the single operator that moves rows across partition
/// boundaries.
pub trait PhysicalPlan: Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn name(&self) -> &'static str;

    fn output(&self) -> Vec<AttributeReference>;

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>>;

    fn with_new_children(&self, children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>>;

    /// What each child's partitioning must provide before this operator
    /// can run. The planner inserts exchanges where the requirement is
    /// not met.
    fn required_child_distribution(&self) -> Vec<Distribution> {
        vec![Distribution::Unspecified; self.children().len()]
    }

    /// How this operator's own output is partitioned.
    fn output_partitioning(&self) -> Partitioning;

    fn execute(&self) -> Result<Vec<RowIterator>>;

    fn simple_string(&self) -> String {
        self.name().to_string()
    }
}

/// Guard used by `with_new_children` implementations.
pub fn check_arity(name: &str, expected: usize, children: &[Arc<dyn PhysicalPlan>]) -> Result<()> {
    if children.len() != expected {
        return Err(QueryError::TreeShapeMismatch {
            node: name.to_string(),
            expected,
            actual: children.len(),
        });
    }
    Ok(())
}

/// Indented multi-line rendering of a physical operator tree.
pub fn tree_string(plan: &dyn PhysicalPlan) -> String {
    fn build(plan: &dyn PhysicalPlan, depth: usize, out: &mut String) {
        out.push_str(&" ".repeat(depth * 2));
        out.push_str(&plan.simple_string());
        out.push('\n');
        for child in plan.children() {
            build(child.as_ref(), depth + 1, out);
        }
    }
    let mut out = String::new();
    build(plan, 0, &mut out);
    out
}

/// Requirement on the placement of rows across partitions.
#[derive(Clone, Debug, PartialEq)]
pub enum Distribution {
    /// Any placement will do.
    Unspecified,
    /// Every row in a single partition.
    AllTuples,
    /// Rows sharing a key tuple share a partition.
    Clustered(Vec<Expr>),
    /// Rows laid out in the given order across partitions.
    Ordered(Vec<SortOrder>),
}

/// How an operator's output rows are actually spread over partitions.
#[derive(Clone, Debug, PartialEq)]
pub enum Partitioning {
    Unknown(usize),
    Hash(Vec<Expr>, usize),
    Range(Vec<SortOrder>, usize),
    Single,
}

impl Partitioning {
    pub fn num_partitions(&self) -> usize {
        match self {
            Partitioning::Unknown(n) | Partitioning::Hash(_, n) | Partitioning::Range(_, n) => *n,
            Partitioning::Single => 1,
        }
    }

    /// Whether data laid out like `self` meets `required`.
    pub fn satisfies(&self, required: &Distribution) -> bool {
        match required {
            Distribution::Unspecified => true,
            Distribution::AllTuples => matches!(self, Partitioning::Single),
            Distribution::Clustered(keys) => match self {
                Partitioning::Single => true,
                Partitioning::Hash(exprs, _) => exprs == keys,
                _ => false,
            },
            Distribution::Ordered(orders) => match self {
                Partitioning::Single => true,
                Partitioning::Range(r, _) => r == orders,
                _ => false,
            },
        }
    }
}

/// Drain one partition into memory.
pub fn collect_partition(iter: RowIterator) -> Result<Vec<GenericRow>> {
    iter.collect()
}

/// Drain every partition of a plan, in partition order.
pub fn collect(plan: &dyn PhysicalPlan) -> Result<Vec<GenericRow>> {
    let mut rows = Vec::new();
    for partition in plan.execute()? {
        rows.extend(collect_partition(partition)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::AttributeReference;
    use crate::types::DataType;

    fn key() -> Vec<Expr> {
        vec![Expr::AttributeReference(AttributeReference::new("k", DataType::Int, true))]
    }

    #[test]
    fn test_partitioning_satisfies() {
        let keys = key();
        assert!(Partitioning::Single.satisfies(&Distribution::AllTuples));
        assert!(Partitioning::Single.satisfies(&Distribution::Clustered(keys.clone())));
        assert!(Partitioning::Hash(keys.clone(), 4).satisfies(&Distribution::Clustered(keys.clone())));
        assert!(!Partitioning::Hash(keys.clone(), 4).satisfies(&Distribution::AllTuples));
        assert!(!Partitioning::Unknown(4).satisfies(&Distribution::Clustered(keys.clone())));
        assert!(Partitioning::Unknown(4).satisfies(&Distribution::Unspecified));
        let other = vec![Expr::AttributeReference(AttributeReference::new(
            "z",
            DataType::Int,
            true,
        ))];
        assert!(!Partitioning::Hash(other, 4).satisfies(&Distribution::Clustered(keys)));
    }
}
