use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;

use crate::data::{GenericRow, Row};
use crate::expr::{AttributeReference, BoundReference};
use crate::logical_plan::SortDirection;
use crate::physical_expr::{create_physical_expr, PhysicalExpr};
use crate::physical_plan::basic::compare_rows;
use crate::physical_plan::{
    check_arity, collect_partition, Distribution, Partitioning, PhysicalPlan, RowIterator,
};
use crate::{QueryError, Result};

/// The one operator that moves rows between partitions: hash
/// repartitioning for clustered requirements, a gather for all-tuples
/// requirements, and a range partition (sorted split) for ordered
/// requirements.
#[derive(Debug)]
pub struct Exchange {
    pub partitioning: Partitioning,
    pub child: Arc<dyn PhysicalPlan>,
}

impl Exchange {
    pub fn new(partitioning: Partitioning, child: Arc<dyn PhysicalPlan>) -> Self {
        Self { partitioning, child }
    }

    /// The exchange that makes `child` meet `required`.
    pub fn for_distribution(
        required: &Distribution,
        num_partitions: usize,
        child: Arc<dyn PhysicalPlan>,
    ) -> Result<Arc<dyn PhysicalPlan>> {
        let partitioning = match required {
            Distribution::AllTuples => Partitioning::Single,
            Distribution::Clustered(keys) => Partitioning::Hash(keys.clone(), num_partitions),
            Distribution::Ordered(orders) => Partitioning::Range(orders.clone(), num_partitions),
            Distribution::Unspecified => {
                return Err(QueryError::internal("no exchange needed for Unspecified"));
            }
        };
        Ok(Arc::new(Exchange::new(partitioning, child)))
    }

    fn gather(&self) -> Result<Vec<Vec<GenericRow>>> {
        let mut rows = Vec::new();
        for partition in self.child.execute()? {
            rows.extend(collect_partition(partition)?);
        }
        Ok(vec![rows])
    }

    fn hash_repartition(&self, keys: &[crate::expr::Expr], n: usize) -> Result<Vec<Vec<GenericRow>>> {
        let bound = BoundReference::bind_references(keys.to_vec(), &[self.child.output()])?;
        let key_exprs: Vec<Arc<dyn PhysicalExpr>> =
            bound.iter().map(create_physical_expr).collect::<Result<_>>()?;
        let mut buckets: Vec<Vec<GenericRow>> = (0..n).map(|_| Vec::new()).collect();
        for partition in self.child.execute()? {
            for row in partition {
                let row = row?;
                let mut hasher = AHasher::default();
                for expr in &key_exprs {
                    expr.eval(&row)?.hash(&mut hasher);
                }
                let bucket = (hasher.finish() as usize) % n;
                buckets[bucket].push(row);
            }
        }
        Ok(buckets)
    }

    fn range_repartition(
        &self,
        orders: &[crate::logical_plan::SortOrder],
        n: usize,
    ) -> Result<Vec<Vec<GenericRow>>> {
        let bound = BoundReference::bind_references(
            orders.iter().map(|o| o.expr.clone()).collect(),
            &[self.child.output()],
        )?;
        let key_exprs: Vec<Arc<dyn PhysicalExpr>> =
            bound.iter().map(create_physical_expr).collect::<Result<_>>()?;
        let directions: Vec<SortDirection> = orders.iter().map(|o| o.direction).collect();
        let mut keyed = Vec::new();
        for partition in self.child.execute()? {
            for row in partition {
                let row = row?;
                let mut key = GenericRow::new_with_size(key_exprs.len());
                for (i, expr) in key_exprs.iter().enumerate() {
                    key.update(i, expr.eval(&row)?);
                }
                keyed.push((key, row));
            }
        }
        keyed.sort_by(|(ka, _), (kb, _)| compare_rows(ka, kb, &directions));
        let chunk = keyed.len().div_ceil(n).max(1);
        let mut buckets: Vec<Vec<GenericRow>> = Vec::with_capacity(n);
        let mut iter = keyed.into_iter().map(|(_, row)| row).peekable();
        for _ in 0..n {
            let mut bucket = Vec::new();
            for _ in 0..chunk {
                match iter.next() {
                    Some(row) => bucket.push(row),
                    None => break,
                }
            }
            buckets.push(bucket);
        }
        Ok(buckets)
    }
}

impl PhysicalPlan for Exchange {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Exchange"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.child.output()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(Exchange::new(self.partitioning.clone(), children.remove(0))))
    }

    fn output_partitioning(&self) -> Partitioning {
        self.partitioning.clone()
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let buckets = match &self.partitioning {
            Partitioning::Single => self.gather()?,
            Partitioning::Hash(keys, n) => self.hash_repartition(keys, *n)?,
            Partitioning::Range(orders, n) => self.range_repartition(orders, *n)?,
            Partitioning::Unknown(_) => {
                return Err(QueryError::internal("cannot exchange to Unknown partitioning"));
            }
        };
        Ok(buckets
            .into_iter()
            .map(|rows| Box::new(rows.into_iter().map(Ok)) as RowIterator)
            .collect())
    }

    fn simple_string(&self) -> String {
        format!("Exchange {:?}", self.partitioning)
    }
}
