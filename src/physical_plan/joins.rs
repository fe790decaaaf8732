use std::any::Any;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use ahash::AHasher;
use itertools::Itertools;

use crate::data::{GenericRow, JoinedRow, Row};
use crate::expr::{AttributeReference, BoundReference, Expr};
use crate::logical_plan::JoinType;
use crate::physical_expr::{create_physical_expr, PhysicalExpr};
use crate::physical_plan::{
    check_arity, collect, collect_partition, Distribution, Partitioning, PhysicalPlan, RowIterator,
};
use crate::{QueryError, Result};

type RowsByKey = HashMap<GenericRow, Vec<GenericRow>, BuildHasherDefault<AHasher>>;

fn join_rows(left: &GenericRow, right: &GenericRow) -> GenericRow {
    JoinedRow::new(left, right).to_generic_row()
}

fn null_row(width: usize) -> GenericRow {
    GenericRow::new_with_size(width)
}

/// Inner equi-join: both sides clustered on their keys, the right side
/// built into a hash table per partition, the left side streamed
/// against it. Rows with a null in any key never participate, per
/// three-valued equality.
#[derive(Debug)]
pub struct HashEquiJoin {
    pub left_keys: Vec<Expr>,
    pub right_keys: Vec<Expr>,
    pub left: Arc<dyn PhysicalPlan>,
    pub right: Arc<dyn PhysicalPlan>,
}

impl HashEquiJoin {
    pub fn new(
        left_keys: Vec<Expr>,
        right_keys: Vec<Expr>,
        left: Arc<dyn PhysicalPlan>,
        right: Arc<dyn PhysicalPlan>,
    ) -> Self {
        Self { left_keys, right_keys, left, right }
    }

    fn key_evaluators(keys: &[Expr], input: Vec<AttributeReference>) -> Result<Vec<Arc<dyn PhysicalExpr>>> {
        BoundReference::bind_references(keys.to_vec(), &[input])?
            .iter()
            .map(create_physical_expr)
            .collect()
    }

    /// Key tuple for a row, or None when any key is null.
    fn eval_key(row: &GenericRow, exprs: &[Arc<dyn PhysicalExpr>]) -> Result<Option<GenericRow>> {
        let mut key = GenericRow::new_with_size(exprs.len());
        for (i, e) in exprs.iter().enumerate() {
            let v = e.eval(row)?;
            if v.is_null() {
                return Ok(None);
            }
            key.update(i, v);
        }
        Ok(Some(key))
    }
}

impl PhysicalPlan for HashEquiJoin {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "HashEquiJoin"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.left.output().into_iter().chain(self.right.output()).collect()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.left.clone(), self.right.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 2, &children)?;
        let left = children.remove(0);
        let right = children.remove(0);
        Ok(Arc::new(HashEquiJoin::new(
            self.left_keys.clone(),
            self.right_keys.clone(),
            left,
            right,
        )))
    }

    fn required_child_distribution(&self) -> Vec<Distribution> {
        vec![
            Distribution::Clustered(self.left_keys.clone()),
            Distribution::Clustered(self.right_keys.clone()),
        ]
    }

    fn output_partitioning(&self) -> Partitioning {
        self.left.output_partitioning()
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let left_exprs = Self::key_evaluators(&self.left_keys, self.left.output())?;
        let right_exprs = Self::key_evaluators(&self.right_keys, self.right.output())?;
        let left_partitions = self.left.execute()?;
        let right_partitions = self.right.execute()?;
        if left_partitions.len() != right_partitions.len() {
            return Err(QueryError::internal(format!(
                "equi-join sides have {} and {} partitions",
                left_partitions.len(),
                right_partitions.len()
            )));
        }
        let mut partitions: Vec<RowIterator> = Vec::new();
        for (left_iter, right_iter) in left_partitions.into_iter().zip(right_partitions) {
            let mut table: RowsByKey = HashMap::default();
            for row in right_iter {
                let row = row?;
                if let Some(key) = Self::eval_key(&row, &right_exprs)? {
                    table.entry(key).or_default().push(row);
                }
            }
            let mut joined = Vec::new();
            for row in left_iter {
                let row = row?;
                if let Some(key) = Self::eval_key(&row, &left_exprs)? {
                    if let Some(matches) = table.get(&key) {
                        for right_row in matches {
                            joined.push(join_rows(&row, right_row));
                        }
                    }
                }
            }
            partitions.push(Box::new(joined.into_iter().map(Ok)));
        }
        Ok(partitions)
    }

    fn simple_string(&self) -> String {
        format!(
            "HashEquiJoin [{}] = [{}]",
            self.left_keys.iter().map(|e| e.to_string()).join(", "),
            self.right_keys.iter().map(|e| e.to_string()).join(", ")
        )
    }
}

/// Nested-loop join for conditions with no usable equality: the
/// broadcast (right) side is materialized once at driver scope and
/// probed by every streamed partition. Outer variants pad the
/// non-matching side with nulls; each unmatched tuple yields exactly
/// one padded row.
#[derive(Debug)]
pub struct BroadcastNestedLoopJoin {
    pub join_type: JoinType,
    pub condition: Option<Expr>,
    pub left: Arc<dyn PhysicalPlan>,
    pub right: Arc<dyn PhysicalPlan>,
}

impl BroadcastNestedLoopJoin {
    pub fn new(
        join_type: JoinType,
        condition: Option<Expr>,
        left: Arc<dyn PhysicalPlan>,
        right: Arc<dyn PhysicalPlan>,
    ) -> Self {
        Self { join_type, condition, left, right }
    }
}

impl PhysicalPlan for BroadcastNestedLoopJoin {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "BroadcastNestedLoopJoin"
    }

    fn output(&self) -> Vec<AttributeReference> {
        let left = self.left.output();
        let right = self.right.output();
        match self.join_type {
            JoinType::Inner => left.into_iter().chain(right).collect(),
            JoinType::LeftOuter => left
                .into_iter()
                .chain(right.into_iter().map(|a| a.with_nullability(true)))
                .collect(),
            JoinType::RightOuter => left
                .into_iter()
                .map(|a| a.with_nullability(true))
                .chain(right)
                .collect(),
            JoinType::FullOuter => left
                .into_iter()
                .chain(right)
                .map(|a| a.with_nullability(true))
                .collect(),
        }
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.left.clone(), self.right.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 2, &children)?;
        let left = children.remove(0);
        let right = children.remove(0);
        Ok(Arc::new(BroadcastNestedLoopJoin::new(
            self.join_type,
            self.condition.clone(),
            left,
            right,
        )))
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::Unknown(self.left.output_partitioning().num_partitions())
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let predicate: Option<Arc<dyn PhysicalExpr>> = match &self.condition {
            Some(c) => {
                let bound = BoundReference::bind_reference(
                    c.clone(),
                    &[self.left.output(), self.right.output()],
                )?;
                Some(create_physical_expr(&bound)?)
            }
            None => None,
        };
        // broadcast side, materialized once
        let broadcast: Arc<Vec<GenericRow>> = Arc::new(collect(self.right.as_ref())?);
        let left_width = self.left.output().len();
        let right_width = self.right.output().len();
        let mut broadcast_matched = vec![false; broadcast.len()];

        let mut partitions: Vec<Vec<GenericRow>> = Vec::new();
        for partition in self.left.execute()? {
            let mut out = Vec::new();
            for row in partition {
                let row = row?;
                let mut matched = false;
                for (i, right_row) in broadcast.iter().enumerate() {
                    let keep = match &predicate {
                        Some(p) => {
                            let joined = JoinedRow::new(&row, right_row);
                            p.eval(&joined)?.is_true()
                        }
                        None => true,
                    };
                    if keep {
                        matched = true;
                        broadcast_matched[i] = true;
                        out.push(join_rows(&row, right_row));
                    }
                }
                if !matched
                    && matches!(self.join_type, JoinType::LeftOuter | JoinType::FullOuter)
                {
                    out.push(join_rows(&row, &null_row(right_width)));
                }
            }
            partitions.push(out);
        }
        if matches!(self.join_type, JoinType::RightOuter | JoinType::FullOuter) {
            let unmatched = broadcast
                .iter()
                .enumerate()
                .filter(|(i, _)| !broadcast_matched[*i])
                .map(|(_, right_row)| join_rows(&null_row(left_width), right_row))
                .collect::<Vec<_>>();
            partitions.push(unmatched);
        }
        Ok(partitions
            .into_iter()
            .map(|rows| Box::new(rows.into_iter().map(Ok)) as RowIterator)
            .collect())
    }

    fn simple_string(&self) -> String {
        match &self.condition {
            Some(c) => format!("BroadcastNestedLoopJoin {:?} [{c}]", self.join_type),
            None => format!("BroadcastNestedLoopJoin {:?}", self.join_type),
        }
    }
}

/// Every pair of rows from the two sides.
#[derive(Debug)]
pub struct CartesianProduct {
    pub left: Arc<dyn PhysicalPlan>,
    pub right: Arc<dyn PhysicalPlan>,
}

impl CartesianProduct {
    pub fn new(left: Arc<dyn PhysicalPlan>, right: Arc<dyn PhysicalPlan>) -> Self {
        Self { left, right }
    }
}

impl PhysicalPlan for CartesianProduct {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "CartesianProduct"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.left.output().into_iter().chain(self.right.output()).collect()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.left.clone(), self.right.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 2, &children)?;
        let left = children.remove(0);
        let right = children.remove(0);
        Ok(Arc::new(CartesianProduct::new(left, right)))
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::Unknown(self.left.output_partitioning().num_partitions())
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let right_rows: Arc<Vec<GenericRow>> = Arc::new(collect(self.right.as_ref())?);
        let mut partitions: Vec<RowIterator> = Vec::new();
        for partition in self.left.execute()? {
            let rows = collect_partition(partition)?;
            let right_rows = right_rows.clone();
            let mut out = Vec::with_capacity(rows.len() * right_rows.len());
            for row in &rows {
                for right_row in right_rows.iter() {
                    out.push(join_rows(row, right_row));
                }
            }
            partitions.push(Box::new(out.into_iter().map(Ok)));
        }
        Ok(partitions)
    }
}
