use std::any::Any;
use std::sync::Arc;

use itertools::Itertools;

use crate::catalog::Table;
use crate::data::{GenericRow, Row, Value};
use crate::expr::{AttributeReference, BoundReference, Expr};
use crate::physical_expr::{create_physical_expr, get_cast_func, PhysicalExpr};
use crate::physical_plan::{check_arity, Partitioning, PhysicalPlan, RowIterator};
use crate::types::DataType;
use crate::{QueryError, Result};

/// Scan of a catalog table, optionally narrowed to a subset of columns
/// and optionally skipping partitions whose partition-column values
/// fail the pruning predicate.
#[derive(Debug)]
pub struct TableScan {
    pub table: Arc<Table>,
    output: Vec<AttributeReference>,
    column_indices: Vec<usize>,
    pruning_predicate: Option<Expr>,
}

impl TableScan {
    /// `output` must be a (possibly reordered) subset of the relation's
    /// attributes, positionally aligned with the table schema by name.
    pub fn new(
        table: Arc<Table>,
        output: Vec<AttributeReference>,
        pruning_predicate: Option<Expr>,
    ) -> Result<Self> {
        let column_indices = output
            .iter()
            .map(|a| {
                table
                    .schema
                    .fields
                    .iter()
                    .position(|f| f.name == a.name)
                    .ok_or_else(|| {
                        QueryError::internal(format!(
                            "column {} not found in table {}",
                            a.name, table.name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { table, output, column_indices, pruning_predicate })
    }

    /// Evaluate the pruning predicate against a partition's spec
    /// values, parsed into the partition columns' declared types. An
    /// indeterminate (null) result keeps the partition.
    fn partition_survives(&self, predicate: &Arc<dyn PhysicalExpr>, spec: &[(String, String)]) -> Result<bool> {
        let mut row = GenericRow::new_with_size(self.table.partition_cols.len());
        for (i, col) in self.table.partition_cols.iter().enumerate() {
            let field = self.table.schema.fields.iter().find(|f| f.name == *col);
            let value = spec.iter().find(|(name, _)| name == col).map(|(_, v)| v.clone());
            let parsed = match (field, value) {
                (Some(field), Some(raw)) => {
                    let cast = get_cast_func(&DataType::String, &field.data_type)?;
                    cast(Value::string(raw))?
                }
                _ => Value::Null,
            };
            row.update(i, parsed);
        }
        Ok(!predicate.eval(&row)?.is_false())
    }

    fn bound_pruning_predicate(&self) -> Result<Option<Arc<dyn PhysicalExpr>>> {
        let Some(predicate) = &self.pruning_predicate else { return Ok(None) };
        // bind partition-column references to the spec row layout
        let partition_attrs = self
            .table
            .partition_cols
            .iter()
            .map(|col| {
                self.output
                    .iter()
                    .find(|a| &a.name == col)
                    .cloned()
                    .ok_or_else(|| {
                        QueryError::internal(format!("partition column {col} missing from scan output"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let bound = BoundReference::bind_reference(predicate.clone(), &[partition_attrs])?;
        Ok(Some(create_physical_expr(&bound)?))
    }
}

impl PhysicalPlan for TableScan {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "TableScan"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.output.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![]
    }

    fn with_new_children(&self, children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 0, &children)?;
        Ok(Arc::new(TableScan {
            table: self.table.clone(),
            output: self.output.clone(),
            column_indices: self.column_indices.clone(),
            pruning_predicate: self.pruning_predicate.clone(),
        }))
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::Unknown(self.table.partitions().len().max(1))
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let predicate = self.bound_pruning_predicate()?;
        let mut partitions: Vec<RowIterator> = Vec::new();
        for partition in self.table.partitions() {
            if let Some(p) = &predicate {
                if !self.partition_survives(p, &partition.spec)? {
                    continue;
                }
            }
            let indices = self.column_indices.clone();
            partitions.push(Box::new(partition.rows.into_iter().map(move |row| {
                let mut out = GenericRow::new_with_size(indices.len());
                for (i, idx) in indices.iter().enumerate() {
                    out.update(i, row.get(*idx).clone());
                }
                Ok(out)
            })));
        }
        if partitions.is_empty() {
            partitions.push(Box::new(std::iter::empty()));
        }
        Ok(partitions)
    }

    fn simple_string(&self) -> String {
        let cols = self.output.iter().map(|a| a.name.clone()).join(", ");
        match &self.pruning_predicate {
            Some(p) => format!("TableScan {} [{cols}] pruning: {p}", self.table.name),
            None => format!("TableScan {} [{cols}]", self.table.name),
        }
    }
}

/// Literal rows in a single partition; also serves as the
/// one-empty-row leaf a no-relation query plans to.
#[derive(Debug)]
pub struct LocalTableScan {
    pub output: Vec<AttributeReference>,
    pub rows: Vec<GenericRow>,
}

impl LocalTableScan {
    pub fn new(output: Vec<AttributeReference>, rows: Vec<GenericRow>) -> Self {
        Self { output, rows }
    }

    pub fn one_empty_row() -> Self {
        Self { output: vec![], rows: vec![GenericRow::new(Vec::new())] }
    }
}

impl PhysicalPlan for LocalTableScan {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "LocalTableScan"
    }

    fn output(&self) -> Vec<AttributeReference> {
        self.output.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![]
    }

    fn with_new_children(&self, children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 0, &children)?;
        Ok(Arc::new(LocalTableScan::new(self.output.clone(), self.rows.clone())))
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::Single
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let rows = self.rows.clone();
        Ok(vec![Box::new(rows.into_iter().map(Ok))])
    }

    fn simple_string(&self) -> String {
        format!("LocalTableScan ({} rows)", self.rows.len())
    }
}
