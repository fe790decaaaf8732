use std::any::Any;
use std::sync::Arc;

use crate::catalog::Table;
use crate::expr::AttributeReference;
use crate::physical_plan::{check_arity, collect, Partitioning, PhysicalPlan, RowIterator};
use crate::Result;

/// Materializes the child and appends (or overwrites) its rows into a
/// catalog table partition. Produces no output rows.
#[derive(Debug)]
pub struct InsertIntoTable {
    pub table: Arc<Table>,
    pub partition_spec: Vec<(String, String)>,
    pub overwrite: bool,
    pub child: Arc<dyn PhysicalPlan>,
}

impl InsertIntoTable {
    pub fn new(
        table: Arc<Table>,
        partition_spec: Vec<(String, String)>,
        overwrite: bool,
        child: Arc<dyn PhysicalPlan>,
    ) -> Self {
        Self { table, partition_spec, overwrite, child }
    }
}

impl PhysicalPlan for InsertIntoTable {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "InsertIntoTable"
    }

    fn output(&self) -> Vec<AttributeReference> {
        vec![]
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(InsertIntoTable::new(
            self.table.clone(),
            self.partition_spec.clone(),
            self.overwrite,
            children.remove(0),
        )))
    }

    fn output_partitioning(&self) -> Partitioning {
        Partitioning::Single
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let rows = collect(self.child.as_ref())?;
        self.table.insert(self.partition_spec.clone(), rows, self.overwrite);
        Ok(vec![Box::new(std::iter::empty())])
    }

    fn simple_string(&self) -> String {
        format!("InsertIntoTable {} overwrite={}", self.table.name, self.overwrite)
    }
}
