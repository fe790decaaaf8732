use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use crate::data::GenericRow;
use crate::expr::AttributeReference;
use crate::logical_plan::{LogicalPlan, Relation, SubqueryAlias};
use crate::types::Schema;
use crate::{QueryError, Result};

/// Resolves relation names to metadata. Returns plan leaves only;
/// opening the stored rows is a physical-scan concern.
pub trait Catalog: Send + Sync + Debug {
    fn lookup_relation(&self, name: &str, alias: Option<&str>) -> Result<LogicalPlan>;

    /// Handle for the physical layer.
    fn lookup_table(&self, name: &str) -> Result<Arc<Table>>;
}

/// A partition of a table: the partition-column values it was written
/// under (empty for unpartitioned tables) and its rows.
#[derive(Clone, Debug)]
pub struct TablePartition {
    pub spec: Vec<(String, String)>,
    pub rows: Vec<GenericRow>,
}

/// In-memory table. Each `lookup_relation` call mints a fresh set of
/// attribute ids, so the two sides of a self-join stay distinguishable.
#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    pub partition_cols: Vec<String>,
    partitions: RwLock<Vec<TablePartition>>,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema, partition_cols: Vec<String>) -> Self {
        Self { name: name.into(), schema, partition_cols, partitions: RwLock::new(Vec::new()) }
    }

    pub fn attributes(&self) -> Vec<AttributeReference> {
        self.schema.to_attributes()
    }

    pub fn partitions(&self) -> Vec<TablePartition> {
        self.partitions.read().unwrap().clone()
    }

    pub fn insert(&self, spec: Vec<(String, String)>, rows: Vec<GenericRow>, overwrite: bool) {
        let mut partitions = self.partitions.write().unwrap();
        if overwrite {
            partitions.retain(|p| p.spec != spec);
        }
        partitions.push(TablePartition { spec, rows });
    }
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&self, table: Table) -> Arc<Table> {
        let table = Arc::new(table);
        self.tables.write().unwrap().insert(table.name.clone(), table.clone());
        table
    }
}

impl Catalog for MemoryCatalog {
    fn lookup_relation(&self, name: &str, alias: Option<&str>) -> Result<LogicalPlan> {
        let table = self.lookup_table(name)?;
        let relation = LogicalPlan::Relation(Relation::new_partitioned(
            name,
            table.attributes(),
            table.partition_cols.clone(),
        ));
        Ok(match alias {
            Some(a) => LogicalPlan::SubqueryAlias(SubqueryAlias::new(a, Arc::new(relation))),
            None => relation,
        })
    }

    fn lookup_table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::RelationNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field};

    #[test]
    fn test_lookup_unknown_relation() {
        let catalog = MemoryCatalog::new();
        let err = catalog.lookup_relation("nope", None).unwrap_err();
        assert_eq!(err, QueryError::RelationNotFound("nope".to_string()));
    }

    #[test]
    fn test_each_lookup_is_a_fresh_instance() {
        let catalog = MemoryCatalog::new();
        catalog.register_table(Table::new(
            "t",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        let p1 = catalog.lookup_relation("t", None).unwrap();
        let p2 = catalog.lookup_relation("t", None).unwrap();
        // self-joins rely on the two sides carrying distinct ids
        assert_ne!(p1.output()[0].expr_id, p2.output()[0].expr_id);
    }

    #[test]
    fn test_insert_overwrite_replaces_partition() {
        let catalog = MemoryCatalog::new();
        let table = catalog.register_table(Table::new(
            "t",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec!["dt".to_string()],
        ));
        let spec = vec![("dt".to_string(), "2024-01-01".to_string())];
        table.insert(spec.clone(), vec![GenericRow::new(vec![crate::data::Value::Int(1)])], false);
        table.insert(spec.clone(), vec![GenericRow::new(vec![crate::data::Value::Int(2)])], true);
        let partitions = table.partitions();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].rows.len(), 1);
    }
}
