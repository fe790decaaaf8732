use std::fmt::Debug;
use std::sync::Arc;

use crate::data::{GenericRow, Row, Value};
use crate::physical_expr::PhysicalExpr;
use crate::Result;

/// Row-to-rows evaluation of a generator. Implementations must not
/// carry state across calls; each input row stands alone.
pub trait PhysicalGenerator: Debug + Send + Sync {
    fn generate(&self, input: &dyn Row) -> Result<Vec<GenericRow>>;
}

/// One single-column row per array element; a null or empty array
/// generates nothing.
#[derive(Debug)]
pub struct ExplodeExec {
    pub child: Arc<dyn PhysicalExpr>,
}

impl ExplodeExec {
    pub fn new(child: Arc<dyn PhysicalExpr>) -> Self {
        ExplodeExec { child }
    }
}

impl PhysicalGenerator for ExplodeExec {
    fn generate(&self, input: &dyn Row) -> Result<Vec<GenericRow>> {
        let value = self.child.eval(input)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let array = value.get_array();
        Ok(array
            .iter()
            .map(|v| GenericRow::new(vec![v.clone()]))
            .collect())
    }
}

/// Adapter for user-defined table functions provided as a closure.
pub struct UdtfGenerator {
    pub children: Vec<Arc<dyn PhysicalExpr>>,
    pub fun: Arc<dyn Fn(&[Value]) -> Result<Vec<GenericRow>> + Send + Sync>,
}

impl Debug for UdtfGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdtfGenerator").field("children", &self.children).finish()
    }
}

impl PhysicalGenerator for UdtfGenerator {
    fn generate(&self, input: &dyn Row) -> Result<Vec<GenericRow>> {
        let mut args = Vec::with_capacity(self.children.len());
        for child in &self.children {
            args.push(child.eval(input)?);
        }
        (self.fun)(&args)
    }
}
