use std::any::Any;
use std::sync::Arc;

use crate::data::{GenericRow, JoinedRow, Row};
use crate::expr::{AttributeReference, BoundReference, Expr};
use crate::physical_plan::{check_arity, Partitioning, PhysicalPlan, RowIterator};
use crate::{QueryError, Result};

/// Runs a generator over every input row. With `join` each generated
/// row is emitted alongside its input row; with `outer` an input row
/// whose generator comes back empty still produces one null-padded
/// output row.
#[derive(Debug)]
pub struct Generate {
    pub generator: Expr,
    pub join: bool,
    pub outer: bool,
    pub generator_output: Vec<AttributeReference>,
    pub child: Arc<dyn PhysicalPlan>,
}

impl Generate {
    pub fn new(
        generator: Expr,
        join: bool,
        outer: bool,
        generator_output: Vec<AttributeReference>,
        child: Arc<dyn PhysicalPlan>,
    ) -> Self {
        Self { generator, join, outer, generator_output, child }
    }
}

impl PhysicalPlan for Generate {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Generate"
    }

    fn output(&self) -> Vec<AttributeReference> {
        if self.join {
            self.child.output().into_iter().chain(self.generator_output.clone()).collect()
        } else {
            self.generator_output.clone()
        }
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(Generate::new(
            self.generator.clone(),
            self.join,
            self.outer,
            self.generator_output.clone(),
            children.remove(0),
        )))
    }

    fn output_partitioning(&self) -> Partitioning {
        self.child.output_partitioning()
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let Expr::Generator(generator) = &self.generator else {
            return Err(QueryError::internal(format!("{} is not a generator", self.generator)));
        };
        let args: Vec<Expr> = generator.args().into_iter().cloned().collect();
        let bound = BoundReference::bind_references(args, &[self.child.output()])?;
        let physical = Arc::new(generator.rewrite_args(bound).physical_generator()?);
        let join = self.join;
        let outer = self.outer;
        let generated_width = self.generator_output.len();
        let partitions = self
            .child
            .execute()?
            .into_iter()
            .map(|partition| {
                let physical = physical.clone();
                Box::new(partition.flat_map(move |row| -> Vec<Result<GenericRow>> {
                    let row = match row {
                        Ok(row) => row,
                        Err(e) => return vec![Err(e)],
                    };
                    let mut generated = match physical.generate(&row) {
                        Ok(rows) => rows,
                        Err(e) => return vec![Err(e)],
                    };
                    if generated.is_empty() && outer {
                        generated.push(GenericRow::new_with_size(generated_width));
                    }
                    generated
                        .into_iter()
                        .map(|g| {
                            if join {
                                Ok(JoinedRow::new(&row, &g).to_generic_row())
                            } else {
                                Ok(g)
                            }
                        })
                        .collect()
                })) as RowIterator
            })
            .collect();
        Ok(partitions)
    }

    fn simple_string(&self) -> String {
        format!("Generate [{}] join={} outer={}", self.generator, self.join, self.outer)
    }
}
