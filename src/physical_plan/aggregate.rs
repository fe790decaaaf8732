use std::any::Any;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use ahash::AHasher;
use itertools::Itertools;

use crate::data::{empty_row, GenericRow, JoinedRow, Row};
use crate::expr::aggregate::{AggregateFunction, PhysicalTypedAggregate, TypedAggregateFunction};
use crate::expr::{AttributeReference, BoundReference, Expr};
use crate::physical_expr::{create_physical_expr, MutableProjection, PhysicalExpr, Projection};
use crate::physical_plan::{
    check_arity, Distribution, Partitioning, PhysicalPlan, RowIterator,
};
use crate::{QueryError, Result};

/// Which stage of a (possibly two-level) aggregation this operator
/// performs.
///
/// `Partial` folds input rows into per-group buffers and emits `group
/// keys ++ buffer cells`. `Final` merges incoming partial buffers and
/// emits results. `Complete` does both in one level and is the only
/// mode that can drive imperative (typed) aggregates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggregateMode {
    Partial,
    Final,
    Complete,
}

#[derive(Debug)]
pub struct Aggregate {
    pub mode: AggregateMode,
    pub group_exprs: Vec<Expr>,
    pub agg_exprs: Vec<Expr>,
    pub result_exprs: Vec<Expr>,
    pub child: Arc<dyn PhysicalPlan>,
}

/// The aggregate calls split by kind, with typed functions pinned to
/// their buffer slots.
struct AggFunctions {
    declarative: Vec<Box<dyn AggregateFunction>>,
    typed: Vec<Box<dyn TypedAggregateFunction>>,
    buffer_attrs: Vec<AttributeReference>,
}

impl Aggregate {
    pub fn new(
        mode: AggregateMode,
        group_exprs: Vec<Expr>,
        agg_exprs: Vec<Expr>,
        result_exprs: Vec<Expr>,
        child: Arc<dyn PhysicalPlan>,
    ) -> Self {
        Self { mode, group_exprs, agg_exprs, result_exprs, child }
    }

    fn group_attrs(&self) -> Vec<AttributeReference> {
        self.group_exprs.iter().map(|e| e.to_attribute().unwrap()).collect()
    }

    /// Grouping expressions as evaluated against the child, aliases
    /// unwrapped.
    fn group_key_exprs(&self) -> Vec<Expr> {
        self.group_exprs
            .iter()
            .map(|e| match e {
                Expr::Alias(a) => a.child.as_ref().clone(),
                e => e.clone(),
            })
            .collect()
    }

    fn functions(&self) -> Result<AggFunctions> {
        let mut declarative = Vec::new();
        let mut typed = Vec::new();
        let mut buffer_attrs = Vec::new();
        for expr in &self.agg_exprs {
            match expr {
                Expr::AggregateFunction(f) => {
                    buffer_attrs.extend(f.agg_buffer_attributes());
                    declarative.push(f.clone());
                }
                Expr::TypedAggregateFunction(f) => {
                    if self.mode != AggregateMode::Complete {
                        return Err(QueryError::internal(format!(
                            "{} does not decompose into partial aggregates",
                            f.name()
                        )));
                    }
                    let offset = buffer_attrs.len();
                    buffer_attrs.push(f.buffer_attribute());
                    typed.push(f.with_buffer_offset(offset));
                }
                e => {
                    return Err(QueryError::internal(format!("{e} is not an aggregate call")));
                }
            }
        }
        Ok(AggFunctions { declarative, typed, buffer_attrs })
    }
}

impl PhysicalPlan for Aggregate {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn output(&self) -> Vec<AttributeReference> {
        match self.mode {
            AggregateMode::Partial => {
                let mut out = self.group_attrs();
                for expr in &self.agg_exprs {
                    if let Expr::AggregateFunction(f) = expr {
                        out.extend(f.input_agg_buffer_attributes());
                    }
                }
                out
            }
            AggregateMode::Final | AggregateMode::Complete => {
                self.result_exprs.iter().map(|e| e.to_attribute().unwrap()).collect()
            }
        }
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalPlan>> {
        vec![self.child.clone()]
    }

    fn with_new_children(&self, mut children: Vec<Arc<dyn PhysicalPlan>>) -> Result<Arc<dyn PhysicalPlan>> {
        check_arity(self.name(), 1, &children)?;
        Ok(Arc::new(Aggregate::new(
            self.mode,
            self.group_exprs.clone(),
            self.agg_exprs.clone(),
            self.result_exprs.clone(),
            children.remove(0),
        )))
    }

    fn required_child_distribution(&self) -> Vec<Distribution> {
        match self.mode {
            AggregateMode::Partial => vec![Distribution::Unspecified],
            AggregateMode::Final | AggregateMode::Complete => {
                if self.group_exprs.is_empty() {
                    vec![Distribution::AllTuples]
                } else {
                    vec![Distribution::Clustered(self.group_key_exprs())]
                }
            }
        }
    }

    fn output_partitioning(&self) -> Partitioning {
        self.child.output_partitioning()
    }

    fn execute(&self) -> Result<Vec<RowIterator>> {
        let functions = self.functions()?;
        let child_output = self.child.output();
        let buffer_len = functions.buffer_attrs.len();

        // group key selector
        let key_exprs: Vec<Arc<dyn PhysicalExpr>> =
            BoundReference::bind_references(self.group_key_exprs(), &[child_output.clone()])?
                .iter()
                .map(create_physical_expr)
                .collect::<Result<_>>()?;

        // buffer initialization and per-row transition (update in
        // partial/complete mode, merge in final mode), slot-aligned
        // with the buffer layout; typed slots stay NoOp and are driven
        // imperatively
        let mut init_exprs = Vec::with_capacity(buffer_len);
        let mut transition_exprs = Vec::with_capacity(buffer_len);
        for expr in &self.agg_exprs {
            match expr {
                Expr::AggregateFunction(f) => {
                    init_exprs.extend(f.initial_values());
                    match self.mode {
                        AggregateMode::Final => transition_exprs.extend(f.merge_expressions()),
                        _ => transition_exprs.extend(f.update_expressions()),
                    }
                }
                Expr::TypedAggregateFunction(_) => {
                    init_exprs.push(Expr::NoOp);
                    transition_exprs.push(Expr::NoOp);
                }
                _ => unreachable!("validated in functions()"),
            }
        }
        let init_projection = Projection::new(init_exprs)?;
        let transition = MutableProjection::new_with_input_attrs(
            transition_exprs,
            &[functions.buffer_attrs.clone(), child_output.clone()],
        )?;

        let typed_physical: Vec<Box<dyn PhysicalTypedAggregate>> = functions
            .typed
            .iter()
            .map(|f| {
                let args: Vec<Expr> = f.args().into_iter().cloned().collect();
                let bound = BoundReference::bind_references(args, &[child_output.clone()])?;
                f.rewrite_args(bound).physical_function()
            })
            .collect::<Result<_>>()?;

        let create_buffer = |typed: &[Box<dyn PhysicalTypedAggregate>]| -> Result<GenericRow> {
            let mut buffer = GenericRow::new_with_size(buffer_len);
            init_projection.apply_target(&mut buffer, empty_row())?;
            for f in typed {
                f.initialize(&mut buffer);
            }
            Ok(buffer)
        };

        // grouping map per input partition, drained in
        // insertion-undefined order
        type Buffers = HashMap<GenericRow, GenericRow, BuildHasherDefault<AHasher>>;
        let mut output_partitions: Vec<Vec<GenericRow>> = Vec::new();
        for partition in self.child.execute()? {
            let mut buffers: Buffers = HashMap::default();
            for row in partition {
                let row = row?;
                let mut key = GenericRow::new_with_size(key_exprs.len());
                for (i, e) in key_exprs.iter().enumerate() {
                    key.update(i, e.eval(&row)?);
                }
                let buffer = match buffers.entry(key) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        e.insert(create_buffer(&typed_physical)?)
                    }
                };
                transition.apply(buffer, &row)?;
                for f in &typed_physical {
                    f.update(buffer, &row)?;
                }
            }
            output_partitions.push(self.drain(buffers, &functions, &typed_physical)?);
        }
        Ok(output_partitions
            .into_iter()
            .map(|rows| Box::new(rows.into_iter().map(Ok)) as RowIterator)
            .collect())
    }

    fn simple_string(&self) -> String {
        format!(
            "Aggregate {:?} group=[{}] agg=[{}]",
            self.mode,
            self.group_exprs.iter().map(|e| e.to_string()).join(", "),
            self.agg_exprs.iter().map(|e| e.to_string()).join(", ")
        )
    }
}

impl Aggregate {
    fn drain(
        &self,
        buffers: HashMap<GenericRow, GenericRow, BuildHasherDefault<AHasher>>,
        functions: &AggFunctions,
        typed_physical: &[Box<dyn PhysicalTypedAggregate>],
    ) -> Result<Vec<GenericRow>> {
        match self.mode {
            AggregateMode::Partial => Ok(buffers
                .into_iter()
                .map(|(key, buffer)| JoinedRow::new(&key, &buffer).to_generic_row())
                .collect()),
            AggregateMode::Final | AggregateMode::Complete => {
                // one value per aggregate call, published under its
                // result attribute
                let mut eval_exprs = Vec::with_capacity(self.agg_exprs.len());
                let mut result_attrs = Vec::with_capacity(self.agg_exprs.len());
                let mut decl = functions.declarative.iter();
                let mut typed_slots = Vec::new();
                for (i, expr) in self.agg_exprs.iter().enumerate() {
                    match expr {
                        Expr::AggregateFunction(_) => {
                            let f = decl.next().unwrap();
                            eval_exprs.push(f.evaluate_expression());
                            result_attrs.push(f.result_attribute());
                        }
                        Expr::TypedAggregateFunction(f) => {
                            eval_exprs.push(Expr::NoOp);
                            result_attrs.push(f.result_attribute());
                            typed_slots.push(i);
                        }
                        _ => unreachable!("validated in functions()"),
                    }
                }
                let eval_projection = Projection::new_with_input_attrs(
                    eval_exprs,
                    functions.buffer_attrs.clone(),
                )?;
                let result_projection = Projection::new_with_input_attrs(
                    self.result_exprs.clone(),
                    self.group_attrs().into_iter().chain(result_attrs).collect(),
                )?;
                // zero groups with no grouping keys still yields one
                // row, each aggregate reporting its empty result
                if buffers.is_empty() && self.group_exprs.is_empty() {
                    let mut agg_values = GenericRow::new_with_size(self.agg_exprs.len());
                    for (i, expr) in self.agg_exprs.iter().enumerate() {
                        let empty = match expr {
                            Expr::AggregateFunction(f) => f.empty_result(),
                            Expr::TypedAggregateFunction(f) => f.empty_result(),
                            _ => unreachable!("validated in functions()"),
                        };
                        agg_values.update(i, empty);
                    }
                    let key = GenericRow::new(Vec::new());
                    let joined = JoinedRow::new(&key, &agg_values);
                    return Ok(vec![result_projection.apply(&joined)?]);
                }
                let mut out = Vec::with_capacity(buffers.len());
                for (key, buffer) in buffers {
                    let mut agg_values = eval_projection.apply(&buffer)?;
                    for (slot, f) in typed_slots.iter().zip(typed_physical) {
                        agg_values.update(*slot, f.eval(&buffer)?);
                    }
                    let joined = JoinedRow::new(&key, &agg_values);
                    out.push(result_projection.apply(&joined)?);
                }
                Ok(out)
            }
        }
    }
}
