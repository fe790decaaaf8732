use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::data::GenericRow;
use crate::expr::{Alias, AttributeReference, Expr};
use crate::tree_node::{Transformed, TreeNodeContainer, TreeNodeRecursion};
use crate::types::DataType;
use crate::{QueryError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalPlan {
    UnresolvedRelation(UnresolvedRelation),
    Relation(Relation),
    LocalRelation(LocalRelation),
    OneRowRelation,
    SubqueryAlias(SubqueryAlias),
    Project(Project),
    Filter(Filter),
    Join(Join),
    Aggregate(Aggregate),
    Sort(Sort),
    Limit(Limit),
    Union(Union),
    Distinct(Distinct),
    Generate(Generate),
    InsertInto(InsertInto),
}

impl LogicalPlan {
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::Relation(_)
            | LogicalPlan::LocalRelation(_)
            | LogicalPlan::OneRowRelation => vec![],
            LogicalPlan::SubqueryAlias(SubqueryAlias { child, .. })
            | LogicalPlan::Project(Project { child, .. })
            | LogicalPlan::Filter(Filter { child, .. })
            | LogicalPlan::Aggregate(Aggregate { child, .. })
            | LogicalPlan::Sort(Sort { child, .. })
            | LogicalPlan::Limit(Limit { child, .. })
            | LogicalPlan::Distinct(Distinct { child })
            | LogicalPlan::Generate(Generate { child, .. })
            | LogicalPlan::InsertInto(InsertInto { child, .. }) => vec![child.as_ref()],
            LogicalPlan::Join(Join { left, right, .. }) => vec![left.as_ref(), right.as_ref()],
            LogicalPlan::Union(Union { children }) => children.iter().map(|c| c.as_ref()).collect(),
        }
    }

    /// Expressions held directly by this operator (not recursed).
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::Relation(_)
            | LogicalPlan::LocalRelation(_)
            | LogicalPlan::OneRowRelation
            | LogicalPlan::SubqueryAlias(_)
            | LogicalPlan::Limit(_)
            | LogicalPlan::Union(_)
            | LogicalPlan::Distinct(_)
            | LogicalPlan::InsertInto(_) => vec![],
            LogicalPlan::Project(Project { project_list, .. }) => project_list.iter().collect(),
            LogicalPlan::Filter(Filter { condition, .. }) => vec![condition],
            LogicalPlan::Join(Join { condition, .. }) => condition.iter().collect(),
            LogicalPlan::Aggregate(Aggregate { grouping_exprs, aggregate_exprs, .. }) => {
                grouping_exprs.iter().chain(aggregate_exprs.iter()).collect()
            }
            LogicalPlan::Sort(Sort { order, .. }) => order.iter().map(|o| &o.expr).collect(),
            LogicalPlan::Generate(g) => {
                let mut exprs = vec![&g.generator];
                exprs.extend(g.generator_output.iter());
                exprs
            }
        }
    }

    pub fn resolved(&self) -> bool {
        match self {
            LogicalPlan::UnresolvedRelation(_) => false,
            LogicalPlan::Generate(g) => g.resolved(),
            _ => self.expressions().iter().all(|e| e.resolved()) && self.children_resolved(),
        }
    }

    pub fn children_resolved(&self) -> bool {
        self.children().iter().all(|c| c.resolved())
    }

    pub fn output(&self) -> Vec<AttributeReference> {
        match self {
            LogicalPlan::UnresolvedRelation(_) | LogicalPlan::OneRowRelation => vec![],
            LogicalPlan::Relation(Relation { output, .. }) => output.clone(),
            LogicalPlan::LocalRelation(LocalRelation { output, .. }) => output.clone(),
            LogicalPlan::SubqueryAlias(s) => s.output(),
            LogicalPlan::Project(Project { project_list, .. }) => output_attributes(project_list),
            LogicalPlan::Filter(Filter { child, .. }) => child.output(),
            LogicalPlan::Join(join) => join.output(),
            LogicalPlan::Aggregate(Aggregate { aggregate_exprs, .. }) => {
                output_attributes(aggregate_exprs)
            }
            LogicalPlan::Sort(Sort { child, .. }) => child.output(),
            LogicalPlan::Limit(Limit { child, .. }) => child.output(),
            LogicalPlan::Union(u) => u.output(),
            LogicalPlan::Distinct(Distinct { child }) => child.output(),
            LogicalPlan::Generate(g) => g.output(),
            LogicalPlan::InsertInto(_) => vec![],
        }
    }

    /// Concatenated outputs of all children, the namespace expressions
    /// of this operator resolve against.
    pub fn child_attributes(&self) -> Vec<AttributeReference> {
        self.children().into_iter().flat_map(|p| p.output()).collect()
    }

    /// Rebuild this node with new children. The number of children must
    /// match the node's arity.
    pub fn with_new_children(self, mut children: Vec<LogicalPlan>) -> Result<LogicalPlan> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(QueryError::TreeShapeMismatch {
                node: self.node_name().to_string(),
                expected,
                actual: children.len(),
            });
        }
        Ok(match self {
            p @ (LogicalPlan::UnresolvedRelation(_)
            | LogicalPlan::Relation(_)
            | LogicalPlan::LocalRelation(_)
            | LogicalPlan::OneRowRelation) => p,
            LogicalPlan::SubqueryAlias(mut s) => {
                s.child = Arc::new(children.remove(0));
                LogicalPlan::SubqueryAlias(s)
            }
            LogicalPlan::Project(mut p) => {
                p.child = Arc::new(children.remove(0));
                LogicalPlan::Project(p)
            }
            LogicalPlan::Filter(mut f) => {
                f.child = Arc::new(children.remove(0));
                LogicalPlan::Filter(f)
            }
            LogicalPlan::Join(mut j) => {
                j.left = Arc::new(children.remove(0));
                j.right = Arc::new(children.remove(0));
                LogicalPlan::Join(j)
            }
            LogicalPlan::Aggregate(mut a) => {
                a.child = Arc::new(children.remove(0));
                LogicalPlan::Aggregate(a)
            }
            LogicalPlan::Sort(mut s) => {
                s.child = Arc::new(children.remove(0));
                LogicalPlan::Sort(s)
            }
            LogicalPlan::Limit(mut l) => {
                l.child = Arc::new(children.remove(0));
                LogicalPlan::Limit(l)
            }
            LogicalPlan::Union(mut u) => {
                u.children = children.into_iter().map(Arc::new).collect();
                LogicalPlan::Union(u)
            }
            LogicalPlan::Distinct(mut d) => {
                d.child = Arc::new(children.remove(0));
                LogicalPlan::Distinct(d)
            }
            LogicalPlan::Generate(mut g) => {
                g.child = Arc::new(children.remove(0));
                LogicalPlan::Generate(g)
            }
            LogicalPlan::InsertInto(mut i) => {
                i.child = Arc::new(children.remove(0));
                LogicalPlan::InsertInto(i)
            }
        })
    }

    pub fn node_name(&self) -> &'static str {
        match self {
            LogicalPlan::UnresolvedRelation(_) => "UnresolvedRelation",
            LogicalPlan::Relation(_) => "Relation",
            LogicalPlan::LocalRelation(_) => "LocalRelation",
            LogicalPlan::OneRowRelation => "OneRowRelation",
            LogicalPlan::SubqueryAlias(_) => "SubqueryAlias",
            LogicalPlan::Project(_) => "Project",
            LogicalPlan::Filter(_) => "Filter",
            LogicalPlan::Join(_) => "Join",
            LogicalPlan::Aggregate(_) => "Aggregate",
            LogicalPlan::Sort(_) => "Sort",
            LogicalPlan::Limit(_) => "Limit",
            LogicalPlan::Union(_) => "Union",
            LogicalPlan::Distinct(_) => "Distinct",
            LogicalPlan::Generate(_) => "Generate",
            LogicalPlan::InsertInto(_) => "InsertInto",
        }
    }

    fn simple_string(&self) -> String {
        let exprs = self
            .expressions()
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            LogicalPlan::UnresolvedRelation(r) => format!("UnresolvedRelation {}", r.name),
            LogicalPlan::Relation(r) => format!("Relation {}", r.name),
            LogicalPlan::LocalRelation(l) => format!("LocalRelation ({} rows)", l.rows.len()),
            LogicalPlan::SubqueryAlias(s) => format!("SubqueryAlias {}", s.alias),
            LogicalPlan::Join(j) => format!("Join {:?} [{exprs}]", j.join_type),
            LogicalPlan::Limit(l) => format!("Limit {}", l.n),
            LogicalPlan::InsertInto(i) => format!("InsertInto {}", i.table),
            _ => {
                if exprs.is_empty() {
                    self.node_name().to_string()
                } else {
                    format!("{} [{exprs}]", self.node_name())
                }
            }
        }
    }

    /// Indented multi-line rendering of the operator tree, the form
    /// attached to analysis errors and printed by drivers.
    pub fn tree_string(&self) -> String {
        fn build(plan: &LogicalPlan, depth: usize, out: &mut String) {
            out.push_str(&" ".repeat(depth * 2));
            out.push_str(&plan.simple_string());
            out.push('\n');
            for child in plan.children() {
                build(child, depth + 1, out);
            }
        }
        let mut out = String::new();
        build(self, 0, &mut out);
        out
    }
}

impl Display for LogicalPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tree_string())
    }
}

fn output_attributes(exprs: &[Expr]) -> Vec<AttributeReference> {
    exprs
        .iter()
        .map(|e| match e {
            Expr::Alias(Alias { child, name, expr_id }) => AttributeReference::new_with_expr_id(
                name,
                child.data_type().clone(),
                child.nullable(),
                *expr_id,
            ),
            Expr::AttributeReference(a) => a.clone(),
            Expr::UnresolvedAttribute(a) => AttributeReference::new_with_expr_id(
                a.name_parts.last().unwrap().clone(),
                DataType::Null,
                true,
                0,
            ),
            e => panic!("{e} is not allowed as an output expression"),
        })
        .collect()
}

impl<'a> TreeNodeContainer<'a, Self> for LogicalPlan {
    fn apply_elements<F: FnMut(&'a Self) -> Result<TreeNodeRecursion>>(
        &'a self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        f(self)
    }

    fn map_elements<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        f(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnresolvedRelation {
    pub name: String,
    pub alias: Option<String>,
}

impl UnresolvedRelation {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self { name: name.into(), alias }
    }
}

/// Catalog-backed leaf. Carries only metadata; opening the stored data
/// is the physical scan's concern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Relation {
    pub name: String,
    pub output: Vec<AttributeReference>,
    pub partition_cols: Vec<String>,
}

impl Relation {
    pub fn new(name: impl Into<String>, output: Vec<AttributeReference>) -> Self {
        Self { name: name.into(), output, partition_cols: vec![] }
    }

    pub fn new_partitioned(
        name: impl Into<String>,
        output: Vec<AttributeReference>,
        partition_cols: Vec<String>,
    ) -> Self {
        Self { name: name.into(), output, partition_cols }
    }
}

/// Literal rows, used by tests and as the substrate for inserted data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalRelation {
    pub output: Vec<AttributeReference>,
    pub rows: Vec<GenericRow>,
}

impl LocalRelation {
    pub fn new(output: Vec<AttributeReference>, rows: Vec<GenericRow>) -> Self {
        Self { output, rows }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubqueryAlias {
    pub alias: String,
    pub child: Arc<LogicalPlan>,
}

impl SubqueryAlias {
    pub fn new(alias: impl Into<String>, child: Arc<LogicalPlan>) -> Self {
        Self { alias: alias.into(), child }
    }

    pub fn output(&self) -> Vec<AttributeReference> {
        self.child
            .output()
            .into_iter()
            .map(|a| a.with_qualifier(self.alias.clone()))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Project {
    pub project_list: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Project {
    pub fn new(project_list: Vec<Expr>, child: Arc<LogicalPlan>) -> Self {
        Self { project_list, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    pub condition: Expr,
    pub child: Arc<LogicalPlan>,
}

impl Filter {
    pub fn new(condition: Expr, child: Arc<LogicalPlan>) -> Self {
        Self { condition, child }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Join {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
    pub join_type: JoinType,
    pub condition: Option<Expr>,
}

impl Join {
    pub fn new(
        left: Arc<LogicalPlan>,
        right: Arc<LogicalPlan>,
        join_type: JoinType,
        condition: Option<Expr>,
    ) -> Self {
        Self { left, right, join_type, condition }
    }

    /// Left output then right output, with the non-preserving side(s)
    /// forced nullable.
    pub fn output(&self) -> Vec<AttributeReference> {
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
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortOrder {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, direction: SortDirection::Ascending }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, direction: SortDirection::Descending }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sort {
    pub order: Vec<SortOrder>,
    /// Whether the ordering must hold across the whole output or only
    /// within each partition.
    pub global: bool,
    pub child: Arc<LogicalPlan>,
}

impl Sort {
    pub fn new(order: Vec<SortOrder>, global: bool, child: Arc<LogicalPlan>) -> Self {
        Self { order, global, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Limit {
    pub n: usize,
    pub child: Arc<LogicalPlan>,
}

impl Limit {
    pub fn new(n: usize, child: Arc<LogicalPlan>) -> Self {
        Self { n, child }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Union {
    pub children: Vec<Arc<LogicalPlan>>,
}

impl Union {
    pub fn new(children: Vec<Arc<LogicalPlan>>) -> Self {
        Self { children }
    }

    /// First child's columns; a position is nullable if it is nullable
    /// in any branch.
    pub fn output(&self) -> Vec<AttributeReference> {
        let mut output = self.children[0].output();
        for child in &self.children[1..] {
            for (a, b) in output.iter_mut().zip(child.output()) {
                if b.nullable && !a.nullable {
                    *a = a.with_nullability(true);
                }
            }
        }
        output
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Distinct {
    pub child: Arc<LogicalPlan>,
}

impl Distinct {
    pub fn new(child: Arc<LogicalPlan>) -> Self {
        Self { child }
    }
}

/// Applies a generator to every input row. With `join` the input row is
/// emitted alongside each generated row; with `outer` an input row that
/// generates nothing is still emitted once, padded with nulls.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Generate {
    pub generator: Expr,
    pub join: bool,
    pub outer: bool,
    pub qualifier: Option<String>,
    pub generator_output: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Generate {
    pub fn new(
        generator: Expr,
        join: bool,
        outer: bool,
        qualifier: Option<String>,
        generator_output: Vec<Expr>,
        child: Arc<LogicalPlan>,
    ) -> Self {
        Self { generator, join, outer, qualifier, generator_output, child }
    }

    pub fn resolved(&self) -> bool {
        self.generator.resolved()
            && self.generator_output.iter().all(|e| e.resolved())
            && self.child.resolved()
            && self.generator_output_check()
    }

    fn generator_output_check(&self) -> bool {
        if let Expr::Generator(g) = &self.generator {
            g.element_schema().fields.len() == self.generator_output.len()
        } else {
            false
        }
    }

    pub fn output(&self) -> Vec<AttributeReference> {
        let generated = self.qualified_generator_output();
        if self.join {
            self.child.output().into_iter().chain(generated).collect()
        } else {
            generated
        }
    }

    pub fn qualified_generator_output(&self) -> Vec<AttributeReference> {
        self.generator_output
            .iter()
            .map(|e| match e {
                Expr::AttributeReference(a) => a.clone(),
                Expr::UnresolvedAttribute(a) => AttributeReference::new_with_expr_id(
                    a.name_parts.last().unwrap().clone(),
                    DataType::Null,
                    true,
                    0,
                ),
                e => panic!("{e} is not allowed in generator output"),
            })
            .map(|a| match &self.qualifier {
                Some(q) => a.with_qualifier(q.clone()),
                None => a,
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Aggregate {
    pub grouping_exprs: Vec<Expr>,
    pub aggregate_exprs: Vec<Expr>,
    pub child: Arc<LogicalPlan>,
}

impl Aggregate {
    pub fn new(grouping_exprs: Vec<Expr>, aggregate_exprs: Vec<Expr>, child: Arc<LogicalPlan>) -> Self {
        Self { grouping_exprs, aggregate_exprs, child }
    }

    /// Split the operator into the pieces physical aggregation needs:
    /// named grouping expressions, the distinct aggregate function
    /// calls, and the result expressions with every aggregate call (and
    /// every grouping-expression occurrence) replaced by the attribute
    /// it will be published under.
    ///
    /// Returns `(grouping exprs, aggregate calls, result exprs, child)`.
    pub fn extract_exprs(&self) -> (Vec<Expr>, Vec<Expr>, Vec<Expr>, Arc<LogicalPlan>) {
        use crate::tree_node::TreeNode;

        let mut equivalent_exprs: HashMap<Expr, AttributeReference> = HashMap::new();
        let mut agg_exprs = Vec::new();
        for expr in &self.aggregate_exprs {
            expr.apply(|e| {
                match e {
                    Expr::AggregateFunction(f) => {
                        // force the lazily minted buffer/result ids now,
                        // before the call is cloned into the partial and
                        // final stages
                        f.agg_buffer_attributes();
                        f.input_agg_buffer_attributes();
                        if !equivalent_exprs.contains_key(e) {
                            equivalent_exprs.insert(e.clone(), f.result_attribute());
                            agg_exprs.push(e.clone());
                        }
                    }
                    Expr::TypedAggregateFunction(f) => {
                        f.buffer_attribute();
                        if !equivalent_exprs.contains_key(e) {
                            equivalent_exprs.insert(e.clone(), f.result_attribute());
                            agg_exprs.push(e.clone());
                        }
                    }
                    _ => (),
                }
                Ok(TreeNodeRecursion::Continue)
            })
            .unwrap();
        }

        let mut named_group_exprs = Vec::with_capacity(self.grouping_exprs.len());
        for expr in &self.grouping_exprs {
            match expr {
                Expr::AttributeReference(_) | Expr::Alias(_) => {
                    named_group_exprs.push((expr.clone(), expr.clone()))
                }
                _ => {
                    let with_alias = Expr::Alias(Alias::new(expr.clone(), "group_expr"));
                    named_group_exprs.push((expr.clone(), with_alias));
                }
            }
        }

        let mut rewritten_result_exprs = Vec::with_capacity(self.aggregate_exprs.len());
        for expr in self.aggregate_exprs.clone() {
            let rewritten = expr
                .transform_down(|e| match e {
                    e @ (Expr::AggregateFunction(_) | Expr::TypedAggregateFunction(_)) => {
                        let attr = equivalent_exprs.get(&e).unwrap().clone();
                        Ok(Transformed::yes(Expr::AttributeReference(attr)))
                    }
                    e if !e.foldable() => {
                        for (k, v) in named_group_exprs.iter() {
                            if k == &e {
                                return Ok(Transformed::yes(Expr::AttributeReference(
                                    v.to_attribute().unwrap(),
                                )));
                            }
                        }
                        Ok(Transformed::no(e))
                    }
                    e => Ok(Transformed::no(e)),
                })
                .unwrap()
                .data;
            rewritten_result_exprs.push(rewritten);
        }

        (
            named_group_exprs.into_iter().map(|(_, v)| v).collect(),
            agg_exprs,
            rewritten_result_exprs,
            self.child.clone(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InsertInto {
    pub table: String,
    pub partition_spec: Vec<(String, String)>,
    pub overwrite: bool,
    pub child: Arc<LogicalPlan>,
}

impl InsertInto {
    pub fn new(
        table: impl Into<String>,
        partition_spec: Vec<(String, String)>,
        overwrite: bool,
        child: Arc<LogicalPlan>,
    ) -> Self {
        Self { table: table.into(), partition_spec, overwrite, child }
    }
}
