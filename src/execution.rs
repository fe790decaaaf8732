use std::sync::Arc;

use crate::analysis::{Analyzer, FunctionRegistry};
use crate::catalog::Catalog;
use crate::data::GenericRow;
use crate::logical_plan::LogicalPlan;
use crate::optimizer::Optimizer;
use crate::physical_plan::{collect, PhysicalPlan, QueryPlanner};
use crate::Result;

/// The full compilation pipeline: analyze, optimize, plan, and (for
/// drivers and tests) collect. Each stage is also exposed on its own
/// so callers can print the intermediate trees.
pub struct QueryExecution {
    analyzer: Analyzer,
    optimizer: Optimizer,
    planner: QueryPlanner,
}

impl QueryExecution {
    pub fn new(catalog: Arc<dyn Catalog>, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            analyzer: Analyzer::new(catalog.clone(), registry),
            optimizer: Optimizer::new(),
            planner: QueryPlanner::new(catalog),
        }
    }

    pub fn with_partitions(
        catalog: Arc<dyn Catalog>,
        registry: Arc<FunctionRegistry>,
        num_partitions: usize,
    ) -> Self {
        Self {
            analyzer: Analyzer::new(catalog.clone(), registry),
            optimizer: Optimizer::new(),
            planner: QueryPlanner::with_partitions(catalog, num_partitions),
        }
    }

    pub fn analyzed(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        self.analyzer.analyze(plan)
    }

    pub fn optimized(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        self.optimizer.optimize(self.analyzer.analyze(plan)?)
    }

    pub fn physical_plan(&self, plan: LogicalPlan) -> Result<Arc<dyn PhysicalPlan>> {
        let optimized = self.optimized(plan)?;
        self.planner.plan(&optimized)
    }

    /// Compile and run the plan, draining every output partition.
    pub fn execute(&self, plan: LogicalPlan) -> Result<Vec<GenericRow>> {
        let physical = self.physical_plan(plan)?;
        collect(physical.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{MemoryCatalog, Table};
    use crate::data::{Row, Value};
    use crate::expr::{col, Expr, Generator, GeneratorFromArgs, UnresolvedFunction};
    use crate::logical_plan::*;
    use crate::physical_expr::{PhysicalGenerator, UdtfGenerator};
    use crate::physical_plan::{tree_string, HashEquiJoin};
    use crate::types::{DataType, Field, Schema};
    use crate::QueryError;

    fn rows_of_ints(values: &[&[Option<i32>]]) -> Vec<GenericRow> {
        values
            .iter()
            .map(|row| {
                GenericRow::new(
                    row.iter().map(|v| v.map(Value::Int).unwrap_or(Value::Null)).collect(),
                )
            })
            .collect()
    }

    fn init_logging() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let _ = flexi_logger::Logger::try_with_env_or_str("info").and_then(|l| l.start());
        });
    }

    fn setup() -> (Arc<MemoryCatalog>, QueryExecution) {
        init_logging();
        let catalog = Arc::new(MemoryCatalog::new());
        let execution = QueryExecution::new(catalog.clone(), Arc::new(FunctionRegistry::builtin()));
        (catalog, execution)
    }

    fn scan(name: &str) -> Arc<LogicalPlan> {
        Arc::new(LogicalPlan::UnresolvedRelation(UnresolvedRelation::new(name, None)))
    }

    fn count_of(column: &str) -> Expr {
        Expr::UnresolvedFunction(UnresolvedFunction::new("count", vec![col(column)]))
    }

    #[test]
    fn test_count_over_empty_input_returns_one_zero_row() {
        let (catalog, execution) = setup();
        catalog.register_table(Table::new(
            "r",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![],
            vec![count_of("a").alias("n")],
            scan("r"),
        ));
        let rows = execution.execute(plan).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), &Value::Long(0));
    }

    #[test]
    fn test_aggregate_empty_results_for_sum_and_average() {
        let (catalog, execution) = setup();
        catalog.register_table(Table::new(
            "r",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        let sum = Expr::UnresolvedFunction(UnresolvedFunction::new("sum", vec![col("a")]));
        let avg = Expr::UnresolvedFunction(UnresolvedFunction::new("avg", vec![col("a")]));
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![],
            vec![sum.alias("s"), avg.alias("m"), count_of("a").alias("n")],
            scan("r"),
        ));
        let rows = execution.execute(plan).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), &Value::Null);
        assert_eq!(rows[0].get(1), &Value::Null);
        assert_eq!(rows[0].get(2), &Value::Long(0));
    }

    #[test]
    fn test_grouped_aggregate_across_partitions() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "events",
            Schema::new(vec![Field::new("k", DataType::Int), Field::new("v", DataType::Int)]),
            vec![],
        ));
        // two physical partitions force a partial/final split with an
        // exchange in between
        table.insert(vec![], rows_of_ints(&[&[Some(1), Some(10)], &[Some(2), Some(20)]]), false);
        table.insert(
            vec![],
            rows_of_ints(&[&[Some(1), Some(5)], &[Some(2), None], &[Some(1), Some(1)]]),
            false,
        );
        let sum = Expr::UnresolvedFunction(UnresolvedFunction::new("sum", vec![col("v")]));
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![col("k")],
            vec![col("k"), sum.alias("total"), count_of("v").alias("n")],
            scan("events"),
        ));
        let mut rows = execution.execute(plan).unwrap();
        rows.sort_by_key(|r| r.get_int(0));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), &Value::Int(1));
        assert_eq!(rows[0].get(1), &Value::Long(16));
        assert_eq!(rows[0].get(2), &Value::Long(3));
        assert_eq!(rows[1].get(0), &Value::Int(2));
        assert_eq!(rows[1].get(1), &Value::Long(20));
        assert_eq!(rows[1].get(2), &Value::Long(1));
    }

    #[test]
    fn test_count_distinct_plans_single_level() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "r",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        table.insert(
            vec![],
            rows_of_ints(&[&[Some(1)], &[Some(2)], &[Some(1)], &[None], &[Some(3)]]),
            false,
        );
        let distinct =
            Expr::UnresolvedFunction(UnresolvedFunction::new("count_distinct", vec![col("a")]));
        let plan = LogicalPlan::Aggregate(Aggregate::new(
            vec![],
            vec![distinct.alias("n")],
            scan("r"),
        ));
        let physical = execution.physical_plan(plan.clone()).unwrap();
        // no partial stage: exactly one Aggregate in the tree
        let rendered = tree_string(physical.as_ref());
        assert_eq!(rendered.matches("Aggregate").count(), 1);
        let rows = execution.execute(plan).unwrap();
        assert_eq!(rows[0].get(0), &Value::Long(3));
    }

    #[test]
    fn test_equi_join_strategy_selection_and_execution() {
        let (catalog, execution) = setup();
        let l = catalog.register_table(Table::new(
            "l",
            Schema::new(vec![Field::new("k", DataType::Int), Field::new("v", DataType::Int)]),
            vec![],
        ));
        let r = catalog.register_table(Table::new(
            "r",
            Schema::new(vec![Field::new("k", DataType::Int), Field::new("w", DataType::Int)]),
            vec![],
        ));
        l.insert(
            vec![],
            rows_of_ints(&[&[Some(1), Some(10)], &[Some(2), Some(1)], &[None, Some(9)]]),
            false,
        );
        r.insert(
            vec![],
            rows_of_ints(&[&[Some(1), Some(5)], &[Some(2), Some(7)], &[None, Some(8)]]),
            false,
        );
        let condition = crate::expr::qualified_col("l", "k")
            .eq_expr(crate::expr::qualified_col("r", "k"))
            .and(col("v").gt(col("w")));
        let join = LogicalPlan::Join(Join::new(
            Arc::new(LogicalPlan::SubqueryAlias(SubqueryAlias::new("l", scan("l")))),
            Arc::new(LogicalPlan::SubqueryAlias(SubqueryAlias::new("r", scan("r")))),
            JoinType::Inner,
            Some(condition),
        ));
        // the join plans as Filter(v > w) over HashEquiJoin on k
        let physical = execution.physical_plan(join.clone()).unwrap();
        let rendered = tree_string(physical.as_ref());
        assert!(rendered.contains("Filter"), "missing residual filter:\n{rendered}");
        assert!(rendered.contains("HashEquiJoin"), "missing hash join:\n{rendered}");
        assert!(rendered.contains("Exchange"), "missing exchanges:\n{rendered}");
        // l.k = 1 matches (10 > 5): kept; l.k = 2 matches but 1 > 7
        // fails; null keys never join
        let rows = execution.execute(join).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), &Value::Int(1));
        assert_eq!(rows[0].get(3), &Value::Int(5));
    }

    #[test]
    fn test_join_without_equality_uses_nested_loop_or_cartesian() {
        let (catalog, execution) = setup();
        for name in ["a", "b"] {
            let t = catalog.register_table(Table::new(
                name,
                Schema::new(vec![Field::new(format!("{name}_v"), DataType::Int)]),
                vec![],
            ));
            t.insert(vec![], rows_of_ints(&[&[Some(1)], &[Some(2)]]), false);
        }
        let with_condition = LogicalPlan::Join(Join::new(
            scan("a"),
            scan("b"),
            JoinType::Inner,
            Some(col("a_v").gt(col("b_v"))),
        ));
        let physical = execution.physical_plan(with_condition.clone()).unwrap();
        assert!(tree_string(physical.as_ref()).contains("BroadcastNestedLoopJoin"));
        let rows = execution.execute(with_condition).unwrap();
        assert_eq!(rows.len(), 1); // only (2, 1)

        let cartesian =
            LogicalPlan::Join(Join::new(scan("a"), scan("b"), JoinType::Inner, None));
        let physical = execution.physical_plan(cartesian.clone()).unwrap();
        assert!(tree_string(physical.as_ref()).contains("CartesianProduct"));
        assert_eq!(execution.execute(cartesian).unwrap().len(), 4);
    }

    #[test]
    fn test_full_outer_join_pads_unmatched_sides() {
        let (catalog, execution) = setup();
        let a = catalog.register_table(Table::new(
            "fa",
            Schema::new(vec![Field::new("x", DataType::Int)]),
            vec![],
        ));
        let b = catalog.register_table(Table::new(
            "fb",
            Schema::new(vec![Field::new("y", DataType::Int)]),
            vec![],
        ));
        a.insert(vec![], rows_of_ints(&[&[Some(1)], &[Some(5)]]), false);
        b.insert(vec![], rows_of_ints(&[&[Some(1)], &[Some(7)]]), false);
        let plan = LogicalPlan::Join(Join::new(
            scan("fa"),
            scan("fb"),
            JoinType::FullOuter,
            Some(col("x").eq_expr(col("y"))),
        ));
        let rows = execution.execute(plan).unwrap();
        // (1,1) matched, 5 unmatched on the streamed side, 7 unmatched
        // on the broadcast side: exactly one padded row each
        assert_eq!(rows.len(), 3);
        let padded_left =
            rows.iter().filter(|r| r.is_null(0)).collect::<Vec<_>>();
        let padded_right =
            rows.iter().filter(|r| r.is_null(1)).collect::<Vec<_>>();
        assert_eq!(padded_left.len(), 1);
        assert_eq!(padded_left[0].get(1), &Value::Int(7));
        assert_eq!(padded_right.len(), 1);
        assert_eq!(padded_right[0].get(0), &Value::Int(5));
    }

    #[test]
    fn test_three_valued_logic_in_filters() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "t3",
            Schema::new(vec![Field::new("a", DataType::Int), Field::new("b", DataType::Int)]),
            vec![],
        ));
        table.insert(vec![], rows_of_ints(&[&[None, Some(2)]]), false);
        // a > 1 AND b > 1 is null for (null, 2): row dropped
        let filtered = LogicalPlan::Project(Project::new(
            vec![col("a"), col("b")],
            Arc::new(LogicalPlan::Filter(Filter::new(
                col("a").gt(Expr::int_lit(1)).and(col("b").gt(Expr::int_lit(1))),
                scan("t3"),
            ))),
        ));
        assert!(execution.execute(filtered).unwrap().is_empty());
        // IS NULL observes the null directly
        let is_null = LogicalPlan::Project(Project::new(
            vec![col("a"), col("b")],
            Arc::new(LogicalPlan::Filter(Filter::new(col("a").is_null(), scan("t3")))),
        ));
        assert_eq!(execution.execute(is_null).unwrap().len(), 1);
    }

    /// Two commentary lines per person, used to pin down generator
    /// semantics end to end.
    #[derive(Debug, Clone)]
    struct AgeCommentary {
        name: Box<Expr>,
        age: Box<Expr>,
        element_schema: Schema,
        data_type: DataType,
    }

    impl AgeCommentary {
        fn new(name: Expr, age: Expr) -> Self {
            let element_schema = Schema::new(vec![Field::new("phrase", DataType::String)]);
            let data_type = DataType::Array(Box::new(element_schema.to_struct_type()), true);
            Self { name: Box::new(name), age: Box::new(age), element_schema, data_type }
        }
    }

    impl GeneratorFromArgs for AgeCommentary {
        fn from_args(args: Vec<Expr>) -> crate::Result<Box<dyn Generator>> {
            let mut iter = args.into_iter();
            let name = iter.next().unwrap();
            let age = iter.next().unwrap();
            Ok(Box::new(AgeCommentary::new(name, age)))
        }
    }

    impl Generator for AgeCommentary {
        fn name(&self) -> &str {
            "age_commentary"
        }

        fn element_schema(&self) -> Schema {
            self.element_schema.clone()
        }

        fn data_type(&self) -> &DataType {
            &self.data_type
        }

        fn args(&self) -> Vec<&Expr> {
            vec![&self.name, &self.age]
        }

        fn physical_generator(&self) -> crate::Result<Box<dyn PhysicalGenerator>> {
            let children = vec![
                crate::physical_expr::create_physical_expr(&self.name)?,
                crate::physical_expr::create_physical_expr(&self.age)?,
            ];
            Ok(Box::new(UdtfGenerator {
                children,
                fun: Arc::new(|args| {
                    let name = args[0].get_string().to_string();
                    let age = args[1].get_int();
                    Ok(vec![
                        GenericRow::new(vec![Value::string(format!("{name} is {age} years old"))]),
                        GenericRow::new(vec![Value::string(format!(
                            "Next year, {name} will be {} years old",
                            age + 1
                        ))]),
                    ])
                }),
            }))
        }
    }

    #[test]
    fn test_generator_produces_two_rows_per_input() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "people",
            Schema::new(vec![
                Field::new("name", DataType::String),
                Field::new("age", DataType::Int),
            ]),
            vec![],
        ));
        table.insert(
            vec![],
            vec![GenericRow::new(vec![Value::string("michael"), Value::Int(29)])],
            false,
        );
        let generator = Expr::Generator(Box::new(AgeCommentary::new(col("name"), col("age"))));
        let plan = LogicalPlan::Generate(Generate::new(
            generator,
            false,
            false,
            None,
            vec![],
            scan("people"),
        ));
        let rows = execution.execute(plan).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_string(0), "michael is 29 years old");
        assert_eq!(rows[1].get_string(0), "Next year, michael will be 30 years old");
    }

    #[test]
    fn test_projection_pushes_through_to_scan() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "wide",
            Schema::new(vec![
                Field::new("a", DataType::Int),
                Field::new("b", DataType::Int),
                Field::new("c", DataType::Int),
            ]),
            vec![],
        ));
        table.insert(vec![], rows_of_ints(&[&[Some(1), Some(2), Some(3)]]), false);
        let plan = LogicalPlan::Project(Project::new(vec![col("c"), col("a")], scan("wide")));
        let physical = execution.physical_plan(plan.clone()).unwrap();
        let rendered = tree_string(physical.as_ref());
        // no Project operator: the scan itself was narrowed
        assert!(!rendered.contains("Project"), "projection not pushed:\n{rendered}");
        let rows = execution.execute(plan).unwrap();
        assert_eq!(rows[0].get(0), &Value::Int(3));
        assert_eq!(rows[0].get(1), &Value::Int(1));
    }

    #[test]
    fn test_partition_pruning_splits_predicates() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "logs",
            Schema::new(vec![
                Field::new("dt", DataType::String),
                Field::new("v", DataType::Int),
            ]),
            vec!["dt".to_string()],
        ));
        table.insert(
            vec![("dt".to_string(), "2024-01-01".to_string())],
            vec![
                GenericRow::new(vec![Value::string("2024-01-01"), Value::Int(1)]),
                GenericRow::new(vec![Value::string("2024-01-01"), Value::Int(9)]),
            ],
            false,
        );
        table.insert(
            vec![("dt".to_string(), "2024-01-02".to_string())],
            vec![GenericRow::new(vec![Value::string("2024-01-02"), Value::Int(7)])],
            false,
        );
        let plan = LogicalPlan::Filter(Filter::new(
            col("dt").eq_expr(Expr::string_lit("2024-01-01")).and(col("v").gt(Expr::int_lit(3))),
            scan("logs"),
        ));
        let physical = execution.physical_plan(plan.clone()).unwrap();
        let rendered = tree_string(physical.as_ref());
        assert!(rendered.contains("pruning"), "no pruning predicate on scan:\n{rendered}");
        let rows = execution.execute(plan).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(1), &Value::Int(9));
    }

    #[test]
    fn test_distinct_sort_and_limit() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "d",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        table.insert(
            vec![],
            rows_of_ints(&[&[Some(3)], &[Some(1)], &[Some(3)], &[Some(2)], &[Some(1)]]),
            false,
        );
        let plan = LogicalPlan::Limit(Limit::new(
            2,
            Arc::new(LogicalPlan::Sort(Sort::new(
                vec![SortOrder::asc(col("a"))],
                true,
                Arc::new(LogicalPlan::Distinct(Distinct::new(scan("d")))),
            ))),
        ));
        let rows = execution.execute(plan).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.get_int(0)).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_union_concatenates_children() {
        let (catalog, execution) = setup();
        for (name, v) in [("u1", 1), ("u2", 2)] {
            let t = catalog.register_table(Table::new(
                name,
                Schema::new(vec![Field::new("a", DataType::Int)]),
                vec![],
            ));
            t.insert(vec![], rows_of_ints(&[&[Some(v)]]), false);
        }
        let plan = LogicalPlan::Union(Union::new(vec![scan("u1"), scan("u2")]));
        let mut values = execution
            .execute(plan)
            .unwrap()
            .iter()
            .map(|r| r.get_int(0))
            .collect::<Vec<_>>();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_insert_into_writes_back_to_catalog() {
        let (catalog, execution) = setup();
        let source = catalog.register_table(Table::new(
            "src",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        catalog.register_table(Table::new(
            "dst",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        source.insert(vec![], rows_of_ints(&[&[Some(1)], &[Some(2)]]), false);
        let plan = LogicalPlan::InsertInto(InsertInto::new("dst", vec![], false, scan("src")));
        assert!(execution.execute(plan).unwrap().is_empty());
        let dst = catalog.lookup_table("dst").unwrap();
        assert_eq!(dst.partitions().iter().map(|p| p.rows.len()).sum::<usize>(), 2);
    }

    #[test]
    fn test_division_by_zero_surfaces_at_execution() {
        let (catalog, execution) = setup();
        let table = catalog.register_table(Table::new(
            "z",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        table.insert(vec![], rows_of_ints(&[&[Some(1)]]), false);
        let plan = LogicalPlan::Project(Project::new(
            vec![(col("a") / (col("a") - col("a"))).alias("x")],
            scan("z"),
        ));
        let err = execution.execute(plan).unwrap_err();
        assert_eq!(err, QueryError::DivisionByZero);
    }

    #[test]
    fn test_plan_later_never_survives() {
        let (catalog, execution) = setup();
        catalog.register_table(Table::new(
            "p",
            Schema::new(vec![Field::new("a", DataType::Int)]),
            vec![],
        ));
        let plan = LogicalPlan::Filter(Filter::new(col("a").gt(Expr::int_lit(0)), scan("p")));
        let physical = execution.physical_plan(plan).unwrap();
        fn no_plan_later(plan: &dyn crate::physical_plan::PhysicalPlan) {
            assert!(plan.as_any().downcast_ref::<crate::physical_plan::PlanLater>().is_none());
            for c in plan.children() {
                no_plan_later(c.as_ref());
            }
        }
        no_plan_later(physical.as_ref());
    }

    #[test]
    fn test_equi_join_partitions_are_aligned() {
        // one side a single-partition local relation, the other a
        // multi-partition table: the exchange pass must co-partition
        let (catalog, execution) = setup();
        let big = catalog.register_table(Table::new(
            "big",
            Schema::new(vec![Field::new("k", DataType::Int)]),
            vec![],
        ));
        big.insert(vec![], rows_of_ints(&[&[Some(1)], &[Some(2)]]), false);
        big.insert(vec![], rows_of_ints(&[&[Some(3)], &[Some(1)]]), false);
        let small = catalog.register_table(Table::new(
            "small",
            Schema::new(vec![Field::new("j", DataType::Int)]),
            vec![],
        ));
        small.insert(vec![], rows_of_ints(&[&[Some(1)]]), false);
        let plan = LogicalPlan::Join(Join::new(
            scan("big"),
            scan("small"),
            JoinType::Inner,
            Some(col("k").eq_expr(col("j"))),
        ));
        let physical = execution.physical_plan(plan.clone()).unwrap();
        fn find_join(
            plan: &dyn crate::physical_plan::PhysicalPlan,
        ) -> Option<(usize, usize)> {
            if plan.as_any().downcast_ref::<HashEquiJoin>().is_some() {
                let children = plan.children();
                return Some((
                    children[0].output_partitioning().num_partitions(),
                    children[1].output_partitioning().num_partitions(),
                ));
            }
            plan.children().iter().find_map(|c| find_join(c.as_ref()))
        }
        let (l, r) = find_join(physical.as_ref()).expect("hash join missing");
        assert_eq!(l, r);
        let rows = execution.execute(plan).unwrap();
        assert_eq!(rows.len(), 2); // k=1 appears twice
    }
}
