use std::fmt::Debug;

use log::{debug, trace};

use crate::error::QueryError;
use crate::tree_node::Transformed;
use crate::Result;

/// A named partial transformation over a plan. Rules return the plan
/// unchanged (with `transformed == false`) wherever they do not apply.
pub trait Rule<P>: Debug {
    fn name(&self) -> &str;

    fn apply(&self, plan: P) -> Result<Transformed<P>>;
}

/// How often a batch runs: a single pass, or repeated until a pass
/// leaves the plan structurally unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Strategy {
    Once,
    FixedPoint(usize),
}

impl Strategy {
    fn max_iterations(&self) -> usize {
        match self {
            Strategy::Once => 1,
            Strategy::FixedPoint(max) => *max,
        }
    }
}

pub struct Batch<P> {
    pub name: String,
    pub strategy: Strategy,
    pub rules: Vec<Box<dyn Rule<P>>>,
}

impl<P> Batch<P> {
    pub fn new(name: impl Into<String>, strategy: Strategy, rules: Vec<Box<dyn Rule<P>>>) -> Self {
        Self { name: name.into(), strategy, rules }
    }
}

/// A structural property the plan must satisfy between batches.
pub struct Invariant<P> {
    pub description: String,
    pub check: Box<dyn Fn(&P) -> bool>,
}

impl<P> Invariant<P> {
    pub fn new(description: impl Into<String>, check: impl Fn(&P) -> bool + 'static) -> Self {
        Self { description: description.into(), check: Box::new(check) }
    }
}

/// Runs batches of rules in order. Within a batch, rules apply
/// sequentially and the whole batch re-runs until the plan stops
/// changing or the iteration budget is exhausted. Declared invariants
/// are asserted after every batch.
pub struct RuleExecutor<P> {
    pub batches: Vec<Batch<P>>,
    pub invariants: Vec<Invariant<P>>,
}

impl<P: Clone + PartialEq + Debug> RuleExecutor<P> {
    pub fn new(batches: Vec<Batch<P>>) -> Self {
        Self { batches, invariants: Vec::new() }
    }

    pub fn with_invariants(batches: Vec<Batch<P>>, invariants: Vec<Invariant<P>>) -> Self {
        Self { batches, invariants }
    }

    pub fn execute(&self, plan: P) -> Result<P> {
        let mut current = plan;
        for batch in &self.batches {
            let max_iterations = batch.strategy.max_iterations();
            let mut iteration = 0;
            loop {
                iteration += 1;
                let before = current.clone();
                for rule in &batch.rules {
                    let result = rule.apply(current)?;
                    if result.transformed {
                        trace!("rule {} changed the plan", rule.name());
                    }
                    current = result.data;
                }
                if current == before {
                    break;
                }
                if iteration >= max_iterations {
                    if batch.strategy == Strategy::Once {
                        break;
                    }
                    return Err(QueryError::RuleFixpointExceeded {
                        batch: batch.name.clone(),
                        max_iterations,
                    });
                }
            }
            debug!("batch {} settled after {} iteration(s)", batch.name, iteration);
            for invariant in &self.invariants {
                if !(invariant.check)(&current) {
                    return Err(QueryError::InvariantViolated {
                        batch: batch.name.clone(),
                        description: invariant.description.clone(),
                    });
                }
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Decrement;

    impl Rule<i64> for Decrement {
        fn name(&self) -> &str {
            "Decrement"
        }

        fn apply(&self, plan: i64) -> Result<Transformed<i64>> {
            if plan > 0 {
                Ok(Transformed::yes(plan - 1))
            } else {
                Ok(Transformed::no(plan))
            }
        }
    }

    #[derive(Debug)]
    struct Oscillate;

    impl Rule<i64> for Oscillate {
        fn name(&self) -> &str {
            "Oscillate"
        }

        fn apply(&self, plan: i64) -> Result<Transformed<i64>> {
            Ok(Transformed::yes(-plan))
        }
    }

    #[test]
    fn test_fixed_point_converges() {
        let executor = RuleExecutor::new(vec![Batch::new(
            "shrink",
            Strategy::FixedPoint(100),
            vec![Box::new(Decrement)],
        )]);
        assert_eq!(executor.execute(7).unwrap(), 0);
    }

    #[test]
    fn test_once_runs_single_pass() {
        let executor = RuleExecutor::new(vec![Batch::new(
            "shrink",
            Strategy::Once,
            vec![Box::new(Decrement)],
        )]);
        assert_eq!(executor.execute(7).unwrap(), 6);
    }

    #[test]
    fn test_fixpoint_overflow_is_reported() {
        let executor = RuleExecutor::new(vec![Batch::new(
            "flip",
            Strategy::FixedPoint(5),
            vec![Box::new(Oscillate)],
        )]);
        let err = executor.execute(1).unwrap_err();
        assert!(matches!(err, QueryError::RuleFixpointExceeded { .. }));
    }

    #[test]
    fn test_invariant_violation_names_batch() {
        let executor = RuleExecutor::with_invariants(
            vec![Batch::new("shrink", Strategy::FixedPoint(100), vec![Box::new(Decrement)])],
            vec![Invariant::new("plan stays positive", |p: &i64| *p > 0)],
        );
        let err = executor.execute(3).unwrap_err();
        match err {
            QueryError::InvariantViolated { batch, description } => {
                assert_eq!(batch, "shrink");
                assert_eq!(description, "plan stays positive");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
