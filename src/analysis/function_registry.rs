use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::expr::aggregate::{Average, Count, CountDistinct, CreateAggregateFunction, Sum};
use crate::expr::{
    Coalesce, Expr, Explode, GeneratorFromArgs, If, Rand, ScalarUdf, UdfImpl,
};
use crate::types::{AbstractDataType, DataType};
use crate::{QueryError, Result};

type FunctionBuilder = dyn Fn(Vec<Expr>) -> Result<Expr> + Send + Sync;

/// Name-to-builder table the analyzer consults for
/// `UnresolvedFunction`. Read-only after construction; user functions
/// are registered up front with [`FunctionRegistry::register_udf`].
pub struct FunctionRegistry {
    expressions: HashMap<String, Box<FunctionBuilder>>,
}

impl Debug for FunctionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut names = self.expressions.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

macro_rules! register_builtins {
    ($expressions:ident, $($($names:literal)|+ => $builder:expr),* $(,)?) => {
        $(
            $(
                $expressions.insert($names.to_string(), Box::new($builder) as Box<FunctionBuilder>);
            )+
        )*
    };
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self { expressions: HashMap::new() }
    }

    /// Registry with the built-in functions.
    pub fn builtin() -> Self {
        let mut expressions: HashMap<String, Box<FunctionBuilder>> = HashMap::new();
        register_builtins!(expressions,
            "if" => |args| Ok(Expr::ScalarFunction(If::from_args(args)?)),
            "coalesce" | "nvl" => |args| Ok(Expr::ScalarFunction(Coalesce::from_args(args)?)),
            "rand" => |args| Ok(Expr::ScalarFunction(Rand::from_args(args)?)),
            "count" => Count::create_function_expr,
            "sum" => Sum::create_function_expr,
            "avg" | "average" => Average::create_function_expr,
            "count_distinct" => CountDistinct::create_function_expr,
            "explode" => Explode::create_function_expr,
        );
        Self { expressions }
    }

    pub fn lookup_function(&self, name: &str, args: Vec<Expr>) -> Result<Expr> {
        match self.expressions.get(name) {
            Some(builder) => builder(args).map_err(|e| match e {
                QueryError::Analysis { message, plan } => QueryError::Analysis {
                    message: format!("invalid arguments for function {name}: {message}"),
                    plan,
                },
                e => e,
            }),
            None => Err(QueryError::FunctionNotFound(name.to_string())),
        }
    }

    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        builder: impl Fn(Vec<Expr>) -> Result<Expr> + Send + Sync + 'static,
    ) {
        self.expressions.insert(name.into(), Box::new(builder));
    }

    /// Register a user-defined scalar function under `name`.
    pub fn register_udf(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        input_types: Option<Vec<AbstractDataType>>,
        fun: Arc<UdfImpl>,
    ) {
        let name = name.into();
        let udf_name = name.clone();
        self.register_function(name, move |args| {
            Ok(Expr::ScalarFunction(Box::new(ScalarUdf::new(
                udf_name.clone(),
                data_type.clone(),
                input_types.clone(),
                args,
                fun.clone(),
            ))))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::builtin();
        let err = registry.lookup_function("no_such_fn", vec![]).unwrap_err();
        assert_eq!(err, QueryError::FunctionNotFound("no_such_fn".to_string()));
    }

    #[test]
    fn test_builtin_count_resolves() {
        let registry = FunctionRegistry::builtin();
        let expr = registry.lookup_function("count", vec![Expr::int_lit(1)]).unwrap();
        assert!(matches!(expr, Expr::AggregateFunction(_)));
    }

    #[test]
    fn test_udf_lookup_builds_wrapper() {
        let mut registry = FunctionRegistry::builtin();
        registry.register_udf(
            "plus_one",
            DataType::Int,
            None,
            Arc::new(|args| match &args[0] {
                crate::data::Value::Int(v) => Ok(crate::data::Value::Int(v + 1)),
                _ => Ok(crate::data::Value::Null),
            }),
        );
        let expr = registry.lookup_function("plus_one", vec![Expr::int_lit(1)]).unwrap();
        assert!(matches!(expr, Expr::ScalarFunction(_)));
    }
}
