use crate::expr::*;
use crate::tree_node::{Transformed, TreeNode, TreeNodeContainer, TreeNodeRecursion};
use crate::Result;

impl TreeNode for Expr {
    fn apply_children<'n, F: FnMut(&'n Self) -> Result<TreeNodeRecursion>>(
        &'n self,
        mut f: F,
    ) -> Result<TreeNodeRecursion> {
        for x in self.children() {
            if f(x)? == TreeNodeRecursion::Stop {
                return Ok(TreeNodeRecursion::Stop);
            }
        }
        Ok(TreeNodeRecursion::Continue)
    }

    fn map_children<F: FnMut(Self) -> Result<Transformed<Self>>>(
        self,
        mut f: F,
    ) -> Result<Transformed<Self>> {
        Ok(match self {
            Expr::UnresolvedAttribute(_)
            | Expr::Star(_)
            | Expr::Literal(_)
            | Expr::AttributeReference(_)
            | Expr::BoundReference(_)
            | Expr::NoOp => Transformed::no(self),
            Expr::Alias(Alias { child, name, expr_id }) => f(*child)?
                .update_data(|child| Expr::Alias(Alias::new_with_expr_id(child, name, expr_id))),
            Expr::Cast(Cast { child, data_type }) => f(*child)?.update_data(|e| e.cast(data_type)),
            Expr::Not(child) => f(*child)?.update_data(|e| e.not()),
            Expr::IsNull(child) => f(*child)?.update_data(|e| e.is_null()),
            Expr::IsNotNull(child) => f(*child)?.update_data(|e| e.is_not_null()),
            Expr::BinaryOperator(BinaryOperator { left, op, right }) => (left, right)
                .map_elements(f)?
                .update_data(|(new_left, new_right)| {
                    Expr::BinaryOperator(BinaryOperator::new(new_left, op, new_right))
                }),
            Expr::UnresolvedFunction(UnresolvedFunction { name, arguments }) => {
                arguments.map_elements(f)?.update_data(|arguments| {
                    Expr::UnresolvedFunction(UnresolvedFunction { name, arguments })
                })
            }
            Expr::ScalarFunction(func) => {
                let args = func.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?
                    .update_data(|args| Expr::ScalarFunction(func.rewrite_args(args)))
            }
            Expr::AggregateFunction(func) => {
                let args = func.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?
                    .update_data(|args| Expr::AggregateFunction(func.rewrite_args(args)))
            }
            Expr::TypedAggregateFunction(func) => {
                let args = func.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?
                    .update_data(|args| Expr::TypedAggregateFunction(func.rewrite_args(args)))
            }
            Expr::Generator(g) => {
                let args = g.args().into_iter().cloned().collect::<Vec<_>>();
                args.map_elements(f)?.update_data(|args| Expr::Generator(g.rewrite_args(args)))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_transform_up_rewrites_leaves() {
        let a = AttributeReference::new("a", DataType::Int, true);
        let expr = Expr::AttributeReference(a.clone()) + Expr::int_lit(1);
        let bound = expr
            .transform_up(|e| match e {
                Expr::AttributeReference(attr) => Ok(Transformed::yes(Expr::BoundReference(
                    BoundReference::new(3, attr.data_type, attr.nullable),
                ))),
                e => Ok(Transformed::no(e)),
            })
            .unwrap();
        assert!(bound.transformed);
        match bound.data {
            Expr::BinaryOperator(BinaryOperator { left, .. }) => {
                assert!(matches!(*left, Expr::BoundReference(BoundReference { ordinal: 3, .. })));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_alias_id_survives_child_rewrite() {
        let aliased = (Expr::int_lit(1) + Expr::int_lit(2)).alias("x");
        let id = match &aliased {
            Expr::Alias(a) => a.expr_id,
            _ => unreachable!(),
        };
        let rewritten = aliased
            .transform_up(|e| match e {
                Expr::Literal(_) => Ok(Transformed::yes(Expr::int_lit(9))),
                e => Ok(Transformed::no(e)),
            })
            .unwrap()
            .data;
        match rewritten {
            Expr::Alias(a) => assert_eq!(a.expr_id, id),
            other => panic!("unexpected {other:?}"),
        }
    }
}
