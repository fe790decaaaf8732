use std::any::Any;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::data::Value;
use crate::error::QueryError;
use crate::expr::aggregate::{AggregateFunction, TypedAggregateFunction};
use crate::expr::binary_expr;
use crate::expr::generator::Generator;
use crate::physical_expr::{can_cast, PhysicalExpr};
use crate::tree_node::{Transformed, TreeNode, TreeNodeContainer, TreeNodeRecursion};
use crate::types::{AbstractDataType, DataType};
use crate::{Operator, Result};

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub enum Expr {
    UnresolvedAttribute(UnresolvedAttribute),
    UnresolvedFunction(UnresolvedFunction),
    Star(Option<String>),
    Literal(Literal),
    AttributeReference(AttributeReference),
    BoundReference(BoundReference),
    Alias(Alias),
    Cast(Cast),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    BinaryOperator(BinaryOperator),
    ScalarFunction(Box<dyn ScalarFunction>),
    AggregateFunction(Box<dyn AggregateFunction>),
    TypedAggregateFunction(Box<dyn TypedAggregateFunction>),
    Generator(Box<dyn Generator>),
    /// Placeholder slot in aggregation buffers driven imperatively.
    NoOp,
}

impl Expr {
    /// True iff the subtree evaluates to the same literal on every row:
    /// only literals and pure functions of foldable arguments. Named
    /// expressions are never folded so aliases survive optimization.
    pub fn foldable(&self) -> bool {
        match self {
            Expr::UnresolvedAttribute(_)
            | Expr::UnresolvedFunction(_)
            | Expr::Star(_)
            | Expr::BoundReference(_)
            | Expr::NoOp => false,
            Expr::AttributeReference(_) | Expr::Alias(_) => false,
            Expr::AggregateFunction(_) | Expr::TypedAggregateFunction(_) | Expr::Generator(_) => false,
            Expr::Literal(_) => true,
            Expr::ScalarFunction(f) => f.foldable(),
            _ => self.children().iter().all(|c| c.foldable()),
        }
    }

    /// The expression's type. Panics when called on an unresolved node;
    /// the analyzer guarantees resolution before anyone asks.
    pub fn data_type(&self) -> &DataType {
        match self {
            Expr::UnresolvedAttribute(_) | Expr::UnresolvedFunction(_) | Expr::Star(_) | Expr::NoOp => {
                panic!("data_type on unresolved expression {self:?}")
            }
            Expr::Literal(l) => &l.data_type,
            Expr::AttributeReference(a) => &a.data_type,
            Expr::BoundReference(b) => &b.data_type,
            Expr::Alias(a) => a.child.data_type(),
            Expr::Cast(c) => &c.data_type,
            Expr::Not(_) | Expr::IsNull(_) | Expr::IsNotNull(_) => DataType::boolean_type(),
            Expr::BinaryOperator(BinaryOperator { left, op, right: _ }) => {
                if op.is_arithmetic() {
                    left.data_type()
                } else {
                    DataType::boolean_type()
                }
            }
            Expr::ScalarFunction(f) => f.data_type(),
            Expr::AggregateFunction(f) => f.data_type(),
            Expr::TypedAggregateFunction(f) => f.data_type(),
            Expr::Generator(g) => g.data_type(),
        }
    }

    /// Conservative null propagation: anything fed a nullable input is
    /// nullable, and division/remainder are nullable regardless.
    pub fn nullable(&self) -> bool {
        match self {
            Expr::Literal(l) => l.value.is_null(),
            Expr::AttributeReference(a) => a.nullable,
            Expr::BoundReference(b) => b.nullable,
            Expr::Alias(a) => a.child.nullable(),
            Expr::Cast(c) => c.child.nullable(),
            Expr::IsNull(_) | Expr::IsNotNull(_) => false,
            Expr::Not(child) => child.nullable(),
            Expr::BinaryOperator(BinaryOperator { left, op, right }) => {
                matches!(op, Operator::Divide | Operator::Remainder)
                    || left.nullable()
                    || right.nullable()
            }
            Expr::ScalarFunction(f) => f.nullable(),
            Expr::AggregateFunction(f) => f.nullable(),
            Expr::TypedAggregateFunction(_) => true,
            Expr::Generator(_) => false,
            _ => true,
        }
    }

    /// All attribute references appearing in the subtree.
    pub fn references(&self) -> Vec<AttributeReference> {
        self.collect(|e| match e {
            Expr::AttributeReference(a) => Some(a.clone()),
            _ => None,
        })
        .unwrap()
    }

    pub fn resolved(&self) -> bool {
        match self {
            Expr::UnresolvedAttribute(_) | Expr::UnresolvedFunction(_) | Expr::Star(_) => false,
            _ => self.children_resolved() && self.check_input_data_types().is_ok(),
        }
    }

    pub fn children_resolved(&self) -> bool {
        self.children().iter().all(|c| c.resolved())
    }

    pub fn check_input_data_types(&self) -> Result<()> {
        match self {
            Expr::UnresolvedAttribute(_)
            | Expr::UnresolvedFunction(_)
            | Expr::Star(_)
            | Expr::Literal(_)
            | Expr::AttributeReference(_)
            | Expr::BoundReference(_)
            | Expr::Alias(_)
            | Expr::NoOp => Ok(()),
            Expr::Cast(Cast { child, data_type }) => {
                let from = child.data_type();
                if can_cast(from, data_type) {
                    Ok(())
                } else {
                    Err(QueryError::IncompatibleTypes(from.clone(), data_type.clone()))
                }
            }
            Expr::Not(child) => {
                if child.data_type() != DataType::boolean_type() {
                    Err(QueryError::analysis(
                        format!("NOT requires boolean, not {}", child.data_type()),
                        self.to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            Expr::IsNull(_) | Expr::IsNotNull(_) => Ok(()),
            Expr::BinaryOperator(BinaryOperator { left, op, right }) => {
                if left.data_type() != right.data_type() {
                    return Err(QueryError::IncompatibleTypes(
                        left.data_type().clone(),
                        right.data_type().clone(),
                    ));
                }
                if op.is_arithmetic() && !left.data_type().is_numeric_type() {
                    Err(QueryError::analysis(
                        format!("{op} requires numeric operands, not {}", left.data_type()),
                        self.to_string(),
                    ))
                } else if op.is_comparison() && !left.data_type().is_comparable() {
                    Err(QueryError::analysis(
                        format!("{op} requires comparable operands, not {}", left.data_type()),
                        self.to_string(),
                    ))
                } else if op.is_logical() && left.data_type() != DataType::boolean_type() {
                    Err(QueryError::analysis(
                        format!("{op} requires boolean operands, not {}", left.data_type()),
                        self.to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            Expr::ScalarFunction(f) => f.check_input_data_types(),
            Expr::AggregateFunction(f) => f.check_input_data_types(),
            Expr::TypedAggregateFunction(f) => f.check_input_data_types(),
            Expr::Generator(g) => g.check_input_data_types(),
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::UnresolvedAttribute(_)
            | Expr::Star(_)
            | Expr::Literal(_)
            | Expr::AttributeReference(_)
            | Expr::BoundReference(_)
            | Expr::NoOp => Vec::new(),
            Expr::Alias(Alias { child, .. })
            | Expr::Cast(Cast { child, .. })
            | Expr::Not(child)
            | Expr::IsNull(child)
            | Expr::IsNotNull(child) => vec![child],
            Expr::BinaryOperator(BinaryOperator { left, right, .. }) => vec![left, right],
            Expr::UnresolvedFunction(UnresolvedFunction { arguments, .. }) => arguments.iter().collect(),
            Expr::ScalarFunction(f) => f.args(),
            Expr::AggregateFunction(f) => f.args(),
            Expr::TypedAggregateFunction(f) => f.args(),
            Expr::Generator(g) => g.args(),
        }
    }

    /// The named output column of a top-level projection/aggregation
    /// expression.
    pub fn to_attribute(&self) -> Result<AttributeReference> {
        match self {
            Expr::AttributeReference(a) => Ok(a.clone()),
            Expr::Alias(Alias { child, name, expr_id }) => Ok(AttributeReference::new_with_expr_id(
                name.clone(),
                child.data_type().clone(),
                child.nullable(),
                *expr_id,
            )),
            e => Err(QueryError::internal(format!("{e} has no attribute form"))),
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        self.exists(|e| {
            Ok(matches!(e, Expr::AggregateFunction(_) | Expr::TypedAggregateFunction(_)))
        })
        .unwrap()
    }

    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias(Alias::new(self, name.into()))
    }

    pub fn cast(self, data_type: DataType) -> Expr {
        Expr::Cast(Cast::new(self, data_type))
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    pub fn lit(value: Value, data_type: DataType) -> Expr {
        Expr::Literal(Literal::new(value, data_type))
    }

    pub fn int_lit(v: i32) -> Expr {
        Expr::lit(Value::Int(v), DataType::Int)
    }

    pub fn long_lit(v: i64) -> Expr {
        Expr::lit(Value::Long(v), DataType::Long)
    }

    pub fn double_lit(v: f64) -> Expr {
        Expr::lit(Value::Double(v), DataType::Double)
    }

    pub fn boolean_lit(v: bool) -> Expr {
        Expr::lit(Value::Boolean(v), DataType::Boolean)
    }

    pub fn string_lit(s: impl Into<String>) -> Expr {
        Expr::lit(Value::string(s), DataType::String)
    }

    pub fn null_lit(data_type: DataType) -> Expr {
        Expr::lit(Value::Null, data_type)
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }

    /// Return `self = other`
    pub fn eq_expr(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Eq, other)
    }

    /// Return `self > other`
    pub fn gt(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Gt, other)
    }

    /// Return `self AND other`
    pub fn and(self, other: Expr) -> Expr {
        binary_expr(self, Operator::And, other)
    }

    /// Return `self OR other`
    pub fn or(self, other: Expr) -> Expr {
        binary_expr(self, Operator::Or, other)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::UnresolvedAttribute(a) => write!(f, "'{}", a.name_parts.join(".")),
            Expr::UnresolvedFunction(u) => {
                write!(f, "'{}(", u.name)?;
                for (i, a) in u.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Star(None) => write!(f, "*"),
            Expr::Star(Some(q)) => write!(f, "{q}.*"),
            Expr::Literal(l) => write!(f, "{}", l.value),
            Expr::AttributeReference(a) => write!(f, "{}#{}", a.name, a.expr_id),
            Expr::BoundReference(b) => write!(f, "input[{}][{}]", b.input, b.ordinal),
            Expr::Alias(a) => write!(f, "{} AS {}#{}", a.child, a.name, a.expr_id),
            Expr::Cast(c) => write!(f, "cast({} as {})", c.child, c.data_type),
            Expr::Not(c) => write!(f, "NOT {c}"),
            Expr::IsNull(c) => write!(f, "{c} IS NULL"),
            Expr::IsNotNull(c) => write!(f, "{c} IS NOT NULL"),
            Expr::BinaryOperator(BinaryOperator { left, op, right }) => {
                write!(f, "({left} {op} {right})")
            }
            Expr::ScalarFunction(func) => {
                write!(f, "{}(", func.name())?;
                for (i, a) in func.args().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::AggregateFunction(func) => {
                write!(f, "{}(", func.name())?;
                for (i, a) in func.args().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::TypedAggregateFunction(func) => {
                write!(f, "{}(", func.name())?;
                for (i, a) in func.args().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Generator(g) => {
                write!(f, "{}(", g.name())?;
                for (i, a) in g.args().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::NoOp => write!(f, "noop"),
        }
    }
}

impl<'a> TreeNodeContainer<'a, Self> for Expr {
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

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct UnresolvedAttribute {
    pub name_parts: Vec<String>,
}

impl UnresolvedAttribute {
    pub fn new(name_parts: Vec<String>) -> Self {
        Self { name_parts }
    }

    pub fn quoted(name: impl Into<String>) -> Expr {
        Expr::UnresolvedAttribute(Self { name_parts: vec![name.into()] })
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Expr {
        Expr::UnresolvedAttribute(Self { name_parts: vec![qualifier.into(), name.into()] })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Hash)]
pub struct UnresolvedFunction {
    pub name: String,
    pub arguments: Vec<Expr>,
}

impl UnresolvedFunction {
    pub fn new(name: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Self { name: name.into(), arguments }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct Literal {
    pub value: Value,
    pub data_type: DataType,
}

impl Literal {
    pub fn new(value: Value, data_type: DataType) -> Self {
        Self { value, data_type }
    }
}

/// Monotonic process-wide attribute id. Two attributes denote the same
/// column iff their ids match; names are never authoritative.
pub type ExprId = u64;

struct ExprIdGenerator {
    counter: AtomicU64,
}

impl ExprIdGenerator {
    fn next_expr_id() -> ExprId {
        static INSTANCE: ExprIdGenerator = ExprIdGenerator { counter: AtomicU64::new(0) };
        INSTANCE.counter.fetch_add(1, AtomicOrdering::SeqCst)
    }
}

/// A resolved column: name, type, nullability, optional relation
/// qualifier and a globally unique id minted at construction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct AttributeReference {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub qualifier: Option<String>,
    pub expr_id: ExprId,
}

impl AttributeReference {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        AttributeReference {
            name: name.into(),
            data_type,
            nullable,
            qualifier: None,
            expr_id: ExprIdGenerator::next_expr_id(),
        }
    }

    pub fn new_with_expr_id(
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
        expr_id: ExprId,
    ) -> Self {
        AttributeReference { name: name.into(), data_type, nullable, qualifier: None, expr_id }
    }

    /// Same column, new qualifier.
    pub fn with_qualifier(&self, qualifier: impl Into<String>) -> Self {
        AttributeReference { qualifier: Some(qualifier.into()), ..self.clone() }
    }

    /// Same column, adjusted nullability (outer joins).
    pub fn with_nullability(&self, nullable: bool) -> Self {
        AttributeReference { nullable, ..self.clone() }
    }

    /// A fresh column of the same shape under a new id, used for the
    /// input side of partial-aggregate buffers.
    pub fn new_instance(&self) -> Self {
        AttributeReference {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            qualifier: self.qualifier.clone(),
            expr_id: ExprIdGenerator::next_expr_id(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct Alias {
    pub child: Box<Expr>,
    pub name: String,
    pub expr_id: ExprId,
}

impl Alias {
    pub fn new(expr: Expr, name: impl Into<String>) -> Self {
        Self { child: Box::new(expr), name: name.into(), expr_id: ExprIdGenerator::next_expr_id() }
    }

    pub fn new_with_expr_id(expr: Expr, name: impl Into<String>, expr_id: ExprId) -> Self {
        Self { child: Box::new(expr), name: name.into(), expr_id }
    }
}

/// A reference bound for direct indexed access: which input tuple the
/// column lives in, its ordinal there, and the flattened position used
/// when the tuples are presented as one concatenated row.
#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct BoundReference {
    pub input: usize,
    pub ordinal: usize,
    pub index: usize,
    pub data_type: DataType,
    pub nullable: bool,
}

impl BoundReference {
    pub fn new(ordinal: usize, data_type: DataType, nullable: bool) -> Self {
        Self { input: 0, ordinal, index: ordinal, data_type, nullable }
    }

    pub fn new_multi(
        input: usize,
        ordinal: usize,
        index: usize,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self { input, ordinal, index, data_type, nullable }
    }

    /// Rewrite every [`AttributeReference`] in `expr` into a
    /// [`BoundReference`] against the concatenation of `inputs`.
    /// References not covered by any input are an error.
    pub fn bind_reference(expr: Expr, inputs: &[Vec<AttributeReference>]) -> Result<Expr> {
        let positions = Self::position_index(inputs);
        expr.transform_up(|expr| {
            if let Expr::AttributeReference(a) = &expr {
                match positions.iter().find(|(id, ..)| *id == a.expr_id) {
                    Some((_, input, ordinal, index)) => {
                        Ok(Transformed::yes(Expr::BoundReference(BoundReference::new_multi(
                            *input,
                            *ordinal,
                            *index,
                            a.data_type.clone(),
                            a.nullable,
                        ))))
                    }
                    None => Err(QueryError::internal(format!(
                        "could not bind {expr} against {inputs:?}"
                    ))),
                }
            } else {
                Ok(Transformed::no(expr))
            }
        })
        .map(|t| t.data)
    }

    pub fn bind_references(exprs: Vec<Expr>, inputs: &[Vec<AttributeReference>]) -> Result<Vec<Expr>> {
        exprs
            .into_iter()
            .map(|e| Self::bind_reference(e, inputs))
            .collect()
    }

    fn position_index(inputs: &[Vec<AttributeReference>]) -> Vec<(ExprId, usize, usize, usize)> {
        let mut positions = Vec::new();
        let mut index = 0;
        for (input, attrs) in inputs.iter().enumerate() {
            for (ordinal, a) in attrs.iter().enumerate() {
                positions.push((a.expr_id, input, ordinal, index));
                index += 1;
            }
        }
        positions
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct Cast {
    pub child: Box<Expr>,
    pub data_type: DataType,
}

impl Cast {
    pub fn new(expr: Expr, data_type: DataType) -> Self {
        Self { child: Box::new(expr), data_type }
    }
}

/// Binary operator over two expressions: arithmetic, comparison or
/// logical connective, by [`Operator`] group.
#[derive(Clone, PartialEq, Eq, PartialOrd, Hash, Debug)]
pub struct BinaryOperator {
    pub left: Box<Expr>,
    pub op: Operator,
    pub right: Box<Expr>,
}

impl BinaryOperator {
    pub fn new(left: Box<Expr>, op: Operator, right: Box<Expr>) -> Self {
        Self { left, op, right }
    }
}

/// Scalar functions: built-ins registered by name plus the wrapper
/// around user-provided implementations. The expression side only
/// carries typing and argument structure; evaluation lives behind
/// [`ScalarFunction::create_physical_expr`].
pub trait ScalarFunction: Debug + Send + Sync + CloneScalarFunction {
    fn as_any(&self) -> &dyn Any;
    fn name(&self) -> &str;
    fn data_type(&self) -> &DataType;
    fn args(&self) -> Vec<&Expr>;

    fn foldable(&self) -> bool {
        self.args().iter().all(|arg| arg.foldable())
    }

    fn nullable(&self) -> bool {
        true
    }

    fn expects_input_types(&self) -> Option<Vec<AbstractDataType>> {
        None
    }

    fn check_input_data_types(&self) -> Result<()> {
        check_expected_input_types(self.name(), &self.args(), self.expects_input_types())
    }

    fn rewrite_args(&self, args: Vec<Expr>) -> Box<dyn ScalarFunction>;

    fn create_physical_expr(&self) -> Result<std::sync::Arc<dyn PhysicalExpr>>;
}

pub(crate) fn check_expected_input_types(
    name: &str,
    args: &[&Expr],
    expected: Option<Vec<AbstractDataType>>,
) -> Result<()> {
    let Some(input_types) = expected else { return Ok(()) };
    for (i, (arg, input_type)) in args.iter().zip(input_types.iter()).enumerate() {
        if !input_type.accepts_type(arg.data_type()) {
            return Err(QueryError::analysis(
                format!(
                    "{} argument {} requires {:?}, got {}",
                    name,
                    i + 1,
                    input_type,
                    arg.data_type()
                ),
                arg.to_string(),
            ));
        }
    }
    Ok(())
}

pub trait CloneScalarFunction {
    fn clone_box(&self) -> Box<dyn ScalarFunction>;
}

impl<T: ScalarFunction + Clone + 'static> CloneScalarFunction for T {
    fn clone_box(&self) -> Box<dyn ScalarFunction> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ScalarFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn ScalarFunction> {
    fn eq(&self, other: &Self) -> bool {
        if self.as_any().type_id() != other.as_any().type_id() || self.name() != other.name() {
            return false;
        }
        let args1 = self.args();
        let args2 = other.args();
        args1.len() == args2.len() && args1.iter().zip(args2.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for Box<dyn ScalarFunction> {}

impl PartialOrd for Box<dyn ScalarFunction> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        compare_args(&self.args(), &other.args())
    }
}

impl Hash for Box<dyn ScalarFunction> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for x in self.args() {
            x.hash(state);
        }
    }
}

pub(crate) fn compare_args(args1: &[&Expr], args2: &[&Expr]) -> Option<Ordering> {
    if args1.len() != args2.len() {
        return None;
    }
    for i in 0..args1.len() {
        match args1[i].partial_cmp(args2[i]) {
            None => return None,
            Some(Ordering::Equal) => continue,
            Some(ord) => return Some(ord),
        }
    }
    Some(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::conditional::If;

    #[test]
    fn test_foldable() {
        let lit = Expr::int_lit(1) + Expr::int_lit(2);
        assert!(lit.foldable());
        let attr = Expr::AttributeReference(AttributeReference::new("a", DataType::Int, true));
        assert!(!attr.clone().foldable());
        assert!(!(lit + attr).foldable());
    }

    #[test]
    fn test_attribute_ids_are_unique_and_monotonic() {
        let a = AttributeReference::new("a", DataType::Int, true);
        let b = AttributeReference::new("a", DataType::Int, true);
        assert!(b.expr_id > a.expr_id);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_nullable_propagation() {
        let a = Expr::AttributeReference(AttributeReference::new("a", DataType::Int, false));
        let b = Expr::AttributeReference(AttributeReference::new("b", DataType::Int, true));
        assert!(!(a.clone() + Expr::int_lit(1)).nullable());
        assert!((a.clone() + b).nullable());
        // division may divide by zero
        assert!((a.clone() / Expr::int_lit(2)).nullable());
        assert!(!a.is_null().nullable());
    }

    #[test]
    fn test_references_collects_subtree_attrs() {
        let a = AttributeReference::new("a", DataType::Int, true);
        let b = AttributeReference::new("b", DataType::Int, true);
        let expr = Expr::ScalarFunction(Box::new(If::new(
            Box::new(Expr::AttributeReference(a.clone()).is_null()),
            Box::new(Expr::AttributeReference(b.clone())),
            Box::new(Expr::int_lit(0)),
        )));
        let refs = expr.references();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&a));
        assert!(refs.contains(&b));
    }

    #[test]
    fn test_binding_multi_input() {
        let left = vec![
            AttributeReference::new("k", DataType::Int, true),
            AttributeReference::new("v", DataType::Int, true),
        ];
        let right = vec![AttributeReference::new("k2", DataType::Int, true)];
        let expr = Expr::AttributeReference(right[0].clone());
        let bound = BoundReference::bind_reference(expr, &[left, right.clone()]).unwrap();
        match bound {
            Expr::BoundReference(b) => {
                assert_eq!(b.input, 1);
                assert_eq!(b.ordinal, 0);
                assert_eq!(b.index, 2);
            }
            other => panic!("expected bound reference, got {other:?}"),
        }
    }

    #[test]
    fn test_binding_unknown_attribute_fails() {
        let input = vec![AttributeReference::new("a", DataType::Int, true)];
        let stranger = Expr::AttributeReference(AttributeReference::new("z", DataType::Int, true));
        assert!(BoundReference::bind_reference(stranger, &[input]).is_err());
    }
}
