//! # Compiled query expressions
//!
//! The compiler lowers the URL tree into [`QueryExpr`] trees: a small typed
//! expression language that providers translate into their own query
//! operators. The in-memory provider evaluates them directly.
//!
//! ```text
//! $filter=Rating gt 3 and Name ne null
//!
//! $it => ((($it.Rating != null) AndAlso ($it.Rating > 3)) AndAlso ($it.Name != null))
//! ```

use crate::ast::BinaryOperator;
use crate::compiler::Function;
use crate::types::TypeRef;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum QueryExpr {
    /// A bound lambda parameter, by name
    Parameter(String),
    Constant(Value),
    /// Field of a record
    Member {
        target: Box<QueryExpr>,
        name: String,
    },
    /// Field read through a user-supplied accessor
    Dynamic {
        target: Box<QueryExpr>,
        name: String,
        accessor: DynamicAccessor,
    },
    Convert {
        operand: Box<QueryExpr>,
        target: TypeRef,
    },
    /// Comparison, arithmetic or `has`
    Binary {
        op: BinaryOperator,
        left: Box<QueryExpr>,
        right: Box<QueryExpr>,
    },
    AndAlso(Box<QueryExpr>, Box<QueryExpr>),
    OrElse(Box<QueryExpr>, Box<QueryExpr>),
    Not(Box<QueryExpr>),
    Negate(Box<QueryExpr>),
    IsNull(Box<QueryExpr>),
    IsNotNull(Box<QueryExpr>),
    /// The left value, or the right one when the left is null
    Coalesce(Box<QueryExpr>, Box<QueryExpr>),
    Call {
        function: Function,
        args: Vec<QueryExpr>,
    },
    Any {
        source: Box<QueryExpr>,
        predicate: Option<Lambda>,
    },
    All {
        source: Box<QueryExpr>,
        predicate: Lambda,
    },
    Count(Box<QueryExpr>),
}

impl QueryExpr {
    pub fn constant(value: impl Into<Value>) -> QueryExpr {
        QueryExpr::Constant(value.into())
    }

    pub fn binary(op: BinaryOperator, left: QueryExpr, right: QueryExpr) -> QueryExpr {
        QueryExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and_also(left: QueryExpr, right: QueryExpr) -> QueryExpr {
        QueryExpr::AndAlso(Box::new(left), Box::new(right))
    }

    pub fn or_else(left: QueryExpr, right: QueryExpr) -> QueryExpr {
        QueryExpr::OrElse(Box::new(left), Box::new(right))
    }

    pub fn convert(operand: QueryExpr, target: TypeRef) -> QueryExpr {
        QueryExpr::Convert {
            operand: Box::new(operand),
            target,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, QueryExpr::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            QueryExpr::Constant(value) => Some(value),
            _ => None,
        }
    }
}

/// A single-parameter function, e.g. a filter predicate or a sort key.
#[derive(Debug, Clone)]
pub struct Lambda {
    pub parameter: String,
    pub body: Box<QueryExpr>,
}

impl Lambda {
    pub fn new(parameter: impl Into<String>, body: QueryExpr) -> Self {
        Lambda {
            parameter: parameter.into(),
            body: Box::new(body),
        }
    }
}

/// One key of a multi-key sort. `then_by` keys refine the ordering set by
/// the keys before them.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub selector: Lambda,
    pub descending: bool,
    pub then_by: bool,
}

/// The `$select` field list, as `(name, value)` pairs in URL order.
#[derive(Debug, Clone)]
pub struct Projection {
    pub parameter: String,
    pub fields: Vec<(String, QueryExpr)>,
}

type AccessorFn = dyn Fn(&Value, &str) -> Value + Send + Sync;

/// Reads a named field from an item whose type is not known statically.
///
/// # Example
///
/// ```
/// use odata_query::{DynamicAccessor, Value};
///
/// let accessor = DynamicAccessor::new(|item, name| {
///     item.get(&name.to_lowercase()).cloned().unwrap_or(Value::Null)
/// });
/// let item = Value::record([("name", Value::from("Karl"))]);
/// assert_eq!(accessor.get(&item, "Name"), Value::from("Karl"));
/// ```
#[derive(Clone)]
pub struct DynamicAccessor(Arc<AccessorFn>);

impl DynamicAccessor {
    pub fn new(read: impl Fn(&Value, &str) -> Value + Send + Sync + 'static) -> Self {
        DynamicAccessor(Arc::new(read))
    }

    /// Plain record field lookup; missing fields read as null.
    pub fn dictionary() -> Self {
        DynamicAccessor::new(|item, name| item.get(name).cloned().unwrap_or(Value::Null))
    }

    pub fn get(&self, item: &Value, name: &str) -> Value {
        (self.0)(item, name)
    }
}

impl fmt::Debug for DynamicAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DynamicAccessor")
    }
}

// ========================================
// Display
// ========================================

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryExpr::Parameter(name) => f.write_str(name),
            QueryExpr::Constant(Value::String(s)) => write!(f, "\"{}\"", s),
            QueryExpr::Constant(value) => write!(f, "{}", value),
            QueryExpr::Member { target, name } => write!(f, "{}.{}", target, name),
            QueryExpr::Dynamic { target, name, .. } => write!(f, "{}[\"{}\"]", target, name),
            QueryExpr::Convert { operand, target } => write!(f, "Convert({}, {})", operand, target),
            QueryExpr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, symbol(*op), right)
            }
            QueryExpr::AndAlso(l, r) => write!(f, "({} AndAlso {})", l, r),
            QueryExpr::OrElse(l, r) => write!(f, "({} OrElse {})", l, r),
            QueryExpr::Not(x) => write!(f, "Not({})", x),
            QueryExpr::Negate(x) => write!(f, "-{}", x),
            QueryExpr::IsNull(x) => write!(f, "({} == null)", x),
            QueryExpr::IsNotNull(x) => write!(f, "({} != null)", x),
            QueryExpr::Coalesce(l, r) => write!(f, "({} ?? {})", l, r),
            QueryExpr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            QueryExpr::Any { source, predicate } => match predicate {
                Some(lambda) => write!(f, "{}.Any({})", source, lambda),
                None => write!(f, "{}.Any()", source),
            },
            QueryExpr::All { source, predicate } => write!(f, "{}.All({})", source, predicate),
            QueryExpr::Count(source) => write!(f, "{}.Count()", source),
        }
    }
}

fn symbol(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::And => "&&",
        BinaryOperator::Or => "||",
        BinaryOperator::Equal => "==",
        BinaryOperator::NotEqual => "!=",
        BinaryOperator::LessThan => "<",
        BinaryOperator::LessThanOrEqual => "<=",
        BinaryOperator::GreaterThan => ">",
        BinaryOperator::GreaterThanOrEqual => ">=",
        BinaryOperator::Has => "has",
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.parameter, self.body)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match (self.then_by, self.descending) {
            (false, false) => "OrderBy",
            (false, true) => "OrderByDescending",
            (true, false) => "ThenBy",
            (true, true) => "ThenByDescending",
        };
        write!(f, "{}({})", method, self.selector)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {{", self.parameter)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {} = {}", name, value)?;
        }
        f.write_str(" }")
    }
}
