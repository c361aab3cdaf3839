//! Query providers.
//!
//! The executor only talks to a [`Queryable`]: each operator returns a new
//! queryable and never mutates the receiver. [`MemoryQueryable`] is the
//! in-memory provider, evaluating compiled expressions item by item.

use crate::compiler::CompileError;
use crate::evaluator::{EvalContext, EvalError, Evaluator, sort_order};
use crate::expr::{Lambda, Projection, SortKey};
use crate::types::TypeRef;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Top-level error of query execution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    Compile(CompileError),
    Eval(EvalError),
    /// An operator the provider cannot apply
    Unsupported(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Compile(e) => write!(f, "Compile error: {}", e),
            QueryError::Eval(e) => write!(f, "Evaluation error: {}", e),
            QueryError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Compile(e) => Some(e),
            QueryError::Eval(e) => Some(e),
            QueryError::Unsupported(_) => None,
        }
    }
}

impl From<CompileError> for QueryError {
    fn from(e: CompileError) -> Self {
        QueryError::Compile(e)
    }
}

impl From<EvalError> for QueryError {
    fn from(e: EvalError) -> Self {
        QueryError::Eval(e)
    }
}

/// A composable source of items.
pub trait Queryable: Clone {
    /// Static type of the items, used to type-check compiled expressions.
    fn element_type(&self) -> TypeRef;

    fn filter(&self, predicate: &Lambda) -> Result<Self, QueryError>;

    /// Sorts by `key`, or refines the previous sort when `key.then_by` is set.
    fn order_by(&self, key: &SortKey) -> Result<Self, QueryError>;

    fn skip(&self, count: usize) -> Self;

    fn take(&self, count: usize) -> Self;

    fn count(&self) -> Result<usize, QueryError>;

    /// Eagerly loads the related items under `path`. Providers without the
    /// capability return `None` and `$expand` is ignored.
    fn include(&self, _path: &str) -> Option<Result<Self, QueryError>> {
        None
    }

    fn select(&self, projection: &Projection) -> Result<Vec<ProjectedRecord>, QueryError>;
}

/// Key property names per entity set, for `Products(5)` style lookups.
pub trait EntityMetadata {
    fn keys(&self, entity_set: &str) -> Option<Vec<String>>;
}

impl EntityMetadata for HashMap<String, Vec<String>> {
    fn keys(&self, entity_set: &str) -> Option<Vec<String>> {
        self.get(entity_set).cloned()
    }
}

/// One projected item: `(field, value)` pairs in `$select` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectedRecord {
    fields: Vec<(String, Value)>,
}

impl ProjectedRecord {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        ProjectedRecord { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn into_value(self) -> Value {
        Value::record(self.fields)
    }
}

#[derive(Debug, Clone)]
enum Operation {
    Filter(Lambda),
    Sort(Vec<SortKey>),
    Skip(usize),
    Take(usize),
}

/// A queryable over a shared vector of values.
///
/// Operators are recorded and run when the items are read, so building a
/// query never copies the source.
///
/// # Examples
///
/// ```
/// use odata_query::{MemoryQueryable, ODataVersion, Value, execute, parse};
/// use odata_query::executor::ExecutionSettings;
///
/// let people = MemoryQueryable::dynamic(vec![
///     Value::record([("Name", Value::from("Karl")), ("Age", Value::from(40))]),
///     Value::record([("Name", Value::from("Pete")), ("Age", Value::from(25))]),
/// ]);
/// let uri = parse("People?$filter=Age gt 30", ODataVersion::ALL).unwrap();
/// let result = execute(&uri, &people, &ExecutionSettings::default()).unwrap();
///
/// let items = result.items().unwrap().to_vec().unwrap();
/// assert_eq!(items.len(), 1);
/// assert_eq!(items[0].get("Name"), Some(&Value::from("Karl")));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryQueryable {
    items: Arc<Vec<Value>>,
    element_type: TypeRef,
    operations: Vec<Operation>,
    includes: Vec<String>,
    evaluator: Evaluator,
}

impl MemoryQueryable {
    pub fn new(items: Vec<Value>, element_type: TypeRef) -> Self {
        MemoryQueryable {
            items: Arc::new(items),
            element_type,
            operations: Vec::new(),
            includes: Vec::new(),
            evaluator: Evaluator::new(),
        }
    }

    /// Items without a static type; every field is resolved at runtime.
    pub fn dynamic(items: Vec<Value>) -> Self {
        MemoryQueryable::new(items, TypeRef::object())
    }

    /// Uses `evaluator` for every expression, e.g. one with a fixed clock.
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Paths requested through `$expand`.
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Runs the recorded operators and returns the resulting items.
    pub fn to_vec(&self) -> Result<Vec<Value>, QueryError> {
        let mut items: Vec<Value> = self.items.as_ref().clone();
        for operation in &self.operations {
            items = match operation {
                Operation::Filter(predicate) => {
                    let mut kept = Vec::with_capacity(items.len());
                    for item in items {
                        if self.evaluator.test(predicate, &item)? {
                            kept.push(item);
                        }
                    }
                    kept
                }
                Operation::Sort(keys) => self.sort(items, keys)?,
                Operation::Skip(n) => items.into_iter().skip(*n).collect(),
                Operation::Take(n) => items.into_iter().take(*n).collect(),
            };
        }
        Ok(items)
    }

    fn sort(&self, items: Vec<Value>, keys: &[SortKey]) -> Result<Vec<Value>, QueryError> {
        let mut decorated = items
            .into_iter()
            .map(|item| {
                let values = keys
                    .iter()
                    .map(|key| self.evaluator.apply(&key.selector, &item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((values, item))
            })
            .collect::<Result<Vec<_>, EvalError>>()?;
        decorated.sort_by(|(a, _), (b, _)| {
            keys.iter()
                .zip(a.iter().zip(b))
                .map(|(key, (x, y))| {
                    let ordering = sort_order(x, y);
                    if key.descending { ordering.reverse() } else { ordering }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(decorated.into_iter().map(|(_, item)| item).collect())
    }

    fn then(&self, operation: Operation) -> Self {
        let mut next = self.clone();
        next.operations.push(operation);
        next
    }
}

impl Queryable for MemoryQueryable {
    fn element_type(&self) -> TypeRef {
        self.element_type.clone()
    }

    fn filter(&self, predicate: &Lambda) -> Result<Self, QueryError> {
        Ok(self.then(Operation::Filter(predicate.clone())))
    }

    fn order_by(&self, key: &SortKey) -> Result<Self, QueryError> {
        if !key.then_by {
            return Ok(self.then(Operation::Sort(vec![key.clone()])));
        }
        let mut next = self.clone();
        match next.operations.last_mut() {
            Some(Operation::Sort(keys)) => {
                keys.push(key.clone());
                Ok(next)
            }
            _ => Err(QueryError::Unsupported(format!(
                "{} without a preceding sort",
                key
            ))),
        }
    }

    fn skip(&self, count: usize) -> Self {
        self.then(Operation::Skip(count))
    }

    fn take(&self, count: usize) -> Self {
        self.then(Operation::Take(count))
    }

    fn count(&self) -> Result<usize, QueryError> {
        Ok(self.to_vec()?.len())
    }

    fn include(&self, path: &str) -> Option<Result<Self, QueryError>> {
        let mut next = self.clone();
        next.includes.push(path.to_string());
        Some(Ok(next))
    }

    fn select(&self, projection: &Projection) -> Result<Vec<ProjectedRecord>, QueryError> {
        self.to_vec()?
            .iter()
            .map(|item| {
                let fields = projection
                    .fields
                    .iter()
                    .map(|(name, expr)| {
                        let ctx = EvalContext::new(&projection.parameter, item);
                        Ok((name.clone(), self.evaluator.eval_expr(expr, &ctx)?))
                    })
                    .collect::<Result<Vec<_>, EvalError>>()?;
                Ok(ProjectedRecord::new(fields))
            })
            .collect()
    }
}
