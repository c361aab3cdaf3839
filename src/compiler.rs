//! # Query compiler
//!
//! Lowers query option trees into typed [`QueryExpr`]s over the element type
//! of a queryable.
//!
//! Every expression is compiled together with its static [`TypeRef`], which
//! drives the conversions the comparison and arithmetic operators need:
//!
//! - a constant compared with a field takes the field's type
//!   (`Price gt 5` compares doubles when `Price` is a double);
//! - two non-constant operands meet at the wider numeric type;
//! - nullable value operands get explicit null guards, so
//!   `Rating gt 3` reads `Rating != null AndAlso Rating > 3` and
//!   `Rating ne 3` reads `Rating == null OrElse Rating != 3`;
//! - `eq null` and `ne null` become null tests.
//!
//! Unbound identifiers resolve against the item parameter `$it`. Lambda
//! parameters introduced by `any`/`all` shadow outer names only within
//! their own predicate.

mod functions;

pub use functions::Function;

use crate::ast::{BinaryOperator, Node, NodeKind, ODataQuery};
use crate::evaluator;
use crate::expr::{DynamicAccessor, Lambda, Projection, QueryExpr, SortKey};
use crate::lexer::LexError;
use crate::types::{EdmType, TypeRef};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// Largest number of fields a `$select` may project.
pub const MAX_SELECT_FIELDS: usize = 50;

/// Name of the parameter bound to the current item.
pub const ITEM_PARAMETER: &str = "$it";

/// Errors raised while compiling a parsed URL.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// An operator or function applied to an operand type it does not support
    UnsupportedOperation { operation: String, operand: String },
    UnknownFunction(String),
    UnknownProperty { name: String, owner: String },
    ArgumentCount {
        function: String,
        expected: String,
        found: usize,
    },
    /// An operator or option without its operand
    MissingOperand(String),
    InvalidArgument(String),
    TooManyFields { count: usize, max: usize },
    InvalidLiteral(LexError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnsupportedOperation { operation, operand } => {
                write!(f, "'{}' is not supported for {}", operation, operand)
            }
            CompileError::UnknownFunction(name) => write!(f, "Unknown function '{}'", name),
            CompileError::UnknownProperty { name, owner } => {
                write!(f, "'{}' has no property '{}'", owner, name)
            }
            CompileError::ArgumentCount {
                function,
                expected,
                found,
            } => write!(
                f,
                "'{}' takes {} argument(s), got {}",
                function, expected, found
            ),
            CompileError::MissingOperand(operator) => {
                write!(f, "Missing operand for '{}'", operator)
            }
            CompileError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CompileError::TooManyFields { count, max } => {
                write!(f, "$select lists {} fields; at most {} are supported", count, max)
            }
            CompileError::InvalidLiteral(e) => write!(f, "Invalid literal: {}", e),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::InvalidLiteral(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::InvalidLiteral(e)
    }
}

/// A compiled expression and its static type.
#[derive(Debug, Clone)]
pub struct Typed {
    pub expr: QueryExpr,
    pub ty: TypeRef,
}

impl Typed {
    pub fn new(expr: QueryExpr, ty: TypeRef) -> Self {
        Typed { expr, ty }
    }

    fn boolean(expr: QueryExpr) -> Self {
        Typed::new(expr, TypeRef::required(EdmType::Boolean))
    }
}

/// Lexical scope of parameter names.
struct Scope<'p> {
    name: String,
    item: Typed,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    fn bind(&'p self, name: &str, item: Typed) -> Scope<'p> {
        Scope {
            name: name.to_string(),
            item,
            parent: Some(self),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Typed> {
        if self.name == name {
            return Some(&self.item);
        }
        self.parent.and_then(|parent| parent.lookup(name))
    }

    /// The outermost binding, i.e. `$it`.
    fn item(&self) -> &Typed {
        match self.parent {
            Some(parent) => parent.item(),
            None => &self.item,
        }
    }
}

/// Compiles query options against one element type.
///
/// # Example
///
/// ```
/// use odata_query::compiler::Compiler;
/// use odata_query::types::{EdmType, RecordType, TypeRef};
/// use odata_query::{ODataVersion, parse};
///
/// let product = RecordType::new("Product")
///     .property("Name", TypeRef::optional(EdmType::String))
///     .property("Price", TypeRef::required(EdmType::Double));
/// let compiler = Compiler::new(TypeRef::record(product));
///
/// let uri = parse("Products?$filter=Price gt 5", ODataVersion::ALL).unwrap();
/// let predicate = compiler.predicate(uri.query().filter().unwrap()).unwrap();
/// assert_eq!(predicate.to_string(), "$it => ($it.Price > 5)");
/// ```
#[derive(Debug, Clone)]
pub struct Compiler {
    item_type: TypeRef,
    accessor: Option<DynamicAccessor>,
    aliases: HashMap<String, Node>,
}

impl Compiler {
    pub fn new(item_type: TypeRef) -> Self {
        Compiler {
            item_type,
            accessor: None,
            aliases: HashMap::new(),
        }
    }

    /// Reads every field through `accessor` instead of static members.
    pub fn with_accessor(mut self, accessor: DynamicAccessor) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Resolves `@alias` operands through the alias definitions of `query`.
    pub fn with_aliases(mut self, query: &ODataQuery) -> Self {
        for option in query {
            if option.kind() == NodeKind::Alias
                && let Some(value) = option.child(0)
            {
                self.aliases
                    .insert(option.text().to_ascii_lowercase(), value.clone());
            }
        }
        self
    }

    pub fn item_type(&self) -> &TypeRef {
        &self.item_type
    }

    /// Compiles a bare expression in the scope of `$it`.
    pub fn expression(&self, node: &Node) -> Result<Typed, CompileError> {
        self.compile(node, &self.root_scope())
    }

    /// Compiles a `$filter` option, or a bare boolean expression, into a
    /// predicate over `$it`.
    pub fn predicate(&self, filter: &Node) -> Result<Lambda, CompileError> {
        let body = match filter.kind() {
            NodeKind::Filter => filter
                .child(0)
                .ok_or_else(|| CompileError::MissingOperand(filter.text().to_string()))?,
            _ => filter,
        };
        let body = as_predicate(self.expression(body)?)?;
        Ok(Lambda::new(ITEM_PARAMETER, body))
    }

    /// One sort key per `$orderby` term, in URL order.
    pub fn sort_keys(&self, order_by: &Node) -> Result<Vec<SortKey>, CompileError> {
        let scope = self.root_scope();
        order_by
            .children()
            .iter()
            .enumerate()
            .map(|(i, term)| {
                let (descending, primary, key) = match term.kind() {
                    NodeKind::Asc { primary } => (false, primary, term.child(0)),
                    NodeKind::Desc { primary } => (true, primary, term.child(0)),
                    _ => (false, i == 0, Some(term)),
                };
                let key = key.ok_or_else(|| CompileError::MissingOperand(term.text().to_string()))?;
                let key = self.compile(key, &scope)?;
                if !key.ty.kind.is_orderable() {
                    return Err(CompileError::UnsupportedOperation {
                        operation: "$orderby".to_string(),
                        operand: key.ty.to_string(),
                    });
                }
                Ok(SortKey {
                    selector: Lambda::new(ITEM_PARAMETER, key.expr),
                    descending,
                    then_by: !primary,
                })
            })
            .collect()
    }

    /// The field list of a `$select`; `None` for `*`, which keeps whole items.
    pub fn projection(&self, select: &Node) -> Result<Option<Projection>, CompileError> {
        let fields = select.children();
        if fields.is_empty() || fields.iter().any(|f| f.kind() == NodeKind::Star) {
            return Ok(None);
        }
        if fields.len() > MAX_SELECT_FIELDS {
            return Err(CompileError::TooManyFields {
                count: fields.len(),
                max: MAX_SELECT_FIELDS,
            });
        }
        let scope = self.root_scope();
        let fields = fields
            .iter()
            .map(|field| Ok((field.path_text(), self.compile(field, &scope)?.expr)))
            .collect::<Result<Vec<_>, CompileError>>()?;
        Ok(Some(Projection {
            parameter: ITEM_PARAMETER.to_string(),
            fields,
        }))
    }

    fn root_scope(&self) -> Scope<'static> {
        Scope {
            name: ITEM_PARAMETER.to_string(),
            item: Typed::new(
                QueryExpr::Parameter(ITEM_PARAMETER.to_string()),
                self.item_type.clone(),
            ),
            parent: None,
        }
    }

    fn compile(&self, node: &Node, scope: &Scope<'_>) -> Result<Typed, CompileError> {
        match node.kind() {
            NodeKind::Literal => {
                let value = node.token().as_primitive()?;
                let ty = value_type(&value);
                Ok(Typed::new(QueryExpr::Constant(value), ty))
            }
            NodeKind::Null => Ok(Typed::new(QueryExpr::Constant(Value::Null), TypeRef::object())),
            NodeKind::Alias => {
                let value = self
                    .aliases
                    .get(&node.text().to_ascii_lowercase())
                    .filter(|value| value.kind() != NodeKind::Alias)
                    .ok_or_else(|| {
                        CompileError::InvalidArgument(format!("alias {} is not defined", node.text()))
                    })?;
                self.compile(value, scope)
            }
            NodeKind::Identifier => match scope.lookup(node.text()) {
                Some(bound) => Ok(bound.clone()),
                None => self.member(scope.item().clone(), node.text()),
            },
            NodeKind::Navigation => self.navigation(node, scope),
            NodeKind::Count => {
                let source = self.operand(node, 0, scope)?;
                if source.ty.element_type().is_none() {
                    return Err(CompileError::UnsupportedOperation {
                        operation: "$count".to_string(),
                        operand: source.ty.to_string(),
                    });
                }
                Ok(Typed::new(
                    QueryExpr::Count(Box::new(source.expr)),
                    TypeRef::required(EdmType::Int32),
                ))
            }
            NodeKind::Binary(op) => {
                let left = self.operand(node, 0, scope)?;
                let right = self.operand(node, 1, scope)?;
                match op {
                    BinaryOperator::And | BinaryOperator::Or => {
                        let left = as_predicate(left)?;
                        let right = as_predicate(right)?;
                        Ok(Typed::boolean(match op {
                            BinaryOperator::And => QueryExpr::and_also(left, right),
                            _ => QueryExpr::or_else(left, right),
                        }))
                    }
                    BinaryOperator::Equal | BinaryOperator::NotEqual => equality(op, left, right),
                    BinaryOperator::Has => Ok(Typed::boolean(QueryExpr::binary(
                        op, left.expr, right.expr,
                    ))),
                    op if op.is_relational() => relational(op, left, right),
                    op => arithmetic(op, left, right),
                }
            }
            NodeKind::Not => not(self.operand(node, 0, scope)?),
            NodeKind::Negate => {
                let operand = self.operand(node, 0, scope)?;
                let kind = &operand.ty.kind;
                if !kind.is_numeric() && *kind != EdmType::Duration && !operand.ty.is_object() {
                    return Err(CompileError::UnsupportedOperation {
                        operation: "-".to_string(),
                        operand: operand.ty.to_string(),
                    });
                }
                Ok(Typed::new(QueryExpr::Negate(Box::new(operand.expr)), operand.ty))
            }
            NodeKind::Call => {
                let function = Function::from_name(node.text())
                    .ok_or_else(|| CompileError::UnknownFunction(node.text().to_string()))?;
                let args = node
                    .children()
                    .iter()
                    .skip(1)
                    .map(|arg| self.compile(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                functions::compile_call(function, args)
            }
            NodeKind::Any | NodeKind::All => Err(CompileError::MissingOperand(node.text().to_string())),
            _ => Err(CompileError::UnsupportedOperation {
                operation: node.text().to_string(),
                operand: "an expression".to_string(),
            }),
        }
    }

    fn operand(&self, node: &Node, index: usize, scope: &Scope<'_>) -> Result<Typed, CompileError> {
        let child = node
            .child(index)
            .ok_or_else(|| CompileError::MissingOperand(node.text().to_string()))?;
        self.compile(child, scope)
    }

    fn navigation(&self, node: &Node, scope: &Scope<'_>) -> Result<Typed, CompileError> {
        let source = self.operand(node, 0, scope)?;
        let step = node
            .child(1)
            .ok_or_else(|| CompileError::MissingOperand(node.text().to_string()))?;
        match step.kind() {
            NodeKind::Identifier => self.member(source, step.text()),
            NodeKind::Any | NodeKind::All => self.aggregate(source, step, scope),
            NodeKind::Period => {
                log::debug!("ignoring type cast segment {}", step.path_text());
                Ok(source)
            }
            _ => Err(CompileError::UnsupportedOperation {
                operation: node.text().to_string(),
                operand: step.to_string(),
            }),
        }
    }

    fn member(&self, target: Typed, name: &str) -> Result<Typed, CompileError> {
        if let Some(accessor) = &self.accessor {
            return Ok(Typed::new(
                QueryExpr::Dynamic {
                    target: Box::new(target.expr),
                    name: name.to_string(),
                    accessor: accessor.clone(),
                },
                TypeRef::object(),
            ));
        }
        let ty = match &target.ty.kind {
            EdmType::Record(record) => record
                .find(name)
                .map(|property| property.ty.clone())
                .ok_or_else(|| CompileError::UnknownProperty {
                    name: name.to_string(),
                    owner: record.name().to_string(),
                })?,
            EdmType::Object => TypeRef::object(),
            _ => {
                return Err(CompileError::UnsupportedOperation {
                    operation: format!("member '{}'", name),
                    operand: target.ty.to_string(),
                });
            }
        };
        Ok(Typed::new(
            QueryExpr::Member {
                target: Box::new(target.expr),
                name: name.to_string(),
            },
            ty,
        ))
    }

    /// `source/any(alias: predicate)` and `source/all(alias: predicate)`.
    fn aggregate(&self, source: Typed, node: &Node, scope: &Scope<'_>) -> Result<Typed, CompileError> {
        let element = source
            .ty
            .element_type()
            .ok_or_else(|| CompileError::UnsupportedOperation {
                operation: node.text().to_string(),
                operand: source.ty.to_string(),
            })?;
        let all = node.kind() == NodeKind::All;
        let predicate = match (node.child(1), node.child(2)) {
            (None, _) if !all => None,
            (Some(alias), Some(body)) if alias.kind() == NodeKind::Identifier => {
                let parameter = Typed::new(QueryExpr::Parameter(alias.text().to_string()), element);
                let inner = scope.bind(alias.text(), parameter);
                let body = as_predicate(self.compile(body, &inner)?)?;
                Some(Lambda::new(alias.text(), body))
            }
            _ => return Err(CompileError::MissingOperand(node.text().to_string())),
        };
        let source = Box::new(source.expr);
        let expr = match predicate {
            Some(predicate) if all => QueryExpr::All { source, predicate },
            predicate => QueryExpr::Any { source, predicate },
        };
        Ok(Typed::boolean(expr))
    }
}

/// Reads the value of `$skip` or `$top`.
pub fn page_value(option: &Node) -> Result<usize, CompileError> {
    let invalid = || {
        CompileError::InvalidArgument(format!(
            "{} must be a non-negative integer, got '{}'",
            option.text(),
            option.child(0).map(Node::path_text).unwrap_or_default()
        ))
    };
    let value = option.child(0).ok_or_else(invalid)?.token().as_primitive();
    value
        .ok()
        .and_then(|v| v.as_i64())
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(invalid)
}

/// Reads `$inlinecount=allpages|none` or `$count=true|false`.
pub fn inline_count(option: &Node) -> Result<bool, CompileError> {
    let value = option.child(0).map(Node::text).unwrap_or_default();
    match value.to_ascii_lowercase().as_str() {
        "allpages" | "true" => Ok(true),
        "none" | "false" => Ok(false),
        _ => Err(CompileError::InvalidArgument(format!(
            "{} does not accept '{}'",
            option.text(),
            value
        ))),
    }
}

/// Static type of a literal.
fn value_type(value: &Value) -> TypeRef {
    let kind = match value {
        Value::Null | Value::Record(_) => return TypeRef::object(),
        Value::Collection(_) => return TypeRef::collection_of(TypeRef::object()),
        Value::Boolean(_) => EdmType::Boolean,
        Value::Byte(_) => EdmType::Byte,
        Value::Int32(_) => EdmType::Int32,
        Value::Int64(_) => EdmType::Int64,
        Value::Single(_) => EdmType::Single,
        Value::Double(_) => EdmType::Double,
        Value::Decimal(_) => EdmType::Decimal,
        Value::String(_) => EdmType::String,
        Value::Guid(_) => EdmType::Guid,
        Value::DateTimeOffset(_) => EdmType::DateTimeOffset,
        Value::Date(_) => EdmType::Date,
        Value::TimeOfDay(_) => EdmType::TimeOfDay,
        Value::Duration(_) => EdmType::Duration,
        Value::Binary(_) => EdmType::Binary,
    };
    TypeRef::required(kind)
}

// ========================================
// Operators
// ========================================

fn is_null_constant(typed: &Typed) -> bool {
    typed.expr.as_constant().is_some_and(Value::is_null)
}

/// Coerces a boolean-typed operand into a predicate body.
fn as_predicate(typed: Typed) -> Result<QueryExpr, CompileError> {
    let no = QueryExpr::constant(false);
    match (&typed.ty.kind, typed.ty.nullable) {
        (EdmType::Boolean, false) => Ok(typed.expr),
        (EdmType::Boolean, true) => Ok(QueryExpr::Coalesce(Box::new(typed.expr), Box::new(no))),
        (EdmType::Object, _) => {
            let converted = QueryExpr::convert(typed.expr, TypeRef::optional(EdmType::Boolean));
            Ok(QueryExpr::Coalesce(Box::new(converted), Box::new(no)))
        }
        _ => Err(CompileError::UnsupportedOperation {
            operation: "predicate".to_string(),
            operand: typed.ty.to_string(),
        }),
    }
}

fn not(operand: Typed) -> Result<Typed, CompileError> {
    let expr = match (&operand.ty.kind, operand.ty.nullable) {
        (EdmType::Boolean, false) => QueryExpr::Not(Box::new(operand.expr)),
        (EdmType::Boolean, true) => {
            let is_true = QueryExpr::and_also(
                QueryExpr::IsNotNull(Box::new(operand.expr.clone())),
                QueryExpr::binary(BinaryOperator::Equal, operand.expr, QueryExpr::constant(true)),
            );
            QueryExpr::Not(Box::new(is_true))
        }
        (EdmType::Object, _) => QueryExpr::Not(Box::new(as_predicate(operand)?)),
        _ => {
            return Err(CompileError::UnsupportedOperation {
                operation: "not".to_string(),
                operand: operand.ty.to_string(),
            });
        }
    };
    Ok(Typed::boolean(expr))
}

fn equality(op: BinaryOperator, left: Typed, right: Typed) -> Result<Typed, CompileError> {
    let equal = op == BinaryOperator::Equal;
    if is_null_constant(&left) || is_null_constant(&right) {
        let other = if is_null_constant(&right) { left } else { right };
        if is_null_constant(&other) {
            return Ok(Typed::boolean(QueryExpr::constant(equal)));
        }
        let operand = Box::new(other.expr);
        return Ok(Typed::boolean(if equal {
            QueryExpr::IsNull(operand)
        } else {
            QueryExpr::IsNotNull(operand)
        }));
    }

    let (left, right) = normalize(op, left, right)?;
    if let Some(expr) = boolean_shortcut(equal, &left, &right).or_else(|| boolean_shortcut(equal, &right, &left)) {
        return Ok(Typed::boolean(expr));
    }

    let mut guards = null_guards(&left, &right);
    // Two nullable sides compare with lifted equality, where null equals null.
    if guards.len() == 2 {
        guards.clear();
    }
    let mut expr = QueryExpr::binary(op, left.expr, right.expr);
    for guard in guards.into_iter().rev() {
        expr = if equal {
            QueryExpr::and_also(QueryExpr::IsNotNull(Box::new(guard)), expr)
        } else {
            QueryExpr::or_else(QueryExpr::IsNull(Box::new(guard)), expr)
        };
    }
    Ok(Typed::boolean(expr))
}

/// `x eq true` is `x` and `x eq false` is `not x`, for non-null booleans.
fn boolean_shortcut(equal: bool, operand: &Typed, constant: &Typed) -> Option<QueryExpr> {
    if operand.ty.kind != EdmType::Boolean || operand.ty.nullable || operand.expr.is_constant() {
        return None;
    }
    let wanted = constant.expr.as_constant()?.as_bool()?;
    if wanted == equal {
        Some(operand.expr.clone())
    } else {
        Some(QueryExpr::Not(Box::new(operand.expr.clone())))
    }
}

fn relational(op: BinaryOperator, left: Typed, right: Typed) -> Result<Typed, CompileError> {
    let (left, right) = normalize(op, left, right)?;
    for side in [&left, &right] {
        if !side.ty.kind.is_orderable() {
            return Err(CompileError::UnsupportedOperation {
                operation: op.keyword().to_string(),
                operand: side.ty.to_string(),
            });
        }
    }
    let guards = null_guards(&left, &right);
    let mut expr = QueryExpr::binary(op, left.expr, right.expr);
    for guard in guards.into_iter().rev() {
        expr = QueryExpr::and_also(QueryExpr::IsNotNull(Box::new(guard)), expr);
    }
    Ok(Typed::boolean(expr))
}

fn arithmetic(op: BinaryOperator, left: Typed, right: Typed) -> Result<Typed, CompileError> {
    use EdmType::{Date, DateTimeOffset, Duration};
    let additive = matches!(op, BinaryOperator::Add | BinaryOperator::Subtract);
    let temporal = match (&left.ty.kind, &right.ty.kind) {
        (DateTimeOffset, Duration) if additive => Some(DateTimeOffset),
        (Date, Duration) if additive => Some(Date),
        (Duration, Duration) if additive => Some(Duration),
        (DateTimeOffset, DateTimeOffset) | (Date, Date) if op == BinaryOperator::Subtract => {
            Some(Duration)
        }
        _ => None,
    };
    let nullable = left.ty.nullable || right.ty.nullable;
    let (left, right, kind) = match temporal {
        Some(kind) => (left, right, kind),
        None => {
            let (left, right) = normalize(op, left, right)?;
            let kind = if left.ty.is_object() || right.ty.is_object() {
                EdmType::Object
            } else if left.ty.kind.is_numeric() {
                left.ty.kind.clone()
            } else {
                return Err(mismatch(op, &left.ty, &right.ty));
            };
            (left, right, kind)
        }
    };
    Ok(Typed::new(
        QueryExpr::binary(op, left.expr, right.expr),
        TypeRef { kind, nullable },
    ))
}

/// Operands that need a null check before a value comparison.
fn null_guards(left: &Typed, right: &Typed) -> Vec<QueryExpr> {
    [left, right]
        .into_iter()
        .filter(|side| side.ty.is_nullable_value())
        .map(|side| side.expr.clone())
        .collect()
}

/// Brings both operands of a binary operator to a common type.
fn normalize(op: BinaryOperator, left: Typed, right: Typed) -> Result<(Typed, Typed), CompileError> {
    match (left.expr.is_constant(), right.expr.is_constant()) {
        (false, true) => {
            let (right, left) = coerce_constant(op, right, left)?;
            Ok((left, right))
        }
        (true, false) => coerce_constant(op, left, right),
        _ => promote(op, left, right),
    }
}

fn coerce_constant(op: BinaryOperator, constant: Typed, other: Typed) -> Result<(Typed, Typed), CompileError> {
    let Some(value) = constant.expr.as_constant() else {
        return promote(op, constant, other);
    };
    if value.is_null() {
        let ty = other.ty.as_nullable();
        return Ok((Typed::new(constant.expr, ty), other));
    }
    if other.ty.is_object() {
        // Numbers and strings compare across runtime types; other kinds
        // are read as the constant's type, except as arithmetic operands
        // where `date add duration` mixes kinds.
        if constant.ty.kind.is_numeric()
            || constant.ty.kind == EdmType::String
            || op.is_arithmetic()
        {
            return Ok((constant, other));
        }
        let target = constant.ty.as_nullable();
        let other = Typed::new(QueryExpr::convert(other.expr, target.clone()), target);
        return Ok((constant, other));
    }
    let numeric = constant.ty.kind.is_numeric() && other.ty.kind.is_numeric();
    let temporal = constant.ty.kind.is_temporal() && other.ty.kind.is_temporal();
    if constant.ty.kind == other.ty.kind || numeric || temporal {
        return promote(op, constant, other);
    }
    match evaluator::convert(value, &other.ty.kind) {
        Ok(converted) => {
            let ty = TypeRef::required(other.ty.kind.clone());
            Ok((Typed::new(QueryExpr::Constant(converted), ty), other))
        }
        Err(_) => Err(mismatch(op, &constant.ty, &other.ty)),
    }
}

/// Widens the narrower numeric operand, and dates to date-times.
fn promote(op: BinaryOperator, left: Typed, right: Typed) -> Result<(Typed, Typed), CompileError> {
    if left.ty.kind == right.ty.kind || left.ty.is_object() || right.ty.is_object() {
        return Ok((left, right));
    }
    match (left.ty.kind.numeric_rank(), right.ty.kind.numeric_rank()) {
        (Some(l), Some(r)) if l < r => {
            let kind = right.ty.kind.clone();
            Ok((cast(left, &kind), right))
        }
        (Some(_), Some(_)) => {
            let kind = left.ty.kind.clone();
            Ok((left, cast(right, &kind)))
        }
        _ => match (&left.ty.kind, &right.ty.kind) {
            (EdmType::Date, EdmType::DateTimeOffset) => {
                Ok((cast(left, &EdmType::DateTimeOffset), right))
            }
            (EdmType::DateTimeOffset, EdmType::Date) => {
                Ok((left, cast(right, &EdmType::DateTimeOffset)))
            }
            _ => Err(mismatch(op, &left.ty, &right.ty)),
        },
    }
}

/// Converts an operand, folding the conversion of constants.
fn cast(typed: Typed, kind: &EdmType) -> Typed {
    let ty = TypeRef {
        kind: kind.clone(),
        nullable: typed.ty.nullable,
    };
    if let QueryExpr::Constant(value) = &typed.expr
        && let Ok(converted) = evaluator::convert(value, kind)
    {
        return Typed::new(QueryExpr::Constant(converted), ty);
    }
    Typed::new(QueryExpr::convert(typed.expr, ty.clone()), ty)
}

fn mismatch(op: BinaryOperator, left: &TypeRef, right: &TypeRef) -> CompileError {
    CompileError::UnsupportedOperation {
        operation: op.keyword().to_string(),
        operand: format!("{} and {}", left, right),
    }
}
