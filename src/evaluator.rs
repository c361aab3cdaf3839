use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    ast::BinaryOperator,
    compiler::Function,
    expr::{Lambda, QueryExpr},
    literal,
    types::EdmType,
    value::Value,
};

/// Parameter bindings visible to an expression: the item a predicate runs
/// on plus the items bound by enclosing `any`/`all` lambdas.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    name: &'a str,
    item: &'a Value,
    parent: Option<&'a EvalContext<'a>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(name: &'a str, item: &'a Value) -> Self {
        EvalContext {
            name,
            item,
            parent: None,
        }
    }

    /// Create a nested context with one more binding
    pub fn with_binding(&'a self, name: &'a str, item: &'a Value) -> EvalContext<'a> {
        EvalContext {
            name,
            item,
            parent: Some(self),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        if self.name == name {
            Some(self.item)
        } else {
            self.parent.and_then(|parent| parent.lookup(name))
        }
    }
}

/// Errors that can occur while evaluating a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Type mismatch or invalid operation for the given type
    TypeError(String),

    /// Member access on a value that has no members
    AccessError(String),

    /// A parameter name with no binding in scope
    UnboundParameter(String),

    /// Integer or decimal division by zero
    DivisionByZero,

    /// Arithmetic result out of range
    Overflow(String),

    /// A value that cannot be read as the requested type
    InvalidConversion { value: String, target: String },

    /// `matchespattern` with an invalid regular expression
    InvalidPattern(String),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::TypeError(msg) => write!(f, "Type error: {}", msg),
            EvalError::AccessError(msg) => write!(f, "Access error: {}", msg),
            EvalError::UnboundParameter(name) => write!(f, "Parameter '{}' is not bound", name),
            EvalError::DivisionByZero => write!(f, "Division by zero"),
            EvalError::Overflow(msg) => write!(f, "Overflow: {}", msg),
            EvalError::InvalidConversion { value, target } => {
                write!(f, "Cannot convert '{}' to {}", value, target)
            }
            EvalError::InvalidPattern(msg) => write!(f, "Invalid pattern: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}

/// Evaluates compiled expressions against in-memory values.
///
/// `now()` reads the clock captured when the evaluator was created, so every
/// item of one query sees the same instant.
///
/// # Examples
///
/// ```
/// use odata_query::Value;
/// use odata_query::compiler::Compiler;
/// use odata_query::evaluator::Evaluator;
/// use odata_query::types::TypeRef;
/// use odata_query::{ODataVersion, parse};
///
/// let uri = parse("?$filter=startswith(Name,'Ka')", ODataVersion::ALL).unwrap();
/// let predicate = Compiler::new(TypeRef::object())
///     .predicate(uri.query().filter().unwrap())
///     .unwrap();
///
/// let karl = Value::record([("Name", Value::from("Karl"))]);
/// assert!(Evaluator::new().test(&predicate, &karl).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct Evaluator {
    now: DateTime<FixedOffset>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::at(Utc::now().fixed_offset())
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An evaluator whose `now()` is fixed to `now`.
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Evaluator { now }
    }

    /// Runs a predicate on one item. A null result counts as false.
    pub fn test(&self, predicate: &Lambda, item: &Value) -> Result<bool, EvalError> {
        let ctx = EvalContext::new(&predicate.parameter, item);
        truthy(&self.eval_expr(&predicate.body, &ctx)?)
    }

    /// Runs a selector on one item.
    pub fn apply(&self, selector: &Lambda, item: &Value) -> Result<Value, EvalError> {
        let ctx = EvalContext::new(&selector.parameter, item);
        self.eval_expr(&selector.body, &ctx)
    }

    pub fn eval_expr(&self, expr: &QueryExpr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match expr {
            QueryExpr::Parameter(name) => ctx
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundParameter(name.clone())),
            QueryExpr::Constant(value) => Ok(value.clone()),
            QueryExpr::Member { target, name } => match self.eval_expr(target, ctx)? {
                Value::Record(fields) => Ok(fields.get(name).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => Err(EvalError::AccessError(format!(
                    "Cannot read '{}' of {}",
                    name,
                    other.type_name()
                ))),
            },
            QueryExpr::Dynamic {
                target,
                name,
                accessor,
            } => match self.eval_expr(target, ctx)? {
                Value::Null => Ok(Value::Null),
                item => Ok(accessor.get(&item, name)),
            },
            QueryExpr::Convert { operand, target } => {
                convert(&self.eval_expr(operand, ctx)?, &target.kind)
            }
            QueryExpr::Binary { op, left, right } => {
                let left = self.eval_expr(left, ctx)?;
                let right = self.eval_expr(right, ctx)?;
                self.apply_binop(*op, &left, &right)
            }
            QueryExpr::AndAlso(left, right) => {
                if !truthy(&self.eval_expr(left, ctx)?)? {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(truthy(&self.eval_expr(right, ctx)?)?))
            }
            QueryExpr::OrElse(left, right) => {
                if truthy(&self.eval_expr(left, ctx)?)? {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(truthy(&self.eval_expr(right, ctx)?)?))
            }
            QueryExpr::Not(operand) => match self.eval_expr(operand, ctx)? {
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                Value::Null => Ok(Value::Null),
                other => Err(EvalError::TypeError(format!(
                    "Cannot apply 'not' to {}",
                    other.type_name()
                ))),
            },
            QueryExpr::Negate(operand) => negate(&self.eval_expr(operand, ctx)?),
            QueryExpr::IsNull(operand) => Ok(Value::Boolean(self.eval_expr(operand, ctx)?.is_null())),
            QueryExpr::IsNotNull(operand) => {
                Ok(Value::Boolean(!self.eval_expr(operand, ctx)?.is_null()))
            }
            QueryExpr::Coalesce(left, right) => match self.eval_expr(left, ctx)? {
                Value::Null => self.eval_expr(right, ctx),
                value => Ok(value),
            },
            QueryExpr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(arg, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                self.eval_call(*function, &args)
            }
            QueryExpr::Any { source, predicate } => {
                let items = match self.eval_expr(source, ctx)? {
                    Value::Collection(items) => items,
                    Value::Null => return Ok(Value::Boolean(false)),
                    other => return Err(not_a_collection("any", &other)),
                };
                let Some(lambda) = predicate else {
                    return Ok(Value::Boolean(!items.is_empty()));
                };
                for item in &items {
                    let inner = ctx.with_binding(&lambda.parameter, item);
                    if truthy(&self.eval_expr(&lambda.body, &inner)?)? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            QueryExpr::All { source, predicate } => {
                let items = match self.eval_expr(source, ctx)? {
                    Value::Collection(items) => items,
                    Value::Null => return Ok(Value::Boolean(true)),
                    other => return Err(not_a_collection("all", &other)),
                };
                for item in &items {
                    let inner = ctx.with_binding(&predicate.parameter, item);
                    if !truthy(&self.eval_expr(&predicate.body, &inner)?)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            QueryExpr::Count(source) => match self.eval_expr(source, ctx)? {
                Value::Collection(items) => i32::try_from(items.len())
                    .map(Value::Int32)
                    .map_err(|_| EvalError::Overflow("$count".to_string())),
                Value::Null => Ok(Value::Int32(0)),
                other => Err(not_a_collection("$count", &other)),
            },
        }
    }

    fn apply_binop(&self, op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvalError> {
        match op {
            BinaryOperator::Equal => Ok(Value::Boolean(values_equal(left, right))),
            BinaryOperator::NotEqual => Ok(Value::Boolean(!values_equal(left, right))),
            BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => {
                if left.is_null() || right.is_null() {
                    return Ok(Value::Boolean(false));
                }
                let ordering = compare(left, right).ok_or_else(|| {
                    EvalError::TypeError(format!(
                        "Cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    ))
                })?;
                Ok(Value::Boolean(match op {
                    BinaryOperator::LessThan => ordering.is_lt(),
                    BinaryOperator::LessThanOrEqual => ordering.is_le(),
                    BinaryOperator::GreaterThan => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinaryOperator::And => Ok(Value::Boolean(truthy(left)? && truthy(right)?)),
            BinaryOperator::Or => Ok(Value::Boolean(truthy(left)? || truthy(right)?)),
            BinaryOperator::Has => has_flags(left, right),
            op => arithmetic(op, left, right),
        }
    }

    // ========================================
    // Functions
    // ========================================

    fn eval_call(&self, function: Function, args: &[Value]) -> Result<Value, EvalError> {
        let propagates_null = !matches!(
            function,
            Function::Now | Function::MaxDateTime | Function::MinDateTime | Function::Concat
        );
        if propagates_null && args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }

        match function {
            Function::Now => Ok(Value::DateTimeOffset(self.now)),
            Function::MaxDateTime => boundary(9999, 12, 31, NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)),
            Function::MinDateTime => boundary(1, 1, 1, Some(NaiveTime::MIN)),
            Function::Year => match arg(function, args, 0)? {
                Value::DateTimeOffset(dt) => Ok(Value::Int32(dt.year())),
                Value::Date(d) => Ok(Value::Int32(d.year())),
                other => Err(requires(function, "a date", other)),
            },
            Function::Month => match arg(function, args, 0)? {
                Value::DateTimeOffset(dt) => Ok(Value::Int32(dt.month() as i32)),
                Value::Date(d) => Ok(Value::Int32(d.month() as i32)),
                other => Err(requires(function, "a date", other)),
            },
            Function::Day => match arg(function, args, 0)? {
                Value::DateTimeOffset(dt) => Ok(Value::Int32(dt.day() as i32)),
                Value::Date(d) => Ok(Value::Int32(d.day() as i32)),
                Value::Duration(d) => i32::try_from(d.num_days())
                    .map(Value::Int32)
                    .map_err(|_| EvalError::Overflow("day".to_string())),
                other => Err(requires(function, "a date or duration", other)),
            },
            Function::Hour | Function::Minute | Function::Second => {
                let (hour, minute, second) = match arg(function, args, 0)? {
                    Value::DateTimeOffset(dt) => (dt.hour(), dt.minute(), dt.second()),
                    Value::TimeOfDay(t) => (t.hour(), t.minute(), t.second()),
                    Value::Duration(d) => (
                        (d.num_hours() % 24).unsigned_abs() as u32,
                        (d.num_minutes() % 60).unsigned_abs() as u32,
                        (d.num_seconds() % 60).unsigned_abs() as u32,
                    ),
                    other => return Err(requires(function, "a time", other)),
                };
                let part = match function {
                    Function::Hour => hour,
                    Function::Minute => minute,
                    _ => second,
                };
                Ok(Value::Int32(part as i32))
            }
            Function::FractionalSeconds => {
                let nanos = match arg(function, args, 0)? {
                    Value::DateTimeOffset(dt) => dt.nanosecond(),
                    Value::TimeOfDay(t) => t.nanosecond(),
                    Value::Duration(d) => d.subsec_nanos().unsigned_abs(),
                    other => return Err(requires(function, "a time", other)),
                };
                Ok(Value::Decimal(Decimal::new(i64::from(nanos), 9).normalize()))
            }
            Function::Date => match arg(function, args, 0)? {
                Value::DateTimeOffset(dt) => Ok(Value::Date(dt.date_naive())),
                other => Err(requires(function, "a date-time", other)),
            },
            Function::Time => match arg(function, args, 0)? {
                Value::DateTimeOffset(dt) => Ok(Value::TimeOfDay(dt.time())),
                other => Err(requires(function, "a date-time", other)),
            },
            Function::TotalOffsetMinutes => match arg(function, args, 0)? {
                Value::DateTimeOffset(dt) => Ok(Value::Int32(dt.offset().local_minus_utc() / 60)),
                other => Err(requires(function, "a date-time", other)),
            },
            Function::TotalSeconds => match arg(function, args, 0)? {
                Value::Duration(d) => Ok(Value::Double(
                    d.num_seconds() as f64 + f64::from(d.subsec_nanos()) / 1e9,
                )),
                other => Err(requires(function, "a duration", other)),
            },
            Function::Ceiling | Function::Floor | Function::Round => {
                round(function, arg(function, args, 0)?)
            }
            Function::Concat => Ok(Value::String(args.iter().map(Value::as_string).collect())),
            Function::Contains => {
                let (s, sub) = (text(function, args, 0)?, text(function, args, 1)?);
                Ok(Value::Boolean(s.contains(&sub)))
            }
            Function::EndsWith => {
                let (s, suffix) = (text(function, args, 0)?, text(function, args, 1)?);
                Ok(Value::Boolean(s.ends_with(&suffix)))
            }
            Function::StartsWith => {
                let (s, prefix) = (text(function, args, 0)?, text(function, args, 1)?);
                Ok(Value::Boolean(s.starts_with(&prefix)))
            }
            Function::SubstringOf => {
                let (sub, s) = (text(function, args, 0)?, text(function, args, 1)?);
                Ok(Value::Boolean(s.contains(&sub)))
            }
            Function::IndexOf => {
                let (s, sub) = (text(function, args, 0)?, text(function, args, 1)?);
                let index = s
                    .find(&sub)
                    .map(|byte| s[..byte].chars().count() as i32)
                    .unwrap_or(-1);
                Ok(Value::Int32(index))
            }
            Function::Length => Ok(Value::Int32(text(function, args, 0)?.chars().count() as i32)),
            Function::Replace => {
                let s = text(function, args, 0)?;
                let (find, with) = (text(function, args, 1)?, text(function, args, 2)?);
                Ok(Value::String(s.replace(&find, &with)))
            }
            Function::Substring => {
                let s = text(function, args, 0)?;
                let start = index(function, args, 1)?;
                let taken: String = match args.get(2) {
                    Some(_) => s.chars().skip(start).take(index(function, args, 2)?).collect(),
                    None => s.chars().skip(start).collect(),
                };
                Ok(Value::String(taken))
            }
            Function::ToLower => Ok(Value::String(text(function, args, 0)?.to_lowercase())),
            Function::ToUpper => Ok(Value::String(text(function, args, 0)?.to_uppercase())),
            Function::Trim => Ok(Value::String(text(function, args, 0)?.trim().to_string())),
            Function::MatchesPattern => {
                let s = text(function, args, 0)?;
                let pattern = text(function, args, 1)?;
                let re = Regex::new(&pattern).map_err(|e| EvalError::InvalidPattern(e.to_string()))?;
                Ok(Value::Boolean(re.is_match(&s)))
            }
        }
    }
}

fn truthy(value: &Value) -> Result<bool, EvalError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::TypeError(format!(
            "Expected a boolean, got {}",
            other.type_name()
        ))),
    }
}

fn not_a_collection(operation: &str, value: &Value) -> EvalError {
    EvalError::TypeError(format!(
        "{} requires a collection, got {}",
        operation,
        value.type_name()
    ))
}

fn arg<'v>(function: Function, args: &'v [Value], index: usize) -> Result<&'v Value, EvalError> {
    args.get(index).ok_or_else(|| {
        EvalError::TypeError(format!("{}() is missing argument {}", function.name(), index + 1))
    })
}

fn text(function: Function, args: &[Value], index: usize) -> Result<String, EvalError> {
    arg(function, args, index).map(Value::as_string)
}

fn index(function: Function, args: &[Value], i: usize) -> Result<usize, EvalError> {
    let value = arg(function, args, i)?;
    let n = integral(value).ok_or_else(|| requires(function, "an integer", value))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

fn requires(function: Function, expected: &str, got: &Value) -> EvalError {
    EvalError::TypeError(format!(
        "{}() requires {}, got {}",
        function.name(),
        expected,
        got.type_name()
    ))
}

fn boundary(year: i32, month: u32, day: u32, time: Option<NaiveTime>) -> Result<Value, EvalError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .zip(time)
        .map(|(date, time)| Value::DateTimeOffset(date.and_time(time).and_utc().fixed_offset()))
        .ok_or_else(|| EvalError::Overflow(format!("year {}", year)))
}

fn round(function: Function, value: &Value) -> Result<Value, EvalError> {
    let apply = |n: f64| match function {
        Function::Ceiling => n.ceil(),
        Function::Floor => n.floor(),
        _ => n.round(),
    };
    match value {
        Value::Double(n) => Ok(Value::Double(apply(*n))),
        Value::Single(n) => Ok(Value::Single(apply(f64::from(*n)) as f32)),
        Value::Decimal(d) => Ok(Value::Decimal(match function {
            Function::Ceiling => d.ceil(),
            Function::Floor => d.floor(),
            _ => d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        })),
        Value::Byte(_) | Value::Int32(_) | Value::Int64(_) => Ok(value.clone()),
        other => Err(requires(function, "a number", other)),
    }
}

// ========================================
// Operators
// ========================================

fn negate(value: &Value) -> Result<Value, EvalError> {
    let overflow = || EvalError::Overflow("negation".to_string());
    match value {
        Value::Null => Ok(Value::Null),
        Value::Byte(n) => Ok(Value::Int32(-i32::from(*n))),
        Value::Int32(n) => n.checked_neg().map(Value::Int32).ok_or_else(overflow),
        Value::Int64(n) => n.checked_neg().map(Value::Int64).ok_or_else(overflow),
        Value::Single(n) => Ok(Value::Single(-n)),
        Value::Double(n) => Ok(Value::Double(-n)),
        Value::Decimal(d) => Ok(Value::Decimal(-*d)),
        Value::Duration(d) => Ok(Value::Duration(-*d)),
        other => Err(EvalError::TypeError(format!("Cannot negate {}", other.type_name()))),
    }
}

/// Flag test: every bit (or comma-separated name) of `flag` is set in `value`.
fn has_flags(value: &Value, flag: &Value) -> Result<Value, EvalError> {
    if value.is_null() || flag.is_null() {
        return Ok(Value::Boolean(false));
    }
    if let (Some(v), Some(f)) = (value.as_i64(), flag.as_i64()) {
        return Ok(Value::Boolean(v & f == f));
    }
    if let (Value::String(v), Value::String(f)) = (value, flag) {
        let set: Vec<&str> = v.split(',').map(str::trim).collect();
        return Ok(Value::Boolean(f.split(',').map(str::trim).all(|name| set.contains(&name))));
    }
    Err(EvalError::TypeError(format!(
        "Cannot test {} for {} flags",
        value.type_name(),
        flag.type_name()
    )))
}

fn numeric_rank(value: &Value) -> Option<u8> {
    match value {
        Value::Byte(_) => Some(0),
        Value::Int32(_) => Some(1),
        Value::Int64(_) => Some(2),
        Value::Decimal(_) => Some(3),
        Value::Single(_) => Some(4),
        Value::Double(_) => Some(5),
        _ => None,
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let overflow = || EvalError::Overflow(format!("{} {} {}", left, op, right));
    let additive = matches!(op, BinaryOperator::Add | BinaryOperator::Subtract);
    let subtract = op == BinaryOperator::Subtract;

    match (left, right) {
        (Value::DateTimeOffset(t), Value::Duration(d)) if additive => {
            let result = if subtract {
                t.checked_sub_signed(*d)
            } else {
                t.checked_add_signed(*d)
            };
            return result.map(Value::DateTimeOffset).ok_or_else(overflow);
        }
        (Value::Date(t), Value::Duration(d)) if additive => {
            let result = if subtract {
                t.checked_sub_signed(*d)
            } else {
                t.checked_add_signed(*d)
            };
            return result.map(Value::Date).ok_or_else(overflow);
        }
        (Value::Duration(a), Value::Duration(b)) if additive => {
            let result = if subtract {
                a.checked_sub(b)
            } else {
                a.checked_add(b)
            };
            return result.map(Value::Duration).ok_or_else(overflow);
        }
        (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) if subtract => {
            return Ok(Value::Duration(a.signed_duration_since(*b)));
        }
        (Value::Date(a), Value::Date(b)) if subtract => {
            return Ok(Value::Duration(a.signed_duration_since(*b)));
        }
        _ => {}
    }

    let rank = match (numeric_rank(left), numeric_rank(right)) {
        (Some(l), Some(r)) => l.max(r),
        _ => {
            return Err(EvalError::TypeError(format!(
                "Cannot apply '{}' to {} and {}",
                op,
                left.type_name(),
                right.type_name()
            )));
        }
    };

    match rank {
        0..=2 => {
            let (a, b) = left.as_i64().zip(right.as_i64()).ok_or_else(overflow)?;
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Subtract => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                BinaryOperator::Divide if b == 0 => return Err(EvalError::DivisionByZero),
                BinaryOperator::Divide => a.checked_div(b),
                BinaryOperator::Modulo if b == 0 => return Err(EvalError::DivisionByZero),
                _ => a.checked_rem(b),
            }
            .ok_or_else(overflow)?;
            if rank == 2 {
                Ok(Value::Int64(result))
            } else {
                i32::try_from(result).map(Value::Int32).map_err(|_| overflow())
            }
        }
        3 => {
            let (a, b) = left.as_decimal().zip(right.as_decimal()).ok_or_else(overflow)?;
            if b.is_zero() && matches!(op, BinaryOperator::Divide | BinaryOperator::Modulo) {
                return Err(EvalError::DivisionByZero);
            }
            match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Subtract => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                BinaryOperator::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            }
            .map(Value::Decimal)
            .ok_or_else(overflow)
        }
        _ => {
            let (a, b) = left.as_f64().zip(right.as_f64()).ok_or_else(overflow)?;
            let result = match op {
                BinaryOperator::Add => a + b,
                BinaryOperator::Subtract => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => a / b,
                _ => a % b,
            };
            if rank == 4 {
                Ok(Value::Single(result as f32))
            } else {
                Ok(Value::Double(result))
            }
        }
    }
}

// ========================================
// Comparison and conversion
// ========================================

/// Orders two values of compatible types. Numbers compare across numeric
/// types and dates compare with date-times at midnight UTC.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Guid(x), Value::Guid(y)) => Some(x.cmp(y)),
        (Value::DateTimeOffset(x), Value::DateTimeOffset(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::DateTimeOffset(y)) => Some(midnight(x).cmp(y)),
        (Value::DateTimeOffset(x), Value::Date(y)) => Some(x.cmp(&midnight(y))),
        (Value::TimeOfDay(x), Value::TimeOfDay(y)) => Some(x.cmp(y)),
        (Value::Duration(x), Value::Duration(y)) => Some(x.cmp(y)),
        (Value::Binary(x), Value::Binary(y)) => Some(x.cmp(y)),
        (x, y) if x.is_numeric() && y.is_numeric() => {
            let floating = |v: &Value| matches!(v, Value::Single(_) | Value::Double(_));
            if floating(x) || floating(y) {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            } else {
                Some(x.as_decimal()?.cmp(&y.as_decimal()?))
            }
        }
        _ => None,
    }
}

/// Equality with null equal only to null.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Sort order used by `$orderby`: nulls first, incomparable values equal.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

fn midnight(date: &NaiveDate) -> DateTime<FixedOffset> {
    date.and_time(NaiveTime::MIN).and_utc().fixed_offset()
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        v if v.as_i64().is_some() => v.as_i64(),
        v => {
            let d = v.as_decimal()?;
            if d.fract().is_zero() { d.to_i64() } else { None }
        }
    }
}

/// Converts a value to `target`. Null converts to null; strings parse into
/// numbers, booleans, GUIDs and date/time values.
///
/// # Examples
///
/// ```
/// use odata_query::Value;
/// use odata_query::evaluator::convert;
/// use odata_query::types::EdmType;
///
/// assert_eq!(convert(&Value::Int32(5), &EdmType::Double).unwrap(), Value::Double(5.0));
/// assert_eq!(convert(&Value::from("12"), &EdmType::Int64).unwrap(), Value::Int64(12));
/// assert!(convert(&Value::Double(2.5), &EdmType::Int32).is_err());
/// ```
pub fn convert(value: &Value, target: &EdmType) -> Result<Value, EvalError> {
    let fail = || EvalError::InvalidConversion {
        value: value.to_string(),
        target: target.name(),
    };
    match (value, target) {
        (Value::Null, _) => Ok(Value::Null),
        (_, EdmType::Object | EdmType::Record(_) | EdmType::Collection(_)) => Ok(value.clone()),
        (Value::String(_), EdmType::String) => Ok(value.clone()),
        (Value::Record(_) | Value::Collection(_), EdmType::String) => Err(fail()),
        (v, EdmType::String) => Ok(Value::String(v.to_string())),
        (Value::Boolean(_), EdmType::Boolean) => Ok(value.clone()),
        (Value::String(s), EdmType::Boolean) => match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(fail()),
        },
        (Value::Boolean(_), _) => Err(fail()),
        (v, EdmType::Byte | EdmType::Int32 | EdmType::Int64) => {
            let n = integral(v).ok_or_else(fail)?;
            match target {
                EdmType::Byte => u8::try_from(n).map(Value::Byte).map_err(|_| fail()),
                EdmType::Int32 => i32::try_from(n).map(Value::Int32).map_err(|_| fail()),
                _ => Ok(Value::Int64(n)),
            }
        }
        (v, EdmType::Decimal) => match v {
            Value::String(s) => Decimal::from_str(s.trim()).map(Value::Decimal).map_err(|_| fail()),
            _ => v.as_decimal().map(Value::Decimal).ok_or_else(fail),
        },
        (v, EdmType::Single | EdmType::Double) => {
            let n = match v {
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => v.as_f64(),
            }
            .ok_or_else(fail)?;
            if *target == EdmType::Single {
                Ok(Value::Single(n as f32))
            } else {
                Ok(Value::Double(n))
            }
        }
        (Value::Guid(_), EdmType::Guid) => Ok(value.clone()),
        (Value::String(s), EdmType::Guid) => Uuid::parse_str(s.trim()).map(Value::Guid).map_err(|_| fail()),
        (Value::DateTimeOffset(_), EdmType::DateTimeOffset) => Ok(value.clone()),
        (Value::Date(d), EdmType::DateTimeOffset) => Ok(Value::DateTimeOffset(midnight(d))),
        (Value::String(s), EdmType::DateTimeOffset) => match literal::parse_date_time_text(s.trim()) {
            Some(Value::Date(d)) => Ok(Value::DateTimeOffset(midnight(&d))),
            Some(dt @ Value::DateTimeOffset(_)) => Ok(dt),
            _ => Err(fail()),
        },
        (Value::Date(_), EdmType::Date) => Ok(value.clone()),
        (Value::DateTimeOffset(dt), EdmType::Date) => Ok(Value::Date(dt.date_naive())),
        (Value::String(s), EdmType::Date) => match literal::parse_date_time_text(s.trim()) {
            Some(Value::Date(d)) => Ok(Value::Date(d)),
            Some(Value::DateTimeOffset(dt)) => Ok(Value::Date(dt.date_naive())),
            _ => Err(fail()),
        },
        (Value::TimeOfDay(_), EdmType::TimeOfDay) => Ok(value.clone()),
        (Value::String(s), EdmType::TimeOfDay) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M"))
            .map(Value::TimeOfDay)
            .map_err(|_| fail()),
        (Value::Duration(_), EdmType::Duration) => Ok(value.clone()),
        (Value::String(s), EdmType::Duration) => literal::parse_duration(s.trim())
            .map(Value::Duration)
            .ok_or_else(fail),
        (Value::Binary(_), EdmType::Binary) => Ok(value.clone()),
        _ => Err(fail()),
    }
}
