//! The canonical function table and its static typing rules.

use super::{CompileError, Typed};
use crate::expr::QueryExpr;
use crate::types::{EdmType, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    // Date and time
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Date,
    Time,
    FractionalSeconds,
    TotalOffsetMinutes,
    TotalSeconds,
    Now,
    MaxDateTime,
    MinDateTime,

    // Arithmetic
    Ceiling,
    Floor,
    Round,

    // String
    Concat,
    Contains,
    EndsWith,
    StartsWith,
    IndexOf,
    Length,
    Replace,
    Substring,
    SubstringOf,
    ToLower,
    ToUpper,
    Trim,
    MatchesPattern,
}

const TABLE: &[(&str, Function)] = &[
    ("year", Function::Year),
    ("month", Function::Month),
    ("day", Function::Day),
    ("hour", Function::Hour),
    ("minute", Function::Minute),
    ("second", Function::Second),
    ("date", Function::Date),
    ("time", Function::Time),
    ("fractionalseconds", Function::FractionalSeconds),
    ("totaloffsetminutes", Function::TotalOffsetMinutes),
    ("totalseconds", Function::TotalSeconds),
    ("now", Function::Now),
    ("maxdatetime", Function::MaxDateTime),
    ("mindatetime", Function::MinDateTime),
    ("ceiling", Function::Ceiling),
    ("floor", Function::Floor),
    ("round", Function::Round),
    ("concat", Function::Concat),
    ("contains", Function::Contains),
    ("endswith", Function::EndsWith),
    ("startswith", Function::StartsWith),
    ("indexof", Function::IndexOf),
    ("length", Function::Length),
    ("replace", Function::Replace),
    ("substring", Function::Substring),
    ("substringof", Function::SubstringOf),
    ("tolower", Function::ToLower),
    ("toupper", Function::ToUpper),
    ("trim", Function::Trim),
    ("matchespattern", Function::MatchesPattern),
];

impl Function {
    /// Looks a function up by its URL name, ignoring case.
    pub fn from_name(name: &str) -> Option<Function> {
        TABLE
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    pub fn name(self) -> &'static str {
        TABLE
            .iter()
            .find(|(_, f)| *f == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }

    /// Every supported function, in table order.
    pub fn all() -> impl Iterator<Item = Function> {
        TABLE.iter().map(|(_, f)| *f)
    }

    fn arity(self) -> (usize, usize) {
        match self {
            Function::Now | Function::MaxDateTime | Function::MinDateTime => (0, 0),
            Function::Concat => (2, usize::MAX),
            Function::Contains
            | Function::EndsWith
            | Function::StartsWith
            | Function::IndexOf
            | Function::SubstringOf
            | Function::MatchesPattern => (2, 2),
            Function::Replace => (3, 3),
            Function::Substring => (2, 3),
            _ => (1, 1),
        }
    }
}

/// Checks the argument types of a call and works out its result type.
/// Non-string arguments of string functions are converted to strings.
pub(crate) fn compile_call(function: Function, args: Vec<Typed>) -> Result<Typed, CompileError> {
    let (min, max) = function.arity();
    if args.len() < min || args.len() > max {
        let expected = match (min, max) {
            (min, max) if min == max => min.to_string(),
            (min, usize::MAX) => format!("at least {}", min),
            (min, max) => format!("{} to {}", min, max),
        };
        return Err(CompileError::ArgumentCount {
            function: function.name().to_string(),
            expected,
            found: args.len(),
        });
    }

    let nullable = args.iter().any(|arg| arg.ty.nullable);
    let temporal = [EdmType::DateTimeOffset, EdmType::Date];
    let clock = [EdmType::DateTimeOffset, EdmType::TimeOfDay, EdmType::Duration];

    let result = match function {
        Function::Year | Function::Month => {
            expect(function, &args[0], &temporal)?;
            EdmType::Int32
        }
        Function::Day => {
            expect(
                function,
                &args[0],
                &[EdmType::DateTimeOffset, EdmType::Date, EdmType::Duration],
            )?;
            EdmType::Int32
        }
        Function::Hour | Function::Minute | Function::Second => {
            expect(function, &args[0], &clock)?;
            EdmType::Int32
        }
        Function::FractionalSeconds => {
            expect(function, &args[0], &clock)?;
            EdmType::Decimal
        }
        Function::Date => {
            expect(function, &args[0], &[EdmType::DateTimeOffset])?;
            EdmType::Date
        }
        Function::Time => {
            expect(function, &args[0], &[EdmType::DateTimeOffset])?;
            EdmType::TimeOfDay
        }
        Function::TotalOffsetMinutes => {
            expect(function, &args[0], &[EdmType::DateTimeOffset])?;
            EdmType::Int32
        }
        Function::TotalSeconds => {
            expect(function, &args[0], &[EdmType::Duration])?;
            EdmType::Double
        }
        Function::Now | Function::MaxDateTime | Function::MinDateTime => EdmType::DateTimeOffset,
        Function::Ceiling | Function::Floor | Function::Round => {
            let arg = &args[0];
            if !arg.ty.kind.is_numeric() && !arg.ty.is_object() {
                return Err(unsupported(function, &arg.ty));
            }
            arg.ty.kind.clone()
        }
        Function::Substring => {
            for index in &args[1..] {
                if !index.ty.kind.is_integral() && !index.ty.is_object() {
                    return Err(unsupported(function, &index.ty));
                }
            }
            EdmType::String
        }
        Function::Concat
        | Function::Replace
        | Function::ToLower
        | Function::ToUpper
        | Function::Trim => EdmType::String,
        Function::Contains
        | Function::EndsWith
        | Function::StartsWith
        | Function::SubstringOf
        | Function::MatchesPattern => EdmType::Boolean,
        Function::IndexOf | Function::Length => EdmType::Int32,
    };

    let string_args = match function {
        Function::Substring => 1,
        Function::Concat
        | Function::Contains
        | Function::EndsWith
        | Function::StartsWith
        | Function::IndexOf
        | Function::Length
        | Function::Replace
        | Function::SubstringOf
        | Function::ToLower
        | Function::ToUpper
        | Function::Trim
        | Function::MatchesPattern => args.len(),
        _ => 0,
    };
    let args = args
        .into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i < string_args {
                as_string(arg)
            } else {
                arg.expr
            }
        })
        .collect();

    Ok(Typed::new(
        QueryExpr::Call { function, args },
        TypeRef {
            kind: result,
            nullable,
        },
    ))
}

fn expect(function: Function, arg: &Typed, allowed: &[EdmType]) -> Result<(), CompileError> {
    if arg.ty.is_object() || allowed.contains(&arg.ty.kind) {
        Ok(())
    } else {
        Err(unsupported(function, &arg.ty))
    }
}

fn as_string(arg: Typed) -> QueryExpr {
    match arg.ty.kind {
        EdmType::String | EdmType::Object => arg.expr,
        _ => QueryExpr::convert(arg.expr, TypeRef::optional(EdmType::String)),
    }
}

fn unsupported(function: Function, operand: &TypeRef) -> CompileError {
    CompileError::UnsupportedOperation {
        operation: function.name().to_string(),
        operand: operand.to_string(),
    }
}
