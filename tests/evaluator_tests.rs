// tests/evaluator_tests.rs
//
// Runtime semantics of compiled expressions: null handling, numeric
// arithmetic, conversions and the canonical functions.

use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
use odata_query::compiler::Compiler;
use odata_query::evaluator::{self, EvalError, Evaluator};
use odata_query::expr::Lambda;
use odata_query::types::{EdmType, TypeRef};
use odata_query::{ODataVersion, Value, parse};
use std::cmp::Ordering;

fn evaluator() -> Evaluator {
    Evaluator::at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 15).unwrap().fixed_offset())
}

fn eval(expr: &str, item: &Value) -> Result<Value, String> {
    let url = format!("?$filter={}", expr);
    let uri = parse(&url, ODataVersion::ALL).map_err(|e| e.to_string())?;
    let body = uri
        .query()
        .filter()
        .and_then(|filter| filter.child(0))
        .ok_or_else(|| "empty filter".to_string())?;
    let typed = Compiler::new(TypeRef::object())
        .expression(body)
        .map_err(|e| e.to_string())?;
    evaluator()
        .apply(&Lambda::new("$it", typed.expr), item)
        .map_err(|e| e.to_string())
}

fn item() -> Value {
    Value::record([
        ("Count", Value::from(7)),
        ("Big", Value::from(i64::from(i32::MAX))),
        ("Score", Value::from(2.5)),
        ("Name", Value::from("Karl")),
        ("Missing", Value::Null),
        ("Flags", Value::from(7)),
        ("Colors", Value::from("Red, Green")),
        (
            "Start",
            Value::from(Utc.with_ymd_and_hms(2024, 1, 31, 8, 15, 0).unwrap().fixed_offset()),
        ),
        ("Day", Value::from(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())),
        ("Lines", Value::from(vec![Value::from(1), Value::from(5)])),
    ])
}

// ============================================================================
// Null Handling
// ============================================================================

#[test]
fn test_null_semantics() {
    let test_cases = vec![
        ("Missing eq null", Value::from(true)),
        ("Missing ne null", Value::from(false)),
        ("Missing eq 1", Value::from(false)),
        ("Missing ne 1", Value::from(true)),
        ("Missing gt 1", Value::from(false)),
        ("Missing lt 1", Value::from(false)),
        ("Missing add 1", Value::Null),
        ("-Missing", Value::Null),
        ("length(Missing)", Value::Null),
        ("concat(Missing,'x')", Value::from("x")),
        ("Missing/any(x:x gt 1)", Value::from(false)),
        ("Missing/all(x:x gt 1)", Value::from(true)),
        ("Missing/$count", Value::from(0)),
        ("Missing has 1", Value::from(false)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input, &item()).unwrap(), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_missing_members_read_as_null() {
    assert_eq!(eval("Nope", &item()).unwrap(), Value::Null);
    assert_eq!(eval("Nope/Deeper", &item()).unwrap(), Value::Null);
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_integer_arithmetic() {
    let test_cases = vec![
        ("Count add 3", Value::from(10)),
        ("Count sub 10", Value::from(-3)),
        ("Count mul 3", Value::from(21)),
        ("Count div 2", Value::from(3)),
        ("Count mod 4", Value::from(3)),
        ("-Count", Value::from(-7)),
        ("Big add 1", Value::from(i64::from(i32::MAX) + 1)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input, &item()).unwrap(), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_arithmetic_errors() {
    let err = eval("Count div 0", &item()).unwrap_err();
    assert_eq!(err, EvalError::DivisionByZero.to_string());

    let err = eval("Count mod 0", &item()).unwrap_err();
    assert_eq!(err, EvalError::DivisionByZero.to_string());

    let err = eval("Count add 2147483647", &item()).unwrap_err();
    assert!(err.starts_with("Overflow"), "got {}", err);

    let err = eval("Name add 1", &item()).unwrap_err();
    assert!(err.starts_with("Type error"), "got {}", err);
}

#[test]
fn test_floating_arithmetic() {
    assert_eq!(eval("Score mul 2", &item()).unwrap(), Value::from(5.0));
    assert_eq!(eval("Score div 0", &item()).unwrap(), Value::from(f64::INFINITY));
}

#[test]
fn test_temporal_arithmetic() {
    let next_day = Utc.with_ymd_and_hms(2024, 2, 1, 8, 15, 0).unwrap().fixed_offset();
    assert_eq!(eval("Start add duration'P1D'", &item()).unwrap(), Value::from(next_day));

    let day_before = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
    assert_eq!(eval("Day sub duration'P1D'", &item()).unwrap(), Value::from(day_before));

    assert_eq!(
        eval("Start sub Start", &item()).unwrap(),
        Value::from(TimeDelta::zero())
    );
}

// ============================================================================
// Comparison
// ============================================================================

#[test]
fn test_comparisons_across_types() {
    let test_cases = vec![
        ("Count eq 7.0", true),
        ("Score gt 2", true),
        ("Big gt Count", true),
        ("Name lt 'Lars'", true),
        ("Day lt Start", false),
        ("Start lt 2024-02-01T00:00:00Z", true),
        ("Flags has 4", true),
        ("Flags has 8", false),
        ("Colors has 'Green'", true),
        ("Colors has 'Blue'", false),
    ];

    for (input, expected) in test_cases {
        assert_eq!(
            eval(input, &item()).unwrap(),
            Value::from(expected),
            "Failed for input: {}",
            input
        );
    }
}

#[test]
fn test_incomparable_values() {
    let err = eval("Name gt 5", &item()).unwrap_err();
    assert!(err.contains("Cannot compare"), "got {}", err);
}

#[test]
fn test_value_ordering() {
    assert_eq!(evaluator::compare(&Value::Int32(2), &Value::Double(2.0)), Some(Ordering::Equal));
    assert_eq!(evaluator::compare(&Value::Int64(3), &Value::Int32(2)), Some(Ordering::Greater));
    assert_eq!(evaluator::compare(&Value::from("a"), &Value::Int32(1)), None);

    assert!(evaluator::values_equal(&Value::Null, &Value::Null));
    assert!(!evaluator::values_equal(&Value::Null, &Value::Int32(0)));
    assert!(evaluator::values_equal(&Value::Byte(1), &Value::Int64(1)));

    assert_eq!(evaluator::sort_order(&Value::Null, &Value::Int32(1)), Ordering::Less);
    assert_eq!(evaluator::sort_order(&Value::Int32(1), &Value::Null), Ordering::Greater);
    assert_eq!(
        evaluator::sort_order(&Value::from("x"), &Value::Int32(1)),
        Ordering::Equal
    );
}

// ============================================================================
// Conversion
// ============================================================================

#[test]
fn test_conversions() {
    let test_cases = vec![
        (Value::from(5), EdmType::Double, Value::Double(5.0)),
        (Value::from("12"), EdmType::Int64, Value::Int64(12)),
        (Value::from("TRUE"), EdmType::Boolean, Value::Boolean(true)),
        (Value::from(3), EdmType::String, Value::from("3")),
        (Value::Double(4.0), EdmType::Int32, Value::Int32(4)),
        (
            Value::from("2024-01-02"),
            EdmType::Date,
            Value::from(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
        ),
        (Value::Null, EdmType::Int32, Value::Null),
    ];

    for (value, target, expected) in test_cases {
        assert_eq!(
            evaluator::convert(&value, &target).unwrap(),
            expected,
            "Failed for input: {:?} as {}",
            value,
            target.name()
        );
    }
}

#[test]
fn test_failed_conversions() {
    let test_cases = vec![
        (Value::Double(2.5), EdmType::Int32),
        (Value::Int32(300), EdmType::Byte),
        (Value::Boolean(true), EdmType::Int32),
        (Value::from("abc"), EdmType::Double),
        (Value::from("not a date"), EdmType::DateTimeOffset),
    ];

    for (value, target) in test_cases {
        let err = evaluator::convert(&value, &target).unwrap_err();
        assert!(
            matches!(err, EvalError::InvalidConversion { .. }),
            "Failed for input: {:?} as {}",
            value,
            target.name()
        );
    }
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_date_functions() {
    let test_cases = vec![
        ("year(Start)", Value::from(2024)),
        ("month(Start)", Value::from(1)),
        ("day(Start)", Value::from(31)),
        ("hour(Start)", Value::from(8)),
        ("minute(Start)", Value::from(15)),
        ("second(Start)", Value::from(0)),
        ("totaloffsetminutes(Start)", Value::from(0)),
        ("day(Day)", Value::from(29)),
        ("date(Start)", Value::from(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())),
        ("year(now())", Value::from(2024)),
        ("minute(now())", Value::from(30)),
        ("year(maxdatetime())", Value::from(9999)),
        ("year(mindatetime())", Value::from(1)),
        ("totalseconds(duration'PT1M30S')", Value::from(90.0)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input, &item()).unwrap(), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_rounding_functions() {
    let test_cases = vec![
        ("round(Score)", Value::from(3.0)),
        ("floor(Score)", Value::from(2.0)),
        ("ceiling(Score)", Value::from(3.0)),
        ("round(Count)", Value::from(7)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input, &item()).unwrap(), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_string_functions_on_values() {
    let test_cases = vec![
        ("length(Name)", Value::from(4)),
        ("indexof(Name,'r')", Value::from(2)),
        ("indexof(Name,'z')", Value::from(-1)),
        ("substring(Name,1)", Value::from("arl")),
        ("substring(Name,10)", Value::from("")),
        ("concat(Name,Count)", Value::from("Karl7")),
        ("concat(concat(Name,'-'),Name)", Value::from("Karl-Karl")),
        ("tolower(Name)", Value::from("karl")),
        ("contains(Name,'ar')", Value::from(true)),
    ];

    for (input, expected) in test_cases {
        assert_eq!(eval(input, &item()).unwrap(), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_invalid_pattern() {
    let err = eval("matchespattern(Name,'(')", &item()).unwrap_err();
    assert!(err.starts_with("Invalid pattern"), "got {}", err);
}

#[test]
fn test_lambda_bindings_nest() {
    let test_cases = vec![
        ("Lines/any(x:x gt 4)", true),
        ("Lines/all(x:x gt 4)", false),
        ("Lines/any(x:x eq Count sub 2)", true),
        ("Lines/any(x:Lines/any(y:y gt x))", true),
        ("Lines/all(x:Lines/any(y:y gt x))", false),
    ];

    for (input, expected) in test_cases {
        assert_eq!(
            eval(input, &item()).unwrap(),
            Value::from(expected),
            "Failed for input: {}",
            input
        );
    }
    assert_eq!(eval("Lines/$count", &item()).unwrap(), Value::from(2));
}
