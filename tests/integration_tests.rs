// tests/integration_tests.rs

use chrono::{DateTime, TimeZone, Utc};
use odata_query::compiler::Compiler;
use odata_query::executor::{ExecutionSettings, ODataResult, execute};
use odata_query::queryable::{MemoryQueryable, ProjectedRecord, QueryError, Queryable};
use odata_query::types::{EdmType, RecordType, TypeRef};
use odata_query::{
    DynamicAccessor, Evaluator, Lambda, ODataVersion, Projection, SortKey, UriBuilder, Value, parse,
};
use std::collections::HashMap;

fn person(id: i32, name: &str, age: Option<i32>) -> Value {
    Value::record([
        ("Id", Value::from(id)),
        ("Name", Value::from(name)),
        ("Age", Value::from(age)),
    ])
}

fn people() -> Vec<Value> {
    vec![
        person(3, "Charles", Some(52)),
        person(1, "Andrew", Some(31)),
        person(4, "David", None),
        person(5, "Edward", Some(19)),
        person(2, "Boris", Some(31)),
    ]
}

fn dynamics() -> Vec<Value> {
    vec![
        person(1, "Karl", Some(40)),
        person(2, "Kathryn", Some(35)),
        person(3, "Pete", Some(25)),
        person(4, "Dominic", None),
    ]
}

fn run(url: &str, items: Vec<Value>, settings: &ExecutionSettings) -> ODataResult<MemoryQueryable> {
    let _ = env_logger::builder().is_test(true).try_init();
    let uri = parse(url, ODataVersion::ALL).unwrap_or_else(|e| panic!("Failed for input: {} ({})", url, e));
    execute(&uri, &MemoryQueryable::dynamic(items), settings)
        .unwrap_or_else(|e| panic!("Failed for input: {} ({})", url, e))
}

fn names(result: &ODataResult<MemoryQueryable>) -> Vec<String> {
    result
        .items()
        .expect("items, not a projection")
        .to_vec()
        .unwrap()
        .iter()
        .map(|item| item.get("Name").map(Value::as_string).unwrap_or_default())
        .collect()
}

fn query_names(url: &str, items: Vec<Value>) -> Vec<String> {
    names(&run(url, items, &ExecutionSettings::new()))
}

// ============================================================================
// Filtering, Sorting and Paging
// ============================================================================

#[test]
fn test_sort_then_page() {
    assert_eq!(
        query_names("People?$orderby=Id&$skip=1&$top=2", people()),
        vec!["Boris", "Charles"]
    );
    // Option order in the URL does not change the result.
    assert_eq!(
        query_names("People?$top=2&$skip=1&$orderby=Id", people()),
        vec!["Boris", "Charles"]
    );
}

#[test]
fn test_multi_key_sort() {
    assert_eq!(
        query_names("People?$orderby=Age desc,Name", people()),
        vec!["Charles", "Andrew", "Boris", "Edward", "David"]
    );
    assert_eq!(
        query_names("People?$orderby=Age,Name desc", people()),
        vec!["David", "Edward", "Boris", "Andrew", "Charles"]
    );
}

#[test]
fn test_filters_over_dynamic_items() {
    let test_cases = vec![
        ("Age gt 30", vec!["Karl", "Kathryn"]),
        ("Age eq null", vec!["Dominic"]),
        ("Age ne null", vec!["Karl", "Kathryn", "Pete"]),
        ("Age ne 40", vec!["Kathryn", "Pete", "Dominic"]),
        ("Age lt 30 or Name eq 'Karl'", vec!["Karl", "Pete"]),
        ("not (Age gt 30)", vec!["Pete", "Dominic"]),
        ("startswith(Name,'K') and Age lt 40", vec!["Kathryn"]),
        ("Age add 5 gt 40", vec!["Karl"]),
        ("Age mod 2 eq 1", vec!["Kathryn", "Pete"]),
        ("-Age lt -30", vec!["Karl", "Kathryn"]),
    ];

    for (filter, expected) in test_cases {
        let url = format!("People?$filter={}", filter);
        assert_eq!(query_names(&url, dynamics()), expected, "Failed for input: {}", url);
    }
}

#[test]
fn test_string_functions() {
    let test_cases = vec![
        ("tolower(Name) eq 'karl'", vec!["Karl"]),
        ("toupper(Name) eq 'PETE'", vec!["Pete"]),
        ("length(Name) eq 4", vec!["Karl", "Pete"]),
        ("substring(Name,1,2) eq 'at'", vec!["Kathryn"]),
        ("substring(Name,5) eq 'ic'", vec!["Dominic"]),
        ("indexof(Name,'e') eq 1", vec!["Pete"]),
        ("contains(Name,'i')", vec!["Dominic"]),
        ("endswith(Name,'l')", vec!["Karl"]),
        ("substringof('ath',Name)", vec!["Kathryn"]),
        ("concat(Name,'!') eq 'Pete!'", vec!["Pete"]),
        ("replace(Name,'K','C') eq 'Carl'", vec!["Karl"]),
        ("trim(concat(' ',Name)) eq 'Pete'", vec!["Pete"]),
        ("matchespattern(Name,'^K.*n$')", vec!["Kathryn"]),
    ];

    for (filter, expected) in test_cases {
        let url = format!("People?$filter={}", filter);
        assert_eq!(query_names(&url, dynamics()), expected, "Failed for input: {}", url);
    }
}

#[test]
fn test_lambdas_over_nested_collections() {
    let order = |name: &str, quantities: &[i32]| {
        let lines: Vec<Value> = quantities
            .iter()
            .map(|q| Value::record([("Qty", Value::from(*q))]))
            .collect();
        Value::record([("Name", Value::from(name)), ("Lines", Value::from(lines))])
    };
    let orders = || {
        vec![
            order("small", &[1, 2]),
            order("large", &[10, 20]),
            order("mixed", &[1, 20]),
            order("empty", &[]),
            Value::record([("Name", Value::from("missing"))]),
        ]
    };

    let test_cases = vec![
        ("Lines/any(l:l/Qty gt 5)", vec!["large", "mixed"]),
        ("Lines/all(l:l/Qty gt 5)", vec!["large", "empty", "missing"]),
        ("Lines/any()", vec!["small", "large", "mixed"]),
        ("Lines/$count eq 0", vec!["empty", "missing"]),
        ("Lines/any(l:l/Qty gt 5 and Name eq 'mixed')", vec!["mixed"]),
    ];

    for (filter, expected) in test_cases {
        let url = format!("Orders?$filter={}", filter);
        assert_eq!(query_names(&url, orders()), expected, "Failed for input: {}", url);
    }
}

#[test]
fn test_fixed_clock() {
    let now: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let evaluator = Evaluator::at(now.fixed_offset());
    let released = |name: &str, year: i32| {
        let at = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap().fixed_offset();
        Value::record([("Name", Value::from(name)), ("Released", Value::from(at))])
    };
    let source = MemoryQueryable::dynamic(vec![released("old", 2020), released("future", 2030)])
        .with_evaluator(evaluator);

    let uri = parse("Products?$filter=Released lt now()", ODataVersion::ALL).unwrap();
    let result = execute(&uri, &source, &ExecutionSettings::new()).unwrap();
    assert_eq!(names(&result), vec!["old"]);

    let uri = parse("Products?$filter=year(Released) eq 2030", ODataVersion::ALL).unwrap();
    let result = execute(&uri, &source, &ExecutionSettings::new()).unwrap();
    assert_eq!(names(&result), vec!["future"]);
}

// ============================================================================
// Typed Sources
// ============================================================================

fn product_type() -> TypeRef {
    TypeRef::record(
        RecordType::new("Product")
            .property("Id", TypeRef::required(EdmType::Int32))
            .property("Name", TypeRef::optional(EdmType::String))
            .property("Price", TypeRef::required(EdmType::Double))
            .property("Rating", TypeRef::optional(EdmType::Int32)),
    )
}

fn products() -> MemoryQueryable {
    let product = |id: i32, name: &str, price: f64, rating: Option<i32>| {
        Value::record([
            ("Id", Value::from(id)),
            ("Name", Value::from(name)),
            ("Price", Value::from(price)),
            ("Rating", Value::from(rating)),
        ])
    };
    MemoryQueryable::new(
        vec![
            product(1, "Milk", 2.5, Some(4)),
            product(2, "Bread", 3.0, None),
            product(3, "Cheese", 9.75, Some(3)),
        ],
        product_type(),
    )
}

#[test]
fn test_typed_source() {
    let test_cases = vec![
        ("Price gt 3", vec!["Cheese"]),
        ("Rating ne 3", vec!["Milk", "Bread"]),
        ("Rating gt 2", vec!["Milk", "Cheese"]),
        ("Id add 1 ge Price", vec!["Bread"]),
        ("Rating eq null", vec!["Bread"]),
    ];

    for (filter, expected) in test_cases {
        let url = format!("Products?$filter={}", filter);
        let uri = parse(&url, ODataVersion::ALL).unwrap();
        let result = execute(&uri, &products(), &ExecutionSettings::new()).unwrap();
        assert_eq!(names(&result), expected, "Failed for input: {}", url);
    }
}

#[test]
fn test_typed_source_rejects_unknown_members() {
    let uri = parse("Products?$filter=Weight gt 1", ODataVersion::ALL).unwrap();
    let err = execute(&uri, &products(), &ExecutionSettings::new()).unwrap_err();
    assert!(matches!(err, QueryError::Compile(_)), "got {:?}", err);
}

#[test]
fn test_nullable_members_compare_with_each_other() {
    let pair_type = TypeRef::record(
        RecordType::new("Pair")
            .property("Name", TypeRef::required(EdmType::String))
            .property("A", TypeRef::optional(EdmType::Int32))
            .property("B", TypeRef::optional(EdmType::Int32)),
    );
    let pair = |name: &str, a: Option<i32>, b: Option<i32>| {
        Value::record([("Name", Value::from(name)), ("A", Value::from(a)), ("B", Value::from(b))])
    };
    let source = MemoryQueryable::new(
        vec![
            pair("both null", None, None),
            pair("equal", Some(1), Some(1)),
            pair("different", Some(1), Some(2)),
            pair("one null", Some(1), None),
        ],
        pair_type,
    );

    let test_cases = vec![
        ("A eq B", vec!["both null", "equal"]),
        ("A ne B", vec!["different", "one null"]),
        ("A lt B", vec!["different"]),
    ];

    for (filter, expected) in test_cases {
        let url = format!("Pairs?$filter={}", filter);
        let uri = parse(&url, ODataVersion::ALL).unwrap();
        let result = execute(&uri, &source, &ExecutionSettings::new()).unwrap();
        assert_eq!(names(&result), expected, "Failed for input: {}", url);
    }
}

#[test]
fn test_dynamic_accessor_over_typed_items() {
    let accessor = DynamicAccessor::new(|item, name| {
        item.get(&name.to_ascii_lowercase()).cloned().unwrap_or(Value::Null)
    });
    let items = vec![
        Value::record([("name", Value::from("lower")), ("size", Value::from(7))]),
        Value::record([("name", Value::from("small")), ("size", Value::from(2))]),
    ];
    let uri = parse("Things?$filter=Size gt 5", ODataVersion::ALL).unwrap();
    let settings = ExecutionSettings::new().with_accessor(accessor);
    let result = execute(&uri, &MemoryQueryable::dynamic(items), &settings).unwrap();
    let items = result.items().unwrap().to_vec().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("name"), Some(&Value::from("lower")));
}

// ============================================================================
// Key Lookup, Expand, Select and Count
// ============================================================================

#[test]
fn test_key_lookup() {
    let keys = HashMap::from([
        ("People".to_string(), vec!["Id".to_string()]),
        ("Pairs".to_string(), vec!["Id".to_string(), "Name".to_string()]),
    ]);
    let settings = ExecutionSettings::new().with_metadata(keys);

    let result = run("People(4)", people(), &settings);
    assert!(result.lookup_by_key);
    assert_eq!(names(&result), vec!["David"]);

    let result = run("Pairs(Name='Boris',Id=2)", people(), &settings);
    assert!(result.lookup_by_key);
    assert_eq!(names(&result), vec!["Boris"]);

    // Unknown entity sets and plain segments run unfiltered.
    let result = run("Others(4)", people(), &settings);
    assert!(!result.lookup_by_key);
    assert_eq!(names(&result).len(), 5);
}

#[test]
fn test_key_lookup_under_service_root() {
    let keys = HashMap::from([("People".to_string(), vec!["Id".to_string()])]);
    let settings = ExecutionSettings::new().with_metadata(keys).with_root_segments(1);
    let result = run("http://host/service/People(1)", people(), &settings);
    assert!(result.lookup_by_key);
    assert_eq!(names(&result), vec!["Andrew"]);
}

#[test]
fn test_expand_records_paths() {
    let result = run(
        "People?$expand=Friends,Address/City",
        people(),
        &ExecutionSettings::new(),
    );
    let includes = result.items().unwrap().includes().to_vec();
    assert_eq!(includes, vec!["Friends", "Address/City"]);
}

/// A source without the include capability.
#[derive(Clone)]
struct PlainSource(MemoryQueryable);

impl Queryable for PlainSource {
    fn element_type(&self) -> TypeRef {
        self.0.element_type()
    }

    fn filter(&self, predicate: &Lambda) -> Result<Self, QueryError> {
        self.0.filter(predicate).map(PlainSource)
    }

    fn order_by(&self, key: &SortKey) -> Result<Self, QueryError> {
        self.0.order_by(key).map(PlainSource)
    }

    fn skip(&self, count: usize) -> Self {
        PlainSource(self.0.skip(count))
    }

    fn take(&self, count: usize) -> Self {
        PlainSource(self.0.take(count))
    }

    fn count(&self) -> Result<usize, QueryError> {
        self.0.count()
    }

    fn select(&self, projection: &Projection) -> Result<Vec<ProjectedRecord>, QueryError> {
        self.0.select(projection)
    }
}

#[test]
fn test_expand_without_include_support_is_ignored() {
    let uri = parse("People?$expand=Friends&$top=2", ODataVersion::ALL).unwrap();
    let source = PlainSource(MemoryQueryable::dynamic(people()));
    let result = execute(&uri, &source, &ExecutionSettings::new()).unwrap();
    assert_eq!(result.items().unwrap().count().unwrap(), 2);
}

#[test]
fn test_select_projects_fields() {
    let result = run(
        "People?$filter=Id le 2&$orderby=Id&$select=Name,Age",
        people(),
        &ExecutionSettings::new(),
    );
    let records = result.projected().expect("projection");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].names().collect::<Vec<_>>(), vec!["Name", "Age"]);
    assert_eq!(records[0].get("Name"), Some(&Value::from("Andrew")));
    assert_eq!(records[1].get("Age"), Some(&Value::from(31)));
    assert_eq!(records[1].get("Id"), None);

    let result = run("People?$select=*", people(), &ExecutionSettings::new());
    assert!(result.items().is_some());
}

#[test]
fn test_inline_count_ignores_paging() {
    let result = run(
        "People?$filter=Age gt 20&$top=1&$inlinecount=allpages",
        people(),
        &ExecutionSettings::new(),
    );
    assert_eq!(result.total_count, Some(3));
    assert_eq!(names(&result).len(), 1);

    let result = run("People?$count=true&$skip=4", people(), &ExecutionSettings::new());
    assert_eq!(result.total_count, Some(5));

    let result = run("People?$inlinecount=none", people(), &ExecutionSettings::new());
    assert_eq!(result.total_count, None);
}

#[test]
fn test_max_page_size() {
    let settings = ExecutionSettings::new().with_max_page_size(2);
    let test_cases = vec![
        ("People?$orderby=Id", 2),
        ("People?$orderby=Id&$top=1", 1),
        ("People?$orderby=Id&$top=10", 2),
    ];

    for (url, expected) in test_cases {
        assert_eq!(names(&run(url, people(), &settings)).len(), expected, "Failed for input: {}", url);
    }
}

#[test]
fn test_aliases_and_custom_options() {
    assert_eq!(
        query_names("People?$filter=Age gt @min&@min=30&callback=jsonp", dynamics()),
        vec!["Karl", "Kathryn"]
    );
}

#[test]
fn test_invalid_paging_values() {
    let uri = parse("People?$top=-1", ODataVersion::ALL).unwrap();
    let err = execute(&uri, &MemoryQueryable::dynamic(people()), &ExecutionSettings::new()).unwrap_err();
    assert!(matches!(err, QueryError::Compile(_)), "got {:?}", err);
}

#[test]
fn test_then_by_needs_a_sort() {
    let uri = parse("?$orderby=Name,Id", ODataVersion::ALL).unwrap();
    let keys = Compiler::new(TypeRef::object())
        .sort_keys(uri.query().order_by().unwrap())
        .unwrap();
    let source = MemoryQueryable::dynamic(people());

    let err = source.order_by(&keys[1]).unwrap_err();
    assert!(matches!(err, QueryError::Unsupported(_)), "got {:?}", err);

    let sorted = source.order_by(&keys[0]).and_then(|q| q.order_by(&keys[1])).unwrap();
    assert_eq!(sorted.count().unwrap(), 5);
}

#[test]
fn test_operators_do_not_mutate_source() {
    let source = MemoryQueryable::dynamic(people());
    let paged = source.skip(1).take(2);
    assert_eq!(paged.count().unwrap(), 2);
    assert_eq!(source.count().unwrap(), 5);
}

// ============================================================================
// Builder
// ============================================================================

#[test]
fn test_builder_urls() {
    let url = UriBuilder::new("")
        .segment("Pairs")
        .keys([("Id", Value::from(2)), ("Name", Value::from("O'Neil"))])
        .unwrap()
        .build();
    assert_eq!(url, "Pairs(Id=2,Name='O''Neil')");

    let url = UriBuilder::new("http://host/svc/")
        .segment("People")
        .filter("Age gt @min")
        .alias("min", 30)
        .unwrap()
        .order_by(&["Age desc", "Name"])
        .select(&["Name"])
        .skip(1)
        .inline_count()
        .build();
    assert_eq!(
        url,
        "http://host/svc/People?$filter=Age%20gt%20@min&@min=30&$orderby=Age%20desc,Name&$select=Name&$skip=1&$count=true"
    );

    let url = UriBuilder::new("")
        .version(ODataVersion::V3)
        .segment("People")
        .inline_count()
        .build();
    assert_eq!(url, "People?$inlinecount=allpages");

    assert!(UriBuilder::new("http://host").key(1).is_err());
}

#[test]
fn test_built_urls_execute() {
    let url = UriBuilder::new("")
        .segment("People")
        .filter("Age gt @min")
        .alias("min", 30)
        .unwrap()
        .order_by(&["Age desc", "Name"])
        .top(2)
        .inline_count()
        .build();
    let result = run(&url, people(), &ExecutionSettings::new());
    assert_eq!(names(&result), vec!["Charles", "Andrew"]);
    assert_eq!(result.total_count, Some(3));
}

// ============================================================================
// Command Line
// ============================================================================

#[cfg(feature = "cli")]
mod cli {
    use odata_query::ODataVersion;
    use odata_query::cli::{self, CliError, RunOptions};
    use serde_json::json;
    use std::collections::HashMap;

    fn options(url: &str, input: serde_json::Value) -> RunOptions {
        RunOptions {
            url: url.to_string(),
            input: Some(input.to_string()),
            version: ODataVersion::ALL,
            ..RunOptions::default()
        }
    }

    fn sample() -> serde_json::Value {
        json!([
            {"Id": 1, "Name": "Karl", "Age": 40, "Joined": "2021-06-01T00:00:00Z"},
            {"Id": 2, "Name": "Kathryn", "Age": 35, "Joined": "2019-03-15T00:00:00Z"},
            {"Id": 3, "Name": "Pete", "Age": 25, "Joined": "2022-01-20T00:00:00Z"},
            {"Id": 4, "Name": "Dominic", "Age": null}
        ])
    }

    #[test]
    fn test_run_filters_json() {
        let output = cli::execute_run(&options("People?$filter=Age gt 30&$orderby=Name desc", sample())).unwrap();
        let names: Vec<&str> = output["value"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["Name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Kathryn", "Karl"]);
        assert!(output.get("@odata.count").is_none());
    }

    #[test]
    fn test_run_dates_in_json_strings() {
        let output = cli::execute_run(&options("People?$filter=Joined gt 2020-01-01&$select=Name", sample())).unwrap();
        assert_eq!(output["value"], json!([{"Name": "Karl"}, {"Name": "Pete"}]));
    }

    #[test]
    fn test_run_count_and_wrapped_input() {
        let input = json!({"value": sample()});
        let output = cli::execute_run(&options("People?$top=1&$count=true&$select=Id", input)).unwrap();
        assert_eq!(output["@odata.count"], json!(4));
        assert_eq!(output["value"], json!([{"Id": 1}]));
    }

    #[test]
    fn test_run_key_lookup() {
        let mut run = options("People(3)", sample());
        run.keys = HashMap::from([("People".to_string(), vec!["Id".to_string()])]);
        let output = cli::execute_run(&run).unwrap();
        assert_eq!(output["value"][0]["Name"], json!("Pete"));
    }

    #[test]
    fn test_run_errors() {
        let mut run = options("People", sample());
        run.input = None;
        assert!(matches!(cli::execute_run(&run), Err(CliError::NoInput)));

        let run = options("People", json!({"Name": "Karl"}));
        assert!(matches!(cli::execute_run(&run), Err(CliError::InvalidInput(_))));

        let run = options("People?$filter=Age gt", sample());
        assert!(matches!(cli::execute_run(&run), Err(CliError::Parse(_))));

        let run = options("People?$filter=Nope(Age)", sample());
        assert!(matches!(cli::execute_run(&run), Err(CliError::Query(_))));
    }

    #[test]
    fn test_key_args() {
        assert_eq!(
            cli::parse_key_arg("Orders=Id, Line").unwrap(),
            ("Orders".to_string(), vec!["Id".to_string(), "Line".to_string()])
        );
        for arg in ["Orders", "=Id", "Orders="] {
            assert!(cli::parse_key_arg(arg).is_err(), "Failed for input: {}", arg);
        }
    }

    #[test]
    fn test_describe_orders_options() {
        let text = cli::describe("Products?$top=2&$filter=Price gt 5", ODataVersion::ALL).unwrap();
        let filter = text.find("$filter").unwrap();
        let top = text.find("$top").unwrap();
        assert!(text.starts_with("segments:\n  Products\n"), "got {}", text);
        assert!(filter < top);
    }

    #[test]
    fn test_list_tokens_fails_on_bad_input() {
        assert!(cli::list_tokens("People?$filter=Name eq 'open", ODataVersion::ALL).is_err());
        let tokens = cli::list_tokens("People?$top=1", ODataVersion::ALL).unwrap();
        assert!(tokens.len() >= 4);
    }
}
