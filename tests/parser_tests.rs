// tests/parser_tests.rs

use odata_query::Value;
use odata_query::ast::{NodeKind, ODataUri, ODataVersion};
use odata_query::parser::{ParseError, parse};

fn parse_url(url: &str) -> ODataUri {
    parse(url, ODataVersion::ALL).unwrap_or_else(|e| panic!("Failed for input: {} ({})", url, e))
}

/// The s-expression of the `$filter` option of `?$filter=<expr>`.
fn filter_tree(expr: &str) -> String {
    let url = format!("?$filter={}", expr);
    let uri = parse_url(&url);
    let filter = uri
        .query()
        .filter()
        .unwrap_or_else(|| panic!("Failed for input: {}", url));
    filter.child(0).map(|n| n.to_string()).unwrap_or_default()
}

// ============================================================================
// Operator Precedence
// ============================================================================

#[test]
fn test_precedence() {
    let test_cases = vec![
        ("Price gt 5", "(gt Price 5)"),
        ("A add B mul C", "(add A (mul B C))"),
        ("A mul B add C", "(add (mul A B) C)"),
        ("A sub B sub C", "(sub (sub A B) C)"),
        ("A eq 1 or B eq 2 and C eq 3", "(or (eq A 1) (and (eq B 2) (eq C 3)))"),
        ("(A or B) and C", "(and (or A B) C)"),
        ("not A eq B", "(eq (not A) B)"),
        ("not (A eq B)", "(not (eq A B))"),
        ("-Price gt 5", "(gt (- Price) 5)"),
        ("A lt 1 eq B gt 2", "(eq (lt A 1) (gt B 2))"),
        ("Price add 1 gt 10 and Name ne 'x'", "(and (gt (add Price 1) 10) (ne Name 'x'))"),
    ];

    for (input, expected) in test_cases {
        assert_eq!(filter_tree(input), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_whitespace_encodings_parse_alike() {
    let expected = "(and (gt Price 5) (eq Name 'Milk'))";
    for input in [
        "Price gt 5 and Name eq 'Milk'",
        "Price+gt+5+and+Name+eq+'Milk'",
        "Price%20gt%205%20and%20Name%20eq%20%27Milk%27",
    ] {
        assert_eq!(filter_tree(input), expected, "Failed for input: {}", input);
    }
}

// ============================================================================
// Paths, Calls and Lambdas
// ============================================================================

#[test]
fn test_navigation_and_calls() {
    let test_cases = vec![
        ("Category/Name eq 'Food'", "(eq (/ Category Name) 'Food')"),
        ("Supplier/Address/City eq 'Oslo'", "(eq (/ (/ Supplier Address) City) 'Oslo')"),
        ("substring(Name,1,2) eq 'il'", "(eq (substring Name 1 2) 'il')"),
        ("startswith(Name,'Mi')", "(startswith Name 'Mi')"),
        ("Released lt now()", "(lt Released (now))"),
        ("length(trim(Name)) gt 3", "(gt (length (trim Name)) 3)"),
        ("Items/any(d:d/Qty gt 5)", "(/ Items (any d (gt (/ d Qty) 5)))"),
        ("Items/all(d:d/Qty gt 5)", "(/ Items (all d (gt (/ d Qty) 5)))"),
        ("Items/any()", "(/ Items (any))"),
    ];

    for (input, expected) in test_cases {
        assert_eq!(filter_tree(input), expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_count_segment_wraps_collection() {
    let uri = parse_url("Products?$filter=Items/$count gt 0");
    let comparison = uri.query().filter().unwrap().child(0).unwrap();
    assert_eq!(comparison.to_string(), "(gt ($count Items) 0)");

    let count = comparison.child(0).unwrap();
    assert_eq!(count.kind(), NodeKind::Count);
    assert_eq!(count.child(0).unwrap().text(), "Items");
}

#[test]
fn test_count_path_segment() {
    let uri = parse_url("Products/$count");
    assert_eq!(uri.segments().len(), 1);
    assert_eq!(uri.segments()[0].kind(), NodeKind::Count);
    assert_eq!(uri.segments()[0].to_string(), "($count Products)");
}

// ============================================================================
// Query Options
// ============================================================================

#[test]
fn test_filter_and_top() {
    let uri = parse_url("Products?$filter=Price gt 5&$top=10");
    assert_eq!(uri.query().len(), 2);
    assert_eq!(uri.query().top(), Some(10));
    assert_eq!(uri.query().filter().unwrap().to_string(), "($filter (gt Price 5))");
}

#[test]
fn test_orderby_terms() {
    let uri = parse_url("?$orderby=Name desc,Id");
    let order_by = uri.query().order_by().unwrap();
    assert_eq!(order_by.to_string(), "($orderby (desc Name) (asc Id))");
    let kinds: Vec<NodeKind> = order_by.children().iter().map(|c| c.kind()).collect();
    assert_eq!(
        kinds,
        vec![NodeKind::Desc { primary: true }, NodeKind::Asc { primary: false }]
    );

    let uri = parse_url("?$orderby=A,B asc,C desc");
    let kinds: Vec<NodeKind> = uri
        .query()
        .order_by()
        .unwrap()
        .children()
        .iter()
        .map(|c| c.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            NodeKind::Asc { primary: true },
            NodeKind::Asc { primary: false },
            NodeKind::Desc { primary: false },
        ]
    );

    let uri = parse_url("?$orderby=Name");
    let order_by = uri.query().order_by().unwrap();
    assert_eq!(order_by.children().len(), 1);
    assert_eq!(order_by.children()[0].kind(), NodeKind::Asc { primary: true });
}

#[test]
fn test_asc_desc_are_names_outside_orderby() {
    assert_eq!(filter_tree("desc eq 1"), "(eq desc 1)");
}

#[test]
fn test_select_and_expand_lists() {
    let test_cases = vec![
        ("?$select=Name,Price", "($select Name Price)"),
        ("?$select=*", "($select *)"),
        ("?$expand=Category,Supplier/Address", "($expand Category (/ Supplier Address))"),
    ];

    for (input, expected) in test_cases {
        let uri = parse_url(input);
        let option = uri.query().iter().next().unwrap();
        assert_eq!(option.to_string(), expected, "Failed for input: {}", input);
    }

    let uri = parse_url("?$expand=Supplier/Address");
    assert_eq!(uri.query().expand().unwrap().children()[0].path_text(), "Supplier/Address");
}

#[test]
fn test_later_option_replaces_earlier() {
    let uri = parse_url("?$top=5&$TOP=10");
    assert_eq!(uri.query().len(), 1);
    assert_eq!(uri.query().top(), Some(10));
}

#[test]
fn test_execution_order_ignores_url_order() {
    let expected = vec![
        NodeKind::Filter,
        NodeKind::OrderBy,
        NodeKind::Expand,
        NodeKind::Skip,
        NodeKind::Top,
        NodeKind::Select,
        NodeKind::InlineCount,
    ];
    let test_cases = vec![
        "?$filter=A eq 1&$orderby=B&$expand=D&$skip=2&$top=1&$select=C&$inlinecount=allpages",
        "?$select=C&$top=1&$skip=2&$orderby=B&$filter=A eq 1&$expand=D&$inlinecount=allpages",
        "?$inlinecount=allpages&$expand=D&$top=1&$select=C&$filter=A eq 1&$skip=2&$orderby=B",
    ];

    for input in test_cases {
        let uri = parse_url(input);
        let kinds: Vec<NodeKind> = uri.query().sorted().iter().map(|o| o.kind()).collect();
        assert_eq!(kinds, expected, "Failed for input: {}", input);
    }
}

#[test]
fn test_options_of_equal_rank_order_by_name() {
    let test_cases = vec![
        "?zeta=1&$top=1&@alpha=2&Beta=3",
        "?Beta=3&@alpha=2&zeta=1&$top=1",
        "?@alpha=2&zeta=1&Beta=3&$top=1",
    ];

    for input in test_cases {
        let uri = parse_url(input);
        let names: Vec<&str> = uri.query().sorted().iter().map(|o| o.text()).collect();
        assert_eq!(names, vec!["$top", "@alpha", "Beta", "zeta"], "Failed for input: {}", input);
    }
}

#[test]
fn test_custom_options_are_kept() {
    let uri = parse_url("?callback=foo(bar)&$top=1");
    let custom = uri.query().get("callback").unwrap();
    assert_eq!(custom.kind(), NodeKind::Ignored);
    assert_eq!(custom.child(0).unwrap().text(), "foo(bar)");
    assert_eq!(uri.query().top(), Some(1));
}

#[test]
fn test_missing_separator_sides() {
    let uri = parse_url("?&$top=1");
    assert_eq!(uri.query().top(), Some(1));

    let uri = parse_url("Products/");
    assert_eq!(uri.segments().len(), 1);
    assert_eq!(uri.segments()[0].text(), "Products");

    let uri = parse_url("Products?");
    assert_eq!(uri.segments().len(), 1);
    assert!(uri.query().is_empty());
}

// ============================================================================
// Path Segments and Arguments
// ============================================================================

#[test]
fn test_absolute_url_segments() {
    let uri = parse_url("http://host:8080/service/Products(5)?$top=1");
    let texts: Vec<&str> = uri.segments().iter().map(|s| s.text()).collect();
    assert_eq!(texts, vec!["service", "Products"]);

    let products = &uri.path_segments(1)[0];
    assert_eq!(products.kind(), NodeKind::Call);
    let args = uri.arguments(products);
    assert_eq!(args.len(), 1);
    assert_eq!(args.get(0).unwrap().text(), "5");
}

#[test]
fn test_named_key_arguments() {
    let uri = parse_url("Orders(Id=1,Line=2)");
    let orders = &uri.segments()[0];
    let args = uri.arguments(orders);
    assert_eq!(args.len(), 2);
    assert_eq!(args.named("Line").unwrap().text(), "2");

    let pairs: Vec<(Option<&str>, &str)> = args.iter().map(|(n, v)| (n, v.text())).collect();
    assert_eq!(pairs, vec![(Some("Id"), "1"), (Some("Line"), "2")]);
}

#[test]
fn test_alias_arguments_resolve_through_query() {
    let uri = parse_url("ProductsByColor(color=@color)?@color='red'");
    let call = &uri.segments()[0];
    let args = uri.arguments(call);
    assert_eq!(args.named("color").unwrap().text(), "'red'");

    let alias = uri.query().get("@color").unwrap();
    assert_eq!(alias.kind(), NodeKind::Alias);
}

#[test]
fn test_doubled_quote_key_argument() {
    for input in ["People('O''Neil')", "People%28%27O%27%27Neil%27%29"] {
        let uri = parse_url(input);
        let call = &uri.segments()[0];
        let value = uri.arguments(call).get(0).unwrap().token().as_primitive().unwrap();
        assert_eq!(value.as_str(), Some("O'Neil"), "Failed for input: {}", input);
    }
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn test_reparse_is_stable() {
    let test_cases = vec![
        "http://host/service/Products?$filter=Name eq 'Milk'&$orderby=Price desc&$top=5",
        "Products?$filter=Price+gt+5",
        "Products?$filter=Price%20gt%205&$select=Name,Price",
        "People%28%27O%27%27Neil%27%29",
        "Orders(Id=1,Line=2)?$expand=Items&$inlinecount=allpages",
        "?$filter=Items/any(d:d/Qty gt 5) and not Discontinued",
        "?$filter=Name eq 'a%2Bb'",
        "?$filter=Name eq 'it%2527s'",
    ];

    for input in test_cases {
        let first = parse_url(input);
        let second = parse_url(first.as_str());
        assert_eq!(first, second, "Failed for input: {}", input);
        assert_eq!(first.to_string(), second.to_string(), "Failed for input: {}", input);
    }
}

#[test]
fn test_escaped_text_keeps_its_value() {
    let test_cases = vec![
        ("?$filter=Name eq 'a%2Bb'", "a+b"),
        ("?$filter=Name eq 'a+b'", "a b"),
        ("?$filter=Name eq 'it%2527s'", "it%27s"),
    ];

    for (input, expected) in test_cases {
        let uri = parse_url(input);
        assert_eq!(uri.as_str(), input, "Failed for input: {}", input);
        let reparsed = parse_url(uri.as_str());
        let comparison = reparsed.query().filter().and_then(|f| f.child(0)).unwrap();
        let literal = comparison.child(1).unwrap().token().as_primitive().unwrap();
        assert_eq!(literal, Value::from(expected), "Failed for input: {}", input);
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_parse_errors() {
    let err = parse("?$filter=Price gt", ODataVersion::ALL).unwrap_err();
    assert_eq!(
        err,
        ParseError::StackUnderflow {
            operator: "gt".to_string()
        }
    );
    assert_eq!(err.to_string(), "Missing operand for 'gt'");

    let test_cases = vec!["?$filter=(Price gt 5", "?$filter=Price gt 5)"];
    for input in test_cases {
        let err = parse(input, ODataVersion::ALL).unwrap_err();
        assert_eq!(err, ParseError::UnmatchedParen, "Failed for input: {}", input);
    }

    let err = parse("?$filter=Name Price", ODataVersion::ALL).unwrap_err();
    assert!(matches!(err, ParseError::DanglingOperand(_)), "got {:?}", err);

    let err = parse("?$filter=Name eq #", ODataVersion::ALL).unwrap_err();
    assert!(matches!(err, ParseError::Lex(_)), "got {:?}", err);
    assert!(std::error::Error::source(&err).is_some());
}
