//! # odata-query
//!
//! Tokenizes and parses OData URLs, then compiles their query options into
//! expressions that run against any [`Queryable`] source.
//!
//! ```
//! use odata_query::executor::ExecutionSettings;
//! use odata_query::{MemoryQueryable, ODataVersion, Value, execute, parse};
//!
//! let uri = parse("Products?$filter=Price gt 5&$orderby=Name", ODataVersion::ALL).unwrap();
//! let items = vec![
//!     Value::record([("Name", Value::from("Pear")), ("Price", Value::from(8))]),
//!     Value::record([("Name", Value::from("Fig")), ("Price", Value::from(3))]),
//!     Value::record([("Name", Value::from("Apple")), ("Price", Value::from(6))]),
//! ];
//! let result = execute(&uri, &MemoryQueryable::dynamic(items), &ExecutionSettings::new()).unwrap();
//! let names: Vec<String> = result
//!     .items()
//!     .unwrap()
//!     .to_vec()
//!     .unwrap()
//!     .iter()
//!     .map(|item| item.get("Name").unwrap().as_string())
//!     .collect();
//! assert_eq!(names, ["Apple", "Pear"]);
//! ```

pub mod ast;
pub mod builder;
pub mod compiler;
pub mod evaluator;
pub mod executor;
pub mod expr;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod queryable;
pub mod types;
pub mod value;

#[cfg(feature = "cli")]
pub mod cli;

pub use ast::{BinaryOperator, Node, NodeKind, ODataQuery, ODataUri, ODataVersion, Token, TokenKind};
pub use builder::UriBuilder;
pub use compiler::{CompileError, Compiler, Function};
pub use evaluator::{EvalContext, EvalError, Evaluator};
pub use executor::{ExecutionSettings, ODataResult, QueryOutput, execute};
pub use expr::{DynamicAccessor, Lambda, Projection, QueryExpr, SortKey};
pub use lexer::{LexError, Tokenizer, tokenize};
pub use parser::{ParseError, Parser, parse};
pub use queryable::{EntityMetadata, MemoryQueryable, ProjectedRecord, QueryError, Queryable};
pub use types::{EdmType, TypeRef};
pub use value::Value;
