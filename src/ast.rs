//! # Abstract Syntax Tree for OData URLs
//!
//! Parsing an OData URL produces an [`ODataUri`]: the ordered path segments
//! and the query options of the URL, each a tree of [`Node`]s.
//!
//! ## Submodules
//!
//! - **[tokens]** - Lexical tokens and the protocol version flags
//! - **[nodes]** - The node variants and the tree itself
//! - **[operators]** - Binary operators and the precedence table
//! - **[query]** - The query option container and its execution order
//! - **[uri]** - The parse result and call-segment arguments
//!
//! ## Shape of the tree
//!
//! ```text
//! http://host/service/Products?$filter=Price gt 5&$orderby=Name desc,Id
//!
//! segments:  service  Products
//! options:   ($filter (gt Price 5))
//!            ($orderby (desc Name) (asc Id))
//! ```
//!
//! Query options hold their values as children: `$select=a,b` has the two
//! identifiers as direct children, and every `$orderby` child is an explicit
//! `asc` or `desc` term whose first occurrence is flagged as the primary sort.
//!
//! Calls keep their name as the first child, followed by the arguments:
//!
//! ```text
//! substring(Name,1,2)          (substring Name 1 2)
//! Items/any(d:d/Qty gt 5)      (/ Items (any d (gt (/ d Qty) 5)))
//! Products/$count gt 0         (gt ($count Products) 0)
//! ```

pub mod nodes;
pub mod operators;
pub mod query;
pub mod tokens;
pub mod uri;

pub use nodes::{Node, NodeKind};
pub use operators::{BinaryOperator, precedence};
pub use query::ODataQuery;
pub use tokens::{ODataVersion, Token, TokenKind};
pub use uri::{Arguments, ODataUri};
