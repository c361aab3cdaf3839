use super::nodes::{Node, NodeKind};
use super::query::ODataQuery;
use super::tokens::ODataVersion;
use std::fmt;

/// A parsed OData URL: its path segments and query options.
///
/// Built once by the parser and immutable afterwards, so a single value can
/// be shared between threads and compiled against many queryables.
#[derive(Debug, Clone, PartialEq)]
pub struct ODataUri {
    original: String,
    version: ODataVersion,
    segments: Vec<Node>,
    query: ODataQuery,
}

impl ODataUri {
    pub(crate) fn new(
        original: String,
        version: ODataVersion,
        segments: Vec<Node>,
        query: ODataQuery,
    ) -> Self {
        ODataUri {
            original,
            version,
            segments,
            query,
        }
    }

    /// The URL text as it was given, escapes included.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn version(&self) -> ODataVersion {
        self.version
    }

    /// Every path segment after the authority.
    pub fn segments(&self) -> &[Node] {
        &self.segments
    }

    /// Path segments after the first `root` segments, which address the
    /// service itself (`service` in `http://host/service/Products`).
    pub fn path_segments(&self, root: usize) -> &[Node] {
        self.segments.get(root..).unwrap_or(&[])
    }

    pub fn query(&self) -> &ODataQuery {
        &self.query
    }

    /// Arguments of a call segment such as `Products(5)` or
    /// `ProductsByColor(color=@color)`, with aliases resolved through the
    /// query options.
    pub fn arguments<'a>(&'a self, call: &'a Node) -> Arguments<'a> {
        Arguments {
            call,
            query: &self.query,
        }
    }
}

impl fmt::Display for ODataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Positional and named arguments of a call node.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    call: &'a Node,
    query: &'a ODataQuery,
}

impl<'a> Arguments<'a> {
    pub fn len(&self) -> usize {
        self.call.children().len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value of the argument at `index`, named or not.
    pub fn get(&self, index: usize) -> Option<&'a Node> {
        self.resolve(value_of(self.call.child(index + 1)?))
    }

    pub fn named(&self, name: &str) -> Option<&'a Node> {
        self.call
            .children()
            .iter()
            .skip(1)
            .filter(|arg| arg.kind() == NodeKind::Argument)
            .find(|arg| arg.child(0).is_some_and(|n| n.text() == name))
            .and_then(|arg| self.resolve(arg.child(1)?))
    }

    /// `(name, value)` pairs in call order; positional arguments have no name.
    pub fn iter(&self) -> impl Iterator<Item = (Option<&'a str>, &'a Node)> + '_ {
        self.call.children().iter().skip(1).filter_map(|arg| {
            let name = match arg.kind() {
                NodeKind::Argument => Some(arg.child(0)?.text()),
                _ => None,
            };
            Some((name, self.resolve(value_of(arg))?))
        })
    }

    fn resolve(&self, node: &'a Node) -> Option<&'a Node> {
        match node.kind() {
            NodeKind::Alias => self.query.get(node.text())?.child(0),
            _ => Some(node),
        }
    }
}

fn value_of(node: &Node) -> &Node {
    match node.kind() {
        NodeKind::Argument => node.child(1).unwrap_or(node),
        _ => node,
    }
}
