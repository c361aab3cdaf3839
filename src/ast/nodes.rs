use super::operators::BinaryOperator;
use super::tokens::{Token, TokenKind};
use std::cmp::Ordering;
use std::fmt;

/// The closed set of AST node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // Operands
    Identifier,
    Literal,
    Null,
    /// `@name`; a query-level alias definition when it has a child
    Alias,
    /// `$count` of a collection; its child is the collection
    Count,
    /// `*` in `$select`
    Star,

    // Operators
    /// `a/b` property path
    Navigation,
    /// `Namespace.Name` qualified name or type cast
    Period,
    Binary(BinaryOperator),
    Not,
    Negate,

    // Invocations; the first child is the function name
    Call,
    Any,
    All,
    /// `name=value` inside a call
    Argument,

    // Order terms
    Asc { primary: bool },
    Desc { primary: bool },

    // Query options
    Filter,
    OrderBy,
    Select,
    Expand,
    Skip,
    Top,
    InlineCount,
    /// Unrecognised query option, kept for the application
    Ignored,

    // Structural
    Group,
    Comma,
    Colon,
    Assign,
    Ampersand,
    PathSeparator,
    Question,
    /// Scheme, authority or port of an absolute URL
    Segment,
}

impl NodeKind {
    /// Maps a query option name to its node kind. Unknown names are ignored
    /// rather than rejected.
    pub fn from_option_name(name: &str) -> NodeKind {
        match name.to_ascii_lowercase().as_str() {
            "$filter" => NodeKind::Filter,
            "$orderby" => NodeKind::OrderBy,
            "$select" => NodeKind::Select,
            "$expand" => NodeKind::Expand,
            "$skip" => NodeKind::Skip,
            "$top" => NodeKind::Top,
            "$inlinecount" | "$count" => NodeKind::InlineCount,
            _ => NodeKind::Ignored,
        }
    }

    pub fn is_option(self) -> bool {
        matches!(
            self,
            NodeKind::Filter
                | NodeKind::OrderBy
                | NodeKind::Select
                | NodeKind::Expand
                | NodeKind::Skip
                | NodeKind::Top
                | NodeKind::InlineCount
                | NodeKind::Ignored
        )
    }

    /// Options applied by handing them the queryable instead of compiling
    /// a single expression.
    pub fn is_query_modifier(self) -> bool {
        matches!(self, NodeKind::OrderBy | NodeKind::Expand)
    }

    /// Required position in the execution pipeline.
    pub fn execution_rank(self) -> u8 {
        match self {
            NodeKind::Filter => 0,
            NodeKind::OrderBy => 1,
            NodeKind::Expand => 2,
            NodeKind::Skip => 3,
            NodeKind::Top => 4,
            NodeKind::Select => 5,
            NodeKind::InlineCount => 6,
            _ => 7,
        }
    }
}

/// A node of the parsed URL.
///
/// Nodes own their children. The tree is built and regrouped by the parser
/// and is read-only afterwards; the accessors here never hand out mutable
/// access.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    token: Token,
    children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind, token: Token) -> Self {
        Node {
            kind,
            token,
            children: Vec::new(),
        }
    }

    pub fn identifier(name: &str) -> Node {
        Node::new(NodeKind::Identifier, Token::new(TokenKind::Identifier, name))
    }

    pub fn binary(op: BinaryOperator, left: Node, right: Node) -> Node {
        let kind = match op {
            BinaryOperator::And => TokenKind::And,
            BinaryOperator::Or => TokenKind::Or,
            BinaryOperator::Equal => TokenKind::Equal,
            BinaryOperator::NotEqual => TokenKind::NotEqual,
            BinaryOperator::LessThan => TokenKind::LessThan,
            BinaryOperator::LessThanOrEqual => TokenKind::LessThanOrEqual,
            BinaryOperator::GreaterThan => TokenKind::GreaterThan,
            BinaryOperator::GreaterThanOrEqual => TokenKind::GreaterThanOrEqual,
            BinaryOperator::Has => TokenKind::Has,
            BinaryOperator::Add => TokenKind::Add,
            BinaryOperator::Subtract => TokenKind::Subtract,
            BinaryOperator::Multiply => TokenKind::Multiply,
            BinaryOperator::Divide => TokenKind::Divide,
            BinaryOperator::Modulo => TokenKind::Modulo,
        };
        Node::new(NodeKind::Binary(op), Token::new(kind, op.keyword())).with_children(vec![left, right])
    }

    /// A query option such as `$top` with a single value child.
    pub fn option(name: &str, value: Node) -> Node {
        Node::new(
            NodeKind::from_option_name(name),
            Token::new(TokenKind::QueryName, name),
        )
        .with_children(vec![value])
    }

    pub(crate) fn with_children(mut self, children: Vec<Node>) -> Node {
        self.children = children;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn text(&self) -> &str {
        self.token.text()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children.get(index)
    }

    /// `a/b/c` for navigation paths, the node text otherwise.
    pub fn path_text(&self) -> String {
        match self.kind {
            NodeKind::Navigation | NodeKind::Period => self
                .children
                .iter()
                .map(Node::path_text)
                .collect::<Vec<_>>()
                .join(self.text()),
            _ => self.text().to_string(),
        }
    }

    /// Orders sibling query options by their required execution order.
    /// Options of the same rank order by name, ignoring case.
    pub fn compare_execution(&self, other: &Node) -> Ordering {
        self.kind
            .execution_rank()
            .cmp(&other.kind.execution_rank())
            .then_with(|| {
                self.text()
                    .to_ascii_lowercase()
                    .cmp(&other.text().to_ascii_lowercase())
            })
            .then_with(|| self.text().cmp(other.text()))
    }

    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    pub(crate) fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    pub(crate) fn insert(&mut self, index: usize, child: Node) {
        self.children.insert(index, child);
    }

    pub(crate) fn take_children(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.children)
    }
}

/// Renders the subtree as an s-expression, e.g. `(eq Name 'Milk')`.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = match self.kind {
            NodeKind::Call | NodeKind::Any | NodeKind::All => self.children.get(1..).unwrap_or(&[]),
            _ => &self.children,
        };
        if args.is_empty() && !matches!(self.kind, NodeKind::Call | NodeKind::Any | NodeKind::All) {
            return f.write_str(self.text());
        }
        write!(f, "({}", self.text())?;
        for child in args {
            write!(f, " {}", child)?;
        }
        f.write_str(")")
    }
}
