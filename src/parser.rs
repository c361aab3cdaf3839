use crate::ast::{
    BinaryOperator, Node, NodeKind, ODataQuery, ODataUri, ODataVersion, Token, TokenKind,
    precedence,
};
use crate::lexer::{LexError, Tokenizer};
use std::fmt;

/// Errors raised while building the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The tokenizer rejected the input
    Lex(LexError),
    /// An operator was applied without enough operands
    StackUnderflow { operator: String },
    /// A `(` or `)` without its counterpart
    UnmatchedParen,
    /// Operands left over with no operator joining them
    DanglingOperand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "{}", e),
            ParseError::StackUnderflow { operator } => {
                write!(f, "Missing operand for '{}'", operator)
            }
            ParseError::UnmatchedParen => write!(f, "Unmatched parenthesis"),
            ParseError::DanglingOperand(text) => {
                write!(f, "Unexpected operand '{}' without an operator", text)
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Lex(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::Lex(e)
    }
}

/// An operator waiting on the stack, with the operand stack height at the
/// time it was pushed.
struct Pending {
    node: Node,
    height: usize,
}

/// Operator-precedence parser over the token stream of a [`Tokenizer`].
///
/// Operands go to an output stack and operators wait on an operator stack
/// until an operator of lower or equal precedence arrives, so binary
/// operators associate to the left. After the last token the tree is
/// regrouped: query options are collected, comma lists are flattened and
/// `$orderby` terms are made explicit.
pub struct Parser {
    tokenizer: Tokenizer,
    output: Vec<Node>,
    operators: Vec<Pending>,
    previous: Option<TokenKind>,
    current_option: Option<NodeKind>,
}

impl Parser {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Parser {
            tokenizer,
            output: Vec::new(),
            operators: Vec::new(),
            previous: None,
            current_option: None,
        }
    }

    pub fn parse(mut self) -> Result<ODataUri, ParseError> {
        let version = self.tokenizer.version();
        while let Some(token) = self.tokenizer.next_token()? {
            self.process(token)?;
        }
        while let Some(pending) = self.operators.pop() {
            if matches!(
                pending.node.kind(),
                NodeKind::Group | NodeKind::Call | NodeKind::Any | NodeKind::All
            ) {
                return Err(ParseError::UnmatchedParen);
            }
            self.apply(pending)?;
        }

        let root = self.output.pop();
        if let Some(extra) = self.output.pop() {
            return Err(ParseError::DanglingOperand(extra.to_string()));
        }
        let uri = flatten(root, self.tokenizer.source(), version);
        log::debug!(
            "parsed {:?}: {} segments, {} query options",
            uri.as_str(),
            uri.segments().len(),
            uri.query().len()
        );
        Ok(uri)
    }

    fn process(&mut self, token: Token) -> Result<(), ParseError> {
        let kind = token.kind();
        match kind {
            TokenKind::Whitespace => {}
            TokenKind::OpenParen
                if self.previous == Some(TokenKind::Identifier)
                    && self
                        .output
                        .last()
                        .is_some_and(|n| n.kind() == NodeKind::Identifier) =>
            {
                if let Some(name) = self.output.pop() {
                    let call_kind = match name.text().to_ascii_lowercase().as_str() {
                        "any" => NodeKind::Any,
                        "all" => NodeKind::All,
                        _ => NodeKind::Call,
                    };
                    let call = Node::new(call_kind, name.token().clone()).with_children(vec![name]);
                    self.operators.push(Pending {
                        node: call,
                        height: self.output.len(),
                    });
                }
            }
            TokenKind::OpenParen => self.operators.push(Pending {
                node: Node::new(NodeKind::Group, token),
                height: self.output.len(),
            }),
            TokenKind::CloseParen => self.close_group()?,
            _ => {
                let node = self.node_from_token(token);
                let strength = precedence(node.kind());
                if strength == 0 {
                    self.output.push(node);
                } else {
                    // Prefix operators have no left operand to reduce.
                    if !matches!(node.kind(), NodeKind::Not | NodeKind::Negate) {
                        while let Some(top) = self.operators.last()
                            && precedence(top.node.kind()) >= strength
                        {
                            if let Some(pending) = self.operators.pop() {
                                self.apply(pending)?;
                            }
                        }
                    }
                    self.operators.push(Pending {
                        node,
                        height: self.output.len(),
                    });
                }
            }
        }
        self.previous = Some(kind);
        Ok(())
    }

    fn close_group(&mut self) -> Result<(), ParseError> {
        loop {
            let pending = self.operators.pop().ok_or(ParseError::UnmatchedParen)?;
            match pending.node.kind() {
                NodeKind::Group => return Ok(()),
                NodeKind::Call | NodeKind::Any | NodeKind::All => {
                    let mut call = pending.node;
                    if self.output.len() > pending.height
                        && let Some(mut args) = self.output.pop()
                    {
                        if matches!(args.kind(), NodeKind::Comma | NodeKind::Colon) {
                            for arg in args.take_children() {
                                call.push(arg);
                            }
                        } else {
                            call.push(args);
                        }
                    }
                    self.output.push(call);
                    return Ok(());
                }
                _ => self.apply(pending)?,
            }
        }
    }

    fn apply(&mut self, pending: Pending) -> Result<(), ParseError> {
        let Pending { mut node, height } = pending;
        match node.kind() {
            NodeKind::Not | NodeKind::Negate => {
                let operand = self.pop_right(&node, height)?;
                node.push(operand);
                self.output.push(node);
            }
            NodeKind::Asc { .. } | NodeKind::Desc { .. } => {
                let operand = self.pop_operand(&node)?;
                node.push(operand);
                self.output.push(node);
            }
            NodeKind::Question | NodeKind::Ampersand | NodeKind::PathSeparator => {
                // Either side may be missing: `?$top=1`, `Products?`,
                // a leading `&` or a trailing `/`.
                let right = if self.output.len() > height {
                    self.output.pop()
                } else {
                    None
                };
                let left = if height > 0 { self.output.pop() } else { None };
                match (left, right) {
                    (Some(left), Some(mut right))
                        if node.kind() == NodeKind::PathSeparator
                            && right.kind() == NodeKind::Count =>
                    {
                        right.insert(0, left);
                        self.output.push(right);
                    }
                    (Some(left), Some(right)) => {
                        node.push(left);
                        node.push(right);
                        self.output.push(node);
                    }
                    (Some(only), None) | (None, Some(only)) => {
                        if node.kind() == NodeKind::Question {
                            node.push(only);
                            self.output.push(node);
                        } else {
                            self.output.push(only);
                        }
                    }
                    (None, None) => {}
                }
            }
            NodeKind::Assign => {
                let value = self.pop_right(&node, height)?;
                let mut target = self.pop_operand(&node)?;
                if target.kind().is_option() || target.kind() == NodeKind::Alias {
                    target.push(value);
                    self.output.push(target);
                } else {
                    node.push(target);
                    node.push(value);
                    self.output.push(node);
                }
            }
            NodeKind::Comma => {
                let mut right = self.pop_right(&node, height)?;
                let mut left = self.pop_operand(&node)?;
                if left.kind() == NodeKind::Comma {
                    left.push(right);
                    self.output.push(left);
                } else if right.kind() == NodeKind::Comma {
                    right.insert(0, left);
                    self.output.push(right);
                } else {
                    node.push(left);
                    node.push(right);
                    self.output.push(node);
                }
            }
            _ => {
                let mut right = self.pop_right(&node, height)?;
                let left = self.pop_operand(&node)?;
                if node.kind() == NodeKind::Navigation && right.kind() == NodeKind::Count {
                    right.insert(0, left);
                    self.output.push(right);
                } else {
                    node.push(left);
                    node.push(right);
                    self.output.push(node);
                }
            }
        }
        Ok(())
    }

    /// Pops an operand that arrived after the operator was pushed.
    fn pop_right(&mut self, node: &Node, height: usize) -> Result<Node, ParseError> {
        if self.output.len() > height {
            self.pop_operand(node)
        } else {
            Err(underflow(node))
        }
    }

    fn pop_operand(&mut self, node: &Node) -> Result<Node, ParseError> {
        self.output.pop().ok_or_else(|| underflow(node))
    }

    fn node_from_token(&mut self, token: Token) -> Node {
        let kind = match token.kind() {
            TokenKind::Parameter => NodeKind::Alias,
            TokenKind::Null => NodeKind::Null,
            k if k.is_literal() => NodeKind::Literal,
            TokenKind::Identifier => self.identifier_kind(token.text()),
            TokenKind::QueryName => {
                let kind = NodeKind::from_option_name(token.text());
                self.current_option = Some(kind);
                kind
            }
            TokenKind::Star => NodeKind::Star,
            TokenKind::Navigation => NodeKind::Navigation,
            TokenKind::Period => NodeKind::Period,
            TokenKind::Not => NodeKind::Not,
            TokenKind::Negate => NodeKind::Negate,
            TokenKind::Comma => NodeKind::Comma,
            TokenKind::Colon => NodeKind::Colon,
            TokenKind::QueryAssign if self.in_call() => NodeKind::Argument,
            TokenKind::QueryAssign => NodeKind::Assign,
            TokenKind::Ampersand => NodeKind::Ampersand,
            TokenKind::PathSeparator => NodeKind::PathSeparator,
            TokenKind::Question => NodeKind::Question,
            TokenKind::Scheme | TokenKind::Authority | TokenKind::Port => NodeKind::Segment,
            other => match BinaryOperator::from_token(other) {
                Some(op) => NodeKind::Binary(op),
                None => NodeKind::Group,
            },
        };
        Node::new(kind, token)
    }

    fn identifier_kind(&self, text: &str) -> NodeKind {
        if self.current_option == Some(NodeKind::OrderBy) {
            match text {
                "asc" => return NodeKind::Asc { primary: false },
                "desc" => return NodeKind::Desc { primary: false },
                _ => {}
            }
        }
        if text.eq_ignore_ascii_case("$count") {
            return NodeKind::Count;
        }
        NodeKind::Identifier
    }

    fn in_call(&self) -> bool {
        self.operators.iter().any(|p| {
            matches!(
                p.node.kind(),
                NodeKind::Call | NodeKind::Any | NodeKind::All | NodeKind::Group
            )
        })
    }
}

fn underflow(node: &Node) -> ParseError {
    ParseError::StackUnderflow {
        operator: node.text().to_string(),
    }
}

/// Tokenizes and parses `url`.
///
/// # Example
///
/// ```
/// use odata_query::{ODataVersion, parse};
///
/// let uri = parse("Products?$filter=Price gt 5&$top=10", ODataVersion::ALL).unwrap();
/// assert_eq!(uri.query().top(), Some(10));
/// assert_eq!(uri.query().filter().unwrap().to_string(), "($filter (gt Price 5))");
/// ```
pub fn parse(url: &str, version: ODataVersion) -> Result<ODataUri, ParseError> {
    Parser::new(Tokenizer::new(url, version)).parse()
}

// ========================================
// Flatten
// ========================================

fn flatten(root: Option<Node>, original: String, version: ODataVersion) -> ODataUri {
    let mut segments = Vec::new();
    let mut options = Vec::new();
    if let Some(root) = root {
        collect(root, &mut segments, &mut options);
    }
    let mut query = ODataQuery::new();
    for option in options {
        query.insert(regroup(option));
    }
    ODataUri::new(original, version, segments, query)
}

/// Splits the tree into path segments and query options. Query options are
/// not descended into.
fn collect(mut node: Node, segments: &mut Vec<Node>, options: &mut Vec<Node>) {
    match node.kind() {
        NodeKind::Question | NodeKind::Ampersand | NodeKind::PathSeparator => {
            for child in node.take_children() {
                collect(child, segments, options);
            }
        }
        NodeKind::Segment | NodeKind::Colon => {}
        NodeKind::Alias => options.push(node),
        kind if kind.is_option() => options.push(node),
        _ => segments.push(node),
    }
}

fn regroup(mut option: Node) -> Node {
    let mut values = option.take_children();
    if values.len() == 1
        && values[0].kind() == NodeKind::Comma
        && let Some(mut list) = values.pop()
    {
        values = list.take_children();
    }
    if option.kind() == NodeKind::OrderBy {
        values = values
            .into_iter()
            .enumerate()
            .map(|(i, term)| order_term(term, i == 0))
            .collect();
    }
    option.with_children(values)
}

fn order_term(mut term: Node, primary: bool) -> Node {
    match term.kind() {
        NodeKind::Asc { .. } => {
            term.set_kind(NodeKind::Asc { primary });
            term
        }
        NodeKind::Desc { .. } => {
            term.set_kind(NodeKind::Desc { primary });
            term
        }
        _ => Node::new(
            NodeKind::Asc { primary },
            Token::new(TokenKind::Identifier, "asc"),
        )
        .with_children(vec![term]),
    }
}
