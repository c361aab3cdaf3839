use super::nodes::{Node, NodeKind};
use super::tokens::{Token, TokenKind};

/// The top-level query options of a URL, in URL order.
///
/// Names are matched case-insensitively and a later option replaces an
/// earlier one with the same name, so `?$top=5&$TOP=10` keeps `$TOP=10`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ODataQuery {
    options: Vec<Node>,
}

impl ODataQuery {
    pub fn new() -> Self {
        ODataQuery::default()
    }

    /// Adds an option, replacing any earlier option of the same name.
    pub fn insert(&mut self, option: Node) {
        self.options
            .retain(|existing| !existing.text().eq_ignore_ascii_case(option.text()));
        self.options.push(option);
    }

    pub fn remove(&mut self, name: &str) -> Option<Node> {
        let index = self
            .options
            .iter()
            .position(|o| o.text().eq_ignore_ascii_case(name))?;
        Some(self.options.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.options
            .iter()
            .rev()
            .find(|o| o.text().eq_ignore_ascii_case(name))
    }

    pub fn find(&self, kind: NodeKind) -> Option<&Node> {
        self.options.iter().rev().find(|o| o.kind() == kind)
    }

    pub fn filter(&self) -> Option<&Node> {
        self.find(NodeKind::Filter)
    }

    pub fn order_by(&self) -> Option<&Node> {
        self.find(NodeKind::OrderBy)
    }

    pub fn select(&self) -> Option<&Node> {
        self.find(NodeKind::Select)
    }

    pub fn expand(&self) -> Option<&Node> {
        self.find(NodeKind::Expand)
    }

    pub fn skip(&self) -> Option<i64> {
        self.integer_option(NodeKind::Skip)
    }

    pub fn top(&self) -> Option<i64> {
        self.integer_option(NodeKind::Top)
    }

    /// Sets `$skip`, or removes it for `None`.
    pub fn set_skip(&mut self, value: Option<u64>) {
        self.set_integer_option(NodeKind::Skip, "$skip", value);
    }

    /// Sets `$top`, or removes it for `None`.
    pub fn set_top(&mut self, value: Option<u64>) {
        self.set_integer_option(NodeKind::Top, "$top", value);
    }

    fn integer_option(&self, kind: NodeKind) -> Option<i64> {
        let literal = self.find(kind)?.child(0)?;
        literal.token().as_primitive().ok()?.as_i64()
    }

    fn set_integer_option(&mut self, kind: NodeKind, name: &str, value: Option<u64>) {
        let existing = self
            .options
            .iter()
            .rev()
            .find(|o| o.kind() == kind)
            .map(|o| o.text().to_string());
        if let Some(existing) = existing {
            self.remove(&existing);
        }
        if let Some(value) = value {
            let literal = Node::new(
                NodeKind::Literal,
                Token::new(TokenKind::Integer, value.to_string()),
            );
            self.options.push(Node::option(name, literal));
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// The options in execution order; options of equal rank by name.
    pub fn sorted(&self) -> Vec<&Node> {
        let mut sorted: Vec<&Node> = self.options.iter().collect();
        sorted.sort_by(|a, b| a.compare_execution(b));
        sorted
    }
}

impl<'a> IntoIterator for &'a ODataQuery {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.iter()
    }
}
