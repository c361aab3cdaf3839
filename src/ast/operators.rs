use super::nodes::NodeKind;
use super::tokens::TokenKind;
use std::fmt;

/// Binary operators of `$filter` expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Logical
    /// `and`
    And,
    /// `or`
    Or,

    // Comparison
    /// `eq`
    Equal,
    /// `ne`
    NotEqual,
    /// `lt`
    LessThan,
    /// `le`
    LessThanOrEqual,
    /// `gt`
    GreaterThan,
    /// `ge`
    GreaterThanOrEqual,
    /// `has`, flag membership
    Has,

    // Arithmetic
    /// `add`
    Add,
    /// `sub`
    Subtract,
    /// `mul`
    Multiply,
    /// `div`
    Divide,
    /// `mod`
    Modulo,
}

impl BinaryOperator {
    pub fn from_token(kind: TokenKind) -> Option<BinaryOperator> {
        let op = match kind {
            TokenKind::And => BinaryOperator::And,
            TokenKind::Or => BinaryOperator::Or,
            TokenKind::Equal => BinaryOperator::Equal,
            TokenKind::NotEqual => BinaryOperator::NotEqual,
            TokenKind::LessThan => BinaryOperator::LessThan,
            TokenKind::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
            TokenKind::GreaterThan => BinaryOperator::GreaterThan,
            TokenKind::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
            TokenKind::Has => BinaryOperator::Has,
            TokenKind::Add => BinaryOperator::Add,
            TokenKind::Subtract => BinaryOperator::Subtract,
            TokenKind::Multiply => BinaryOperator::Multiply,
            TokenKind::Divide => BinaryOperator::Divide,
            TokenKind::Modulo => BinaryOperator::Modulo,
            _ => return None,
        };
        Some(op)
    }

    /// The URL keyword, e.g. `eq`.
    pub fn keyword(self) -> &'static str {
        match self {
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Equal => "eq",
            BinaryOperator::NotEqual => "ne",
            BinaryOperator::LessThan => "lt",
            BinaryOperator::LessThanOrEqual => "le",
            BinaryOperator::GreaterThan => "gt",
            BinaryOperator::GreaterThanOrEqual => "ge",
            BinaryOperator::Has => "has",
            BinaryOperator::Add => "add",
            BinaryOperator::Subtract => "sub",
            BinaryOperator::Multiply => "mul",
            BinaryOperator::Divide => "div",
            BinaryOperator::Modulo => "mod",
        }
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Binding strength of operator nodes; zero marks operands and structural
/// nodes handled directly by the parser.
pub fn precedence(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Navigation | NodeKind::Period | NodeKind::Binary(BinaryOperator::Has) => 170,
        NodeKind::Not | NodeKind::Negate => 160,
        NodeKind::Binary(
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo,
        ) => 150,
        NodeKind::Binary(BinaryOperator::Add | BinaryOperator::Subtract) => 140,
        NodeKind::Binary(op) if op.is_relational() => 130,
        NodeKind::Binary(BinaryOperator::Equal | BinaryOperator::NotEqual) => 120,
        NodeKind::Binary(BinaryOperator::And) => 110,
        NodeKind::Binary(BinaryOperator::Or) => 100,
        NodeKind::Asc { .. } | NodeKind::Desc { .. } => 95,
        // Named arguments bind tighter than the commas separating them.
        NodeKind::Argument => 92,
        NodeKind::Comma | NodeKind::Colon => 90,
        NodeKind::Assign => 80,
        NodeKind::Ampersand => 70,
        NodeKind::PathSeparator => 60,
        NodeKind::Question => 50,
        _ => 0,
    }
}
