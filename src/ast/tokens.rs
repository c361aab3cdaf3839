use std::fmt;
use std::ops::BitOr;

/// Lexical category of a [`Token`].
///
/// Structural kinds shape the URL (path separators, parentheses, query
/// separators), operator kinds come from the keyword operators inside query
/// values, and the remaining kinds are identifiers and typed literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Structural
    /// `http` in `http://host`
    Scheme,
    /// `host` in `http://host`
    Authority,
    /// `8080` in `http://host:8080/`
    Port,
    /// `/`, `://` or `:` between path segments
    PathSeparator,
    OpenParen,
    CloseParen,
    Comma,
    Colon,
    /// `=` between a query option (or named argument) and its value
    QueryAssign,
    /// `&` between query options
    Ampersand,
    /// `?` between the path and the query
    Question,
    Period,
    /// `/` inside a query value, e.g. `Category/Name`
    Navigation,
    /// `+`, space or `%20`
    Whitespace,
    /// `*` inside `$select`
    Star,

    // Operators
    And,
    Or,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Has,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Not,
    Negate,

    // Identifiers
    Identifier,
    /// Query option name such as `$filter` or a custom `callback`
    QueryName,
    /// `@name` alias
    Parameter,

    // Literals
    String,
    Integer,
    Long,
    Double,
    Decimal,
    Single,
    True,
    False,
    Null,
    Guid,
    /// Dates and date-times in every supported syntax
    Date,
    Duration,
    TimeOfDay,
    /// Hex encoded binary (`X'..'`, or `binary'..'` before v4)
    Binary,
    /// Base64url encoded binary (`binary'..'` in v4)
    Base64,
    NaN,
    PosInfinity,
    NegInfinity,
}

impl TokenKind {
    /// Maps an operator keyword (`eq`, `and`, `mod`...) to its token kind.
    pub fn keyword(text: &str) -> Option<TokenKind> {
        let kind = match text {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "eq" => TokenKind::Equal,
            "ne" => TokenKind::NotEqual,
            "lt" => TokenKind::LessThan,
            "le" => TokenKind::LessThanOrEqual,
            "gt" => TokenKind::GreaterThan,
            "ge" => TokenKind::GreaterThanOrEqual,
            "has" => TokenKind::Has,
            "add" => TokenKind::Add,
            "sub" => TokenKind::Subtract,
            "mul" => TokenKind::Multiply,
            "div" => TokenKind::Divide,
            "mod" => TokenKind::Modulo,
            "not" => TokenKind::Not,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::String
                | TokenKind::Integer
                | TokenKind::Long
                | TokenKind::Double
                | TokenKind::Decimal
                | TokenKind::Single
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Guid
                | TokenKind::Date
                | TokenKind::Duration
                | TokenKind::TimeOfDay
                | TokenKind::Binary
                | TokenKind::Base64
                | TokenKind::NaN
                | TokenKind::PosInfinity
                | TokenKind::NegInfinity
        )
    }
}

/// An immutable lexical unit: a kind plus its percent-decoded text.
///
/// Typed conversion of literal tokens lives in [`crate::literal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Set of OData protocol versions whose literal grammar is accepted.
///
/// Versions 2 and 3 share the prefixed literal forms (`guid'..'`,
/// `datetime'..'`, `12L`, `1.5M`), version 4 uses the bare forms. The default
/// accepts all of them.
///
/// # Example
///
/// ```text
/// ODataVersion::V4                      bare 2012-12-03, bare GUIDs
/// ODataVersion::V2 | ODataVersion::V3   datetime'2012-12-03', guid'..'
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ODataVersion(u8);

impl ODataVersion {
    pub const V2: ODataVersion = ODataVersion(0b001);
    pub const V3: ODataVersion = ODataVersion(0b010);
    pub const V4: ODataVersion = ODataVersion(0b100);
    pub const ALL: ODataVersion = ODataVersion(0b111);

    pub fn contains(self, other: ODataVersion) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn supports_v2_or_v3(self) -> bool {
        self.0 & (Self::V2.0 | Self::V3.0) != 0
    }

    pub fn supports_v4(self) -> bool {
        self.0 & Self::V4.0 != 0
    }

    /// Picks the dialect from the `MaxDataServiceVersion` and `OData-MaxVersion`
    /// request headers.
    ///
    /// Only a lone `MaxDataServiceVersion` narrows the dialect: a major
    /// version above 2 selects v2|v3, anything else selects v2. Every other combination accepts
    /// all versions.
    pub fn from_headers(
        max_data_service_version: Option<&str>,
        odata_max_version: Option<&str>,
    ) -> ODataVersion {
        match (max_data_service_version, odata_max_version) {
            (Some(value), None) => {
                let major = value
                    .split(';')
                    .next()
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .map_or(0, |v| v.trunc() as i64);
                if major > 2 {
                    Self::V2 | Self::V3
                } else {
                    Self::V2
                }
            }
            _ => Self::ALL,
        }
    }
}

impl Default for ODataVersion {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for ODataVersion {
    type Output = ODataVersion;

    fn bitor(self, rhs: ODataVersion) -> ODataVersion {
        ODataVersion(self.0 | rhs.0)
    }
}

impl std::str::FromStr for ODataVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(['|', ','])
            .map(|part| match part.trim().to_ascii_lowercase().as_str() {
                "v2" | "2" => Ok(Self::V2),
                "v3" | "3" => Ok(Self::V3),
                "v4" | "4" => Ok(Self::V4),
                "all" => Ok(Self::ALL),
                other => Err(format!("unknown OData version '{}'", other)),
            })
            .try_fold(ODataVersion(0), |acc, v| v.map(|v| acc | v))
    }
}
