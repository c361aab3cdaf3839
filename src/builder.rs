use crate::ast::ODataVersion;
use crate::compiler::CompileError;
use crate::literal::format_literal;
use crate::value::Value;
use std::fmt;

/// Composes OData URLs, writing typed values in the literal syntax of the
/// target protocol version.
///
/// # Example
///
/// ```
/// use odata_query::{ODataVersion, UriBuilder};
///
/// let url = UriBuilder::new("http://host/service")
///     .version(ODataVersion::V3)
///     .segment("Products")
///     .key(5_i64)
///     .unwrap()
///     .filter("Price gt 5")
///     .top(10)
///     .build();
/// assert_eq!(url, "http://host/service/Products(5L)?$filter=Price%20gt%205&$top=10");
/// ```
#[derive(Debug, Clone)]
pub struct UriBuilder {
    base: String,
    segments: Vec<String>,
    options: Vec<(String, String)>,
    version: ODataVersion,
}

impl UriBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        UriBuilder {
            base: base.into(),
            segments: Vec::new(),
            options: Vec::new(),
            version: ODataVersion::V4,
        }
    }

    /// Literal syntax to write; v4 unless set.
    pub fn version(mut self, version: ODataVersion) -> Self {
        self.version = version;
        self
    }

    pub fn segment(mut self, name: impl Into<String>) -> Self {
        self.segments.push(name.into());
        self
    }

    /// Addresses a single item of the last segment: `Products(5)`.
    pub fn key(self, value: impl Into<Value>) -> Result<Self, CompileError> {
        let literal = self.literal(&value.into())?;
        self.append_to_segment(&format!("({})", literal))
    }

    /// Addresses an item by a composite key: `Orders(Id=1,Line=2)`.
    pub fn keys<K: Into<String>>(
        self,
        keys: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Self, CompileError> {
        let mut pairs = Vec::new();
        for (name, value) in keys {
            pairs.push(format!("{}={}", name.into(), self.literal(&value)?));
        }
        self.append_to_segment(&format!("({})", pairs.join(",")))
    }

    /// Adds a query option with a raw value.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((name.into(), value.into()));
        self
    }

    pub fn filter(self, expression: &str) -> Self {
        self.option("$filter", expression)
    }

    pub fn order_by(self, terms: &[&str]) -> Self {
        self.option("$orderby", terms.join(","))
    }

    pub fn select(self, fields: &[&str]) -> Self {
        self.option("$select", fields.join(","))
    }

    pub fn expand(self, paths: &[&str]) -> Self {
        self.option("$expand", paths.join(","))
    }

    pub fn skip(self, count: u64) -> Self {
        self.option("$skip", count.to_string())
    }

    pub fn top(self, count: u64) -> Self {
        self.option("$top", count.to_string())
    }

    /// `$count=true` for v4, `$inlinecount=allpages` otherwise.
    pub fn inline_count(self) -> Self {
        if self.version.supports_v4() {
            self.option("$count", "true")
        } else {
            self.option("$inlinecount", "allpages")
        }
    }

    /// Defines a parameter alias: `@color='red'`.
    pub fn alias(self, name: &str, value: impl Into<Value>) -> Result<Self, CompileError> {
        let literal = self.literal(&value.into())?;
        let name = if name.starts_with('@') {
            name.to_string()
        } else {
            format!("@{}", name)
        };
        Ok(self.option(name, literal))
    }

    pub fn build(&self) -> String {
        let mut url = self.base.trim_end_matches('/').to_string();
        for segment in &self.segments {
            if !url.is_empty() {
                url.push('/');
            }
            url.push_str(&percent_encode(segment, "/?#"));
        }
        for (i, (name, value)) in self.options.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&percent_encode(name, "&=#+"));
            url.push('=');
            url.push_str(&percent_encode(value, "&#+"));
        }
        url
    }

    fn literal(&self, value: &Value) -> Result<String, CompileError> {
        format_literal(value, self.version).ok_or_else(|| {
            CompileError::InvalidArgument(format!(
                "{} has no literal form",
                value.type_name()
            ))
        })
    }

    fn append_to_segment(mut self, suffix: &str) -> Result<Self, CompileError> {
        let segment = self.segments.last_mut().ok_or_else(|| {
            CompileError::InvalidArgument("a key needs a segment to address".to_string())
        })?;
        segment.push_str(suffix);
        Ok(self)
    }
}

impl fmt::Display for UriBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Escapes `%`, spaces, control and non-ASCII characters plus `reserved`.
fn percent_encode(text: &str, reserved: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '%' || c == ' ' || c.is_ascii_control() || !c.is_ascii() || reserved.contains(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        } else {
            out.push(c);
        }
    }
    out
}
