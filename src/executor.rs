//! # Query execution
//!
//! Applies the query options of a parsed URL to a [`Queryable`] in a fixed
//! order, whatever their order in the URL:
//!
//! ```text
//! $filter -> $orderby -> $expand -> $skip -> $top -> $select
//! ```
//!
//! `$inlinecount=allpages` (or `$count=true`) counts the filtered items
//! before paging. Alias definitions and unrecognised options are left to the
//! application.

use crate::ast::{BinaryOperator, Node, NodeKind, ODataQuery, ODataUri};
use crate::compiler::{self, CompileError, Compiler};
use crate::expr::DynamicAccessor;
use crate::queryable::{EntityMetadata, ProjectedRecord, QueryError, Queryable};
use std::fmt;
use std::sync::Arc;

/// Options of [`execute`] that do not come from the URL.
///
/// # Example
///
/// ```
/// use odata_query::executor::ExecutionSettings;
/// use std::collections::HashMap;
///
/// let keys = HashMap::from([("Products".to_string(), vec!["Id".to_string()])]);
/// let settings = ExecutionSettings::new()
///     .with_max_page_size(100)
///     .with_root_segments(1)
///     .with_metadata(keys);
/// assert_eq!(settings.max_page_size(), Some(100));
/// ```
#[derive(Clone, Default)]
pub struct ExecutionSettings {
    accessor: Option<DynamicAccessor>,
    max_page_size: Option<u64>,
    metadata: Option<Arc<dyn EntityMetadata + Send + Sync>>,
    root_segments: usize,
    entity_set: Option<String>,
}

impl ExecutionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads fields through `accessor` instead of static record members.
    pub fn with_accessor(mut self, accessor: DynamicAccessor) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Caps `$top`, adding it when the URL has none.
    pub fn with_max_page_size(mut self, max: u64) -> Self {
        self.max_page_size = Some(max);
        self
    }

    /// Enables key lookups such as `Products(5)`.
    pub fn with_metadata(mut self, metadata: impl EntityMetadata + Send + Sync + 'static) -> Self {
        self.metadata = Some(Arc::new(metadata));
        self
    }

    /// Number of leading path segments that address the service itself.
    pub fn with_root_segments(mut self, count: usize) -> Self {
        self.root_segments = count;
        self
    }

    /// Entity set used for key lookups, instead of the name in the path.
    pub fn with_entity_set(mut self, name: impl Into<String>) -> Self {
        self.entity_set = Some(name.into());
        self
    }

    pub fn accessor(&self) -> Option<&DynamicAccessor> {
        self.accessor.as_ref()
    }

    pub fn max_page_size(&self) -> Option<u64> {
        self.max_page_size
    }

    pub fn root_segments(&self) -> usize {
        self.root_segments
    }
}

impl fmt::Debug for ExecutionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSettings")
            .field("accessor", &self.accessor)
            .field("max_page_size", &self.max_page_size)
            .field("metadata", &self.metadata.is_some())
            .field("root_segments", &self.root_segments)
            .field("entity_set", &self.entity_set)
            .finish()
    }
}

/// The items of a query, or their projection when `$select` lists fields.
#[derive(Debug, Clone)]
pub enum QueryOutput<Q> {
    Items(Q),
    Projected(Vec<ProjectedRecord>),
}

#[derive(Debug, Clone)]
pub struct ODataResult<Q> {
    pub output: QueryOutput<Q>,
    /// Items matching the filter before paging, when requested
    pub total_count: Option<usize>,
    /// Whether the path addressed a single item by key
    pub lookup_by_key: bool,
}

impl<Q> ODataResult<Q> {
    pub fn items(&self) -> Option<&Q> {
        match &self.output {
            QueryOutput::Items(items) => Some(items),
            QueryOutput::Projected(_) => None,
        }
    }

    pub fn projected(&self) -> Option<&[ProjectedRecord]> {
        match &self.output {
            QueryOutput::Projected(records) => Some(records),
            QueryOutput::Items(_) => None,
        }
    }
}

/// Runs the query options of `uri` against `source`.
pub fn execute<Q: Queryable>(
    uri: &ODataUri,
    source: &Q,
    settings: &ExecutionSettings,
) -> Result<ODataResult<Q>, QueryError> {
    let mut compiler = Compiler::new(source.element_type()).with_aliases(uri.query());
    if let Some(accessor) = &settings.accessor {
        compiler = compiler.with_accessor(accessor.clone());
    }

    let mut query = ODataQuery::new();
    for option in uri.query() {
        if !matches!(option.kind(), NodeKind::Alias | NodeKind::Ignored) {
            query.insert(option.clone());
        }
    }

    let key_filter = key_lookup(uri, settings)?;
    let lookup_by_key = key_filter.is_some();
    if let Some(filter) = key_filter {
        query.insert(filter);
    }

    if let Some(max) = settings.max_page_size {
        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        if query.find(NodeKind::Top).is_none() || query.top().is_some_and(|top| top > limit) {
            query.set_top(Some(max));
        }
    }

    let mut current = source.clone();
    let mut unpaged: Option<Q> = None;
    let mut projection = None;
    let mut count_requested = false;

    for option in query.sorted() {
        log::debug!("applying {}", option);
        match option.kind() {
            NodeKind::Filter => current = current.filter(&compiler.predicate(option)?)?,
            NodeKind::OrderBy => {
                for key in compiler.sort_keys(option)? {
                    current = current.order_by(&key)?;
                }
            }
            NodeKind::Expand => {
                for path in option.children() {
                    let path = path.path_text();
                    match current.include(&path) {
                        Some(next) => current = next?,
                        None => log::debug!("source cannot include related items; ignoring $expand={}", path),
                    }
                }
            }
            NodeKind::Skip | NodeKind::Top => {
                let count = compiler::page_value(option)?;
                if unpaged.is_none() {
                    unpaged = Some(current.clone());
                }
                current = match option.kind() {
                    NodeKind::Skip => current.skip(count),
                    _ => current.take(count),
                };
            }
            NodeKind::Select => projection = compiler.projection(option)?,
            NodeKind::InlineCount => count_requested = compiler::inline_count(option)?,
            _ => {}
        }
    }

    let total_count = if count_requested {
        Some(unpaged.as_ref().unwrap_or(&current).count()?)
    } else {
        None
    };
    let output = match projection {
        Some(projection) => QueryOutput::Projected(current.select(&projection)?),
        None => QueryOutput::Items(current),
    };
    Ok(ODataResult {
        output,
        total_count,
        lookup_by_key,
    })
}

/// Turns a key segment such as `Products(5)` or `Orders(Id=1,Line=2)` into
/// a `$filter` on the key properties.
fn key_lookup(uri: &ODataUri, settings: &ExecutionSettings) -> Result<Option<Node>, QueryError> {
    let Some(metadata) = &settings.metadata else {
        return Ok(None);
    };
    let Some(segment) = uri.path_segments(settings.root_segments).first() else {
        return Ok(None);
    };
    if segment.kind() != NodeKind::Call {
        return Ok(None);
    }
    let args = uri.arguments(segment);
    let entity_set = settings.entity_set.as_deref().unwrap_or(segment.text());
    let Some(keys) = metadata.keys(entity_set) else {
        return Ok(None);
    };
    if args.is_empty() || keys.len() != args.len() {
        log::debug!(
            "{} has {} key(s) but {} argument(s); no key lookup",
            entity_set,
            keys.len(),
            args.len()
        );
        return Ok(None);
    }

    let mut predicate: Option<Node> = None;
    for (i, (name, value)) in args.iter().enumerate() {
        let key = match name {
            Some(name) => keys.iter().find(|k| k.as_str() == name),
            None => keys.get(i),
        }
        .ok_or_else(|| CompileError::UnknownProperty {
            name: name.unwrap_or_default().to_string(),
            owner: entity_set.to_string(),
        })?;
        let term = Node::binary(BinaryOperator::Equal, Node::identifier(key), value.clone());
        predicate = Some(match predicate {
            Some(left) => Node::binary(BinaryOperator::And, left, term),
            None => term,
        });
    }
    Ok(predicate.map(|p| Node::option("$filter", p)))
}
