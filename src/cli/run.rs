//! Tokenize, parse and run OData URLs

use super::{CliError, json_to_value, projected_to_json, value_to_json};
use crate::executor::{ExecutionSettings, QueryOutput};
use crate::{MemoryQueryable, ODataVersion, Token, Value, execute, parse, tokenize};
use std::collections::HashMap;
use std::fmt::Write;

/// Options for the run command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// The OData URL to run
    pub url: String,
    /// JSON input: an array of items, or an object with a `value` array
    pub input: Option<String>,
    pub version: ODataVersion,
    pub max_page_size: Option<u64>,
    /// Key properties per entity set, for key lookups
    pub keys: HashMap<String, Vec<String>>,
    /// Leading path segments that address the service
    pub root_segments: usize,
}

/// Tokenizes `url`, failing on the first lexical error.
pub fn list_tokens(url: &str, version: ODataVersion) -> Result<Vec<Token>, CliError> {
    Ok(tokenize(url, version).collect::<Result<Vec<_>, _>>()?)
}

/// Renders the path segments and query options of `url`, the options in
/// execution order.
pub fn describe(url: &str, version: ODataVersion) -> Result<String, CliError> {
    let uri = parse(url, version)?;
    let mut out = String::new();
    let _ = writeln!(out, "segments:");
    for segment in uri.segments() {
        let _ = writeln!(out, "  {}", segment);
    }
    let _ = writeln!(out, "options:");
    for option in uri.query().sorted() {
        let _ = writeln!(out, "  {}", option);
    }
    Ok(out)
}

/// Parses `Set=Key1,Key2` into an entity set and its key properties.
pub fn parse_key_arg(arg: &str) -> Result<(String, Vec<String>), CliError> {
    let (set, keys) = arg
        .split_once('=')
        .ok_or_else(|| CliError::InvalidInput(format!("expected SET=KEY[,KEY], got '{}'", arg)))?;
    let keys: Vec<String> = keys
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if set.trim().is_empty() || keys.is_empty() {
        return Err(CliError::InvalidInput(format!("expected SET=KEY[,KEY], got '{}'", arg)));
    }
    Ok((set.trim().to_string(), keys))
}

/// Runs `options.url` against the JSON input and returns an OData-style
/// response body: `{"value": [...]}`, plus `@odata.count` when requested.
pub fn execute_run(options: &RunOptions) -> Result<serde_json::Value, CliError> {
    let uri = parse(&options.url, options.version)?;

    let json_str = options.input.as_ref().ok_or(CliError::NoInput)?;
    let json: serde_json::Value = serde_json::from_str(json_str)?;
    let items = match json_to_value(json) {
        Value::Collection(items) => items,
        Value::Record(mut fields) => match fields.remove("value") {
            Some(Value::Collection(items)) => items,
            _ => {
                return Err(CliError::InvalidInput(
                    "expected an array or an object with a 'value' array".to_string(),
                ));
            }
        },
        other => {
            return Err(CliError::InvalidInput(format!(
                "expected an array of items, got {}",
                other.type_name()
            )));
        }
    };

    let mut settings = ExecutionSettings::new().with_root_segments(options.root_segments);
    if let Some(max) = options.max_page_size {
        settings = settings.with_max_page_size(max);
    }
    if !options.keys.is_empty() {
        settings = settings.with_metadata(options.keys.clone());
    }

    let source = MemoryQueryable::dynamic(items);
    let result = execute(&uri, &source, &settings)?;
    let value = match result.output {
        QueryOutput::Items(query) => query.to_vec()?.into_iter().map(value_to_json).collect(),
        QueryOutput::Projected(records) => records.into_iter().map(projected_to_json).collect(),
    };

    let mut body = serde_json::Map::new();
    if let Some(count) = result.total_count {
        body.insert("@odata.count".to_string(), serde_json::Value::from(count));
    }
    body.insert("value".to_string(), serde_json::Value::Array(value));
    Ok(serde_json::Value::Object(body))
}
