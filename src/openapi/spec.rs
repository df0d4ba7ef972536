//! OpenAPI document structs for serde deserialization.
//!
//! Only the operation skeleton is typed. Schema fragments stay raw
//! `serde_json::Value`s because the schema compiler classifies them itself.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::convert::swagger2_to_openapi3;
use super::schema::resolve_chain;
use crate::error::{GenError, Result};

/// Root OpenAPI document. Paths iterate in sorted order.
#[derive(Debug, Deserialize)]
pub struct OpenApiSpec {
    pub openapi: Option<String>,
    pub info: Option<Info>,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
}

#[derive(Debug, Deserialize)]
pub struct Info {
    pub title: Option<String>,
    pub version: Option<String>,
}

/// HTTP methods an OpenAPI path item can define, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// A path item containing operations for different HTTP methods.
#[derive(Debug, Deserialize)]
pub struct PathItem {
    pub get: Option<Operation>,
    pub put: Option<Operation>,
    pub post: Option<Operation>,
    pub delete: Option<Operation>,
    pub options: Option<Operation>,
    pub head: Option<Operation>,
    pub patch: Option<Operation>,
    pub trace: Option<Operation>,
    /// Path-level parameters shared by all operations, possibly `$ref`s.
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl PathItem {
    pub fn operations(&self) -> impl Iterator<Item = (HttpMethod, &Operation)> {
        [
            (HttpMethod::Get, &self.get),
            (HttpMethod::Put, &self.put),
            (HttpMethod::Post, &self.post),
            (HttpMethod::Delete, &self.delete),
            (HttpMethod::Options, &self.options),
            (HttpMethod::Head, &self.head),
            (HttpMethod::Patch, &self.patch),
            (HttpMethod::Trace, &self.trace),
        ]
        .into_iter()
        .filter_map(|(method, operation)| operation.as_ref().map(|op| (method, op)))
    }
}

/// An API operation (endpoint).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<Value>,
    pub request_body: Option<Value>,
    #[serde(default)]
    pub responses: IndexMap<String, Value>,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// A parameter (path, query, header or cookie).
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    pub schema: Option<Value>,
    pub description: Option<String>,
}

/// A request body definition.
#[derive(Debug, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

/// A response definition.
#[derive(Debug, Deserialize)]
pub struct Response {
    pub description: Option<String>,
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

/// Media type content (e.g. `application/json`).
#[derive(Debug, Deserialize)]
pub struct MediaType {
    pub schema: Option<Value>,
}

/// Whether a media type carries JSON (`application/json`, `application/problem+json`, ...).
pub fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or(media_type).trim();
    essence == "application/json" || essence.ends_with("+json")
}

/// Parse JSON or YAML text into a document tree.
pub fn parse_document(text: &str) -> Result<Value> {
    match serde_json::from_str(text) {
        Ok(document) => Ok(document),
        Err(json_err) if text.trim_start().starts_with('{') => Err(GenError::Parse(json_err.to_string())),
        Err(_) => serde_yaml::from_str(text).map_err(|e| GenError::Parse(e.to_string())),
    }
}

/// Check the dialect and return an OpenAPI 3 document.
///
/// Swagger 2.0 documents go through a conversion attempt first.
pub fn upgrade_document(document: Value) -> Result<Value> {
    if let Some(version) = document.get("swagger") {
        debug!(%version, "Converting Swagger document to OpenAPI 3");
        return swagger2_to_openapi3(&document);
    }

    match document.get("openapi").and_then(Value::as_str) {
        Some(version) if version.starts_with("3.") => Ok(document),
        Some(version) => Err(GenError::UnsupportedFormat(format!(
            "OpenAPI version {version} is not supported"
        ))),
        None => Err(GenError::UnsupportedFormat(
            "document has neither an `openapi` nor a `swagger` version field".to_string(),
        )),
    }
}

impl OpenApiSpec {
    /// Parse text into the raw document (used as the `$ref` context) and its typed skeleton.
    pub fn load(text: &str) -> Result<(Value, Self)> {
        let document = upgrade_document(parse_document(text)?)?;
        let spec = serde_json::from_value(document.clone())
            .map_err(|e| GenError::Parse(format!("Failed to parse OpenAPI document: {e}")))?;
        Ok((document, spec))
    }
}

/// Deserialize an object that may be given as a `$ref` into `document`.
pub fn resolve_object<T: DeserializeOwned>(value: &Value, document: &Value) -> Option<T> {
    let target = match value.get("$ref").and_then(Value::as_str) {
        Some(pointer) => resolve_chain(pointer, document).or_else(|| {
            warn!(pointer, "Skipping unresolvable reference");
            None
        })?,
        None => value,
    };
    serde_json::from_value(target.clone())
        .map_err(|e| warn!(error = %e, "Skipping malformed object"))
        .ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_yaml_document() {
        let yaml = "openapi: 3.0.3\ninfo:\n  title: Pets\n  version: '1'\npaths:\n  /pets:\n    get:\n      operationId: listPets\n      responses:\n        '200':\n          description: ok\n";
        let (_, spec) = OpenApiSpec::load(yaml).unwrap();
        let item = &spec.paths["/pets"];
        let (method, operation) = item.operations().next().unwrap();
        assert_eq!(method, HttpMethod::Get);
        assert_eq!(operation.operation_id.as_deref(), Some("listPets"));
        assert!(operation.responses.contains_key("200"));
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let err = parse_document("{ not json").unwrap_err();
        assert!(matches!(err, GenError::Parse(_)));
    }

    #[test]
    fn test_rejects_unknown_dialects() {
        let err = upgrade_document(json!({ "paths": {} })).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedFormat(_)));
        let err = upgrade_document(json!({ "openapi": "4.0.0", "paths": {} })).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_paths_is_empty() {
        let (_, spec) = OpenApiSpec::load(r#"{ "openapi": "3.1.0" }"#).unwrap();
        assert!(spec.paths.is_empty());
    }

    #[test]
    fn test_resolve_object_follows_refs() {
        let document = json!({
            "components": { "parameters": {
                "Limit": { "name": "limit", "in": "query", "schema": { "type": "integer" } },
                "Alias": { "$ref": "#/components/parameters/Limit" }
            }}
        });
        let parameter: Parameter =
            resolve_object(&json!({ "$ref": "#/components/parameters/Alias" }), &document).unwrap();
        assert_eq!(parameter.name, "limit");
        assert_eq!(parameter.location, ParameterLocation::Query);
        assert!(!parameter.required);

        let missing: Option<Parameter> =
            resolve_object(&json!({ "$ref": "#/components/parameters/Nope" }), &document);
        assert!(missing.is_none());
    }

    #[test]
    fn test_json_media_types() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/json; charset=utf-8"));
        assert!(is_json_media_type("application/problem+json"));
        assert!(!is_json_media_type("text/plain"));
        assert!(!is_json_media_type("text/event-stream"));
    }
}
