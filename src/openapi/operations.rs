//! Spec walking and response classification.
//!
//! Every operation is registered with the schema compiler once, producing an
//! [`OperationSchemaSet`]: which declaration backs its parameters, payload and
//! each response status. The set is read-only afterwards and feeds both the
//! partitioner and the client templates.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::schema::SchemaCompiler;
use super::spec::{
    HttpMethod, OpenApiSpec, Operation, Parameter, ParameterLocation, RequestBody, Response,
    is_json_media_type, resolve_object,
};
use super::utils::{sanitize_ts_identifier, to_type_name};
use crate::error::{GenError, Result};

/// Group name for operations without tags.
pub const UNTAGGED_GROUP: &str = "_untagged";

/// Bucket key used when an operation has exactly one JSON success status.
pub const SUCCESS_BUCKET: &str = "2xx";

const EVENT_STREAM: &str = "text/event-stream";

/// How a request body is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    FormUrlEncoded,
    Multipart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub schema: String,
    pub kind: PayloadKind,
    pub required: bool,
}

/// Outcome of classifying one response status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseClass {
    /// Decoded as the success value under `bucket` (`2xx` or the literal status).
    Success { bucket: String, schema: String },
    /// Failed with a tagged error wrapping the decoded body struct.
    ErrorTagged { error: String, body: String },
    /// Failed with the decoded value as-is.
    ErrorPlain { schema: String },
    /// Succeeds with no value.
    Void,
    /// Not modeled; falls through to the unexpected-status failure.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedResponse {
    pub status: String,
    pub class: ResponseClass,
}

/// Parameter wiring needed by the request template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
}

/// Declarations backing one operation.
#[derive(Debug, Clone)]
pub struct OperationSchemaSet {
    /// Method name on the generated client (camelCase).
    pub id: String,
    /// Prefix for names derived from this operation (PascalCase).
    pub type_prefix: String,
    pub method: HttpMethod,
    pub path: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub parameters: Vec<ParameterInfo>,
    pub params: Option<String>,
    pub payload: Option<Payload>,
    pub success: IndexMap<String, String>,
    pub errors: IndexMap<String, String>,
    pub voids: Vec<String>,
    pub default_schema: Option<String>,
    pub stream_event: Option<String>,
    pub responses: Vec<ClassifiedResponse>,
}

impl OperationSchemaSet {
    /// First tag, or the synthetic untagged group.
    pub fn primary_tag(&self) -> &str {
        self.tags.first().map_or(UNTAGGED_GROUP, String::as_str)
    }

    /// Every declaration this operation references directly, error body
    /// structs included.
    pub fn schema_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        names.extend(self.params.iter().cloned());
        names.extend(self.payload.iter().map(|p| p.schema.clone()));
        names.extend(self.success.values().cloned());
        names.extend(self.errors.values().cloned());
        names.extend(self.default_schema.iter().cloned());
        names.extend(self.stream_event.iter().cloned());
        for response in &self.responses {
            if let ResponseClass::ErrorTagged { body, .. } = &response.class {
                names.insert(body.clone());
            }
        }
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusKey {
    Code(u16),
    Default,
    Invalid,
}

/// `"404"` → 404, `"4XX"` → 400, `"default"` → the default bucket.
fn parse_status(status: &str) -> StatusKey {
    if status == "default" {
        return StatusKey::Default;
    }
    if let Ok(code) = status.parse::<u16>() {
        return StatusKey::Code(code);
    }
    let mut chars = status.chars();
    match (chars.next().and_then(|c| c.to_digit(10)), chars.as_str()) {
        (Some(class), "XX" | "xx") => u16::try_from(class * 100).map_or(StatusKey::Invalid, StatusKey::Code),
        _ => StatusKey::Invalid,
    }
}

fn json_schema(response: &Response) -> Option<&Value> {
    response
        .content
        .iter()
        .find(|(media, _)| is_json_media_type(media))
        .and_then(|(_, media)| media.schema.as_ref())
}

fn event_schema(response: &Response) -> Option<&Value> {
    response.content.get(EVENT_STREAM).and_then(|media| media.schema.as_ref())
}

/// Method name for an operation: its `operationId`, or method + path.
fn operation_id(method: HttpMethod, path: &str, operation: &Operation) -> String {
    if let Some(id) = &operation.operation_id {
        return sanitize_ts_identifier(id);
    }
    let path_part: String = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let name = segment.trim_start_matches('{').trim_end_matches('}');
            if segment.starts_with('{') {
                format!("By{}", to_type_name(name))
            } else {
                to_type_name(name)
            }
        })
        .collect();
    sanitize_ts_identifier(&format!("{}{path_part}", method.as_str()))
}

/// Register every operation in `spec` with `compiler`.
pub fn walk_operations(
    spec: &OpenApiSpec,
    document: &Value,
    compiler: &mut SchemaCompiler,
) -> Result<Vec<OperationSchemaSet>> {
    let mut seen = HashSet::new();
    let mut operations = Vec::new();

    for (path, item) in &spec.paths {
        let shared: Vec<Parameter> = item
            .parameters
            .iter()
            .filter_map(|p| resolve_object(p, document))
            .collect();

        for (method, operation) in item.operations() {
            let id = operation_id(method, path, operation);
            if !seen.insert(id.clone()) {
                return Err(GenError::DuplicateOperationId(id));
            }
            let walker = OperationWalker {
                document,
                compiler: &mut *compiler,
                type_prefix: to_type_name(&id),
            };
            operations.push(walker.walk(id, method, path, operation, &shared));
        }
    }

    info!(
        operations = operations.len(),
        declarations = compiler.declarations().count(),
        "Walked operations"
    );
    Ok(operations)
}

struct OperationWalker<'a> {
    document: &'a Value,
    compiler: &'a mut SchemaCompiler,
    type_prefix: String,
}

impl OperationWalker<'_> {
    fn walk(
        mut self,
        id: String,
        method: HttpMethod,
        path: &str,
        operation: &Operation,
        shared: &[Parameter],
    ) -> OperationSchemaSet {
        debug!(%method, path, operation = %id, "Walking operation");

        let (parameters, params) = self.parameters(operation, shared);
        let payload = operation
            .request_body
            .as_ref()
            .and_then(|body| self.payload(body));

        let mut set = OperationSchemaSet {
            id,
            type_prefix: self.type_prefix.clone(),
            method,
            path: path.to_string(),
            tags: operation.tags.clone(),
            description: operation.description.clone().or_else(|| operation.summary.clone()),
            deprecated: operation.deprecated,
            parameters,
            params,
            payload,
            success: IndexMap::new(),
            errors: IndexMap::new(),
            voids: Vec::new(),
            default_schema: None,
            stream_event: None,
            responses: Vec::new(),
        };
        self.responses(operation, &mut set);
        set
    }

    fn register(&mut self, base: &str, fragment: &Value, prefer_struct: Option<bool>) -> String {
        let name = self.compiler.unique_name(base);
        self.compiler
            .add_schema(&name, fragment, Some(self.document), prefer_struct)
    }

    /// Merge path-level and operation-level parameters into one `{Op}Params` struct.
    fn parameters(&mut self, operation: &Operation, shared: &[Parameter]) -> (Vec<ParameterInfo>, Option<String>) {
        let mut merged: IndexMap<(String, ParameterLocation), Parameter> = IndexMap::new();
        let own = operation.parameters.iter().filter_map(|p| resolve_object::<Parameter>(p, self.document));
        for parameter in shared.iter().cloned().chain(own) {
            if parameter.location == ParameterLocation::Cookie {
                debug!(name = %parameter.name, "Skipping cookie parameter");
                continue;
            }
            merged.insert((parameter.name.clone(), parameter.location), parameter);
        }
        if merged.is_empty() {
            return (Vec::new(), None);
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut infos = Vec::new();
        for parameter in merged.into_values() {
            let is_required = parameter.required || parameter.location == ParameterLocation::Path;
            let mut schema = parameter.schema.unwrap_or_else(|| json!({ "type": "string" }));
            if let (Some(description), Value::Object(map)) = (&parameter.description, &mut schema)
                && !map.contains_key("description")
            {
                map.insert("description".into(), json!(description));
            }
            if is_required {
                required.push(json!(parameter.name));
            }
            properties.insert(parameter.name.clone(), schema);
            infos.push(ParameterInfo {
                name: parameter.name,
                location: parameter.location,
                required: is_required,
            });
        }

        let fragment = json!({ "type": "object", "required": required, "properties": properties });
        let name = self.register(&format!("{}Params", self.type_prefix), &fragment, Some(true));
        (infos, Some(name))
    }

    fn payload(&mut self, body: &Value) -> Option<Payload> {
        let body: RequestBody = resolve_object(body, self.document)?;
        let (media, kind) = body
            .content
            .iter()
            .find(|(media, _)| is_json_media_type(media))
            .map(|(media, _)| (media.as_str(), PayloadKind::Json))
            .or_else(|| {
                body.content
                    .get_key_value("multipart/form-data")
                    .map(|(media, _)| (media.as_str(), PayloadKind::Multipart))
            })
            .or_else(|| {
                body.content
                    .get_key_value("application/x-www-form-urlencoded")
                    .map(|(media, _)| (media.as_str(), PayloadKind::FormUrlEncoded))
            })
            .or_else(|| {
                debug!(prefix = %self.type_prefix, "No supported request body media type");
                None
            })?;

        let fragment = body.content[media].schema.clone().unwrap_or(Value::Bool(true));
        let schema = self.register(&format!("{}Request", self.type_prefix), &fragment, None);
        Some(Payload {
            schema,
            kind,
            required: body.required,
        })
    }

    fn responses(&mut self, operation: &Operation, set: &mut OperationSchemaSet) {
        let responses: Vec<(String, Response)> = operation
            .responses
            .iter()
            .filter_map(|(status, value)| resolve_object(value, self.document).map(|r| (status.clone(), r)))
            .collect();

        let explicit_success = responses
            .iter()
            .filter(|(status, response)| {
                matches!(parse_status(status), StatusKey::Code(code) if code < 400)
                    && json_schema(response).is_some()
            })
            .count();
        let default_is_success = explicit_success == 0;
        let default_has_json = responses
            .iter()
            .any(|(status, response)| status == "default" && json_schema(response).is_some());
        let success_count = explicit_success + usize::from(default_is_success && default_has_json);

        for (status, response) in &responses {
            let key = parse_status(status);

            if let Some(schema) = event_schema(response)
                && !matches!(key, StatusKey::Code(code) if code >= 400)
            {
                set.stream_event = Some(self.register(&format!("{}Event", self.type_prefix), schema, None));
                continue;
            }

            let class = match (key, json_schema(response)) {
                (StatusKey::Invalid, _) => {
                    warn!(status = %status, operation = %set.id, "Skipping response with invalid status key");
                    continue;
                }
                (StatusKey::Default, Some(schema)) if default_is_success => {
                    self.success(status, schema, success_count, set)
                }
                (StatusKey::Default, Some(schema)) => {
                    let name = self.register(&format!("{}Default", self.type_prefix), schema, None);
                    set.default_schema = Some(name.clone());
                    ResponseClass::ErrorPlain { schema: name }
                }
                (StatusKey::Code(code), Some(schema)) if code < 400 => {
                    self.success(status, schema, success_count, set)
                }
                (StatusKey::Code(_), Some(schema)) => self.error(status, schema, set),
                (StatusKey::Code(code), None) if code < 400 => {
                    if !response.content.is_empty() {
                        debug!(status = %status, "Non-JSON success body treated as void");
                    }
                    set.voids.push(status.clone());
                    ResponseClass::Void
                }
                (StatusKey::Code(_) | StatusKey::Default, None) => ResponseClass::Ignored,
            };
            set.responses.push(ClassifiedResponse {
                status: status.clone(),
                class,
            });
        }
    }

    fn success(&mut self, status: &str, schema: &Value, success_count: usize, set: &mut OperationSchemaSet) -> ResponseClass {
        let (bucket, base) = if success_count == 1 {
            (SUCCESS_BUCKET.to_string(), format!("{}Response", self.type_prefix))
        } else {
            (status.to_string(), format!("{}{}", self.type_prefix, to_type_name(status)))
        };
        let name = self.register(&base, schema, None);
        set.success.insert(bucket.clone(), name.clone());
        ResponseClass::Success { bucket, schema: name }
    }

    /// Objects become a tagged error around a body struct; anything else is surfaced plain.
    fn error(&mut self, status: &str, schema: &Value, set: &mut OperationSchemaSet) -> ResponseClass {
        let discriminator = format!("{}{}", self.type_prefix, status);
        if self.compiler.is_object_schema(schema, Some(self.document)) {
            let body = self.register(&format!("{discriminator}Body"), schema, None);
            let error = self.compiler.add_tagged_error(&discriminator, &body);
            set.errors.insert(status.to_string(), error.clone());
            ResponseClass::ErrorTagged { error, body }
        } else {
            let name = self.register(&discriminator, schema, None);
            set.errors.insert(status.to_string(), name.clone());
            ResponseClass::ErrorPlain { schema: name }
        }
    }
}
