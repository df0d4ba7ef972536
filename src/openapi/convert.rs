//! Swagger 2.0 to OpenAPI 3 conversion.
//!
//! Covers what the compiler reads: `definitions` move under
//! `components/schemas`, body and form parameters become request bodies,
//! and response `schema`s become media-type content. Anything the conversion
//! cannot make sense of is reported as an unsupported format.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{GenError, Result};

/// Keywords of a Swagger non-body parameter that belong in its `schema`.
const PARAMETER_SCHEMA_KEYS: &[&str] = &[
    "type",
    "format",
    "items",
    "enum",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
    "multipleOf",
];

const METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch"];

fn unsupported(reason: impl Into<String>) -> GenError {
    GenError::UnsupportedFormat(format!("Swagger conversion failed: {}", reason.into()))
}

/// Convert a Swagger 2.0 document into an OpenAPI 3.0 document.
pub fn swagger2_to_openapi3(document: &Value) -> Result<Value> {
    match document.get("swagger").and_then(Value::as_str) {
        Some("2.0") => {}
        Some(other) => return Err(unsupported(format!("unknown swagger version {other}"))),
        None => return Err(unsupported("`swagger` must be the string \"2.0\"")),
    }

    let document = rewrite_refs(document.clone());
    let root = document
        .as_object()
        .ok_or_else(|| unsupported("document root is not an object"))?;

    let consumes = media_types(root.get("consumes"));
    let produces = media_types(root.get("produces"));

    let mut paths = Map::new();
    if let Some(source) = root.get("paths") {
        let source = source
            .as_object()
            .ok_or_else(|| unsupported("`paths` is not an object"))?;
        for (path, item) in source {
            let item = item
                .as_object()
                .ok_or_else(|| unsupported(format!("path item {path} is not an object")))?;
            paths.insert(path.clone(), convert_path_item(item, root, &consumes, &produces)?);
        }
    }

    let mut components = Map::new();
    if let Some(definitions) = root.get("definitions") {
        components.insert("schemas".into(), definitions.clone());
    }
    if let Some(Value::Object(parameters)) = root.get("parameters") {
        let converted: Map<String, Value> = parameters
            .iter()
            .filter(|(_, p)| !is_body_like(p))
            .map(|(name, p)| (name.clone(), convert_parameter(p)))
            .collect();
        components.insert("parameters".into(), Value::Object(converted));
    }
    if let Some(Value::Object(responses)) = root.get("responses") {
        let converted: Map<String, Value> = responses
            .iter()
            .map(|(name, r)| (name.clone(), convert_response(r, &produces)))
            .collect();
        components.insert("responses".into(), Value::Object(converted));
    }

    let mut converted = Map::new();
    converted.insert("openapi".into(), json!("3.0.3"));
    if let Some(info) = root.get("info") {
        converted.insert("info".into(), info.clone());
    }
    if let Some(tags) = root.get("tags") {
        converted.insert("tags".into(), tags.clone());
    }
    converted.insert("paths".into(), Value::Object(paths));
    converted.insert("components".into(), Value::Object(components));

    debug!("Converted Swagger 2.0 document");
    Ok(Value::Object(converted))
}

fn rewrite_refs(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| match (key.as_str(), value) {
                    ("$ref", Value::String(pointer)) => (key, Value::String(rewrite_pointer(&pointer))),
                    (_, value) => (key, rewrite_refs(value)),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(rewrite_refs).collect()),
        other => other,
    }
}

fn rewrite_pointer(pointer: &str) -> String {
    for (from, to) in [
        ("#/definitions/", "#/components/schemas/"),
        ("#/parameters/", "#/components/parameters/"),
        ("#/responses/", "#/components/responses/"),
    ] {
        if let Some(rest) = pointer.strip_prefix(from) {
            return format!("{to}{rest}");
        }
    }
    pointer.to_string()
}

fn media_types(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|types| types.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn is_body_like(parameter: &Value) -> bool {
    matches!(
        parameter.get("in").and_then(Value::as_str),
        Some("body" | "formData")
    )
}

/// Follow a `#/components/parameters/` ref back into the Swagger root.
fn lookup_parameter<'a>(parameter: &'a Value, root: &'a Map<String, Value>) -> &'a Value {
    parameter
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|pointer| pointer.strip_prefix("#/components/parameters/"))
        .and_then(|name| root.get("parameters")?.get(name))
        .unwrap_or(parameter)
}

fn convert_parameter(parameter: &Value) -> Value {
    let Some(map) = parameter.as_object() else {
        return parameter.clone();
    };
    if map.contains_key("$ref") {
        return parameter.clone();
    }

    let mut converted = Map::new();
    let mut schema = Map::new();
    for (key, value) in map {
        if PARAMETER_SCHEMA_KEYS.contains(&key.as_str()) {
            schema.insert(key.clone(), value.clone());
        } else if key != "collectionFormat" && key != "allowEmptyValue" {
            converted.insert(key.clone(), value.clone());
        }
    }
    if !schema.is_empty() {
        converted.insert("schema".into(), file_to_binary(Value::Object(schema)));
    }
    Value::Object(converted)
}

fn file_to_binary(schema: Value) -> Value {
    if schema.get("type").and_then(Value::as_str) == Some("file") {
        json!({ "type": "string", "format": "binary" })
    } else {
        schema
    }
}

fn convert_response(response: &Value, produces: &[String]) -> Value {
    let Some(map) = response.as_object() else {
        return response.clone();
    };
    let mut converted = Map::new();
    for (key, value) in map {
        match key.as_str() {
            "schema" => {
                let content: Map<String, Value> = media_or_json(produces)
                    .into_iter()
                    .map(|media| (media, json!({ "schema": file_to_binary(value.clone()) })))
                    .collect();
                converted.insert("content".into(), Value::Object(content));
            }
            "examples" => {}
            _ => {
                converted.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(converted)
}

fn media_or_json(types: &[String]) -> Vec<String> {
    if types.is_empty() {
        vec!["application/json".to_string()]
    } else {
        types.to_vec()
    }
}

fn convert_path_item(
    item: &Map<String, Value>,
    root: &Map<String, Value>,
    consumes: &[String],
    produces: &[String],
) -> Result<Value> {
    let shared: Vec<Value> = match item.get("parameters") {
        Some(Value::Array(parameters)) => parameters.clone(),
        _ => Vec::new(),
    };

    let mut converted = Map::new();
    let shared_plain: Vec<Value> = shared
        .iter()
        .filter(|p| !is_body_like(lookup_parameter(p, root)))
        .map(convert_parameter)
        .collect();
    if !shared_plain.is_empty() {
        converted.insert("parameters".into(), Value::Array(shared_plain));
    }

    for method in METHODS {
        let Some(operation) = item.get(*method) else {
            continue;
        };
        let operation = operation
            .as_object()
            .ok_or_else(|| unsupported(format!("operation {method} is not an object")))?;
        converted.insert(
            (*method).to_string(),
            convert_operation(operation, &shared, root, consumes, produces),
        );
    }
    Ok(Value::Object(converted))
}

fn convert_operation(
    operation: &Map<String, Value>,
    shared: &[Value],
    root: &Map<String, Value>,
    consumes: &[String],
    produces: &[String],
) -> Value {
    let consumes = match media_types(operation.get("consumes")) {
        own if own.is_empty() => consumes.to_vec(),
        own => own,
    };
    let produces = match media_types(operation.get("produces")) {
        own if own.is_empty() => produces.to_vec(),
        own => own,
    };

    let own: Vec<Value> = match operation.get("parameters") {
        Some(Value::Array(parameters)) => parameters.clone(),
        _ => Vec::new(),
    };

    let mut parameters = Vec::new();
    let mut body = None;
    let mut form_properties = Map::new();
    let mut form_required = Vec::new();
    let mut has_file = false;

    // Body and form parameters can come from the path item too.
    for parameter in shared.iter().chain(own.iter()) {
        let resolved = lookup_parameter(parameter, root);
        match resolved.get("in").and_then(Value::as_str) {
            Some("body") => {
                body = Some((
                    resolved.get("schema").cloned().unwrap_or_else(|| json!({})),
                    resolved.get("required").and_then(Value::as_bool).unwrap_or(false),
                ));
            }
            Some("formData") => {
                let Some(name) = resolved.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let schema = convert_parameter(resolved)
                    .get("schema")
                    .cloned()
                    .unwrap_or_else(|| json!({ "type": "string" }));
                has_file |= schema.get("format").and_then(Value::as_str) == Some("binary");
                if resolved.get("required").and_then(Value::as_bool).unwrap_or(false) {
                    form_required.push(json!(name));
                }
                form_properties.insert(name.to_string(), schema);
            }
            _ if own.contains(parameter) => parameters.push(convert_parameter(parameter)),
            _ => {}
        }
    }

    let mut converted = Map::new();
    for (key, value) in operation {
        match key.as_str() {
            "parameters" | "consumes" | "produces" | "schemes" => {}
            "responses" => {
                let responses: Map<String, Value> = value
                    .as_object()
                    .map(|responses| {
                        responses
                            .iter()
                            .map(|(status, r)| (status.clone(), convert_response(r, &produces)))
                            .collect()
                    })
                    .unwrap_or_default();
                converted.insert(key.clone(), Value::Object(responses));
            }
            _ => {
                converted.insert(key.clone(), value.clone());
            }
        }
    }
    if !parameters.is_empty() {
        converted.insert("parameters".into(), Value::Array(parameters));
    }

    if let Some((schema, required)) = body {
        let content: Map<String, Value> = media_or_json(&consumes)
            .into_iter()
            .map(|media| (media, json!({ "schema": schema.clone() })))
            .collect();
        converted.insert(
            "requestBody".into(),
            json!({ "required": required, "content": content }),
        );
    } else if !form_properties.is_empty() {
        let media = if has_file || consumes.iter().any(|c| c == "multipart/form-data") {
            "multipart/form-data"
        } else {
            "application/x-www-form-urlencoded"
        };
        let mut schema = json!({ "type": "object", "properties": form_properties });
        if !form_required.is_empty() {
            schema["required"] = Value::Array(form_required);
        }
        converted.insert(
            "requestBody".into(),
            json!({ "required": true, "content": { media: { "schema": schema } } }),
        );
    }

    Value::Object(converted)
}
