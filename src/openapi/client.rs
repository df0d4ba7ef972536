//! Per-operation HTTP client templates.
//!
//! Consumes [`OperationSchemaSet`]s and emits a `{Tag}Client` interface plus a
//! `make{Tag}Client(httpClient)` constructor built on `@effect/platform`.
//! Status dispatch mirrors the response classification: success decode,
//! tagged error, plain error, void, and a fallback for everything else.

use std::collections::BTreeSet;

use indexmap::IndexSet;

use super::operations::{OperationSchemaSet, PayloadKind, ResponseClass};
use super::schema::{OutputKind, jsdoc};
use super::spec::ParameterLocation;
use super::utils::{escape_js_string, needs_quoting, quote_if_needed};

/// A piece of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlPart {
    Static(String),
    Param(String),
}

fn parse_path_template(path: &str) -> Vec<UrlPart> {
    let mut parts = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        if start > 0 {
            parts.push(UrlPart::Static(rest[..start].to_string()));
        }
        parts.push(UrlPart::Param(rest[start + 1..start + len].to_string()));
        rest = &rest[start + len + 1..];
    }
    if !rest.is_empty() {
        parts.push(UrlPart::Static(rest.to_string()));
    }
    parts
}

/// `params.name` or `params["x-name"]`, with optional chaining when the
/// whole params argument may be omitted.
fn param_access(name: &str, optional: bool) -> String {
    let chain = if optional { "?." } else { "" };
    if needs_quoting(name) {
        format!("params{chain}[\"{}\"]", escape_js_string(name))
    } else if optional {
        format!("params?.{name}")
    } else {
        format!("params.{name}")
    }
}

/// No parameter is required, so callers may omit the argument.
fn params_optional(operation: &OperationSchemaSet) -> bool {
    operation.parameters.iter().all(|p| !p.required)
}

fn escape_template(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${")
}

fn url_expr(operation: &OperationSchemaSet) -> String {
    let declared: Vec<&str> = operation
        .parameters
        .iter()
        .filter(|p| p.location == ParameterLocation::Path)
        .map(|p| p.name.as_str())
        .collect();
    let url: String = parse_path_template(&operation.path)
        .into_iter()
        .map(|part| match part {
            UrlPart::Static(text) => escape_template(&text),
            UrlPart::Param(name) if declared.contains(&name.as_str()) => {
                format!("${{encodeURIComponent(String({}))}}", param_access(&name, false))
            }
            UrlPart::Param(name) => escape_template(&format!("{{{name}}}")),
        })
        .collect();
    format!("`{url}`")
}

/// Shared helper a module's client code calls, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Helper {
    Compact,
    FormData,
    DecodeSuccess,
    DecodeError,
    DecodeTaggedError,
    UnexpectedStatus,
}

impl Helper {
    fn scan(operations: &[&OperationSchemaSet]) -> BTreeSet<Self> {
        let mut helpers = BTreeSet::new();
        for operation in operations {
            let compact = operation
                .parameters
                .iter()
                .any(|p| matches!(p.location, ParameterLocation::Query | ParameterLocation::Header))
                || operation
                    .payload
                    .as_ref()
                    .is_some_and(|p| p.kind == PayloadKind::FormUrlEncoded);
            if compact {
                helpers.insert(Self::Compact);
            }
            if operation
                .payload
                .as_ref()
                .is_some_and(|p| p.kind == PayloadKind::Multipart)
            {
                helpers.insert(Self::FormData);
            }
            if !has_plain_method(operation) {
                continue;
            }
            helpers.insert(if operation.default_schema.is_some() {
                Self::DecodeError
            } else {
                Self::UnexpectedStatus
            });
            for response in &operation.responses {
                match response.class {
                    ResponseClass::Success { .. } => {
                        helpers.insert(Self::DecodeSuccess);
                    }
                    ResponseClass::ErrorTagged { .. } => {
                        helpers.insert(Self::DecodeTaggedError);
                    }
                    ResponseClass::ErrorPlain { .. } => {
                        helpers.insert(Self::DecodeError);
                    }
                    ResponseClass::Void | ResponseClass::Ignored => {}
                }
            }
        }
        helpers
    }

    const fn source(self, kind: OutputKind) -> &'static str {
        let schema = matches!(kind, OutputKind::Schema);
        match self {
            Self::Compact => COMPACT,
            Self::FormData => TO_FORM_DATA,
            Self::DecodeSuccess if schema => DECODE_SUCCESS,
            Self::DecodeSuccess => DECODE_SUCCESS_TYPED,
            Self::DecodeError if schema => DECODE_ERROR,
            Self::DecodeError => DECODE_ERROR_TYPED,
            Self::DecodeTaggedError if schema => DECODE_TAGGED_ERROR,
            Self::DecodeTaggedError => DECODE_TAGGED_ERROR_TYPED,
            Self::UnexpectedStatus => UNEXPECTED_STATUS,
        }
    }
}

fn render_helpers(helpers: &BTreeSet<Helper>, kind: OutputKind) -> String {
    helpers
        .iter()
        .map(|helper| format!("{}\n", helper.source(kind)))
        .collect::<Vec<_>>()
        .join("\n")
}

const COMPACT: &str = r#"const compact = (input: object): Record<string, string> =>
  Object.fromEntries(
    Object.entries(input).flatMap(([key, value]) =>
      value === undefined || value === null ? [] : [[key, String(value)]]
    )
  )"#;

const TO_FORM_DATA: &str = r#"const toFormData = (input: object): FormData => {
  const data = new FormData()
  for (const [key, value] of Object.entries(input)) {
    if (value === undefined || value === null) continue
    for (const item of Array.isArray(value) ? value : [value]) {
      if (item instanceof Blob) data.append(key, item)
      else if (item instanceof Uint8Array) data.append(key, new Blob([item]))
      else data.append(key, typeof item === "object" ? JSON.stringify(item) : String(item))
    }
  }
  return data
}"#;

const DECODE_SUCCESS: &str = r#"const decodeSuccess =
  <A, I, R>(schema: Schema.Schema<A, I, R>) =>
  (response: HttpClientResponse.HttpClientResponse) =>
    HttpClientResponse.schemaBodyJson(schema)(response)"#;

const DECODE_ERROR: &str = r#"const decodeError =
  <A, I, R>(schema: Schema.Schema<A, I, R>) =>
  (response: HttpClientResponse.HttpClientResponse) =>
    Effect.flatMap(HttpClientResponse.schemaBodyJson(schema)(response), Effect.fail)"#;

const DECODE_TAGGED_ERROR: &str = r#"const decodeTaggedError =
  <A, I, R, E>(schema: Schema.Schema<A, I, R>, wrap: (cause: A) => E) =>
  (response: HttpClientResponse.HttpClientResponse) =>
    Effect.flatMap(HttpClientResponse.schemaBodyJson(schema)(response), (cause) => Effect.fail(wrap(cause)))"#;

const DECODE_SUCCESS_TYPED: &str = r#"const decodeSuccess =
  <A>() =>
  (response: HttpClientResponse.HttpClientResponse) =>
    Effect.map(response.json, (body) => body as A)"#;

const DECODE_ERROR_TYPED: &str = r#"const decodeError =
  <E>() =>
  (response: HttpClientResponse.HttpClientResponse) =>
    Effect.flatMap(response.json, (body) => Effect.fail(body as E))"#;

const DECODE_TAGGED_ERROR_TYPED: &str = r#"const decodeTaggedError =
  <A, E>(wrap: (cause: A) => E) =>
  (response: HttpClientResponse.HttpClientResponse) =>
    Effect.flatMap(response.json, (body) => Effect.fail(wrap(body as A)))"#;

const UNEXPECTED_STATUS: &str = r#"const unexpectedStatus = (response: HttpClientResponse.HttpClientResponse) =>
  Effect.flatMap(
    Effect.orElseSucceed(response.text, () => "Unexpected status code"),
    (description) =>
      Effect.fail(
        new HttpClientError.ResponseError({
          request: response.request,
          response,
          reason: "StatusCode",
          description
        })
      )
  )"#;

/// Import lines for a module that carries client code.
pub fn client_imports(kind: OutputKind, has_stream: bool) -> String {
    let mut lines = vec![
        "import * as HttpClient from \"@effect/platform/HttpClient\"",
        "import * as HttpClientError from \"@effect/platform/HttpClientError\"",
        "import * as HttpClientRequest from \"@effect/platform/HttpClientRequest\"",
        "import * as HttpClientResponse from \"@effect/platform/HttpClientResponse\"",
        "import * as Effect from \"effect/Effect\"",
    ];
    if kind == OutputKind::Schema {
        lines.push("import type * as ParseResult from \"effect/ParseResult\"");
    }
    if has_stream {
        lines.push("import * as Stream from \"effect/Stream\"");
    }
    lines.join("\n") + "\n"
}

/// Whether the operation gets a regular request/response method.
fn has_plain_method(operation: &OperationSchemaSet) -> bool {
    operation.stream_event.is_none() || !operation.success.is_empty()
}

fn stream_method_name(operation: &OperationSchemaSet) -> String {
    format!("{}Stream", operation.id)
}

fn arguments(operation: &OperationSchemaSet, typed: bool) -> String {
    let mut args = Vec::new();
    if let Some(params) = &operation.params {
        let marker = if params_optional(operation) && operation.payload.is_none() { "?" } else { "" };
        args.push(if typed {
            format!("params{marker}: {params}")
        } else {
            "params".to_string()
        });
    }
    if let Some(payload) = &operation.payload {
        args.push(if typed {
            format!("payload: {}", payload.schema)
        } else {
            "payload".to_string()
        });
    }
    args.join(", ")
}

fn error_channel(kind: OutputKind, errors: impl IntoIterator<Item = String>) -> String {
    let mut union: IndexSet<String> = errors.into_iter().collect();
    union.insert("HttpClientError.HttpClientError".to_string());
    if kind == OutputKind::Schema {
        union.insert("ParseResult.ParseError".to_string());
    }
    union.into_iter().collect::<Vec<_>>().join(" | ")
}

fn method_doc(operation: &OperationSchemaSet) -> String {
    let mut text = operation.description.clone().unwrap_or_default();
    if operation.deprecated {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str("@deprecated");
    }
    jsdoc(Some(&text), "  ")
}

fn interface_members(operation: &OperationSchemaSet, kind: OutputKind) -> Vec<String> {
    let doc = method_doc(operation);
    let args = arguments(operation, true);
    let mut members = Vec::new();

    if has_plain_method(operation) {
        let mut success: IndexSet<String> = operation.success.values().cloned().collect();
        if !operation.voids.is_empty() || success.is_empty() {
            success.insert("void".to_string());
        }
        let errors = operation
            .errors
            .values()
            .chain(operation.default_schema.iter())
            .cloned();
        members.push(format!(
            "{doc}  readonly {}: ({args}) => Effect.Effect<{}, {}>",
            operation.id,
            success.into_iter().collect::<Vec<_>>().join(" | "),
            error_channel(kind, errors)
        ));
    }
    if let Some(event) = &operation.stream_event {
        members.push(format!(
            "{doc}  readonly {}: ({args}) => Stream.Stream<{event}, {}>",
            stream_method_name(operation),
            error_channel(kind, [])
        ));
    }
    members
}

/// Pipeline steps that turn the request into what is sent.
fn request_steps(operation: &OperationSchemaSet) -> Vec<String> {
    let optional = params_optional(operation);
    let entries = |location: ParameterLocation| -> Vec<String> {
        operation
            .parameters
            .iter()
            .filter(|p| p.location == location)
            .map(|p| format!("{}: {}", quote_if_needed(&p.name), param_access(&p.name, optional)))
            .collect()
    };

    let mut steps = Vec::new();
    let query = entries(ParameterLocation::Query);
    if !query.is_empty() {
        steps.push(format!(
            "HttpClientRequest.setUrlParams(compact({{ {} }}))",
            query.join(", ")
        ));
    }
    let headers = entries(ParameterLocation::Header);
    if !headers.is_empty() {
        steps.push(format!(
            "HttpClientRequest.setHeaders(compact({{ {} }}))",
            headers.join(", ")
        ));
    }
    if let Some(payload) = &operation.payload {
        steps.push(
            match payload.kind {
                PayloadKind::Json => "HttpClientRequest.bodyUnsafeJson(payload)",
                PayloadKind::FormUrlEncoded => "HttpClientRequest.bodyUrlParams(compact(payload))",
                PayloadKind::Multipart => "HttpClientRequest.bodyFormData(toFormData(payload))",
            }
            .to_string(),
        );
    }
    steps
}

fn status_cases(operation: &OperationSchemaSet, kind: OutputKind) -> Vec<String> {
    let schema = kind == OutputKind::Schema;
    let mut cases = Vec::new();
    for response in &operation.responses {
        let key = response.status.to_ascii_lowercase();
        let handler = match &response.class {
            ResponseClass::Success { bucket, schema: name } => {
                let decode = if schema {
                    format!("decodeSuccess({name})")
                } else {
                    format!("decodeSuccess<{name}>()")
                };
                cases.push(format!("\"{}\": {decode}", bucket.to_ascii_lowercase()));
                continue;
            }
            ResponseClass::ErrorTagged { error, body } if schema => {
                format!("decodeTaggedError({body}, (cause) => new {error}({{ cause }}))")
            }
            ResponseClass::ErrorTagged { error, body } => {
                format!("decodeTaggedError<{body}, {error}>((cause) => ({{ _tag: \"{error}\", cause }}))")
            }
            ResponseClass::ErrorPlain { .. } if key == "default" => continue,
            ResponseClass::ErrorPlain { schema: name } if schema => format!("decodeError({name})"),
            ResponseClass::ErrorPlain { schema: name } => format!("decodeError<{name}>()"),
            ResponseClass::Void => "() => Effect.void".to_string(),
            ResponseClass::Ignored => continue,
        };
        cases.push(format!("\"{key}\": {handler}"));
    }
    let fallback = match &operation.default_schema {
        Some(name) if schema => format!("decodeError({name})"),
        Some(name) => format!("decodeError<{name}>()"),
        None => "unexpectedStatus".to_string(),
    };
    cases.push(format!("orElse: {fallback}"));
    cases
}

fn implementation_members(operation: &OperationSchemaSet, kind: OutputKind) -> Vec<String> {
    let args = arguments(operation, false);
    let request = format!(
        "HttpClientRequest.make(\"{}\")({})",
        operation.method,
        url_expr(operation)
    );
    let mut members = Vec::new();

    if has_plain_method(operation) {
        let mut steps = request_steps(operation);
        steps.push("httpClient.execute".to_string());
        let cases = status_cases(operation, kind)
            .into_iter()
            .map(|case| format!("          {case}"))
            .collect::<Vec<_>>()
            .join(",\n");
        steps.push(format!(
            "Effect.flatMap(\n        HttpClientResponse.matchStatus({{\n{cases}\n        }})\n      )"
        ));
        steps.push("Effect.scoped".to_string());
        members.push(format!(
            "  {}: ({args}) =>\n    {request}.pipe(\n      {}\n    )",
            operation.id,
            steps.join(",\n      ")
        ));
    }
    if let Some(event) = &operation.stream_event {
        let decode = if kind == OutputKind::Schema {
            format!("Stream.mapEffect(Schema.decode(Schema.parseJson({event})))")
        } else {
            format!("Stream.map((data) => JSON.parse(data) as {event})")
        };
        let mut steps = request_steps(operation);
        steps.push("HttpClientRequest.accept(\"text/event-stream\")".to_string());
        steps.push("httpClient.execute".to_string());
        steps.push(format!(
            "Effect.map((response) =>\n        response.stream.pipe(\n          Stream.decodeText(),\n          Stream.splitLines,\n          Stream.filter((line) => line.startsWith(\"data:\")),\n          Stream.map((line) => line.slice(5).trim()),\n          {decode}\n        )\n      )"
        ));
        steps.push("Stream.unwrapScoped".to_string());
        members.push(format!(
            "  {}: ({args}) =>\n    {request}.pipe(\n      {}\n    )",
            stream_method_name(operation),
            steps.join(",\n      ")
        ));
    }
    members
}

/// Render the helpers, interface and constructor for one tag's operations.
pub fn render_client(namespace: &str, operations: &[&OperationSchemaSet], kind: OutputKind) -> String {
    let interface = format!("{namespace}Client");
    let helpers = render_helpers(&Helper::scan(operations), kind);

    let members: Vec<String> = operations
        .iter()
        .flat_map(|operation| interface_members(operation, kind))
        .collect();
    let implementations: Vec<String> = operations
        .iter()
        .flat_map(|operation| implementation_members(operation, kind))
        .collect();

    let mut output = String::new();
    if !helpers.is_empty() {
        output.push_str(&helpers);
        output.push('\n');
    }
    output.push_str(&format!("export interface {interface} {{\n{}\n}}\n\n", members.join("\n")));
    output.push_str(&format!(
        "export const make{interface} = (httpClient: HttpClient.HttpClient): {interface} => ({{\n{}\n}})\n",
        implementations.join(",\n\n")
    ));
    output
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::openapi::operations::{ClassifiedResponse, ParameterInfo, Payload};
    use crate::openapi::spec::HttpMethod;
    use indexmap::IndexMap;

    fn operation() -> OperationSchemaSet {
        OperationSchemaSet {
            id: "getPet".into(),
            type_prefix: "GetPet".into(),
            method: HttpMethod::Get,
            path: "/pets/{petId}".into(),
            tags: vec!["pets".into()],
            description: Some("Fetch one pet".into()),
            deprecated: false,
            parameters: vec![
                ParameterInfo {
                    name: "petId".into(),
                    location: ParameterLocation::Path,
                    required: true,
                },
                ParameterInfo {
                    name: "X-Trace-Id".into(),
                    location: ParameterLocation::Header,
                    required: false,
                },
            ],
            params: Some("GetPetParams".into()),
            payload: None,
            success: IndexMap::from([("2xx".to_string(), "Pet".to_string())]),
            errors: IndexMap::from([("404".to_string(), "GetPet404".to_string())]),
            voids: vec![],
            default_schema: None,
            stream_event: None,
            responses: vec![
                ClassifiedResponse {
                    status: "200".into(),
                    class: ResponseClass::Success {
                        bucket: "2xx".into(),
                        schema: "Pet".into(),
                    },
                },
                ClassifiedResponse {
                    status: "404".into(),
                    class: ResponseClass::ErrorTagged {
                        error: "GetPet404".into(),
                        body: "GetPet404Body".into(),
                    },
                },
                ClassifiedResponse {
                    status: "401".into(),
                    class: ResponseClass::Ignored,
                },
            ],
        }
    }

    #[test]
    fn test_parse_path_template() {
        assert_eq!(
            parse_path_template("/pets/{petId}/photos"),
            vec![
                UrlPart::Static("/pets/".into()),
                UrlPart::Param("petId".into()),
                UrlPart::Static("/photos".into()),
            ]
        );
        assert_eq!(parse_path_template("/{a}{b}").len(), 3);
    }

    #[test]
    fn test_schema_client() {
        let op = operation();
        let output = render_client("Pets", &[&op], OutputKind::Schema);

        assert!(output.contains("export interface PetsClient {"));
        assert!(output.contains("/** Fetch one pet */"));
        assert!(output.contains(
            "readonly getPet: (params: GetPetParams) => Effect.Effect<Pet, GetPet404 | HttpClientError.HttpClientError | ParseResult.ParseError>"
        ));
        assert!(output.contains("export const makePetsClient = (httpClient: HttpClient.HttpClient): PetsClient => ({"));
        assert!(output.contains("HttpClientRequest.make(\"GET\")(`/pets/${encodeURIComponent(String(params.petId))}`)"));
        assert!(output.contains("HttpClientRequest.setHeaders(compact({ \"X-Trace-Id\": params[\"X-Trace-Id\"] }))"));
        assert!(output.contains("\"2xx\": decodeSuccess(Pet)"));
        assert!(output.contains("\"404\": decodeTaggedError(GetPet404Body, (cause) => new GetPet404({ cause }))"));
        assert!(!output.contains("\"401\""));
        assert!(output.contains("orElse: unexpectedStatus"));

        assert!(output.contains("const decodeTaggedError ="));
        assert!(!output.contains("const decodeError ="));
        assert!(!output.contains("toFormData"));
    }

    #[test]
    fn test_type_only_client() {
        let op = operation();
        let output = render_client("Pets", &[&op], OutputKind::TypeOnly);
        assert!(output.contains("Effect.Effect<Pet, GetPet404 | HttpClientError.HttpClientError>"));
        assert!(output.contains("\"2xx\": decodeSuccess<Pet>()"));
        assert!(output.contains(
            "decodeTaggedError<GetPet404Body, GetPet404>((cause) => ({ _tag: \"GetPet404\", cause }))"
        ));
        assert!(!output.contains("Schema."));
    }

    #[test]
    fn test_void_default_and_payload() {
        let mut op = operation();
        op.id = "updatePet".into();
        op.method = HttpMethod::Put;
        op.deprecated = true;
        op.payload = Some(Payload {
            schema: "UpdatePetRequest".into(),
            kind: PayloadKind::Multipart,
            required: true,
        });
        op.success.clear();
        op.errors.clear();
        op.voids = vec!["204".into()];
        op.default_schema = Some("UpdatePetDefault".into());
        op.responses = vec![
            ClassifiedResponse {
                status: "204".into(),
                class: ResponseClass::Void,
            },
            ClassifiedResponse {
                status: "default".into(),
                class: ResponseClass::ErrorPlain {
                    schema: "UpdatePetDefault".into(),
                },
            },
        ];
        let output = render_client("Pets", &[&op], OutputKind::Schema);

        assert!(output.contains(
            "readonly updatePet: (params: GetPetParams, payload: UpdatePetRequest) => Effect.Effect<void, UpdatePetDefault | HttpClientError.HttpClientError | ParseResult.ParseError>"
        ));
        assert!(output.contains("@deprecated"));
        assert!(output.contains("HttpClientRequest.make(\"PUT\")"));
        assert!(output.contains("HttpClientRequest.bodyFormData(toFormData(payload))"));
        assert!(output.contains("\"204\": () => Effect.void"));
        assert!(output.contains("orElse: decodeError(UpdatePetDefault)"));
        assert!(!output.contains("\"default\""));
        assert!(!output.contains("const unexpectedStatus"));
    }

    #[test]
    fn test_optional_params_argument() {
        let mut op = operation();
        op.path = "/pets".into();
        op.parameters = vec![ParameterInfo {
            name: "limit".into(),
            location: ParameterLocation::Query,
            required: false,
        }];
        let output = render_client("Pets", &[&op], OutputKind::Schema);
        assert!(output.contains("readonly getPet: (params?: GetPetParams) =>"));
        assert!(output.contains("HttpClientRequest.setUrlParams(compact({ limit: params?.limit }))"));
        assert!(output.contains("`/pets`"));
    }

    #[test]
    fn test_stream_method() {
        let mut op = operation();
        op.success.clear();
        op.responses.clear();
        op.errors.clear();
        op.stream_event = Some("GetPetEvent".into());
        let output = render_client("Pets", &[&op], OutputKind::Schema);

        assert!(output.contains("readonly getPetStream: (params: GetPetParams) => Stream.Stream<GetPetEvent,"));
        assert!(!output.contains("readonly getPet:"));
        assert!(output.contains("Stream.mapEffect(Schema.decode(Schema.parseJson(GetPetEvent)))"));
        assert!(output.contains("Stream.unwrapScoped"));
        assert!(output.contains("HttpClientRequest.accept(\"text/event-stream\")"));
        assert!(client_imports(OutputKind::Schema, true).contains("effect/Stream"));
        assert!(!client_imports(OutputKind::TypeOnly, false).contains("ParseResult"));
    }
}
