//! Rendering of declarations into TypeScript.
//!
//! This is the only place that knows target syntax. Every structured value
//! implements [`Render`], which takes the output kind and the set of names
//! already declared above the current point in the module.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::expr::{Check, Declaration, DeclarationKind, Field, FieldWrapper, SchemaExpr};
use crate::openapi::utils::{escape_js_string, quote_if_needed};

/// Which flavor of declarations to emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Effect Schema values with their derived types.
    #[default]
    Schema,
    /// Plain TypeScript types only.
    TypeOnly,
}

/// State a renderer needs besides the value itself.
#[derive(Debug)]
pub struct RenderContext<'a> {
    pub kind: OutputKind,
    defined: &'a HashSet<&'a str>,
}

impl RenderContext<'_> {
    /// References to names not declared yet must be deferred.
    fn is_declared(&self, name: &str) -> bool {
        self.defined.contains(name)
    }
}

/// Convert a structured value to TypeScript source.
pub trait Render {
    fn render(&self, cx: &RenderContext<'_>) -> String;
}

/// Render `order` top to bottom. Names in `imported` count as declared.
pub fn render_declarations(order: &[&Declaration], kind: OutputKind, imported: &BTreeSet<String>) -> String {
    let mut defined: HashSet<&str> = imported.iter().map(String::as_str).collect();
    let mut output = String::new();
    for declaration in order {
        let cx = RenderContext {
            kind,
            defined: &defined,
        };
        output.push_str(&declaration.render(&cx));
        output.push('\n');
        defined.insert(declaration.name.as_str());
    }
    output
}

// =============================================================================
// Literals
// =============================================================================

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", escape_js_string(s)),
        other => other.to_string(),
    }
}

pub fn jsdoc(description: Option<&str>, indent: &str) -> String {
    let Some(text) = description.map(str::trim).filter(|text| !text.is_empty()) else {
        return String::new();
    };
    let text = text.replace("*/", "*\\/");
    if text.contains('\n') {
        let mut output = format!("{indent}/**\n");
        for line in text.lines() {
            output.push_str(&format!("{indent} * {line}\n").replace(" * \n", " *\n"));
        }
        output.push_str(&format!("{indent} */\n"));
        output
    } else {
        format!("{indent}/** {text} */\n")
    }
}

fn pipe(base: String, steps: &[String]) -> String {
    if steps.is_empty() {
        base
    } else {
        format!("{base}.pipe({})", steps.join(", "))
    }
}

// =============================================================================
// Checks
// =============================================================================

impl Render for Check {
    fn render(&self, _cx: &RenderContext<'_>) -> String {
        match self {
            Self::Uuid => "Schema.pattern(/^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$/)".to_string(),
            Self::MinLength(n) => format!("Schema.minLength({n})"),
            Self::MaxLength(n) => format!("Schema.maxLength({n})"),
            Self::Pattern(pattern) => format!("Schema.pattern(new RegExp(\"{}\"))", escape_js_string(pattern)),
            Self::GreaterThan(n) => format!("Schema.greaterThan({n})"),
            Self::GreaterThanOrEqualTo(n) => format!("Schema.greaterThanOrEqualTo({n})"),
            Self::LessThan(n) => format!("Schema.lessThan({n})"),
            Self::LessThanOrEqualTo(n) => format!("Schema.lessThanOrEqualTo({n})"),
            Self::MaxItems(n) => format!("Schema.maxItems({n})"),
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

impl SchemaExpr {
    /// Split into a base schema and the steps piped onto it, so a brand can
    /// join the same chain.
    fn schema_parts(&self, cx: &RenderContext<'_>) -> (String, Vec<String>) {
        let render_checks = |checks: &[Check]| checks.iter().map(|c| c.render(cx)).collect::<Vec<_>>();
        match self {
            Self::String(checks) => match checks.split_first() {
                Some((Check::Uuid, rest)) => ("Schema.UUID".to_string(), render_checks(rest)),
                _ => ("Schema.String".to_string(), render_checks(checks)),
            },
            Self::Number(checks) => ("Schema.Number".to_string(), render_checks(checks)),
            Self::Int(checks) => ("Schema.Int".to_string(), render_checks(checks)),
            Self::Array {
                item,
                non_empty,
                checks,
            } => {
                let constructor = if *non_empty { "Schema.NonEmptyArray" } else { "Schema.Array" };
                (format!("{constructor}({})", item.render(cx)), render_checks(checks))
            }
            other => (other.render_schema(cx), Vec::new()),
        }
    }

    fn render_schema(&self, cx: &RenderContext<'_>) -> String {
        match self {
            Self::String(_) | Self::Number(_) | Self::Int(_) | Self::Array { .. } => {
                let (base, steps) = self.schema_parts(cx);
                pipe(base, &steps)
            }
            Self::Boolean => "Schema.Boolean".to_string(),
            Self::Null => "Schema.Null".to_string(),
            Self::Unknown => "Schema.Unknown".to_string(),
            Self::Never => "Schema.Never".to_string(),
            Self::Binary => "Schema.Uint8ArrayFromSelf".to_string(),
            Self::Literal(values) => {
                format!("Schema.Literal({})", values.iter().map(literal).collect::<Vec<_>>().join(", "))
            }
            Self::Ref(name) if cx.is_declared(name) => name.clone(),
            Self::Ref(name) => format!("Schema.suspend((): Schema.Schema<any> => {name})"),
            Self::Tuple { elements, rest } => {
                let elements = elements.iter().map(|e| e.render(cx)).collect::<Vec<_>>().join(", ");
                match rest {
                    Some(rest) => format!("Schema.Tuple([{elements}], {})", rest.render(cx)),
                    None => format!("Schema.Tuple({elements})"),
                }
            }
            Self::Record(values) => {
                format!("Schema.Record({{ key: Schema.String, value: {} }})", values.render(cx))
            }
            Self::Struct(fields) => {
                let fields = fields.iter().map(|f| f.render(cx)).collect::<Vec<_>>();
                if fields.is_empty() {
                    "Schema.Struct({})".to_string()
                } else {
                    format!("Schema.Struct({{ {} }})", fields.join(", "))
                }
            }
            Self::Union(members) => {
                format!("Schema.Union({})", members.iter().map(|m| m.render(cx)).collect::<Vec<_>>().join(", "))
            }
            Self::NullOr(inner) => format!("Schema.NullOr({})", inner.render(cx)),
        }
    }

    fn render_type(&self, cx: &RenderContext<'_>) -> String {
        match self {
            Self::String(_) => "string".to_string(),
            Self::Number(_) | Self::Int(_) => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Null => "null".to_string(),
            Self::Unknown => "unknown".to_string(),
            Self::Never => "never".to_string(),
            Self::Binary => "Uint8Array".to_string(),
            Self::Literal(values) => values.iter().map(literal).collect::<Vec<_>>().join(" | "),
            Self::Ref(name) => name.clone(),
            Self::Array { item, non_empty, .. } => {
                let item = item.render(cx);
                if *non_empty {
                    format!("readonly [{item}, ...Array<{item}>]")
                } else {
                    format!("ReadonlyArray<{item}>")
                }
            }
            Self::Tuple { elements, rest } => {
                let mut parts: Vec<String> = elements.iter().map(|e| e.render(cx)).collect();
                if let Some(rest) = rest {
                    parts.push(format!("...Array<{}>", rest.render(cx)));
                }
                format!("readonly [{}]", parts.join(", "))
            }
            Self::Record(values) => format!("{{ readonly [key: string]: {} }}", values.render(cx)),
            Self::Struct(fields) => {
                let fields = fields.iter().map(|f| f.render(cx)).collect::<Vec<_>>();
                if fields.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", fields.join("; "))
                }
            }
            Self::Union(members) => members.iter().map(|m| m.render(cx)).collect::<Vec<_>>().join(" | "),
            Self::NullOr(inner) => format!("{} | null", inner.render(cx)),
        }
    }
}

impl Render for SchemaExpr {
    fn render(&self, cx: &RenderContext<'_>) -> String {
        match cx.kind {
            OutputKind::Schema => self.render_schema(cx),
            OutputKind::TypeOnly => self.render_type(cx),
        }
    }
}

// =============================================================================
// Fields
// =============================================================================

impl Render for Field {
    fn render(&self, cx: &RenderContext<'_>) -> String {
        let key = quote_if_needed(&self.key);
        match cx.kind {
            OutputKind::Schema => {
                let value = match &self.wrapper {
                    FieldWrapper::Required => self.expr.render(cx),
                    FieldWrapper::NullDecodingDefault => format!(
                        "Schema.optional({}).pipe(Schema.withDecodingDefault(() => null))",
                        self.expr.render(cx)
                    ),
                    FieldWrapper::ConstructorDefault(value) => format!(
                        "Schema.propertySignature({}).pipe(Schema.withConstructorDefault(() => {} as const))",
                        self.expr.render(cx),
                        value
                    ),
                    FieldWrapper::OptionalNullable => {
                        let inner = match &self.expr {
                            SchemaExpr::NullOr(inner) => inner.render(cx),
                            other => other.render(cx),
                        };
                        format!("Schema.optionalWith({inner}, {{ nullable: true }})")
                    }
                    FieldWrapper::Optional => format!("Schema.optional({})", self.expr.render(cx)),
                };
                format!("{key}: {value}")
            }
            OutputKind::TypeOnly => match &self.wrapper {
                FieldWrapper::Required | FieldWrapper::NullDecodingDefault | FieldWrapper::ConstructorDefault(_) => {
                    format!("readonly {key}: {}", self.expr.render(cx))
                }
                FieldWrapper::OptionalNullable | FieldWrapper::Optional => {
                    format!("readonly {key}?: {} | undefined", self.expr.render(cx))
                }
            },
        }
    }
}

fn field_block(fields: &[Field], cx: &RenderContext<'_>, separator: &str) -> String {
    fields
        .iter()
        .map(|field| {
            format!(
                "{}  {}{separator}",
                jsdoc(field.description.as_deref(), "  "),
                field.render(cx)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Declarations
// =============================================================================

impl Declaration {
    fn render_schema(&self, cx: &RenderContext<'_>) -> String {
        let name = &self.name;
        let type_of = format!("export type {name} = typeof {name}.Type\n");
        match &self.kind {
            DeclarationKind::Class(fields) if self.is_error_variant => format!(
                "export class {name} extends Schema.TaggedError<{name}>()(\"{name}\", {{\n{}\n}}) {{}}\n",
                field_block(fields, cx, ",")
            ),
            DeclarationKind::Class(fields) => format!(
                "export class {name} extends Schema.Class<{name}>(\"{name}\")({{\n{}\n}}) {{}}\n",
                field_block(fields, cx, ",")
            ),
            DeclarationKind::Struct(fields) => format!(
                "export const {name} = Schema.Struct({{\n{}\n}})\n{type_of}",
                field_block(fields, cx, ",")
            ),
            DeclarationKind::Alias(expr) => format!("export const {name} = {}\n{type_of}", expr.render(cx)),
            DeclarationKind::Brand { base } => {
                let (base, mut steps) = base.schema_parts(cx);
                steps.push(format!("Schema.brand(\"{name}\")"));
                format!("export const {name} = {}\n{type_of}", pipe(base, &steps))
            }
            DeclarationKind::TaggedError { body } => {
                let body = SchemaExpr::Ref(body.clone()).render(cx);
                format!(
                    "export class {name} extends Schema.TaggedError<{name}>()(\"{name}\", {{\n  cause: {body}\n}}) {{}}\n"
                )
            }
        }
    }

    fn render_type(&self, cx: &RenderContext<'_>) -> String {
        let name = &self.name;
        let tag = format!("  readonly _tag: \"{name}\"\n");
        match &self.kind {
            DeclarationKind::Class(fields) | DeclarationKind::Struct(fields) => {
                let tag = if self.is_error_variant { tag.as_str() } else { "" };
                format!("export interface {name} {{\n{tag}{}\n}}\n", field_block(fields, cx, ""))
            }
            DeclarationKind::Alias(expr) => format!("export type {name} = {}\n", expr.render(cx)),
            DeclarationKind::Brand { base } => {
                format!("export type {name} = {} & Brand.Brand<\"{name}\">\n", base.render(cx))
            }
            DeclarationKind::TaggedError { body } => {
                format!("export interface {name} {{\n{tag}  readonly cause: {body}\n}}\n")
            }
        }
    }
}

impl Render for Declaration {
    fn render(&self, cx: &RenderContext<'_>) -> String {
        let doc = jsdoc(self.description.as_deref(), "");
        let body = match cx.kind {
            OutputKind::Schema => self.render_schema(cx),
            OutputKind::TypeOnly => self.render_type(cx),
        };
        format!("{doc}{body}")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(expr: &SchemaExpr, kind: OutputKind) -> String {
        let defined = HashSet::from(["Pet"]);
        expr.render(&RenderContext {
            kind,
            defined: &defined,
        })
    }

    fn render_one(declaration: &Declaration, kind: OutputKind) -> String {
        render_declarations(&[declaration], kind, &BTreeSet::new())
    }

    #[test]
    fn test_string_checks() {
        let expr = SchemaExpr::String(vec![
            Check::MinLength(3),
            Check::MaxLength(10),
            Check::Pattern("^[A-Z]+$".into()),
        ]);
        assert_eq!(
            render(&expr, OutputKind::Schema),
            "Schema.String.pipe(Schema.minLength(3), Schema.maxLength(10), Schema.pattern(new RegExp(\"^[A-Z]+$\")))"
        );
        assert_eq!(render(&expr, OutputKind::TypeOnly), "string");
    }

    #[test]
    fn test_numbers_render_without_trailing_zero() {
        let expr = SchemaExpr::Int(vec![Check::GreaterThanOrEqualTo(1.0), Check::LessThan(2.5)]);
        assert_eq!(
            render(&expr, OutputKind::Schema),
            "Schema.Int.pipe(Schema.greaterThanOrEqualTo(1), Schema.lessThan(2.5))"
        );
    }

    #[test]
    fn test_refs_are_lazy_until_declared() {
        assert_eq!(render(&SchemaExpr::Ref("Pet".into()), OutputKind::Schema), "Pet");
        assert_eq!(
            render(&SchemaExpr::Ref("Owner".into()), OutputKind::Schema),
            "Schema.suspend((): Schema.Schema<any> => Owner)"
        );
        assert_eq!(render(&SchemaExpr::Ref("Owner".into()), OutputKind::TypeOnly), "Owner");
    }

    #[test]
    fn test_collections() {
        let tags = SchemaExpr::Array {
            item: Box::new(SchemaExpr::String(vec![])),
            non_empty: true,
            checks: vec![Check::MaxItems(3)],
        };
        assert_eq!(
            render(&tags, OutputKind::Schema),
            "Schema.NonEmptyArray(Schema.String).pipe(Schema.maxItems(3))"
        );
        assert_eq!(render(&tags, OutputKind::TypeOnly), "readonly [string, ...Array<string>]");

        let tuple = SchemaExpr::Tuple {
            elements: vec![SchemaExpr::String(vec![]), SchemaExpr::Number(vec![])],
            rest: Some(Box::new(SchemaExpr::Boolean)),
        };
        assert_eq!(
            render(&tuple, OutputKind::Schema),
            "Schema.Tuple([Schema.String, Schema.Number], Schema.Boolean)"
        );
        assert_eq!(render(&tuple, OutputKind::TypeOnly), "readonly [string, number, ...Array<boolean>]");

        let record = SchemaExpr::Record(Box::new(SchemaExpr::Unknown));
        assert_eq!(
            render(&record, OutputKind::Schema),
            "Schema.Record({ key: Schema.String, value: Schema.Unknown })"
        );
    }

    #[test]
    fn test_literals_and_unions() {
        let status = SchemaExpr::Literal(vec![json!("available"), json!(2), json!(true)]);
        assert_eq!(render(&status, OutputKind::Schema), "Schema.Literal(\"available\", 2, true)");
        assert_eq!(render(&status, OutputKind::TypeOnly), "\"available\" | 2 | true");

        let union = SchemaExpr::Union(vec![SchemaExpr::Ref("Pet".into()), SchemaExpr::Boolean]).nullable(true);
        assert_eq!(render(&union, OutputKind::Schema), "Schema.NullOr(Schema.Union(Pet, Schema.Boolean))");
        assert_eq!(render(&union, OutputKind::TypeOnly), "Pet | boolean | null");
    }

    #[test]
    fn test_field_wrappers() {
        let field = |wrapper: FieldWrapper, expr: SchemaExpr| Field {
            key: "note".into(),
            expr,
            wrapper,
            description: None,
        };
        let nullable = SchemaExpr::String(vec![]).nullable(true);
        let defined = HashSet::new();
        let cx = RenderContext {
            kind: OutputKind::Schema,
            defined: &defined,
        };

        assert_eq!(
            field(FieldWrapper::NullDecodingDefault, nullable.clone()).render(&cx),
            "note: Schema.optional(Schema.NullOr(Schema.String)).pipe(Schema.withDecodingDefault(() => null))"
        );
        assert_eq!(
            field(FieldWrapper::ConstructorDefault(json!("n/a")), SchemaExpr::String(vec![])).render(&cx),
            "note: Schema.propertySignature(Schema.String).pipe(Schema.withConstructorDefault(() => \"n/a\" as const))"
        );
        assert_eq!(
            field(FieldWrapper::OptionalNullable, nullable.clone()).render(&cx),
            "note: Schema.optionalWith(Schema.String, { nullable: true })"
        );
        assert_eq!(
            field(FieldWrapper::Optional, SchemaExpr::String(vec![])).render(&cx),
            "note: Schema.optional(Schema.String)"
        );

        let types = RenderContext {
            kind: OutputKind::TypeOnly,
            defined: &defined,
        };
        assert_eq!(
            field(FieldWrapper::OptionalNullable, nullable).render(&types),
            "readonly note?: string | null | undefined"
        );
    }

    #[test]
    fn test_brand_joins_base_pipe() {
        let brand = Declaration::new(
            "OwnerId",
            DeclarationKind::Brand {
                base: SchemaExpr::String(vec![Check::Uuid, Check::MinLength(1)]),
            },
            None,
        );
        let output = render_one(&brand, OutputKind::Schema);
        assert!(output.contains(
            "export const OwnerId = Schema.UUID.pipe(Schema.minLength(1), Schema.brand(\"OwnerId\"))"
        ));
        assert!(output.contains("export type OwnerId = typeof OwnerId.Type"));
        assert_eq!(
            render_one(&brand, OutputKind::TypeOnly),
            "export type OwnerId = string & Brand.Brand<\"OwnerId\">\n\n"
        );
    }

    #[test]
    fn test_class_struct_and_errors() {
        let fields = vec![Field {
            key: "message".into(),
            expr: SchemaExpr::String(vec![]),
            wrapper: FieldWrapper::Required,
            description: Some("Human readable".into()),
        }];
        let mut error = Declaration::new("Error", DeclarationKind::Class(fields.clone()), Some("An error".into()));
        let output = render_one(&error, OutputKind::Schema);
        assert!(output.starts_with("/** An error */\nexport class Error extends Schema.Class<Error>(\"Error\")({"));
        assert!(output.contains("  /** Human readable */\n  message: Schema.String,"));

        error.is_error_variant = true;
        let output = render_one(&error, OutputKind::Schema);
        assert!(output.contains("export class Error extends Schema.TaggedError<Error>()(\"Error\", {"));
        let output = render_one(&error, OutputKind::TypeOnly);
        assert!(output.contains("export interface Error {\n  readonly _tag: \"Error\"\n"));

        let params = Declaration::new("ListPetsParams", DeclarationKind::Struct(fields), None);
        let output = render_one(&params, OutputKind::Schema);
        assert!(output.contains("export const ListPetsParams = Schema.Struct({"));
        assert!(output.contains("export type ListPetsParams = typeof ListPetsParams.Type"));

        let tagged = Declaration::new("GetPet404", DeclarationKind::TaggedError { body: "Error".into() }, None);
        let order = [&tagged];
        let output = render_declarations(&order, OutputKind::Schema, &BTreeSet::from(["Error".to_string()]));
        assert!(output.contains(
            "export class GetPet404 extends Schema.TaggedError<GetPet404>()(\"GetPet404\", {\n  cause: Error\n}) {}"
        ));
    }

    #[test]
    fn test_multiline_jsdoc() {
        assert_eq!(jsdoc(Some("first\nsecond"), ""), "/**\n * first\n * second\n */\n");
        assert_eq!(jsdoc(Some("  "), ""), "");
        assert_eq!(jsdoc(Some("ends */ early"), ""), "/** ends *\\/ early */\n");
    }
}
