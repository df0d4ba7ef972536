//! Structured declarations produced by the compiler.
//!
//! Nothing in here knows target syntax; `emit` is the only place that turns
//! these values into text.

use std::collections::BTreeSet;

use serde_json::Value;

/// Refinement chained onto a base schema, in the order it is listed.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    Uuid,
    MinLength(u64),
    MaxLength(u64),
    Pattern(String),
    GreaterThan(f64),
    GreaterThanOrEqualTo(f64),
    LessThan(f64),
    LessThanOrEqualTo(f64),
    MaxItems(u64),
}

/// Target expression for a value shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaExpr {
    String(Vec<Check>),
    Number(Vec<Check>),
    Int(Vec<Check>),
    Boolean,
    Null,
    Unknown,
    Never,
    /// Opaque binary blob (`format: binary`).
    Binary,
    Literal(Vec<Value>),
    /// Reference to another named declaration.
    Ref(String),
    Array {
        item: Box<SchemaExpr>,
        non_empty: bool,
        checks: Vec<Check>,
    },
    Tuple {
        elements: Vec<SchemaExpr>,
        rest: Option<Box<SchemaExpr>>,
    },
    /// String-keyed dictionary of the given values.
    Record(Box<SchemaExpr>),
    /// Inline struct literal.
    Struct(Vec<Field>),
    Union(Vec<SchemaExpr>),
    NullOr(Box<SchemaExpr>),
}

impl SchemaExpr {
    /// Wrap in `NullOr` unless already nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        if !nullable || self.accepts_null() {
            self
        } else {
            Self::NullOr(Box::new(self))
        }
    }

    pub fn accepts_null(&self) -> bool {
        matches!(self, Self::Null | Self::NullOr(_))
    }

    /// Collect every declaration name this expression references.
    pub fn collect_refs(&self, refs: &mut BTreeSet<String>) {
        match self {
            Self::Ref(name) => {
                refs.insert(name.clone());
            }
            Self::Array { item, .. } | Self::Record(item) | Self::NullOr(item) => {
                item.collect_refs(refs);
            }
            Self::Tuple { elements, rest } => {
                for element in elements {
                    element.collect_refs(refs);
                }
                if let Some(rest) = rest {
                    rest.collect_refs(refs);
                }
            }
            Self::Struct(fields) => {
                for field in fields {
                    field.expr.collect_refs(refs);
                }
            }
            Self::Union(members) => {
                for member in members {
                    member.collect_refs(refs);
                }
            }
            Self::String(_)
            | Self::Number(_)
            | Self::Int(_)
            | Self::Boolean
            | Self::Null
            | Self::Unknown
            | Self::Never
            | Self::Binary
            | Self::Literal(_) => {}
        }
    }
}

/// How a property's presence, nullability and default are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldWrapper {
    /// Present; the expression itself says whether `null` is allowed.
    Required,
    /// Present and nullable, decoding to `null` when missing.
    NullDecodingDefault,
    /// Present, filled with the value when constructed without it.
    ConstructorDefault(Value),
    /// May be absent or `null`; both decode the same way.
    OptionalNullable,
    /// May be absent.
    Optional,
}

impl FieldWrapper {
    /// Decision table over required / nullable / default, first match wins.
    pub fn select(required: bool, nullable: bool, default: Option<&Value>) -> Self {
        match (required, nullable, default) {
            (true, true, Some(Value::Null)) => Self::NullDecodingDefault,
            (true, false, Some(value)) if !value.is_null() => Self::ConstructorDefault(value.clone()),
            (true, _, _) => Self::Required,
            (false, true, _) => Self::OptionalNullable,
            (false, false, _) => Self::Optional,
        }
    }
}

/// Struct property.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub expr: SchemaExpr,
    pub wrapper: FieldWrapper,
    pub description: Option<String>,
}

/// Shape of a top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationKind {
    /// Nominal class-style struct.
    Class(Vec<Field>),
    /// Structural struct.
    Struct(Vec<Field>),
    Alias(SchemaExpr),
    /// Nominal wrapper over a string or integer identifier.
    Brand { base: SchemaExpr },
    /// Error value discriminated by its own name, carrying a body struct.
    TaggedError { body: String },
}

impl DeclarationKind {
    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            Self::Class(fields) | Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    fn collect_refs(&self, refs: &mut BTreeSet<String>) {
        match self {
            Self::Class(fields) | Self::Struct(fields) => {
                for field in fields {
                    field.expr.collect_refs(refs);
                }
            }
            Self::Alias(expr) | Self::Brand { base: expr } => expr.collect_refs(refs),
            Self::TaggedError { body } => {
                refs.insert(body.clone());
            }
        }
    }
}

/// Named, emittable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    pub depends_on: BTreeSet<String>,
    pub is_shared: bool,
    pub is_error_variant: bool,
    pub body_struct_name: Option<String>,
    pub description: Option<String>,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: DeclarationKind, description: Option<String>) -> Self {
        let name = name.into();
        let mut depends_on = BTreeSet::new();
        kind.collect_refs(&mut depends_on);
        let body_struct_name = match &kind {
            DeclarationKind::TaggedError { body } => Some(body.clone()),
            _ => None,
        };
        Self {
            name,
            kind,
            depends_on,
            is_shared: false,
            is_error_variant: false,
            body_struct_name,
            description,
        }
    }

    pub fn is_brand(&self) -> bool {
        matches!(self.kind, DeclarationKind::Brand { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrapper_decision_table() {
        assert_eq!(
            FieldWrapper::select(true, true, Some(&Value::Null)),
            FieldWrapper::NullDecodingDefault
        );
        assert_eq!(FieldWrapper::select(true, true, None), FieldWrapper::Required);
        assert_eq!(
            FieldWrapper::select(true, false, Some(&json!(5))),
            FieldWrapper::ConstructorDefault(json!(5))
        );
        assert_eq!(FieldWrapper::select(true, false, None), FieldWrapper::Required);
        assert_eq!(
            FieldWrapper::select(false, true, Some(&json!("x"))),
            FieldWrapper::OptionalNullable
        );
        assert_eq!(FieldWrapper::select(false, false, Some(&json!(1))), FieldWrapper::Optional);
    }

    #[test]
    fn test_dependencies_follow_nested_refs() {
        let kind = DeclarationKind::Class(vec![
            Field {
                key: "owner".into(),
                expr: SchemaExpr::Ref("User".into()).nullable(true),
                wrapper: FieldWrapper::Required,
                description: None,
            },
            Field {
                key: "tags".into(),
                expr: SchemaExpr::Array {
                    item: Box::new(SchemaExpr::Union(vec![
                        SchemaExpr::Ref("Tag".into()),
                        SchemaExpr::String(vec![]),
                    ])),
                    non_empty: false,
                    checks: vec![],
                },
                wrapper: FieldWrapper::Optional,
                description: None,
            },
        ]);
        let decl = Declaration::new("Pet", kind, None);
        let deps: Vec<_> = decl.depends_on.iter().cloned().collect();
        assert_eq!(deps, vec!["Tag", "User"]);
    }

    #[test]
    fn test_tagged_error_records_body() {
        let decl = Declaration::new(
            "GetPet404",
            DeclarationKind::TaggedError { body: "Error".into() },
            None,
        );
        assert_eq!(decl.body_struct_name.as_deref(), Some("Error"));
        assert!(decl.depends_on.contains("Error"));
    }

    #[test]
    fn test_nullable_is_idempotent() {
        let expr = SchemaExpr::Boolean.nullable(true).nullable(true);
        assert_eq!(expr, SchemaExpr::NullOr(Box::new(SchemaExpr::Boolean)));
        assert_eq!(SchemaExpr::Null.nullable(true), SchemaExpr::Null);
    }
}
