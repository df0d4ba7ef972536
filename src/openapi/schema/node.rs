//! Closed schema representation and the normalizer that produces it.
//!
//! Raw JSON Schema fragments are duck-typed: any key may or may not be there.
//! `normalize` classifies a fragment exactly once into a [`SchemaNode`], so the
//! rest of the compiler only ever pattern-matches over [`NodeKind`].
//!
//! After normalization `type` is never an array and nullability is carried by
//! the `nullable` flag alone, whether the source used `nullable: true` or a
//! `["T", "null"]` type array.

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Scalar JSON kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl PrimitiveKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }
}

/// Validation keywords that survive into declarations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
}

impl Constraints {
    fn from_fragment(map: &Map<String, Value>) -> Self {
        let mut constraints = Self {
            min_length: map.get("minLength").and_then(Value::as_u64),
            max_length: map.get("maxLength").and_then(Value::as_u64),
            pattern: map.get("pattern").and_then(Value::as_str).map(str::to_string),
            minimum: map.get("minimum").and_then(Value::as_f64),
            maximum: map.get("maximum").and_then(Value::as_f64),
            exclusive_minimum: None,
            exclusive_maximum: None,
        };

        // OpenAPI 3.0 spells exclusivity as a boolean modifier of minimum/maximum.
        match map.get("exclusiveMinimum") {
            Some(Value::Bool(true)) => constraints.exclusive_minimum = constraints.minimum.take(),
            Some(value) => constraints.exclusive_minimum = value.as_f64(),
            None => {}
        }
        match map.get("exclusiveMaximum") {
            Some(Value::Bool(true)) => constraints.exclusive_maximum = constraints.maximum.take(),
            Some(value) => constraints.exclusive_maximum = value.as_f64(),
            None => {}
        }

        constraints
    }

    /// Copy every constraint `other` defines over the ones defined here.
    pub fn overlay(&mut self, other: &Self) {
        fn take<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }
        take(&mut self.min_length, other.min_length.as_ref());
        take(&mut self.max_length, other.max_length.as_ref());
        take(&mut self.pattern, other.pattern.as_ref());
        take(&mut self.minimum, other.minimum.as_ref());
        take(&mut self.maximum, other.maximum.as_ref());
        take(&mut self.exclusive_minimum, other.exclusive_minimum.as_ref());
        take(&mut self.exclusive_maximum, other.exclusive_maximum.as_ref());
    }
}

/// Element schema of an array or the rest of a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    /// `true` or absent: any JSON value.
    Any,
    /// `false`: no element is allowed.
    Never,
    Schema(Box<SchemaNode>),
}

/// Object with an explicit `properties` map. The map is only empty for bare
/// `required` fragments, which exist to be merged into an `allOf`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNode {
    pub properties: IndexMap<String, SchemaNode>,
    pub required: Vec<String>,
}

impl ObjectNode {
    pub fn is_required(&self, key: &str) -> bool {
        self.required.iter().any(|r| r == key)
    }
}

/// The fixed set of shapes a fragment can normalize to.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Accepts any JSON value (`true` schema or an unclassifiable fragment).
    Any,
    /// Accepts nothing (`false` schema).
    Never,
    Primitive {
        kind: PrimitiveKind,
        constraints: Constraints,
        format: Option<String>,
    },
    Enum(Vec<Value>),
    Const(Value),
    Ref(String),
    AllOf(Vec<SchemaNode>),
    /// `anyOf` and `oneOf` alike.
    AnyOf(Vec<SchemaNode>),
    Object(ObjectNode),
    /// String-keyed map; `None` values mean any JSON value.
    Dictionary(Option<Box<SchemaNode>>),
    Array {
        items: Items,
        min_items: Option<u64>,
        max_items: Option<u64>,
    },
    Tuple {
        prefix_items: Vec<SchemaNode>,
        rest: Items,
    },
}

/// A normalized schema fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub kind: NodeKind,
    pub nullable: bool,
    pub default: Option<Value>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl SchemaNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            nullable: false,
            default: None,
            title: None,
            description: None,
        }
    }

    pub fn null() -> Self {
        Self::new(NodeKind::Primitive {
            kind: PrimitiveKind::Null,
            constraints: Constraints::default(),
            format: None,
        })
    }

    /// Text for the generated doc comment: the description, else the title.
    pub fn doc(&self) -> Option<String> {
        self.description.clone().or_else(|| self.title.clone())
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable |= nullable;
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Primitive {
                kind: PrimitiveKind::Null,
                ..
            }
        )
    }

    pub fn as_ref_pointer(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Ref(pointer) => Some(pointer),
            _ => None,
        }
    }
}

/// Classify a raw fragment into a [`SchemaNode`]. `true` and anything that
/// is not a schema object accept every value.
pub fn normalize(fragment: &Value) -> SchemaNode {
    match fragment {
        Value::Bool(false) => SchemaNode::new(NodeKind::Never),
        Value::Object(map) => normalize_map(map),
        _ => SchemaNode::new(NodeKind::Any),
    }
}

fn normalize_map(map: &Map<String, Value>) -> SchemaNode {
    let (kind, nullable_from_kind) = classify(map);
    let legacy_nullable = map.get("nullable").and_then(Value::as_bool).unwrap_or(false);

    SchemaNode {
        kind,
        nullable: nullable_from_kind || legacy_nullable,
        default: map.get("default").cloned(),
        title: string_field(map, "title"),
        description: string_field(map, "description"),
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

/// First match wins: `$ref`, `const`, `enum`, `allOf`, `anyOf`/`oneOf`, `type`.
fn classify(map: &Map<String, Value>) -> (NodeKind, bool) {
    if let Some(pointer) = map.get("$ref").and_then(Value::as_str) {
        return (NodeKind::Ref(pointer.to_string()), false);
    }

    if let Some(value) = map.get("const") {
        return (NodeKind::Const(value.clone()), false);
    }

    if let Some(Value::Array(values)) = map.get("enum") {
        let has_null = values.iter().any(Value::is_null);
        let literals: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
        if literals.is_empty() {
            return (SchemaNode::null().kind, false);
        }
        return (NodeKind::Enum(literals), has_null);
    }

    if let Some(Value::Array(members)) = map.get("allOf") {
        return (NodeKind::AllOf(members.iter().map(normalize).collect()), false);
    }

    if let Some(Value::Array(members)) = map.get("anyOf").or_else(|| map.get("oneOf")) {
        return (NodeKind::AnyOf(members.iter().map(normalize).collect()), false);
    }

    match map.get("type") {
        Some(Value::String(name)) => (classify_type(name, map), false),
        Some(Value::Array(names)) => classify_type_array(names, map),
        _ => (classify_untyped(map), false),
    }
}

fn classify_type_array(names: &[Value], map: &Map<String, Value>) -> (NodeKind, bool) {
    let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
    let has_null = names.contains(&"null");
    let non_null: Vec<&str> = names.into_iter().filter(|n| *n != "null").collect();

    match non_null.as_slice() {
        [] => (SchemaNode::null().kind, false),
        [single] => (classify_type(single, map), has_null),
        many => {
            let members = many
                .iter()
                .map(|name| SchemaNode::new(classify_type(name, map)))
                .collect();
            (NodeKind::AnyOf(members), has_null)
        }
    }
}

fn classify_untyped(map: &Map<String, Value>) -> NodeKind {
    if map.contains_key("properties") || map.contains_key("additionalProperties") {
        classify_type("object", map)
    } else if map.contains_key("items") || map.contains_key("prefixItems") {
        classify_type("array", map)
    } else if map.contains_key("required") {
        // Bare `required` lists only make sense as allOf members; keep them for merging.
        NodeKind::Object(ObjectNode {
            properties: IndexMap::new(),
            required: required_keys(map),
        })
    } else {
        NodeKind::Any
    }
}

fn required_keys(map: &Map<String, Value>) -> Vec<String> {
    match map.get("required") {
        Some(Value::Array(keys)) => keys
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn classify_type(name: &str, map: &Map<String, Value>) -> NodeKind {
    match name {
        "object" => classify_object(map),
        "array" => classify_array(map),
        other => match PrimitiveKind::from_type_name(other) {
            Some(kind) => NodeKind::Primitive {
                kind,
                constraints: Constraints::from_fragment(map),
                format: string_field(map, "format"),
            },
            None => NodeKind::Any,
        },
    }
}

fn classify_object(map: &Map<String, Value>) -> NodeKind {
    match map.get("properties") {
        Some(Value::Object(properties)) if !properties.is_empty() => NodeKind::Object(ObjectNode {
            properties: properties
                .iter()
                .map(|(key, schema)| (key.clone(), normalize(schema)))
                .collect(),
            required: required_keys(map),
        }),
        _ => match map.get("additionalProperties") {
            Some(value @ Value::Object(_)) => {
                NodeKind::Dictionary(Some(Box::new(normalize(value))))
            }
            _ => NodeKind::Dictionary(None),
        },
    }
}

fn items_of(value: Option<&Value>) -> Items {
    match value {
        None | Some(Value::Bool(true)) => Items::Any,
        Some(Value::Bool(false)) => Items::Never,
        Some(schema) => Items::Schema(Box::new(normalize(schema))),
    }
}

fn classify_array(map: &Map<String, Value>) -> NodeKind {
    if let Some(Value::Array(prefix)) = map.get("prefixItems") {
        return NodeKind::Tuple {
            prefix_items: prefix.iter().map(normalize).collect(),
            rest: items_of(map.get("items")),
        };
    }

    // Draft-4 style positional `items` with `additionalItems` as the rest.
    if let Some(Value::Array(prefix)) = map.get("items") {
        return NodeKind::Tuple {
            prefix_items: prefix.iter().map(normalize).collect(),
            rest: items_of(map.get("additionalItems")),
        };
    }

    NodeKind::Array {
        items: items_of(map.get("items")),
        min_items: map.get("minItems").and_then(Value::as_u64),
        max_items: map.get("maxItems").and_then(Value::as_u64),
    }
}
