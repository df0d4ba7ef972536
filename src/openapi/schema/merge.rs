//! `allOf` merging and `anyOf`/`oneOf` null filtering.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use super::node::{Constraints, NodeKind, ObjectNode, PrimitiveKind, SchemaNode, normalize};
use super::resolve::resolve_ref;

/// Nested `$ref`/`allOf` depth at which merging stops following members.
const MAX_MERGE_DEPTH: usize = 32;

#[derive(Debug, Default)]
struct MergeAccumulator {
    properties: IndexMap<String, SchemaNode>,
    required: Vec<String>,
    primitive: Option<(PrimitiveKind, Constraints, Option<String>)>,
    other: Option<NodeKind>,
    saw_object: bool,
    description: Option<String>,
    default: Option<Value>,
}

impl MergeAccumulator {
    fn absorb(&mut self, member: &SchemaNode, context: Option<&Value>, depth: usize) {
        if depth > MAX_MERGE_DEPTH {
            warn!(depth, "allOf nesting too deep, ignoring remaining members");
            return;
        }

        if member.description.is_some() {
            self.description.clone_from(&member.description);
        }
        if member.default.is_some() {
            self.default.clone_from(&member.default);
        }

        match &member.kind {
            NodeKind::Ref(pointer) => {
                if let Some(target) = context.and_then(|ctx| resolve_ref(pointer, ctx)) {
                    self.absorb(&normalize(target), context, depth + 1);
                } else {
                    warn!(pointer = %pointer, "Dropping unresolvable allOf member.");
                }
            }
            NodeKind::AllOf(members) => {
                for nested in members {
                    self.absorb(nested, context, depth + 1);
                }
            }
            NodeKind::Object(object) => {
                self.saw_object = true;
                self.required.extend(object.required.iter().cloned());
                for (key, schema) in &object.properties {
                    self.properties.insert(key.clone(), schema.clone());
                }
            }
            NodeKind::Dictionary(_) => self.saw_object = true,
            NodeKind::Any => {}
            NodeKind::Primitive {
                kind,
                constraints,
                format,
            } => {
                warn!(?kind, "allOf member is not an object, merging best-effort");
                match &mut self.primitive {
                    Some((current_kind, current_constraints, current_format)) => {
                        *current_kind = *kind;
                        current_constraints.overlay(constraints);
                        if format.is_some() {
                            current_format.clone_from(format);
                        }
                    }
                    None => self.primitive = Some((*kind, constraints.clone(), format.clone())),
                }
            }
            other => {
                warn!("allOf member is not an object, merging best-effort");
                self.other = Some(other.clone());
            }
        }
    }

    fn into_node(self) -> SchemaNode {
        let kind = if !self.properties.is_empty() {
            NodeKind::Object(ObjectNode {
                properties: self.properties,
                required: self.required,
            })
        } else if let Some(other) = self.other {
            other
        } else if let Some((kind, constraints, format)) = self.primitive {
            NodeKind::Primitive {
                kind,
                constraints,
                format,
            }
        } else if self.saw_object {
            NodeKind::Dictionary(None)
        } else {
            NodeKind::Any
        };

        let mut node = SchemaNode::new(kind);
        node.description = self.description;
        node.default = self.default;
        node
    }
}

/// Fold `allOf` members left to right into one node.
///
/// `required` lists are concatenated, `properties` are shallow-merged with later
/// members winning, and scalar constraints are taken from the last member that
/// defines them. `$ref` and nested `allOf` members are flattened first.
pub fn merge_all_of(members: &[SchemaNode], context: Option<&Value>) -> SchemaNode {
    let mut acc = MergeAccumulator::default();
    for member in members {
        acc.absorb(member, context, 0);
    }
    acc.into_node()
}

/// Remove `null` members from a union and fold them into the nullable flag.
///
/// One survivor is returned as-is, several stay an `AnyOf`, none yields the null type.
pub fn filter_nullable(members: &[SchemaNode]) -> SchemaNode {
    let had_null = members.iter().any(SchemaNode::is_null);
    let mut rest: Vec<SchemaNode> = members.iter().filter(|m| !m.is_null()).cloned().collect();

    match rest.len() {
        0 => SchemaNode::null(),
        1 => rest.remove(0).with_nullable(had_null),
        _ => SchemaNode::new(NodeKind::AnyOf(rest)).with_nullable(had_null),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn merged_object(fragment: Value, context: Option<&Value>) -> ObjectNode {
        let NodeKind::AllOf(members) = normalize(&fragment).kind else {
            panic!("expected allOf");
        };
        match merge_all_of(&members, context).kind {
            NodeKind::Object(object) => object,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_required_union_is_order_independent() {
        let ab = merged_object(
            json!({ "allOf": [
                { "type": "object", "required": ["a"], "properties": { "a": { "type": "string" } } },
                { "type": "object", "required": ["b"], "properties": { "b": { "type": "string" } } }
            ]}),
            None,
        );
        let ba = merged_object(
            json!({ "allOf": [
                { "type": "object", "required": ["b"], "properties": { "b": { "type": "string" } } },
                { "type": "object", "required": ["a"], "properties": { "a": { "type": "string" } } }
            ]}),
            None,
        );
        for object in [ab, ba] {
            assert!(object.is_required("a"));
            assert!(object.is_required("b"));
        }
    }

    #[test]
    fn test_bare_required_members_merge() {
        let object = merged_object(
            json!({ "allOf": [
                { "type": "object", "properties": { "a": { "type": "string" }, "b": { "type": "string" } } },
                { "required": ["a"] },
                { "required": ["b"] }
            ]}),
            None,
        );
        assert!(object.is_required("a"));
        assert!(object.is_required("b"));
    }

    #[test]
    fn test_later_members_override_properties() {
        let object = merged_object(
            json!({ "allOf": [
                { "type": "object", "properties": { "a": { "type": "string" } } },
                { "type": "object", "properties": { "a": { "type": "integer" } } }
            ]}),
            None,
        );
        assert!(matches!(
            object.properties["a"].kind,
            NodeKind::Primitive { kind: PrimitiveKind::Integer, .. }
        ));
    }

    #[test]
    fn test_follows_refs_and_nested_all_of() {
        let context = json!({
            "components": { "schemas": {
                "Base": { "type": "object", "required": ["id"], "properties": { "id": { "type": "string" } } },
                "Named": { "allOf": [
                    { "$ref": "#/components/schemas/Base" },
                    { "type": "object", "properties": { "name": { "type": "string" } } }
                ]}
            }}
        });
        let object = merged_object(
            json!({ "allOf": [
                { "$ref": "#/components/schemas/Named" },
                { "type": "object", "properties": { "age": { "type": "integer" } } }
            ]}),
            Some(&context),
        );
        let keys: Vec<_> = object.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name", "age"]);
        assert!(object.is_required("id"));
    }

    #[test]
    fn test_non_object_members_merge_best_effort() {
        let NodeKind::AllOf(members) =
            normalize(&json!({ "allOf": [
                { "type": "string", "minLength": 1 },
                { "type": "string", "maxLength": 5, "format": "email" }
            ]}))
            .kind
        else {
            panic!("expected allOf");
        };
        let NodeKind::Primitive { kind, constraints, format } = merge_all_of(&members, None).kind else {
            panic!("expected primitive");
        };
        assert_eq!(kind, PrimitiveKind::String);
        assert_eq!(constraints.min_length, Some(1));
        assert_eq!(constraints.max_length, Some(5));
        assert_eq!(format.as_deref(), Some("email"));
    }

    #[test]
    fn test_filter_nullable_single_survivor() {
        let members = [normalize(&json!({ "type": "string" })), normalize(&json!({ "type": "null" }))];
        let node = filter_nullable(&members);
        assert!(node.nullable);
        assert!(matches!(node.kind, NodeKind::Primitive { kind: PrimitiveKind::String, .. }));
    }

    #[test]
    fn test_filter_nullable_many_survivors() {
        let members = [
            normalize(&json!({ "type": "string" })),
            normalize(&json!({ "type": "null" })),
            normalize(&json!({ "type": "integer" })),
        ];
        let node = filter_nullable(&members);
        assert!(node.nullable);
        let NodeKind::AnyOf(rest) = node.kind else {
            panic!("expected union");
        };
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_filter_nullable_all_null() {
        let members = [normalize(&json!({ "type": "null" }))];
        assert!(filter_nullable(&members).is_null());
    }

    #[test]
    fn test_filter_nullable_without_null_member() {
        let members = [normalize(&json!({ "type": "string" }))];
        assert!(!filter_nullable(&members).nullable);
    }
}
