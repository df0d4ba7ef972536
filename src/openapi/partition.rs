//! Module partitioning.
//!
//! Operations are grouped by primary tag. Each group's referenced names are
//! closed over the declaration graph; names reached from two or more groups
//! move to a shared `_common` module, which tag modules import and re-export
//! instead of redeclaring.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use indexmap::IndexMap;
use tracing::{debug, info};

use super::client::{client_imports, render_client};
use super::operations::{OperationSchemaSet, UNTAGGED_GROUP};
use super::schema::{OutputKind, SchemaCompiler};
use super::utils::{to_file_stem, to_type_name};

/// File stem of the shared module.
pub const COMMON_STEM: &str = "_common";

/// File stem of the barrel module.
pub const INDEX_STEM: &str = "index";

pub(crate) const GENERATED_BANNER: &str = "// Generated by effect-codegen. Do not edit.\n";

/// One emitted output module.
#[derive(Debug, Clone)]
pub struct TagModule {
    /// Tag the operations were grouped under.
    pub tag: String,
    /// PascalCase name used for the client interface and the barrel namespace.
    pub namespace: String,
    pub file_stem: String,
    pub source: String,
    /// Declarations emitted in this module.
    pub schema_names: BTreeSet<String>,
    pub operations: Vec<OperationSchemaSet>,
}

/// Partitioner output.
#[derive(Debug)]
pub struct Partition {
    pub common: Option<TagModule>,
    pub tags: Vec<TagModule>,
}

/// Settings that affect module text but not grouping.
#[derive(Debug, Clone, Copy)]
pub struct ModuleStyle<'a> {
    pub kind: OutputKind,
    /// Appended to relative import specifiers (`.js`, or empty).
    pub import_extension: &'a str,
}

fn group_by_tag(operations: Vec<OperationSchemaSet>) -> IndexMap<String, Vec<OperationSchemaSet>> {
    let mut groups: IndexMap<String, Vec<OperationSchemaSet>> = IndexMap::new();
    for operation in operations {
        groups
            .entry(operation.primary_tag().to_string())
            .or_default()
            .push(operation);
    }
    groups
}

/// Hands out file stems and namespaces, suffixing on collision.
#[derive(Debug)]
struct NameAllocator {
    stems: HashSet<String>,
    namespaces: HashSet<String>,
}

impl NameAllocator {
    fn new() -> Self {
        Self {
            stems: HashSet::from([COMMON_STEM.to_string(), INDEX_STEM.to_string()]),
            namespaces: HashSet::new(),
        }
    }

    fn allocate(&mut self, tag: &str) -> (String, String) {
        let base_stem = to_file_stem(tag);
        let base_namespace = to_type_name(tag);
        let mut suffix = 1;
        loop {
            let (stem, namespace) = if suffix == 1 {
                (base_stem.clone(), base_namespace.clone())
            } else {
                (format!("{base_stem}-{suffix}"), format!("{base_namespace}{suffix}"))
            };
            if !self.stems.contains(&stem) && !self.namespaces.contains(&namespace) {
                self.stems.insert(stem.clone());
                self.namespaces.insert(namespace.clone());
                return (stem, namespace);
            }
            suffix += 1;
        }
    }
}

fn has_brand(compiler: &SchemaCompiler, names: &BTreeSet<String>) -> bool {
    names
        .iter()
        .any(|name| compiler.declaration(name).is_some_and(|d| d.is_brand()))
}

fn schema_header(kind: OutputKind, brands: bool) -> String {
    match kind {
        OutputKind::Schema => "import * as Schema from \"effect/Schema\"\n".to_string(),
        OutputKind::TypeOnly if brands => "import type * as Brand from \"effect/Brand\"\n".to_string(),
        OutputKind::TypeOnly => String::new(),
    }
}

/// Import and re-export lines for the common names a tag module needs.
fn common_lines(names: &BTreeSet<String>, style: ModuleStyle<'_>) -> String {
    if names.is_empty() {
        return String::new();
    }
    let list = names.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    let from = format!("\"./{COMMON_STEM}{}\"", style.import_extension);
    let type_only = if style.kind == OutputKind::TypeOnly { "type " } else { "" };
    format!("import {type_only}{{ {list} }} from {from}\nexport {type_only}{{ {list} }} from {from}\n")
}

/// Split `operations` into per-tag modules plus an optional shared module.
pub fn partition(
    compiler: &mut SchemaCompiler,
    operations: Vec<OperationSchemaSet>,
    style: ModuleStyle<'_>,
) -> Partition {
    let mut allocator = NameAllocator::new();

    if operations.is_empty() {
        let schema_names: BTreeSet<String> = compiler.declarations().map(|d| d.name.clone()).collect();
        let (file_stem, namespace) = allocator.allocate(UNTAGGED_GROUP);
        let source = format!(
            "{GENERATED_BANNER}\n{}\n{}",
            schema_header(style.kind, has_brand(compiler, &schema_names)),
            compiler.generate(style.kind, None)
        );
        info!(declarations = schema_names.len(), "No operations, emitting a single module");
        return Partition {
            common: None,
            tags: vec![TagModule {
                tag: UNTAGGED_GROUP.to_string(),
                namespace,
                file_stem,
                source,
                schema_names,
                operations: Vec::new(),
            }],
        };
    }

    let groups = group_by_tag(operations);
    let closures: Vec<(BTreeSet<String>, BTreeSet<String>)> = groups
        .values()
        .map(|ops| {
            let roots: BTreeSet<String> = ops.iter().flat_map(OperationSchemaSet::schema_names).collect();
            let closure = compiler.closure(roots.iter().map(String::as_str));
            (roots, closure)
        })
        .collect();

    let mut usage: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, closure) in &closures {
        for name in closure {
            *usage.entry(name.as_str()).or_default() += 1;
        }
    }
    if groups.len() > 1 {
        let reused: BTreeSet<String> = usage
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(name, _)| name.to_string())
            .collect();
        compiler.mark_shared(&reused);
    }
    let common = compiler.shared_names();

    let common_module = (!common.is_empty()).then(|| TagModule {
        tag: COMMON_STEM.to_string(),
        namespace: String::new(),
        file_stem: COMMON_STEM.to_string(),
        source: format!(
            "{GENERATED_BANNER}\n{}\n{}",
            schema_header(style.kind, has_brand(compiler, &common)),
            compiler.generate(style.kind, Some(&common))
        ),
        schema_names: common.clone(),
        operations: Vec::new(),
    });

    let mut tags = Vec::new();
    for ((tag, operations), (roots, closure)) in groups.into_iter().zip(closures) {
        let (file_stem, namespace) = allocator.allocate(&tag);
        let imported: BTreeSet<String> = closure.intersection(&common).cloned().collect();
        let exclusive: BTreeSet<String> = closure.difference(&common).cloned().collect();
        let has_stream = operations.iter().any(|op| op.stream_event.is_some());
        let refs: Vec<&OperationSchemaSet> = operations.iter().collect();

        let mut source = format!(
            "{GENERATED_BANNER}\n{}{}{}\n",
            client_imports(style.kind, has_stream),
            schema_header(style.kind, has_brand(compiler, &exclusive)),
            common_lines(&imported, style)
        );
        let declarations = compiler.generate_with_imports(style.kind, Some(&roots), &imported);
        if !declarations.is_empty() {
            source.push_str(&declarations);
            source.push('\n');
        }
        source.push_str(&render_client(&namespace, &refs, style.kind));

        debug!(
            tag = %tag,
            operations = operations.len(),
            exclusive = exclusive.len(),
            imported = imported.len(),
            "Built tag module"
        );
        tags.push(TagModule {
            tag,
            namespace,
            file_stem,
            source,
            schema_names: exclusive,
            operations,
        });
    }

    info!(
        modules = tags.len(),
        common = common.len(),
        "Partitioned declarations into modules"
    );
    Partition {
        common: common_module,
        tags,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::openapi::operations::walk_operations;
    use crate::openapi::spec::OpenApiSpec;
    use serde_json::{Value, json};

    const STYLE: ModuleStyle<'static> = ModuleStyle {
        kind: OutputKind::Schema,
        import_extension: ".js",
    };

    fn run(document: &Value, style: ModuleStyle<'_>) -> Partition {
        let spec: OpenApiSpec = serde_json::from_value(document.clone()).unwrap();
        let mut compiler = SchemaCompiler::new(false);
        let operations = walk_operations(&spec, document, &mut compiler).unwrap();
        partition(&mut compiler, operations, style)
    }

    fn two_tag_document() -> Value {
        json!({
            "openapi": "3.1.0",
            "paths": {
                "/pets": { "get": {
                    "operationId": "listPets",
                    "tags": ["pets"],
                    "responses": {
                        "200": { "description": "ok", "content": { "application/json": { "schema": {
                            "type": "array", "items": { "$ref": "#/components/schemas/Pet" }
                        } } } },
                        "500": { "description": "boom", "content": { "application/json": { "schema": {
                            "$ref": "#/components/schemas/Error"
                        } } } }
                    }
                } },
                "/stores": { "get": {
                    "operationId": "listStores",
                    "tags": ["stores"],
                    "responses": {
                        "200": { "description": "ok", "content": { "application/json": { "schema": {
                            "$ref": "#/components/schemas/Store"
                        } } } },
                        "500": { "description": "boom", "content": { "application/json": { "schema": {
                            "$ref": "#/components/schemas/Error"
                        } } } }
                    }
                } }
            },
            "components": { "schemas": {
                "Pet": { "type": "object", "properties": { "name": { "type": "string" } } },
                "Store": { "type": "object", "properties": { "city": { "type": "string" } } },
                "Error": { "type": "object", "properties": { "message": { "type": "string" } } }
            } }
        })
    }

    #[test]
    fn test_shared_error_goes_to_common() {
        let partition = run(&two_tag_document(), STYLE);
        let common = partition.common.expect("common module");
        assert_eq!(common.schema_names, BTreeSet::from(["Error".to_string()]));
        assert!(common.source.contains("export class Error extends Schema.Class<Error>(\"Error\")"));

        let pets = &partition.tags[0];
        assert_eq!(pets.file_stem, "pets");
        assert_eq!(pets.namespace, "Pets");
        assert!(pets.source.contains("import { Error } from \"./_common.js\""));
        assert!(pets.source.contains("export { Error } from \"./_common.js\""));
        assert!(!pets.source.contains("export class Error "));
        assert!(pets.source.contains("export class ListPets500 extends Schema.TaggedError<ListPets500>()"));
        assert!(pets.schema_names.contains("Pet"));
        assert!(!pets.schema_names.contains("Store"));

        let stores = &partition.tags[1];
        assert!(stores.source.contains("export { Error } from \"./_common.js\""));
        assert!(!stores.source.contains("export class Pet "));
        assert!(stores.source.contains("export const makeStoresClient"));
    }

    #[test]
    fn test_single_tag_never_has_common() {
        let mut document = two_tag_document();
        document["paths"]["/stores"]["get"]["tags"] = json!(["pets"]);
        let partition = run(&document, STYLE);
        assert!(partition.common.is_none());
        assert_eq!(partition.tags.len(), 1);
        let pets = &partition.tags[0];
        assert!(pets.source.contains("export class Error extends"));
        assert!(!pets.source.contains("_common"));
        assert_eq!(pets.operations.len(), 2);
    }

    #[test]
    fn test_untagged_group_and_type_only_imports() {
        let mut document = two_tag_document();
        document["paths"]["/stores"]["get"]
            .as_object_mut()
            .unwrap()
            .remove("tags");
        let style = ModuleStyle {
            kind: OutputKind::TypeOnly,
            import_extension: "",
        };
        let partition = run(&document, style);
        let untagged = partition.tags.iter().find(|m| m.tag == UNTAGGED_GROUP).unwrap();
        assert_eq!(untagged.file_stem, "_untagged");
        assert_eq!(untagged.namespace, "Untagged");
        assert!(untagged.source.contains("import type { Error } from \"./_common\""));
        assert!(untagged.source.contains("export type { Error } from \"./_common\""));
        assert!(!untagged.source.contains("effect/Schema"));
    }

    #[test]
    fn test_no_operations_single_module() {
        let document = json!({
            "openapi": "3.1.0",
            "components": { "schemas": { "Pet": { "type": "object", "properties": { "id": { "type": "string" } } } } }
        });
        let spec: OpenApiSpec = serde_json::from_value(document.clone()).unwrap();
        let mut compiler = SchemaCompiler::new(false);
        compiler.add_ref("#/components/schemas/Pet", &document);
        let operations = walk_operations(&spec, &document, &mut compiler).unwrap();
        let partition = partition(
            &mut compiler,
            operations,
            ModuleStyle {
                kind: OutputKind::TypeOnly,
                import_extension: ".js",
            },
        );
        assert!(partition.common.is_none());
        let module = &partition.tags[0];
        assert_eq!(module.tag, UNTAGGED_GROUP);
        assert!(module.schema_names.contains("Pet"));
        assert!(module.schema_names.contains("PetId"));
        assert!(module.source.contains("import type * as Brand from \"effect/Brand\""));
        assert!(!module.source.contains("Client"));
    }

    #[test]
    fn test_name_allocator_suffixes_collisions() {
        let mut allocator = NameAllocator::new();
        assert_eq!(allocator.allocate("Pets"), ("pets".to_string(), "Pets".to_string()));
        assert_eq!(allocator.allocate("pets"), ("pets-2".to_string(), "Pets2".to_string()));
        assert_eq!(allocator.allocate("index").0, "index-2");
    }
}
