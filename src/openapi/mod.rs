//! OpenAPI to Effect TypeScript code generator.
//!
//! The pipeline is:
//! 1. Load: JSON/YAML text -> OpenAPI 3 document (Swagger 2.0 is converted)
//! 2. Walk: operations -> declarations in a [`schema::SchemaCompiler`]
//! 3. Partition: declarations + operations -> per-tag modules and `_common`
//! 4. Barrel: `index.ts` re-exporting every module with an aggregate client

mod client;
mod convert;
pub mod operations;
pub mod partition;
pub mod schema;
pub mod spec;
mod utils;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use operations::walk_operations;
use partition::{COMMON_STEM, GENERATED_BANNER, INDEX_STEM, ModuleStyle, Partition, partition};
pub use schema::OutputKind;
use schema::SchemaCompiler;
use spec::OpenApiSpec;
use utils::to_type_name;

/// Default suffix for relative import specifiers.
pub const DEFAULT_IMPORT_EXTENSION: &str = ".js";

/// Knobs for one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub output_kind: OutputKind,
    /// Emit structural structs instead of classes for named objects.
    pub prefer_struct: bool,
    /// Name of the aggregate client in `index.ts`.
    pub client_name: String,
    /// Suffix for relative imports; empty for none.
    pub import_extension: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            output_kind: OutputKind::Schema,
            prefer_struct: false,
            client_name: "Api".to_string(),
            import_extension: DEFAULT_IMPORT_EXTENSION.to_string(),
        }
    }
}

/// A generated source file, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedClient {
    /// `_common.ts` first when present, then tag modules, then `index.ts`.
    pub files: Vec<GeneratedFile>,
}

impl GeneratedClient {
    pub fn file(&self, path: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// Register every component schema so unreferenced-by-operations components
/// still get their own names first.
fn register_components(compiler: &mut SchemaCompiler, document: &Value) {
    let Some(schemas) = document.pointer("/components/schemas").and_then(Value::as_object) else {
        return;
    };
    for name in schemas.keys() {
        let pointer = format!("#/components/schemas/{}", name.replace('~', "~0").replace('/', "~1"));
        compiler.add_ref(&pointer, document);
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_ascii_lowercase().to_string() + chars.as_str()
    })
}

fn render_index(partition: &Partition, options: &GenerateOptions) -> String {
    let ext = &options.import_extension;
    let clients: Vec<_> = partition.tags.iter().filter(|m| !m.operations.is_empty()).collect();
    let mut output = format!("{GENERATED_BANNER}\n");

    if !clients.is_empty() {
        output.push_str("import type * as HttpClient from \"@effect/platform/HttpClient\"\n");
        for module in &clients {
            output.push_str(&format!(
                "import * as {} from \"./{}{ext}\"\n",
                module.namespace, module.file_stem
            ));
        }
        output.push('\n');
    }
    if partition.common.is_some() {
        output.push_str(&format!("export * from \"./{COMMON_STEM}{ext}\"\n"));
    }
    for module in &partition.tags {
        output.push_str(&format!(
            "export * as {} from \"./{}{ext}\"\n",
            module.namespace, module.file_stem
        ));
    }

    if !clients.is_empty() {
        let name = format!("{}Client", to_type_name(&options.client_name));
        let members: Vec<String> = clients
            .iter()
            .map(|m| format!("  readonly {}: {}.{}Client", lower_first(&m.namespace), m.namespace, m.namespace))
            .collect();
        let constructors: Vec<String> = clients
            .iter()
            .map(|m| format!("  {}: {}.make{}Client(httpClient)", lower_first(&m.namespace), m.namespace, m.namespace))
            .collect();
        output.push_str(&format!("\nexport interface {name} {{\n{}\n}}\n", members.join("\n")));
        output.push_str(&format!(
            "\nexport const make{name} = (httpClient: HttpClient.HttpClient): {name} => ({{\n{}\n}})\n",
            constructors.join(",\n")
        ));
    }
    output
}

/// Generate the client modules for an OpenAPI (or Swagger 2.0) document.
pub fn generate(text: &str, options: &GenerateOptions) -> Result<GeneratedClient> {
    let (document, spec) = OpenApiSpec::load(text)?;
    info!(
        title = spec.info.as_ref().and_then(|i| i.title.as_deref()).unwrap_or("untitled"),
        version = spec.info.as_ref().and_then(|i| i.version.as_deref()).unwrap_or("unknown"),
        openapi = spec.openapi.as_deref().unwrap_or("unknown"),
        paths = spec.paths.len(),
        "Loaded OpenAPI document"
    );

    let mut compiler = SchemaCompiler::new(options.prefer_struct);
    register_components(&mut compiler, &document);
    let operations = walk_operations(&spec, &document, &mut compiler)?;

    let style = ModuleStyle {
        kind: options.output_kind,
        import_extension: &options.import_extension,
    };
    let partition = partition(&mut compiler, operations, style);

    let index = render_index(&partition, options);
    let mut files: Vec<GeneratedFile> = partition
        .common
        .iter()
        .chain(&partition.tags)
        .map(|module| GeneratedFile {
            path: format!("{}.ts", module.file_stem),
            contents: module.source.clone(),
        })
        .collect();
    files.push(GeneratedFile {
        path: format!("{INDEX_STEM}.ts"),
        contents: index,
    });
    Ok(GeneratedClient { files })
}
