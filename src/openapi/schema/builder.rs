//! Declaration builder and the registration API.
//!
//! A [`SchemaCompiler`] is the per-run context: it owns the declaration graph,
//! the brand registry and the `$ref` memo. Nothing is global, so two runs never
//! share state.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use super::brand::{BrandRegistry, brand_name};
use super::emit::{OutputKind, render_declarations};
use super::expr::{Check, Declaration, DeclarationKind, Field, FieldWrapper, SchemaExpr};
use super::graph::DeclarationGraph;
use super::merge::{filter_nullable, merge_all_of};
use super::node::{Constraints, Items, NodeKind, ObjectNode, PrimitiveKind, SchemaNode, normalize};
use super::resolve::{ref_name, resolve_ref};
use crate::openapi::utils::to_type_name;

/// Upper bound on `$ref`/`allOf` hops when peeking at a schema's resolved shape.
const MAX_RESOLVE_HOPS: usize = 32;

/// Compiles schema fragments into named declarations.
#[derive(Debug, Default)]
pub struct SchemaCompiler {
    graph: DeclarationGraph,
    brands: BrandRegistry,
    ref_names: HashMap<String, String>,
    resolving: HashSet<String>,
    prefer_struct: bool,
}

impl SchemaCompiler {
    /// Create a compiler. `prefer_struct` picks structural structs over
    /// classes for objects registered without an explicit preference.
    pub fn new(prefer_struct: bool) -> Self {
        Self {
            prefer_struct,
            ..Self::default()
        }
    }

    /// Register `fragment` under `name` and return the name to reference it by.
    ///
    /// A fragment that is only a `$ref` returns the target's name instead of
    /// declaring an alias. Registering a name twice keeps the first body.
    pub fn add_schema(
        &mut self,
        name: &str,
        fragment: &Value,
        context: Option<&Value>,
        prefer_struct: Option<bool>,
    ) -> String {
        let node = normalize(fragment);
        if let Some(pointer) = direct_ref(&node)
            && let Some(target) = self.register_ref(pointer, context)
        {
            return target;
        }

        if self.graph.contains(name) {
            debug!(name, "Schema already registered, reusing it");
            return name.to_string();
        }

        let prefer_struct = prefer_struct.unwrap_or(self.prefer_struct);
        self.define_named(name, &node, context, prefer_struct);
        name.to_string()
    }

    /// Register the schema a pointer refers to under its derived name.
    pub fn add_ref(&mut self, pointer: &str, context: &Value) -> Option<String> {
        self.register_ref(pointer, Some(context))
    }

    /// Flag a registered declaration as an error variant.
    pub fn mark_as_error(&mut self, name: &str) -> bool {
        match self.graph.get_mut(name) {
            Some(declaration) => {
                declaration.is_error_variant = true;
                true
            }
            None => false,
        }
    }

    /// Declare a tagged error discriminated by its own name that wraps `body`.
    pub fn add_tagged_error(&mut self, name: &str, body: &str) -> String {
        let name = self.unique_name(name);
        self.graph.reserve(&name);
        self.graph.define(Declaration::new(
            &name,
            DeclarationKind::TaggedError {
                body: body.to_string(),
            },
            None,
        ));
        self.mark_as_error(&name);
        name
    }

    /// Whether `fragment` resolves to an object with explicit properties once
    /// `$ref`s are followed and `allOf`s are flattened.
    pub fn is_object_schema(&self, fragment: &Value, context: Option<&Value>) -> bool {
        let mut node = normalize(fragment);
        for _ in 0..MAX_RESOLVE_HOPS {
            let next = match &node.kind {
                NodeKind::Ref(pointer) => match context.and_then(|ctx| resolve_ref(pointer, ctx)) {
                    Some(target) => normalize(target).with_nullable(node.nullable),
                    None => return false,
                },
                NodeKind::AllOf(_) => flatten(&node, context),
                NodeKind::Object(object) => return !node.nullable && !object.properties.is_empty(),
                _ => return false,
            };
            node = next;
        }
        false
    }

    /// First free name of the form `base`, `base2`, `base3`, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.graph.contains(base) {
            return base.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}{suffix}");
            if !self.graph.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.graph.get(name)
    }

    /// Registered declarations in registration order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.graph.iter()
    }

    /// `roots` plus everything they depend on, transitively.
    pub fn closure<'a, I>(&self, roots: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.graph.closure(roots)
    }

    pub fn mark_shared(&mut self, names: &BTreeSet<String>) {
        for name in names {
            if let Some(declaration) = self.graph.get_mut(name) {
                declaration.is_shared = true;
            }
        }
    }

    /// Names flagged by [`Self::mark_shared`].
    pub fn shared_names(&self) -> BTreeSet<String> {
        self.graph
            .iter()
            .filter(|declaration| declaration.is_shared)
            .map(|declaration| declaration.name.clone())
            .collect()
    }

    /// Emit the dependency closure of `filter` (or everything) in dependency order.
    pub fn generate(&self, kind: OutputKind, filter: Option<&BTreeSet<String>>) -> String {
        self.generate_with_imports(kind, filter, &BTreeSet::new())
    }

    /// Like [`Self::generate`], but names in `imported` are provided by another
    /// module: they are neither emitted nor treated as forward references.
    pub fn generate_with_imports(
        &self,
        kind: OutputKind,
        filter: Option<&BTreeSet<String>>,
        imported: &BTreeSet<String>,
    ) -> String {
        let names: BTreeSet<String> = match filter {
            Some(roots) => self.graph.closure(roots.iter().map(String::as_str)),
            None => self.graph.iter().map(|d| d.name.clone()).collect(),
        };
        let names: BTreeSet<String> = names.difference(imported).cloned().collect();
        let order = self.graph.emission_order(&names);

        let cycles = self.graph.cycles();
        debug!(
            declarations = order.len(),
            cycles = cycles.len(),
            brands = self.brands.len(),
            ?kind,
            "Emitting declarations"
        );
        render_declarations(&order, kind, imported)
    }

    fn define_named(&mut self, name: &str, node: &SchemaNode, context: Option<&Value>, prefer_struct: bool) {
        self.graph.reserve(name);
        let node = flatten(node, context);
        let kind = match &node.kind {
            NodeKind::Object(object) if !node.nullable && !object.properties.is_empty() => {
                let fields = self.build_fields(name, object, context);
                if prefer_struct {
                    DeclarationKind::Struct(fields)
                } else {
                    DeclarationKind::Class(fields)
                }
            }
            _ => DeclarationKind::Alias(self.build_expr(name, &node, context)),
        };
        self.graph.define(Declaration::new(name, kind, node.doc()));
        debug!(name, "Registered declaration");
    }

    /// Resolve a pointer to a declaration name, registering the target on first use.
    ///
    /// The name is recorded before the body is built, so a cycle back to this
    /// pointer resolves to the name instead of recursing.
    fn register_ref(&mut self, pointer: &str, context: Option<&Value>) -> Option<String> {
        if let Some(name) = self.ref_names.get(pointer) {
            return Some(name.clone());
        }
        let target = resolve_ref(pointer, context?)?;
        if !self.resolving.insert(pointer.to_string()) {
            warn!(pointer, "Reference chain loops back on itself");
            return None;
        }

        let name = match target.get("$ref").and_then(Value::as_str) {
            Some(next) if !is_nullable_fragment(target) => self.register_ref(next, context),
            _ => {
                let name = self.unique_name(&ref_name(pointer));
                self.ref_names.insert(pointer.to_string(), name.clone());
                self.define_named(&name, &normalize(target), context, self.prefer_struct);
                Some(name)
            }
        };

        self.resolving.remove(pointer);
        if let Some(name) = &name {
            self.ref_names.insert(pointer.to_string(), name.clone());
        }
        name
    }

    fn build_fields(&mut self, scope: &str, object: &ObjectNode, context: Option<&Value>) -> Vec<Field> {
        let mut fields = Vec::with_capacity(object.properties.len());
        for (key, property) in &object.properties {
            if let Some(pointer) = property.as_ref_pointer()
                && self.register_ref(pointer, context).is_none()
            {
                warn!(parent = scope, field = %key, pointer, "Dropping field with unresolvable reference.");
                continue;
            }

            let property = simplify(property, context);
            let expr = match self.brand_expr(scope, key, &property) {
                Some(brand) => brand.nullable(property.nullable),
                None => self.build_expr(&format!("{scope}{}", to_type_name(key)), &property, context),
            };
            let wrapper = FieldWrapper::select(
                object.is_required(key),
                expr.accepts_null(),
                property.default.as_ref(),
            );
            fields.push(Field {
                key: key.clone(),
                expr,
                wrapper,
                description: property.doc(),
            });
        }
        fields
    }

    /// Reference to the brand for an identifier-shaped string or integer
    /// property, declaring the brand on first use.
    fn brand_expr(&mut self, scope: &str, key: &str, property: &SchemaNode) -> Option<SchemaExpr> {
        let NodeKind::Primitive {
            kind: kind @ (PrimitiveKind::String | PrimitiveKind::Integer),
            constraints,
            format,
        } = &property.kind
        else {
            return None;
        };
        if format.as_deref() == Some("binary") {
            return None;
        }

        let brand = brand_name(scope, key)?;
        if !self.brands.contains(&brand) && self.graph.contains(&brand) {
            debug!(brand, field = key, "Brand name taken by another declaration, leaving field unbranded");
            return None;
        }
        if self.brands.claim(&brand) {
            let base = primitive_expr(*kind, constraints, format.as_deref());
            self.graph.reserve(&brand);
            self.graph
                .define(Declaration::new(&brand, DeclarationKind::Brand { base }, None));
            debug!(brand, "Registered brand");
        }
        Some(SchemaExpr::Ref(brand))
    }

    fn build_expr(&mut self, scope: &str, node: &SchemaNode, context: Option<&Value>) -> SchemaExpr {
        let mut nullable = node.nullable;
        let expr = match &node.kind {
            NodeKind::Any => SchemaExpr::Unknown,
            NodeKind::Never => SchemaExpr::Never,
            NodeKind::Primitive {
                kind,
                constraints,
                format,
            } => primitive_expr(*kind, constraints, format.as_deref()),
            NodeKind::Enum(values) => SchemaExpr::Literal(values.clone()),
            NodeKind::Const(Value::Null) => SchemaExpr::Null,
            NodeKind::Const(value) => SchemaExpr::Literal(vec![value.clone()]),
            NodeKind::Ref(pointer) => {
                if let Some(name) = self.register_ref(pointer, context) {
                    SchemaExpr::Ref(name)
                } else {
                    warn!(scope, pointer = %pointer, "Unresolvable reference, using unknown.");
                    SchemaExpr::Unknown
                }
            }
            NodeKind::AllOf(_) => return self.build_expr(scope, &flatten(node, context), context),
            NodeKind::AnyOf(members) => {
                let filtered = filter_nullable(members);
                nullable |= filtered.nullable;
                match &filtered.kind {
                    NodeKind::AnyOf(rest) => SchemaExpr::Union(
                        rest.iter()
                            .map(|member| self.build_expr(scope, member, context))
                            .collect(),
                    ),
                    _ => self.build_expr(scope, &filtered, context),
                }
            }
            NodeKind::Object(object) if object.properties.is_empty() => {
                SchemaExpr::Record(Box::new(SchemaExpr::Unknown))
            }
            NodeKind::Object(object) => SchemaExpr::Struct(self.build_fields(scope, object, context)),
            NodeKind::Dictionary(values) => SchemaExpr::Record(Box::new(match values {
                Some(values) => self.build_expr(scope, values, context),
                None => SchemaExpr::Unknown,
            })),
            NodeKind::Array {
                items,
                min_items,
                max_items,
            } => SchemaExpr::Array {
                item: Box::new(self.items_expr(scope, items, context)),
                non_empty: min_items.is_some_and(|n| n >= 1),
                checks: max_items.map(Check::MaxItems).into_iter().collect(),
            },
            NodeKind::Tuple { prefix_items, rest } => SchemaExpr::Tuple {
                elements: prefix_items
                    .iter()
                    .map(|element| self.build_expr(scope, element, context))
                    .collect(),
                rest: match rest {
                    Items::Never => None,
                    other => Some(Box::new(self.items_expr(scope, other, context))),
                },
            },
        };
        expr.nullable(nullable)
    }

    fn items_expr(&mut self, scope: &str, items: &Items, context: Option<&Value>) -> SchemaExpr {
        match items {
            Items::Any => SchemaExpr::Unknown,
            Items::Never => SchemaExpr::Never,
            Items::Schema(schema) => self.build_expr(scope, schema, context),
        }
    }
}

/// The pointer a fragment reduces to when it is nothing but a reference.
fn direct_ref(node: &SchemaNode) -> Option<&str> {
    if node.nullable {
        return None;
    }
    match &node.kind {
        NodeKind::Ref(pointer) => Some(pointer),
        NodeKind::AllOf(members) => match members.as_slice() {
            [single] if !single.nullable => single.as_ref_pointer(),
            _ => None,
        },
        _ => None,
    }
}

fn is_nullable_fragment(fragment: &Value) -> bool {
    fragment.get("nullable").and_then(Value::as_bool).unwrap_or(false)
}

/// Merge an `allOf` into one node. A lone `$ref` member stays a reference.
fn flatten(node: &SchemaNode, context: Option<&Value>) -> SchemaNode {
    let NodeKind::AllOf(members) = &node.kind else {
        return node.clone();
    };

    let mut flat = match members.as_slice() {
        [single] if single.as_ref_pointer().is_some() => single.clone(),
        _ => merge_all_of(members, context),
    };
    flat.nullable |= node.nullable;
    if node.description.is_some() {
        flat.description.clone_from(&node.description);
    }
    if node.title.is_some() {
        flat.title.clone_from(&node.title);
    }
    if node.default.is_some() {
        flat.default.clone_from(&node.default);
    }
    flat
}

/// Flatten `allOf` and fold a nullable two-member `anyOf` into its survivor,
/// so every spelling of "nullable T" reaches the builder the same way.
fn simplify(node: &SchemaNode, context: Option<&Value>) -> SchemaNode {
    let node = flatten(node, context);
    let NodeKind::AnyOf(members) = &node.kind else {
        return node;
    };
    let mut filtered = filter_nullable(members);
    filtered.nullable |= node.nullable;
    if filtered.description.is_none() {
        filtered.description.clone_from(&node.description);
    }
    if filtered.title.is_none() {
        filtered.title.clone_from(&node.title);
    }
    if node.default.is_some() {
        filtered.default.clone_from(&node.default);
    }
    filtered
}

fn primitive_expr(kind: PrimitiveKind, constraints: &Constraints, format: Option<&str>) -> SchemaExpr {
    match kind {
        PrimitiveKind::String if format == Some("binary") => SchemaExpr::Binary,
        PrimitiveKind::String => {
            let mut checks = Vec::new();
            if format == Some("uuid") {
                checks.push(Check::Uuid);
            }
            checks.extend(constraints.min_length.map(Check::MinLength));
            checks.extend(constraints.max_length.map(Check::MaxLength));
            checks.extend(constraints.pattern.clone().map(Check::Pattern));
            SchemaExpr::String(checks)
        }
        PrimitiveKind::Integer => SchemaExpr::Int(numeric_checks(constraints)),
        PrimitiveKind::Number => SchemaExpr::Number(numeric_checks(constraints)),
        PrimitiveKind::Boolean => SchemaExpr::Boolean,
        PrimitiveKind::Null => SchemaExpr::Null,
    }
}

fn numeric_checks(constraints: &Constraints) -> Vec<Check> {
    let mut checks = Vec::new();
    checks.extend(constraints.exclusive_minimum.map(Check::GreaterThan));
    checks.extend(constraints.minimum.map(Check::GreaterThanOrEqualTo));
    checks.extend(constraints.exclusive_maximum.map(Check::LessThan));
    checks.extend(constraints.maximum.map(Check::LessThanOrEqualTo));
    checks
}
