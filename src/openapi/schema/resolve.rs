//! Same-document `$ref` resolution.
//!
//! Only fragment pointers (`#/...`) are followed. Anything else is
//! unresolvable: there is no local representation to emit for it, so callers
//! drop the referencing field instead of failing the run.

use serde_json::Value;

use crate::openapi::utils::to_type_name;

/// Upper bound on `$ref` → `$ref` chains, guarding against self-referential aliases.
const MAX_REF_HOPS: usize = 32;

/// Walk `pointer` through `context`. Returns `None` for non-local or dangling pointers.
pub fn resolve_ref<'a>(pointer: &str, context: &'a Value) -> Option<&'a Value> {
    let path = pointer.strip_prefix('#')?;
    if path.is_empty() {
        return Some(context);
    }
    if !path.starts_with('/') {
        return None;
    }
    context.pointer(path)
}

/// Follow a chain of pure `$ref` fragments until a non-reference fragment is reached.
pub fn resolve_chain<'a>(pointer: &str, context: &'a Value) -> Option<&'a Value> {
    let mut current = resolve_ref(pointer, context)?;
    for _ in 0..MAX_REF_HOPS {
        match current.get("$ref").and_then(Value::as_str) {
            Some(next) => current = resolve_ref(next, context)?,
            None => return Some(current),
        }
    }
    None
}

/// Declaration name for the target of a pointer: its last segment, identifier-cased.
pub fn ref_name(pointer: &str) -> String {
    let last = pointer.rsplit('/').next().unwrap_or(pointer);
    to_type_name(&last.replace("~1", "/").replace("~0", "~"))
}
