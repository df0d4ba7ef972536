//! Identifier branding.
//!
//! Properties shaped like identifiers (`id`, `userId`, `user_id`, `uuid`, ...)
//! get a nominal brand so two string-backed ids can't be mixed up. A brand is
//! declared once per run no matter how many properties share its name.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::openapi::utils::{capitalize_first, to_type_name};

/// `id`, `uuid`, a camel-case `Id`/`Uuid` suffix, or a snake-case `_id`/`_uuid` suffix.
#[allow(clippy::expect_used)]
static IDENTIFIER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:id|uuid)$|[a-z0-9](?:Id|Uuid)$|_(?:id|uuid)$").expect("Invalid identifier regex")
});

/// Whether a property key names an identifier.
pub fn is_identifier_key(key: &str) -> bool {
    IDENTIFIER_KEY.is_match(key)
}

/// Brand name for an identifier-shaped property of `parent`, if it is one.
///
/// Bare `id`/`uuid` keys are qualified by the parent (`Pet` + `id` → `PetId`);
/// everything else brands as the key itself (`userId` and `user_id` → `UserId`).
pub fn brand_name(parent: &str, key: &str) -> Option<String> {
    if !is_identifier_key(key) {
        return None;
    }
    match key {
        "id" | "uuid" => Some(format!("{parent}{}", capitalize_first(key))),
        _ => Some(to_type_name(key)),
    }
}

/// Per-run record of the brands declared so far.
#[derive(Debug, Default)]
pub struct BrandRegistry {
    brands: IndexMap<String, bool>,
}

impl BrandRegistry {
    /// Claim `brand`. Returns `true` only for the first claim, when the caller
    /// must emit the declaration; later claims just reference it.
    pub fn claim(&mut self, brand: &str) -> bool {
        match self.brands.get_mut(brand) {
            Some(emitted) if *emitted => false,
            Some(emitted) => {
                *emitted = true;
                true
            }
            None => {
                self.brands.insert(brand.to_string(), true);
                true
            }
        }
    }

    pub fn contains(&self, brand: &str) -> bool {
        self.brands.contains_key(brand)
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }
}
