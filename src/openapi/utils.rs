//! Identifier and string helpers shared by the compiler and the client templates.

use std::collections::HashSet;
use std::sync::LazyLock;

/// TypeScript reserved words that cannot be used as identifiers.
pub static TS_RESERVED_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "break",
        "case",
        "catch",
        "class",
        "const",
        "continue",
        "debugger",
        "default",
        "delete",
        "do",
        "else",
        "enum",
        "export",
        "extends",
        "false",
        "finally",
        "for",
        "function",
        "if",
        "import",
        "in",
        "instanceof",
        "new",
        "null",
        "return",
        "super",
        "switch",
        "this",
        "throw",
        "true",
        "try",
        "typeof",
        "var",
        "void",
        "while",
        "with",
        "yield",
        "let",
        "static",
        "implements",
        "interface",
        "package",
        "private",
        "protected",
        "public",
        "await",
        "async",
    ]
    .into_iter()
    .collect()
});

/// Check if a property name must be quoted to be used as an object key.
pub fn needs_quoting(name: &str) -> bool {
    name.is_empty()
        || !name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Escape a string for use in a double-quoted JavaScript literal.
pub fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Quote a property key if it is not a valid bare identifier.
pub fn quote_if_needed(name: &str) -> String {
    if needs_quoting(name) {
        format!("\"{}\"", escape_js_string(name))
    } else {
        name.to_string()
    }
}

/// Capitalize the first letter of a string.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// Convert arbitrary text into a PascalCase type identifier.
///
/// Splits on every non-alphanumeric character and capitalizes each part, so
/// `user_id`, `user-id` and `userId` all become `UserId`.
pub fn to_type_name(name: &str) -> String {
    let mut result: String = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(capitalize_first)
        .collect();

    if result.is_empty() {
        return "Unnamed".to_string();
    }
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}

/// Sanitize an identifier to be a valid camelCase TypeScript value name.
/// - Splits on separators and converts to camelCase
/// - Prepends `_` if it starts with a digit
/// - Escapes reserved words with a `_` prefix
pub fn sanitize_ts_identifier(name: &str) -> String {
    let mut result = String::new();
    for (i, part) in name
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '$')
        .filter(|part| !part.is_empty())
        .enumerate()
    {
        if i == 0 {
            result.push_str(part);
        } else {
            result.push_str(&capitalize_first(part));
        }
    }

    if result.is_empty() {
        return "_empty".to_string();
    }

    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }

    if TS_RESERVED_WORDS.contains(result.as_str()) {
        result.insert(0, '_');
    }

    result
}

/// Convert a tag into a file stem: lowercase words joined by dashes.
pub fn to_file_stem(tag: &str) -> String {
    let mut stem = String::new();
    let mut previous_lower = false;
    for c in tag.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && previous_lower {
                stem.push('-');
            }
            previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            stem.push(c.to_ascii_lowercase());
        } else if c == '_' && stem.is_empty() {
            stem.push(c);
        } else if !stem.is_empty() && !stem.ends_with('-') {
            stem.push('-');
            previous_lower = false;
        }
    }
    let stem = stem.trim_end_matches('-').to_string();
    if stem.is_empty() { "default".to_string() } else { stem }
}
