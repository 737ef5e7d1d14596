use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Optional `ns::` qualifier, the bare identifier, then `(` or end of string.
static C_FUNCTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\w+::)?(\w+)(?:\(|$)").expect("C function pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Malformed native symbol '{c_function}' for bridge '{js_name}'")]
    MalformedSymbol { js_name: String, c_function: String },
}

/// Last `.` segment, then its last `/` segment.
///
/// `pkg/lib/index.exports.readFile` -> `readFile`.
pub fn canonical_js_name(js_name: &str) -> &str {
    let last_dot = js_name.rsplit('.').next().unwrap_or(js_name);
    last_dot.rsplit('/').next().unwrap_or(last_dot)
}

/// Innermost unqualified identifier of a (possibly namespaced) C/C++ signature.
///
/// `ns::Foo::bar(int, char*)` -> `bar`. Returns `None` when nothing identifier-like
/// is followed by `(` or the end of the string.
pub fn canonical_c_function(c_function: &str) -> Option<&str> {
    C_FUNCTION_PATTERN.captures(c_function).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

/// Reduce a raw bridge to its canonical `(jsName, cFunction)` pair.
pub fn canonicalize(js_name: &str, c_function: &str) -> Result<(String, String), NormalizeError> {
    let js = canonical_js_name(js_name);
    let c = canonical_c_function(c_function).ok_or_else(|| NormalizeError::MalformedSymbol {
        js_name: js_name.to_string(),
        c_function: c_function.to_string(),
    })?;
    Ok((js.to_string(), c.to_string()))
}

/// Make a package id filesystem-safe (`@scope/name` -> `@scope~name`).
pub fn sanitize_package_id(raw: &str) -> String {
    raw.replace('/', "~")
}

/// Inverse of [`sanitize_package_id`]. Not injective if raw ids already contain `~`.
pub fn unsanitize_package_id(sanitized: &str) -> String {
    sanitized.replace('~', "/")
}
