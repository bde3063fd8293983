// crates/outbound-harness-core/src/catalog.rs
// ============================================================================
// Module: Type Catalog Adapter
// Description: Interface to the external catalog of named variable types.
// Purpose: Parse raw values and supply example data without owning typing.
// Dependencies: serde_json, thiserror, url
// ============================================================================

//! ## Overview
//! The harness never implements typing itself; it consumes a [`TypeCatalog`].
//! [`StandardTypeCatalog`] is a small reference catalog covering the types
//! most outbound integrations declare. Composite types parse into objects of
//! the form `{raw, normal, valid}` so integration code can test `valid`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::model::WILDCARD_TYPE;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Type names accepted by descriptor validation in addition to the catalog's.
pub const EXTRA_TYPE_NAMES: [&str; 2] = ["array", WILDCARD_TYPE];

// ============================================================================
// SECTION: Catalog Trait
// ============================================================================

/// Errors reported by a type catalog.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The type name is not part of the catalog.
    #[error("unknown type: {0}")]
    UnknownType(String),
    /// The raw value cannot be parsed as the type.
    #[error("cannot parse value as {type_name}: {reason}")]
    Invalid {
        /// Type name that rejected the value.
        type_name: String,
        /// Human-readable reason.
        reason: String,
    },
}

/// External catalog of named types.
pub trait TypeCatalog: Send + Sync {
    /// Returns every type name the catalog understands.
    fn type_names(&self) -> BTreeSet<String>;

    /// Returns the declared example values for a type.
    fn examples(&self, type_name: &str) -> Option<Vec<Value>>;

    /// Parses a raw value into its typed representation.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the type is unknown or the value is unparseable.
    fn parse(&self, type_name: &str, raw: &Value) -> Result<Value, CatalogError>;

    /// Returns true when the catalog knows `type_name`.
    fn contains(&self, type_name: &str) -> bool {
        self.type_names().contains(type_name)
    }
}

/// Returns the full set of type names a descriptor may declare.
#[must_use]
pub fn valid_type_names(catalog: &dyn TypeCatalog) -> BTreeSet<String> {
    let mut names = catalog.type_names();
    names.extend(EXTRA_TYPE_NAMES.iter().map(ToString::to_string));
    names
}

/// Returns the value used to synthesize data for a type.
///
/// Takes the first declared example, preferring its `normal` variant when the
/// example is a composite. Unknown types and types without examples yield `None`.
#[must_use]
pub fn first_example(catalog: &dyn TypeCatalog, type_name: &str) -> Option<Value> {
    let example = catalog.examples(type_name)?.into_iter().next()?;
    match example {
        Value::Object(map) => Some(map.get("normal").cloned().unwrap_or(Value::Object(map))),
        other => Some(other),
    }
}

// ============================================================================
// SECTION: Standard Catalog
// ============================================================================

/// Reference catalog with common lead-data types.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTypeCatalog;

/// Types known to [`StandardTypeCatalog`].
const STANDARD_TYPES: [&str; 7] = ["boolean", "email", "number", "phone", "postal_code", "string", "url"];

impl StandardTypeCatalog {
    /// Creates the reference catalog.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TypeCatalog for StandardTypeCatalog {
    fn type_names(&self) -> BTreeSet<String> {
        STANDARD_TYPES.iter().map(ToString::to_string).collect()
    }

    fn examples(&self, type_name: &str) -> Option<Vec<Value>> {
        let examples = match type_name {
            "string" => vec![json!("Lorem ipsum")],
            "number" => vec![json!("42"), json!("3.5")],
            "boolean" => vec![json!("true"), json!("false")],
            "phone" => vec![
                json!({"raw": "(513) 555-2379", "normal": "5135552379"}),
                json!({"raw": "512.555.1212", "normal": "5125551212"}),
            ],
            "email" => vec![json!({"raw": "Jane.Doe@Example.com", "normal": "jane.doe@example.com"})],
            "postal_code" => vec![json!({"raw": "78704-1234", "normal": "787041234"})],
            "url" => vec![json!({"raw": "HTTPS://Example.com/path", "normal": "https://example.com/path"})],
            _ => return None,
        };
        Some(examples)
    }

    fn parse(&self, type_name: &str, raw: &Value) -> Result<Value, CatalogError> {
        let text = raw_text(raw);
        match type_name {
            "string" => Ok(Value::String(text.unwrap_or_default())),
            "number" => parse_number(text.as_deref()),
            "boolean" => parse_boolean(text.as_deref()),
            "phone" => Ok(parse_phone(&text.unwrap_or_default())),
            "email" => Ok(parse_email(&text.unwrap_or_default())),
            "postal_code" => Ok(parse_postal_code(&text.unwrap_or_default())),
            "url" => Ok(parse_url(&text.unwrap_or_default())),
            other => Err(CatalogError::UnknownType(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Parsers
// ============================================================================

/// Extracts the raw text from a scalar or an already-parsed composite.
fn raw_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Object(map) => map.get("raw").and_then(raw_text),
        Value::Null | Value::Array(_) => None,
    }
}

/// Parses a decimal number.
fn parse_number(text: Option<&str>) -> Result<Value, CatalogError> {
    let invalid = |reason: &str| CatalogError::Invalid {
        type_name: "number".to_string(),
        reason: reason.to_string(),
    };
    let text = text.ok_or_else(|| invalid("missing value"))?;
    let trimmed = text.trim().replace(',', "");
    if let Ok(int) = trimmed.parse::<i64>() {
        return Ok(Value::Number(Number::from(int)));
    }
    let float = trimmed.parse::<f64>().map_err(|_| invalid("not a number"))?;
    Number::from_f64(float).map(Value::Number).ok_or_else(|| invalid("not finite"))
}

/// Parses a boolean from common truthy/falsy spellings.
fn parse_boolean(text: Option<&str>) -> Result<Value, CatalogError> {
    let normalized = text.unwrap_or_default().trim().to_ascii_lowercase();
    match normalized.as_str() {
        "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
        "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
        _ => Err(CatalogError::Invalid {
            type_name: "boolean".to_string(),
            reason: "not a boolean".to_string(),
        }),
    }
}

/// Builds the `{raw, normal, valid}` composite shape.
fn composite(raw: &str, normal: Option<String>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("raw".to_string(), Value::String(raw.to_string()));
    let valid = normal.is_some();
    if let Some(normal) = normal {
        map.insert("normal".to_string(), Value::String(normal));
    }
    map.insert("valid".to_string(), Value::Bool(valid));
    map
}

/// Parses a North American phone number.
fn parse_phone(raw: &str) -> Value {
    let mut digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits.remove(0);
    }
    if digits.len() != 10 {
        return Value::Object(composite(raw, None));
    }
    let mut map = composite(raw, Some(digits.clone()));
    map.insert("area".to_string(), Value::String(digits[0..3].to_string()));
    map.insert("exchange".to_string(), Value::String(digits[3..6].to_string()));
    map.insert("line".to_string(), Value::String(digits[6..10].to_string()));
    Value::Object(map)
}

/// Parses an email address (shape check only).
fn parse_email(raw: &str) -> Value {
    let trimmed = raw.trim();
    let normal = trimmed.split_once('@').and_then(|(user, domain)| {
        let plausible = !user.is_empty() && domain.contains('.') && !domain.starts_with('.');
        plausible.then(|| trimmed.to_ascii_lowercase())
    });
    Value::Object(composite(raw, normal))
}

/// Parses a US ZIP or ZIP+4 postal code.
fn parse_postal_code(raw: &str) -> Value {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let normal = matches!(digits.len(), 5 | 9).then_some(digits);
    Value::Object(composite(raw, normal))
}

/// Parses an absolute http(s) URL.
fn parse_url(raw: &str) -> Value {
    let normal = url::Url::parse(raw.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| url.to_string());
    Value::Object(composite(raw, normal))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
