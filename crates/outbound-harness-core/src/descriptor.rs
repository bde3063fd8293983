// crates/outbound-harness-core/src/descriptor.rs
// ============================================================================
// Module: Variable Contract Validator
// Description: Rule checks for request and response variable descriptors.
// Purpose: Report every malformed descriptor in a single pass.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`validate_descriptors`] applies every rule to every descriptor and
//! collects all violations; it never stops at the first one. Request
//! descriptors must carry an explicit `required` flag, response descriptors
//! need not.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::VariableDescriptor;
use crate::model::WILDCARD_TYPE;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Which variable list a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorRole {
    /// Request variables (input bag).
    Request,
    /// Response variables (output bag).
    Response,
}

impl fmt::Display for DescriptorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// A single descriptor rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorRule {
    /// Name must be non-empty.
    NameNonEmpty,
    /// Name must already be lowercase.
    NameLowercase,
    /// `required` must be an explicit boolean.
    RequiredBoolean,
    /// `type` must be a known type name.
    KnownType,
    /// `description` must be present and non-empty unless wildcard.
    Description,
}

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{role} variable '{name}': {message}")]
pub struct DescriptorViolation {
    /// Variable list the descriptor came from.
    pub role: DescriptorRole,
    /// Offending descriptor name (possibly empty).
    pub name: String,
    /// Violated rule.
    pub rule: DescriptorRule,
    /// Human-readable message.
    pub message: String,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates descriptors against the known type names.
///
/// Returns every violation found, in descriptor order.
#[must_use]
pub fn validate_descriptors(
    role: DescriptorRole,
    descriptors: &[VariableDescriptor],
    type_names: &BTreeSet<String>,
) -> Vec<DescriptorViolation> {
    let mut violations = Vec::new();
    for descriptor in descriptors {
        let mut violate = |rule: DescriptorRule, message: String| {
            violations.push(DescriptorViolation {
                role,
                name: descriptor.name.clone(),
                rule,
                message,
            });
        };
        if descriptor.name.is_empty() {
            violate(DescriptorRule::NameNonEmpty, "name has zero length".to_string());
        } else if descriptor.name != descriptor.name.to_lowercase() {
            violate(
                DescriptorRule::NameLowercase,
                format!("name '{}' has uppercase letters", descriptor.name),
            );
        }
        if role == DescriptorRole::Request && descriptor.required.is_none() {
            violate(DescriptorRule::RequiredBoolean, "'required' is not defined".to_string());
        }
        if !type_names.contains(&descriptor.var_type) {
            violate(
                DescriptorRule::KnownType,
                format!("type '{}' is not a valid type", descriptor.var_type),
            );
        }
        let described = descriptor.description.as_deref().is_some_and(|text| !text.is_empty());
        if descriptor.var_type != WILDCARD_TYPE && !described {
            violate(DescriptorRule::Description, "description is missing or empty".to_string());
        }
    }
    violations
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::DescriptorRole;
    use super::DescriptorRule;
    use super::validate_descriptors;
    use crate::catalog::StandardTypeCatalog;
    use crate::catalog::valid_type_names;
    use crate::model::VariableDescriptor;

    fn names() -> BTreeSet<String> {
        valid_type_names(&StandardTypeCatalog)
    }

    #[test]
    fn well_formed_descriptors_pass() {
        let descriptors = vec![
            VariableDescriptor::required("lead.phone_1", "phone", "Phone"),
            VariableDescriptor {
                name: "extra".to_string(),
                var_type: "wildcard".to_string(),
                required: Some(false),
                description: None,
            },
        ];
        assert!(validate_descriptors(DescriptorRole::Request, &descriptors, &names()).is_empty());
    }

    #[test]
    fn violations_do_not_short_circuit() {
        let descriptors = vec![
            VariableDescriptor {
                name: "Lead.Phone".to_string(),
                var_type: "telephone".to_string(),
                required: None,
                description: Some(String::new()),
            },
            VariableDescriptor::required("", "string", "x"),
        ];
        let violations = validate_descriptors(DescriptorRole::Request, &descriptors, &names());
        let rules: Vec<DescriptorRule> = violations.iter().map(|violation| violation.rule).collect();
        assert_eq!(
            rules,
            vec![
                DescriptorRule::NameLowercase,
                DescriptorRule::RequiredBoolean,
                DescriptorRule::KnownType,
                DescriptorRule::Description,
                DescriptorRule::NameNonEmpty,
            ]
        );
    }

    #[test]
    fn response_descriptors_skip_required_rule() {
        let descriptors = vec![VariableDescriptor::output("outcome", "string", "Outcome")];
        assert!(validate_descriptors(DescriptorRole::Response, &descriptors, &names()).is_empty());
    }
}
