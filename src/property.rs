//! Property schema - the declared properties of a component model
//!
//! The schema is a static table: every recognized property name, whether it
//! is required, and an optional closed set of allowed values. The same value
//! is consulted by the repository for validation and by editors for display.

use std::collections::BTreeMap;
use crate::{Error, Result};

/// Allowed values of the `domain` property
pub const DOMAINS: &[&str] = &["ASSEMBLY", "COMPUTATION", "ELECTRONICS", "MECHANICS", "SOFTWARE"];

/// Allowed values of the `maturity` property
pub const MATURITIES: &[&str] = &["INPROGRESS", "REVIEW", "RELEASED", "DEPRECATED"];

/// Declaration of a single recognized property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDecl {
    /// Property name as it appears in the interchange document
    pub name: &'static str,
    /// Whether a non-empty value must be present
    pub required: bool,
    /// Closed enumeration of allowed values; `None` means free text
    pub allowed_values: Option<&'static [&'static str]>,
}

impl PropertyDecl {
    pub const fn free(name: &'static str, required: bool) -> Self {
        Self { name, required, allowed_values: None }
    }

    pub const fn closed(name: &'static str, required: bool, allowed: &'static [&'static str]) -> Self {
        Self { name, required, allowed_values: Some(allowed) }
    }

    /// Check a single value against this declaration
    fn check(&self, value: Option<&str>) -> Result<()> {
        let value = match value {
            Some(v) if !v.trim().is_empty() => v,
            _ if self.required => {
                return Err(Error::invalid_property(self.name, "required value is missing"));
            }
            // empty optional values are skipped
            _ => return Ok(()),
        };

        // values are stored and filtered verbatim
        if value.trim() != value {
            return Err(Error::invalid_property(
                self.name,
                format!("'{}' has leading or trailing whitespace", value),
            ));
        }

        if let Some(allowed) = self.allowed_values {
            let candidate = if self.name == "domain" {
                value.to_uppercase()
            } else {
                value.to_string()
            };
            if !allowed.contains(&candidate.as_str()) {
                return Err(Error::invalid_property(
                    self.name,
                    format!("'{}' is not one of [{}]", value, allowed.join(", ")),
                ));
            }
        }
        Ok(())
    }
}

const COMPONENT_MODEL_PROPERTIES: &[PropertyDecl] = &[
    PropertyDecl::closed("domain", true, DOMAINS),
    PropertyDecl::free("name", true),
    PropertyDecl::free("version", true),
    PropertyDecl::free("type", false),
    PropertyDecl::closed("maturity", false, MATURITIES),
    PropertyDecl::free("projectName", false),
];

/// Immutable property schema passed to the repository at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    properties: Vec<PropertyDecl>,
}

impl PropertySchema {
    /// Create a schema from an ordered list of declarations
    pub fn new(properties: Vec<PropertyDecl>) -> Self {
        Self { properties }
    }

    /// The schema of `ComponentModel` records
    pub fn component_model() -> Self {
        Self::new(COMPONENT_MODEL_PROPERTIES.to_vec())
    }

    /// Declared properties in display order
    pub fn declared_properties(&self) -> &[PropertyDecl] {
        &self.properties
    }

    /// Look up one declaration by name
    pub fn get(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Whether `name` is a recognized property
    pub fn is_declared(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Allowed values of a closed property, empty for free text or unknown names
    pub fn allowed_values(&self, name: &str) -> &[&'static str] {
        self.get(name).and_then(|p| p.allowed_values).unwrap_or(&[])
    }

    /// Validate a property map against the schema.
    ///
    /// Undeclared keys are ignored; they are carried through untouched.
    pub fn validate(&self, properties: &BTreeMap<String, String>) -> Result<()> {
        for decl in &self.properties {
            decl.check(properties.get(decl.name).map(String::as_str))?;
        }
        Ok(())
    }
}

impl Default for PropertySchema {
    fn default() -> Self {
        Self::component_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_declared_order_is_stable() {
        let schema = PropertySchema::component_model();
        let names: Vec<_> = schema.declared_properties().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["domain", "name", "version", "type", "maturity", "projectName"]);
    }

    #[test]
    fn test_valid_properties() {
        let schema = PropertySchema::component_model();
        let p = props(&[("domain", "assembly"), ("name", "arm"), ("version", "1.0"), ("maturity", "RELEASED")]);
        assert!(schema.validate(&p).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let schema = PropertySchema::component_model();
        let err = schema.validate(&props(&[("domain", "ASSEMBLY"), ("name", "arm")])).unwrap_err();
        match err {
            Error::InvalidProperty { name, .. } => assert_eq!(name, "version"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = schema.validate(&props(&[("domain", "ASSEMBLY"), ("name", " "), ("version", "1")])).unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "name"));
    }

    #[test]
    fn test_closed_enumeration() {
        let schema = PropertySchema::component_model();
        let err = schema
            .validate(&props(&[("domain", "ROBOTS"), ("name", "arm"), ("version", "1")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "domain"));

        let err = schema
            .validate(&props(&[("domain", "SOFTWARE"), ("name", "a"), ("version", "1"), ("maturity", "released")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "maturity"));
    }

    #[test]
    fn test_surrounding_whitespace_is_rejected() {
        let schema = PropertySchema::component_model();
        let err = schema
            .validate(&props(&[("domain", "SOFTWARE"), ("name", " arm "), ("version", "1")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "name"));

        let err = schema
            .validate(&props(&[("domain", "SOFTWARE "), ("name", "arm"), ("version", "1")]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "domain"));

        assert!(schema.validate(&props(&[("domain", "SOFTWARE"), ("name", "robot arm"), ("version", "1")])).is_ok());
    }

    #[test]
    fn test_empty_optional_is_skipped() {
        let schema = PropertySchema::component_model();
        let p = props(&[("domain", "SOFTWARE"), ("name", "a"), ("version", "1"), ("maturity", "")]);
        assert!(schema.validate(&p).is_ok());
    }

    #[test]
    fn test_allowed_values_lookup() {
        let schema = PropertySchema::component_model();
        assert_eq!(schema.allowed_values("domain"), DOMAINS);
        assert!(schema.allowed_values("name").is_empty());
        assert!(schema.allowed_values("nope").is_empty());
        assert!(schema.is_declared("projectName"));
        assert!(!schema.is_declared("layouts"));
    }
}
