//! Model URI - stable identity for every persisted component model
//!
//! Format: `cm://<DOMAIN>/<name>/<version>`
//!
//! Examples:
//! - `cm://ASSEMBLY/arm/1.0`
//! - `cm://SOFTWARE/motor%2Fdriver/2.1`
//!
//! The domain is uppercased so that domain spelling never changes identity.
//! `%` and `/` inside a component are percent-escaped, which keeps the
//! mapping injective.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "cm://";

/// Deterministic URI of one (domain, name, version) unit.
///
/// This URI serves as the primary key for:
/// - Stored records
/// - References between models
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelUri {
    /// Uppercased domain
    pub domain: String,
    /// Model name
    pub name: String,
    /// Version string
    pub version: String,
}

impl ModelUri {
    /// Compute the URI for an identity triple
    pub fn new(domain: impl AsRef<str>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            domain: domain.as_ref().to_uppercase(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parse a URI string into a ModelUri
    ///
    /// Expected format: `cm://<DOMAIN>/<name>/<version>`
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::InvalidUri(format!("URI must start with {}: {}", SCHEME, uri)))?;

        let mut parts = rest.split('/');
        let (Some(domain), Some(name), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidUri(format!(
                "URI must have exactly domain/name/version: {}",
                uri
            )));
        };

        if domain.is_empty() || name.is_empty() || version.is_empty() {
            return Err(Error::InvalidUri(format!("URI has an empty component: {}", uri)));
        }

        Ok(Self::new(unescape(domain)?, unescape(name)?, unescape(version)?))
    }

    /// Convert to URI string
    pub fn to_uri_string(&self) -> String {
        format!(
            "{}{}/{}/{}",
            SCHEME,
            escape(&self.domain),
            escape(&self.name),
            escape(&self.version)
        )
    }
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace('/', "%2F")
}

fn unescape(component: &str) -> Result<String> {
    let mut out = String::with_capacity(component.len());
    let mut rest = component;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).unwrap_or("");
        match code {
            "25" => out.push('%'),
            "2F" | "2f" => out.push('/'),
            _ => return Err(Error::InvalidUri(format!("Invalid escape in component: {}", component))),
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri_string())
    }
}

impl FromStr for ModelUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ModelUri {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_uri_string())
    }
}

impl<'de> Deserialize<'de> for ModelUri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ModelUri::parse(&s).map_err(serde::de::Error::custom)
    }
}
