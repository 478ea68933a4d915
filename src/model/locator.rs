//! Version locator value type.
//!
//! A version of an offering is addressed by `(catalog_id, version_id)`.
//! The catalog API uses the dotted form `catalog.version` on lookup calls,
//! while callers persist the slash form `catalog/version` as their stable
//! identifier. Conversions happen here and nowhere else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CatalogError;

const DOTTED: char = '.';
const SLASH: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionLocator {
    catalog_id: String,
    version_id: String,
}

impl VersionLocator {
    pub fn new(catalog_id: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            version_id: version_id.into(),
        }
    }

    pub fn catalog_id(&self) -> &str {
        &self.catalog_id
    }

    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    /// Parse the lookup form `catalog.version`.
    pub fn parse_dotted(s: &str) -> Result<Self, CatalogError> {
        Self::split(s, DOTTED)
    }

    /// Parse the caller-stable form `catalog/version`.
    pub fn parse_slash(s: &str) -> Result<Self, CatalogError> {
        Self::split(s, SLASH)
    }

    /// Parse either encoding. The slash form wins when both separators occur.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        if s.contains(SLASH) {
            Self::parse_slash(s)
        } else {
            Self::parse_dotted(s)
        }
    }

    pub fn to_dotted(&self) -> String {
        format!("{}{}{}", self.catalog_id, DOTTED, self.version_id)
    }

    pub fn to_slash(&self) -> String {
        format!("{}{}{}", self.catalog_id, SLASH, self.version_id)
    }

    fn split(s: &str, sep: char) -> Result<Self, CatalogError> {
        match s.split_once(sep) {
            Some((catalog, version)) if !catalog.is_empty() && !version.is_empty() => {
                Ok(Self::new(catalog, version))
            }
            _ => Err(CatalogError::InvalidLocator(format!(
                "expected `catalog{sep}version`, got {s:?}"
            ))),
        }
    }
}

/// Displays the dotted (lookup) form.
impl fmt::Display for VersionLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.catalog_id, DOTTED, self.version_id)
    }
}

impl FromStr for VersionLocator {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionLocator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_dotted())
    }
}

impl<'de> Deserialize<'de> for VersionLocator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_and_slash_forms_translate() {
        let loc = VersionLocator::parse_slash("cat-1/ver-9").unwrap();
        assert_eq!(loc.catalog_id(), "cat-1");
        assert_eq!(loc.version_id(), "ver-9");
        assert_eq!(loc.to_dotted(), "cat-1.ver-9");

        let back = VersionLocator::parse_dotted(&loc.to_dotted()).unwrap();
        assert_eq!(back, loc);
        assert_eq!(back.to_slash(), "cat-1/ver-9");
    }

    #[test]
    fn test_parse_splits_on_first_separator_only() {
        let loc = VersionLocator::parse_dotted("cat.ver.with.dots").unwrap();
        assert_eq!(loc.catalog_id(), "cat");
        assert_eq!(loc.version_id(), "ver.with.dots");
    }

    #[test]
    fn test_parse_accepts_either_form() {
        let a: VersionLocator = "c1.v1".parse().unwrap();
        let b: VersionLocator = "c1/v1".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(VersionLocator::parse_dotted("no-separator").is_err());
        assert!(VersionLocator::parse_dotted(".v1").is_err());
        assert!(VersionLocator::parse_slash("c1/").is_err());
        assert!(VersionLocator::parse_slash("c1.v1").is_err());
    }

    #[test]
    fn test_serde_uses_dotted_form() {
        let loc = VersionLocator::new("c1", "v1");
        assert_eq!(serde_json::to_string(&loc).unwrap(), "\"c1.v1\"");
        let parsed: VersionLocator = serde_json::from_str("\"c1.v1\"").unwrap();
        assert_eq!(parsed, loc);
    }
}
