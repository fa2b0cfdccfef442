//! `slug@version` references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const LATEST: &str = "latest";

/// A reference to a contract by slug, optionally pinned to a version.
///
/// `slug`, `slug@latest` and `slug@1.2.3` are all accepted; the first two
/// leave `version` unset and resolve to the highest stored version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionedSlug {
    pub slug: String,
    pub version: Option<String>,
}

impl VersionedSlug {
    pub fn new(slug: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            version: Some(version.into()),
        }
    }

    pub fn latest(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            version: None,
        }
    }
}

impl FromStr for VersionedSlug {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slug, version) = match s.split_once('@') {
            Some((slug, version)) => (slug, Some(version)),
            None => (s, None),
        };

        if slug.is_empty() {
            return Err(format!("invalid versioned slug: {:?}", s));
        }

        let version = match version {
            None | Some(LATEST) => None,
            Some("") => return Err(format!("invalid versioned slug: {:?}", s)),
            Some(version) => Some(version.to_string()),
        };

        Ok(Self {
            slug: slug.to_string(),
            version,
        })
    }
}

impl TryFrom<String> for VersionedSlug {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionedSlug> for String {
    fn from(value: VersionedSlug) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionedSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.slug, version),
            None => write!(f, "{}@{}", self.slug, LATEST),
        }
    }
}
