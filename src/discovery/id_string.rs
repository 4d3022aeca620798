use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Maximum length of a service, instance or event identifier in bytes.
pub const MAX_ID_STRING_LENGTH: usize = 100;

/// Non-empty identifier of bounded length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdString(String);

impl IdString {
    /// Validate and wrap `value`.
    pub fn new(value: impl Into<String>) -> Result<Self, DiscoveryError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DiscoveryError::EmptyIdString);
        }
        if value.len() > MAX_ID_STRING_LENGTH {
            return Err(DiscoveryError::IdStringTooLong {
                value,
                max: MAX_ID_STRING_LENGTH,
            });
        }
        Ok(Self(value))
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdString {
    type Error = DiscoveryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for IdString {
    type Error = DiscoveryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for IdString {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<IdString> for String {
    fn from(id: IdString) -> Self {
        id.0
    }
}

impl AsRef<str> for IdString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for IdString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Display for IdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
