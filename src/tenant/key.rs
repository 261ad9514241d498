//! Tenant keys and identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Small positive integer identifying one constituency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(u16);

impl TenantKey {
    pub const fn new(key: u16) -> Self {
        Self(key)
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for TenantKey {
    fn from(key: u16) -> Self {
        Self(key)
    }
}

impl FromStr for TenantKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// How callers name a tenant: its key, or an alias (constituency name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TenantIdentifier {
    Key(TenantKey),
    Alias(String),
}

impl TenantIdentifier {
    /// Numeric text is a key, anything else an alias.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<TenantKey>() {
            Ok(key) => Self::Key(key),
            Err(_) => Self::Alias(raw.trim().to_string()),
        }
    }

    /// Re-reads numeric aliases as keys.
    pub fn canonical(&self) -> Self {
        match self {
            Self::Alias(raw) => Self::parse(raw),
            key => key.clone(),
        }
    }
}

impl From<TenantKey> for TenantIdentifier {
    fn from(key: TenantKey) -> Self {
        Self::Key(key)
    }
}

impl From<&str> for TenantIdentifier {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for TenantIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", key),
            Self::Alias(alias) => f.write_str(alias),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_identifier() {
        assert_eq!(TenantIdentifier::parse("7"), TenantIdentifier::Key(TenantKey::new(7)));
        assert_eq!(TenantIdentifier::parse(" 12 "), TenantIdentifier::Key(TenantKey::new(12)));
        assert_eq!(
            TenantIdentifier::parse("Thondamuthur"),
            TenantIdentifier::Alias("Thondamuthur".into())
        );
    }

    #[test]
    fn test_identifier_json_forms() {
        let key: TenantIdentifier = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(key, TenantIdentifier::Key(TenantKey::new(3)));

        let alias: TenantIdentifier = serde_json::from_value(json!("5")).unwrap();
        assert_eq!(alias.canonical(), TenantIdentifier::Key(TenantKey::new(5)));
    }

    #[test]
    fn test_key_ordering() {
        assert!(TenantKey::new(2) < TenantKey::new(10));
    }
}
