//! Schema-evolution settings

use serde::{Deserialize, Serialize};

/// Schema-evolution configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Documents per write batch for backfill, rename and flatten (default: 500)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Names that can never be renamed
    #[serde(default = "default_protected_fields")]
    pub protected_fields: Vec<String>,
}

fn default_batch_size() -> usize {
    500
}

fn default_protected_fields() -> Vec<String> {
    [
        "_id",
        "aci_id",
        "aci_name",
        "ac_name",
        "voter_id",
        "createdAt",
        "updatedAt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            protected_fields: default_protected_fields(),
        }
    }
}

impl SchemaConfig {
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected_fields.iter().any(|p| p == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: SchemaConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.batch_size, 500);
        assert!(config.is_protected("voter_id"));
        assert!(!config.is_protected("gender"));
    }
}
