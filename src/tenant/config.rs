//! Tenant set configuration
//!
//! The tenant set is fixed at startup. Partitions are named by convention:
//! `<partition_prefix><key>`.

use serde::{Deserialize, Serialize};

use super::key::TenantKey;

/// Static tenant configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Every tenant served by this store
    pub keys: Vec<TenantKey>,

    /// Partition name prefix (default: "members_ac_")
    #[serde(default = "default_partition_prefix")]
    pub partition_prefix: String,

    /// Member attributes holding the constituency name, probed by alias
    /// resolution (default: ["aci_name", "ac_name"])
    #[serde(default = "default_alias_fields")]
    pub alias_fields: Vec<String>,
}

fn default_partition_prefix() -> String {
    "members_ac_".to_string()
}

fn default_alias_fields() -> Vec<String> {
    vec!["aci_name".to_string(), "ac_name".to_string()]
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            partition_prefix: default_partition_prefix(),
            alias_fields: default_alias_fields(),
        }
    }
}

impl TenantConfig {
    pub fn with_keys(keys: impl IntoIterator<Item = u16>) -> Self {
        Self {
            keys: keys.into_iter().map(TenantKey::new).collect(),
            ..Self::default()
        }
    }

    /// Physical partition name for a tenant
    pub fn partition_name(&self, key: TenantKey) -> String {
        format!("{}{}", self.partition_prefix, key)
    }
}
