//! Configuration shapes for virtual attribute rules and search limits. These are parsed by
//! the server from its TOML configuration, and can be produced by tooling.

use serde::{Deserialize, Serialize};

/// How real (stored) values and virtual (computed) values combine for one attribute type.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictBehaviour {
    #[default]
    RealOverridesVirtual,
    VirtualOverridesReal,
    MergeRealAndVirtual,
}

/// The provider implementation a rule is bound to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    UserDefined,
    EntryDn,
    EntryUuid,
    SubschemaSubentry,
    IsMemberOf,
    Member,
}

fn default_enabled() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VirtualAttributeConfig {
    /// Unique name of the rule. Configuration events address rules by this name.
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub attribute_type: String,
    pub provider: ProviderKind,
    #[serde(default)]
    pub base_dn: Vec<String>,
    #[serde(default)]
    pub group_dn: Vec<String>,
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default)]
    pub conflict_behavior: ConflictBehaviour,
    /// Values for the user-defined provider.
    #[serde(default)]
    pub value: Vec<String>,
    /// Member provider only.
    #[serde(default)]
    pub allow_retrieving_membership: bool,
}

impl VirtualAttributeConfig {
    pub fn new(name: &str, attribute_type: &str, provider: ProviderKind) -> Self {
        VirtualAttributeConfig {
            name: name.to_string(),
            enabled: true,
            attribute_type: attribute_type.to_string(),
            provider,
            base_dn: Vec::with_capacity(0),
            group_dn: Vec::with_capacity(0),
            filter: Vec::with_capacity(0),
            conflict_behavior: ConflictBehaviour::default(),
            value: Vec::with_capacity(0),
            allow_retrieving_membership: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Zero means unlimited.
    #[serde(default)]
    pub search_max_results: usize,
    #[serde(default)]
    pub search_time_limit_ms: Option<u64>,
    #[serde(default = "default_filter_max_elements")]
    pub filter_max_elements: usize,
}

fn default_filter_max_elements() -> usize {
    32
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            search_max_results: 0,
            search_time_limit_ms: None,
            filter_max_elements: default_filter_max_elements(),
        }
    }
}
