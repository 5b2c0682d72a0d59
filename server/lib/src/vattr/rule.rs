use std::fmt;
use std::str::FromStr;

use crate::prelude::*;
use crate::vattr::entry_dn::EntryDnProvider;
use crate::vattr::entry_uuid::EntryUuidProvider;
use crate::vattr::is_member_of::IsMemberOfProvider;
use crate::vattr::member::MemberProvider;
use crate::vattr::subschema::SubschemaSubentryProvider;
use crate::vattr::user_defined::UserDefinedProvider;

/// A virtual attribute rule. Once built a rule never changes; a configuration change
/// replaces the whole rule in the registry.
#[derive(Debug, Clone)]
pub struct VirtualAttributeRule {
    name: String,
    attribute: Attribute,
    provider: Provider,
    base_dns: Vec<Dn>,
    group_dns: Vec<Dn>,
    filters: Vec<Filter>,
    conflict_behaviour: ConflictBehaviour,
    enabled: bool,
}

fn invalid(name: &str, msg: &str) -> OperationError {
    admin_error!(rule = %name, "{}", msg);
    OperationError::InvalidConfiguration(format!("{}: {}", name, msg))
}

impl VirtualAttributeRule {
    pub fn try_from_config(cfg: &VirtualAttributeConfig) -> Result<Self, OperationError> {
        let name = cfg.name.as_str();
        if name.trim().is_empty() {
            return Err(invalid(name, "rule name must not be empty"));
        }
        if !Attribute::is_valid_name(&cfg.attribute_type) {
            return Err(invalid(name, "invalid attribute type"));
        }
        let attribute = Attribute::from_str(&cfg.attribute_type);

        let base_dns = cfg
            .base_dn
            .iter()
            .map(|s| Dn::from_str(s).map_err(|_| invalid(name, "invalid base dn")))
            .collect::<Result<Vec<_>, _>>()?;
        let group_dns = cfg
            .group_dn
            .iter()
            .map(|s| Dn::from_str(s).map_err(|_| invalid(name, "invalid group dn")))
            .collect::<Result<Vec<_>, _>>()?;
        let filters = cfg
            .filter
            .iter()
            .map(|s| Filter::from_str(s).map_err(|_| invalid(name, "invalid filter")))
            .collect::<Result<Vec<_>, _>>()?;

        if cfg.provider != ProviderKind::UserDefined && !cfg.value.is_empty() {
            return Err(invalid(name, "values may only be set for the user-defined provider"));
        }
        if cfg.provider != ProviderKind::Member && cfg.allow_retrieving_membership {
            return Err(invalid(
                name,
                "allow_retrieving_membership may only be set for the member provider",
            ));
        }

        let provider = match cfg.provider {
            ProviderKind::UserDefined => {
                if cfg.value.is_empty() {
                    return Err(invalid(name, "the user-defined provider requires values"));
                }
                Provider::UserDefined(UserDefinedProvider::new(&attribute, &cfg.value))
            }
            ProviderKind::EntryDn => Provider::EntryDn(EntryDnProvider),
            ProviderKind::EntryUuid => Provider::EntryUuid(EntryUuidProvider),
            ProviderKind::SubschemaSubentry => {
                Provider::SubschemaSubentry(SubschemaSubentryProvider::default())
            }
            ProviderKind::IsMemberOf => Provider::IsMemberOf(IsMemberOfProvider),
            ProviderKind::Member => {
                if !matches!(attribute, Attribute::Member | Attribute::UniqueMember) {
                    return Err(invalid(
                        name,
                        "the member provider only serves member or uniqueMember",
                    ));
                }
                Provider::Member(MemberProvider::new(cfg.allow_retrieving_membership))
            }
        };

        Ok(VirtualAttributeRule {
            name: cfg.name.clone(),
            attribute,
            provider,
            base_dns,
            group_dns,
            filters,
            conflict_behaviour: cfg.conflict_behavior,
            enabled: cfg.enabled,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn base_dns(&self) -> &[Dn] {
        &self.base_dns
    }

    pub fn group_dns(&self) -> &[Dn] {
        &self.group_dns
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn conflict_behaviour(&self) -> ConflictBehaviour {
        self.conflict_behaviour
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Is `dn` inside one of the base DNs of this rule? A rule without base DNs covers the
    /// whole tree.
    pub fn in_base(&self, dn: &Dn) -> bool {
        self.base_dns.is_empty() || self.base_dns.iter().any(|b| dn.is_descendant_of(b))
    }

    /// Decide if this rule applies to a stored entry. The entry must be within a base DN,
    /// match one of the filters on its real values, and be a member of one of the groups.
    /// Each empty restriction is unrestricted.
    pub fn applies_to<T>(&self, txn: &T, entry: &Entry) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        if !self.in_base(entry.dn()) {
            return Ok(false);
        }

        if !self.filters.is_empty()
            && !self
                .filters
                .iter()
                .any(|f| entry.entry_match_real(f).is_true())
        {
            return Ok(false);
        }

        if self.group_dns.is_empty() {
            return Ok(true);
        }
        for gdn in &self.group_dns {
            let Some(group) = txn.group_instance(gdn) else {
                vattr_warn!(rule = %self.name, group = %gdn, "rule refers to a group that does not exist");
                continue;
            };
            if group.is_member_entry(txn, entry)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Display for VirtualAttributeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?} -> {})", self.name, self.provider.kind(), self.attribute)
    }
}
