//! Virtual attributes. A virtual attribute rule binds an attribute type to a provider that
//! computes its values on demand, and decides which entries it applies to and how its
//! values combine with values stored on the entry.
//!
//! Providers are a closed set, dispatched through [`Provider`]. Each answers the same
//! questions as stored values would: what the values are, and whether a filter assertion
//! holds. Providers that can drive a search themselves report it through `is_searchable`.

use std::sync::Arc;

use itertools::Itertools;

use crate::filter::SubstringAssertion;
use crate::prelude::*;
use crate::value::valueset_condition;

pub mod entry_dn;
pub mod entry_uuid;
pub mod is_member_of;
pub mod member;
pub mod registry;
pub mod rule;
pub mod searchable;
pub mod subschema;
pub mod user_defined;

use self::entry_dn::EntryDnProvider;
use self::entry_uuid::EntryUuidProvider;
use self::is_member_of::IsMemberOfProvider;
use self::member::MemberProvider;
use self::subschema::SubschemaSubentryProvider;
use self::user_defined::UserDefinedProvider;

pub trait VirtualAttributeProvider {
    fn is_multi_valued(&self) -> bool;

    /// Compute the values of the attribute for `entry`. This is recomputed on every call.
    fn values<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
    ) -> Result<ValueSet, OperationError>
    where
        T: DirectoryTransaction + ?Sized;

    fn has_value<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.values(txn, entry, rule).map(|vs| !vs.is_empty())
    }

    fn has_value_eq<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.values(txn, entry, rule).map(|vs| vs.contains(value))
    }

    /// True if any of `values` is held. Always false for an empty slice.
    fn has_any_value<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        values: &[Value],
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        for v in values {
            if self.has_value_eq(txn, entry, rule, v)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn matches_substring<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        sub: &SubstringAssertion,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.values(txn, entry, rule)
            .map(|vs| valueset_condition(&vs, |v| v.matches_substring(sub)))
    }

    fn greater_or_equal<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.values(txn, entry, rule)
            .map(|vs| valueset_condition(&vs, |v| v.greater_or_equal(value)))
    }

    fn less_or_equal<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.values(txn, entry, rule)
            .map(|vs| valueset_condition(&vs, |v| v.less_or_equal(value)))
    }

    fn approximately_equal<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.values(txn, entry, rule)
            .map(|vs| valueset_condition(&vs, |v| v.approximately_equal(value)))
    }

    /// Can this provider drive `op` itself, rather than the search walking its scope
    /// and asking for values entry by entry?
    fn is_searchable<T>(&self, _txn: &T, _rule: &VirtualAttributeRule, _op: &SearchOperation) -> bool
    where
        T: DirectoryTransaction + ?Sized,
    {
        false
    }

    fn process_search<T>(
        &self,
        _txn: &T,
        rule: &VirtualAttributeRule,
        _op: &mut SearchOperation,
    ) -> Result<(), OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        vattr_error!(rule = %rule.name(), "provider can not process searches");
        Err(OperationError::UnwillingToPerform)
    }
}

#[derive(Debug, Clone)]
pub enum Provider {
    UserDefined(UserDefinedProvider),
    EntryDn(EntryDnProvider),
    EntryUuid(EntryUuidProvider),
    SubschemaSubentry(SubschemaSubentryProvider),
    IsMemberOf(IsMemberOfProvider),
    Member(MemberProvider),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $e:expr) => {
        match $self {
            Provider::UserDefined($p) => $e,
            Provider::EntryDn($p) => $e,
            Provider::EntryUuid($p) => $e,
            Provider::SubschemaSubentry($p) => $e,
            Provider::IsMemberOf($p) => $e,
            Provider::Member($p) => $e,
        }
    };
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::UserDefined(_) => ProviderKind::UserDefined,
            Provider::EntryDn(_) => ProviderKind::EntryDn,
            Provider::EntryUuid(_) => ProviderKind::EntryUuid,
            Provider::SubschemaSubentry(_) => ProviderKind::SubschemaSubentry,
            Provider::IsMemberOf(_) => ProviderKind::IsMemberOf,
            Provider::Member(_) => ProviderKind::Member,
        }
    }
}

impl VirtualAttributeProvider for Provider {
    fn is_multi_valued(&self) -> bool {
        dispatch!(self, p => p.is_multi_valued())
    }

    fn values<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
    ) -> Result<ValueSet, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.values(txn, entry, rule))
    }

    fn has_value<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.has_value(txn, entry, rule))
    }

    fn has_value_eq<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.has_value_eq(txn, entry, rule, value))
    }

    fn has_any_value<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        values: &[Value],
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.has_any_value(txn, entry, rule, values))
    }

    fn matches_substring<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        sub: &SubstringAssertion,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.matches_substring(txn, entry, rule, sub))
    }

    fn greater_or_equal<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.greater_or_equal(txn, entry, rule, value))
    }

    fn less_or_equal<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.less_or_equal(txn, entry, rule, value))
    }

    fn approximately_equal<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.approximately_equal(txn, entry, rule, value))
    }

    fn is_searchable<T>(&self, txn: &T, rule: &VirtualAttributeRule, op: &SearchOperation) -> bool
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.is_searchable(txn, rule, op))
    }

    fn process_search<T>(
        &self,
        txn: &T,
        rule: &VirtualAttributeRule,
        op: &mut SearchOperation,
    ) -> Result<(), OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        dispatch!(self, p => p.process_search(txn, rule, op))
    }
}

/// The value groups `attr` has on `entry` once every applicable rule has been applied.
/// `entry` must carry only its stored values.
pub fn values_for<T>(
    txn: &T,
    entry: &Entry,
    attr: &Attribute,
    directives: VirtualAttributeDirectives,
) -> Result<Vec<ValueGroup>, OperationError>
where
    T: DirectoryTransaction + ?Sized,
{
    let real = entry.real_values(attr).cloned();
    let mut groups: Vec<ValueGroup> = Vec::with_capacity(2);
    if !directives.virtual_only {
        if let Some(values) = real.clone() {
            groups.push(ValueGroup {
                origin: ValueOrigin::Real,
                values,
            });
        }
    }
    if directives.real_only {
        return Ok(groups);
    }

    for rule in txn.rules_for(attr) {
        if !rule.applies_to(txn, entry)? {
            continue;
        }
        let provider = rule.provider();

        if directives.virtual_only {
            let values = provider.values(txn, entry, &rule)?;
            if !values.is_empty() || provider.has_value(txn, entry, &rule)? {
                groups.push(ValueGroup {
                    origin: ValueOrigin::Virtual(rule.clone()),
                    values,
                });
            }
            continue;
        }

        match rule.conflict_behaviour() {
            ConflictBehaviour::RealOverridesVirtual => {
                if real.is_some() {
                    vattr_trace!(rule = %rule.name(), "real values present, provider skipped");
                    continue;
                }
                let values = provider.values(txn, entry, &rule)?;
                if !values.is_empty() || provider.has_value(txn, entry, &rule)? {
                    groups.push(ValueGroup {
                        origin: ValueOrigin::Virtual(rule.clone()),
                        values,
                    });
                }
            }
            ConflictBehaviour::VirtualOverridesReal => {
                let values = provider.values(txn, entry, &rule)?;
                if !values.is_empty() {
                    groups.retain(|g| !g.is_real());
                    groups.push(ValueGroup {
                        origin: ValueOrigin::Virtual(rule.clone()),
                        values,
                    });
                } else if real.is_none() && provider.has_value(txn, entry, &rule)? {
                    // Present without retrievable values. Assertions still reach the provider.
                    groups.push(ValueGroup {
                        origin: ValueOrigin::Virtual(rule.clone()),
                        values,
                    });
                }
            }
            ConflictBehaviour::MergeRealAndVirtual => {
                let values = provider.values(txn, entry, &rule)?;
                if !values.is_empty() || provider.has_value(txn, entry, &rule)? {
                    groups.push(ValueGroup {
                        origin: ValueOrigin::Virtual(rule.clone()),
                        values,
                    });
                }
            }
        }
    }
    Ok(groups)
}

/// Produce a copy of a stored entry with its virtual attributes computed.
#[instrument(level = "debug", skip_all, fields(dn = %entry.dn()))]
pub fn resolve_virtual_attributes<T>(
    txn: &T,
    entry: &Entry,
    directives: VirtualAttributeDirectives,
) -> Result<Entry, OperationError>
where
    T: DirectoryTransaction + ?Sized,
{
    let mut resolved = entry.clone();
    if directives.real_only {
        return Ok(resolved);
    }

    let rules: Vec<Arc<VirtualAttributeRule>> = txn.rules();
    for attr in rules.iter().map(|r| r.attribute()).sorted().dedup() {
        let groups = values_for(txn, entry, attr, directives)?;
        resolved.set_value_groups(attr.clone(), groups);
    }

    if directives.virtual_only {
        resolved.retain_virtual();
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testkit::{add_entries, dn};

    const BASE: &[&str] = &[
        r#"{"dn": "o=test", "attrs": {"objectClass": ["top", "organization"]}}"#,
        r#"{"dn": "ou=People,o=test", "attrs": {"objectClass": ["top", "organizationalUnit"]}}"#,
        r#"{"dn": "ou=Other,o=test", "attrs": {"objectClass": ["top", "organizationalUnit"]}}"#,
        r#"{"dn": "uid=real,ou=People,o=test", "attrs": {
            "objectClass": ["person"], "description": ["real"], "sn": ["real"]
        }}"#,
        r#"{"dn": "uid=bare,ou=People,o=test", "attrs": {"objectClass": ["person"], "sn": ["bare"]}}"#,
        r#"{"dn": "uid=elsewhere,ou=Other,o=test", "attrs": {"objectClass": ["person"], "sn": ["elsewhere"]}}"#,
        r#"{"dn": "cn=staff,o=test", "attrs": {
            "objectClass": ["groupOfNames"], "member": ["uid=bare,ou=People,o=test"]
        }}"#,
    ];

    fn description_rule(behaviour: ConflictBehaviour) -> VirtualAttributeConfig {
        let mut cfg =
            VirtualAttributeConfig::new("description", "description", ProviderKind::UserDefined);
        cfg.value = vec!["virtual".to_string()];
        cfg.conflict_behavior = behaviour;
        cfg
    }

    fn setup(server: &DirectoryServer, cfg: &VirtualAttributeConfig) {
        add_entries(server, BASE);
        let mut wr = server.write();
        wr.add_virtual_attribute(cfg).expect("invalid rule");
        wr.commit().expect("commit failed");
    }

    /// (is real, values) of each group of description on the entry.
    fn groups(server: &DirectoryServer, entry: &str) -> Vec<(bool, Vec<String>)> {
        let rd = server.read();
        let real = rd.get_entry_real(&dn(entry)).expect("entry missing");
        rd.values_for(&real, &Attribute::Description, VirtualAttributeDirectives::default())
            .expect("values failed")
            .iter()
            .map(|g| {
                (
                    g.is_real(),
                    g.values.iter().map(|v| v.as_str().to_string()).collect(),
                )
            })
            .collect()
    }

    fn s(v: &str) -> Vec<String> {
        vec![v.to_string()]
    }

    #[dir_test(with_rules = false)]
    fn test_real_overrides_virtual(server: &DirectoryServer) {
        setup(server, &description_rule(ConflictBehaviour::RealOverridesVirtual));
        assert_eq!(groups(server, "uid=real,ou=People,o=test"), vec![(true, s("real"))]);
        assert_eq!(groups(server, "uid=bare,ou=People,o=test"), vec![(false, s("virtual"))]);
    }

    #[dir_test(with_rules = false)]
    fn test_real_overrides_failing_provider(server: &DirectoryServer) {
        add_entries(server, BASE);
        add_entries(
            server,
            &[
                r#"{"dn": "cn=dangling,o=test", "attrs": {
                    "objectClass": ["groupOfNames", "ds-virtual-static-group"],
                    "ds-target-group-dn": ["cn=nothing,o=test"],
                    "member": ["uid=real,ou=People,o=test"]
                }}"#,
                r#"{"dn": "cn=bare dangling,o=test", "attrs": {
                    "objectClass": ["groupOfNames", "ds-virtual-static-group"],
                    "ds-target-group-dn": ["cn=nothing,o=test"]
                }}"#,
            ],
        );
        let mut cfg = VirtualAttributeConfig::new("member", "member", ProviderKind::Member);
        cfg.filter = vec!["(objectClass=ds-virtual-static-group)".to_string()];
        cfg.conflict_behavior = ConflictBehaviour::RealOverridesVirtual;
        cfg.allow_retrieving_membership = true;
        let mut wr = server.write();
        wr.add_virtual_attribute(&cfg).expect("invalid rule");
        wr.commit().expect("commit failed");

        // Real values win, so the provider that cannot resolve its target is never asked.
        let rd = server.read();
        let e = rd
            .get_entry(&dn("cn=dangling,o=test"), VirtualAttributeDirectives::default())
            .expect("entry with real values should resolve");
        let members = e.value_groups(&Attribute::Member);
        assert_eq!(members.len(), 1);
        assert!(members[0].is_real());
        assert!(e.attribute_equality(
            &Attribute::Member,
            &Value::new(&Attribute::Member, "uid=real,ou=People,o=test")
        ));

        // Without real values the provider runs, and its failure is reported.
        assert!(rd
            .get_entry(&dn("cn=bare dangling,o=test"), VirtualAttributeDirectives::default())
            .is_err());
    }

    #[dir_test(with_rules = false)]
    fn test_virtual_overrides_real(server: &DirectoryServer) {
        setup(server, &description_rule(ConflictBehaviour::VirtualOverridesReal));
        assert_eq!(groups(server, "uid=real,ou=People,o=test"), vec![(false, s("virtual"))]);
        assert_eq!(groups(server, "uid=bare,ou=People,o=test"), vec![(false, s("virtual"))]);

        let rd = server.read();
        let e = rd
            .get_entry(&dn("uid=real,ou=People,o=test"), VirtualAttributeDirectives::default())
            .expect("entry missing");
        assert!(!e.entry_match(&rd, &f_eq(Attribute::Description, "real")).expect("match failed").is_true());
        assert!(e.entry_match(&rd, &f_eq(Attribute::Description, "VIRTUAL")).expect("match failed").is_true());
    }

    #[dir_test(with_rules = false)]
    fn test_merge_real_and_virtual(server: &DirectoryServer) {
        setup(server, &description_rule(ConflictBehaviour::MergeRealAndVirtual));
        assert_eq!(
            groups(server, "uid=real,ou=People,o=test"),
            vec![(true, s("real")), (false, s("virtual"))]
        );
        assert_eq!(groups(server, "uid=bare,ou=People,o=test"), vec![(false, s("virtual"))]);

        let rd = server.read();
        let e = rd
            .get_entry(&dn("uid=real,ou=People,o=test"), VirtualAttributeDirectives::default())
            .expect("entry missing");
        let union: Vec<_> = e
            .get_ava_set(&Attribute::Description)
            .iter()
            .map(|v| v.as_str().to_string())
            .collect();
        assert_eq!(union, vec!["real".to_string(), "virtual".to_string()]);
        assert!(e.entry_match(&rd, &f_eq(Attribute::Description, "real")).expect("match failed").is_true());
        assert!(e.entry_match(&rd, &f_eq(Attribute::Description, "virtual")).expect("match failed").is_true());
        assert_eq!(
            e.entry_match(&rd, &f_sub(Attribute::Description, Some("vir"), &[], None)),
            Ok(ConditionResult::True)
        );
    }

    #[dir_test(with_rules = false)]
    fn test_directives(server: &DirectoryServer) {
        setup(server, &description_rule(ConflictBehaviour::MergeRealAndVirtual));
        let rd = server.read();
        let get = |directives| {
            rd.get_entry(&dn("uid=real,ou=People,o=test"), directives)
                .expect("entry missing")
        };

        let e = get(VirtualAttributeDirectives::real_only());
        assert!(!e.has_virtual());
        assert_eq!(e.value_groups(&Attribute::Description).len(), 1);
        assert!(e.attribute_pres(&Attribute::Sn));

        let e = get(VirtualAttributeDirectives::virtual_only());
        let groups = e.value_groups(&Attribute::Description);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_real());
        assert!(!e.attribute_pres(&Attribute::Sn));
    }

    #[dir_test(with_rules = false)]
    fn test_rule_scoping(server: &DirectoryServer) {
        let mut cfg = description_rule(ConflictBehaviour::RealOverridesVirtual);
        cfg.base_dn = vec!["ou=People,o=test".to_string()];
        setup(server, &cfg);
        assert_eq!(groups(server, "uid=bare,ou=People,o=test"), vec![(false, s("virtual"))]);
        assert!(groups(server, "uid=elsewhere,ou=Other,o=test").is_empty());

        let mut cfg = description_rule(ConflictBehaviour::RealOverridesVirtual);
        cfg.filter = vec!["(sn=elsewhere)".to_string(), "(sn=nobody)".to_string()];
        let mut wr = server.write();
        wr.modify_virtual_attribute(&cfg).expect("modify failed");
        wr.commit().expect("commit failed");
        assert!(groups(server, "uid=bare,ou=People,o=test").is_empty());
        assert_eq!(
            groups(server, "uid=elsewhere,ou=Other,o=test"),
            vec![(false, s("virtual"))]
        );

        let mut cfg = description_rule(ConflictBehaviour::RealOverridesVirtual);
        cfg.group_dn = vec!["cn=missing,o=test".to_string(), "cn=staff,o=test".to_string()];
        let mut wr = server.write();
        wr.modify_virtual_attribute(&cfg).expect("modify failed");
        wr.commit().expect("commit failed");
        assert_eq!(groups(server, "uid=bare,ou=People,o=test"), vec![(false, s("virtual"))]);
        assert!(groups(server, "uid=elsewhere,ou=Other,o=test").is_empty());

        let rd = server.read();
        let rule = rd.rule("description").expect("rule missing");
        let bare = rd.get_entry_real(&dn("uid=bare,ou=People,o=test")).expect("entry missing");
        let elsewhere = rd.get_entry_real(&dn("uid=elsewhere,ou=Other,o=test")).expect("entry missing");
        assert_eq!(rule.applies_to(&rd, &bare), Ok(true));
        assert_eq!(rule.applies_to(&rd, &elsewhere), Ok(false));
    }

    #[dir_test(with_rules = false)]
    fn test_default_provider_search_refused(server: &DirectoryServer) {
        setup(server, &description_rule(ConflictBehaviour::RealOverridesVirtual));
        let rd = server.read();
        let rule = rd.rule("description").expect("rule missing");
        let mut op = SearchOperation::new(
            dn("o=test"),
            SearchScope::Subtree,
            f_eq(Attribute::Description, "virtual"),
        );
        assert!(!rule.provider().is_searchable(&rd, &rule, &op));
        assert_eq!(
            rule.provider().process_search(&rd, &rule, &mut op),
            Err(OperationError::UnwillingToPerform)
        );

        // The normal search still finds the computed values.
        rd.search(&mut op).expect("search failed");
        let mut found: Vec<_> = op.entries().iter().map(|e| e.dn().clone()).collect();
        found.sort();
        assert_eq!(found.len(), 6);
        assert!(!found.contains(&dn("uid=real,ou=People,o=test")));
    }
}
