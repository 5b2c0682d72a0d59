use std::sync::Arc;

use crate::filter::SubstringAssertion;
use crate::prelude::*;

/// Presents the membership of a virtual static group through `member` or `uniqueMember`.
///
/// Listing every member of a large group is expensive, so the values are only produced
/// when the rule allows retrieving membership. Presence and equality assertions are
/// always answered from the target group.
#[derive(Debug, Clone)]
pub struct MemberProvider {
    allow_retrieving_membership: bool,
}

impl MemberProvider {
    pub fn new(allow_retrieving_membership: bool) -> Self {
        MemberProvider {
            allow_retrieving_membership,
        }
    }

    pub fn allow_retrieving_membership(&self) -> bool {
        self.allow_retrieving_membership
    }

    /// The virtual static group held by `entry`, if it presents its members through the
    /// attribute of this rule.
    fn virtual_static_group<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
    ) -> Option<Arc<GroupInstance>>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let group = txn.group_instance(entry.dn())?;
        let vs = group.as_virtual_static()?;
        if vs.member_attribute() != rule.attribute() {
            vattr_trace!(group = %entry.dn(), "group presents a different member attribute");
            return None;
        }
        Some(group)
    }
}

impl VirtualAttributeProvider for MemberProvider {
    fn is_multi_valued(&self) -> bool {
        true
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
        if !self.allow_retrieving_membership {
            return Ok(ValueSet::new());
        }
        let Some(group) = self.virtual_static_group(txn, entry, rule) else {
            return Ok(ValueSet::new());
        };
        let mut vs = ValueSet::new();
        let mut members = group.members(txn)?;
        while let Some(dn) = members.next_member_dn()? {
            vs.insert(Value::new(rule.attribute(), dn.as_str()));
        }
        Ok(vs)
    }

    /// True if the group has any member, whether or not the members may be listed.
    fn has_value<T>(
        &self,
        txn: &T,
        entry: &Entry,
        rule: &VirtualAttributeRule,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        match self.virtual_static_group(txn, entry, rule) {
            Some(group) => group.members(txn)?.next_member_dn().map(|m| m.is_some()),
            None => Ok(false),
        }
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
        let Some(group) = self.virtual_static_group(txn, entry, rule) else {
            return Ok(false);
        };
        match value.to_dn() {
            Some(dn) => group.is_member(txn, &dn),
            None => Ok(false),
        }
    }

    fn matches_substring<T>(
        &self,
        _txn: &T,
        _entry: &Entry,
        _rule: &VirtualAttributeRule,
        _sub: &SubstringAssertion,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(ConditionResult::Undefined)
    }

    fn greater_or_equal<T>(
        &self,
        _txn: &T,
        _entry: &Entry,
        _rule: &VirtualAttributeRule,
        _value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(ConditionResult::Undefined)
    }

    fn less_or_equal<T>(
        &self,
        _txn: &T,
        _entry: &Entry,
        _rule: &VirtualAttributeRule,
        _value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(ConditionResult::Undefined)
    }

    fn approximately_equal<T>(
        &self,
        _txn: &T,
        _entry: &Entry,
        _rule: &VirtualAttributeRule,
        _value: &Value,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(ConditionResult::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testkit::{add_entries, dn};

    const BASE: &[&str] = &[
        r#"{"dn": "o=test", "attrs": {"objectClass": ["top", "organization"]}}"#,
        r#"{"dn": "uid=a,o=test", "attrs": {"objectClass": ["person"], "givenName": ["test"]}}"#,
        r#"{"dn": "uid=b,o=test", "attrs": {"objectClass": ["person"], "givenName": ["test"]}}"#,
        r#"{"dn": "uid=c,o=test", "attrs": {"objectClass": ["person"], "givenName": ["other"]}}"#,
        r#"{"dn": "cn=dyn,o=test", "attrs": {
            "objectClass": ["top", "groupOfURLs"],
            "memberURL": ["ldap:///o=test??sub?(givenName=test)"]
        }}"#,
        r#"{"dn": "cn=empty,o=test", "attrs": {"objectClass": ["top", "groupOfNames"]}}"#,
        r#"{"dn": "cn=vs,o=test", "attrs": {
            "objectClass": ["top", "groupOfNames", "ds-virtual-static-group"],
            "ds-target-group-dn": ["cn=dyn,o=test"]
        }}"#,
        r#"{"dn": "cn=vsu,o=test", "attrs": {
            "objectClass": ["top", "groupOfUniqueNames", "ds-virtual-static-group"],
            "ds-target-group-dn": ["cn=dyn,o=test"]
        }}"#,
        r#"{"dn": "cn=vsempty,o=test", "attrs": {
            "objectClass": ["top", "groupOfNames", "ds-virtual-static-group"],
            "ds-target-group-dn": ["cn=empty,o=test"]
        }}"#,
    ];

    fn member_rule(attr: &str, allow: bool) -> VirtualAttributeConfig {
        let mut cfg = VirtualAttributeConfig::new(
            &format!("virtual static {}", attr),
            attr,
            ProviderKind::Member,
        );
        cfg.filter = vec!["(objectClass=ds-virtual-static-group)".to_string()];
        cfg.conflict_behavior = ConflictBehaviour::VirtualOverridesReal;
        cfg.allow_retrieving_membership = allow;
        cfg
    }

    fn setup(server: &DirectoryServer, allow: bool) {
        add_entries(server, BASE);
        let mut wr = server.write();
        wr.add_virtual_attribute(&member_rule("member", allow))
            .expect("invalid rule");
        wr.add_virtual_attribute(&member_rule("uniqueMember", allow))
            .expect("invalid rule");
        wr.commit().expect("commit failed");
    }

    fn values(rd: &DirectoryServerReadTransaction, group: &str, attr: Attribute) -> Vec<Dn> {
        rd.get_entry(&dn(group), VirtualAttributeDirectives::default())
            .expect("entry missing")
            .get_ava_set(&attr)
            .iter()
            .filter_map(Value::to_dn)
            .collect()
    }

    #[dir_test(with_rules = false)]
    fn test_member_provider_retrieving(server: &DirectoryServer) {
        setup(server, true);
        let rd = server.read();
        assert_eq!(
            values(&rd, "cn=vs,o=test", Attribute::Member),
            vec![dn("uid=a,o=test"), dn("uid=b,o=test")]
        );
        assert_eq!(
            values(&rd, "cn=vsu,o=test", Attribute::UniqueMember),
            vec![dn("uid=a,o=test"), dn("uid=b,o=test")]
        );
        // Each group presents its membership through one attribute only.
        assert!(values(&rd, "cn=vs,o=test", Attribute::UniqueMember).is_empty());
        assert!(values(&rd, "cn=vsu,o=test", Attribute::Member).is_empty());
        assert!(values(&rd, "cn=vsempty,o=test", Attribute::Member).is_empty());
    }

    #[dir_test(with_rules = false)]
    fn test_member_provider_not_retrieving(server: &DirectoryServer) {
        setup(server, false);
        let rd = server.read();
        assert!(values(&rd, "cn=vs,o=test", Attribute::Member).is_empty());

        let rule = rd.rule("virtual static member").expect("rule missing");
        let provider = rule.provider();
        let vs = rd.get_entry_real(&dn("cn=vs,o=test")).expect("entry missing");
        let vsu = rd.get_entry_real(&dn("cn=vsu,o=test")).expect("entry missing");
        let vsempty = rd.get_entry_real(&dn("cn=vsempty,o=test")).expect("entry missing");
        let user = rd.get_entry_real(&dn("uid=a,o=test")).expect("entry missing");

        assert_eq!(provider.values(&rd, &vs, &rule).map(|v| v.len()), Ok(0));
        assert_eq!(provider.has_value(&rd, &vs, &rule), Ok(true));
        assert_eq!(provider.has_value(&rd, &vsempty, &rule), Ok(false));
        assert_eq!(provider.has_value(&rd, &vsu, &rule), Ok(false));
        assert_eq!(provider.has_value(&rd, &user, &rule), Ok(false));

        let a = Value::new(&Attribute::Member, "uid=a,o=test");
        let c = Value::new(&Attribute::Member, "uid=c,o=test");
        assert_eq!(provider.has_value_eq(&rd, &vs, &rule, &a), Ok(true));
        assert_eq!(provider.has_value_eq(&rd, &vs, &rule, &c), Ok(false));
        assert_eq!(
            provider.has_any_value(&rd, &vs, &rule, &[c.clone(), a.clone()]),
            Ok(true)
        );
        assert_eq!(
            provider.matches_substring(
                &rd,
                &vs,
                &rule,
                &SubstringAssertion {
                    initial: Some("uid".to_string()),
                    any: Vec::with_capacity(0),
                    final_: None
                }
            ),
            Ok(ConditionResult::Undefined)
        );

        // Assertions through a search still reach the target group.
        let mut op = SearchOperation::new(
            dn("o=test"),
            SearchScope::Subtree,
            f_eq(Attribute::Member, "uid=b,o=test"),
        );
        rd.search(&mut op).expect("search failed");
        let found: Vec<_> = op.entries().iter().map(|e| e.dn().clone()).collect();
        assert_eq!(found, vec![dn("cn=vs,o=test")]);

        let mut op = SearchOperation::new(
            dn("o=test"),
            SearchScope::Subtree,
            f_pres(Attribute::Member),
        );
        rd.search(&mut op).expect("search failed");
        let found: Vec<_> = op.entries().iter().map(|e| e.dn().clone()).collect();
        assert_eq!(found, vec![dn("cn=vs,o=test")]);
    }

    #[dir_test(with_rules = false)]
    fn test_member_provider_dangling_target(server: &DirectoryServer) {
        setup(server, true);
        add_entries(
            server,
            &[r#"{"dn": "cn=dangling,o=test", "attrs": {
                "objectClass": ["top", "groupOfNames", "ds-virtual-static-group"],
                "ds-target-group-dn": ["cn=nothing,o=test"]
            }}"#],
        );
        let rd = server.read();
        assert_eq!(
            rd.get_entry(&dn("cn=dangling,o=test"), VirtualAttributeDirectives::default())
                .map(|_| ()),
            Err(OperationError::NoSuchObject)
        );
    }
}
