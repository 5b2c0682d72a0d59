use crate::filter::SubstringAssertion;
use crate::prelude::*;
use crate::vattr::searchable::{has_equality_anchor, process_search_scan};

/// Presents the DNs of every group the entry is a member of. This includes dynamic groups,
/// groups reached through nesting and virtual static groups over any of these.
#[derive(Debug, Clone)]
pub struct IsMemberOfProvider;

impl VirtualAttributeProvider for IsMemberOfProvider {
    fn is_multi_valued(&self) -> bool {
        true
    }

    #[instrument(level = "trace", skip_all)]
    fn values<T>(
        &self,
        txn: &T,
        entry: &Entry,
        _rule: &VirtualAttributeRule,
    ) -> Result<ValueSet, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let mut vs = ValueSet::new();
        for group in txn.group_instances() {
            if group.is_member_entry(txn, entry)? {
                vs.insert(Value::new_dn(group.group_dn()));
            }
        }
        Ok(vs)
    }

    fn has_value<T>(
        &self,
        txn: &T,
        entry: &Entry,
        _rule: &VirtualAttributeRule,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        for group in txn.group_instances() {
            if group.is_member_entry(txn, entry)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn has_value_eq<T>(
        &self,
        txn: &T,
        entry: &Entry,
        _rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let Some(gdn) = value.to_dn() else {
            return Ok(false);
        };
        match txn.group_instance(&gdn) {
            Some(group) => group.is_member_entry(txn, entry),
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

    fn is_searchable<T>(&self, _txn: &T, rule: &VirtualAttributeRule, op: &SearchOperation) -> bool
    where
        T: DirectoryTransaction + ?Sized,
    {
        has_equality_anchor(op.filter(), rule.attribute())
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
        process_search_scan(txn, rule, op)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::prelude::*;
    use crate::testkit::{add_entries, dn};

    const PEOPLE: &[&str] = &[
        r#"{"dn": "o=test", "attrs": {"objectClass": ["top", "organization"], "o": ["test"]}}"#,
        r#"{"dn": "ou=People,o=test", "attrs": {"objectClass": ["top", "organizationalUnit"]}}"#,
        r#"{"dn": "ou=Groups,o=test", "attrs": {"objectClass": ["top", "organizationalUnit"]}}"#,
        r#"{"dn": "uid=test.user,ou=People,o=test", "attrs": {
            "objectClass": ["top", "person", "organizationalPerson", "inetOrgPerson"],
            "uid": ["test.user"], "givenName": ["Test"], "sn": ["User"], "cn": ["Test User"]
        }}"#,
        r#"{"dn": "uid=test.user2,ou=People,o=test", "attrs": {
            "objectClass": ["top", "person", "organizationalPerson", "inetOrgPerson"],
            "uid": ["test.user2"], "givenName": ["Test"], "sn": ["User2"], "cn": ["Test User2"]
        }}"#,
        r#"{"dn": "uid=test.user3,ou=People,o=test", "attrs": {
            "objectClass": ["top", "person", "organizationalPerson", "inetOrgPerson"],
            "uid": ["test.user3"], "givenName": ["Test"], "sn": ["User3"], "cn": ["Test User3"]
        }}"#,
    ];

    const STATIC_GROUPS: &[&str] = &[
        r#"{"dn": "cn=group1,ou=Groups,o=test", "attrs": {
            "objectClass": ["top", "groupOfNames"],
            "member": ["uid=test.user,ou=People,o=test"]
        }}"#,
        r#"{"dn": "cn=group2,ou=Groups,o=test", "attrs": {
            "objectClass": ["top", "groupOfNames"],
            "member": ["uid=test.user2,ou=People,o=test"]
        }}"#,
        r#"{"dn": "cn=group3,ou=Groups,o=test", "attrs": {
            "objectClass": ["top", "groupOfNames"],
            "member": ["uid=test.user,ou=People,o=test", "uid=test.user2,ou=People,o=test"]
        }}"#,
        r#"{"dn": "cn=group4,ou=Groups,o=test", "attrs": {
            "objectClass": ["top", "groupOfUniqueNames"],
            "uniqueMember": ["uid=test.user2,ou=People,o=test", "uid=test.user3,ou=People,o=test"]
        }}"#,
    ];

    const G1: &str = "cn=group1,ou=Groups,o=test";
    const G2: &str = "cn=group2,ou=Groups,o=test";
    const G3: &str = "cn=group3,ou=Groups,o=test";
    const G4: &str = "cn=group4,ou=Groups,o=test";
    const USER: &str = "uid=test.user,ou=People,o=test";

    fn member_of(server: &DirectoryServer, user: &str) -> Vec<Dn> {
        let rd = server.read();
        rd.get_entry(&dn(user), VirtualAttributeDirectives::default())
            .expect("entry missing")
            .get_ava_set(&Attribute::IsMemberOf)
            .iter()
            .filter_map(Value::to_dn)
            .collect()
    }

    #[dir_test]
    fn test_is_member_of_static_and_dynamic(server: &DirectoryServer) {
        add_entries(server, PEOPLE);
        add_entries(
            server,
            &[
                r#"{"dn": "cn=group1,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfNames"],
                    "member": ["uid=test.user,ou=People,o=test"]
                }}"#,
                r#"{"dn": "cn=group2,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfNames"],
                    "member": ["uid=test.user2,ou=People,o=test"]
                }}"#,
                r#"{"dn": "cn=group3,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfUniqueNames"],
                    "uniqueMember": ["uid=test.user,ou=People,o=test", "uid=test.user2,ou=People,o=test"]
                }}"#,
                r#"{"dn": "cn=group4,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfURLs"],
                    "memberURL": ["ldap:///ou=People,o=test??sub?(uid=test.user)"]
                }}"#,
                r#"{"dn": "cn=group5,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfURLs"],
                    "memberURL": ["ldap:///ou=People,o=test??sub?(uid=test.user1)"]
                }}"#,
                r#"{"dn": "cn=group6,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfURLs"],
                    "memberURL": ["ldap:///ou=People,o=test??sub?(givenName=test)"]
                }}"#,
            ],
        );

        let mut groups = member_of(server, USER);
        groups.sort();
        let mut expected = vec![
            dn(G1),
            dn(G3),
            dn("cn=group4,ou=Groups,o=test"),
            dn("cn=group6,ou=Groups,o=test"),
        ];
        expected.sort();
        assert_eq!(groups, expected);

        let rd = server.read();
        let rule = rd.rule("isMemberOf").expect("builtin rule missing");
        let provider = rule.provider();
        let real = rd.get_entry_real(&dn(USER)).expect("entry missing");
        assert!(provider.is_multi_valued());
        assert_eq!(provider.has_value(&rd, &real, &rule), Ok(true));
        let v = |s: &str| Value::new(&Attribute::IsMemberOf, s);
        assert_eq!(provider.has_value_eq(&rd, &real, &rule, &v(G1)), Ok(true));
        assert_eq!(provider.has_value_eq(&rd, &real, &rule, &v(G2)), Ok(false));
        assert_eq!(provider.has_value_eq(&rd, &real, &rule, &v("invalid")), Ok(false));
        assert_eq!(
            provider.has_any_value(&rd, &real, &rule, &[v(G2), v(G3)]),
            Ok(true)
        );
        assert_eq!(provider.has_any_value(&rd, &real, &rule, &[v(G2)]), Ok(false));
        assert_eq!(provider.has_any_value(&rd, &real, &rule, &[]), Ok(false));
        assert_eq!(
            provider.greater_or_equal(&rd, &real, &rule, &v(G1)),
            Ok(ConditionResult::Undefined)
        );
    }

    #[dir_test]
    fn test_is_member_of_nested_and_virtual_static(server: &DirectoryServer) {
        add_entries(server, PEOPLE);
        add_entries(
            server,
            &[
                r#"{"dn": "cn=inner,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfNames"],
                    "member": ["uid=test.user,ou=People,o=test"]
                }}"#,
                r#"{"dn": "cn=outer,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfNames"],
                    "member": ["cn=inner,ou=Groups,o=test"]
                }}"#,
                r#"{"dn": "cn=vs,ou=Groups,o=test", "attrs": {
                    "objectClass": ["top", "groupOfNames", "ds-virtual-static-group"],
                    "ds-target-group-dn": ["cn=outer,ou=Groups,o=test"]
                }}"#,
            ],
        );
        let groups = member_of(server, USER);
        assert_eq!(groups.len(), 3);
        assert!(groups.contains(&dn("cn=vs,ou=Groups,o=test")));
        assert!(member_of(server, "uid=test.user3,ou=People,o=test").is_empty());

        // An entry in no group carries no isMemberOf at all.
        let rd = server.read();
        let e = rd
            .get_entry(&dn("uid=test.user3,ou=People,o=test"), VirtualAttributeDirectives::default())
            .expect("entry missing");
        assert!(e.value_groups(&Attribute::IsMemberOf).is_empty());
    }

    #[dir_test]
    fn test_is_member_of_dangling_virtual_static_fails(server: &DirectoryServer) {
        add_entries(server, PEOPLE);
        add_entries(
            server,
            &[r#"{"dn": "cn=vs,ou=Groups,o=test", "attrs": {
                "objectClass": ["top", "groupOfNames", "ds-virtual-static-group"],
                "ds-target-group-dn": ["cn=missing,ou=Groups,o=test"]
            }}"#],
        );
        let rd = server.read();
        assert_eq!(
            rd.get_entry(&dn(USER), VirtualAttributeDirectives::default())
                .map(|_| ()),
            Err(OperationError::NoSuchObject)
        );
        // Without virtual attributes the entry is still readable.
        assert!(rd
            .get_entry(&dn(USER), VirtualAttributeDirectives::real_only())
            .is_ok());
    }

    fn process(server: &DirectoryServer, base: &str, scope: SearchScope, filter: &str) -> Option<Vec<Dn>> {
        let rd = server.read();
        let rule = rd.rule("isMemberOf").expect("builtin rule missing");
        let filter = Filter::from_str(filter).expect("invalid filter");
        let mut op = SearchOperation::new(dn(base), scope, filter);
        if !rule.provider().is_searchable(&rd, &rule, &op) {
            return None;
        }
        rule.provider()
            .process_search(&rd, &rule, &mut op)
            .expect("search failed");
        Some(op.entries().iter().map(|e| e.dn().clone()).collect())
    }

    #[dir_test]
    fn test_is_member_of_process_search(server: &DirectoryServer) {
        add_entries(server, PEOPLE);
        add_entries(server, STATIC_GROUPS);

        let base = |f: String| process(server, USER, SearchScope::Base, &f);
        let matched = Some(vec![dn(USER)]);
        let none = Some(Vec::new());

        assert_eq!(base(format!("(isMemberOf={})", G1)), matched);
        assert_eq!(base(format!("(&(isMemberOf={})(givenName=test))", G1)), matched);
        assert_eq!(base(format!("(&(isMemberOf={})(givenName=not test))", G1)), none);
        assert_eq!(base(format!("(&(isMemberOf={})(isMemberOf={}))", G1, G2)), none);
        assert_eq!(base(format!("(&(isMemberOf={})(isMemberOf={}))", G1, G3)), matched);
        assert_eq!(base(format!("(&(isMemberOf={})(isMemberOf={}))", G2, G4)), none);
        assert_eq!(base(format!("(|(isMemberOf={})(isMemberOf={}))", G1, G3)), matched);
        assert_eq!(base("(isMemberOf=invalid)".to_string()), none);
        assert_eq!(base(format!("(!(isMemberOf={}))", G2)), None);
        assert_eq!(base("(isMemberOf=*)".to_string()), None);

        let mut both = process(
            server,
            "o=test",
            SearchScope::Subtree,
            &format!("(&(isMemberOf={})(isMemberOf={}))", G3, G4),
        )
        .expect("not searchable");
        both.sort();
        assert_eq!(both, vec![dn("uid=test.user2,ou=People,o=test")]);

        let mut either = process(
            server,
            "ou=People,o=test",
            SearchScope::OneLevel,
            &format!("(|(isMemberOf={})(isMemberOf={}))", G1, G4),
        )
        .expect("not searchable");
        either.sort();
        assert_eq!(either.len(), 3);
    }

    #[dir_test]
    fn test_is_member_of_search_end_to_end(server: &DirectoryServer) {
        add_entries(server, PEOPLE);
        add_entries(server, STATIC_GROUPS);
        let rd = server.read();

        // Searchable path.
        let mut op = SearchOperation::new(
            dn("o=test"),
            SearchScope::Subtree,
            Filter::from_str(&format!("(isMemberOf={})", G4)).expect("invalid filter"),
        );
        rd.search(&mut op).expect("search failed");
        let mut found: Vec<_> = op.entries().iter().map(|e| e.dn().clone()).collect();
        found.sort();
        assert_eq!(
            found,
            vec![
                dn("uid=test.user2,ou=People,o=test"),
                dn("uid=test.user3,ou=People,o=test")
            ]
        );

        // Unsearchable, evaluated by the normal scan.
        let mut op = SearchOperation::new(
            dn("o=test"),
            SearchScope::Subtree,
            Filter::from_str(&format!("(!(isMemberOf={}))", G3)).expect("invalid filter"),
        );
        rd.search(&mut op).expect("search failed");
        let found: Vec<_> = op.entries().iter().map(|e| e.dn().clone()).collect();
        assert!(found.contains(&dn("uid=test.user3,ou=People,o=test")));
        assert!(!found.contains(&dn(USER)));
        assert!(found.contains(&dn(G1)));
    }
}
