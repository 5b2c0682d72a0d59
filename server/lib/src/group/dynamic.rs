use std::str::FromStr;

use hashbrown::HashSet;

use crate::group::url::LdapUrl;
use crate::prelude::*;
use crate::server::DirectoryServerWriteTransaction;

/// A group whose members are the entries matched by its member URLs. Membership is
/// computed from real attribute values only.
#[derive(Debug, Clone)]
pub struct DynamicGroup {
    dn: Dn,
    urls: Vec<LdapUrl>,
}

impl DynamicGroup {
    pub fn try_from_entry(entry: &Entry) -> Result<Self, OperationError> {
        let urls = entry
            .real_values(&Attribute::MemberUrl)
            .map(|vs| {
                vs.iter()
                    .map(|v| LdapUrl::from_str(v.as_str()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(|e| {
                group_error!(group = %entry.dn(), "invalid memberURL on dynamic group");
                e
            })?
            .unwrap_or_default();

        Ok(DynamicGroup {
            dn: entry.dn().clone(),
            urls,
        })
    }

    pub fn member_urls(&self) -> &[LdapUrl] {
        &self.urls
    }
}

impl Group for DynamicGroup {
    fn group_dn(&self) -> &Dn {
        &self.dn
    }

    fn is_member_examined<T>(
        &self,
        txn: &T,
        dn: &Dn,
        examined: &mut HashSet<Dn>,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        match txn.get_entry_real(dn) {
            Some(entry) => self.is_member_entry_examined(txn, &entry, examined),
            None => Ok(false),
        }
    }

    fn is_member_entry_examined<T>(
        &self,
        _txn: &T,
        entry: &Entry,
        _examined: &mut HashSet<Dn>,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(self.urls.iter().any(|u| u.matches(entry)))
    }

    fn members<'a, T>(&self, txn: &'a T) -> Result<MemberList<'a>, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let mut seen: HashSet<Dn> = HashSet::new();
        let iter = self
            .urls
            .clone()
            .into_iter()
            .flat_map(move |url| {
                txn.scan(&url.base, url.scope)
                    .into_iter()
                    .filter(move |e| e.entry_match_real(&url.filter).is_true())
            })
            .filter(move |e| seen.insert(e.dn().clone()))
            .map(|e| {
                Ok(Member {
                    dn: e.dn().clone(),
                    entry: Some(e),
                })
            });
        Ok(MemberList::new(iter))
    }

    fn may_alter_member_list(&self) -> bool {
        false
    }

    fn supports_nested_groups(&self) -> bool {
        false
    }

    fn nested_group_dns<T>(&self, _txn: &T) -> Vec<Dn>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Vec::with_capacity(0)
    }

    fn add_member(
        &self,
        _txn: &mut DirectoryServerWriteTransaction<'_>,
        _dn: &Dn,
    ) -> Result<(), OperationError> {
        Err(OperationError::UnwillingToPerform)
    }

    fn remove_member(
        &self,
        _txn: &mut DirectoryServerWriteTransaction<'_>,
        _dn: &Dn,
    ) -> Result<(), OperationError> {
        Err(OperationError::UnwillingToPerform)
    }

    fn add_nested_group(
        &self,
        _txn: &mut DirectoryServerWriteTransaction<'_>,
        _dn: &Dn,
    ) -> Result<(), OperationError> {
        Err(OperationError::UnwillingToPerform)
    }

    fn remove_nested_group(
        &self,
        _txn: &mut DirectoryServerWriteTransaction<'_>,
        _dn: &Dn,
    ) -> Result<(), OperationError> {
        Err(OperationError::UnwillingToPerform)
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testkit::{add_entries, dn};

    const BASE: &[&str] = &[
        r#"{"dn": "o=test", "attrs": {"objectClass": ["top", "organization"]}}"#,
        r#"{"dn": "ou=People,o=test", "attrs": {"objectClass": ["top", "organizationalUnit"]}}"#,
        r#"{"dn": "ou=Other,o=test", "attrs": {"objectClass": ["top", "organizationalUnit"]}}"#,
        r#"{"dn": "uid=a,ou=People,o=test", "attrs": {"objectClass": ["person"], "givenName": ["test"], "sn": ["a"]}}"#,
        r#"{"dn": "uid=b,ou=People,o=test", "attrs": {"objectClass": ["person"], "givenName": ["other"], "sn": ["b"]}}"#,
        r#"{"dn": "uid=c,ou=Other,o=test", "attrs": {"objectClass": ["person"], "givenName": ["test"], "sn": ["c"]}}"#,
        r#"{"dn": "cn=dyn,o=test", "attrs": {
            "objectClass": ["top", "groupOfURLs"],
            "memberURL": [
                "ldap:///ou=People,o=test??sub?(givenName=test)",
                "ldap:///o=test??sub?(sn=a)"
            ]
        }}"#,
    ];

    #[dir_test(with_rules = false)]
    fn test_dynamic_group_membership(server: &DirectoryServer) {
        add_entries(server, BASE);
        let rd = server.read();
        let g = rd.group_instance(&dn("cn=dyn,o=test")).expect("not registered");
        assert!(matches!(g.as_ref(), GroupInstance::Dynamic(_)));

        assert_eq!(g.is_member(&rd, &dn("uid=a,ou=People,o=test")), Ok(true));
        assert_eq!(g.is_member(&rd, &dn("uid=b,ou=People,o=test")), Ok(false));
        // Right filter, outside the base.
        assert_eq!(g.is_member(&rd, &dn("uid=c,ou=Other,o=test")), Ok(false));
        assert_eq!(g.is_member(&rd, &dn("uid=missing,o=test")), Ok(false));

        // Matched by both urls, produced once.
        let members: Vec<_> = g
            .members(&rd)
            .expect("members failed")
            .map(|m| m.expect("member error").dn)
            .collect();
        assert_eq!(members, vec![dn("uid=a,ou=People,o=test")]);

        assert!(!g.may_alter_member_list());
        assert!(!g.supports_nested_groups());
        assert!(g.nested_group_dns(&rd).is_empty());
    }

    #[dir_test(with_rules = false)]
    fn test_dynamic_group_refuses_mutation(server: &DirectoryServer) {
        add_entries(server, BASE);
        let mut wr = server.write();
        let g = wr.group_instance(&dn("cn=dyn,o=test")).expect("not registered");
        let b = dn("uid=b,ou=People,o=test");
        assert_eq!(
            g.add_member(&mut wr, &b),
            Err(OperationError::UnwillingToPerform)
        );
        assert_eq!(
            g.remove_member(&mut wr, &b),
            Err(OperationError::UnwillingToPerform)
        );
        assert_eq!(
            g.add_nested_group(&mut wr, &b),
            Err(OperationError::UnwillingToPerform)
        );
        assert_eq!(
            g.remove_nested_group(&mut wr, &b),
            Err(OperationError::UnwillingToPerform)
        );

        // Membership follows the memberURL once it changes.
        wr.modify(
            &dn("cn=dyn,o=test"),
            &ModifyList::new_purge_and_set(
                Attribute::MemberUrl,
                "ldap:///ou=People,o=test??one?(givenName=other)",
            ),
        )
        .expect("modify failed");
        let g = wr.group_instance(&dn("cn=dyn,o=test")).expect("not registered");
        assert_eq!(g.is_member(&wr, &b), Ok(true));
        wr.commit().expect("commit failed");
    }
}
