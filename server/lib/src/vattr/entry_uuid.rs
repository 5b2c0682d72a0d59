use uuid::Uuid;

use crate::filter::SubstringAssertion;
use crate::prelude::*;

/// Presents a name based uuid derived from the normalized DN, so an entry keeps the same
/// entryUUID for as long as it keeps its DN.
#[derive(Debug, Clone)]
pub struct EntryUuidProvider;

impl EntryUuidProvider {
    pub fn uuid_for(dn: &Dn) -> Uuid {
        Uuid::new_v3(&ENTRYUUID_NAMESPACE, dn.normalized().as_bytes())
    }
}

impl VirtualAttributeProvider for EntryUuidProvider {
    fn is_multi_valued(&self) -> bool {
        false
    }

    fn values<T>(
        &self,
        _txn: &T,
        entry: &Entry,
        _rule: &VirtualAttributeRule,
    ) -> Result<ValueSet, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let uuid = Self::uuid_for(entry.dn());
        let mut vs = ValueSet::new();
        vs.insert(Value::new(&Attribute::EntryUuid, &uuid.hyphenated().to_string()));
        Ok(vs)
    }

    fn has_value<T>(
        &self,
        _txn: &T,
        _entry: &Entry,
        _rule: &VirtualAttributeRule,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(true)
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
    use super::*;
    use crate::testkit::{add_entries, dn};

    #[test]
    fn test_entry_uuid_is_stable_per_dn() {
        let a = EntryUuidProvider::uuid_for(&dn("uid=test.user,o=test"));
        assert_eq!(a, EntryUuidProvider::uuid_for(&dn("UID=Test.User, o=TEST")));
        assert_ne!(a, EntryUuidProvider::uuid_for(&dn("uid=test.user2,o=test")));
        assert_eq!(a.get_version_num(), 3);
    }

    #[dir_test]
    fn test_entry_uuid_values(server: &DirectoryServer) {
        add_entries(
            server,
            &[
                r#"{"dn": "o=test", "attrs": {"objectClass": ["top"]}}"#,
                r#"{"dn": "uid=a,o=test", "attrs": {"objectClass": ["person"]}}"#,
                r#"{"dn": "uid=b,o=test", "attrs": {
                    "objectClass": ["person"],
                    "entryUUID": ["00000000-0000-0000-0000-000000000001"]
                }}"#,
            ],
        );
        let rd = server.read();
        let get = |s: &str| {
            rd.get_entry(&dn(s), VirtualAttributeDirectives::default())
                .expect("entry missing")
                .get_ava_single(&Attribute::EntryUuid)
                .map(|v| v.as_str().to_string())
        };
        let expected = EntryUuidProvider::uuid_for(&dn("uid=a,o=test")).to_string();
        assert_eq!(get("uid=a,o=test"), Some(expected.clone()));
        assert_eq!(get("uid=a,o=test"), Some(expected));
        // A stored value wins over the computed one.
        assert_eq!(
            get("uid=b,o=test"),
            Some("00000000-0000-0000-0000-000000000001".to_string())
        );

        let rule = rd.rule("entryUUID").expect("builtin rule missing");
        let real = rd.get_entry_real(&dn("uid=a,o=test")).expect("entry missing");
        let sub = SubstringAssertion {
            initial: Some("0".to_string()),
            any: Vec::with_capacity(0),
            final_: None,
        };
        assert_eq!(
            rule.provider().matches_substring(&rd, &real, &rule, &sub),
            Ok(ConditionResult::Undefined)
        );
        assert!(!rule.provider().is_searchable(
            &rd,
            &rule,
            &SearchOperation::new(dn("o=test"), SearchScope::Subtree, f_eq(Attribute::EntryUuid, "x"))
        ));
    }
}
