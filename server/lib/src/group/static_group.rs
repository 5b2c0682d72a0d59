use std::sync::Arc;

use hashbrown::HashSet;

use crate::prelude::*;
use crate::server::DirectoryServerWriteTransaction;

/// A group that lists its members by DN. The group entry is read from the transaction on
/// every call, so the instance follows modifications of the entry and fails once the
/// entry is gone.
#[derive(Debug, Clone)]
pub struct StaticGroup {
    dn: Dn,
    member_attr: Attribute,
}

impl StaticGroup {
    pub fn from_entry(entry: &Entry) -> Self {
        let member_attr = if entry.has_class(EntryClass::GroupOfUniqueNames) {
            Attribute::UniqueMember
        } else {
            Attribute::Member
        };
        StaticGroup {
            dn: entry.dn().clone(),
            member_attr,
        }
    }

    pub fn member_attribute(&self) -> &Attribute {
        &self.member_attr
    }

    fn current_entry<T>(&self, txn: &T) -> Result<Arc<Entry>, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        txn.get_entry_real(&self.dn).ok_or_else(|| {
            group_warn!(group = %self.dn, "static group entry no longer exists");
            OperationError::NoSuchObject
        })
    }

    fn member_dns(&self, entry: &Entry) -> Vec<Dn> {
        entry
            .real_values(&self.member_attr)
            .map(|vs| vs.iter().filter_map(Value::to_dn).collect())
            .unwrap_or_default()
    }

    fn has_member_value(&self, entry: &Entry, dn: &Dn) -> bool {
        entry.attribute_equality(&self.member_attr, &Value::new_dn(dn))
    }

    fn append(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        let entry = self.current_entry(txn)?;
        if self.has_member_value(&entry, dn) {
            group_warn!(group = %self.dn, member = %dn, "already a member");
            return Err(OperationError::AttributeOrValueExists);
        }
        txn.modify(
            &self.dn,
            &ModifyList::new_append(self.member_attr.clone(), dn.as_str()),
        )
    }

    fn remove(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        let entry = self.current_entry(txn)?;
        if !self.has_member_value(&entry, dn) {
            group_warn!(group = %self.dn, member = %dn, "not a member");
            return Err(OperationError::NoSuchAttributeValue);
        }
        txn.modify(
            &self.dn,
            &ModifyList::new_remove(self.member_attr.clone(), dn.as_str()),
        )
    }
}

impl Group for StaticGroup {
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
        let entry = self.current_entry(txn)?;
        if !examined.insert(self.dn.clone()) {
            group_trace!(group = %self.dn, "group already examined, nesting cycle");
            return Ok(false);
        }

        if self.has_member_value(&entry, dn) {
            return Ok(true);
        }

        for member in self.member_dns(&entry) {
            if examined.contains(&member) {
                continue;
            }
            if let Some(nested) = txn.group_instance(&member) {
                if nested.is_member_examined(txn, dn, examined)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn is_member_entry_examined<T>(
        &self,
        txn: &T,
        entry: &Entry,
        examined: &mut HashSet<Dn>,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.is_member_examined(txn, entry.dn(), examined)
    }

    fn members<'a, T>(&self, txn: &'a T) -> Result<MemberList<'a>, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let entry = self.current_entry(txn)?;
        let dns = self.member_dns(&entry);
        Ok(MemberList::new(dns.into_iter().map(move |dn| {
            let entry = txn.get_entry_real(&dn);
            Ok(Member { dn, entry })
        })))
    }

    fn may_alter_member_list(&self) -> bool {
        true
    }

    fn supports_nested_groups(&self) -> bool {
        true
    }

    fn nested_group_dns<T>(&self, txn: &T) -> Vec<Dn>
    where
        T: DirectoryTransaction + ?Sized,
    {
        match txn.get_entry_real(&self.dn) {
            Some(entry) => self
                .member_dns(&entry)
                .into_iter()
                .filter(|dn| txn.group_instance(dn).is_some())
                .collect(),
            None => Vec::with_capacity(0),
        }
    }

    fn add_member(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        if txn.get_entry_real(dn).is_none() {
            group_warn!(group = %self.dn, member = %dn, "member entry does not exist");
            return Err(OperationError::NoSuchObject);
        }
        self.append(txn, dn)
    }

    fn remove_member(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        self.remove(txn, dn)
    }

    fn add_nested_group(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        self.append(txn, dn)
    }

    fn remove_nested_group(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        self.remove(txn, dn)
    }
}
