use std::str::FromStr;
use std::sync::Arc;

use hashbrown::HashSet;

use crate::prelude::*;
use crate::server::DirectoryServerWriteTransaction;

/// A group that presents the membership of its target group. It holds no members of its
/// own; every question is answered by the target as it exists in the transaction.
#[derive(Debug, Clone)]
pub struct VirtualStaticGroup {
    dn: Dn,
    target: Dn,
    member_attr: Attribute,
}

impl VirtualStaticGroup {
    pub fn try_from_entry(entry: &Entry) -> Result<Self, OperationError> {
        let Some(target) = entry.get_ava_single(&Attribute::TargetGroupDn) else {
            group_error!(group = %entry.dn(), "virtual static group requires exactly one target group dn");
            return Err(OperationError::InvalidGroupState(
                "missing or multiple ds-target-group-dn".to_string(),
            ));
        };
        let target = Dn::from_str(target.as_str()).map_err(|e| {
            group_error!(group = %entry.dn(), target = %target, "invalid target group dn");
            e
        })?;

        let member_attr = if entry.has_class(EntryClass::GroupOfUniqueNames) {
            Attribute::UniqueMember
        } else {
            Attribute::Member
        };

        Ok(VirtualStaticGroup {
            dn: entry.dn().clone(),
            target,
            member_attr,
        })
    }

    pub fn target_group_dn(&self) -> &Dn {
        &self.target
    }

    /// The attribute this group presents its members through.
    pub fn member_attribute(&self) -> &Attribute {
        &self.member_attr
    }

    /// Follow the target, and the targets of any virtual static groups it leads to, until
    /// a group with its own membership is found.
    pub fn resolve_target<T>(&self, txn: &T) -> Result<Arc<GroupInstance>, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let mut visited: HashSet<Dn> = HashSet::new();
        visited.insert(self.dn.clone());
        let mut next = self.target.clone();

        for _ in 0..VIRTUAL_STATIC_CHAIN_MAX {
            if !visited.insert(next.clone()) {
                group_error!(group = %self.dn, target = %next, "virtual static group cycle");
                return Err(OperationError::GroupCycle);
            }
            let Some(instance) = txn.group_instance(&next) else {
                group_warn!(group = %self.dn, target = %next, "target group does not exist");
                return Err(OperationError::NoSuchObject);
            };
            match instance.as_virtual_static() {
                Some(vs) => next = vs.target.clone(),
                None => return Ok(instance),
            }
        }

        group_error!(group = %self.dn, "virtual static group chain too long");
        Err(OperationError::ResourceLimit)
    }
}

impl Group for VirtualStaticGroup {
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
        self.resolve_target(txn)?
            .is_member_examined(txn, dn, examined)
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
        self.resolve_target(txn)?
            .is_member_entry_examined(txn, entry, examined)
    }

    fn members<'a, T>(&self, txn: &'a T) -> Result<MemberList<'a>, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.resolve_target(txn)?.members(txn)
    }

    fn members_in_scope<'a, T>(
        &self,
        txn: &'a T,
        base: &Dn,
        scope: SearchScope,
        filter: Option<&Filter>,
    ) -> Result<MemberList<'a>, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        self.resolve_target(txn)?
            .members_in_scope(txn, base, scope, filter)
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
