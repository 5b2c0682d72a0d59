//! Groups. The directory recognises three kinds of group entry:
//!
//! * static groups, which list their members by DN in `member` or `uniqueMember`,
//! * dynamic groups, whose members are every entry matched by one of their `memberURL`s,
//! * virtual static groups, which present the membership of another group as though it
//!   were a static member list.
//!
//! Instances are built from entries by [`GroupInstance::try_from_entry`] and held by the
//! group manager. An instance reads whatever it needs from the directory transaction it
//! is given, so it always reflects the state that transaction sees.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashSet;

use crate::prelude::*;
use crate::server::DirectoryServerWriteTransaction;

pub mod dynamic;
pub mod manager;
pub mod static_group;
pub mod url;
pub mod virtual_static;

use self::dynamic::DynamicGroup;
use self::static_group::StaticGroup;
use self::virtual_static::VirtualStaticGroup;

lazy_static! {
    static ref STATIC_GROUP_FILTER: Filter = f_andnot(
        f_or(vec![
            f_eq(Attribute::ObjectClass, EntryClass::GroupOfNames.as_str()),
            f_eq(Attribute::ObjectClass, EntryClass::GroupOfUniqueNames.as_str()),
            f_eq(Attribute::ObjectClass, EntryClass::GroupOfEntries.as_str()),
        ]),
        f_eq(Attribute::ObjectClass, EntryClass::VirtualStaticGroup.as_str())
    );
    static ref DYNAMIC_GROUP_FILTER: Filter =
        f_eq(Attribute::ObjectClass, EntryClass::GroupOfUrls.as_str());
    static ref VIRTUAL_STATIC_GROUP_FILTER: Filter = f_and(vec![
        f_eq(Attribute::ObjectClass, EntryClass::VirtualStaticGroup.as_str()),
        f_or(vec![
            f_eq(Attribute::ObjectClass, EntryClass::GroupOfNames.as_str()),
            f_eq(Attribute::ObjectClass, EntryClass::GroupOfUniqueNames.as_str()),
        ]),
    ]);
}

/// A member produced while walking a group. The entry is present when the member exists
/// in the directory.
#[derive(Debug, Clone)]
pub struct Member {
    pub dn: Dn,
    pub entry: Option<Arc<Entry>>,
}

/// A one shot walk over the members of a group. Members are produced lazily where the
/// group kind allows it. Once consumed or dropped the list cannot be restarted.
pub struct MemberList<'a> {
    inner: Box<dyn Iterator<Item = Result<Member, OperationError>> + 'a>,
}

impl<'a> MemberList<'a> {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Member, OperationError>> + 'a,
    {
        MemberList {
            inner: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        MemberList::new(std::iter::empty())
    }

    /// The DN of the next member, or `None` once the list is exhausted.
    pub fn next_member_dn(&mut self) -> Result<Option<Dn>, OperationError> {
        self.next().transpose().map(|m| m.map(|m| m.dn))
    }

    /// The next member that exists as an entry, skipping DNs that do not resolve.
    pub fn next_member_entry(&mut self) -> Result<Option<Arc<Entry>>, OperationError> {
        for member in self.by_ref() {
            if let Some(entry) = member?.entry {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub fn close(self) {}
}

impl Iterator for MemberList<'_> {
    type Item = Result<Member, OperationError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for MemberList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MemberList")
    }
}

pub trait Group {
    fn group_dn(&self) -> &Dn;

    /// Membership test that records the groups already visited, so nested groups that
    /// form a cycle terminate.
    fn is_member_examined<T>(
        &self,
        txn: &T,
        dn: &Dn,
        examined: &mut HashSet<Dn>,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized;

    fn is_member_entry_examined<T>(
        &self,
        txn: &T,
        entry: &Entry,
        examined: &mut HashSet<Dn>,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized;

    fn is_member<T>(&self, txn: &T, dn: &Dn) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let mut examined = HashSet::new();
        self.is_member_examined(txn, dn, &mut examined)
    }

    fn is_member_entry<T>(&self, txn: &T, entry: &Entry) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let mut examined = HashSet::new();
        self.is_member_entry_examined(txn, entry, &mut examined)
    }

    fn members<'a, T>(&self, txn: &'a T) -> Result<MemberList<'a>, OperationError>
    where
        T: DirectoryTransaction + ?Sized;

    /// Members within `scope` of `base`, optionally also matching `filter`. Members that
    /// do not exist as entries cannot match a filter.
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
        let base = base.clone();
        let filter = filter.cloned();
        let members = self.members(txn)?;
        Ok(MemberList::new(members.filter(move |m| match m {
            Ok(m) => {
                m.dn.is_within_scope(&base, scope)
                    && match (&filter, &m.entry) {
                        (None, _) => true,
                        (Some(f), Some(e)) => e.entry_match_real(f).is_true(),
                        (Some(_), None) => false,
                    }
            }
            Err(_) => true,
        })))
    }

    fn may_alter_member_list(&self) -> bool;

    fn supports_nested_groups(&self) -> bool;

    fn nested_group_dns<T>(&self, txn: &T) -> Vec<Dn>
    where
        T: DirectoryTransaction + ?Sized;

    fn add_member(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError>;

    fn remove_member(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError>;

    fn add_nested_group(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError>;

    fn remove_nested_group(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError>;
}

#[derive(Debug, Clone)]
pub enum GroupInstance {
    Static(StaticGroup),
    Dynamic(DynamicGroup),
    VirtualStatic(VirtualStaticGroup),
}

impl GroupInstance {
    /// Build the group instance an entry describes. `Ok(None)` when the entry is not a
    /// group, and an error when it is one but cannot be used.
    pub fn try_from_entry(entry: &Entry) -> Result<Option<Self>, OperationError> {
        if entry.entry_match_real(&STATIC_GROUP_FILTER).is_true() {
            Ok(Some(GroupInstance::Static(StaticGroup::from_entry(entry))))
        } else if entry.entry_match_real(&DYNAMIC_GROUP_FILTER).is_true() {
            DynamicGroup::try_from_entry(entry).map(|g| Some(GroupInstance::Dynamic(g)))
        } else if entry.entry_match_real(&VIRTUAL_STATIC_GROUP_FILTER).is_true() {
            VirtualStaticGroup::try_from_entry(entry)
                .map(|g| Some(GroupInstance::VirtualStatic(g)))
        } else {
            Ok(None)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GroupInstance::Static(_) => "static",
            GroupInstance::Dynamic(_) => "dynamic",
            GroupInstance::VirtualStatic(_) => "virtual static",
        }
    }

    pub fn as_virtual_static(&self) -> Option<&VirtualStaticGroup> {
        match self {
            GroupInstance::VirtualStatic(g) => Some(g),
            _ => None,
        }
    }
}

impl Group for GroupInstance {
    fn group_dn(&self) -> &Dn {
        match self {
            GroupInstance::Static(g) => g.group_dn(),
            GroupInstance::Dynamic(g) => g.group_dn(),
            GroupInstance::VirtualStatic(g) => g.group_dn(),
        }
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
        match self {
            GroupInstance::Static(g) => g.is_member_examined(txn, dn, examined),
            GroupInstance::Dynamic(g) => g.is_member_examined(txn, dn, examined),
            GroupInstance::VirtualStatic(g) => g.is_member_examined(txn, dn, examined),
        }
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
        match self {
            GroupInstance::Static(g) => g.is_member_entry_examined(txn, entry, examined),
            GroupInstance::Dynamic(g) => g.is_member_entry_examined(txn, entry, examined),
            GroupInstance::VirtualStatic(g) => g.is_member_entry_examined(txn, entry, examined),
        }
    }

    fn members<'a, T>(&self, txn: &'a T) -> Result<MemberList<'a>, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        match self {
            GroupInstance::Static(g) => g.members(txn),
            GroupInstance::Dynamic(g) => g.members(txn),
            GroupInstance::VirtualStatic(g) => g.members(txn),
        }
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
        match self {
            GroupInstance::Static(g) => g.members_in_scope(txn, base, scope, filter),
            GroupInstance::Dynamic(g) => g.members_in_scope(txn, base, scope, filter),
            GroupInstance::VirtualStatic(g) => g.members_in_scope(txn, base, scope, filter),
        }
    }

    fn may_alter_member_list(&self) -> bool {
        match self {
            GroupInstance::Static(g) => g.may_alter_member_list(),
            GroupInstance::Dynamic(g) => g.may_alter_member_list(),
            GroupInstance::VirtualStatic(g) => g.may_alter_member_list(),
        }
    }

    fn supports_nested_groups(&self) -> bool {
        match self {
            GroupInstance::Static(g) => g.supports_nested_groups(),
            GroupInstance::Dynamic(g) => g.supports_nested_groups(),
            GroupInstance::VirtualStatic(g) => g.supports_nested_groups(),
        }
    }

    fn nested_group_dns<T>(&self, txn: &T) -> Vec<Dn>
    where
        T: DirectoryTransaction + ?Sized,
    {
        match self {
            GroupInstance::Static(g) => g.nested_group_dns(txn),
            GroupInstance::Dynamic(g) => g.nested_group_dns(txn),
            GroupInstance::VirtualStatic(g) => g.nested_group_dns(txn),
        }
    }

    fn add_member(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        match self {
            GroupInstance::Static(g) => g.add_member(txn, dn),
            GroupInstance::Dynamic(g) => g.add_member(txn, dn),
            GroupInstance::VirtualStatic(g) => g.add_member(txn, dn),
        }
    }

    fn remove_member(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        match self {
            GroupInstance::Static(g) => g.remove_member(txn, dn),
            GroupInstance::Dynamic(g) => g.remove_member(txn, dn),
            GroupInstance::VirtualStatic(g) => g.remove_member(txn, dn),
        }
    }

    fn add_nested_group(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        match self {
            GroupInstance::Static(g) => g.add_nested_group(txn, dn),
            GroupInstance::Dynamic(g) => g.add_nested_group(txn, dn),
            GroupInstance::VirtualStatic(g) => g.add_nested_group(txn, dn),
        }
    }

    fn remove_nested_group(
        &self,
        txn: &mut DirectoryServerWriteTransaction<'_>,
        dn: &Dn,
    ) -> Result<(), OperationError> {
        match self {
            GroupInstance::Static(g) => g.remove_nested_group(txn, dn),
            GroupInstance::Dynamic(g) => g.remove_nested_group(txn, dn),
            GroupInstance::VirtualStatic(g) => g.remove_nested_group(txn, dn),
        }
    }
}

impl fmt::Display for GroupInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} group {}", self.kind(), self.group_dn())
    }
}
