//! The group manager holds the group instances of the directory, keyed by group DN. It is
//! refreshed by the directory write transaction as entries are added, changed and removed,
//! and readers always see the set of groups that matches their backend snapshot.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use concread::cowcell::*;

use crate::prelude::*;

#[derive(Clone, Default)]
struct GroupManagerInner {
    groups: BTreeMap<Dn, Arc<GroupInstance>>,
}

pub struct GroupManager {
    inner: CowCell<GroupManagerInner>,
}

impl Default for GroupManager {
    fn default() -> Self {
        GroupManager {
            inner: CowCell::new(GroupManagerInner::default()),
        }
    }
}

impl GroupManager {
    pub fn read(&self) -> GroupManagerReadTransaction {
        GroupManagerReadTransaction {
            inner: self.inner.read(),
        }
    }

    pub fn write(&self) -> GroupManagerWriteTransaction {
        GroupManagerWriteTransaction {
            inner: self.inner.write(),
        }
    }
}

pub trait GroupManagerTransaction {
    fn get(&self, dn: &Dn) -> Option<Arc<GroupInstance>>;

    fn all(&self) -> Vec<Arc<GroupInstance>>;

    fn len(&self) -> usize;
}

pub struct GroupManagerReadTransaction {
    inner: CowCellReadTxn<GroupManagerInner>,
}

impl GroupManagerTransaction for GroupManagerReadTransaction {
    fn get(&self, dn: &Dn) -> Option<Arc<GroupInstance>> {
        self.inner.deref().groups.get(dn).cloned()
    }

    fn all(&self) -> Vec<Arc<GroupInstance>> {
        self.inner.deref().groups.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.inner.deref().groups.len()
    }
}

pub struct GroupManagerWriteTransaction<'a> {
    inner: CowCellWriteTxn<'a, GroupManagerInner>,
}

impl GroupManagerTransaction for GroupManagerWriteTransaction<'_> {
    fn get(&self, dn: &Dn) -> Option<Arc<GroupInstance>> {
        self.inner.deref().groups.get(dn).cloned()
    }

    fn all(&self) -> Vec<Arc<GroupInstance>> {
        self.inner.deref().groups.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.inner.deref().groups.len()
    }
}

impl GroupManagerWriteTransaction<'_> {
    /// Bring the registration of an entry in line with its current content. An entry
    /// that describes a group that cannot be built is logged and left unregistered.
    pub(crate) fn reload_entry(&mut self, entry: &Entry) {
        let dn = entry.dn().clone();
        match GroupInstance::try_from_entry(entry) {
            Ok(Some(instance)) => {
                group_trace!(group = %dn, kind = instance.kind(), "registering group");
                self.inner.groups.insert(dn, Arc::new(instance));
            }
            Ok(None) => {
                if self.inner.groups.remove(&dn).is_some() {
                    group_trace!(group = %dn, "entry is no longer a group");
                }
            }
            Err(e) => {
                group_error!(group = %dn, ?e, "unable to build group from entry, not registered");
                self.inner.groups.remove(&dn);
            }
        }
    }

    pub(crate) fn remove(&mut self, dn: &Dn) {
        if self.inner.groups.remove(dn).is_some() {
            group_trace!(group = %dn, "unregistered group");
        }
    }

    pub fn commit(self) {
        self.inner.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_manager_reload() {
        sketching::test_init();
        let gm = GroupManager::default();
        let group = Entry::unsafe_from_entry_str(
            r#"{"dn": "cn=g,o=test", "attrs": {"objectClass": ["groupOfNames"]}}"#,
        );
        let mut plain = group.clone();
        plain.purge_ava(&Attribute::ObjectClass);

        let rd_before = gm.read();
        let mut wr = gm.write();
        wr.reload_entry(&group);
        assert_eq!(wr.len(), 1);
        assert!(wr.get(group.dn()).is_some());
        wr.commit();

        assert_eq!(rd_before.len(), 0);
        assert_eq!(gm.read().len(), 1);

        let mut wr = gm.write();
        wr.reload_entry(&plain);
        assert!(wr.get(group.dn()).is_none());
        wr.reload_entry(&group);
        wr.remove(group.dn());
        assert_eq!(wr.all().len(), 0);
        wr.commit();
    }

    #[test]
    fn test_group_manager_skips_broken_groups() {
        sketching::test_init();
        let gm = GroupManager::default();
        let broken = Entry::unsafe_from_entry_str(
            r#"{"dn": "cn=d,o=test", "attrs": {
                "objectClass": ["groupOfURLs"],
                "memberURL": ["ldap:///o=test??nonsense"]
            }}"#,
        );
        let mut wr = gm.write();
        wr.reload_entry(&broken);
        assert!(wr.get(broken.dn()).is_none());
    }
}
