//! The backend. This stores the real entries of the directory, keyed by DN, in a
//! concurrently readable tree. Readers see a consistent snapshot for the life of their
//! transaction, and a single writer's changes become visible at commit.
//!
//! Because DN ordering starts from the root, a subtree is a contiguous range of keys and
//! scoped scans are a range walk from the base.

use std::ops::Bound::{Included, Unbounded};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use concread::bptree::{BptreeMap, BptreeMapReadSnapshot, BptreeMapReadTxn, BptreeMapWriteTxn};
use serde::Deserialize;
use virtdir_proto::config::LimitsConfig;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
    Subordinate,
}

impl FromStr for SearchScope {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base" => Ok(SearchScope::Base),
            "one" | "onelevel" => Ok(SearchScope::OneLevel),
            "sub" | "subtree" => Ok(SearchScope::Subtree),
            "subordinate" | "subordinates" | "children" => Ok(SearchScope::Subordinate),
            _ => Err(OperationError::InvalidRequestState),
        }
    }
}

/// Limits on the amount of resources a search may consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Zero means unlimited.
    pub search_max_results: usize,
    pub search_time_limit: Option<Duration>,
    pub filter_max_elements: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits::from(&LimitsConfig::default())
    }
}

impl Limits {
    pub fn unlimited() -> Self {
        Limits {
            search_max_results: 0,
            search_time_limit: None,
            filter_max_elements: usize::MAX,
        }
    }
}

impl From<&LimitsConfig> for Limits {
    fn from(cfg: &LimitsConfig) -> Self {
        Limits {
            search_max_results: cfg.search_max_results,
            search_time_limit: cfg.search_time_limit_ms.map(Duration::from_millis),
            filter_max_elements: cfg.filter_max_elements,
        }
    }
}

pub struct Backend {
    entries: BptreeMap<Dn, Arc<Entry>>,
}

pub struct BackendReadTransaction<'a> {
    entries: BptreeMapReadTxn<'a, Dn, Arc<Entry>>,
}

pub struct BackendWriteTransaction<'a> {
    entries: BptreeMapWriteTxn<'a, Dn, Arc<Entry>>,
}

pub trait BackendTransaction {
    fn entries_snapshot(&self) -> BptreeMapReadSnapshot<'_, Dn, Arc<Entry>>;

    fn get(&self, dn: &Dn) -> Option<Arc<Entry>> {
        self.entries_snapshot().get(dn).cloned()
    }

    fn exists(&self, dn: &Dn) -> bool {
        self.entries_snapshot().contains_key(dn)
    }

    /// Every entry within `scope` of `base`, in DN order.
    fn scan(&self, base: &Dn, scope: SearchScope) -> Vec<Arc<Entry>> {
        let snapshot = self.entries_snapshot();
        match scope {
            SearchScope::Base => snapshot.get(base).cloned().into_iter().collect(),
            _ => snapshot
                .range((Included(base), Unbounded))
                .take_while(|(dn, _)| dn.is_descendant_of(base))
                .filter(|(dn, _)| dn.is_within_scope(base, scope))
                .map(|(_, e)| e.clone())
                .collect(),
        }
    }

    fn has_children(&self, dn: &Dn) -> bool {
        self.entries_snapshot()
            .range((Included(dn), Unbounded))
            .take_while(|(d, _)| d.is_descendant_of(dn))
            .any(|(d, _)| d != dn)
    }

    fn len(&self) -> usize {
        self.entries_snapshot().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> BackendTransaction for BackendReadTransaction<'a> {
    fn entries_snapshot(&self) -> BptreeMapReadSnapshot<'_, Dn, Arc<Entry>> {
        self.entries.to_snapshot()
    }
}

impl<'a> BackendTransaction for BackendWriteTransaction<'a> {
    fn entries_snapshot(&self) -> BptreeMapReadSnapshot<'_, Dn, Arc<Entry>> {
        self.entries.to_snapshot()
    }
}

impl<'a> BackendWriteTransaction<'a> {
    /// Store a new entry. Its parent must already exist, unless the entry is a naming
    /// context directly beneath the root.
    pub fn create(&mut self, entry: Entry) -> Result<Arc<Entry>, OperationError> {
        let dn = entry.dn().clone();
        if dn.is_root() {
            request_error!("refusing to store an entry at the root DN");
            return Err(OperationError::UnwillingToPerform);
        }
        if self.exists(&dn) {
            request_error!(%dn, "entry already exists");
            return Err(OperationError::EntryAlreadyExists);
        }
        match dn.parent() {
            Some(parent) if !parent.is_root() && !self.exists(&parent) => {
                request_error!(%dn, %parent, "parent entry does not exist");
                return Err(OperationError::NoSuchObject);
            }
            _ => {}
        }

        let entry = Arc::new(entry);
        self.entries.insert(dn, entry.clone());
        Ok(entry)
    }

    /// Apply changes to the real values of an entry, returning the updated entry.
    pub fn modify(&mut self, dn: &Dn, modlist: &ModifyList) -> Result<Arc<Entry>, OperationError> {
        let Some(current) = self.get(dn) else {
            request_error!(%dn, "no such entry to modify");
            return Err(OperationError::NoSuchObject);
        };
        let mut entry = current.as_ref().clone();
        entry.apply_modlist(modlist)?;
        let entry = Arc::new(entry);
        self.entries.insert(dn.clone(), entry.clone());
        Ok(entry)
    }

    /// Remove a leaf entry, returning what was removed.
    pub fn delete(&mut self, dn: &Dn) -> Result<Arc<Entry>, OperationError> {
        let Some(current) = self.get(dn) else {
            request_error!(%dn, "no such entry to delete");
            return Err(OperationError::NoSuchObject);
        };
        if self.has_children(dn) {
            request_error!(%dn, "entry has children");
            return Err(OperationError::NotAllowedOnNonLeaf);
        }
        self.entries.remove(dn);
        Ok(current)
    }

    /// Remove an entry along with everything beneath it, returning what was removed.
    pub fn delete_subtree(&mut self, dn: &Dn) -> Result<Vec<Arc<Entry>>, OperationError> {
        if !self.exists(dn) {
            request_error!(%dn, "no such entry to delete");
            return Err(OperationError::NoSuchObject);
        }
        let removed = self.scan(dn, SearchScope::Subtree);
        for entry in removed.iter() {
            self.entries.remove(entry.dn());
        }
        Ok(removed)
    }

    /// Move an entry, and everything beneath it, to `new_dn`. Only the moved entry's own
    /// RDN values change. Returns each moved entry paired with the DN it had before.
    pub fn rename(
        &mut self,
        dn: &Dn,
        new_dn: &Dn,
    ) -> Result<Vec<(Dn, Arc<Entry>)>, OperationError> {
        if dn.is_root() || new_dn.is_root() {
            request_error!(%dn, %new_dn, "refusing to rename to or from the root DN");
            return Err(OperationError::UnwillingToPerform);
        }
        if !self.exists(dn) {
            request_error!(%dn, "no such entry to rename");
            return Err(OperationError::NoSuchObject);
        }
        if self.exists(new_dn) {
            request_error!(%new_dn, "entry already exists");
            return Err(OperationError::EntryAlreadyExists);
        }
        if new_dn.is_descendant_of(dn) {
            request_error!(%dn, %new_dn, "refusing to move an entry beneath itself");
            return Err(OperationError::UnwillingToPerform);
        }
        match new_dn.parent() {
            Some(parent) if !parent.is_root() && !self.exists(&parent) => {
                request_error!(%new_dn, %parent, "parent entry does not exist");
                return Err(OperationError::NoSuchObject);
            }
            _ => {}
        }

        let subtree = self.scan(dn, SearchScope::Subtree);
        let mut moved = Vec::with_capacity(subtree.len());
        for current in subtree {
            let old_dn = current.dn().clone();
            let Some(target) = old_dn.rebase(dn, new_dn) else {
                continue;
            };
            let mut entry = current.as_ref().clone();
            entry.set_dn(target);
            self.entries.remove(&old_dn);
            moved.push((old_dn, Arc::new(entry)));
        }
        for (_, entry) in moved.iter() {
            self.entries.insert(entry.dn().clone(), entry.clone());
        }
        Ok(moved)
    }

    pub fn commit(self) {
        self.entries.commit()
    }
}

impl Backend {
    pub fn new() -> Self {
        Backend {
            entries: BptreeMap::new(),
        }
    }

    pub fn read(&self) -> BackendReadTransaction<'_> {
        BackendReadTransaction {
            entries: self.entries.read(),
        }
    }

    pub fn write(&self) -> BackendWriteTransaction<'_> {
        BackendWriteTransaction {
            entries: self.entries.write(),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::from_str(s).expect("invalid dn")
    }

    fn entry(s: &str) -> Entry {
        Entry::new(dn(s))
    }

    fn populate(be: &Backend) {
        let mut wr = be.write();
        for d in [
            "o=test",
            "ou=People,o=test",
            "uid=a,ou=People,o=test",
            "uid=b,ou=People,o=test",
            "ou=Groups,o=test",
            "cn=g,ou=Groups,o=test",
            "o=other",
        ] {
            wr.create(entry(d)).expect("create failed");
        }
        wr.commit();
    }

    fn scan_names(txn: &impl BackendTransaction, base: &str, scope: SearchScope) -> Vec<String> {
        txn.scan(&dn(base), scope)
            .iter()
            .map(|e| e.dn().normalized().to_string())
            .collect()
    }

    #[test]
    fn test_be_scan_scopes() {
        let be = Backend::new();
        populate(&be);
        let rd = be.read();

        assert_eq!(scan_names(&rd, "ou=People,o=test", SearchScope::Base).len(), 1);
        assert_eq!(
            scan_names(&rd, "ou=People,o=test", SearchScope::OneLevel),
            vec!["uid=a,ou=people,o=test", "uid=b,ou=people,o=test"]
        );
        assert_eq!(scan_names(&rd, "o=test", SearchScope::Subtree).len(), 6);
        assert_eq!(scan_names(&rd, "o=test", SearchScope::Subordinate).len(), 5);
        assert_eq!(scan_names(&rd, "o=test", SearchScope::OneLevel).len(), 2);
        assert!(scan_names(&rd, "o=missing", SearchScope::Subtree).is_empty());
    }

    #[test]
    fn test_be_create_rules() {
        let be = Backend::new();
        populate(&be);
        let mut wr = be.write();
        assert_eq!(
            wr.create(entry("o=test")).map(|_| ()),
            Err(OperationError::EntryAlreadyExists)
        );
        assert_eq!(
            wr.create(entry("uid=x,ou=Missing,o=test")).map(|_| ()),
            Err(OperationError::NoSuchObject)
        );
        assert_eq!(
            wr.create(Entry::new(Dn::root())).map(|_| ()),
            Err(OperationError::UnwillingToPerform)
        );
    }

    #[test]
    fn test_be_delete_and_isolation() {
        let be = Backend::new();
        populate(&be);

        let rd_before = be.read();
        let mut wr = be.write();
        assert_eq!(
            wr.delete(&dn("ou=People,o=test")).map(|_| ()),
            Err(OperationError::NotAllowedOnNonLeaf)
        );
        assert!(wr.delete(&dn("uid=a,ou=People,o=test")).is_ok());
        assert_eq!(
            wr.delete(&dn("uid=a,ou=People,o=test")).map(|_| ()),
            Err(OperationError::NoSuchObject)
        );
        wr.commit();

        // The earlier reader still sees its snapshot.
        assert!(rd_before.exists(&dn("uid=a,ou=People,o=test")));
        assert!(!be.read().exists(&dn("uid=a,ou=People,o=test")));
    }

    #[test]
    fn test_be_delete_subtree() {
        let be = Backend::new();
        populate(&be);
        let mut wr = be.write();
        let removed = wr
            .delete_subtree(&dn("ou=People,o=test"))
            .expect("delete failed");
        assert_eq!(removed.len(), 3);
        assert!(!wr.exists(&dn("uid=a,ou=People,o=test")));
        assert!(!wr.exists(&dn("ou=People,o=test")));
        assert!(wr.exists(&dn("cn=g,ou=Groups,o=test")));
        assert_eq!(
            wr.delete_subtree(&dn("ou=People,o=test")).map(|_| ()),
            Err(OperationError::NoSuchObject)
        );
    }

    #[test]
    fn test_be_rename() {
        let be = Backend::new();
        populate(&be);
        let mut wr = be.write();
        assert_eq!(
            wr.rename(&dn("ou=People,o=test"), &dn("ou=Groups,o=test")).map(|_| ()),
            Err(OperationError::EntryAlreadyExists)
        );
        assert_eq!(
            wr.rename(&dn("ou=Missing,o=test"), &dn("ou=Other,o=test")).map(|_| ()),
            Err(OperationError::NoSuchObject)
        );
        assert_eq!(
            wr.rename(&dn("ou=People,o=test"), &dn("ou=x,uid=a,ou=People,o=test"))
                .map(|_| ()),
            Err(OperationError::UnwillingToPerform)
        );

        let moved = wr
            .rename(&dn("ou=People,o=test"), &dn("ou=Staff,o=test"))
            .expect("rename failed");
        assert_eq!(moved.len(), 3);
        assert!(moved
            .iter()
            .any(|(old, e)| *old == dn("uid=a,ou=People,o=test")
                && *e.dn() == dn("uid=a,ou=Staff,o=test")));
        assert!(!wr.exists(&dn("uid=a,ou=People,o=test")));
        assert!(wr.exists(&dn("uid=b,ou=Staff,o=test")));

        let staff = wr.get(&dn("ou=Staff,o=test")).expect("missing entry");
        assert!(staff.attribute_equality(&Attribute::Ou, &Value::new(&Attribute::Ou, "staff")));
        assert_eq!(
            scan_names(&wr, "o=test", SearchScope::OneLevel),
            vec!["ou=groups,o=test", "ou=staff,o=test"]
        );
    }

    #[test]
    fn test_be_modify() {
        let be = Backend::new();
        populate(&be);
        let mut wr = be.write();
        let updated = wr
            .modify(
                &dn("uid=a,ou=People,o=test"),
                &ModifyList::new_append(Attribute::Mail, "a@example.com"),
            )
            .expect("modify failed");
        assert!(updated.has_real_values(&Attribute::Mail));
        assert_eq!(
            wr.modify(&dn("uid=z,o=test"), &ModifyList::new()).map(|_| ()),
            Err(OperationError::NoSuchObject)
        );
    }

    #[test]
    fn test_limits_from_config() {
        let limits = Limits::from(&LimitsConfig {
            search_max_results: 10,
            search_time_limit_ms: Some(250),
            filter_max_elements: 8,
        });
        assert_eq!(limits.search_time_limit, Some(Duration::from_millis(250)));
        assert_eq!(Limits::unlimited().search_max_results, 0);
    }
}
