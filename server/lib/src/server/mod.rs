//! `server` contains the directory server, which ties the backend, the group manager and
//! the virtual attribute registry together. Every operation runs inside a read or write
//! transaction. Commits of the three parts are made under an exclusive guard, and a
//! reader takes its three snapshots under the shared side of it, so a reader always sees
//! the parts as of the same commit.

use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::be::{
    Backend, BackendReadTransaction, BackendTransaction, BackendWriteTransaction,
};
use crate::config::ServerConfig;
use crate::group::manager::{
    GroupManager, GroupManagerReadTransaction, GroupManagerTransaction,
    GroupManagerWriteTransaction,
};
use crate::prelude::*;
use crate::vattr::registry::{
    VirtualAttributes, VirtualAttributesReadTransaction, VirtualAttributesTransaction,
    VirtualAttributesWriteTransaction,
};
use crate::vattr::{resolve_virtual_attributes, values_for};

pub mod search;

pub struct DirectoryServer {
    be: Backend,
    groups: Arc<GroupManager>,
    vattrs: Arc<VirtualAttributes>,
    limits: Limits,
    txn_lock: RwLock<()>,
}

pub struct DirectoryServerReadTransaction<'a> {
    be_txn: BackendReadTransaction<'a>,
    groups: GroupManagerReadTransaction,
    vattrs: VirtualAttributesReadTransaction,
    limits: Limits,
}

pub struct DirectoryServerWriteTransaction<'a> {
    be_txn: BackendWriteTransaction<'a>,
    groups: GroupManagerWriteTransaction<'a>,
    vattrs: VirtualAttributesWriteTransaction<'a>,
    limits: Limits,
    txn_lock: &'a RwLock<()>,
}

pub trait DirectoryTransaction {
    type BackendTransactionType: BackendTransaction;
    fn get_be_txn(&self) -> &Self::BackendTransactionType;

    type GroupManagerTransactionType: GroupManagerTransaction;
    fn get_groups(&self) -> &Self::GroupManagerTransactionType;

    type VirtualAttributesTransactionType: VirtualAttributesTransaction;
    fn get_vattrs(&self) -> &Self::VirtualAttributesTransactionType;

    fn limits(&self) -> &Limits;

    /// The entry as stored, without any virtual attributes.
    fn get_entry_real(&self, dn: &Dn) -> Option<Arc<Entry>> {
        self.get_be_txn().get(dn)
    }

    fn scan(&self, base: &Dn, scope: SearchScope) -> Vec<Arc<Entry>> {
        self.get_be_txn().scan(base, scope)
    }

    fn group_instance(&self, dn: &Dn) -> Option<Arc<GroupInstance>> {
        self.get_groups().get(dn)
    }

    fn group_instances(&self) -> Vec<Arc<GroupInstance>> {
        self.get_groups().all()
    }

    fn rules(&self) -> Vec<Arc<VirtualAttributeRule>> {
        self.get_vattrs().rules()
    }

    fn rules_for(&self, attr: &Attribute) -> Vec<Arc<VirtualAttributeRule>> {
        self.get_vattrs().rules_for(attr)
    }

    fn rule(&self, name: &str) -> Option<Arc<VirtualAttributeRule>> {
        self.get_vattrs().get(name)
    }

    /// The value groups of `attr` on a stored entry after the applicable rules have run.
    fn values_for(
        &self,
        entry: &Entry,
        attr: &Attribute,
        directives: VirtualAttributeDirectives,
    ) -> Result<Vec<ValueGroup>, OperationError> {
        values_for(self, entry, attr, directives)
    }

    fn resolve_entry(
        &self,
        entry: &Entry,
        directives: VirtualAttributeDirectives,
    ) -> Result<Entry, OperationError> {
        resolve_virtual_attributes(self, entry, directives)
    }

    /// Fetch an entry with its virtual attributes computed.
    fn get_entry(
        &self,
        dn: &Dn,
        directives: VirtualAttributeDirectives,
    ) -> Result<Entry, OperationError> {
        let Some(entry) = self.get_entry_real(dn) else {
            request_warn!(%dn, "no such entry");
            return Err(OperationError::NoSuchObject);
        };
        self.resolve_entry(&entry, directives)
    }

    /// Execute a search. If a virtual attribute named in the filter can drive the search,
    /// its provider does so. Otherwise every entry in scope is resolved and tested.
    #[instrument(level = "debug", skip_all)]
    fn search(&self, op: &mut SearchOperation) -> Result<(), OperationError> {
        op.apply_limits(self.limits());
        request_info!(base = %op.base(), scope = ?op.scope(), filter = %op.filter(), "search");

        let elements = op.filter().element_count();
        if elements > self.limits().filter_max_elements {
            request_error!(
                elements,
                max = self.limits().filter_max_elements,
                "filter exceeds the element limit"
            );
            return Err(OperationError::ResourceLimit);
        }

        if !op.base().is_root() && self.get_entry_real(op.base()).is_none() {
            request_warn!(base = %op.base(), "search base does not exist");
            return Err(OperationError::NoSuchObject);
        }

        if !op.directives().real_only {
            for rule in self.rules() {
                if !op.filter().references(rule.attribute()) {
                    continue;
                }
                let provider = rule.provider();
                if provider.is_searchable(self, &rule, op) {
                    request_trace!(rule = %rule.name(), "virtual attribute will process search");
                    return provider.process_search(self, &rule, op);
                }
            }
        }

        for entry in self.scan(op.base(), op.scope()) {
            op.check_limits()?;
            let resolved = self.resolve_entry(&entry, op.directives())?;
            if resolved.entry_match(self, op.filter())?.is_true() {
                op.return_entry(resolved)?;
            }
        }
        Ok(())
    }
}

impl<'a> DirectoryTransaction for DirectoryServerReadTransaction<'a> {
    type BackendTransactionType = BackendReadTransaction<'a>;
    fn get_be_txn(&self) -> &BackendReadTransaction<'a> {
        &self.be_txn
    }

    type GroupManagerTransactionType = GroupManagerReadTransaction;
    fn get_groups(&self) -> &GroupManagerReadTransaction {
        &self.groups
    }

    type VirtualAttributesTransactionType = VirtualAttributesReadTransaction;
    fn get_vattrs(&self) -> &VirtualAttributesReadTransaction {
        &self.vattrs
    }

    fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl<'a> DirectoryTransaction for DirectoryServerWriteTransaction<'a> {
    type BackendTransactionType = BackendWriteTransaction<'a>;
    fn get_be_txn(&self) -> &BackendWriteTransaction<'a> {
        &self.be_txn
    }

    type GroupManagerTransactionType = GroupManagerWriteTransaction<'a>;
    fn get_groups(&self) -> &GroupManagerWriteTransaction<'a> {
        &self.groups
    }

    type VirtualAttributesTransactionType = VirtualAttributesWriteTransaction<'a>;
    fn get_vattrs(&self) -> &VirtualAttributesWriteTransaction<'a> {
        &self.vattrs
    }

    fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl<'a> DirectoryServerWriteTransaction<'a> {
    pub fn add_entry(&mut self, entry: Entry) -> Result<(), OperationError> {
        let entry = self.be_txn.create(entry)?;
        self.groups.reload_entry(&entry);
        Ok(())
    }

    pub fn modify(&mut self, dn: &Dn, modlist: &ModifyList) -> Result<(), OperationError> {
        let entry = self.be_txn.modify(dn, modlist)?;
        self.groups.reload_entry(&entry);
        Ok(())
    }

    pub fn delete(&mut self, dn: &Dn) -> Result<(), OperationError> {
        self.be_txn.delete(dn)?;
        self.groups.remove(dn);
        Ok(())
    }

    /// Delete an entry and everything beneath it. Groups within the subtree are
    /// unregistered.
    pub fn delete_subtree(&mut self, dn: &Dn) -> Result<(), OperationError> {
        for entry in self.be_txn.delete_subtree(dn)? {
            self.groups.remove(entry.dn());
        }
        Ok(())
    }

    /// Give an entry a new RDN under the same parent, returning the new DN. Entries
    /// beneath it move with it, and groups among them are registered under their new DN.
    pub fn rename(&mut self, dn: &Dn, new_rdn: &str) -> Result<Dn, OperationError> {
        let new_dn = dn.with_rdn(new_rdn)?;
        for (old_dn, entry) in self.be_txn.rename(dn, &new_dn)? {
            self.groups.remove(&old_dn);
            self.groups.reload_entry(&entry);
        }
        Ok(new_dn)
    }

    pub fn add_virtual_attribute(
        &mut self,
        cfg: &VirtualAttributeConfig,
    ) -> Result<(), OperationError> {
        let rule = VirtualAttributeRule::try_from_config(cfg)?;
        self.vattrs.add(rule)
    }

    /// Replace the rule of the same name, registering it if it was absent or disabled.
    pub fn modify_virtual_attribute(
        &mut self,
        cfg: &VirtualAttributeConfig,
    ) -> Result<(), OperationError> {
        let rule = VirtualAttributeRule::try_from_config(cfg)?;
        self.vattrs.modify(rule);
        Ok(())
    }

    pub fn delete_virtual_attribute(&mut self, name: &str) -> Result<(), OperationError> {
        self.vattrs.delete(name)
    }

    pub fn commit(self) -> Result<(), OperationError> {
        let DirectoryServerWriteTransaction {
            be_txn,
            groups,
            vattrs,
            limits: _,
            txn_lock,
        } = self;
        let _guard = txn_lock.write().unwrap_or_else(PoisonError::into_inner);
        be_txn.commit();
        groups.commit();
        vattrs.commit();
        Ok(())
    }
}

impl DirectoryServer {
    /// Build a server from its configuration. Rules that fail to build are logged and
    /// left out; the server still starts.
    pub fn new(config: &ServerConfig) -> Self {
        let server = DirectoryServer {
            be: Backend::new(),
            groups: Arc::new(GroupManager::default()),
            vattrs: Arc::new(VirtualAttributes::default()),
            limits: Limits::from(&config.limits),
            txn_lock: RwLock::new(()),
        };

        {
            let mut vattrs = server.vattrs.write();
            if config.default_rules {
                for builtin in BUILTIN_VIRTUAL_ATTRIBUTES.iter() {
                    let cfg = VirtualAttributeConfig::from(builtin);
                    match VirtualAttributeRule::try_from_config(&cfg) {
                        Ok(rule) => {
                            if let Err(e) = vattrs.add(rule) {
                                admin_error!(?e, rule = %cfg.name, "unable to register builtin rule");
                            }
                        }
                        Err(e) => {
                            admin_error!(?e, rule = %cfg.name, "invalid builtin rule")
                        }
                    }
                }
            }

            for cfg in config.virtual_attributes.iter() {
                match VirtualAttributeRule::try_from_config(cfg) {
                    Ok(rule) => {
                        if vattrs.get(rule.name()).is_some() {
                            admin_info!(rule = %cfg.name, "configured rule replaces builtin rule");
                            vattrs.modify(rule);
                        } else if let Err(e) = vattrs.add(rule) {
                            admin_error!(?e, rule = %cfg.name, "unable to register rule");
                        }
                    }
                    Err(e) => {
                        admin_error!(?e, rule = %cfg.name, "ignoring invalid virtual attribute rule");
                    }
                }
            }
            vattrs.commit();
        }

        server
    }

    pub fn read(&self) -> DirectoryServerReadTransaction<'_> {
        let _guard = self.txn_lock.read().unwrap_or_else(PoisonError::into_inner);
        DirectoryServerReadTransaction {
            be_txn: self.be.read(),
            groups: self.groups.read(),
            vattrs: self.vattrs.read(),
            limits: self.limits.clone(),
        }
    }

    pub fn write(&self) -> DirectoryServerWriteTransaction<'_> {
        DirectoryServerWriteTransaction {
            be_txn: self.be.write(),
            groups: self.groups.write(),
            vattrs: self.vattrs.write(),
            limits: self.limits.clone(),
            txn_lock: &self.txn_lock,
        }
    }

    /// Check that the group manager agrees with the stored entries. Every entry that is
    /// a buildable group must be registered, and every registered group must exist.
    pub fn verify(&self) -> Vec<OperationError> {
        let rd = self.read();
        let mut results = Vec::with_capacity(0);

        for entry in rd.scan(&Dn::root(), SearchScope::Subtree) {
            let registered = rd.group_instance(entry.dn()).is_some();
            let expected = matches!(GroupInstance::try_from_entry(&entry), Ok(Some(_)));
            if registered != expected {
                admin_error!(dn = %entry.dn(), registered, expected, "group registration mismatch");
                results.push(OperationError::InvalidGroupState(entry.dn().to_string()));
            }
        }

        for group in rd.group_instances() {
            if rd.get_entry_real(group.group_dn()).is_none() {
                admin_error!(dn = %group.group_dn(), "registered group has no entry");
                results.push(OperationError::InvalidGroupState(group.group_dn().to_string()));
            }
        }

        results
    }
}

impl Default for DirectoryServer {
    fn default() -> Self {
        DirectoryServer::new(&ServerConfig::default())
    }
}

impl FromStr for DirectoryServer {
    type Err = OperationError;

    /// Build a server from the text of a TOML configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServerConfig::from_str(s).map(|cfg| DirectoryServer::new(&cfg))
    }
}
