//! The registry of virtual attribute rules. Rules are keyed by name and held in a
//! `CowCell`, so a reader keeps the rule set it started with while configuration changes
//! are prepared and committed behind it.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use concread::cowcell::*;

use crate::prelude::*;

#[derive(Clone, Default)]
struct VirtualAttributesInner {
    rules: BTreeMap<String, Arc<VirtualAttributeRule>>,
}

pub struct VirtualAttributes {
    inner: CowCell<VirtualAttributesInner>,
}

impl Default for VirtualAttributes {
    fn default() -> Self {
        VirtualAttributes {
            inner: CowCell::new(VirtualAttributesInner::default()),
        }
    }
}

impl VirtualAttributes {
    pub fn read(&self) -> VirtualAttributesReadTransaction {
        VirtualAttributesReadTransaction {
            inner: self.inner.read(),
        }
    }

    pub fn write(&self) -> VirtualAttributesWriteTransaction {
        VirtualAttributesWriteTransaction {
            inner: self.inner.write(),
        }
    }
}

pub trait VirtualAttributesTransaction {
    fn get_inner(&self) -> &BTreeMap<String, Arc<VirtualAttributeRule>>;

    /// Every registered rule, ordered by name.
    fn rules(&self) -> Vec<Arc<VirtualAttributeRule>> {
        self.get_inner().values().cloned().collect()
    }

    /// The rules bound to `attr`, ordered by name.
    fn rules_for(&self, attr: &Attribute) -> Vec<Arc<VirtualAttributeRule>> {
        self.get_inner()
            .values()
            .filter(|r| r.attribute() == attr)
            .cloned()
            .collect()
    }

    fn get(&self, name: &str) -> Option<Arc<VirtualAttributeRule>> {
        self.get_inner().get(name).cloned()
    }

    fn len(&self) -> usize {
        self.get_inner().len()
    }
}

pub struct VirtualAttributesReadTransaction {
    inner: CowCellReadTxn<VirtualAttributesInner>,
}

impl VirtualAttributesTransaction for VirtualAttributesReadTransaction {
    fn get_inner(&self) -> &BTreeMap<String, Arc<VirtualAttributeRule>> {
        &self.inner.deref().rules
    }
}

pub struct VirtualAttributesWriteTransaction<'a> {
    inner: CowCellWriteTxn<'a, VirtualAttributesInner>,
}

impl VirtualAttributesTransaction for VirtualAttributesWriteTransaction<'_> {
    fn get_inner(&self) -> &BTreeMap<String, Arc<VirtualAttributeRule>> {
        &self.inner.deref().rules
    }
}

impl VirtualAttributesWriteTransaction<'_> {
    /// Register a new rule. Disabled rules are accepted but not registered.
    pub fn add(&mut self, rule: VirtualAttributeRule) -> Result<(), OperationError> {
        if self.inner.rules.contains_key(rule.name()) {
            admin_error!(rule = %rule.name(), "a virtual attribute rule with this name exists");
            return Err(OperationError::InvalidConfiguration(format!(
                "duplicate rule name {}",
                rule.name()
            )));
        }
        if !rule.enabled() {
            admin_info!(rule = %rule.name(), "virtual attribute rule is disabled");
            return Ok(());
        }
        admin_info!(rule = %rule, "registered virtual attribute rule");
        self.inner
            .rules
            .insert(rule.name().to_string(), Arc::new(rule));
        Ok(())
    }

    /// Replace the rule of the same name. A disabled replacement unregisters the rule.
    pub fn modify(&mut self, rule: VirtualAttributeRule) {
        let name = rule.name().to_string();
        if self.inner.rules.remove(&name).is_some() {
            admin_debug!(rule = %name, "replacing virtual attribute rule");
        }
        if rule.enabled() {
            admin_info!(rule = %rule, "registered virtual attribute rule");
            self.inner.rules.insert(name, Arc::new(rule));
        } else {
            admin_info!(rule = %name, "virtual attribute rule is disabled");
        }
    }

    pub fn delete(&mut self, name: &str) -> Result<(), OperationError> {
        match self.inner.rules.remove(name) {
            Some(_) => {
                admin_info!(rule = %name, "removed virtual attribute rule");
                Ok(())
            }
            None => {
                admin_warn!(rule = %name, "no such virtual attribute rule");
                Err(OperationError::NoSuchObject)
            }
        }
    }

    pub fn commit(self) {
        self.inner.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, attr: &str, enabled: bool) -> VirtualAttributeRule {
        let mut cfg = VirtualAttributeConfig::new(name, attr, ProviderKind::UserDefined);
        cfg.value = vec!["v".to_string()];
        cfg.enabled = enabled;
        VirtualAttributeRule::try_from_config(&cfg).expect("invalid rule")
    }

    #[test]
    fn test_registry_snapshot_isolation() {
        sketching::test_init();
        let vattrs = VirtualAttributes::default();

        let mut wr = vattrs.write();
        wr.add(rule("b", "description", true)).expect("add failed");
        wr.add(rule("a", "description", true)).expect("add failed");
        wr.add(rule("c", "mail", true)).expect("add failed");
        assert_eq!(
            wr.add(rule("a", "mail", true)),
            Err(OperationError::InvalidConfiguration(String::new()))
        );
        wr.add(rule("off", "description", false)).expect("add failed");
        wr.commit();

        let rd = vattrs.read();
        assert_eq!(rd.len(), 3);
        let names: Vec<_> = rd
            .rules_for(&Attribute::Description)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        let mut wr = vattrs.write();
        wr.delete("a").expect("delete failed");
        assert_eq!(wr.delete("a"), Err(OperationError::NoSuchObject));
        wr.modify(rule("c", "description", true));
        wr.modify(rule("b", "description", false));
        wr.commit();

        // The earlier reader still sees the rule set it began with.
        assert_eq!(rd.len(), 3);
        assert!(rd.get("a").is_some());

        let rd = vattrs.read();
        assert_eq!(rd.len(), 1);
        assert!(rd.get("b").is_none());
        assert_eq!(rd.rules_for(&Attribute::Description).len(), 1);
        assert!(rd.rules_for(&Attribute::Mail).is_empty());
    }
}
