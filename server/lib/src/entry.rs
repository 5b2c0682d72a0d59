//! Entries are the base unit of data in the directory. An entry has a DN and a set of
//! attributes. Each attribute holds one or more value groups: at most one group of real
//! values that was stored in the backend, plus any groups attached by virtual attribute
//! rules when the entry was resolved for a request.
//!
//! Filters are evaluated against an entry in two ways. `entry_match_real` looks only at real
//! values and is used where the result must not depend on virtual attributes, such as rule
//! and group recognition filters. `entry_match` consults the provider behind each virtual
//! group, so that a virtual attribute can answer an assertion without materialising all of
//! its values.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::filter::SubstringAssertion;
use crate::prelude::*;
use crate::value::valueset_condition;

#[derive(Debug, Clone)]
pub enum ValueOrigin {
    Real,
    Virtual(Arc<VirtualAttributeRule>),
}

#[derive(Debug, Clone)]
pub struct ValueGroup {
    pub origin: ValueOrigin,
    pub values: ValueSet,
}

impl ValueGroup {
    pub fn is_real(&self) -> bool {
        matches!(self.origin, ValueOrigin::Real)
    }

    pub fn rule(&self) -> Option<&Arc<VirtualAttributeRule>> {
        match &self.origin {
            ValueOrigin::Real => None,
            ValueOrigin::Virtual(rule) => Some(rule),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    dn: Dn,
    attrs: BTreeMap<Attribute, Vec<ValueGroup>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryJson {
    dn: String,
    #[serde(default)]
    attrs: BTreeMap<String, Vec<String>>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Entry {
            dn,
            attrs: BTreeMap::new(),
        }
    }

    /// Load an entry from its json form: `{"dn": "...", "attrs": {"cn": ["..."]}}`.
    pub fn from_json_str(es: &str) -> Result<Self, OperationError> {
        let ej: EntryJson = serde_json::from_str(es).map_err(|e| {
            admin_error!(?e, "failed to deserialise entry");
            OperationError::SerdeJsonError
        })?;

        let dn = Dn::from_str(&ej.dn)?;
        let mut entry = Entry::new(dn);
        for (name, values) in ej.attrs {
            if !Attribute::is_valid_name(&name) {
                return Err(OperationError::InvalidAttributeName(name));
            }
            let attr = Attribute::from_str(&name);
            for v in values {
                entry.add_ava(attr.clone(), &v);
            }
        }
        Ok(entry)
    }

    #[cfg(test)]
    pub(crate) fn unsafe_from_entry_str(es: &str) -> Self {
        #[allow(clippy::expect_used)]
        Self::from_json_str(es).expect("invalid test entry")
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Give the entry a new DN. When the RDN changes, the values it named are replaced with
    /// the values of the new RDN.
    pub(crate) fn set_dn(&mut self, dn: Dn) {
        let rdn_changed = match (self.dn.rdn(), dn.rdn()) {
            (Some(old), Some(new)) => old.normalized() != new.normalized(),
            _ => false,
        };
        if rdn_changed {
            if let Some(old) = self.dn.rdn().cloned() {
                for ava in old.avas() {
                    let attr = Attribute::from_str(ava.attr());
                    let value = Value::new(&attr, ava.value());
                    self.remove_ava(&attr, &value);
                }
            }
            if let Some(new) = dn.rdn().cloned() {
                for ava in new.avas() {
                    self.add_ava(Attribute::from_str(ava.attr()), ava.value());
                }
            }
        }
        self.dn = dn;
    }

    fn real_group_mut(&mut self, attr: Attribute) -> &mut ValueSet {
        let groups = self.attrs.entry(attr).or_default();
        let idx = match groups.iter().position(ValueGroup::is_real) {
            Some(idx) => idx,
            None => {
                groups.insert(
                    0,
                    ValueGroup {
                        origin: ValueOrigin::Real,
                        values: ValueSet::new(),
                    },
                );
                0
            }
        };
        &mut groups[idx].values
    }

    /// Add a real value. Returns false if the value was already present.
    pub fn add_ava(&mut self, attr: Attribute, raw: &str) -> bool {
        let value = Value::new(&attr, raw);
        self.add_ava_value(attr, value)
    }

    pub fn add_ava_value(&mut self, attr: Attribute, value: Value) -> bool {
        self.real_group_mut(attr).insert(value)
    }

    /// Remove a real value. Returns false if the value was not present.
    pub fn remove_ava(&mut self, attr: &Attribute, value: &Value) -> bool {
        let Some(groups) = self.attrs.get_mut(attr) else {
            return false;
        };
        let removed = groups
            .iter_mut()
            .filter(|g| g.is_real())
            .any(|g| g.values.remove(value));
        self.prune(attr);
        removed
    }

    /// Remove all real values of an attribute.
    pub fn purge_ava(&mut self, attr: &Attribute) {
        if let Some(groups) = self.attrs.get_mut(attr) {
            groups.retain(|g| !g.is_real());
        }
        self.prune(attr);
    }

    pub fn set_ava<'a, I>(&mut self, attr: Attribute, values: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.purge_ava(&attr);
        for v in values {
            self.add_ava(attr.clone(), v);
        }
    }

    // Drop empty real groups, and the attribute once nothing is left.
    fn prune(&mut self, attr: &Attribute) {
        let empty = match self.attrs.get_mut(attr) {
            Some(groups) => {
                groups.retain(|g| !(g.is_real() && g.values.is_empty()));
                groups.is_empty()
            }
            None => false,
        };
        if empty {
            self.attrs.remove(attr);
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.keys()
    }

    pub fn value_groups(&self, attr: &Attribute) -> &[ValueGroup] {
        self.attrs.get(attr).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn real_values(&self, attr: &Attribute) -> Option<&ValueSet> {
        self.value_groups(attr)
            .iter()
            .find(|g| g.is_real())
            .map(|g| &g.values)
            .filter(|vs| !vs.is_empty())
    }

    pub fn has_real_values(&self, attr: &Attribute) -> bool {
        self.real_values(attr).is_some()
    }

    /// The union of every value group of the attribute.
    pub fn get_ava_set(&self, attr: &Attribute) -> ValueSet {
        self.value_groups(attr)
            .iter()
            .flat_map(|g| g.values.iter().cloned())
            .collect()
    }

    pub fn get_ava_single(&self, attr: &Attribute) -> Option<Value> {
        let set = self.get_ava_set(attr);
        if set.len() == 1 {
            set.into_iter().next()
        } else {
            None
        }
    }

    pub fn attribute_pres(&self, attr: &Attribute) -> bool {
        self.value_groups(attr).iter().any(|g| !g.values.is_empty())
    }

    pub fn attribute_equality(&self, attr: &Attribute, value: &Value) -> bool {
        self.value_groups(attr)
            .iter()
            .any(|g| g.values.contains(value))
    }

    pub fn has_class(&self, class: EntryClass) -> bool {
        let v = Value::new(&Attribute::ObjectClass, class.as_str());
        self.real_values(&Attribute::ObjectClass)
            .map(|vs| vs.contains(&v))
            .unwrap_or(false)
    }

    /// Replace every value group of an attribute. An empty list removes the attribute.
    pub fn set_value_groups(&mut self, attr: Attribute, groups: Vec<ValueGroup>) {
        if groups.is_empty() {
            self.attrs.remove(&attr);
        } else {
            self.attrs.insert(attr, groups);
        }
    }

    /// Drop every real value group from the entry, leaving only virtual values.
    pub fn retain_virtual(&mut self) {
        self.attrs.retain(|_, groups| {
            groups.retain(|g| !g.is_real());
            !groups.is_empty()
        });
    }

    pub fn retain_attributes<F>(&mut self, mut f: F)
    where
        F: FnMut(&Attribute) -> bool,
    {
        self.attrs.retain(|a, _| f(a))
    }

    /// True if any virtual group is attached to this entry.
    pub fn has_virtual(&self) -> bool {
        self.attrs
            .values()
            .any(|groups| groups.iter().any(|g| !g.is_real()))
    }

    /// Apply a list of changes to the real values of this entry.
    pub fn apply_modlist(&mut self, modlist: &ModifyList) -> Result<(), OperationError> {
        for modify in modlist {
            match modify {
                Modify::Present(attr, raw) => {
                    if !self.add_ava(attr.clone(), raw) {
                        request_error!(%attr, value = %raw, "value already present");
                        return Err(OperationError::AttributeOrValueExists);
                    }
                }
                Modify::Removed(attr, raw) => {
                    let value = Value::new(attr, raw);
                    if !self.remove_ava(attr, &value) {
                        request_error!(%attr, value = %raw, "value not present");
                        return Err(OperationError::NoSuchAttributeValue);
                    }
                }
                Modify::Purged(attr) => self.purge_ava(attr),
            }
        }
        Ok(())
    }

    /// Evaluate a filter against the real values only.
    pub fn entry_match_real(&self, filter: &Filter) -> ConditionResult {
        match filter {
            Filter::And(l) => {
                let mut result = ConditionResult::True;
                for f in l {
                    result = result.and(self.entry_match_real(f));
                    if result == ConditionResult::False {
                        break;
                    }
                }
                result
            }
            Filter::Or(l) => {
                let mut result = ConditionResult::False;
                for f in l {
                    result = result.or(self.entry_match_real(f));
                    if result == ConditionResult::True {
                        break;
                    }
                }
                result
            }
            Filter::Not(f) => self.entry_match_real(f).not(),
            leaf => match leaf.attribute().and_then(|a| self.real_values(a)) {
                Some(values) => match_values(values, leaf),
                None => ConditionResult::False,
            },
        }
    }

    /// Evaluate a filter against the entry as resolved, asking the provider of each
    /// virtual group to answer for its attribute.
    pub fn entry_match<T>(&self, txn: &T, filter: &Filter) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        match filter {
            Filter::And(l) => {
                let mut result = ConditionResult::True;
                for f in l {
                    result = result.and(self.entry_match(txn, f)?);
                    if result == ConditionResult::False {
                        break;
                    }
                }
                Ok(result)
            }
            Filter::Or(l) => {
                let mut result = ConditionResult::False;
                for f in l {
                    result = result.or(self.entry_match(txn, f)?);
                    if result == ConditionResult::True {
                        break;
                    }
                }
                Ok(result)
            }
            Filter::Not(f) => self.entry_match(txn, f).map(ConditionResult::not),
            leaf => {
                let Some(attr) = leaf.attribute() else {
                    return Ok(ConditionResult::False);
                };
                let mut result = ConditionResult::False;
                for group in self.value_groups(attr) {
                    let r = match &group.origin {
                        ValueOrigin::Real => match_values(&group.values, leaf),
                        ValueOrigin::Virtual(rule) => self.match_virtual(txn, rule, leaf)?,
                    };
                    result = result.or(r);
                    if result == ConditionResult::True {
                        break;
                    }
                }
                Ok(result)
            }
        }
    }

    fn match_virtual<T>(
        &self,
        txn: &T,
        rule: &VirtualAttributeRule,
        leaf: &Filter,
    ) -> Result<ConditionResult, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let provider = rule.provider();
        match leaf {
            Filter::Pres(_) => provider.has_value(txn, self, rule).map(ConditionResult::from),
            Filter::Eq(_, v) => provider
                .has_value_eq(txn, self, rule, v)
                .map(ConditionResult::from),
            Filter::Sub(_, sub) => provider.matches_substring(txn, self, rule, sub),
            Filter::Ge(_, v) => provider.greater_or_equal(txn, self, rule, v),
            Filter::Le(_, v) => provider.less_or_equal(txn, self, rule, v),
            Filter::Approx(_, v) => provider.approximately_equal(txn, self, rule, v),
            Filter::And(_) | Filter::Or(_) | Filter::Not(_) => Ok(ConditionResult::False),
        }
    }
}

fn match_values(values: &ValueSet, leaf: &Filter) -> ConditionResult {
    match leaf {
        Filter::Pres(_) => ConditionResult::from(!values.is_empty()),
        Filter::Eq(_, v) => ConditionResult::from(values.contains(v)),
        Filter::Sub(_, sub) => match_substring(values, sub),
        Filter::Ge(_, v) => valueset_condition(values, |x| x.greater_or_equal(v)),
        Filter::Le(_, v) => valueset_condition(values, |x| x.less_or_equal(v)),
        Filter::Approx(_, v) => valueset_condition(values, |x| x.approximately_equal(v)),
        Filter::And(_) | Filter::Or(_) | Filter::Not(_) => ConditionResult::False,
    }
}

fn match_substring(values: &ValueSet, sub: &SubstringAssertion) -> ConditionResult {
    valueset_condition(values, |x| x.matches_substring(sub))
}
