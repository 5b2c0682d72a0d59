use crate::filter::SubstringAssertion;
use crate::prelude::*;
use crate::vattr::searchable::{has_equality_anchor, process_search_scan};

/// Presents the normalized DN of the entry itself.
#[derive(Debug, Clone)]
pub struct EntryDnProvider;

impl VirtualAttributeProvider for EntryDnProvider {
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
        let mut vs = ValueSet::new();
        vs.insert(Value::new(&Attribute::EntryDn, entry.dn().normalized()));
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

    fn has_value_eq<T>(
        &self,
        _txn: &T,
        entry: &Entry,
        _rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(value.to_dn().is_some_and(|dn| &dn == entry.dn()))
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

    fn greater_or_equal<T>(
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

    fn less_or_equal<T>(
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

    fn is_searchable<T>(&self, _txn: &T, rule: &VirtualAttributeRule, op: &SearchOperation) -> bool
    where
        T: DirectoryTransaction + ?Sized,
    {
        has_equality_anchor(op.filter(), rule.attribute())
    }

    fn process_search<T>(
        &self,
        txn: &T,
        rule: &VirtualAttributeRule,
        op: &mut SearchOperation,
    ) -> Result<(), OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        process_search_scan(txn, rule, op)
    }
}
