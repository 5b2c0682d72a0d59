use std::str::FromStr;

use crate::filter::SubstringAssertion;
use crate::prelude::*;

/// Presents the DN of the subschema entry governing every entry.
#[derive(Debug, Clone)]
pub struct SubschemaSubentryProvider {
    schema_dn: Value,
}

impl Default for SubschemaSubentryProvider {
    fn default() -> Self {
        SubschemaSubentryProvider {
            schema_dn: Value::new(&Attribute::SubschemaSubentry, SCHEMA_DN),
        }
    }
}

impl SubschemaSubentryProvider {
    fn schema_dn(&self) -> Option<Dn> {
        Dn::from_str(SCHEMA_DN).ok()
    }
}

impl VirtualAttributeProvider for SubschemaSubentryProvider {
    fn is_multi_valued(&self) -> bool {
        false
    }

    fn values<T>(
        &self,
        _txn: &T,
        _entry: &Entry,
        _rule: &VirtualAttributeRule,
    ) -> Result<ValueSet, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        let mut vs = ValueSet::new();
        vs.insert(self.schema_dn.clone());
        Ok(vs)
    }

    fn has_value_eq<T>(
        &self,
        _txn: &T,
        _entry: &Entry,
        _rule: &VirtualAttributeRule,
        value: &Value,
    ) -> Result<bool, OperationError>
    where
        T: DirectoryTransaction + ?Sized,
    {
        Ok(value.to_dn().is_some_and(|dn| Some(dn) == self.schema_dn()))
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
}
