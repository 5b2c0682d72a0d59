use crate::prelude::*;

/// Serves a fixed list of values taken from the rule configuration.
#[derive(Debug, Clone)]
pub struct UserDefinedProvider {
    values: ValueSet,
}

impl UserDefinedProvider {
    pub fn new(attr: &Attribute, raw: &[String]) -> Self {
        UserDefinedProvider {
            values: raw.iter().map(|r| Value::new(attr, r)).collect(),
        }
    }
}

impl VirtualAttributeProvider for UserDefinedProvider {
    fn is_multi_valued(&self) -> bool {
        self.values.len() > 1
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
        Ok(self.values.clone())
    }
}
