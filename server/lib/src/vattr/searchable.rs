//! Searchability of virtual attributes. A virtual attribute is not indexed, so a search can
//! only be driven by its provider when the filter pins the attribute to explicit values on
//! every path that could match.

use std::sync::Arc;

use crate::prelude::*;

/// Does `filter` carry an equality assertion on `attr` that every matching entry must
/// satisfy?
///
/// * an equality on `attr` is an anchor,
/// * an AND is anchored if any of its children is,
/// * an OR is anchored only if each of its children is itself an equality on `attr`,
/// * a NOT and every other assertion never are.
pub fn has_equality_anchor(filter: &Filter, attr: &Attribute) -> bool {
    match filter {
        Filter::Eq(a, _) => a == attr,
        Filter::And(l) => l.iter().any(|f| has_equality_anchor(f, attr)),
        Filter::Or(l) => {
            !l.is_empty() && l.iter().all(|f| matches!(f, Filter::Eq(a, _) if a == attr))
        }
        Filter::Not(_)
        | Filter::Sub(_, _)
        | Filter::Pres(_)
        | Filter::Ge(_, _)
        | Filter::Le(_, _)
        | Filter::Approx(_, _) => false,
    }
}

/// Walk every entry in the intersection of the operation scope and the rule scope, resolve
/// its virtual attributes and return it if the complete filter of the operation holds.
/// Limits and cancellation are checked before each candidate.
#[instrument(level = "debug", skip_all, fields(rule = %rule.name()))]
pub fn process_search_scan<T>(
    txn: &T,
    rule: &VirtualAttributeRule,
    op: &mut SearchOperation,
) -> Result<(), OperationError>
where
    T: DirectoryTransaction + ?Sized,
{
    let candidates: Vec<Arc<Entry>> = txn.scan(op.base(), op.scope());
    perf_trace!(candidates = candidates.len(), "virtual attribute driven search");

    for entry in candidates {
        op.check_limits()?;
        if !rule.applies_to(txn, &entry)? {
            continue;
        }
        let resolved = txn.resolve_entry(&entry, op.directives())?;
        if resolved.entry_match(txn, op.filter())?.is_true() {
            op.return_entry(resolved)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn anchored(f: &str) -> bool {
        let f = Filter::from_str(f).expect("invalid filter");
        has_equality_anchor(&f, &Attribute::IsMemberOf)
    }

    #[test]
    fn test_equality_anchor_table() {
        let g1 = "isMemberOf=cn=g1,o=test";
        let g2 = "isMemberOf=cn=g2,o=test";

        assert!(anchored(&format!("({})", g1)));
        assert!(anchored(&format!("(&({})(givenName=test))", g1)));
        assert!(anchored(&format!("(&(givenName=test)({}))", g1)));
        assert!(anchored(&format!("(&({})({}))", g1, g2)));
        assert!(anchored(&format!("(|({})({}))", g1, g2)));
        assert!(anchored(&format!("(&(sn=x)(|({})({})))", g1, g2)));
        // Case of the attribute name does not matter.
        assert!(anchored("(ISMEMBEROF=cn=g1,o=test)"));

        assert!(!anchored("(isMemberOf=*)"));
        assert!(!anchored("(isMemberOf=cn=g*)"));
        assert!(!anchored("(isMemberOf>=cn=g1,o=test)"));
        assert!(!anchored("(isMemberOf<=cn=g1,o=test)"));
        assert!(!anchored("(isMemberOf~=cn=g1,o=test)"));
        assert!(!anchored(&format!("(!({}))", g1)));
        assert!(!anchored("(givenName=test)"));
        assert!(!anchored(&format!("(|({})(givenName=test))", g1)));
        // Only direct children of an OR count, even if a nested AND is anchored.
        assert!(!anchored(&format!("(|({})(&({})(sn=x)))", g1, g2)));
        assert!(!anchored(&format!("(&(!({}))(sn=x))", g1)));
        assert!(!has_equality_anchor(&f_or(vec![]), &Attribute::IsMemberOf));
        assert!(!has_equality_anchor(&f_and(vec![]), &Attribute::IsMemberOf));
    }
}
