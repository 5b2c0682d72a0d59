//! Attribute values and the matching rules that apply to them.
//!
//! There is no schema subsystem here. The syntax of an attribute is fixed by its type, and
//! each value carries the normalised form its syntax produces so that sets and comparisons
//! never need to consult anything else.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::dn::normalize_case_ignore;
use crate::filter::SubstringAssertion;
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxType {
    DistinguishedName,
    CaseIgnoreString,
    CaseExactString,
    Integer,
}

impl SyntaxType {
    pub fn for_attribute(attr: &Attribute) -> Self {
        match attr {
            Attribute::Member
            | Attribute::UniqueMember
            | Attribute::IsMemberOf
            | Attribute::EntryDn
            | Attribute::TargetGroupDn
            | Attribute::SubschemaSubentry
            | Attribute::Owner
            | Attribute::SeeAlso
            | Attribute::Manager => SyntaxType::DistinguishedName,
            Attribute::MemberUrl | Attribute::UserPassword => SyntaxType::CaseExactString,
            Attribute::UidNumber | Attribute::GidNumber => SyntaxType::Integer,
            _ => SyntaxType::CaseIgnoreString,
        }
    }
}

/// A single attribute value. Equality, ordering and hashing use the normalised form.
#[derive(Debug, Clone)]
pub struct Value {
    raw: String,
    norm: String,
    syntax: SyntaxType,
}

pub type ValueSet = BTreeSet<Value>;

// Name and optional uid of a uniqueMember value: `cn=x,o=y#'0101'B`
fn strip_unique_member_uid(value: &str) -> &str {
    match value.rfind("#'") {
        Some(idx) if value.ends_with("'B") => &value[..idx],
        _ => value,
    }
}

impl Value {
    pub fn new(attr: &Attribute, raw: &str) -> Self {
        Self::with_syntax(SyntaxType::for_attribute(attr), attr, raw)
    }

    fn with_syntax(syntax: SyntaxType, attr: &Attribute, raw: &str) -> Self {
        let (norm, syntax) = match syntax {
            SyntaxType::DistinguishedName => {
                let candidate = if *attr == Attribute::UniqueMember {
                    strip_unique_member_uid(raw)
                } else {
                    raw
                };
                match Dn::from_str(candidate) {
                    Ok(dn) => (dn.normalized().to_string(), SyntaxType::DistinguishedName),
                    // Never equal to a valid DN, but still comparable with itself.
                    Err(_) => (normalize_case_ignore(raw), SyntaxType::CaseIgnoreString),
                }
            }
            SyntaxType::Integer => match raw.trim().parse::<i64>() {
                Ok(i) => (i.to_string(), SyntaxType::Integer),
                Err(_) => (raw.trim().to_string(), SyntaxType::CaseExactString),
            },
            SyntaxType::CaseExactString => (raw.trim().to_string(), syntax),
            SyntaxType::CaseIgnoreString => (normalize_case_ignore(raw), syntax),
        };
        Value {
            raw: raw.to_string(),
            norm,
            syntax,
        }
    }

    pub fn new_dn(dn: &Dn) -> Self {
        Value {
            raw: dn.to_string(),
            norm: dn.normalized().to_string(),
            syntax: SyntaxType::DistinguishedName,
        }
    }

    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    pub fn normalized(&self) -> &str {
        self.norm.as_str()
    }

    pub fn syntax(&self) -> SyntaxType {
        self.syntax
    }

    /// The value as a DN, if it has DN syntax and parsed as one.
    pub fn to_dn(&self) -> Option<Dn> {
        if self.syntax == SyntaxType::DistinguishedName {
            Dn::from_str(strip_unique_member_uid(&self.raw)).ok()
        } else {
            None
        }
    }

    fn normalize_assertion(&self, assertion: &str) -> String {
        match self.syntax {
            SyntaxType::CaseExactString | SyntaxType::Integer => assertion.to_string(),
            SyntaxType::CaseIgnoreString | SyntaxType::DistinguishedName => {
                normalize_case_ignore(assertion)
            }
        }
    }

    /// Substring matching. DN and integer syntaxes have no substring rule.
    pub fn matches_substring(&self, sub: &SubstringAssertion) -> ConditionResult {
        if matches!(
            self.syntax,
            SyntaxType::DistinguishedName | SyntaxType::Integer
        ) {
            return ConditionResult::Undefined;
        }

        let mut remaining = self.norm.as_str();

        if let Some(initial) = sub.initial.as_deref() {
            let initial = self.normalize_assertion(initial);
            match remaining.strip_prefix(initial.as_str()) {
                Some(rest) => remaining = rest,
                None => return ConditionResult::False,
            }
        }

        // The final component must not overlap with anything matched before it.
        let final_ = sub.final_.as_deref().map(|f| self.normalize_assertion(f));
        if let Some(f) = final_.as_deref() {
            match remaining.strip_suffix(f) {
                Some(rest) => remaining = rest,
                None => return ConditionResult::False,
            }
        }

        for any in sub.any.iter() {
            let any = self.normalize_assertion(any);
            match remaining.find(any.as_str()) {
                Some(idx) => remaining = &remaining[idx + any.len()..],
                None => return ConditionResult::False,
            }
        }

        ConditionResult::True
    }

    /// Compare this value against an assertion of the same attribute. `None` when the
    /// syntax has no ordering rule or the assertion cannot be compared.
    pub fn ordering(&self, assertion: &Value) -> Option<Ordering> {
        match (self.syntax, assertion.syntax) {
            (SyntaxType::Integer, SyntaxType::Integer) => {
                let a = self.norm.parse::<i64>().ok()?;
                let b = assertion.norm.parse::<i64>().ok()?;
                Some(a.cmp(&b))
            }
            (SyntaxType::Integer, _) | (_, SyntaxType::Integer) => None,
            (SyntaxType::DistinguishedName, _) | (_, SyntaxType::DistinguishedName) => None,
            _ => Some(self.norm.cmp(&assertion.norm)),
        }
    }

    pub fn greater_or_equal(&self, assertion: &Value) -> ConditionResult {
        match self.ordering(assertion) {
            Some(o) => ConditionResult::from(o != Ordering::Less),
            None => ConditionResult::Undefined,
        }
    }

    pub fn less_or_equal(&self, assertion: &Value) -> ConditionResult {
        match self.ordering(assertion) {
            Some(o) => ConditionResult::from(o != Ordering::Greater),
            None => ConditionResult::Undefined,
        }
    }

    pub fn approximately_equal(&self, assertion: &Value) -> ConditionResult {
        let squash = |s: &str| s.split_whitespace().collect::<String>();
        ConditionResult::from(squash(&self.norm) == squash(&assertion.norm))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state)
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.norm.cmp(&other.norm)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fold per value results: True if any value is True, otherwise Undefined if any value is
/// Undefined, otherwise False. An empty set is False.
pub fn valueset_condition<'a, I, F>(values: I, f: F) -> ConditionResult
where
    I: IntoIterator<Item = &'a Value>,
    F: Fn(&Value) -> ConditionResult,
{
    values
        .into_iter()
        .map(f)
        .fold(ConditionResult::False, ConditionResult::or)
}
