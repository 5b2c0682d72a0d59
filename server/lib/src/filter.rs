//! Search filters. A `Filter` is built either with the `f_*` helpers or parsed from its
//! RFC 4515 string form, and is evaluated against entries with three valued logic.
//!
//! Filter values are normalised for the syntax of their attribute when the filter is built,
//! so evaluation is a direct comparison against the normalised values held on an entry.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ldap3_proto::filter;
use ldap3_proto::proto::{LdapFilter, LdapSubstringFilter};

use crate::prelude::*;

/// The outcome of evaluating a filter element. `Undefined` arises when a matching rule
/// does not apply, such as ordering on a DN valued attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionResult {
    True,
    False,
    Undefined,
}

impl ConditionResult {
    pub fn is_true(self) -> bool {
        self == ConditionResult::True
    }

    #[must_use]
    pub fn and(self, other: ConditionResult) -> ConditionResult {
        match (self, other) {
            (ConditionResult::False, _) | (_, ConditionResult::False) => ConditionResult::False,
            (ConditionResult::True, ConditionResult::True) => ConditionResult::True,
            _ => ConditionResult::Undefined,
        }
    }

    #[must_use]
    pub fn or(self, other: ConditionResult) -> ConditionResult {
        match (self, other) {
            (ConditionResult::True, _) | (_, ConditionResult::True) => ConditionResult::True,
            (ConditionResult::False, ConditionResult::False) => ConditionResult::False,
            _ => ConditionResult::Undefined,
        }
    }

    #[must_use]
    pub fn not(self) -> ConditionResult {
        match self {
            ConditionResult::True => ConditionResult::False,
            ConditionResult::False => ConditionResult::True,
            ConditionResult::Undefined => ConditionResult::Undefined,
        }
    }
}

impl From<bool> for ConditionResult {
    fn from(b: bool) -> Self {
        if b {
            ConditionResult::True
        } else {
            ConditionResult::False
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubstringAssertion {
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub final_: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Eq(Attribute, Value),
    Sub(Attribute, SubstringAssertion),
    Pres(Attribute),
    Ge(Attribute, Value),
    Le(Attribute, Value),
    Approx(Attribute, Value),
}

pub fn f_eq(attr: Attribute, value: &str) -> Filter {
    let v = Value::new(&attr, value);
    Filter::Eq(attr, v)
}

pub fn f_sub(
    attr: Attribute,
    initial: Option<&str>,
    any: &[&str],
    final_: Option<&str>,
) -> Filter {
    Filter::Sub(
        attr,
        SubstringAssertion {
            initial: initial.map(str::to_string),
            any: any.iter().map(|s| s.to_string()).collect(),
            final_: final_.map(str::to_string),
        },
    )
}

pub fn f_pres(attr: Attribute) -> Filter {
    Filter::Pres(attr)
}

pub fn f_ge(attr: Attribute, value: &str) -> Filter {
    let v = Value::new(&attr, value);
    Filter::Ge(attr, v)
}

pub fn f_le(attr: Attribute, value: &str) -> Filter {
    let v = Value::new(&attr, value);
    Filter::Le(attr, v)
}

pub fn f_approx(attr: Attribute, value: &str) -> Filter {
    let v = Value::new(&attr, value);
    Filter::Approx(attr, v)
}

pub fn f_and(vs: Vec<Filter>) -> Filter {
    Filter::And(vs)
}

pub fn f_or(vs: Vec<Filter>) -> Filter {
    Filter::Or(vs)
}

pub fn f_not(f: Filter) -> Filter {
    Filter::Not(Box::new(f))
}

/// `(&(a)(!(b)))`
pub fn f_andnot(f: Filter, not: Filter) -> Filter {
    Filter::And(vec![f, f_not(not)])
}

impl Filter {
    /// The number of elements in this filter, counting every AND, OR and NOT as well as
    /// each leaf.
    pub fn element_count(&self) -> usize {
        match self {
            Filter::And(l) | Filter::Or(l) => 1 + l.iter().map(Filter::element_count).sum::<usize>(),
            Filter::Not(f) => 1 + f.element_count(),
            _ => 1,
        }
    }

    pub fn attribute(&self) -> Option<&Attribute> {
        match self {
            Filter::Eq(a, _)
            | Filter::Sub(a, _)
            | Filter::Pres(a)
            | Filter::Ge(a, _)
            | Filter::Le(a, _)
            | Filter::Approx(a, _) => Some(a),
            Filter::And(_) | Filter::Or(_) | Filter::Not(_) => None,
        }
    }

    /// True if any leaf of this filter asserts on `attr`.
    pub fn references(&self, attr: &Attribute) -> bool {
        match self {
            Filter::And(l) | Filter::Or(l) => l.iter().any(|f| f.references(attr)),
            Filter::Not(f) => f.references(attr),
            leaf => leaf.attribute() == Some(attr),
        }
    }

    pub fn attributes(&self) -> BTreeSet<Attribute> {
        let mut set = BTreeSet::new();
        self.collect_attributes(&mut set);
        set
    }

    fn collect_attributes(&self, set: &mut BTreeSet<Attribute>) {
        match self {
            Filter::And(l) | Filter::Or(l) => l.iter().for_each(|f| f.collect_attributes(set)),
            Filter::Not(f) => f.collect_attributes(set),
            leaf => {
                if let Some(a) = leaf.attribute() {
                    set.insert(a.clone());
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Filter::And(l) | Filter::Or(l) => 1 + l.iter().map(Filter::depth).max().unwrap_or(0),
            Filter::Not(f) => 1 + f.depth(),
            _ => 1,
        }
    }
}

fn escape_assertion(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '*' => f.write_str("\\2a")?,
            '(' => f.write_str("\\28")?,
            ')' => f.write_str("\\29")?,
            '\\' => f.write_str("\\5c")?,
            '\0' => f.write_str("\\00")?,
            c => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(l) => {
                f.write_str("(&")?;
                l.iter().try_for_each(|i| write!(f, "{}", i))?;
                f.write_str(")")
            }
            Filter::Or(l) => {
                f.write_str("(|")?;
                l.iter().try_for_each(|i| write!(f, "{}", i))?;
                f.write_str(")")
            }
            Filter::Not(i) => write!(f, "(!{})", i),
            Filter::Pres(a) => write!(f, "({}=*)", a),
            Filter::Eq(a, v) => {
                write!(f, "({}=", a)?;
                escape_assertion(f, v.as_str())?;
                f.write_str(")")
            }
            Filter::Ge(a, v) => {
                write!(f, "({}>=", a)?;
                escape_assertion(f, v.as_str())?;
                f.write_str(")")
            }
            Filter::Le(a, v) => {
                write!(f, "({}<=", a)?;
                escape_assertion(f, v.as_str())?;
                f.write_str(")")
            }
            Filter::Approx(a, v) => {
                write!(f, "({}~=", a)?;
                escape_assertion(f, v.as_str())?;
                f.write_str(")")
            }
            Filter::Sub(a, sub) => {
                write!(f, "({}=", a)?;
                if let Some(i) = sub.initial.as_deref() {
                    escape_assertion(f, i)?;
                }
                f.write_str("*")?;
                for any in sub.any.iter() {
                    escape_assertion(f, any)?;
                    f.write_str("*")?;
                }
                if let Some(fin) = sub.final_.as_deref() {
                    escape_assertion(f, fin)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl FromStr for Filter {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            filter_error!("empty filter");
            return Err(OperationError::FilterParseError);
        }
        // A bare item, as commonly accepted by LDAP tools.
        let wrapped;
        let s = if s.starts_with('(') {
            s
        } else {
            wrapped = format!("({})", s);
            wrapped.as_str()
        };
        let ldap_filter = filter::parse_ldap_filter_str(s).map_err(|e| {
            filter_error!(err = %e, "unable to parse filter");
            OperationError::FilterParseError
        })?;
        Filter::try_from(&ldap_filter)
    }
}

impl TryFrom<&LdapFilter> for Filter {
    type Error = OperationError;

    fn try_from(f: &LdapFilter) -> Result<Self, Self::Error> {
        Filter::from_ldap(f, FILTER_DEPTH_MAX)
    }
}

impl Filter {
    fn from_ldap(f: &LdapFilter, depth: usize) -> Result<Self, OperationError> {
        let ndepth = depth.checked_sub(1).ok_or_else(|| {
            filter_error!("filter nesting too deep");
            OperationError::FilterParseError
        })?;
        Ok(match f {
            LdapFilter::And(l) => Filter::And(
                l.iter()
                    .map(|f| Self::from_ldap(f, ndepth))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            LdapFilter::Or(l) => Filter::Or(
                l.iter()
                    .map(|f| Self::from_ldap(f, ndepth))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            LdapFilter::Not(l) => Filter::Not(Box::new(Self::from_ldap(l, ndepth)?)),
            LdapFilter::Equality(a, v) => {
                let a = ldap_attr_filter_map(a)?;
                let v = Value::new(&a, v);
                Filter::Eq(a, v)
            }
            LdapFilter::Present(a) => Filter::Pres(ldap_attr_filter_map(a)?),
            LdapFilter::GreaterOrEqual(a, v) => {
                let a = ldap_attr_filter_map(a)?;
                let v = Value::new(&a, v);
                Filter::Ge(a, v)
            }
            LdapFilter::LessOrEqual(a, v) => {
                let a = ldap_attr_filter_map(a)?;
                let v = Value::new(&a, v);
                Filter::Le(a, v)
            }
            LdapFilter::Approx(a, v) => {
                let a = ldap_attr_filter_map(a)?;
                let v = Value::new(&a, v);
                Filter::Approx(a, v)
            }
            LdapFilter::Substring(
                a,
                LdapSubstringFilter {
                    initial,
                    any,
                    final_,
                },
            ) => {
                let a = ldap_attr_filter_map(a)?;
                let initial = initial.clone().filter(|s| !s.is_empty());
                let any: Vec<String> = any.iter().filter(|s| !s.is_empty()).cloned().collect();
                let final_ = final_.clone().filter(|s| !s.is_empty());
                if initial.is_none() && any.is_empty() && final_.is_none() {
                    Filter::Pres(a)
                } else {
                    Filter::Sub(
                        a,
                        SubstringAssertion {
                            initial,
                            any,
                            final_,
                        },
                    )
                }
            }
            _ => {
                filter_warn!("extensible match filters are not supported");
                return Err(OperationError::FilterParseError);
            }
        })
    }
}

// Attribute options such as ;binary do not change the match.
fn ldap_attr_filter_map(input: &str) -> Result<Attribute, OperationError> {
    let name = input.trim().split(';').next().unwrap_or_default();
    if !Attribute::is_valid_name(name) {
        filter_error!(attr = %input, "invalid attribute description in filter");
        return Err(OperationError::FilterParseError);
    }
    Ok(Attribute::from_str(name))
}
