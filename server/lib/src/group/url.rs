//! LDAP URLs as held in the memberURL attribute of a dynamic group.
//!
//! `ldap://[host[:port]]/<dn>[?<attrs>[?<scope>[?<filter>]]]`. The host, port and
//! attribute list play no part in membership and are ignored.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapUrl {
    pub base: Dn,
    pub scope: SearchScope,
    pub filter: Filter,
}

fn decode(part: &str) -> Result<String, OperationError> {
    urlencoding::decode(part)
        .map(|s| s.into_owned())
        .map_err(|_| OperationError::InvalidLdapUrl)
}

impl LdapUrl {
    /// Does `entry` fall within the base and scope of this URL and match its filter?
    pub fn matches(&self, entry: &Entry) -> bool {
        entry.dn().is_within_scope(&self.base, self.scope)
            && entry.entry_match_real(&self.filter).is_true()
    }
}

impl FromStr for LdapUrl {
    type Err = OperationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(value.trim()).map_err(|e| {
            group_warn!(?e, url = %value, "unable to parse ldap url");
            OperationError::InvalidLdapUrl
        })?;

        if !matches!(url.scheme(), "ldap" | "ldaps" | "ldapi") {
            group_warn!(scheme = %url.scheme(), "not an ldap url");
            return Err(OperationError::InvalidLdapUrl);
        }

        let path = url.path();
        let dn_str = decode(path.strip_prefix('/').unwrap_or(path))?;
        let base = Dn::from_str(&dn_str).map_err(|_| {
            group_warn!(dn = %dn_str, "invalid base dn in ldap url");
            OperationError::InvalidLdapUrl
        })?;

        // The query holds attrs ? scope ? filter ? extensions
        let mut parts = url.query().unwrap_or_default().split('?').skip(1);

        let scope = match parts.next().map(decode).transpose()? {
            None => SearchScope::Base,
            Some(s) if s.is_empty() => SearchScope::Base,
            Some(s) => match s.to_lowercase().as_str() {
                "base" => SearchScope::Base,
                "one" => SearchScope::OneLevel,
                "sub" => SearchScope::Subtree,
                "subordinate" | "subordinates" => SearchScope::Subordinate,
                _ => {
                    group_warn!(scope = %s, "invalid scope in ldap url");
                    return Err(OperationError::InvalidLdapUrl);
                }
            },
        };

        let filter = match parts.next().map(decode).transpose()? {
            Some(f) if !f.is_empty() => Filter::from_str(&f).map_err(|_| {
                group_warn!(filter = %f, "invalid filter in ldap url");
                OperationError::InvalidLdapUrl
            })?,
            _ => f_pres(Attribute::ObjectClass),
        };

        Ok(LdapUrl {
            base,
            scope,
            filter,
        })
    }
}

impl fmt::Display for LdapUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            SearchScope::Base => "base",
            SearchScope::OneLevel => "one",
            SearchScope::Subtree => "sub",
            SearchScope::Subordinate => "subordinate",
        };
        write!(f, "ldap:///{}??{}?{}", self.base, scope, self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldap_url_parse() {
        let u = LdapUrl::from_str("ldap:///ou=People,o=test??sub?(givenName=test)")
            .expect("valid url");
        assert_eq!(u.base, Dn::from_str("ou=people,o=test").expect("dn"));
        assert_eq!(u.scope, SearchScope::Subtree);
        assert_eq!(u.filter, f_eq(Attribute::GivenName, "test"));

        let u = LdapUrl::from_str("ldap://localhost:389/o=test??one").expect("valid url");
        assert_eq!(u.scope, SearchScope::OneLevel);
        assert_eq!(u.filter, f_pres(Attribute::ObjectClass));

        // Defaults follow RFC 4516
        let u = LdapUrl::from_str("ldap:///o=test").expect("valid url");
        assert_eq!(u.scope, SearchScope::Base);

        let u = LdapUrl::from_str("ldap:///ou=Test%20Unit,o=test??sub?(cn=a%20b)")
            .expect("valid url");
        assert_eq!(u.base.normalized(), "ou=test unit,o=test");
        assert_eq!(u.filter, f_eq(Attribute::Cn, "a b"));
    }

    #[test]
    fn test_ldap_url_invalid() {
        for bad in [
            "not a url",
            "http:///o=test??sub?(uid=*)",
            "ldap:///invalid??sub",
            "ldap:///o=test??deep",
            "ldap:///o=test??sub?(uid=",
        ] {
            assert_eq!(
                LdapUrl::from_str(bad).map(|_| ()),
                Err(OperationError::InvalidLdapUrl),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_ldap_url_matches() {
        let u = LdapUrl::from_str("ldap:///ou=People,o=test??sub?(givenName=test)")
            .expect("valid url");
        let e = Entry::unsafe_from_entry_str(
            r#"{"dn": "uid=a,ou=People,o=test", "attrs": {"givenName": ["Test"]}}"#,
        );
        assert!(u.matches(&e));
        let outside = Entry::unsafe_from_entry_str(
            r#"{"dn": "uid=a,ou=Other,o=test", "attrs": {"givenName": ["Test"]}}"#,
        );
        assert!(!u.matches(&outside));
    }
}
