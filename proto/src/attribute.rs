use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::*;

pub use smartstring::alias::String as AttrString;

/// An attribute type name. Names are case insensitive, so every conversion from a string
/// lowercases before matching. Types without a dedicated variant are carried as `Custom`.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[serde(from = "String", into = "AttrString")]
pub enum Attribute {
    Cn,
    Dc,
    Description,
    EntryDn,
    EntryUuid,
    GidNumber,
    GivenName,
    IsMemberOf,
    Mail,
    Manager,
    Member,
    MemberUrl,
    O,
    ObjectClass,
    Ou,
    Owner,
    SeeAlso,
    Sn,
    SubschemaSubentry,
    TargetGroupDn,
    Uid,
    UidNumber,
    UniqueMember,
    UserPassword,
    Custom(AttrString),
}

impl AsRef<str> for Attribute {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Self::from_str(value)
    }
}

impl From<String> for Attribute {
    fn from(value: String) -> Self {
        Self::from_str(value.as_str())
    }
}

impl From<&AttrString> for Attribute {
    fn from(value: &AttrString) -> Self {
        Self::from_str(value.as_str())
    }
}

impl<'a> From<&'a Attribute> for &'a str {
    fn from(val: &'a Attribute) -> Self {
        val.as_str()
    }
}

impl From<Attribute> for AttrString {
    fn from(val: Attribute) -> Self {
        AttrString::from(val.as_str())
    }
}

impl Attribute {
    pub fn as_str(&self) -> &str {
        match self {
            Attribute::Cn => ATTR_CN,
            Attribute::Dc => ATTR_DC,
            Attribute::Description => ATTR_DESCRIPTION,
            Attribute::EntryDn => ATTR_ENTRYDN,
            Attribute::EntryUuid => ATTR_ENTRYUUID,
            Attribute::GidNumber => ATTR_GIDNUMBER,
            Attribute::GivenName => ATTR_GIVENNAME,
            Attribute::IsMemberOf => ATTR_ISMEMBEROF,
            Attribute::Mail => ATTR_MAIL,
            Attribute::Manager => ATTR_MANAGER,
            Attribute::Member => ATTR_MEMBER,
            Attribute::MemberUrl => ATTR_MEMBERURL,
            Attribute::O => ATTR_O,
            Attribute::ObjectClass => ATTR_OBJECTCLASS,
            Attribute::Ou => ATTR_OU,
            Attribute::Owner => ATTR_OWNER,
            Attribute::SeeAlso => ATTR_SEEALSO,
            Attribute::Sn => ATTR_SN,
            Attribute::SubschemaSubentry => ATTR_SUBSCHEMASUBENTRY,
            Attribute::TargetGroupDn => ATTR_TARGET_GROUP_DN,
            Attribute::Uid => ATTR_UID,
            Attribute::UidNumber => ATTR_UIDNUMBER,
            Attribute::UniqueMember => ATTR_UNIQUEMEMBER,
            Attribute::UserPassword => ATTR_USERPASSWORD,
            Attribute::Custom(value) => value.as_str(),
        }
    }

    // We allow this because the standard lib from_str is fallible, and we want an infallible version.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(value: &str) -> Self {
        let lower = value.trim().to_lowercase();
        match lower.as_str() {
            ATTR_CN => Attribute::Cn,
            ATTR_DC => Attribute::Dc,
            ATTR_DESCRIPTION => Attribute::Description,
            ATTR_ENTRYDN => Attribute::EntryDn,
            ATTR_ENTRYUUID => Attribute::EntryUuid,
            ATTR_GIDNUMBER => Attribute::GidNumber,
            ATTR_GIVENNAME => Attribute::GivenName,
            ATTR_ISMEMBEROF => Attribute::IsMemberOf,
            ATTR_MAIL => Attribute::Mail,
            ATTR_MANAGER => Attribute::Manager,
            ATTR_MEMBER => Attribute::Member,
            ATTR_MEMBERURL => Attribute::MemberUrl,
            ATTR_O => Attribute::O,
            ATTR_OBJECTCLASS => Attribute::ObjectClass,
            ATTR_OU => Attribute::Ou,
            ATTR_OWNER => Attribute::Owner,
            ATTR_SEEALSO => Attribute::SeeAlso,
            ATTR_SN => Attribute::Sn,
            ATTR_SUBSCHEMASUBENTRY => Attribute::SubschemaSubentry,
            ATTR_TARGET_GROUP_DN => Attribute::TargetGroupDn,
            ATTR_UID => Attribute::Uid,
            ATTR_UIDNUMBER => Attribute::UidNumber,
            ATTR_UNIQUEMEMBER => Attribute::UniqueMember,
            ATTR_USERPASSWORD => Attribute::UserPassword,
            _ => Attribute::Custom(AttrString::from(lower)),
        }
    }

    /// Operational attributes are only returned when requested by name or through `+`.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Attribute::EntryDn
                | Attribute::EntryUuid
                | Attribute::IsMemberOf
                | Attribute::SubschemaSubentry
        )
    }

    /// A valid attribute description is a keystring (`ALPHA *(ALPHA / DIGIT / "-")`) or a
    /// numeric oid.
    pub fn is_valid_name(value: &str) -> bool {
        let mut chars = value.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';')
            }
            Some(c) if c.is_ascii_digit() => {
                !value.ends_with('.')
                    && !value.contains("..")
                    && value.chars().all(|c| c.is_ascii_digit() || c == '.')
            }
            _ => false,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Object classes the engine needs to recognise. Values are compared case insensitively.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryClass {
    Top,
    Person,
    OrganizationalPerson,
    InetOrgPerson,
    Organization,
    OrganizationalUnit,
    GroupOfNames,
    GroupOfUniqueNames,
    GroupOfEntries,
    GroupOfUrls,
    VirtualStaticGroup,
}

impl From<EntryClass> for &'static str {
    fn from(val: EntryClass) -> Self {
        match val {
            EntryClass::Top => CLASS_TOP,
            EntryClass::Person => CLASS_PERSON,
            EntryClass::OrganizationalPerson => CLASS_ORGANIZATIONAL_PERSON,
            EntryClass::InetOrgPerson => CLASS_INET_ORG_PERSON,
            EntryClass::Organization => CLASS_ORGANIZATION,
            EntryClass::OrganizationalUnit => CLASS_ORGANIZATIONAL_UNIT,
            EntryClass::GroupOfNames => CLASS_GROUP_OF_NAMES,
            EntryClass::GroupOfUniqueNames => CLASS_GROUP_OF_UNIQUE_NAMES,
            EntryClass::GroupOfEntries => CLASS_GROUP_OF_ENTRIES,
            EntryClass::GroupOfUrls => CLASS_GROUP_OF_URLS,
            EntryClass::VirtualStaticGroup => CLASS_VIRTUAL_STATIC_GROUP,
        }
    }
}

impl EntryClass {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for EntryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
