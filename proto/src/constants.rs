//! Because consistency is great!
//!
//! Attribute and object class names are stored lowercase; every lookup lowercases first.

pub const ATTR_CN: &str = "cn";
pub const ATTR_DC: &str = "dc";
pub const ATTR_DESCRIPTION: &str = "description";
pub const ATTR_ENTRYDN: &str = "entrydn";
pub const ATTR_ENTRYUUID: &str = "entryuuid";
pub const ATTR_GIDNUMBER: &str = "gidnumber";
pub const ATTR_GIVENNAME: &str = "givenname";
pub const ATTR_ISMEMBEROF: &str = "ismemberof";
pub const ATTR_MAIL: &str = "mail";
pub const ATTR_MANAGER: &str = "manager";
pub const ATTR_MEMBER: &str = "member";
pub const ATTR_MEMBERURL: &str = "memberurl";
pub const ATTR_O: &str = "o";
pub const ATTR_OBJECTCLASS: &str = "objectclass";
pub const ATTR_OU: &str = "ou";
pub const ATTR_OWNER: &str = "owner";
pub const ATTR_SEEALSO: &str = "seealso";
pub const ATTR_SN: &str = "sn";
pub const ATTR_SUBSCHEMASUBENTRY: &str = "subschemasubentry";
pub const ATTR_TARGET_GROUP_DN: &str = "ds-target-group-dn";
pub const ATTR_UID: &str = "uid";
pub const ATTR_UIDNUMBER: &str = "uidnumber";
pub const ATTR_UNIQUEMEMBER: &str = "uniquemember";
pub const ATTR_USERPASSWORD: &str = "userpassword";

pub const CLASS_TOP: &str = "top";
pub const CLASS_PERSON: &str = "person";
pub const CLASS_ORGANIZATIONAL_PERSON: &str = "organizationalperson";
pub const CLASS_INET_ORG_PERSON: &str = "inetorgperson";
pub const CLASS_ORGANIZATION: &str = "organization";
pub const CLASS_ORGANIZATIONAL_UNIT: &str = "organizationalunit";
pub const CLASS_GROUP_OF_NAMES: &str = "groupofnames";
pub const CLASS_GROUP_OF_UNIQUE_NAMES: &str = "groupofuniquenames";
pub const CLASS_GROUP_OF_ENTRIES: &str = "groupofentries";
pub const CLASS_GROUP_OF_URLS: &str = "groupofurls";
pub const CLASS_VIRTUAL_STATIC_GROUP: &str = "ds-virtual-static-group";

/// The DN published through subschemaSubentry.
pub const SCHEMA_DN: &str = "cn=schema";

/// Requested attribute tokens. See RFC 4511 section 4.5.1.8.
pub const LDAP_ALL_USER_ATTRIBUTES: &str = "*";
pub const LDAP_ALL_OPERATIONAL_ATTRIBUTES: &str = "+";
pub const LDAP_NO_ATTRIBUTES: &str = "1.1";
