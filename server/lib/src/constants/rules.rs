use virtdir_proto::attribute::Attribute;
use virtdir_proto::config::{ConflictBehaviour, ProviderKind, VirtualAttributeConfig};

#[derive(Clone, Debug)]
/// Built-in virtual attribute definitions
pub struct BuiltinVirtualAttribute {
    pub name: &'static str,
    pub attribute: Attribute,
    pub provider: ProviderKind,
    pub filters: &'static [&'static str],
    pub conflict_behavior: ConflictBehaviour,
}

impl From<&BuiltinVirtualAttribute> for VirtualAttributeConfig {
    fn from(val: &BuiltinVirtualAttribute) -> Self {
        let mut cfg = VirtualAttributeConfig::new(val.name, val.attribute.as_str(), val.provider);
        cfg.filter = val.filters.iter().map(|f| f.to_string()).collect();
        cfg.conflict_behavior = val.conflict_behavior;
        cfg
    }
}

pub const BUILTIN_VATTR_ENTRYDN: BuiltinVirtualAttribute = BuiltinVirtualAttribute {
    name: "entryDN",
    attribute: Attribute::EntryDn,
    provider: ProviderKind::EntryDn,
    filters: &[],
    conflict_behavior: ConflictBehaviour::VirtualOverridesReal,
};

pub const BUILTIN_VATTR_ENTRYUUID: BuiltinVirtualAttribute = BuiltinVirtualAttribute {
    name: "entryUUID",
    attribute: Attribute::EntryUuid,
    provider: ProviderKind::EntryUuid,
    filters: &[],
    conflict_behavior: ConflictBehaviour::RealOverridesVirtual,
};

pub const BUILTIN_VATTR_ISMEMBEROF: BuiltinVirtualAttribute = BuiltinVirtualAttribute {
    name: "isMemberOf",
    attribute: Attribute::IsMemberOf,
    provider: ProviderKind::IsMemberOf,
    filters: &[],
    conflict_behavior: ConflictBehaviour::VirtualOverridesReal,
};

pub const BUILTIN_VATTR_SUBSCHEMASUBENTRY: BuiltinVirtualAttribute = BuiltinVirtualAttribute {
    name: "subschemaSubentry",
    attribute: Attribute::SubschemaSubentry,
    provider: ProviderKind::SubschemaSubentry,
    filters: &[],
    conflict_behavior: ConflictBehaviour::VirtualOverridesReal,
};

pub const BUILTIN_VATTR_VIRTUAL_STATIC_MEMBER: BuiltinVirtualAttribute = BuiltinVirtualAttribute {
    name: "Virtual Static member",
    attribute: Attribute::Member,
    provider: ProviderKind::Member,
    filters: &["(&(objectClass=groupOfNames)(objectClass=ds-virtual-static-group))"],
    conflict_behavior: ConflictBehaviour::VirtualOverridesReal,
};

pub const BUILTIN_VATTR_VIRTUAL_STATIC_UNIQUEMEMBER: BuiltinVirtualAttribute =
    BuiltinVirtualAttribute {
        name: "Virtual Static uniqueMember",
        attribute: Attribute::UniqueMember,
        provider: ProviderKind::Member,
        filters: &["(&(objectClass=groupOfUniqueNames)(objectClass=ds-virtual-static-group))"],
        conflict_behavior: ConflictBehaviour::VirtualOverridesReal,
    };

/// The rules every server starts with unless the configuration opts out.
pub const BUILTIN_VIRTUAL_ATTRIBUTES: [BuiltinVirtualAttribute; 6] = [
    BUILTIN_VATTR_ENTRYDN,
    BUILTIN_VATTR_ENTRYUUID,
    BUILTIN_VATTR_ISMEMBEROF,
    BUILTIN_VATTR_SUBSCHEMASUBENTRY,
    BUILTIN_VATTR_VIRTUAL_STATIC_MEMBER,
    BUILTIN_VATTR_VIRTUAL_STATIC_UNIQUEMEMBER,
];
