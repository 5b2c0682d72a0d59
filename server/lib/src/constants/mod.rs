// Re-export as needed

pub mod rules;

pub use crate::constants::rules::*;

/// Maximum nesting depth of a filter. Deeper filters are refused while parsing.
pub const FILTER_DEPTH_MAX: usize = 16;

/// Default maximum number of elements in a search filter.
pub const DEFAULT_LIMIT_FILTER_MAX_ELEMENTS: usize = 32;

/// How many virtual static groups may be chained before resolution gives up.
pub const VIRTUAL_STATIC_CHAIN_MAX: usize = 16;

/// The name based uuid of an entry is derived from its normalised DN inside this namespace.
pub const ENTRYUUID_NAMESPACE: uuid::Uuid = uuid::Uuid::NAMESPACE_X500;
