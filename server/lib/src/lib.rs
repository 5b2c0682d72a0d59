//! The virtdir server library. This implements the virtual attribute and virtual group
//! engine of the directory: rule applicability, the merge of real and computed values,
//! filter searchability analysis, group membership evaluation and search execution.

#![recursion_limit = "512"]
#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

#[macro_use]
extern crate tracing;
#[macro_use]
extern crate lazy_static;

pub mod be;
pub mod config;
pub mod constants;
pub mod dn;
pub mod entry;
pub mod filter;
pub mod group;
pub mod modify;
pub mod server;
#[cfg(test)]
pub mod testkit;
pub mod value;
pub mod vattr;

/// A prelude of imports that should be imported by all other virtdir modules to
/// help make imports cleaner.
pub mod prelude {
    pub use sketching::{
        admin_debug, admin_error, admin_info, admin_warn, filter_error, filter_info, filter_trace,
        filter_warn, group_error, group_trace, group_warn, perf_trace, request_error,
        request_info, request_trace, request_warn, tagged_event, vattr_error, vattr_trace,
        vattr_warn, EventTag,
    };
    pub use std::time::Duration;
    pub use virtdir_proto::attribute::{AttrString, Attribute, EntryClass};
    pub use virtdir_proto::config::{ConflictBehaviour, ProviderKind, VirtualAttributeConfig};
    pub use virtdir_proto::constants::*;
    pub use virtdir_proto::internal::OperationError;

    pub use crate::be::{Limits, SearchScope};
    pub use crate::constants::*;
    pub use crate::dn::Dn;
    pub use crate::entry::{Entry, ValueGroup, ValueOrigin};
    pub use crate::filter::{
        f_and, f_andnot, f_approx, f_eq, f_ge, f_le, f_not, f_or, f_pres, f_sub, ConditionResult,
        Filter, SubstringAssertion,
    };
    pub use crate::group::{Group, GroupInstance, Member, MemberList};
    pub use crate::modify::{m_pres, m_purge, m_remove, Modify, ModifyList};
    pub use crate::server::search::{
        AttributeSelection, CancellationToken, SearchOperation, VirtualAttributeDirectives,
    };
    pub use crate::server::{
        DirectoryServer, DirectoryServerReadTransaction, DirectoryServerWriteTransaction,
        DirectoryTransaction,
    };
    pub use crate::value::{SyntaxType, Value, ValueSet};
    pub use crate::vattr::rule::VirtualAttributeRule;
    pub use crate::vattr::{Provider, VirtualAttributeProvider};

    #[cfg(test)]
    pub use virtdird_lib_macros::*;
}
