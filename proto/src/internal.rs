//! Internal elements shared between the server library and its tooling.
//!
//! Items defined in this module *may* change between releases without notice.

mod error;

pub use self::error::*;
