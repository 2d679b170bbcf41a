//! Profile isolation: named configuration-plus-data units.
//!
//! Each profile exclusively owns a directory subtree; at most one profile is
//! active at a time. The [`ProfileManager`] is the only writer of the
//! registry file; mutation is read-modify-write.

pub mod manager;
pub mod registry;
pub mod scope;

pub use manager::{InitOutcome, ProfileManager};
pub use registry::{Profile, ProfilesIndex};
pub use scope::scope_config;
