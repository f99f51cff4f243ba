//! Command-line client for the Inclusa community platform.
//!
//! Wires the platform API to the synchronization layer: every read goes
//! through a shared query cache keyed per resource, every write declares the
//! cached entries it invalidates, and likes and title changes are shown
//! optimistically before the backend confirms them.

pub mod keys;
pub mod store;
pub mod toggles;

pub use store::{Store, UserLocations};
