//! API version registration and extraction.

mod manager;

pub use manager::{VersionManager, VersionSnapshot, VersionStrategy};
