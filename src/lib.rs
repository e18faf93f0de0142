//! Kairos workspace root
//!
//! This crate serves as the root of the kairos workspace and hosts
//! integration tests that exercise the sender across crate boundaries.

// Re-export the member crates for integration testing
pub use kairos_proto as proto;
pub use kairos_sync as sync;
