//! Send Gerrit review verdicts over SSH.
//!
//! A [`gerrit::ReviewBatch`] is dispatched target by target, reusing one SSH
//! session while consecutive targets share a host.

pub mod config;
pub mod gerrit;
pub mod init;
