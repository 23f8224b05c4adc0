//! # waypoint-contracts
//!
//! Shared types, configuration schema, and error contracts for the waypoint
//! goal runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions and error types.

pub mod error;
pub mod goal;
pub mod plan;
pub mod policy;
pub mod session;
pub mod state;
pub mod trace;
pub mod verify;
