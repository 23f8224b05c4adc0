//! # waypoint-policy
//!
//! The policy set and policy executor for the waypoint runtime.
//!
//! ## Overview
//!
//! This crate provides [`TomlPolicyEngine`], which implements the
//! [`PolicyEngine`](waypoint_core::traits::PolicyEngine) trait. Rules are
//! declared in TOML and evaluated in order against every proposed tool call
//! before it is dispatched. The first violated rule denies the call.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use waypoint_policy::TomlPolicyEngine;
//!
//! let policy = TomlPolicyEngine::from_toml_str(r#"
//!     [[rules]]
//!     id = "2fa-threshold"
//!     applies_to = "make_payment"
//!     max_without_2fa = 100
//! "#)?;
//! ```

pub mod engine;
pub mod rule;

pub use engine::TomlPolicyEngine;
pub use rule::{PolicyConfig, PolicyRule};

// ── Tests ─────────────────────────────────────────────────────────────────────
