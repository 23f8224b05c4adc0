//! # waypoint-core
//!
//! The goal-execution state machine.
//!
//! This crate provides:
//! - The collaborator traits (`TextGenerator`, `Tool`, `PolicyEngine`,
//!   `TraceWriter`, `ResultVerifier`, `InputSource`, `DigressionClassifier`)
//! - The pipeline components: plan parser, planner, replanner, slot filler,
//!   digression detector, tool dispatcher and monitor
//! - The `Engine` that drives one turn through the transition table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waypoint_core::{Engine, dispatch::{Dispatcher, ToolRegistry}};
//!
//! let engine = Engine::new(generator, Dispatcher::new(registry), policy, trace, settings);
//! let report = engine.start_turn(&mut state, Some(message), &input)?;
//! ```

pub mod config;
pub mod digression;
pub mod dispatch;
pub mod engine;
pub mod machine;
pub mod monitor;
pub mod parser;
pub mod planner;
pub mod replanner;
pub mod slots;
pub mod traits;

pub use engine::{CancelToken, Engine, TurnOutcome, TurnReport};
pub use machine::Phase;
