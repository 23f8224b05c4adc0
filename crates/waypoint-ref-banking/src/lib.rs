//! # waypoint-ref-banking
//!
//! Banking reference runtime for the waypoint goal engine.
//!
//! Wires the engine to mock banking tools, a keyword-driven stand-in for the
//! planning LLM, a regex slot extractor and an in-memory session service,
//! and demonstrates six scenarios:
//!
//! 1. **Payment** — every slot supplied, one successful `create_payment`.
//! 2. **Policy denial** — an amount above the 2FA threshold is rejected
//!    before any tool runs.
//! 3. **Missing slot** — the turn suspends and resumes on the next message.
//! 4. **Replan limit** — a tool that keeps failing ends the turn after three
//!    replans.
//! 5. **Digression** — a change of topic discards the payment and replans.
//! 6. **Sessions** — concurrent sessions through the service surface.
//!
//! All data is hardcoded and fictional. No external API calls are made.

pub mod extract;
pub mod generator;
pub mod runtime;
pub mod scenarios;
pub mod service;
pub mod store;
pub mod tools;

pub use runtime::AgentRuntime;
pub use service::{AgentService, Reply, ServiceSettings};
pub use store::{InMemorySessionStore, SessionStore};
