//! # tether-core
//!
//! Pure logic for Tether (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for the social
//! sync engine without any network I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce
//! output without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (backend calls, timers) is performed by `tether-engine`,
//! which consults these rules before mutating shared state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conversation;
pub mod engagement;
pub mod generation;
pub mod overlay;
pub mod relationship;

pub use generation::GenerationCounter;
pub use overlay::{Overlay, Settled, Ticket};
pub use relationship::{Applied, EdgeTransition, TransitionError};
