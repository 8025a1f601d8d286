// src/exec/mod.rs

//! Background execution helpers.
//!
//! - [`detached`] provides `DetachedRunner`, the explicit "submit without
//!   awaiting" primitive used for post-fetch persistence.

pub mod detached;

pub use detached::{DetachedRunner, FailureHook};
