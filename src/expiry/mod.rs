//! Subject expiry lifecycle.
//!
//! - [`backoff`] - Randomized announcement retry backoff
//! - [`timers`] - Named single-shot timers
//! - [`controller`] - The per-subject lifecycle state machine
//! - [`supervisor`] - One controller per expiring subject

pub mod backoff;
pub mod controller;
pub mod supervisor;
pub mod timers;
