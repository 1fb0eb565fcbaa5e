//! `embody-kernel` – Arbitration
//!
//! Decides who may drive the embodiment right now.  It does not think and it
//! never blocks; it only keeps score.
//!
//! # Modules
//!
//! - [`activity_lock`] – [`ActivityLock`][activity_lock::ActivityLock]:
//!   an advisory, reference-counted "someone is talking to the agent" flag
//!   with a safety valve that self-clears after a maximum hold time.  The
//!   idle behavior loop checks it and yields; chat and voice turns hold it.

pub mod activity_lock;

pub use activity_lock::{ActivityGuard, ActivityLock, DEFAULT_MAX_LOCK_DURATION};
