//! Public extension contracts.
//!
//! Hosts plug in their own notification plumbing here instead of the session reaching into
//! application globals.

pub mod events;

pub use events::*;
