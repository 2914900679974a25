//! # Pre-enqueue validators.
//!
//! Domain checks ("item not allowed", "banned submitter", ...) that run inside
//! the registry's admission critical section, for **every** record of a
//! submission (all items of a batch, not only the first).
//!
//! Closures work out of the box:
//! ```rust
//! use fleetvisor::{Validate, WorkRecord};
//!
//! let no_empty = |r: &WorkRecord<String>| {
//!     if r.payload.is_empty() { Err("empty request".to_string()) } else { Ok(()) }
//! };
//! let record = WorkRecord::new(1, 7, fleetvisor::Routine::LinkTrade, String::new());
//! assert!(no_empty.validate(&record).is_err());
//! ```

use crate::queue::WorkRecord;

/// Rejects records before they are enqueued.
pub trait Validate<P>: Send + Sync + 'static {
    /// `Err(reason)` rejects the whole submission.
    fn validate(&self, record: &WorkRecord<P>) -> Result<(), String>;
}

impl<P, F> Validate<P> for F
where
    F: Fn(&WorkRecord<P>) -> Result<(), String> + Send + Sync + 'static,
{
    fn validate(&self, record: &WorkRecord<P>) -> Result<(), String> {
        self(record)
    }
}
