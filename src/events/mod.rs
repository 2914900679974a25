//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the fleet, the recovery supervisor,
//! worker handles, the queue registry and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Fleet`, `RecoverySupervisor`, `WorkerHandle`,
//!   `QueueRegistry`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Fleet::subscriber_listener()` which fans out to the
//!   [`SubscriberSet`](crate::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
