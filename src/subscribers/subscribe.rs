//! # Core subscriber trait
//!
//! `Subscribe` is the notifier interface of a [`Fleet`](crate::Fleet): chat
//! bridges, log sinks and metrics exporters implement it and are handed to the
//! [`FleetBuilder`](crate::FleetBuilder). Each subscriber is driven by a
//! dedicated worker loop fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, chat API calls); they do **not** block
//!   the publisher nor other subscribers.
//! - Each subscriber declares its preferred queue capacity via
//!   [`Subscribe::queue_capacity`]. On overflow, events for that subscriber are
//!   dropped and the drop is logged.
//!
//! ## Example
//! ```rust
//! use fleetvisor::{Event, EventKind, Subscribe};
//!
//! struct CrashAlerts;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for CrashAlerts {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RecoveryExhausted {
//!             // page the operator...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "crash-alerts" }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
