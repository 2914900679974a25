//! Runtime core: composition root and lifecycle.
//!
//! The public API from this module is [`Fleet`] (built by [`FleetBuilder`]),
//! its configuration ([`FleetConfig`], [`QueueSettings`]) and the
//! [`Legality`] collaborator.
//!
//! Internal modules:
//! - [`fleet`]: owns the bus, the roster, the supervisor and the queues; drives shutdown;
//! - [`builder`]: validates the configuration and spawns background tasks;
//! - [`registry`]: name → (worker handle, recovery record) roster.

mod builder;
mod config;
mod fleet;
mod legality;
mod registry;

pub use builder::FleetBuilder;
pub use config::{FleetConfig, QueueSettings};
pub use fleet::{Fleet, Receipt, Submission};
pub use legality::Legality;
pub(crate) use registry::{Member, WorkerRegistry};
