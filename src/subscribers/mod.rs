//! # Event subscribers.
//!
//! The [`Subscribe`] trait is the notifier interface handed to a fleet; the
//! [`SubscriberSet`] fans every bus event out to all of them.
//!
//! ```text
//! RecoverySupervisor / QueueRegistry ── publish(Event) ──► Bus
//!                                                          │
//!                                      Fleet::subscriber_listener
//!                                                          │
//!                                                    SubscriberSet
//!                                           ┌──────────────┼──────────────┐
//!                                           ▼              ▼              ▼
//!                                       LogWriter     chat bridge     metrics
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
