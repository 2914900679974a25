//! # Worker abstraction and function-backed worker implementation.
//!
//! A [`Worker`] is the opaque body of one fleet member (typically: drive one
//! remote trading session and pull records from its routine queue). The fleet
//! only starts, stops, pauses and observes it through a
//! [`WorkerHandle`](crate::WorkerHandle).
//!
//! [`WorkerFn`] wraps a closure `F: Fn(WorkerContext) -> Fut`, producing a
//! fresh future per start. No state survives between restarts unless the
//! closure captures an `Arc<...>` explicitly.
//!
//! ## Example
//! ```rust
//! use fleetvisor::{WorkerContext, WorkerError, WorkerFn, WorkerRef};
//!
//! let w: WorkerRef = WorkerFn::arc("bot-1", |ctx: WorkerContext| async move {
//!     while ctx.resume_point().await {
//!         ctx.touch();
//!         // drive the session...
//!         break;
//!     }
//!     Ok::<_, WorkerError>(())
//! });
//! assert_eq!(w.name(), "bot-1");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::WorkerError;
use crate::workers::WorkerContext;

/// Boxed future returned by [`Worker::spawn`].
pub type BoxWorkerFuture = Pin<Box<dyn Future<Output = Result<(), WorkerError>> + Send + 'static>>;

/// Shared handle to a worker body.
pub type WorkerRef = Arc<dyn Worker>;

/// Asynchronous, cancelable worker body.
pub trait Worker: Send + Sync + 'static {
    /// Stable, unique name within a fleet.
    fn name(&self) -> &str;

    /// Creates the future of one run.
    ///
    /// The future should return once `ctx` is cancelled. Any other return
    /// (including `Ok(())`) while the worker is not being stopped counts as a
    /// crash for the recovery supervisor.
    fn spawn(&self, ctx: WorkerContext) -> BoxWorkerFuture;
}

/// Function-backed worker.
#[derive(Debug)]
pub struct WorkerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> WorkerFn<F> {
    /// Creates a new function-backed worker.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the worker as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Worker for WorkerFn<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: WorkerContext) -> BoxWorkerFuture {
        Box::pin((self.f)(ctx))
    }
}
