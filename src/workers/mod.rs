//! # Worker bodies and their handles.
//!
//! - [`Worker`] trait for async cancelable worker bodies (+ [`WorkerFn`])
//! - [`WorkerContext`] per-run context: cancellation, pause, liveness signals
//! - [`WorkerHandle`] start/stop/pause/resume and observation of one worker
//! - [`QueueWorker`] body that serves a routine queue through an [`Execute`]

mod context;
mod handle;
mod queue_worker;
mod worker;

pub use context::WorkerContext;
pub use handle::WorkerHandle;
pub use queue_worker::{Execute, Outcome, QueueWorker};
pub use worker::{BoxWorkerFuture, Worker, WorkerFn, WorkerRef};
