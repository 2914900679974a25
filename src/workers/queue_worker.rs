//! # Queue-driven worker body.
//!
//! [`QueueWorker`] is the usual body of a fleet member: it pulls records of one
//! [`Routine`] from the [`QueueRegistry`] (idle backoff while empty, parked
//! while paused) and hands each one to an [`Execute`] implementation, the
//! remote-session automation.
//!
//! ```text
//! loop {
//!   registry.next(routine, ctx) ──► None (cancelled) → Ok(())
//!        │
//!        ▼ Claim
//!   executor.execute(record, ctx)
//!        ├─ Completed(out) → claim.complete(out)
//!        ├─ Canceled       → claim.cancel()     (rest of the batch aborted)
//!        ├─ RetryLater     → claim.requeue()
//!        └─ Failed(err)    → claim.requeue(), body returns Err(err) (crash)
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::queue::{BatchProgress, QueueRegistry, Routine, WorkRecord};
use crate::workers::{BoxWorkerFuture, Worker, WorkerContext};

/// Result of executing one record.
#[derive(Debug)]
pub enum Outcome<P> {
    /// Done; the output is folded into the batch (if any).
    Completed(P),
    /// Abandoned (e.g. the trade partner left).
    Canceled,
    /// Not done; put a retry copy back in line.
    RetryLater,
    /// The session broke; the record is requeued and the worker crashes.
    Failed(WorkerError),
}

/// Executes claimed records against a remote session.
#[async_trait]
pub trait Execute<P>: Send + Sync + 'static {
    /// Handles one record.
    async fn execute(&self, record: &WorkRecord<P>, ctx: &WorkerContext) -> Outcome<P>;
}

/// Worker body that serves one routine queue.
pub struct QueueWorker<P: Send + Sync + 'static, E> {
    name: String,
    routine: Routine,
    registry: Arc<QueueRegistry<P>>,
    executor: Arc<E>,
}

impl<P, E> QueueWorker<P, E>
where
    P: Clone + Send + Sync + 'static,
    E: Execute<P>,
{
    /// Creates the body.
    pub fn new(
        name: impl Into<String>,
        routine: Routine,
        registry: Arc<QueueRegistry<P>>,
        executor: Arc<E>,
    ) -> Self {
        Self {
            name: name.into(),
            routine,
            registry,
            executor,
        }
    }

    /// Creates the body as a shared handle.
    pub fn arc(
        name: impl Into<String>,
        routine: Routine,
        registry: Arc<QueueRegistry<P>>,
        executor: Arc<E>,
    ) -> Arc<Self> {
        Arc::new(Self::new(name, routine, registry, executor))
    }

    /// The routine this worker serves.
    pub fn routine(&self) -> Routine {
        self.routine
    }
}

impl<P, E> Worker for QueueWorker<P, E>
where
    P: Clone + Send + Sync + 'static,
    E: Execute<P>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: WorkerContext) -> BoxWorkerFuture {
        let registry = Arc::clone(&self.registry);
        let executor = Arc::clone(&self.executor);
        let routine = self.routine;

        Box::pin(async move {
            while let Some(claim) = registry.next(routine, &ctx).await {
                let outcome = executor.execute(claim.record(), &ctx).await;
                ctx.touch();
                match outcome {
                    Outcome::Completed(output) => {
                        let id = claim.record().id;
                        if let BatchProgress::Complete(batch) = claim.complete(output) {
                            tracing::debug!(
                                worker = ctx.name(),
                                work_id = id,
                                group = batch.group_id,
                                "batch completed"
                            );
                        }
                    }
                    Outcome::Canceled => claim.cancel(),
                    Outcome::RetryLater => {
                        claim.requeue();
                    }
                    Outcome::Failed(err) => {
                        claim.requeue();
                        return Err(err);
                    }
                }
            }
            Ok(())
        })
    }
}
