//! # Worker roster.
//!
//! The roster owns every registered [`WorkerHandle`] together with its
//! [`RecoveryRecord`]. The fleet writes it (register), the recovery supervisor
//! reads it on every tick.
//!
//! ## Rules
//! - Names are unique; registering twice fails with `DuplicateWorker`.
//! - Readers take a cloned snapshot and release the lock before doing any
//!   slow work (starting, sleeping, awaiting a stop).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::FleetError;
use crate::recovery::RecoveryRecord;
use crate::workers::WorkerHandle;

/// One registered worker.
#[derive(Clone, Debug)]
pub(crate) struct Member {
    pub(crate) handle: Arc<WorkerHandle>,
    pub(crate) record: Arc<RecoveryRecord>,
}

/// Name-indexed roster of workers.
#[derive(Debug, Default)]
pub(crate) struct WorkerRegistry {
    members: RwLock<BTreeMap<String, Member>>,
}

impl WorkerRegistry {
    /// Adds a worker with a fresh recovery record.
    pub(crate) async fn insert(&self, handle: Arc<WorkerHandle>) -> Result<Member, FleetError> {
        let name = handle.name().to_string();
        let mut members = self.members.write().await;
        if members.contains_key(&name) {
            return Err(FleetError::DuplicateWorker(name));
        }
        let member = Member {
            handle,
            record: Arc::new(RecoveryRecord::default()),
        };
        members.insert(name, member.clone());
        Ok(member)
    }

    /// Looks a worker up by name.
    pub(crate) async fn get(&self, name: &str) -> Option<Member> {
        self.members.read().await.get(name).cloned()
    }

    /// Looks a worker up or fails with `UnknownWorker`.
    pub(crate) async fn require(&self, name: &str) -> Result<Member, FleetError> {
        self.get(name)
            .await
            .ok_or_else(|| FleetError::UnknownWorker(name.to_string()))
    }

    /// All workers, sorted by name.
    pub(crate) async fn snapshot(&self) -> Vec<Member> {
        self.members.read().await.values().cloned().collect()
    }

    /// Sorted worker names.
    pub(crate) async fn list(&self) -> Vec<String> {
        self.members.read().await.keys().cloned().collect()
    }

    /// True if no worker is registered.
    pub(crate) async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use crate::error::WorkerError;
    use crate::events::Bus;
    use crate::workers::{WorkerContext, WorkerFn};

    fn handle(name: &'static str) -> Arc<WorkerHandle> {
        let w = WorkerFn::arc(name, |_ctx: WorkerContext| async { Ok::<_, WorkerError>(()) });
        Arc::new(WorkerHandle::new(
            w,
            CancellationToken::new(),
            Bus::new(4),
            Arc::new(Notify::new()),
        ))
    }

    #[tokio::test]
    async fn names_are_unique_and_sorted() {
        let reg = WorkerRegistry::default();
        assert!(reg.is_empty().await);
        reg.insert(handle("b")).await.expect("b");
        reg.insert(handle("a")).await.expect("a");

        let dup = reg.insert(handle("a")).await;
        assert!(matches!(dup, Err(FleetError::DuplicateWorker(n)) if n == "a"));
        assert_eq!(reg.list().await, vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(reg.require("zzz").await, Err(FleetError::UnknownWorker(_))));
    }
}
