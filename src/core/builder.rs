use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{Fleet, FleetConfig, WorkerRegistry};
use crate::error::ConfigError;
use crate::events::Bus;
use crate::policies::{FairnessPolicy, RecoveryPolicy};
use crate::queue::{QueueRegistry, Validate};
use crate::recovery::{RecoverySupervisor, SupervisorParams};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Fleet`].
pub struct FleetBuilder<P> {
    cfg: FleetConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    validators: Vec<Arc<dyn Validate<P>>>,
}

impl<P: Send + Sync + 'static> FleetBuilder<P> {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: FleetConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Sets event subscribers (log writer, chat bridge, ...).
    ///
    /// Each subscriber gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one pre-enqueue validator.
    pub fn with_validator(mut self, validator: impl Validate<P>) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Validates the configuration and starts the fleet's background tasks
    /// (subscriber listener and recovery supervisor). Workers are registered
    /// afterwards and stay stopped until started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Arc<Fleet<P>>, ConfigError> {
        if self.cfg.health_check_interval.is_zero() {
            return Err(ConfigError::TickInterval);
        }
        let recovery = RecoveryPolicy::new(&self.cfg.recovery)?;
        let fairness = FairnessPolicy::new(&self.cfg.queue.fairness)?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers));
        let runtime_token = CancellationToken::new();
        let crash_signal = Arc::new(Notify::new());
        let roster = Arc::new(WorkerRegistry::default());

        let supervisor = RecoverySupervisor::new(
            recovery,
            SupervisorParams {
                tick: self.cfg.health_check_interval,
                observation: self.cfg.post_start_observation,
                max_concurrent: self.cfg.recovery_concurrency(),
            },
            Arc::clone(&roster),
            bus.clone(),
            Arc::clone(&crash_signal),
        );
        let queues = QueueRegistry::new(
            self.cfg.queue.clone(),
            fairness,
            self.validators,
            bus.clone(),
        );

        let fleet = Arc::new(Fleet::new_internal(
            self.cfg,
            bus,
            subs,
            roster,
            supervisor,
            queues,
            crash_signal,
            runtime_token,
        ));
        fleet.spawn_background();
        Ok(fleet)
    }
}
