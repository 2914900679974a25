//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`] to every subscriber **without
//! awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and logged; the subscriber keeps running.
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow (dropped events are logged).
//!
//! ```text
//!    emit(&Event)
//!        ├────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────► [queue S2] ─► worker S2 ─► on_event()
//!        └────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::Event;
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
pub struct SubscriberSet {
    channels: Mutex<Vec<SubscriberChannel>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = panic_message(panic_err.as_ref());
                        tracing::warn!(subscriber = sub.name(), seq = ev.seq, %info, "subscriber panicked");
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels: Mutex::new(channels),
            workers: Mutex::new(workers),
        }
    }

    /// Emits an event to all subscribers (non-blocking).
    ///
    /// A full or closed queue drops the event for that subscriber only.
    pub fn emit(&self, event: &Event) {
        let event = Arc::new(event.clone());
        for channel in self.channels.lock().iter() {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(subscriber = channel.name, seq = event.seq, reason, "subscriber dropped event");
        }
    }

    /// Closes all queues and waits for the workers to drain them.
    pub async fn shutdown(&self) {
        self.channels.lock().clear();
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for h in workers {
            let _ = h.await;
        }
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _ev: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    /// Panics on queue events only.
    struct Boom(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Boom {
        async fn on_event(&self, ev: &Event) {
            if ev.kind == EventKind::WorkQueued {
                panic!("boom");
            }
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "boom"
        }
    }

    #[tokio::test]
    async fn fans_out_and_drains_on_shutdown() {
        let seen = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(vec![
            Arc::new(Counter(seen.clone())),
            Arc::new(Counter(seen.clone())),
        ]);

        set.emit(&Event::new(EventKind::WorkQueued));
        set.emit(&Event::new(EventKind::WorkCompleted));
        set.shutdown().await;

        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn panicking_subscriber_keeps_receiving() {
        let after = Arc::new(AtomicUsize::new(0));
        let others = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(vec![
            Arc::new(Boom(after.clone())),
            Arc::new(Counter(others.clone())),
        ]);

        set.emit(&Event::new(EventKind::WorkQueued));
        set.emit(&Event::new(EventKind::WorkCompleted));
        set.shutdown().await;

        assert_eq!(after.load(Ordering::SeqCst), 1);
        assert_eq!(others.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_subscriber_only() {
        struct Tiny(Arc<AtomicUsize>);

        #[async_trait]
        impl Subscribe for Tiny {
            async fn on_event(&self, _ev: &Event) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn queue_capacity(&self) -> usize {
                1
            }
        }

        let tiny = Arc::new(AtomicUsize::new(0));
        let roomy = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(vec![
            Arc::new(Tiny(tiny.clone())),
            Arc::new(Counter(roomy.clone())),
        ]);

        // Current-thread runtime: no worker runs until we await.
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::WorkQueued));
        }
        set.shutdown().await;

        assert_eq!(tiny.load(Ordering::SeqCst), 1);
        assert_eq!(roomy.load(Ordering::SeqCst), 3);
    }
}
