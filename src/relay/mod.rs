//! Asynchronous ingress: applies save/delete messages from a broker.
//!
//! A message carries the same edge list an HTTP save or delete request
//! would, and goes through the same normalization and validation. The
//! outcome decides acknowledgement: applied and undecodable messages are
//! acked, validation and storage failures are nacked for redelivery.
//! Redelivery of an applied message is harmless because saves merge by
//! last-write-wins and deletes are idempotent.

mod feed;
mod memory;
mod message;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use crate::engine::{normalize_edges, EdgeStore, WriteReport};
use crate::error::EdgeError;

pub use feed::{feed_lines, open_feed};
pub use memory::{MemoryBroker, MemoryDelivery, MemorySubscription, DEFAULT_ACK_DEADLINE};
pub use message::{RelayAction, RelayMessage};

/// A message handed out by a [`Subscription`], awaiting acknowledgement.
pub trait Delivery: Send + 'static {
    /// Raw message body.
    fn data(&self) -> &[u8];
    /// Marks the message processed; the broker forgets it.
    fn ack(self);
    /// Returns the message to the broker for redelivery.
    fn nack(self);
}

/// Source of deliveries, e.g. one broker subscription.
pub trait Subscription: Send {
    /// Delivery type produced by this subscription.
    type Delivery: Delivery;

    /// Waits for the next delivery; `None` once the subscription is exhausted.
    fn next(&mut self) -> impl Future<Output = Option<Self::Delivery>> + Send;
}

/// What happened to one message.
#[derive(Debug)]
pub enum RelayOutcome {
    /// The operation was applied.
    Applied {
        /// Operation carried by the message.
        action: RelayAction,
        /// Write summary.
        report: WriteReport,
    },
    /// The message can never succeed and is discarded.
    Dropped(String),
    /// The edges failed validation.
    Rejected(EdgeError),
    /// Storage failed; a later attempt may succeed.
    Failed(EdgeError),
}

impl RelayOutcome {
    /// Whether the message should be acknowledged rather than redelivered.
    pub fn should_ack(&self) -> bool {
        matches!(self, RelayOutcome::Applied { .. } | RelayOutcome::Dropped(_))
    }
}

/// Decodes one message body and applies it to `store`.
pub async fn process_message(store: &EdgeStore, data: &[u8]) -> RelayOutcome {
    let message = match RelayMessage::decode(data) {
        Ok(message) => message,
        Err(reason) => return RelayOutcome::Dropped(reason),
    };
    let RelayMessage {
        action,
        mut edges,
        timestamp,
    } = message;
    normalize_edges(&mut edges, timestamp.unwrap_or_else(OffsetDateTime::now_utc));

    let applied = match action {
        RelayAction::Save => store.blocking(move |store| store.save_many(&edges)).await,
        RelayAction::Delete => store.blocking(move |store| store.delete_many(&edges)).await,
    };
    match applied {
        Ok(report) => RelayOutcome::Applied { action, report },
        Err(err @ EdgeError::Validation(_)) => RelayOutcome::Rejected(err),
        Err(err) if !err.is_retryable() => RelayOutcome::Dropped(err.to_string()),
        Err(err) => RelayOutcome::Failed(err),
    }
}

/// Running totals kept by a [`RelayConsumer`].
#[derive(Debug, Default)]
struct RelayCounters {
    applied: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of consumer activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Messages applied and acked.
    pub applied: u64,
    /// Undecodable messages acked without applying.
    pub dropped: u64,
    /// Messages nacked after failing validation.
    pub rejected: u64,
    /// Messages nacked after a storage failure.
    pub failed: u64,
}

impl RelayCounters {
    fn record(&self, outcome: &RelayOutcome) {
        let counter = match outcome {
            RelayOutcome::Applied { .. } => &self.applied,
            RelayOutcome::Dropped(_) => &self.dropped,
            RelayOutcome::Rejected(_) => &self.rejected,
            RelayOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RelayStats {
        RelayStats {
            applied: self.applied.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Pulls deliveries from a subscription and applies each on its own task.
#[derive(Clone)]
pub struct RelayConsumer {
    store: EdgeStore,
    concurrency: usize,
    counters: Arc<RelayCounters>,
}

impl RelayConsumer {
    /// Creates a consumer handling up to `concurrency` messages at once.
    pub fn new(store: EdgeStore, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            counters: Arc::default(),
        }
    }

    /// Counts so far.
    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot()
    }

    /// Consumes until the subscription ends or `shutdown` flips to `true`,
    /// then waits for in-flight messages to settle.
    pub async fn run<S: Subscription>(
        &self,
        mut subscription: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> RelayStats {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        info!(concurrency = self.concurrency, "relay consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                next = subscription.next() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let store = self.store.clone();
            let counters = Arc::clone(&self.counters);
            let data = delivery.data().to_vec();
            tokio::spawn(async move {
                let outcome = process_message(&store, &data).await;
                log_outcome(&outcome);
                counters.record(&outcome);
                if outcome.should_ack() {
                    delivery.ack();
                } else {
                    delivery.nack();
                }
                drop(permit);
            });
        }
        let _ = permits.acquire_many(self.concurrency as u32).await;
        let stats = self.stats();
        info!(?stats, "relay consumer stopped");
        stats
    }
}

fn log_outcome(outcome: &RelayOutcome) {
    match outcome {
        RelayOutcome::Applied { action, report } => info!(
            action = action.as_str(),
            groups = report.groups,
            rows = report.rows,
            "relay message applied"
        ),
        RelayOutcome::Dropped(reason) => {
            warn!(%reason, "dropping undecodable relay message")
        }
        RelayOutcome::Rejected(err) => {
            warn!(%err, fields = ?err.fields(), "relay message failed validation; nacking")
        }
        RelayOutcome::Failed(err) => warn!(%err, "relay message failed to apply; nacking"),
    }
}
