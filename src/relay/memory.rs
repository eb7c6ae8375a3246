use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::{Delivery, Subscription};

/// Redelivery window for unacknowledged messages.
pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(20);

/// In-process broker with at-least-once delivery.
///
/// A delivery that is nacked, or not acked before the ack deadline, goes
/// back on the queue. A late ack for a message that already expired is
/// ignored, so the message will be seen again.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<BrokerState>,
    notify: Notify,
    ack_deadline: Duration,
    retry_delay: Duration,
}

#[derive(Default)]
struct BrokerState {
    ready: VecDeque<Queued>,
    in_flight: FxHashMap<u64, InFlight>,
    next_id: u64,
    next_lease: u64,
    closed: bool,
    acked: u64,
    redelivered: u64,
}

struct Queued {
    id: u64,
    data: Arc<[u8]>,
    available_at: Instant,
}

struct InFlight {
    lease: u64,
    data: Arc<[u8]>,
    deadline: Instant,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_DEADLINE, Duration::from_secs(1))
    }
}

impl MemoryBroker {
    /// Creates a broker; nacked messages become visible again after `retry_delay`.
    pub fn new(ack_deadline: Duration, retry_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                notify: Notify::new(),
                ack_deadline,
                retry_delay,
            }),
        }
    }

    /// Enqueues a message body.
    pub fn publish(&self, data: impl Into<Vec<u8>>) {
        let mut state = self.inner.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.ready.push_back(Queued {
            id,
            data: Arc::from(data.into()),
            available_at: Instant::now(),
        });
        drop(state);
        self.inner.notify.notify_waiters();
    }

    /// Stops accepting work: subscriptions end once every message is acked.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();
    }

    /// Messages queued or awaiting acknowledgement.
    pub fn outstanding(&self) -> usize {
        let state = self.inner.state.lock();
        state.ready.len() + state.in_flight.len()
    }

    /// Messages acknowledged so far.
    pub fn acked(&self) -> u64 {
        self.inner.state.lock().acked
    }

    /// Messages put back after a nack or an expired deadline.
    pub fn redelivered(&self) -> u64 {
        self.inner.state.lock().redelivered
    }

    /// Opens a subscription on this broker.
    pub fn subscribe(&self) -> MemorySubscription {
        MemorySubscription {
            broker: self.clone(),
        }
    }

    fn settle(&self, id: u64, lease: u64, ack: bool) {
        let mut state = self.inner.state.lock();
        if state.in_flight.get(&id).map(|flight| flight.lease) != Some(lease) {
            debug!(id, lease, "late settlement ignored");
            return;
        }
        let Some(flight) = state.in_flight.remove(&id) else {
            return;
        };
        if ack {
            state.acked += 1;
        } else {
            state.redelivered += 1;
            state.ready.push_back(Queued {
                id,
                data: flight.data,
                available_at: Instant::now() + self.inner.retry_delay,
            });
        }
        drop(state);
        self.inner.notify.notify_waiters();
    }
}

enum Poll {
    Ready(MemoryDelivery),
    Finished,
    Wait(Option<Instant>),
}

impl BrokerState {
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(flight) = self.in_flight.remove(&id) {
                debug!(id, "ack deadline expired; redelivering");
                self.redelivered += 1;
                self.ready.push_back(Queued {
                    id,
                    data: flight.data,
                    available_at: now,
                });
            }
        }
    }

    fn next_wakeup(&self) -> Option<Instant> {
        let deadlines = self.in_flight.values().map(|flight| flight.deadline);
        let retries = self.ready.iter().map(|queued| queued.available_at);
        deadlines.chain(retries).min()
    }
}

/// A subscription on a [`MemoryBroker`].
pub struct MemorySubscription {
    broker: MemoryBroker,
}

impl MemorySubscription {
    fn poll_state(&self) -> Poll {
        let inner = &self.broker.inner;
        let now = Instant::now();
        let mut state = inner.state.lock();
        state.reclaim_expired(now);
        if let Some(pos) = state.ready.iter().position(|q| q.available_at <= now) {
            if let Some(queued) = state.ready.remove(pos) {
                let lease = state.next_lease;
                state.next_lease += 1;
                state.in_flight.insert(
                    queued.id,
                    InFlight {
                        lease,
                        data: Arc::clone(&queued.data),
                        deadline: now + inner.ack_deadline,
                    },
                );
                return Poll::Ready(MemoryDelivery {
                    broker: self.broker.clone(),
                    id: queued.id,
                    lease,
                    data: queued.data,
                });
            }
        }
        if state.closed && state.ready.is_empty() && state.in_flight.is_empty() {
            return Poll::Finished;
        }
        Poll::Wait(state.next_wakeup())
    }
}

impl Subscription for MemorySubscription {
    type Delivery = MemoryDelivery;

    async fn next(&mut self) -> Option<MemoryDelivery> {
        loop {
            let mut notified = pin!(self.broker.inner.notify.notified());
            notified.as_mut().enable();
            match self.poll_state() {
                Poll::Ready(delivery) => return Some(delivery),
                Poll::Finished => return None,
                Poll::Wait(Some(at)) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = sleep_until(at) => {}
                    }
                }
                Poll::Wait(None) => notified.await,
            }
        }
    }
}

/// A message leased from a [`MemoryBroker`].
pub struct MemoryDelivery {
    broker: MemoryBroker,
    id: u64,
    lease: u64,
    data: Arc<[u8]>,
}

impl MemoryDelivery {
    /// Broker-assigned message id, stable across redeliveries.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Delivery for MemoryDelivery {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn ack(self) {
        self.broker.settle(self.id, self.lease, true);
    }

    fn nack(self) {
        self.broker.settle(self.id, self.lease, false);
    }
}
