//! Publish/subscribe "state may have changed" notifications.
//!
//! Stores publish after every committed write; views subscribe and re-query.
//! A notification is a dirty flag, not an event log: consumers must re-read
//! state instead of trusting the payload.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Fired after any TaskStore write.
    TaskMutation,
    /// Fired after any ProblemCatalog status write.
    CatalogMutation,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::TaskMutation, Topic::CatalogMutation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::TaskMutation => "tasks_changed",
            Topic::CatalogMutation => "catalog_changed",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory description of what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeHint {
    Created,
    Updated,
    Deleted,
    Replaced,
    StatusChanged,
    Reloaded,
    /// Several writes were folded into one notification.
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub topic: Topic,
    pub hint: ChangeHint,
    /// Monotonic per bus; later notifications carry larger numbers.
    pub sequence: u64,
}

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Callback(Handler),
    Channel(Sender<Notification>),
    Flag(Arc<AtomicBool>),
}

impl Sink {
    /// Returns false once the sink can never receive again.
    fn deliver(&self, notification: &Notification) -> bool {
        match self {
            Sink::Callback(handler) => {
                handler(notification);
                true
            }
            Sink::Channel(sender) => sender.send(*notification).is_ok(),
            Sink::Flag(flag) => {
                flag.store(true, Ordering::Release);
                true
            }
        }
    }
}

struct Subscriber {
    id: u64,
    topic: Topic,
    sink: Sink,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    sequence: u64,
    holds: usize,
    pending: Vec<(Topic, ChangeHint)>,
}

#[derive(Clone, Default)]
pub struct SyncBus {
    inner: Arc<Mutex<BusState>>,
}

impl fmt::Debug for SyncBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SyncBus")
            .field("subscribers", &state.subscribers.len())
            .field("sequence", &state.sequence)
            .field("holds", &state.holds)
            .finish()
    }
}

impl SyncBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce that state behind `topic` may have changed.
    ///
    /// Handlers run on the caller's thread after the bus lock is released, so a
    /// handler may itself publish or subscribe.
    pub fn publish(&self, topic: Topic, hint: ChangeHint) {
        let (notification, sinks) = {
            let mut state = self.inner.lock();
            if state.holds > 0 {
                match state.pending.iter_mut().find(|(t, _)| *t == topic) {
                    Some((_, existing)) if *existing != hint => *existing = ChangeHint::Coalesced,
                    Some(_) => {}
                    None => state.pending.push((topic, hint)),
                }
                return;
            }
            state.sequence += 1;
            let notification = Notification {
                topic,
                hint,
                sequence: state.sequence,
            };
            let sinks: Vec<(u64, Sink)> = state
                .subscribers
                .iter()
                .filter(|sub| sub.topic == topic)
                .map(|sub| (sub.id, sub.sink.clone()))
                .collect();
            (notification, sinks)
        };

        tracing::trace!(
            topic = %notification.topic,
            sequence = notification.sequence,
            receivers = sinks.len(),
            "publishing change notification"
        );

        let mut closed = Vec::new();
        for (id, sink) in sinks {
            if !sink.deliver(&notification) {
                closed.push(id);
            }
        }
        if !closed.is_empty() {
            remove_subscribers(&self.inner, |sub| closed.contains(&sub.id));
        }
    }

    /// Register a callback for `topic`. The returned handle unsubscribes it.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.register(topic, Sink::Callback(Arc::new(handler)))
    }

    /// Subscribe through an unbounded channel instead of a callback.
    ///
    /// The subscription is dropped from the bus automatically once the
    /// receiver is gone and a publish notices it.
    pub fn subscribe_channel(&self, topic: Topic) -> (Subscription, Receiver<Notification>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (self.register(topic, Sink::Channel(sender)), receiver)
    }

    /// A flag that is raised by every publish on `topic`. Starts raised so the
    /// first reader always loads.
    pub fn dirty_flag(&self, topic: Topic) -> DirtyFlag {
        let flag = Arc::new(AtomicBool::new(true));
        let subscription = self.register(topic, Sink::Flag(flag.clone()));
        DirtyFlag { flag, subscription }
    }

    /// Defer and coalesce publishes until the returned guard is dropped.
    ///
    /// Each topic published while held is announced exactly once on release.
    /// Holds nest; only the outermost release flushes.
    pub fn hold(&self) -> PublishHold {
        self.inner.lock().holds += 1;
        PublishHold { bus: self.clone() }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .lock()
            .subscribers
            .iter()
            .filter(|sub| sub.topic == topic)
            .count()
    }

    /// Sequence number of the most recent delivered notification.
    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    fn register(&self, topic: Topic, sink: Sink) -> Subscription {
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.push(Subscriber { id, topic, sink });
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
            topic,
        }
    }

    fn release_hold(&self) {
        let pending = {
            let mut state = self.inner.lock();
            state.holds = state.holds.saturating_sub(1);
            if state.holds > 0 {
                return;
            }
            std::mem::take(&mut state.pending)
        };
        for (topic, hint) in pending {
            self.publish(topic, hint);
        }
    }
}

/// Removed subscribers are dropped after the lock is released, since a sink may
/// own another [`Subscription`] whose drop locks the bus again.
fn remove_subscribers<P>(bus: &Mutex<BusState>, mut matches: P) -> usize
where
    P: FnMut(&Subscriber) -> bool,
{
    let removed: Vec<Subscriber> = {
        let mut state = bus.lock();
        let (removed, kept) = std::mem::take(&mut state.subscribers)
            .into_iter()
            .partition(|sub| matches(sub));
        state.subscribers = kept;
        removed
    };
    removed.len()
}

/// Handle returned by [`SyncBus::subscribe`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<Mutex<BusState>>,
    id: u64,
    topic: Topic,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Stop receiving notifications. Returns false if the bus is gone or the
    /// subscriber had already been removed.
    pub fn unsubscribe(self) -> bool {
        self.detach()
    }

    fn detach(&self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        remove_subscribers(&bus, |sub| sub.id == self.id) > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[derive(Debug)]
pub struct DirtyFlag {
    flag: Arc<AtomicBool>,
    subscription: Subscription,
}

impl DirtyFlag {
    pub fn is_dirty(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    pub fn mark(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn unsubscribe(self) -> bool {
        self.subscription.unsubscribe()
    }
}

#[must_use = "publishes are released when the hold is dropped"]
pub struct PublishHold {
    bus: SyncBus,
}

impl Drop for PublishHold {
    fn drop(&mut self) {
        self.bus.release_hold();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn callbacks_receive_only_their_topic() {
        let bus = SyncBus::new();
        let task_hits = Arc::new(AtomicUsize::new(0));
        let counter = task_hits.clone();
        let _sub = bus.subscribe(Topic::TaskMutation, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Topic::TaskMutation, ChangeHint::Created);
        bus.publish(Topic::CatalogMutation, ChangeHint::StatusChanged);
        bus.publish(Topic::TaskMutation, ChangeHint::Updated);

        assert_eq!(task_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = SyncBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = bus.subscribe(Topic::TaskMutation, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Topic::TaskMutation, ChangeHint::Created);
        assert!(sub.unsubscribe());
        bus.publish(Topic::TaskMutation, ChangeHint::Created);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(Topic::TaskMutation), 0);
    }

    #[test]
    fn hold_coalesces_but_never_drops() {
        let bus = SyncBus::new();
        let (_sub, rx) = bus.subscribe_channel(Topic::TaskMutation);
        let (_cat, catalog_rx) = bus.subscribe_channel(Topic::CatalogMutation);
        {
            let _outer = bus.hold();
            bus.publish(Topic::TaskMutation, ChangeHint::Updated);
            {
                let _inner = bus.hold();
                bus.publish(Topic::TaskMutation, ChangeHint::Deleted);
                bus.publish(Topic::CatalogMutation, ChangeHint::StatusChanged);
            }
            assert!(rx.try_recv().is_err(), "inner release must not flush");
        }

        let notification = rx.try_recv().expect("one coalesced notification");
        assert_eq!(notification.hint, ChangeHint::Coalesced);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            catalog_rx.try_recv().map(|n| n.hint),
            Ok(ChangeHint::StatusChanged)
        );
    }

    #[test]
    fn dirty_flag_starts_raised_and_tracks_publishes() {
        let bus = SyncBus::new();
        let flag = bus.dirty_flag(Topic::CatalogMutation);
        assert!(flag.take());
        assert!(!flag.is_dirty());
        bus.publish(Topic::CatalogMutation, ChangeHint::StatusChanged);
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn dropped_channel_receivers_are_pruned() {
        let bus = SyncBus::new();
        let (_sub, rx) = bus.subscribe_channel(Topic::TaskMutation);
        drop(rx);
        bus.publish(Topic::TaskMutation, ChangeHint::Created);
        assert_eq!(bus.subscriber_count(Topic::TaskMutation), 0);
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = SyncBus::new();
        let relay = bus.clone();
        let _sub = bus.subscribe(Topic::CatalogMutation, move |_| {
            relay.publish(Topic::TaskMutation, ChangeHint::Updated);
        });
        let (_tasks, rx) = bus.subscribe_channel(Topic::TaskMutation);

        bus.publish(Topic::CatalogMutation, ChangeHint::StatusChanged);

        let relayed = rx.try_recv().expect("relayed notification");
        assert_eq!(relayed.sequence, 2);
    }

    #[test]
    fn dropping_handles_unsubscribes() {
        let bus = SyncBus::new();
        for _ in 0..100 {
            let _flag = bus.dirty_flag(Topic::TaskMutation);
            let _sub = bus.subscribe(Topic::TaskMutation, |_| {});
        }
        assert_eq!(bus.subscriber_count(Topic::TaskMutation), 0);

        let kept = bus.dirty_flag(Topic::TaskMutation);
        {
            let (_sub, _rx) = bus.subscribe_channel(Topic::TaskMutation);
            assert_eq!(bus.subscriber_count(Topic::TaskMutation), 2);
        }
        bus.publish(Topic::TaskMutation, ChangeHint::Updated);
        assert_eq!(bus.subscriber_count(Topic::TaskMutation), 1);
        assert!(kept.is_dirty());
    }

    #[test]
    fn handler_owning_a_subscription_can_be_dropped() {
        let bus = SyncBus::new();
        let inner = bus.subscribe(Topic::TaskMutation, |_| {});
        let outer = bus.subscribe(Topic::CatalogMutation, move |_| {
            let _ = inner.topic();
        });
        assert_eq!(bus.subscriber_count(Topic::TaskMutation), 1);
        drop(outer);
        assert_eq!(bus.subscriber_count(Topic::CatalogMutation), 0);
        assert_eq!(bus.subscriber_count(Topic::TaskMutation), 0);
    }
}
