//! node.rs
//! Task-local handles onto the bus.
//!
//! A `Node` is created when a task starts and dropped when it stops; it
//! tracks which topics it subscribes to / publishes so that a second
//! subscription to the same topic is refused. `Subscription` owns its cached
//! copy of the message: nothing is shared by pointer across tasks.

use crossbeam::channel::Receiver;
use log::debug;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use super::{TopicBus, catalog::TopicDef, message::Message, topic::Topic};
use crate::error::BusError;

pub struct Node {
    name: String,
    bus: Arc<TopicBus>,
    subscribed: HashSet<&'static str>,
    published: HashSet<&'static str>,
}

impl Node {
    pub(super) fn new(bus: Arc<TopicBus>, name: &str) -> Self {
        debug!("[{}] node created", name);
        Self {
            name: name.to_string(),
            bus,
            subscribed: HashSet::new(),
            published: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe with an initial cached value and a queue-depth hint.
    pub fn subscribe<T: Message>(
        &mut self,
        def: TopicDef<T>,
        initial: T,
        queue_depth: usize,
    ) -> Result<Subscription<T>, BusError> {
        if self.subscribed.contains(def.name()) {
            return Err(BusError::DuplicateSubscription {
                node: self.name.clone(),
                topic: def.name(),
            });
        }
        let topic = self.bus.topic(def)?;
        self.subscribed.insert(def.name());
        Ok(Subscription {
            topic,
            cache: initial,
            last_seq: 0,
            queue_depth,
            event: None,
        })
    }

    pub fn advertise<T: Message>(&mut self, def: TopicDef<T>) -> Result<Publication<T>, BusError> {
        if self.published.contains(def.name()) {
            return Err(BusError::DuplicatePublication {
                node: self.name.clone(),
                topic: def.name(),
            });
        }
        let topic = self.bus.topic(def)?;
        self.published.insert(def.name());
        Ok(Publication { topic })
    }

    pub fn unsubscribe<T: Message>(&mut self, sub: Subscription<T>) {
        self.subscribed.remove(sub.topic_name());
    }

    pub fn unadvertise<T: Message>(&mut self, publication: Publication<T>) {
        self.published.remove(publication.topic_name());
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribed.len()
    }

    pub fn publication_count(&self) -> usize {
        self.published.len()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        debug!(
            "[{}] node torn down (subs={}, pubs={})",
            self.name,
            self.subscribed.len(),
            self.published.len()
        );
    }
}

pub struct Subscription<T: Message> {
    topic: Arc<Topic<T>>,
    cache: T,
    last_seq: u64,
    queue_depth: usize,
    event: Option<Receiver<()>>,
}

impl<T: Message> Subscription<T> {
    /// Make this the drive subscription: `wait()` then blocks on publishes.
    pub fn with_event(mut self) -> Self {
        if self.event.is_none() {
            self.event = Some(self.topic.register_waiter());
        }
        self
    }

    /// True iff the topic was published since the last `update()`.
    #[inline]
    pub fn update_available(&self) -> bool {
        self.topic.sequence() > self.last_seq
    }

    /// Drain to latest: copy the newest value into the local cache.
    pub fn update(&mut self) -> &T {
        let (value, seq) = self.topic.read();
        self.cache = value;
        self.last_seq = seq;
        &self.cache
    }

    /// `update()` only when something new arrived; returns whether it did.
    pub fn update_if_available(&mut self) -> bool {
        if self.update_available() {
            self.update();
            true
        } else {
            false
        }
    }

    /// Cached value from the last `update()` (or the initial value).
    #[inline]
    pub fn get(&self) -> &T {
        &self.cache
    }

    /// Block until a publish newer than the cache arrives or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.event.is_none() {
            self.event = Some(self.topic.register_waiter());
        }
        let rx = match &self.event {
            Some(rx) => rx.clone(),
            None => return self.update_available(),
        };

        if self.update_available() {
            // clear the token belonging to this publish
            while rx.try_recv().is_ok() {}
            return true;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match rx.recv_deadline(deadline) {
                // stale tokens from already-consumed publishes are skipped
                Ok(()) if self.update_available() => return true,
                Ok(()) => continue,
                Err(_) => return self.update_available(),
            }
        }
    }

    pub fn topic_name(&self) -> &'static str {
        self.topic.name()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_seq
    }
}

pub struct Publication<T: Message> {
    topic: Arc<Topic<T>>,
}

impl<T: Message> Publication<T> {
    pub fn publish(&self, msg: T) -> Result<u64, BusError> {
        self.topic.publish(msg)
    }

    pub fn topic_name(&self) -> &'static str {
        self.topic.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::catalog::{ESTIMATOR_ODOMETRY, MOMENT_SP, STATUS};
    use crate::messages::{Mode, Odometry, Status, Vector3};
    use std::thread;

    #[test]
    fn test_duplicate_subscription_is_refused() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("rate");
        let _sub = node.subscribe(STATUS, Status::default(), 10).unwrap();
        let err = node.subscribe(STATUS, Status::default(), 10).err().unwrap();
        assert_eq!(
            err,
            BusError::DuplicateSubscription { node: "rate".into(), topic: "status" }
        );

        // another node may subscribe to the same topic
        let mut other = bus.create_node("position");
        assert!(other.subscribe(STATUS, Status::default(), 10).is_ok());
    }

    #[test]
    fn test_unsubscribe_allows_resubscribe() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("rate");
        let sub = node.subscribe(STATUS, Status::default(), 10).unwrap();
        node.unsubscribe(sub);
        assert_eq!(node.subscription_count(), 0);
        assert!(node.subscribe(STATUS, Status::default(), 10).is_ok());
    }

    #[test]
    fn test_update_available_once_per_publish() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("n");
        let publisher = node.advertise(MOMENT_SP).unwrap();
        let mut sub = node.subscribe(MOMENT_SP, Vector3::default(), 1).unwrap();

        assert!(!sub.update_available());
        publisher.publish(Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert!(sub.update_available());
        // still true until update() is called
        assert!(sub.update_available());
        assert_eq!(sub.update().x, 1.0);
        assert!(!sub.update_available());
    }

    #[test]
    fn test_update_drains_to_latest() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("n");
        let publisher = node.advertise(MOMENT_SP).unwrap();
        let mut sub = node.subscribe(MOMENT_SP, Vector3::default(), 1).unwrap();

        for i in 1..=5 {
            publisher.publish(Vector3::new(i as f64, 0.0, 0.0)).unwrap();
        }
        assert_eq!(sub.update().x, 5.0);
        assert_eq!(sub.last_sequence(), 5);
        assert!(!sub.update_if_available());
    }

    #[test]
    fn test_initial_value_is_cached_until_update() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("n");
        let initial = Status { mode: Mode::Manual, armed: false };
        let sub = node.subscribe(STATUS, initial, 10).unwrap();
        assert_eq!(*sub.get(), initial);
        assert_eq!(sub.queue_depth(), 10);
    }

    #[test]
    fn test_wait_times_out_without_publish() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("n");
        let mut sub = node
            .subscribe(ESTIMATOR_ODOMETRY, Odometry::default(), 10)
            .unwrap()
            .with_event();
        let start = Instant::now();
        assert!(!sub.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_wakes_on_publish_from_other_thread() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("n");
        let mut sub = node
            .subscribe(ESTIMATOR_ODOMETRY, Odometry::default(), 10)
            .unwrap()
            .with_event();

        let publisher_bus = bus.clone();
        let handle = thread::spawn(move || {
            let mut estimator = publisher_bus.create_node("estimator");
            let publication = estimator.advertise(ESTIMATOR_ODOMETRY).unwrap();
            thread::sleep(Duration::from_millis(10));
            publication.publish(Odometry::default()).unwrap();
        });

        assert!(sub.wait(Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_ignores_stale_token() {
        let bus = TopicBus::new();
        let mut node = bus.create_node("n");
        let publisher = node.advertise(MOMENT_SP).unwrap();
        let mut sub = node.subscribe(MOMENT_SP, Vector3::default(), 1).unwrap().with_event();

        publisher.publish(Vector3::new(1.0, 0.0, 0.0)).unwrap();
        // consumed without waiting: token stays in the channel
        sub.update();
        assert!(!sub.wait(Duration::from_millis(10)));
    }
}
