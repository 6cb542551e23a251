//! Local publishers, subscribers, and established connections.
//!
//! All three collections grow only: nothing is ever removed while the node
//! is alive. The registry is shared between the dispatcher, the repeater and
//! every [`NodeHandle`](crate::NodeHandle) behind one mutex; callers clone
//! what they need out of it and release the lock before doing I/O or
//! running callbacks.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rendezvous_types::{Endpoint, ProcessIdentity, Topic};

/// User callback for subscribed payloads: `(topic, payload)`.
pub type Callback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// A topic this node publishes, reachable at every address in `addresses`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publisher {
    pub topic: Topic,
    pub addresses: Vec<Endpoint>,
}

/// A local interest in a topic.
#[derive(Clone)]
pub struct Subscriber {
    pub topic: Topic,
    pub callback: Callback,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// An established data-plane subscription to a remote (or local) publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub topic: Topic,
    pub peer: ProcessIdentity,
    pub address: Endpoint,
}

/// Outcome of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    AlreadyExists,
}

#[derive(Debug, Default)]
pub struct Registry {
    publishers: Vec<Publisher>,
    subscribers: Vec<Subscriber>,
    connections: Vec<Connection>,
    connected: HashSet<(Topic, ProcessIdentity)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publisher. At most one per topic.
    pub fn add_publisher(&mut self, publisher: Publisher) -> Insertion {
        if self.has_publisher(publisher.topic.as_str()) {
            return Insertion::AlreadyExists;
        }
        self.publishers.push(publisher);
        Insertion::Added
    }

    /// Register a subscriber. Several may share a topic.
    pub fn add_subscriber(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    /// Record a connection unless one to the same `(topic, peer)` exists.
    ///
    /// Only the peer identity counts: a second address for the same peer
    /// and topic is a duplicate.
    pub fn add_connection(&mut self, connection: Connection) -> Insertion {
        let key = (connection.topic.clone(), connection.peer);
        if !self.connected.insert(key) {
            return Insertion::AlreadyExists;
        }
        self.connections.push(connection);
        Insertion::Added
    }

    /// Local publishers of `topic`; at most one.
    pub fn publishers_for<'a>(
        &'a self,
        topic: &'a str,
    ) -> impl Iterator<Item = &'a Publisher> + 'a {
        self.publishers.iter().filter(move |p| p.topic == topic)
    }

    pub fn has_publisher(&self, topic: &str) -> bool {
        self.publishers_for(topic).next().is_some()
    }

    pub fn publishers(&self) -> &[Publisher] {
        &self.publishers
    }

    /// Callbacks of every subscriber to `topic`, in registration order.
    pub fn subscribers_for(&self, topic: &str) -> Vec<Callback> {
        self.subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.callback))
            .collect()
    }

    pub fn has_subscriber(&self, topic: &str) -> bool {
        self.subscribers.iter().any(|s| s.topic == topic)
    }

    pub fn has_connection(&self, topic: &Topic, peer: ProcessIdentity) -> bool {
        self.connected.contains(&(topic.clone(), peer))
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }
}

/// The registry as shared between tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<Registry>>);

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Registry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn topic(name: &str) -> Topic {
        Topic::new(name).unwrap()
    }

    fn publisher(name: &str) -> Publisher {
        Publisher {
            topic: topic(name),
            addresses: vec!["inproc://topics".parse().unwrap()],
        }
    }

    fn connection(name: &str, peer: ProcessIdentity, address: &str) -> Connection {
        Connection {
            topic: topic(name),
            peer,
            address: address.parse().unwrap(),
        }
    }

    #[test]
    fn one_publisher_per_topic() {
        let mut registry = Registry::new();
        assert_eq!(registry.add_publisher(publisher("temp")), Insertion::Added);
        assert_eq!(
            registry.add_publisher(publisher("temp")),
            Insertion::AlreadyExists
        );
        assert_eq!(registry.add_publisher(publisher("humidity")), Insertion::Added);
        assert_eq!(registry.publishers().len(), 2);
        assert_eq!(registry.publishers_for("temp").count(), 1);
        assert!(!registry.has_publisher("pressure"));
    }

    #[test]
    fn subscribers_share_a_topic() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            registry.add_subscriber(Subscriber {
                topic: topic("temp"),
                callback: Arc::new(move |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
            });
        }

        assert!(registry.has_subscriber("temp"));
        assert!(!registry.has_subscriber("humidity"));

        for callback in registry.subscribers_for("temp") {
            callback("temp", b"23.5");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(registry.subscribers_for("humidity").is_empty());
    }

    #[test]
    fn connections_are_keyed_by_topic_and_peer() {
        let peer = ProcessIdentity::generate();
        let other = ProcessIdentity::generate();
        let mut registry = Registry::new();

        assert_eq!(
            registry.add_connection(connection("temp", peer, "tcp://10.0.0.2:5000")),
            Insertion::Added
        );
        // Same peer and topic at a different address.
        assert_eq!(
            registry.add_connection(connection("temp", peer, "tcp://10.0.0.3:5000")),
            Insertion::AlreadyExists
        );
        assert_eq!(
            registry.add_connection(connection("humidity", peer, "tcp://10.0.0.2:5000")),
            Insertion::Added
        );
        assert_eq!(
            registry.add_connection(connection("temp", other, "tcp://10.0.0.2:5000")),
            Insertion::Added
        );

        assert_eq!(registry.connections().len(), 3);
        assert!(registry.has_connection(&topic("temp"), peer));
        assert!(!registry.has_connection(&topic("pressure"), peer));
    }

    #[test]
    fn shared_registry_survives_poisoning() {
        let shared = SharedRegistry::new();
        let poisoner = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison");
        })
        .join();

        shared.lock().add_publisher(publisher("temp"));
        assert_eq!(shared.lock().publishers().len(), 1);
    }
}
