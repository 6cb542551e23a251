//! The node: public API and single-threaded dispatcher.
//!
//! A [`Node`] owns the receiving side of both planes and is driven by
//! [`Node::spin_once`] / [`Node::spin`]. Everything a callback might want to
//! do (advertise, subscribe, publish) lives on the clonable [`NodeHandle`].

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rendezvous_discovery::{
    broadcast_address, local_addresses, pick_advertised_ip, BroadcastSocket, ControlChannel,
    DiscoveryError,
};
use rendezvous_protocol::{wire, DataPlane, Delivery, Inbox, MAX_FRAME_SIZE};
use rendezvous_types::{Announcement, Endpoint, ProcessIdentity, Topic};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::announcer::Announcer;
use crate::config::Config;
use crate::error::NodeError;
use crate::manager::{ConnectionManager, Decision};
use crate::registry::{Connection, Insertion, Publisher, SharedRegistry, Subscriber};
use crate::repeater::Repeater;

/// Per-iteration wait used by [`Node::spin`].
const SPIN_INTERVAL: Duration = Duration::from_millis(10);

struct Shared {
    manager: ConnectionManager,
    registry: SharedRegistry,
    announcer: Announcer,
    data: DataPlane,
}

/// Clonable access to a node's publish/subscribe API.
#[derive(Clone)]
pub struct NodeHandle {
    shared: Arc<Shared>,
}

impl NodeHandle {
    pub fn identity(&self) -> ProcessIdentity {
        self.shared.manager.identity()
    }

    /// Addresses every local publisher is reachable at, inproc first.
    pub fn publish_endpoints(&self) -> Vec<Endpoint> {
        self.shared.data.publish_endpoints()
    }

    /// Start publishing `topic`.
    ///
    /// Broadcasts one ADV per data-plane address and connects any local
    /// subscriber straight away.
    pub fn advertise(&self, topic: &str) -> Result<(), NodeError> {
        let topic = Topic::new(topic)?;
        let publisher = Publisher {
            topic: topic.clone(),
            addresses: self.shared.data.publish_endpoints(),
        };
        if self.shared.registry.lock().add_publisher(publisher.clone()) == Insertion::AlreadyExists {
            return Err(NodeError::AlreadyAdvertised(topic));
        }

        info!(topic = %topic, "advertising");
        self.shared.announcer.advertise(&publisher)?;
        self.connect_local(&topic);
        Ok(())
    }

    /// Register `callback` for payloads on `topic`.
    ///
    /// Several callbacks may share a topic; each is invoked once per payload.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Result<(), NodeError>
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        let topic = Topic::new(topic)?;
        self.shared.registry.lock().add_subscriber(Subscriber {
            topic: topic.clone(),
            callback: Arc::new(callback),
        });

        info!(topic = %topic, "subscribing");
        self.shared.announcer.subscribe(&topic)?;
        self.connect_local(&topic);
        Ok(())
    }

    /// Publish `payload` on an advertised topic. Never blocks.
    pub fn publish(&self, topic: &str, payload: impl AsRef<[u8]>) -> Result<(), NodeError> {
        if !self.shared.registry.lock().has_publisher(topic) {
            return Err(NodeError::NotAdvertised(topic.to_string()));
        }
        let payload = payload.as_ref();
        trace!(topic, len = payload.len(), "publishing");
        self.shared.data.send(topic, payload);
        Ok(())
    }

    pub fn unadvertise(&self, _topic: &str) -> Result<(), NodeError> {
        Err(NodeError::Unsupported("unadvertise"))
    }

    pub fn unsubscribe(&self, _topic: &str) -> Result<(), NodeError> {
        Err(NodeError::Unsupported("unsubscribe"))
    }

    /// Snapshot of the established connections.
    pub fn connections(&self) -> Vec<Connection> {
        self.shared.registry.lock().connections().to_vec()
    }

    /// Run one announcement through the connection manager.
    fn apply(&self, announcement: &Announcement) -> Decision {
        let decision = {
            let mut registry = self.shared.registry.lock();
            self.shared
                .manager
                .handle(announcement, &mut registry, &self.shared.data)
        };
        if let Decision::Readvertise(publishers) = &decision {
            for publisher in publishers {
                if let Err(e) = self.shared.announcer.advertise(publisher) {
                    warn!(topic = %publisher.topic, error = %e, "re-advertise failed");
                }
            }
        }
        decision
    }

    /// Same-process short-circuit: when we both publish and subscribe to
    /// `topic`, connect over inproc without waiting for our own broadcast.
    fn connect_local(&self, topic: &Topic) {
        if !self.shared.registry.lock().has_publisher(topic.as_str()) {
            return;
        }
        let announcement = Announcement::advertise(
            self.identity(),
            topic.clone(),
            self.shared.data.inproc_endpoint().to_string(),
        );
        let decision = self.apply(&announcement);
        debug!(topic = %topic, ?decision, "local short-circuit");
    }
}

struct UserTimer {
    period: Duration,
    next: Instant,
    callback: Box<dyn FnMut() + Send>,
}

enum Event {
    Control(Result<usize, DiscoveryError>),
    Data(Option<Delivery>),
    Timer,
    Timeout,
}

/// A rendezvous node.
pub struct Node {
    handle: NodeHandle,
    control: Arc<dyn ControlChannel>,
    inbox: Inbox,
    repeater: Option<Repeater>,
    timer: Option<UserTimer>,
    local_addresses: Vec<IpAddr>,
    advertised_ip: IpAddr,
    closed: bool,
}

impl Node {
    /// Start a node on the UDP broadcast control channel.
    ///
    /// The `RENDEZVOUS_*` environment overrides are applied on top of
    /// `config`, so an embedder gets the same behaviour as the CLI.
    pub async fn bind(config: Config) -> Result<Self, NodeError> {
        let config = with_overrides(config, |key| std::env::var(key).ok())?;
        let addresses = enumerate_addresses(&config);
        let ip = config
            .discovery
            .ip
            .unwrap_or_else(|| pick_advertised_ip(&addresses));
        let host = config
            .discovery
            .host
            .unwrap_or_else(|| broadcast_address(ip));
        let socket = BroadcastSocket::bind(config.discovery.port, host)?;
        Self::start(&config, Arc::new(socket), ip, addresses).await
    }

    /// Start a node on a caller-supplied control channel.
    pub async fn with_control(
        config: Config,
        control: Arc<dyn ControlChannel>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let addresses = enumerate_addresses(&config);
        let ip = config
            .discovery
            .ip
            .unwrap_or_else(|| pick_advertised_ip(&addresses));
        Self::start(&config, control, ip, addresses).await
    }

    async fn start(
        config: &Config,
        control: Arc<dyn ControlChannel>,
        ip: IpAddr,
        local_addresses: Vec<IpAddr>,
    ) -> Result<Self, NodeError> {
        let identity = ProcessIdentity::generate();
        let (data, inbox) =
            DataPlane::bind(ip, &config.transport.inproc_name, config.transport_config()).await?;

        let registry = SharedRegistry::new();
        let announcer = Announcer::new(identity, Arc::clone(&control), registry.clone());
        let repeater = Repeater::spawn(config.repeat_period(), announcer.clone());

        info!(identity = %identity, ip = %ip, "node started");
        Ok(Self {
            handle: NodeHandle {
                shared: Arc::new(Shared {
                    manager: ConnectionManager::new(identity),
                    registry,
                    announcer,
                    data,
                }),
            },
            control,
            inbox,
            repeater: Some(repeater),
            timer: None,
            local_addresses,
            advertised_ip: ip,
            closed: false,
        })
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    pub fn identity(&self) -> ProcessIdentity {
        self.handle.identity()
    }

    /// Interface addresses found at startup.
    pub fn local_addresses(&self) -> &[IpAddr] {
        &self.local_addresses
    }

    /// Address the TCP data plane is bound to.
    pub fn advertised_ip(&self) -> IpAddr {
        self.advertised_ip
    }

    pub fn advertise(&self, topic: &str) -> Result<(), NodeError> {
        self.handle.advertise(topic)
    }

    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Result<(), NodeError>
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.handle.subscribe(topic, callback)
    }

    pub fn publish(&self, topic: &str, payload: impl AsRef<[u8]>) -> Result<(), NodeError> {
        self.handle.publish(topic, payload)
    }

    pub fn unadvertise(&self, topic: &str) -> Result<(), NodeError> {
        self.handle.unadvertise(topic)
    }

    pub fn unsubscribe(&self, topic: &str) -> Result<(), NodeError> {
        self.handle.unsubscribe(topic)
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.handle.connections()
    }

    /// Fire `callback` every `period` from within the dispatcher.
    ///
    /// Replaces any previous timer.
    pub fn set_timer<F>(&mut self, period: Duration, callback: F) -> Result<(), NodeError>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(NodeError::Config("timer period must be positive".to_string()));
        }
        self.timer = Some(UserTimer {
            period,
            next: Instant::now() + period,
            callback: Box::new(callback),
        });
        Ok(())
    }

    pub fn clear_timer(&mut self) {
        self.timer = None;
    }

    /// Wait for and handle one event: a discovery frame, a subscribed
    /// payload, or the user timer.
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` only handles what
    /// is already pending. Returns the number of events handled, `0` on
    /// timeout, and [`NodeError::Closed`] once the node has been shut down.
    pub async fn spin_once(&mut self, timeout: Option<Duration>) -> Result<usize, NodeError> {
        if self.closed {
            return Err(NodeError::Closed);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let timer_due = self.timer.as_ref().map(|t| t.next);
        let mut buf = [0u8; MAX_FRAME_SIZE];

        let event = tokio::select! {
            biased;
            received = self.control.recv(&mut buf) => Event::Control(received),
            delivery = self.inbox.recv() => Event::Data(delivery),
            () = sleep_until(timer_due) => Event::Timer,
            () = sleep_until(deadline) => Event::Timeout,
        };

        match event {
            Event::Control(Ok(len)) => {
                self.handle_frame(&buf[..len]);
                Ok(1)
            }
            Event::Control(Err(e)) => {
                warn!(error = %e, "control channel receive failed");
                Ok(0)
            }
            Event::Data(Some(delivery)) => {
                self.dispatch(&delivery);
                Ok(1)
            }
            Event::Data(None) => Err(NodeError::Closed),
            Event::Timer => {
                self.fire_timer();
                Ok(1)
            }
            Event::Timeout => Ok(0),
        }
    }

    /// Handle events until the node is shut down.
    ///
    /// On a live node this never returns `Ok`; drive it from a `select!`
    /// next to whatever should stop it, then call [`Node::shutdown`].
    pub async fn spin(&mut self) -> Result<(), NodeError> {
        loop {
            match self.spin_once(Some(SPIN_INTERVAL)).await {
                Ok(_) => tokio::task::yield_now().await,
                Err(NodeError::Closed) => {
                    info!("node closed, spin finished");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stop the repeater and close the data plane.
    pub async fn shutdown(&mut self) {
        if let Some(repeater) = self.repeater.take() {
            repeater.stop().await;
        }
        if !self.closed {
            self.handle.shared.data.close();
            self.closed = true;
        }
        info!(identity = %self.identity(), "node shut down");
    }

    fn handle_frame(&self, frame: &[u8]) {
        match wire::decode(frame) {
            Ok(announcement) => {
                trace!(
                    op = %announcement.op(),
                    topic = %announcement.topic,
                    peer = %announcement.peer,
                    "announcement received"
                );
                self.handle.apply(&announcement);
            }
            Err(e) => warn!(error = %e, len = frame.len(), "dropping malformed discovery frame"),
        }
    }

    fn dispatch(&self, delivery: &Delivery) {
        // Callbacks are cloned out so none runs under the registry lock.
        let callbacks = self.handle.shared.registry.lock().subscribers_for(&delivery.topic);
        if callbacks.is_empty() {
            trace!(topic = %delivery.topic, "no subscriber for delivery");
        }
        for callback in &callbacks {
            callback(&delivery.topic, &delivery.payload);
        }
    }

    fn fire_timer(&mut self) {
        if let Some(timer) = &mut self.timer {
            (timer.callback)();
            let now = Instant::now();
            timer.next += timer.period;
            if timer.next <= now {
                timer.next = now + timer.period;
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if !self.closed {
            self.handle.shared.data.close();
        }
    }
}

fn with_overrides(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, NodeError> {
    config.apply_overrides(lookup)?;
    config.validate()?;
    Ok(config)
}

fn enumerate_addresses(config: &Config) -> Vec<IpAddr> {
    match local_addresses(config.discovery.include_ipv6) {
        Ok(addresses) => addresses,
        Err(e) => {
            warn!(error = %e, "could not enumerate local addresses");
            Vec::new()
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
