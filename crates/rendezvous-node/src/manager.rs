//! Connection manager: turns announcements into data-plane subscriptions.

use rendezvous_protocol::{DataPlane, ProtocolError};
use rendezvous_types::{Announcement, AnnouncementKind, Endpoint, ProcessIdentity, Topic};
use tracing::{debug, info, warn};

use crate::registry::{Connection, Insertion, Publisher, Registry};

/// The subscribing side of the data plane.
pub trait DataLink: Send + Sync {
    /// Subscribe to `topic` at `endpoint`.
    fn connect_subscribe(&self, endpoint: &Endpoint, topic: &str) -> Result<(), ProtocolError>;
}

impl DataLink for DataPlane {
    fn connect_subscribe(&self, endpoint: &Endpoint, topic: &str) -> Result<(), ProtocolError> {
        DataPlane::connect_subscribe(self, endpoint, topic)
    }
}

/// What handling an announcement did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A new data-plane subscription was made and recorded.
    Connected(Connection),
    /// A SUB matched these local publishers; their ADVs must be re-sent.
    Readvertise(Vec<Publisher>),
    Ignored(Ignored),
}

/// Why an announcement led to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// Inproc from another process, or TCP from ourselves.
    Loop,
    /// The address is neither inproc nor tcp.
    UnknownScheme,
    NoSubscriber,
    AlreadyConnected,
    NotPublished,
    ConnectFailed,
}

pub struct ConnectionManager {
    identity: ProcessIdentity,
}

impl ConnectionManager {
    pub fn new(identity: ProcessIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> ProcessIdentity {
        self.identity
    }

    /// Handle one announcement against the registry.
    ///
    /// The caller holds the registry lock for the whole call, so the
    /// duplicate check and the insert cannot interleave with another
    /// handler.
    pub fn handle(
        &self,
        announcement: &Announcement,
        registry: &mut Registry,
        link: &dyn DataLink,
    ) -> Decision {
        match &announcement.kind {
            AnnouncementKind::Advertise { address } => {
                self.on_advertise(announcement.peer, &announcement.topic, address, registry, link)
            }
            AnnouncementKind::Subscribe => on_subscribe(&announcement.topic, registry),
        }
    }

    /// Decide whether a publisher address is usable from this process.
    ///
    /// Inproc addresses only work inside the advertising process and TCP
    /// addresses are only needed outside it.
    pub fn classify(&self, peer: ProcessIdentity, address: &str) -> Result<Endpoint, Ignored> {
        let endpoint: Endpoint = address.parse().map_err(|_| Ignored::UnknownScheme)?;
        let same_process = peer == self.identity;
        if endpoint.is_process_local() == same_process {
            Ok(endpoint)
        } else {
            Err(Ignored::Loop)
        }
    }

    fn on_advertise(
        &self,
        peer: ProcessIdentity,
        topic: &Topic,
        address: &str,
        registry: &mut Registry,
        link: &dyn DataLink,
    ) -> Decision {
        let endpoint = match self.classify(peer, address) {
            Ok(endpoint) => endpoint,
            Err(reason) => {
                debug!(topic = %topic, peer = %peer, address, ?reason, "advertisement rejected");
                return Decision::Ignored(reason);
            }
        };

        if !registry.has_subscriber(topic.as_str()) {
            return Decision::Ignored(Ignored::NoSubscriber);
        }

        if registry.has_connection(topic, peer) {
            debug!(topic = %topic, peer = %peer, "already connected");
            return Decision::Ignored(Ignored::AlreadyConnected);
        }

        if let Err(e) = link.connect_subscribe(&endpoint, topic.as_str()) {
            warn!(topic = %topic, address = %endpoint, error = %e, "subscribe failed");
            return Decision::Ignored(Ignored::ConnectFailed);
        }

        let connection = Connection {
            topic: topic.clone(),
            peer,
            address: endpoint,
        };
        match registry.add_connection(connection.clone()) {
            Insertion::Added => {
                info!(topic = %topic, peer = %peer, address = %connection.address, "connected to publisher");
                Decision::Connected(connection)
            }
            Insertion::AlreadyExists => Decision::Ignored(Ignored::AlreadyConnected),
        }
    }
}

fn on_subscribe(topic: &Topic, registry: &Registry) -> Decision {
    let publishers: Vec<Publisher> = registry.publishers_for(topic.as_str()).cloned().collect();
    if publishers.is_empty() {
        return Decision::Ignored(Ignored::NotPublished);
    }
    debug!(topic = %topic, "subscriber appeared, re-advertising");
    Decision::Readvertise(publishers)
}
