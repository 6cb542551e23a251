//! Encoding and sending of this node's announcements.

use std::sync::Arc;

use rendezvous_discovery::ControlChannel;
use rendezvous_protocol::wire;
use rendezvous_types::{Announcement, ProcessIdentity, Topic};
use tracing::{trace, warn};

use crate::error::NodeError;
use crate::registry::{Publisher, SharedRegistry};

/// Sends ADV and SUB frames for one node.
#[derive(Clone)]
pub struct Announcer {
    identity: ProcessIdentity,
    control: Arc<dyn ControlChannel>,
    registry: SharedRegistry,
}

impl Announcer {
    pub fn new(
        identity: ProcessIdentity,
        control: Arc<dyn ControlChannel>,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            identity,
            control,
            registry,
        }
    }

    /// One ADV per address of `publisher`.
    pub fn advertise(&self, publisher: &Publisher) -> Result<(), NodeError> {
        for address in &publisher.addresses {
            let announcement =
                Announcement::advertise(self.identity, publisher.topic.clone(), address.to_string());
            self.send(&announcement)?;
        }
        Ok(())
    }

    pub fn subscribe(&self, topic: &Topic) -> Result<(), NodeError> {
        self.send(&Announcement::subscribe(self.identity, topic.clone()))
    }

    /// Re-send ADVs for every local publisher.
    ///
    /// The publisher list is copied out so the registry is not locked while
    /// sending.
    pub fn advertise_all(&self) {
        let publishers = self.registry.lock().publishers().to_vec();
        for publisher in &publishers {
            if let Err(e) = self.advertise(publisher) {
                warn!(topic = %publisher.topic, error = %e, "re-advertise failed");
            }
        }
    }

    /// Encode errors are returned; a failed send is only logged, since the
    /// broadcast medium is lossy anyway.
    fn send(&self, announcement: &Announcement) -> Result<(), NodeError> {
        let frame = wire::encode(announcement)?;
        match self.control.send(&frame) {
            Ok(()) => trace!(
                op = %announcement.op(),
                topic = %announcement.topic,
                len = frame.len(),
                "announcement sent"
            ),
            Err(e) => warn!(
                op = %announcement.op(),
                topic = %announcement.topic,
                error = %e,
                "announcement dropped"
            ),
        }
        Ok(())
    }
}
