//! Broadcast control channel for rendezvous discovery.
//!
//! Defines the [`ControlChannel`] trait that carries discovery frames between
//! nodes, the UDP broadcast implementation, and the host address helpers
//! used to pick what a node advertises.

use async_trait::async_trait;

pub mod error;
pub mod interfaces;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod socket;

pub use error::DiscoveryError;
pub use interfaces::{broadcast_address, local_addresses, pick_advertised_ip};
pub use socket::BroadcastSocket;

/// A shared, unreliable broadcast medium for discovery frames.
///
/// Every node attached to the medium may receive every frame, including the
/// ones it sent itself.
#[async_trait]
pub trait ControlChannel: Send + Sync + 'static {
    /// Send one frame to every listener. Fire-and-forget: must not block.
    fn send(&self, frame: &[u8]) -> Result<(), DiscoveryError>;

    /// Wait for the next frame, returning its length in `buf`.
    ///
    /// Must be cancel-safe: the dispatcher races it against other sources.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize, DiscoveryError>;
}
