//! In-memory control channel for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::error::DiscoveryError;
use crate::ControlChannel;

/// A simulated broadcast domain.
///
/// Every [`LoopbackPort`] attached to the bus receives every frame sent on
/// it, including its own, like hosts on one subnet.
#[derive(Clone)]
pub struct LoopbackBus {
    tx: broadcast::Sender<Vec<u8>>,
    sent: Arc<AtomicUsize>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            tx,
            sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Attach a new listener to the bus.
    pub fn attach(&self) -> LoopbackPort {
        LoopbackPort {
            bus: self.clone(),
            rx: Mutex::new(self.tx.subscribe()),
        }
    }

    /// Inject a raw frame, as if a foreign host had sent it.
    pub fn inject(&self, frame: &[u8]) {
        let _ = self.tx.send(frame.to_vec());
    }

    /// Number of frames sent through attached ports.
    pub fn frames_sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's attachment to a [`LoopbackBus`].
pub struct LoopbackPort {
    bus: LoopbackBus,
    rx: Mutex<broadcast::Receiver<Vec<u8>>>,
}

#[async_trait]
impl ControlChannel for LoopbackPort {
    fn send(&self, frame: &[u8]) -> Result<(), DiscoveryError> {
        self.bus.sent.fetch_add(1, Ordering::SeqCst);
        let _ = self.bus.tx.send(frame.to_vec());
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize, DiscoveryError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    // Datagram semantics: excess bytes are cut off.
                    let len = frame.len().min(buf.len());
                    buf[..len].copy_from_slice(&frame[..len]);
                    return Ok(len);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(DiscoveryError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_port_hears_every_frame() {
        let bus = LoopbackBus::new();
        let a = bus.attach();
        let b = bus.attach();

        a.send(b"hello").unwrap();

        let mut buf = [0u8; 16];
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        let n = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(bus.frames_sent(), 1);
    }

    #[tokio::test]
    async fn injected_frames_are_not_counted() {
        let bus = LoopbackBus::new();
        let a = bus.attach();
        bus.inject(&[1, 2, 3]);

        let mut buf = [0u8; 2];
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(bus.frames_sent(), 0);
    }
}
