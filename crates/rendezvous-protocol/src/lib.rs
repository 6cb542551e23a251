//! Wire protocol and data-plane transport for rendezvous.
//!
//! This crate handles the discovery control-frame codec (`wire`), the
//! length-prefixed bincode framing used on data-plane streams (`frame`), and
//! the publish/subscribe data plane itself (`transport`): a shared TCP and
//! inproc publish endpoint plus a single inbox for subscribed payloads.

pub mod error;
pub mod frame;
pub mod transport;
pub mod wire;

pub use error::ProtocolError;
pub use frame::{DataMessage, FrameReader, FrameWriter};
pub use transport::{DataPlane, Delivery, Inbox, TransportConfig};
pub use wire::MAX_FRAME_SIZE;
