//! Shared types for rendezvous.
//!
//! This crate contains the types shared across the rendezvous workspace:
//! process identity, topic names, data-plane endpoints, and discovery
//! announcements.

pub mod announcement;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod topic;

pub use announcement::{Announcement, AnnouncementKind, Op, FLAGS_LEN, PROTOCOL_VERSION};
pub use endpoint::{Endpoint, MAX_ADDRESS_LEN};
pub use error::{EndpointError, TopicError};
pub use identity::{ProcessIdentity, IDENTITY_LEN};
pub use topic::{Topic, MAX_TOPIC_LEN};
