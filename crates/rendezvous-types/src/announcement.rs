//! Discovery announcements.
//!
//! Announcements are broadcast on the control channel. An ADV tells peers
//! where a topic is published; a SUB asks publishers of a topic to
//! re-advertise immediately.

use crate::identity::ProcessIdentity;
use crate::topic::Topic;

/// Current discovery protocol version.
pub const PROTOCOL_VERSION: u16 = 0x0001;

/// Length of the reserved flags field.
pub const FLAGS_LEN: usize = 16;

/// Operation carried by an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    Advertise = 0x01,
    Subscribe = 0x02,
}

impl Op {
    /// Map a wire code to an op, if known.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Advertise),
            0x02 => Some(Self::Subscribe),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advertise => write!(f, "ADV"),
            Self::Subscribe => write!(f, "SUB"),
        }
    }
}

/// Op-specific body of an announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementKind {
    /// A publisher for the topic is reachable at `address`.
    ///
    /// The address stays a raw string: an unrecognised scheme is a policy
    /// decision for the receiver, not a framing error.
    Advertise { address: String },
    /// A subscriber for the topic has appeared.
    Subscribe,
}

/// One decoded discovery frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub version: u16,
    pub peer: ProcessIdentity,
    pub topic: Topic,
    pub flags: [u8; FLAGS_LEN],
    pub kind: AnnouncementKind,
}

impl Announcement {
    /// Build an ADV at the current protocol version.
    pub fn advertise(peer: ProcessIdentity, topic: Topic, address: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            peer,
            topic,
            flags: [0; FLAGS_LEN],
            kind: AnnouncementKind::Advertise {
                address: address.into(),
            },
        }
    }

    /// Build a SUB at the current protocol version.
    pub fn subscribe(peer: ProcessIdentity, topic: Topic) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            peer,
            topic,
            flags: [0; FLAGS_LEN],
            kind: AnnouncementKind::Subscribe,
        }
    }

    pub fn op(&self) -> Op {
        match self.kind {
            AnnouncementKind::Advertise { .. } => Op::Advertise,
            AnnouncementKind::Subscribe => Op::Subscribe,
        }
    }

    /// The advertised address, for ADV announcements.
    pub fn address(&self) -> Option<&str> {
        match &self.kind {
            AnnouncementKind::Advertise { address } => Some(address),
            AnnouncementKind::Subscribe => None,
        }
    }
}
