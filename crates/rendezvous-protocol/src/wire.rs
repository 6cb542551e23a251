//! Discovery wire format.
//!
//! Each control frame is one UDP datagram laid out as:
//!
//! ```text
//! VERSION:u16 | PEER:16 | TOPIC_LEN:u8 | TOPIC | OP:u8 | FLAGS:16 | [ADDR_LEN:u16 | ADDR]
//! ```
//!
//! The address suffix is only present on ADV frames. Integers are
//! little-endian.

use rendezvous_types::{
    Announcement, AnnouncementKind, Op, ProcessIdentity, Topic, FLAGS_LEN, IDENTITY_LEN,
    MAX_ADDRESS_LEN, PROTOCOL_VERSION,
};
use tracing::{debug, warn};

use crate::error::ProtocolError;

/// Largest frame that may be sent or received (one datagram).
pub const MAX_FRAME_SIZE: usize = 512;

/// Encode an announcement into a control frame.
pub fn encode(announcement: &Announcement) -> Result<Vec<u8>, ProtocolError> {
    let topic = announcement.topic.as_str().as_bytes();
    // Topic is validated to at most 192 bytes on construction.
    let topic_len = u8::try_from(topic.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: topic.len(),
        max: MAX_FRAME_SIZE,
    })?;

    let mut buf = Vec::with_capacity(MAX_FRAME_SIZE);
    buf.extend_from_slice(&announcement.version.to_le_bytes());
    buf.extend_from_slice(announcement.peer.as_bytes());
    buf.push(topic_len);
    buf.extend_from_slice(topic);
    buf.push(announcement.op().code());
    buf.extend_from_slice(&announcement.flags);

    if let AnnouncementKind::Advertise { address } = &announcement.kind {
        if address.len() > MAX_ADDRESS_LEN {
            return Err(ProtocolError::AddressTooLong {
                len: address.len(),
                max: MAX_ADDRESS_LEN,
            });
        }
        let addr_len = u16::try_from(address.len()).map_err(|_| ProtocolError::AddressTooLong {
            len: address.len(),
            max: MAX_ADDRESS_LEN,
        })?;
        buf.extend_from_slice(&addr_len.to_le_bytes());
        buf.extend_from_slice(address.as_bytes());
    }

    if buf.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len: buf.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(buf)
}

/// Decode one control frame.
///
/// A version other than [`PROTOCOL_VERSION`] is logged and decoding carries
/// on with the current layout. Any length that runs past the end of the
/// buffer, or an unknown op code, rejects the frame.
pub fn decode(frame: &[u8]) -> Result<Announcement, ProtocolError> {
    let mut cursor = Cursor::new(frame);

    let version = cursor.u16_le("version")?;
    if version != PROTOCOL_VERSION {
        warn!(
            remote = version,
            local = PROTOCOL_VERSION,
            "discovery version mismatch, decoding with local layout"
        );
    }

    let mut peer = [0u8; IDENTITY_LEN];
    peer.copy_from_slice(cursor.take(IDENTITY_LEN, "peer identity")?);
    let peer = ProcessIdentity::from_bytes(peer);

    let topic_len = usize::from(cursor.u8("topic length")?);
    let topic = std::str::from_utf8(cursor.take(topic_len, "topic")?)
        .map_err(|_| ProtocolError::InvalidUtf8("topic"))?;
    let topic = Topic::new(topic)?;

    let code = cursor.u8("op")?;
    let op = Op::from_code(code).ok_or(ProtocolError::UnknownOp(code))?;

    let mut flags = [0u8; FLAGS_LEN];
    flags.copy_from_slice(cursor.take(FLAGS_LEN, "flags")?);

    let kind = match op {
        Op::Advertise => {
            let addr_len = usize::from(cursor.u16_le("address length")?);
            let address = std::str::from_utf8(cursor.take(addr_len, "address")?)
                .map_err(|_| ProtocolError::InvalidUtf8("address"))?;
            AnnouncementKind::Advertise {
                address: address.to_string(),
            }
        }
        Op::Subscribe => AnnouncementKind::Subscribe,
    };

    let rest = cursor.remaining();
    if rest > 0 {
        if version == PROTOCOL_VERSION {
            return Err(ProtocolError::TrailingBytes(rest));
        }
        debug!(version, rest, "ignoring fields appended by a different version");
    }

    Ok(Announcement {
        version,
        peer,
        topic,
        flags,
        kind,
    })
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ProtocolError::Truncated { field })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, field)?[0])
    }

    fn u16_le(&mut self, field: &'static str) -> Result<u16, ProtocolError> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
