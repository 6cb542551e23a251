//! Protocol and transport errors.

use rendezvous_types::TopicError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("address is {len} bytes, maximum is {max}")]
    AddressTooLong { len: usize, max: usize },

    #[error("frame is {len} bytes, maximum is {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("frame truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("unknown op code 0x{0:02x}")]
    UnknownOp(u8),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("inproc endpoint '{0}' is not bound in this process")]
    UnknownInproc(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("serialisation error: {0}")]
    Serialization(String),

    #[error("deserialisation error: {0}")]
    Deserialization(String),

    #[error("stream closed unexpectedly")]
    StreamClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
