//! Validation errors for topics and endpoint addresses.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic is {len} bytes, maximum is {max}")]
    TooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("address is {len} bytes, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("unrecognised transport scheme in address '{0}'")]
    UnknownScheme(String),

    #[error("invalid tcp address '{0}'")]
    InvalidTcp(String),

    #[error("inproc endpoint name must not be empty")]
    EmptyInprocName,
}
