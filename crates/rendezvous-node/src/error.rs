//! Node errors.

use rendezvous_types::Topic;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("topic {0} is already advertised")]
    AlreadyAdvertised(Topic),

    #[error("topic {0} is not advertised")]
    NotAdvertised(String),

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("data plane closed")]
    Closed,

    #[error("invalid topic: {0}")]
    Topic(#[from] rendezvous_types::TopicError),

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] rendezvous_types::EndpointError),

    #[error("protocol error: {0}")]
    Protocol(#[from] rendezvous_protocol::ProtocolError),

    #[error("discovery error: {0}")]
    Discovery(#[from] rendezvous_discovery::DiscoveryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
