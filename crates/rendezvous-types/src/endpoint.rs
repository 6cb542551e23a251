//! Data-plane endpoint addresses.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EndpointError;

/// Maximum endpoint address length in bytes.
pub const MAX_ADDRESS_LEN: usize = 267;

const INPROC_SCHEME: &str = "inproc://";
const TCP_SCHEME: &str = "tcp://";

/// Where a publisher can be reached.
///
/// `Inproc` endpoints only resolve inside the process that bound them;
/// `Tcp` endpoints are reachable from other processes and hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    Inproc(String),
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Whether this endpoint only makes sense inside the owning process.
    pub fn is_process_local(&self) -> bool {
        matches!(self, Self::Inproc(_))
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_ADDRESS_LEN {
            return Err(EndpointError::TooLong {
                len: s.len(),
                max: MAX_ADDRESS_LEN,
            });
        }
        if let Some(name) = s.strip_prefix(INPROC_SCHEME) {
            if name.is_empty() {
                return Err(EndpointError::EmptyInprocName);
            }
            return Ok(Self::Inproc(name.to_string()));
        }
        if let Some(addr) = s.strip_prefix(TCP_SCHEME) {
            return addr
                .parse()
                .map(Self::Tcp)
                .map_err(|_| EndpointError::InvalidTcp(s.to_string()));
        }
        Err(EndpointError::UnknownScheme(s.to_string()))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inproc(name) => write!(f, "{INPROC_SCHEME}{name}"),
            Self::Tcp(addr) => write!(f, "{TCP_SCHEME}{addr}"),
        }
    }
}
