//! Node runtime for rendezvous.
//!
//! Ties the discovery control channel to the data plane: a registry of
//! local publishers, subscribers and connections, the connection manager
//! that reacts to announcements, the repeater that re-advertises, and the
//! dispatcher that runs user callbacks.

pub mod announcer;
pub mod config;
pub mod error;
pub mod manager;
pub mod node;
pub mod registry;
pub mod repeater;
pub mod setup;

pub use config::Config;
pub use error::NodeError;
pub use manager::{ConnectionManager, DataLink, Decision, Ignored};
pub use node::{Node, NodeHandle};
pub use registry::{Callback, Connection, Publisher, Registry, SharedRegistry, Subscriber};
