//! Kernel event ingestion: raw NETLINK_ROUTE socket handling, message
//! framing, typed decoders, and the multicast event source.

pub mod attr;
pub mod builder;
pub mod connection;
pub mod error;
pub mod events;
pub mod message;
pub mod messages;
pub mod parse;
pub mod socket;
pub mod types;

pub use connection::Connection;
pub use error::{Error, Result};
pub use events::{EventSource, RtnlEvent, dump_all};
pub use socket::NetlinkSocket;
