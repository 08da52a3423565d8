//! The interface registry and its managed objects.

mod info;
mod interface;
mod manager;

use std::collections::HashSet;

pub use info::{
    AddrPrefix, AddressInfo, AllIntfInfo, DefaultGateway, InterfaceInfo, NeighborInfo, format_mac,
};
pub use interface::EthernetInterface;
pub use manager::{DEFAULT_OBJECT_ROOT, Manager};

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error while reading or writing configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A user request carried an out-of-range or malformed argument.
    #[error("invalid argument {name}: {value}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// A user request referenced a resource that does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// An address or neighbor event referenced a link the registry does
    /// not know and has not ignored.
    #[error("interface {ifidx} not found for {what}")]
    UnknownInterface {
        /// The unknown link index.
        ifidx: u32,
        /// What kind of event referenced it.
        what: &'static str,
    },

    /// A kernel message lacked an attribute the registry requires.
    #[error("message missing required {0}")]
    MissingAttribute(&'static str),
}

/// Read the static interface ignore list from the environment.
///
/// Queried once at startup; membership never changes afterwards.
pub fn ignored_interfaces_from_env() -> HashSet<String> {
    std::env::var("IGNORED_INTERFACES")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownInterface {
            ifidx: 7,
            what: "addr",
        };
        assert_eq!(err.to_string(), "interface 7 not found for addr");

        let err = Error::InvalidArgument {
            name: "VLANId",
            value: "4095".to_string(),
        };
        assert_eq!(err.to_string(), "invalid argument VLANId: 4095");
    }
}
