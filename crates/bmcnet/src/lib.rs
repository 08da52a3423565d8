//! Core of the BMC network configuration daemon.
//!
//! The daemon maintains a queryable model of every Ethernet interface on
//! the host, reacts to kernel topology changes in real time, reconciles
//! the model with systemd-networkd's per-link administrative state, and
//! emits the persisted configuration files that drive the supervisor.
//!
//! The crate is organised around four coupled pieces:
//!
//! - [`netlink`]: the kernel event source and typed decoders,
//! - [`registry`]: the authoritative interface model and its mutation
//!   rules,
//! - [`supervisor`]: systemd-networkd integration over the system bus,
//! - [`reload`]: the debounced configuration-reload coordinator.
//!
//! Everything runs on one cooperative event loop; the registry is mutated
//! only between awaits, so no operation ever observes another mid-flight.
//!
//! # Example
//!
//! ```ignore
//! use bmcnet::netlink::{Connection, EventSource, dump_all};
//! use bmcnet::registry::{Manager, ignored_interfaces_from_env};
//!
//! let mut manager = Manager::new("/etc/systemd/network", ignored_interfaces_from_env());
//!
//! let conn = Connection::new()?;
//! for event in dump_all(&conn).await? {
//!     manager.dispatch(event);
//! }
//!
//! let mut events = EventSource::new()?;
//! loop {
//!     for event in events.next_burst().await? {
//!         manager.dispatch(event);
//!     }
//! }
//! ```

pub mod config;
pub mod netlink;
pub mod registry;
pub mod reload;
pub mod supervisor;

pub use registry::Manager;
