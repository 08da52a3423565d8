//! Link supervisor (systemd-networkd) integration over the system bus.
//!
//! The supervisor owns kernel link configuration; this daemon only tracks
//! its per-link `AdministrativeState` opinion and asks it to reload after
//! configuration files change.

pub mod watcher;

use async_trait::async_trait;
use zbus::zvariant::{OwnedObjectPath, Value};

/// Bus name of the link supervisor.
pub const NETWORKD_SERVICE: &str = "org.freedesktop.network1";
/// Manager object path of the link supervisor.
pub const NETWORKD_PATH: &str = "/org/freedesktop/network1";
/// Manager interface of the link supervisor.
pub const NETWORKD_MANAGER_IFACE: &str = "org.freedesktop.network1.Manager";
/// Per-link interface of the link supervisor.
pub const NETWORKD_LINK_IFACE: &str = "org.freedesktop.network1.Link";
/// Path namespace under which per-link objects live.
pub const NETWORKD_LINK_NAMESPACE: &str = "/org/freedesktop/network1/link";

const SYSTEMD_SERVICE: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const SYSTEMD_MANAGER_IFACE: &str = "org.freedesktop.systemd1.Manager";
const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

/// The service unit restarted after lldpd configuration is emitted.
pub const LLDP_SERVICE: &str = "lldpd.service";

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from supervisor communication.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bus-level failure.
    #[error("bus error: {0}")]
    Bus(#[from] zbus::Error),

    /// A per-link object path did not carry a decodable link index.
    #[error("invalid link object path: {0}")]
    InvalidPath(String),

    /// A reply carried an unexpected value type.
    #[error("unexpected reply type for {0}")]
    UnexpectedReply(&'static str),
}

/// Extract the link index from a per-link object path.
///
/// The supervisor escapes the leading digit of the index as its hex byte,
/// so every path ends in `_3` followed by the full decimal index
/// (e.g. `.../link/_32` for index 2, `.../link/_325` for index 25).
pub fn link_index_from_path(path: &str) -> Result<u32> {
    let tail = path.rsplit('/').next().unwrap_or_default();
    tail.strip_prefix("_3")
        .filter(|digits| !digits.is_empty())
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| Error::InvalidPath(path.to_string()))
}

/// Build the per-link object path for a link index.
pub fn link_path_for_index(ifidx: u32) -> String {
    format!("{NETWORKD_LINK_NAMESPACE}/_3{ifidx}")
}

/// The operations the reload coordinator needs from the supervisor.
#[async_trait]
pub trait LinkSupervisor {
    /// Ask the supervisor to reload its configuration files.
    async fn reload(&self) -> Result<()>;
}

/// systemd-networkd client over the system bus.
#[derive(Clone)]
pub struct Networkd {
    conn: zbus::Connection,
}

impl Networkd {
    /// Wrap an established bus connection.
    pub fn new(conn: zbus::Connection) -> Self {
        Self { conn }
    }

    /// Enumerate the supervisor's links as (index, name) pairs.
    pub async fn list_links(&self) -> Result<Vec<(i32, String)>> {
        let reply = self
            .conn
            .call_method(
                Some(NETWORKD_SERVICE),
                NETWORKD_PATH,
                Some(NETWORKD_MANAGER_IFACE),
                "ListLinks",
                &(),
            )
            .await?;
        let links: Vec<(i32, String, OwnedObjectPath)> = reply.body().deserialize()?;
        Ok(links.into_iter().map(|(idx, name, _)| (idx, name)).collect())
    }

    /// Query the administrative state of one link.
    pub async fn admin_state(&self, ifidx: u32) -> Result<String> {
        let path = link_path_for_index(ifidx);
        let reply = self
            .conn
            .call_method(
                Some(NETWORKD_SERVICE),
                path.as_str(),
                Some(PROPERTIES_IFACE),
                "Get",
                &(NETWORKD_LINK_IFACE, "AdministrativeState"),
            )
            .await?;
        let body = reply.body();
        match body.deserialize::<Value>()? {
            Value::Str(state) => Ok(state.as_str().to_string()),
            _ => Err(Error::UnexpectedReply("AdministrativeState")),
        }
    }
}

#[async_trait]
impl LinkSupervisor for Networkd {
    async fn reload(&self) -> Result<()> {
        self.conn
            .call_method(
                Some(NETWORKD_SERVICE),
                NETWORKD_PATH,
                Some(NETWORKD_MANAGER_IFACE),
                "Reload",
                &(),
            )
            .await?;
        Ok(())
    }
}

/// Restart the lldpd unit after its configuration was rewritten.
pub async fn restart_lldp_service(conn: &zbus::Connection) -> Result<()> {
    conn.call_method(
        Some(SYSTEMD_SERVICE),
        SYSTEMD_PATH,
        Some(SYSTEMD_MANAGER_IFACE),
        "RestartUnit",
        &(LLDP_SERVICE, "replace"),
    )
    .await?;
    Ok(())
}
