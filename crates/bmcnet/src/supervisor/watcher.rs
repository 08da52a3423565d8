//! Administrative-state watcher: property-change signals from the link
//! supervisor, plus the startup enumeration of existing links.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use zbus::zvariant::Value;
use zbus::{MatchRule, Message, MessageStream, message};

use super::{
    Error, NETWORKD_LINK_IFACE, NETWORKD_LINK_NAMESPACE, NETWORKD_SERVICE, Networkd, Result,
    link_index_from_path,
};

/// One administrative-state report: (link index, state string).
pub type AdminUpdate = (u32, String);

/// Query every link the supervisor knows and deliver its state.
///
/// A supervisor that is not running yet is not an error; the signal
/// subscription fills the gap once it comes up.
pub async fn seed(networkd: &Networkd, tx: &mpsc::UnboundedSender<AdminUpdate>) {
    let links = match networkd.list_links().await {
        Ok(links) => links,
        Err(err) => {
            debug!(%err, "link supervisor unavailable at startup, continuing");
            return;
        }
    };

    for (idx, name) in links {
        let ifidx = idx as u32;
        match networkd.admin_state(ifidx).await {
            Ok(state) => {
                if tx.send((ifidx, state)).is_err() {
                    return;
                }
            }
            Err(err) => {
                debug!(%err, link = %name, "failed to query administrative state");
            }
        }
    }
}

/// Subscribe to AdministrativeState changes and forward them until the
/// receiver goes away.
///
/// Malformed signals are logged and skipped; nothing thrown inside the
/// callback path ever tears the subscription down.
pub async fn watch(conn: zbus::Connection, tx: mpsc::UnboundedSender<AdminUpdate>) -> Result<()> {
    let rule = MatchRule::builder()
        .msg_type(message::Type::Signal)
        .sender(NETWORKD_SERVICE)?
        .interface("org.freedesktop.DBus.Properties")?
        .member("PropertiesChanged")?
        .path_namespace(NETWORKD_LINK_NAMESPACE)?
        .arg(0, NETWORKD_LINK_IFACE)?
        .build();

    let mut stream = MessageStream::for_match_rule(rule, &conn, Some(64)).await?;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                warn!(%err, "error on supervisor signal stream");
                continue;
            }
        };
        match parse_admin_signal(&msg) {
            Ok(Some(update)) => {
                if tx.send(update).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "AdministrativeState change parsing failed"),
        }
    }

    Ok(())
}

/// Parse a PropertiesChanged signal into an administrative-state update.
///
/// Returns `Ok(None)` for signals that do not carry the property.
fn parse_admin_signal(msg: &Message) -> Result<Option<AdminUpdate>> {
    let header = msg.header();
    let path = header
        .path()
        .ok_or_else(|| Error::InvalidPath("<missing>".to_string()))?;
    let ifidx = link_index_from_path(path.as_str())?;

    let body = msg.body();
    let (iface, changed, _invalidated): (String, HashMap<String, Value>, Vec<String>) =
        body.deserialize()?;

    if iface != NETWORKD_LINK_IFACE {
        return Ok(None);
    }
    match changed.get("AdministrativeState") {
        Some(Value::Str(state)) => Ok(Some((ifidx, state.as_str().to_string()))),
        Some(_) => Err(Error::UnexpectedReply("AdministrativeState")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties_changed(path: &str, property: &str, state: &str) -> Message {
        let changed: HashMap<&str, Value> = HashMap::from([(property, Value::from(state))]);
        let invalidated: Vec<&str> = Vec::new();
        Message::signal(path, "org.freedesktop.DBus.Properties", "PropertiesChanged")
            .unwrap()
            .build(&(NETWORKD_LINK_IFACE, changed, invalidated))
            .unwrap()
    }

    #[test]
    fn test_parse_admin_signal() {
        let msg = properties_changed(
            "/org/freedesktop/network1/link/_32",
            "AdministrativeState",
            "configured",
        );
        let update = parse_admin_signal(&msg).unwrap().unwrap();
        assert_eq!(update, (2, "configured".to_string()));
    }

    #[test]
    fn test_parse_signal_without_property() {
        let msg = properties_changed(
            "/org/freedesktop/network1/link/_32",
            "OperationalState",
            "routable",
        );
        assert!(parse_admin_signal(&msg).unwrap().is_none());
    }

    #[test]
    fn test_parse_signal_bad_path() {
        let msg = properties_changed(
            "/org/freedesktop/network1/link/bogus",
            "AdministrativeState",
            "configured",
        );
        assert!(parse_admin_signal(&msg).is_err());
    }
}
