//! Typed rtnetlink event source for the daemon's ingestion pipeline.

use tracing::debug;

use super::connection::Connection;
use super::error::Result;
use super::message::{MessageIter, NlMsgType};
use super::messages::{AddressMessage, LinkMessage, NeighborMessage, RouteMessage};
use super::parse::FromNetlink;
use super::socket::{NetlinkSocket, rtnetlink_groups::*};

/// Network events delivered by the kernel.
#[derive(Debug, Clone)]
pub enum RtnlEvent {
    /// A link was created or changed.
    NewLink(LinkMessage),
    /// A link was deleted.
    DelLink(LinkMessage),
    /// An address was added.
    NewAddress(AddressMessage),
    /// An address was removed.
    DelAddress(AddressMessage),
    /// A route was added.
    NewRoute(RouteMessage),
    /// A route was removed.
    DelRoute(RouteMessage),
    /// A neighbor entry was added.
    NewNeighbor(NeighborMessage),
    /// A neighbor entry was removed.
    DelNeighbor(NeighborMessage),
}

impl RtnlEvent {
    /// The interface index this event refers to, if any.
    ///
    /// Route messages carry an output interface attribute rather than a
    /// header index, so they report through it.
    pub fn ifindex(&self) -> Option<u32> {
        match self {
            RtnlEvent::NewLink(m) | RtnlEvent::DelLink(m) => Some(m.ifindex()),
            RtnlEvent::NewAddress(m) | RtnlEvent::DelAddress(m) => Some(m.ifindex()),
            RtnlEvent::NewNeighbor(m) | RtnlEvent::DelNeighbor(m) => Some(m.ifindex()),
            RtnlEvent::NewRoute(m) | RtnlEvent::DelRoute(m) => m.oif,
        }
    }
}

/// Parse one netlink message into a typed event.
///
/// Unknown message types and malformed payloads yield `None`; per-message
/// decode failures must never take the pipeline down.
fn parse_event(msg_type: u16, payload: &[u8]) -> Option<RtnlEvent> {
    let event = match msg_type {
        NlMsgType::RTM_NEWLINK => RtnlEvent::NewLink(LinkMessage::from_bytes(payload).ok()?),
        NlMsgType::RTM_DELLINK => RtnlEvent::DelLink(LinkMessage::from_bytes(payload).ok()?),
        NlMsgType::RTM_NEWADDR => {
            RtnlEvent::NewAddress(AddressMessage::from_bytes(payload).ok()?)
        }
        NlMsgType::RTM_DELADDR => {
            RtnlEvent::DelAddress(AddressMessage::from_bytes(payload).ok()?)
        }
        NlMsgType::RTM_NEWROUTE => RtnlEvent::NewRoute(RouteMessage::from_bytes(payload).ok()?),
        NlMsgType::RTM_DELROUTE => RtnlEvent::DelRoute(RouteMessage::from_bytes(payload).ok()?),
        NlMsgType::RTM_NEWNEIGH => {
            RtnlEvent::NewNeighbor(NeighborMessage::from_bytes(payload).ok()?)
        }
        NlMsgType::RTM_DELNEIGH => {
            RtnlEvent::DelNeighbor(NeighborMessage::from_bytes(payload).ok()?)
        }
        _ => return None,
    };
    Some(event)
}

/// Multicast event source: one socket subscribed to link, IPv4/IPv6
/// address, IPv4/IPv6 route and neighbor groups.
pub struct EventSource {
    socket: NetlinkSocket,
}

impl EventSource {
    /// Open the event socket and join all monitored groups.
    pub fn new() -> Result<Self> {
        let mut socket = NetlinkSocket::route()?;
        for group in [
            RTNLGRP_LINK,
            RTNLGRP_IPV4_IFADDR,
            RTNLGRP_IPV6_IFADDR,
            RTNLGRP_IPV4_ROUTE,
            RTNLGRP_IPV6_ROUTE,
            RTNLGRP_NEIGH,
        ] {
            socket.add_membership(group)?;
        }
        Ok(Self { socket })
    }

    /// Wait for socket readiness, then drain it.
    ///
    /// Returns every event of the burst in kernel delivery order; the
    /// caller must process the whole batch before polling again. Never
    /// returns an empty batch.
    pub async fn next_burst(&mut self) -> Result<Vec<RtnlEvent>> {
        loop {
            let datagrams = self.socket.recv_burst().await?;
            let mut events = Vec::new();

            for datagram in &datagrams {
                for result in MessageIter::new(datagram) {
                    let (header, payload) = match result {
                        Ok(parts) => parts,
                        Err(err) => {
                            debug!(%err, "skipping malformed netlink message");
                            break;
                        }
                    };
                    if let Some(event) = parse_event(header.nlmsg_type, payload) {
                        events.push(event);
                    }
                }
            }

            if !events.is_empty() {
                return Ok(events);
            }
        }
    }
}

/// Dump the kernel's current state in the canonical order: links,
/// addresses, routes, neighbors.
///
/// Used at startup and to recover after a receive-queue overrun. The
/// returned events flow through the same pipeline as multicast ones.
pub async fn dump_all(conn: &Connection) -> Result<Vec<RtnlEvent>> {
    let mut events = Vec::new();

    for link in conn.dump_typed::<LinkMessage>(NlMsgType::RTM_GETLINK).await? {
        events.push(RtnlEvent::NewLink(link));
    }
    for addr in conn
        .dump_typed::<AddressMessage>(NlMsgType::RTM_GETADDR)
        .await?
    {
        events.push(RtnlEvent::NewAddress(addr));
    }
    for route in conn
        .dump_typed::<RouteMessage>(NlMsgType::RTM_GETROUTE)
        .await?
    {
        events.push(RtnlEvent::NewRoute(route));
    }
    for neigh in conn
        .dump_typed::<NeighborMessage>(NlMsgType::RTM_GETNEIGH)
        .await?
    {
        events.push(RtnlEvent::NewNeighbor(neigh));
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::types::link::IfInfoMsg;

    #[test]
    fn test_parse_event_link() {
        let payload = IfInfoMsg::new().with_index(3).as_bytes().to_vec();
        let event = parse_event(NlMsgType::RTM_NEWLINK, &payload).unwrap();
        assert!(matches!(event, RtnlEvent::NewLink(ref m) if m.ifindex() == 3));
        assert_eq!(event.ifindex(), Some(3));
    }

    #[test]
    fn test_parse_event_unknown_type_dropped() {
        assert!(parse_event(0xFFF, &[0u8; 32]).is_none());
    }

    #[test]
    fn test_parse_event_truncated_dropped() {
        assert!(parse_event(NlMsgType::RTM_NEWLINK, &[0u8; 3]).is_none());
    }
}
