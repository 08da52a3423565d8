//! Registry data model: the typed facts extracted from kernel events.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::netlink::messages::{AddressMessage, LinkMessage, NeighborMessage, RouteMessage};
use crate::netlink::types::addr::ifa_flags;
use crate::netlink::types::neigh::nud;

/// An IP address with its prefix length; the equality key for the
/// per-interface address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrPrefix {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl AddrPrefix {
    /// Create a new address/prefix pair.
    pub fn new(addr: IpAddr, prefix: u8) -> Self {
        Self { addr, prefix }
    }
}

impl fmt::Display for AddrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Format a hardware address in the canonical colon-separated form.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// Facts about one kernel link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Kernel link index; stable for the lifetime of the link.
    pub idx: u32,
    /// Interface name, when the kernel reported one.
    pub name: Option<String>,
    /// ARP hardware type; only ARPHRD_ETHER links are managed.
    pub hw_type: u16,
    /// Hardware address.
    pub mac: Option<[u8; 6]>,
    /// MTU.
    pub mtu: Option<u32>,
    /// Device flags (IFF_*).
    pub flags: u32,
    /// Link kind (e.g. "vlan") for stacked devices.
    pub kind: Option<String>,
    /// Index of the underlying device for stacked links.
    pub parent_idx: Option<u32>,
    /// VLAN ID when the kind is "vlan".
    pub vlan_id: Option<u16>,
}

impl InterfaceInfo {
    /// Extract interface facts from a link message.
    pub fn from_link(msg: &LinkMessage) -> Self {
        Self {
            idx: msg.ifindex(),
            name: msg.name.clone(),
            hw_type: msg.header.ifi_type,
            mac: msg.address,
            mtu: msg.mtu,
            flags: msg.flags(),
            kind: msg.kind().map(str::to_owned),
            parent_idx: msg.link,
            vlan_id: msg.link_info.as_ref().and_then(|info| info.vlan_id()),
        }
    }
}

/// Facts about one address on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressInfo {
    /// Owning link index.
    pub ifidx: u32,
    /// The address and prefix length.
    pub addr: AddrPrefix,
    /// Address scope.
    pub scope: u8,
    /// Address flags (IFA_F_*).
    pub flags: u32,
}

impl AddressInfo {
    /// Extract address facts from an address message.
    ///
    /// Returns `None` when the message carries no address at all.
    pub fn from_msg(msg: &AddressMessage) -> Option<Self> {
        let addr = msg.primary_address()?;
        Some(Self {
            ifidx: msg.ifindex(),
            addr: AddrPrefix::new(addr, msg.prefix_len()),
            scope: msg.scope(),
            flags: msg.effective_flags(),
        })
    }

    /// Check the deprecated flag; deprecated addresses are never retained.
    pub fn is_deprecated(&self) -> bool {
        self.flags & ifa_flags::DEPRECATED != 0
    }
}

/// Facts about one neighbor table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborInfo {
    /// Owning link index.
    pub ifidx: u32,
    /// Protocol address of the neighbor.
    pub addr: Option<IpAddr>,
    /// Link-layer address of the neighbor.
    pub lladdr: Option<[u8; 6]>,
    /// Neighbor state bits (NUD_*).
    pub state: u16,
}

impl NeighborInfo {
    /// Extract neighbor facts from a neighbor message.
    pub fn from_msg(msg: &NeighborMessage) -> Self {
        Self {
            ifidx: msg.ifindex(),
            addr: msg.destination,
            lladdr: msg.lladdr,
            state: msg.state(),
        }
    }

    /// Check whether this is a statically configured entry.
    pub fn is_permanent(&self) -> bool {
        self.state & nud::PERMANENT != 0
    }
}

/// A default gateway reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultGateway {
    /// Output interface index.
    pub ifidx: u32,
    /// Gateway address.
    pub addr: IpAddr,
}

impl DefaultGateway {
    /// Extract a default gateway from a route message.
    ///
    /// Only routes with a zero-length destination prefix, a gateway
    /// attribute and an output interface qualify; every other route is
    /// dropped here.
    pub fn from_route(msg: &RouteMessage) -> Option<Self> {
        if msg.dst_len() != 0 || !msg.is_default() {
            return None;
        }
        Some(Self {
            ifidx: msg.oif?,
            addr: msg.gateway?,
        })
    }
}

/// Everything the registry knows about one link.
#[derive(Debug, Clone, Default)]
pub struct AllIntfInfo {
    /// Link facts.
    pub intf: InterfaceInfo,
    /// IPv4 default gateway, at most one.
    pub defgw4: Option<Ipv4Addr>,
    /// IPv6 default gateway, at most one.
    pub defgw6: Option<Ipv6Addr>,
    /// Addresses keyed by address+prefix.
    pub addrs: HashMap<AddrPrefix, AddressInfo>,
    /// Static neighbor entries keyed by protocol address.
    pub static_neighs: HashMap<IpAddr, NeighborInfo>,
}

impl AllIntfInfo {
    /// Create the aggregate for a freshly observed link.
    pub fn new(intf: InterfaceInfo) -> Self {
        Self {
            intf,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_prefix_display() {
        let key = AddrPrefix::new("192.168.1.5".parse().unwrap(), 24);
        assert_eq!(key.to_string(), "192.168.1.5/24");

        let key6 = AddrPrefix::new("fe80::1".parse().unwrap(), 64);
        assert_eq!(key6.to_string(), "fe80::1/64");
    }

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac(&[0x52, 0x54, 0, 0xAB, 1, 2]), "52:54:00:ab:01:02");
    }

    #[test]
    fn test_default_gateway_requires_all_parts() {
        let mut msg = RouteMessage::default();
        msg.gateway = Some("10.0.0.1".parse().unwrap());
        // No output interface yet
        assert!(DefaultGateway::from_route(&msg).is_none());

        msg.oif = Some(2);
        let gw = DefaultGateway::from_route(&msg).unwrap();
        assert_eq!(gw.ifidx, 2);

        // A prefixed destination disqualifies the route
        msg.header.rtm_dst_len = 24;
        assert!(DefaultGateway::from_route(&msg).is_none());
    }
}
