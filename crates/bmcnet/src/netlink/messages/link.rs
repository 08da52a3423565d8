//! Strongly-typed link message.

use winnow::prelude::*;
use winnow::token::take;

use crate::netlink::attr::AttrIter;
use crate::netlink::parse::{
    FromNetlink, PResult, attr_mac, attr_string, attr_u16, attr_u32, cut, parse_attr,
};
use crate::netlink::types::link::{IfInfoMsg, iff};

/// Attribute IDs for IFLA_* constants.
mod attr_ids {
    pub const IFLA_ADDRESS: u16 = 1;
    pub const IFLA_IFNAME: u16 = 3;
    pub const IFLA_MTU: u16 = 4;
    pub const IFLA_LINK: u16 = 5;
    pub const IFLA_LINKINFO: u16 = 18;
}

/// Nested IFLA_INFO_* attribute IDs.
mod info_ids {
    pub const IFLA_INFO_KIND: u16 = 1;
    pub const IFLA_INFO_DATA: u16 = 2;
}

/// Nested IFLA_VLAN_* attribute IDs (inside IFLA_INFO_DATA for kind "vlan").
mod vlan_ids {
    pub const IFLA_VLAN_ID: u16 = 1;
}

/// Strongly-typed link message with the attributes this daemon consumes.
#[derive(Debug, Clone, Default)]
pub struct LinkMessage {
    /// Fixed-size header.
    pub header: IfInfoMsg,
    /// Interface name (IFLA_IFNAME).
    pub name: Option<String>,
    /// Hardware address (IFLA_ADDRESS), kept only for 6-byte MACs.
    pub address: Option<[u8; 6]>,
    /// MTU (IFLA_MTU).
    pub mtu: Option<u32>,
    /// Underlying link index for stacked devices (IFLA_LINK).
    pub link: Option<u32>,
    /// Link kind info (IFLA_LINKINFO).
    pub link_info: Option<LinkInfo>,
}

/// Link type information from IFLA_LINKINFO.
#[derive(Debug, Clone, Default)]
pub struct LinkInfo {
    /// Link type kind (e.g. "vlan", "bridge").
    pub kind: Option<String>,
    /// Raw type-specific data (IFLA_INFO_DATA).
    pub data: Option<Vec<u8>>,
}

impl LinkInfo {
    /// Extract the VLAN ID from the type-specific data, if this is a VLAN.
    pub fn vlan_id(&self) -> Option<u16> {
        if self.kind.as_deref() != Some("vlan") {
            return None;
        }
        let data = self.data.as_deref()?;
        AttrIter::new(data)
            .find(|(kind, _)| *kind == vlan_ids::IFLA_VLAN_ID)
            .and_then(|(_, payload)| attr_u16(payload))
    }
}

impl LinkMessage {
    /// Get the interface index.
    ///
    /// Returned as `u32` since kernel link indices are always positive.
    pub fn ifindex(&self) -> u32 {
        self.header.ifi_index as u32
    }

    /// Get the interface flags.
    pub fn flags(&self) -> u32 {
        self.header.ifi_flags
    }

    /// Check if the interface is administratively up.
    pub fn is_up(&self) -> bool {
        self.header.ifi_flags & iff::UP != 0
    }

    /// Check if the lower layer is up.
    pub fn is_running(&self) -> bool {
        self.header.ifi_flags & iff::RUNNING != 0
    }

    /// Get the link type kind.
    pub fn kind(&self) -> Option<&str> {
        self.link_info.as_ref()?.kind.as_deref()
    }
}

impl FromNetlink for LinkMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(IfInfoMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        if input.len() < IfInfoMsg::SIZE {
            return cut();
        }
        let header_bytes: &[u8] = take(IfInfoMsg::SIZE).parse_next(input)?;
        let header = match IfInfoMsg::from_bytes(header_bytes) {
            Ok(h) => *h,
            Err(_) => return cut(),
        };

        let mut msg = LinkMessage {
            header,
            ..Default::default()
        };

        while input.len() >= 4 {
            let (attr_type, payload) = parse_attr(input)?;
            match attr_type {
                attr_ids::IFLA_IFNAME => msg.name = Some(attr_string(payload)),
                attr_ids::IFLA_ADDRESS => msg.address = attr_mac(payload),
                attr_ids::IFLA_MTU => msg.mtu = attr_u32(payload),
                attr_ids::IFLA_LINK => msg.link = attr_u32(payload),
                attr_ids::IFLA_LINKINFO => msg.link_info = Some(parse_link_info(payload)),
                _ => {}
            }
        }

        Ok(msg)
    }
}

/// Parse IFLA_LINKINFO nested attributes.
fn parse_link_info(data: &[u8]) -> LinkInfo {
    let mut info = LinkInfo::default();
    for (attr_type, payload) in AttrIter::new(data) {
        match attr_type {
            info_ids::IFLA_INFO_KIND => info.kind = Some(attr_string(payload)),
            info_ids::IFLA_INFO_DATA => info.data = Some(payload.to_vec()),
            _ => {}
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{NlAttr, nla_align};

    fn push_attr(buf: &mut Vec<u8>, attr_type: u16, payload: &[u8]) {
        buf.extend_from_slice(NlAttr::new(attr_type, payload.len()).as_bytes());
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
    }

    fn link_payload(index: i32, name: &str) -> Vec<u8> {
        let mut buf = IfInfoMsg::new().with_index(index).as_bytes().to_vec();
        let mut name_z = name.as_bytes().to_vec();
        name_z.push(0);
        push_attr(&mut buf, attr_ids::IFLA_IFNAME, &name_z);
        push_attr(&mut buf, attr_ids::IFLA_MTU, &1500u32.to_ne_bytes());
        push_attr(&mut buf, attr_ids::IFLA_ADDRESS, &[0x52, 0x54, 0, 1, 2, 3]);
        buf
    }

    #[test]
    fn test_parse_link() {
        let payload = link_payload(2, "eth0");
        let msg = LinkMessage::from_bytes(&payload).unwrap();
        assert_eq!(msg.ifindex(), 2);
        assert_eq!(msg.name.as_deref(), Some("eth0"));
        assert_eq!(msg.mtu, Some(1500));
        assert_eq!(msg.address, Some([0x52, 0x54, 0, 1, 2, 3]));
        assert!(msg.link_info.is_none());
    }

    #[test]
    fn test_parse_vlan_link_info() {
        let mut buf = IfInfoMsg::new().with_index(5).as_bytes().to_vec();

        let mut data = Vec::new();
        push_attr(&mut data, vlan_ids::IFLA_VLAN_ID, &100u16.to_ne_bytes());

        let mut info = Vec::new();
        push_attr(&mut info, info_ids::IFLA_INFO_KIND, b"vlan\0");
        push_attr(&mut info, info_ids::IFLA_INFO_DATA, &data);

        push_attr(&mut buf, attr_ids::IFLA_LINKINFO, &info);
        push_attr(&mut buf, attr_ids::IFLA_LINK, &2u32.to_ne_bytes());

        let msg = LinkMessage::from_bytes(&buf).unwrap();
        assert_eq!(msg.kind(), Some("vlan"));
        assert_eq!(msg.link, Some(2));
        assert_eq!(msg.link_info.unwrap().vlan_id(), Some(100));
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(LinkMessage::from_bytes(&[0u8; 4]).is_err());
    }
}
