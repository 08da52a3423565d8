//! Strongly-typed route message.

use std::net::IpAddr;

use winnow::prelude::*;
use winnow::token::take;

use crate::netlink::parse::{FromNetlink, PResult, attr_ip, attr_u32, cut, parse_attr};
use crate::netlink::types::route::RtMsg;

/// Attribute IDs for RTA_* constants.
mod attr_ids {
    pub const RTA_DST: u16 = 1;
    pub const RTA_OIF: u16 = 4;
    pub const RTA_GATEWAY: u16 = 5;
}

/// Strongly-typed route message with the attributes this daemon consumes.
#[derive(Debug, Clone, Default)]
pub struct RouteMessage {
    /// Fixed-size header.
    pub header: RtMsg,
    /// Destination address (RTA_DST).
    pub destination: Option<IpAddr>,
    /// Output interface index (RTA_OIF).
    pub oif: Option<u32>,
    /// Gateway address (RTA_GATEWAY).
    pub gateway: Option<IpAddr>,
}

impl RouteMessage {
    /// Get the destination prefix length.
    pub fn dst_len(&self) -> u8 {
        self.header.rtm_dst_len
    }

    /// Check if this is a default route (0.0.0.0/0 or ::/0).
    pub fn is_default(&self) -> bool {
        self.header.rtm_dst_len == 0 && self.destination.is_none()
    }
}

impl FromNetlink for RouteMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(RtMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        if input.len() < RtMsg::SIZE {
            return cut();
        }
        let header_bytes: &[u8] = take(RtMsg::SIZE).parse_next(input)?;
        let header = match RtMsg::from_bytes(header_bytes) {
            Ok(h) => *h,
            Err(_) => return cut(),
        };

        let mut msg = RouteMessage {
            header,
            ..Default::default()
        };

        while input.len() >= 4 {
            let (attr_type, payload) = parse_attr(input)?;
            match attr_type {
                attr_ids::RTA_DST => msg.destination = attr_ip(payload, header.rtm_family),
                attr_ids::RTA_OIF => msg.oif = attr_u32(payload),
                attr_ids::RTA_GATEWAY => msg.gateway = attr_ip(payload, header.rtm_family),
                _ => {}
            }
        }

        Ok(msg)
    }
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

    #[test]
    fn test_parse_default_route() {
        let mut header = RtMsg::new();
        header.rtm_family = libc::AF_INET as u8;

        let mut buf = header.as_bytes().to_vec();
        push_attr(&mut buf, attr_ids::RTA_GATEWAY, &[192, 168, 1, 1]);
        push_attr(&mut buf, attr_ids::RTA_OIF, &2u32.to_ne_bytes());

        let msg = RouteMessage::from_bytes(&buf).unwrap();
        assert!(msg.is_default());
        assert_eq!(msg.gateway, Some("192.168.1.1".parse().unwrap()));
        assert_eq!(msg.oif, Some(2));
    }

    #[test]
    fn test_prefixed_route_is_not_default() {
        let mut header = RtMsg::new();
        header.rtm_family = libc::AF_INET as u8;
        header.rtm_dst_len = 24;

        let mut buf = header.as_bytes().to_vec();
        push_attr(&mut buf, attr_ids::RTA_DST, &[10, 1, 2, 0]);

        let msg = RouteMessage::from_bytes(&buf).unwrap();
        assert!(!msg.is_default());
    }
}
