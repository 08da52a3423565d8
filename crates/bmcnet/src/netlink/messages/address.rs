//! Strongly-typed address message.

use std::net::IpAddr;

use winnow::prelude::*;
use winnow::token::take;

use crate::netlink::parse::{FromNetlink, PResult, attr_ip, attr_u32, cut, parse_attr};
use crate::netlink::types::addr::IfAddrMsg;

/// Attribute IDs for IFA_* constants.
mod attr_ids {
    pub const IFA_ADDRESS: u16 = 1;
    pub const IFA_LOCAL: u16 = 2;
    pub const IFA_FLAGS: u16 = 8;
}

/// Strongly-typed address message with the attributes this daemon consumes.
#[derive(Debug, Clone, Default)]
pub struct AddressMessage {
    /// Fixed-size header.
    pub header: IfAddrMsg,
    /// Address (IFA_ADDRESS).
    pub address: Option<IpAddr>,
    /// Local address (IFA_LOCAL); the authoritative address on
    /// point-to-point links.
    pub local: Option<IpAddr>,
    /// Extended flags (IFA_FLAGS), superseding the header byte.
    pub flags: Option<u32>,
}

impl AddressMessage {
    /// Get the interface index.
    pub fn ifindex(&self) -> u32 {
        self.header.ifa_index
    }

    /// Get the prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.header.ifa_prefixlen
    }

    /// Get the address scope.
    pub fn scope(&self) -> u8 {
        self.header.ifa_scope
    }

    /// Effective address flags: IFA_FLAGS when present, otherwise the
    /// legacy header byte.
    pub fn effective_flags(&self) -> u32 {
        self.flags.unwrap_or(u32::from(self.header.ifa_flags))
    }

    /// The address this message is about (local when present).
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.local.or(self.address)
    }
}

impl FromNetlink for AddressMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(IfAddrMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        if input.len() < IfAddrMsg::SIZE {
            return cut();
        }
        let header_bytes: &[u8] = take(IfAddrMsg::SIZE).parse_next(input)?;
        let header = match IfAddrMsg::from_bytes(header_bytes) {
            Ok(h) => *h,
            Err(_) => return cut(),
        };

        let mut msg = AddressMessage {
            header,
            ..Default::default()
        };

        while input.len() >= 4 {
            let (attr_type, payload) = parse_attr(input)?;
            match attr_type {
                attr_ids::IFA_ADDRESS => msg.address = attr_ip(payload, header.ifa_family),
                attr_ids::IFA_LOCAL => msg.local = attr_ip(payload, header.ifa_family),
                attr_ids::IFA_FLAGS => msg.flags = attr_u32(payload),
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
    use crate::netlink::types::addr::ifa_flags;

    fn push_attr(buf: &mut Vec<u8>, attr_type: u16, payload: &[u8]) {
        buf.extend_from_slice(NlAttr::new(attr_type, payload.len()).as_bytes());
        buf.extend_from_slice(payload);
        buf.resize(nla_align(buf.len()), 0);
    }

    #[test]
    fn test_parse_ipv4_address() {
        let mut header = IfAddrMsg::new().with_index(2);
        header.ifa_family = libc::AF_INET as u8;
        header.ifa_prefixlen = 24;

        let mut buf = header.as_bytes().to_vec();
        push_attr(&mut buf, attr_ids::IFA_ADDRESS, &[192, 168, 1, 5]);
        push_attr(
            &mut buf,
            attr_ids::IFA_FLAGS,
            &ifa_flags::PERMANENT.to_ne_bytes(),
        );

        let msg = AddressMessage::from_bytes(&buf).unwrap();
        assert_eq!(msg.ifindex(), 2);
        assert_eq!(msg.prefix_len(), 24);
        assert_eq!(
            msg.primary_address(),
            Some("192.168.1.5".parse().unwrap())
        );
        assert_eq!(msg.effective_flags(), ifa_flags::PERMANENT);
    }

    #[test]
    fn test_local_preferred_over_address() {
        let mut header = IfAddrMsg::new().with_index(3);
        header.ifa_family = libc::AF_INET as u8;

        let mut buf = header.as_bytes().to_vec();
        push_attr(&mut buf, attr_ids::IFA_ADDRESS, &[10, 0, 0, 2]);
        push_attr(&mut buf, attr_ids::IFA_LOCAL, &[10, 0, 0, 1]);

        let msg = AddressMessage::from_bytes(&buf).unwrap();
        assert_eq!(msg.primary_address(), Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_legacy_flags_byte() {
        let mut header = IfAddrMsg::new();
        header.ifa_flags = ifa_flags::DEPRECATED as u8;

        let msg = AddressMessage::from_bytes(header.as_bytes()).unwrap();
        assert_eq!(msg.effective_flags(), ifa_flags::DEPRECATED);
    }
}
