//! Strongly-typed neighbor message.

use std::net::IpAddr;

use winnow::prelude::*;
use winnow::token::take;

use crate::netlink::parse::{FromNetlink, PResult, attr_ip, attr_mac, cut, parse_attr};
use crate::netlink::types::neigh::{NdMsg, nud};

/// Attribute IDs for NDA_* constants.
mod attr_ids {
    pub const NDA_DST: u16 = 1;
    pub const NDA_LLADDR: u16 = 2;
}

/// Strongly-typed neighbor message with the attributes this daemon consumes.
#[derive(Debug, Clone, Default)]
pub struct NeighborMessage {
    /// Fixed-size header.
    pub header: NdMsg,
    /// Destination address (NDA_DST).
    pub destination: Option<IpAddr>,
    /// Link-layer address (NDA_LLADDR), kept only for 6-byte MACs.
    pub lladdr: Option<[u8; 6]>,
}

impl NeighborMessage {
    /// Get the interface index.
    pub fn ifindex(&self) -> u32 {
        self.header.ndm_ifindex as u32
    }

    /// Get the raw neighbor state bits.
    pub fn state(&self) -> u16 {
        self.header.ndm_state
    }

    /// Check if this entry was statically configured.
    pub fn is_permanent(&self) -> bool {
        self.header.ndm_state & nud::PERMANENT != 0
    }
}

impl FromNetlink for NeighborMessage {
    fn write_dump_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(NdMsg::new().as_bytes());
    }

    fn parse(input: &mut &[u8]) -> PResult<Self> {
        if input.len() < NdMsg::SIZE {
            return cut();
        }
        let header_bytes: &[u8] = take(NdMsg::SIZE).parse_next(input)?;
        let header = match NdMsg::from_bytes(header_bytes) {
            Ok(h) => *h,
            Err(_) => return cut(),
        };

        let mut msg = NeighborMessage {
            header,
            ..Default::default()
        };

        while input.len() >= 4 {
            let (attr_type, payload) = parse_attr(input)?;
            match attr_type {
                attr_ids::NDA_DST => msg.destination = attr_ip(payload, header.ndm_family),
                attr_ids::NDA_LLADDR => msg.lladdr = attr_mac(payload),
                _ => {}
            }
        }

        Ok(msg)
    }
}
