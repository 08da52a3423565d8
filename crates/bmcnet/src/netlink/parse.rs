//! Parser combinators and traits for strongly-typed netlink message decoding.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use super::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = std::result::Result<T, winnow::error::ErrMode<ContextError>>;

/// Trait for message types that can be parsed from netlink wire format.
pub trait FromNetlink: Sized {
    /// Parse from a mutable byte slice reference, advancing past the
    /// consumed bytes.
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from a complete payload.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse
            .parse(data)
            .map_err(|e| Error::Decode(e.to_string()))
    }

    /// Write the fixed header required for a dump request of this type.
    fn write_dump_header(buf: &mut Vec<u8>);
}

/// Cut the parse with a context error.
pub(crate) fn cut<T>() -> PResult<T> {
    Err(winnow::error::ErrMode::Cut(ContextError::new()))
}

/// Parse one attribute (type without flags, payload), consuming padding.
pub fn parse_attr<'a>(input: &mut &'a [u8]) -> PResult<(u16, &'a [u8])> {
    let len_bytes: &[u8] = take(2usize).parse_next(input)?;
    let len = u16::from_ne_bytes(len_bytes.try_into().unwrap()) as usize;
    let type_bytes: &[u8] = take(2usize).parse_next(input)?;
    let attr_type = u16::from_ne_bytes(type_bytes.try_into().unwrap());

    if len < 4 {
        return cut();
    }

    let payload_len = len - 4;
    if input.len() < payload_len {
        return cut();
    }
    let payload: &[u8] = take(payload_len).parse_next(input)?;

    // Consume alignment padding
    let padding = ((len + 3) & !3) - len;
    if input.len() >= padding {
        let _: &[u8] = take(padding).parse_next(input)?;
    }

    Ok((attr_type & 0x3FFF, payload))
}

/// Extract a native-endian u32 from an attribute payload.
pub fn attr_u32(data: &[u8]) -> Option<u32> {
    (data.len() >= 4).then(|| u32::from_ne_bytes(data[..4].try_into().unwrap()))
}

/// Extract a native-endian u16 from an attribute payload.
pub fn attr_u16(data: &[u8]) -> Option<u16> {
    (data.len() >= 2).then(|| u16::from_ne_bytes(data[..2].try_into().unwrap()))
}

/// Extract a null-terminated string from an attribute payload.
pub fn attr_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Extract a 6-byte hardware address from an attribute payload.
pub fn attr_mac(data: &[u8]) -> Option<[u8; 6]> {
    data.try_into().ok()
}

/// Extract an IP address from an attribute payload, discriminated by the
/// message's address family.
pub fn attr_ip(data: &[u8], family: u8) -> Option<IpAddr> {
    match i32::from(family) {
        libc::AF_INET => {
            let octets: [u8; 4] = data.get(..4)?.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        libc::AF_INET6 => {
            let octets: [u8; 16] = data.get(..16)?.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}
