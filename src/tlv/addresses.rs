//! The IPv6 addresses TLV: a packed list of full IPv6 addresses.

use core::fmt;
use std::net::Ipv6Addr;

/// Maximum number of addresses in a single registration request.
pub const IPV6_ADDRESSES_NUM_MAX: usize = 15;
/// Minimum number of addresses in a backbone notification.
pub const IPV6_ADDRESSES_NUM_MIN: usize = 1;

/// Size in bytes of a packed IPv6 address.
const ADDRESS_WIRE_SIZE: usize = 16;

/// An error returned when parsing a structurally invalid address list value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressListError {
    /// The value length is not a multiple of the address size.
    NotAligned,
    /// The list holds more than [`IPV6_ADDRESSES_NUM_MAX`] addresses.
    TooManyAddresses,
}

/// Parse the value of an IPv6 addresses TLV.
pub fn parse(value: &[u8]) -> Result<Vec<Ipv6Addr>, AddressListError> {
    if value.len() % ADDRESS_WIRE_SIZE != 0 {
        return Err(AddressListError::NotAligned);
    }
    if value.len() / ADDRESS_WIRE_SIZE > IPV6_ADDRESSES_NUM_MAX {
        return Err(AddressListError::TooManyAddresses);
    }

    Ok(value
        .chunks_exact(ADDRESS_WIRE_SIZE)
        .map(|chunk| {
            Ipv6Addr::from(<[u8; ADDRESS_WIRE_SIZE]>::try_from(chunk).expect(
                "Chunks of an exact chunk iterator have the requested size; qed",
            ))
        })
        .collect())
}

/// Append a whole IPv6 addresses TLV, header included, to a payload under construction.
pub fn append(dst: &mut bytes::BytesMut, addresses: &[Ipv6Addr]) {
    debug_assert!(addresses.len() <= IPV6_ADDRESSES_NUM_MAX);
    let mut value = Vec::with_capacity(addresses.len() * ADDRESS_WIRE_SIZE);
    for address in addresses {
        value.extend_from_slice(&address.octets());
    }
    super::append(dst, super::IPV6_ADDRESSES, &value);
}

impl fmt::Display for AddressListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressListError::NotAligned => {
                "Address list length is not a multiple of the address size"
            }
            AddressListError::TooManyAddresses => "Too many addresses in a single list",
        })
    }
}

impl std::error::Error for AddressListError {}
