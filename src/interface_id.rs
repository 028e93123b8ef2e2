//! The 64 bit interface identifier part of an IPv6 address.
//!
//! Registrations key on interface identifiers rather than full addresses: the domain prefix part
//! of a domain unicast address is common to every registered address, and the mesh local
//! identifier of the registering node is only ever communicated as a bare identifier.

use core::fmt;
use std::net::Ipv6Addr;

/// The fixed first 6 bytes of an interface identifier which encodes a routing locator.
const ROUTING_LOCATOR_PREFIX: [u8; 6] = [0x00, 0x00, 0x00, 0xff, 0xfe, 0x00];

/// The interface identifier of an IPv6 address, i.e. the last 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId([u8; 8]);

impl InterfaceId {
    /// Size in bytes of an `InterfaceId`.
    pub const BYTE_SIZE: usize = 8;

    /// Create the `InterfaceId` which encodes the given routing locator.
    pub fn from_locator(locator: u16) -> Self {
        let mut bytes = [0; Self::BYTE_SIZE];
        bytes[..6].copy_from_slice(&ROUTING_LOCATOR_PREFIX);
        bytes[6..].copy_from_slice(&locator.to_be_bytes());
        Self(bytes)
    }

    /// View this `InterfaceId` as a byte slice.
    pub fn as_bytes(&self) -> &[u8; Self::BYTE_SIZE] {
        &self.0
    }

    /// Checks if this `InterfaceId` encodes a routing locator (`0000:00ff:fe00:xxxx`).
    pub fn is_routing_locator(&self) -> bool {
        self.0[..6] == ROUTING_LOCATOR_PREFIX
    }

    /// The routing locator encoded in this `InterfaceId`. Only meaningful if
    /// [`is_routing_locator`](Self::is_routing_locator) holds.
    pub fn locator(&self) -> u16 {
        u16::from_be_bytes([self.0[6], self.0[7]])
    }

    /// Checks if every bit of this `InterfaceId` is zero.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; Self::BYTE_SIZE]
    }
}

impl From<Ipv6Addr> for InterfaceId {
    fn from(addr: Ipv6Addr) -> Self {
        let mut bytes = [0; Self::BYTE_SIZE];
        bytes.copy_from_slice(&addr.octets()[8..]);
        Self(bytes)
    }
}

impl From<[u8; InterfaceId::BYTE_SIZE]> for InterfaceId {
    fn from(bytes: [u8; InterfaceId::BYTE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&faster_hex::hex_string(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use super::InterfaceId;

    #[test]
    fn extract_from_address() {
        let iid = InterfaceId::from(Ipv6Addr::new(0xfd00, 0, 0, 0, 0x1122, 0x3344, 0x5566, 0x7788));
        assert_eq!(
            iid.as_bytes(),
            &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
    }

    #[test]
    fn routing_locator_detection() {
        let rloc = InterfaceId::from(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0xff, 0xfe00, 0x2c00));
        assert!(rloc.is_routing_locator());
        assert_eq!(rloc.locator(), 0x2c00);

        let eid = InterfaceId::from(Ipv6Addr::new(0xfd00, 0, 0, 0, 0x1122, 0x3344, 0x5566, 0x7788));
        assert!(!eid.is_routing_locator());
    }

    #[test]
    fn locator_roundtrip() {
        let iid = InterfaceId::from_locator(0x9c01);
        assert!(iid.is_routing_locator());
        assert_eq!(iid.locator(), 0x9c01);
    }

    #[test]
    fn unspecified() {
        assert!(InterfaceId::from([0; 8]).is_unspecified());
        assert!(!InterfaceId::from_locator(0x2c00).is_unspecified());
    }
}
