//! A dedicated IPv6 subnet module.
//!
//! The standard library exposes [`Ipv6Addr`](std::net::Ipv6Addr), but no type to represent a
//! prefix of the IPv6 address space. This module is not meant to fully support subnets, but only
//! the subset needed by the registration code: the domain unicast prefix and the mesh local
//! prefix are both IPv6 prefixes against which addresses are matched.

use core::fmt;
use std::{net::Ipv6Addr, str::FromStr};

use ipnet::Ipv6Net;

/// Representation of an IPv6 subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Subnet {
    inner: Ipv6Net,
}

/// An error returned when creating a new [`Ipv6Subnet`] with an invalid prefix length.
///
/// The max prefix length for IPv6 is 128.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixLenError;

impl Ipv6Subnet {
    /// Create a new `Ipv6Subnet` from the given [`Ipv6Addr`] and prefix length.
    pub fn new(addr: Ipv6Addr, prefix_len: u8) -> Result<Ipv6Subnet, PrefixLenError> {
        Ok(Self {
            inner: Ipv6Net::new(addr, prefix_len).map_err(|_| PrefixLenError)?,
        })
    }

    /// Returns the size of the prefix in bits.
    pub fn prefix_len(&self) -> u8 {
        self.inner.prefix_len()
    }

    /// Returns the address used to construct this `Ipv6Subnet`.
    pub fn address(&self) -> Ipv6Addr {
        self.inner.addr()
    }

    /// Returns the network part of the `Ipv6Subnet`. All non prefix bits are set to 0.
    pub fn network(&self) -> Ipv6Addr {
        self.inner.network()
    }

    /// Checks if this `Ipv6Subnet` contains the provided [`Ipv6Addr`].
    ///
    /// # Examples
    ///
    /// ```
    /// use meshbbr::subnet::Ipv6Subnet;
    /// use std::net::Ipv6Addr;
    ///
    /// let subnet = Ipv6Subnet::new(Ipv6Addr::new(0xfd12, 0x3456, 0, 0, 0, 0, 0, 0), 64).unwrap();
    ///
    /// assert!(subnet.contains(Ipv6Addr::new(0xfd12, 0x3456, 0, 0, 1, 2, 3, 4)));
    /// assert!(!subnet.contains(Ipv6Addr::new(0xfd12, 0x3457, 0, 0, 1, 2, 3, 4)));
    /// ```
    pub fn contains(&self, ip: Ipv6Addr) -> bool {
        self.inner.contains(&ip)
    }
}

impl FromStr for Ipv6Subnet {
    type Err = PrefixLenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            inner: Ipv6Net::from_str(s).map_err(|_| PrefixLenError)?,
        })
    }
}

impl fmt::Display for Ipv6Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl fmt::Display for PrefixLenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid IPv6 subnet")
    }
}

impl std::error::Error for PrefixLenError {}
