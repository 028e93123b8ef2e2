//! Lookup of the mesh router currently serving an address.

use std::net::Ipv6Addr;

/// Resolves an on-mesh address to the routing locator of the device serving
/// it, if the address is known to be attached to the mesh.
pub trait AddressResolver: Send + Sync {
    /// Routing locator of the device serving `address`, or `None` if the
    /// address is not known on the mesh.
    fn resolve(&self, address: Ipv6Addr) -> Option<u16>;
}

/// An [`AddressResolver`] which never finds an address on the mesh.
pub struct NoResolve;

impl AddressResolver for NoResolve {
    fn resolve(&self, _address: Ipv6Addr) -> Option<u16> {
        None
    }
}
