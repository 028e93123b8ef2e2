//! Table of registered multicast listeners with per-entry expiry.

use core::fmt;
use std::collections::HashMap;
use std::net::Ipv6Addr;

use tokio::time::Instant;

/// Maximum amount of multicast listeners tracked at the same time.
pub const MULTICAST_LISTENERS_MAX: usize = 75;

/// An error returned when a listener can't be added to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRegistrationError {
    /// The address is not multicast, or its scope is too small to track.
    InvalidAddress,
    /// The table is full.
    NoResources,
}

/// Tracks multicast listener registrations and the moment they expire.
///
/// Only addresses with a scope larger than realm-local are tracked, smaller
/// scopes never cross the backbone link.
pub struct MulticastListeners {
    entries: HashMap<Ipv6Addr, Instant>,
    max_entries: usize,
}

impl MulticastListeners {
    /// Create a new, empty [`MulticastListeners`] table.
    pub fn new() -> Self {
        Self::with_capacity(MULTICAST_LISTENERS_MAX)
    }

    /// Create a new table holding at most `max_entries` listeners.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }

    /// Add a listener which expires at the given moment, refreshing the expiry
    /// if the address is already tracked.
    pub fn add(
        &mut self,
        address: Ipv6Addr,
        expires: Instant,
    ) -> Result<(), ListenerRegistrationError> {
        // Scope is the low nibble of the second octet.
        if !address.is_multicast() || address.octets()[1] & 0x0f <= 3 {
            return Err(ListenerRegistrationError::InvalidAddress);
        }

        if let Some(entry) = self.entries.get_mut(&address) {
            *entry = expires;
            return Ok(());
        }

        if self.entries.len() >= self.max_entries {
            return Err(ListenerRegistrationError::NoResources);
        }

        self.entries.insert(address, expires);
        Ok(())
    }

    /// Remove a listener. Removing an unknown address is not an error.
    pub fn remove(&mut self, address: &Ipv6Addr) {
        self.entries.remove(address);
    }

    /// Remove all listeners whose expiry is not after `now`, returning the
    /// amount of entries removed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires| *expires > now);
        before - self.entries.len()
    }

    /// Check if an address is currently registered.
    pub fn contains(&self, address: &Ipv6Addr) -> bool {
        self.entries.contains_key(address)
    }

    /// Expiry time of a registered listener, if present.
    pub fn expires_at(&self, address: &Ipv6Addr) -> Option<Instant> {
        self.entries.get(address).copied()
    }

    /// Amount of listeners currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no listeners are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every tracked listener.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for MulticastListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListenerRegistrationError::InvalidAddress => {
                "Address is not a multicast address of sufficient scope"
            }
            ListenerRegistrationError::NoResources => "Multicast listener table is full",
        })
    }
}

impl std::error::Error for ListenerRegistrationError {}
