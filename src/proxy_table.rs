//! Table of neighbor discovery proxy entries for domain unicast addresses.

use core::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::interface_id::InterfaceId;

/// Maximum amount of neighbor discovery proxy entries tracked at the same time.
pub const ND_PROXY_ENTRIES_MAX: usize = 250;

/// An error returned when a proxy entry can't be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRegistrationError {
    /// The target is already proxied on behalf of a different device.
    Duplicate,
    /// The table is full.
    NoResources,
}

/// A single neighbor discovery proxy entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdProxyEntry {
    /// Mesh-local interface identifier of the device owning the address.
    pub ml_iid: InterfaceId,
    /// Routing locator of the router the registration came through.
    pub rloc16: u16,
    /// Seconds since the owning device last communicated, at registration time.
    pub last_transaction_time: Option<u32>,
    /// Moment the entry was registered or last refreshed.
    pub registered: Instant,
}

/// Tracks which domain unicast address interface identifiers are proxied,
/// and for which device.
///
/// Cloning is cheap, all clones operate on the same table.
#[derive(Clone)]
pub struct NdProxyTable {
    entries: Arc<DashMap<InterfaceId, NdProxyEntry, ahash::RandomState>>,
    max_entries: usize,
}

impl NdProxyTable {
    /// Create a new, empty [`NdProxyTable`].
    pub fn new() -> Self {
        Self::with_capacity(ND_PROXY_ENTRIES_MAX)
    }

    /// Create a new table holding at most `max_entries` proxies.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::with_hasher(ahash::RandomState::new())),
            max_entries,
        }
    }

    /// Register a proxy for the target interface identifier on behalf of the
    /// device identified by `ml_iid`.
    ///
    /// A registration from the same device refreshes the entry. A registration
    /// from a different device is rejected as a duplicate.
    pub fn register(
        &self,
        target_iid: InterfaceId,
        ml_iid: InterfaceId,
        rloc16: u16,
        last_transaction_time: Option<u32>,
    ) -> Result<(), ProxyRegistrationError> {
        // Don't call len() while holding an entry guard, that deadlocks.
        if let Some(mut entry) = self.entries.get_mut(&target_iid) {
            if entry.ml_iid != ml_iid {
                return Err(ProxyRegistrationError::Duplicate);
            }
            entry.rloc16 = rloc16;
            entry.last_transaction_time = last_transaction_time;
            entry.registered = Instant::now();
            return Ok(());
        }

        if self.entries.len() >= self.max_entries {
            return Err(ProxyRegistrationError::NoResources);
        }

        self.entries.insert(
            target_iid,
            NdProxyEntry {
                ml_iid,
                rloc16,
                last_transaction_time,
                registered: Instant::now(),
            },
        );
        Ok(())
    }

    /// Check if a target interface identifier is currently proxied.
    pub fn is_registered(&self, target_iid: &InterfaceId) -> bool {
        self.entries.contains_key(target_iid)
    }

    /// Get a copy of the proxy entry for a target, if present.
    pub fn get(&self, target_iid: &InterfaceId) -> Option<NdProxyEntry> {
        self.entries.get(target_iid).map(|entry| entry.clone())
    }

    /// Remove a proxy entry. Removing an unknown target is not an error.
    pub fn remove(&self, target_iid: &InterfaceId) {
        self.entries.remove(target_iid);
    }

    /// Amount of proxies currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no proxies are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every tracked proxy.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for NdProxyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProxyRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyRegistrationError::Duplicate => {
                "Target is already proxied for a different device"
            }
            ProxyRegistrationError::NoResources => "Neighbor discovery proxy table is full",
        })
    }
}

impl std::error::Error for ProxyRegistrationError {}

#[cfg(test)]
mod tests {
    use crate::interface_id::InterfaceId;

    use super::{NdProxyTable, ProxyRegistrationError};

    fn iid(tail: u8) -> InterfaceId {
        InterfaceId::from([0, 1, 2, 3, 4, 5, 6, tail])
    }

    #[tokio::test]
    async fn register_and_refresh_same_device() {
        let table = NdProxyTable::new();
        table
            .register(iid(1), iid(0xaa), 0x2000, Some(10))
            .expect("Empty table accepts a registration; qed");
        table
            .register(iid(1), iid(0xaa), 0x2400, Some(20))
            .expect("Same device refreshes its own entry; qed");

        let entry = table.get(&iid(1)).expect("Entry is present; qed");
        assert_eq!(entry.rloc16, 0x2400);
        assert_eq!(entry.last_transaction_time, Some(20));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn rejects_registration_from_different_device() {
        let table = NdProxyTable::new();
        table
            .register(iid(1), iid(0xaa), 0x2000, Some(10))
            .expect("Empty table accepts a registration; qed");
        assert_eq!(
            table.register(iid(1), iid(0xbb), 0x2000, Some(10)),
            Err(ProxyRegistrationError::Duplicate)
        );
        // Original registration is untouched.
        assert_eq!(
            table.get(&iid(1)).expect("Entry is present; qed").ml_iid,
            iid(0xaa)
        );
    }

    #[tokio::test]
    async fn full_table_rejects_new_targets() {
        let table = NdProxyTable::with_capacity(1);
        table
            .register(iid(1), iid(0xaa), 0x2000, None)
            .expect("Empty table accepts a registration; qed");
        assert_eq!(
            table.register(iid(2), iid(0xbb), 0x2000, None),
            Err(ProxyRegistrationError::NoResources)
        );
        // Refreshing the existing entry still works.
        table
            .register(iid(1), iid(0xaa), 0x2000, Some(5))
            .expect("Refresh of existing entry bypasses the capacity check; qed");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let table = NdProxyTable::new();
        table
            .register(iid(1), iid(0xaa), 0x2000, None)
            .expect("Empty table accepts a registration; qed");
        table.remove(&iid(1));
        table.remove(&iid(1));
        assert!(table.is_empty());
    }
}
