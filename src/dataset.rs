//! Handle to the operational network dataset.
//!
//! The dataset is owned and written by the network management layer; the registration code only
//! ever reads it. It is shared as an [`ArcSwap`] so readers always observe the most recent
//! publication without locking, and so a reconfiguration (e.g. a new commissioner session, or a
//! changed domain prefix) is picked up by the very next request.

use std::{net::Ipv6Addr, sync::Arc};

use arc_swap::ArcSwap;

use crate::subnet::Ipv6Subnet;

/// Default multicast listener registration timeout in seconds, used when a request does not
/// carry its own timeout.
pub const DEFAULT_MLR_TIMEOUT: u32 = 3600;

/// Shared, live-updatable handle to the current [`Dataset`].
pub type DatasetHandle = Arc<ArcSwap<Dataset>>;

/// The subset of the operational dataset the registration manager cares about.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Timeout in seconds for multicast listener registrations which don't specify one.
    pub mlr_timeout: u32,
    /// Session id of the currently registered commissioner, if any.
    pub commissioner_session_id: Option<u16>,
    /// The domain unicast prefix. Addresses outside this prefix can't be registered.
    pub domain_prefix: Option<Ipv6Subnet>,
    /// The routing locator of this device.
    pub rloc16: u16,
    /// The all-network-backbone-routers multicast group, scoped to the backbone link.
    pub all_network_bbrs: Ipv6Addr,
}

impl Dataset {
    /// Wrap a `Dataset` in a shareable [`DatasetHandle`].
    pub fn into_handle(self) -> DatasetHandle {
        Arc::new(ArcSwap::from_pointee(self))
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            mlr_timeout: DEFAULT_MLR_TIMEOUT,
            commissioner_session_id: None,
            domain_prefix: None,
            rloc16: 0,
            // Realm scoped group; deployments derive this from the mesh local prefix.
            all_network_bbrs: Ipv6Addr::new(0xff32, 0x40, 0, 0, 0, 0, 0, 0x3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Dataset;

    #[test]
    fn handle_observes_updates() {
        let handle = Dataset::default().into_handle();
        assert_eq!(handle.load().mlr_timeout, super::DEFAULT_MLR_TIMEOUT);

        handle.store(std::sync::Arc::new(Dataset {
            mlr_timeout: 60,
            ..Dataset::default()
        }));
        assert_eq!(handle.load().mlr_timeout, 60);
    }
}
