//! This crate implements a Backbone Router registration service for a
//! low-power IPv6 mesh. Devices on the mesh register multicast listener
//! interest and domain unicast addresses through this router, which bridges
//! the mesh to an external backbone network. Successful multicast
//! registrations are re-announced to the other backbone routers, and
//! registered unicast addresses are tracked in a neighbor discovery proxy
//! table so the router can answer for them on the backbone.

use std::io;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::dataset::DatasetHandle;
use crate::manager::Manager;
use crate::proxy_table::NdProxyTable;
use crate::resolver::AddressResolver;
use crate::role::RoleState;
use crate::tmf::{UdpBackboneTmf, UdpMeshTmf};

pub mod coap;
pub mod dataset;
pub mod hooks;
pub mod interface_id;
pub mod manager;
pub mod multicast_table;
pub mod proxy_table;
pub mod resolver;
pub mod role;
pub mod subnet;
pub mod tlv;
pub mod tmf;

/// Resource path of a multicast listener registration request.
pub const MLR_URI_PATH: &str = "n/mr";
/// Resource path of a domain unicast address registration request.
pub const DUA_URI_PATH: &str = "n/dr";
/// Resource path of a backbone multicast listener notification.
pub const BACKBONE_MLR_URI_PATH: &str = "b/bmr";
/// UDP port backbone routers listen on.
pub const BACKBONE_UDP_PORT: u16 = 61631;
/// Hop limit of backbone notifications, which must stay on the backbone link.
pub const BACKBONE_HOP_LIMIT: u8 = 1;

/// Configuration for a new [`BackboneRouter`].
pub struct Config {
    /// Address to bind the mesh-facing management socket to.
    pub mesh_bind_addr: SocketAddrV6,
    /// Address to bind the backbone-facing socket to while enabled.
    pub backbone_bind_addr: SocketAddrV6,
    /// Live network configuration.
    pub dataset: DatasetHandle,
    /// Role transitions driving the manager lifecycle.
    pub role: watch::Receiver<RoleState>,
    /// Lookup of the router currently serving a mesh address.
    pub resolver: Arc<dyn AddressResolver>,
}

/// A running backbone router: the UDP transports plus the registration
/// manager driving them.
pub struct BackboneRouter {
    manager: Manager,
}

impl BackboneRouter {
    /// Bind the transports and spawn the registration manager.
    pub async fn new(config: Config) -> Result<Self, io::Error> {
        let mesh = Arc::new(UdpMeshTmf::bind(config.mesh_bind_addr).await?);
        let backbone = Arc::new(UdpBackboneTmf::new(
            config.backbone_bind_addr,
            BACKBONE_HOP_LIMIT,
        ));

        let (manager, requests) = Manager::new(
            mesh,
            backbone,
            config.dataset,
            config.role,
            config.resolver,
        );
        tokio::spawn(manager.clone().run(requests));

        info!("Backbone router started");
        Ok(Self { manager })
    }

    /// Check if a packet for an unresolvable domain unicast destination
    /// should be handed to the backbone rather than dropped.
    pub fn should_forward_dua_to_backbone(&self, address: Ipv6Addr) -> bool {
        self.manager.should_forward_dua_to_backbone(address)
    }

    /// Handle to the neighbor discovery proxy table.
    pub fn nd_proxies(&self) -> NdProxyTable {
        self.manager.nd_proxies()
    }

    /// Amount of multicast listeners currently registered.
    pub fn multicast_listener_count(&self) -> usize {
        self.manager.multicast_listener_count()
    }
}
