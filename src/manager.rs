//! The registration manager, which owns the listener tables and drives the
//! registration protocol on both the mesh and backbone interfaces.

use core::fmt;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::coap::Message;
use crate::dataset::DatasetHandle;
use crate::hooks::{NoOverrides, ResponseOverrides};
use crate::interface_id::InterfaceId;
use crate::multicast_table::{ListenerRegistrationError, MulticastListeners};
use crate::proxy_table::{NdProxyTable, ProxyRegistrationError};
use crate::resolver::AddressResolver;
use crate::role::RoleState;
use crate::tlv::{self, AddressListError, DuaStatus, MlrStatus};
use crate::tmf::{BackboneTransport, MeshTransport, MessageInfo};
use crate::{
    BACKBONE_HOP_LIMIT, BACKBONE_MLR_URI_PATH, BACKBONE_UDP_PORT, DUA_URI_PATH, MLR_URI_PATH,
};

/// Cadence of the multicast listener expiry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
/// Smallest multicast listener timeout we hand out, in seconds.
pub const MLR_TIMEOUT_MIN: u32 = 300;
/// Largest multicast listener timeout we hand out, in seconds.
pub const MLR_TIMEOUT_MAX: u32 = 2_147_483;

/// The registration manager. It validates inbound registration requests,
/// applies them to the listener tables, answers on the mesh interface and
/// re-announces successful multicast registrations on the backbone.
///
/// The manager is a cheap handle, all clones share the same tables.
pub struct Manager<O = NoOverrides> {
    multicast_listeners: Arc<RwLock<MulticastListeners>>,
    nd_proxies: NdProxyTable,
    mesh: Arc<dyn MeshTransport>,
    backbone: Arc<dyn BackboneTransport>,
    dataset: DatasetHandle,
    role: watch::Receiver<RoleState>,
    resolver: Arc<dyn AddressResolver>,
    overrides: Arc<O>,
    request_tx: mpsc::UnboundedSender<(Message, MessageInfo)>,
}

impl Manager {
    /// Create a new [`Manager`] and the receiving end of its request channel,
    /// to be passed to [`Manager::run`].
    pub fn new(
        mesh: Arc<dyn MeshTransport>,
        backbone: Arc<dyn BackboneTransport>,
        dataset: DatasetHandle,
        role: watch::Receiver<RoleState>,
        resolver: Arc<dyn AddressResolver>,
    ) -> (Self, mpsc::UnboundedReceiver<(Message, MessageInfo)>) {
        Self::with_overrides(mesh, backbone, dataset, role, resolver, NoOverrides)
    }
}

impl<O> Manager<O>
where
    O: ResponseOverrides,
{
    /// Create a new [`Manager`] with the given [`ResponseOverrides`] consulted
    /// before every registration is processed.
    pub fn with_overrides(
        mesh: Arc<dyn MeshTransport>,
        backbone: Arc<dyn BackboneTransport>,
        dataset: DatasetHandle,
        role: watch::Receiver<RoleState>,
        resolver: Arc<dyn AddressResolver>,
        overrides: O,
    ) -> (Self, mpsc::UnboundedReceiver<(Message, MessageInfo)>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        (
            Self {
                multicast_listeners: Arc::new(RwLock::new(MulticastListeners::new())),
                nd_proxies: NdProxyTable::new(),
                mesh,
                backbone,
                dataset,
                role,
                resolver,
                overrides: Arc::new(overrides),
                request_tx,
            },
            request_rx,
        )
    }

    /// Drive the manager: observe role transitions, process inbound
    /// registration requests and sweep expired multicast listeners.
    ///
    /// Runs until the role channel or the request channel closes.
    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<(Message, MessageInfo)>,
    ) {
        let mut sweep: Option<Interval> = None;

        let state = *self.role.borrow_and_update();
        self.apply_role_state(state, &mut sweep);

        loop {
            tokio::select! {
                changed = self.role.changed() => {
                    if changed.is_err() {
                        debug!("Role channel closed, shutting down manager");
                        break;
                    }
                    let state = *self.role.borrow_and_update();
                    self.apply_role_state(state, &mut sweep);
                }
                request = requests.recv() => {
                    let Some((message, info)) = request else {
                        debug!("Request channel closed, shutting down manager");
                        break;
                    };
                    self.handle_request(message, info);
                }
                // The guard keeps this branch disabled while no interval is
                // running, the future itself is never polled then.
                _ = async { sweep.as_mut().expect("Branch is guarded; qed").tick().await }, if sweep.is_some() => {
                    self.sweep_expired_listeners();
                }
            }
        }
    }

    /// Bring the manager in line with a new role state.
    ///
    /// Transitions to an already-correct state are no-ops, the running sweep
    /// interval doubles as the activity marker.
    fn apply_role_state(&self, state: RoleState, sweep: &mut Option<Interval>) {
        if state.is_enabled() {
            if sweep.is_some() {
                return;
            }
            info!(role = %state, "Activating registration manager");
            self.mesh.register_resource(MLR_URI_PATH, self.request_tx.clone());
            self.mesh.register_resource(DUA_URI_PATH, self.request_tx.clone());
            if let Err(e) = self.backbone.start() {
                error!(err = %e, "Failed to start backbone transport");
            }
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            *sweep = Some(interval);
        } else {
            if sweep.is_none() {
                return;
            }
            info!("Deactivating registration manager");
            self.mesh.unregister_resource(MLR_URI_PATH);
            self.mesh.unregister_resource(DUA_URI_PATH);
            if let Err(e) = self.backbone.stop() {
                warn!(err = %e, "Failed to stop backbone transport");
            }
            *sweep = None;
            // The proxy table deliberately survives deactivation.
            self.multicast_listeners
                .write()
                .expect("Lock is not poisoned; qed")
                .clear();
        }
    }

    fn handle_request(&self, message: Message, info: MessageInfo) {
        match message.uri_path() {
            MLR_URI_PATH => self.handle_multicast_listener_registration(message, info),
            DUA_URI_PATH => self.handle_dua_registration(message, info),
            path => trace!(path, peer = %info.peer, "Ignoring request for unknown resource"),
        }
    }

    fn sweep_expired_listeners(&self) {
        let removed = self
            .multicast_listeners
            .write()
            .expect("Lock is not poisoned; qed")
            .expire(Instant::now());
        if removed > 0 {
            debug!(removed, "Expired multicast listeners");
        }
    }

    /// Amount of multicast listeners currently registered.
    pub fn multicast_listener_count(&self) -> usize {
        self.multicast_listeners
            .read()
            .expect("Lock is not poisoned; qed")
            .len()
    }

    /// Handle to the neighbor discovery proxy table.
    pub fn nd_proxies(&self) -> NdProxyTable {
        self.nd_proxies.clone()
    }

    /// Check if a packet for an unresolvable domain unicast destination should
    /// be handed to the backbone rather than dropped.
    ///
    /// True only when this router is the primary, the destination falls in the
    /// domain prefix, no proxy entry exists for it, and the mesh either can't
    /// resolve it or resolves it to this router itself.
    pub fn should_forward_dua_to_backbone(&self, address: Ipv6Addr) -> bool {
        if !self.role.borrow().is_primary() {
            return false;
        }
        let dataset = self.dataset.load();
        let Some(prefix) = dataset.domain_prefix else {
            return false;
        };
        if !prefix.contains(address) {
            return false;
        }
        if self.nd_proxies.is_registered(&InterfaceId::from(address)) {
            return false;
        }
        match self.resolver.resolve(address) {
            None => true,
            Some(rloc16) => rloc16 == dataset.rloc16,
        }
    }

    fn handle_multicast_listener_registration(&self, request: Message, info: MessageInfo) {
        let outcome = match self.process_multicast_listener_registration(&request) {
            Ok(outcome) => outcome,
            Err(e) => {
                trace!(peer = %info.peer, err = %e, "Dropping malformed multicast listener registration");
                return;
            }
        };

        debug!(
            peer = %info.peer,
            status = %outcome.status,
            registered = outcome.registered.len(),
            failed = outcome.failed.len(),
            "Handled multicast listener registration"
        );

        self.send_multicast_listener_registration_response(
            &request,
            info,
            outcome.status,
            &outcome.failed,
        );
        // Forwarding is independent of the response.
        if !outcome.registered.is_empty() {
            self.send_backbone_notification(&outcome.registered, outcome.timeout);
        }
    }

    fn process_multicast_listener_registration(
        &self,
        request: &Message,
    ) -> Result<MlrOutcome, MalformedRequest> {
        if !request.is_confirmable_post() {
            return Err(MalformedRequest::NotConfirmablePost);
        }

        if let Some(status) = self.overrides.take_mlr_status() {
            return Ok(MlrOutcome::rejection(status));
        }

        if !self.role.borrow().is_primary() {
            return Ok(MlrOutcome::rejection(MlrStatus::BbrNotPrimary));
        }

        let payload = request.payload();
        let dataset = self.dataset.load();

        // A session id TLV of the wrong width is treated as absent, like the
        // timeout and last transaction time TLVs.
        let has_session_id = match tlv::find_u16(payload, tlv::COMMISSIONER_SESSION_ID) {
            Some(session_id) => {
                if dataset.commissioner_session_id != Some(session_id) {
                    return Ok(MlrOutcome::rejection(MlrStatus::GeneralFailure));
                }
                true
            }
            None => false,
        };

        let addresses =
            tlv::find(payload, tlv::IPV6_ADDRESSES).ok_or(MalformedRequest::MissingAddresses)?;
        let addresses = tlv::addresses::parse(addresses).map_err(MalformedRequest::InvalidAddresses)?;

        // A timeout TLV is only honored when vouched for by a commissioner
        // session id.
        let timeout = match has_session_id
            .then(|| tlv::find_u32(payload, tlv::TIMEOUT))
            .flatten()
        {
            None => dataset.mlr_timeout,
            // Persistent registrations are not supported.
            Some(u32::MAX) => return Ok(MlrOutcome::rejection(MlrStatus::NoPersistent)),
            Some(0) => 0,
            Some(requested) => {
                let timeout = requested.clamp(MLR_TIMEOUT_MIN, MLR_TIMEOUT_MAX);
                if timeout != requested {
                    debug!(requested, effective = timeout, "Clamped multicast listener timeout");
                }
                timeout
            }
        };

        let mut status = MlrStatus::Success;
        let mut registered = Vec::new();
        let mut failed = Vec::new();
        let expires = Instant::now() + Duration::from_secs(u64::from(timeout));
        let mut listeners = self
            .multicast_listeners
            .write()
            .expect("Lock is not poisoned; qed");

        for address in addresses {
            if timeout == 0 {
                listeners.remove(&address);
                continue;
            }
            match listeners.add(address, expires) {
                Ok(()) => registered.push(address),
                Err(e) => {
                    status = status.merge(match e {
                        ListenerRegistrationError::InvalidAddress => MlrStatus::Invalid,
                        ListenerRegistrationError::NoResources => MlrStatus::NoResources,
                    });
                    failed.push(address);
                }
            }
        }

        Ok(MlrOutcome {
            status,
            failed,
            registered,
            timeout,
        })
    }

    fn send_multicast_listener_registration_response(
        &self,
        request: &Message,
        info: MessageInfo,
        status: MlrStatus,
        failed: &[Ipv6Addr],
    ) {
        let mut payload = BytesMut::new();
        tlv::append_u8(&mut payload, tlv::STATUS, status.into());
        if !failed.is_empty() {
            tlv::addresses::append(&mut payload, failed);
        }

        let mut response = Message::response_to(request);
        response.set_payload(payload.to_vec());
        if let Err(e) = self.mesh.send(response, info) {
            error!(err = %e, peer = %info.peer, "Failed to send multicast listener registration response");
        }
    }

    /// Announce freshly registered multicast listeners to the other backbone
    /// routers, so they can start proxying the groups as well.
    fn send_backbone_notification(&self, addresses: &[Ipv6Addr], timeout: u32) {
        debug_assert!(!addresses.is_empty());
        debug_assert!(addresses.len() <= tlv::IPV6_ADDRESSES_NUM_MAX);

        let mut payload = BytesMut::new();
        tlv::addresses::append(&mut payload, addresses);
        tlv::append_u32(&mut payload, tlv::TIMEOUT, timeout);

        let mut notification = Message::non_confirmable_post(BACKBONE_MLR_URI_PATH);
        notification.set_payload(payload.to_vec());

        let dataset = self.dataset.load();
        let peer = SocketAddrV6::new(dataset.all_network_bbrs, BACKBONE_UDP_PORT, 0, 0);
        if let Err(e) = self
            .backbone
            .send(notification, MessageInfo::backbone(peer, BACKBONE_HOP_LIMIT))
        {
            error!(err = %e, "Failed to send backbone multicast listener notification");
        }
    }

    fn handle_dua_registration(&self, request: Message, info: MessageInfo) {
        let source_iid = InterfaceId::from(*info.peer.ip());
        // Registrations only come through routers, anything else is spoofed
        // or unreachable and not worth a response.
        if !source_iid.is_routing_locator() {
            trace!(peer = %info.peer, "Dropping unicast address registration from non routing locator source");
            return;
        }

        let (target, ml_iid) = match Self::parse_dua_request(&request) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!(peer = %info.peer, err = %e, "Dropping malformed unicast address registration");
                return;
            }
        };

        let status = match self.overrides.take_dua_status(ml_iid) {
            Some(status) => status,
            None => self.register_nd_proxy(
                target,
                ml_iid,
                source_iid.locator(),
                request.payload(),
            ),
        };

        debug!(peer = %info.peer, %target, %status, "Handled unicast address registration");
        self.send_dua_registration_response(&request, info, status, target);
    }

    fn parse_dua_request(request: &Message) -> Result<(Ipv6Addr, InterfaceId), MalformedRequest> {
        if !request.is_confirmable_post() {
            return Err(MalformedRequest::NotConfirmablePost);
        }
        let payload = request.payload();
        let target = tlv::find(payload, tlv::TARGET_EID)
            .and_then(|value| <[u8; 16]>::try_from(value).ok())
            .map(Ipv6Addr::from)
            .ok_or(MalformedRequest::MissingTarget)?;
        let ml_iid = tlv::find(payload, tlv::MESH_LOCAL_EID)
            .and_then(|value| <[u8; InterfaceId::BYTE_SIZE]>::try_from(value).ok())
            .map(InterfaceId::from)
            .ok_or(MalformedRequest::MissingMeshLocalEid)?;
        Ok((target, ml_iid))
    }

    fn register_nd_proxy(
        &self,
        target: Ipv6Addr,
        ml_iid: InterfaceId,
        rloc16: u16,
        payload: &[u8],
    ) -> DuaStatus {
        if !self.role.borrow().is_primary() {
            return DuaStatus::NotPrimary;
        }

        let dataset = self.dataset.load();
        match dataset.domain_prefix {
            Some(prefix) if prefix.contains(target) => {}
            _ => return DuaStatus::Invalid,
        }

        let last_transaction_time = tlv::find_u32(payload, tlv::LAST_TRANSACTION_TIME);
        match self.nd_proxies.register(
            InterfaceId::from(target),
            ml_iid,
            rloc16,
            last_transaction_time,
        ) {
            Ok(()) => DuaStatus::Success,
            Err(ProxyRegistrationError::Duplicate) => DuaStatus::Duplicate,
            Err(ProxyRegistrationError::NoResources) => DuaStatus::NoResources,
        }
    }

    fn send_dua_registration_response(
        &self,
        request: &Message,
        info: MessageInfo,
        status: DuaStatus,
        target: Ipv6Addr,
    ) {
        let mut payload = BytesMut::new();
        tlv::append_u8(&mut payload, tlv::STATUS, status.into());
        tlv::append(&mut payload, tlv::TARGET_EID, &target.octets());

        let mut response = Message::response_to(request);
        response.set_payload(payload.to_vec());
        if let Err(e) = self.mesh.send(response, info) {
            error!(err = %e, peer = %info.peer, "Failed to send unicast address registration response");
        }
    }
}

impl<O> Clone for Manager<O> {
    fn clone(&self) -> Self {
        Self {
            multicast_listeners: self.multicast_listeners.clone(),
            nd_proxies: self.nd_proxies.clone(),
            mesh: self.mesh.clone(),
            backbone: self.backbone.clone(),
            dataset: self.dataset.clone(),
            role: self.role.clone(),
            resolver: self.resolver.clone(),
            overrides: self.overrides.clone(),
            request_tx: self.request_tx.clone(),
        }
    }
}

/// Outcome of processing a multicast listener registration which at least
/// parsed.
struct MlrOutcome {
    status: MlrStatus,
    failed: Vec<Ipv6Addr>,
    registered: Vec<Ipv6Addr>,
    timeout: u32,
}

impl MlrOutcome {
    fn rejection(status: MlrStatus) -> Self {
        Self {
            status,
            failed: Vec::new(),
            registered: Vec::new(),
            timeout: 0,
        }
    }
}

/// A request dropped without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MalformedRequest {
    NotConfirmablePost,
    MissingAddresses,
    InvalidAddresses(AddressListError),
    MissingTarget,
    MissingMeshLocalEid,
}

impl fmt::Display for MalformedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequest::NotConfirmablePost => {
                f.write_str("Request is not a confirmable POST")
            }
            MalformedRequest::MissingAddresses => {
                f.write_str("Missing IPv6 addresses TLV")
            }
            MalformedRequest::InvalidAddresses(e) => write!(f, "Invalid address list: {e}"),
            MalformedRequest::MissingTarget => f.write_str("Missing or malformed target TLV"),
            MalformedRequest::MissingMeshLocalEid => {
                f.write_str("Missing or malformed mesh-local identifier TLV")
            }
        }
    }
}

impl std::error::Error for MalformedRequest {}
