//! UDP transports carrying management messages on the mesh and backbone sides.

use core::fmt;
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, SocketAddrV6};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::udp::UdpFramed;
use tracing::{debug, trace, warn};

use crate::coap::{self, Message};

/// Metadata about a received or outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    /// Remote address the message came from, or is destined to.
    pub peer: SocketAddrV6,
    /// Hop limit to send the message with, if constrained.
    pub hop_limit: Option<u8>,
    /// Marks traffic on the backbone link rather than the mesh.
    pub is_host_interface: bool,
}

impl MessageInfo {
    /// [`MessageInfo`] for a mesh-side peer.
    pub fn mesh(peer: SocketAddrV6) -> Self {
        Self {
            peer,
            hop_limit: None,
            is_host_interface: false,
        }
    }

    /// [`MessageInfo`] for a backbone-side peer, with a bounded hop limit.
    pub fn backbone(peer: SocketAddrV6, hop_limit: u8) -> Self {
        Self {
            peer,
            hop_limit: Some(hop_limit),
            is_host_interface: true,
        }
    }
}

/// An error when sending a message through a transport.
#[derive(Debug)]
pub enum TransportError {
    /// The transport has not been started.
    NotStarted,
    /// The transport task is gone.
    Closed,
    /// An underlying I/O error.
    Io(io::Error),
}

/// The mesh-facing side of the management interface.
///
/// Inbound requests are dispatched to registered resources by URI path,
/// outbound messages are written to the mesh socket.
pub trait MeshTransport: Send + Sync {
    /// Deliver inbound messages for the given URI path to `handler`.
    /// Registering a path twice replaces the previous handler.
    fn register_resource(
        &self,
        path: &'static str,
        handler: mpsc::UnboundedSender<(Message, MessageInfo)>,
    );

    /// Stop delivering inbound messages for the given URI path.
    fn unregister_resource(&self, path: &'static str);

    /// Queue a message for transmission to the peer in `info`.
    fn send(&self, message: Message, info: MessageInfo) -> Result<(), TransportError>;
}

/// The backbone-facing side of the management interface.
///
/// Only used for outbound notifications, and only while the router is acting
/// as the primary.
pub trait BackboneTransport: Send + Sync {
    /// Bring up the backbone socket. Starting an already started transport is
    /// a no-op.
    fn start(&self) -> Result<(), TransportError>;

    /// Tear down the backbone socket. Stopping a stopped transport is a no-op.
    fn stop(&self) -> Result<(), TransportError>;

    /// Queue a message for transmission to the peer in `info`.
    fn send(&self, message: Message, info: MessageInfo) -> Result<(), TransportError>;
}

type ResourceMap = Arc<Mutex<HashMap<&'static str, mpsc::UnboundedSender<(Message, MessageInfo)>>>>;

/// [`MeshTransport`] backed by a UDP socket on the mesh interface.
pub struct UdpMeshTmf {
    resources: ResourceMap,
    egress: mpsc::UnboundedSender<(Message, SocketAddr)>,
}

impl UdpMeshTmf {
    /// Bind the mesh socket and spawn the serve loop.
    pub async fn bind(addr: SocketAddrV6) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        debug!(local = %addr, "Mesh management socket bound");

        let (egress, egress_rx) = mpsc::unbounded_channel();
        let resources: ResourceMap = Arc::new(Mutex::new(HashMap::new()));

        let framed = UdpFramed::new(socket, coap::Codec::new());
        tokio::spawn(Self::serve(framed, resources.clone(), egress_rx));

        Ok(Self { resources, egress })
    }

    async fn serve(
        framed: UdpFramed<coap::Codec>,
        resources: ResourceMap,
        mut egress: mpsc::UnboundedReceiver<(Message, SocketAddr)>,
    ) {
        let (mut sink, mut stream) = framed.split();
        loop {
            tokio::select! {
                inbound = stream.next() => {
                    let (message, peer) = match inbound {
                        Some(Ok(item)) => item,
                        Some(Err(e)) => {
                            warn!(err = %e, "Failed to read from mesh management socket");
                            continue;
                        }
                        None => {
                            debug!("Mesh management socket closed");
                            break;
                        }
                    };
                    let SocketAddr::V6(peer) = peer else {
                        trace!(%peer, "Ignoring non IPv6 mesh peer");
                        continue;
                    };
                    if !message.code().is_request() {
                        trace!(%peer, "Ignoring non request message");
                        continue;
                    }
                    let handler = resources
                        .lock()
                        .expect("Lock is not poisoned; qed")
                        .get(message.uri_path())
                        .cloned();
                    match handler {
                        Some(handler) => {
                            // Receiver dropped means the manager is gone.
                            let _ = handler.send((message, MessageInfo::mesh(peer)));
                        }
                        None => {
                            trace!(%peer, path = message.uri_path(), "No resource registered for path");
                        }
                    }
                }
                outbound = egress.recv() => {
                    let Some((message, dst)) = outbound else {
                        debug!("Mesh management transport dropped");
                        break;
                    };
                    if let Err(e) = sink.send((message, dst)).await {
                        warn!(err = %e, %dst, "Failed to write to mesh management socket");
                    }
                }
            }
        }
    }
}

impl MeshTransport for UdpMeshTmf {
    fn register_resource(
        &self,
        path: &'static str,
        handler: mpsc::UnboundedSender<(Message, MessageInfo)>,
    ) {
        self.resources
            .lock()
            .expect("Lock is not poisoned; qed")
            .insert(path, handler);
    }

    fn unregister_resource(&self, path: &'static str) {
        self.resources
            .lock()
            .expect("Lock is not poisoned; qed")
            .remove(path);
    }

    fn send(&self, message: Message, info: MessageInfo) -> Result<(), TransportError> {
        self.egress
            .send((message, SocketAddr::V6(info.peer)))
            .map_err(|_| TransportError::Closed)
    }
}

struct BackboneAgent {
    egress: mpsc::UnboundedSender<(Message, SocketAddr)>,
    task: JoinHandle<()>,
}

/// [`BackboneTransport`] backed by a UDP socket on the backbone interface.
///
/// The socket is only bound while the transport is started, with both the
/// unicast and multicast hop limits pinned so notifications stay on the
/// backbone link.
pub struct UdpBackboneTmf {
    bind_addr: SocketAddrV6,
    hop_limit: u8,
    agent: Mutex<Option<BackboneAgent>>,
}

impl UdpBackboneTmf {
    /// Create a new, stopped backbone transport.
    pub fn new(bind_addr: SocketAddrV6, hop_limit: u8) -> Self {
        Self {
            bind_addr,
            hop_limit,
            agent: Mutex::new(None),
        }
    }

    fn bind_socket(&self) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_only_v6(true)?;
        socket.set_unicast_hops_v6(self.hop_limit as u32)?;
        socket.set_multicast_hops_v6(self.hop_limit as u32)?;
        socket.bind(&SocketAddr::V6(self.bind_addr).into())?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }

    async fn serve(
        framed: UdpFramed<coap::Codec>,
        mut egress: mpsc::UnboundedReceiver<(Message, SocketAddr)>,
    ) {
        let (mut sink, _) = framed.split();
        while let Some((message, dst)) = egress.recv().await {
            if let Err(e) = sink.send((message, dst)).await {
                warn!(err = %e, %dst, "Failed to write to backbone socket");
            }
        }
        debug!("Backbone transport stopped");
    }
}

impl BackboneTransport for UdpBackboneTmf {
    fn start(&self) -> Result<(), TransportError> {
        let mut agent = self.agent.lock().expect("Lock is not poisoned; qed");
        if agent.is_some() {
            return Ok(());
        }

        let socket = self.bind_socket().map_err(TransportError::Io)?;
        debug!(local = %self.bind_addr, "Backbone socket bound");

        let (egress, egress_rx) = mpsc::unbounded_channel();
        let framed = UdpFramed::new(socket, coap::Codec::new());
        let task = tokio::spawn(Self::serve(framed, egress_rx));

        *agent = Some(BackboneAgent { egress, task });
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        if let Some(agent) = self
            .agent
            .lock()
            .expect("Lock is not poisoned; qed")
            .take()
        {
            agent.task.abort();
        }
        Ok(())
    }

    fn send(&self, message: Message, info: MessageInfo) -> Result<(), TransportError> {
        let agent = self.agent.lock().expect("Lock is not poisoned; qed");
        let Some(agent) = agent.as_ref() else {
            return Err(TransportError::NotStarted);
        };
        agent
            .egress
            .send((message, SocketAddr::V6(info.peer)))
            .map_err(|_| TransportError::Closed)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotStarted => f.write_str("Transport is not started"),
            TransportError::Closed => f.write_str("Transport task is gone"),
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}
