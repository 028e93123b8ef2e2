use std::error::Error;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
#[cfg(target_family = "unix")]
use tokio::signal::{self, unix::SignalKind};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meshbbr::dataset::{Dataset, DEFAULT_MLR_TIMEOUT};
use meshbbr::resolver::NoResolve;
use meshbbr::role::RoleState;
use meshbbr::subnet::Ipv6Subnet;
use meshbbr::{BackboneRouter, Config, BACKBONE_UDP_PORT};

#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Address to bind the mesh-facing management socket to.
    #[arg(long = "mesh-bind", default_value_t = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, BACKBONE_UDP_PORT, 0, 0))]
    mesh_bind_addr: SocketAddrV6,

    /// Address to bind the backbone-facing socket to.
    #[arg(long = "backbone-bind", default_value_t = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0))]
    backbone_bind_addr: SocketAddrV6,

    /// Domain unicast prefix served by this router. Unicast address
    /// registrations are rejected when unset.
    #[arg(long = "domain-prefix")]
    domain_prefix: Option<Ipv6Subnet>,

    /// Multicast listener timeout in seconds, used when a request does not
    /// carry its own.
    #[arg(long = "mlr-timeout", default_value_t = DEFAULT_MLR_TIMEOUT)]
    mlr_timeout: u32,

    /// This router's own routing locator on the mesh.
    #[arg(long = "rloc16", default_value_t = 0)]
    rloc16: u16,

    /// Start as the primary backbone router instead of a secondary.
    #[arg(long = "primary", default_value_t = false)]
    primary: bool,

    /// Enable debug logging. Does nothing if `--silent` is set.
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,

    /// Disable all logs except error logs.
    #[arg(long = "silent", default_value_t = false)]
    silent: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_level = if cli.silent {
        LevelFilter::ERROR
    } else if cli.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .with(tracing_logfmt::layer())
        .init();

    let dataset = Dataset {
        mlr_timeout: cli.mlr_timeout,
        domain_prefix: cli.domain_prefix,
        rloc16: cli.rloc16,
        ..Dataset::default()
    }
    .into_handle();

    let initial_role = if cli.primary {
        RoleState::Primary
    } else {
        RoleState::Secondary
    };
    let (role, role_rx) = watch::channel(initial_role);

    let router = BackboneRouter::new(Config {
        mesh_bind_addr: cli.mesh_bind_addr,
        backbone_bind_addr: cli.backbone_bind_addr,
        dataset,
        role: role_rx,
        resolver: Arc::new(NoResolve),
    })
    .await?;

    #[cfg(target_family = "unix")]
    {
        let mut sigint =
            signal::unix::signal(SignalKind::interrupt()).expect("Can install SIGINT handler");
        let mut sigterm =
            signal::unix::signal(SignalKind::terminate()).expect("Can install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => { }
            _ = sigterm.recv() => { }
        }
    }
    #[cfg(not(target_family = "unix"))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(err = %e, "Failed to wait for SIGINT");
        }
    }

    info!("Shutting down");
    let _ = role.send(RoleState::Disabled);
    drop(router);

    Ok(())
}
