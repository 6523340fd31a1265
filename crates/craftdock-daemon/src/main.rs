//! craftdock Daemon
//!
//! The daemon stores game-server requests and drives the approve/deny/
//! decommission lifecycle against Proxmox, Cloudflare DNS, the Velocity
//! proxy routing table, and SMTP, serving the operator-facing gRPC API.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use craftdock_core::Allocator;
use craftdock_daemon::dns::{CloudflareClient, CloudflareConfig, DnsRegistry};
use craftdock_daemon::identity::{IdentityResolver, MojangClient, MojangConfig};
use craftdock_daemon::lifecycle::{
    LifecycleConfig, Orchestrator, spawn_notification_scheduler, spawn_provision_worker,
};
use craftdock_daemon::notify::{Notifier, SmtpConfig, SmtpNotifier};
use craftdock_daemon::provision::{Provisioner, ProxmoxClient, ProxmoxConfig};
use craftdock_daemon::proxy::{RouteRegistry, VelocityConfig, VelocityRegistry};
use craftdock_daemon::server::GrpcServer;
use craftdock_daemon::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "craftdock-daemon")]
#[command(version, about = "craftdock daemon - game-server request lifecycle orchestrator")]
struct Args {
    /// TCP bind address
    #[arg(long, default_value = "127.0.0.1:50061", env = "CRAFTDOCK_ADDR")]
    addr: SocketAddr,

    /// Database file path
    #[arg(long, env = "CRAFTDOCK_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Public base domain instances are exposed under (e.g. "example.net")
    #[arg(long, env = "CRAFTDOCK_BASE_DOMAIN")]
    base_domain: String,

    /// Prefix of canonical instance names
    #[arg(long, default_value = "mc-", env = "CRAFTDOCK_NAME_PREFIX")]
    name_prefix: String,

    /// Template the provisioner clones for new instances
    #[arg(long, default_value_t = 129, env = "CRAFTDOCK_TEMPLATE_ID")]
    template_id: i64,

    /// Port every instance listens on behind the proxy
    #[arg(long, default_value_t = 25565, env = "CRAFTDOCK_GAME_PORT")]
    game_port: u16,

    /// Base network for instance addresses; the request id (minus the
    /// sequence floor) is added to it
    #[arg(long, default_value = "10.0.10.0", env = "CRAFTDOCK_BASE_NETWORK")]
    base_network: Ipv4Addr,

    /// Seconds between approval and the "approved/live" email
    #[arg(long, default_value_t = 90, env = "CRAFTDOCK_NOTIFY_DELAY")]
    notify_delay: i64,

    /// Seconds between notification scheduler polls
    #[arg(long, default_value_t = 10, env = "CRAFTDOCK_NOTIFY_POLL")]
    notify_poll: u64,

    /// Recipient of new-request notifications
    #[arg(long, env = "CRAFTDOCK_OPERATOR_EMAIL")]
    operator_email: String,

    /// Proxmox API base URL (e.g. "https://pve.internal:8006")
    #[arg(long, env = "CRAFTDOCK_PROXMOX_URL")]
    proxmox_url: String,

    /// Proxmox API token id ("user@realm!tokenid")
    #[arg(long, env = "CRAFTDOCK_PROXMOX_TOKEN_ID")]
    proxmox_token_id: String,

    /// Proxmox API token secret
    #[arg(long, env = "CRAFTDOCK_PROXMOX_TOKEN_SECRET")]
    proxmox_token_secret: String,

    /// Proxmox node hosting the containers
    #[arg(long, default_value = "pve", env = "CRAFTDOCK_PROXMOX_NODE")]
    proxmox_node: String,

    /// Accept the Proxmox host's self-signed TLS certificate
    #[arg(long, env = "CRAFTDOCK_PROXMOX_INSECURE")]
    proxmox_insecure: bool,

    /// Cloudflare API base URL
    #[arg(
        long,
        default_value = "https://api.cloudflare.com/client/v4",
        env = "CRAFTDOCK_CF_API_URL"
    )]
    cf_api_url: String,

    /// Cloudflare API token scoped to DNS edits on the zone
    #[arg(long, env = "CRAFTDOCK_CF_TOKEN")]
    cf_token: String,

    /// Cloudflare zone id of the base domain
    #[arg(long, env = "CRAFTDOCK_CF_ZONE_ID")]
    cf_zone_id: String,

    /// CNAME target instance records point at (the network ingress name)
    #[arg(long, env = "CRAFTDOCK_DNS_TARGET")]
    dns_target: String,

    /// Path to the proxy routing table (velocity.toml)
    #[arg(long, env = "CRAFTDOCK_VELOCITY_TOML")]
    velocity_toml: PathBuf,

    /// Shell command that makes the proxy re-read its configuration
    #[arg(
        long,
        default_value = "pkill -SIGHUP -f velocity.jar",
        env = "CRAFTDOCK_VELOCITY_RELOAD"
    )]
    velocity_reload: String,

    /// SMTP server hostname
    #[arg(long, env = "CRAFTDOCK_SMTP_HOST")]
    smtp_host: String,

    /// SMTP server port
    #[arg(long, default_value_t = 587, env = "CRAFTDOCK_SMTP_PORT")]
    smtp_port: u16,

    /// SMTP username
    #[arg(long, env = "CRAFTDOCK_SMTP_USERNAME")]
    smtp_username: Option<String>,

    /// SMTP password
    #[arg(long, env = "CRAFTDOCK_SMTP_PASSWORD")]
    smtp_password: Option<String>,

    /// Address notifications appear to come from
    #[arg(long, env = "CRAFTDOCK_SMTP_FROM")]
    smtp_from: String,

    /// Identity directory base URL
    #[arg(
        long,
        default_value = "https://api.mojang.com",
        env = "CRAFTDOCK_IDENTITY_URL"
    )]
    identity_url: String,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "CRAFTDOCK_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "CRAFTDOCK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("craftdock_daemon={}", args.log_level);
    craftdock_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        base_domain = %args.base_domain,
        "Starting craftdock-daemon"
    );

    // Initialize database
    let db = if let Some(path) = &args.db_path {
        info!(path = %path.display(), "Opening database");
        Database::open(path).await?
    } else {
        let default_path = default_db_path()?;
        info!(path = %default_path.display(), "Opening database (default path)");
        Database::open(&default_path).await?
    };

    // External adapters
    let provisioner: Arc<dyn Provisioner> = Arc::new(ProxmoxClient::new(&ProxmoxConfig {
        base_url: args.proxmox_url.clone(),
        token_id: args.proxmox_token_id.clone(),
        token_secret: args.proxmox_token_secret.clone(),
        node: args.proxmox_node.clone(),
        accept_invalid_certs: args.proxmox_insecure,
    })?);
    let dns: Arc<dyn DnsRegistry> = Arc::new(CloudflareClient::new(&CloudflareConfig {
        api_url: args.cf_api_url.clone(),
        token: args.cf_token.clone(),
        zone_id: args.cf_zone_id.clone(),
        base_domain: args.base_domain.clone(),
        target: args.dns_target.clone(),
    })?);
    let routes: Arc<dyn RouteRegistry> = Arc::new(VelocityRegistry::new(VelocityConfig {
        table_path: args.velocity_toml.clone(),
        base_domain: args.base_domain.clone(),
        reload_command: args.velocity_reload.clone(),
    }));
    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(SmtpConfig {
        host: args.smtp_host.clone(),
        port: args.smtp_port,
        username: args.smtp_username.clone(),
        password: args.smtp_password.clone(),
        from_address: args.smtp_from.clone(),
        use_tls: true,
    })?);
    let identity: Arc<dyn IdentityResolver> = Arc::new(MojangClient::new(&MojangConfig {
        base_url: args.identity_url.clone(),
    })?);

    // Shutdown channel for the background tasks.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Supervised provisioning and the durable notification scheduler.
    let (provision_tx, worker_handle) =
        spawn_provision_worker(db.clone(), Arc::clone(&provisioner), shutdown_rx);
    let scheduler_handle = spawn_notification_scheduler(
        db.clone(),
        Arc::clone(&notifier),
        Duration::from_secs(args.notify_poll),
        shutdown_tx.subscribe(),
    );

    let orchestrator = Orchestrator::new(
        db,
        Allocator::new(args.base_network),
        LifecycleConfig {
            base_domain: args.base_domain.clone(),
            name_prefix: args.name_prefix.clone(),
            template_id: args.template_id,
            game_port: args.game_port,
            notify_delay_secs: args.notify_delay,
            operator_email: args.operator_email.clone(),
        },
        provisioner,
        dns,
        routes,
        notifier,
        identity,
        provision_tx,
    );

    let server = GrpcServer::new(Arc::new(orchestrator));

    // Serve until shutdown signal
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the daemon is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(addr = %args.addr, "gRPC server ready");

    tokio::select! {
        result = server.serve_tcp(args.addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    // Signal the worker and scheduler to shut down
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = scheduler_handle.await;

    info!("Daemon stopped");
    Ok(())
}

/// Default database path: ~/.craftdock/daemon.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".craftdock").join("daemon.db"))
}
