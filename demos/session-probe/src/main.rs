//! Exchange session probe
//!
//! Runs the full bind / connect / notify / disconnect sequence and reports
//! each step. The probe drives the in-process loopback runtime, so it shows
//! exactly which string binding, auth info and calls the session layer
//! produces for a given set of flags.
//!
//! Usage:
//!   session-probe -H mail.contoso.com -t ncacn_http --http-scheme NTLM --ssl \
//!       store --user-dn "/o=Contoso/cn=Recipients/cn=alice" --wait 5

use bytes::Bytes;
use clap::{Parser, Subcommand};
use exrpc::{
    AuthLevel, AuthnService, ClientConfig, ExchangeClient, LoopbackRuntime, RetryPolicy,
    SessionConfig, Stat, AF_INET, AF_INET6,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-probe")]
#[command(about = "Probe EMSMDB and NSPI session establishment", long_about = None)]
struct Args {
    /// Exchange server name
    #[arg(short = 'H', long)]
    host: String,

    /// Protocol sequence
    #[arg(short = 't', long, default_value = "ncacn_ip_tcp")]
    transport: String,

    #[arg(short = 'd', long, default_value = "")]
    domain: String,

    #[arg(short = 'u', long, default_value = "")]
    username: String,

    #[arg(short = 'P', long, default_value = "")]
    password: String,

    /// Authentication level (0-6)
    #[arg(long, default_value_t = 6)]
    auth_level: u32,

    /// Authentication service (10 = NTLM, 16 = Kerberos, 9 = Negotiate)
    #[arg(long, default_value_t = 10)]
    authn_service: u32,

    /// RPC/HTTP authentication scheme (Basic or NTLM)
    #[arg(long)]
    http_scheme: Option<String>,

    /// Use SSL for RPC/HTTP
    #[arg(long)]
    ssl: bool,

    /// SPN format; [ServerName] is replaced by the host
    #[arg(long)]
    spn_format: Option<String>,

    /// Embed the interface object UUID in the string binding
    #[arg(long)]
    object_uuid: bool,

    /// Retries on transient RPC statuses
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Seconds between retries
    #[arg(long, default_value_t = 5)]
    retry_wait: u64,

    /// Set don't-linger on the binding before freeing it
    #[arg(long)]
    force_shutdown: bool,

    /// Log filter, overridden by RUST_LOG
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the Store (EMSMDB) interface
    Store {
        /// Distinguished name of the mailbox user
        #[arg(long)]
        user_dn: String,

        /// ROP request buffer to send, hex encoded
        #[arg(long)]
        rop: Option<String>,

        /// Register a push notification callback at ip:port
        #[arg(long)]
        callback: Option<String>,

        /// Seconds to wait for notifications (0 completes immediately)
        #[arg(long)]
        wait: Option<u32>,
    },

    /// Bind to the address book (NSPI) interface
    Nspi {
        /// NspiBind flags
        #[arg(long, default_value_t = 0)]
        flags: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = client_config(&args)?;
    let runtime = Arc::new(LoopbackRuntime::new());
    let client = ExchangeClient::new(runtime.clone(), config);

    let result = match &args.command {
        Commands::Store {
            user_dn,
            rop,
            callback,
            wait,
        } => {
            let rop_in = rop
                .as_deref()
                .map(|hex| decode_hex(hex).ok_or_else(|| format!("ROP buffer is not valid hex: {}", hex)))
                .transpose()?;
            let callback = callback
                .as_deref()
                .map(|addr| split_host_port(addr).ok_or_else(|| format!("expected ip:port, got {}", addr)))
                .transpose()?;
            probe_store(&client, user_dn, rop_in, callback, *wait).await
        }
        Commands::Nspi { flags } => probe_nspi(&client, *flags).await,
    };

    for binding in runtime.string_bindings() {
        info!("String binding: {}", binding);
    }
    if let Some(auth) = runtime.last_auth_info() {
        info!(
            "Auth info: level={:?} service={:?} spn={:?} http_qos={}",
            auth.auth_level,
            auth.authn_service,
            auth.spn,
            auth.qos.is_some()
        );
    }

    if let Err(e) = &result {
        error!("Probe failed: {} (status 0x{:08x})", e, e.status());
    }
    result.map_err(Into::into)
}

fn client_config(args: &Args) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let auth_level = AuthLevel::from_u32(args.auth_level)
        .ok_or_else(|| format!("unknown auth level {}", args.auth_level))?;
    let authn_service = AuthnService::from_u32(args.authn_service)
        .ok_or_else(|| format!("unknown authentication service {}", args.authn_service))?;

    let mut config = ClientConfig::new(args.host.as_str())
        .with_credentials(args.domain.as_str(), args.username.as_str(), args.password.as_str())
        .with_transport(args.transport.as_str())
        .with_auth(auth_level, authn_service)
        .with_object_uuid(args.object_uuid)
        .with_retry(RetryPolicy::new(args.retries, Duration::from_secs(args.retry_wait)))
        .with_session(SessionConfig::default().force_shutdown_association(args.force_shutdown));
    if let Some(scheme) = &args.http_scheme {
        config = config.with_http(scheme.as_str(), args.ssl);
    }
    if let Some(format) = &args.spn_format {
        config = config.with_spn_format(format.as_str());
    }
    Ok(config)
}

async fn probe_store(
    client: &ExchangeClient,
    user_dn: &str,
    rop_in: Option<Vec<u8>>,
    callback: Option<(&str, u16)>,
    wait: Option<u32>,
) -> exrpc::Result<()> {
    let mut session = client.connect_store(user_dn).await?;
    if let Some(info) = session.connect_info() {
        info!(
            "Connected: display name {:?}, server version {:?}, poll max {} ms",
            info.display_name, info.server_version, info.polls_max_ms
        );
    }

    if let Some(rop_in) = rop_in {
        let response = session
            .do_rpc_ext2(Bytes::from(rop_in), exrpc::emsmdb::MAX_ROP_OUT)
            .await?;
        info!(
            "EcDoRpcExt2: {} bytes out, {} ms on server",
            response.rop_out.len(),
            response.trans_time_ms
        );
    }

    if let Some((ip, port)) = callback {
        let family = if ip.contains(':') { AF_INET6 } else { AF_INET };
        let handle = session
            .register_push_notification(family, ip, port, b"session-probe")
            .await?;
        info!("Registered push notification, handle {}", handle);
    }

    if let Some(timeout_secs) = wait {
        let mut notifications = session.async_connect().await?;
        match notifications.wait_with_timeout(0, timeout_secs).await {
            Ok(outcome) => info!(
                "Async wait finished after {}s, notifications pending: {}",
                outcome.waited_secs,
                outcome.notifications_pending()
            ),
            Err(e) => error!("Async wait failed: {}", e),
        }
    }

    session.disconnect().await
}

async fn probe_nspi(client: &ExchangeClient, flags: u32) -> exrpc::Result<()> {
    let mut session = client.bind_name_service(flags, Stat::default()).await?;
    info!("NspiBind: server guid {:?}", session.server_guid());
    session.nspi_unbind().await
}

fn split_host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Some((host, port.parse().ok()?))
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
