use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use wardline::audit::TracingAudit;
use wardline::auth::AuthService;
use wardline::cli::{Cli, Commands};
use wardline::config::{self, ClientConfig};
use wardline::dispatch::RecordDirectory;
use wardline::messages::Request;
use wardline::network::{ClientConnection, Server, ServerOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config } => {
            serve(bind, config).await?;
        }
        Commands::Ping { addr, config } => {
            ping(addr, config).await?;
        }
        Commands::Login {
            user,
            password,
            addr,
            config,
        } => {
            login(&user, &password, addr, config).await?;
        }
    }

    Ok(())
}

async fn serve(bind: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let settings = config::load_server(config_path.as_deref())?;
    let bind_addr = bind.unwrap_or_else(|| settings.bind.clone());

    let credentials = settings.credential_store();
    if credentials.is_empty() {
        warn!("No user accounts configured; every login will be rejected");
    } else {
        info!("Loaded {} user account(s)", credentials.len());
    }

    let auth = Arc::new(AuthService::new(credentials, settings.auth_policy()));
    let dispatcher = Arc::new(RecordDirectory::new());
    let audit = Arc::new(TracingAudit);
    let options = ServerOptions {
        read_timeout: settings.read_timeout(),
        max_connections: settings.max_connections,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => error!("Failed to listen for interrupt: {}", err),
        }
    });

    let server = Server::bind(&bind_addr, auth, dispatcher, audit, options, shutdown_rx)
        .await
        .with_context(|| format!("Failed to start server on {}", bind_addr))?;
    info!("Listening on {}", server.local_addr()?);

    server.run().await?;
    Ok(())
}

async fn ping(addr: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let settings = client_config(addr, config_path)?;

    info!("Pinging {}", settings.addr());
    let mut client = ClientConnection::connect(&settings)
        .await
        .with_context(|| format!("Failed to reach server at {}", settings.addr()))?;
    let response = client.send(Request::ping()).await?;
    info!(
        "Server answered: {}",
        response.message.as_deref().unwrap_or("(no message)")
    );
    client.close().await;
    Ok(())
}

async fn login(
    user: &str,
    password: &str,
    addr: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let settings = client_config(addr, config_path)?;

    let mut client = ClientConnection::connect(&settings)
        .await
        .with_context(|| format!("Failed to reach server at {}", settings.addr()))?;
    match client.login(user, password).await {
        Ok(()) => {
            if let Some(token) = client.token() {
                info!("Logged in as {}", user);
                info!("Session token: {}", token);
            }
        }
        Err(err) => error!("Login failed: {}", err),
    }
    client.close().await;
    Ok(())
}

/// Client settings from the configuration file, with an optional
/// `host:port` override from the command line.
fn client_config(addr: Option<String>, config_path: Option<PathBuf>) -> Result<ClientConfig> {
    let mut settings = config::load_client(config_path.as_deref())?;
    if let Some(addr) = addr {
        let (host, port) = addr
            .rsplit_once(':')
            .with_context(|| format!("Invalid address '{}', expected host:port", addr))?;
        settings.host = host.to_string();
        settings.port = port
            .parse()
            .with_context(|| format!("Invalid port in address '{}'", addr))?;
    }
    Ok(settings)
}
