mod api;
mod cli;
mod config;
mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use keyless_ca::ca::CertificateAuthority;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, CreateCaArgs, ServeArgs};
use crate::config::ServerConfig;
use crate::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::CreateCa(args) => create_ca(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = ServerConfig::load(&args.config_path)?;
    let service = Arc::new(config.build_service()?);
    let port = args.port.unwrap_or(config.port);

    let state = AppState {
        service: Arc::clone(&service),
        deadline: config.request_deadline(),
    };
    let app = router(state);

    // SIGHUP swaps in a freshly loaded issuer pool without a restart.
    #[cfg(unix)]
    {
        let service = Arc::clone(&service);
        let config_path = args.config_path.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut hangup) = signal(SignalKind::hangup()) else {
                return;
            };
            while hangup.recv().await.is_some() {
                let reloaded = ServerConfig::load(&config_path)
                    .and_then(|c| c.identity.build_pool().map_err(Into::into));
                match reloaded {
                    Ok(pool) => {
                        service.reload_issuers(pool);
                        tracing::info!("issuer pool reloaded");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "issuer reload failed, keeping current pool");
                    }
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {}", port))?;
    tracing::info!(port, "issuance server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    service.close().await;
    tracing::info!("shut down cleanly");
    Ok(())
}

async fn create_ca(args: CreateCaArgs) -> anyhow::Result<()> {
    let config = ServerConfig::load(&args.config_path)?;
    let ca = config.build_ca()?;
    let root_der = ca.root().await?;
    let root_pem = keyless_ca::ca::der_to_pem(&root_der);
    ca.close().await;

    match args.out_path {
        Some(path) => {
            std::fs::write(&path, root_pem)
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "root certificate written");
        }
        None => print!("{}", root_pem),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
