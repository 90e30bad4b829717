use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use soapy_chat::{
    assets,
    cli::{Cli, Command, ServeArgs},
    client, network,
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind relay on {}", args.listen))?;
    let server = Server::new(listener, args.relay_config());
    let addr = server.local_addr()?;
    info!("relay listening on {}", addr);

    let shutdown = CancellationToken::new();

    let assets_task = if args.no_http {
        None
    } else {
        let listener = TcpListener::bind(args.http_listen)
            .await
            .with_context(|| format!("failed to bind page server on {}", args.http_listen))?;
        let port = listener.local_addr()?.port();
        info!(
            "open http://{}:{} on other devices (serving {})",
            network::lan_ip(),
            port,
            args.static_dir.display()
        );
        Some(tokio::spawn(assets::serve(
            listener,
            args.static_dir.clone(),
            addr.port(),
            shutdown.clone().cancelled_owned(),
        )))
    };

    let result = server.run_until_ctrl_c().await;
    shutdown.cancel();

    if let Some(task) = assets_task {
        match task.await {
            Ok(Err(err)) => warn!("page server exited with error: {err:?}"),
            Err(err) => warn!(error = ?err, "page server task panicked"),
            Ok(Ok(())) => {}
        }
    }

    if let Err(err) = &result {
        warn!("relay exited with error: {err:?}");
    }
    result
}
