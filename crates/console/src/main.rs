use anyhow::Context;
use clap::Parser;
use dispatchgrid_console::config::Cli;
use dispatchgrid_console::Console;
use dispatchgrid_engine::{spawn_poller, Authority, HttpAuthority};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let authority = HttpAuthority::new(&cli.authority_url)
        .with_context(|| format!("invalid authority url {}", cli.authority_url))?;

    let reported = if cli.grid_size.is_some() {
        None
    } else {
        match authority.grid_info().await {
            Ok(info) => Some(info.width),
            Err(e) => {
                tracing::warn!(error = %e, "grid info unavailable, using default extent");
                None
            }
        }
    };
    let config = cli.engine_config(reported);
    tracing::info!(
        authority = authority.base_url(),
        grid_size = config.grid_size,
        scale = config.scale,
        "starting console"
    );

    let console = Arc::new(Console::new(authority, config));
    let _ = console.sync().refresh().await;
    if let Some(every) = cli.poll_interval() {
        spawn_poller(console.sync().clone(), every);
    }

    tracing::info!("console listening on http://{}", cli.listen);
    dispatchgrid_console::serve(cli.listen, console)
        .await
        .context("console server failed")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
