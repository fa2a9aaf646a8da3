//! Lodestone dedicated server.
//!
//! Configuration is loaded from `server.ron` in the config directory and can
//! be overridden via CLI flags. Run with `cargo run -p lodestone-server -- --port 25566`.

use std::sync::Arc;

use clap::Parser;
use lodestone_config::{CliArgs, Config};
use lodestone_session::{FlatWorld, OfflineIdentityService, PassthroughFilter, Server};
use tokio::sync::watch;
use tracing::{error, info, warn};

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = match args.config.clone().map_or_else(Config::default_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    lodestone_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("lodestone-io")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.server.online_mode {
        warn!("No remote identity service configured, online mode uses offline profiles");
    }

    let server = Server::new(
        config,
        Box::new(FlatWorld::default()),
        Arc::new(OfflineIdentityService),
        Arc::new(PassthroughFilter),
    );
    let acceptor = Arc::new(server.acceptor()?);
    let sink = server.transport_sink();

    let accept_task = {
        let acceptor = Arc::clone(&acceptor);
        tokio::spawn(async move {
            if let Err(e) = acceptor.run(sink).await {
                error!("Acceptor failed: {e}");
            }
        })
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!("Failed to listen for interrupt: {e}"),
        }
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await;
    acceptor.shutdown();
    let _ = accept_task.await;
    info!("Server stopped");
    Ok(())
}
