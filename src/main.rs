use anyhow::Context;
use clap::Parser;
use lottery_server::{
    config::Config,
    lottery::{
        coordinator::Coordinator,
        store::{BetStore, FileStore, MemoryStore},
        Lottery,
    },
    server::Server,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // connect tracing to stdout
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::debug!("configuration: {:?}", config);

    let store: Box<dyn BetStore> = match &config.bets_file {
        Some(path) => Box::new(
            FileStore::create(path)
                .await
                .with_context(|| format!("failed to create the bets file {}", path.display()))?,
        ),
        None => Box::<MemoryStore>::default(),
    };
    let lottery = Lottery::new(store, config.agencies as usize, config.winning_number);
    let coordinator = Coordinator::start(lottery);

    let server = Server::bind(
        config.listen_addr(),
        config.listen_backlog,
        coordinator,
        config.shutdown_grace(),
    )
    .with_context(|| format!("failed to listen on {}", config.listen_addr()))?;
    tracing::info!(
        "server is listening on: {}, waiting for {} agencies",
        server.local_addr()?,
        config.agencies
    );

    server.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
