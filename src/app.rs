use std::{future::Future, sync::Arc};

use anyhow::Context as _;
use canvas::{AccessControl, Board, Bootstrapper, SnapshotSource};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, RemoteConfig},
    publisher::SnapshotPublisher,
    server,
    whitelist::load_whitelist,
};

/// Runs the service until SIGINT or SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Bootstraps the canvas, then serves and publishes snapshots until `shutdown`
/// resolves, finishing with one last local save.
pub async fn run_until(
    config: Config,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let remote = config
        .remote
        .as_ref()
        .map(RemoteConfig::client)
        .transpose()
        .context("could not set up bucket client")?;

    let bootstrapper = Bootstrapper::new(config.dimensions, remote.as_ref());
    let canvas = bootstrapper
        .canvas(config.canvas.load.as_deref())
        .await
        .context("could not load canvas")?;

    let access = match &config.access {
        Some(access) => {
            let whitelist = load_whitelist(remote.as_ref(), &access.whitelist)
                .await
                .context("could not load whitelist")?;
            info!("Loaded whitelist with {} identities", whitelist.len());

            let record = bootstrapper
                .record(access.record.load.as_deref())
                .await
                .context("could not load record")?;
            Some(AccessControl { whitelist, record })
        }
        None => None,
    };

    let board = Board::new(canvas, config.max_connections, access)
        .context("could not set up board")?;
    let dimensions = board.dimensions();
    let max_connections = board.max_connections();
    info!(
        "Canvas is {} x {}, access control {}, at most {} connections",
        dimensions.width,
        dimensions.height,
        if board.access_control_enabled() { "enabled" } else { "disabled" },
        max_connections
    );
    let source: Arc<dyn SnapshotSource> = Arc::new(board);

    let publisher = SnapshotPublisher::new(
        source.clone(),
        remote,
        config.targets(),
        config.save_interval,
    );

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("could not listen on {}", config.listen))?;
    info!("Listening on {}", listener.local_addr()?);

    let cancel = CancellationToken::new();
    let app = server::router(source, &config.root, max_connections);
    let serving = tokio::spawn(server::serve(
        listener,
        app,
        cancel.clone().cancelled_owned(),
    ));
    let mut publishing = tokio::spawn({
        let publisher = publisher.clone();
        let cancel = cancel.clone();
        async move { publisher.run(cancel).await }
    });

    let finished = tokio::select! {
        _ = shutdown => {
            info!("Shutting down");
            None
        }
        joined = &mut publishing => Some(joined),
    };
    cancel.cancel();

    let joined = match finished {
        Some(joined) => joined,
        None => publishing.await,
    };
    joined
        .context("snapshot publisher panicked")?
        .context("snapshot publisher failed")?;
    serving
        .await
        .context("http server panicked")?
        .context("http server failed")?;

    publisher
        .save_local()
        .await
        .context("could not save canvas before exit")?;
    info!("Saved canvas to {:?}", publisher.targets().canvas);

    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("could not listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("could not listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
