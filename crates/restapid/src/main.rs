//! restapid entry point.

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use sonic_restapid::config::Args;
use sonic_restapid::server;
use sonic_restapid::{build_router, AppState, FixedInterval, Gate, OverlayMgr, Stores};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;
    init_logging(&args)?;

    info!("restapid: server started");
    match run_daemon(args).await {
        Ok(()) => {
            info!("restapid: exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "restapid: exiting with error");
            Err(e)
        }
    }
}

/// `--loglevel` sets the default filter; `RUST_LOG` overrides it.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    let result = match &args.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("couldn't open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))
}

async fn run_daemon(args: Args) -> Result<()> {
    let stores = Stores::connect(&args.redis_endpoint(), args.localapitestdocker)
        .await
        .context("couldn't connect to redis")?;

    let mut mgr = OverlayMgr::new(stores)
        .with_propagation(Arc::new(FixedInterval::new(args.propagation_interval())))
        .with_sysfs_root(&args.sysfs_root)
        .with_local_test(args.localapitestdocker);
    mgr.init().await.context("couldn't load service state")?;

    let trusted = args.trusted_common_names();
    info!(trusted = ?trusted, "Trusted client certificate common names");
    let gate = Arc::new(Gate::new(mgr, trusted));
    let router = build_router(AppState::new(gate));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    if args.enablehttp {
        tasks.spawn(server::serve_http(args.http_addr(), router.clone(), shutdown_rx.clone()));
    }
    if args.enablehttps {
        let paths = args.tls_paths()?;
        let acceptor = server::load_acceptor(&paths)?;
        tasks.spawn(server::serve_https(
            args.https_addr(),
            router.clone(),
            acceptor.clone(),
            shutdown_rx.clone(),
        ));
        let interval = args.cert_monitor_interval();
        let monitor_rx = shutdown_rx.clone();
        tasks.spawn(async move {
            server::monitor_certs(paths, interval, acceptor, monitor_rx).await;
            Ok::<_, anyhow::Error>(())
        });
    }

    tasks.spawn(async move {
        wait_for_signal().await?;
        info!("restapid: shutdown signal received");
        let _ = shutdown_tx.send(true);
        Ok::<_, anyhow::Error>(())
    });

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
