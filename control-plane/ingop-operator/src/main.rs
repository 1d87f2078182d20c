use std::sync::Arc;

use envconfig::Envconfig;
use ingop_operator::{
    Operator,
    config::OperatorConfig,
    events::{Fanout, KubeEventSink, LogSink},
    init_tracing,
    loglevel::LogLevelRegulator,
};
use ingop_store::{ObjectStore, k8s::KubeStore};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = OperatorConfig::init_from_env()?.apply_profile_defaults();
    let filter = init_tracing(&cfg.logging);
    info!(?cfg, "Starting ingress operator");

    let client = Client::try_default().await?;
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));

    let mut events = Fanout::new().with(Arc::new(LogSink));
    if cfg.kube_events_enabled() {
        events = events.with(Arc::new(KubeEventSink::new(client)));
    }
    let regulator = Arc::new(LogLevelRegulator::new(Arc::new(filter)));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    Operator::new(cfg, store, Arc::new(events), regulator)
        .start(cancel)
        .await?;
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
    cancel.cancel();
}
