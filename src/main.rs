//! Hedged fetch server.
//!
//! Serves `GET /api/smart?timeout=<ms>`, answering with the upstream payload
//! if any attempt succeeds within the budget. Configured through environment
//! variables (see `Settings::from_env`).

use std::sync::Arc;

use color_eyre::Result;
use hedged_fetch::{init_tracing, server, HttpUpstream, Metrics, Settings, SmartFetch};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let settings = Settings::from_env()?;
    let upstream = HttpUpstream::new(&settings.upstream)?;
    info!(
        upstream = upstream.url(),
        max_connections = settings.upstream.max_connections,
        max_keepalive = settings.upstream.max_keepalive,
        "upstream client initialized"
    );

    let metrics = Metrics::new()?;
    let service = SmartFetch::new(settings.hedge.clone(), Arc::new(upstream))
        .with_metrics(metrics.clone());

    server::serve(&settings.server, server::router(service, metrics))
        .await
        .map_err(|e| color_eyre::eyre::eyre!("{e:#}"))
}
