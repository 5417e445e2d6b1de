use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pgaggregate::catalog::init_global;
use pgaggregate::exec::ParallelAggregate;
use pgaggregate::system_catalog::frame_for;
use pgaggregate::{Datum, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = EngineConfig::from_env()?;

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_filter))
        .context("building log filter")?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "pgagg",
        "pgaggregate starting: RUST_LOG='{}', workers={}, partition_mode={:?}, state_boundary={:?}, extra_seed={:?}",
        rust_log, cfg.workers, cfg.partition_mode, cfg.state_boundary, cfg.extra_seed_path
    );

    let registry = init_global(&cfg).context("loading aggregate registry")?;
    info!(target: "pgagg::registry", "{} aggregates registered", registry.len());

    if let Some(df) = frame_for("pg_catalog.pg_aggregate", &registry) {
        println!("{}", df);
    }

    // smoke check: sum(int4) over a few groups
    let sum = registry.lookup_by_name("sum", &[pgaggregate::datum::type_oid::INT4])?;
    let rows: Vec<(i32, Vec<Datum>)> = (1..=1000).map(|i| (i % 4, vec![Datum::Int4(i)])).collect();
    let results = ParallelAggregate::from_config(Arc::clone(&sum), &cfg).run(rows).await?;
    for (group, result) in results {
        println!("sum(int4) group {}: {}", group, result?);
    }
    Ok(())
}
