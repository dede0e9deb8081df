//! Mini Memo - demo runner
//!
//! Memoizes a simulated slow lookup and shows coalescing and caching at work.

use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_memo::{spawn_sweep_task, Config, Memoizer, StorageKind};

/// Entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the memoizer and start the expired entry sweeper
/// 4. Fire concurrent identical calls, then a repeat call
/// 5. Report call statistics and stop the sweeper
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_memo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mini Memo demo");

    let config = Config::from_env();
    info!(
        "Configuration loaded: version={}, expire={}ms, storage_dir={:?}, sweep_interval={}s",
        config.default_version, config.default_expire_ms, config.storage_dir, config.sweep_interval
    );

    let memoizer = Memoizer::from_config(&config)?;
    let host = memoizer.host();
    let sweep_handle = spawn_sweep_task(host.storages(), host.clock(), config.sweep_interval);

    let storage = if config.storage_dir.is_some() {
        StorageKind::Local
    } else {
        StorageKind::Memory
    };
    let fetch_options = memoizer.wrap(
        |(page,): (u32,)| async move {
            info!("Fetching options page {}", page);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>((0..3).map(|i| format!("option-{}-{}", page, i)).collect::<Vec<_>>())
        },
        memoizer.options().storage(storage).cache_key("fetch_options"),
    )?;

    let (a, b, c) = tokio::join!(
        fetch_options.call((1,)),
        fetch_options.call((1,)),
        fetch_options.call((1,))
    );
    info!("Concurrent results: {:?} / {:?} / {:?}", a, b, c);

    let repeat = fetch_options.call((1,)).await;
    info!("Repeat result: {:?}", repeat);

    let stats = fetch_options.stats();
    info!(
        "Stats: calls={}, invocations={}, coalesced={}, cache_hits={}, hit_rate={:.2}",
        stats.calls,
        stats.invocations,
        stats.coalesced,
        stats.cache_hits,
        stats.hit_rate()
    );

    sweep_handle.abort();
    info!("Demo complete");
    Ok(())
}
