//! `scanaware run`: Drive the aggregation job until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use scanaware_common::constants::DEFAULT_TICK_INTERVAL;
use scanaware_runtime::backend::detect_backend;
use scanaware_runtime::job::ScanJob;
use scanaware_runtime::settings::FileSettings;

use super::Paths;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between ticks.
    #[arg(long, default_value_t = DEFAULT_TICK_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
}

/// Executes the `run` command.
///
/// Ticks the job on a fixed interval. Ctrl-C stops the scanner and flushes
/// the pending counters before exiting.
///
/// # Errors
///
/// Returns an error if the runtime, the store, or the signal handler
/// cannot be set up.
pub fn execute(args: &RunArgs, paths: &Paths) -> anyhow::Result<()> {
    let store = Arc::new(paths.open_store()?);
    let settings = FileSettings::new(&paths.settings);
    let backend = detect_backend();
    if !backend.supported() {
        tracing::warn!("scan detection is unsupported on this host; records will not grow");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut job = ScanJob::new(Box::new(settings), backend, store);
        tracing::info!(
            settings = %paths.settings.display(),
            store = %paths.store.display(),
            interval_secs = args.interval,
            "scanaware running, press Ctrl-C to stop"
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(args.interval));
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = job.tick();
                    tracing::debug!(?report, "tick complete");
                }
                result = &mut shutdown => {
                    result?;
                    break;
                }
            }
        }

        let flushed = job.shutdown().await;
        tracing::info!(flushed, "scanaware stopped");
        Ok::<(), anyhow::Error>(())
    })
}
