//! Periodic job scheduler.
//!
//! Drives the scheduled-scraping sweep and the cleanup job on independent
//! timers until a shutdown signal arrives. Overlapping fires are harmless:
//! the orchestrator's entry points coalesce duplicates on their keys.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::tasks::Orchestrator;

/// Run the periodic scrape/cleanup loop until ctrl-c.
pub async fn run(orchestrator: Arc<Orchestrator>) -> Result<()> {
    let schedule = orchestrator.config().schedule.clone();

    let mut scrape = interval(Duration::from_secs(schedule.scrape_interval_secs.max(1)));
    scrape.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cleanup = interval(Duration::from_secs(schedule.cleanup_interval_secs.max(1)));
    cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!(
        "scheduler started: scraping every {}s, cleanup every {}s",
        schedule.scrape_interval_secs,
        schedule.cleanup_interval_secs
    );

    loop {
        tokio::select! {
            _ = scrape.tick() => {
                orchestrator.run_scheduled_scraping().await;
            }
            _ = cleanup.tick() => {
                orchestrator.run_cleanup(None).await;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutdown signal received, stopping scheduler");
                break;
            }
        }
    }

    Ok(())
}
