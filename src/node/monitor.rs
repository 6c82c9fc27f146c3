//! Background monitors
//!
//! Two periodic loops feed the node service: the disk-space poller
//! re-measures every volume and casts the measured subset back, and the tag
//! refresher rebuilds the index from disk and casts the replacement.
//! Neither is authoritative: the service merges volume snapshots and swaps
//! the index whole. A supervisor restarts any loop that fails or panics; a
//! loop that finds the service gone ends quietly.

use crate::common::{Error, Result};
use crate::node::server::MonitorLink;
use crate::node::tags::TagIndex;
use crate::node::volume;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const RESTART_DELAY: Duration = Duration::from_secs(1);

pub(crate) fn spawn_monitors(link: MonitorLink, disk_interval: Duration, tag_interval: Duration) {
    supervise("diskspace", {
        let link = link.clone();
        move || diskspace_loop(link.clone(), disk_interval)
    });
    supervise("tag-refresh", move || {
        tag_refresh_loop(link.clone(), tag_interval)
    });
}

/// Keep one monitor alive: respawn on error or panic, stop for good when
/// the loop reports a clean end (service gone).
fn supervise<F, Fut>(name: &'static str, make: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match tokio::spawn(make()).await {
                Ok(Ok(())) => {
                    tracing::debug!("{} monitor stopped", name);
                    break;
                }
                Ok(Err(e)) => tracing::error!("{} monitor failed: {}", name, e),
                Err(e) => tracing::error!("{} monitor panicked: {}", name, e),
            }
            tokio::time::sleep(RESTART_DELAY).await;
        }
    });
}

async fn diskspace_loop(link: MonitorLink, period: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately; startup already measured once
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some((root, volumes)) = link.volumes().await else {
            return Ok(());
        };
        let measured = tokio::task::spawn_blocking(move || volume::refresh(&root, &volumes))
            .await
            .map_err(|e| Error::Internal(format!("diskspace task failed: {}", e)))?;
        if !link.update_volumes(measured) {
            return Ok(());
        }
    }
}

async fn tag_refresh_loop(link: MonitorLink, period: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some((root, volumes)) = link.volumes().await else {
            return Ok(());
        };
        let index = tokio::task::spawn_blocking(move || TagIndex::scan(&root, &volumes))
            .await
            .map_err(|e| Error::Internal(format!("tag scan task failed: {}", e)))?;
        if !link.update_tags(index) {
            return Ok(());
        }
    }
}
