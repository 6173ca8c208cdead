//! Periodic polling of tracked entries
//!
//! Every polled entry gets its own task on its own interval, so a slow
//! repository never delays the others. Entries pinned to a commit are not
//! scheduled at all. The entry list is read again every interval: entries
//! added by another process start polling, and removed ones stop.

use super::tracker::Tracker;
use crate::core::{TesterError, TesterResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct Scheduler {
    tracker: Arc<Tracker>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(tracker: Arc<Tracker>, interval: Duration) -> Self {
        Self { tracker, interval }
    }

    /// Domains that should have a polling task
    fn polled_domains(&self) -> TesterResult<Vec<String>> {
        Ok(self
            .tracker
            .entries()?
            .into_iter()
            .filter(|state| state.tracked_reference.is_polled())
            .map(|state| state.integration_domain)
            .collect())
    }

    /// Poll until `shutdown` completes, then stop every task
    ///
    /// Returns the number of entries still being polled at shutdown.
    pub async fn run_until<F>(self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut tasks: HashMap<String, JoinHandle<()>> = HashMap::new();
        let mut rescan = tokio::time::interval(self.interval);
        rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = rescan.tick() => {
                    tasks.retain(|_, handle| !handle.is_finished());
                    match self.polled_domains() {
                        Ok(domains) => {
                            for domain in domains {
                                if tasks.contains_key(&domain) {
                                    continue;
                                }
                                tracing::info!("Polling {} every {:?}", domain, self.interval);
                                let handle = poll_entry(self.tracker.clone(), domain.clone(), self.interval);
                                tasks.insert(domain, handle);
                            }
                        }
                        Err(e) => tracing::error!("Cannot read tracked entries: {}", e),
                    }
                }
            }
        }

        let count = tasks.len();
        for handle in tasks.into_values() {
            handle.abort();
        }
        tracing::info!("Polling stopped");
        count
    }
}

fn poll_entry(tracker: Arc<Tracker>, domain: String, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match tracker.check(&domain).await {
                Ok(report) => {
                    if let Some(sha) = &report.installed {
                        tracing::info!("{}: installed {}", domain, sha);
                    }
                    if let Some(failure) = &report.failure {
                        tracing::warn!("{}: {}", domain, failure);
                    }
                }
                Err(TesterError::NotTracked(_)) => {
                    tracing::info!("{} is no longer tracked; stopping its poll", domain);
                    break;
                }
                Err(e) => tracing::error!("{}: check failed: {}", domain, e),
            }
        }
    })
}
