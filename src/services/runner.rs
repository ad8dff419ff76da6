//! Bounded-concurrency batch checks.
//!
//! Workers pull backlink ids from a shared queue; each id is checked at
//! most once per batch. Progress is reported through an event channel so
//! the CLI can draw it without the runner knowing about terminals.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use super::monitor::BacklinkMonitor;
use crate::models::{AlertType, BacklinkStatus};

/// Progress events emitted during a batch.
#[derive(Debug, Clone)]
pub enum CheckEvent {
    Started {
        worker_id: usize,
        backlink_id: i32,
    },
    Finished {
        worker_id: usize,
        backlink_id: i32,
        previous: BacklinkStatus,
        status: BacklinkStatus,
        alert: Option<AlertType>,
    },
    Failed {
        worker_id: usize,
        backlink_id: i32,
        error: String,
    },
}

/// Totals for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub checked: usize,
    pub present: usize,
    pub lost: usize,
    pub changed: usize,
    pub alerts: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    checked: AtomicUsize,
    present: AtomicUsize,
    lost: AtomicUsize,
    changed: AtomicUsize,
    alerts: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn summary(&self) -> RunSummary {
        RunSummary {
            checked: self.checked.load(Ordering::Relaxed),
            present: self.present.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Runs many backlink checks with a fixed number of workers.
pub struct CheckRunner {
    monitor: BacklinkMonitor,
    workers: usize,
}

impl CheckRunner {
    pub fn new(monitor: BacklinkMonitor, workers: usize) -> Self {
        Self {
            monitor,
            workers: workers.max(1),
        }
    }

    /// Check every id in `ids`, skipping duplicates.
    pub async fn run(&self, ids: Vec<i32>, event_tx: mpsc::Sender<CheckEvent>) -> RunSummary {
        let mut seen = HashSet::new();
        let queue: VecDeque<i32> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        if queue.is_empty() {
            return RunSummary::default();
        }

        let workers = self.workers.min(queue.len());
        let queue = Arc::new(Mutex::new(queue));
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let counters = counters.clone();
            let monitor = self.monitor.clone();
            let event_tx = event_tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let Some(backlink_id) = queue.lock().await.pop_front() else {
                        break;
                    };

                    let _ = event_tx
                        .send(CheckEvent::Started {
                            worker_id,
                            backlink_id,
                        })
                        .await;

                    match monitor.run(backlink_id).await {
                        Ok(outcome) => {
                            counters.checked.fetch_add(1, Ordering::Relaxed);
                            if outcome.result.is_present {
                                counters.present.fetch_add(1, Ordering::Relaxed);
                            }
                            match outcome.status() {
                                BacklinkStatus::Lost => {
                                    counters.lost.fetch_add(1, Ordering::Relaxed);
                                }
                                BacklinkStatus::Changed => {
                                    counters.changed.fetch_add(1, Ordering::Relaxed);
                                }
                                BacklinkStatus::Active => {}
                            }
                            if outcome.alert.is_some() {
                                counters.alerts.fetch_add(1, Ordering::Relaxed);
                            }
                            let _ = event_tx
                                .send(CheckEvent::Finished {
                                    worker_id,
                                    backlink_id,
                                    previous: outcome.previous_status,
                                    status: outcome.status(),
                                    alert: outcome.alert.as_ref().map(|a| a.alert.alert_type),
                                })
                                .await;
                        }
                        Err(e) => {
                            warn!("Check of backlink {} failed: {}", backlink_id, e);
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            let _ = event_tx
                                .send(CheckEvent::Failed {
                                    worker_id,
                                    backlink_id,
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    }
                }
            }));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Check worker panicked: {}", e);
            }
        }

        counters.summary()
    }
}
