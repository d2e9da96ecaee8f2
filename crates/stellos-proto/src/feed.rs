//! RemoteTrackFeed — polls the live track listing on a fixed period.
//!
//! ```text
//!   start() ── ticker task ── tick ──► spawn fetch(seq=1) ──► on_snapshot
//!                         └── tick ──► spawn fetch(seq=2) ──► on_snapshot
//! ```
//!
//! Every fetch runs in its own task, so a slow fetch can finish after a newer
//! one.  Snapshots carry their issue `seq`; the consumer applies
//! last-issued-wins.  Failed fetches are skipped: no callback, no backoff, the
//! next tick tries again.
//!
//! Cancellation flips a liveness flag instead of aborting transports.  The flag
//! is checked and the callback run under one lock, so once `cancel()` returns
//! no snapshot is delivered, even from a fetch that was already in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::track::Track;

/// Anything that can produce the current LIVE track list.
pub trait TrackSource: Send + Sync + 'static {
    fn fetch_live(&self) -> BoxFuture<'static, anyhow::Result<Vec<Track>>>;
}

impl TrackSource for ApiClient {
    fn fetch_live(&self) -> BoxFuture<'static, anyhow::Result<Vec<Track>>> {
        let client = self.clone();
        Box::pin(async move { Ok(client.fetch_live_tracks().await?) })
    }
}

/// A full replacement of the track list, never a patch.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    /// Issue order of the fetch that produced this snapshot (1-based).
    pub seq: u64,
    pub tracks: Vec<Track>,
    pub fetched_at: DateTime<Local>,
}

struct Liveness(Mutex<bool>);

impl Liveness {
    fn new() -> Self {
        Self(Mutex::new(true))
    }

    fn is_alive(&self) -> bool {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn kill(&self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    /// Run `f` only while alive, holding the lock for the duration.
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let alive = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if *alive {
            f();
        }
        *alive
    }
}

/// Owns the polling task.  Dropping the handle cancels the feed.
pub struct FeedHandle {
    liveness: Arc<Liveness>,
    ticker: JoinHandle<()>,
}

impl FeedHandle {
    pub fn cancel(&self) {
        self.liveness.kill();
        self.ticker.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        !self.liveness.is_alive()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start polling `source` every `period`, first fetch immediately.
///
/// `on_snapshot` runs on a runtime worker while the liveness lock is held, so
/// it must be quick (typically a `try_send` into the UI loop).
pub fn start<S, F>(source: Arc<S>, period: Duration, on_snapshot: F) -> FeedHandle
where
    S: TrackSource + ?Sized,
    F: Fn(FeedSnapshot) + Send + Sync + 'static,
{
    let liveness = Arc::new(Liveness::new());
    let on_snapshot = Arc::new(on_snapshot);
    let failures = Arc::new(AtomicU64::new(0));

    let ticker_liveness = Arc::clone(&liveness);
    let ticker = tokio::spawn(async move {
        info!("[feed] polling every {:?}", period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seq = 0u64;

        loop {
            interval.tick().await;
            if !ticker_liveness.is_alive() {
                break;
            }
            seq += 1;

            let fetch = source.fetch_live();
            let liveness = Arc::clone(&ticker_liveness);
            let on_snapshot = Arc::clone(&on_snapshot);
            let failures = Arc::clone(&failures);
            let this_seq = seq;
            tokio::spawn(async move {
                match fetch.await {
                    Ok(tracks) => {
                        let previous_failures = failures.swap(0, Ordering::Relaxed);
                        if previous_failures > 0 {
                            info!("[feed] recovered after {} failed fetches", previous_failures);
                        }
                        let count = tracks.len();
                        let snapshot = FeedSnapshot {
                            seq: this_seq,
                            tracks,
                            fetched_at: Local::now(),
                        };
                        if liveness.deliver(|| on_snapshot(snapshot)) {
                            debug!("[feed] seq={} delivered {} tracks", this_seq, count);
                        } else {
                            debug!("[feed] seq={} finished after cancel, dropped", this_seq);
                        }
                    }
                    Err(e) => {
                        // First failure of a streak is worth a warning; the
                        // rest would repeat it every period.
                        if failures.fetch_add(1, Ordering::Relaxed) == 0 {
                            warn!("[feed] fetch seq={} failed: {}", this_seq, e);
                        } else {
                            debug!("[feed] fetch seq={} failed: {}", this_seq, e);
                        }
                    }
                }
            });
        }
        debug!("[feed] ticker exiting");
    });

    FeedHandle { liveness, ticker }
}
