//! Background ingestion thread.
//!
//! Owns the read side of the link: blocks in `read_line` for at most the
//! configured read timeout, hands every line to the target, and sleeps an
//! idle backoff whenever the link is absent, closed or faulted. It never
//! exits on bad data or I/O errors; only the shutdown flag stops it.
//!
//! Each `Ingestor` spawns exactly one thread that is shut down and joined when
//! the `Ingestor` is dropped.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use servo_traits::clock::Clock;

use crate::config::IngestCfg;
use crate::link::SerialLink;
use crate::types::ConnectionState;

/// What the ingestion thread feeds.
pub trait IngestTarget: Send + Sync {
    /// The link to read from right now, if any.
    fn link(&self) -> Option<Arc<SerialLink>>;
    /// Called for every line read, empty ones included.
    fn ingest_line(&self, line: &str);
    /// Called once each time the link goes from connected to faulted.
    fn link_faulted(&self) {}
}

pub struct Ingestor {
    shutdown: Arc<AtomicBool>,
    lines: Arc<AtomicU64>,
    join_handle: Option<JoinHandle<()>>,
}

impl Ingestor {
    pub fn spawn<T: IngestTarget + 'static>(
        target: Arc<T>,
        cfg: IngestCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let lines = Arc::new(AtomicU64::new(0));
        let lines_clone = lines.clone();

        let join_handle = std::thread::Builder::new()
            .name("servo-ingest".to_string())
            .spawn(move || {
                let mut last_state = ConnectionState::Disconnected;
                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        tracing::debug!("ingest thread received shutdown signal");
                        break;
                    }

                    let link = target.link();
                    let state = link
                        .as_ref()
                        .map_or(ConnectionState::Disconnected, |l| l.state());
                    if state == ConnectionState::Faulted && last_state != ConnectionState::Faulted {
                        target.link_faulted();
                    }
                    last_state = state;

                    match link {
                        Some(link) if state == ConnectionState::Connected => {
                            if let Some(line) = link.read_line(cfg.read_timeout) {
                                lines_clone.fetch_add(1, Ordering::Relaxed);
                                target.ingest_line(&line);
                            }
                        }
                        _ => clock.sleep(cfg.idle_backoff),
                    }
                }
                tracing::trace!("ingest thread exiting cleanly");
            });

        let join_handle = match join_handle {
            Ok(h) => Some(h),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn ingest thread; no feedback will be read");
                None
            }
        };

        Self {
            shutdown,
            lines,
            join_handle,
        }
    }

    /// Lines handed to the target so far.
    pub fn lines_read(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the thread to stop without waiting for it.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for Ingestor {
    fn drop(&mut self) {
        self.request_shutdown();

        // The thread exits after its current read_line returns: at once if
        // the link was closed first, otherwise within the read timeout.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("ingest thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "ingest thread panicked during shutdown");
                }
            }
        }
    }
}
