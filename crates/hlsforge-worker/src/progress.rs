//! Per-job progress state and rendering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared per-rendition completion percentages for one job.
///
/// One instance per active job, owned by its orchestrator; jobs run
/// sequentially per worker so there is no cross-job contention. Writes are
/// last-write-wins per label. Values are not clamped at 100: the encoder can
/// report timestamps past the container duration and we keep what it says.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<HashMap<String, f64>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset state to 0% for exactly the given labels, dropping any others.
    pub fn reset(&self, labels: &[String]) {
        let mut map = self.inner.lock().expect("progress lock poisoned");
        map.clear();
        for label in labels {
            map.insert(label.clone(), 0.0);
        }
    }

    /// Record the latest percentage for a rendition.
    pub fn update(&self, label: &str, percent: f64) {
        let mut map = self.inner.lock().expect("progress lock poisoned");
        map.insert(label.to_string(), percent);
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.inner.lock().expect("progress lock poisoned").clone()
    }
}

/// Spawn the renderer task: one bar per rendition, redrawn on a fixed
/// interval and once more when the cancellation signal fires.
///
/// Purely observational; encode tasks never wait on it.
pub fn spawn_renderer(
    tracker: Arc<ProgressTracker>,
    labels: Vec<String>,
    interval: Duration,
    mut cancel_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{prefix:>8} {wide_bar} {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bars: Vec<(String, ProgressBar)> = labels
            .into_iter()
            .map(|label| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(label.clone());
                (label, bar)
            })
            .collect();

        let redraw = |bars: &[(String, ProgressBar)]| {
            let snapshot = tracker.snapshot();
            for (label, bar) in bars {
                if let Some(&pct) = snapshot.get(label) {
                    // The bar itself saturates at its length; snapshot()
                    // still exposes the raw value.
                    bar.set_position(pct.clamp(0.0, 100.0) as u64);
                }
            }
        };

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => redraw(&bars),
                result = cancel_rx.wait_for(|cancelled| *cancelled) => {
                    redraw(&bars);
                    for (_, bar) in &bars {
                        bar.finish();
                    }
                    // A dropped sender ends the loop the same as a signal.
                    let _ = result;
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_zeroes_given_labels() {
        let tracker = ProgressTracker::new();
        tracker.update("stale", 80.0);

        tracker.reset(&["360p".to_string(), "720p".to_string()]);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["360p"], 0.0);
        assert_eq!(snapshot["720p"], 0.0);
        assert!(!snapshot.contains_key("stale"));
    }

    #[test]
    fn test_update_is_last_write_wins() {
        let tracker = ProgressTracker::new();
        tracker.reset(&["360p".to_string()]);
        tracker.update("360p", 10.0);
        tracker.update("360p", 45.5);

        assert_eq!(tracker.snapshot()["360p"], 45.5);
    }

    #[test]
    fn test_snapshot_preserves_values_above_hundred() {
        let tracker = ProgressTracker::new();
        tracker.update("720p", 104.2);

        assert_eq!(tracker.snapshot()["720p"], 104.2);
    }

    #[tokio::test]
    async fn test_renderer_stops_on_cancel() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.reset(&["360p".to_string()]);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = spawn_renderer(
            Arc::clone(&tracker),
            vec!["360p".to_string()],
            Duration::from_millis(10),
            cancel_rx,
        );

        tracker.update("360p", 50.0);
        cancel_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("renderer did not stop after cancel")
            .unwrap();
    }
}
