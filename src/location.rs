use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use drone_rescue_config::PositioningConfig;
use futures::{stream::LocalBoxStream, StreamExt};
use geoposition::GeoPosition;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;

/// One fix reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub position: GeoPosition,
    /// Radius of the 68% confidence circle, in meters.
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PositioningError {
    #[error("permission to access the location was denied")]
    PermissionDenied,
    #[error("location service unavailable: {0}")]
    Unavailable(String),
    #[error("no position within {0:?}")]
    Timeout(Duration),
}

impl PositioningError {
    /// Live tracking does not recover from these without outside intervention.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Timeout(_))
    }
}

/// Accuracy levels as GeoClue numbers them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Accuracy {
    City = 4,
    Exact = 8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    /// Longest wait for the next fix before reporting a timeout.
    pub timeout: Duration,
    /// Oldest acceptable fix. Zero disables the age check: the platform is asked for a
    /// fresh fix and whatever it hands back is taken.
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_millis(5000),
            maximum_age: Duration::ZERO,
        }
    }
}

impl From<&PositioningConfig> for WatchOptions {
    fn from(config: &PositioningConfig) -> Self {
        Self {
            enable_high_accuracy: config.enable_high_accuracy,
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.maximum_age_ms),
        }
    }
}

impl WatchOptions {
    pub fn accuracy(&self) -> Accuracy {
        if self.enable_high_accuracy {
            Accuracy::Exact
        } else {
            Accuracy::City
        }
    }

    fn is_fresh(&self, sample: &Sample, now: DateTime<Utc>) -> bool {
        if self.maximum_age.is_zero() {
            return true;
        }

        match (now - sample.timestamp).to_std() {
            Ok(age) => age <= self.maximum_age,
            // Stamped in the future: clock skew, not staleness.
            Err(_) => true,
        }
    }
}

pub type SampleStream = LocalBoxStream<'static, Sample>;

/// A platform positioning service.
pub trait PositionSource {
    fn open(
        &self,
        accuracy: Accuracy,
    ) -> impl Future<Output = Result<SampleStream, PositioningError>>;
}

/// Owns the sampling task; dropping it clears the watch.
pub struct PositionWatcher {
    task: JoinHandle<()>,
}

impl Drop for PositionWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts watching `source`, yielding fixes and errors as they occur.
///
/// An error opening the source is reported once and ends the stream. Timeouts are
/// reported each time `options.timeout` passes without a fresh fix, and the watch
/// carries on.
pub fn watch_position<S>(
    source: S,
    options: WatchOptions,
) -> (
    PositionWatcher,
    ReceiverStream<Result<Sample, PositioningError>>,
)
where
    S: PositionSource + 'static,
{
    let (tx, rx) = mpsc::channel(8);

    let task = tokio::task::spawn_local(async move {
        let mut samples = match source.open(options.accuracy()).await {
            Ok(samples) => samples,
            Err(err) => {
                log::error!("failed to start position watch: {err}");
                _ = tx.send(Err(err)).await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = tokio::time::timeout(options.timeout, samples.next()) => {
                    let sample = match next {
                        Ok(Some(sample)) => sample,
                        Ok(None) => {
                            _ = tx
                                .send(Err(PositioningError::Unavailable(
                                    "position source closed".to_owned(),
                                )))
                                .await;
                            break;
                        }
                        Err(_) => {
                            if tx.send(Err(PositioningError::Timeout(options.timeout))).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };

                    if !options.is_fresh(&sample, Utc::now()) {
                        log::debug!("dropping stale fix from {}", sample.timestamp);
                        continue;
                    }

                    if tx.send(Ok(sample)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (PositionWatcher { task }, ReceiverStream::new(rx))
}
