//! # Sensor Source Module
//!
//! Sensor devices are read with blocking calls, so each source runs on its
//! own thread and hands samples to the event loop through a bounded channel.
//!
//! Dropping the [`SensorStream`] detaches the source: the reader thread sees
//! the closed channel on its next sample and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::sample::OrientationSample;
use crate::error::Result;

/// Default number of samples buffered between reader thread and event loop.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 64;

/// Blocking source of orientation samples.
pub trait SensorSource: Send + 'static {
    /// Blocks until at least one sample is available.
    ///
    /// # Errors
    ///
    /// Returns error if the device disappears or cannot be read.
    fn read_samples(&mut self) -> Result<Vec<OrientationSample>>;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;
}

/// Async handle on a running sensor source.
#[derive(Debug)]
pub struct SensorStream {
    receiver: mpsc::Receiver<OrientationSample>,
    stop: Arc<AtomicBool>,
}

impl SensorStream {
    /// Starts a reader thread for `source`.
    ///
    /// # Arguments
    ///
    /// * `source` - Blocking sensor implementation
    /// * `capacity` - Samples buffered before new samples are dropped
    #[must_use]
    pub fn spawn<S: SensorSource>(mut source: S, capacity: usize) -> Self {
        let (tx, receiver) = mpsc::channel(capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        thread::spawn(move || {
            info!("Sensor reader started for {}", source.name());
            'read: while !thread_stop.load(Ordering::Acquire) {
                let samples = match source.read_samples() {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("Sensor {} failed: {}", source.name(), e);
                        break;
                    }
                };

                for sample in samples {
                    match tx.try_send(sample) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("Sensor buffer full, dropping sample");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break 'read,
                    }
                }
            }
            info!("Sensor reader stopped for {}", source.name());
        });

        Self { receiver, stop }
    }

    /// Wraps an existing channel, e.g. samples produced by another task.
    #[must_use]
    pub fn from_receiver(receiver: mpsc::Receiver<OrientationSample>) -> Self {
        Self {
            receiver,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Waits for the next sample. Returns `None` once the source has ended.
    pub async fn recv(&mut self) -> Option<OrientationSample> {
        self.receiver.recv().await
    }
}

impl Drop for SensorStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.receiver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AirBridgeError;

    struct ScriptedSensor {
        batches: Vec<Vec<OrientationSample>>,
    }

    impl SensorSource for ScriptedSensor {
        fn read_samples(&mut self) -> Result<Vec<OrientationSample>> {
            if self.batches.is_empty() {
                return Err(AirBridgeError::Sensor("script exhausted".into()));
            }
            Ok(self.batches.remove(0))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_spawned_stream_delivers_in_order() {
        let sensor = ScriptedSensor {
            batches: vec![
                vec![OrientationSample::new(1.0, 0.0), OrientationSample::new(2.0, 0.0)],
                vec![OrientationSample::new(3.0, 0.0)],
            ],
        };
        let mut stream = SensorStream::spawn(sensor, 8);

        assert_eq!(stream.recv().await.map(|s| s.roll), Some(1.0));
        assert_eq!(stream.recv().await.map(|s| s.roll), Some(2.0));
        assert_eq!(stream.recv().await.map(|s| s.roll), Some(3.0));
        // Source error ends the stream
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_closes_channel() {
        let (tx, rx) = mpsc::channel(4);
        let stream = SensorStream::from_receiver(rx);
        drop(stream);
        assert!(tx.send(OrientationSample::new(1.0, 1.0)).await.is_err());
    }
}
