//! Per-stream staleness watchdog.
//!
//! Each stream subscribes to the transport on its own task. The sample handler runs for every
//! matching message, the stale handler runs once when the stream stays silent for longer than its
//! timeout and is re-armed by the next sample.

use std::time::Duration;

use chrono::{DateTime, Utc};
use mavlink::common::FLIGHT_INFORMATION_DATA;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::ReceivedMessage;

pub struct TelemetryStream<X> {
    pub name: &'static str,
    /// `None` for event streams that never go stale.
    pub timeout: Option<Duration>,
    pub extract: X,
}

impl<X> TelemetryStream<X> {
    pub fn new(name: &'static str, timeout: Option<Duration>, extract: X) -> Self {
        Self {
            name,
            timeout,
            extract,
        }
    }
}

/// Runs `stream` until `cancel` fires or the transport closes.
pub fn spawn_stream<T, X, H, S>(
    stream: TelemetryStream<X>,
    mut rx: broadcast::Receiver<ReceivedMessage>,
    cancel: CancellationToken,
    mut on_sample: H,
    mut on_stale: S,
) -> JoinHandle<()>
where
    T: Send + 'static,
    X: Fn(&ReceivedMessage) -> Option<T> + Send + 'static,
    H: FnMut(T) + Send + 'static,
    S: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let TelemetryStream {
            name,
            timeout,
            extract,
        } = stream;
        let mut stale = false;
        let mut deadline = timeout.map(|t| Instant::now() + t);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if !stale {
                        stale = true;
                        debug!("{} stream went stale", name);
                        on_stale();
                    }
                    deadline = timeout.map(|t| Instant::now() + t);
                }
                received = rx.recv() => match received {
                    Ok(message) => {
                        if let Some(sample) = extract(&message) {
                            stale = false;
                            deadline = timeout.map(|t| Instant::now() + t);
                            on_sample(sample);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{} stream lagged, skipped {} messages", name, skipped);
                    }
                    Err(RecvError::Closed) => {
                        debug!("{} stream closed", name);
                        break;
                    }
                },
            }
        }
    })
}

/// Time in the air according to FLIGHT_INFORMATION, `None` before takeoff.
pub fn flight_duration(info: &FLIGHT_INFORMATION_DATA, now: DateTime<Utc>) -> Option<Duration> {
    if info.takeoff_time_utc == 0 {
        return None;
    }

    let takeoff_micros = i64::try_from(info.takeoff_time_utc).ok()?;
    let takeoff = DateTime::<Utc>::from_timestamp_micros(takeoff_micros)?;
    Some((now - takeoff).to_std().unwrap_or(Duration::ZERO))
}
