use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DroneError;

pub type FlightTimeSink = Arc<dyn Fn(Duration) + Send + Sync>;

/// Periodically reports the time elapsed since the current flight started.
///
/// Runs inside the scope it was created with. Once that scope is cancelled the timer is dead
/// and a new one has to be built from a fresh scope.
pub struct FlightTimeTimer {
    scope: CancellationToken,
    tick: Duration,
    sink: FlightTimeSink,
    run: Option<CancellationToken>,
}

impl FlightTimeTimer {
    pub fn new(scope: CancellationToken, tick: Duration, sink: FlightTimeSink) -> Self {
        Self {
            scope,
            tick,
            sink,
            run: None,
        }
    }

    /// Restarts counting from `started`, or stops and reports zero for `None`.
    pub fn update(&mut self, started: Option<Instant>) -> Result<(), DroneError> {
        if let Some(run) = self.run.take() {
            run.cancel();
        }

        if self.scope.is_cancelled() {
            return Err(DroneError::Cancelled);
        }

        let Some(started) = started else {
            (self.sink)(Duration::ZERO);
            return Ok(());
        };

        let run = self.scope.child_token();
        self.run = Some(run.clone());
        let sink = Arc::clone(&self.sink);
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = run.cancelled() => {
                        debug!("flight time timer stopped");
                        break;
                    }
                    _ = ticker.tick() => sink(started.elapsed()),
                }
            }
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.is_cancelled())
    }
}

impl Drop for FlightTimeTimer {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel();
        }
    }
}
