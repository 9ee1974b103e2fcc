//! Interval loop driving evaluation cycles.

use std::time::{Duration, Instant};

use crate::engine::Engine;

/// Runs the engine on a fixed cadence. There is no cancellation of an
/// in-flight cycle; missed ticks are skipped rather than queued.
pub struct Scheduler {
    engine: Engine,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Engine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Run evaluation cycles forever at the configured cadence.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let started = Instant::now();
            match self.engine.run_cycle().await {
                Ok(()) => {
                    tracing::info!("evaluation cycle finished in {:?}", started.elapsed());
                }
                Err(e) => {
                    // The cycle's work is lost, but the next tick starts fresh
                    // from the last committed state.
                    tracing::error!("evaluation cycle failed: {}", e);
                }
            }
        }
    }
}
