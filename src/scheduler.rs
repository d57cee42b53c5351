//! Repeating timer that drives the simulation engine

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{models::TickSummary, simulation::SimulationEngine};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(30_000);

struct RunningTimer {
    interval: Duration,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the single simulation timer. Starting again replaces the previous timer.
pub struct Scheduler {
    engine: Arc<SimulationEngine>,
    timer: Mutex<Option<RunningTimer>>,
}

impl Scheduler {
    pub fn new(engine: Arc<SimulationEngine>) -> Self {
        Self {
            engine,
            timer: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<SimulationEngine> {
        &self.engine
    }

    /// Tick now, then every `interval`, until stopped or restarted.
    pub async fn start(&self, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        let mut timer = self.timer.lock().await;
        if let Some(previous) = timer.take() {
            debug!("Replacing running simulation timer");
            let _ = previous.stop.send(true);
        }

        let (stop, mut stopped) = watch::channel(false);
        let engine = self.engine.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }
                // Outside the select so a stop request never cuts a tick short.
                engine.tick().await;
                if *stopped.borrow() {
                    break;
                }
            }
        });

        *timer = Some(RunningTimer {
            interval,
            stop,
            handle,
        });
        info!(
            "IoT simulation started (updates every {} seconds)",
            interval.as_secs_f64()
        );
    }

    /// Cancel the pending timer. A tick already in progress completes.
    pub async fn stop(&self) -> bool {
        match self.timer.lock().await.take() {
            Some(running) => {
                let _ = running.stop.send(true);
                info!("IoT simulation stopped");
                true
            }
            None => false,
        }
    }

    pub async fn run_once(&self) -> TickSummary {
        self.engine.tick().await
    }

    pub async fn is_running(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub async fn interval(&self) -> Option<Duration> {
        self.timer.lock().await.as_ref().map(|running| running.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Bin, BinStatus},
        store::{Collection, FailingSaves, Store},
    };

    fn scheduler() -> Scheduler {
        let store = Arc::new(Store::in_memory());
        Scheduler::new(Arc::new(SimulationEngine::new(store, Some(11))))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_ticks_immediately_then_on_interval() {
        let scheduler = scheduler();
        scheduler.start(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(scheduler.engine().ticks_completed(), 1);
        assert!(scheduler.is_running().await);

        time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(scheduler.engine().ticks_completed(), 2);

        time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert!(scheduler.engine().ticks_completed() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_ticking() {
        let scheduler = scheduler();
        scheduler.start(Duration::from_secs(10)).await;
        settle().await;
        assert!(scheduler.stop().await);
        settle().await;
        let ticks = scheduler.engine().ticks_completed();

        time::advance(Duration::from_secs(100)).await;
        settle().await;
        assert_eq!(scheduler.engine().ticks_completed(), ticks);
        assert!(!scheduler.is_running().await);
        assert!(!scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_previous_timer() {
        let scheduler = scheduler();
        scheduler.start(Duration::from_secs(10)).await;
        settle().await;
        scheduler.start(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(scheduler.interval().await, Some(Duration::from_secs(60)));
        let ticks = scheduler.engine().ticks_completed();
        assert_eq!(ticks, 2);

        // Only the 60s timer is alive: nothing fires at the old 10s cadence.
        time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(scheduler.engine().ticks_completed(), ticks);

        time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(scheduler.engine().ticks_completed(), ticks + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_survives_a_failing_tick() {
        let stale = chrono::Utc::now() - chrono::Duration::hours(1);
        let bin = Bin {
            id: "BIN001".to_string(),
            location: "Sector 5, Jaipur".to_string(),
            fill_level: 45.0,
            gas_level: 2.0,
            status: BinStatus::Normal,
            last_updated: stale,
        };
        let store = Arc::new(Store {
            bins: Collection::new("bins", Box::new(FailingSaves::new(vec![bin], 1))),
            ..Store::in_memory()
        });
        let scheduler = Scheduler::new(Arc::new(SimulationEngine::new(store.clone(), Some(4))));

        scheduler.start(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(scheduler.engine().ticks_completed(), 1);
        let bin = store.bins.find_by_id("BIN001").await.unwrap().unwrap();
        assert_eq!(bin.last_updated, stale);

        time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(scheduler.engine().ticks_completed(), 2);
        assert!(scheduler.is_running().await);
        let bin = store.bins.find_by_id("BIN001").await.unwrap().unwrap();
        assert!(bin.last_updated > stale);
    }

    #[tokio::test]
    async fn run_once_does_not_start_the_timer() {
        let scheduler = scheduler();
        scheduler.run_once().await;
        assert_eq!(scheduler.engine().ticks_completed(), 1);
        assert!(!scheduler.is_running().await);
    }
}
