//! IoT sensor simulation for smart bins
//!
//! Each tick walks every persisted bin, advances its fill and gas readings
//! along a per-bin trend, re-derives the status and writes the bin back.
//! Status transitions are logged to the activity collection.

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    classifier::classify,
    error::ApiError,
    models::{Activity, ActivityType, Bin, BinStatus, TickSummary},
    store::Store,
};

pub const SENSOR_ACTOR: &str = "IoT Sensor System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Working memory for one bin, kept for the lifetime of the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    pub bin_id: String,
    pub fill_level: f64,
    pub gas_level: f64,
    pub status: BinStatus,
    pub trend: Trend,
    pub last_update: DateTime<Utc>,
}

impl SensorState {
    fn seeded(bin_id: &str, rng: &mut impl Rng, now: DateTime<Utc>) -> Self {
        Self {
            bin_id: bin_id.to_string(),
            fill_level: rng.gen_range(10..60) as f64,
            gas_level: rng.gen_range(1..4) as f64,
            status: BinStatus::Normal,
            trend: Trend::Increasing,
            last_update: now,
        }
    }
}

pub fn next_trend(fill_level: f64, status: BinStatus, rng: &mut impl Rng) -> Trend {
    match status {
        BinStatus::Empty => Trend::Increasing,
        BinStatus::Full | BinStatus::Hazard => Trend::Stable,
        BinStatus::Normal if fill_level < 50.0 => Trend::Increasing,
        BinStatus::Normal => {
            if rng.gen_bool(0.1) {
                Trend::Decreasing
            } else {
                Trend::Increasing
            }
        }
    }
}

/// Next fill percentage, clamped to 0..=100 and rounded to one decimal.
pub fn next_fill_level(current: f64, trend: Trend, rng: &mut impl Rng) -> f64 {
    let change = match trend {
        Trend::Increasing => rng.gen_range(1.0..5.0),
        Trend::Decreasing => -rng.gen_range(0.5..2.0),
        Trend::Stable => rng.gen_range(-1.0..1.0),
    } + rng.gen_range(-0.5..0.5);

    let level = (current + change).clamp(0.0, 100.0);
    (level * 10.0).round() / 10.0
}

/// Next gas level on the 1..=5 scale, driven by the new fill level.
pub fn next_gas_level(fill_level: f64, current: f64, rng: &mut impl Rng) -> f64 {
    let gas = if fill_level > 70.0 {
        current + rng.gen_range(0.0..0.5)
    } else if fill_level < 30.0 {
        current - rng.gen_range(0.0..0.3)
    } else {
        current + (rng.gen::<f64>() - 0.3) * 0.2
    };
    gas.clamp(1.0, 5.0).round()
}

/// Activity logged when a bin enters `status`.
pub fn transition_activity(bin: &Bin, now: DateTime<Utc>) -> Activity {
    let (kind, message) = match bin.status {
        BinStatus::Full => (
            ActivityType::Warning,
            format!("Bin {} is now FULL ({}%) - requires pickup", bin.id, bin.fill_level),
        ),
        BinStatus::Hazard => (
            ActivityType::Error,
            format!(
                "HAZARD detected at {} ({}% full, gas level: {}) - IMMEDIATE ATTENTION REQUIRED",
                bin.id, bin.fill_level, bin.gas_level
            ),
        ),
        BinStatus::Empty => (
            ActivityType::Success,
            format!("Bin {} is now EMPTY and ready for use", bin.id),
        ),
        BinStatus::Normal => (
            ActivityType::Info,
            format!("Bin {} status normalized ({}%)", bin.id, bin.fill_level),
        ),
    };
    Activity::new(kind, message, SENSOR_ACTOR, now)
}

struct Reading {
    prior: BinStatus,
    bin: Bin,
}

pub struct SimulationEngine {
    store: Arc<Store>,
    rng: Mutex<StdRng>,
    states: Mutex<HashMap<String, SensorState>>,
    ticks: AtomicU64,
}

impl SimulationEngine {
    pub fn new(store: Arc<Store>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            rng: Mutex::new(rng),
            states: Mutex::new(HashMap::new()),
            ticks: AtomicU64::new(0),
        }
    }

    /// Number of completed ticks since the engine was created.
    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub async fn tracked_bins(&self) -> usize {
        self.states.lock().await.len()
    }

    #[cfg(test)]
    pub async fn sensor_state(&self, bin_id: &str) -> Option<SensorState> {
        self.states.lock().await.get(bin_id).cloned()
    }

    /// Advance every bin by one step. Never fails: errors are logged and counted.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        let bins = match self.store.bins.read_all().await {
            Ok(bins) => bins,
            Err(e) => {
                warn!("Simulation tick could not read bins: {}", e);
                summary.failures += 1;
                self.ticks.fetch_add(1, Ordering::Relaxed);
                return summary;
            }
        };

        for bin in bins {
            match self.step_bin(&bin.id).await {
                Ok(Some(changed)) => {
                    summary.bins_updated += 1;
                    if changed {
                        summary.status_changes += 1;
                    }
                }
                // Deleted between the listing and the update.
                Ok(None) => {}
                Err(e) => {
                    warn!(bin_id = %bin.id, "Simulation step failed: {}", e);
                    summary.failures += 1;
                }
            }
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        debug!(
            updated = summary.bins_updated,
            changes = summary.status_changes,
            failures = summary.failures,
            "Simulation tick complete"
        );
        summary
    }

    /// Update one bin against its latest persisted record.
    /// Returns whether its status changed, or `None` if the bin is gone.
    async fn step_bin(&self, bin_id: &str) -> Result<Option<bool>, ApiError> {
        let now = Utc::now();
        let mut rng = self.rng.lock().await;
        let mut states = self.states.lock().await;
        let rng = &mut *rng;
        let states = &mut *states;

        let reading = self
            .store
            .bins
            .modify(bin_id, |bin| {
                let prior = bin.status;
                let state = states
                    .entry(bin.id.clone())
                    .or_insert_with(|| SensorState::seeded(&bin.id, rng, now));

                state.trend = next_trend(bin.fill_level, prior, rng);
                state.fill_level = next_fill_level(bin.fill_level, state.trend, rng);
                state.gas_level = next_gas_level(state.fill_level, bin.gas_level, rng);

                // Classify what is persisted so the stored status always matches the stored readings.
                bin.fill_level = state.fill_level.round();
                bin.gas_level = state.gas_level.round();
                bin.status = classify(bin.fill_level, bin.gas_level);
                bin.last_updated = now;

                state.status = bin.status;
                state.last_update = now;

                Reading {
                    prior,
                    bin: bin.clone(),
                }
            })
            .await?;

        let Some(reading) = reading else {
            return Ok(None);
        };

        let changed = reading.prior != reading.bin.status;
        if changed {
            info!(
                bin_id,
                from = %reading.prior,
                to = %reading.bin.status,
                "Bin status changed"
            );
            self.store
                .activities
                .create(transition_activity(&reading.bin, now))
                .await?;
        }
        Ok(Some(changed))
    }
}
