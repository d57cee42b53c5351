//! Demo data for an empty store

use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::{
    classifier::classify,
    error::ApiError,
    models::{Bin, Citizen, Contractor, EnvironmentalImpact, WeeklyStats},
    store::Store,
};

/// (id, location, fill range, gas range), upper bounds exclusive.
const DEFAULT_BINS: [(&str, &str, (u32, u32), (u32, u32)); 5] = [
    ("BIN001", "Sector 5, Jaipur", (30, 70), (1, 3)),
    ("BIN002", "Vaishali Nagar, Jaipur", (80, 95), (3, 5)),
    ("BIN003", "Malviya Nagar, Jaipur", (0, 20), (1, 2)),
    ("BIN004", "C-Scheme, Jaipur", (50, 80), (2, 4)),
    ("BIN005", "Raja Park, Jaipur", (10, 35), (1, 2)),
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub bins: usize,
    pub citizens: usize,
    pub contractors: usize,
}

/// Fill each empty collection with demo records. Collections that already hold data are left alone.
pub async fn seed_defaults(store: &Store) -> Result<SeedReport, ApiError> {
    let mut seeded = SeedReport::default();
    let now = Utc::now();

    if store.bins.read_all().await?.is_empty() {
        let bins: Vec<Bin> = {
            let mut rng = rand::thread_rng();
            DEFAULT_BINS
                .iter()
                .map(|(id, location, (fill_lo, fill_hi), (gas_lo, gas_hi))| {
                    let fill_level = rng.gen_range(*fill_lo..*fill_hi) as f64;
                    let gas_level = rng.gen_range(*gas_lo..*gas_hi) as f64;
                    Bin {
                        id: id.to_string(),
                        location: location.to_string(),
                        fill_level,
                        gas_level,
                        status: classify(fill_level, gas_level),
                        last_updated: now,
                    }
                })
                .collect()
        };
        for bin in bins {
            store.bins.create(bin).await?;
            seeded.bins += 1;
        }
    }

    if store.citizens.read_all().await?.is_empty() {
        let mut citizen = Citizen::new("Demo Citizen", "citizen@example.com");
        citizen.id = "citizen-1".to_string();
        citizen.points = 1250;
        citizen.reports_submitted = 8;
        citizen.environmental_impact = EnvironmentalImpact {
            co2_saved: 12.5,
            waste_disposed: 45.0,
            recycling_rate: 78.0,
        };
        store.citizens.create(citizen).await?;
        seeded.citizens += 1;
    }

    if store.contractors.read_all().await?.is_empty() {
        let mut contractor = Contractor::new("Demo Contractor", "contractor@example.com");
        contractor.id = "contractor-1".to_string();
        contractor.todays_earnings = 245.50;
        contractor.completed_pickups = 8;
        contractor.weekly_stats = WeeklyStats {
            pickups_completed: 47,
            total_earnings: 1175.00,
            efficiency_rating: 4.8,
            on_time_rate: 96.0,
        };
        store.contractors.create(contractor).await?;
        seeded.contractors += 1;
    }

    if seeded != SeedReport::default() {
        info!(
            bins = seeded.bins,
            citizens = seeded.citizens,
            contractors = seeded.contractors,
            "Seeded default data"
        );
    }
    Ok(seeded)
}
