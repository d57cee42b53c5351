//! Dashboard counters

use chrono::{DateTime, Duration, Months, Utc};

use crate::{
    error::ApiError,
    models::{AnalyticsResponse, Bin, BinStatus, LedgerTransaction, PickupAction},
    store::Store,
};

fn count_status(bins: &[Bin], status: BinStatus) -> usize {
    bins.iter().filter(|b| b.status == status).count()
}

/// Bin and collection counters over the given snapshot.
pub fn summarize(bins: &[Bin], ledger: &[LedgerTransaction], now: DateTime<Utc>) -> AnalyticsResponse {
    let collected: Vec<DateTime<Utc>> = ledger
        .iter()
        .filter(|tx| tx.action == PickupAction::Collected)
        .map(|tx| tx.timestamp)
        .collect();

    let week_ago = now - Duration::days(7);
    let month_ago = now.checked_sub_months(Months::new(1)).unwrap_or(week_ago);

    let avg_fill_level = if bins.is_empty() {
        0
    } else {
        (bins.iter().map(|b| b.fill_level).sum::<f64>() / bins.len() as f64).round() as i64
    };

    AnalyticsResponse {
        total_bins: bins.len(),
        full_bins: count_status(bins, BinStatus::Full),
        normal_bins: count_status(bins, BinStatus::Normal),
        empty_bins: count_status(bins, BinStatus::Empty),
        hazard_bins: count_status(bins, BinStatus::Hazard),
        avg_fill_level,
        total_transactions: ledger.len(),
        today_collections: collected
            .iter()
            .filter(|ts| ts.date_naive() == now.date_naive())
            .count(),
        weekly_collections: collected.iter().filter(|ts| **ts >= week_ago).count(),
        monthly_collections: collected.iter().filter(|ts| **ts >= month_ago).count(),
        ..Default::default()
    }
}

pub async fn collect(store: &Store) -> Result<AnalyticsResponse, ApiError> {
    let bins = store.bins.read_all().await?;
    let ledger = store.ledger.read_all().await?;

    let mut stats = summarize(&bins, &ledger, Utc::now());
    stats.total_citizens = store.citizens.read_all().await?.len();
    stats.total_contractors = store.contractors.read_all().await?.len();
    stats.total_activities = store.activities.read_all().await?.len();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(action: PickupAction, timestamp: DateTime<Utc>) -> LedgerTransaction {
        LedgerTransaction {
            id: crate::models::new_id("TX"),
            bin_id: "BIN001".into(),
            action,
            contractor_id: "contractor-1".into(),
            timestamp,
            earnings: Some(25.0),
        }
    }

    fn bin(fill_level: f64, status: BinStatus) -> Bin {
        Bin {
            id: crate::models::new_id("BIN"),
            location: "Sector 5".into(),
            fill_level,
            gas_level: 1.0,
            status,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn counts_collections_by_window() {
        let now = DateTime::parse_from_rfc3339("2026-03-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ledger = vec![
            tx(PickupAction::Collected, now - Duration::hours(1)),
            tx(PickupAction::Collected, now - Duration::days(3)),
            tx(PickupAction::Collected, now - Duration::days(20)),
            tx(PickupAction::Collected, now - Duration::days(60)),
            tx(PickupAction::HazardResolved, now - Duration::hours(2)),
        ];
        let bins = vec![
            bin(0.0, BinStatus::Empty),
            bin(85.0, BinStatus::Full),
            bin(50.0, BinStatus::Normal),
        ];

        let stats = summarize(&bins, &ledger, now);
        assert_eq!(stats.total_bins, 3);
        assert_eq!(stats.full_bins, 1);
        assert_eq!(stats.hazard_bins, 0);
        assert_eq!(stats.avg_fill_level, 45);
        assert_eq!(stats.total_transactions, 5);
        assert_eq!(stats.today_collections, 1);
        assert_eq!(stats.weekly_collections, 2);
        assert_eq!(stats.monthly_collections, 3);
    }

    #[test]
    fn empty_inputs_yield_zeroes() {
        let stats = summarize(&[], &[], Utc::now());
        assert_eq!(stats.avg_fill_level, 0);
        assert_eq!(stats.total_bins, 0);
    }
}
