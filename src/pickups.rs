//! Contractor pickup confirmations and earnings

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::{
    error::ApiError,
    models::{
        new_id, Activity, ActivityType, BinStatus, LedgerTransaction, PickupAction, PickupReceipt,
    },
    reports::resolve_open_reports,
    store::Store,
};

/// Flat amount credited per confirmed pickup.
pub const EARNINGS_PER_PICKUP: f64 = 25.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupRequest {
    #[serde(default)]
    pub contractor_id: String,
    #[serde(default)]
    pub bin_id: String,
    #[serde(default)]
    pub action: PickupAction,
}

pub struct PickupEngine {
    store: Arc<Store>,
}

impl PickupEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn confirm(&self, request: PickupRequest) -> Result<PickupReceipt, ApiError> {
        self.confirm_at(request, Utc::now()).await
    }

    pub async fn confirm_at(
        &self,
        request: PickupRequest,
        now: DateTime<Utc>,
    ) -> Result<PickupReceipt, ApiError> {
        if request.bin_id.trim().is_empty() {
            return Err(ApiError::Validation("binId is required".to_string()));
        }

        let contractor = self
            .store
            .contractors
            .find_by_id(&request.contractor_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Contractor".to_string()))?;

        let action = request.action;
        let bin = self
            .store
            .bins
            .modify(&request.bin_id, |bin| {
                match &action {
                    PickupAction::Collected => {
                        bin.status = BinStatus::Empty;
                        bin.fill_level = 0.0;
                    }
                    PickupAction::HazardResolved => bin.status = BinStatus::Normal,
                    PickupAction::Other(_) => {}
                }
                bin.last_updated = now;
                bin.clone()
            })
            .await?
            .ok_or_else(|| ApiError::NotFound("Bin".to_string()))?;

        if bin.status.is_fixed() {
            resolve_open_reports(&self.store, &bin.id, now).await?;
        }

        let total_earnings = self
            .store
            .contractors
            .modify(&contractor.id, |c| {
                c.todays_earnings += EARNINGS_PER_PICKUP;
                c.completed_pickups += 1;
                c.weekly_stats.total_earnings += EARNINGS_PER_PICKUP;
                c.weekly_stats.pickups_completed += 1;
                c.todays_earnings
            })
            .await?
            .ok_or_else(|| ApiError::NotFound("Contractor".to_string()))?;

        let transaction = self
            .store
            .ledger
            .create(LedgerTransaction {
                id: new_id("TX"),
                bin_id: bin.id.clone(),
                action: action.clone(),
                contractor_id: contractor.id.clone(),
                timestamp: now,
                earnings: Some(EARNINGS_PER_PICKUP),
            })
            .await?;

        self.store
            .activities
            .create(Activity::new(
                ActivityType::Success,
                format!(
                    "Contractor {} {} {}. Earned ${:.2}",
                    contractor.name,
                    action.as_str().to_lowercase(),
                    bin.id,
                    EARNINGS_PER_PICKUP
                ),
                contractor.name.clone(),
                now,
            ))
            .await?;

        info!(
            contractor_id = %contractor.id,
            bin_id = %bin.id,
            action = %action,
            "Pickup confirmed"
        );

        Ok(PickupReceipt {
            success: true,
            bin,
            earnings: EARNINGS_PER_PICKUP,
            total_earnings,
            transaction,
        })
    }
}
