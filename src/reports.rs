//! Citizen issue reports and point rewards

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    error::ApiError,
    models::{new_id, Activity, ActivityType, Report, ReportOutcome, ReportStatus},
    store::Store,
};

/// Points for the first report of a problem episode.
pub const REPORT_REWARD: u32 = 50;

/// Minimum gap between a resolved report and the same citizen reporting the bin again.
pub const REREPORT_COOLDOWN_MINUTES: f64 = 60.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    #[serde(default)]
    pub citizen_id: String,
    #[serde(default)]
    pub bin_id: String,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

/// Mark every open report on `bin_id` resolved. Returns how many changed.
pub async fn resolve_open_reports(
    store: &Store,
    bin_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, ApiError> {
    let resolved = store
        .reports
        .modify_where(
            |r| r.bin_id == bin_id && r.status.is_open(),
            |r| {
                r.status = ReportStatus::Resolved;
                r.resolved_at = Some(now);
            },
        )
        .await?;
    if !resolved.is_empty() {
        info!(bin_id, count = resolved.len(), "Auto-resolved reports");
    }
    Ok(resolved.len())
}

pub struct ReportEngine {
    store: Arc<Store>,
    // Serializes the duplicate check and report creation so only one reporter is rewarded.
    gate: Mutex<()>,
}

impl ReportEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    pub async fn submit(&self, request: NewReport) -> Result<ReportOutcome, ApiError> {
        self.submit_at(request, Utc::now()).await
    }

    pub async fn submit_at(
        &self,
        request: NewReport,
        now: DateTime<Utc>,
    ) -> Result<ReportOutcome, ApiError> {
        if request.bin_id.trim().is_empty() || request.issue_type.trim().is_empty() {
            return Err(ApiError::Validation(
                "binId and issueType are required".to_string(),
            ));
        }

        let citizen = self
            .store
            .citizens
            .find_by_id(&request.citizen_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Citizen".to_string()))?;

        let bin = self
            .store
            .bins
            .find_by_id(&request.bin_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Bin".to_string()))?;

        if !bin.status.is_reportable() {
            return Err(ApiError::Conflict(format!(
                "Cannot report issue: Bin {} is currently {}. Only Hazard or Full bins can be reported.",
                bin.id, bin.status
            )));
        }

        let _gate = self.gate.lock().await;
        let reports = self.store.reports.read_all().await?;

        let own_latest = reports
            .iter()
            .filter(|r| r.citizen_id == citizen.id && r.bin_id == bin.id)
            .max_by_key(|r| r.created_at);

        if let Some(previous) = own_latest {
            if previous.status == ReportStatus::Resolved {
                let since = previous.resolved_at.unwrap_or(previous.created_at);
                let elapsed = minutes_between(since, now);
                if elapsed < REREPORT_COOLDOWN_MINUTES {
                    let wait = (REREPORT_COOLDOWN_MINUTES - elapsed).ceil() as i64;
                    return Err(ApiError::Conflict(format!(
                        "You have already reported this bin. Please wait {} minute(s) before reporting again.",
                        wait
                    )));
                }
            } else {
                let age = minutes_between(previous.created_at, now).floor().max(0.0) as i64;
                return Err(ApiError::Conflict(format!(
                    "You have already reported this bin {} minute(s) ago. Please wait until the issue is resolved.",
                    age
                )));
            }
        }

        let already_reported = reports
            .iter()
            .any(|r| r.bin_id == bin.id && r.citizen_id != citizen.id && r.status.is_open());

        let points = if already_reported { 0 } else { REPORT_REWARD };
        let report = Report {
            id: new_id("report"),
            citizen_id: citizen.id.clone(),
            bin_id: bin.id.clone(),
            issue_type: request.issue_type,
            description: request.description.unwrap_or_default(),
            status: ReportStatus::Pending,
            points_awarded: points,
            created_at: now,
            resolved_at: None,
        };
        let report = self.store.reports.create(report).await?;

        if already_reported {
            self.store
                .activities
                .create(Activity::new(
                    ActivityType::Info,
                    format!(
                        "Citizen {} also reported issue with {} (already reported by another citizen).",
                        citizen.name, bin.id
                    ),
                    citizen.name.clone(),
                    now,
                ))
                .await?;

            info!(citizen_id = %citizen.id, bin_id = %bin.id, "Duplicate report logged without reward");
            return Ok(ReportOutcome {
                success: true,
                points_awarded: 0,
                new_points_total: citizen.points,
                report,
                message: Some(
                    "Issue already reported by another citizen. Your report has been logged but no points awarded."
                        .to_string(),
                ),
            });
        }

        let new_total = self
            .store
            .citizens
            .modify(&citizen.id, |c| {
                c.points += u64::from(REPORT_REWARD);
                c.reports_submitted += 1;
                c.points
            })
            .await?
            .ok_or_else(|| ApiError::NotFound("Citizen".to_string()))?;

        self.store
            .activities
            .create(Activity::new(
                ActivityType::Success,
                format!(
                    "Citizen {} reported issue with {}. Awarded {} points.",
                    citizen.name, bin.id, REPORT_REWARD
                ),
                citizen.name.clone(),
                now,
            ))
            .await?;

        info!(citizen_id = %citizen.id, bin_id = %bin.id, points = REPORT_REWARD, "Report rewarded");
        Ok(ReportOutcome {
            success: true,
            points_awarded: REPORT_REWARD,
            new_points_total: new_total,
            report,
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bin, BinStatus, Citizen};
    use chrono::Duration;

    async fn setup(status: BinStatus) -> (Arc<Store>, ReportEngine) {
        let store = Arc::new(Store::in_memory());
        store
            .bins
            .create(Bin {
                id: "BIN002".to_string(),
                location: "Vaishali Nagar, Jaipur".to_string(),
                fill_level: 85.0,
                gas_level: 2.0,
                status,
                last_updated: Utc::now(),
            })
            .await
            .unwrap();
        for id in ["alice", "bob"] {
            let mut citizen = Citizen::new(id, format!("{id}@example.com"));
            citizen.id = id.to_string();
            citizen.points = 100;
            store.citizens.create(citizen).await.unwrap();
        }
        let engine = ReportEngine::new(store.clone());
        (store, engine)
    }

    fn request(citizen_id: &str) -> NewReport {
        NewReport {
            citizen_id: citizen_id.to_string(),
            bin_id: "BIN002".to_string(),
            issue_type: "overflow".to_string(),
            description: None,
        }
    }

    async fn seed_report(
        store: &Store,
        citizen_id: &str,
        status: ReportStatus,
        created_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>,
    ) {
        store
            .reports
            .create(Report {
                id: new_id("report"),
                citizen_id: citizen_id.to_string(),
                bin_id: "BIN002".to_string(),
                issue_type: "overflow".to_string(),
                description: String::new(),
                status,
                points_awarded: 50,
                created_at,
                resolved_at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_reporter_earns_points() {
        let (store, engine) = setup(BinStatus::Full).await;
        let outcome = engine.submit(request("alice")).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.points_awarded, 50);
        assert_eq!(outcome.new_points_total, 150);
        assert_eq!(outcome.report.status, ReportStatus::Pending);

        let alice = store.citizens.find_by_id("alice").await.unwrap().unwrap();
        assert_eq!(alice.points, 150);
        assert_eq!(alice.reports_submitted, 1);

        let activities = store.activities.read_all().await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].kind, ActivityType::Success);
    }

    #[tokio::test]
    async fn second_reporter_is_logged_without_reward() {
        let (store, engine) = setup(BinStatus::Hazard).await;
        engine.submit(request("alice")).await.unwrap();
        let outcome = engine.submit(request("bob")).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.points_awarded, 0);
        assert_eq!(outcome.new_points_total, 100);
        assert_eq!(outcome.report.points_awarded, 0);

        let bob = store.citizens.find_by_id("bob").await.unwrap().unwrap();
        assert_eq!(bob.points, 100);
        assert_eq!(bob.reports_submitted, 0);

        let activities = store.activities.read_all().await.unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[1].kind, ActivityType::Info);
    }

    #[tokio::test]
    async fn concurrent_reporters_get_exactly_one_reward() {
        let (store, engine) = setup(BinStatus::Full).await;
        let (a, b) = tokio::join!(engine.submit(request("alice")), engine.submit(request("bob")));
        let awarded = [a.unwrap().points_awarded, b.unwrap().points_awarded];
        assert_eq!(awarded.iter().filter(|p| **p == 50).count(), 1);
        assert_eq!(store.reports.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn healthy_bins_cannot_be_reported() {
        for status in [BinStatus::Normal, BinStatus::Empty] {
            let (store, engine) = setup(status).await;
            let err = engine.submit(request("alice")).await.unwrap_err();
            assert!(matches!(err, ApiError::Conflict(ref m) if m.contains(&status.to_string())));
            assert!(store.reports.read_all().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn missing_entities_and_fields_are_rejected_in_order() {
        let (_store, engine) = setup(BinStatus::Full).await;

        let mut missing_fields = request("alice");
        missing_fields.issue_type.clear();
        assert!(matches!(
            engine.submit(missing_fields).await,
            Err(ApiError::Validation(_))
        ));

        let mut unknown_both = request("nobody");
        unknown_both.bin_id = "BIN404".to_string();
        assert!(matches!(
            engine.submit(unknown_both).await,
            Err(ApiError::NotFound(ref what)) if what == "Citizen"
        ));

        let mut unknown_bin = request("alice");
        unknown_bin.bin_id = "BIN404".to_string();
        assert!(matches!(
            engine.submit(unknown_bin).await,
            Err(ApiError::NotFound(ref what)) if what == "Bin"
        ));
    }

    #[tokio::test]
    async fn pending_report_blocks_same_citizen() {
        let (store, engine) = setup(BinStatus::Full).await;
        let now = Utc::now();
        seed_report(&store, "alice", ReportStatus::Pending, now, None).await;

        for minutes in [0, 5, 42] {
            let err = engine
                .submit_at(request("alice"), now + Duration::minutes(minutes))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Conflict(_)));
            let message = err.to_string();
            assert!(message.contains(&format!("{minutes} minute(s) ago")), "{message}");
        }
        assert_eq!(store.reports.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resolved_report_cooldown_is_one_hour() {
        let (store, engine) = setup(BinStatus::Full).await;
        let now = Utc::now();
        let created = now - Duration::hours(3);

        seed_report(
            &store,
            "alice",
            ReportStatus::Resolved,
            created,
            Some(now - Duration::minutes(59)),
        )
        .await;
        let err = engine.submit_at(request("alice"), now).await.unwrap_err();
        assert!(err.to_string().contains("wait 1 minute(s)"), "{err}");

        let later = now + Duration::minutes(2);
        let outcome = engine.submit_at(request("alice"), later).await.unwrap();
        assert_eq!(outcome.points_awarded, 50);
    }

    #[tokio::test]
    async fn cooldown_falls_back_to_creation_time() {
        let (store, engine) = setup(BinStatus::Full).await;
        let now = Utc::now();
        seed_report(
            &store,
            "alice",
            ReportStatus::Resolved,
            now - Duration::minutes(30),
            None,
        )
        .await;
        let err = engine.submit_at(request("alice"), now).await.unwrap_err();
        assert!(err.to_string().contains("wait 30 minute(s)"), "{err}");
    }

    #[tokio::test]
    async fn resolving_opens_a_new_episode() {
        let (store, engine) = setup(BinStatus::Full).await;
        engine.submit(request("alice")).await.unwrap();

        let resolved = resolve_open_reports(&store, "BIN002", Utc::now()).await.unwrap();
        assert_eq!(resolved, 1);
        assert_eq!(resolve_open_reports(&store, "BIN002", Utc::now()).await.unwrap(), 0);

        let outcome = engine.submit(request("bob")).await.unwrap();
        assert_eq!(outcome.points_awarded, 50);
    }
}
