//! REST API for the waste-management service

use crate::{
    analytics,
    error::ApiError,
    models::*,
    pickups::PickupRequest,
    reports::{resolve_open_reports, NewReport},
    scheduler::DEFAULT_INTERVAL,
    seed::seed_defaults,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    serve, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    #[serde(default = "default_activity_limit")]
    pub limit: usize,
    #[serde(rename = "type")]
    pub kind: Option<ActivityType>,
}

fn default_activity_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub citizen_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    #[serde(default = "default_ledger_limit")]
    pub limit: usize,
}

fn default_ledger_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBin {
    pub location: Option<String>,
    pub fill_level: Option<f64>,
    pub gas_level: Option<f64>,
    pub status: Option<BinStatus>,
}

#[derive(Debug, Deserialize)]
pub struct NewActivity {
    #[serde(rename = "type")]
    pub kind: Option<ActivityType>,
    pub message: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewMember {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEntry {
    pub bin_id: Option<String>,
    pub action: Option<PickupAction>,
    pub contractor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimulationCommand {
    pub action: String,
    /// Milliseconds between ticks
    pub interval: Option<u64>,
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(message.to_string()))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/init", post(init))
        .route("/bins", get(list_bins).post(create_bin))
        .route(
            "/bins/:id",
            get(get_bin).patch(update_bin).delete(delete_bin),
        )
        .route("/activities", get(list_activities).post(create_activity))
        .route("/reports", get(list_reports).post(submit_report))
        .route("/citizens", get(list_citizens).post(create_citizen))
        .route("/citizens/:id", get(get_citizen).patch(update_citizen))
        .route("/citizens/:id/report", post(submit_citizen_report))
        .route("/contractors", get(list_contractors).post(create_contractor))
        .route("/contractors/:id", get(get_contractor).patch(update_contractor))
        .route("/contractors/:id/pickup", post(confirm_contractor_pickup))
        .route("/pickups", post(confirm_pickup))
        .route("/ledger", get(list_ledger).post(create_ledger_entry))
        .route("/analytics", get(get_analytics))
        .route("/simulation/run", post(run_simulation))
        .route("/simulation/status", get(simulation_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>) -> Result<(), ApiError> {
    let addr = state.config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!("API server listening on {}", addr);

    serve_on(listener, state).await
}

pub async fn serve_on(listener: TcpListener, state: Arc<AppState>) -> Result<(), ApiError> {
    serve(listener, router(state))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        simulation_running: state.scheduler.is_running().await,
        bin_count: state.store.bins.read_all().await?.len(),
    }))
}

async fn init(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let seeded = seed_defaults(&state.store).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Database initialized successfully",
        "seeded": {
            "bins": seeded.bins,
            "citizens": seeded.citizens,
            "contractors": seeded.contractors,
        },
    })))
}

// Bins

async fn list_bins(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Bin>>, ApiError> {
    Ok(Json(state.store.bins.read_all().await?))
}

async fn get_bin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Bin>, ApiError> {
    state
        .store
        .bins
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Bin".to_string()))
}

/// Next `BINnnn` id after the highest existing number.
fn next_bin_id(bins: &[Bin]) -> String {
    let highest = bins
        .iter()
        .filter_map(|b| b.id.strip_prefix("BIN")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("BIN{:03}", highest + 1)
}

async fn create_bin(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewBin>,
) -> Result<(StatusCode, Json<Bin>), ApiError> {
    let location = required(body.location, "Location is required")?;
    let fill_level = body.fill_level.unwrap_or(0.0);
    let gas_level = body.gas_level.unwrap_or(1.0);

    let existing = state.store.bins.read_all().await?;
    let bin = Bin {
        id: next_bin_id(&existing),
        location,
        fill_level,
        gas_level,
        status: body
            .status
            .unwrap_or_else(|| crate::classifier::classify(fill_level, gas_level)),
        last_updated: Utc::now(),
    };
    let bin = state.store.bins.create(bin).await?;

    state
        .store
        .activities
        .create(Activity::new(
            ActivityType::Info,
            format!("New bin {} added at {}", bin.id, bin.location),
            "Admin",
            bin.last_updated,
        ))
        .await?;

    Ok((StatusCode::CREATED, Json(bin)))
}

async fn update_bin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<BinPatch>,
) -> Result<Json<Bin>, ApiError> {
    let now = Utc::now();
    let bin = state
        .store
        .bins
        .modify(&id, |bin| {
            patch.apply(bin);
            bin.last_updated = now;
            bin.clone()
        })
        .await?
        .ok_or_else(|| ApiError::NotFound("Bin".to_string()))?;

    if patch.status.is_some_and(BinStatus::is_fixed) {
        resolve_open_reports(&state.store, &id, now).await?;
    }

    let summary = serde_json::to_string(&patch).map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .store
        .activities
        .create(Activity::new(
            ActivityType::Info,
            format!("Bin {} updated: {}", id, summary),
            "System",
            now,
        ))
        .await?;

    Ok(Json(bin))
}

async fn delete_bin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.bins.delete(&id).await? {
        return Err(ApiError::NotFound("Bin".to_string()));
    }

    state
        .store
        .activities
        .create(Activity::new(
            ActivityType::Warning,
            format!("Bin {} deleted from system", id),
            "Admin",
            Utc::now(),
        ))
        .await?;

    Ok(Json(json!({ "success": true })))
}

// Activities

async fn list_activities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let mut activities: Vec<Activity> = state
        .store
        .activities
        .read_all()
        .await?
        .into_iter()
        .filter(|a| query.kind.map_or(true, |kind| a.kind == kind))
        .collect();

    activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    activities.truncate(query.limit);
    Ok(Json(activities))
}

async fn create_activity(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewActivity>,
) -> Result<(StatusCode, Json<Activity>), ApiError> {
    const MESSAGE: &str = "type, message, and user are required";
    let kind = body
        .kind
        .ok_or_else(|| ApiError::Validation(MESSAGE.to_string()))?;
    let message = required(body.message, MESSAGE)?;
    let user = required(body.user, MESSAGE)?;

    let activity = state
        .store
        .activities
        .create(Activity::new(kind, message, user, Utc::now()))
        .await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

// Reports

async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let mut reports: Vec<Report> = state
        .store
        .reports
        .read_all()
        .await?
        .into_iter()
        .filter(|r| query.status.map_or(true, |status| r.status == status))
        .filter(|r| {
            query
                .citizen_id
                .as_deref()
                .map_or(true, |citizen| r.citizen_id == citizen)
        })
        .collect();

    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(reports))
}

async fn submit_report(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewReport>,
) -> Result<Json<ReportOutcome>, ApiError> {
    Ok(Json(state.reports.submit(body).await?))
}

async fn submit_citizen_report(
    State(state): State<Arc<AppState>>,
    Path(citizen_id): Path<String>,
    Json(mut body): Json<NewReport>,
) -> Result<Json<ReportOutcome>, ApiError> {
    body.citizen_id = citizen_id;
    Ok(Json(state.reports.submit(body).await?))
}

// Citizens and contractors

async fn list_citizens(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Citizen>>, ApiError> {
    Ok(Json(state.store.citizens.read_all().await?))
}

async fn get_citizen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Citizen>, ApiError> {
    state
        .store
        .citizens
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Citizen".to_string()))
}

async fn create_citizen(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewMember>,
) -> Result<(StatusCode, Json<Citizen>), ApiError> {
    let name = required(body.name, "Name and email are required")?;
    let email = required(body.email, "Name and email are required")?;
    let citizen = state.store.citizens.create(Citizen::new(name, email)).await?;
    Ok((StatusCode::CREATED, Json(citizen)))
}

async fn update_citizen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<CitizenPatch>,
) -> Result<Json<Citizen>, ApiError> {
    state
        .store
        .citizens
        .modify(&id, |citizen| {
            patch.apply(citizen);
            citizen.clone()
        })
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Citizen".to_string()))
}

async fn list_contractors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Contractor>>, ApiError> {
    Ok(Json(state.store.contractors.read_all().await?))
}

async fn get_contractor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Contractor>, ApiError> {
    state
        .store
        .contractors
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Contractor".to_string()))
}

async fn create_contractor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewMember>,
) -> Result<(StatusCode, Json<Contractor>), ApiError> {
    let name = required(body.name, "Name and email are required")?;
    let email = required(body.email, "Name and email are required")?;
    let contractor = state
        .store
        .contractors
        .create(Contractor::new(name, email))
        .await?;
    Ok((StatusCode::CREATED, Json(contractor)))
}

async fn update_contractor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<ContractorPatch>,
) -> Result<Json<Contractor>, ApiError> {
    state
        .store
        .contractors
        .modify(&id, |contractor| {
            patch.apply(contractor);
            contractor.clone()
        })
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Contractor".to_string()))
}

// Pickups and ledger

async fn confirm_pickup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PickupRequest>,
) -> Result<Json<PickupReceipt>, ApiError> {
    Ok(Json(state.pickups.confirm(body).await?))
}

async fn confirm_contractor_pickup(
    State(state): State<Arc<AppState>>,
    Path(contractor_id): Path<String>,
    Json(mut body): Json<PickupRequest>,
) -> Result<Json<PickupReceipt>, ApiError> {
    body.contractor_id = contractor_id;
    Ok(Json(state.pickups.confirm(body).await?))
}

async fn list_ledger(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Vec<LedgerTransaction>>, ApiError> {
    let mut transactions = state.store.ledger.read_all().await?;
    transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    transactions.truncate(query.limit);
    Ok(Json(transactions))
}

async fn create_ledger_entry(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewLedgerEntry>,
) -> Result<(StatusCode, Json<LedgerTransaction>), ApiError> {
    let (Some(bin_id), Some(action)) = (body.bin_id.filter(|b| !b.is_empty()), body.action) else {
        return Err(ApiError::Validation(
            "binId and action are required".to_string(),
        ));
    };

    let transaction = state
        .store
        .ledger
        .create(LedgerTransaction {
            id: new_id("TX"),
            bin_id,
            action,
            contractor_id: body.contractor_id.unwrap_or_else(|| "system".to_string()),
            timestamp: Utc::now(),
            earnings: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

async fn get_analytics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    Ok(Json(analytics::collect(&state.store).await?))
}

// Simulation control

async fn run_simulation(
    State(state): State<Arc<AppState>>,
    Json(command): Json<SimulationCommand>,
) -> Result<Json<Value>, ApiError> {
    match command.action.as_str() {
        "start" => {
            let interval = command
                .interval
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_INTERVAL);
            state.scheduler.start(interval).await;
            Ok(Json(json!({
                "success": true,
                "message": format!(
                    "IoT simulation started (updates every {} seconds)",
                    interval.as_secs_f64()
                ),
            })))
        }
        "stop" => {
            state.scheduler.stop().await;
            Ok(Json(json!({
                "success": true,
                "message": "IoT simulation stopped",
            })))
        }
        "run-once" => {
            let summary = state.scheduler.run_once().await;
            Ok(Json(json!({
                "success": true,
                "message": "IoT simulation run completed",
                "summary": summary,
            })))
        }
        _ => Err(ApiError::Validation(
            "Invalid action. Use \"start\", \"stop\", or \"run-once\"".to_string(),
        )),
    }
}

async fn simulation_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SimulationStatus>, ApiError> {
    Ok(Json(SimulationStatus {
        running: state.scheduler.is_running().await,
        interval_ms: state
            .scheduler
            .interval()
            .await
            .map(|interval| interval.as_millis() as u64),
        tracked_bins: state.scheduler.engine().tracked_bins().await,
        ticks_completed: state.scheduler.engine().ticks_completed(),
    }))
}
