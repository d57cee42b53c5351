//! Data models for the waste-management service

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Record;

/// Build a record id of the form `<prefix>-<unix millis>-<8 hex chars>`.
pub fn new_id(prefix: &str) -> String {
    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().timestamp_millis(),
        hex::encode(suffix)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinStatus {
    Empty,
    Normal,
    Full,
    Hazard,
}

impl BinStatus {
    /// Statuses a citizen is allowed to report.
    pub fn is_reportable(self) -> bool {
        matches!(self, BinStatus::Full | BinStatus::Hazard)
    }

    /// Statuses that close any open reports on the bin.
    pub fn is_fixed(self) -> bool {
        matches!(self, BinStatus::Empty | BinStatus::Normal)
    }
}

impl fmt::Display for BinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinStatus::Empty => "Empty",
            BinStatus::Normal => "Normal",
            BinStatus::Full => "Full",
            BinStatus::Hazard => "Hazard",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bin {
    pub id: String,
    pub location: String,
    pub fill_level: f64,
    pub gas_level: f64,
    pub status: BinStatus,
    pub last_updated: DateTime<Utc>,
}

/// Partial bin update accepted by `PATCH /bins/:id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BinStatus>,
}

impl BinPatch {
    pub fn apply(&self, bin: &mut Bin) {
        if let Some(location) = &self.location {
            bin.location = location.clone();
        }
        if let Some(fill_level) = self.fill_level {
            bin.fill_level = fill_level;
        }
        if let Some(gas_level) = self.gas_level {
            bin.gas_level = gas_level;
        }
        if let Some(status) = self.status {
            bin.status = status;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub message: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        kind: ActivityType,
        message: impl Into<String>,
        user: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id("activity"),
            kind,
            message: message.into(),
            user: user.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Investigating,
    Resolved,
}

impl ReportStatus {
    pub fn is_open(self) -> bool {
        matches!(self, ReportStatus::Pending | ReportStatus::Investigating)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub citizen_id: String,
    pub bin_id: String,
    pub issue_type: String,
    #[serde(default)]
    pub description: String,
    pub status: ReportStatus,
    pub points_awarded: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalImpact {
    pub co2_saved: f64,
    pub waste_disposed: f64,
    pub recycling_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citizen {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub reports_submitted: u64,
    #[serde(default)]
    pub environmental_impact: EnvironmentalImpact,
    pub created_at: DateTime<Utc>,
}

impl Citizen {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: new_id("citizen"),
            name: name.into(),
            email: email.into(),
            points: 0,
            reports_submitted: 0,
            environmental_impact: EnvironmentalImpact::default(),
            created_at: Utc::now(),
        }
    }
}

/// Partial citizen update accepted by `PATCH /citizens/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitizenPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub points: Option<u64>,
    pub reports_submitted: Option<u64>,
    pub environmental_impact: Option<EnvironmentalImpact>,
}

impl CitizenPatch {
    pub fn apply(self, citizen: &mut Citizen) {
        if let Some(name) = self.name {
            citizen.name = name;
        }
        if let Some(email) = self.email {
            citizen.email = email;
        }
        if let Some(points) = self.points {
            citizen.points = points;
        }
        if let Some(reports) = self.reports_submitted {
            citizen.reports_submitted = reports;
        }
        if let Some(impact) = self.environmental_impact {
            citizen.environmental_impact = impact;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub pickups_completed: u64,
    pub total_earnings: f64,
    pub efficiency_rating: f64,
    pub on_time_rate: f64,
}

impl Default for WeeklyStats {
    fn default() -> Self {
        Self {
            pickups_completed: 0,
            total_earnings: 0.0,
            efficiency_rating: 5.0,
            on_time_rate: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contractor {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub todays_earnings: f64,
    #[serde(default)]
    pub completed_pickups: u64,
    #[serde(default)]
    pub weekly_stats: WeeklyStats,
    pub created_at: DateTime<Utc>,
}

impl Contractor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: new_id("contractor"),
            name: name.into(),
            email: email.into(),
            todays_earnings: 0.0,
            completed_pickups: 0,
            weekly_stats: WeeklyStats::default(),
            created_at: Utc::now(),
        }
    }
}

/// Partial contractor update accepted by `PATCH /contractors/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractorPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub todays_earnings: Option<f64>,
    pub completed_pickups: Option<u64>,
    pub weekly_stats: Option<WeeklyStats>,
}

impl ContractorPatch {
    pub fn apply(self, contractor: &mut Contractor) {
        if let Some(name) = self.name {
            contractor.name = name;
        }
        if let Some(email) = self.email {
            contractor.email = email;
        }
        if let Some(earnings) = self.todays_earnings {
            contractor.todays_earnings = earnings;
        }
        if let Some(pickups) = self.completed_pickups {
            contractor.completed_pickups = pickups;
        }
        if let Some(stats) = self.weekly_stats {
            contractor.weekly_stats = stats;
        }
    }
}

/// Action a contractor confirms for a bin. Unknown actions are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PickupAction {
    #[default]
    Collected,
    HazardResolved,
    Other(String),
}

impl PickupAction {
    pub fn as_str(&self) -> &str {
        match self {
            PickupAction::Collected => "Collected",
            PickupAction::HazardResolved => "Hazard_Resolved",
            PickupAction::Other(action) => action,
        }
    }
}

impl From<String> for PickupAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Collected" => PickupAction::Collected,
            "Hazard_Resolved" => PickupAction::HazardResolved,
            _ => PickupAction::Other(value),
        }
    }
}

impl From<PickupAction> for String {
    fn from(value: PickupAction) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PickupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only ledger entry for a completed pickup or manual action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub bin_id: String,
    pub action: PickupAction,
    pub contractor_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings: Option<f64>,
}

impl Record for Bin {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Activity {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Report {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Citizen {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Contractor {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for LedgerTransaction {
    fn id(&self) -> &str {
        &self.id
    }
}

// API responses

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub simulation_running: bool,
    pub bin_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub success: bool,
    pub points_awarded: u32,
    pub new_points_total: u64,
    pub report: Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupReceipt {
    pub success: bool,
    pub bin: Bin,
    pub earnings: f64,
    pub total_earnings: f64,
    pub transaction: LedgerTransaction,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub bins_updated: usize,
    pub status_changes: usize,
    pub failures: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatus {
    pub running: bool,
    pub interval_ms: Option<u64>,
    pub tracked_bins: usize,
    pub ticks_completed: u64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub total_bins: usize,
    pub full_bins: usize,
    pub normal_bins: usize,
    pub empty_bins: usize,
    pub hazard_bins: usize,
    pub avg_fill_level: i64,
    pub total_transactions: usize,
    pub total_citizens: usize,
    pub total_contractors: usize,
    pub total_activities: usize,
    pub today_collections: usize,
    pub weekly_collections: usize,
    pub monthly_collections: usize,
}
