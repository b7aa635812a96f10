//! Wire types for the `/api/*` surface.
//!
//! Every write endpoint takes a small typed request struct deserialised
//! from the POST body; reads return the [`sparkle_core::state::Aggregate`]
//! shape (or a thin wrapper around it) directly, without an intermediate
//! DTO when the domain type is already wire-shaped.

use serde::{Deserialize, Serialize};
use sparkle_core::aggregate::ValidationReport;
use sparkle_core::api::{AuditEntry, ItemDetails};
use sparkle_core::graph::{DagEmission, DagFull, Potential};
use sparkle_core::model::ItemId;
use sparkle_core::state::Aggregate;

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub tagline: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub initial_entry: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateItemResponse {
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemIdRequest {
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddEntryRequest {
    pub item_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct AlterTaglineRequest {
    pub item_id: String,
    pub tagline: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub item_id: String,
    pub status: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DependencyRequest {
    pub needing: String,
    pub needed: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusesRequest {
    pub statuses: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigSetProjectRequest {
    pub git_branch: String,
    pub directory: String,
    #[serde(default)]
    pub worktree_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigNotifyChangeRequest {
    #[serde(default)]
    pub sender: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InternalAggregateUpdatedRequest {
    pub item_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientLogRequest {
    #[serde(default = "default_level")]
    pub level: String,
    pub message: String,
}

fn default_level() -> String {
    "info".to_string()
}

/// `{reason, message, rebuilding?}`, matching the daemon's error taxonomy.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub reason: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuilding: Option<bool>,
}

pub fn parse_item_id(raw: &str) -> Result<ItemId, sparkle_core::SparkleError> {
    ItemId::parse(raw).map_err(|_| sparkle_core::SparkleError::validation(format!("malformed item id `{raw}`")))
}

/// `getItemDetails` response: the aggregate flattened alongside the two
/// viewer-relationship flags.
#[derive(Debug, Serialize, Deserialize)]
pub struct ItemDetailsDto {
    #[serde(flatten)]
    pub aggregate: Aggregate,
    pub viewer_is_monitor: bool,
    pub viewer_is_taker: bool,
}

impl From<ItemDetails> for ItemDetailsDto {
    fn from(details: ItemDetails) -> Self {
        Self {
            aggregate: details.aggregate,
            viewer_is_monitor: details.viewer_is_monitor,
            viewer_is_taker: details.viewer_is_taker,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryDto {
    pub timestamp: String,
    pub person_name: String,
    pub person_email: String,
    pub description: String,
}

impl From<AuditEntry> for AuditEntryDto {
    fn from(entry: AuditEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            person_name: entry.person.name,
            person_email: entry.person.email,
            description: entry.description,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DagFullDto {
    pub depends_on: Vec<ItemId>,
    pub provides_to: Vec<ItemId>,
}

impl From<DagFull> for DagFullDto {
    fn from(full: DagFull) -> Self {
        Self {
            depends_on: full.depends_on,
            provides_to: full.provides_to,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DagEmissionDto {
    pub item: ItemId,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needed_by: Option<ItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<DagFullDto>,
}

impl From<DagEmission> for DagEmissionDto {
    fn from(emission: DagEmission) -> Self {
        Self {
            item: emission.item,
            depth: emission.depth,
            needed_by: emission.needed_by,
            full: emission.full.map(DagFullDto::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PotentialDto {
    pub current: Vec<ItemId>,
    pub candidates: Vec<ItemId>,
}

impl From<Potential> for PotentialDto {
    fn from(potential: Potential) -> Self {
        Self {
            current: potential.current,
            candidates: potential.candidates,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationReportDto {
    pub valid: bool,
    pub invalid_items: Vec<ItemId>,
}

impl From<ValidationReport> for ValidationReportDto {
    fn from(report: ValidationReport) -> Self {
        Self {
            valid: report.valid,
            invalid_items: report.invalid_items,
        }
    }
}
