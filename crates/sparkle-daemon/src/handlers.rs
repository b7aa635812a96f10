//! Endpoint handlers: deserialise the request body, call into
//! [`sparkle_core::api::SparkleApi`] or [`sparkle_git::GitSync`], serialise
//! the result. Each handler returns a plain `Result<Value, SparkleError>` —
//! [`crate::routes`] turns that into an HTTP response using
//! [`SparkleError::http_status`]/[`SparkleError::reason`].

use crate::json::{
    self, AddEntryRequest, AlterTaglineRequest, ClientLogRequest, ConfigNotifyChangeRequest, ConfigSetProjectRequest,
    CreateItemRequest, CreateItemResponse, DagEmissionDto, DependencyRequest, InternalAggregateUpdatedRequest,
    ItemDetailsDto, ItemIdRequest, PotentialDto, UpdateStatusRequest, UpdateStatusesRequest, ValidationReportDto,
};
use crate::state::DaemonState;
use serde_json::{json, Value};
use sparkle_core::config::ProjectConfig;
use sparkle_core::model::Person;
use sparkle_core::SparkleError;

fn current_person(state: &DaemonState) -> Result<Person, SparkleError> {
    sparkle_core::identity::resolve_person(&state.repo_root).map_err(|source| SparkleError::Fatal {
        message: source.to_string(),
    })
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, SparkleError> {
    serde_json::from_slice(body).map_err(|err| SparkleError::validation(format!("malformed request body: {err}")))
}

fn broadcast_data_updated(state: &DaemonState) {
    state.sse.broadcast(
        "dataUpdated",
        &json!({"timestamp": sparkle_core::clock::next_timestamp(), "source": "local"}),
    );
}

// ---- reads ----------------------------------------

pub fn ping(_state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    Ok(json!({"status": "ok"}))
}

pub fn status(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    Ok(json!({
        "rebuilding": state.api.manager().is_rebuilding(),
        "shuttingDown": state.is_shutting_down(),
        "subscriberCount": state.sse.subscriber_count(),
        "scheduled": state.git.is_scheduled(),
    }))
}

pub fn server_info(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port(),
        "startedAt": state.started_at.to_rfc3339(),
        "pid": std::process::id(),
    }))
}

pub fn version(_state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    Ok(json!({"version": env!("CARGO_PKG_VERSION")}))
}

pub fn all_items(state: &DaemonState, search: Option<&str>) -> Result<Value, SparkleError> {
    let items = state.api.get_all_items(search)?;
    Ok(serde_json::to_value(items).expect("Aggregate always serialises"))
}

pub fn pending_work(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    let ids = state.api.pending_work()?;
    Ok(serde_json::to_value(ids).expect("ItemId always serialises"))
}

pub fn roots(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    let ids = state.api.roots()?;
    Ok(serde_json::to_value(ids).expect("ItemId always serialises"))
}

pub fn dag(state: &DaemonState, reference_id: &str) -> Result<Value, SparkleError> {
    let id = json::parse_item_id(reference_id)?;
    let nodes = state.api.dag(&id)?;
    let dtos: Vec<DagEmissionDto> = nodes.into_iter().map(DagEmissionDto::from).collect();
    Ok(serde_json::to_value(dtos).expect("DagEmissionDto always serialises"))
}

pub fn allowed_statuses(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    Ok(serde_json::to_value(state.api.globals().statuses()).expect("Statuses always serialises"))
}

pub fn get_takers(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    Ok(serde_json::to_value(state.api.globals().takers()).expect("Person always serialises"))
}

pub fn aggregate_status(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    let report = state.api.manager().validate_all().map_err(|err| SparkleError::Fatal {
        message: err.to_string(),
    })?;
    Ok(serde_json::to_value(ValidationReportDto::from(report)).expect("ValidationReportDto always serialises"))
}

pub fn get_last_change(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    Ok(json!({"timestamp": state.started_at.to_rfc3339()}))
}

pub fn get_item_details(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let viewer = current_person(state)?;
    let details = state.api.get_item_details(&id, Some(&viewer))?;
    Ok(serde_json::to_value(ItemDetailsDto::from(details)).expect("ItemDetailsDto always serialises"))
}

pub fn get_potential_dependencies(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let potential = state.api.potential_dependencies(&id)?;
    Ok(serde_json::to_value(PotentialDto::from(potential)).expect("PotentialDto always serialises"))
}

pub fn get_potential_dependents(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let potential = state.api.potential_dependents(&id)?;
    Ok(serde_json::to_value(PotentialDto::from(potential)).expect("PotentialDto always serialises"))
}

pub fn get_item_audit_trail(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let trail = state.api.get_item_audit_trail(&id)?;
    let dtos: Vec<json::AuditEntryDto> = trail.into_iter().map(json::AuditEntryDto::from).collect();
    Ok(serde_json::to_value(dtos).expect("AuditEntryDto always serialises"))
}

pub fn config_get(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    match sparkle_core::config::load_project_config(&state.repo_root) {
        Ok(project) => Ok(serde_json::to_value(project).expect("ProjectConfig always serialises")),
        Err(_) => Err(SparkleError::ConfigMissing),
    }
}

// ---- writes --------------------------------------

pub fn create_item(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: CreateItemRequest = parse_body(body)?;
    let person = current_person(state)?;
    let id = state
        .api
        .create_item(&req.tagline, req.status.as_deref(), req.initial_entry.as_deref(), &person)?;
    broadcast_data_updated(state);
    Ok(serde_json::to_value(CreateItemResponse { item_id: id.as_str().to_string() })
        .expect("CreateItemResponse always serialises"))
}

pub fn add_entry(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: AddEntryRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.add_entry(&id, &req.text, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn alter_tagline(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: AlterTaglineRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.alter_tagline(&id, &req.tagline, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn update_status(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: UpdateStatusRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.update_status(&id, &req.status, req.text.as_deref(), &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn add_dependency(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: DependencyRequest = parse_body(body)?;
    let needing = json::parse_item_id(&req.needing)?;
    let needed = json::parse_item_id(&req.needed)?;
    let person = current_person(state)?;
    state.api.add_dependency(&needing, &needed, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn remove_dependency(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: DependencyRequest = parse_body(body)?;
    let needing = json::parse_item_id(&req.needing)?;
    let needed = json::parse_item_id(&req.needed)?;
    let person = current_person(state)?;
    state.api.remove_dependency(&needing, &needed, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn add_monitor(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.add_monitor(&id, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn remove_monitor(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.remove_monitor(&id, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn ignore_item(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.ignore_item(&id, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn unignore_item(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.unignore_item(&id, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn take_item(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.take_item(&id, &person)?;
    broadcast_data_updated(state);
    state.sse.broadcast("takersUpdated", &json!({}));
    Ok(json!({}))
}

pub fn surrender_item(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ItemIdRequest = parse_body(body)?;
    let id = json::parse_item_id(&req.item_id)?;
    let person = current_person(state)?;
    state.api.surrender_item(&id, &person)?;
    broadcast_data_updated(state);
    Ok(json!({}))
}

pub fn update_statuses(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: UpdateStatusesRequest = parse_body(body)?;
    let statuses = state.api.update_statuses(req.statuses)?;
    state.sse.broadcast("statusesUpdated", &json!({"statuses": statuses.statuses}));
    Ok(serde_json::to_value(statuses).expect("Statuses always serialises"))
}

pub fn config_set_project(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ConfigSetProjectRequest = parse_body(body)?;
    let project = ProjectConfig {
        git_branch: req.git_branch,
        directory: req.directory,
        worktree_path: req.worktree_path.unwrap_or_else(|| ".sparkle-worktree".to_string()),
    };
    sparkle_core::config::save_project_config(&state.repo_root, &project).map_err(|source| SparkleError::Fatal {
        message: source.to_string(),
    })?;
    state.sse.broadcast("configurationUpdated", &json!({"sender": Value::Null}));
    Ok(serde_json::to_value(project).expect("ProjectConfig always serialises"))
}

pub fn config_notify_change(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ConfigNotifyChangeRequest = parse_body(body)?;
    state.sse.broadcast("configurationUpdated", &json!({"sender": req.sender}));
    Ok(json!({}))
}

pub fn internal_aggregate_updated(state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: InternalAggregateUpdatedRequest = parse_body(body)?;
    state.sse.broadcast(
        "aggregatesUpdated",
        &json!({"itemIds": req.item_ids, "reason": "external_write"}),
    );
    Ok(json!({}))
}

pub fn fetch(state: &DaemonState, _body: &[u8]) -> Result<Value, SparkleError> {
    state.sse.broadcast("fetchStatus", &json!({"inProgress": true}));
    let result = state.git.fetch_now();
    if let Err(sparkle_git::GitError::AlreadyInProgress) = &result {
        state.sse.broadcast("fetchStatus", &json!({"inProgress": true}));
        return Ok(json!({"alreadyInProgress": true}));
    }
    if let Err(sparkle_git::GitError::Deferred) = &result {
        state.sse.broadcast("fetchStatus", &json!({"inProgress": false}));
        return Ok(json!({"deferred": true}));
    }
    match &result {
        Ok(r) if r.changed => {
            let ids = state
                .api
                .manager()
                .invalidate_by_files(&r.changed_filenames)
                .map_err(|err| SparkleError::Fatal { message: err.to_string() })?;
            state.sse.broadcast(
                "aggregatesUpdated",
                &json!({"itemIds": ids, "reason": "git_pull"}),
            );
        }
        Ok(_) => {}
        Err(err) => {
            state
                .sse
                .broadcast("fetchCompleted", &json!({"timestamp": sparkle_core::clock::next_timestamp(), "error": err.to_string()}));
            state.sse.broadcast("fetchStatus", &json!({"inProgress": false}));
            return Err(SparkleError::Fatal { message: err.to_string() });
        }
    }
    state
        .sse
        .broadcast("fetchCompleted", &json!({"timestamp": sparkle_core::clock::next_timestamp()}));
    state.sse.broadcast("fetchStatus", &json!({"inProgress": false}));
    Ok(json!({}))
}

pub fn client_log(_state: &DaemonState, body: &[u8]) -> Result<Value, SparkleError> {
    let req: ClientLogRequest = parse_body(body)?;
    match req.level.as_str() {
        "error" => tracing::error!(client = true, "{}", req.message),
        "warn" => tracing::warn!(client = true, "{}", req.message),
        _ => tracing::info!(client = true, "{}", req.message),
    }
    Ok(json!({}))
}
