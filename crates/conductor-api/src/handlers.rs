use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use conductor_domain::{Attrs, Node, NodeId, PowerState};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::patch::{self, PatchOp};
use crate::state::AppState;

fn parse_uuid(raw: &str) -> Result<NodeId, ApiError> {
    Uuid::parse_str(raw)
        .map(NodeId)
        .map_err(|_| ApiError::bad_request(format!("invalid node uuid: {raw}")))
}

// ── Health ──────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ── Nodes: list / detail / create / patch / delete ──────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListNodesQuery {
    pub marker: Option<String>,
    pub limit: Option<usize>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<String>,
    pub instance_uuid: Option<String>,
    pub associated: Option<bool>,
    pub maintenance: Option<bool>,
}

/// `GET /nodes` — list with pagination and the filters spec.md §6 names
/// (`chassis_uuid` is accepted and ignored: this data model has no chassis
/// grouping). Sorted by `sort_key` (`created_at` default, or `uuid`),
/// paginated by `marker` (the last uuid seen) + `limit`.
pub async fn list_nodes(
    State(state): State<AppState>,
    Query(q): Query<ListNodesQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut nodes = state.conductor.list_nodes().await?;

    if let Some(instance_uuid) = &q.instance_uuid {
        let target = Uuid::parse_str(instance_uuid)
            .map_err(|_| ApiError::bad_request(format!("invalid instance_uuid: {instance_uuid}")))?;
        nodes.retain(|n| n.instance_uuid == Some(target));
    }
    if let Some(associated) = q.associated {
        nodes.retain(|n| n.instance_uuid.is_some() == associated);
    }
    if let Some(maintenance) = q.maintenance {
        nodes.retain(|n| n.maintenance == maintenance);
    }

    let descending = matches!(q.sort_dir.as_deref(), Some("desc"));
    match q.sort_key.as_deref() {
        Some("uuid") => nodes.sort_by_key(|n| n.uuid),
        _ => nodes.sort_by_key(|n| n.created_at),
    }
    if descending {
        nodes.reverse();
    }

    if let Some(marker) = &q.marker {
        let marker_uuid = Uuid::parse_str(marker)
            .map_err(|_| ApiError::bad_request(format!("invalid marker: {marker}")))?;
        if let Some(pos) = nodes.iter().position(|n| n.uuid.0 == marker_uuid) {
            nodes.drain(..=pos);
        }
    }
    if let Some(limit) = q.limit {
        nodes.truncate(limit);
    }

    Ok(Json(json!({ "nodes": nodes })))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let node = state.conductor.get_node(parse_uuid(&uuid)?).await?;
    Ok(Json(node))
}

#[derive(Debug, Deserialize)]
pub struct CreateNodeBody {
    pub driver: String,
    pub name: Option<String>,
    #[serde(default)]
    pub conductor_group: String,
    #[serde(default)]
    pub driver_info: Attrs,
    #[serde(default)]
    pub properties: Attrs,
    #[serde(default)]
    pub instance_info: Attrs,
}

/// `POST /nodes`. Mandatory attribute: `driver` (spec.md §6); this data
/// model carries no chassis grouping so the chassis-scoped mandatory
/// attribute does not apply.
pub async fn create_node(
    State(state): State<AppState>,
    Json(body): Json<CreateNodeBody>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let mut node = Node::new(body.driver);
    node.name = body.name;
    node.conductor_group = body.conductor_group;
    node.driver_info = body.driver_info;
    node.properties = body.properties;
    node.instance_info = body.instance_info;

    let created = state.conductor.create_node(node).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PATCH /nodes/{uuid}` — JSON-Patch against the node's public fields.
/// Paths touching internal attributes (`/power_state`, `/provision_state`,
/// `/target_*`, `/last_error`, `/reservation`, `/console_enabled`,
/// `/provision_updated_at`) are rejected with 400 (spec.md §6).
pub async fn patch_node(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(ops): Json<Vec<PatchOp>>,
) -> Result<Json<Node>, ApiError> {
    let node_uuid = parse_uuid(&uuid)?;
    patch::reject_internal_paths(&ops)?;

    let current = state.conductor.get_node(node_uuid).await?;
    let mut value = serde_json::to_value(&current)
        .map_err(|e| ApiError::internal(format!("failed to serialize node: {e}")))?;
    patch::apply(&mut value, &ops)?;
    let patched: Node = serde_json::from_value(value)
        .map_err(|e| conductor_core::ConductorError::PatchError(e.to_string()))?;

    let updated = state.conductor.update_node(patched).await?;
    Ok(Json(updated))
}

pub async fn delete_node(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.conductor.destroy_node(parse_uuid(&uuid)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Node states ──────────────────────────────────────────────────────────────

pub async fn get_node_states(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let node = state.conductor.get_node(parse_uuid(&uuid)?).await?;
    Ok(Json(json!({
        "power_state": node.power_state,
        "target_power_state": node.target_power_state,
        "provision_state": node.provision_state,
        "target_provision_state": node.target_provision_state,
        "last_error": node.last_error,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PowerTargetBody {
    pub target: PowerState,
}

pub async fn put_node_power_state(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(body): Json<PowerTargetBody>,
) -> Result<StatusCode, ApiError> {
    state
        .conductor
        .change_node_power_state(parse_uuid(&uuid)?, body.target)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionTargetWire {
    Active,
    Deleted,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionTargetBody {
    pub target: ProvisionTargetWire,
}

pub async fn put_node_provision_state(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(body): Json<ProvisionTargetBody>,
) -> Result<StatusCode, ApiError> {
    let node_uuid = parse_uuid(&uuid)?;
    match body.target {
        ProvisionTargetWire::Active => state.conductor.do_node_deploy(node_uuid).await?,
        ProvisionTargetWire::Deleted => state.conductor.do_node_tear_down(node_uuid).await?,
    }
    Ok(StatusCode::ACCEPTED)
}

// ── Console ──────────────────────────────────────────────────────────────────

pub async fn get_node_console(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let info = state.conductor.get_console_information(parse_uuid(&uuid)?).await?;
    Ok(Json(json!({ "console_type": info.console_type, "url": info.url })))
}

#[derive(Debug, Deserialize)]
pub struct ConsoleModeQuery {
    pub enabled: bool,
}

pub async fn put_node_console_state(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(q): Query<ConsoleModeQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .conductor
        .set_console_mode(parse_uuid(&uuid)?, q.enabled)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

// ── Vendor passthru ───────────────────────────────────────────────────────────

pub async fn post_node_vendor_passthru(
    State(state): State<AppState>,
    Path((uuid, method)): Path<(String, String)>,
    Json(info): Json<Attrs>,
) -> Result<StatusCode, ApiError> {
    state
        .conductor
        .vendor_passthru(parse_uuid(&uuid)?, method, info)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn post_driver_vendor_passthru(
    State(state): State<AppState>,
    Path((driver, method)): Path<(String, String)>,
    Json(info): Json<Attrs>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .conductor
        .driver_vendor_passthru(&driver, &method, &info)
        .await?;
    Ok(Json(result))
}

// ── Validate ──────────────────────────────────────────────────────────────────

pub async fn get_node_validate(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let results = state
        .conductor
        .validate_driver_interfaces(parse_uuid(&uuid)?)
        .await?;
    let body: Value = results
        .into_iter()
        .map(|(iface, v)| (iface, json!({ "result": v.result, "reason": v.reason })))
        .collect();
    Ok(Json(body))
}

// ── Agent protocol (spec.md §4.6) ─────────────────────────────────────────────

pub async fn post_lookup(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let response = state.agent.lookup(&body).await.map_err(conductor_core::ConductorError::from)?;
    Ok(Json(json!(response)))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatBody {
    pub agent_url: String,
}

pub async fn post_heartbeat(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(body): Json<HeartbeatBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .agent
        .heartbeat(parse_uuid(&uuid)?, body.agent_url)
        .await
        .map_err(conductor_core::ConductorError::from)?;
    Ok(StatusCode::OK)
}
