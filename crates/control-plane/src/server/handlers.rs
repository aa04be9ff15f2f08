//! Route handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::WithRejection;
use node_runtime::{Error, NodeType, RuntimeProvider, SshKey};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::auth::AccountId;
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::sessions::{Session, SessionCreateParams};
use crate::store::{Project, StoreError};

// Extractors whose rejections render as `ApiError`.
type ApiJson<T> = WithRejection<Json<T>, ApiError>;
type ApiQuery<T> = WithRejection<Query<T>, ApiError>;
type ApiPath<T> = WithRejection<Path<T>, ApiError>;

// ============================================================================
// Request and response bodies
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ProjectCreateRequest {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeTypesQuery {
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeTypesListResponse {
    node_types: Vec<NodeType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyAddRequest {
    #[serde(default)]
    name: Option<String>,
    public_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SshKeyGenerateRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SshKeyListResponse {
    keys: Vec<SshKey>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateRequest {
    #[serde(default)]
    provider: String,
    #[serde(rename = "nodeTypeID", default)]
    node_type_id: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    ssh_key_name: Option<String>,
    #[serde(default)]
    ssh_public_key: Option<String>,
}

impl SessionCreateRequest {
    fn into_params(self) -> Result<SessionCreateParams, Error> {
        if self.node_type_id.is_empty() {
            return Err(Error::bad_request(
                "Invalid request body: field 'nodeTypeID' is required",
            ));
        }
        Ok(SessionCreateParams {
            provider: parse_provider(&self.provider)?,
            node_type_id: self.node_type_id,
            region: self.region.filter(|r| !r.is_empty()),
            ssh_key_name: self.ssh_key_name,
            ssh_public_key: self.ssh_public_key,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionListQuery {
    #[serde(default)]
    terminated: bool,
}

#[derive(Debug, Serialize)]
struct SessionsListResponse {
    sessions: Vec<Session>,
}

#[derive(Debug, Serialize)]
struct SessionTerminateResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
pub struct BuildCreateQuery {
    builder: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BuildGetQuery {
    #[serde(default)]
    logs: bool,
}

// ============================================================================
// Helpers
// ============================================================================

fn provider_suggestion() -> String {
    let names: Vec<String> = RuntimeProvider::ALL
        .iter()
        .map(|p| format!("{:?}", p.as_str()))
        .collect();
    format!("Use {} as the runtime provider", names.join(" or "))
}

fn parse_provider(raw: &str) -> Result<RuntimeProvider, Error> {
    if raw.is_empty() {
        return Err(
            Error::bad_request("Invalid request body: field 'provider' is required")
                .with_suggestion(provider_suggestion()),
        );
    }
    raw.parse().map_err(|_| {
        Error::bad_request(format!("Invalid runtime provider: {raw}"))
            .with_suggestion(provider_suggestion())
    })
}

/// Load a project owned by `account`. Someone else's project is reported as missing.
async fn owned_project(state: &AppState, account: AccountId, project_id: Uuid) -> ApiResult<Project> {
    let project = state
        .store
        .get_project(project_id)
        .await
        .map_err(Error::from)?
        .filter(|p| p.owner_id == account.0)
        .ok_or_else(|| Error::not_found("Project not found"))?;
    Ok(project)
}

async fn project_session(
    state: &AppState,
    project_id: Uuid,
    session_id: Uuid,
) -> ApiResult<Session> {
    let session = state.sessions.get(session_id).await?;
    if session.project_id != project_id {
        return Err(Error::not_found("Session not found").into());
    }
    Ok(session)
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Json(body), _): ApiJson<ProjectCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("Invalid request body: field 'name' is required").into());
    }

    let project = state
        .store
        .create_project(account.0, name)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => Error::bad_request("Project already exists").with_source(e),
            StoreError::Backend(_) => Error::from(e),
        })?;
    info!(project_id = %project.id, account_id = %account.0, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path(project_id), _): ApiPath<Uuid>,
) -> ApiResult<Json<Project>> {
    Ok(Json(owned_project(&state, account, project_id).await?))
}

pub async fn list_node_types(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path(provider), _): ApiPath<String>,
    WithRejection(Query(query), _): ApiQuery<NodeTypesQuery>,
) -> ApiResult<impl IntoResponse> {
    let provider = parse_provider(&provider)?;
    info!(provider = %provider, "Listing node types");

    let node_types = state
        .providers
        .list_node_types(account.0, provider, query.available)
        .await?;
    Ok(Json(NodeTypesListResponse { node_types }))
}

pub async fn list_ssh_keys(
    State(state): State<Arc<AppState>>,
    account: AccountId,
) -> ApiResult<impl IntoResponse> {
    let keys = state.keys.list(account.0).await?;
    Ok(Json(SshKeyListResponse { keys }))
}

pub async fn add_ssh_key(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Json(body), _): ApiJson<SshKeyAddRequest>,
) -> ApiResult<impl IntoResponse> {
    let key = state
        .keys
        .add(account.0, body.name.as_deref(), &body.public_key)
        .await?;
    Ok((StatusCode::CREATED, Json(key)))
}

pub async fn generate_ssh_key(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Json(body), _): ApiJson<SshKeyGenerateRequest>,
) -> ApiResult<impl IntoResponse> {
    let key = state.keys.generate(account.0, body.name.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path(project_id), _): ApiPath<Uuid>,
    WithRejection(Json(body), _): ApiJson<SessionCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    owned_project(&state, account, project_id).await?;
    let params = body.into_params()?;

    let session = state.sessions.create(account.0, project_id, params).await?;
    // Detached: the watcher outlives the request.
    let _watcher = state.sessions.spawn_watch(session.id);

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path(project_id), _): ApiPath<Uuid>,
    WithRejection(Query(query), _): ApiQuery<SessionListQuery>,
) -> ApiResult<impl IntoResponse> {
    owned_project(&state, account, project_id).await?;
    let sessions = state.sessions.list(project_id, query.terminated).await?;
    Ok(Json(SessionsListResponse { sessions }))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path((project_id, session_id)), _): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<Session>> {
    owned_project(&state, account, project_id).await?;
    Ok(Json(project_session(&state, project_id, session_id).await?))
}

pub async fn terminate_session(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path((project_id, session_id)), _): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    owned_project(&state, account, project_id).await?;
    project_session(&state, project_id, session_id).await?;

    state.sessions.terminate(session_id).await?;
    Ok(Json(SessionTerminateResponse { success: true }))
}

pub async fn create_build(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path(project_id), _): ApiPath<Uuid>,
    WithRejection(Query(query), _): ApiQuery<BuildCreateQuery>,
    context: Bytes,
) -> ApiResult<impl IntoResponse> {
    owned_project(&state, account, project_id).await?;
    if context.is_empty() {
        return Err(Error::bad_request("Build context is empty")
            .with_suggestion("Upload a zipped build context as the request body")
            .into());
    }

    let build = state
        .builds
        .create(account.0, project_id, &query.builder, context.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(build)))
}

pub async fn get_build(
    State(state): State<Arc<AppState>>,
    account: AccountId,
    WithRejection(Path((project_id, build_id)), _): ApiPath<(Uuid, Uuid)>,
    WithRejection(Query(query), _): ApiQuery<BuildGetQuery>,
) -> ApiResult<impl IntoResponse> {
    owned_project(&state, account, project_id).await?;
    let build = state.builds.get(build_id, query.logs).await?;
    if build.project_id != project_id {
        return Err(Error::not_found("Build not found").into());
    }
    Ok(Json(build))
}
