//! Activity ledger, inbox, and invite handlers.

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    Json,
};

use crate::auth::AuthenticatedCaller;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;
use ocn_types::{
    Activity, ActivityPage, ActivityQuery, ActivityStats, Connection, InboxIssuance, Invite,
};

#[utoipa::path(
    get,
    path = "/profile/activities",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Activity rows, newest first", body = ActivityPage)
    ),
    security(("bearer" = []))
)]
pub async fn list_activities_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityPage>, ApiError> {
    caller.require("activities:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(state.ledger.list(&profile.profile_id, &query).await?))
}

#[utoipa::path(
    get,
    path = "/profile/activities/stats",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Derived aggregates over the matching rows", body = ActivityStats)
    ),
    security(("bearer" = []))
)]
pub async fn activity_stats_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityStats>, ApiError> {
    caller.require("activities:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(state.ledger.stats(&profile.profile_id, &query).await?))
}

#[utoipa::path(
    get,
    path = "/profile/activities/{activityId}",
    params(("activityId" = String, Path, description = "Activity transaction id")),
    responses(
        (status = 200, description = "Latest row of the transaction", body = Activity),
        (status = 404, description = "Unknown or foreign transaction", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn get_activity_handler(
    caller: AuthenticatedCaller,
    AxumPath(activity_id): AxumPath<String>,
    State(state): State<AppState>,
) -> Result<Json<Activity>, ApiError> {
    caller.require("activities:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(
        state.ledger.latest(&profile.profile_id, &activity_id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/profile/inbox",
    params(InboxQuery),
    responses(
        (status = 200, description = "Issuances the caller has sent out-of-network", body = Vec<InboxIssuance>)
    ),
    security(("bearer" = []))
)]
pub async fn inbox_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Vec<InboxIssuance>>, ApiError> {
    caller.require("inbox:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(
        state.inbox.list(&profile.profile_id, query.status).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/profile/invite",
    request_body = GenerateInviteRequest,
    responses(
        (status = 201, description = "Fresh invite", body = Invite)
    ),
    security(("bearer" = []))
)]
pub async fn generate_invite_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<GenerateInviteRequest>,
) -> Result<(StatusCode, Json<Invite>), ApiError> {
    caller.require("invites:write")?;
    let profile = state.require_profile(&caller.did).await?;
    let invite = state
        .invites
        .generate(&profile.profile_id, req.expires_in, req.max_uses)
        .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

#[utoipa::path(
    get,
    path = "/profile/invites",
    responses(
        (status = 200, description = "The caller's consumable invites", body = Vec<Invite>)
    ),
    security(("bearer" = []))
)]
pub async fn list_invites_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invite>>, ApiError> {
    caller.require("invites:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(state.invites.list(&profile.profile_id).await?))
}

#[utoipa::path(
    delete,
    path = "/profile/invites/{challenge}",
    params(("challenge" = String, Path, description = "Invite challenge")),
    responses(
        (status = 200, description = "Whether an invite was removed", body = InvalidatedResponse)
    ),
    security(("bearer" = []))
)]
pub async fn invalidate_invite_handler(
    caller: AuthenticatedCaller,
    AxumPath(challenge): AxumPath<String>,
    State(state): State<AppState>,
) -> Result<Json<InvalidatedResponse>, ApiError> {
    caller.require("invites:write")?;
    let profile = state.require_profile(&caller.did).await?;
    let removed = state
        .invites
        .invalidate(&profile.profile_id, &challenge)
        .await?;
    Ok(Json(InvalidatedResponse { removed }))
}

#[utoipa::path(
    post,
    path = "/profile/connect",
    request_body = ConnectRequest,
    responses(
        (status = 201, description = "Connection established"),
        (status = 400, description = "Consumed, expired, or unknown invite", body = ApiError),
        (status = 404, description = "Unknown inviting profile", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn connect_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require("invites:write")?;
    let profile = state.require_profile(&caller.did).await?;
    state
        .invites
        .connect(&profile.profile_id, &req.profile_id, &req.challenge)
        .await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    get,
    path = "/profile/connections",
    responses(
        (status = 200, description = "The caller's connections", body = Vec<Connection>)
    ),
    security(("bearer" = []))
)]
pub async fn list_connections_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
) -> Result<Json<Vec<Connection>>, ApiError> {
    caller.require("connections:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(state.graph.connections(&profile.profile_id).await?))
}
