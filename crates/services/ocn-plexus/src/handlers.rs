//! Identity, authority, and credential handlers.

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::auth::AuthenticatedCaller;
use crate::error::ApiError;
use crate::metrics::{operations, record_operation, status};
use crate::models::*;
use crate::send::{SendOutcome, SendRequest};
use crate::state::AppState;
use crate::store::IncomingCredential;
use ocn_identity::{DidDocument, SignedCredential, VerifiableCredential};
use ocn_types::{
    ActivityEventType, AppIdentity, AppListingStatus, EdgeKind, Profile, ProfileRole,
    RegisteredSigningAuthority,
};

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = Value, example = json!({"status": "ok"}))
    )
)]
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[utoipa::path(
    get,
    path = "/.well-known/did.json",
    responses(
        (status = 200, description = "The service's own DID document", body = Value)
    )
)]
pub async fn root_did_document_handler(State(state): State<AppState>) -> Json<DidDocument> {
    Json(state.resolver.root_document())
}

#[utoipa::path(
    get,
    path = "/users/{profileId}/did.json",
    params(("profileId" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Resolved DID document with delegated key material", body = Value),
        (status = 404, description = "Unknown profile", body = ApiError)
    )
)]
pub async fn user_did_document_handler(
    AxumPath(profile_id): AxumPath<String>,
    State(state): State<AppState>,
) -> Result<Json<DidDocument>, ApiError> {
    Ok(Json(state.resolver.resolve_profile(&profile_id).await?))
}

#[utoipa::path(
    get,
    path = "/app/{slug}/did.json",
    params(("slug" = String, Path, description = "Application slug")),
    responses(
        (status = 200, description = "Application DID document", body = Value),
        (status = 400, description = "Malformed slug", body = ApiError),
        (status = 404, description = "Unknown application", body = ApiError)
    )
)]
pub async fn app_did_document_handler(
    AxumPath(slug): AxumPath<String>,
    State(state): State<AppState>,
) -> Result<Json<DidDocument>, ApiError> {
    Ok(Json(state.resolver.resolve_app(&slug).await?))
}

#[utoipa::path(
    post,
    path = "/profile",
    request_body = CreateProfileRequest,
    responses(
        (status = 201, description = "Profile registered", body = Profile),
        (status = 400, description = "Invalid profile id", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn create_profile_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    caller.require("profiles:write")?;
    let profile = state
        .graph
        .register_profile(
            &caller.did,
            &req.profile_id,
            &req.display_name,
            req.role.unwrap_or(ProfileRole::Member),
        )
        .await?;
    state.resolver.invalidate_all();
    Ok((StatusCode::CREATED, Json(profile)))
}

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The caller's own profile", body = Profile),
        (status = 404, description = "Caller has no profile", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn get_own_profile_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.require_profile(&caller.did).await?))
}

#[utoipa::path(
    get,
    path = "/profile/{profileId}",
    params(("profileId" = String, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Profile detail", body = Profile),
        (status = 404, description = "Unknown profile", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn get_profile_handler(
    _caller: AuthenticatedCaller,
    AxumPath(profile_id): AxumPath<String>,
    State(state): State<AppState>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.graph.profile_by_id(&profile_id).await?))
}

#[utoipa::path(
    post,
    path = "/profile/manage",
    request_body = AddEdgeRequest,
    responses(
        (status = 201, description = "Delegation edge added"),
        (status = 404, description = "Unknown managed profile", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn add_managed_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<AddEdgeRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require("profiles:write")?;
    state
        .graph
        .add_edge(&caller.did, &req.managed, req.kind.unwrap_or(EdgeKind::Manages))
        .await?;
    state.resolver.invalidate_all();
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/profile/manager",
    request_body = AddManagerRequest,
    responses(
        (status = 201, description = "Manager registered for the caller"),
        (status = 404, description = "Unknown manager profile", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn add_manager_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<AddManagerRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require("profiles:write")?;
    let own = state.require_profile(&caller.did).await?;
    let manager = state
        .graph
        .find_profile(&req.manager)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile: {}", req.manager)))?;
    state
        .graph
        .add_edge(
            &manager.did,
            &own.profile_id,
            req.kind.unwrap_or(EdgeKind::Administrates),
        )
        .await?;
    state.resolver.invalidate_all();
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/apps",
    request_body = RegisterAppRequest,
    responses(
        (status = 201, description = "Application identity registered", body = AppIdentity),
        (status = 400, description = "Invalid slug", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn register_app_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<RegisterAppRequest>,
) -> Result<(StatusCode, Json<AppIdentity>), ApiError> {
    caller.require("apps:write")?;
    let did = req.did.unwrap_or_else(|| caller.did.clone());
    let app = state
        .graph
        .register_app(
            &did,
            &req.slug,
            &req.display_name,
            req.status.unwrap_or(AppListingStatus::Draft),
        )
        .await?;
    state.resolver.invalidate_all();
    Ok((StatusCode::CREATED, Json(app)))
}

#[utoipa::path(
    post,
    path = "/api/profile/signing-authority/register",
    request_body = RegisterAuthorityRequest,
    responses(
        (status = 201, description = "Signing authority registered", body = RegisteredSigningAuthority),
        (status = 400, description = "Invalid authority name", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn register_authority_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<RegisterAuthorityRequest>,
) -> Result<(StatusCode, Json<RegisteredSigningAuthority>), ApiError> {
    caller.require("signingAuthorities:write")?;
    let registered = state
        .registry
        .register(&caller.did, &req.name, req.endpoint, req.did, req.owner_did)
        .await?;
    state.resolver.invalidate_all();
    Ok((StatusCode::CREATED, Json(registered)))
}

#[utoipa::path(
    get,
    path = "/api/profile/signing-authorities",
    responses(
        (status = 200, description = "The caller's registered authorities", body = Vec<RegisteredSigningAuthority>)
    ),
    security(("bearer" = []))
)]
pub async fn list_authorities_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
) -> Result<Json<Vec<RegisteredSigningAuthority>>, ApiError> {
    caller.require("signingAuthorities:read")?;
    Ok(Json(state.registry.list(&caller.did).await?))
}

#[utoipa::path(
    post,
    path = "/api/profile/signing-authority/set-primary",
    request_body = SetPrimaryAuthorityRequest,
    responses(
        (status = 204, description = "Primary authority switched"),
        (status = 404, description = "Unknown authority name", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn set_primary_authority_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<SetPrimaryAuthorityRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require("signingAuthorities:write")?;
    state.registry.set_primary(&caller.did, &req.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/send",
    request_body = SendRequest,
    responses(
        (status = 200, description = "Send accepted", body = SendOutcome),
        (status = 404, description = "Unresolvable recipient", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn send_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendOutcome>, ApiError> {
    caller.require("credentials:write")?;
    let issuer = state.require_profile(&caller.did).await?;
    Ok(Json(state.orchestrator.send(&issuer, req).await?))
}

#[utoipa::path(
    post,
    path = "/api/credential/issue",
    request_body = IssueRequest,
    responses(
        (status = 200, description = "Signed credential", body = Value),
        (status = 400, description = "No signing authority registered", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn issue_credential_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<IssueRequest>,
) -> Result<Json<Value>, ApiError> {
    caller.require("credentials:write")?;
    let issuer = state.require_profile(&caller.did).await?;
    let vc = VerifiableCredential::new(
        issuer.did.clone(),
        vec!["Credential".into()],
        req.credential,
    );
    Ok(Json(state.registry.issue(&issuer.did, vc).await?))
}

#[utoipa::path(
    post,
    path = "/api/credential/verify",
    request_body = VerifyCredentialRequest,
    responses(
        (status = 200, description = "Verification verdict", body = VerifyCredentialResponse)
    )
)]
pub async fn verify_credential_handler(
    Json(req): Json<VerifyCredentialRequest>,
) -> Result<Json<VerifyCredentialResponse>, ApiError> {
    let signed: SignedCredential<Value> = serde_json::from_value(req.credential)?;
    let response = match signed.verify() {
        Ok(()) => VerifyCredentialResponse {
            verified: true,
            reason: None,
        },
        Err(e) => VerifyCredentialResponse {
            verified: false,
            reason: Some(e.to_string()),
        },
    };
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/credential/accept",
    request_body = AcceptCredentialRequest,
    responses(
        (status = 200, description = "Credential moved to the received set"),
        (status = 400, description = "Already received", body = ApiError),
        (status = 404, description = "Not in the incoming queue", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn accept_credential_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<AcceptCredentialRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require("credentials:write")?;
    let profile = state.require_profile(&caller.did).await?;

    let activity_id = state
        .credentials
        .incoming_of(&profile.profile_id)
        .await?
        .into_iter()
        .find(|c| c.uri == req.uri)
        .and_then(|c| c.activity_id);

    match state
        .credentials
        .accept_credential(&profile.profile_id, &req.uri)
        .await
    {
        Ok(()) => {
            if let Some(activity_id) = activity_id {
                state
                    .ledger
                    .chain(&activity_id, ActivityEventType::Claimed, None)
                    .await?;
            }
            record_operation(operations::ACCEPT, status::SUCCESS);
            Ok(StatusCode::OK)
        }
        Err(e) => {
            record_operation(operations::ACCEPT, status::ERROR);
            Err(e.into())
        }
    }
}

#[utoipa::path(
    get,
    path = "/profile/incoming",
    responses(
        (status = 200, description = "Credentials awaiting acceptance", body = Vec<IncomingCredential>)
    ),
    security(("bearer" = []))
)]
pub async fn incoming_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
) -> Result<Json<Vec<IncomingCredential>>, ApiError> {
    caller.require("credentials:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(
        state.credentials.incoming_of(&profile.profile_id).await?,
    ))
}
