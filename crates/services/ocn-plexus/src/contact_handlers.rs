//! Contact-method handlers.

use axum::{extract::State, http::StatusCode, Json};

use crate::auth::AuthenticatedCaller;
use crate::contact::ContactMethodSession;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;
use ocn_identity::VerifiablePresentation;
use ocn_types::{ContactIdentifier, ContactMethod};

#[utoipa::path(
    get,
    path = "/profile/contact-methods",
    responses(
        (status = 200, description = "The caller's contact methods", body = Vec<ContactMethod>)
    ),
    security(("bearer" = []))
)]
pub async fn list_contact_methods_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
) -> Result<Json<Vec<ContactMethod>>, ApiError> {
    caller.require("contact-methods:read")?;
    let profile = state.require_profile(&caller.did).await?;
    Ok(Json(state.verifier.list(&profile.profile_id).await?))
}

#[utoipa::path(
    post,
    path = "/profile/contact-methods/add",
    request_body = AddContactMethodRequest,
    responses(
        (status = 201, description = "Contact method added unverified", body = ContactMethod),
        (status = 403, description = "Phone methods need a registered issuer", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn add_contact_method_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<AddContactMethodRequest>,
) -> Result<(StatusCode, Json<ContactMethod>), ApiError> {
    caller.require("contact-methods:write")?;
    let profile = state.require_profile(&caller.did).await?;
    let identifier = ContactIdentifier::new(req.method_type, &req.value);
    let method = state
        .verifier
        .add(&caller.did, &profile.profile_id, &identifier)
        .await?;
    Ok((StatusCode::CREATED, Json(method)))
}

#[utoipa::path(
    post,
    path = "/contact-methods/challenge",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge dispatched", body = ChallengeResponse),
        (status = 401, description = "Unknown publishable key", body = ApiError)
    )
)]
pub async fn challenge_handler(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let identifier = ContactIdentifier::new(req.method_type, &req.value);
    let token = state
        .verifier
        .send_challenge(&identifier, &req.publishable_key)
        .await?;
    Ok(Json(ChallengeResponse { token }))
}

#[utoipa::path(
    post,
    path = "/profile/contact-methods/verify",
    request_body = VerifyContactRequest,
    responses(
        (status = 200, description = "Contact method verified exclusively", body = ContactMethod),
        (status = 401, description = "Invalid or expired code", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn verify_contact_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<VerifyContactRequest>,
) -> Result<Json<ContactMethod>, ApiError> {
    caller.require("contact-methods:write")?;
    let profile = state.require_profile(&caller.did).await?;
    let method = state
        .verifier
        .verify(&profile.profile_id, &req.token, &req.code)
        .await?;
    Ok(Json(method))
}

#[utoipa::path(
    post,
    path = "/profile/contact-methods/verify-with-credential",
    request_body = VerifyWithCredentialRequest,
    responses(
        (status = 200, description = "Contact method verified via proof-of-login", body = ContactMethod),
        (status = 400, description = "Malformed challenge", body = ApiError),
        (status = 401, description = "Bad signature or untrusted holder", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn verify_with_credential_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<VerifyWithCredentialRequest>,
) -> Result<Json<ContactMethod>, ApiError> {
    caller.require("contact-methods:write")?;
    let profile = state.require_profile(&caller.did).await?;
    let presentation: VerifiablePresentation = serde_json::from_value(req.presentation)?;
    let method = state
        .verifier
        .verify_with_credential(&profile.profile_id, &presentation)
        .await?;
    Ok(Json(method))
}

#[utoipa::path(
    post,
    path = "/contact-methods/session",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Short-lived session presentation", body = ContactMethodSession),
        (status = 401, description = "Invalid or expired code", body = ApiError)
    )
)]
pub async fn session_handler(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ContactMethodSession>, ApiError> {
    Ok(Json(
        state.verifier.create_session(&req.token, &req.code).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/profile/contact-methods/set-primary",
    request_body = ContactMethodIdRequest,
    responses(
        (status = 204, description = "Primary contact method switched"),
        (status = 403, description = "Not the owner", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn set_primary_contact_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<ContactMethodIdRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require("contact-methods:write")?;
    let profile = state.require_profile(&caller.did).await?;
    state
        .verifier
        .set_primary(&profile.profile_id, &req.contact_method_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/profile/contact-methods/remove",
    request_body = ContactMethodIdRequest,
    responses(
        (status = 204, description = "Contact method removed"),
        (status = 403, description = "Not the owner", body = ApiError)
    ),
    security(("bearer" = []))
)]
pub async fn remove_contact_method_handler(
    caller: AuthenticatedCaller,
    State(state): State<AppState>,
    Json(req): Json<ContactMethodIdRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require("contact-methods:write")?;
    let profile = state.require_profile(&caller.did).await?;
    state
        .verifier
        .remove(&profile.profile_id, &req.contact_method_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
