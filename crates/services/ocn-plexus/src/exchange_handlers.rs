//! Claim-exchange protocol handler.

use axum::{
    body::Bytes,
    extract::{Path as AxumPath, State},
    Json,
};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;
use ocn_identity::VerifiablePresentation;

#[utoipa::path(
    post,
    path = "/api/workflows/{workflowId}/exchanges/{exchangeId}",
    request_body(content = Value, description = "Empty for the presentation request; a signed DID-auth presentation to complete"),
    responses(
        (status = 200, description = "Presentation request or the claimed credential", body = Value),
        (status = 400, description = "Expired or already completed", body = ApiError),
        (status = 401, description = "Presentation rejected", body = ApiError),
        (status = 404, description = "Unknown exchange", body = ApiError)
    )
)]
pub async fn participate_exchange_handler(
    AxumPath((workflow_id, exchange_id)): AxumPath<(String, String)>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    // An empty body is the first protocol round; anything else must be
    // a verifiable presentation.
    let presentation: Option<VerifiablePresentation> = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body)?)
    };
    Ok(Json(
        state
            .exchanges
            .participate(&workflow_id, &exchange_id, presentation)
            .await?,
    ))
}
