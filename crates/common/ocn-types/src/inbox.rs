use crate::ContactIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InboxIssuanceStatus {
    /// Signing happens before the record exists, so this is the
    /// starting state.
    Issued,
    Delivered,
    Claimed,
    Expired,
}

/// An out-of-network issuance waiting for its recipient to claim it or
/// to join the network.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboxIssuance {
    pub id: String,
    pub recipient: ContactIdentifier,
    pub credential_uri: String,
    pub status: InboxIssuanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub issuer_profile_id: String,
    pub activity_id: String,
    pub created_at: DateTime<Utc>,
}

impl InboxIssuance {
    /// Still waiting on the recipient: claimable or deliverable.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            InboxIssuanceStatus::Issued | InboxIssuanceStatus::Delivered
        )
    }
}
