use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A connection invite issued by a profile.
///
/// `max_uses: None` is unlimited; the invite only disappears when
/// explicitly invalidated. A bounded invite disappears once
/// `uses_remaining` hits zero.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    /// Opaque bearer token.
    pub challenge: String,
    /// Issuing profile.
    pub profile_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    /// Whether this invite can still be consumed at `now`. Exhausted and
    /// expired invites are omitted from listings, not just marked.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return false;
            }
        }
        self.uses_remaining != Some(0)
    }
}
