//! Connection invites.
//!
//! A profile mints an opaque challenge string; anyone presenting it
//! within its use and expiry bounds gets connected to the issuer. The
//! decrement-and-check lives in the store so two racing redemptions of
//! a single-use invite cannot both succeed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::ApiError;
use crate::store::{InviteStore, ProfileStore};
use ocn_types::Invite;

const DEFAULT_INVITE_TTL_DAYS: i64 = 30;

pub struct InviteService {
    invites: Arc<dyn InviteStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl InviteService {
    pub fn new(invites: Arc<dyn InviteStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { invites, profiles }
    }

    /// Mint an invite for `profile_id`. `expires_in` of zero seconds
    /// means no expiry; `max_uses` of zero means unlimited. Both default
    /// conservative: 30 days, single use.
    pub async fn generate(
        &self,
        profile_id: &str,
        expires_in_secs: Option<i64>,
        max_uses: Option<u32>,
    ) -> Result<Invite, ApiError> {
        let expires_at = match expires_in_secs {
            Some(0) => None,
            Some(secs) if secs < 0 => {
                return Err(ApiError::BadRequest("expiresIn must not be negative".into()))
            }
            Some(secs) => Some(Utc::now() + Duration::seconds(secs)),
            None => Some(Utc::now() + Duration::days(DEFAULT_INVITE_TTL_DAYS)),
        };
        let uses = match max_uses {
            Some(0) => None,
            Some(n) => Some(n),
            None => Some(1),
        };

        let invite = Invite {
            challenge: Uuid::new_v4().to_string(),
            profile_id: profile_id.to_string(),
            max_uses: uses,
            uses_remaining: uses,
            expires_at,
            created_at: Utc::now(),
        };
        self.invites.put_invite(invite.clone()).await?;
        Ok(invite)
    }

    /// The profile's currently consumable invites.
    pub async fn list(&self, profile_id: &str) -> Result<Vec<Invite>, ApiError> {
        let now = Utc::now();
        Ok(self
            .invites
            .invites_of(profile_id)
            .await?
            .into_iter()
            .filter(|i| i.is_consumable(now))
            .collect())
    }

    /// Redeem `challenge` issued by `issuer_profile_id` on behalf of
    /// `caller_profile_id`, connecting the two profiles.
    pub async fn connect(
        &self,
        caller_profile_id: &str,
        issuer_profile_id: &str,
        challenge: &str,
    ) -> Result<(), ApiError> {
        self.profiles
            .profile_by_id(issuer_profile_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("profile: {}", issuer_profile_id)))?;

        self.invites
            .consume_invite(issuer_profile_id, challenge, Utc::now())
            .await?;
        self.profiles
            .add_connection(caller_profile_id, issuer_profile_id)
            .await?;
        tracing::info!(
            caller = caller_profile_id,
            issuer = issuer_profile_id,
            "invite redeemed"
        );
        Ok(())
    }

    /// Returns whether an invite was actually removed.
    pub async fn invalidate(&self, profile_id: &str, challenge: &str) -> Result<bool, ApiError> {
        Ok(self.invites.invalidate(profile_id, challenge).await?)
    }
}
