//! Out-of-network issuance inbox.
//!
//! Credentials sent to an email address or phone number with no profile
//! behind it park here until the contact method is verified by some
//! profile, at which point every open issuance addressed to it is
//! delivered into that profile's incoming queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ledger::ActivityLedger;
use crate::store::{CredentialStore, InboxStore, IncomingCredential};
use ocn_types::{
    ActivityEventType, ContactIdentifier, InboxIssuance, InboxIssuanceStatus,
};

pub struct InboxService {
    inbox: Arc<dyn InboxStore>,
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<ActivityLedger>,
}

impl InboxService {
    pub fn new(
        inbox: Arc<dyn InboxStore>,
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<ActivityLedger>,
    ) -> Self {
        Self {
            inbox,
            credentials,
            ledger,
        }
    }

    pub async fn create_issuance(
        &self,
        recipient: ContactIdentifier,
        credential_uri: String,
        claim_url: Option<String>,
        expires_at: DateTime<Utc>,
        issuer_profile_id: String,
        activity_id: String,
    ) -> Result<InboxIssuance, ApiError> {
        let issuance = InboxIssuance {
            id: Uuid::new_v4().to_string(),
            recipient,
            credential_uri,
            status: InboxIssuanceStatus::Issued,
            claim_url,
            expires_at,
            issuer_profile_id,
            activity_id,
            created_at: Utc::now(),
        };
        self.inbox.put_issuance(issuance.clone()).await?;
        Ok(issuance)
    }

    /// Deliver every open issuance addressed to `identifier` into the
    /// incoming queue of `profile_id`. Called right after a contact
    /// method is verified, so ownership is already established.
    pub async fn deliver_pending(
        &self,
        profile_id: &str,
        identifier: &ContactIdentifier,
    ) -> Result<usize, ApiError> {
        let pending = self.inbox.open_issuances_for(identifier).await?;
        let mut delivered = 0;
        for issuance in pending {
            if issuance.status == InboxIssuanceStatus::Delivered {
                continue;
            }
            self.credentials
                .enqueue_incoming(
                    profile_id,
                    IncomingCredential {
                        uri: issuance.credential_uri.clone(),
                        from_profile_id: issuance.issuer_profile_id.clone(),
                        activity_id: Some(issuance.activity_id.clone()),
                        sent_at: Utc::now(),
                    },
                )
                .await?;
            self.inbox
                .set_status(&issuance.id, InboxIssuanceStatus::Delivered)
                .await?;
            self.ledger
                .chain(&issuance.activity_id, ActivityEventType::Delivered, None)
                .await?;
            delivered += 1;
        }
        if delivered > 0 {
            tracing::info!(profile_id, delivered, "delivered pending issuances");
        }
        Ok(delivered)
    }

    /// Mark an issuance claimed once its exchange completes.
    pub async fn finalize_claim(&self, issuance_id: &str) -> Result<(), ApiError> {
        self.inbox
            .set_status(issuance_id, InboxIssuanceStatus::Claimed)
            .await?;
        Ok(())
    }

    pub async fn list(
        &self,
        issuer_profile_id: &str,
        status: Option<InboxIssuanceStatus>,
    ) -> Result<Vec<InboxIssuance>, ApiError> {
        Ok(self
            .inbox
            .issuances_of_issuer(issuer_profile_id, status)
            .await?)
    }

    /// Sweep open issuances past their expiry, supplementing the ledger
    /// with an EXPIRED event for each.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<usize, ApiError> {
        let due = self.inbox.due_for_expiry(now).await?;
        let mut expired = 0;
        for issuance in due {
            self.inbox
                .set_status(&issuance.id, InboxIssuanceStatus::Expired)
                .await?;
            self.ledger
                .chain(&issuance.activity_id, ActivityEventType::Expired, None)
                .await?;
            expired += 1;
        }
        if expired > 0 {
            tracing::info!(expired, "expired stale issuances");
        }
        Ok(expired)
    }
}
