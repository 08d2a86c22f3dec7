//! Repository interfaces for the plexus service.
//!
//! Every component talks to persistence through these traits; the
//! atomicity-bearing operations (`claim_exclusive`, `consume_invite`,
//! `accept_credential`, `complete_exchange`) are trait methods so the
//! locking discipline lives behind the seam, not in application checks.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocn_identity::Did;
use serde_json::Value;

use crate::exchange::ClaimExchange;
use ocn_types::{
    Activity, ActivityQuery, AppIdentity, Connection, ContactIdentifier, ContactMethod,
    InboxIssuance, InboxIssuanceStatus, Invite, ManagementEdge, Profile,
    RegisteredSigningAuthority,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("already received: {0}")]
    AlreadyReceived(String),

    #[error("{0}")]
    Exhausted(String),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// An active OTP challenge persisted against a contact method.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    /// Opaque handle returned to the caller.
    pub token: String,
    pub identifier: ContactIdentifier,
    pub code: String,
    pub attempts: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A credential sitting in a profile's incoming queue.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCredential {
    pub uri: String,
    pub from_profile_id: String,
    /// Ledger transaction behind the send, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert a profile; conflicts on duplicate profile id or DID.
    async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError>;
    async fn profile_by_id(&self, profile_id: &str) -> Result<Option<Profile>, StoreError>;
    async fn profile_by_did(&self, did: &Did) -> Result<Option<Profile>, StoreError>;

    async fn insert_app(&self, app: AppIdentity) -> Result<(), StoreError>;
    async fn app_by_slug(&self, slug: &str) -> Result<Option<AppIdentity>, StoreError>;

    /// Edges are additive; there is no deletion.
    async fn add_edge(&self, edge: ManagementEdge) -> Result<(), StoreError>;
    async fn edges_from(&self, manager: &Did) -> Result<Vec<ManagementEdge>, StoreError>;
    async fn edges_to(&self, managed: &Did) -> Result<Vec<ManagementEdge>, StoreError>;

    async fn add_connection(&self, profile_id: &str, other: &str) -> Result<(), StoreError>;
    async fn connections_of(&self, profile_id: &str) -> Result<Vec<Connection>, StoreError>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Add an unverified contact method to a profile.
    async fn add_contact(
        &self,
        profile_id: &str,
        identifier: &ContactIdentifier,
    ) -> Result<ContactMethod, StoreError>;
    async fn contacts_of(&self, profile_id: &str) -> Result<Vec<ContactMethod>, StoreError>;
    /// Look up a contact method with its owning profile.
    async fn contact_by_id(
        &self,
        contact_id: &str,
    ) -> Result<Option<(String, ContactMethod)>, StoreError>;
    async fn set_primary(&self, profile_id: &str, contact_id: &str) -> Result<(), StoreError>;
    async fn remove_contact(&self, profile_id: &str, contact_id: &str) -> Result<(), StoreError>;

    /// Atomically verify `identifier` for `profile_id` and delete every
    /// other profile's relationship to it. This is the invariant-bearing
    /// primitive behind contact-method exclusivity; concurrent claims
    /// must serialize here.
    async fn claim_exclusive(
        &self,
        profile_id: &str,
        identifier: &ContactIdentifier,
    ) -> Result<ContactMethod, StoreError>;

    /// The profile that currently owns a verified copy, if any.
    async fn verified_owner(
        &self,
        identifier: &ContactIdentifier,
    ) -> Result<Option<String>, StoreError>;

    /// Replace any active challenge for the same identifier (single
    /// active code per contact method).
    async fn put_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError>;
    async fn challenge_by_token(&self, token: &str) -> Result<Option<OtpChallenge>, StoreError>;
    /// Bump and return the attempt count.
    async fn increment_attempts(&self, token: &str) -> Result<u32, StoreError>;
    async fn delete_challenge(&self, token: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AuthorityStore: Send + Sync {
    /// Insert or replace the named registration. When flagged primary,
    /// clears the flag on the profile's other registrations.
    async fn upsert_authority(
        &self,
        profile_did: &Did,
        authority: RegisteredSigningAuthority,
    ) -> Result<(), StoreError>;
    async fn authorities_of(
        &self,
        profile_did: &Did,
    ) -> Result<Vec<RegisteredSigningAuthority>, StoreError>;
    async fn authority_named(
        &self,
        profile_did: &Did,
        name: &str,
    ) -> Result<Option<RegisteredSigningAuthority>, StoreError>;
    async fn primary_authority(
        &self,
        profile_did: &Did,
    ) -> Result<Option<RegisteredSigningAuthority>, StoreError>;
    async fn set_primary(&self, profile_did: &Did, name: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, activity: Activity) -> Result<(), StoreError>;
    /// Rows for one transaction, ascending by timestamp.
    async fn by_activity_id(&self, activity_id: &str) -> Result<Vec<Activity>, StoreError>;
    /// Actor-scoped rows matching the filters (including the cursor),
    /// strictly descending by timestamp.
    async fn query(
        &self,
        actor_profile_id: &str,
        query: &ActivityQuery,
    ) -> Result<Vec<Activity>, StoreError>;
}

#[async_trait]
pub trait InviteStore: Send + Sync {
    async fn put_invite(&self, invite: Invite) -> Result<(), StoreError>;
    async fn invites_of(&self, profile_id: &str) -> Result<Vec<Invite>, StoreError>;

    /// Atomic decrement-and-check. Errors (never a false success) on an
    /// unknown, expired, or exhausted invite; removes bounded invites
    /// that reach zero uses.
    async fn consume_invite(
        &self,
        issuer_profile_id: &str,
        challenge: &str,
        now: DateTime<Utc>,
    ) -> Result<Invite, StoreError>;

    /// Returns whether an invite was removed.
    async fn invalidate(&self, profile_id: &str, challenge: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ExchangeStore: Send + Sync {
    async fn put_exchange(&self, exchange: ClaimExchange) -> Result<(), StoreError>;
    async fn get_exchange(
        &self,
        workflow_id: &str,
        exchange_id: &str,
    ) -> Result<Option<ClaimExchange>, StoreError>;

    /// The single `Initiated -> Completed` transition; conflicts on a
    /// second completion.
    async fn complete_exchange(
        &self,
        workflow_id: &str,
        exchange_id: &str,
    ) -> Result<ClaimExchange, StoreError>;
}

#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn put_issuance(&self, issuance: InboxIssuance) -> Result<(), StoreError>;
    async fn issuance_by_id(&self, id: &str) -> Result<Option<InboxIssuance>, StoreError>;
    /// Open (pending/issued/delivered) issuances addressed to a contact.
    async fn open_issuances_for(
        &self,
        identifier: &ContactIdentifier,
    ) -> Result<Vec<InboxIssuance>, StoreError>;
    async fn issuances_of_issuer(
        &self,
        profile_id: &str,
        status: Option<InboxIssuanceStatus>,
    ) -> Result<Vec<InboxIssuance>, StoreError>;
    async fn set_status(&self, id: &str, status: InboxIssuanceStatus) -> Result<(), StoreError>;
    /// Open issuances whose expiry has lapsed at `now`.
    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<InboxIssuance>, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store opaque content, returning its URI (`ocn:<kind>:<uuid>`).
    async fn upload(&self, kind: &str, content: Value) -> Result<String, StoreError>;
    async fn get(&self, uri: &str) -> Result<Option<Value>, StoreError>;

    async fn enqueue_incoming(
        &self,
        profile_id: &str,
        incoming: IncomingCredential,
    ) -> Result<(), StoreError>;
    async fn incoming_of(&self, profile_id: &str) -> Result<Vec<IncomingCredential>, StoreError>;

    /// One-way receipt: moves a URI from the incoming queue to the
    /// received set, rejecting a second accept of the same URI.
    async fn accept_credential(&self, profile_id: &str, uri: &str) -> Result<(), StoreError>;
    async fn received_of(&self, profile_id: &str) -> Result<Vec<String>, StoreError>;
}
