//! VC-API claim exchanges.
//!
//! A claim link points at one workflow/exchange pair. Hitting it with an
//! empty body returns a DID-auth presentation request; answering with a
//! signed presentation completes the exchange exactly once and hands
//! over the credential. Verification happens before the state
//! transition, so a bad presentation never burns the exchange.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::inbox::InboxService;
use crate::ledger::ActivityLedger;
use crate::metrics::{operations, record_operation, status};
use crate::store::{ContactStore, CredentialStore, ExchangeStore, IncomingCredential, ProfileStore};
use ocn_identity::{Did, VerifiablePresentation};
use ocn_types::{ActivityEventType, ContactIdentifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    Initiated { challenge: String, domain: String },
    Completed,
}

/// One pending (or completed) claim exchange.
#[derive(Debug, Clone)]
pub struct ClaimExchange {
    pub workflow_id: String,
    pub exchange_id: String,
    pub state: ExchangeState,
    pub credential_uri: String,
    pub recipient: ContactIdentifier,
    pub issuer_profile_id: String,
    pub activity_id: String,
    pub inbox_issuance_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub struct ClaimExchangeService {
    exchanges: Arc<dyn ExchangeStore>,
    credentials: Arc<dyn CredentialStore>,
    contacts: Arc<dyn ContactStore>,
    profiles: Arc<dyn ProfileStore>,
    inbox: Arc<InboxService>,
    ledger: Arc<ActivityLedger>,
    domain: String,
    claim_ttl: Duration,
}

impl ClaimExchangeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchanges: Arc<dyn ExchangeStore>,
        credentials: Arc<dyn CredentialStore>,
        contacts: Arc<dyn ContactStore>,
        profiles: Arc<dyn ProfileStore>,
        inbox: Arc<InboxService>,
        ledger: Arc<ActivityLedger>,
        domain: String,
        claim_ttl: Duration,
    ) -> Self {
        Self {
            exchanges,
            credentials,
            contacts,
            profiles,
            inbox,
            ledger,
            domain,
            claim_ttl,
        }
    }

    /// Open a fresh exchange for a stored credential and return it.
    pub async fn initiate(
        &self,
        credential_uri: String,
        recipient: ContactIdentifier,
        issuer_profile_id: String,
        activity_id: String,
        inbox_issuance_id: Option<String>,
    ) -> Result<ClaimExchange, ApiError> {
        let exchange = ClaimExchange {
            workflow_id: Uuid::new_v4().to_string(),
            exchange_id: Uuid::new_v4().to_string(),
            state: ExchangeState::Initiated {
                challenge: Uuid::new_v4().to_string(),
                domain: self.domain.clone(),
            },
            credential_uri,
            recipient,
            issuer_profile_id,
            activity_id,
            inbox_issuance_id,
            expires_at: Utc::now() + self.claim_ttl,
            created_at: Utc::now(),
        };
        self.exchanges.put_exchange(exchange.clone()).await?;
        Ok(exchange)
    }

    /// Attach the inbox issuance backing this exchange, once both
    /// exist. The issuance needs the claim URL and the exchange needs
    /// the issuance id, so the link is written second.
    pub async fn link_issuance(
        &self,
        exchange: &ClaimExchange,
        issuance_id: &str,
    ) -> Result<(), ApiError> {
        let mut updated = exchange.clone();
        updated.inbox_issuance_id = Some(issuance_id.to_string());
        self.exchanges.put_exchange(updated).await?;
        Ok(())
    }

    pub fn claim_url(&self, exchange: &ClaimExchange) -> String {
        format!(
            "https://{}/api/workflows/{}/exchanges/{}",
            self.domain, exchange.workflow_id, exchange.exchange_id
        )
    }

    /// One round of the exchange protocol. An empty request yields the
    /// presentation request; a signed DID-auth presentation completes
    /// the exchange and returns the credential.
    pub async fn participate(
        &self,
        workflow_id: &str,
        exchange_id: &str,
        presentation: Option<VerifiablePresentation>,
    ) -> Result<Value, ApiError> {
        let exchange = self
            .exchanges
            .get_exchange(workflow_id, exchange_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("exchange: {}", exchange_id)))?;

        if Utc::now() > exchange.expires_at {
            record_operation(operations::CLAIM, status::ERROR);
            return Err(ApiError::BadRequest("exchange has expired".into()));
        }

        let (challenge, domain) = match &exchange.state {
            ExchangeState::Initiated { challenge, domain } => (challenge.clone(), domain.clone()),
            ExchangeState::Completed => {
                record_operation(operations::CLAIM, status::ERROR);
                return Err(ApiError::BadRequest("exchange already completed".into()));
            }
        };

        let vp = match presentation {
            None => {
                return Ok(json!({
                    "verifiablePresentationRequest": {
                        "query": [{"type": "DIDAuthentication"}],
                        "challenge": challenge,
                        "domain": domain,
                    }
                }));
            }
            Some(vp) => vp,
        };

        // Verify before the state transition so a rejected presentation
        // leaves the exchange claimable.
        vp.verify().map_err(|_| {
            record_operation(operations::CLAIM, status::ERROR);
            ApiError::Unauthorized("presentation verification failed".into())
        })?;
        if vp.challenge() != Some(challenge.as_str()) {
            record_operation(operations::CLAIM, status::ERROR);
            return Err(ApiError::Unauthorized("challenge mismatch".into()));
        }

        let exchange = self.exchanges.complete_exchange(workflow_id, exchange_id).await?;

        let credential = self
            .credentials
            .get(&exchange.credential_uri)
            .await?
            .ok_or_else(|| {
                ApiError::InternalServerError(format!(
                    "credential missing: {}",
                    exchange.credential_uri
                ))
            })?;

        self.attach_holder(&exchange, &vp.holder).await?;

        if let Some(issuance_id) = &exchange.inbox_issuance_id {
            self.inbox.finalize_claim(issuance_id).await?;
        }
        self.ledger
            .chain(&exchange.activity_id, ActivityEventType::Claimed, None)
            .await?;

        record_operation(operations::CLAIM, status::SUCCESS);
        tracing::info!(
            workflow_id,
            exchange_id,
            holder = %vp.holder,
            "exchange completed"
        );
        Ok(json!({ "credential": credential }))
    }

    /// When the claiming holder has a registered profile, route the
    /// credential into their incoming queue and take over the contact
    /// method the claim link was addressed to.
    async fn attach_holder(&self, exchange: &ClaimExchange, holder: &Did) -> Result<(), ApiError> {
        let Some(profile) = self.profiles.profile_by_did(holder).await? else {
            return Ok(());
        };

        self.credentials
            .enqueue_incoming(
                &profile.profile_id,
                IncomingCredential {
                    uri: exchange.credential_uri.clone(),
                    from_profile_id: exchange.issuer_profile_id.clone(),
                    activity_id: Some(exchange.activity_id.clone()),
                    sent_at: Utc::now(),
                },
            )
            .await?;
        // Completing a claim sent to a contact method is itself proof of
        // control, so the method moves to the claiming profile.
        self.contacts
            .claim_exclusive(&profile.profile_id, &exchange.recipient)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use ocn_identity::KeyPair;
    use ocn_types::{
        Activity, ActivityRecipientType, ActivitySource, ContactMethodType, Profile, ProfileRole,
    };

    struct Fixture {
        service: ClaimExchangeService,
        store: Arc<InMemoryStore>,
        ledger: Arc<ActivityLedger>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(ActivityLedger::new(store.clone()));
        let inbox = Arc::new(InboxService::new(
            store.clone(),
            store.clone(),
            ledger.clone(),
        ));
        let service = ClaimExchangeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            inbox,
            ledger.clone(),
            "network.example".into(),
            Duration::days(30),
        );
        Fixture {
            service,
            store,
            ledger,
        }
    }

    async fn open_exchange(fx: &Fixture) -> ClaimExchange {
        let uri = fx
            .store
            .upload("credential", json!({"name": "membership"}))
            .await
            .unwrap();
        let origin = fx
            .ledger
            .record(Activity::origin(
                ActivityEventType::Created,
                ActivitySource::SendBoost,
                ActivityRecipientType::Email,
                "ada@example.com",
                "issuer",
                None,
                None,
            ))
            .await
            .unwrap();
        fx.service
            .initiate(
                uri,
                ContactIdentifier::new(ContactMethodType::Email, "ada@example.com"),
                "issuer".into(),
                origin.activity_id,
                None,
            )
            .await
            .unwrap()
    }

    fn challenge_of(body: &Value) -> String {
        body["verifiablePresentationRequest"]["challenge"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn empty_request_returns_a_presentation_request() {
        let fx = fixture();
        let ex = open_exchange(&fx).await;
        let body = fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, None)
            .await
            .unwrap();
        assert_eq!(
            body["verifiablePresentationRequest"]["query"][0]["type"],
            "DIDAuthentication"
        );
        assert_eq!(
            body["verifiablePresentationRequest"]["domain"],
            "network.example"
        );
    }

    #[tokio::test]
    async fn signed_presentation_completes_exactly_once() {
        let fx = fixture();
        let ex = open_exchange(&fx).await;
        let holder = KeyPair::generate();

        let req = fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, None)
            .await
            .unwrap();
        let vp =
            VerifiablePresentation::did_auth(&holder, challenge_of(&req), "network.example")
                .unwrap();

        let body = fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, Some(vp.clone()))
            .await
            .unwrap();
        assert_eq!(body["credential"]["name"], "membership");

        let err = fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, Some(vp))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let latest = fx.ledger.latest("issuer", &ex.activity_id).await.unwrap();
        assert_eq!(latest.event_type, ActivityEventType::Claimed);
    }

    #[tokio::test]
    async fn bad_challenge_leaves_the_exchange_claimable() {
        let fx = fixture();
        let ex = open_exchange(&fx).await;
        let holder = KeyPair::generate();

        let stale =
            VerifiablePresentation::did_auth(&holder, "not-the-challenge", "network.example")
                .unwrap();
        let err = fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, Some(stale))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        // The exchange survives and the real challenge still works.
        let req = fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, None)
            .await
            .unwrap();
        let vp =
            VerifiablePresentation::did_auth(&holder, challenge_of(&req), "network.example")
                .unwrap();
        assert!(fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, Some(vp))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn known_holders_receive_into_their_incoming_queue() {
        let fx = fixture();
        let ex = open_exchange(&fx).await;
        let holder = KeyPair::generate();
        fx.store
            .insert_profile(Profile {
                profile_id: "ada".into(),
                did: holder.did.clone(),
                display_name: "Ada".into(),
                role: ProfileRole::Member,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let req = fx
            .service
            .participate(&ex.workflow_id, &ex.exchange_id, None)
            .await
            .unwrap();
        let vp =
            VerifiablePresentation::did_auth(&holder, challenge_of(&req), "network.example")
                .unwrap();
        fx.service
            .participate(&ex.workflow_id, &ex.exchange_id, Some(vp))
            .await
            .unwrap();

        let incoming = fx.store.incoming_of("ada").await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_profile_id, "issuer");
    }

    #[tokio::test]
    async fn unknown_exchanges_are_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.service.participate("no-wf", "no-ex", None).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
