//! The unified send pipeline.
//!
//! One entry point covers both delivery shapes: a recipient that
//! resolves to a profile gets the signed credential pushed straight
//! into their incoming queue, while an email address or phone number
//! gets an inbox issuance plus a claim exchange reachable through a
//! claim URL. Every call opens a fresh activity transaction, even for
//! identical recipient and template.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::authority::SigningAuthorityRegistry;
use crate::delivery::DeliveryChannel;
use crate::error::ApiError;
use crate::exchange::ClaimExchangeService;
use crate::graph::IdentityGraph;
use crate::inbox::InboxService;
use crate::ledger::ActivityLedger;
use crate::metrics::{operations, record_operation, status};
use crate::store::{CredentialStore, IncomingCredential};
use crate::templating;
use ocn_identity::VerifiableCredential;
use ocn_types::{
    Activity, ActivityEventType, ActivityMetadata, ActivityRecipientType, ActivitySource,
    ContactIdentifier, ContactMethodType, Profile,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// Profile slug, DID, email address, or phone number.
    pub recipient: String,
    /// URI of a previously uploaded template.
    pub template_uri: Option<String>,
    /// Inline template; persisted before use.
    pub template: Option<Value>,
    pub template_data: Option<HashMap<String, Value>>,
    /// Return the claim URL instead of dispatching it.
    #[serde(default)]
    pub suppress_delivery: bool,
    pub integration_id: Option<String>,
    /// Which surface initiated the send; defaults to a boost send.
    pub source: Option<ActivitySource>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    /// The template the send was rendered from.
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_uri: Option<String>,
    pub activity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_url: Option<String>,
}

enum Recipient {
    InNetwork(Profile),
    OutOfNetwork(ContactIdentifier),
}

pub struct ExchangeOrchestrator {
    graph: Arc<IdentityGraph>,
    credentials: Arc<dyn CredentialStore>,
    registry: Arc<SigningAuthorityRegistry>,
    exchanges: Arc<ClaimExchangeService>,
    inbox: Arc<InboxService>,
    ledger: Arc<ActivityLedger>,
    delivery: Arc<dyn DeliveryChannel>,
    claim_ttl: Duration,
}

impl ExchangeOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: Arc<IdentityGraph>,
        credentials: Arc<dyn CredentialStore>,
        registry: Arc<SigningAuthorityRegistry>,
        exchanges: Arc<ClaimExchangeService>,
        inbox: Arc<InboxService>,
        ledger: Arc<ActivityLedger>,
        delivery: Arc<dyn DeliveryChannel>,
        claim_ttl: Duration,
    ) -> Self {
        Self {
            graph,
            credentials,
            registry,
            exchanges,
            inbox,
            ledger,
            delivery,
            claim_ttl,
        }
    }

    pub async fn send(&self, issuer: &Profile, req: SendRequest) -> Result<SendOutcome, ApiError> {
        let recipient = self.resolve_recipient(&req.recipient).await?;
        let (template_uri, template) = self.fetch_template(&req).await?;
        let data = req.template_data.clone().unwrap_or_default();
        let rendered = templating::render(&template, &data)?;

        let outcome = match recipient {
            Recipient::InNetwork(profile) => {
                self.send_in_network(issuer, &profile, template_uri, rendered, &req)
                    .await
            }
            Recipient::OutOfNetwork(identifier) => {
                self.send_out_of_network(issuer, identifier, template_uri, rendered, &req)
                    .await
            }
        };
        match &outcome {
            Ok(_) => record_operation(operations::SEND, status::SUCCESS),
            Err(_) => record_operation(operations::SEND, status::ERROR),
        }
        outcome
    }

    /// A recipient that resolves to a profile routes in-network;
    /// anything shaped like an email address or phone number routes out.
    async fn resolve_recipient(&self, recipient: &str) -> Result<Recipient, ApiError> {
        if let Some(profile) = self.graph.find_profile(recipient).await? {
            return Ok(Recipient::InNetwork(profile));
        }
        match ContactIdentifier::detect(recipient) {
            Some(identifier) => Ok(Recipient::OutOfNetwork(identifier)),
            None => Err(ApiError::NotFound(format!(
                "unresolvable recipient: {}",
                recipient
            ))),
        }
    }

    /// The template to render, persisted first when supplied inline.
    async fn fetch_template(&self, req: &SendRequest) -> Result<(String, Value), ApiError> {
        match (&req.template_uri, &req.template) {
            (Some(uri), _) => {
                let template = self
                    .credentials
                    .get(uri)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("template: {}", uri)))?;
                Ok((uri.clone(), template))
            }
            (None, Some(inline)) => {
                let uri = self.credentials.upload("boost", inline.clone()).await?;
                Ok((uri, inline.clone()))
            }
            (None, None) => Err(ApiError::BadRequest(
                "either template or templateUri is required".into(),
            )),
        }
    }

    async fn send_in_network(
        &self,
        issuer: &Profile,
        recipient: &Profile,
        template_uri: String,
        rendered: Value,
        req: &SendRequest,
    ) -> Result<SendOutcome, ApiError> {
        let signed = match self.issue(issuer, rendered).await {
            Ok(signed) => signed,
            Err(e) => {
                self.audit_failure(issuer, recipient_of_profile(recipient), &template_uri, req, &e)
                    .await?;
                return Err(e);
            }
        };
        let credential_uri = self.credentials.upload("credential", signed).await?;

        // The recipient already has network presence, so the origin
        // event is DELIVERED.
        let origin = self
            .ledger
            .record(Activity::origin(
                ActivityEventType::Delivered,
                req.source.unwrap_or(ActivitySource::SendBoost),
                ActivityRecipientType::Profile,
                recipient.profile_id.clone(),
                issuer.profile_id.clone(),
                Some(template_uri.clone()),
                req.integration_id.clone(),
            ))
            .await?;

        self.credentials
            .enqueue_incoming(
                &recipient.profile_id,
                IncomingCredential {
                    uri: credential_uri.clone(),
                    from_profile_id: issuer.profile_id.clone(),
                    activity_id: Some(origin.activity_id.clone()),
                    sent_at: Utc::now(),
                },
            )
            .await?;

        Ok(SendOutcome {
            uri: template_uri,
            credential_uri: Some(credential_uri),
            activity_id: origin.activity_id,
            claim_url: None,
        })
    }

    async fn send_out_of_network(
        &self,
        issuer: &Profile,
        identifier: ContactIdentifier,
        template_uri: String,
        rendered: Value,
        req: &SendRequest,
    ) -> Result<SendOutcome, ApiError> {
        // Existence precedes any proof of delivery: the CREATED row is
        // written before issuance so a failure still leaves an audit
        // trail.
        let origin = self
            .ledger
            .record(Activity::origin(
                ActivityEventType::Created,
                req.source.unwrap_or(ActivitySource::SendBoost),
                recipient_type_of(&identifier),
                identifier.value.clone(),
                issuer.profile_id.clone(),
                Some(template_uri.clone()),
                req.integration_id.clone(),
            ))
            .await?;

        let signed = match self.issue(issuer, rendered).await {
            Ok(signed) => signed,
            Err(e) => {
                self.ledger
                    .chain(
                        &origin.activity_id,
                        ActivityEventType::Failed,
                        Some(ActivityMetadata::FailureReason {
                            reason: e.to_string(),
                        }),
                    )
                    .await?;
                return Err(e);
            }
        };
        let credential_uri = self.credentials.upload("credential", signed).await?;

        let exchange = self
            .exchanges
            .initiate(
                credential_uri.clone(),
                identifier.clone(),
                issuer.profile_id.clone(),
                origin.activity_id.clone(),
                None,
            )
            .await?;
        let claim_url = self.exchanges.claim_url(&exchange);
        let issuance = self
            .inbox
            .create_issuance(
                identifier.clone(),
                credential_uri.clone(),
                Some(claim_url.clone()),
                Utc::now() + self.claim_ttl,
                issuer.profile_id.clone(),
                origin.activity_id.clone(),
            )
            .await?;
        self.exchanges.link_issuance(&exchange, &issuance.id).await?;

        if req.suppress_delivery {
            return Ok(SendOutcome {
                uri: template_uri,
                credential_uri: Some(credential_uri),
                activity_id: origin.activity_id,
                claim_url: Some(claim_url),
            });
        }

        self.delivery
            .send_claim_link(&identifier, &claim_url)
            .await
            .map_err(|e| ApiError::InternalServerError(e.to_string()))?;
        self.ledger
            .chain(&origin.activity_id, ActivityEventType::Delivered, None)
            .await?;

        Ok(SendOutcome {
            uri: template_uri,
            credential_uri: Some(credential_uri),
            activity_id: origin.activity_id,
            claim_url: Some(claim_url),
        })
    }

    /// Shape the rendered template into an unsigned credential. The
    /// template is the credential body: its subject, extra types, and
    /// context entries carry over rather than nesting under the subject.
    /// A template without a `credentialSubject` key is taken to be the
    /// subject itself.
    async fn issue(&self, issuer: &Profile, rendered: Value) -> Result<Value, ApiError> {
        let subject = match rendered.get("credentialSubject") {
            Some(subject) => subject.clone(),
            None => rendered.clone(),
        };
        let mut vc =
            VerifiableCredential::new(issuer.did.clone(), template_types(&rendered), subject);
        if let Some(contexts) = rendered.get("@context").and_then(Value::as_array) {
            for ctx in contexts.iter().filter_map(Value::as_str) {
                if !vc.context.iter().any(|c| c == ctx) {
                    vc.context.push(ctx.to_string());
                }
            }
        }
        self.registry.issue(&issuer.did, vc).await
    }

    /// Failed in-network sends get the same CREATED → FAILED audit pair
    /// as out-of-network ones, written after the fact.
    async fn audit_failure(
        &self,
        issuer: &Profile,
        (recipient_type, recipient_identifier): (ActivityRecipientType, String),
        template_uri: &str,
        req: &SendRequest,
        error: &ApiError,
    ) -> Result<(), ApiError> {
        let origin = self
            .ledger
            .record(Activity::origin(
                ActivityEventType::Created,
                req.source.unwrap_or(ActivitySource::SendBoost),
                recipient_type,
                recipient_identifier,
                issuer.profile_id.clone(),
                Some(template_uri.to_string()),
                req.integration_id.clone(),
            ))
            .await?;
        self.ledger
            .chain(
                &origin.activity_id,
                ActivityEventType::Failed,
                Some(ActivityMetadata::FailureReason {
                    reason: error.to_string(),
                }),
            )
            .await?;
        Ok(())
    }
}

fn recipient_of_profile(profile: &Profile) -> (ActivityRecipientType, String) {
    (ActivityRecipientType::Profile, profile.profile_id.clone())
}

fn recipient_type_of(identifier: &ContactIdentifier) -> ActivityRecipientType {
    match identifier.method_type {
        ContactMethodType::Email => ActivityRecipientType::Email,
        ContactMethodType::Phone => ActivityRecipientType::Phone,
    }
}

// Extra credential types named by the template; the base type is always
// prepended at construction.
fn template_types(rendered: &Value) -> Vec<String> {
    let mut types: Vec<String> = match rendered.get("type") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    };
    types.retain(|t| t != "VerifiableCredential");
    if types.is_empty() {
        types.push("BoostCredential".to_string());
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::LocalAuthoritySigner;
    use crate::delivery::CaptureDelivery;
    use crate::store::{InMemoryStore, ProfileStore};
    use ocn_identity::KeyPair;
    use ocn_types::{ActivityQuery, ProfileRole};
    use serde_json::json;

    struct Fixture {
        orchestrator: ExchangeOrchestrator,
        exchanges: Arc<ClaimExchangeService>,
        ledger: Arc<ActivityLedger>,
        delivery: Arc<CaptureDelivery>,
        store: Arc<InMemoryStore>,
        issuer: Profile,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let delivery = Arc::new(CaptureDelivery::new());
        let graph = Arc::new(IdentityGraph::new(store.clone()));
        let ledger = Arc::new(ActivityLedger::new(store.clone()));
        let inbox = Arc::new(InboxService::new(
            store.clone(),
            store.clone(),
            ledger.clone(),
        ));
        let exchanges = Arc::new(ClaimExchangeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            inbox.clone(),
            ledger.clone(),
            "network.example".into(),
            Duration::days(30),
        ));

        let signer = Arc::new(LocalAuthoritySigner::new());
        let sa = KeyPair::generate();
        signer.register_keypair(sa.clone());
        let registry = Arc::new(SigningAuthorityRegistry::new(store.clone(), signer));

        let issuer_kp = KeyPair::generate();
        let issuer = graph
            .register_profile(&issuer_kp.did, "issuer", "Issuer", ProfileRole::Member)
            .await
            .unwrap();
        registry
            .register(
                &issuer.did,
                "main",
                "https://sa.example.com".parse().unwrap(),
                sa.did.clone(),
                None,
            )
            .await
            .unwrap();

        let orchestrator = ExchangeOrchestrator::new(
            graph,
            store.clone(),
            registry,
            exchanges.clone(),
            inbox,
            ledger.clone(),
            delivery.clone(),
            Duration::days(30),
        );
        Fixture {
            orchestrator,
            exchanges,
            ledger,
            delivery,
            store,
            issuer,
        }
    }

    fn request(recipient: &str, template: Value) -> SendRequest {
        SendRequest {
            recipient: recipient.into(),
            template_uri: None,
            template: Some(template),
            template_data: None,
            suppress_delivery: false,
            integration_id: None,
            source: None,
        }
    }

    #[tokio::test]
    async fn in_network_sends_deliver_straight_to_the_queue() {
        let fx = fixture().await;
        let bob_kp = KeyPair::generate();
        fx.store
            .insert_profile(Profile {
                profile_id: "bob".into(),
                did: bob_kp.did,
                display_name: "Bob".into(),
                role: ProfileRole::Member,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let outcome = fx
            .orchestrator
            .send(&fx.issuer, request("bob", json!({"name": "welcome"})))
            .await
            .unwrap();

        assert!(outcome.claim_url.is_none());
        let incoming = fx.store.incoming_of("bob").await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].uri, outcome.credential_uri.unwrap());

        let latest = fx
            .ledger
            .latest("issuer", &outcome.activity_id)
            .await
            .unwrap();
        assert_eq!(latest.event_type, ActivityEventType::Delivered);
    }

    #[tokio::test]
    async fn out_of_network_sends_open_a_claimable_exchange() {
        let fx = fixture().await;
        let outcome = fx
            .orchestrator
            .send(
                &fx.issuer,
                request("ada@example.com", json!({"name": "hello {{who}}"})),
            )
            .await
            .unwrap();

        let claim_url = outcome.claim_url.unwrap();
        assert_eq!(fx.delivery.last_claim_link().unwrap(), claim_url);

        // workflow/exchange ids fall out of the URL shape.
        let mut parts = claim_url.rsplit('/');
        let exchange_id = parts.next().unwrap();
        parts.next();
        let workflow_id = parts.next().unwrap();
        let body = fx
            .exchanges
            .participate(workflow_id, exchange_id, None)
            .await
            .unwrap();
        assert!(body["verifiablePresentationRequest"]["challenge"].is_string());

        // CREATED origin, then DELIVERED after dispatch.
        let latest = fx
            .ledger
            .latest("issuer", &outcome.activity_id)
            .await
            .unwrap();
        assert_eq!(latest.event_type, ActivityEventType::Delivered);
    }

    #[tokio::test]
    async fn suppressed_delivery_returns_the_url_without_dispatch() {
        let fx = fixture().await;
        let mut req = request("ada@example.com", json!({"name": "x"}));
        req.suppress_delivery = true;

        let outcome = fx.orchestrator.send(&fx.issuer, req).await.unwrap();
        assert!(outcome.claim_url.is_some());
        assert!(fx.delivery.last_claim_link().is_none());

        let latest = fx
            .ledger
            .latest("issuer", &outcome.activity_id)
            .await
            .unwrap();
        assert_eq!(latest.event_type, ActivityEventType::Created);
    }

    #[tokio::test]
    async fn template_data_fills_placeholders() {
        let fx = fixture().await;
        let mut req = request("ada@example.com", json!({"name": "hi {{who}}"}));
        req.template_data = Some([("who".to_string(), json!("Ada"))].into());
        req.suppress_delivery = true;

        let outcome = fx.orchestrator.send(&fx.issuer, req).await.unwrap();
        let credential = fx
            .store
            .get(&outcome.credential_uri.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credential["credentialSubject"]["name"], "hi Ada");
    }

    #[tokio::test]
    async fn templates_with_subjects_issue_flat_credentials() {
        let fx = fixture().await;
        let mut req = request(
            "ada@example.com",
            json!({
                "type": ["VerifiableCredential", "AchievementCredential"],
                "credentialSubject": { "name": "{{name}}" }
            }),
        );
        req.template_data = Some([("name".to_string(), json!("Ada"))].into());
        req.suppress_delivery = true;

        let outcome = fx.orchestrator.send(&fx.issuer, req).await.unwrap();
        let credential = fx
            .store
            .get(&outcome.credential_uri.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credential["credentialSubject"]["name"], "Ada");
        assert!(credential["credentialSubject"]
            .get("credentialSubject")
            .is_none());
        let types = credential["type"].as_array().unwrap();
        assert!(types.iter().any(|t| t == "VerifiableCredential"));
        assert!(types.iter().any(|t| t == "AchievementCredential"));
    }

    #[tokio::test]
    async fn issuance_failure_is_recorded_then_reraised() {
        let fx = fixture().await;
        // A second profile with no signing authority at all.
        let orphan_kp = KeyPair::generate();
        let orphan = Profile {
            profile_id: "orphan".into(),
            did: orphan_kp.did,
            display_name: "Orphan".into(),
            role: ProfileRole::Member,
            created_at: Utc::now(),
        };
        fx.store.insert_profile(orphan.clone()).await.unwrap();

        let err = fx
            .orchestrator
            .send(&orphan, request("ada@example.com", json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let page = fx
            .ledger
            .list("orphan", &ActivityQuery::default())
            .await
            .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].event_type, ActivityEventType::Failed);
        assert_eq!(page.records[1].event_type, ActivityEventType::Created);
        assert_eq!(page.records[0].activity_id, page.records[1].activity_id);
    }

    #[tokio::test]
    async fn repeat_sends_never_coalesce() {
        let fx = fixture().await;
        let mut req = request("ada@example.com", json!({"name": "x"}));
        req.suppress_delivery = true;

        let a = fx.orchestrator.send(&fx.issuer, req.clone()).await.unwrap();
        let b = fx.orchestrator.send(&fx.issuer, req).await.unwrap();
        assert_ne!(a.activity_id, b.activity_id);
        assert_ne!(a.claim_url, b.claim_url);
    }

    #[tokio::test]
    async fn unresolvable_recipients_are_not_found() {
        let fx = fixture().await;
        assert!(matches!(
            fx.orchestrator
                .send(&fx.issuer, request("definitely not a recipient", json!({})))
                .await,
            Err(ApiError::NotFound(_))
        ));
    }
}
