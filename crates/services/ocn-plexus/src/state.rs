//! Shared application state wiring.

use std::sync::Arc;

use chrono::Duration;

use crate::auth::JwtConfig;
use crate::authority::{LocalAuthoritySigner, SigningAuthorityRegistry};
use crate::config::ServiceConfig;
use crate::contact::ContactVerifier;
use crate::delivery::{DeliveryChannel, TracingDelivery};
use crate::error::ApiError;
use crate::exchange::ClaimExchangeService;
use crate::graph::IdentityGraph;
use crate::inbox::InboxService;
use crate::invites::InviteService;
use crate::ledger::ActivityLedger;
use crate::resolver::DidResolver;
use crate::send::ExchangeOrchestrator;
use crate::store::{CredentialStore, InMemoryStore};
use ocn_identity::{AllowListTrustPolicy, Did, KeyPair};
use ocn_types::Profile;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub jwt: Arc<JwtConfig>,
    pub service_key: Arc<KeyPair>,
    pub graph: Arc<IdentityGraph>,
    pub resolver: Arc<DidResolver>,
    pub registry: Arc<SigningAuthorityRegistry>,
    pub signer: Arc<LocalAuthoritySigner>,
    pub verifier: Arc<ContactVerifier>,
    pub orchestrator: Arc<ExchangeOrchestrator>,
    pub exchanges: Arc<ClaimExchangeService>,
    pub ledger: Arc<ActivityLedger>,
    pub invites: Arc<InviteService>,
    pub inbox: Arc<InboxService>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl AppState {
    /// Fully wired state over the in-memory store with log-only
    /// delivery.
    pub fn in_memory(config: ServiceConfig) -> anyhow::Result<Self> {
        Self::with_delivery(config, Arc::new(TracingDelivery))
    }

    /// Same wiring with a caller-supplied delivery channel; tests use
    /// this to capture codes and claim links.
    pub fn with_delivery(
        config: ServiceConfig,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> anyhow::Result<Self> {
        let service_key = Arc::new(match &config.signing_seed {
            Some(seed) => KeyPair::from_seed_hex(seed)?,
            None => KeyPair::generate(),
        });

        let mut validation = jsonwebtoken::Validation::default();
        validation.set_required_spec_claims(&["sub", "exp"]);
        if let Some(issuer) = &config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }
        let jwt = Arc::new(JwtConfig {
            secret_key: config.jwt_secret.clone(),
            issuer: config.jwt_issuer.clone(),
            validation,
        });

        let store = Arc::new(InMemoryStore::new());

        let graph = Arc::new(IdentityGraph::new(store.clone()));
        let resolver = Arc::new(DidResolver::new(
            store.clone(),
            store.clone(),
            graph.clone(),
            service_key.clone(),
            config.domain.clone(),
        ));

        let signer = Arc::new(LocalAuthoritySigner::new());
        let registry = Arc::new(SigningAuthorityRegistry::new(store.clone(), signer.clone()));

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
            config.domain.clone(),
            Duration::seconds(config.claim_ttl_secs),
        ));

        let verifier = Arc::new(ContactVerifier::new(
            store.clone(),
            inbox.clone(),
            Arc::new(AllowListTrustPolicy::with_dids(
                config.trusted_login_providers.iter().cloned(),
            )),
            Arc::new(AllowListTrustPolicy::with_dids(
                config.phone_registry.iter().cloned(),
            )),
            delivery.clone(),
            service_key.clone(),
            config.domain.clone(),
            Duration::seconds(config.otp_ttl_secs),
            config.otp_max_attempts,
            Duration::seconds(config.session_ttl_secs),
            config.integration_keys.clone(),
        ));

        let orchestrator = Arc::new(ExchangeOrchestrator::new(
            graph.clone(),
            store.clone(),
            registry.clone(),
            exchanges.clone(),
            inbox.clone(),
            ledger.clone(),
            delivery,
            Duration::seconds(config.claim_ttl_secs),
        ));

        let invites = Arc::new(InviteService::new(store.clone(), store.clone()));

        Ok(Self {
            config: Arc::new(config),
            jwt,
            service_key,
            graph,
            resolver,
            registry,
            signer,
            verifier,
            orchestrator,
            exchanges,
            ledger,
            invites,
            inbox,
            credentials: store,
        })
    }

    /// The profile behind an authenticated caller's DID.
    pub async fn require_profile(&self, did: &Did) -> Result<Profile, ApiError> {
        self.graph.profile_by_did(did).await
    }
}
