//! Contact-method verification.
//!
//! Two independent paths establish ownership of an email address or
//! phone number: a delivered one-time code, and a signed proof-of-login
//! presentation from a trusted provider. Both converge on the same
//! store primitive, so at most one verified profile owns a given
//! (type, value) pair at any moment.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

use crate::delivery::DeliveryChannel;
use crate::error::ApiError;
use crate::inbox::InboxService;
use crate::metrics::{operations, record_operation, status};
use crate::store::{ContactStore, OtpChallenge};
use ocn_identity::{Did, KeyPair, TrustPolicy, VerifiablePresentation};
use ocn_types::{ContactIdentifier, ContactMethod, ContactMethodType};

const SESSION_CHALLENGE_PREFIX: &str = "contact_method_session";
const LOGIN_CHALLENGE_PREFIX: &str = "proof-of-login";

/// A short-lived DID-auth presentation minted from a validated OTP,
/// usable by downstream claim flows without re-running the code.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactMethodSession {
    pub presentation: Value,
    pub expires_at: DateTime<Utc>,
}

pub struct ContactVerifier {
    contacts: Arc<dyn ContactStore>,
    inbox: Arc<InboxService>,
    /// Trusted proof-of-login providers.
    login_trust: Arc<dyn TrustPolicy>,
    /// Vetted phone issuers; gates phone adds and challenges.
    phone_trust: Arc<dyn TrustPolicy>,
    delivery: Arc<dyn DeliveryChannel>,
    service_key: Arc<KeyPair>,
    domain: String,
    otp_ttl: Duration,
    otp_max_attempts: u32,
    session_ttl: Duration,
    /// Publishable key of each integration, mapped to its DID.
    integration_keys: HashMap<String, Did>,
}

impl ContactVerifier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        inbox: Arc<InboxService>,
        login_trust: Arc<dyn TrustPolicy>,
        phone_trust: Arc<dyn TrustPolicy>,
        delivery: Arc<dyn DeliveryChannel>,
        service_key: Arc<KeyPair>,
        domain: String,
        otp_ttl: Duration,
        otp_max_attempts: u32,
        session_ttl: Duration,
        integration_keys: HashMap<String, Did>,
    ) -> Self {
        Self {
            contacts,
            inbox,
            login_trust,
            phone_trust,
            delivery,
            service_key,
            domain,
            otp_ttl,
            otp_max_attempts,
            session_ttl,
            integration_keys,
        }
    }

    pub async fn list(&self, profile_id: &str) -> Result<Vec<ContactMethod>, ApiError> {
        Ok(self.contacts.contacts_of(profile_id).await?)
    }

    /// Add an unverified contact method. Phone numbers are reserved for
    /// callers on the phone-issuer registry; the gate is value-independent
    /// and applied before anything is persisted.
    pub async fn add(
        &self,
        caller: &Did,
        profile_id: &str,
        identifier: &ContactIdentifier,
    ) -> Result<ContactMethod, ApiError> {
        if identifier.method_type == ContactMethodType::Phone
            && !self.phone_trust.is_trusted_holder(caller)
        {
            return Err(ApiError::Forbidden(
                "phone contact methods require a registered phone issuer".into(),
            ));
        }
        Ok(self.contacts.add_contact(profile_id, identifier).await?)
    }

    /// Mint and dispatch a one-time code. This is an open route, gated
    /// by an integration publishable key instead of a bearer token; any
    /// previous code for the same identifier is replaced. Phone codes
    /// additionally require the integration's DID to be on the
    /// phone-issuer registry.
    pub async fn send_challenge(
        &self,
        identifier: &ContactIdentifier,
        publishable_key: &str,
    ) -> Result<String, ApiError> {
        let integration = self
            .integration_keys
            .get(publishable_key)
            .ok_or_else(|| ApiError::Unauthorized("unknown publishable key".into()))?;
        if identifier.method_type == ContactMethodType::Phone
            && !self.phone_trust.is_trusted_holder(integration)
        {
            return Err(ApiError::Forbidden(
                "phone challenges require a registered phone issuer".into(),
            ));
        }

        let code = format!("{}", OsRng.gen_range(100_000..=999_999));
        let token = Uuid::new_v4().to_string();
        self.contacts
            .put_challenge(OtpChallenge {
                token: token.clone(),
                identifier: identifier.clone(),
                code: code.clone(),
                attempts: 0,
                expires_at: Utc::now() + self.otp_ttl,
                created_at: Utc::now(),
            })
            .await?;
        self.delivery
            .send_otp(identifier, &code)
            .await
            .map_err(|e| ApiError::InternalServerError(e.to_string()))?;
        tracing::info!(method_type = %identifier.method_type, "otp challenge dispatched");
        Ok(token)
    }

    /// Validate an OTP and take exclusive verified ownership of the
    /// contact method for `profile_id`.
    pub async fn verify(
        &self,
        profile_id: &str,
        token: &str,
        code: &str,
    ) -> Result<ContactMethod, ApiError> {
        let challenge = self.checked_challenge(token, code).await.map_err(|e| {
            record_operation(operations::VERIFY_CONTACT, status::ERROR);
            e
        })?;

        let method = self
            .contacts
            .claim_exclusive(profile_id, &challenge.identifier)
            .await?;
        self.contacts.delete_challenge(token).await?;
        self.inbox
            .deliver_pending(profile_id, &challenge.identifier)
            .await?;

        record_operation(operations::VERIFY_CONTACT, status::SUCCESS);
        tracing::info!(profile_id, method_id = %method.id, "contact method verified");
        Ok(method)
    }

    /// Cryptographic verification path: a signed presentation from a
    /// trusted login provider whose challenge encodes the contact
    /// method. A bad signature or untrusted holder is a security
    /// failure; a malformed challenge is a caller bug.
    pub async fn verify_with_credential(
        &self,
        profile_id: &str,
        presentation: &VerifiablePresentation,
    ) -> Result<ContactMethod, ApiError> {
        presentation.verify().map_err(|_| {
            record_operation(operations::VERIFY_CONTACT, status::ERROR);
            ApiError::Unauthorized("presentation verification failed".into())
        })?;
        if !self.login_trust.is_trusted_holder(&presentation.holder) {
            record_operation(operations::VERIFY_CONTACT, status::ERROR);
            return Err(ApiError::Unauthorized(
                "presentation holder is not a trusted login provider".into(),
            ));
        }

        let challenge = presentation
            .challenge()
            .ok_or_else(|| ApiError::BadRequest("presentation carries no challenge".into()))?;
        let identifier = parse_login_challenge(challenge)?;

        let method = self.contacts.claim_exclusive(profile_id, &identifier).await?;
        self.inbox.deliver_pending(profile_id, &identifier).await?;

        record_operation(operations::VERIFY_CONTACT, status::SUCCESS);
        Ok(method)
    }

    /// Exchange a still-valid OTP for a session presentation signed by
    /// the service key, scoped to the contact method.
    pub async fn create_session(
        &self,
        token: &str,
        code: &str,
    ) -> Result<ContactMethodSession, ApiError> {
        let challenge = self.checked_challenge(token, code).await?;
        let identifier = &challenge.identifier;

        // The session names the verified method's id when one exists;
        // otherwise the challenge token stands in.
        let method_id = match self.contacts.verified_owner(identifier).await? {
            Some(owner) => self
                .contacts
                .contacts_of(&owner)
                .await?
                .into_iter()
                .find(|c| c.method_type == identifier.method_type && c.value == identifier.value)
                .map(|c| c.id),
            None => None,
        }
        .unwrap_or_else(|| challenge.token.clone());

        let session_challenge = format!(
            "{}:{}:{}:{}",
            SESSION_CHALLENGE_PREFIX, method_id, identifier.method_type, identifier.value
        );
        let vp = VerifiablePresentation::did_auth(
            &self.service_key,
            session_challenge,
            self.domain.clone(),
        )
        .map_err(|e| ApiError::InternalServerError(e.to_string()))?;

        Ok(ContactMethodSession {
            presentation: serde_json::to_value(&vp)?,
            expires_at: Utc::now() + self.session_ttl,
        })
    }

    /// Promote one of the profile's own methods to primary.
    pub async fn set_primary(&self, profile_id: &str, contact_id: &str) -> Result<(), ApiError> {
        self.owned_method(profile_id, contact_id).await?;
        self.contacts.set_primary(profile_id, contact_id).await?;
        Ok(())
    }

    pub async fn remove(&self, profile_id: &str, contact_id: &str) -> Result<(), ApiError> {
        self.owned_method(profile_id, contact_id).await?;
        self.contacts.remove_contact(profile_id, contact_id).await?;
        Ok(())
    }

    async fn owned_method(&self, profile_id: &str, contact_id: &str) -> Result<(), ApiError> {
        let (owner, _) = self
            .contacts
            .contact_by_id(contact_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("contact method: {}", contact_id)))?;
        if owner != profile_id {
            return Err(ApiError::Forbidden(
                "contact method belongs to another profile".into(),
            ));
        }
        Ok(())
    }

    /// Look up an OTP challenge and validate `code` against it,
    /// enforcing expiry and the attempt cap.
    async fn checked_challenge(&self, token: &str, code: &str) -> Result<OtpChallenge, ApiError> {
        let challenge = self
            .contacts
            .challenge_by_token(token)
            .await?
            .ok_or_else(|| ApiError::NotFound("unknown challenge token".into()))?;

        if Utc::now() > challenge.expires_at {
            self.contacts.delete_challenge(token).await?;
            return Err(ApiError::Unauthorized("challenge has expired".into()));
        }
        if challenge.attempts >= self.otp_max_attempts {
            self.contacts.delete_challenge(token).await?;
            return Err(ApiError::Unauthorized("too many attempts".into()));
        }
        if challenge.code != code {
            self.contacts.increment_attempts(token).await?;
            return Err(ApiError::Unauthorized("invalid code".into()));
        }
        Ok(challenge)
    }
}

/// Parse a `proof-of-login:<type>:<value>` challenge into a contact
/// identifier. Anything else is a malformed request, not a security
/// failure.
fn parse_login_challenge(challenge: &str) -> Result<ContactIdentifier, ApiError> {
    let rest = challenge
        .strip_prefix(LOGIN_CHALLENGE_PREFIX)
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(|| ApiError::BadRequest("malformed proof-of-login challenge".into()))?;

    let (kind, value) = rest
        .split_once(':')
        .ok_or_else(|| ApiError::BadRequest("malformed proof-of-login challenge".into()))?;
    let method_type = ContactMethodType::from_str(kind)
        .map_err(|_| ApiError::BadRequest(format!("unknown contact method type: {}", kind)))?;
    if value.is_empty() {
        return Err(ApiError::BadRequest("empty contact method value".into()));
    }
    Ok(ContactIdentifier::new(method_type, value))
}
