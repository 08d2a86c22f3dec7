//! Signing-authority registry and issuance.
//!
//! Profiles delegate credential signing to named authorities. The first
//! registration becomes the profile's primary authority; issuance always
//! routes through the primary and fails hard when none exists, so a
//! credential is never silently signed by the wrong key.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;
use crate::metrics::{operations, record_operation, status};
use crate::store::AuthorityStore;
use ocn_identity::{Did, KeyPair, VerifiableCredential};
use ocn_types::{
    validate_app_slug, validate_authority_name, RegisteredSigningAuthority,
    SigningAuthorityEndpoint, SigningAuthorityRelationship,
};

#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("no signing authority registered for issuer")]
    NoAuthority,

    #[error("no signing key available for authority {0}")]
    NoKey(Did),

    #[error("issuance failed: {0}")]
    Issuance(String),
}

impl From<AuthorityError> for ApiError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::NoAuthority => ApiError::BadRequest(err.to_string()),
            AuthorityError::NoKey(_) => ApiError::InternalServerError(err.to_string()),
            AuthorityError::Issuance(msg) => ApiError::InternalServerError(msg),
        }
    }
}

/// Signs credentials on behalf of a registered authority.
#[async_trait]
pub trait AuthoritySigner: Send + Sync {
    async fn issue(
        &self,
        authority: &RegisteredSigningAuthority,
        credential: VerifiableCredential<Value>,
    ) -> Result<Value, AuthorityError>;
}

/// In-process signer holding the keypairs of locally hosted authorities.
/// Remote authorities (endpoint-only registrations) are out of its reach
/// and fail issuance with `NoKey`.
pub struct LocalAuthoritySigner {
    keys: RwLock<HashMap<Did, KeyPair>>,
}

impl LocalAuthoritySigner {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_keypair(&self, kp: KeyPair) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(kp.did.clone(), kp);
        }
    }
}

impl Default for LocalAuthoritySigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthoritySigner for LocalAuthoritySigner {
    async fn issue(
        &self,
        authority: &RegisteredSigningAuthority,
        credential: VerifiableCredential<Value>,
    ) -> Result<Value, AuthorityError> {
        let kp = {
            let keys = self
                .keys
                .read()
                .map_err(|_| AuthorityError::Issuance("signer lock poisoned".into()))?;
            keys.get(&authority.relationship.did)
                .cloned()
                .ok_or_else(|| AuthorityError::NoKey(authority.relationship.did.clone()))?
        };
        let signed = credential
            .sign(&kp)
            .map_err(|e| AuthorityError::Issuance(e.to_string()))?;
        serde_json::to_value(&signed).map_err(|e| AuthorityError::Issuance(e.to_string()))
    }
}

/// Per-profile registry of signing authorities.
pub struct SigningAuthorityRegistry {
    store: Arc<dyn AuthorityStore>,
    signer: Arc<dyn AuthoritySigner>,
}

impl SigningAuthorityRegistry {
    pub fn new(store: Arc<dyn AuthorityStore>, signer: Arc<dyn AuthoritySigner>) -> Self {
        Self { store, signer }
    }

    /// Register (or replace) a named authority for `owner`. `owner_did`
    /// may carry a `did:web` application form, whose slug segment is
    /// validated like any other slug.
    pub async fn register(
        &self,
        owner: &Did,
        name: &str,
        endpoint: url::Url,
        authority_did: Did,
        owner_did: Option<Did>,
    ) -> Result<RegisteredSigningAuthority, ApiError> {
        validate_authority_name(name)?;
        if let Some(ref od) = owner_did {
            validate_app_owner_did(od)?;
        }

        // First registration for a profile becomes its primary.
        let is_primary = self.store.authorities_of(owner).await?.is_empty();
        let registered = RegisteredSigningAuthority {
            signing_authority: SigningAuthorityEndpoint { endpoint },
            relationship: SigningAuthorityRelationship {
                name: name.to_string(),
                did: authority_did,
                owner_did,
                is_primary,
            },
        };
        self.store.upsert_authority(owner, registered.clone()).await?;
        tracing::info!(owner = %owner, name, is_primary, "registered signing authority");
        Ok(registered)
    }

    pub async fn list(&self, owner: &Did) -> Result<Vec<RegisteredSigningAuthority>, ApiError> {
        Ok(self.store.authorities_of(owner).await?)
    }

    pub async fn set_primary(&self, owner: &Did, name: &str) -> Result<(), ApiError> {
        self.store
            .authority_named(owner, name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("signing authority: {}", name)))?;
        self.store.set_primary(owner, name).await?;
        Ok(())
    }

    /// Sign `credential` with the owner's primary authority.
    pub async fn issue(
        &self,
        owner: &Did,
        credential: VerifiableCredential<Value>,
    ) -> Result<Value, ApiError> {
        let primary = self
            .store
            .primary_authority(owner)
            .await?
            .ok_or(AuthorityError::NoAuthority)?;
        match self.signer.issue(&primary, credential).await {
            Ok(signed) => {
                record_operation(operations::ISSUE, status::SUCCESS);
                Ok(signed)
            }
            Err(e) => {
                record_operation(operations::ISSUE, status::ERROR);
                Err(e.into())
            }
        }
    }
}

/// An application owner DID must be a `did:key` or a `did:web` whose
/// trailing `app:<slug>` segment carries a valid slug.
fn validate_app_owner_did(did: &Did) -> Result<(), ApiError> {
    if did.method() != Some("web") {
        return Ok(());
    }
    let mut segments = did.as_str().splitn(3, ':').nth(2).unwrap_or("").split(':');
    // Skip the domain.
    segments.next();
    let rest: Vec<&str> = segments.collect();
    if let ["app", slug] = rest.as_slice() {
        validate_app_slug(slug)
            .map_err(|e| ApiError::BadRequest(format!("invalid owner did slug: {}", e.0)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn registry() -> (SigningAuthorityRegistry, Arc<LocalAuthoritySigner>) {
        let signer = Arc::new(LocalAuthoritySigner::new());
        let registry =
            SigningAuthorityRegistry::new(Arc::new(InMemoryStore::new()), signer.clone());
        (registry, signer)
    }

    #[tokio::test]
    async fn first_registration_becomes_primary() {
        let (registry, _) = registry();
        let owner = KeyPair::generate();
        let (sa1, sa2) = (KeyPair::generate(), KeyPair::generate());

        let first = registry
            .register(
                &owner.did,
                "main",
                "https://sa.example.com".parse().unwrap(),
                sa1.did.clone(),
                None,
            )
            .await
            .unwrap();
        let second = registry
            .register(
                &owner.did,
                "backup",
                "https://sa2.example.com".parse().unwrap(),
                sa2.did.clone(),
                None,
            )
            .await
            .unwrap();

        assert!(first.relationship.is_primary);
        assert!(!second.relationship.is_primary);
    }

    #[tokio::test]
    async fn names_over_fifteen_characters_are_rejected() {
        let (registry, _) = registry();
        let owner = KeyPair::generate();
        let err = registry
            .register(
                &owner.did,
                "this-name-is-way-too-long",
                "https://sa.example.com".parse().unwrap(),
                KeyPair::generate().did,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn issuance_uses_the_primary_authority_key() {
        let (registry, signer) = registry();
        let owner = KeyPair::generate();
        let sa = KeyPair::generate();
        signer.register_keypair(sa.clone());
        registry
            .register(
                &owner.did,
                "main",
                "https://sa.example.com".parse().unwrap(),
                sa.did.clone(),
                None,
            )
            .await
            .unwrap();

        let vc = VerifiableCredential::new(
            sa.did.clone(),
            vec!["MembershipCredential".into()],
            serde_json::json!({"id": owner.did.as_str()}),
        );
        let signed = registry.issue(&owner.did, vc).await.unwrap();
        assert_eq!(signed["proof"]["proofPurpose"], "assertionMethod");
    }

    #[tokio::test]
    async fn issuance_without_an_authority_fails_hard() {
        let (registry, _) = registry();
        let owner = KeyPair::generate();
        let vc = VerifiableCredential::new(
            owner.did.clone(),
            vec!["MembershipCredential".into()],
            serde_json::json!({}),
        );
        assert!(matches!(
            registry.issue(&owner.did, vc).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn app_owner_dids_with_bad_slugs_are_rejected() {
        let (registry, _) = registry();
        let owner = KeyPair::generate();
        let bad = Did::from_trusted("did:web:network.example:app:Bad_Slug");
        let err = registry
            .register(
                &owner.did,
                "main",
                "https://sa.example.com".parse().unwrap(),
                KeyPair::generate().did,
                Some(bad),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn set_primary_requires_an_existing_name() {
        let (registry, _) = registry();
        let owner = KeyPair::generate().did;
        assert!(matches!(
            registry.set_primary(&owner, "missing").await,
            Err(ApiError::NotFound(_))
        ));
    }
}
