use crate::{Did, DidError, KeyPair};
use chrono::{DateTime, Utc};
use ed25519_dalek::{SignatureError as Ed25519SignatureError, Verifier};
use multibase::Base;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential already signed")]
    AlreadySigned,
    #[error("no proof attached")]
    MissingProof,
    #[error("malformed proof: {0}")]
    MalformedProof(String),
    #[error("cryptographic signature verification failed: {0}")]
    CryptoVerification(#[from] Ed25519SignatureError),
    #[error("verification method DID error: {0}")]
    Did(#[from] DidError),
    #[error("serialization error: {0}")]
    Ser(#[from] serde_json::Error),
}

/// Ed25519Signature2020-style proof with optional DID-auth fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(rename = "proofValue")]
    pub proof_value: String,
}

/// Generic W3C-style Verifiable Credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiableCredential<T>
where
    T: Serialize + for<'a> Deserialize<'a> + Clone,
{
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    #[serde(rename = "type")]
    pub types: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub issuer: Did,
    #[serde(rename = "issuanceDate")]
    pub issuance_date: DateTime<Utc>,
    #[serde(rename = "expirationDate", skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,

    #[serde(rename = "credentialSubject", bound = "")]
    pub credential_subject: T,

    /// Absent until signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

/// A credential whose proof has been attached and checked for shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedCredential<T>
where
    T: Serialize + for<'a> Deserialize<'a> + Clone,
{
    #[serde(bound = "")]
    pub vc: VerifiableCredential<T>,
}

impl<T> VerifiableCredential<T>
where
    T: Serialize + for<'a> Deserialize<'a> + Clone,
{
    pub fn new(issuer: Did, types: Vec<String>, credential_subject: T) -> Self {
        let mut all_types = vec!["VerifiableCredential".to_string()];
        all_types.extend(types);
        Self {
            context: vec![CREDENTIALS_CONTEXT.into()],
            types: all_types,
            id: None,
            issuer,
            issuance_date: Utc::now(),
            expiration_date: None,
            credential_subject,
            proof: None,
        }
    }

    /// Canonical JSON bytes of the proof-less credential (stable field
    /// order for structs; nested maps in the subject are ordered by
    /// serde_json).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CredentialError> {
        let mut tmp = self.clone();
        tmp.proof = None;
        let value: Value = serde_json::to_value(&tmp)?;
        Ok(serde_json::to_vec(&value)?)
    }

    /// Sign with the supplied keypair, attaching an assertion proof.
    pub fn sign(self, kp: &KeyPair) -> Result<SignedCredential<T>, CredentialError> {
        self.sign_with_options(kp, None, None)
    }

    /// Sign with optional challenge/domain (used by claim exchanges).
    pub fn sign_with_options(
        mut self,
        kp: &KeyPair,
        challenge: Option<String>,
        domain: Option<String>,
    ) -> Result<SignedCredential<T>, CredentialError> {
        if self.proof.is_some() {
            return Err(CredentialError::AlreadySigned);
        }

        let bytes = self.canonical_bytes()?;
        let sig = kp.sign(&bytes);

        self.proof = Some(Proof {
            proof_type: "Ed25519Signature2020".into(),
            created: Utc::now(),
            verification_method: kp.did.as_str().into(),
            proof_purpose: "assertionMethod".into(),
            challenge,
            domain,
            proof_value: multibase::encode(Base::Base58Btc, sig.to_bytes()),
        });

        Ok(SignedCredential { vc: self })
    }
}

fn decode_proof_signature(proof: &Proof) -> Result<ed25519_dalek::Signature, CredentialError> {
    let (_, bytes) = multibase::decode(&proof.proof_value)
        .map_err(|e| CredentialError::MalformedProof(e.to_string()))?;
    ed25519_dalek::Signature::from_slice(&bytes)
        .map_err(|e| CredentialError::MalformedProof(e.to_string()))
}

/// The verification key named by a proof. Only `did:key` methods embed
/// key material; a `did:web` method must first be resolved by the caller.
fn proof_key(proof: &Proof) -> Result<ed25519_dalek::VerifyingKey, CredentialError> {
    let did_part = proof
        .verification_method
        .split('#')
        .next()
        .unwrap_or(&proof.verification_method);
    let did = Did::from_trusted(did_part);
    Ok(did.to_ed25519()?)
}

impl<T> SignedCredential<T>
where
    T: Serialize + for<'a> Deserialize<'a> + Clone,
{
    /// Re-wrap a credential received over the wire, checking a proof is
    /// present.
    pub fn from_vc(vc: VerifiableCredential<T>) -> Result<Self, CredentialError> {
        if vc.proof.is_none() {
            return Err(CredentialError::MissingProof);
        }
        Ok(Self { vc })
    }

    /// Verify against the key named in the proof's verification method.
    pub fn verify(&self) -> Result<(), CredentialError> {
        let proof = self.vc.proof.as_ref().ok_or(CredentialError::MissingProof)?;
        self.verify_with_key(&proof_key(proof)?)
    }

    /// Verify against an explicitly supplied key.
    pub fn verify_with_key(&self, pk: &ed25519_dalek::VerifyingKey) -> Result<(), CredentialError> {
        let proof = self.vc.proof.as_ref().ok_or(CredentialError::MissingProof)?;
        let sig = decode_proof_signature(proof)?;
        let bytes = self.vc.canonical_bytes()?;
        pk.verify(&bytes, &sig)?;
        Ok(())
    }
}

/// W3C Verifiable Presentation. Used both for DID-auth (holder + proof
/// carrying a challenge) and for bundling credentials into a claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiablePresentation {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub holder: Did,
    #[serde(rename = "verifiableCredential", skip_serializing_if = "Option::is_none")]
    pub verifiable_credential: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl VerifiablePresentation {
    /// Build and sign a DID-auth presentation over `challenge`/`domain`.
    pub fn did_auth(
        kp: &KeyPair,
        challenge: impl Into<String>,
        domain: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let mut vp = Self {
            context: vec![CREDENTIALS_CONTEXT.into()],
            types: vec!["VerifiablePresentation".into()],
            holder: kp.did.clone(),
            verifiable_credential: None,
            proof: None,
        };
        let bytes = vp.canonical_bytes()?;
        let sig = kp.sign(&bytes);
        vp.proof = Some(Proof {
            proof_type: "Ed25519Signature2020".into(),
            created: Utc::now(),
            verification_method: kp.did.as_str().into(),
            proof_purpose: "authentication".into(),
            challenge: Some(challenge.into()),
            domain: Some(domain.into()),
            proof_value: multibase::encode(Base::Base58Btc, sig.to_bytes()),
        });
        Ok(vp)
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CredentialError> {
        let mut tmp = self.clone();
        tmp.proof = None;
        let value: Value = serde_json::to_value(&tmp)?;
        Ok(serde_json::to_vec(&value)?)
    }

    /// Verify the holder's signature. The holder must be a `did:key` DID
    /// and must match the proof's verification method.
    pub fn verify(&self) -> Result<(), CredentialError> {
        let proof = self.proof.as_ref().ok_or(CredentialError::MissingProof)?;

        let method_did = proof
            .verification_method
            .split('#')
            .next()
            .unwrap_or(&proof.verification_method);
        if method_did != self.holder.as_str() {
            return Err(CredentialError::MalformedProof(
                "verification method does not match holder".into(),
            ));
        }

        let sig = decode_proof_signature(proof)?;
        let bytes = self.canonical_bytes()?;
        self.holder.to_ed25519()?.verify(&bytes, &sig)?;
        Ok(())
    }

    /// The challenge embedded in the proof, if any.
    pub fn challenge(&self) -> Option<&str> {
        self.proof.as_ref().and_then(|p| p.challenge.as_deref())
    }
}
