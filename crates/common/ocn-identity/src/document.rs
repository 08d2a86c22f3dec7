use crate::did::{derive_key_agreement, Did};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
pub const ED25519_VERIFICATION_2020: &str = "Ed25519VerificationKey2020";
pub const X25519_KEY_AGREEMENT_2019: &str = "X25519KeyAgreementKey2019";

/// JSON-LD fields that may be a single string or an array of strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        match self {
            OneOrMany::One(v) => std::slice::from_ref(v).iter(),
            OneOrMany::Many(vs) => vs.iter(),
        }
    }
}

/// OKP public key in JWK form, as DID documents embed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeyJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
}

impl PublicKeyJwk {
    pub fn ed25519(pk: &ed25519_dalek::VerifyingKey) -> Self {
        Self {
            kty: "OKP".into(),
            crv: "Ed25519".into(),
            x: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(pk.as_bytes()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    #[serde(rename = "publicKeyJwk", skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<PublicKeyJwk>,
    #[serde(rename = "publicKeyBase58", skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,
}

impl VerificationMethod {
    /// Embedded Ed25519 method carrying the key as a JWK.
    pub fn ed25519(id: impl Into<String>, controller: impl Into<String>, pk: &ed25519_dalek::VerifyingKey) -> Self {
        Self {
            id: id.into(),
            method_type: ED25519_VERIFICATION_2020.into(),
            controller: controller.into(),
            public_key_jwk: Some(PublicKeyJwk::ed25519(pk)),
            public_key_base58: None,
        }
    }
}

/// A verification relationship entry: either a reference to a method id
/// or an embedded method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum VerificationEntry {
    Reference(String),
    Embedded(Box<VerificationMethod>),
}

/// A W3C DID Document. Derived, never stored: resolvers assemble one per
/// request from the identity graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<OneOrMany<String>>,
    #[serde(rename = "alsoKnownAs", default, skip_serializing_if = "Vec::is_empty")]
    pub also_known_as: Vec<String>,
    #[serde(rename = "verificationMethod", default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<VerificationEntry>,
    #[serde(rename = "assertionMethod", default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<VerificationEntry>,
    #[serde(rename = "keyAgreement", default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<VerificationEntry>,
    #[serde(rename = "capabilityInvocation", default, skip_serializing_if = "Vec::is_empty")]
    pub capability_invocation: Vec<VerificationEntry>,
    #[serde(rename = "capabilityDelegation", default, skip_serializing_if = "Vec::is_empty")]
    pub capability_delegation: Vec<VerificationEntry>,
}

impl DidDocument {
    /// Empty document for an id; resolvers fold material into it.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            context: vec![DID_CONTEXT.into()],
            id: id.into(),
            controller: None,
            also_known_as: Vec::new(),
            verification_method: Vec::new(),
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            key_agreement: Vec::new(),
            capability_invocation: Vec::new(),
            capability_delegation: Vec::new(),
        }
    }

    /// The standard `did:key` document for an Ed25519 key: one embedded
    /// verification method referenced from each relationship, plus the
    /// derived X25519 key-agreement entry.
    pub fn for_ed25519(did: &Did, pk: &ed25519_dalek::VerifyingKey) -> Self {
        let mut doc = Self::empty(did.as_str());

        let fragment = did.key_fragment().unwrap_or(did.as_str());
        let vm_id = format!("{}#{}", did, fragment);
        doc.verification_method
            .push(VerificationMethod::ed25519(&vm_id, did.as_str(), pk));
        doc.authentication.push(VerificationEntry::Reference(vm_id.clone()));
        doc.assertion_method.push(VerificationEntry::Reference(vm_id.clone()));
        doc.capability_invocation
            .push(VerificationEntry::Reference(vm_id.clone()));
        doc.capability_delegation
            .push(VerificationEntry::Reference(vm_id));

        let ka = derive_key_agreement(pk);
        doc.key_agreement
            .push(VerificationEntry::Embedded(Box::new(VerificationMethod {
                id: format!("{}#{}", did, ka.fragment),
                method_type: X25519_KEY_AGREEMENT_2019.into(),
                controller: did.as_str().into(),
                public_key_jwk: None,
                public_key_base58: Some(ka.public_key_base58),
            })));

        doc
    }
}
