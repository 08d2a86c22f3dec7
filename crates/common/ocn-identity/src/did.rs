use anyhow::Context;
use multibase::{decode, Base};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Multicodec varint prefixes for the key types the network works with.
const ED25519_PUB_CODEC: [u8; 2] = [0xed, 0x01];
const X25519_PUB_CODEC: [u8; 2] = [0xec, 0x01];

/// Error type for DID operations.
#[derive(Debug, Error)]
pub enum DidError {
    #[error("malformed DID string")]
    Malformed,
    #[error("unsupported DID method: {0}")]
    UnsupportedMethod(String),
    #[error("unsupported multicodec: {0:#x}")]
    UnsupportedCodec(u64),
    #[error("DID does not embed key material")]
    NoKeyMaterial,
}

/// A W3C-compatible Decentralized Identifier.
///
/// Two methods are used across the network: **`did:key:z…`** carrying an
/// Ed25519 public key, and **`did:web:…`** naming a document served by a
/// network host (`…:users:<profileId>` and `…:app:<slug>` segments).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Did(String);

impl Did {
    /// Construct a `did:key` DID from an Ed25519 public key.
    pub fn new_ed25519(pk: &ed25519_dalek::VerifyingKey) -> Self {
        let mut bytes = ED25519_PUB_CODEC.to_vec();
        bytes.extend_from_slice(pk.as_bytes());

        let encoded = multibase::encode(Base::Base58Btc, bytes);
        Self(format!("did:key:{}", encoded))
    }

    /// Construct a `did:web` DID for a host and path segments.
    ///
    /// Ports in the host must already be percent-encoded (`%3A`).
    pub fn new_web(domain: &str, segments: &[&str]) -> Self {
        let mut did = format!("did:web:{}", domain);
        for segment in segments {
            did.push(':');
            did.push_str(segment);
        }
        Self(did)
    }

    /// Wrap an already-validated DID string without re-checking it.
    ///
    /// Callers that accept external input should go through `FromStr`.
    pub fn from_trusted(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Return the DID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the DID method name (`key`, `web`, …).
    pub fn method(&self) -> Option<&str> {
        self.0.split(':').nth(1)
    }

    /// The multibase-encoded key portion of a `did:key` DID.
    pub fn key_fragment(&self) -> Option<&str> {
        if self.method() == Some("key") {
            self.0.split(':').nth(2)
        } else {
            None
        }
    }

    /// Decode and return the embedded Ed25519 public key.
    ///
    /// Only `did:key` DIDs embed key material; `did:web` DIDs must be
    /// resolved through their host instead.
    pub fn to_ed25519(&self) -> Result<ed25519_dalek::VerifyingKey, DidError> {
        let parts: Vec<&str> = self.0.split(':').collect();
        if parts.len() < 3 || parts[0] != "did" {
            return Err(DidError::Malformed);
        }
        if parts[1] != "key" {
            return Err(DidError::NoKeyMaterial);
        }
        let (_, data) = decode(parts[2]).map_err(|_| DidError::Malformed)?;

        let Some((codec, key_bytes)) = data.split_first_chunk::<2>() else {
            return Err(DidError::Malformed);
        };
        if *codec != ED25519_PUB_CODEC {
            return Err(DidError::UnsupportedCodec(u64::from(codec[0])));
        }
        if key_bytes.len() != 32 {
            return Err(DidError::Malformed);
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(key_bytes);

        ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|_| DidError::Malformed)
    }

    /// Returns the Ed25519 verifying key embedded in the DID.
    /// This maps the internal `to_ed25519` method and converts the error type.
    pub fn verifying_key(&self) -> anyhow::Result<ed25519_dalek::VerifyingKey> {
        self.to_ed25519()
            .context("Failed to extract Ed25519 verifying key from DID")
    }
}

/// The X25519 key-agreement key derived from an Ed25519 verifying key,
/// in both encodings a DID document needs: the multibase fragment id
/// (`z…` over `0xec 0x01 ++ key`) and the plain Base58 `publicKeyBase58`.
pub struct DerivedKeyAgreement {
    pub fragment: String,
    pub public_key_base58: String,
}

/// Derive the Curve25519 (X25519) public key for an Ed25519 key via the
/// birational map, encoded as a DID document expects it.
pub fn derive_key_agreement(pk: &ed25519_dalek::VerifyingKey) -> DerivedKeyAgreement {
    let x25519 = pk.to_montgomery().to_bytes();

    let mut prefixed = X25519_PUB_CODEC.to_vec();
    prefixed.extend_from_slice(&x25519);
    let fragment = multibase::encode(Base::Base58Btc, prefixed);

    // multibase Base58Btc is plain base58btc behind a `z` sentinel.
    let public_key_base58 = multibase::encode(Base::Base58Btc, x25519)[1..].to_string();

    DerivedKeyAgreement {
        fragment,
        public_key_base58,
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        if parts.next() != Some("did") {
            return Err(DidError::Malformed);
        }
        let method = parts.next().ok_or(DidError::Malformed)?;
        let rest = parts.next().filter(|r| !r.is_empty());

        match method {
            // Validate by decoding the embedded key.
            "key" => {
                let did = Did(s.to_string());
                did.to_ed25519()?;
                Ok(did)
            }
            "web" => {
                let rest = rest.ok_or(DidError::Malformed)?;
                if rest.split(':').any(|segment| segment.is_empty()) {
                    return Err(DidError::Malformed);
                }
                Ok(Did(s.to_string()))
            }
            other => Err(DidError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn ed25519_did_round_trips() {
        let kp = KeyPair::generate();
        let did = Did::new_ed25519(&kp.pk);

        assert!(did.as_str().starts_with("did:key:z6Mk"));
        assert_eq!(did.to_ed25519().unwrap(), kp.pk);
    }

    #[test]
    fn from_str_rejects_garbage() {
        assert!(Did::from_str("did:key:zNotAKey").is_err());
        assert!(Did::from_str("key:z6Mk").is_err());
        assert!(Did::from_str("did:web:").is_err());
        assert!(Did::from_str("did:web:host::users").is_err());
        assert!(matches!(
            Did::from_str("did:example:123"),
            Err(DidError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn web_dids_carry_segments() {
        let did = Did::new_web("network.example", &["users", "alice"]);
        assert_eq!(did.as_str(), "did:web:network.example:users:alice");
        assert_eq!(did.method(), Some("web"));
        assert!(matches!(did.to_ed25519(), Err(DidError::NoKeyMaterial)));
    }

    #[test]
    fn key_agreement_derivation_is_stable() {
        let kp = KeyPair::generate();
        let first = derive_key_agreement(&kp.pk);
        let second = derive_key_agreement(&kp.pk);

        assert_eq!(first.fragment, second.fragment);
        assert!(first.fragment.starts_with("z6LS"));
        assert_eq!(first.public_key_base58, second.public_key_base58);
        assert!(!first.public_key_base58.starts_with('z'));
    }
}
