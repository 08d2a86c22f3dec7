use crate::Did;
use anyhow::Context;
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

pub type Signature = ed25519_dalek::Signature;

/// Ed25519 keypair bound to a `did:key` DID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyPair {
    pub did: Did,
    pub pk: ed25519_dalek::VerifyingKey,
    sk: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let sk = ed25519_dalek::SigningKey::generate(&mut OsRng);
        Self::from_signing_key(sk)
    }

    /// Restore a keypair from a 32-byte hex seed, as provisioned through
    /// service configuration.
    pub fn from_seed_hex(seed: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(seed.trim()).context("signing seed is not valid hex")?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("signing seed must be exactly 32 bytes"))?;
        Ok(Self::from_signing_key(ed25519_dalek::SigningKey::from_bytes(&seed)))
    }

    fn from_signing_key(sk: ed25519_dalek::SigningKey) -> Self {
        let pk = sk.verifying_key();
        let did = Did::new_ed25519(&pk);
        Self { did, pk, sk }
    }

    /// Sign arbitrary bytes, returning an Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.sk.sign(msg)
    }

    /// Verify a signature against `msg`.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> bool {
        self.pk.verify(msg, sig).is_ok()
    }

    /// Hex seed of the signing key, for serialization into config.
    pub fn to_seed_hex(&self) -> String {
        hex::encode(self.sk.to_bytes())
    }
}
