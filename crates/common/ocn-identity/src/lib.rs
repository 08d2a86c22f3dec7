//! OCN Identity – DID & key tooling for the Open Credential Network.
//!
//! - Supports `did:key` using Ed25519 (multicodec `0xed 0x01`, multibase
//!   Base58Btc) and `did:web` with path segments.
//! - Provides `KeyPair` generation, signing, verification, and hex seed
//!   import for config-provisioned service keys.
//! - Implements Verifiable Credentials and DID-auth Verifiable
//!   Presentations with canonical serialization.
//! - Provides a swappable `TrustPolicy` seam for holder allow-lists.
//! - Zero `unsafe`; Clippy-clean; `#![forbid(unsafe_code)]`.

#![forbid(unsafe_code)]

mod did;
mod document;
mod keypair;
mod trust;
mod vc;

pub use did::{derive_key_agreement, DerivedKeyAgreement, Did, DidError};
pub use document::{
    DidDocument, OneOrMany, PublicKeyJwk, VerificationEntry, VerificationMethod, DID_CONTEXT,
    ED25519_VERIFICATION_2020, X25519_KEY_AGREEMENT_2019,
};
pub use keypair::{KeyPair, Signature};
pub use trust::{AllowListTrustPolicy, TrustPolicy};
pub use vc::{
    CredentialError, Proof, SignedCredential, VerifiableCredential, VerifiablePresentation,
    CREDENTIALS_CONTEXT,
};
