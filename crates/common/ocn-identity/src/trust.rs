use crate::Did;
use std::collections::HashSet;
use std::sync::RwLock;

/// Decides whether a presentation holder is trusted for a given purpose.
///
/// The network keeps two instances: the login-provider allow-list that
/// gates proof-of-login verification, and the phone-issuer registry that
/// gates SMS challenges. The source of trust (static config, remote
/// registry) stays behind this seam.
pub trait TrustPolicy: Send + Sync {
    fn is_trusted_holder(&self, did: &Did) -> bool;
}

/// Allow-list trust policy over an in-memory DID set.
#[derive(Debug, Default)]
pub struct AllowListTrustPolicy {
    allowed: RwLock<HashSet<Did>>,
}

impl AllowListTrustPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dids(dids: impl IntoIterator<Item = Did>) -> Self {
        Self {
            allowed: RwLock::new(dids.into_iter().collect()),
        }
    }

    /// Add a DID to the allow-list at runtime.
    pub fn allow(&self, did: Did) {
        if let Ok(mut set) = self.allowed.write() {
            set.insert(did);
        }
    }
}

impl TrustPolicy for AllowListTrustPolicy {
    fn is_trusted_holder(&self, did: &Did) -> bool {
        self.allowed
            .read()
            .map(|set| set.contains(did))
            .unwrap_or(false)
    }
}
