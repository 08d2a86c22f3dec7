use crate::error::ApiError;
use crate::store::ProfileStore;
use chrono::Utc;
use ocn_identity::Did;
use ocn_types::{
    validate_app_slug, AppIdentity, AppListingStatus, Connection, EdgeKind, ManagementEdge,
    Profile, ProfileRole,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

/// The identity graph: profiles, application identities, and the
/// directed delegation edges between them.
pub struct IdentityGraph {
    profiles: Arc<dyn ProfileStore>,
}

impl IdentityGraph {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Register a profile (or manager; role is the only distinction) for
    /// the caller's DID.
    pub async fn register_profile(
        &self,
        did: &Did,
        profile_id: &str,
        display_name: &str,
        role: ProfileRole,
    ) -> Result<Profile, ApiError> {
        // Profile ids follow the same slug rules as application slugs.
        validate_app_slug(profile_id)
            .map_err(|e| ApiError::BadRequest(format!("invalid profile id: {}", e.0)))?;

        let profile = Profile {
            profile_id: profile_id.to_string(),
            did: did.clone(),
            display_name: display_name.to_string(),
            role,
            created_at: Utc::now(),
        };
        self.profiles.insert_profile(profile.clone()).await?;
        tracing::info!(profile_id, did = %did, ?role, "registered profile");
        Ok(profile)
    }

    /// Register an application identity resolvable at `app:<slug>`.
    pub async fn register_app(
        &self,
        did: &Did,
        slug: &str,
        display_name: &str,
        status: AppListingStatus,
    ) -> Result<AppIdentity, ApiError> {
        validate_app_slug(slug)?;
        let app = AppIdentity {
            slug: slug.to_string(),
            did: did.clone(),
            display_name: display_name.to_string(),
            status,
            created_at: Utc::now(),
        };
        self.profiles.insert_app(app.clone()).await?;
        Ok(app)
    }

    pub async fn profile_by_id(&self, profile_id: &str) -> Result<Profile, ApiError> {
        self.profiles
            .profile_by_id(profile_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("profile: {}", profile_id)))
    }

    pub async fn profile_by_did(&self, did: &Did) -> Result<Profile, ApiError> {
        self.profiles
            .profile_by_did(did)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("profile for DID: {}", did)))
    }

    /// Find a profile by slug or by DID string; `None` when the
    /// identifier matches neither.
    pub async fn find_profile(&self, identifier: &str) -> Result<Option<Profile>, ApiError> {
        if let Some(profile) = self.profiles.profile_by_id(identifier).await? {
            return Ok(Some(profile));
        }
        if let Ok(did) = Did::from_str(identifier) {
            return Ok(self.profiles.profile_by_did(&did).await?);
        }
        Ok(None)
    }

    /// Add a delegation edge from the caller to a managed profile. Both
    /// ends must exist; edges are additive.
    pub async fn add_edge(
        &self,
        manager: &Did,
        managed: &str,
        kind: EdgeKind,
    ) -> Result<ManagementEdge, ApiError> {
        self.profile_by_did(manager).await?;
        let managed_profile = self
            .find_profile(managed)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("managed profile: {}", managed)))?;

        let edge = ManagementEdge {
            manager: manager.clone(),
            managed: managed_profile.did.clone(),
            kind,
            created_at: Utc::now(),
        };
        self.profiles.add_edge(edge.clone()).await?;
        tracing::debug!(manager = %manager, managed = %edge.managed, kind = %kind, "added management edge");
        Ok(edge)
    }

    /// DIDs of a profile's immediate managers/administrators.
    pub async fn managers_of(&self, did: &Did) -> Result<Vec<Did>, ApiError> {
        Ok(self
            .profiles
            .edges_to(did)
            .await?
            .into_iter()
            .map(|e| e.manager)
            .collect())
    }

    pub async fn connections(&self, profile_id: &str) -> Result<Vec<Connection>, ApiError> {
        Ok(self.profiles.connections_of(profile_id).await?)
    }

    /// All profiles reachable from `root` over outgoing delegation
    /// edges, excluding `root` itself.
    ///
    /// Cycle policy: a visited-set keyed by DID. A DID already seen is
    /// skipped silently, so cyclic manager chains terminate and produce
    /// the union of reachable material. Unresolvable targets are
    /// likewise skipped: a dead sub-chain never breaks the root lookup.
    pub async fn delegation_closure(&self, root: &Did) -> Result<Vec<Profile>, ApiError> {
        let mut visited: HashSet<Did> = HashSet::new();
        visited.insert(root.clone());

        let mut stack: Vec<Did> = vec![root.clone()];
        let mut reachable = Vec::new();

        while let Some(current) = stack.pop() {
            for edge in self.profiles.edges_from(&current).await? {
                if !visited.insert(edge.managed.clone()) {
                    continue;
                }
                match self.profiles.profile_by_did(&edge.managed).await? {
                    Some(profile) => {
                        stack.push(profile.did.clone());
                        reachable.push(profile);
                    }
                    None => {
                        tracing::debug!(did = %edge.managed, "skipping unresolvable delegation target");
                    }
                }
            }
        }

        Ok(reachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use ocn_identity::KeyPair;

    async fn graph_with_chain() -> (IdentityGraph, KeyPair, KeyPair, KeyPair) {
        let store = Arc::new(InMemoryStore::new());
        let graph = IdentityGraph::new(store);
        let (a, b, c) = (KeyPair::generate(), KeyPair::generate(), KeyPair::generate());

        graph
            .register_profile(&a.did, "alice", "Alice", ProfileRole::Manager)
            .await
            .unwrap();
        graph
            .register_profile(&b.did, "bob", "Bob", ProfileRole::Member)
            .await
            .unwrap();
        graph
            .register_profile(&c.did, "carol", "Carol", ProfileRole::Member)
            .await
            .unwrap();

        graph.add_edge(&a.did, "bob", EdgeKind::Manages).await.unwrap();
        graph.add_edge(&b.did, "carol", EdgeKind::Manages).await.unwrap();

        (graph, a, b, c)
    }

    #[tokio::test]
    async fn closure_is_transitive() {
        let (graph, a, _, c) = graph_with_chain().await;
        let closure = graph.delegation_closure(&a.did).await.unwrap();

        let dids: Vec<&str> = closure.iter().map(|p| p.did.as_str()).collect();
        assert_eq!(closure.len(), 2);
        assert!(dids.contains(&c.did.as_str()));
    }

    #[tokio::test]
    async fn cyclic_chains_terminate() {
        let (graph, a, b, _) = graph_with_chain().await;
        // Close the loop: bob manages alice.
        graph.add_edge(&b.did, "alice", EdgeKind::Manages).await.unwrap();

        let closure = graph.delegation_closure(&a.did).await.unwrap();
        // The root is not re-entered.
        assert_eq!(closure.len(), 2);
        assert!(!closure.iter().any(|p| p.did == a.did));
    }

    #[tokio::test]
    async fn bad_profile_ids_are_client_errors() {
        let store = Arc::new(InMemoryStore::new());
        let graph = IdentityGraph::new(store);
        let kp = KeyPair::generate();

        let err = graph
            .register_profile(&kp.did, "Not A Slug", "x", ProfileRole::Member)
            .await;
        assert!(matches!(err, Err(ApiError::BadRequest(_))));
    }
}
