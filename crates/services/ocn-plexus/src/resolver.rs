use crate::error::ApiError;
use crate::graph::IdentityGraph;
use crate::metrics::{operations, record_operation, status};
use crate::store::{AuthorityStore, ProfileStore};
use ocn_identity::{
    derive_key_agreement, DidDocument, KeyPair, OneOrMany, VerificationEntry, VerificationMethod,
    X25519_KEY_AGREEMENT_2019,
};
use ocn_types::validate_app_slug;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Builds DID documents for the network's `did:web` namespace:
/// `users:<profileId>`, `app:<slug>`, and the root service document.
///
/// Documents are derived on demand from the identity graph and cached
/// per key; any graph or authority mutation invalidates the cache.
pub struct DidResolver {
    profiles: Arc<dyn ProfileStore>,
    authorities: Arc<dyn AuthorityStore>,
    graph: Arc<IdentityGraph>,
    service_key: Arc<KeyPair>,
    domain: String,
    cache: RwLock<HashMap<String, DidDocument>>,
}

impl DidResolver {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        authorities: Arc<dyn AuthorityStore>,
        graph: Arc<IdentityGraph>,
        service_key: Arc<KeyPair>,
        domain: String,
    ) -> Self {
        Self {
            profiles,
            authorities,
            graph,
            service_key,
            domain,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &str) -> Option<DidDocument> {
        self.cache.read().ok().and_then(|c| c.get(key).cloned())
    }

    fn remember(&self, key: String, doc: DidDocument) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, doc);
        }
    }

    /// Drop every cached document. Called after graph, authority, or
    /// profile mutations; edges affect ancestor documents, so per-key
    /// invalidation would under-invalidate.
    pub fn invalidate_all(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    /// The service's own document at `did:web:<domain>`.
    pub fn root_document(&self) -> DidDocument {
        let did = ocn_identity::Did::new_web(&self.domain, &[]);
        let mut doc = DidDocument::for_ed25519(&self.service_key.did, &self.service_key.pk);
        let key_did = doc.id.clone();
        doc.id = did.as_str().to_string();
        doc.controller = Some(OneOrMany::One(key_did.clone()));
        rewrite_fragment_base(&mut doc, &key_did, did.as_str());
        doc
    }

    /// Resolve `did:web:<domain>:users:<profileId>`.
    pub async fn resolve_profile(&self, profile_id: &str) -> Result<DidDocument, ApiError> {
        validate_app_slug(profile_id)?;
        let cache_key = format!("users:{}", profile_id);
        if let Some(doc) = self.cached(&cache_key) {
            return Ok(doc);
        }

        let profile = self.graph.profile_by_id(profile_id).await?;
        let doc_id = format!("did:web:{}:users:{}", self.domain, profile_id);
        let mut doc = DidDocument::empty(&doc_id);

        // Own key material under the #owner fragment.
        if let Ok(pk) = profile.did.to_ed25519() {
            let owner_id = format!("{}#owner", doc_id);
            doc.verification_method
                .push(VerificationMethod::ed25519(&owner_id, &doc_id, &pk));
            doc.authentication
                .push(VerificationEntry::Reference(owner_id.clone()));
            doc.assertion_method
                .push(VerificationEntry::Reference(owner_id.clone()));
            doc.capability_invocation
                .push(VerificationEntry::Reference(owner_id.clone()));
            doc.capability_delegation
                .push(VerificationEntry::Reference(owner_id));

            let ka = derive_key_agreement(&pk);
            doc.key_agreement
                .push(VerificationEntry::Embedded(Box::new(VerificationMethod {
                    id: format!("{}#{}", doc_id, ka.fragment),
                    method_type: X25519_KEY_AGREEMENT_2019.into(),
                    controller: doc_id.clone(),
                    public_key_jwk: None,
                    public_key_base58: Some(ka.public_key_base58),
                })));
        }

        // Provenance controllers: the profile's own did:key DID plus the
        // DIDs of its immediate managers.
        let mut controllers = vec![profile.did.as_str().to_string()];
        for manager in self.graph.managers_of(&profile.did).await? {
            controllers.push(manager.as_str().to_string());
        }
        doc.controller = Some(if controllers.len() == 1 {
            OneOrMany::One(controllers.remove(0))
        } else {
            OneOrMany::Many(controllers)
        });

        // Registered signing authorities merge under #<name> fragments,
        // each entry keeping the authority's DID as controller.
        for authority in self.authorities.authorities_of(&profile.did).await? {
            let rel = &authority.relationship;
            if rel.did.method() == Some("web") {
                continue;
            }
            if let Ok(pk) = rel.did.to_ed25519() {
                let fragment_id = format!("{}#{}", doc_id, rel.name);
                doc.verification_method.push(VerificationMethod::ed25519(
                    &fragment_id,
                    rel.did.as_str(),
                    &pk,
                ));
                doc.assertion_method
                    .push(VerificationEntry::Reference(fragment_id));
            }
        }

        // Delegated material: every profile reachable over management
        // edges contributes its keys with ITS OWN DID as controller.
        // Provenance, not ownership.
        for managed in self.graph.delegation_closure(&profile.did).await? {
            let Ok(pk) = managed.did.to_ed25519() else {
                continue;
            };
            let fragment = managed.did.key_fragment().unwrap_or("key");
            let vm_id = format!("{}#{}", managed.did, fragment);
            doc.verification_method.push(VerificationMethod::ed25519(
                &vm_id,
                managed.did.as_str(),
                &pk,
            ));
            doc.authentication
                .push(VerificationEntry::Reference(vm_id.clone()));
            doc.capability_invocation
                .push(VerificationEntry::Reference(vm_id.clone()));
            doc.capability_delegation
                .push(VerificationEntry::Reference(vm_id));

            let ka = derive_key_agreement(&pk);
            doc.key_agreement
                .push(VerificationEntry::Embedded(Box::new(VerificationMethod {
                    id: format!("{}#{}", managed.did, ka.fragment),
                    method_type: X25519_KEY_AGREEMENT_2019.into(),
                    controller: managed.did.as_str().into(),
                    public_key_jwk: None,
                    public_key_base58: Some(ka.public_key_base58),
                })));
        }

        self.remember(cache_key, doc.clone());
        record_operation(operations::RESOLVE, status::SUCCESS);
        Ok(doc)
    }

    /// Resolve `did:web:<domain>:app:<slug>`. The slug is validated
    /// before any lookup; DRAFT listings resolve intentionally.
    pub async fn resolve_app(&self, slug: &str) -> Result<DidDocument, ApiError> {
        validate_app_slug(slug)?;

        let cache_key = format!("app:{}", slug);
        if let Some(doc) = self.cached(&cache_key) {
            return Ok(doc);
        }

        let app = self
            .profiles
            .app_by_slug(slug)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("unknown application: {}", slug)))?;

        let doc_id = format!("did:web:{}:app:{}", self.domain, slug);
        let mut doc = match app.did.to_ed25519() {
            Ok(pk) => {
                let mut doc = DidDocument::for_ed25519(&app.did, &pk);
                rewrite_fragment_base(&mut doc, app.did.as_str(), &doc_id);
                doc.id = doc_id.clone();
                doc
            }
            Err(_) => DidDocument::empty(&doc_id),
        };
        doc.controller = Some(OneOrMany::One(app.did.as_str().to_string()));

        self.remember(cache_key, doc.clone());
        record_operation(operations::RESOLVE, status::SUCCESS);
        Ok(doc)
    }
}

/// Re-home method ids (and the references pointing at them) from one
/// document base to another, leaving controllers untouched.
fn rewrite_fragment_base(doc: &mut DidDocument, from: &str, to: &str) {
    let swap = |s: &mut String| {
        if let Some(rest) = s.strip_prefix(from) {
            *s = format!("{}{}", to, rest);
        }
    };
    for vm in &mut doc.verification_method {
        swap(&mut vm.id);
    }
    for list in [
        &mut doc.authentication,
        &mut doc.assertion_method,
        &mut doc.key_agreement,
        &mut doc.capability_invocation,
        &mut doc.capability_delegation,
    ] {
        for entry in list.iter_mut() {
            match entry {
                VerificationEntry::Reference(id) => swap(id),
                VerificationEntry::Embedded(vm) => swap(&mut vm.id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use ocn_types::{
        AppListingStatus, EdgeKind, ProfileRole, RegisteredSigningAuthority,
        SigningAuthorityEndpoint, SigningAuthorityRelationship,
    };

    struct Fixture {
        resolver: DidResolver,
        graph: Arc<IdentityGraph>,
        store: Arc<InMemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let graph = Arc::new(IdentityGraph::new(store.clone()));
        let resolver = DidResolver::new(
            store.clone(),
            store.clone(),
            graph.clone(),
            Arc::new(KeyPair::generate()),
            "network.example".into(),
        );
        Fixture {
            resolver,
            graph,
            store,
        }
    }

    #[tokio::test]
    async fn transitive_delegation_shows_up_with_managed_controllers() {
        let fx = fixture();
        let (a, b, c) = (KeyPair::generate(), KeyPair::generate(), KeyPair::generate());

        for (kp, id) in [(&a, "alice"), (&b, "bob"), (&c, "carol")] {
            fx.graph
                .register_profile(&kp.did, id, id, ProfileRole::Member)
                .await
                .unwrap();
        }
        fx.graph.add_edge(&a.did, "bob", EdgeKind::Manages).await.unwrap();
        fx.graph.add_edge(&b.did, "carol", EdgeKind::Manages).await.unwrap();

        let doc = fx.resolver.resolve_profile("alice").await.unwrap();

        // C's verification, authentication, and keyAgreement material is
        // present, controlled by C's DID.
        assert!(doc
            .verification_method
            .iter()
            .any(|vm| vm.controller == c.did.as_str()));
        let ka_controllers: Vec<&str> = doc
            .key_agreement
            .iter()
            .filter_map(|e| match e {
                VerificationEntry::Embedded(vm) => Some(vm.controller.as_str()),
                _ => None,
            })
            .collect();
        assert!(ka_controllers.contains(&c.did.as_str()));
    }

    #[tokio::test]
    async fn managed_profile_document_names_its_manager_as_controller() {
        let fx = fixture();
        let (a, b) = (KeyPair::generate(), KeyPair::generate());
        fx.graph
            .register_profile(&a.did, "alice", "a", ProfileRole::Manager)
            .await
            .unwrap();
        fx.graph
            .register_profile(&b.did, "bob", "b", ProfileRole::Member)
            .await
            .unwrap();
        fx.graph.add_edge(&a.did, "bob", EdgeKind::Manages).await.unwrap();
        fx.resolver.invalidate_all();

        let doc = fx.resolver.resolve_profile("bob").await.unwrap();
        let controllers: Vec<String> = match doc.controller.unwrap() {
            OneOrMany::Many(v) => v,
            OneOrMany::One(v) => vec![v],
        };
        assert!(controllers.contains(&a.did.as_str().to_string()));
        assert!(controllers.contains(&b.did.as_str().to_string()));
    }

    #[tokio::test]
    async fn signing_authorities_merge_under_named_fragments() {
        let fx = fixture();
        let owner = KeyPair::generate();
        let sa = KeyPair::generate();
        fx.graph
            .register_profile(&owner.did, "issuer", "i", ProfileRole::Member)
            .await
            .unwrap();
        fx.store
            .upsert_authority(
                &owner.did,
                RegisteredSigningAuthority {
                    signing_authority: SigningAuthorityEndpoint {
                        endpoint: "https://sa.example.com".parse().unwrap(),
                    },
                    relationship: SigningAuthorityRelationship {
                        name: "primary-sa".into(),
                        did: sa.did.clone(),
                        owner_did: None,
                        is_primary: true,
                    },
                },
            )
            .await
            .unwrap();

        let doc = fx.resolver.resolve_profile("issuer").await.unwrap();
        let merged = doc
            .verification_method
            .iter()
            .find(|vm| vm.id.ends_with("#primary-sa"))
            .expect("authority fragment present");
        assert_eq!(merged.controller, sa.did.as_str());
    }

    #[tokio::test]
    async fn app_resolution_validates_slugs_and_serves_drafts() {
        let fx = fixture();
        let app = KeyPair::generate();
        fx.graph
            .register_app(&app.did, "portal", "Portal", AppListingStatus::Draft)
            .await
            .unwrap();

        let doc = fx.resolver.resolve_app("portal").await.unwrap();
        assert_eq!(doc.id, "did:web:network.example:app:portal");
        assert!(!doc.verification_method.is_empty());

        assert!(matches!(
            fx.resolver.resolve_app("../../etc/passwd").await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            fx.resolver.resolve_app("unknown-app").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn dead_subchains_are_omitted_silently() {
        let fx = fixture();
        let a = KeyPair::generate();
        let ghost = KeyPair::generate();
        fx.graph
            .register_profile(&a.did, "alice", "a", ProfileRole::Member)
            .await
            .unwrap();
        // Edge to a DID with no profile behind it.
        fx.store
            .add_edge(ocn_types::ManagementEdge {
                manager: a.did.clone(),
                managed: ghost.did.clone(),
                kind: EdgeKind::Manages,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let doc = fx.resolver.resolve_profile("alice").await.unwrap();
        assert!(!doc
            .verification_method
            .iter()
            .any(|vm| vm.controller == ghost.did.as_str()));
    }

    #[test]
    fn root_document_is_rehomed_to_the_web_did() {
        let fx = fixture();
        let doc = fx.resolver.root_document();
        assert_eq!(doc.id, "did:web:network.example");
        assert!(doc.verification_method[0].id.starts_with("did:web:network.example#"));
    }
}
