use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocn_identity::Did;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{
    ActivityStore, AuthorityStore, ContactStore, CredentialStore, ExchangeStore, InboxStore,
    IncomingCredential, InviteStore, OtpChallenge, ProfileStore, StoreError,
};
use crate::exchange::{ClaimExchange, ExchangeState};
use ocn_types::{
    Activity, ActivityQuery, AppIdentity, Connection, ContactIdentifier, ContactMethod,
    InboxIssuance, InboxIssuanceStatus, Invite, ManagementEdge, Profile,
    RegisteredSigningAuthority,
};

#[derive(Debug, Default)]
struct Inner {
    profiles: HashMap<String, Profile>,
    profiles_by_did: HashMap<Did, String>,
    apps: HashMap<String, AppIdentity>,
    edges: Vec<ManagementEdge>,
    connections: Vec<Connection>,

    // contact methods keyed by owning profile
    contacts: HashMap<String, Vec<ContactMethod>>,
    challenges: HashMap<String, OtpChallenge>,

    authorities: HashMap<Did, Vec<RegisteredSigningAuthority>>,
    activities: Vec<Activity>,
    invites: HashMap<String, Vec<Invite>>,
    exchanges: HashMap<(String, String), ClaimExchange>,
    issuances: HashMap<String, InboxIssuance>,

    objects: HashMap<String, Value>,
    incoming: HashMap<String, Vec<IncomingCredential>>,
    received: HashMap<String, Vec<String>>,
}

/// The bundled backend: every repository over one `RwLock`'d map set.
///
/// Atomic operations take the write lock once and do their whole
/// read-modify-write inside it, which is what makes `claim_exclusive`,
/// `consume_invite`, `accept_credential`, and `complete_exchange` safe
/// under concurrent requests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Internal("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Internal("store lock poisoned".into()))
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if inner.profiles.contains_key(&profile.profile_id) {
            return Err(StoreError::Conflict(format!(
                "profile id already taken: {}",
                profile.profile_id
            )));
        }
        if inner.profiles_by_did.contains_key(&profile.did) {
            return Err(StoreError::Conflict(format!(
                "DID already registered: {}",
                profile.did
            )));
        }
        inner
            .profiles_by_did
            .insert(profile.did.clone(), profile.profile_id.clone());
        inner.profiles.insert(profile.profile_id.clone(), profile);
        Ok(())
    }

    async fn profile_by_id(&self, profile_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.read()?.profiles.get(profile_id).cloned())
    }

    async fn profile_by_did(&self, did: &Did) -> Result<Option<Profile>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .profiles_by_did
            .get(did)
            .and_then(|id| inner.profiles.get(id))
            .cloned())
    }

    async fn insert_app(&self, app: AppIdentity) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if inner.apps.contains_key(&app.slug) {
            return Err(StoreError::Conflict(format!(
                "application slug already taken: {}",
                app.slug
            )));
        }
        inner.apps.insert(app.slug.clone(), app);
        Ok(())
    }

    async fn app_by_slug(&self, slug: &str) -> Result<Option<AppIdentity>, StoreError> {
        Ok(self.read()?.apps.get(slug).cloned())
    }

    async fn add_edge(&self, edge: ManagementEdge) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let duplicate = inner
            .edges
            .iter()
            .any(|e| e.manager == edge.manager && e.managed == edge.managed && e.kind == edge.kind);
        if !duplicate {
            inner.edges.push(edge);
        }
        Ok(())
    }

    async fn edges_from(&self, manager: &Did) -> Result<Vec<ManagementEdge>, StoreError> {
        Ok(self
            .read()?
            .edges
            .iter()
            .filter(|e| &e.manager == manager)
            .cloned()
            .collect())
    }

    async fn edges_to(&self, managed: &Did) -> Result<Vec<ManagementEdge>, StoreError> {
        Ok(self
            .read()?
            .edges
            .iter()
            .filter(|e| &e.managed == managed)
            .cloned()
            .collect())
    }

    async fn add_connection(&self, profile_id: &str, other: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let exists = inner
            .connections
            .iter()
            .any(|c| c.profile_id == profile_id && c.other_profile_id == other);
        if !exists {
            let now = Utc::now();
            inner.connections.push(Connection {
                profile_id: profile_id.to_string(),
                other_profile_id: other.to_string(),
                created_at: now,
            });
            inner.connections.push(Connection {
                profile_id: other.to_string(),
                other_profile_id: profile_id.to_string(),
                created_at: now,
            });
        }
        Ok(())
    }

    async fn connections_of(&self, profile_id: &str) -> Result<Vec<Connection>, StoreError> {
        Ok(self
            .read()?
            .connections
            .iter()
            .filter(|c| c.profile_id == profile_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn add_contact(
        &self,
        profile_id: &str,
        identifier: &ContactIdentifier,
    ) -> Result<ContactMethod, StoreError> {
        let mut inner = self.write()?;
        let list = inner.contacts.entry(profile_id.to_string()).or_default();
        if list
            .iter()
            .any(|c| c.method_type == identifier.method_type && c.value == identifier.value)
        {
            return Err(StoreError::Conflict(format!(
                "contact method already present: {}",
                identifier.value
            )));
        }
        let method = ContactMethod {
            id: Uuid::new_v4().to_string(),
            method_type: identifier.method_type,
            value: identifier.value.clone(),
            is_verified: false,
            is_primary: false,
            created_at: Utc::now(),
        };
        list.push(method.clone());
        Ok(method)
    }

    async fn contacts_of(&self, profile_id: &str) -> Result<Vec<ContactMethod>, StoreError> {
        Ok(self
            .read()?
            .contacts
            .get(profile_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn contact_by_id(
        &self,
        contact_id: &str,
    ) -> Result<Option<(String, ContactMethod)>, StoreError> {
        let inner = self.read()?;
        for (owner, list) in &inner.contacts {
            if let Some(method) = list.iter().find(|c| c.id == contact_id) {
                return Ok(Some((owner.clone(), method.clone())));
            }
        }
        Ok(None)
    }

    async fn set_primary(&self, profile_id: &str, contact_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let list = inner
            .contacts
            .get_mut(profile_id)
            .ok_or_else(|| StoreError::NotFound(format!("contact method: {}", contact_id)))?;
        if !list.iter().any(|c| c.id == contact_id) {
            return Err(StoreError::NotFound(format!("contact method: {}", contact_id)));
        }
        for method in list.iter_mut() {
            method.is_primary = method.id == contact_id;
        }
        Ok(())
    }

    async fn remove_contact(&self, profile_id: &str, contact_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let list = inner
            .contacts
            .get_mut(profile_id)
            .ok_or_else(|| StoreError::NotFound(format!("contact method: {}", contact_id)))?;
        let before = list.len();
        list.retain(|c| c.id != contact_id);
        if list.len() == before {
            return Err(StoreError::NotFound(format!("contact method: {}", contact_id)));
        }
        Ok(())
    }

    async fn claim_exclusive(
        &self,
        profile_id: &str,
        identifier: &ContactIdentifier,
    ) -> Result<ContactMethod, StoreError> {
        // One write-lock scope for the whole delete-others-then-verify
        // step; a concurrent claim for the same identifier serializes
        // behind this lock and then deletes this profile's relationship.
        let mut inner = self.write()?;

        for (owner, list) in inner.contacts.iter_mut() {
            if owner != profile_id {
                list.retain(|c| {
                    !(c.method_type == identifier.method_type && c.value == identifier.value)
                });
            }
        }

        let list = inner.contacts.entry(profile_id.to_string()).or_default();
        let method = match list
            .iter_mut()
            .find(|c| c.method_type == identifier.method_type && c.value == identifier.value)
        {
            Some(existing) => {
                existing.is_verified = true;
                existing.clone()
            }
            None => {
                let method = ContactMethod {
                    id: Uuid::new_v4().to_string(),
                    method_type: identifier.method_type,
                    value: identifier.value.clone(),
                    is_verified: true,
                    is_primary: false,
                    created_at: Utc::now(),
                };
                list.push(method.clone());
                method
            }
        };
        Ok(method)
    }

    async fn verified_owner(
        &self,
        identifier: &ContactIdentifier,
    ) -> Result<Option<String>, StoreError> {
        let inner = self.read()?;
        for (owner, list) in &inner.contacts {
            if list.iter().any(|c| {
                c.is_verified && c.method_type == identifier.method_type && c.value == identifier.value
            }) {
                return Ok(Some(owner.clone()));
            }
        }
        Ok(None)
    }

    async fn put_challenge(&self, challenge: OtpChallenge) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        // Single active code per contact method.
        inner
            .challenges
            .retain(|_, c| c.identifier != challenge.identifier);
        inner.challenges.insert(challenge.token.clone(), challenge);
        Ok(())
    }

    async fn challenge_by_token(&self, token: &str) -> Result<Option<OtpChallenge>, StoreError> {
        Ok(self.read()?.challenges.get(token).cloned())
    }

    async fn increment_attempts(&self, token: &str) -> Result<u32, StoreError> {
        let mut inner = self.write()?;
        let challenge = inner
            .challenges
            .get_mut(token)
            .ok_or_else(|| StoreError::NotFound("challenge token".into()))?;
        challenge.attempts += 1;
        Ok(challenge.attempts)
    }

    async fn delete_challenge(&self, token: &str) -> Result<(), StoreError> {
        self.write()?.challenges.remove(token);
        Ok(())
    }
}

#[async_trait]
impl AuthorityStore for InMemoryStore {
    async fn upsert_authority(
        &self,
        profile_did: &Did,
        authority: RegisteredSigningAuthority,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let list = inner.authorities.entry(profile_did.clone()).or_default();
        if authority.relationship.is_primary {
            for existing in list.iter_mut() {
                existing.relationship.is_primary = false;
            }
        }
        list.retain(|a| a.relationship.name != authority.relationship.name);
        list.push(authority);
        Ok(())
    }

    async fn authorities_of(
        &self,
        profile_did: &Did,
    ) -> Result<Vec<RegisteredSigningAuthority>, StoreError> {
        Ok(self
            .read()?
            .authorities
            .get(profile_did)
            .cloned()
            .unwrap_or_default())
    }

    async fn authority_named(
        &self,
        profile_did: &Did,
        name: &str,
    ) -> Result<Option<RegisteredSigningAuthority>, StoreError> {
        Ok(self
            .read()?
            .authorities
            .get(profile_did)
            .and_then(|list| list.iter().find(|a| a.relationship.name == name).cloned()))
    }

    async fn primary_authority(
        &self,
        profile_did: &Did,
    ) -> Result<Option<RegisteredSigningAuthority>, StoreError> {
        Ok(self
            .read()?
            .authorities
            .get(profile_did)
            .and_then(|list| list.iter().find(|a| a.relationship.is_primary).cloned()))
    }

    async fn set_primary(&self, profile_did: &Did, name: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let list = inner
            .authorities
            .get_mut(profile_did)
            .ok_or_else(|| StoreError::NotFound(format!("signing authority: {}", name)))?;
        if !list.iter().any(|a| a.relationship.name == name) {
            return Err(StoreError::NotFound(format!("signing authority: {}", name)));
        }
        for authority in list.iter_mut() {
            authority.relationship.is_primary = authority.relationship.name == name;
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for InMemoryStore {
    async fn append(&self, activity: Activity) -> Result<(), StoreError> {
        self.write()?.activities.push(activity);
        Ok(())
    }

    async fn by_activity_id(&self, activity_id: &str) -> Result<Vec<Activity>, StoreError> {
        let mut rows: Vec<Activity> = self
            .read()?
            .activities
            .iter()
            .filter(|a| a.activity_id == activity_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.timestamp);
        Ok(rows)
    }

    async fn query(
        &self,
        actor_profile_id: &str,
        query: &ActivityQuery,
    ) -> Result<Vec<Activity>, StoreError> {
        let boost_uris = query.boost_uris();
        let mut rows: Vec<Activity> = self
            .read()?
            .activities
            .iter()
            .filter(|a| a.actor_profile_id == actor_profile_id)
            .filter(|a| match &boost_uris {
                Some(uris) => a
                    .boost_uri
                    .as_deref()
                    .is_some_and(|uri| uris.contains(&uri)),
                None => true,
            })
            .filter(|a| match &query.integration_id {
                Some(id) => a.integration_id.as_deref() == Some(id.as_str()),
                None => true,
            })
            .filter(|a| match query.event_type {
                Some(event_type) => a.event_type == event_type,
                None => true,
            })
            .filter(|a| match query.cursor {
                Some(cursor) => a.timestamp < cursor,
                None => true,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(rows)
    }
}

#[async_trait]
impl InviteStore for InMemoryStore {
    async fn put_invite(&self, invite: Invite) -> Result<(), StoreError> {
        self.write()?
            .invites
            .entry(invite.profile_id.clone())
            .or_default()
            .push(invite);
        Ok(())
    }

    async fn invites_of(&self, profile_id: &str) -> Result<Vec<Invite>, StoreError> {
        Ok(self
            .read()?
            .invites
            .get(profile_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn consume_invite(
        &self,
        issuer_profile_id: &str,
        challenge: &str,
        now: DateTime<Utc>,
    ) -> Result<Invite, StoreError> {
        // Decrement-and-check under one write lock; two concurrent
        // claimers of a single-use invite cannot both pass.
        let mut inner = self.write()?;
        let list = inner
            .invites
            .get_mut(issuer_profile_id)
            .ok_or_else(|| StoreError::NotFound(format!("invite: {}", challenge)))?;
        let idx = list
            .iter()
            .position(|i| i.challenge == challenge)
            .ok_or_else(|| StoreError::NotFound(format!("invite: {}", challenge)))?;

        if !list[idx].is_consumable(now) {
            return Err(StoreError::Exhausted(format!(
                "invite no longer consumable: {}",
                challenge
            )));
        }

        match list[idx].uses_remaining {
            // Unlimited: never decrements, never disappears.
            None => Ok(list[idx].clone()),
            Some(remaining) => {
                let remaining = remaining - 1;
                list[idx].uses_remaining = Some(remaining);
                let consumed = list[idx].clone();
                if remaining == 0 {
                    list.remove(idx);
                }
                Ok(consumed)
            }
        }
    }

    async fn invalidate(&self, profile_id: &str, challenge: &str) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        let Some(list) = inner.invites.get_mut(profile_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|i| i.challenge != challenge);
        Ok(list.len() != before)
    }
}

#[async_trait]
impl ExchangeStore for InMemoryStore {
    async fn put_exchange(&self, exchange: ClaimExchange) -> Result<(), StoreError> {
        self.write()?.exchanges.insert(
            (exchange.workflow_id.clone(), exchange.exchange_id.clone()),
            exchange,
        );
        Ok(())
    }

    async fn get_exchange(
        &self,
        workflow_id: &str,
        exchange_id: &str,
    ) -> Result<Option<ClaimExchange>, StoreError> {
        Ok(self
            .read()?
            .exchanges
            .get(&(workflow_id.to_string(), exchange_id.to_string()))
            .cloned())
    }

    async fn complete_exchange(
        &self,
        workflow_id: &str,
        exchange_id: &str,
    ) -> Result<ClaimExchange, StoreError> {
        let mut inner = self.write()?;
        let exchange = inner
            .exchanges
            .get_mut(&(workflow_id.to_string(), exchange_id.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("exchange: {}", exchange_id)))?;
        if matches!(exchange.state, ExchangeState::Completed) {
            return Err(StoreError::Conflict("exchange already completed".into()));
        }
        exchange.state = ExchangeState::Completed;
        Ok(exchange.clone())
    }
}

#[async_trait]
impl InboxStore for InMemoryStore {
    async fn put_issuance(&self, issuance: InboxIssuance) -> Result<(), StoreError> {
        self.write()?.issuances.insert(issuance.id.clone(), issuance);
        Ok(())
    }

    async fn issuance_by_id(&self, id: &str) -> Result<Option<InboxIssuance>, StoreError> {
        Ok(self.read()?.issuances.get(id).cloned())
    }

    async fn open_issuances_for(
        &self,
        identifier: &ContactIdentifier,
    ) -> Result<Vec<InboxIssuance>, StoreError> {
        Ok(self
            .read()?
            .issuances
            .values()
            .filter(|i| i.is_open() && &i.recipient == identifier)
            .cloned()
            .collect())
    }

    async fn issuances_of_issuer(
        &self,
        profile_id: &str,
        status: Option<InboxIssuanceStatus>,
    ) -> Result<Vec<InboxIssuance>, StoreError> {
        Ok(self
            .read()?
            .issuances
            .values()
            .filter(|i| i.issuer_profile_id == profile_id)
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: &str, status: InboxIssuanceStatus) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let issuance = inner
            .issuances
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("inbox issuance: {}", id)))?;
        issuance.status = status;
        Ok(())
    }

    async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<InboxIssuance>, StoreError> {
        Ok(self
            .read()?
            .issuances
            .values()
            .filter(|i| i.is_open() && i.expires_at <= now)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn upload(&self, kind: &str, content: Value) -> Result<String, StoreError> {
        let uri = format!("ocn:{}:{}", kind, Uuid::new_v4());
        self.write()?.objects.insert(uri.clone(), content);
        Ok(uri)
    }

    async fn get(&self, uri: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read()?.objects.get(uri).cloned())
    }

    async fn enqueue_incoming(
        &self,
        profile_id: &str,
        incoming: IncomingCredential,
    ) -> Result<(), StoreError> {
        self.write()?
            .incoming
            .entry(profile_id.to_string())
            .or_default()
            .push(incoming);
        Ok(())
    }

    async fn incoming_of(&self, profile_id: &str) -> Result<Vec<IncomingCredential>, StoreError> {
        Ok(self
            .read()?
            .incoming
            .get(profile_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn accept_credential(&self, profile_id: &str, uri: &str) -> Result<(), StoreError> {
        // One-way transition under a single lock: a URI moves into the
        // received set at most once.
        let mut inner = self.write()?;
        let already = inner
            .received
            .get(profile_id)
            .is_some_and(|list| list.iter().any(|u| u == uri));
        if already {
            return Err(StoreError::AlreadyReceived(uri.to_string()));
        }

        let queue = inner.incoming.entry(profile_id.to_string()).or_default();
        let before = queue.len();
        queue.retain(|c| c.uri != uri);
        if queue.len() == before {
            return Err(StoreError::NotFound(format!(
                "credential not in incoming queue: {}",
                uri
            )));
        }

        inner
            .received
            .entry(profile_id.to_string())
            .or_default()
            .push(uri.to_string());
        Ok(())
    }

    async fn received_of(&self, profile_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read()?
            .received
            .get(profile_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocn_types::ContactMethodType;

    fn email(value: &str) -> ContactIdentifier {
        ContactIdentifier::new(ContactMethodType::Email, value)
    }

    #[tokio::test]
    async fn claim_exclusive_revokes_other_profiles() {
        let store = InMemoryStore::new();
        let id = email("shared@example.com");

        store.add_contact("alice", &id).await.unwrap();
        store.claim_exclusive("alice", &id).await.unwrap();
        assert_eq!(
            store.verified_owner(&id).await.unwrap(),
            Some("alice".to_string())
        );

        // Bob claims the same identifier; Alice's relationship is gone.
        let method = store.claim_exclusive("bob", &id).await.unwrap();
        assert!(method.is_verified);
        assert_eq!(
            store.verified_owner(&id).await.unwrap(),
            Some("bob".to_string())
        );
        assert!(store.contacts_of("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_use_invite_disappears_after_consumption() {
        let store = InMemoryStore::new();
        store
            .put_invite(Invite {
                challenge: "tok".into(),
                profile_id: "alice".into(),
                max_uses: Some(1),
                uses_remaining: Some(1),
                expires_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        store.consume_invite("alice", "tok", Utc::now()).await.unwrap();
        assert!(store.invites_of("alice").await.unwrap().is_empty());
        assert!(matches!(
            store.consume_invite("alice", "tok", Utc::now()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn accept_credential_is_one_way() {
        let store = InMemoryStore::new();
        store
            .enqueue_incoming(
                "bob",
                IncomingCredential {
                    uri: "ocn:credential:1".into(),
                    from_profile_id: "alice".into(),
                    activity_id: None,
                    sent_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        store.accept_credential("bob", "ocn:credential:1").await.unwrap();
        assert_eq!(store.received_of("bob").await.unwrap().len(), 1);

        let err = store.accept_credential("bob", "ocn:credential:1").await;
        assert!(matches!(err, Err(StoreError::AlreadyReceived(_))));
        assert_eq!(store.received_of("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_challenge_keeps_a_single_active_code() {
        let store = InMemoryStore::new();
        let id = email("otp@example.com");
        let base = OtpChallenge {
            token: "t1".into(),
            identifier: id.clone(),
            code: "111111".into(),
            attempts: 0,
            expires_at: Utc::now() + chrono::Duration::seconds(300),
            created_at: Utc::now(),
        };
        store.put_challenge(base.clone()).await.unwrap();
        store
            .put_challenge(OtpChallenge {
                token: "t2".into(),
                code: "222222".into(),
                ..base
            })
            .await
            .unwrap();

        assert!(store.challenge_by_token("t1").await.unwrap().is_none());
        assert!(store.challenge_by_token("t2").await.unwrap().is_some());
    }
}
