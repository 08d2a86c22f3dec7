//! Append-only activity ledger.
//!
//! Every send transaction gets one origin row; later events chain onto
//! it by reusing the activity id while each row keeps its own id. Reads
//! are actor-scoped and paginated by a strictly-descending timestamp
//! cursor.

use std::sync::Arc;

use crate::error::ApiError;
use crate::store::ActivityStore;
use ocn_types::{Activity, ActivityEventType, ActivityMetadata, ActivityPage, ActivityQuery,
    ActivityStats};

const DEFAULT_PAGE_SIZE: usize = 25;
const MAX_PAGE_SIZE: usize = 100;

pub struct ActivityLedger {
    store: Arc<dyn ActivityStore>,
}

impl ActivityLedger {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, activity: Activity) -> Result<Activity, ApiError> {
        self.store.append(activity.clone()).await?;
        Ok(activity)
    }

    /// Append a follow-up event to an existing transaction. Routing
    /// fields are copied from the origin row.
    pub async fn chain(
        &self,
        activity_id: &str,
        event_type: ActivityEventType,
        metadata: Option<ActivityMetadata>,
    ) -> Result<Activity, ApiError> {
        let rows = self.store.by_activity_id(activity_id).await?;
        let origin = rows
            .first()
            .ok_or_else(|| ApiError::NotFound(format!("activity: {}", activity_id)))?;
        let next = origin.chained(event_type, metadata);
        self.store.append(next.clone()).await?;
        Ok(next)
    }

    /// The most recent row of one transaction, visible only to its
    /// actor.
    pub async fn latest(&self, actor_profile_id: &str, activity_id: &str) -> Result<Activity, ApiError> {
        let rows = self.store.by_activity_id(activity_id).await?;
        match rows.last() {
            Some(row) if row.actor_profile_id == actor_profile_id => Ok(row.clone()),
            _ => Err(ApiError::NotFound(format!("activity: {}", activity_id))),
        }
    }

    pub async fn list(
        &self,
        actor_profile_id: &str,
        query: &ActivityQuery,
    ) -> Result<ActivityPage, ApiError> {
        let limit = query
            .limit
            .map(|l| (l as usize).min(MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let mut records = self.store.query(actor_profile_id, query).await?;
        let has_more = records.len() > limit;
        records.truncate(limit);
        let cursor = records.last().map(|r| r.timestamp);

        Ok(ActivityPage {
            records,
            cursor,
            has_more,
        })
    }

    /// Aggregate counts over every row matching the filters. The cursor
    /// and limit are ignored so the rates cover the whole history.
    pub async fn stats(
        &self,
        actor_profile_id: &str,
        query: &ActivityQuery,
    ) -> Result<ActivityStats, ApiError> {
        let unbounded = ActivityQuery {
            cursor: None,
            limit: None,
            ..query.clone()
        };
        let rows = self.store.query(actor_profile_id, &unbounded).await?;

        let mut stats = ActivityStats {
            total: rows.len() as u64,
            created: 0,
            delivered: 0,
            claimed: 0,
            expired: 0,
            failed: 0,
            claim_rate: 0.0,
        };
        for row in &rows {
            match row.event_type {
                ActivityEventType::Created => stats.created += 1,
                ActivityEventType::Delivered => stats.delivered += 1,
                ActivityEventType::Claimed => stats.claimed += 1,
                ActivityEventType::Expired => stats.expired += 1,
                ActivityEventType::Failed => stats.failed += 1,
            }
        }
        if stats.delivered > 0 {
            let rate = stats.claimed as f64 / stats.delivered as f64 * 100.0;
            stats.claim_rate = (rate * 100.0).round() / 100.0;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use ocn_types::{ActivityRecipientType, ActivitySource};

    fn ledger() -> ActivityLedger {
        ActivityLedger::new(Arc::new(InMemoryStore::new()))
    }

    fn origin(actor: &str) -> Activity {
        Activity::origin(
            ActivityEventType::Delivered,
            ActivitySource::Send,
            ActivityRecipientType::Profile,
            "bob",
            actor,
            Some("ocn:boost:1".into()),
            None,
        )
    }

    #[tokio::test]
    async fn chained_events_keep_the_transaction_id() {
        let ledger = ledger();
        let first = ledger.record(origin("alice")).await.unwrap();
        let claimed = ledger
            .chain(&first.activity_id, ActivityEventType::Claimed, None)
            .await
            .unwrap();

        assert_eq!(claimed.activity_id, first.activity_id);
        assert_ne!(claimed.id, first.id);
        assert_eq!(
            ledger.latest("alice", &first.activity_id).await.unwrap().event_type,
            ActivityEventType::Claimed
        );
    }

    #[tokio::test]
    async fn latest_is_actor_scoped() {
        let ledger = ledger();
        let row = ledger.record(origin("alice")).await.unwrap();
        assert!(matches!(
            ledger.latest("mallory", &row.activity_id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pages_descend_and_carry_a_resume_cursor() {
        let ledger = ledger();
        for _ in 0..5 {
            ledger.record(origin("alice")).await.unwrap();
        }

        let query = ActivityQuery {
            limit: Some(2),
            ..Default::default()
        };
        let page = ledger.list("alice", &query).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more);
        assert!(page.records[0].timestamp >= page.records[1].timestamp);

        let next = ledger
            .list(
                "alice",
                &ActivityQuery {
                    cursor: page.cursor,
                    ..query
                },
            )
            .await
            .unwrap();
        assert!(next.records.iter().all(|r| Some(r.timestamp) < page.cursor));
    }

    #[tokio::test]
    async fn claim_rate_is_derived_from_delivered_and_claimed() {
        let ledger = ledger();
        let a = ledger.record(origin("alice")).await.unwrap();
        ledger.record(origin("alice")).await.unwrap();
        ledger.record(origin("alice")).await.unwrap();
        ledger
            .chain(&a.activity_id, ActivityEventType::Claimed, None)
            .await
            .unwrap();

        let stats = ledger.stats("alice", &ActivityQuery::default()).await.unwrap();
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.claimed, 1);
        assert!((stats.claim_rate - 33.33).abs() < f64::EPSILON);

        let empty = ledger.stats("nobody", &ActivityQuery::default()).await.unwrap();
        assert_eq!(empty.claim_rate, 0.0);
    }
}
