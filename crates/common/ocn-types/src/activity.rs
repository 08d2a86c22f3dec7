use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityEventType {
    Created,
    Delivered,
    Claimed,
    Expired,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ActivitySource {
    Send,
    SendBoost,
    SendCredential,
    Claim,
    ClaimLink,
    Inbox,
    AcceptCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActivityRecipientType {
    Profile,
    Email,
    Phone,
}

/// Closed metadata variant; only failure context is ever recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActivityMetadata {
    #[serde(rename_all = "camelCase")]
    FailureReason { reason: String },
}

/// One lifecycle event row. A transaction is the chain of rows sharing
/// an `activity_id`; each row keeps its own `id`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub activity_id: String,
    pub event_type: ActivityEventType,
    pub source: ActivitySource,
    pub recipient_type: ActivityRecipientType,
    pub recipient_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,
    pub actor_profile_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ActivityMetadata>,
}

impl Activity {
    /// A fresh row for a new transaction; callers pick the origin event
    /// type (DELIVERED in-network, CREATED out-of-network).
    #[allow(clippy::too_many_arguments)]
    pub fn origin(
        event_type: ActivityEventType,
        source: ActivitySource,
        recipient_type: ActivityRecipientType,
        recipient_identifier: impl Into<String>,
        actor_profile_id: impl Into<String>,
        boost_uri: Option<String>,
        integration_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            activity_id: Uuid::new_v4().to_string(),
            event_type,
            source,
            recipient_type,
            recipient_identifier: recipient_identifier.into(),
            boost_uri,
            integration_id,
            actor_profile_id: actor_profile_id.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// A follow-up row in the same transaction: fresh `id`, same
    /// `activity_id`, routing fields copied from this row.
    pub fn chained(&self, event_type: ActivityEventType, metadata: Option<ActivityMetadata>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            activity_id: self.activity_id.clone(),
            event_type,
            source: self.source,
            recipient_type: self.recipient_type,
            recipient_identifier: self.recipient_identifier.clone(),
            boost_uri: self.boost_uri.clone(),
            integration_id: self.integration_id.clone(),
            actor_profile_id: self.actor_profile_id.clone(),
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Derived aggregates, recomputed from the live event set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total: u64,
    pub created: u64,
    pub delivered: u64,
    pub claimed: u64,
    pub expired: u64,
    pub failed: u64,
    /// `claimed / delivered * 100`, two decimals; 0 with no deliveries.
    pub claim_rate: f64,
}

/// Filters plus a strictly-descending timestamp cursor.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    /// Restrict to these boost URIs (comma-separated on the wire).
    pub boost_uri: Option<String>,
    pub integration_id: Option<String>,
    pub event_type: Option<ActivityEventType>,
    /// Resume strictly before this timestamp.
    pub cursor: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl ActivityQuery {
    pub fn boost_uris(&self) -> Option<Vec<&str>> {
        self.boost_uri
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub records: Vec<Activity>,
    /// Timestamp of the last record; pass back as `cursor` to resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<DateTime<Utc>>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_rows_share_the_activity_id_but_not_the_row_id() {
        let origin = Activity::origin(
            ActivityEventType::Delivered,
            ActivitySource::Send,
            ActivityRecipientType::Profile,
            "bob",
            "alice",
            Some("ocn:boost:1".into()),
            None,
        );
        let claimed = origin.chained(ActivityEventType::Claimed, None);

        assert_eq!(claimed.activity_id, origin.activity_id);
        assert_ne!(claimed.id, origin.id);
        assert_eq!(claimed.boost_uri, origin.boost_uri);
        assert_eq!(claimed.recipient_identifier, "bob");
        assert!(claimed.timestamp >= origin.timestamp);
    }

    #[test]
    fn event_types_use_screaming_wire_names() {
        assert_eq!(
            serde_json::to_string(&ActivityEventType::Delivered).unwrap(),
            "\"DELIVERED\""
        );
        assert_eq!(
            serde_json::to_string(&ActivitySource::SendBoost).unwrap(),
            "\"sendBoost\""
        );
    }

    #[test]
    fn failure_metadata_is_tagged() {
        let meta = ActivityMetadata::FailureReason {
            reason: "signing authority unreachable".into(),
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["kind"], "failureReason");
        assert_eq!(value["reason"], "signing authority unreachable");
    }
}
