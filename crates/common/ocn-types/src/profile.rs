use chrono::{DateTime, Utc};
use ocn_identity::Did;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use utoipa::ToSchema;

/// A network participant. Managers are profiles too, distinguished by
/// role only; both live in the same store and resolve the same way.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Human-assigned unique slug.
    #[schema(example = "alice")]
    pub profile_id: String,
    /// Derived from key material at creation; never changes.
    #[schema(value_type = String, example = "did:key:z6MkpTHR8VNsBxYAAWHut2Geadd9jSwupk8vQT7GNz2wVXgE")]
    pub did: Did,
    #[schema(example = "Alice Example")]
    pub display_name: String,
    pub role: ProfileRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProfileRole {
    Member,
    Manager,
}

/// An application identity resolvable at `did:web:<domain>:app:<slug>`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppIdentity {
    #[schema(example = "course-portal")]
    pub slug: String,
    #[schema(value_type = String)]
    pub did: Did,
    pub display_name: String,
    pub status: AppListingStatus,
    pub created_at: DateTime<Utc>,
}

/// DRAFT listings still resolve; dev-mode resolution is intentional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AppListingStatus {
    Draft,
    Live,
}

/// Directed delegation edge in the identity graph. Additive; there is no
/// deletion API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementEdge {
    #[schema(value_type = String)]
    pub manager: Did,
    #[schema(value_type = String)]
    pub managed: Did,
    pub kind: EdgeKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EdgeKind {
    /// Profile-to-profile or manager-to-managed.
    Manages,
    /// Administrator-to-profile-manager.
    Administrates,
}

/// A mutual connection between two profiles, created by invite
/// consumption.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub profile_id: String,
    pub other_profile_id: String,
    pub created_at: DateTime<Utc>,
}

pub const MAX_APP_SLUG_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid application slug: {0}")]
pub struct InvalidAppSlug(pub String);

/// Validate an application slug before it is ever used in a lookup.
///
/// Lowercase letters, digits, and hyphens only; no dots, slashes, or
/// control characters, so a slug can never escape into a path.
pub fn validate_app_slug(slug: &str) -> Result<(), InvalidAppSlug> {
    if slug.is_empty() {
        return Err(InvalidAppSlug("slug is empty".into()));
    }
    if slug.len() > MAX_APP_SLUG_LEN {
        return Err(InvalidAppSlug(format!(
            "slug exceeds {} characters",
            MAX_APP_SLUG_LEN
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(InvalidAppSlug(
            "slug may only contain lowercase letters, digits, and hyphens".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation_blocks_traversal_and_control_characters() {
        assert!(validate_app_slug("course-portal").is_ok());
        assert!(validate_app_slug("a1-b2").is_ok());

        assert!(validate_app_slug("").is_err());
        assert!(validate_app_slug("../../etc/passwd").is_err());
        assert!(validate_app_slug("UpperCase").is_err());
        assert!(validate_app_slug("with.dot").is_err());
        assert!(validate_app_slug("with/slash").is_err());
        assert!(validate_app_slug("nul\u{0}byte").is_err());
        assert!(validate_app_slug(&"x".repeat(MAX_APP_SLUG_LEN + 1)).is_err());
    }

    #[test]
    fn enums_serialize_with_their_wire_names() {
        assert_eq!(
            serde_json::to_string(&ProfileRole::Manager).unwrap(),
            "\"manager\""
        );
        assert_eq!(
            serde_json::to_string(&AppListingStatus::Draft).unwrap(),
            "\"DRAFT\""
        );
        assert_eq!(
            serde_json::to_string(&EdgeKind::Administrates).unwrap(),
            "\"administrates\""
        );
    }
}
