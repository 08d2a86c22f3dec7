use ocn_identity::Did;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

pub const MAX_AUTHORITY_NAME_LEN: usize = 15;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid signing authority name: {0}")]
pub struct InvalidAuthorityName(pub String);

/// Signing-authority names are profile-scoped handles: at most 15
/// characters from `[a-z0-9-]`.
///
/// Shared by the registry and the HTTP handlers so SDK-level and
/// route-level validation cannot drift.
pub fn validate_authority_name(name: &str) -> Result<(), InvalidAuthorityName> {
    if name.is_empty() {
        return Err(InvalidAuthorityName("name is empty".into()));
    }
    if name.len() > MAX_AUTHORITY_NAME_LEN {
        return Err(InvalidAuthorityName(format!(
            "name exceeds {} characters",
            MAX_AUTHORITY_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(InvalidAuthorityName(
            "name may only contain lowercase letters, digits, and hyphens".into(),
        ));
    }
    Ok(())
}

/// The endpoint half of a registration, shared across profiles that
/// registered the same authority service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SigningAuthorityEndpoint {
    #[schema(value_type = String, example = "https://sa.example.com")]
    pub endpoint: Url,
}

/// The profile-scoped half: the handle, the authority's DID, and the
/// optional distinct owner DID (an application identity issuing on the
/// profile's behalf).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SigningAuthorityRelationship {
    pub name: String,
    #[schema(value_type = String)]
    pub did: Did,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub owner_did: Option<Did>,
    pub is_primary: bool,
}

/// Combined wire shape returned by listing/lookup routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredSigningAuthority {
    pub signing_authority: SigningAuthorityEndpoint,
    pub relationship: SigningAuthorityRelationship,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_pass() {
        assert!(validate_authority_name("valid-name-123").is_ok());
        assert!(validate_authority_name("a").is_ok());
        assert!(validate_authority_name("exactly-15-char").is_ok());
    }

    #[test]
    fn invalid_names_are_rejected_with_the_offending_rule() {
        assert!(validate_authority_name("").is_err());
        assert!(validate_authority_name("MySignAuth").is_err());
        assert!(validate_authority_name("under_score").is_err());
        assert!(validate_authority_name("dotted.name").is_err());
        assert!(validate_authority_name("with space").is_err());
        assert!(validate_authority_name("sixteen-chars-xx").is_err());
    }
}
