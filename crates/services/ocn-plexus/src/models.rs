//! Request and response bodies for the HTTP surface.
//!
//! Domain types from `ocn-types` are returned directly where they fit;
//! these are just the wire-only shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use ocn_identity::Did;
use ocn_types::{AppListingStatus, ContactMethodType, EdgeKind, ProfileRole};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub profile_id: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<ProfileRole>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddEdgeRequest {
    /// Profile id or DID of the managed party.
    pub managed: String,
    #[serde(default)]
    pub kind: Option<EdgeKind>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddManagerRequest {
    /// Profile id or DID of the managing party.
    pub manager: String,
    #[serde(default)]
    pub kind: Option<EdgeKind>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAppRequest {
    pub slug: String,
    pub display_name: String,
    /// The application's own DID; defaults to the caller's.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub did: Option<Did>,
    #[serde(default)]
    pub status: Option<AppListingStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddContactMethodRequest {
    #[serde(rename = "type")]
    pub method_type: ContactMethodType,
    pub value: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    #[serde(rename = "type")]
    pub method_type: ContactMethodType,
    pub value: String,
    pub publishable_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContactRequest {
    pub token: String,
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub token: String,
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyWithCredentialRequest {
    /// A signed verifiable presentation from a login provider.
    pub presentation: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactMethodIdRequest {
    pub contact_method_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAuthorityRequest {
    #[schema(value_type = String, example = "https://authority.example.com")]
    pub endpoint: url::Url,
    pub name: String,
    #[schema(value_type = String)]
    pub did: Did,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub owner_did: Option<Did>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetPrimaryAuthorityRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    /// Unsigned credential content to sign with the primary authority.
    pub credential: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCredentialRequest {
    /// A signed credential as produced by issuance.
    pub credential: Value,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCredentialResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptCredentialRequest {
    pub uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateInviteRequest {
    /// Seconds until expiry; 0 means never.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_uses: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// The inviting profile.
    pub profile_id: String,
    pub challenge: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvalidatedResponse {
    pub removed: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct InboxQuery {
    #[serde(default)]
    pub status: Option<ocn_types::InboxIssuanceStatus>,
}
