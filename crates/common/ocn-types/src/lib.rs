//! OCN Types – shared domain records for the Open Credential Network.
//!
//! Profiles and management edges, contact methods, signing-authority
//! registrations, activity-ledger rows, invites, and inbox issuances.
//! These are the wire bodies of the plexus service, so OpenAPI schemas
//! are derived here.

#![forbid(unsafe_code)]

mod activity;
mod authority;
mod contact;
mod inbox;
mod invite;
mod profile;

pub use activity::{
    Activity, ActivityEventType, ActivityMetadata, ActivityPage, ActivityQuery,
    ActivityRecipientType, ActivitySource, ActivityStats,
};
pub use authority::{
    validate_authority_name, InvalidAuthorityName, RegisteredSigningAuthority,
    SigningAuthorityEndpoint, SigningAuthorityRelationship, MAX_AUTHORITY_NAME_LEN,
};
pub use contact::{ContactIdentifier, ContactMethod, ContactMethodType};
pub use inbox::{InboxIssuance, InboxIssuanceStatus};
pub use invite::Invite;
pub use profile::{
    validate_app_slug, AppIdentity, AppListingStatus, Connection, EdgeKind, InvalidAppSlug,
    ManagementEdge, Profile, ProfileRole,
};
