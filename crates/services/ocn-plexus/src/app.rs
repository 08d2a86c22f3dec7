//! Router assembly and OpenAPI documentation.

use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::activity_handlers::{
    activity_stats_handler, connect_handler, generate_invite_handler, get_activity_handler,
    inbox_handler, invalidate_invite_handler, list_activities_handler, list_connections_handler,
    list_invites_handler,
};
use crate::contact_handlers::{
    add_contact_method_handler, challenge_handler, list_contact_methods_handler,
    remove_contact_method_handler, session_handler, set_primary_contact_handler,
    verify_contact_handler, verify_with_credential_handler,
};
use crate::error::ApiError;
use crate::exchange_handlers::participate_exchange_handler;
use crate::handlers::{
    accept_credential_handler, add_managed_handler, add_manager_handler, app_did_document_handler,
    create_profile_handler, get_own_profile_handler, get_profile_handler, health_handler,
    incoming_handler, issue_credential_handler, list_authorities_handler, register_app_handler,
    register_authority_handler, root_did_document_handler, send_handler,
    set_primary_authority_handler, user_did_document_handler, verify_credential_handler,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health_handler,
        crate::handlers::root_did_document_handler,
        crate::handlers::user_did_document_handler,
        crate::handlers::app_did_document_handler,
        crate::handlers::create_profile_handler,
        crate::handlers::get_own_profile_handler,
        crate::handlers::get_profile_handler,
        crate::handlers::add_managed_handler,
        crate::handlers::add_manager_handler,
        crate::handlers::register_app_handler,
        crate::handlers::register_authority_handler,
        crate::handlers::list_authorities_handler,
        crate::handlers::set_primary_authority_handler,
        crate::handlers::send_handler,
        crate::handlers::issue_credential_handler,
        crate::handlers::verify_credential_handler,
        crate::handlers::accept_credential_handler,
        crate::handlers::incoming_handler,
        crate::contact_handlers::list_contact_methods_handler,
        crate::contact_handlers::add_contact_method_handler,
        crate::contact_handlers::challenge_handler,
        crate::contact_handlers::verify_contact_handler,
        crate::contact_handlers::verify_with_credential_handler,
        crate::contact_handlers::session_handler,
        crate::contact_handlers::set_primary_contact_handler,
        crate::contact_handlers::remove_contact_method_handler,
        crate::exchange_handlers::participate_exchange_handler,
        crate::activity_handlers::list_activities_handler,
        crate::activity_handlers::activity_stats_handler,
        crate::activity_handlers::get_activity_handler,
        crate::activity_handlers::inbox_handler,
        crate::activity_handlers::generate_invite_handler,
        crate::activity_handlers::list_invites_handler,
        crate::activity_handlers::invalidate_invite_handler,
        crate::activity_handlers::connect_handler,
        crate::activity_handlers::list_connections_handler
    ),
    components(
        schemas(
            ocn_types::Profile, ocn_types::ProfileRole, ocn_types::AppIdentity,
            ocn_types::AppListingStatus, ocn_types::EdgeKind, ocn_types::Connection,
            ocn_types::ContactMethod, ocn_types::ContactMethodType,
            ocn_types::RegisteredSigningAuthority, ocn_types::SigningAuthorityEndpoint,
            ocn_types::SigningAuthorityRelationship,
            ocn_types::Activity, ocn_types::ActivityEventType, ocn_types::ActivitySource,
            ocn_types::ActivityRecipientType, ocn_types::ActivityMetadata,
            ocn_types::ActivityPage, ocn_types::ActivityStats,
            ocn_types::Invite, ocn_types::InboxIssuance, ocn_types::InboxIssuanceStatus,
            crate::store::IncomingCredential,
            crate::contact::ContactMethodSession,
            crate::send::SendRequest, crate::send::SendOutcome,
            crate::models::CreateProfileRequest, crate::models::AddEdgeRequest,
            crate::models::AddManagerRequest, crate::models::RegisterAppRequest,
            crate::models::AddContactMethodRequest, crate::models::ChallengeRequest,
            crate::models::ChallengeResponse, crate::models::VerifyContactRequest,
            crate::models::SessionRequest, crate::models::VerifyWithCredentialRequest,
            crate::models::ContactMethodIdRequest, crate::models::RegisterAuthorityRequest,
            crate::models::SetPrimaryAuthorityRequest, crate::models::IssueRequest,
            crate::models::VerifyCredentialRequest, crate::models::VerifyCredentialResponse,
            crate::models::AcceptCredentialRequest, crate::models::GenerateInviteRequest,
            crate::models::ConnectRequest, crate::models::InvalidatedResponse,
            ApiError
        )
    ),
    tags(
        (name = "Plexus API", description = "Open Credential Network identity and exchange API")
    )
)]
struct ApiDoc;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_handler))
        .route("/.well-known/did.json", get(root_did_document_handler))
        .route("/users/:profile_id/did.json", get(user_did_document_handler))
        .route("/app/:slug/did.json", get(app_did_document_handler))
        .route(
            "/profile",
            get(get_own_profile_handler).post(create_profile_handler),
        )
        .route("/profile/:profile_id", get(get_profile_handler))
        .route("/profile/manage", post(add_managed_handler))
        .route("/profile/manager", post(add_manager_handler))
        .route("/apps", post(register_app_handler))
        .route(
            "/profile/contact-methods",
            get(list_contact_methods_handler),
        )
        .route(
            "/profile/contact-methods/add",
            post(add_contact_method_handler),
        )
        .route("/profile/contact-methods/verify", post(verify_contact_handler))
        .route(
            "/profile/contact-methods/verify-with-credential",
            post(verify_with_credential_handler),
        )
        .route(
            "/profile/contact-methods/set-primary",
            post(set_primary_contact_handler),
        )
        .route(
            "/profile/contact-methods/remove",
            post(remove_contact_method_handler),
        )
        .route("/contact-methods/challenge", post(challenge_handler))
        .route("/contact-methods/session", post(session_handler))
        .route(
            "/api/profile/signing-authority/register",
            post(register_authority_handler),
        )
        .route(
            "/api/profile/signing-authorities",
            get(list_authorities_handler),
        )
        .route(
            "/api/profile/signing-authority/set-primary",
            post(set_primary_authority_handler),
        )
        .route("/api/send", post(send_handler))
        .route("/api/credential/issue", post(issue_credential_handler))
        .route("/api/credential/verify", post(verify_credential_handler))
        .route("/api/credential/accept", post(accept_credential_handler))
        .route("/profile/incoming", get(incoming_handler))
        .route("/profile/inbox", get(inbox_handler))
        .route("/profile/activities", get(list_activities_handler))
        .route("/profile/activities/stats", get(activity_stats_handler))
        .route("/profile/activities/:activity_id", get(get_activity_handler))
        .route("/profile/invite", post(generate_invite_handler))
        .route("/profile/invites", get(list_invites_handler))
        .route(
            "/profile/invites/:challenge",
            delete(invalidate_invite_handler),
        )
        .route("/profile/connect", post(connect_handler))
        .route("/profile/connections", get(list_connections_handler))
        .route(
            "/api/workflows/:workflow_id/exchanges/:exchange_id",
            post(participate_exchange_handler),
        )
        .layer(Extension(state.jwt.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
