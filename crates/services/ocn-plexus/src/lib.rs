//! Plexus: the Open Credential Network service.
//!
//! Identity graph and DID resolution, signing-authority issuance,
//! contact-method verification, the unified send/claim/accept pipeline,
//! and the activity ledger, exposed over one HTTP surface.

pub mod activity_handlers;
pub mod app;
pub mod auth;
pub mod authority;
pub mod config;
pub mod contact;
pub mod contact_handlers;
pub mod delivery;
pub mod error;
pub mod exchange;
pub mod exchange_handlers;
pub mod graph;
pub mod handlers;
pub mod inbox;
pub mod invites;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod resolver;
pub mod send;
pub mod state;
pub mod store;
pub mod templating;
