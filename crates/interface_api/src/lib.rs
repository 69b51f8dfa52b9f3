//! HTTP API Layer
//!
//! This crate provides the HTTP surface of the Salesforce connector using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: record feeds and writes, value sets, CRM passthrough
//! - **Middleware**: basic-auth credentials, tracing, audit logging
//! - **Error Handling**: CRM failures relayed with the CRM's status
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(sync, config);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{any, get},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_sync::SharedSyncService;

use crate::config::ConnectorConfig;
use crate::handlers::{datatypes, health, passthrough, valuesets};
use crate::middleware::{audit_middleware, credentials_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sync: SharedSyncService,
    pub config: ConnectorConfig,
}

/// Creates the connector router
///
/// # Arguments
///
/// * `sync` - The sync service owning the CRM session and schema cache
/// * `config` - Connector configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(sync: SharedSyncService, config: ConnectorConfig) -> Router {
    let state = AppState { sync, config };

    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(health::health_check));

    // Value set routes
    let value_set_routes = Router::new()
        .route(
            "/ValueSet",
            get(valuesets::list_value_sets).post(valuesets::update_value_sets),
        )
        .route(
            "/ValueSet/",
            get(valuesets::list_value_sets).post(valuesets::update_value_sets),
        )
        .route(
            "/ValueSet/CustomField/:id",
            get(valuesets::get_custom_field).post(valuesets::update_custom_field),
        )
        .route(
            "/ValueSet/GlobalValueSet/:id",
            get(valuesets::get_global_value_set).post(valuesets::update_global_value_set),
        )
        .route(
            "/ValueSet/SesamAlias/:alias",
            get(valuesets::get_by_alias).post(valuesets::update_by_alias),
        );

    // Passthrough routes
    let passthrough_routes = Router::new()
        .route("/sf/tooling/*path", any(passthrough::tooling))
        .route(
            "/sf/rest/*path",
            get(passthrough::rest)
                .post(passthrough::rest)
                .patch(passthrough::rest)
                .delete(passthrough::rest),
        );

    // Record routes
    let record_routes = Router::new()
        .route(
            "/:datatype",
            get(datatypes::list_records)
                .post(datatypes::write_records)
                .put(datatypes::write_records)
                .patch(datatypes::write_records)
                .delete(datatypes::write_records),
        )
        .route(
            "/:datatype/:id",
            get(datatypes::get_record)
                .post(datatypes::write_record)
                .put(datatypes::write_record)
                .patch(datatypes::write_record)
                .delete(datatypes::write_record),
        )
        .route(
            "/:datatype/:ext_field/:ext_value",
            get(datatypes::get_record_by_external_id)
                .post(datatypes::write_record_by_external_id)
                .put(datatypes::write_record_by_external_id)
                .patch(datatypes::write_record_by_external_id)
                .delete(datatypes::write_record_by_external_id),
        );

    // Authenticated routes
    let connector_routes = Router::new()
        .merge(value_set_routes)
        .merge(passthrough_routes)
        .merge(record_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), credentials_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(connector_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
