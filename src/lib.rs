pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod utils;
pub mod validation;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::GatewayClient;
use crate::ports::TransactionRepository;
use crate::services::{PaymentInitiator, Reconciler};
use crate::validation::Validator;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn TransactionRepository>,
    pub validator: Validator,
    pub initiator: PaymentInitiator,
    pub reconciler: Reconciler,
    pub log_request_body: bool,
}

impl AppState {
    pub fn new(config: &Config, repository: Arc<dyn TransactionRepository>) -> anyhow::Result<Self> {
        let gateway_config = Arc::new(config.gateway.clone());
        let gateway =
            GatewayClient::new(&gateway_config).context("failed to build gateway HTTP client")?;
        let utc_offset = FixedOffset::east_opt(config.ack_utc_offset_seconds)
            .context("ACK_UTC_OFFSET_SECONDS is out of range")?;

        Ok(AppState {
            initiator: PaymentInitiator::new(Arc::clone(&repository), gateway, gateway_config),
            reconciler: Reconciler::new(Arc::clone(&repository), utc_offset),
            validator: Validator::new(config.reference_field.clone()),
            log_request_body: config.log_request_body,
            repository,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let payments = Router::new()
        .route(
            "/payment/initiate",
            post(handlers::payment::initiate).fallback(handlers::method_not_supported),
        )
        .route(
            "/payment/confirm",
            post(handlers::payment::confirm).fallback(handlers::method_not_supported),
        )
        .route(
            "/payment/timeout",
            post(handlers::payment::timeout).fallback(handlers::method_not_supported),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1.0", payments)
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_logger_middleware,
        ))
        .with_state(state)
}
