use axum::routing::{get, patch, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer, Config};
use crate::handlers::{get_ticket, health_check, purchase_tickets, update_ticket_status};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route("/tickets", post(purchase_tickets))
        .route("/tickets/:ticket_id", get(get_ticket))
        .route("/tickets/:ticket_id/status", patch(update_ticket_status));

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .with_state(state);

    apply_security_headers(router, config.production).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(create_cors_layer(&config.cors_allowed_origins)),
    )
}
