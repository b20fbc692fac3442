use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::allocation::AllocationRequest;
use crate::models::TicketDetails;
use crate::state::AppState;
use crate::status::StatusUpdateRequest;
use crate::utils::error::AppError;
use crate::utils::extract::ApiJson;
use crate::utils::response::{created, empty_success, success};
use crate::utils::validation::parse_public_id;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "agora-tickets",
    };

    success(payload, "Health check successful")
}

async fn load_ticket(state: &AppState, ticket_id: Uuid) -> Result<TicketDetails, AppError> {
    state
        .store
        .find_ticket_details(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket '{}' was not found", ticket_id)))
}

pub async fn purchase_tickets(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AllocationRequest>,
) -> Result<Response, AppError> {
    let ticket_id = state.allocation.create_tickets(&request).await?;

    // Read-after-write for display; not part of the allocation transaction.
    let ticket = load_ticket(&state, ticket_id).await?;

    Ok(created(ticket, "Tickets purchased successfully"))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
) -> Result<Response, AppError> {
    let ticket_id = parse_public_id("ticket_id", &ticket_id)?;
    let ticket = load_ticket(&state, ticket_id).await?;

    Ok(success(ticket, "Ticket retrieved successfully"))
}

pub async fn update_ticket_status(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    ApiJson(request): ApiJson<StatusUpdateRequest>,
) -> Result<Response, AppError> {
    let ticket = state
        .status
        .update_status(&ticket_id, &request.status)
        .await?;

    Ok(empty_success(format!(
        "Ticket status updated to '{}'",
        ticket.status
    )))
}
