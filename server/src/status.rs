use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time;
use tracing::{instrument, warn};

use crate::lifecycle::LifecycleStateMachine;
use crate::models::{Ticket, TicketStatus};
use crate::store::{StoreTx, TicketStore};
use crate::utils::error::AppError;
use crate::utils::validation::parse_public_id;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// Applies a single status change to an existing ticket.
pub struct StatusTransitionService {
    store: Arc<dyn TicketStore>,
    machine: LifecycleStateMachine,
    timeout: Duration,
}

impl StatusTransitionService {
    pub fn new(store: Arc<dyn TicketStore>, machine: LifecycleStateMachine, timeout: Duration) -> Self {
        Self {
            store,
            machine,
            timeout,
        }
    }

    pub async fn update_status(&self, ticket_id: &str, new_status: &str) -> Result<Ticket, AppError> {
        let staged = time::timeout(self.timeout, self.transition(ticket_id, new_status)).await;
        let (tx, ticket) = staged.unwrap_or_else(|_| {
            Err(AppError::Timeout(format!(
                "Status update did not complete within {}ms",
                self.timeout.as_millis()
            )))
        })?;

        // Not raced against the deadline: once COMMIT is sent its outcome is what the caller gets.
        tx.commit().await?;
        Ok(ticket)
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        ticket_id: &str,
        new_status: &str,
    ) -> Result<(Box<dyn StoreTx>, Ticket), AppError> {
        let ticket_id = parse_public_id("ticket_id", ticket_id)?;
        let status = new_status.parse::<TicketStatus>()?;

        let mut tx = self.store.begin().await?;
        match self.machine.apply(tx.as_mut(), ticket_id, status).await {
            Ok(ticket) => Ok((tx, ticket)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after rejected status change did not complete");
                }
                Err(err)
            }
        }
    }
}
