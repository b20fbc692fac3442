//! Ticket lifecycle state machine.
//!
//! The legal moves live in a [`TransitionTable`] built once at startup and
//! shared by reference; nothing mutates it afterwards. [`LifecycleStateMachine`]
//! is the only path that writes a ticket status.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{Ticket, TicketStatus};
use crate::store::StoreTx;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    allowed: HashMap<TicketStatus, HashSet<TicketStatus>>,
}

impl TransitionTable {
    pub fn new<I>(transitions: I) -> Self
    where
        I: IntoIterator<Item = (TicketStatus, TicketStatus)>,
    {
        let mut allowed: HashMap<TicketStatus, HashSet<TicketStatus>> = HashMap::new();
        for (from, to) in transitions {
            allowed.entry(from).or_default().insert(to);
        }
        Self { allowed }
    }

    /// The production ticket lifecycle. `used`, `cancelled` and `refunded` are terminal.
    pub fn standard() -> Self {
        use TicketStatus::*;

        Self::new([
            (Available, Reserved),
            (Available, Sold),
            (Available, Cancelled),
            (Reserved, Sold),
            (Reserved, Available),
            (Reserved, Cancelled),
            (Sold, Used),
            (Sold, Cancelled),
            (Sold, Transferred),
            (Sold, Refunded),
            (Transferred, Used),
        ])
    }

    pub fn can_transition(&self, from: TicketStatus, to: TicketStatus) -> bool {
        self.allowed
            .get(&from)
            .map_or(false, |targets| targets.contains(&to))
    }

    /// Destinations reachable from `from`, in declaration order of [`TicketStatus::ALL`].
    pub fn destinations(&self, from: TicketStatus) -> Vec<TicketStatus> {
        TicketStatus::ALL
            .into_iter()
            .filter(|to| self.can_transition(from, *to))
            .collect()
    }

    pub fn is_terminal(&self, status: TicketStatus) -> bool {
        self.destinations(status).is_empty()
    }
}

pub struct LifecycleStateMachine {
    table: Arc<TransitionTable>,
    clock: Arc<dyn Clock>,
}

impl LifecycleStateMachine {
    pub fn new(table: Arc<TransitionTable>, clock: Arc<dyn Clock>) -> Self {
        Self { table, clock }
    }

    pub fn can_transition(&self, from: TicketStatus, to: TicketStatus) -> bool {
        self.table.can_transition(from, to)
    }

    /// Moves a ticket to `to` inside `tx`, rejecting moves the table does not allow.
    #[instrument(skip(self, tx))]
    pub async fn apply(
        &self,
        tx: &mut dyn StoreTx,
        ticket_id: Uuid,
        to: TicketStatus,
    ) -> Result<Ticket, AppError> {
        let ticket = tx
            .load_ticket_for_update(ticket_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket '{}' was not found", ticket_id)))?;

        let from = ticket.status;
        if !self.can_transition(from, to) {
            return Err(AppError::InvalidTransition(format!(
                "Ticket cannot move from '{}' to '{}'",
                from, to
            )));
        }

        let now = self.clock.now();
        let used_at = (to == TicketStatus::Used).then_some(now);
        let updated = tx
            .update_ticket_status(ticket.id, to, now, used_at)
            .await?;

        info!(%ticket_id, %from, %to, "Ticket status changed");
        Ok(updated)
    }
}
