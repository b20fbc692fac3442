//! Allocation coordinator: turns a purchase request into issued tickets.
//!
//! References are resolved and validated first. The capacity check, the
//! ticket inserts and the counter increment then run in one store
//! transaction, so a request either issues every ticket it asked for or
//! leaves no trace. A transaction aborted by contention is retried a bounded
//! number of times. Everything up to the commit is bound by the configured
//! deadline; a commit that has started is allowed to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{self, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codes::CodeGenerator;
use crate::config::Config;
use crate::ledger::CapacityLedger;
use crate::models::{Category, Customer, Event, NewTicket, User};
use crate::store::{StoreTx, TicketStore};
use crate::utils::error::AppError;
use crate::utils::validation::parse_public_id;

pub const MAX_QUANTITY_PER_REQUEST: i32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationRequest {
    pub event_id: String,
    pub category_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct AllocationSettings {
    /// Extra attempts after a `ConcurrencyConflict`.
    pub max_retries: u32,
    pub timeout: Duration,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for AllocationSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_retries: config.allocation_max_retries,
            timeout: config.request_timeout,
        }
    }
}

/// Values ≤ 0 mean a single ticket; more than [`MAX_QUANTITY_PER_REQUEST`] is refused.
pub fn normalize_quantity(quantity: i32) -> Result<i32, AppError> {
    if quantity <= 0 {
        return Ok(1);
    }
    if quantity > MAX_QUANTITY_PER_REQUEST {
        return Err(AppError::QuantityExceeded(format!(
            "At most {} tickets can be purchased per request",
            MAX_QUANTITY_PER_REQUEST
        )));
    }
    Ok(quantity)
}

/// Validated references for one allocation.
struct AllocationTarget {
    event: Event,
    category: Category,
    customer: Customer,
    user: Option<User>,
    quantity: i32,
}

pub struct AllocationCoordinator {
    store: Arc<dyn TicketStore>,
    ledger: CapacityLedger,
    codes: CodeGenerator,
    clock: Arc<dyn Clock>,
    settings: AllocationSettings,
}

impl AllocationCoordinator {
    pub fn new(
        store: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
        settings: AllocationSettings,
    ) -> Self {
        Self {
            store,
            ledger: CapacityLedger::new(),
            codes: CodeGenerator::new(Arc::clone(&clock)),
            clock,
            settings,
        }
    }

    /// Issues `quantity` tickets and returns the public id of the first one.
    pub async fn create_tickets(&self, request: &AllocationRequest) -> Result<Uuid, AppError> {
        let deadline = Instant::now() + self.settings.timeout;
        self.allocate(request, deadline).await
    }

    #[instrument(
        skip(self, request, deadline),
        fields(
            event_id = %request.event_id,
            category_id = %request.category_id,
            quantity = request.quantity
        )
    )]
    async fn allocate(&self, request: &AllocationRequest, deadline: Instant) -> Result<Uuid, AppError> {
        let quantity = normalize_quantity(request.quantity)?;
        let event_id = parse_public_id("event_id", &request.event_id)?;
        let category_id = parse_public_id("category_id", &request.category_id)?;
        let customer_id = parse_public_id("customer_id", &request.customer_id)?;
        let user_id = match request.user_id.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(parse_public_id("user_id", value)?),
            _ => None,
        };

        let target = self
            .before(
                deadline,
                self.resolve(event_id, category_id, customer_id, user_id, quantity),
            )
            .await?;

        let mut attempt = 0;
        loop {
            match self.allocate_once(&target, deadline).await {
                Err(err) if err.is_retryable() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "Retrying ticket allocation");
                }
                result => return result,
            }
        }
    }

    /// Runs `work` unless `deadline` passes first. A future cut short is
    /// dropped, which rolls back any transaction it held.
    async fn before<T>(
        &self,
        deadline: Instant,
        work: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        time::timeout_at(deadline, work).await.unwrap_or_else(|_| {
            Err(AppError::Timeout(format!(
                "Ticket allocation did not complete within {}ms",
                self.settings.timeout.as_millis()
            )))
        })
    }

    async fn resolve(
        &self,
        event_id: Uuid,
        category_id: Uuid,
        customer_id: Uuid,
        user_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<AllocationTarget, AppError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event '{}' was not found", event_id)))?;
        if !event.is_on_sale() {
            return Err(AppError::Inactive(format!(
                "Event '{}' is not open for ticket sales",
                event_id
            )));
        }

        let category = self
            .store
            .find_category(category_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category '{}' was not found", category_id)))?;
        if !category.is_active {
            return Err(AppError::Inactive(format!(
                "Category '{}' is not active",
                category_id
            )));
        }
        if category.event_id != event.id {
            return Err(AppError::InvalidReference(format!(
                "Category '{}' does not belong to event '{}'",
                category_id, event_id
            )));
        }
        if !category.sales_open_at(self.clock.now()) {
            return Err(AppError::Inactive(format!(
                "Sales for category '{}' are not open",
                category_id
            )));
        }
        if quantity > category.max_tickets_per_order {
            return Err(AppError::QuantityExceeded(format!(
                "Category '{}' allows at most {} tickets per order",
                category_id, category.max_tickets_per_order
            )));
        }

        let customer = self
            .store
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer '{}' was not found", customer_id)))?;
        if !customer.is_verified {
            return Err(AppError::Inactive(format!(
                "Customer '{}' is not verified",
                customer_id
            )));
        }

        let user = match user_id {
            Some(user_id) => {
                let user = self
                    .store
                    .find_user(user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User '{}' was not found", user_id)))?;
                if !user.is_active {
                    return Err(AppError::Inactive(format!("User '{}' is disabled", user_id)));
                }
                Some(user)
            }
            None => None,
        };

        Ok(AllocationTarget {
            event,
            category,
            customer,
            user,
            quantity,
        })
    }

    async fn allocate_once(&self, target: &AllocationTarget, deadline: Instant) -> Result<Uuid, AppError> {
        let (tx, first_ticket) = self.before(deadline, self.stage(target)).await?;

        // Not raced against the deadline: once COMMIT is sent its outcome is what the caller gets.
        tx.commit().await?;
        info!(
            ticket_id = %first_ticket,
            category_id = %target.category.public_id,
            quantity = target.quantity,
            "Tickets allocated"
        );
        Ok(first_ticket)
    }

    /// Opens a transaction and writes the whole order into it, leaving the commit to the caller.
    async fn stage(&self, target: &AllocationTarget) -> Result<(Box<dyn StoreTx>, Uuid), AppError> {
        let mut tx = self.store.begin().await?;

        match self.issue(tx.as_mut(), target).await {
            Ok(first_ticket) => Ok((tx, first_ticket)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed allocation did not complete");
                }
                Err(err)
            }
        }
    }

    async fn issue(&self, tx: &mut dyn StoreTx, target: &AllocationTarget) -> Result<Uuid, AppError> {
        let capacity = self
            .ledger
            .check_available(tx, target.category.id, target.quantity)
            .await?;

        let created_at = self.clock.now();
        let mut first_ticket = None;

        for index in 0..target.quantity as usize {
            let code = self
                .codes
                .generate_unique(tx, target.event.public_id, target.customer.public_id, index)
                .await?;

            let ticket = tx
                .insert_ticket(&NewTicket {
                    public_id: Uuid::new_v4(),
                    category_id: target.category.id,
                    event_id: target.event.id,
                    customer_id: target.customer.id,
                    user_id: target.user.as_ref().map(|u| u.id),
                    code,
                    price: capacity.price,
                    created_at,
                })
                .await?;

            first_ticket.get_or_insert(ticket.public_id);
        }

        self.ledger
            .reserve(tx, target.category.id, target.quantity)
            .await?;

        first_ticket.ok_or_else(|| AppError::InternalServerError("No tickets were issued".to_string()))
    }
}
