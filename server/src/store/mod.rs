//! Persistence boundary for the allocation core.
//!
//! `TicketStore` covers the reads performed outside a transaction (reference
//! resolution and read-after-write lookups) and opens transactions. Everything
//! that touches category counters or ticket rows goes through a `StoreTx`, so
//! the capacity check, the ticket inserts and the counter update always share
//! one transaction.
//!
//! A `StoreTx` dropped without `commit` is rolled back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Category, CategoryCapacity, Customer, Event, NewTicket, Ticket, TicketDetails, TicketStatus,
    User,
};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryTicketStore;
pub use postgres::PgTicketStore;

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_event(&self, public_id: Uuid) -> Result<Option<Event>, AppError>;

    async fn find_category(&self, public_id: Uuid) -> Result<Option<Category>, AppError>;

    async fn find_customer(&self, public_id: Uuid) -> Result<Option<Customer>, AppError>;

    async fn find_user(&self, public_id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_ticket_details(&self, public_id: Uuid)
        -> Result<Option<TicketDetails>, AppError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Reads the category counters and holds the row lock until the transaction ends.
    async fn load_capacity(&mut self, category_id: i64) -> Result<CategoryCapacity, AppError>;

    /// Adds `quantity` to `quantity_sold` only if the result stays within
    /// `quantity_available`. Returns `false` when the guard rejected the update.
    async fn reserve_capacity(&mut self, category_id: i64, quantity: i32)
        -> Result<bool, AppError>;

    async fn code_exists(&mut self, code: &str) -> Result<bool, AppError>;

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<Ticket, AppError>;

    async fn load_ticket_for_update(&mut self, public_id: Uuid)
        -> Result<Option<Ticket>, AppError>;

    /// Writes a new status; `used_at` is only overwritten when `Some`.
    async fn update_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
        updated_at: DateTime<Utc>,
        used_at: Option<DateTime<Utc>>,
    ) -> Result<Ticket, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
