//! Postgres-backed ticket store.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | Meaning | AppError |
//! |----------|---------|----------|
//! | `40001` | serialization failure | `ConcurrencyConflict` |
//! | `40P01` | deadlock detected | `ConcurrencyConflict` |
//! | `23514` on `categories_quantity_sold_within_capacity` | oversell blocked by check constraint | `CapacityExceeded` |
//! | `23505` on `tickets_code_key` | another transaction took the code | `ConcurrencyConflict` |
//! | anything else | | `DatabaseError` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use super::{StoreTx, TicketStore};
use crate::models::{
    Category, CategoryCapacity, Customer, Event, NewTicket, Ticket, TicketDetails, TicketStatus,
    User,
};
use crate::utils::error::AppError;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const CHECK_VIOLATION: &str = "23514";
const UNIQUE_VIOLATION: &str = "23505";

const CAPACITY_CONSTRAINT: &str = "categories_quantity_sold_within_capacity";
const TICKET_CODE_CONSTRAINT: &str = "tickets_code_key";

const TICKET_COLUMNS: &str = "id, public_id, category_id, event_id, customer_id, user_id, \
     transaction_id, code, status, price, used_at, transferred_from_ticket_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TicketRow {
    id: i64,
    public_id: Uuid,
    category_id: i64,
    event_id: i64,
    customer_id: i64,
    user_id: Option<i64>,
    transaction_id: Option<i64>,
    code: String,
    status: String,
    price: Decimal,
    used_at: Option<DateTime<Utc>>,
    transferred_from_ticket_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = AppError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<TicketStatus>().map_err(|_| {
            AppError::InternalServerError(format!(
                "ticket {} has unrecognised status '{}'",
                row.public_id, row.status
            ))
        })?;

        Ok(Ticket {
            id: row.id,
            public_id: row.public_id,
            category_id: row.category_id,
            event_id: row.event_id,
            customer_id: row.customer_id,
            user_id: row.user_id,
            transaction_id: row.transaction_id,
            code: row.code,
            status,
            price: row.price,
            used_at: row.used_at,
            transferred_from_ticket_id: row.transferred_from_ticket_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TicketDetailsRow {
    public_id: Uuid,
    status: String,
    code: String,
    event_name: String,
    category_name: String,
    price: Decimal,
}

impl TryFrom<TicketDetailsRow> for TicketDetails {
    type Error = AppError;

    fn try_from(row: TicketDetailsRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<TicketStatus>().map_err(|_| {
            AppError::InternalServerError(format!(
                "ticket {} has unrecognised status '{}'",
                row.public_id, row.status
            ))
        })?;

        Ok(TicketDetails {
            ticket_id: row.public_id,
            status,
            code: row.code,
            event_name: row.event_name,
            category_name: row.category_name,
            price: row.price,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AppError {
    if let Some(db) = err.as_database_error() {
        let code = db.code();
        let constraint = db.constraint();
        match (code.as_deref(), constraint) {
            (Some(SERIALIZATION_FAILURE), _) | (Some(DEADLOCK_DETECTED), _) => {
                return AppError::ConcurrencyConflict(format!(
                    "{} aborted by concurrent transaction",
                    operation
                ));
            }
            (Some(CHECK_VIOLATION), Some(CAPACITY_CONSTRAINT)) => {
                return AppError::CapacityExceeded(
                    "Not enough tickets remaining in this category".to_string(),
                );
            }
            (Some(UNIQUE_VIOLATION), Some(TICKET_CODE_CONSTRAINT)) => {
                return AppError::ConcurrencyConflict(
                    "Ticket code was taken by a concurrent purchase".to_string(),
                );
            }
            _ => {}
        }
    }
    tracing::debug!(operation, error = %err, "Unmapped database error");
    AppError::DatabaseError(err)
}

#[async_trait]
impl TicketStore for PgTicketStore {
    #[instrument(skip(self), err(level = "debug"))]
    async fn find_event(&self, public_id: Uuid) -> Result<Option<Event>, AppError> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, public_id, name, is_active, is_published, created_at, updated_at
            FROM events
            WHERE public_id = $1
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_event", e))
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn find_category(&self, public_id: Uuid) -> Result<Option<Category>, AppError> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT id, public_id, event_id, name, price, quantity_available, quantity_sold,
                   max_tickets_per_order, sales_start, sales_end, is_active, created_at, updated_at
            FROM categories
            WHERE public_id = $1
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_category", e))
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn find_customer(&self, public_id: Uuid) -> Result<Option<Customer>, AppError> {
        sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, public_id, name, email, is_verified, created_at, updated_at
            FROM customers
            WHERE public_id = $1
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_customer", e))
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn find_user(&self, public_id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, public_id, name, email, is_active, created_at, updated_at
            FROM users
            WHERE public_id = $1
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn find_ticket_details(
        &self,
        public_id: Uuid,
    ) -> Result<Option<TicketDetails>, AppError> {
        let row = sqlx::query_as::<_, TicketDetailsRow>(
            r#"
            SELECT t.public_id, t.status, t.code, t.price,
                   e.name AS event_name, c.name AS category_name
            FROM tickets t
            JOIN events e ON e.id = t.event_id
            JOIN categories c ON c.id = t.category_id
            WHERE t.public_id = $1
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_ticket_details", e))?;

        row.map(TicketDetails::try_from).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

/// Open Postgres transaction. sqlx rolls it back on drop.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    #[instrument(skip(self), err(level = "debug"))]
    async fn load_capacity(&mut self, category_id: i64) -> Result<CategoryCapacity, AppError> {
        sqlx::query_as::<_, CategoryCapacity>(
            r#"
            SELECT id, price, quantity_available, quantity_sold
            FROM categories
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(category_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_capacity", e))?
        .ok_or_else(|| AppError::NotFound(format!("Category {} no longer exists", category_id)))
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn reserve_capacity(&mut self, category_id: i64, quantity: i32) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET quantity_sold = quantity_sold + $2, updated_at = NOW()
            WHERE id = $1 AND quantity_sold + $2 <= quantity_available
            "#,
        )
        .bind(category_id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_capacity", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn code_exists(&mut self, code: &str) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM tickets WHERE code = $1)")
            .bind(code)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("code_exists", e))
    }

    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.public_id, code = %ticket.code), err(level = "debug"))]
    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<Ticket, AppError> {
        let query = format!(
            r#"
            INSERT INTO tickets (
                public_id, category_id, event_id, customer_id, user_id,
                code, status, price, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            TICKET_COLUMNS
        );

        let row = sqlx::query_as::<_, TicketRow>(&query)
            .bind(ticket.public_id)
            .bind(ticket.category_id)
            .bind(ticket.event_id)
            .bind(ticket.customer_id)
            .bind(ticket.user_id)
            .bind(&ticket.code)
            .bind(TicketStatus::Available.as_str())
            .bind(ticket.price)
            .bind(ticket.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_ticket", e))?;

        Ticket::try_from(row)
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn load_ticket_for_update(&mut self, public_id: Uuid) -> Result<Option<Ticket>, AppError> {
        let query = format!(
            "SELECT {} FROM tickets WHERE public_id = $1 FOR UPDATE",
            TICKET_COLUMNS
        );

        let row = sqlx::query_as::<_, TicketRow>(&query)
            .bind(public_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_ticket_for_update", e))?;

        row.map(Ticket::try_from).transpose()
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn update_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
        updated_at: DateTime<Utc>,
        used_at: Option<DateTime<Utc>>,
    ) -> Result<Ticket, AppError> {
        let query = format!(
            r#"
            UPDATE tickets
            SET status = $2, updated_at = $3, used_at = COALESCE($4, used_at)
            WHERE id = $1
            RETURNING {}
            "#,
            TICKET_COLUMNS
        );

        let row = sqlx::query_as::<_, TicketRow>(&query)
            .bind(ticket_id)
            .bind(status.as_str())
            .bind(updated_at)
            .bind(used_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_ticket_status", e))?;

        Ticket::try_from(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}
