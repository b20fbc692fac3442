//! In-process ticket store for tests and local development.
//!
//! Transactions are serialized: `begin` takes the store lock and works on a
//! staged copy of the state, which replaces the committed state on `commit`
//! and is discarded on `rollback` or drop. The capacity check constraint and
//! the unique ticket code constraint are enforced the same way Postgres does.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{StoreTx, TicketStore};
use crate::models::{
    Category, CategoryCapacity, Customer, Event, NewTicket, Ticket, TicketDetails, TicketStatus,
    User,
};
use crate::utils::error::AppError;

#[derive(Debug, Default, Clone)]
struct State {
    next_id: i64,
    events: HashMap<i64, Event>,
    categories: HashMap<i64, Category>,
    customers: HashMap<i64, Customer>,
    users: HashMap<i64, User>,
    tickets: BTreeMap<i64, Ticket>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn ticket_details(&self, ticket: &Ticket) -> Option<TicketDetails> {
        let event = self.events.get(&ticket.event_id)?;
        let category = self.categories.get(&ticket.category_id)?;
        Some(TicketDetails {
            ticket_id: ticket.public_id,
            status: ticket.status,
            code: ticket.code.clone(),
            event_name: event.name.clone(),
            category_name: category.name.clone(),
            price: ticket.price,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryTicketStore {
    state: Arc<Mutex<State>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_event(&self, name: &str, is_active: bool, is_published: bool) -> Event {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let event = Event {
            id: state.next_id(),
            public_id: Uuid::new_v4(),
            name: name.to_string(),
            is_active,
            is_published,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(event.id, event.clone());
        event
    }

    /// Adds an active category whose sales window is always open.
    pub async fn add_category(
        &self,
        event: &Event,
        name: &str,
        price: Decimal,
        quantity_available: i32,
    ) -> Category {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let category = Category {
            id: state.next_id(),
            public_id: Uuid::new_v4(),
            event_id: event.id,
            name: name.to_string(),
            price,
            quantity_available,
            quantity_sold: 0,
            max_tickets_per_order: 10,
            sales_start: DateTime::<Utc>::MIN_UTC,
            sales_end: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.categories.insert(category.id, category.clone());
        category
    }

    /// Applies `change` to a stored category and returns the updated row.
    pub async fn update_category<F>(&self, public_id: Uuid, change: F) -> Option<Category>
    where
        F: FnOnce(&mut Category),
    {
        let mut state = self.state.lock().await;
        let category = state
            .categories
            .values_mut()
            .find(|c| c.public_id == public_id)?;
        change(category);
        Some(category.clone())
    }

    pub async fn add_customer(&self, name: &str, is_verified: bool) -> Customer {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();
        let customer = Customer {
            id,
            public_id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("customer{}@example.com", id),
            is_verified,
            created_at: now,
            updated_at: now,
        };
        state.customers.insert(customer.id, customer.clone());
        customer
    }

    pub async fn add_user(&self, name: &str, is_active: bool) -> User {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();
        let user = User {
            id,
            public_id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("user{}@example.com", id),
            is_active,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    /// Inserts a ticket row directly, bypassing allocation. Used to seed
    /// tickets in a given lifecycle state or to occupy a code.
    pub async fn add_ticket(
        &self,
        category: &Category,
        customer: &Customer,
        code: &str,
        status: TicketStatus,
    ) -> Ticket {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let ticket = Ticket {
            id: state.next_id(),
            public_id: Uuid::new_v4(),
            category_id: category.id,
            event_id: category.event_id,
            customer_id: customer.id,
            user_id: None,
            transaction_id: None,
            code: code.to_string(),
            status,
            price: category.price,
            used_at: None,
            transferred_from_ticket_id: None,
            created_at: now,
            updated_at: now,
        };
        state.tickets.insert(ticket.id, ticket.clone());
        ticket
    }

    pub async fn category(&self, public_id: Uuid) -> Option<Category> {
        let state = self.state.lock().await;
        state
            .categories
            .values()
            .find(|c| c.public_id == public_id)
            .cloned()
    }

    pub async fn ticket(&self, public_id: Uuid) -> Option<Ticket> {
        let state = self.state.lock().await;
        state
            .tickets
            .values()
            .find(|t| t.public_id == public_id)
            .cloned()
    }

    /// All ticket rows, in insertion order.
    pub async fn tickets(&self) -> Vec<Ticket> {
        let state = self.state.lock().await;
        state.tickets.values().cloned().collect()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn find_event(&self, public_id: Uuid) -> Result<Option<Event>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .values()
            .find(|e| e.public_id == public_id)
            .cloned())
    }

    async fn find_category(&self, public_id: Uuid) -> Result<Option<Category>, AppError> {
        Ok(self.category(public_id).await)
    }

    async fn find_customer(&self, public_id: Uuid) -> Result<Option<Customer>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .customers
            .values()
            .find(|c| c.public_id == public_id)
            .cloned())
    }

    async fn find_user(&self, public_id: Uuid) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.public_id == public_id)
            .cloned())
    }

    async fn find_ticket_details(
        &self,
        public_id: Uuid,
    ) -> Result<Option<TicketDetails>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .values()
            .find(|t| t.public_id == public_id)
            .and_then(|t| state.ticket_details(t)))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryStoreTx { guard, staged }))
    }
}

pub struct MemoryStoreTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn load_capacity(&mut self, category_id: i64) -> Result<CategoryCapacity, AppError> {
        self.staged
            .categories
            .get(&category_id)
            .map(|c| CategoryCapacity {
                id: c.id,
                price: c.price,
                quantity_available: c.quantity_available,
                quantity_sold: c.quantity_sold,
            })
            .ok_or_else(|| AppError::NotFound(format!("Category {} no longer exists", category_id)))
    }

    async fn reserve_capacity(&mut self, category_id: i64, quantity: i32) -> Result<bool, AppError> {
        let Some(category) = self.staged.categories.get_mut(&category_id) else {
            return Ok(false);
        };
        if category.quantity_sold + quantity > category.quantity_available {
            return Ok(false);
        }
        category.quantity_sold += quantity;
        category.updated_at = Utc::now();
        Ok(true)
    }

    async fn code_exists(&mut self, code: &str) -> Result<bool, AppError> {
        Ok(self.staged.tickets.values().any(|t| t.code == code))
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> Result<Ticket, AppError> {
        if self.staged.tickets.values().any(|t| t.code == ticket.code) {
            return Err(AppError::ConcurrencyConflict(
                "Ticket code was taken by a concurrent purchase".to_string(),
            ));
        }

        let row = Ticket {
            id: self.staged.next_id(),
            public_id: ticket.public_id,
            category_id: ticket.category_id,
            event_id: ticket.event_id,
            customer_id: ticket.customer_id,
            user_id: ticket.user_id,
            transaction_id: None,
            code: ticket.code.clone(),
            status: TicketStatus::Available,
            price: ticket.price,
            used_at: None,
            transferred_from_ticket_id: None,
            created_at: ticket.created_at,
            updated_at: ticket.created_at,
        };
        self.staged.tickets.insert(row.id, row.clone());
        Ok(row)
    }

    async fn load_ticket_for_update(&mut self, public_id: Uuid) -> Result<Option<Ticket>, AppError> {
        Ok(self
            .staged
            .tickets
            .values()
            .find(|t| t.public_id == public_id)
            .cloned())
    }

    async fn update_ticket_status(
        &mut self,
        ticket_id: i64,
        status: TicketStatus,
        updated_at: DateTime<Utc>,
        used_at: Option<DateTime<Utc>>,
    ) -> Result<Ticket, AppError> {
        let ticket = self
            .staged
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} no longer exists", ticket_id)))?;
        ticket.status = status;
        ticket.updated_at = updated_at;
        if used_at.is_some() {
            ticket.used_at = used_at;
        }
        Ok(ticket.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryStoreTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}
