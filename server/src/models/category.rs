use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A priced, counted inventory pool of tickets under one event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub public_id: Uuid,
    pub event_id: i64,
    pub name: String,
    pub price: Decimal,
    pub quantity_available: i32,
    pub quantity_sold: i32,
    pub max_tickets_per_order: i32,
    pub sales_start: DateTime<Utc>,
    pub sales_end: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn sales_open_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.sales_start && self.sales_end.map_or(true, |end| now <= end)
    }
}

/// Counter snapshot of a category row, read inside the allocation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct CategoryCapacity {
    pub id: i64,
    pub price: Decimal,
    pub quantity_available: i32,
    pub quantity_sold: i32,
}

impl CategoryCapacity {
    pub fn remaining(&self) -> i32 {
        (self.quantity_available - self.quantity_sold).max(0)
    }
}
