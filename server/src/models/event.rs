use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub public_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Tickets may only be allocated against an event that is both active and published.
    pub fn is_on_sale(&self) -> bool {
        self.is_active && self.is_published
    }
}
