use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

/// Lifecycle status of a single ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Available,
    Reserved,
    Sold,
    Used,
    Cancelled,
    Transferred,
    Refunded,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 7] = [
        TicketStatus::Available,
        TicketStatus::Reserved,
        TicketStatus::Sold,
        TicketStatus::Used,
        TicketStatus::Cancelled,
        TicketStatus::Transferred,
        TicketStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Available => "available",
            TicketStatus::Reserved => "reserved",
            TicketStatus::Sold => "sold",
            TicketStatus::Used => "used",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Transferred => "transferred",
            TicketStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a status name, ignoring surrounding whitespace and case.
impl FromStr for TicketStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| AppError::ValidationError(format!("Unknown ticket status '{}'", value.trim())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub public_id: Uuid,
    pub category_id: i64,
    pub event_id: i64,
    pub customer_id: i64,
    pub user_id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub code: String,
    pub status: TicketStatus,
    /// Snapshotted from the category when the ticket was issued.
    pub price: Decimal,
    pub used_at: Option<DateTime<Utc>>,
    pub transferred_from_ticket_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row values for a ticket about to be issued. Tickets are always born `available`.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub public_id: Uuid,
    pub category_id: i64,
    pub event_id: i64,
    pub customer_id: i64,
    pub user_id: Option<i64>,
    pub code: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Display view of a ticket joined with its event and category names.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    pub ticket_id: Uuid,
    pub status: TicketStatus,
    pub code: String,
    pub event_name: String,
    pub category_name: String,
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_normalizes_input() {
        assert_eq!(" Sold ".parse::<TicketStatus>().unwrap(), TicketStatus::Sold);
        assert_eq!("CANCELLED".parse::<TicketStatus>().unwrap(), TicketStatus::Cancelled);
    }

    #[test]
    fn test_status_parsing_rejects_unknown() {
        let err = "pending".parse::<TicketStatus>().unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TicketStatus::Transferred).unwrap();
        assert_eq!(json, "\"transferred\"");
    }
}
