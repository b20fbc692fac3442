//! Human-readable ticket codes.
//!
//! A code embeds short prefixes of the event and customer identifiers, the
//! issue time in milliseconds and the ticket's position within its order:
//! `TKT-<EVENT>-<CUSTOMER>-<MILLIS>-<INDEX>`. A code retried after a collision
//! carries an extra random `-<SALT>` segment.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::store::StoreTx;
use crate::utils::error::AppError;

pub const MAX_CODE_ATTEMPTS: usize = 5;

const CODE_PREFIX: &str = "TKT";
const ID_PREFIX_LEN: usize = 8;

/// Offset added to the position on each retry. Larger than any order size, so
/// a retried code never lands on a sibling ticket's position.
const RETRY_INDEX_STRIDE: usize = 100;
const SALT_LEN: usize = 6;

pub struct CodeGenerator {
    clock: Arc<dyn Clock>,
}

impl CodeGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn generate(&self, event_id: Uuid, customer_id: Uuid, index: usize) -> String {
        format!(
            "{}-{}-{}-{}-{:03}",
            CODE_PREFIX,
            short_prefix(&event_id.simple().to_string()),
            short_prefix(&customer_id.simple().to_string()),
            self.clock.now().timestamp_millis(),
            index
        )
    }

    /// Generates a code no existing ticket (including rows written earlier in
    /// `tx`) carries. On collision the position is perturbed and a random salt
    /// appended, so repeat orders issued within one clock tick still resolve.
    /// Gives up after [`MAX_CODE_ATTEMPTS`] with `GenerationFailed`.
    pub async fn generate_unique(
        &self,
        tx: &mut dyn StoreTx,
        event_id: Uuid,
        customer_id: Uuid,
        index: usize,
    ) -> Result<String, AppError> {
        for attempt in 0..MAX_CODE_ATTEMPTS {
            let code = self.candidate(event_id, customer_id, index, attempt);
            if !tx.code_exists(&code).await? {
                return Ok(code);
            }
            debug!(%code, attempt, "Ticket code collision");
        }

        Err(AppError::GenerationFailed(format!(
            "Could not produce a unique ticket code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    fn candidate(&self, event_id: Uuid, customer_id: Uuid, index: usize, attempt: usize) -> String {
        if attempt == 0 {
            return self.generate(event_id, customer_id, index);
        }

        let salt: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SALT_LEN)
            .collect();
        format!(
            "{}-{}",
            self.generate(event_id, customer_id, index + attempt * RETRY_INDEX_STRIDE),
            salt.to_uppercase()
        )
    }
}

/// First `ID_PREFIX_LEN` characters, uppercased. Shorter inputs are used whole.
fn short_prefix(value: &str) -> String {
    value
        .chars()
        .take(ID_PREFIX_LEN)
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{CategoryCapacity, NewTicket, Ticket, TicketStatus};
    use crate::store::{MemoryTicketStore, TicketStore};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn generator() -> CodeGenerator {
        let time = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        CodeGenerator::new(Arc::new(FixedClock::new(time)))
    }

    #[test]
    fn test_code_layout() {
        let event_id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        let customer_id = Uuid::parse_str("ffee0011-2222-3333-4444-555566667777").unwrap();

        let code = generator().generate(event_id, customer_id, 2);

        assert_eq!(code, "TKT-A1B2C3D4-FFEE0011-1740830400000-002");
    }

    #[test]
    fn test_short_prefix_is_bounds_checked() {
        assert_eq!(short_prefix("abc"), "ABC");
        assert_eq!(short_prefix(""), "");
        assert_eq!(short_prefix("0123456789"), "01234567");
    }

    #[tokio::test]
    async fn test_generate_unique_skips_taken_codes() {
        let store = MemoryTicketStore::new();
        let event = store.add_event("Expo", true, true).await;
        let category = store.add_category(&event, "Floor", Decimal::ONE, 5).await;
        let customer = store.add_customer("Grace", true).await;
        let codes = generator();

        let taken = codes.generate(event.public_id, customer.public_id, 0);
        store
            .add_ticket(&category, &customer, &taken, TicketStatus::Sold)
            .await;

        let mut tx = store.begin().await.unwrap();
        let code = codes
            .generate_unique(tx.as_mut(), event.public_id, customer.public_id, 0)
            .await
            .unwrap();

        assert_ne!(code, taken);
        let retried = codes.generate(event.public_id, customer.public_id, 100);
        let salt = code.strip_prefix(&format!("{}-", retried)).unwrap();
        assert_eq!(salt.len(), SALT_LEN);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    /// Transaction in which every candidate code is already taken.
    #[derive(Default)]
    struct SaturatedCodes {
        checked: Vec<String>,
    }

    #[async_trait]
    impl StoreTx for SaturatedCodes {
        async fn load_capacity(&mut self, _category_id: i64) -> Result<CategoryCapacity, AppError> {
            unreachable!()
        }

        async fn reserve_capacity(&mut self, _category_id: i64, _quantity: i32) -> Result<bool, AppError> {
            unreachable!()
        }

        async fn code_exists(&mut self, code: &str) -> Result<bool, AppError> {
            self.checked.push(code.to_string());
            Ok(true)
        }

        async fn insert_ticket(&mut self, _ticket: &NewTicket) -> Result<Ticket, AppError> {
            unreachable!()
        }

        async fn load_ticket_for_update(&mut self, _public_id: Uuid) -> Result<Option<Ticket>, AppError> {
            unreachable!()
        }

        async fn update_ticket_status(
            &mut self,
            _ticket_id: i64,
            _status: TicketStatus,
            _updated_at: DateTime<Utc>,
            _used_at: Option<DateTime<Utc>>,
        ) -> Result<Ticket, AppError> {
            unreachable!()
        }

        async fn commit(self: Box<Self>) -> Result<(), AppError> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_generate_unique_fails_when_attempts_exhausted() {
        let codes = generator();
        let event_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let mut tx = SaturatedCodes::default();

        let err = codes
            .generate_unique(&mut tx, event_id, customer_id, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::GenerationFailed(_)));
        assert_eq!(tx.checked.len(), MAX_CODE_ATTEMPTS);
        assert_eq!(tx.checked[0], codes.generate(event_id, customer_id, 0));
        let mut distinct = tx.checked.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), MAX_CODE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_repeat_orders_in_one_tick_get_distinct_codes() {
        let store = MemoryTicketStore::new();
        let event = store.add_event("Expo", true, true).await;
        let category = store.add_category(&event, "Floor", Decimal::ONE, 10).await;
        let customer = store.add_customer("Grace", true).await;
        let codes = generator();

        let mut issued = Vec::new();
        for _ in 0..MAX_CODE_ATTEMPTS + 3 {
            let mut tx = store.begin().await.unwrap();
            let code = codes
                .generate_unique(tx.as_mut(), event.public_id, customer.public_id, 0)
                .await
                .unwrap();
            drop(tx);
            store
                .add_ticket(&category, &customer, &code, TicketStatus::Available)
                .await;
            issued.push(code);
        }

        issued.sort();
        issued.dedup();
        assert_eq!(issued.len(), MAX_CODE_ATTEMPTS + 3);
    }
}
