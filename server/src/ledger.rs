//! Capacity ledger: the only code that reads or moves a category's sold counter.
//!
//! Both operations must run on the transaction that inserts the tickets.
//! `check_available` locks the category row, so a concurrent allocation for the
//! same category waits until this one commits or rolls back. `reserve` is a
//! guarded increment; if the guard ever rejects it the caller must roll back.

use tracing::{debug, instrument};

use crate::models::CategoryCapacity;
use crate::store::StoreTx;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityLedger;

impl CapacityLedger {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, tx))]
    pub async fn check_available(
        &self,
        tx: &mut dyn StoreTx,
        category_id: i64,
        requested: i32,
    ) -> Result<CategoryCapacity, AppError> {
        let capacity = tx.load_capacity(category_id).await?;
        let remaining = capacity.remaining();

        if remaining < requested {
            return Err(AppError::CapacityExceeded(format!(
                "Requested {} ticket(s) but only {} remaining",
                requested, remaining
            )));
        }

        debug!(remaining, requested, "Capacity available");
        Ok(capacity)
    }

    #[instrument(skip(self, tx))]
    pub async fn reserve(
        &self,
        tx: &mut dyn StoreTx,
        category_id: i64,
        quantity: i32,
    ) -> Result<(), AppError> {
        if !tx.reserve_capacity(category_id, quantity).await? {
            return Err(AppError::CapacityExceeded(format!(
                "Reserving {} ticket(s) would exceed category capacity",
                quantity
            )));
        }
        Ok(())
    }
}
