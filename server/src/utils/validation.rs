use uuid::Uuid;

use crate::utils::error::AppError;

/// Parses an externally supplied public identifier, naming the offending field on failure.
pub fn parse_public_id(field: &str, value: &str) -> Result<Uuid, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Uuid::parse_str(trimmed)
        .map_err(|_| AppError::ValidationError(format!("{} '{}' is not a valid identifier", field, trimmed)))
}
