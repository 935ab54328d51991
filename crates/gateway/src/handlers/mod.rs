//! API handlers module

pub mod auth;
pub mod bulk_upload;
pub mod health;
pub mod lookups;
pub mod papers;

use papervault_common::errors::AppError;
use validator::ValidationErrors;

/// Report the first failing field of a validated request body
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let first = errors
        .field_errors()
        .into_iter()
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(field, errs)| {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{} is invalid", field));
            (field.to_string(), message)
        });

    match first {
        Some((field, message)) => AppError::Validation {
            message,
            field: Some(field),
        },
        None => AppError::Validation {
            message: errors.to_string(),
            field: None,
        },
    }
}
