//! Validation Utilities

use validator::ValidationErrors;

use super::error::ChatError;

/// Convert derive-based validation errors into an `InvalidRoomSpec` error.
pub fn room_spec_error(errors: ValidationErrors) -> ChatError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let detail = e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, detail)
            })
        })
        .next()
        .unwrap_or_else(|| "validation failed".into());

    ChatError::InvalidRoomSpec(message)
}
