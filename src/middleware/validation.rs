use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::Response,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::error::{AppError, AppResult};

/// Flatten field errors into `field: message; field: message`.
fn describe(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            format!("{}: {}", field, messages.join(", "))
        })
        .collect::<Vec<String>>()
        .join("; ")
}

pub fn validate_request<T: Validate>(value: &T) -> AppResult<()> {
    value
        .validate()
        .map_err(|e| AppError::InvalidInput(format!("Validation failed: {}", describe(&e))))
}

/// Reject bodies that do not parse as `T` or fail its validation rules.
/// An empty body is passed through for endpoints whose body is optional.
pub async fn validate_json<T: DeserializeOwned + Validate>(
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| AppError::InvalidInput("Invalid request body".to_string()))?;

    if !bytes.is_empty() {
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::InvalidInput(format!("Invalid JSON: {}", e)))?;
        validate_request(&value)?;
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}
