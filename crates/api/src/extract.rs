//! Request body and query extractors that reject with the API error envelope.
//!
//! axum's own `Json` and `Query` answer malformed input with a plain-text
//! body. These wrap them and turn the rejection into
//! `{ "error", "code": "VALIDATION_ERROR" }`.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query-string parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
