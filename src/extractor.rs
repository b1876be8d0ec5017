//! Request extractors that validate input at the boundary.
//!
//! Both reject with [`AppError::Validation`] (422) so handlers only ever see
//! well-typed values.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};

use crate::{
    error::AppError,
    schema::{check_fields, parse_integer, FieldError, RequestSchema},
};

/// JSON body checked field by field against `T::FIELDS` before deserializing.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: RequestSchema + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<serde_json::Value>::from_request(req, state).await?;

        let errors = check_fields(T::FIELDS, &value);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        serde_json::from_value(value)
            .map(ValidJson)
            .map_err(|e| AppError::Validation(vec![FieldError::new("body", e.to_string())]))
    }
}

/// `user_id` path segment, parsed with [`parse_integer`].
pub struct UserIdPath(pub i64);

impl<S> FromRequestParts<S> for UserIdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(vec![FieldError::new("user_id", e.body_text())]))?;

        parse_integer(&raw)
            .map(UserIdPath)
            .ok_or_else(|| {
                AppError::Validation(vec![FieldError::new(
                    "user_id",
                    "value is not a valid integer",
                )])
            })
    }
}
