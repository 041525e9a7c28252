//! API error type and [`axum::response::IntoResponse`] implementation.

use std::fmt::Display;

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use campus_core::{Error as CoreError, store::StoreError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("internal error: {0}")]
  Internal(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Turn a missing record into a 404.
pub(crate) fn found<T>(
  value: Option<T>,
  entity: &'static str,
  key: impl Display,
) -> Result<T, ApiError> {
  value.ok_or_else(|| CoreError::not_found(entity, key).into())
}

impl ApiError {
  /// Classify a backend error by the domain failure it carries.
  pub fn store<E: StoreError>(e: E) -> Self {
    match e.domain() {
      Some(domain) => match Self::classify(domain) {
        Some(api) => api,
        None => ApiError::Store(Box::new(e)),
      },
      None => ApiError::Store(Box::new(e)),
    }
  }

  fn classify(e: &CoreError) -> Option<Self> {
    match e {
      CoreError::NotFound { .. } => Some(ApiError::NotFound(e.to_string())),
      CoreError::Validation(m) => Some(ApiError::BadRequest(m.clone())),
      CoreError::Conflict(m) => Some(ApiError::Conflict(m.clone())),
      CoreError::Forbidden(m) => Some(ApiError::Forbidden(m.clone())),
      CoreError::Serialization(_) => None,
    }
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    Self::classify(&e).unwrap_or_else(|| ApiError::Store(Box::new(e)))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Internal(m) => {
        tracing::error!(error = %m, "internal failure");
        (StatusCode::INTERNAL_SERVER_ERROR, m.clone())
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if matches!(self, ApiError::Unauthorized) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"campus\""),
      );
    }
    res
  }
}
