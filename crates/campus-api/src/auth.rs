//! HTTP Basic-auth extractor resolving the acting user.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use campus_core::{profile::UserProfile, store::Store};
use chrono::Utc;
use rand_core::OsRng;
use tracing::{debug, warn};

use crate::{ApiState, error::ApiError};

/// The authenticated, active user behind a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserProfile);

/// Split an `Authorization: Basic …` header into username and password.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
  let value = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;
  let encoded = value.strip_prefix("Basic ").ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;
  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  Ok((username.to_owned(), password.to_owned()))
}

/// Check `password` against an argon2 PHC string.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
  PasswordHash::new(password_hash).is_ok_and(|parsed| {
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
  })
}

/// Produce an argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

impl<S> FromRequestParts<ApiState<S>> for CurrentUser
where
  S: Store + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S>,
  ) -> Result<Self, Self::Rejection> {
    let (username, password) = basic_credentials(&parts.headers)?;

    let Some(creds) = state
      .store
      .credentials(username.clone())
      .await
      .map_err(ApiError::store)?
    else {
      debug!(%username, "unknown user");
      return Err(ApiError::Unauthorized);
    };

    let verified = creds
      .password_hash
      .as_deref()
      .is_some_and(|hash| verify_password(&password, hash));
    if !verified {
      debug!(%username, "bad password");
      return Err(ApiError::Unauthorized);
    }
    if !creds.profile.is_active || !creds.school_active {
      warn!(%username, "login refused for inactive account");
      return Err(ApiError::Unauthorized);
    }

    state
      .store
      .touch_last_online(creds.profile.profile_id, Utc::now())
      .await
      .map_err(ApiError::store)?;
    Ok(CurrentUser(creds.profile))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::http::Request;
  use campus_core::{
    profile::{NewProfile, UserRole},
    school::{NewSchool, SchoolCategory},
    store::{ProfileStore, SchoolStore},
  };
  use campus_store_sqlite::SqliteStore;
  use tokio::sync::mpsc;

  use super::*;
  use crate::ApiSettings;

  async fn make_state() -> ApiState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let mut admin = NewProfile::new(UserRole::Administrator, None, "admin", "Admin");
    admin.password_hash = Some(hash_password("secret").unwrap());
    store.create_profile(admin).await.unwrap();

    let (deliveries, _) = mpsc::channel(8);
    ApiState {
      store: Arc::new(store),
      deliveries,
      settings: Arc::new(ApiSettings::default()),
    }
  }

  async fn extract(
    req: Request<axum::body::Body>,
    state: &ApiState<SqliteStore>,
  ) -> Result<CurrentUser, ApiError> {
    let (mut parts, _) = req.into_parts();
    CurrentUser::from_request_parts(&mut parts, state).await
  }

  fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  fn request(auth: &str) -> Request<axum::body::Body> {
    Request::builder()
      .header(header::AUTHORIZATION, auth)
      .body(axum::body::Body::empty())
      .unwrap()
  }

  #[tokio::test]
  async fn correct_credentials() {
    let state = make_state().await;
    let user = extract(request(&basic("admin", "secret")), &state).await.unwrap();
    assert_eq!(user.0.role, UserRole::Administrator);

    let stored = state.store.get_profile(user.0.profile_id).await.unwrap().unwrap();
    assert!(stored.last_online.is_some());
  }

  #[tokio::test]
  async fn wrong_password() {
    let state = make_state().await;
    let res = extract(request(&basic("admin", "wrong")), &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn unknown_user() {
    let state = make_state().await;
    let res = extract(request(&basic("nobody", "secret")), &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn missing_header() {
    let state = make_state().await;
    let req = Request::builder().body(axum::body::Body::empty()).unwrap();
    assert!(matches!(extract(req, &state).await, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn invalid_base64() {
    let state = make_state().await;
    let res = extract(request("Basic !!!not-base64!!!"), &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn inactive_school_locks_out_members() {
    let state = make_state().await;
    let mut principal =
      NewProfile::new(UserRole::Principal, None, "director", "Ana Pop");
    principal.email = Some("director@school.example".into());
    principal.password_hash = Some(hash_password("pw").unwrap());
    let principal = state.store.create_profile(principal).await.unwrap();
    let school = state
      .store
      .create_school(NewSchool {
        name:             "Scoala 1".into(),
        address:          "Str. Mica 2".into(),
        phone_number:     "0264111111".into(),
        email:            "office@scoala.example".into(),
        district:         "Cluj".into(),
        city:             "Cluj-Napoca".into(),
        categories:       vec![SchoolCategory::SecondarySchool],
        academic_profile: None,
        principal_id:     principal.profile_id,
      })
      .await
      .unwrap();

    assert!(extract(request(&basic("director", "pw")), &state).await.is_ok());
    state.store.set_school_active(school.school_unit_id, false).await.unwrap();
    let res = extract(request(&basic("director", "pw")), &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn deactivated_user_is_rejected() {
    let state = make_state().await;
    let admin = extract(request(&basic("admin", "secret")), &state).await.unwrap();
    state.store.set_active(admin.0.profile_id, false).await.unwrap();
    let res = extract(request(&basic("admin", "secret")), &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }
}
