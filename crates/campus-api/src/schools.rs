//! Handlers for `/schools` and `/subjects` endpoints.
//!
//! Anyone may read the school list and the subject catalogue; only
//! administrators change them. Principals read their own school in full.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use campus_core::{
  access,
  school::{NewSchool, NewSubject, SchoolQuery, SchoolUnit, Subject},
  store::Store,
};
use tracing::info;
use uuid::Uuid;

use crate::{
  ApiState, CurrentUser,
  error::{ApiError, found},
};

// ─── Schools ─────────────────────────────────────────────────────────────────

/// `GET /schools[?city=&district=&is_active=&text=]`
pub async fn list<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(_actor): CurrentUser,
  Query(query): Query<SchoolQuery>,
) -> Result<Json<Vec<SchoolUnit>>, ApiError> {
  let schools = state.store.list_schools(query).await.map_err(ApiError::store)?;
  Ok(Json(schools))
}

/// `POST /schools`
pub async fn create<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Json(input): Json<NewSchool>,
) -> Result<impl IntoResponse, ApiError> {
  access::require_admin(&actor)?;
  let school = state.store.create_school(input).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(school)))
}

/// `GET /schools/{id}`
pub async fn get_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<SchoolUnit>, ApiError> {
  access::require_same_school(&actor, id)?;
  let school = state.store.get_school(id).await.map_err(ApiError::store)?;
  Ok(Json(found(school, "school unit", id)?))
}

/// `PUT /schools/{id}` — a new `principal_id` hands the school over.
pub async fn update<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(input): Json<NewSchool>,
) -> Result<Json<SchoolUnit>, ApiError> {
  access::require_admin(&actor)?;
  let school = state.store.update_school(id, input).await.map_err(ApiError::store)?;
  info!(school_unit_id = %id, principal_id = %school.principal_id, "updated school unit");
  Ok(Json(school))
}

async fn set_active<S: Store>(
  state: &ApiState<S>,
  actor: &campus_core::profile::UserProfile,
  id: Uuid,
  is_active: bool,
) -> Result<Json<SchoolUnit>, ApiError> {
  access::require_admin(actor)?;
  let school = state
    .store
    .set_school_active(id, is_active)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(school))
}

/// `POST /schools/{id}/activate`
pub async fn activate<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<SchoolUnit>, ApiError> {
  set_active(&state, &actor, id, true).await
}

/// `POST /schools/{id}/deactivate` — members of an inactive school cannot
/// log in.
pub async fn deactivate<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<SchoolUnit>, ApiError> {
  set_active(&state, &actor, id, false).await
}

// ─── Subjects ────────────────────────────────────────────────────────────────

/// `GET /subjects`
pub async fn list_subjects<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(_actor): CurrentUser,
) -> Result<Json<Vec<Subject>>, ApiError> {
  let subjects = state.store.list_subjects().await.map_err(ApiError::store)?;
  Ok(Json(subjects))
}

/// `POST /subjects` — body: `{"name":"Fizică"}`
pub async fn create_subject<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Json(input): Json<NewSubject>,
) -> Result<impl IntoResponse, ApiError> {
  access::require_admin(&actor)?;
  let subject = state.store.create_subject(input).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(subject)))
}
