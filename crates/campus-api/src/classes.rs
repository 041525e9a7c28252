//! Handlers for `/study-classes` and the student transfer endpoints.
//!
//! Principals manage the classes of their school; every transition (create,
//! update, clone, move, delete) is a single store call so its catalog effects
//! commit together.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use campus_core::{
  access,
  profile::{UserProfile, UserRole},
  store::Store,
  study_class::{
    AssignmentInput, CloneRequest, NewStudyClass, StudyClass, StudyClassQuery,
    StudyClassUpdate,
  },
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  ApiState, CurrentUser,
  error::{ApiError, found},
};

pub(crate) async fn load<S: Store>(
  state: &ApiState<S>,
  id: Uuid,
) -> Result<StudyClass, ApiError> {
  let class = state.store.get_study_class(id).await.map_err(ApiError::store)?;
  found(class, "study class", id)
}

async fn load_student<S: Store>(
  state: &ApiState<S>,
  id: Uuid,
) -> Result<UserProfile, ApiError> {
  let profile = state.store.get_profile(id).await.map_err(ApiError::store)?;
  let profile = found(profile, "profile", id)?;
  if profile.role != UserRole::Student {
    return Err(ApiError::BadRequest(format!("{} is not a student", profile.full_name)));
  }
  Ok(profile)
}

fn student_school(student: &UserProfile) -> Result<Uuid, ApiError> {
  student
    .school_unit_id
    .ok_or_else(|| ApiError::BadRequest("student has no school unit".into()))
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /study-classes[?academic_year=&class_grade=&teacher_id=]`
///
/// Principals and teachers only see their own school.
pub async fn list<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(mut query): Query<StudyClassQuery>,
) -> Result<Json<Vec<StudyClass>>, ApiError> {
  access::require_role(&actor, &[
    UserRole::Administrator,
    UserRole::Principal,
    UserRole::Teacher,
  ])?;
  if actor.role != UserRole::Administrator {
    query.school_unit_id = actor.school_unit_id;
  }
  let classes = state.store.list_study_classes(query).await.map_err(ApiError::store)?;
  Ok(Json(classes))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub program_id:      Uuid,
  pub class_grade:     u8,
  pub class_letter:    String,
  pub academic_year:   i32,
  pub class_master_id: Uuid,
  pub teachers:        Vec<AssignmentInput>,
  #[serde(default)]
  pub student_ids:     Vec<Uuid>,
}

/// `POST /study-classes`
pub async fn create<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let school_unit_id = access::principal_school(&actor)?;
  let class = state
    .store
    .create_study_class(
      NewStudyClass {
        school_unit_id,
        program_id: body.program_id,
        class_grade: body.class_grade,
        class_letter: body.class_letter,
        academic_year: body.academic_year,
        class_master_id: body.class_master_id,
        teachers: body.teachers,
        student_ids: body.student_ids,
      },
      state.current_year(),
    )
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(class)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /study-classes/{id}`
pub async fn get_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<StudyClass>, ApiError> {
  let class = load(&state, id).await?;
  access::require_same_school(&actor, class.school_unit_id)?;
  Ok(Json(class))
}

// ─── Update / delete ─────────────────────────────────────────────────────────

/// `PUT /study-classes/{id}`
pub async fn update<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(update): Json<StudyClassUpdate>,
) -> Result<Json<StudyClass>, ApiError> {
  let class = load(&state, id).await?;
  access::require_principal_of(&actor, class.school_unit_id)?;
  let class = state
    .store
    .update_study_class(id, update, state.current_year())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(class))
}

/// `DELETE /study-classes/{id}` — refused once any student has grades or
/// absences in the class.
pub async fn delete_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  let class = load(&state, id).await?;
  access::require_principal_of(&actor, class.school_unit_id)?;
  state.store.delete_study_class(id, state.current_year()).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Clone ───────────────────────────────────────────────────────────────────

/// `POST /study-classes/{id}/clone` — body: [`CloneRequest`].
pub async fn clone_next_year<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(request): Json<CloneRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let class = load(&state, id).await?;
  access::require_principal_of(&actor, class.school_unit_id)?;
  let cloned = state
    .store
    .clone_to_next_year(id, request, state.current_year())
    .await
    .map_err(ApiError::store)?;
  info!(
    source = %id,
    study_class_id = %cloned.study_class_id,
    students = cloned.student_ids.len(),
    "cloned study class"
  );
  Ok((StatusCode::CREATED, Json(cloned)))
}

// ─── Transfer ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MoveBody {
  pub study_class_id: Uuid,
}

/// `POST /students/{id}/move` — body: `{"study_class_id":"…"}`; returns the
/// destination class.
pub async fn move_student<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<MoveBody>,
) -> Result<Json<StudyClass>, ApiError> {
  let student = load_student(&state, id).await?;
  access::require_principal_of(&actor, student_school(&student)?)?;
  let class = state
    .store
    .move_student(id, body.study_class_id, state.current_year())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(class))
}

/// `GET /students/{id}/receiver-classes`
pub async fn receivers<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<StudyClass>>, ApiError> {
  let student = load_student(&state, id).await?;
  access::require_principal_of(&actor, student_school(&student)?)?;
  let classes = state
    .store
    .receiver_classes(id, state.current_year())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(classes))
}
