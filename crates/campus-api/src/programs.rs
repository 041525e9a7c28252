//! Handlers for `/generic-programs` and `/academic-programs` endpoints.
//!
//! | Method | Path | Who |
//! |--------|------|-----|
//! | `GET`  | `/generic-programs[/{id}]` | anyone |
//! | `POST` | `/generic-programs` | administrators |
//! | `GET`  | `/academic-programs[?academic_year=]` | principals (their school) |
//! | `POST` | `/academic-programs` | principals |
//! | `GET`  | `/academic-programs/{id}` | members of the school |
//! | `PUT`  | `/academic-programs/{id}` | principal; body replaces the optional subjects |
//! | `DELETE` | `/academic-programs/{id}` | principal |
//! | `POST` | `/academic-programs/{id}/copy` | principal |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use campus_core::{
  access,
  program::{
    AcademicProgram, GenericAcademicProgram, NewGenericProgram, NewProgram,
    OptionalSubjectInput, ProgramQuery,
  },
  store::Store,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  ApiState, CurrentUser,
  error::{ApiError, found},
};

async fn load<S: Store>(state: &ApiState<S>, id: Uuid) -> Result<AcademicProgram, ApiError> {
  let program = state.store.get_program(id).await.map_err(ApiError::store)?;
  found(program, "academic program", id)
}

// ─── Generic programs ────────────────────────────────────────────────────────

/// `GET /generic-programs`
pub async fn list_generic<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(_actor): CurrentUser,
) -> Result<Json<Vec<GenericAcademicProgram>>, ApiError> {
  let programs = state.store.list_generic_programs().await.map_err(ApiError::store)?;
  Ok(Json(programs))
}

/// `GET /generic-programs/{id}`
pub async fn get_generic<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(_actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<GenericAcademicProgram>, ApiError> {
  let program = state.store.get_generic_program(id).await.map_err(ApiError::store)?;
  Ok(Json(found(program, "generic academic program", id)?))
}

/// `POST /generic-programs`
pub async fn create_generic<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Json(input): Json<NewGenericProgram>,
) -> Result<impl IntoResponse, ApiError> {
  access::require_admin(&actor)?;
  let program = state
    .store
    .create_generic_program(input)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(program)))
}

// ─── School programs ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub academic_year: Option<i32>,
}

/// `GET /academic-programs[?academic_year=]`
pub async fn list<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AcademicProgram>>, ApiError> {
  let school = access::principal_school(&actor)?;
  let programs = state
    .store
    .list_programs(ProgramQuery {
      school_unit_id: Some(school),
      academic_year:  params.academic_year,
    })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(programs))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub generic_program_id: Uuid,
  pub academic_year:      i32,
  pub core_subject_id:    Option<Uuid>,
  #[serde(default)]
  pub optional_subjects:  Vec<OptionalSubjectInput>,
}

/// `POST /academic-programs`
pub async fn create<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let school_unit_id = access::principal_school(&actor)?;
  let program = state
    .store
    .create_program(NewProgram {
      school_unit_id,
      generic_program_id: body.generic_program_id,
      academic_year: body.academic_year,
      core_subject_id: body.core_subject_id,
      optional_subjects: body.optional_subjects,
    })
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(program)))
}

/// `GET /academic-programs/{id}`
pub async fn get_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<AcademicProgram>, ApiError> {
  let program = load(&state, id).await?;
  access::require_same_school(&actor, program.school_unit_id)?;
  Ok(Json(program))
}

#[derive(Debug, Deserialize)]
pub struct OptionalsBody {
  pub optional_subjects: Vec<OptionalSubjectInput>,
}

/// `PUT /academic-programs/{id}`
pub async fn update_optionals<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<OptionalsBody>,
) -> Result<Json<AcademicProgram>, ApiError> {
  let program = load(&state, id).await?;
  access::require_principal_of(&actor, program.school_unit_id)?;
  let program = state
    .store
    .update_program_optionals(id, body.optional_subjects)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(program))
}

/// `DELETE /academic-programs/{id}`
pub async fn delete_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  let program = load(&state, id).await?;
  access::require_principal_of(&actor, program.school_unit_id)?;
  state.store.delete_program(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CopyBody {
  pub academic_year: i32,
}

/// `POST /academic-programs/{id}/copy` — body: `{"academic_year":2025}`
pub async fn copy<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<CopyBody>,
) -> Result<impl IntoResponse, ApiError> {
  let program = load(&state, id).await?;
  access::require_principal_of(&actor, program.school_unit_id)?;
  let copy = state
    .store
    .copy_program(id, body.academic_year)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(copy)))
}
