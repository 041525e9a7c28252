//! Handlers for catalogs, grades and absences.
//!
//! | Method | Path | Who |
//! |--------|------|-----|
//! | `GET`  | `/students/{id}/catalogs[?academic_year=]` | principal, class teachers, parents, the student |
//! | `GET`  | `/students/{id}/report-card[?academic_year=]` | same |
//! | `PUT`  | `/students/{id}/behavior-grade` | class master |
//! | `GET`  | `/study-classes/{id}/subjects/{subject_id}/catalogs` | subject teacher, class master, principal |
//! | `GET`  | `/catalogs/{id}` | catalog teacher and whoever reads the student |
//! | `PATCH` | `/catalogs/{id}` | class master, principal |
//! | `POST` | `/catalogs/{id}/grades`, `/catalogs/{id}/absences` | catalog teacher |
//! | `DELETE` | `/grades/{id}`, `/absences/{id}` | catalog teacher |
//! | `POST` | `/absences/{id}/authorize` | class master |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use campus_core::{
  access,
  calendar::Semester,
  catalog::{
    CatalogFlags, CatalogPerSubject, CatalogPerYear, NewAbsence, NewGrade, ReportCard,
    SubjectAbsence, SubjectCatalogDetail,
  },
  profile::{UserProfile, UserRole},
  store::Store,
  study_class::StudyClass,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  ApiState, CurrentUser,
  classes,
  error::{ApiError, found},
};

// ─── Loading ─────────────────────────────────────────────────────────────────

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

/// The class a student belongs to in `academic_year`, if enrolled.
async fn class_in_year<S: Store>(
  state: &ApiState<S>,
  student_id: Uuid,
  academic_year: i32,
) -> Result<Option<StudyClass>, ApiError> {
  let Some(year) = state
    .store
    .year_catalog(student_id, academic_year)
    .await
    .map_err(ApiError::store)?
  else {
    return Ok(None);
  };
  state
    .store
    .get_study_class(year.study_class_id)
    .await
    .map_err(ApiError::store)
}

async fn load_detail<S: Store>(
  state: &ApiState<S>,
  id: Uuid,
) -> Result<SubjectCatalogDetail, ApiError> {
  let detail = state
    .store
    .get_catalog_per_subject(id)
    .await
    .map_err(ApiError::store)?;
  found(detail, "catalog per subject", id)
}

async fn load_catalog<S: Store>(
  state: &ApiState<S>,
  id: Uuid,
) -> Result<CatalogPerSubject, ApiError> {
  Ok(load_detail(state, id).await?.catalog)
}

async fn load_absence<S: Store>(
  state: &ApiState<S>,
  id: Uuid,
) -> Result<SubjectAbsence, ApiError> {
  let absence = state.store.get_absence(id).await.map_err(ApiError::store)?;
  found(absence, "absence", id)
}

#[derive(Debug, Deserialize)]
pub struct YearParams {
  pub academic_year: Option<i32>,
}

/// Resolve the academic year of a student-scoped read after the access check.
async fn readable_student<S: Store>(
  state: &ApiState<S>,
  actor: &UserProfile,
  student_id: Uuid,
  academic_year: Option<i32>,
) -> Result<i32, ApiError> {
  let student = load_student(state, student_id).await?;
  let year = academic_year.unwrap_or_else(|| state.current_year());
  let class = class_in_year(state, student_id, year).await?;
  access::require_read_student(actor, &student, class.as_ref())?;
  Ok(year)
}

// ─── Student views ───────────────────────────────────────────────────────────

/// `GET /students/{id}/catalogs[?academic_year=]`
pub async fn student<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Query(params): Query<YearParams>,
) -> Result<Json<Vec<CatalogPerSubject>>, ApiError> {
  let year = readable_student(&state, &actor, id, params.academic_year).await?;
  let catalogs = state
    .store
    .student_catalogs(id, year)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(catalogs))
}

/// `GET /students/{id}/report-card[?academic_year=]`
pub async fn report_card<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Query(params): Query<YearParams>,
) -> Result<Json<ReportCard>, ApiError> {
  let year = readable_student(&state, &actor, id, params.academic_year).await?;
  let card = state.store.report_card(id, year).await.map_err(ApiError::store)?;
  Ok(Json(found(card, "report card", format!("{id}/{year}"))?))
}

#[derive(Debug, Deserialize)]
pub struct BehaviorBody {
  pub academic_year: Option<i32>,
  pub semester:      Semester,
  pub grade:         u8,
}

/// `PUT /students/{id}/behavior-grade`
pub async fn behavior_grade<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<BehaviorBody>,
) -> Result<Json<CatalogPerYear>, ApiError> {
  let year = body.academic_year.unwrap_or_else(|| state.current_year());
  let class = class_in_year(&state, id, year).await?;
  let class = found(class, "enrollment", format!("{id}/{year}"))?;
  access::require_class_master(&actor, &class)?;
  let catalog = state
    .store
    .set_behavior_grade(id, year, body.semester, body.grade)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(catalog))
}

/// `GET /study-classes/{id}/subjects/{subject_id}/catalogs`
pub async fn class_subject<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path((id, subject_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<CatalogPerSubject>>, ApiError> {
  let class = classes::load(&state, id).await?;
  access::require_read_class_subject(&actor, &class, subject_id)?;
  let catalogs = state
    .store
    .list_class_subject_catalogs(id, subject_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(catalogs))
}

// ─── Subject catalogs ────────────────────────────────────────────────────────

/// `GET /catalogs/{id}` with grades and absences.
pub async fn get_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<SubjectCatalogDetail>, ApiError> {
  let detail = load_detail(&state, id).await?;
  if actor.profile_id != detail.catalog.teacher_id {
    let student = load_student(&state, detail.catalog.student_id).await?;
    let class = class_in_year(&state, student.profile_id, detail.catalog.academic_year).await?;
    access::require_read_student(&actor, &student, class.as_ref())?;
  }
  Ok(Json(detail))
}

/// `PATCH /catalogs/{id}` — body: `{"wants_thesis":true,"is_exempted":false}`
pub async fn set_flags<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(flags): Json<CatalogFlags>,
) -> Result<Json<CatalogPerSubject>, ApiError> {
  let catalog = load_catalog(&state, id).await?;
  let class = classes::load(&state, catalog.study_class_id).await?;
  access::require_class_master(&actor, &class)
    .or_else(|_| access::require_principal_of(&actor, class.school_unit_id))?;
  let catalog = state
    .store
    .set_catalog_flags(id, flags)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(catalog))
}

// ─── Grades and absences ─────────────────────────────────────────────────────

/// `POST /catalogs/{id}/grades`
pub async fn add_grade<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(input): Json<NewGrade>,
) -> Result<impl IntoResponse, ApiError> {
  let catalog = load_catalog(&state, id).await?;
  access::require_catalog_teacher(&actor, &catalog)?;
  let grade = state
    .store
    .add_grade(id, input, state.today())
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(grade)))
}

/// `DELETE /grades/{id}`
pub async fn delete_grade<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  let grade = state.store.get_grade(id).await.map_err(ApiError::store)?;
  let grade = found(grade, "grade", id)?;
  let catalog = load_catalog(&state, grade.catalog_id).await?;
  access::require_catalog_teacher(&actor, &catalog)?;
  state.store.delete_grade(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /catalogs/{id}/absences`
pub async fn add_absence<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(input): Json<NewAbsence>,
) -> Result<impl IntoResponse, ApiError> {
  let catalog = load_catalog(&state, id).await?;
  access::require_catalog_teacher(&actor, &catalog)?;
  let absence = state
    .store
    .add_absence(id, input, state.today())
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(absence)))
}

/// `DELETE /absences/{id}`
pub async fn delete_absence<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  let absence = load_absence(&state, id).await?;
  let catalog = load_catalog(&state, absence.catalog_id).await?;
  access::require_catalog_teacher(&actor, &catalog)?;
  state.store.delete_absence(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /absences/{id}/authorize`
pub async fn authorize_absence<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<SubjectAbsence>, ApiError> {
  let absence = load_absence(&state, id).await?;
  let catalog = load_catalog(&state, absence.catalog_id).await?;
  let class = classes::load(&state, catalog.study_class_id).await?;
  access::require_class_master(&actor, &class)?;
  let absence = state
    .store
    .authorize_absence(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(absence))
}
