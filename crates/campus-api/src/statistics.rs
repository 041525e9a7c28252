//! Handlers for `/statistics`.
//!
//! | Method | Path | Who |
//! |--------|------|-----|
//! | `GET`  | `/statistics/schools[?academic_year=]` | administrators |
//! | `GET`  | `/statistics/study-classes[?academic_year=]` | principals |
//! | `GET`  | `/statistics/at-risk-students` | principals, class masters |
//! | `POST` | `/statistics/refresh[?academic_year=]` | administrators |
//!
//! School and class figures are snapshots written by the periodic job or by
//! `refresh`; at-risk students are evaluated live.

use axum::{
  Json,
  extract::{Query, State},
};
use campus_core::{
  access,
  profile::UserRole,
  statistics::{
    AtRiskStudent, SchoolStatistics, StatisticsSummary, StudyClassStatistics, Thresholds,
  },
  store::Store,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, CurrentUser, classes, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct YearParams {
  pub academic_year: Option<i32>,
}

/// `GET /statistics/schools[?academic_year=]`
pub async fn schools<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(params): Query<YearParams>,
) -> Result<Json<Vec<SchoolStatistics>>, ApiError> {
  access::require_admin(&actor)?;
  let year = params.academic_year.unwrap_or_else(|| state.current_year());
  let stats = state.store.school_statistics(year).await.map_err(ApiError::store)?;
  Ok(Json(stats))
}

/// `GET /statistics/study-classes[?academic_year=]` — the principal's school.
pub async fn classes<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(params): Query<YearParams>,
) -> Result<Json<Vec<StudyClassStatistics>>, ApiError> {
  let school = access::principal_school(&actor)?;
  let year = params.academic_year.unwrap_or_else(|| state.current_year());
  let stats = state
    .store
    .class_statistics(school, year)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct AtRiskParams {
  pub academic_year:      Option<i32>,
  pub study_class_id:     Option<Uuid>,
  pub unfounded_absences: Option<u32>,
  pub behavior_grade:     Option<u8>,
}

/// `GET /statistics/at-risk-students[?study_class_id=&unfounded_absences=&behavior_grade=]`
///
/// Principals see their whole school. A class master must name their class.
pub async fn at_risk<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(params): Query<AtRiskParams>,
) -> Result<Json<Vec<AtRiskStudent>>, ApiError> {
  let year = params.academic_year.unwrap_or_else(|| state.current_year());
  let school = match (actor.role, params.study_class_id) {
    (UserRole::Teacher, Some(class_id)) => {
      let class = classes::load(&state, class_id).await?;
      access::require_class_master(&actor, &class)?;
      class.school_unit_id
    }
    _ => access::principal_school(&actor)?,
  };

  let defaults = state.settings.thresholds;
  let thresholds = Thresholds {
    unfounded_absences: params.unfounded_absences.unwrap_or(defaults.unfounded_absences),
    behavior_grade:     params.behavior_grade.unwrap_or(defaults.behavior_grade),
  };
  let students = state
    .store
    .at_risk_students(school, year, thresholds, params.study_class_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(students))
}

/// `POST /statistics/refresh[?academic_year=]`
pub async fn refresh<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(params): Query<YearParams>,
) -> Result<Json<StatisticsSummary>, ApiError> {
  access::require_admin(&actor)?;
  let year = params.academic_year.unwrap_or_else(|| state.current_year());
  let summary = state
    .store
    .compute_statistics(year, Utc::now())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(summary))
}
