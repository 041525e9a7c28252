//! Handlers for `/calendar` endpoints.

use axum::{
  Json,
  extract::{Path, State},
};
use campus_core::{access, calendar::AcademicCalendar, store::Store};
use tracing::info;

use crate::{
  ApiState, CurrentUser,
  error::{ApiError, found},
};

/// `GET /calendar/current` — the calendar of today's academic year.
pub async fn current<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(_actor): CurrentUser,
) -> Result<Json<AcademicCalendar>, ApiError> {
  let year = state.current_year();
  let calendar = state.store.get_calendar(year).await.map_err(ApiError::store)?;
  Ok(Json(found(calendar, "academic calendar", year)?))
}

/// `GET /calendar/{year}`
pub async fn get_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(_actor): CurrentUser,
  Path(year): Path<i32>,
) -> Result<Json<AcademicCalendar>, ApiError> {
  let calendar = state.store.get_calendar(year).await.map_err(ApiError::store)?;
  Ok(Json(found(calendar, "academic calendar", year)?))
}

/// `PUT /calendar/{year}`
pub async fn set<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(year): Path<i32>,
  Json(calendar): Json<AcademicCalendar>,
) -> Result<Json<AcademicCalendar>, ApiError> {
  access::require_admin(&actor)?;
  if calendar.academic_year != year {
    return Err(ApiError::BadRequest(format!(
      "calendar is for {}, not {year}",
      calendar.academic_year
    )));
  }
  let calendar = state.store.set_calendar(calendar).await.map_err(ApiError::store)?;
  info!(academic_year = year, "academic calendar set");
  Ok(Json(calendar))
}
