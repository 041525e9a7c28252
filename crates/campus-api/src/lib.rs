//! JSON REST API for Campus.
//!
//! Exposes an axum [`Router`] backed by any [`campus_core::store::Store`].
//! Every route authenticates with HTTP Basic credentials checked against the
//! store; role checks live in [`campus_core::access`]. TLS and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", campus_api::api_router(state))
//! ```

pub mod auth;
pub mod calendar;
pub mod catalogs;
pub mod classes;
pub mod error;
pub mod notifications;
pub mod profiles;
pub mod programs;
pub mod schools;
pub mod statistics;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use campus_core::{
  calendar::academic_year_for,
  notification::DeliveryJob,
  statistics::Thresholds,
  store::Store,
};
use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use tracing::warn;

pub use auth::CurrentUser;
pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Source of "today" for date rules and the current academic year.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
  #[default]
  System,
  Fixed(NaiveDate),
}

impl Clock {
  pub fn today(&self) -> NaiveDate {
    match self {
      Clock::System => Utc::now().date_naive(),
      Clock::Fixed(date) => *date,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ApiSettings {
  /// Defaults for `/statistics/at-risk-students`.
  pub thresholds: Thresholds,
  pub clock:      Clock,
}

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:      Arc<S>,
  /// Delivery jobs produced by sent notifications.
  pub deliveries: mpsc::Sender<DeliveryJob>,
  pub settings:   Arc<ApiSettings>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      deliveries: self.deliveries.clone(),
      settings:   Arc::clone(&self.settings),
    }
  }
}

impl<S> ApiState<S> {
  pub fn today(&self) -> NaiveDate { self.settings.clock.today() }

  pub fn current_year(&self) -> i32 { academic_year_for(self.today()) }

  /// Queue delivery jobs without waiting; a full queue drops the job.
  pub(crate) fn enqueue(&self, jobs: Vec<DeliveryJob>) {
    for job in jobs {
      let notification_id = job.notification_id;
      let user_id = job.user_id;
      if let Err(e) = self.deliveries.try_send(job) {
        warn!(%notification_id, %user_id, error = %e, "dropped delivery job");
      }
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: Store + 'static,
{
  Router::new()
    // Profiles
    .route("/me", get(profiles::me))
    .route("/profiles", get(profiles::list::<S>).post(profiles::create::<S>))
    .route(
      "/profiles/{id}",
      get(profiles::get_one::<S>)
        .put(profiles::update::<S>)
        .delete(profiles::delete_one::<S>),
    )
    .route("/profiles/{id}/activate", post(profiles::activate::<S>))
    .route("/profiles/{id}/deactivate", post(profiles::deactivate::<S>))
    .route("/profiles/{id}/password", post(profiles::set_password::<S>))
    .route("/profiles/{id}/children", get(profiles::children::<S>))
    // Schools and subjects
    .route("/schools", get(schools::list::<S>).post(schools::create::<S>))
    .route("/schools/{id}", get(schools::get_one::<S>).put(schools::update::<S>))
    .route("/schools/{id}/activate", post(schools::activate::<S>))
    .route("/schools/{id}/deactivate", post(schools::deactivate::<S>))
    .route(
      "/subjects",
      get(schools::list_subjects::<S>).post(schools::create_subject::<S>),
    )
    // Calendar
    .route("/calendar/current", get(calendar::current::<S>))
    .route("/calendar/{year}", get(calendar::get_one::<S>).put(calendar::set::<S>))
    // Programs
    .route(
      "/generic-programs",
      get(programs::list_generic::<S>).post(programs::create_generic::<S>),
    )
    .route("/generic-programs/{id}", get(programs::get_generic::<S>))
    .route(
      "/academic-programs",
      get(programs::list::<S>).post(programs::create::<S>),
    )
    .route(
      "/academic-programs/{id}",
      get(programs::get_one::<S>)
        .put(programs::update_optionals::<S>)
        .delete(programs::delete_one::<S>),
    )
    .route("/academic-programs/{id}/copy", post(programs::copy::<S>))
    // Study classes
    .route("/study-classes", get(classes::list::<S>).post(classes::create::<S>))
    .route(
      "/study-classes/{id}",
      get(classes::get_one::<S>)
        .put(classes::update::<S>)
        .delete(classes::delete_one::<S>),
    )
    .route("/study-classes/{id}/clone", post(classes::clone_next_year::<S>))
    .route(
      "/study-classes/{id}/subjects/{subject_id}/catalogs",
      get(catalogs::class_subject::<S>),
    )
    .route("/students/{id}/move", post(classes::move_student::<S>))
    .route("/students/{id}/receiver-classes", get(classes::receivers::<S>))
    // Catalogs
    .route("/students/{id}/catalogs", get(catalogs::student::<S>))
    .route("/students/{id}/report-card", get(catalogs::report_card::<S>))
    .route("/students/{id}/behavior-grade", put(catalogs::behavior_grade::<S>))
    .route(
      "/catalogs/{id}",
      get(catalogs::get_one::<S>).patch(catalogs::set_flags::<S>),
    )
    .route("/catalogs/{id}/grades", post(catalogs::add_grade::<S>))
    .route("/catalogs/{id}/absences", post(catalogs::add_absence::<S>))
    .route("/grades/{id}", delete(catalogs::delete_grade::<S>))
    .route("/absences/{id}", delete(catalogs::delete_absence::<S>))
    .route("/absences/{id}/authorize", post(catalogs::authorize_absence::<S>))
    // Notifications
    .route(
      "/notifications",
      get(notifications::list::<S>).post(notifications::send::<S>),
    )
    .route("/notifications/{id}", get(notifications::get_one::<S>))
    .route("/notifications/{id}/read", post(notifications::mark_read::<S>))
    // Statistics
    .route("/statistics/schools", get(statistics::schools::<S>))
    .route("/statistics/study-classes", get(statistics::classes::<S>))
    .route("/statistics/at-risk-students", get(statistics::at_risk::<S>))
    .route("/statistics/refresh", post(statistics::refresh::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
