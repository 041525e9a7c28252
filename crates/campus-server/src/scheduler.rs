//! Periodic statistics recomputation.

use std::{sync::Arc, time::Duration};

use campus_api::Clock;
use campus_core::{calendar::academic_year_for, statistics::StatisticsSummary, store::Store};
use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tracing::error;

/// Recompute the snapshots of the academic year `clock` is in.
pub async fn refresh_once<S: Store>(store: &S, clock: Clock) -> Result<StatisticsSummary, S::Error> {
  let academic_year = academic_year_for(clock.today());
  store.compute_statistics(academic_year, Utc::now()).await
}

/// Run [`refresh_once`] every `period`, starting immediately.
pub async fn run<S: Store + 'static>(store: Arc<S>, clock: Clock, period: Duration) {
  let mut ticker = time::interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    ticker.tick().await;
    if let Err(e) = refresh_once(store.as_ref(), clock).await {
      error!(error = %e, "statistics run failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use campus_core::{
    profile::{NewProfile, UserRole},
    school::{NewSchool, SchoolCategory},
    store::{ProfileStore, SchoolStore, StatisticsStore},
  };
  use campus_store_sqlite::SqliteStore;
  use chrono::NaiveDate;

  use super::*;

  #[tokio::test]
  async fn refresh_uses_the_clock_year() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let principal = store
      .create_profile(NewProfile::new(UserRole::Principal, None, "director", "Ana Pop"))
      .await
      .unwrap();
    store
      .create_school(NewSchool {
        name:             "Liceul de Arte".into(),
        address:          "Piata Mare 1".into(),
        phone_number:     "0264444444".into(),
        email:            "office@arte.example".into(),
        district:         "Cluj".into(),
        city:             "Cluj-Napoca".into(),
        categories:       vec![SchoolCategory::Highschool],
        academic_profile: None,
        principal_id:     principal.profile_id,
      })
      .await
      .unwrap();

    let today = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
    let summary = refresh_once(&store, Clock::Fixed(today)).await.unwrap();
    assert_eq!(summary.academic_year, 2025);
    assert_eq!(summary.schools, 1);
    assert_eq!(summary.study_classes, 0);

    let stats = store.school_statistics(2025).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].students_count, 0);
  }
}
