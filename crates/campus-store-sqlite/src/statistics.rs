//! Statistics snapshots.

use campus_core::{
  catalog::CatalogPerYear,
  statistics::{
    AtRiskStudent, SchoolStatistics, StatisticsSummary, StudyClassStatistics, Thresholds,
    at_risk, class_statistics, school_statistics,
  },
  store::StatisticsStore,
  study_class::{StudyClass, StudyClassQuery},
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::info;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  catalogs::query_year_catalogs,
  classes::list_classes,
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid, query_uuids},
  profiles::load_profile,
  schools::require_school,
};

fn classes_of(conn: &Connection, school_unit_id: Uuid, academic_year: i32) -> Result<Vec<StudyClass>> {
  list_classes(conn, &StudyClassQuery {
    school_unit_id: Some(school_unit_id),
    academic_year: Some(academic_year),
    ..Default::default()
  })
}

fn year_catalogs_of(conn: &Connection, study_class_id: Uuid) -> Result<Vec<CatalogPerYear>> {
  query_year_catalogs(
    conn,
    "WHERE study_class_id = ?1",
    rusqlite::params![encode_uuid(study_class_id)],
  )
}

// ─── Computation ─────────────────────────────────────────────────────────────

fn save_class_statistics(conn: &Connection, s: &StudyClassStatistics) -> Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO study_class_statistics (
       study_class_id, school_unit_id, academic_year, class_grade, class_letter,
       students_count, avg_sem1, avg_sem2, avg_annual, unfounded_absences_avg,
       failing_students, computed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    rusqlite::params![
      encode_uuid(s.study_class_id),
      encode_uuid(s.school_unit_id),
      s.academic_year,
      s.class_grade,
      s.class_letter,
      s.students_count,
      s.avg_sem1,
      s.avg_sem2,
      s.avg_annual,
      s.unfounded_absences_avg,
      s.failing_students,
      encode_dt(s.computed_at),
    ],
  )?;
  Ok(())
}

fn save_school_statistics(conn: &Connection, s: &SchoolStatistics) -> Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO school_statistics (
       school_unit_id, academic_year, school_name, students_count, avg_sem1,
       avg_sem2, avg_annual, failing_students, computed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      encode_uuid(s.school_unit_id),
      s.academic_year,
      s.school_name,
      s.students_count,
      s.avg_sem1,
      s.avg_sem2,
      s.avg_annual,
      s.failing_students,
      encode_dt(s.computed_at),
    ],
  )?;
  Ok(())
}

fn compute(conn: &Connection, academic_year: i32, at: DateTime<Utc>) -> Result<StatisticsSummary> {
  let mut summary = StatisticsSummary { academic_year, ..Default::default() };
  let school_ids = query_uuids(
    conn,
    "SELECT school_unit_id FROM school_units WHERE is_active = 1 ORDER BY name",
    rusqlite::params![],
  )?;

  for school_id in school_ids {
    let school = require_school(conn, school_id)?;
    let mut school_years = Vec::new();
    for class in classes_of(conn, school_id, academic_year)? {
      let years = year_catalogs_of(conn, class.study_class_id)?;
      save_class_statistics(conn, &class_statistics(&class, &years, at))?;
      school_years.extend(years);
      summary.study_classes += 1;
    }
    save_school_statistics(conn, &school_statistics(&school, academic_year, &school_years, at))?;
    summary.schools += 1;
  }
  Ok(summary)
}

// ─── Queries ─────────────────────────────────────────────────────────────────

struct RawClassStatistics {
  study_class_id:         String,
  school_unit_id:         String,
  academic_year:          i32,
  class_grade:            u8,
  class_letter:           String,
  students_count:         u32,
  avg_sem1:               Option<f64>,
  avg_sem2:               Option<f64>,
  avg_annual:             Option<f64>,
  unfounded_absences_avg: f64,
  failing_students:       u32,
  computed_at:            String,
}

impl RawClassStatistics {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      study_class_id:         r.get("study_class_id")?,
      school_unit_id:         r.get("school_unit_id")?,
      academic_year:          r.get("academic_year")?,
      class_grade:            r.get("class_grade")?,
      class_letter:           r.get("class_letter")?,
      students_count:         r.get("students_count")?,
      avg_sem1:               r.get("avg_sem1")?,
      avg_sem2:               r.get("avg_sem2")?,
      avg_annual:             r.get("avg_annual")?,
      unfounded_absences_avg: r.get("unfounded_absences_avg")?,
      failing_students:       r.get("failing_students")?,
      computed_at:            r.get("computed_at")?,
    })
  }

  fn into_statistics(self) -> Result<StudyClassStatistics> {
    Ok(StudyClassStatistics {
      study_class_id:         decode_uuid(&self.study_class_id)?,
      school_unit_id:         decode_uuid(&self.school_unit_id)?,
      academic_year:          self.academic_year,
      class_grade:            self.class_grade,
      class_letter:           self.class_letter,
      students_count:         self.students_count,
      avg_sem1:               self.avg_sem1,
      avg_sem2:               self.avg_sem2,
      avg_annual:             self.avg_annual,
      unfounded_absences_avg: self.unfounded_absences_avg,
      failing_students:       self.failing_students,
      computed_at:            decode_dt(&self.computed_at)?,
    })
  }
}

fn list_class_statistics(
  conn: &Connection,
  school_unit_id: Uuid,
  academic_year: i32,
) -> Result<Vec<StudyClassStatistics>> {
  let mut stmt = conn.prepare_cached(
    "SELECT study_class_id, school_unit_id, academic_year, class_grade, class_letter,
            students_count, avg_sem1, avg_sem2, avg_annual, unfounded_absences_avg,
            failing_students, computed_at
     FROM study_class_statistics
     WHERE school_unit_id = ?1 AND academic_year = ?2
     ORDER BY class_grade, class_letter",
  )?;
  let raws = stmt
    .query_map(
      rusqlite::params![encode_uuid(school_unit_id), academic_year],
      RawClassStatistics::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawClassStatistics::into_statistics).collect()
}

fn list_school_statistics(conn: &Connection, academic_year: i32) -> Result<Vec<SchoolStatistics>> {
  let mut stmt = conn.prepare_cached(
    "SELECT school_unit_id, school_name, students_count, avg_sem1, avg_sem2,
            avg_annual, failing_students, computed_at
     FROM school_statistics WHERE academic_year = ?1
     ORDER BY school_name",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![academic_year], |r| {
      Ok((
        r.get::<_, String>(0)?,
        r.get::<_, String>(1)?,
        r.get::<_, u32>(2)?,
        r.get::<_, Option<f64>>(3)?,
        r.get::<_, Option<f64>>(4)?,
        r.get::<_, Option<f64>>(5)?,
        r.get::<_, u32>(6)?,
        r.get::<_, String>(7)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .map(
      |(school_id, school_name, students_count, avg_sem1, avg_sem2, avg_annual, failing_students, computed_at)| {
        Ok(SchoolStatistics {
          school_unit_id: decode_uuid(&school_id)?,
          school_name,
          academic_year,
          students_count,
          avg_sem1,
          avg_sem2,
          avg_annual,
          failing_students,
          computed_at: decode_dt(&computed_at)?,
        })
      },
    )
    .collect()
}

/// Evaluated live from the per-year catalogs, not from the snapshots.
fn at_risk_students(
  conn: &Connection,
  school_unit_id: Uuid,
  academic_year: i32,
  thresholds: Thresholds,
  study_class_id: Option<Uuid>,
) -> Result<Vec<AtRiskStudent>> {
  let mut flagged = Vec::new();
  for class in classes_of(conn, school_unit_id, academic_year)?
    .into_iter()
    .filter(|c| study_class_id.is_none_or(|id| id == c.study_class_id))
  {
    for year in year_catalogs_of(conn, class.study_class_id)? {
      let Some(student) = load_profile(conn, year.student_id)? else {
        continue;
      };
      if let Some(risk) = at_risk(&student, &class, &year, thresholds) {
        flagged.push(risk);
      }
    }
  }
  flagged.sort_by(|a, b| {
    b.unfounded_absences
      .cmp(&a.unfounded_absences)
      .then_with(|| a.full_name.cmp(&b.full_name))
  });
  Ok(flagged)
}

// ─── StatisticsStore impl ────────────────────────────────────────────────────

impl StatisticsStore for SqliteStore {
  async fn compute_statistics(
    &self,
    academic_year: i32,
    at: DateTime<Utc>,
  ) -> Result<StatisticsSummary> {
    let summary = self.write(move |conn| compute(conn, academic_year, at)).await?;
    info!(
      academic_year,
      schools = summary.schools,
      study_classes = summary.study_classes,
      "computed statistics"
    );
    Ok(summary)
  }

  async fn school_statistics(&self, academic_year: i32) -> Result<Vec<SchoolStatistics>> {
    self.read(move |conn| list_school_statistics(conn, academic_year)).await
  }

  async fn class_statistics(
    &self,
    school_unit_id: Uuid,
    academic_year: i32,
  ) -> Result<Vec<StudyClassStatistics>> {
    self
      .read(move |conn| list_class_statistics(conn, school_unit_id, academic_year))
      .await
  }

  async fn at_risk_students(
    &self,
    school_unit_id: Uuid,
    academic_year: i32,
    thresholds: Thresholds,
    study_class_id: Option<Uuid>,
  ) -> Result<Vec<AtRiskStudent>> {
    self
      .read(move |conn| {
        at_risk_students(conn, school_unit_id, academic_year, thresholds, study_class_id)
      })
      .await
  }
}
