//! Catalogs, grades and absences.
//!
//! Derived fields (averages, absence counts) are never written by callers.
//! Every change to a grade, an absence or a catalog flag recomputes the
//! subject catalog and the student's per-year catalog in the same
//! transaction.

use campus_core::{
  Error as CoreError,
  calendar::{Semester, grade_label},
  catalog::{
    AbsenceCounts, CatalogFlags, CatalogPerSubject, CatalogPerYear, NewAbsence,
    NewGrade, ReportCard, SubjectAbsence, SubjectCatalogDetail, SubjectGrade,
    check_behavior_grade, check_new_absence, check_new_grade,
  },
  grading::{recompute_subject, recompute_year},
  store::CatalogStore,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row, ToSql};
use tracing::info;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  calendar::load_calendar,
  encode::{
    decode_date, decode_dt, decode_enum, decode_semester, decode_uuid, encode_date,
    encode_dt, encode_semester, encode_uuid,
  },
  profiles::require_profile,
};

// ─── Subject catalogs ────────────────────────────────────────────────────────

const SUBJECT_COLUMNS: &str = "catalog_id, student_id, study_class_id, subject_id, \
  subject_name, teacher_id, academic_year, is_coordination_subject, is_enrolled, \
  is_exempted, wants_thesis, avg_sem1, avg_sem2, avg_annual, \
  avg_after_2nd_examination, avg_limit, founded_sem1, founded_sem2, \
  unfounded_sem1, unfounded_sem2";

struct RawSubjectCatalog {
  catalog_id:                String,
  student_id:                String,
  study_class_id:            String,
  subject_id:                String,
  subject_name:              String,
  teacher_id:                String,
  academic_year:             i32,
  is_coordination_subject:   bool,
  is_enrolled:               bool,
  is_exempted:               bool,
  wants_thesis:              bool,
  avg_sem1:                  Option<f64>,
  avg_sem2:                  Option<f64>,
  avg_annual:                Option<f64>,
  avg_after_2nd_examination: Option<f64>,
  avg_limit:                 f64,
  absences:                  AbsenceCounts,
}

fn absences_from_row(r: &Row<'_>) -> rusqlite::Result<AbsenceCounts> {
  Ok(AbsenceCounts {
    founded_sem1:   r.get("founded_sem1")?,
    founded_sem2:   r.get("founded_sem2")?,
    unfounded_sem1: r.get("unfounded_sem1")?,
    unfounded_sem2: r.get("unfounded_sem2")?,
  })
}

impl RawSubjectCatalog {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      catalog_id:                r.get("catalog_id")?,
      student_id:                r.get("student_id")?,
      study_class_id:            r.get("study_class_id")?,
      subject_id:                r.get("subject_id")?,
      subject_name:              r.get("subject_name")?,
      teacher_id:                r.get("teacher_id")?,
      academic_year:             r.get("academic_year")?,
      is_coordination_subject:   r.get("is_coordination_subject")?,
      is_enrolled:               r.get("is_enrolled")?,
      is_exempted:               r.get("is_exempted")?,
      wants_thesis:              r.get("wants_thesis")?,
      avg_sem1:                  r.get("avg_sem1")?,
      avg_sem2:                  r.get("avg_sem2")?,
      avg_annual:                r.get("avg_annual")?,
      avg_after_2nd_examination: r.get("avg_after_2nd_examination")?,
      avg_limit:                 r.get("avg_limit")?,
      absences:                  absences_from_row(r)?,
    })
  }

  fn into_catalog(self) -> Result<CatalogPerSubject> {
    Ok(CatalogPerSubject {
      catalog_id:                decode_uuid(&self.catalog_id)?,
      student_id:                decode_uuid(&self.student_id)?,
      study_class_id:            decode_uuid(&self.study_class_id)?,
      subject_id:                decode_uuid(&self.subject_id)?,
      subject_name:              self.subject_name,
      teacher_id:                decode_uuid(&self.teacher_id)?,
      academic_year:             self.academic_year,
      is_coordination_subject:   self.is_coordination_subject,
      is_enrolled:               self.is_enrolled,
      is_exempted:               self.is_exempted,
      wants_thesis:              self.wants_thesis,
      avg_sem1:                  self.avg_sem1,
      avg_sem2:                  self.avg_sem2,
      avg_annual:                self.avg_annual,
      avg_after_2nd_examination: self.avg_after_2nd_examination,
      avg_limit:                 self.avg_limit,
      absences:                  self.absences,
    })
  }
}

fn query_subject_catalogs(
  conn: &Connection,
  filter: &str,
  params: &[&dyn ToSql],
) -> Result<Vec<CatalogPerSubject>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {SUBJECT_COLUMNS} FROM catalogs_per_subject {filter}"
  ))?;
  let raws = stmt
    .query_map(params, RawSubjectCatalog::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawSubjectCatalog::into_catalog).collect()
}

pub(crate) fn load_subject_catalog(
  conn: &Connection,
  id: Uuid,
) -> Result<Option<CatalogPerSubject>> {
  Ok(
    query_subject_catalogs(conn, "WHERE catalog_id = ?1", rusqlite::params![encode_uuid(id)])?
      .into_iter()
      .next(),
  )
}

fn require_subject_catalog(conn: &Connection, id: Uuid) -> Result<CatalogPerSubject> {
  load_subject_catalog(conn, id)?
    .ok_or_else(|| CoreError::not_found("catalog per subject", id).into())
}

/// Every subject catalog of a student in one academic year, detached ones
/// included.
pub(crate) fn student_subject_catalogs(
  conn: &Connection,
  student_id: Uuid,
  academic_year: i32,
) -> Result<Vec<CatalogPerSubject>> {
  query_subject_catalogs(
    conn,
    "WHERE student_id = ?1 AND academic_year = ?2
     ORDER BY is_coordination_subject, subject_name",
    rusqlite::params![encode_uuid(student_id), academic_year],
  )
}

pub(crate) fn insert_subject_catalog(conn: &Connection, c: &CatalogPerSubject) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO catalogs_per_subject ({SUBJECT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
               ?16, ?17, ?18, ?19, ?20)"
    ),
    rusqlite::params![
      encode_uuid(c.catalog_id),
      encode_uuid(c.student_id),
      encode_uuid(c.study_class_id),
      encode_uuid(c.subject_id),
      c.subject_name,
      encode_uuid(c.teacher_id),
      c.academic_year,
      c.is_coordination_subject,
      c.is_enrolled,
      c.is_exempted,
      c.wants_thesis,
      c.avg_sem1,
      c.avg_sem2,
      c.avg_annual,
      c.avg_after_2nd_examination,
      c.avg_limit,
      c.absences.founded_sem1,
      c.absences.founded_sem2,
      c.absences.unfounded_sem1,
      c.absences.unfounded_sem2,
    ],
  )?;
  Ok(())
}

/// Persist everything but the identity columns.
fn save_subject_catalog(conn: &Connection, c: &CatalogPerSubject) -> Result<()> {
  conn.execute(
    "UPDATE catalogs_per_subject SET
       study_class_id = ?2, teacher_id = ?3, is_enrolled = ?4, is_exempted = ?5,
       wants_thesis = ?6, avg_sem1 = ?7, avg_sem2 = ?8, avg_annual = ?9,
       avg_after_2nd_examination = ?10, founded_sem1 = ?11, founded_sem2 = ?12,
       unfounded_sem1 = ?13, unfounded_sem2 = ?14
     WHERE catalog_id = ?1",
    rusqlite::params![
      encode_uuid(c.catalog_id),
      encode_uuid(c.study_class_id),
      encode_uuid(c.teacher_id),
      c.is_enrolled,
      c.is_exempted,
      c.wants_thesis,
      c.avg_sem1,
      c.avg_sem2,
      c.avg_annual,
      c.avg_after_2nd_examination,
      c.absences.founded_sem1,
      c.absences.founded_sem2,
      c.absences.unfounded_sem1,
      c.absences.unfounded_sem2,
    ],
  )?;
  Ok(())
}

// ─── Per-year catalogs ───────────────────────────────────────────────────────

const YEAR_COLUMNS: &str = "catalog_id, student_id, study_class_id, academic_year, \
  avg_sem1, avg_sem2, avg_annual, founded_sem1, founded_sem2, unfounded_sem1, \
  unfounded_sem2, behavior_grade_sem1, behavior_grade_sem2, behavior_grade_annual, \
  second_examinations_count";

struct RawYearCatalog {
  catalog_id:                String,
  student_id:                String,
  study_class_id:            String,
  academic_year:             i32,
  avg_sem1:                  Option<f64>,
  avg_sem2:                  Option<f64>,
  avg_annual:                Option<f64>,
  absences:                  AbsenceCounts,
  behavior_grade_sem1:       u8,
  behavior_grade_sem2:       u8,
  behavior_grade_annual:     f64,
  second_examinations_count: u32,
}

impl RawYearCatalog {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      catalog_id:                r.get("catalog_id")?,
      student_id:                r.get("student_id")?,
      study_class_id:            r.get("study_class_id")?,
      academic_year:             r.get("academic_year")?,
      avg_sem1:                  r.get("avg_sem1")?,
      avg_sem2:                  r.get("avg_sem2")?,
      avg_annual:                r.get("avg_annual")?,
      absences:                  absences_from_row(r)?,
      behavior_grade_sem1:       r.get("behavior_grade_sem1")?,
      behavior_grade_sem2:       r.get("behavior_grade_sem2")?,
      behavior_grade_annual:     r.get("behavior_grade_annual")?,
      second_examinations_count: r.get("second_examinations_count")?,
    })
  }

  fn into_catalog(self) -> Result<CatalogPerYear> {
    Ok(CatalogPerYear {
      catalog_id:                decode_uuid(&self.catalog_id)?,
      student_id:                decode_uuid(&self.student_id)?,
      study_class_id:            decode_uuid(&self.study_class_id)?,
      academic_year:             self.academic_year,
      avg_sem1:                  self.avg_sem1,
      avg_sem2:                  self.avg_sem2,
      avg_annual:                self.avg_annual,
      absences:                  self.absences,
      behavior_grade_sem1:       self.behavior_grade_sem1,
      behavior_grade_sem2:       self.behavior_grade_sem2,
      behavior_grade_annual:     self.behavior_grade_annual,
      second_examinations_count: self.second_examinations_count,
    })
  }
}

pub(crate) fn query_year_catalogs(
  conn: &Connection,
  filter: &str,
  params: &[&dyn ToSql],
) -> Result<Vec<CatalogPerYear>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {YEAR_COLUMNS} FROM catalogs_per_year {filter}"
  ))?;
  let raws = stmt
    .query_map(params, RawYearCatalog::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawYearCatalog::into_catalog).collect()
}

pub(crate) fn load_year_catalog(
  conn: &Connection,
  student_id: Uuid,
  academic_year: i32,
) -> Result<Option<CatalogPerYear>> {
  Ok(
    query_year_catalogs(
      conn,
      "WHERE student_id = ?1 AND academic_year = ?2",
      rusqlite::params![encode_uuid(student_id), academic_year],
    )?
    .into_iter()
    .next(),
  )
}

pub(crate) fn insert_year_catalog(conn: &Connection, y: &CatalogPerYear) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO catalogs_per_year ({YEAR_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
    ),
    rusqlite::params![
      encode_uuid(y.catalog_id),
      encode_uuid(y.student_id),
      encode_uuid(y.study_class_id),
      y.academic_year,
      y.avg_sem1,
      y.avg_sem2,
      y.avg_annual,
      y.absences.founded_sem1,
      y.absences.founded_sem2,
      y.absences.unfounded_sem1,
      y.absences.unfounded_sem2,
      y.behavior_grade_sem1,
      y.behavior_grade_sem2,
      y.behavior_grade_annual,
      y.second_examinations_count,
    ],
  )?;
  Ok(())
}

pub(crate) fn save_year_catalog(conn: &Connection, y: &CatalogPerYear) -> Result<()> {
  conn.execute(
    "UPDATE catalogs_per_year SET
       study_class_id = ?2, avg_sem1 = ?3, avg_sem2 = ?4, avg_annual = ?5,
       founded_sem1 = ?6, founded_sem2 = ?7, unfounded_sem1 = ?8,
       unfounded_sem2 = ?9, behavior_grade_sem1 = ?10, behavior_grade_sem2 = ?11,
       behavior_grade_annual = ?12, second_examinations_count = ?13
     WHERE catalog_id = ?1",
    rusqlite::params![
      encode_uuid(y.catalog_id),
      encode_uuid(y.study_class_id),
      y.avg_sem1,
      y.avg_sem2,
      y.avg_annual,
      y.absences.founded_sem1,
      y.absences.founded_sem2,
      y.absences.unfounded_sem1,
      y.absences.unfounded_sem2,
      y.behavior_grade_sem1,
      y.behavior_grade_sem2,
      y.behavior_grade_annual,
      y.second_examinations_count,
    ],
  )?;
  Ok(())
}

// ─── Grades and absences ─────────────────────────────────────────────────────

const GRADE_COLUMNS: &str =
  "grade_id, catalog_id, student_id, subject_id, semester, grade, taken_at, grade_type, created_at";

const ABSENCE_COLUMNS: &str =
  "absence_id, catalog_id, student_id, subject_id, semester, taken_at, is_founded, created_at";

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<[String; 7]> {
  Ok([
    r.get("grade_id")?,
    r.get("catalog_id")?,
    r.get("student_id")?,
    r.get("subject_id")?,
    r.get("taken_at")?,
    r.get("grade_type")?,
    r.get("created_at")?,
  ])
}

fn query_grades(
  conn: &Connection,
  filter: &str,
  params: &[&dyn ToSql],
) -> Result<Vec<SubjectGrade>> {
  let mut stmt =
    conn.prepare_cached(&format!("SELECT {GRADE_COLUMNS} FROM subject_grades {filter}"))?;
  let rows = stmt
    .query_map(params, |r| {
      Ok((grade_from_row(r)?, r.get::<_, u8>("semester")?, r.get::<_, u8>("grade")?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .map(
      |([grade_id, catalog_id, student_id, subject_id, taken_at, grade_type, created_at], semester, grade)| {
        Ok(SubjectGrade {
          grade_id: decode_uuid(&grade_id)?,
          catalog_id: decode_uuid(&catalog_id)?,
          student_id: decode_uuid(&student_id)?,
          subject_id: decode_uuid(&subject_id)?,
          semester: decode_semester(semester)?,
          grade,
          taken_at: decode_date(&taken_at)?,
          grade_type: decode_enum(&grade_type, "grade type")?,
          created_at: decode_dt(&created_at)?,
        })
      },
    )
    .collect()
}

fn catalog_grades(conn: &Connection, catalog_id: Uuid) -> Result<Vec<SubjectGrade>> {
  query_grades(
    conn,
    "WHERE catalog_id = ?1 ORDER BY taken_at, created_at",
    rusqlite::params![encode_uuid(catalog_id)],
  )
}

fn load_grade(conn: &Connection, id: Uuid) -> Result<Option<SubjectGrade>> {
  Ok(
    query_grades(conn, "WHERE grade_id = ?1", rusqlite::params![encode_uuid(id)])?
      .into_iter()
      .next(),
  )
}

fn query_absences(
  conn: &Connection,
  filter: &str,
  params: &[&dyn ToSql],
) -> Result<Vec<SubjectAbsence>> {
  let mut stmt =
    conn.prepare_cached(&format!("SELECT {ABSENCE_COLUMNS} FROM subject_absences {filter}"))?;
  let rows = stmt
    .query_map(params, |r| {
      Ok((
        [
          r.get::<_, String>("absence_id")?,
          r.get::<_, String>("catalog_id")?,
          r.get::<_, String>("student_id")?,
          r.get::<_, String>("subject_id")?,
          r.get::<_, String>("taken_at")?,
          r.get::<_, String>("created_at")?,
        ],
        r.get::<_, u8>("semester")?,
        r.get::<_, bool>("is_founded")?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .map(
      |([absence_id, catalog_id, student_id, subject_id, taken_at, created_at], semester, is_founded)| {
        Ok(SubjectAbsence {
          absence_id: decode_uuid(&absence_id)?,
          catalog_id: decode_uuid(&catalog_id)?,
          student_id: decode_uuid(&student_id)?,
          subject_id: decode_uuid(&subject_id)?,
          semester: decode_semester(semester)?,
          taken_at: decode_date(&taken_at)?,
          is_founded,
          created_at: decode_dt(&created_at)?,
        })
      },
    )
    .collect()
}

fn catalog_absences(conn: &Connection, catalog_id: Uuid) -> Result<Vec<SubjectAbsence>> {
  query_absences(
    conn,
    "WHERE catalog_id = ?1 ORDER BY taken_at, created_at",
    rusqlite::params![encode_uuid(catalog_id)],
  )
}

fn load_absence(conn: &Connection, id: Uuid) -> Result<Option<SubjectAbsence>> {
  Ok(
    query_absences(conn, "WHERE absence_id = ?1", rusqlite::params![encode_uuid(id)])?
      .into_iter()
      .next(),
  )
}

/// Whether any grade or absence has been recorded for a student in a class.
pub(crate) fn has_records(
  conn: &Connection,
  student_id: Uuid,
  study_class_id: Uuid,
) -> Result<bool> {
  let count: i64 = conn.query_row(
    "SELECT (SELECT COUNT(*) FROM subject_grades g
               JOIN catalogs_per_subject c ON c.catalog_id = g.catalog_id
              WHERE c.student_id = ?1 AND c.study_class_id = ?2)
          + (SELECT COUNT(*) FROM subject_absences a
               JOIN catalogs_per_subject c ON c.catalog_id = a.catalog_id
              WHERE c.student_id = ?1 AND c.study_class_id = ?2)",
    rusqlite::params![encode_uuid(student_id), encode_uuid(study_class_id)],
    |r| r.get(0),
  )?;
  Ok(count > 0)
}

// ─── Recomputation ───────────────────────────────────────────────────────────

/// Recompute the per-year catalog of a student from their subject catalogs.
pub(crate) fn recompute_student_year(
  conn: &Connection,
  student_id: Uuid,
  academic_year: i32,
) -> Result<Option<CatalogPerYear>> {
  let Some(mut year) = load_year_catalog(conn, student_id, academic_year)? else {
    return Ok(None);
  };
  let subjects = student_subject_catalogs(conn, student_id, academic_year)?;
  recompute_year(&mut year, &subjects);
  save_year_catalog(conn, &year)?;
  Ok(Some(year))
}

/// Recompute a subject catalog from its grades and absences, then the
/// student's per-year catalog.
fn recompute_catalog(conn: &Connection, catalog_id: Uuid) -> Result<CatalogPerSubject> {
  let mut catalog = require_subject_catalog(conn, catalog_id)?;
  let grades = catalog_grades(conn, catalog_id)?;
  let absences = catalog_absences(conn, catalog_id)?;
  recompute_subject(&mut catalog, &grades, &absences);
  save_subject_catalog(conn, &catalog)?;
  recompute_student_year(conn, catalog.student_id, catalog.academic_year)?;
  Ok(catalog)
}

/// Re-point a catalog to another class and teacher, re-enrolling it.
pub(crate) fn attach_subject_catalog(
  conn: &Connection,
  catalog_id: Uuid,
  study_class_id: Uuid,
  teacher_id: Uuid,
) -> Result<()> {
  conn.execute(
    "UPDATE catalogs_per_subject
     SET study_class_id = ?2, teacher_id = ?3, is_enrolled = 1
     WHERE catalog_id = ?1",
    rusqlite::params![
      encode_uuid(catalog_id),
      encode_uuid(study_class_id),
      encode_uuid(teacher_id),
    ],
  )?;
  Ok(())
}

pub(crate) fn detach_subject_catalog(conn: &Connection, catalog_id: Uuid) -> Result<()> {
  conn.execute(
    "UPDATE catalogs_per_subject SET is_enrolled = 0 WHERE catalog_id = ?1",
    rusqlite::params![encode_uuid(catalog_id)],
  )?;
  Ok(())
}

// ─── Operations ──────────────────────────────────────────────────────────────

fn add_grade(
  conn: &Connection,
  catalog_id: Uuid,
  input: NewGrade,
  today: NaiveDate,
) -> Result<SubjectGrade> {
  let catalog = require_subject_catalog(conn, catalog_id)?;
  let calendar = load_calendar(conn, catalog.academic_year)?;
  let existing = catalog_grades(conn, catalog_id)?;
  let semester = check_new_grade(&catalog, &input, calendar.as_ref(), today, &existing)?;

  let grade = SubjectGrade {
    grade_id: Uuid::new_v4(),
    catalog_id,
    student_id: catalog.student_id,
    subject_id: catalog.subject_id,
    semester,
    grade: input.grade,
    taken_at: input.taken_at,
    grade_type: input.grade_type,
    created_at: Utc::now(),
  };
  conn.execute(
    &format!(
      "INSERT INTO subject_grades ({GRADE_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ),
    rusqlite::params![
      encode_uuid(grade.grade_id),
      encode_uuid(grade.catalog_id),
      encode_uuid(grade.student_id),
      encode_uuid(grade.subject_id),
      encode_semester(grade.semester),
      grade.grade,
      encode_date(grade.taken_at),
      grade.grade_type.to_string(),
      encode_dt(grade.created_at),
    ],
  )?;
  recompute_catalog(conn, catalog_id)?;
  Ok(grade)
}

fn delete_grade(conn: &Connection, grade_id: Uuid) -> Result<()> {
  let grade = load_grade(conn, grade_id)?
    .ok_or_else(|| CoreError::not_found("grade", grade_id))?;
  conn.execute(
    "DELETE FROM subject_grades WHERE grade_id = ?1",
    rusqlite::params![encode_uuid(grade_id)],
  )?;
  recompute_catalog(conn, grade.catalog_id)?;
  Ok(())
}

fn add_absence(
  conn: &Connection,
  catalog_id: Uuid,
  input: NewAbsence,
  today: NaiveDate,
) -> Result<SubjectAbsence> {
  let catalog = require_subject_catalog(conn, catalog_id)?;
  let calendar = load_calendar(conn, catalog.academic_year)?;
  let semester = check_new_absence(&catalog, &input, calendar.as_ref(), today)?;

  let absence = SubjectAbsence {
    absence_id: Uuid::new_v4(),
    catalog_id,
    student_id: catalog.student_id,
    subject_id: catalog.subject_id,
    semester,
    taken_at: input.taken_at,
    is_founded: input.is_founded,
    created_at: Utc::now(),
  };
  conn.execute(
    &format!(
      "INSERT INTO subject_absences ({ABSENCE_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    ),
    rusqlite::params![
      encode_uuid(absence.absence_id),
      encode_uuid(absence.catalog_id),
      encode_uuid(absence.student_id),
      encode_uuid(absence.subject_id),
      encode_semester(absence.semester),
      encode_date(absence.taken_at),
      absence.is_founded,
      encode_dt(absence.created_at),
    ],
  )?;
  recompute_catalog(conn, catalog_id)?;
  Ok(absence)
}

fn authorize_absence(conn: &Connection, absence_id: Uuid) -> Result<SubjectAbsence> {
  let absence = load_absence(conn, absence_id)?
    .ok_or_else(|| CoreError::not_found("absence", absence_id))?;
  if absence.is_founded {
    return Ok(absence);
  }
  conn.execute(
    "UPDATE subject_absences SET is_founded = 1 WHERE absence_id = ?1",
    rusqlite::params![encode_uuid(absence_id)],
  )?;
  recompute_catalog(conn, absence.catalog_id)?;
  Ok(SubjectAbsence { is_founded: true, ..absence })
}

fn delete_absence(conn: &Connection, absence_id: Uuid) -> Result<()> {
  let absence = load_absence(conn, absence_id)?
    .ok_or_else(|| CoreError::not_found("absence", absence_id))?;
  conn.execute(
    "DELETE FROM subject_absences WHERE absence_id = ?1",
    rusqlite::params![encode_uuid(absence_id)],
  )?;
  recompute_catalog(conn, absence.catalog_id)?;
  Ok(())
}

fn set_flags(
  conn: &Connection,
  catalog_id: Uuid,
  flags: CatalogFlags,
) -> Result<CatalogPerSubject> {
  let catalog = require_subject_catalog(conn, catalog_id)?;
  if catalog.is_coordination_subject {
    return Err(
      CoreError::validation("the coordination subject has no thesis or exemption").into(),
    );
  }
  conn.execute(
    "UPDATE catalogs_per_subject SET wants_thesis = ?2, is_exempted = ?3
     WHERE catalog_id = ?1",
    rusqlite::params![encode_uuid(catalog_id), flags.wants_thesis, flags.is_exempted],
  )?;
  recompute_catalog(conn, catalog_id)
}

fn set_behavior_grade(
  conn: &Connection,
  student_id: Uuid,
  academic_year: i32,
  semester: Semester,
  grade: u8,
) -> Result<CatalogPerYear> {
  check_behavior_grade(grade)?;
  if load_year_catalog(conn, student_id, academic_year)?.is_none() {
    return Err(
      CoreError::not_found("catalog per year", format!("{student_id}/{academic_year}")).into(),
    );
  }
  let column = match semester {
    Semester::First => "behavior_grade_sem1",
    Semester::Second => "behavior_grade_sem2",
  };
  conn.execute(
    &format!(
      "UPDATE catalogs_per_year SET {column} = ?3
       WHERE student_id = ?1 AND academic_year = ?2"
    ),
    rusqlite::params![encode_uuid(student_id), academic_year, grade],
  )?;
  recompute_student_year(conn, student_id, academic_year)?.ok_or_else(|| {
    CoreError::not_found("catalog per year", format!("{student_id}/{academic_year}")).into()
  })
}

fn catalog_detail(conn: &Connection, catalog: CatalogPerSubject) -> Result<SubjectCatalogDetail> {
  Ok(SubjectCatalogDetail {
    grades: catalog_grades(conn, catalog.catalog_id)?,
    absences: catalog_absences(conn, catalog.catalog_id)?,
    catalog,
  })
}

fn report_card(
  conn: &Connection,
  student_id: Uuid,
  academic_year: i32,
) -> Result<Option<ReportCard>> {
  let Some(year) = load_year_catalog(conn, student_id, academic_year)? else {
    return Ok(None);
  };
  let student = require_profile(conn, student_id)?;
  let (grade, letter): (u8, String) = conn.query_row(
    "SELECT class_grade, class_letter FROM study_classes WHERE study_class_id = ?1",
    rusqlite::params![encode_uuid(year.study_class_id)],
    |r| Ok((r.get(0)?, r.get(1)?)),
  )?;
  let subjects = student_subject_catalogs(conn, student_id, academic_year)?
    .into_iter()
    .filter(|c| c.is_enrolled && !c.is_coordination_subject)
    .map(|c| catalog_detail(conn, c))
    .collect::<Result<Vec<_>>>()?;

  Ok(Some(ReportCard {
    student_id,
    full_name: student.full_name,
    class_name: format!("{} {letter}", grade_label(grade)),
    academic_year,
    year,
    subjects,
  }))
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  async fn add_grade(
    &self,
    catalog_id: Uuid,
    input: NewGrade,
    today: NaiveDate,
  ) -> Result<SubjectGrade> {
    let grade = self.write(move |conn| add_grade(conn, catalog_id, input, today)).await?;
    info!(
      grade_id = %grade.grade_id,
      catalog_id = %catalog_id,
      grade_type = %grade.grade_type,
      "added grade"
    );
    Ok(grade)
  }

  async fn delete_grade(&self, grade_id: Uuid) -> Result<()> {
    self.write(move |conn| delete_grade(conn, grade_id)).await?;
    info!(grade_id = %grade_id, "deleted grade");
    Ok(())
  }

  async fn get_grade(&self, grade_id: Uuid) -> Result<Option<SubjectGrade>> {
    self.read(move |conn| load_grade(conn, grade_id)).await
  }

  async fn add_absence(
    &self,
    catalog_id: Uuid,
    input: NewAbsence,
    today: NaiveDate,
  ) -> Result<SubjectAbsence> {
    let absence =
      self.write(move |conn| add_absence(conn, catalog_id, input, today)).await?;
    info!(absence_id = %absence.absence_id, catalog_id = %catalog_id, "added absence");
    Ok(absence)
  }

  async fn authorize_absence(&self, absence_id: Uuid) -> Result<SubjectAbsence> {
    self.write(move |conn| authorize_absence(conn, absence_id)).await
  }

  async fn delete_absence(&self, absence_id: Uuid) -> Result<()> {
    self.write(move |conn| delete_absence(conn, absence_id)).await?;
    info!(absence_id = %absence_id, "deleted absence");
    Ok(())
  }

  async fn get_absence(&self, absence_id: Uuid) -> Result<Option<SubjectAbsence>> {
    self.read(move |conn| load_absence(conn, absence_id)).await
  }

  async fn set_catalog_flags(
    &self,
    catalog_id: Uuid,
    flags: CatalogFlags,
  ) -> Result<CatalogPerSubject> {
    self.write(move |conn| set_flags(conn, catalog_id, flags)).await
  }

  async fn set_behavior_grade(
    &self,
    student_id: Uuid,
    academic_year: i32,
    semester: Semester,
    grade: u8,
  ) -> Result<CatalogPerYear> {
    self
      .write(move |conn| {
        set_behavior_grade(conn, student_id, academic_year, semester, grade)
      })
      .await
  }

  async fn get_catalog_per_subject(
    &self,
    catalog_id: Uuid,
  ) -> Result<Option<SubjectCatalogDetail>> {
    self
      .read(move |conn| {
        load_subject_catalog(conn, catalog_id)?
          .map(|c| catalog_detail(conn, c))
          .transpose()
      })
      .await
  }

  async fn list_class_subject_catalogs(
    &self,
    study_class_id: Uuid,
    subject_id: Uuid,
  ) -> Result<Vec<CatalogPerSubject>> {
    self
      .read(move |conn| {
        query_subject_catalogs(
          conn,
          "WHERE study_class_id = ?1 AND subject_id = ?2 AND is_enrolled = 1
           ORDER BY (SELECT full_name FROM profiles p WHERE p.profile_id = student_id)",
          rusqlite::params![encode_uuid(study_class_id), encode_uuid(subject_id)],
        )
      })
      .await
  }

  async fn student_catalogs(
    &self,
    student_id: Uuid,
    academic_year: i32,
  ) -> Result<Vec<CatalogPerSubject>> {
    self
      .read(move |conn| student_subject_catalogs(conn, student_id, academic_year))
      .await
  }

  async fn year_catalog(
    &self,
    student_id: Uuid,
    academic_year: i32,
  ) -> Result<Option<CatalogPerYear>> {
    self
      .read(move |conn| load_year_catalog(conn, student_id, academic_year))
      .await
  }

  async fn report_card(
    &self,
    student_id: Uuid,
    academic_year: i32,
  ) -> Result<Option<ReportCard>> {
    self.read(move |conn| report_card(conn, student_id, academic_year)).await
  }
}
