//! Student catalogs, the denormalised per-year and per-subject aggregates,
//! with their grade and absence records.
//!
//! Aggregated fields (averages, absence counts) are never written directly;
//! they are recomputed by [`crate::grading`] whenever a grade or absence
//! changes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  calendar::{AcademicCalendar, Semester, academic_year_bounds},
};

/// Annual averages below this value require a second examination.
pub const DEFAULT_AVG_LIMIT: f64 = 5.0;

pub const DEFAULT_BEHAVIOR_GRADE: u8 = 10;

pub const MIN_GRADE: u8 = 1;
pub const MAX_GRADE: u8 = 10;

// ─── Absence counters ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceCounts {
  pub founded_sem1:   u32,
  pub founded_sem2:   u32,
  pub unfounded_sem1: u32,
  pub unfounded_sem2: u32,
}

impl AbsenceCounts {
  pub fn founded_annual(&self) -> u32 { self.founded_sem1 + self.founded_sem2 }

  pub fn unfounded_annual(&self) -> u32 {
    self.unfounded_sem1 + self.unfounded_sem2
  }

  pub fn total(&self) -> u32 { self.founded_annual() + self.unfounded_annual() }

  pub fn add(&mut self, other: &AbsenceCounts) {
    self.founded_sem1 += other.founded_sem1;
    self.founded_sem2 += other.founded_sem2;
    self.unfounded_sem1 += other.unfounded_sem1;
    self.unfounded_sem2 += other.unfounded_sem2;
  }
}

// ─── Catalogs ────────────────────────────────────────────────────────────────

/// A student's aggregate record for one academic year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPerYear {
  pub catalog_id:                Uuid,
  pub student_id:                Uuid,
  pub study_class_id:            Uuid,
  pub academic_year:             i32,
  pub avg_sem1:                  Option<f64>,
  pub avg_sem2:                  Option<f64>,
  pub avg_annual:                Option<f64>,
  pub absences:                  AbsenceCounts,
  pub behavior_grade_sem1:       u8,
  pub behavior_grade_sem2:       u8,
  pub behavior_grade_annual:     f64,
  pub second_examinations_count: u32,
}

impl CatalogPerYear {
  pub fn new(student_id: Uuid, study_class_id: Uuid, academic_year: i32) -> Self {
    Self {
      catalog_id: Uuid::new_v4(),
      student_id,
      study_class_id,
      academic_year,
      avg_sem1: None,
      avg_sem2: None,
      avg_annual: None,
      absences: AbsenceCounts::default(),
      behavior_grade_sem1: DEFAULT_BEHAVIOR_GRADE,
      behavior_grade_sem2: DEFAULT_BEHAVIOR_GRADE,
      behavior_grade_annual: f64::from(DEFAULT_BEHAVIOR_GRADE),
      second_examinations_count: 0,
    }
  }

  pub fn behavior_grade(&self, semester: Semester) -> u8 {
    match semester {
      Semester::First => self.behavior_grade_sem1,
      Semester::Second => self.behavior_grade_sem2,
    }
  }
}

/// A student's aggregate record for one subject in one academic year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPerSubject {
  pub catalog_id:                Uuid,
  pub student_id:                Uuid,
  pub study_class_id:            Uuid,
  pub subject_id:                Uuid,
  pub subject_name:              String,
  pub teacher_id:                Uuid,
  pub academic_year:             i32,
  pub is_coordination_subject:   bool,
  /// `false` once the student left a class whose curriculum had this subject
  /// and the new class does not teach it.
  pub is_enrolled:               bool,
  pub is_exempted:               bool,
  pub wants_thesis:              bool,
  pub avg_sem1:                  Option<f64>,
  pub avg_sem2:                  Option<f64>,
  pub avg_annual:                Option<f64>,
  pub avg_after_2nd_examination: Option<f64>,
  pub avg_limit:                 f64,
  pub absences:                  AbsenceCounts,
}

impl CatalogPerSubject {
  pub fn new(
    student_id: Uuid,
    study_class_id: Uuid,
    academic_year: i32,
    subject_id: Uuid,
    subject_name: impl Into<String>,
    teacher_id: Uuid,
    is_coordination_subject: bool,
  ) -> Self {
    Self {
      catalog_id: Uuid::new_v4(),
      student_id,
      study_class_id,
      subject_id,
      subject_name: subject_name.into(),
      teacher_id,
      academic_year,
      is_coordination_subject,
      is_enrolled: true,
      is_exempted: false,
      wants_thesis: false,
      avg_sem1: None,
      avg_sem2: None,
      avg_annual: None,
      avg_after_2nd_examination: None,
      avg_limit: DEFAULT_AVG_LIMIT,
      absences: AbsenceCounts::default(),
    }
  }

  /// Whether this catalog contributes to the per-year averages.
  pub fn counts_for_averages(&self) -> bool {
    self.is_enrolled && !self.is_exempted && !self.is_coordination_subject
  }

  /// The annual average after any second examination.
  pub fn final_average(&self) -> Option<f64> {
    self.avg_after_2nd_examination.or(self.avg_annual)
  }

  pub fn needs_second_examination(&self) -> bool {
    self.avg_annual.is_some_and(|avg| avg < self.avg_limit)
  }

  pub fn semester_average(&self, semester: Semester) -> Option<f64> {
    match semester {
      Semester::First => self.avg_sem1,
      Semester::Second => self.avg_sem2,
    }
  }
}

// ─── Grades and absences ─────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GradeType {
  Regular,
  Thesis,
  SecondExamination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectGrade {
  pub grade_id:   Uuid,
  pub catalog_id: Uuid,
  pub student_id: Uuid,
  pub subject_id: Uuid,
  pub semester:   Semester,
  pub grade:      u8,
  pub taken_at:   NaiveDate,
  pub grade_type: GradeType,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAbsence {
  pub absence_id: Uuid,
  pub catalog_id: Uuid,
  pub student_id: Uuid,
  pub subject_id: Uuid,
  pub semester:   Semester,
  pub taken_at:   NaiveDate,
  pub is_founded: bool,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGrade {
  pub grade:      u8,
  pub taken_at:   NaiveDate,
  #[serde(default = "regular")]
  pub grade_type: GradeType,
}

fn regular() -> GradeType { GradeType::Regular }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAbsence {
  pub taken_at:   NaiveDate,
  #[serde(default)]
  pub is_founded: bool,
}

/// Teacher-controlled switches on a subject catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CatalogFlags {
  pub wants_thesis: bool,
  pub is_exempted:  bool,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// A subject catalog with its grade and absence records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectCatalogDetail {
  pub catalog:  CatalogPerSubject,
  pub grades:   Vec<SubjectGrade>,
  pub absences: Vec<SubjectAbsence>,
}

/// Everything recorded for a student in one academic year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCard {
  pub student_id:    Uuid,
  pub full_name:     String,
  pub class_name:    String,
  pub academic_year: i32,
  pub year:          CatalogPerYear,
  pub subjects:      Vec<SubjectCatalogDetail>,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Validate a new grade and return the semester it belongs to.
pub fn check_new_grade(
  catalog: &CatalogPerSubject,
  input: &NewGrade,
  calendar: Option<&AcademicCalendar>,
  today: NaiveDate,
  existing: &[SubjectGrade],
) -> Result<Semester> {
  if !(MIN_GRADE..=MAX_GRADE).contains(&input.grade) {
    return Err(Error::validation(format!(
      "grade must be between {MIN_GRADE} and {MAX_GRADE}"
    )));
  }
  check_writable(catalog)?;
  if catalog.is_exempted {
    return Err(Error::validation("student is exempted from this subject"));
  }

  match input.grade_type {
    GradeType::SecondExamination => {
      check_in_year(catalog.academic_year, input.taken_at, today)?;
      if !catalog.needs_second_examination() {
        return Err(Error::validation(
          "second examination grades need a failing annual average",
        ));
      }
      Ok(Semester::Second)
    }
    GradeType::Thesis => {
      let semester =
        taken_semester(catalog.academic_year, calendar, input.taken_at, today)?;
      if !catalog.wants_thesis {
        return Err(Error::validation("this catalog has no thesis"));
      }
      if existing
        .iter()
        .any(|g| g.grade_type == GradeType::Thesis && g.semester == semester)
      {
        return Err(Error::conflict(format!(
          "a thesis grade already exists for the {semester} semester"
        )));
      }
      Ok(semester)
    }
    GradeType::Regular => {
      taken_semester(catalog.academic_year, calendar, input.taken_at, today)
    }
  }
}

/// Validate a new absence and return the semester it belongs to.
pub fn check_new_absence(
  catalog: &CatalogPerSubject,
  input: &NewAbsence,
  calendar: Option<&AcademicCalendar>,
  today: NaiveDate,
) -> Result<Semester> {
  check_writable(catalog)?;
  taken_semester(catalog.academic_year, calendar, input.taken_at, today)
}

pub fn check_behavior_grade(grade: u8) -> Result<()> {
  if !(MIN_GRADE..=MAX_GRADE).contains(&grade) {
    return Err(Error::validation(format!(
      "behavior grade must be between {MIN_GRADE} and {MAX_GRADE}"
    )));
  }
  Ok(())
}

fn check_writable(catalog: &CatalogPerSubject) -> Result<()> {
  if catalog.is_coordination_subject {
    return Err(Error::validation(
      "the coordination subject carries no grades or absences",
    ));
  }
  if !catalog.is_enrolled {
    return Err(Error::validation(
      "student is no longer enrolled in this subject",
    ));
  }
  Ok(())
}

fn check_in_year(academic_year: i32, taken_at: NaiveDate, today: NaiveDate) -> Result<()> {
  if taken_at > today {
    return Err(Error::validation("date cannot be in the future"));
  }
  let (start, end) = academic_year_bounds(academic_year)?;
  if taken_at < start || taken_at > end {
    return Err(Error::validation(format!(
      "date {taken_at} is outside academic year {academic_year}"
    )));
  }
  Ok(())
}

fn taken_semester(
  academic_year: i32,
  calendar: Option<&AcademicCalendar>,
  taken_at: NaiveDate,
  today: NaiveDate,
) -> Result<Semester> {
  check_in_year(academic_year, taken_at, today)?;
  let calendar = calendar.ok_or_else(|| {
    Error::validation(format!("no calendar defined for {academic_year}"))
  })?;
  calendar.semester_of(taken_at).ok_or_else(|| {
    Error::validation(format!("{taken_at} is not inside a semester"))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::calendar::Term;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn calendar() -> AcademicCalendar {
    AcademicCalendar {
      academic_year:   2024,
      first_semester:  Term { starts_on: date(2024, 9, 9), ends_on: date(2025, 1, 31) },
      second_semester: Term { starts_on: date(2025, 2, 10), ends_on: date(2025, 6, 20) },
    }
  }

  fn catalog() -> CatalogPerSubject {
    CatalogPerSubject::new(
      Uuid::new_v4(),
      Uuid::new_v4(),
      2024,
      Uuid::new_v4(),
      "Matematică",
      Uuid::new_v4(),
      false,
    )
  }

  fn grade(value: u8, taken_at: NaiveDate, grade_type: GradeType) -> NewGrade {
    NewGrade { grade: value, taken_at, grade_type }
  }

  #[test]
  fn regular_grade_semester_resolution() {
    let cal = calendar();
    let today = date(2025, 3, 1);
    let input = grade(9, date(2024, 11, 4), GradeType::Regular);
    let semester = check_new_grade(&catalog(), &input, Some(&cal), today, &[]);
    assert_eq!(semester.unwrap(), Semester::First);
  }

  #[test]
  fn grade_out_of_range_or_in_holiday_rejected() {
    let cal = calendar();
    let today = date(2025, 3, 1);
    let c = catalog();
    assert!(check_new_grade(&c, &grade(11, date(2024, 11, 4), GradeType::Regular), Some(&cal), today, &[]).is_err());
    assert!(check_new_grade(&c, &grade(8, date(2025, 2, 3), GradeType::Regular), Some(&cal), today, &[]).is_err());
    assert!(check_new_grade(&c, &grade(8, date(2025, 3, 2), GradeType::Regular), Some(&cal), today, &[]).is_err());
    assert!(check_new_grade(&c, &grade(8, date(2024, 11, 4), GradeType::Regular), None, today, &[]).is_err());
  }

  #[test]
  fn thesis_requires_flag_and_is_unique_per_semester() {
    let cal = calendar();
    let today = date(2025, 3, 1);
    let mut c = catalog();
    let input = grade(7, date(2024, 12, 2), GradeType::Thesis);
    assert!(check_new_grade(&c, &input, Some(&cal), today, &[]).is_err());

    c.wants_thesis = true;
    assert!(check_new_grade(&c, &input, Some(&cal), today, &[]).is_ok());

    let existing = SubjectGrade {
      grade_id:   Uuid::new_v4(),
      catalog_id: c.catalog_id,
      student_id: c.student_id,
      subject_id: c.subject_id,
      semester:   Semester::First,
      grade:      6,
      taken_at:   date(2024, 12, 1),
      grade_type: GradeType::Thesis,
      created_at: Utc::now(),
    };
    assert!(matches!(
      check_new_grade(&c, &input, Some(&cal), today, &[existing]),
      Err(Error::Conflict(_))
    ));
  }

  #[test]
  fn coordination_and_unenrolled_catalogs_are_read_only() {
    let cal = calendar();
    let today = date(2025, 3, 1);
    let absence = NewAbsence { taken_at: date(2024, 10, 1), is_founded: false };

    let mut c = catalog();
    c.is_coordination_subject = true;
    assert!(check_new_absence(&c, &absence, Some(&cal), today).is_err());

    let mut c = catalog();
    c.is_enrolled = false;
    assert!(check_new_absence(&c, &absence, Some(&cal), today).is_err());

    assert!(check_new_absence(&catalog(), &absence, Some(&cal), today).is_ok());
  }

  #[test]
  fn second_examination_needs_failing_average() {
    let today = date(2025, 8, 28);
    let input = grade(6, date(2025, 8, 25), GradeType::SecondExamination);
    let mut c = catalog();
    c.avg_annual = Some(7.5);
    assert!(check_new_grade(&c, &input, None, today, &[]).is_err());
    c.avg_annual = Some(4.2);
    assert_eq!(check_new_grade(&c, &input, None, today, &[]).unwrap(), Semester::Second);
  }
}
