//! Academic programs (curricula).
//!
//! A [`GenericAcademicProgram`] is the national curriculum of a school
//! category: mandatory subjects per grade plus a weekly-hour allowance for
//! optional subjects. A school instantiates it for one academic year as an
//! [`AcademicProgram`], adding its own optional subjects.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  school::{SchoolCategory, SchoolUnit},
};

/// A subject taught at one grade of a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSubject {
  pub subject_id:   Uuid,
  pub subject_name: String,
  pub class_grade:  u8,
  pub weekly_hours: u8,
  pub is_mandatory: bool,
}

// ─── Generic program ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericAcademicProgram {
  pub generic_program_id: Uuid,
  pub name:               String,
  pub category:           SchoolCategory,
  pub academic_profile:   Option<String>,
  /// Mandatory subjects only.
  pub subjects:           Vec<ProgramSubject>,
  /// Weekly hours available for optional subjects, keyed by grade.
  pub optional_hours:     BTreeMap<u8, u8>,
}

impl GenericAcademicProgram {
  pub fn is_mandatory_at(&self, subject_id: Uuid, grade: u8) -> bool {
    self
      .subjects
      .iter()
      .any(|s| s.subject_id == subject_id && s.class_grade == grade)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericSubjectInput {
  pub subject_id:   Uuid,
  pub class_grade:  u8,
  pub weekly_hours: u8,
}

/// Input to `create_generic_program`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGenericProgram {
  pub name:             String,
  pub category:         SchoolCategory,
  pub academic_profile: Option<String>,
  pub subjects:         Vec<GenericSubjectInput>,
  #[serde(default)]
  pub optional_hours:   BTreeMap<u8, u8>,
}

impl NewGenericProgram {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::validation("program name must not be empty"));
    }
    if self.academic_profile.is_some() && !self.category.has_profiles() {
      return Err(Error::validation(format!(
        "{} programs cannot have an academic profile",
        self.category
      )));
    }
    if self.subjects.is_empty() {
      return Err(Error::validation("a program needs at least one subject"));
    }

    let mut seen = HashSet::new();
    for subject in &self.subjects {
      check_grade(self.category, subject.class_grade)?;
      if subject.weekly_hours == 0 {
        return Err(Error::validation("weekly hours must be positive"));
      }
      if !seen.insert((subject.subject_id, subject.class_grade)) {
        return Err(Error::validation(format!(
          "subject {} is listed twice for grade {}",
          subject.subject_id, subject.class_grade
        )));
      }
    }
    for grade in self.optional_hours.keys() {
      check_grade(self.category, *grade)?;
    }
    Ok(())
  }
}

fn check_grade(category: SchoolCategory, grade: u8) -> Result<()> {
  if !category.teaches(grade) {
    return Err(Error::validation(format!(
      "grade {grade} is not taught in a {category}"
    )));
  }
  Ok(())
}

// ─── School program ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicProgram {
  pub program_id:         Uuid,
  pub school_unit_id:     Uuid,
  pub generic_program_id: Uuid,
  pub name:               String,
  pub category:           SchoolCategory,
  pub academic_year:      i32,
  /// Specialisation subject of technological high schools.
  pub core_subject_id:    Option<Uuid>,
  /// Mandatory subjects copied from the generic program plus the school's
  /// optional subjects.
  pub subjects:           Vec<ProgramSubject>,
}

impl AcademicProgram {
  pub fn subjects_for_grade(&self, grade: u8) -> Vec<&ProgramSubject> {
    self.subjects.iter().filter(|s| s.class_grade == grade).collect()
  }

  pub fn grades(&self) -> BTreeSet<u8> {
    self.subjects.iter().map(|s| s.class_grade).collect()
  }
}

/// An optional subject added by a school: either an existing subject or a new
/// one created by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionalSubjectInput {
  pub subject_id:   Option<Uuid>,
  pub subject_name: Option<String>,
  pub class_grade:  u8,
  pub weekly_hours: u8,
}

impl OptionalSubjectInput {
  pub fn validate(&self) -> Result<()> {
    match (&self.subject_id, &self.subject_name) {
      (Some(_), None) => Ok(()),
      (None, Some(name)) if !name.trim().is_empty() => Ok(()),
      _ => Err(Error::validation(
        "an optional subject needs either a subject id or a new subject name",
      )),
    }
  }
}

/// Input to `create_program`.
#[derive(Debug, Clone)]
pub struct NewProgram {
  pub school_unit_id:     Uuid,
  pub generic_program_id: Uuid,
  pub academic_year:      i32,
  pub core_subject_id:    Option<Uuid>,
  pub optional_subjects:  Vec<OptionalSubjectInput>,
}

/// Parameters for `list_programs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramQuery {
  pub school_unit_id: Option<Uuid>,
  pub academic_year:  Option<i32>,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// A school can only run curricula of its own categories and profile.
pub fn check_generic_for_school(
  generic: &GenericAcademicProgram,
  school: &SchoolUnit,
  core_subject_id: Option<Uuid>,
) -> Result<()> {
  if !school.categories.contains(&generic.category) {
    return Err(Error::validation(format!(
      "school unit has no {} category",
      generic.category
    )));
  }
  if let Some(profile) = &generic.academic_profile
    && school.academic_profile.as_ref() != Some(profile)
  {
    return Err(Error::validation(format!(
      "program profile {profile:?} does not match the school's profile"
    )));
  }
  match (generic.category, core_subject_id) {
    (SchoolCategory::TechnologicalHighschool, None) => Err(Error::validation(
      "technological programs need a core subject",
    )),
    (SchoolCategory::TechnologicalHighschool, Some(_)) | (_, None) => Ok(()),
    (_, Some(_)) => Err(Error::validation(
      "only technological programs have a core subject",
    )),
  }
}

/// Check resolved optional subjects against the generic program's
/// allowances.
pub fn check_optionals(
  generic: &GenericAcademicProgram,
  optionals: &[ProgramSubject],
) -> Result<()> {
  let mut hours: BTreeMap<u8, u32> = BTreeMap::new();
  let mut seen = HashSet::new();

  for optional in optionals {
    check_grade(generic.category, optional.class_grade)?;
    if optional.weekly_hours == 0 {
      return Err(Error::validation("weekly hours must be positive"));
    }
    if generic.is_mandatory_at(optional.subject_id, optional.class_grade) {
      return Err(Error::validation(format!(
        "{} is already mandatory for grade {}",
        optional.subject_name, optional.class_grade
      )));
    }
    if !seen.insert((optional.subject_id, optional.class_grade)) {
      return Err(Error::validation(format!(
        "{} is listed twice for grade {}",
        optional.subject_name, optional.class_grade
      )));
    }
    *hours.entry(optional.class_grade).or_default() +=
      u32::from(optional.weekly_hours);
  }

  for (grade, used) in hours {
    let allowed = generic.optional_hours.get(&grade).copied().unwrap_or(0);
    if used > u32::from(allowed) {
      return Err(Error::validation(format!(
        "optional subjects use {used} weekly hours for grade {grade}, \
         only {allowed} are available"
      )));
    }
  }
  Ok(())
}

/// Mandatory subjects of `generic` followed by `optionals`.
pub fn build_subjects(
  generic: &GenericAcademicProgram,
  optionals: Vec<ProgramSubject>,
) -> Vec<ProgramSubject> {
  generic
    .subjects
    .iter()
    .cloned()
    .map(|s| ProgramSubject { is_mandatory: true, ..s })
    .chain(optionals.into_iter().map(|s| ProgramSubject {
      is_mandatory: false,
      ..s
    }))
    .collect()
}
