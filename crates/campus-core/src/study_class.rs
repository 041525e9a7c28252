//! Study classes: a grade + letter cohort of one academic year.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  calendar::{LAST_EARLY_GRADE, MAX_CLASS_GRADE, grade_label},
  profile::{UserProfile, UserRole},
  program::AcademicProgram,
};

/// The teacher of one subject in a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherAssignment {
  pub teacher_id:          Uuid,
  pub subject_id:          Uuid,
  pub subject_name:        String,
  pub is_class_master:     bool,
  pub is_optional_subject: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyClass {
  pub study_class_id:  Uuid,
  pub school_unit_id:  Uuid,
  pub program_id:      Uuid,
  pub program_name:    String,
  pub class_grade:     u8,
  pub class_letter:    String,
  pub academic_year:   i32,
  pub class_master_id: Uuid,
  /// One entry per program subject of the class grade. The coordination
  /// subject is implicit and not listed.
  pub teachers:        Vec<TeacherAssignment>,
  pub student_ids:     Vec<Uuid>,
}

impl StudyClass {
  /// Display name such as `IX B`.
  pub fn name(&self) -> String {
    format!("{} {}", grade_label(self.class_grade), self.class_letter)
  }

  pub fn teacher_for(&self, subject_id: Uuid) -> Option<Uuid> {
    self
      .teachers
      .iter()
      .find(|a| a.subject_id == subject_id)
      .map(|a| a.teacher_id)
  }

  /// Whether `teacher_id` teaches any subject here or is the class master.
  pub fn is_taught_by(&self, teacher_id: Uuid) -> bool {
    self.class_master_id == teacher_id
      || self.teachers.iter().any(|a| a.teacher_id == teacher_id)
  }

  pub fn has_student(&self, student_id: Uuid) -> bool {
    self.student_ids.contains(&student_id)
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentInput {
  pub subject_id: Uuid,
  pub teacher_id: Uuid,
}

/// Input to `create_study_class`.
#[derive(Debug, Clone)]
pub struct NewStudyClass {
  pub school_unit_id:  Uuid,
  pub program_id:      Uuid,
  pub class_grade:     u8,
  pub class_letter:    String,
  pub academic_year:   i32,
  pub class_master_id: Uuid,
  pub teachers:        Vec<AssignmentInput>,
  pub student_ids:     Vec<Uuid>,
}

/// Input to `update_study_class`: the new class master, the full teacher
/// list, and the full roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyClassUpdate {
  pub class_master_id: Uuid,
  pub teachers:        Vec<AssignmentInput>,
  pub student_ids:     Vec<Uuid>,
}

/// Input to `clone_to_next_year`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloneRequest {
  /// Program of the same school for the next academic year.
  pub program_id:      Uuid,
  /// Defaults to the source class letter.
  pub class_letter:    Option<String>,
  /// Defaults to the source class master.
  pub class_master_id: Option<Uuid>,
  /// Teachers for subjects that cannot be carried over; also overrides
  /// carried ones.
  #[serde(default)]
  pub teachers:        Vec<AssignmentInput>,
}

/// Parameters for `list_study_classes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudyClassQuery {
  pub school_unit_id: Option<Uuid>,
  pub academic_year:  Option<i32>,
  pub class_grade:    Option<u8>,
  /// Classes where this teacher teaches or is class master.
  pub teacher_id:     Option<Uuid>,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Normalise a class letter to upper case; 1–3 ASCII letters.
pub fn normalize_letter(letter: &str) -> Result<String> {
  let letter = letter.trim().to_ascii_uppercase();
  if letter.is_empty()
    || letter.len() > 3
    || !letter.chars().all(|c| c.is_ascii_alphabetic())
  {
    return Err(Error::validation(format!(
      "class letter must be 1-3 letters, got {letter:?}"
    )));
  }
  Ok(letter)
}

/// The program must belong to the class's school and year and define
/// subjects for the class grade.
pub fn check_program_for_class(
  program: &AcademicProgram,
  school_unit_id: Uuid,
  class_grade: u8,
  academic_year: i32,
) -> Result<()> {
  if class_grade > MAX_CLASS_GRADE {
    return Err(Error::validation(format!("invalid class grade {class_grade}")));
  }
  if program.school_unit_id != school_unit_id {
    return Err(Error::validation(
      "academic program belongs to another school unit",
    ));
  }
  if program.academic_year != academic_year {
    return Err(Error::validation(format!(
      "academic program is for {}, not {academic_year}",
      program.academic_year
    )));
  }
  if !program.category.teaches(class_grade)
    || program.subjects_for_grade(class_grade).is_empty()
  {
    return Err(Error::validation(format!(
      "program {} has no subjects for grade {class_grade}",
      program.name
    )));
  }
  Ok(())
}

pub fn check_class_master(profile: &UserProfile, school_unit_id: Uuid) -> Result<()> {
  if !profile.is_active_member(UserRole::Teacher, school_unit_id) {
    return Err(Error::validation(format!(
      "class master {} is not an active teacher of this school unit",
      profile.profile_id
    )));
  }
  Ok(())
}

pub fn check_student_for_enrollment(
  profile: &UserProfile,
  school_unit_id: Uuid,
) -> Result<()> {
  if !profile.is_active_member(UserRole::Student, school_unit_id) {
    return Err(Error::validation(format!(
      "{} is not an active student of this school unit",
      profile.profile_id
    )));
  }
  Ok(())
}

/// Whether `teacher` may teach `subject_id` in a class of `class_grade`.
pub fn may_teach(
  teacher: &UserProfile,
  subject_id: Uuid,
  class_grade: u8,
  class_master_id: Uuid,
) -> bool {
  teacher.teaches(subject_id)
    || (teacher.profile_id == class_master_id && class_grade <= LAST_EARLY_GRADE)
}

/// Validate teacher assignments against the program subjects of the class
/// grade. Every subject needs exactly one teacher, and every teacher must be
/// an active teacher of the school allowed to teach the subject.
///
/// `teachers` must contain the profiles of all referenced teachers.
pub fn validate_assignments(
  program: &AcademicProgram,
  class_grade: u8,
  class_master_id: Uuid,
  school_unit_id: Uuid,
  inputs: &[AssignmentInput],
  teachers: &HashMap<Uuid, UserProfile>,
) -> Result<Vec<TeacherAssignment>> {
  let subjects = program.subjects_for_grade(class_grade);
  let by_subject: HashMap<Uuid, Uuid> = {
    let mut map = HashMap::new();
    for input in inputs {
      if !subjects.iter().any(|s| s.subject_id == input.subject_id) {
        return Err(Error::validation(format!(
          "subject {} is not taught in grade {class_grade} of {}",
          input.subject_id, program.name
        )));
      }
      if map.insert(input.subject_id, input.teacher_id).is_some() {
        return Err(Error::validation(format!(
          "subject {} is assigned more than once",
          input.subject_id
        )));
      }
    }
    map
  };

  let missing: Vec<&str> = subjects
    .iter()
    .filter(|s| !by_subject.contains_key(&s.subject_id))
    .map(|s| s.subject_name.as_str())
    .collect();
  if !missing.is_empty() {
    return Err(Error::validation(format!(
      "missing teachers for: {}",
      missing.join(", ")
    )));
  }

  let mut assignments = Vec::with_capacity(subjects.len());
  for subject in subjects {
    let teacher_id = by_subject[&subject.subject_id];
    let teacher = teachers
      .get(&teacher_id)
      .ok_or_else(|| Error::not_found("teacher", teacher_id))?;
    if !teacher.is_active_member(UserRole::Teacher, school_unit_id) {
      return Err(Error::validation(format!(
        "{} is not an active teacher of this school unit",
        teacher.full_name
      )));
    }
    if !may_teach(teacher, subject.subject_id, class_grade, class_master_id) {
      return Err(Error::validation(format!(
        "{} does not teach {}",
        teacher.full_name, subject.subject_name
      )));
    }
    assignments.push(TeacherAssignment {
      teacher_id,
      subject_id: subject.subject_id,
      subject_name: subject.subject_name.clone(),
      is_class_master: teacher_id == class_master_id,
      is_optional_subject: !subject.is_mandatory,
    });
  }
  Ok(assignments)
}

/// Roster changes of a class update: `(added, removed)`.
pub fn roster_diff(current: &[Uuid], next: &[Uuid]) -> Result<(Vec<Uuid>, Vec<Uuid>)> {
  let unique: HashSet<&Uuid> = next.iter().collect();
  if unique.len() != next.len() {
    return Err(Error::validation("a student is listed twice"));
  }
  let added = next.iter().filter(|id| !current.contains(id)).copied().collect();
  let removed = current.iter().filter(|id| !next.contains(id)).copied().collect();
  Ok((added, removed))
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::{program::ProgramSubject, school::SchoolCategory};

  fn teacher(school: Uuid, subjects: Vec<Uuid>) -> UserProfile {
    UserProfile {
      profile_id:                  Uuid::new_v4(),
      school_unit_id:              Some(school),
      full_name:                   "Maria Ionescu".into(),
      username:                    format!("t-{}", Uuid::new_v4()),
      email:                       None,
      phone_number:                None,
      role:                        UserRole::Teacher,
      is_active:                   true,
      created_at:                  Utc::now(),
      last_online:                 None,
      birth_date:                  None,
      address:                     None,
      personal_id_number:          None,
      email_notifications_enabled: true,
      sms_notifications_enabled:   false,
      taught_subject_ids:          subjects,
      parent_ids:                  Vec::new(),
      student_in_class_id:         None,
    }
  }

  fn program(school: Uuid, grade: u8, subjects: &[Uuid]) -> AcademicProgram {
    AcademicProgram {
      program_id:         Uuid::new_v4(),
      school_unit_id:     school,
      generic_program_id: Uuid::new_v4(),
      name:               "Program".into(),
      category:           if grade <= 4 {
        SchoolCategory::PrimarySchool
      } else {
        SchoolCategory::Highschool
      },
      academic_year:      2024,
      core_subject_id:    None,
      subjects:           subjects
        .iter()
        .map(|id| ProgramSubject {
          subject_id:   *id,
          subject_name: format!("s-{id}"),
          class_grade:  grade,
          weekly_hours: 2,
          is_mandatory: true,
        })
        .collect(),
    }
  }

  #[test]
  fn letters_are_normalised() {
    assert_eq!(normalize_letter(" b ").unwrap(), "B");
    assert!(normalize_letter("").is_err());
    assert!(normalize_letter("ABCD").is_err());
    assert!(normalize_letter("A1").is_err());
  }

  #[test]
  fn every_subject_needs_a_teacher() {
    let school = Uuid::new_v4();
    let (math, physics) = (Uuid::new_v4(), Uuid::new_v4());
    let p = program(school, 9, &[math, physics]);
    let t = teacher(school, vec![math]);
    let teachers = HashMap::from([(t.profile_id, t.clone())]);

    let err = validate_assignments(
      &p,
      9,
      t.profile_id,
      school,
      &[AssignmentInput { subject_id: math, teacher_id: t.profile_id }],
      &teachers,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Validation(msg) if msg.contains("missing")));
  }

  #[test]
  fn teacher_must_teach_subject_outside_early_grades() {
    let school = Uuid::new_v4();
    let math = Uuid::new_v4();
    let master = teacher(school, vec![]);
    let teachers = HashMap::from([(master.profile_id, master.clone())]);
    let inputs = [AssignmentInput { subject_id: math, teacher_id: master.profile_id }];

    let high = program(school, 9, &[math]);
    assert!(
      validate_assignments(&high, 9, master.profile_id, school, &inputs, &teachers)
        .is_err()
    );

    let primary = program(school, 2, &[math]);
    let assignments =
      validate_assignments(&primary, 2, master.profile_id, school, &inputs, &teachers)
        .unwrap();
    assert_eq!(assignments.len(), 1);
    assert!(assignments[0].is_class_master);
  }

  #[test]
  fn teacher_of_other_school_rejected() {
    let school = Uuid::new_v4();
    let math = Uuid::new_v4();
    let outsider = teacher(Uuid::new_v4(), vec![math]);
    let teachers = HashMap::from([(outsider.profile_id, outsider.clone())]);
    let p = program(school, 9, &[math]);
    let result = validate_assignments(
      &p,
      9,
      Uuid::new_v4(),
      school,
      &[AssignmentInput { subject_id: math, teacher_id: outsider.profile_id }],
      &teachers,
    );
    assert!(result.is_err());
  }

  #[test]
  fn roster_diff_detects_changes_and_duplicates() {
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (added, removed) = roster_diff(&[a, b], &[b, c]).unwrap();
    assert_eq!(added, vec![c]);
    assert_eq!(removed, vec![a]);
    assert!(roster_diff(&[a], &[b, b]).is_err());
  }
}
