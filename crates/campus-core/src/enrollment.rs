//! The enrollment state machine.
//!
//! For a given academic year a student is either unenrolled or enrolled in
//! exactly one study class. Enrollment is materialised as one
//! [`CatalogPerYear`] plus one [`CatalogPerSubject`] for every subject the
//! class teaches (including the coordination subject).
//!
//! The functions here are pure: they decide *what* has to change. Storage
//! backends load the inputs and apply the resulting actions inside a single
//! transaction.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::{
  Error, Result,
  calendar::MAX_CLASS_GRADE,
  catalog::{CatalogPerSubject, CatalogPerYear},
  profile::{UserProfile, UserRole},
  program::AcademicProgram,
  school::{SchoolUnit, Subject},
  study_class::{
    AssignmentInput, CloneRequest, StudyClass, TeacherAssignment,
    check_program_for_class, may_teach, normalize_letter,
  },
};

// ─── Subject slots ───────────────────────────────────────────────────────────

/// A subject a class teaches, with the teacher responsible for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSlot {
  pub subject_id:      Uuid,
  pub subject_name:    String,
  pub teacher_id:      Uuid,
  pub is_coordination: bool,
}

/// Every subject a student of `class` is catalogued for: the teacher
/// assignments plus the coordination subject held by the class master.
pub fn class_slots(class: &StudyClass, coordination: &Subject) -> Vec<SubjectSlot> {
  class
    .teachers
    .iter()
    .map(|a| SubjectSlot {
      subject_id:      a.subject_id,
      subject_name:    a.subject_name.clone(),
      teacher_id:      a.teacher_id,
      is_coordination: false,
    })
    .chain(std::iter::once(SubjectSlot {
      subject_id:      coordination.subject_id,
      subject_name:    coordination.name.clone(),
      teacher_id:      class.class_master_id,
      is_coordination: true,
    }))
    .collect()
}

/// Fresh catalogs for a student entering `class`.
pub fn enrollment_catalogs(
  student_id: Uuid,
  class: &StudyClass,
  coordination: &Subject,
) -> (CatalogPerYear, Vec<CatalogPerSubject>) {
  let year = CatalogPerYear::new(student_id, class.study_class_id, class.academic_year);
  let subjects = class_slots(class, coordination)
    .into_iter()
    .map(|slot| new_subject_catalog(student_id, class, slot))
    .collect();
  (year, subjects)
}

fn new_subject_catalog(
  student_id: Uuid,
  class: &StudyClass,
  slot: SubjectSlot,
) -> CatalogPerSubject {
  CatalogPerSubject::new(
    student_id,
    class.study_class_id,
    class.academic_year,
    slot.subject_id,
    slot.subject_name,
    slot.teacher_id,
    slot.is_coordination,
  )
}

// ─── Curriculum reconciliation ───────────────────────────────────────────────

/// How the subjects of two classes relate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectReconciliation {
  /// Subjects taught by both; the slot is the destination's.
  pub kept:    Vec<SubjectSlot>,
  /// Subjects only the source teaches.
  pub dropped: Vec<SubjectSlot>,
  /// Subjects only the destination teaches.
  pub added:   Vec<SubjectSlot>,
}

pub fn reconcile_subjects(
  source: &[SubjectSlot],
  destination: &[SubjectSlot],
) -> SubjectReconciliation {
  let source_ids: HashSet<Uuid> = source.iter().map(|s| s.subject_id).collect();
  let destination_ids: HashSet<Uuid> =
    destination.iter().map(|s| s.subject_id).collect();

  let (kept, added) = destination
    .iter()
    .cloned()
    .partition(|slot| source_ids.contains(&slot.subject_id));
  let dropped = source
    .iter()
    .filter(|slot| !destination_ids.contains(&slot.subject_id))
    .cloned()
    .collect();

  SubjectReconciliation { kept, dropped, added }
}

// ─── Transfer ────────────────────────────────────────────────────────────────

/// A single change to a student's subject catalogs.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogAction {
  /// Keep the catalog with its grades and absences, attach it to another
  /// class and teacher.
  Move { catalog_id: Uuid, study_class_id: Uuid, teacher_id: Uuid },
  /// The subject is no longer taught to the student; keep the history.
  Detach { catalog_id: Uuid },
  /// Re-activate a catalog detached earlier in the same year.
  Reenroll { catalog_id: Uuid, study_class_id: Uuid, teacher_id: Uuid },
  Create(CatalogPerSubject),
}

/// Preconditions of a mid-year transfer.
pub fn check_transfer(
  student: &UserProfile,
  source: &StudyClass,
  destination: &StudyClass,
  current_year: i32,
) -> Result<()> {
  if student.role != UserRole::Student || !student.is_active {
    return Err(Error::validation(format!(
      "{} is not an active student",
      student.profile_id
    )));
  }
  if !source.has_student(student.profile_id) {
    return Err(Error::validation(format!(
      "{} is not enrolled in {}",
      student.full_name,
      source.name()
    )));
  }
  if source.study_class_id == destination.study_class_id {
    return Err(Error::validation("student is already in this class"));
  }
  if source.school_unit_id != destination.school_unit_id {
    return Err(Error::validation(
      "students can only be moved inside their school unit",
    ));
  }
  if source.academic_year != current_year
    || destination.academic_year != current_year
  {
    return Err(Error::validation(format!(
      "students can only be moved between classes of {current_year}"
    )));
  }
  if source.class_grade != destination.class_grade {
    return Err(Error::validation(format!(
      "student's class grade {} does not match the destination grade {}",
      source.class_grade, destination.class_grade
    )));
  }
  Ok(())
}

/// Plan the catalog changes of moving a student from `source` to
/// `destination`. `catalogs` are the student's subject catalogs of the
/// academic year.
pub fn plan_transfer(
  student_id: Uuid,
  source: &StudyClass,
  destination: &StudyClass,
  coordination: &Subject,
  catalogs: &[CatalogPerSubject],
) -> Vec<CatalogAction> {
  let reconciliation = reconcile_subjects(
    &class_slots(source, coordination),
    &class_slots(destination, coordination),
  );
  let by_subject: HashMap<Uuid, &CatalogPerSubject> =
    catalogs.iter().map(|c| (c.subject_id, c)).collect();

  let mut actions = Vec::new();

  for slot in reconciliation.kept.into_iter().chain(reconciliation.added) {
    let action = match by_subject.get(&slot.subject_id) {
      Some(c) if c.is_enrolled => CatalogAction::Move {
        catalog_id:     c.catalog_id,
        study_class_id: destination.study_class_id,
        teacher_id:     slot.teacher_id,
      },
      Some(c) => CatalogAction::Reenroll {
        catalog_id:     c.catalog_id,
        study_class_id: destination.study_class_id,
        teacher_id:     slot.teacher_id,
      },
      None => CatalogAction::Create(new_subject_catalog(student_id, destination, slot)),
    };
    actions.push(action);
  }

  for slot in reconciliation.dropped {
    if let Some(c) = by_subject.get(&slot.subject_id)
      && c.is_enrolled
    {
      actions.push(CatalogAction::Detach { catalog_id: c.catalog_id });
    }
  }
  actions
}

/// Apply `actions` to an in-memory copy of the student's catalogs.
///
/// Backends use the result to recompute the per-year catalog before writing.
pub fn apply_actions(
  catalogs: &[CatalogPerSubject],
  actions: &[CatalogAction],
) -> Vec<CatalogPerSubject> {
  let mut result = catalogs.to_vec();
  for action in actions {
    match action {
      CatalogAction::Move { catalog_id, study_class_id, teacher_id }
      | CatalogAction::Reenroll { catalog_id, study_class_id, teacher_id } => {
        if let Some(c) = result.iter_mut().find(|c| c.catalog_id == *catalog_id) {
          c.study_class_id = *study_class_id;
          c.teacher_id = *teacher_id;
          c.is_enrolled = true;
        }
      }
      CatalogAction::Detach { catalog_id } => {
        if let Some(c) = result.iter_mut().find(|c| c.catalog_id == *catalog_id) {
          c.is_enrolled = false;
        }
      }
      CatalogAction::Create(catalog) => result.push(catalog.clone()),
    }
  }
  result
}

// ─── Teacher changes ─────────────────────────────────────────────────────────

/// Subjects whose teacher differs between the current class and the new
/// assignments: `(subject_id, new_teacher_id)`.
pub fn teacher_changes(
  current: &StudyClass,
  assignments: &[TeacherAssignment],
) -> Vec<(Uuid, Uuid)> {
  assignments
    .iter()
    .filter(|a| current.teacher_for(a.subject_id) != Some(a.teacher_id))
    .map(|a| (a.subject_id, a.teacher_id))
    .collect()
}

// ─── Clone to next year ──────────────────────────────────────────────────────

/// The new class produced by [`plan_clone`], ready for the regular class
/// creation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonePlan {
  pub class_grade:     u8,
  pub class_letter:    String,
  pub academic_year:   i32,
  pub class_master_id: Uuid,
  pub teachers:        Vec<AssignmentInput>,
  pub student_ids:     Vec<Uuid>,
}

/// Everything [`plan_clone`] needs besides the source class.
pub struct CloneContext<'a> {
  pub school:            &'a SchoolUnit,
  pub target_program:    &'a AcademicProgram,
  /// Profiles of every teacher referenced by the source or the request.
  pub teachers:          &'a HashMap<Uuid, UserProfile>,
  /// Profiles of the source class's students.
  pub students:          &'a HashMap<Uuid, UserProfile>,
  /// Students already enrolled somewhere in the target year.
  pub enrolled_in_next:  &'a HashSet<Uuid>,
}

/// Decide the grade, letter, class master, teachers and roster of the class
/// that continues `source` in the next academic year.
pub fn plan_clone(
  source: &StudyClass,
  request: &CloneRequest,
  ctx: &CloneContext<'_>,
) -> Result<ClonePlan> {
  if source.class_grade >= MAX_CLASS_GRADE {
    return Err(Error::validation(format!(
      "{} is a final-year class",
      source.name()
    )));
  }
  let class_grade = source.class_grade + 1;
  let academic_year = source.academic_year + 1;

  if !ctx.school.teaches_grade(class_grade) {
    return Err(Error::validation(format!(
      "school unit does not teach grade {class_grade}"
    )));
  }
  check_program_for_class(
    ctx.target_program,
    source.school_unit_id,
    class_grade,
    academic_year,
  )?;

  let class_letter =
    normalize_letter(request.class_letter.as_deref().unwrap_or(&source.class_letter))?;
  let class_master_id = request.class_master_id.unwrap_or(source.class_master_id);

  let requested: HashMap<Uuid, Uuid> = request
    .teachers
    .iter()
    .map(|a| (a.subject_id, a.teacher_id))
    .collect();

  let mut teachers = Vec::new();
  let mut missing = Vec::new();
  for subject in ctx.target_program.subjects_for_grade(class_grade) {
    if let Some(teacher_id) = requested.get(&subject.subject_id) {
      teachers.push(AssignmentInput {
        subject_id: subject.subject_id,
        teacher_id: *teacher_id,
      });
      continue;
    }

    let carried = source.teacher_for(subject.subject_id).filter(|teacher_id| {
      ctx.teachers.get(teacher_id).is_some_and(|t| {
        t.is_active_member(UserRole::Teacher, source.school_unit_id)
          && may_teach(t, subject.subject_id, class_grade, class_master_id)
      })
    });
    match carried {
      Some(teacher_id) => teachers.push(AssignmentInput {
        subject_id: subject.subject_id,
        teacher_id,
      }),
      None => missing.push(subject.subject_name.as_str()),
    }
  }
  if !missing.is_empty() {
    return Err(Error::validation(format!(
      "missing teachers for: {}",
      missing.join(", ")
    )));
  }

  let student_ids = source
    .student_ids
    .iter()
    .filter(|id| {
      ctx.students.get(id).is_some_and(|s| {
        s.is_active_member(UserRole::Student, source.school_unit_id)
      }) && !ctx.enrolled_in_next.contains(id)
    })
    .copied()
    .collect();

  Ok(ClonePlan {
    class_grade,
    class_letter,
    academic_year,
    class_master_id,
    teachers,
    student_ids,
  })
}
