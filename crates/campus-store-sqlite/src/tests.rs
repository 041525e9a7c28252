//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeMap;

use campus_core::{
  Error as CoreError,
  calendar::{AcademicCalendar, Semester, Term},
  catalog::{CatalogFlags, GradeType, NewAbsence, NewGrade},
  notification::{DeliveryChannel, NewNotification, NotificationTarget},
  profile::{NewProfile, UserProfile, UserRole},
  program::{GenericSubjectInput, NewGenericProgram, NewProgram, OptionalSubjectInput},
  school::{NewSchool, NewSubject, SchoolCategory, Subject},
  statistics::Thresholds,
  store::{
    CalendarStore, CatalogStore, NotificationStore, ProfileStore, ProgramStore, SchoolStore,
    StatisticsStore, StoreError, StudyClassStore,
  },
  study_class::{AssignmentInput, CloneRequest, NewStudyClass, StudyClass, StudyClassUpdate},
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::{Error, SqliteStore};

const YEAR: i32 = 2024;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate { date(2025, 3, 3) }

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn is_validation(e: &Error) -> bool {
  matches!(e.domain(), Some(CoreError::Validation(_)))
}

fn is_conflict(e: &Error) -> bool {
  matches!(e.domain(), Some(CoreError::Conflict(_)))
}

// ─── Fixture ─────────────────────────────────────────────────────────────────

/// A high school with two programs for 2024, four teachers, three students
/// and a parent.
struct World {
  store:          SqliteStore,
  school_id:      Uuid,
  principal:      UserProfile,
  math:           Subject,
  physics:        Subject,
  chemistry:      Subject,
  /// Grades 9 and 10: math and physics.
  program:        Uuid,
  /// Grade 9: math and chemistry.
  chem_program:   Uuid,
  generic:        Uuid,
  t_math:         UserProfile,
  t_phys:         UserProfile,
  t_phys2:        UserProfile,
  t_chem:         UserProfile,
  s1:             UserProfile,
  s2:             UserProfile,
  s3:             UserProfile,
  parent:         UserProfile,
}

async fn teacher(s: &SqliteStore, school: Uuid, name: &str, subjects: &[Uuid]) -> UserProfile {
  let mut input = NewProfile::new(UserRole::Teacher, Some(school), name, name);
  input.email = Some(format!("{name}@school.example"));
  input.taught_subject_ids = subjects.to_vec();
  s.create_profile(input).await.unwrap()
}

async fn world() -> World {
  let store = store().await;

  let mut principal = NewProfile::new(UserRole::Principal, None, "director", "Ana Pop");
  principal.email = Some("director@school.example".into());
  let principal = store.create_profile(principal).await.unwrap();

  let school = store
    .create_school(NewSchool {
      name:             "Colegiul National".into(),
      address:          "Str. Lunga 1".into(),
      phone_number:     "0264000000".into(),
      email:            "office@school.example".into(),
      district:         "Cluj".into(),
      city:             "Cluj-Napoca".into(),
      categories:       vec![SchoolCategory::Highschool],
      academic_profile: None,
      principal_id:     principal.profile_id,
    })
    .await
    .unwrap();
  let principal = store.get_profile(principal.profile_id).await.unwrap().unwrap();

  let math = store.create_subject(NewSubject { name: "Matematica".into() }).await.unwrap();
  let physics = store.create_subject(NewSubject { name: "Fizica".into() }).await.unwrap();
  let chemistry = store.create_subject(NewSubject { name: "Chimie".into() }).await.unwrap();

  let generic = store
    .create_generic_program(NewGenericProgram {
      name:             "Stiinte".into(),
      category:         SchoolCategory::Highschool,
      academic_profile: None,
      subjects:         [9, 10]
        .into_iter()
        .flat_map(|grade| {
          [math.subject_id, physics.subject_id].map(|subject_id| GenericSubjectInput {
            subject_id,
            class_grade: grade,
            weekly_hours: 3,
          })
        })
        .collect(),
      optional_hours:   BTreeMap::from([(9, 2)]),
    })
    .await
    .unwrap();
  let chem_generic = store
    .create_generic_program(NewGenericProgram {
      name:             "Chimie aplicata".into(),
      category:         SchoolCategory::Highschool,
      academic_profile: None,
      subjects:         Vec::from([math.subject_id, chemistry.subject_id].map(
        |subject_id| GenericSubjectInput { subject_id, class_grade: 9, weekly_hours: 3 },
      )),
      optional_hours:   BTreeMap::new(),
    })
    .await
    .unwrap();

  let program = store
    .create_program(NewProgram {
      school_unit_id:     school.school_unit_id,
      generic_program_id: generic.generic_program_id,
      academic_year:      YEAR,
      core_subject_id:    None,
      optional_subjects:  Vec::new(),
    })
    .await
    .unwrap();
  let chem_program = store
    .create_program(NewProgram {
      school_unit_id:     school.school_unit_id,
      generic_program_id: chem_generic.generic_program_id,
      academic_year:      YEAR,
      core_subject_id:    None,
      optional_subjects:  Vec::new(),
    })
    .await
    .unwrap();

  let school_id = school.school_unit_id;
  let t_math = teacher(&store, school_id, "t.math", &[math.subject_id]).await;
  let t_phys = teacher(&store, school_id, "t.phys", &[physics.subject_id]).await;
  let t_phys2 = teacher(&store, school_id, "t.phys2", &[physics.subject_id]).await;
  let t_chem =
    teacher(&store, school_id, "t.chem", &[chemistry.subject_id, math.subject_id]).await;

  let mut parent = NewProfile::new(UserRole::Parent, Some(school_id), "parent", "Ion Pop");
  parent.email = Some("parent@mail.example".into());
  let parent = store.create_profile(parent).await.unwrap();

  let mut s1 = NewProfile::new(UserRole::Student, Some(school_id), "s1", "Alexandra Pop");
  s1.parent_ids = vec![parent.profile_id];
  s1.email = Some("s1@mail.example".into());
  let s1 = store.create_profile(s1).await.unwrap();
  let s2 = store
    .create_profile(NewProfile::new(UserRole::Student, Some(school_id), "s2", "Bogdan Ilie"))
    .await
    .unwrap();
  let s3 = store
    .create_profile(NewProfile::new(UserRole::Student, Some(school_id), "s3", "Carmen Dan"))
    .await
    .unwrap();

  store
    .set_calendar(AcademicCalendar {
      academic_year:   YEAR,
      first_semester:  Term { starts_on: date(2024, 9, 9), ends_on: date(2025, 1, 31) },
      second_semester: Term { starts_on: date(2025, 2, 10), ends_on: date(2025, 6, 20) },
    })
    .await
    .unwrap();

  World {
    store,
    school_id,
    principal,
    math,
    physics,
    chemistry,
    program: program.program_id,
    chem_program: chem_program.program_id,
    generic: generic.generic_program_id,
    t_math,
    t_phys,
    t_phys2,
    t_chem,
    s1,
    s2,
    s3,
    parent,
  }
}

impl World {
  /// Grade 9 class `A` of the science program, mastered by the math teacher.
  async fn class_a(&self, students: &[Uuid]) -> StudyClass {
    self
      .store
      .create_study_class(
        NewStudyClass {
          school_unit_id:  self.school_id,
          program_id:      self.program,
          class_grade:     9,
          class_letter:    "a".into(),
          academic_year:   YEAR,
          class_master_id: self.t_math.profile_id,
          teachers:        vec![
            AssignmentInput {
              subject_id: self.math.subject_id,
              teacher_id: self.t_math.profile_id,
            },
            AssignmentInput {
              subject_id: self.physics.subject_id,
              teacher_id: self.t_phys.profile_id,
            },
          ],
          student_ids:     students.to_vec(),
        },
        YEAR,
      )
      .await
      .unwrap()
  }

  /// Grade 9 class `C` of the chemistry program, mastered by the chemistry
  /// teacher.
  async fn class_c(&self, students: &[Uuid]) -> StudyClass {
    self
      .store
      .create_study_class(
        NewStudyClass {
          school_unit_id:  self.school_id,
          program_id:      self.chem_program,
          class_grade:     9,
          class_letter:    "C".into(),
          academic_year:   YEAR,
          class_master_id: self.t_chem.profile_id,
          teachers:        vec![
            AssignmentInput {
              subject_id: self.math.subject_id,
              teacher_id: self.t_chem.profile_id,
            },
            AssignmentInput {
              subject_id: self.chemistry.subject_id,
              teacher_id: self.t_chem.profile_id,
            },
          ],
          student_ids:     students.to_vec(),
        },
        YEAR,
      )
      .await
      .unwrap()
  }

  async fn catalog_id(&self, student: Uuid, subject: Uuid) -> Uuid {
    self
      .store
      .student_catalogs(student, YEAR)
      .await
      .unwrap()
      .into_iter()
      .find(|c| c.subject_id == subject)
      .expect("catalog for subject")
      .catalog_id
  }

  async fn grade(&self, catalog_id: Uuid, grade: u8, taken_at: NaiveDate) {
    self
      .store
      .add_grade(
        catalog_id,
        NewGrade { grade, taken_at, grade_type: GradeType::Regular },
        today(),
      )
      .await
      .unwrap();
  }
}

// ─── Programs ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn program_copies_generic_subjects_and_creates_optionals() {
  let w = world().await;
  let program = w
    .store
    .create_program(NewProgram {
      school_unit_id:     w.school_id,
      generic_program_id: w.generic,
      academic_year:      YEAR + 1,
      core_subject_id:    None,
      optional_subjects:  vec![OptionalSubjectInput {
        subject_id:   None,
        subject_name: Some("Astronomie".into()),
        class_grade:  9,
        weekly_hours: 1,
      }],
    })
    .await
    .unwrap();

  assert_eq!(program.subjects.len(), 5);
  let optional = program.subjects.iter().find(|s| !s.is_mandatory).unwrap();
  assert_eq!(optional.subject_name, "Astronomie");
  assert!(
    w.store
      .list_subjects()
      .await
      .unwrap()
      .iter()
      .any(|s| s.name == "Astronomie")
  );
}

#[tokio::test]
async fn optional_hours_over_allowance_rejected() {
  let w = world().await;
  let err = w
    .store
    .create_program(NewProgram {
      school_unit_id:     w.school_id,
      generic_program_id: w.generic,
      academic_year:      YEAR + 1,
      core_subject_id:    None,
      optional_subjects:  vec![OptionalSubjectInput {
        subject_id:   Some(w.chemistry.subject_id),
        subject_name: None,
        class_grade:  9,
        weekly_hours: 3,
      }],
    })
    .await
    .unwrap_err();
  assert!(is_validation(&err));
}

#[tokio::test]
async fn program_in_use_cannot_be_deleted() {
  let w = world().await;
  w.class_a(&[]).await;
  let err = w.store.delete_program(w.program).await.unwrap_err();
  assert!(is_conflict(&err));
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn creating_a_class_enrolls_students() {
  let w = world().await;
  let class = w.class_a(&[w.s1.profile_id, w.s2.profile_id]).await;

  assert_eq!(class.class_letter, "A");
  assert_eq!(class.student_ids.len(), 2);

  let catalogs = w.store.student_catalogs(w.s1.profile_id, YEAR).await.unwrap();
  assert_eq!(catalogs.len(), 3, "math, physics and coordination");
  let coordination = catalogs.iter().find(|c| c.is_coordination_subject).unwrap();
  assert_eq!(coordination.teacher_id, w.t_math.profile_id);
  let physics = catalogs.iter().find(|c| c.subject_id == w.physics.subject_id).unwrap();
  assert_eq!(physics.teacher_id, w.t_phys.profile_id);

  let year = w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  assert_eq!(year.study_class_id, class.study_class_id);

  let s1 = w.store.get_profile(w.s1.profile_id).await.unwrap().unwrap();
  assert_eq!(s1.student_in_class_id, Some(class.study_class_id));
}

#[tokio::test]
async fn student_cannot_join_two_classes_of_a_year() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let err = w
    .store
    .create_study_class(
      NewStudyClass {
        school_unit_id:  w.school_id,
        program_id:      w.chem_program,
        class_grade:     9,
        class_letter:    "C".into(),
        academic_year:   YEAR,
        class_master_id: w.t_chem.profile_id,
        teachers:        vec![
          AssignmentInput { subject_id: w.math.subject_id, teacher_id: w.t_chem.profile_id },
          AssignmentInput {
            subject_id: w.chemistry.subject_id,
            teacher_id: w.t_chem.profile_id,
          },
        ],
        student_ids:     vec![w.s1.profile_id],
      },
      YEAR,
    )
    .await
    .unwrap_err();
  assert!(is_conflict(&err));

  // The failed create left nothing behind.
  let classes = w.store.list_study_classes(Default::default()).await.unwrap();
  assert_eq!(classes.len(), 1);
}

#[tokio::test]
async fn class_master_can_lead_only_one_class_per_year() {
  let w = world().await;
  w.class_a(&[]).await;
  let err = w
    .store
    .create_study_class(
      NewStudyClass {
        school_unit_id:  w.school_id,
        program_id:      w.program,
        class_grade:     10,
        class_letter:    "A".into(),
        academic_year:   YEAR,
        class_master_id: w.t_math.profile_id,
        teachers:        vec![
          AssignmentInput { subject_id: w.math.subject_id, teacher_id: w.t_math.profile_id },
          AssignmentInput {
            subject_id: w.physics.subject_id,
            teacher_id: w.t_phys.profile_id,
          },
        ],
        student_ids:     Vec::new(),
      },
      YEAR,
    )
    .await
    .unwrap_err();
  assert!(is_conflict(&err));
}

#[tokio::test]
async fn removing_a_student_with_records_rolls_back() {
  let w = world().await;
  let class = w.class_a(&[w.s1.profile_id, w.s2.profile_id]).await;
  let math = w.catalog_id(w.s1.profile_id, w.math.subject_id).await;
  w.store
    .add_absence(math, NewAbsence { taken_at: date(2025, 2, 12), is_founded: false }, today())
    .await
    .unwrap();

  let err = w
    .store
    .update_study_class(
      class.study_class_id,
      StudyClassUpdate {
        class_master_id: w.t_math.profile_id,
        teachers:        vec![
          AssignmentInput { subject_id: w.math.subject_id, teacher_id: w.t_math.profile_id },
          AssignmentInput {
            subject_id: w.physics.subject_id,
            teacher_id: w.t_phys2.profile_id,
          },
        ],
        student_ids:     vec![w.s2.profile_id],
      },
      YEAR,
    )
    .await
    .unwrap_err();
  assert!(is_conflict(&err));

  // Neither the roster nor the teacher change was applied.
  let class = w.store.get_study_class(class.study_class_id).await.unwrap().unwrap();
  assert!(class.has_student(w.s1.profile_id));
  assert_eq!(class.teacher_for(w.physics.subject_id), Some(w.t_phys.profile_id));
}

#[tokio::test]
async fn teacher_changes_follow_into_catalogs() {
  let w = world().await;
  let class = w.class_a(&[w.s1.profile_id]).await;

  let updated = w
    .store
    .update_study_class(
      class.study_class_id,
      StudyClassUpdate {
        class_master_id: w.t_phys.profile_id,
        teachers:        vec![
          AssignmentInput { subject_id: w.math.subject_id, teacher_id: w.t_chem.profile_id },
          AssignmentInput {
            subject_id: w.physics.subject_id,
            teacher_id: w.t_phys.profile_id,
          },
        ],
        student_ids:     vec![w.s1.profile_id, w.s3.profile_id],
      },
      YEAR,
    )
    .await
    .unwrap();
  assert_eq!(updated.class_master_id, w.t_phys.profile_id);
  assert_eq!(updated.student_ids.len(), 2);

  for student in [w.s1.profile_id, w.s3.profile_id] {
    let catalogs = w.store.student_catalogs(student, YEAR).await.unwrap();
    let math = catalogs.iter().find(|c| c.subject_id == w.math.subject_id).unwrap();
    assert_eq!(math.teacher_id, w.t_chem.profile_id);
    let coordination = catalogs.iter().find(|c| c.is_coordination_subject).unwrap();
    assert_eq!(coordination.teacher_id, w.t_phys.profile_id);
  }
}

#[tokio::test]
async fn deleting_an_empty_class_unenrolls_students() {
  let w = world().await;
  let class = w.class_a(&[w.s1.profile_id]).await;
  w.store.delete_study_class(class.study_class_id, YEAR).await.unwrap();

  assert!(w.store.get_study_class(class.study_class_id).await.unwrap().is_none());
  assert!(w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().is_none());
  assert!(w.store.student_catalogs(w.s1.profile_id, YEAR).await.unwrap().is_empty());
  let s1 = w.store.get_profile(w.s1.profile_id).await.unwrap().unwrap();
  assert_eq!(s1.student_in_class_id, None);
}

#[tokio::test]
async fn class_with_grades_cannot_be_deleted() {
  let w = world().await;
  let class = w.class_a(&[w.s1.profile_id]).await;
  let math = w.catalog_id(w.s1.profile_id, w.math.subject_id).await;
  w.grade(math, 7, date(2024, 10, 1)).await;

  let err = w.store.delete_study_class(class.study_class_id, YEAR).await.unwrap_err();
  assert!(is_conflict(&err));
}

// ─── Transfer ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transfer_reconciles_subject_catalogs() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id, w.s2.profile_id]).await;
  let c = w.class_c(&[w.s3.profile_id]).await;

  let math = w.catalog_id(w.s1.profile_id, w.math.subject_id).await;
  let physics = w.catalog_id(w.s1.profile_id, w.physics.subject_id).await;
  w.grade(math, 9, date(2024, 10, 1)).await;
  w.grade(physics, 6, date(2024, 10, 2)).await;

  let destination = w
    .store
    .move_student(w.s1.profile_id, c.study_class_id, YEAR)
    .await
    .unwrap();
  assert!(destination.has_student(w.s1.profile_id));
  let source = w.store.get_study_class(a.study_class_id).await.unwrap().unwrap();
  assert!(!source.has_student(w.s1.profile_id));

  let catalogs = w.store.student_catalogs(w.s1.profile_id, YEAR).await.unwrap();
  assert_eq!(catalogs.len(), 4);

  // Shared subject: same catalog, grades kept, destination teacher.
  let moved = w.store.get_catalog_per_subject(math).await.unwrap().unwrap();
  assert_eq!(moved.catalog.study_class_id, c.study_class_id);
  assert_eq!(moved.catalog.teacher_id, w.t_chem.profile_id);
  assert!(moved.catalog.is_enrolled);
  assert_eq!(moved.grades.len(), 1);

  // Source-only subject: history kept, detached.
  let detached = catalogs.iter().find(|c| c.catalog_id == physics).unwrap();
  assert!(!detached.is_enrolled);
  assert_eq!(detached.study_class_id, a.study_class_id);

  // Destination-only subject: fresh catalog.
  let chemistry = catalogs.iter().find(|c| c.subject_id == w.chemistry.subject_id).unwrap();
  assert!(chemistry.is_enrolled);
  assert_eq!(chemistry.study_class_id, c.study_class_id);
  assert_eq!(chemistry.avg_sem1, None);

  let coordination = catalogs.iter().find(|c| c.is_coordination_subject).unwrap();
  assert_eq!(coordination.teacher_id, w.t_chem.profile_id);
  assert_eq!(coordination.study_class_id, c.study_class_id);

  let year = w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  assert_eq!(year.study_class_id, c.study_class_id);
  let s1 = w.store.get_profile(w.s1.profile_id).await.unwrap().unwrap();
  assert_eq!(s1.student_in_class_id, Some(c.study_class_id));

  // Detached catalogs no longer show up in the source class.
  let listed = w
    .store
    .list_class_subject_catalogs(a.study_class_id, w.physics.subject_id)
    .await
    .unwrap();
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].student_id, w.s2.profile_id);
}

#[tokio::test]
async fn transfer_back_reenrolls_detached_catalog() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id]).await;
  let c = w.class_c(&[]).await;
  let physics = w.catalog_id(w.s1.profile_id, w.physics.subject_id).await;
  w.grade(physics, 8, date(2024, 10, 2)).await;

  w.store.move_student(w.s1.profile_id, c.study_class_id, YEAR).await.unwrap();
  w.store.move_student(w.s1.profile_id, a.study_class_id, YEAR).await.unwrap();

  let detail = w.store.get_catalog_per_subject(physics).await.unwrap().unwrap();
  assert!(detail.catalog.is_enrolled);
  assert_eq!(detail.grades.len(), 1);
  let chemistry = w
    .store
    .student_catalogs(w.s1.profile_id, YEAR)
    .await
    .unwrap()
    .into_iter()
    .find(|c| c.subject_id == w.chemistry.subject_id)
    .unwrap();
  assert!(!chemistry.is_enrolled);
}

#[tokio::test]
async fn reenrolling_restores_year_totals_from_kept_catalogs() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id]).await;
  let c = w.class_c(&[]).await;
  let physics = w.catalog_id(w.s1.profile_id, w.physics.subject_id).await;
  w.store
    .add_absence(physics, NewAbsence { taken_at: date(2024, 10, 1), is_founded: false }, today())
    .await
    .unwrap();

  w.store.move_student(w.s1.profile_id, c.study_class_id, YEAR).await.unwrap();
  w.store
    .update_study_class(
      c.study_class_id,
      StudyClassUpdate {
        class_master_id: w.t_chem.profile_id,
        teachers:        vec![
          AssignmentInput {
            subject_id: w.math.subject_id,
            teacher_id: w.t_chem.profile_id,
          },
          AssignmentInput {
            subject_id: w.chemistry.subject_id,
            teacher_id: w.t_chem.profile_id,
          },
        ],
        student_ids:     Vec::new(),
      },
      YEAR,
    )
    .await
    .unwrap();
  assert!(w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().is_none());

  // The detached physics catalog still holds the absence.
  let err = w.store.delete_profile(w.s1.profile_id).await.unwrap_err();
  assert!(is_conflict(&err));

  w.store
    .update_study_class(
      a.study_class_id,
      StudyClassUpdate {
        class_master_id: w.t_math.profile_id,
        teachers:        vec![
          AssignmentInput {
            subject_id: w.math.subject_id,
            teacher_id: w.t_math.profile_id,
          },
          AssignmentInput {
            subject_id: w.physics.subject_id,
            teacher_id: w.t_phys.profile_id,
          },
        ],
        student_ids:     vec![w.s1.profile_id],
      },
      YEAR,
    )
    .await
    .unwrap();

  let detail = w.store.get_catalog_per_subject(physics).await.unwrap().unwrap();
  assert!(detail.catalog.is_enrolled);
  let enrolled: u32 = w
    .store
    .student_catalogs(w.s1.profile_id, YEAR)
    .await
    .unwrap()
    .iter()
    .filter(|c| c.is_enrolled)
    .map(|c| c.absences.unfounded_sem1)
    .sum();
  let year = w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  assert_eq!(year.absences.unfounded_sem1, 1);
  assert_eq!(year.absences.unfounded_sem1, enrolled);
}

#[tokio::test]
async fn transfer_requires_same_grade() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id]).await;
  let tenth = w
    .store
    .create_study_class(
      NewStudyClass {
        school_unit_id:  w.school_id,
        program_id:      w.program,
        class_grade:     10,
        class_letter:    "B".into(),
        academic_year:   YEAR,
        class_master_id: w.t_phys.profile_id,
        teachers:        vec![
          AssignmentInput { subject_id: w.math.subject_id, teacher_id: w.t_math.profile_id },
          AssignmentInput {
            subject_id: w.physics.subject_id,
            teacher_id: w.t_phys.profile_id,
          },
        ],
        student_ids:     Vec::new(),
      },
      YEAR,
    )
    .await
    .unwrap();

  let err = w
    .store
    .move_student(w.s1.profile_id, tenth.study_class_id, YEAR)
    .await
    .unwrap_err();
  assert!(is_validation(&err));

  let a = w.store.get_study_class(a.study_class_id).await.unwrap().unwrap();
  assert!(a.has_student(w.s1.profile_id));
}

#[tokio::test]
async fn receiver_classes_share_grade_and_year() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let c = w.class_c(&[]).await;

  let receivers = w.store.receiver_classes(w.s1.profile_id, YEAR).await.unwrap();
  assert_eq!(receivers.len(), 1);
  assert_eq!(receivers[0].study_class_id, c.study_class_id);

  assert!(w.store.receiver_classes(w.s2.profile_id, YEAR).await.unwrap().is_empty());
}

// ─── Clone ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn clone_carries_teachers_and_students_into_next_year() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id, w.s2.profile_id]).await;
  let next = w.store.copy_program(w.program, YEAR + 1).await.unwrap();

  let cloned = w
    .store
    .clone_to_next_year(
      a.study_class_id,
      CloneRequest { program_id: next.program_id, ..Default::default() },
      YEAR,
    )
    .await
    .unwrap();

  assert_eq!(cloned.class_grade, 10);
  assert_eq!(cloned.academic_year, YEAR + 1);
  assert_eq!(cloned.class_letter, "A");
  assert_eq!(cloned.class_master_id, w.t_math.profile_id);
  assert_eq!(cloned.teacher_for(w.physics.subject_id), Some(w.t_phys.profile_id));
  assert_eq!(cloned.student_ids.len(), 2);

  let next_year = w.store.student_catalogs(w.s1.profile_id, YEAR + 1).await.unwrap();
  assert_eq!(next_year.len(), 3);
  // The current-year class stays the student's class.
  let s1 = w.store.get_profile(w.s1.profile_id).await.unwrap().unwrap();
  assert_eq!(s1.student_in_class_id, Some(a.study_class_id));

  // Cloning again hits the taken letter.
  let err = w
    .store
    .clone_to_next_year(
      a.study_class_id,
      CloneRequest { program_id: next.program_id, ..Default::default() },
      YEAR,
    )
    .await
    .unwrap_err();
  assert!(is_conflict(&err));
}

#[tokio::test]
async fn clone_requires_teachers_for_uncovered_subjects() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id, w.s3.profile_id]).await;
  let next = w.store.copy_program(w.program, YEAR + 1).await.unwrap();
  w.store.set_active(w.t_phys.profile_id, false).await.unwrap();
  w.store.set_active(w.s3.profile_id, false).await.unwrap();

  let err = w
    .store
    .clone_to_next_year(
      a.study_class_id,
      CloneRequest { program_id: next.program_id, ..Default::default() },
      YEAR,
    )
    .await
    .unwrap_err();
  assert!(matches!(err.domain(), Some(CoreError::Validation(msg)) if msg.contains("Fizica")));

  let cloned = w
    .store
    .clone_to_next_year(
      a.study_class_id,
      CloneRequest {
        program_id: next.program_id,
        class_letter: Some("b".into()),
        teachers: vec![AssignmentInput {
          subject_id: w.physics.subject_id,
          teacher_id: w.t_phys2.profile_id,
        }],
        ..Default::default()
      },
      YEAR,
    )
    .await
    .unwrap();
  assert_eq!(cloned.class_letter, "B");
  assert_eq!(cloned.teacher_for(w.physics.subject_id), Some(w.t_phys2.profile_id));
  assert_eq!(cloned.student_ids, vec![w.s1.profile_id]);
}

#[tokio::test]
async fn final_grade_program_cannot_receive_clone() {
  let w = world().await;
  let c = w.class_c(&[]).await;
  let next = w.store.copy_program(w.chem_program, YEAR + 1).await.unwrap();

  // The chemistry program has no grade 10.
  let err = w
    .store
    .clone_to_next_year(
      c.study_class_id,
      CloneRequest { program_id: next.program_id, ..Default::default() },
      YEAR,
    )
    .await
    .unwrap_err();
  assert!(is_validation(&err));
}

// ─── Grades ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn grades_recompute_subject_and_year_averages() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let math = w.catalog_id(w.s1.profile_id, w.math.subject_id).await;
  let physics = w.catalog_id(w.s1.profile_id, w.physics.subject_id).await;

  w.grade(math, 8, date(2024, 10, 1)).await;
  w.grade(math, 10, date(2024, 11, 1)).await;
  let detail = w.store.get_catalog_per_subject(math).await.unwrap().unwrap();
  assert_eq!(detail.catalog.avg_sem1, Some(9.0));

  let year = w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  assert_eq!(year.avg_sem1, None, "physics has no average yet");

  w.grade(physics, 7, date(2024, 12, 2)).await;
  let year = w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  // (9 + 7 + 10) / 3
  assert_eq!(year.avg_sem1, Some(8.67));

  let grade_id = detail.grades[0].grade_id;
  w.store.delete_grade(grade_id).await.unwrap();
  let detail = w.store.get_catalog_per_subject(math).await.unwrap().unwrap();
  assert_eq!(detail.catalog.avg_sem1, Some(10.0));
}

#[tokio::test]
async fn grade_outside_semesters_rejected() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let math = w.catalog_id(w.s1.profile_id, w.math.subject_id).await;

  for taken_at in [date(2025, 2, 5), date(2025, 3, 20), date(2024, 8, 30)] {
    let err = w
      .store
      .add_grade(math, NewGrade { grade: 9, taken_at, grade_type: GradeType::Regular }, today())
      .await
      .unwrap_err();
    assert!(is_validation(&err), "{taken_at}");
  }
}

#[tokio::test]
async fn coordination_catalog_takes_no_grades() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let coordination = w.store.coordination_subject().await.unwrap();
  let catalog = w.catalog_id(w.s1.profile_id, coordination.subject_id).await;
  let err = w
    .store
    .add_grade(
      catalog,
      NewGrade { grade: 9, taken_at: date(2024, 10, 1), grade_type: GradeType::Regular },
      today(),
    )
    .await
    .unwrap_err();
  assert!(is_validation(&err));
}

#[tokio::test]
async fn thesis_completes_semester_average() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let math = w.catalog_id(w.s1.profile_id, w.math.subject_id).await;
  w.grade(math, 8, date(2024, 10, 1)).await;

  let catalog = w
    .store
    .set_catalog_flags(math, CatalogFlags { wants_thesis: true, is_exempted: false })
    .await
    .unwrap();
  assert_eq!(catalog.avg_sem1, None);

  w.store
    .add_grade(
      math,
      NewGrade { grade: 4, taken_at: date(2024, 12, 10), grade_type: GradeType::Thesis },
      today(),
    )
    .await
    .unwrap();
  let detail = w.store.get_catalog_per_subject(math).await.unwrap().unwrap();
  assert_eq!(detail.catalog.avg_sem1, Some(7.0));

  let err = w
    .store
    .add_grade(
      math,
      NewGrade { grade: 9, taken_at: date(2024, 12, 11), grade_type: GradeType::Thesis },
      today(),
    )
    .await
    .unwrap_err();
  assert!(is_conflict(&err));
}

#[tokio::test]
async fn absences_are_counted_and_authorized() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let math = w.catalog_id(w.s1.profile_id, w.math.subject_id).await;
  let physics = w.catalog_id(w.s1.profile_id, w.physics.subject_id).await;

  let absence = w
    .store
    .add_absence(math, NewAbsence { taken_at: date(2024, 10, 3), is_founded: false }, today())
    .await
    .unwrap();
  w.store
    .add_absence(physics, NewAbsence { taken_at: date(2025, 2, 11), is_founded: false }, today())
    .await
    .unwrap();

  let year = w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  assert_eq!(year.absences.unfounded_sem1, 1);
  assert_eq!(year.absences.unfounded_sem2, 1);

  let authorized = w.store.authorize_absence(absence.absence_id).await.unwrap();
  assert!(authorized.is_founded);
  let year = w.store.year_catalog(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  assert_eq!(year.absences.founded_sem1, 1);
  assert_eq!(year.absences.unfounded_sem1, 0);
}

#[tokio::test]
async fn behavior_grade_updates_year_catalog() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let year = w
    .store
    .set_behavior_grade(w.s1.profile_id, YEAR, Semester::Second, 7)
    .await
    .unwrap();
  assert_eq!(year.behavior_grade_sem2, 7);
  assert_eq!(year.behavior_grade_annual, 8.5);

  let err = w
    .store
    .set_behavior_grade(w.s1.profile_id, YEAR, Semester::First, 11)
    .await
    .unwrap_err();
  assert!(is_validation(&err));
}

#[tokio::test]
async fn report_card_lists_enrolled_subjects() {
  let w = world().await;
  w.class_a(&[w.s1.profile_id]).await;
  let card = w.store.report_card(w.s1.profile_id, YEAR).await.unwrap().unwrap();
  assert_eq!(card.class_name, "IX A");
  assert_eq!(card.subjects.len(), 2);
  assert!(w.store.report_card(w.s2.profile_id, YEAR).await.unwrap().is_none());
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[tokio::test]
async fn class_notification_reaches_parents() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id, w.s2.profile_id]).await;

  let (notification, jobs) = w
    .store
    .send_notification(w.t_math.clone(), NewNotification {
      title:    "Sedinta".into(),
      body:     "Joi la 18".into(),
      send_sms: false,
      target:   NotificationTarget::Class {
        study_class_id: a.study_class_id,
        role:           UserRole::Parent,
      },
    }, YEAR)
    .await
    .unwrap();
  assert_eq!(notification.recipients_count, 1);
  assert_eq!(jobs.len(), 1);
  assert_eq!(jobs[0].channel, DeliveryChannel::Email);
  assert_eq!(jobs[0].user_id, w.parent.profile_id);

  let received = w.store.list_received(w.parent.profile_id, true).await.unwrap();
  assert_eq!(received.len(), 1);
  w.store.mark_read(notification.notification_id, w.parent.profile_id).await.unwrap();
  assert!(w.store.list_received(w.parent.profile_id, true).await.unwrap().is_empty());

  w.store
    .mark_delivered(
      notification.notification_id,
      w.parent.profile_id,
      DeliveryChannel::Email,
      Utc::now(),
    )
    .await
    .unwrap();
  let through = w
    .store
    .recipient(notification.notification_id, w.parent.profile_id)
    .await
    .unwrap()
    .unwrap();
  assert!(through.is_read);
  assert!(through.sent_at_email.is_some());

  assert_eq!(w.store.list_sent(w.t_math.profile_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn teacher_cannot_notify_foreign_class() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id]).await;
  let err = w
    .store
    .send_notification(w.t_chem.clone(), NewNotification {
      title:    "Test".into(),
      body:     "Test".into(),
      send_sms: false,
      target:   NotificationTarget::Class {
        study_class_id: a.study_class_id,
        role:           UserRole::Student,
      },
    }, YEAR)
    .await
    .unwrap_err();
  assert!(matches!(err.domain(), Some(CoreError::Forbidden(_))));
}

#[tokio::test]
async fn teacher_notifies_parents_through_current_year_roster() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id]).await;
  let next = w.store.copy_program(w.program, YEAR + 1).await.unwrap();
  w.store
    .clone_to_next_year(
      a.study_class_id,
      CloneRequest {
        program_id: next.program_id,
        class_master_id: Some(w.t_chem.profile_id),
        ..Default::default()
      },
      YEAR,
    )
    .await
    .unwrap();
  let message = || NewNotification {
    title:    "Serbare".into(),
    body:     "Vineri la 12".into(),
    send_sms: false,
    target:   NotificationTarget::User { user_id: w.parent.profile_id },
  };

  // Before rollover the child is only in a class the sender does not teach.
  let err = w
    .store
    .send_notification(w.t_chem.clone(), message(), YEAR)
    .await
    .unwrap_err();
  assert!(matches!(err.domain(), Some(CoreError::Forbidden(_))));

  let (notification, jobs) = w
    .store
    .send_notification(w.t_chem.clone(), message(), YEAR + 1)
    .await
    .unwrap();
  assert_eq!(notification.recipients_count, 1);
  assert_eq!(jobs.len(), 1);
  assert_eq!(jobs[0].user_id, w.parent.profile_id);
}

#[tokio::test]
async fn principal_notifies_school_role() {
  let w = world().await;
  let (notification, _) = w
    .store
    .send_notification(w.principal.clone(), NewNotification {
      title:    "Consiliu".into(),
      body:     "Luni".into(),
      send_sms: false,
      target:   NotificationTarget::Role { role: UserRole::Teacher },
    }, YEAR)
    .await
    .unwrap();
  assert_eq!(notification.recipients_count, 4);
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn statistics_snapshot_and_at_risk() {
  let w = world().await;
  let a = w.class_a(&[w.s1.profile_id, w.s2.profile_id]).await;
  w.store
    .set_behavior_grade(w.s2.profile_id, YEAR, Semester::First, 5)
    .await
    .unwrap();

  let summary = w.store.compute_statistics(YEAR, Utc::now()).await.unwrap();
  assert_eq!(summary.schools, 1);
  assert_eq!(summary.study_classes, 1);

  let classes = w.store.class_statistics(w.school_id, YEAR).await.unwrap();
  assert_eq!(classes.len(), 1);
  assert_eq!(classes[0].study_class_id, a.study_class_id);
  assert_eq!(classes[0].students_count, 2);

  let schools = w.store.school_statistics(YEAR).await.unwrap();
  assert_eq!(schools[0].students_count, 2);

  let risky = w
    .store
    .at_risk_students(w.school_id, YEAR, Thresholds::default(), None)
    .await
    .unwrap();
  assert_eq!(risky.len(), 1);
  assert_eq!(risky[0].student_id, w.s2.profile_id);
}
