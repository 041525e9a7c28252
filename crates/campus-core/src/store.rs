//! Store traits implemented by storage backends (e.g. `campus-store-sqlite`).
//!
//! Higher layers (`campus-api`, `campus-server`) depend on these traits, not
//! on a concrete backend. Every write that touches more than one record must
//! be atomic: either all of its effects are persisted or none are.
//!
//! All methods return `Send` futures so the traits can be used from a
//! multi-threaded tokio runtime behind `axum`.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  Error,
  calendar::{AcademicCalendar, Semester},
  catalog::{
    CatalogFlags, CatalogPerSubject, CatalogPerYear, NewAbsence, NewGrade,
    ReportCard, SubjectAbsence, SubjectCatalogDetail, SubjectGrade,
  },
  notification::{
    DeliveryChannel, DeliveryJob, NewNotification, Notification,
    ReceivedNotification, TargetUserThrough,
  },
  profile::{Credentials, NewProfile, ProfileQuery, ProfileUpdate, UserProfile},
  program::{
    AcademicProgram, GenericAcademicProgram, NewGenericProgram, NewProgram,
    OptionalSubjectInput, ProgramQuery,
  },
  school::{NewSchool, NewSubject, SchoolQuery, SchoolUnit, Subject},
  statistics::{
    AtRiskStudent, SchoolStatistics, StatisticsSummary, StudyClassStatistics,
    Thresholds,
  },
  study_class::{
    CloneRequest, NewStudyClass, StudyClass, StudyClassQuery, StudyClassUpdate,
  },
};

/// Errors produced by a backend.
///
/// Backends wrap domain failures ([`Error`]) together with their own I/O
/// errors; [`StoreError::domain`] lets callers tell them apart.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn domain(&self) -> Option<&Error>;
}

/// Shared error type of all store traits.
pub trait Backend: Send + Sync {
  type Error: StoreError;
}

// ─── Calendar ────────────────────────────────────────────────────────────────

pub trait CalendarStore: Backend {
  /// Create or replace the calendar of `calendar.academic_year`.
  fn set_calendar(
    &self,
    calendar: AcademicCalendar,
  ) -> impl Future<Output = Result<AcademicCalendar, Self::Error>> + Send + '_;

  fn get_calendar(
    &self,
    academic_year: i32,
  ) -> impl Future<Output = Result<Option<AcademicCalendar>, Self::Error>> + Send + '_;
}

// ─── Profiles ────────────────────────────────────────────────────────────────

pub trait ProfileStore: Backend {
  fn create_profile(
    &self,
    input: NewProfile,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  /// Replace the editable fields of a profile. A teacher cannot drop a
  /// subject they teach in a class of `current_year`.
  fn update_profile(
    &self,
    id: Uuid,
    update: ProfileUpdate,
    current_year: i32,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  fn set_active(
    &self,
    id: Uuid,
    is_active: bool,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  /// Delete a profile that never logged in and has nothing attached to it.
  fn delete_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<UserProfile>, Self::Error>> + Send + '_;

  fn list_profiles(
    &self,
    query: ProfileQuery,
  ) -> impl Future<Output = Result<Vec<UserProfile>, Self::Error>> + Send + '_;

  /// Students whose parents include `parent_id`.
  fn children_of(
    &self,
    parent_id: Uuid,
  ) -> impl Future<Output = Result<Vec<UserProfile>, Self::Error>> + Send + '_;

  /// Store an argon2 PHC string for the profile.
  fn set_password(
    &self,
    id: Uuid,
    password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn credentials(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + '_;

  fn touch_last_online(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Schools and subjects ────────────────────────────────────────────────────

pub trait SchoolStore: Backend {
  /// Create a school and assign its principal to it.
  fn create_school(
    &self,
    input: NewSchool,
  ) -> impl Future<Output = Result<SchoolUnit, Self::Error>> + Send + '_;

  /// Replace a school's fields; a new principal takes over from the old one.
  fn update_school(
    &self,
    id: Uuid,
    input: NewSchool,
  ) -> impl Future<Output = Result<SchoolUnit, Self::Error>> + Send + '_;

  fn set_school_active(
    &self,
    id: Uuid,
    is_active: bool,
  ) -> impl Future<Output = Result<SchoolUnit, Self::Error>> + Send + '_;

  fn get_school(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SchoolUnit>, Self::Error>> + Send + '_;

  fn list_schools(
    &self,
    query: SchoolQuery,
  ) -> impl Future<Output = Result<Vec<SchoolUnit>, Self::Error>> + Send + '_;

  fn create_subject(
    &self,
    input: NewSubject,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  fn list_subjects(
    &self,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  fn coordination_subject(
    &self,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;
}

// ─── Programs ────────────────────────────────────────────────────────────────

pub trait ProgramStore: Backend {
  fn create_generic_program(
    &self,
    input: NewGenericProgram,
  ) -> impl Future<Output = Result<GenericAcademicProgram, Self::Error>> + Send + '_;

  fn get_generic_program(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<GenericAcademicProgram>, Self::Error>> + Send + '_;

  fn list_generic_programs(
    &self,
  ) -> impl Future<Output = Result<Vec<GenericAcademicProgram>, Self::Error>> + Send + '_;

  fn create_program(
    &self,
    input: NewProgram,
  ) -> impl Future<Output = Result<AcademicProgram, Self::Error>> + Send + '_;

  /// Replace the optional subjects of a program no class uses yet.
  fn update_program_optionals(
    &self,
    id: Uuid,
    optionals: Vec<OptionalSubjectInput>,
  ) -> impl Future<Output = Result<AcademicProgram, Self::Error>> + Send + '_;

  /// Copy a program, optional subjects included, into `target_year`.
  fn copy_program(
    &self,
    id: Uuid,
    target_year: i32,
  ) -> impl Future<Output = Result<AcademicProgram, Self::Error>> + Send + '_;

  fn delete_program(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_program(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AcademicProgram>, Self::Error>> + Send + '_;

  fn list_programs(
    &self,
    query: ProgramQuery,
  ) -> impl Future<Output = Result<Vec<AcademicProgram>, Self::Error>> + Send + '_;
}

// ─── Study classes and enrollment ────────────────────────────────────────────

pub trait StudyClassStore: Backend {
  /// Create a class and enroll its students.
  fn create_study_class(
    &self,
    input: NewStudyClass,
    current_year: i32,
  ) -> impl Future<Output = Result<StudyClass, Self::Error>> + Send + '_;

  /// Change class master, teachers and roster; catalogs follow.
  fn update_study_class(
    &self,
    id: Uuid,
    update: StudyClassUpdate,
    current_year: i32,
  ) -> impl Future<Output = Result<StudyClass, Self::Error>> + Send + '_;

  /// Fails with a conflict while any catalog of the class holds grades or
  /// absences.
  fn delete_study_class(
    &self,
    id: Uuid,
    current_year: i32,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_study_class(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<StudyClass>, Self::Error>> + Send + '_;

  fn list_study_classes(
    &self,
    query: StudyClassQuery,
  ) -> impl Future<Output = Result<Vec<StudyClass>, Self::Error>> + Send + '_;

  /// Continue a class into the next academic year.
  fn clone_to_next_year(
    &self,
    id: Uuid,
    request: CloneRequest,
    current_year: i32,
  ) -> impl Future<Output = Result<StudyClass, Self::Error>> + Send + '_;

  /// Transfer a student to another class of the same grade; returns the
  /// destination class.
  fn move_student(
    &self,
    student_id: Uuid,
    target_class_id: Uuid,
    current_year: i32,
  ) -> impl Future<Output = Result<StudyClass, Self::Error>> + Send + '_;

  /// Classes `student_id` could be moved to.
  fn receiver_classes(
    &self,
    student_id: Uuid,
    current_year: i32,
  ) -> impl Future<Output = Result<Vec<StudyClass>, Self::Error>> + Send + '_;
}

// ─── Catalogs ────────────────────────────────────────────────────────────────

pub trait CatalogStore: Backend {
  fn add_grade(
    &self,
    catalog_id: Uuid,
    input: NewGrade,
    today: NaiveDate,
  ) -> impl Future<Output = Result<SubjectGrade, Self::Error>> + Send + '_;

  fn delete_grade(
    &self,
    grade_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_grade(
    &self,
    grade_id: Uuid,
  ) -> impl Future<Output = Result<Option<SubjectGrade>, Self::Error>> + Send + '_;

  fn add_absence(
    &self,
    catalog_id: Uuid,
    input: NewAbsence,
    today: NaiveDate,
  ) -> impl Future<Output = Result<SubjectAbsence, Self::Error>> + Send + '_;

  /// Mark an absence as founded.
  fn authorize_absence(
    &self,
    absence_id: Uuid,
  ) -> impl Future<Output = Result<SubjectAbsence, Self::Error>> + Send + '_;

  fn delete_absence(
    &self,
    absence_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_absence(
    &self,
    absence_id: Uuid,
  ) -> impl Future<Output = Result<Option<SubjectAbsence>, Self::Error>> + Send + '_;

  fn set_catalog_flags(
    &self,
    catalog_id: Uuid,
    flags: CatalogFlags,
  ) -> impl Future<Output = Result<CatalogPerSubject, Self::Error>> + Send + '_;

  fn set_behavior_grade(
    &self,
    student_id: Uuid,
    academic_year: i32,
    semester: Semester,
    grade: u8,
  ) -> impl Future<Output = Result<CatalogPerYear, Self::Error>> + Send + '_;

  fn get_catalog_per_subject(
    &self,
    catalog_id: Uuid,
  ) -> impl Future<Output = Result<Option<SubjectCatalogDetail>, Self::Error>> + Send + '_;

  fn list_class_subject_catalogs(
    &self,
    study_class_id: Uuid,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CatalogPerSubject>, Self::Error>> + Send + '_;

  fn student_catalogs(
    &self,
    student_id: Uuid,
    academic_year: i32,
  ) -> impl Future<Output = Result<Vec<CatalogPerSubject>, Self::Error>> + Send + '_;

  fn year_catalog(
    &self,
    student_id: Uuid,
    academic_year: i32,
  ) -> impl Future<Output = Result<Option<CatalogPerYear>, Self::Error>> + Send + '_;

  fn report_card(
    &self,
    student_id: Uuid,
    academic_year: i32,
  ) -> impl Future<Output = Result<Option<ReportCard>, Self::Error>> + Send + '_;
}

// ─── Notifications ───────────────────────────────────────────────────────────

pub trait NotificationStore: Backend {
  /// Authorize, resolve recipients and record the notification. Returns the
  /// delivery jobs for the caller to enqueue. Class relations are read from
  /// the `current_year` rosters.
  fn send_notification(
    &self,
    sender: UserProfile,
    input: NewNotification,
    current_year: i32,
  ) -> impl Future<Output = Result<(Notification, Vec<DeliveryJob>), Self::Error>> + Send + '_;

  fn list_sent(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  fn list_received(
    &self,
    user_id: Uuid,
    unread_only: bool,
  ) -> impl Future<Output = Result<Vec<ReceivedNotification>, Self::Error>> + Send + '_;

  fn get_notification(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Notification>, Self::Error>> + Send + '_;

  fn recipient(
    &self,
    notification_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<TargetUserThrough>, Self::Error>> + Send + '_;

  fn mark_read(
    &self,
    notification_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn mark_delivered(
    &self,
    notification_id: Uuid,
    user_id: Uuid,
    channel: DeliveryChannel,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Statistics ──────────────────────────────────────────────────────────────

pub trait StatisticsStore: Backend {
  /// Recompute and persist the snapshots of every class and school.
  fn compute_statistics(
    &self,
    academic_year: i32,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<StatisticsSummary, Self::Error>> + Send + '_;

  fn school_statistics(
    &self,
    academic_year: i32,
  ) -> impl Future<Output = Result<Vec<SchoolStatistics>, Self::Error>> + Send + '_;

  fn class_statistics(
    &self,
    school_unit_id: Uuid,
    academic_year: i32,
  ) -> impl Future<Output = Result<Vec<StudyClassStatistics>, Self::Error>> + Send + '_;

  fn at_risk_students(
    &self,
    school_unit_id: Uuid,
    academic_year: i32,
    thresholds: Thresholds,
    study_class_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<AtRiskStudent>, Self::Error>> + Send + '_;
}

// ─── Everything ──────────────────────────────────────────────────────────────

/// A backend implementing every store trait.
pub trait Store:
  CalendarStore
  + ProfileStore
  + SchoolStore
  + ProgramStore
  + StudyClassStore
  + CatalogStore
  + NotificationStore
  + StatisticsStore
{
}

impl<T> Store for T where
  T: CalendarStore
    + ProfileStore
    + SchoolStore
    + ProgramStore
    + StudyClassStore
    + CatalogStore
    + NotificationStore
    + StatisticsStore
{
}
