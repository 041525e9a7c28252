//! Study classes and the enrollment transitions.
//!
//! Enrolling, unenrolling, transferring and cloning all run inside the single
//! transaction opened by [`SqliteStore::write`]; the decisions come from
//! `campus_core::enrollment` and are applied here.

use std::collections::HashSet;

use campus_core::{
  Error as CoreError,
  enrollment::{
    CatalogAction, CloneContext, apply_actions, check_transfer, enrollment_catalogs,
    plan_clone, plan_transfer, teacher_changes,
  },
  grading::recompute_year,
  school::Subject,
  study_class::{
    CloneRequest, NewStudyClass, StudyClass, StudyClassQuery, StudyClassUpdate,
    TeacherAssignment, check_class_master, check_program_for_class,
    check_student_for_enrollment, normalize_letter, roster_diff, validate_assignments,
  },
  store::StudyClassStore,
};
use rusqlite::{Connection, Row};
use tracing::info;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  catalogs::{
    attach_subject_catalog, detach_subject_catalog, has_records, insert_subject_catalog,
    insert_year_catalog, load_year_catalog, recompute_student_year, save_year_catalog,
    student_subject_catalogs,
  },
  encode::{decode_uuid, encode_uuid, exists, query_uuids},
  profiles::{require_profile, require_profiles},
  programs::require_program,
  schools::{coordination_subject, require_active_school},
};

// ─── Rows ────────────────────────────────────────────────────────────────────

const CLASS_COLUMNS: &str = "c.study_class_id, c.school_unit_id, c.program_id, \
  p.name AS program_name, c.class_grade, c.class_letter, c.academic_year, c.class_master_id";

struct RawClass {
  study_class_id:  String,
  school_unit_id:  String,
  program_id:      String,
  program_name:    String,
  class_grade:     u8,
  class_letter:    String,
  academic_year:   i32,
  class_master_id: String,
}

impl RawClass {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      study_class_id:  r.get("study_class_id")?,
      school_unit_id:  r.get("school_unit_id")?,
      program_id:      r.get("program_id")?,
      program_name:    r.get("program_name")?,
      class_grade:     r.get("class_grade")?,
      class_letter:    r.get("class_letter")?,
      academic_year:   r.get("academic_year")?,
      class_master_id: r.get("class_master_id")?,
    })
  }

  fn into_class(self, conn: &Connection) -> Result<StudyClass> {
    let class_master_id = decode_uuid(&self.class_master_id)?;

    let mut stmt = conn.prepare_cached(
      "SELECT ct.teacher_id, ct.subject_id, s.name, ct.is_optional_subject
       FROM class_teachers ct JOIN subjects s ON s.subject_id = ct.subject_id
       WHERE ct.study_class_id = ?1
       ORDER BY ct.is_optional_subject, s.name",
    )?;
    let rows = stmt
      .query_map(rusqlite::params![self.study_class_id], |r| {
        Ok((
          r.get::<_, String>(0)?,
          r.get::<_, String>(1)?,
          r.get::<_, String>(2)?,
          r.get::<_, bool>(3)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    let teachers = rows
      .into_iter()
      .map(|(teacher_id, subject_id, subject_name, is_optional_subject)| {
        let teacher_id = decode_uuid(&teacher_id)?;
        Ok(TeacherAssignment {
          teacher_id,
          subject_id: decode_uuid(&subject_id)?,
          subject_name,
          is_class_master: teacher_id == class_master_id,
          is_optional_subject,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let student_ids = query_uuids(
      conn,
      "SELECT cs.student_id FROM class_students cs
       JOIN profiles p ON p.profile_id = cs.student_id
       WHERE cs.study_class_id = ?1
       ORDER BY p.full_name",
      rusqlite::params![self.study_class_id],
    )?;

    Ok(StudyClass {
      study_class_id: decode_uuid(&self.study_class_id)?,
      school_unit_id: decode_uuid(&self.school_unit_id)?,
      program_id: decode_uuid(&self.program_id)?,
      program_name: self.program_name,
      class_grade: self.class_grade,
      class_letter: self.class_letter,
      academic_year: self.academic_year,
      class_master_id,
      teachers,
      student_ids,
    })
  }
}

fn query_classes(
  conn: &Connection,
  filter: &str,
  params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<StudyClass>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {CLASS_COLUMNS} FROM study_classes c
     JOIN academic_programs p ON p.program_id = c.program_id
     {filter}"
  ))?;
  let raws = stmt
    .query_map(params, RawClass::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(|raw| raw.into_class(conn)).collect()
}

pub(crate) fn load_class(conn: &Connection, id: Uuid) -> Result<Option<StudyClass>> {
  Ok(
    query_classes(conn, "WHERE c.study_class_id = ?1", rusqlite::params![encode_uuid(id)])?
      .into_iter()
      .next(),
  )
}

pub(crate) fn require_class(conn: &Connection, id: Uuid) -> Result<StudyClass> {
  load_class(conn, id)?.ok_or_else(|| CoreError::not_found("study class", id).into())
}

pub(crate) fn list_classes(conn: &Connection, query: &StudyClassQuery) -> Result<Vec<StudyClass>> {
  query_classes(
    conn,
    "WHERE (?1 IS NULL OR c.school_unit_id = ?1)
       AND (?2 IS NULL OR c.academic_year = ?2)
       AND (?3 IS NULL OR c.class_grade = ?3)
       AND (?4 IS NULL OR c.class_master_id = ?4 OR EXISTS (
             SELECT 1 FROM class_teachers t
             WHERE t.study_class_id = c.study_class_id AND t.teacher_id = ?4))
     ORDER BY c.academic_year DESC, c.class_grade, c.class_letter",
    rusqlite::params![
      query.school_unit_id.map(encode_uuid),
      query.academic_year,
      query.class_grade,
      query.teacher_id.map(encode_uuid),
    ],
  )
}

/// The class a student is enrolled in for `academic_year`.
pub(crate) fn enrolled_class_id(
  conn: &Connection,
  student_id: Uuid,
  academic_year: i32,
) -> Result<Option<Uuid>> {
  Ok(
    query_uuids(
      conn,
      "SELECT study_class_id FROM class_students WHERE student_id = ?1 AND academic_year = ?2",
      rusqlite::params![encode_uuid(student_id), academic_year],
    )?
    .into_iter()
    .next(),
  )
}

// ─── Checks ──────────────────────────────────────────────────────────────────

fn check_letter_free(
  conn: &Connection,
  school_unit_id: Uuid,
  academic_year: i32,
  class_grade: u8,
  class_letter: &str,
) -> Result<()> {
  let taken = exists(
    conn,
    "SELECT 1 FROM study_classes
     WHERE school_unit_id = ?1 AND academic_year = ?2 AND class_grade = ?3 AND class_letter = ?4",
    rusqlite::params![encode_uuid(school_unit_id), academic_year, class_grade, class_letter],
  )?;
  if taken {
    return Err(CoreError::conflict(format!(
      "class {class_grade} {class_letter} already exists in {academic_year}"
    ))
    .into());
  }
  Ok(())
}

fn check_master_free(
  conn: &Connection,
  class_master_id: Uuid,
  academic_year: i32,
  except: Option<Uuid>,
) -> Result<()> {
  let busy = exists(
    conn,
    "SELECT 1 FROM study_classes
     WHERE class_master_id = ?1 AND academic_year = ?2 AND study_class_id IS NOT ?3",
    rusqlite::params![encode_uuid(class_master_id), academic_year, except.map(encode_uuid)],
  )?;
  if busy {
    return Err(CoreError::conflict(format!(
      "teacher {class_master_id} is already class master in {academic_year}"
    ))
    .into());
  }
  Ok(())
}

fn check_not_past(academic_year: i32, current_year: i32) -> Result<()> {
  if academic_year < current_year {
    return Err(CoreError::validation(format!(
      "classes of {academic_year} can no longer be changed"
    ))
    .into());
  }
  Ok(())
}

fn class_has_records(conn: &Connection, study_class_id: Uuid) -> Result<bool> {
  let key = encode_uuid(study_class_id);
  Ok(
    exists(
      conn,
      "SELECT 1 FROM subject_grades g
       JOIN catalogs_per_subject c ON c.catalog_id = g.catalog_id
       WHERE c.study_class_id = ?1",
      rusqlite::params![key],
    )? || exists(
      conn,
      "SELECT 1 FROM subject_absences a
       JOIN catalogs_per_subject c ON c.catalog_id = a.catalog_id
       WHERE c.study_class_id = ?1",
      rusqlite::params![key],
    )?,
  )
}

// ─── Enroll / unenroll ───────────────────────────────────────────────────────

/// Enroll a student into `class`: roster row, per-year catalog and one
/// subject catalog per class subject.
fn enroll(
  conn: &Connection,
  class: &StudyClass,
  coordination: &Subject,
  student_id: Uuid,
  current_year: i32,
) -> Result<()> {
  let student = require_profile(conn, student_id)?;
  check_student_for_enrollment(&student, class.school_unit_id)?;
  if let Some(other) = enrolled_class_id(conn, student_id, class.academic_year)? {
    return Err(CoreError::conflict(format!(
      "{} is already enrolled in class {other} in {}",
      student.full_name, class.academic_year
    ))
    .into());
  }

  let key = encode_uuid(student_id);
  let class_key = encode_uuid(class.study_class_id);
  conn.execute(
    "INSERT INTO class_students (study_class_id, student_id, academic_year)
     VALUES (?1, ?2, ?3)",
    rusqlite::params![class_key, key, class.academic_year],
  )?;

  let (year, subjects) = enrollment_catalogs(student_id, class, coordination);
  match load_year_catalog(conn, student_id, class.academic_year)? {
    Some(mut existing) => {
      existing.study_class_id = class.study_class_id;
      save_year_catalog(conn, &existing)?;
    }
    None => insert_year_catalog(conn, &year)?,
  }

  let existing = student_subject_catalogs(conn, student_id, class.academic_year)?;
  for catalog in &subjects {
    match existing.iter().find(|c| c.subject_id == catalog.subject_id) {
      Some(old) => {
        attach_subject_catalog(conn, old.catalog_id, class.study_class_id, catalog.teacher_id)?
      }
      None => insert_subject_catalog(conn, catalog)?,
    }
  }
  for old in existing
    .iter()
    .filter(|c| c.is_enrolled && !subjects.iter().any(|s| s.subject_id == c.subject_id))
  {
    detach_subject_catalog(conn, old.catalog_id)?;
  }
  // Re-attached catalogs may carry grades and absences.
  recompute_student_year(conn, student_id, class.academic_year)?;

  let newer_enrollment = exists(
    conn,
    "SELECT 1 FROM class_students
     WHERE student_id = ?1 AND study_class_id != ?2
       AND (academic_year = ?3 OR academic_year > ?4)",
    rusqlite::params![key, class_key, current_year, class.academic_year],
  )?;
  if class.academic_year == current_year || !newer_enrollment {
    conn.execute(
      "UPDATE profiles SET student_in_class_id = ?2 WHERE profile_id = ?1",
      rusqlite::params![key, class_key],
    )?;
  }
  Ok(())
}

/// Remove a student from `class`, dropping the catalogs of that class.
fn unenroll(
  conn: &Connection,
  class: &StudyClass,
  student_id: Uuid,
  current_year: i32,
) -> Result<()> {
  if has_records(conn, student_id, class.study_class_id)? {
    return Err(CoreError::conflict(format!(
      "student {student_id} has grades or absences in {}",
      class.name()
    ))
    .into());
  }

  let key = encode_uuid(student_id);
  let class_key = encode_uuid(class.study_class_id);
  conn.execute(
    "DELETE FROM catalogs_per_subject WHERE student_id = ?1 AND study_class_id = ?2",
    rusqlite::params![key, class_key],
  )?;
  conn.execute(
    "DELETE FROM catalogs_per_year WHERE student_id = ?1 AND study_class_id = ?2",
    rusqlite::params![key, class_key],
  )?;
  conn.execute(
    "DELETE FROM class_students WHERE student_id = ?1 AND study_class_id = ?2",
    rusqlite::params![key, class_key],
  )?;
  conn.execute(
    "UPDATE profiles SET student_in_class_id = (
       SELECT study_class_id FROM class_students WHERE student_id = ?1
       ORDER BY academic_year = ?3 DESC, academic_year DESC LIMIT 1)
     WHERE profile_id = ?1 AND student_in_class_id = ?2",
    rusqlite::params![key, class_key, current_year],
  )?;
  Ok(())
}

// ─── Create / update / delete ────────────────────────────────────────────────

fn write_teachers(conn: &Connection, id: Uuid, assignments: &[TeacherAssignment]) -> Result<()> {
  let key = encode_uuid(id);
  conn.execute("DELETE FROM class_teachers WHERE study_class_id = ?1", rusqlite::params![key])?;
  for a in assignments {
    conn.execute(
      "INSERT INTO class_teachers (study_class_id, subject_id, teacher_id, is_optional_subject)
       VALUES (?1, ?2, ?3, ?4)",
      rusqlite::params![
        key,
        encode_uuid(a.subject_id),
        encode_uuid(a.teacher_id),
        a.is_optional_subject,
      ],
    )?;
  }
  Ok(())
}

fn create_class(
  conn: &Connection,
  input: NewStudyClass,
  current_year: i32,
) -> Result<StudyClass> {
  check_not_past(input.academic_year, current_year)?;
  let school = require_active_school(conn, input.school_unit_id)?;
  let class_letter = normalize_letter(&input.class_letter)?;
  let program = require_program(conn, input.program_id)?;
  check_program_for_class(
    &program,
    school.school_unit_id,
    input.class_grade,
    input.academic_year,
  )?;
  check_letter_free(
    conn,
    school.school_unit_id,
    input.academic_year,
    input.class_grade,
    &class_letter,
  )?;

  let master = require_profile(conn, input.class_master_id)?;
  check_class_master(&master, school.school_unit_id)?;
  check_master_free(conn, master.profile_id, input.academic_year, None)?;

  let teachers = require_profiles(
    conn,
    input.teachers.iter().map(|a| a.teacher_id).chain([master.profile_id]),
  )?;
  let assignments = validate_assignments(
    &program,
    input.class_grade,
    master.profile_id,
    school.school_unit_id,
    &input.teachers,
    &teachers,
  )?;
  let (students, _) = roster_diff(&[], &input.student_ids)?;

  let id = Uuid::new_v4();
  conn.execute(
    "INSERT INTO study_classes (
       study_class_id, school_unit_id, program_id, class_grade, class_letter,
       academic_year, class_master_id
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      encode_uuid(id),
      encode_uuid(school.school_unit_id),
      encode_uuid(program.program_id),
      input.class_grade,
      class_letter,
      input.academic_year,
      encode_uuid(master.profile_id),
    ],
  )?;
  write_teachers(conn, id, &assignments)?;

  let class = require_class(conn, id)?;
  let coordination = coordination_subject(conn)?;
  for student_id in students {
    enroll(conn, &class, &coordination, student_id, current_year)?;
  }
  require_class(conn, id)
}

fn update_class(
  conn: &Connection,
  id: Uuid,
  update: StudyClassUpdate,
  current_year: i32,
) -> Result<StudyClass> {
  let class = require_class(conn, id)?;
  check_not_past(class.academic_year, current_year)?;
  require_active_school(conn, class.school_unit_id)?;

  let master = require_profile(conn, update.class_master_id)?;
  check_class_master(&master, class.school_unit_id)?;
  check_master_free(conn, master.profile_id, class.academic_year, Some(id))?;

  let program = require_program(conn, class.program_id)?;
  let teachers = require_profiles(
    conn,
    update.teachers.iter().map(|a| a.teacher_id).chain([master.profile_id]),
  )?;
  let assignments = validate_assignments(
    &program,
    class.class_grade,
    master.profile_id,
    class.school_unit_id,
    &update.teachers,
    &teachers,
  )?;
  let (added, removed) = roster_diff(&class.student_ids, &update.student_ids)?;

  let key = encode_uuid(id);
  for (subject_id, teacher_id) in teacher_changes(&class, &assignments) {
    conn.execute(
      "UPDATE catalogs_per_subject SET teacher_id = ?3
       WHERE study_class_id = ?1 AND subject_id = ?2",
      rusqlite::params![key, encode_uuid(subject_id), encode_uuid(teacher_id)],
    )?;
  }
  if master.profile_id != class.class_master_id {
    conn.execute(
      "UPDATE catalogs_per_subject SET teacher_id = ?2
       WHERE study_class_id = ?1 AND is_coordination_subject = 1",
      rusqlite::params![key, encode_uuid(master.profile_id)],
    )?;
    conn.execute(
      "UPDATE study_classes SET class_master_id = ?2 WHERE study_class_id = ?1",
      rusqlite::params![key, encode_uuid(master.profile_id)],
    )?;
  }
  write_teachers(conn, id, &assignments)?;

  for student_id in removed {
    unenroll(conn, &class, student_id, current_year)?;
  }
  if !added.is_empty() {
    let updated = require_class(conn, id)?;
    let coordination = coordination_subject(conn)?;
    for student_id in added {
      enroll(conn, &updated, &coordination, student_id, current_year)?;
    }
  }
  require_class(conn, id)
}

fn delete_class(conn: &Connection, id: Uuid, current_year: i32) -> Result<()> {
  let class = require_class(conn, id)?;
  if class_has_records(conn, id)? {
    return Err(CoreError::conflict(format!(
      "{} has grades or absences and cannot be deleted",
      class.name()
    ))
    .into());
  }
  for student_id in &class.student_ids {
    unenroll(conn, &class, *student_id, current_year)?;
  }

  let key = encode_uuid(id);
  conn.execute(
    "DELETE FROM catalogs_per_subject WHERE study_class_id = ?1",
    rusqlite::params![key],
  )?;
  conn.execute("DELETE FROM study_classes WHERE study_class_id = ?1", rusqlite::params![key])?;
  Ok(())
}

// ─── Transitions ─────────────────────────────────────────────────────────────

fn clone_class(
  conn: &Connection,
  id: Uuid,
  request: CloneRequest,
  current_year: i32,
) -> Result<StudyClass> {
  let source = require_class(conn, id)?;
  let school = require_active_school(conn, source.school_unit_id)?;
  let target_program = require_program(conn, request.program_id)?;

  let teachers = require_profiles(
    conn,
    source
      .teachers
      .iter()
      .map(|a| a.teacher_id)
      .chain(request.teachers.iter().map(|a| a.teacher_id))
      .chain([source.class_master_id])
      .chain(request.class_master_id),
  )?;
  let students = require_profiles(conn, source.student_ids.iter().copied())?;
  let enrolled_in_next: HashSet<Uuid> = query_uuids(
    conn,
    "SELECT student_id FROM class_students WHERE academic_year = ?1",
    rusqlite::params![source.academic_year + 1],
  )?
  .into_iter()
  .collect();

  let plan = plan_clone(&source, &request, &CloneContext {
    school: &school,
    target_program: &target_program,
    teachers: &teachers,
    students: &students,
    enrolled_in_next: &enrolled_in_next,
  })?;

  create_class(
    conn,
    NewStudyClass {
      school_unit_id:  source.school_unit_id,
      program_id:      target_program.program_id,
      class_grade:     plan.class_grade,
      class_letter:    plan.class_letter,
      academic_year:   plan.academic_year,
      class_master_id: plan.class_master_id,
      teachers:        plan.teachers,
      student_ids:     plan.student_ids,
    },
    current_year,
  )
}

fn move_student(
  conn: &Connection,
  student_id: Uuid,
  target_class_id: Uuid,
  current_year: i32,
) -> Result<StudyClass> {
  let student = require_profile(conn, student_id)?;
  let source_id = enrolled_class_id(conn, student_id, current_year)?.ok_or_else(|| {
    CoreError::validation(format!(
      "{} is not enrolled in a class of {current_year}",
      student.full_name
    ))
  })?;
  let source = require_class(conn, source_id)?;
  let destination = require_class(conn, target_class_id)?;
  check_transfer(&student, &source, &destination, current_year)?;
  require_active_school(conn, destination.school_unit_id)?;

  let coordination = coordination_subject(conn)?;
  let catalogs = student_subject_catalogs(conn, student_id, current_year)?;
  let actions = plan_transfer(student_id, &source, &destination, &coordination, &catalogs);

  for action in &actions {
    match action {
      CatalogAction::Move { catalog_id, study_class_id, teacher_id }
      | CatalogAction::Reenroll { catalog_id, study_class_id, teacher_id } => {
        attach_subject_catalog(conn, *catalog_id, *study_class_id, *teacher_id)?
      }
      CatalogAction::Detach { catalog_id } => detach_subject_catalog(conn, *catalog_id)?,
      CatalogAction::Create(catalog) => insert_subject_catalog(conn, catalog)?,
    }
  }

  let key = encode_uuid(student_id);
  let destination_key = encode_uuid(destination.study_class_id);
  conn.execute(
    "UPDATE class_students SET study_class_id = ?2
     WHERE student_id = ?1 AND academic_year = ?3",
    rusqlite::params![key, destination_key, current_year],
  )?;
  conn.execute(
    "UPDATE profiles SET student_in_class_id = ?2 WHERE profile_id = ?1",
    rusqlite::params![key, destination_key],
  )?;

  let mut year = load_year_catalog(conn, student_id, current_year)?.ok_or_else(|| {
    CoreError::not_found("catalog per year", format!("{student_id}/{current_year}"))
  })?;
  year.study_class_id = destination.study_class_id;
  recompute_year(&mut year, &apply_actions(&catalogs, &actions));
  save_year_catalog(conn, &year)?;

  require_class(conn, destination.study_class_id)
}

fn receiver_classes(
  conn: &Connection,
  student_id: Uuid,
  current_year: i32,
) -> Result<Vec<StudyClass>> {
  require_profile(conn, student_id)?;
  let Some(source_id) = enrolled_class_id(conn, student_id, current_year)? else {
    return Ok(Vec::new());
  };
  let source = require_class(conn, source_id)?;
  query_classes(
    conn,
    "WHERE c.school_unit_id = ?1 AND c.academic_year = ?2 AND c.class_grade = ?3
       AND c.study_class_id != ?4
     ORDER BY c.class_letter",
    rusqlite::params![
      encode_uuid(source.school_unit_id),
      source.academic_year,
      source.class_grade,
      encode_uuid(source.study_class_id),
    ],
  )
}

/// The current-year classes a profile is related to: its own class for a
/// student, its children's classes for a parent.
pub(crate) fn related_classes(
  conn: &Connection,
  profile_id: Uuid,
  current_year: i32,
) -> Result<Vec<StudyClass>> {
  let ids = query_uuids(
    conn,
    "SELECT study_class_id FROM class_students
     WHERE academic_year = ?2
       AND (student_id = ?1 OR student_id IN (
             SELECT student_id FROM student_parents WHERE parent_id = ?1))",
    rusqlite::params![encode_uuid(profile_id), current_year],
  )?;
  ids
    .into_iter()
    .collect::<HashSet<_>>()
    .into_iter()
    .map(|id| load_class(conn, id))
    .filter_map(Result::transpose)
    .collect()
}

// ─── StudyClassStore impl ────────────────────────────────────────────────────

impl StudyClassStore for SqliteStore {
  async fn create_study_class(
    &self,
    input: NewStudyClass,
    current_year: i32,
  ) -> Result<StudyClass> {
    let class = self.write(move |conn| create_class(conn, input, current_year)).await?;
    info!(
      study_class_id = %class.study_class_id,
      name = %class.name(),
      academic_year = class.academic_year,
      students = class.student_ids.len(),
      "created study class"
    );
    Ok(class)
  }

  async fn update_study_class(
    &self,
    id: Uuid,
    update: StudyClassUpdate,
    current_year: i32,
  ) -> Result<StudyClass> {
    let class = self
      .write(move |conn| update_class(conn, id, update, current_year))
      .await?;
    info!(study_class_id = %id, students = class.student_ids.len(), "updated study class");
    Ok(class)
  }

  async fn delete_study_class(&self, id: Uuid, current_year: i32) -> Result<()> {
    self
      .write(move |conn| delete_class(conn, id, current_year))
      .await?;
    info!(study_class_id = %id, "deleted study class");
    Ok(())
  }

  async fn get_study_class(&self, id: Uuid) -> Result<Option<StudyClass>> {
    self.read(move |conn| load_class(conn, id)).await
  }

  async fn list_study_classes(&self, query: StudyClassQuery) -> Result<Vec<StudyClass>> {
    self.read(move |conn| list_classes(conn, &query)).await
  }

  async fn clone_to_next_year(
    &self,
    id: Uuid,
    request: CloneRequest,
    current_year: i32,
  ) -> Result<StudyClass> {
    let class = self
      .write(move |conn| clone_class(conn, id, request, current_year))
      .await?;
    info!(
      source = %id,
      study_class_id = %class.study_class_id,
      academic_year = class.academic_year,
      students = class.student_ids.len(),
      "cloned study class into next year"
    );
    Ok(class)
  }

  async fn move_student(
    &self,
    student_id: Uuid,
    target_class_id: Uuid,
    current_year: i32,
  ) -> Result<StudyClass> {
    let class = self
      .write(move |conn| move_student(conn, student_id, target_class_id, current_year))
      .await?;
    info!(student_id = %student_id, study_class_id = %target_class_id, "moved student");
    Ok(class)
  }

  async fn receiver_classes(
    &self,
    student_id: Uuid,
    current_year: i32,
  ) -> Result<Vec<StudyClass>> {
    self
      .read(move |conn| receiver_classes(conn, student_id, current_year))
      .await
  }
}
