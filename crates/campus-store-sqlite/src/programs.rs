//! Generic and school academic programs.

use std::collections::BTreeMap;

use campus_core::{
  Error as CoreError,
  program::{
    AcademicProgram, GenericAcademicProgram, NewGenericProgram, NewProgram,
    OptionalSubjectInput, ProgramQuery, ProgramSubject, build_subjects,
    check_generic_for_school, check_optionals,
  },
  school::NewSubject,
  store::ProgramStore,
};
use rusqlite::{Connection, OptionalExtension as _, Row};
use tracing::info;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{decode_enum, decode_opt_uuid, decode_uuid, encode_uuid, exists, query_uuids},
  schools::{
    insert_subject, require_active_school, require_teachable_subject, subject_by_name,
  },
};

// ─── Rows ────────────────────────────────────────────────────────────────────

fn program_subject_from_row(r: &Row<'_>) -> rusqlite::Result<(String, String, u8, u8, bool)> {
  Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

fn into_program_subject(
  (id, name, class_grade, weekly_hours, is_mandatory): (String, String, u8, u8, bool),
) -> Result<ProgramSubject> {
  Ok(ProgramSubject {
    subject_id: decode_uuid(&id)?,
    subject_name: name,
    class_grade,
    weekly_hours,
    is_mandatory,
  })
}

fn generic_subjects(conn: &Connection, id: &str) -> Result<Vec<ProgramSubject>> {
  let mut stmt = conn.prepare_cached(
    "SELECT gs.subject_id, s.name, gs.class_grade, gs.weekly_hours, 1
     FROM generic_program_subjects gs JOIN subjects s ON s.subject_id = gs.subject_id
     WHERE gs.generic_program_id = ?1
     ORDER BY gs.class_grade, s.name",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![id], program_subject_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows.into_iter().map(into_program_subject).collect()
}

fn program_subjects(conn: &Connection, id: &str) -> Result<Vec<ProgramSubject>> {
  let mut stmt = conn.prepare_cached(
    "SELECT ps.subject_id, s.name, ps.class_grade, ps.weekly_hours, ps.is_mandatory
     FROM program_subjects ps JOIN subjects s ON s.subject_id = ps.subject_id
     WHERE ps.program_id = ?1
     ORDER BY ps.class_grade, ps.is_mandatory DESC, s.name",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![id], program_subject_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows.into_iter().map(into_program_subject).collect()
}

// ─── Generic programs ────────────────────────────────────────────────────────

pub(crate) fn load_generic(
  conn: &Connection,
  id: Uuid,
) -> Result<Option<GenericAcademicProgram>> {
  let key = encode_uuid(id);
  let row = conn
    .query_row(
      "SELECT name, category, academic_profile, optional_hours
       FROM generic_programs WHERE generic_program_id = ?1",
      rusqlite::params![key],
      |r| {
        Ok((
          r.get::<_, String>(0)?,
          r.get::<_, String>(1)?,
          r.get::<_, Option<String>>(2)?,
          r.get::<_, String>(3)?,
        ))
      },
    )
    .optional()?;
  let Some((name, category, academic_profile, optional_hours)) = row else {
    return Ok(None);
  };
  Ok(Some(GenericAcademicProgram {
    generic_program_id: id,
    name,
    category: decode_enum(&category, "school category")?,
    academic_profile,
    subjects: generic_subjects(conn, &key)?,
    optional_hours: serde_json::from_str::<BTreeMap<u8, u8>>(&optional_hours)?,
  }))
}

fn require_generic(conn: &Connection, id: Uuid) -> Result<GenericAcademicProgram> {
  load_generic(conn, id)?
    .ok_or_else(|| CoreError::not_found("generic academic program", id).into())
}

fn list_generic(conn: &Connection) -> Result<Vec<GenericAcademicProgram>> {
  let ids = query_uuids(
    conn,
    "SELECT generic_program_id FROM generic_programs ORDER BY category, name",
    rusqlite::params![],
  )?;
  ids.into_iter().map(|id| require_generic(conn, id)).collect()
}

fn create_generic(
  conn: &Connection,
  input: NewGenericProgram,
) -> Result<GenericAcademicProgram> {
  input.validate()?;
  for subject in &input.subjects {
    require_teachable_subject(conn, subject.subject_id)?;
  }

  let id = Uuid::new_v4();
  let key = encode_uuid(id);
  conn.execute(
    "INSERT INTO generic_programs (
       generic_program_id, name, category, academic_profile, optional_hours
     ) VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      key,
      input.name.trim(),
      input.category.to_string(),
      input.academic_profile,
      serde_json::to_string(&input.optional_hours)?,
    ],
  )?;
  for subject in &input.subjects {
    conn.execute(
      "INSERT INTO generic_program_subjects (
         generic_program_id, subject_id, class_grade, weekly_hours
       ) VALUES (?1, ?2, ?3, ?4)",
      rusqlite::params![
        key,
        encode_uuid(subject.subject_id),
        subject.class_grade,
        subject.weekly_hours,
      ],
    )?;
  }
  require_generic(conn, id)
}

// ─── School programs ─────────────────────────────────────────────────────────

const PROGRAM_COLUMNS: &str = "program_id, school_unit_id, generic_program_id, name, \
  category, academic_year, core_subject_id";

struct RawProgram {
  program_id:         String,
  school_unit_id:     String,
  generic_program_id: String,
  name:               String,
  category:           String,
  academic_year:      i32,
  core_subject_id:    Option<String>,
}

impl RawProgram {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      program_id:         r.get("program_id")?,
      school_unit_id:     r.get("school_unit_id")?,
      generic_program_id: r.get("generic_program_id")?,
      name:               r.get("name")?,
      category:           r.get("category")?,
      academic_year:      r.get("academic_year")?,
      core_subject_id:    r.get("core_subject_id")?,
    })
  }

  fn into_program(self, conn: &Connection) -> Result<AcademicProgram> {
    Ok(AcademicProgram {
      program_id:         decode_uuid(&self.program_id)?,
      school_unit_id:     decode_uuid(&self.school_unit_id)?,
      generic_program_id: decode_uuid(&self.generic_program_id)?,
      subjects:           program_subjects(conn, &self.program_id)?,
      name:               self.name,
      category:           decode_enum(&self.category, "school category")?,
      academic_year:      self.academic_year,
      core_subject_id:    decode_opt_uuid(self.core_subject_id.as_deref())?,
    })
  }
}

pub(crate) fn load_program(conn: &Connection, id: Uuid) -> Result<Option<AcademicProgram>> {
  conn
    .query_row(
      &format!("SELECT {PROGRAM_COLUMNS} FROM academic_programs WHERE program_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawProgram::from_row,
    )
    .optional()?
    .map(|raw| raw.into_program(conn))
    .transpose()
}

pub(crate) fn require_program(conn: &Connection, id: Uuid) -> Result<AcademicProgram> {
  load_program(conn, id)?.ok_or_else(|| CoreError::not_found("academic program", id).into())
}

fn list_programs(conn: &Connection, query: &ProgramQuery) -> Result<Vec<AcademicProgram>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {PROGRAM_COLUMNS} FROM academic_programs
     WHERE (?1 IS NULL OR school_unit_id = ?1)
       AND (?2 IS NULL OR academic_year = ?2)
     ORDER BY academic_year DESC, name"
  ))?;
  let raws = stmt
    .query_map(
      rusqlite::params![query.school_unit_id.map(encode_uuid), query.academic_year],
      RawProgram::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(|raw| raw.into_program(conn)).collect()
}

/// Turn optional-subject inputs into program subjects, creating subjects
/// named for the first time.
fn resolve_optionals(
  conn: &Connection,
  inputs: &[OptionalSubjectInput],
) -> Result<Vec<ProgramSubject>> {
  let mut resolved = Vec::with_capacity(inputs.len());
  for input in inputs {
    input.validate()?;
    let subject = match (&input.subject_id, &input.subject_name) {
      (Some(id), _) => require_teachable_subject(conn, *id)?,
      (None, Some(name)) => match subject_by_name(conn, name)? {
        Some(existing) if existing.is_coordination => {
          return Err(CoreError::validation(format!(
            "{} cannot be an optional subject",
            existing.name
          ))
          .into());
        }
        Some(existing) => existing,
        None => insert_subject(conn, &NewSubject { name: name.clone() })?,
      },
      (None, None) => {
        return Err(CoreError::validation("optional subject needs an id or a name").into());
      }
    };
    resolved.push(ProgramSubject {
      subject_id:   subject.subject_id,
      subject_name: subject.name,
      class_grade:  input.class_grade,
      weekly_hours: input.weekly_hours,
      is_mandatory: false,
    });
  }
  Ok(resolved)
}

fn check_unused(conn: &Connection, program: &AcademicProgram) -> Result<()> {
  let used = exists(
    conn,
    "SELECT 1 FROM study_classes WHERE program_id = ?1",
    rusqlite::params![encode_uuid(program.program_id)],
  )?;
  if used {
    return Err(CoreError::conflict(format!(
      "academic program {} is used by study classes",
      program.name
    ))
    .into());
  }
  Ok(())
}

fn check_unique(
  conn: &Connection,
  school_unit_id: Uuid,
  generic_program_id: Uuid,
  academic_year: i32,
) -> Result<()> {
  let taken = exists(
    conn,
    "SELECT 1 FROM academic_programs
     WHERE school_unit_id = ?1 AND generic_program_id = ?2 AND academic_year = ?3",
    rusqlite::params![
      encode_uuid(school_unit_id),
      encode_uuid(generic_program_id),
      academic_year,
    ],
  )?;
  if taken {
    return Err(CoreError::conflict(format!(
      "the school unit already runs this program in {academic_year}"
    ))
    .into());
  }
  Ok(())
}

fn write_subjects(conn: &Connection, program_id: Uuid, subjects: &[ProgramSubject]) -> Result<()> {
  let key = encode_uuid(program_id);
  conn.execute("DELETE FROM program_subjects WHERE program_id = ?1", rusqlite::params![key])?;
  for subject in subjects {
    conn.execute(
      "INSERT INTO program_subjects (
         program_id, subject_id, class_grade, weekly_hours, is_mandatory
       ) VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        key,
        encode_uuid(subject.subject_id),
        subject.class_grade,
        subject.weekly_hours,
        subject.is_mandatory,
      ],
    )?;
  }
  Ok(())
}

fn insert_program(conn: &Connection, program: &AcademicProgram) -> Result<()> {
  conn.execute(
    &format!("INSERT INTO academic_programs ({PROGRAM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
    rusqlite::params![
      encode_uuid(program.program_id),
      encode_uuid(program.school_unit_id),
      encode_uuid(program.generic_program_id),
      program.name,
      program.category.to_string(),
      program.academic_year,
      program.core_subject_id.map(encode_uuid),
    ],
  )?;
  write_subjects(conn, program.program_id, &program.subjects)
}

fn create_program(conn: &Connection, input: NewProgram) -> Result<AcademicProgram> {
  let school = require_active_school(conn, input.school_unit_id)?;
  let generic = require_generic(conn, input.generic_program_id)?;
  check_generic_for_school(&generic, &school, input.core_subject_id)?;
  if let Some(core) = input.core_subject_id {
    require_teachable_subject(conn, core)?;
  }
  check_unique(conn, school.school_unit_id, generic.generic_program_id, input.academic_year)?;

  let optionals = resolve_optionals(conn, &input.optional_subjects)?;
  check_optionals(&generic, &optionals)?;

  let program = AcademicProgram {
    program_id:         Uuid::new_v4(),
    school_unit_id:     school.school_unit_id,
    generic_program_id: generic.generic_program_id,
    name:               generic.name.clone(),
    category:           generic.category,
    academic_year:      input.academic_year,
    core_subject_id:    input.core_subject_id,
    subjects:           build_subjects(&generic, optionals),
  };
  insert_program(conn, &program)?;
  require_program(conn, program.program_id)
}

fn update_optionals(
  conn: &Connection,
  id: Uuid,
  inputs: Vec<OptionalSubjectInput>,
) -> Result<AcademicProgram> {
  let program = require_program(conn, id)?;
  check_unused(conn, &program)?;
  let generic = require_generic(conn, program.generic_program_id)?;
  let optionals = resolve_optionals(conn, &inputs)?;
  check_optionals(&generic, &optionals)?;
  write_subjects(conn, id, &build_subjects(&generic, optionals))?;
  require_program(conn, id)
}

fn copy_program(conn: &Connection, id: Uuid, target_year: i32) -> Result<AcademicProgram> {
  let source = require_program(conn, id)?;
  if source.academic_year == target_year {
    return Err(CoreError::validation(format!(
      "program already belongs to {target_year}"
    ))
    .into());
  }
  require_active_school(conn, source.school_unit_id)?;
  check_unique(conn, source.school_unit_id, source.generic_program_id, target_year)?;

  let copy = AcademicProgram {
    program_id: Uuid::new_v4(),
    academic_year: target_year,
    ..source
  };
  insert_program(conn, &copy)?;
  require_program(conn, copy.program_id)
}

fn delete_program(conn: &Connection, id: Uuid) -> Result<()> {
  let program = require_program(conn, id)?;
  check_unused(conn, &program)?;
  conn.execute(
    "DELETE FROM academic_programs WHERE program_id = ?1",
    rusqlite::params![encode_uuid(id)],
  )?;
  Ok(())
}

// ─── ProgramStore impl ───────────────────────────────────────────────────────

impl ProgramStore for SqliteStore {
  async fn create_generic_program(
    &self,
    input: NewGenericProgram,
  ) -> Result<GenericAcademicProgram> {
    let program = self.write(move |conn| create_generic(conn, input)).await?;
    info!(generic_program_id = %program.generic_program_id, name = %program.name, "created generic program");
    Ok(program)
  }

  async fn get_generic_program(&self, id: Uuid) -> Result<Option<GenericAcademicProgram>> {
    self.read(move |conn| load_generic(conn, id)).await
  }

  async fn list_generic_programs(&self) -> Result<Vec<GenericAcademicProgram>> {
    self.read(list_generic).await
  }

  async fn create_program(&self, input: NewProgram) -> Result<AcademicProgram> {
    let program = self.write(move |conn| create_program(conn, input)).await?;
    info!(
      program_id = %program.program_id,
      school_unit_id = %program.school_unit_id,
      academic_year = program.academic_year,
      "created academic program"
    );
    Ok(program)
  }

  async fn update_program_optionals(
    &self,
    id: Uuid,
    optionals: Vec<OptionalSubjectInput>,
  ) -> Result<AcademicProgram> {
    self.write(move |conn| update_optionals(conn, id, optionals)).await
  }

  async fn copy_program(&self, id: Uuid, target_year: i32) -> Result<AcademicProgram> {
    let program = self.write(move |conn| copy_program(conn, id, target_year)).await?;
    info!(source = %id, program_id = %program.program_id, target_year, "copied academic program");
    Ok(program)
  }

  async fn delete_program(&self, id: Uuid) -> Result<()> {
    self.write(move |conn| delete_program(conn, id)).await
  }

  async fn get_program(&self, id: Uuid) -> Result<Option<AcademicProgram>> {
    self.read(move |conn| load_program(conn, id)).await
  }

  async fn list_programs(&self, query: ProgramQuery) -> Result<Vec<AcademicProgram>> {
    self.read(move |conn| list_programs(conn, &query)).await
  }
}
