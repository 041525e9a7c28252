//! School units and subjects.

use campus_core::{
  Error as CoreError,
  school::{
    NewSchool, NewSubject, SchoolCategory, SchoolQuery, SchoolUnit, Subject,
    check_principal,
  },
  store::SchoolStore,
};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, Row};
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result, SqliteStore,
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid, exists},
  profiles::require_profile,
};

// ─── Rows ────────────────────────────────────────────────────────────────────

const SCHOOL_COLUMNS: &str = "school_unit_id, name, address, phone_number, email, \
  district, city, categories, academic_profile, principal_id, is_active, created_at";

/// Raw values read directly from a `school_units` row.
struct RawSchool {
  school_unit_id:   String,
  name:             String,
  address:          String,
  phone_number:     String,
  email:            String,
  district:         String,
  city:             String,
  categories:       String,
  academic_profile: Option<String>,
  principal_id:     String,
  is_active:        bool,
  created_at:       String,
}

impl RawSchool {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      school_unit_id:   r.get("school_unit_id")?,
      name:             r.get("name")?,
      address:          r.get("address")?,
      phone_number:     r.get("phone_number")?,
      email:            r.get("email")?,
      district:         r.get("district")?,
      city:             r.get("city")?,
      categories:       r.get("categories")?,
      academic_profile: r.get("academic_profile")?,
      principal_id:     r.get("principal_id")?,
      is_active:        r.get("is_active")?,
      created_at:       r.get("created_at")?,
    })
  }

  fn into_school(self) -> Result<SchoolUnit> {
    Ok(SchoolUnit {
      school_unit_id:   decode_uuid(&self.school_unit_id)?,
      name:             self.name,
      address:          self.address,
      phone_number:     self.phone_number,
      email:            self.email,
      district:         self.district,
      city:             self.city,
      categories:       serde_json::from_str(&self.categories)?,
      academic_profile: self.academic_profile,
      principal_id:     decode_uuid(&self.principal_id)?,
      is_active:        self.is_active,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<(String, String, bool)> {
  Ok((r.get(0)?, r.get(1)?, r.get(2)?))
}

fn into_subject((id, name, is_coordination): (String, String, bool)) -> Result<Subject> {
  Ok(Subject { subject_id: decode_uuid(&id)?, name, is_coordination })
}

// ─── Loads ───────────────────────────────────────────────────────────────────

pub(crate) fn load_school(conn: &Connection, id: Uuid) -> Result<Option<SchoolUnit>> {
  conn
    .query_row(
      &format!("SELECT {SCHOOL_COLUMNS} FROM school_units WHERE school_unit_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawSchool::from_row,
    )
    .optional()?
    .map(RawSchool::into_school)
    .transpose()
}

pub(crate) fn require_school(conn: &Connection, id: Uuid) -> Result<SchoolUnit> {
  load_school(conn, id)?.ok_or_else(|| CoreError::not_found("school unit", id).into())
}

/// A school that exists and is active.
pub(crate) fn require_active_school(conn: &Connection, id: Uuid) -> Result<SchoolUnit> {
  let school = require_school(conn, id)?;
  if !school.is_active {
    return Err(CoreError::validation(format!("school unit {} is inactive", school.name)).into());
  }
  Ok(school)
}

fn list_schools(conn: &Connection, query: &SchoolQuery) -> Result<Vec<SchoolUnit>> {
  let text = query.text.as_deref().map(|t| format!("%{t}%"));
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {SCHOOL_COLUMNS} FROM school_units
     WHERE (?1 IS NULL OR city = ?1)
       AND (?2 IS NULL OR district = ?2)
       AND (?3 IS NULL OR is_active = ?3)
       AND (?4 IS NULL OR name LIKE ?4)
     ORDER BY city, name"
  ))?;
  let raws = stmt
    .query_map(
      rusqlite::params![query.city, query.district, query.is_active, text],
      RawSchool::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawSchool::into_school).collect()
}

pub(crate) fn load_subject(conn: &Connection, id: Uuid) -> Result<Option<Subject>> {
  conn
    .query_row(
      "SELECT subject_id, name, is_coordination FROM subjects WHERE subject_id = ?1",
      rusqlite::params![encode_uuid(id)],
      subject_from_row,
    )
    .optional()?
    .map(into_subject)
    .transpose()
}

pub(crate) fn require_subject(conn: &Connection, id: Uuid) -> Result<Subject> {
  load_subject(conn, id)?.ok_or_else(|| CoreError::not_found("subject", id).into())
}

/// A subject that may appear in curricula and teacher profiles.
pub(crate) fn require_teachable_subject(conn: &Connection, id: Uuid) -> Result<Subject> {
  let subject = require_subject(conn, id)?;
  if subject.is_coordination {
    return Err(CoreError::validation(format!(
      "{} is assigned implicitly to class masters",
      subject.name
    ))
    .into());
  }
  Ok(subject)
}

pub(crate) fn coordination_subject(conn: &Connection) -> Result<Subject> {
  conn
    .query_row(
      "SELECT subject_id, name, is_coordination FROM subjects WHERE is_coordination = 1",
      [],
      subject_from_row,
    )
    .optional()?
    .map(into_subject)
    .transpose()?
    .ok_or_else(|| Error::Decode("coordination subject is missing".into()))
}

fn list_subjects(conn: &Connection) -> Result<Vec<Subject>> {
  let mut stmt = conn
    .prepare_cached("SELECT subject_id, name, is_coordination FROM subjects ORDER BY name")?;
  let rows = stmt
    .query_map([], subject_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows.into_iter().map(into_subject).collect()
}

pub(crate) fn subject_by_name(conn: &Connection, name: &str) -> Result<Option<Subject>> {
  conn
    .query_row(
      "SELECT subject_id, name, is_coordination FROM subjects WHERE name = ?1 COLLATE NOCASE",
      rusqlite::params![name.trim()],
      subject_from_row,
    )
    .optional()?
    .map(into_subject)
    .transpose()
}

// ─── Writes ──────────────────────────────────────────────────────────────────

pub(crate) fn insert_subject(conn: &Connection, input: &NewSubject) -> Result<Subject> {
  input.validate()?;
  if let Some(existing) = subject_by_name(conn, &input.name)? {
    return Err(CoreError::conflict(format!("subject {} already exists", existing.name)).into());
  }
  let subject = Subject {
    subject_id:      Uuid::new_v4(),
    name:            input.name.trim().to_owned(),
    is_coordination: false,
  };
  conn.execute(
    "INSERT INTO subjects (subject_id, name, is_coordination) VALUES (?1, ?2, 0)",
    rusqlite::params![encode_uuid(subject.subject_id), subject.name],
  )?;
  Ok(subject)
}

fn check_unique_name(conn: &Connection, input: &NewSchool, except: Option<Uuid>) -> Result<()> {
  let taken = exists(
    conn,
    "SELECT 1 FROM school_units
     WHERE city = ?1 AND name = ?2 COLLATE NOCASE
       AND (?3 IS NULL OR school_unit_id != ?3)",
    rusqlite::params![input.city, input.name, except.map(encode_uuid)],
  )?;
  if taken {
    return Err(CoreError::conflict(format!(
      "a school unit named {} already exists in {}",
      input.name, input.city
    ))
    .into());
  }
  Ok(())
}

fn create_school(conn: &Connection, input: NewSchool) -> Result<SchoolUnit> {
  input.validate()?;
  let principal = require_profile(conn, input.principal_id)?;
  check_principal(&principal, None)?;
  check_unique_name(conn, &input, None)?;

  let school = SchoolUnit {
    school_unit_id:   Uuid::new_v4(),
    name:             input.name,
    address:          input.address,
    phone_number:     input.phone_number,
    email:            input.email,
    district:         input.district,
    city:             input.city,
    categories:       input.categories,
    academic_profile: input.academic_profile,
    principal_id:     input.principal_id,
    is_active:        true,
    created_at:       Utc::now(),
  };
  let id = encode_uuid(school.school_unit_id);
  conn.execute(
    &format!(
      "INSERT INTO school_units ({SCHOOL_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)"
    ),
    rusqlite::params![
      id,
      school.name,
      school.address,
      school.phone_number,
      school.email,
      school.district,
      school.city,
      serde_json::to_string(&school.categories)?,
      school.academic_profile,
      encode_uuid(school.principal_id),
      encode_dt(school.created_at),
    ],
  )?;
  assign_principal(conn, school.principal_id, Some(school.school_unit_id))?;
  Ok(school)
}

fn update_school(conn: &Connection, id: Uuid, input: NewSchool) -> Result<SchoolUnit> {
  let current = require_school(conn, id)?;
  input.validate()?;
  check_unique_name(conn, &input, Some(id))?;

  if input.principal_id != current.principal_id {
    let principal = require_profile(conn, input.principal_id)?;
    check_principal(&principal, Some(id))?;
  }

  let dropped: Vec<SchoolCategory> = current
    .categories
    .iter()
    .filter(|c| !input.categories.contains(c))
    .copied()
    .collect();
  for category in dropped {
    let used = exists(
      conn,
      "SELECT 1 FROM academic_programs WHERE school_unit_id = ?1 AND category = ?2",
      rusqlite::params![encode_uuid(id), category.to_string()],
    )?;
    if used {
      return Err(CoreError::validation(format!(
        "category {category} is used by academic programs of this school unit"
      ))
      .into());
    }
  }

  conn.execute(
    "UPDATE school_units
     SET name = ?2, address = ?3, phone_number = ?4, email = ?5, district = ?6,
         city = ?7, categories = ?8, academic_profile = ?9, principal_id = ?10
     WHERE school_unit_id = ?1",
    rusqlite::params![
      encode_uuid(id),
      input.name,
      input.address,
      input.phone_number,
      input.email,
      input.district,
      input.city,
      serde_json::to_string(&input.categories)?,
      input.academic_profile,
      encode_uuid(input.principal_id),
    ],
  )?;
  if input.principal_id != current.principal_id {
    assign_principal(conn, current.principal_id, None)?;
    assign_principal(conn, input.principal_id, Some(id))?;
  }
  require_school(conn, id)
}

fn assign_principal(conn: &Connection, principal_id: Uuid, school: Option<Uuid>) -> Result<()> {
  conn.execute(
    "UPDATE profiles SET school_unit_id = ?2 WHERE profile_id = ?1",
    rusqlite::params![encode_uuid(principal_id), school.map(encode_uuid)],
  )?;
  Ok(())
}

fn set_school_active(conn: &Connection, id: Uuid, is_active: bool) -> Result<SchoolUnit> {
  let updated = conn.execute(
    "UPDATE school_units SET is_active = ?2 WHERE school_unit_id = ?1",
    rusqlite::params![encode_uuid(id), is_active],
  )?;
  if updated == 0 {
    return Err(CoreError::not_found("school unit", id).into());
  }
  require_school(conn, id)
}

// ─── SchoolStore impl ────────────────────────────────────────────────────────

impl SchoolStore for SqliteStore {
  async fn create_school(&self, input: NewSchool) -> Result<SchoolUnit> {
    let school = self.write(move |conn| create_school(conn, input)).await?;
    info!(school_unit_id = %school.school_unit_id, name = %school.name, "created school unit");
    Ok(school)
  }

  async fn update_school(&self, id: Uuid, input: NewSchool) -> Result<SchoolUnit> {
    self.write(move |conn| update_school(conn, id, input)).await
  }

  async fn set_school_active(&self, id: Uuid, is_active: bool) -> Result<SchoolUnit> {
    let school = self
      .write(move |conn| set_school_active(conn, id, is_active))
      .await?;
    info!(school_unit_id = %id, is_active, "changed school unit state");
    Ok(school)
  }

  async fn get_school(&self, id: Uuid) -> Result<Option<SchoolUnit>> {
    self.read(move |conn| load_school(conn, id)).await
  }

  async fn list_schools(&self, query: SchoolQuery) -> Result<Vec<SchoolUnit>> {
    self.read(move |conn| list_schools(conn, &query)).await
  }

  async fn create_subject(&self, input: NewSubject) -> Result<Subject> {
    self.write(move |conn| insert_subject(conn, &input)).await
  }

  async fn list_subjects(&self) -> Result<Vec<Subject>> { self.read(list_subjects).await }

  async fn coordination_subject(&self) -> Result<Subject> {
    self.read(coordination_subject).await
  }
}
