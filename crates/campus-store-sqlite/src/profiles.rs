//! User profiles and credentials.

use std::collections::HashMap;

use campus_core::{
  Error as CoreError,
  profile::{
    Credentials, NewProfile, ProfileQuery, ProfileUpdate, UserProfile, UserRole,
    check_parents,
  },
  store::ProfileStore,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, Row};
use tracing::info;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{
    decode_dt, decode_enum, decode_opt_date, decode_opt_dt, decode_opt_uuid,
    decode_uuid, encode_date, encode_dt, encode_uuid, exists, query_uuids,
  },
  schools::{require_active_school, require_teachable_subject},
};

// ─── Rows ────────────────────────────────────────────────────────────────────

const PROFILE_COLUMNS: &str = "profile_id, school_unit_id, full_name, username, email, \
  phone_number, role, is_active, created_at, last_online, birth_date, address, \
  personal_id_number, email_notifications_enabled, sms_notifications_enabled, \
  student_in_class_id";

/// Raw values read directly from a `profiles` row.
struct RawProfile {
  profile_id:                  String,
  school_unit_id:              Option<String>,
  full_name:                   String,
  username:                    String,
  email:                       Option<String>,
  phone_number:                Option<String>,
  role:                        String,
  is_active:                   bool,
  created_at:                  String,
  last_online:                 Option<String>,
  birth_date:                  Option<String>,
  address:                     Option<String>,
  personal_id_number:          Option<String>,
  email_notifications_enabled: bool,
  sms_notifications_enabled:   bool,
  student_in_class_id:         Option<String>,
}

impl RawProfile {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      profile_id:                  r.get("profile_id")?,
      school_unit_id:              r.get("school_unit_id")?,
      full_name:                   r.get("full_name")?,
      username:                    r.get("username")?,
      email:                       r.get("email")?,
      phone_number:                r.get("phone_number")?,
      role:                        r.get("role")?,
      is_active:                   r.get("is_active")?,
      created_at:                  r.get("created_at")?,
      last_online:                 r.get("last_online")?,
      birth_date:                  r.get("birth_date")?,
      address:                     r.get("address")?,
      personal_id_number:          r.get("personal_id_number")?,
      email_notifications_enabled: r.get("email_notifications_enabled")?,
      sms_notifications_enabled:   r.get("sms_notifications_enabled")?,
      student_in_class_id:         r.get("student_in_class_id")?,
    })
  }

  /// Decode the row and load the role-specific link tables.
  fn into_profile(self, conn: &Connection) -> Result<UserProfile> {
    let role: UserRole = decode_enum(&self.role, "role")?;
    let taught_subject_ids = match role {
      UserRole::Teacher => query_uuids(
        conn,
        "SELECT subject_id FROM teacher_subjects WHERE teacher_id = ?1 ORDER BY subject_id",
        rusqlite::params![self.profile_id],
      )?,
      _ => Vec::new(),
    };
    let parent_ids = match role {
      UserRole::Student => query_uuids(
        conn,
        "SELECT parent_id FROM student_parents WHERE student_id = ?1 ORDER BY parent_id",
        rusqlite::params![self.profile_id],
      )?,
      _ => Vec::new(),
    };

    Ok(UserProfile {
      profile_id: decode_uuid(&self.profile_id)?,
      school_unit_id: decode_opt_uuid(self.school_unit_id.as_deref())?,
      full_name: self.full_name,
      username: self.username,
      email: self.email,
      phone_number: self.phone_number,
      role,
      is_active: self.is_active,
      created_at: decode_dt(&self.created_at)?,
      last_online: decode_opt_dt(self.last_online.as_deref())?,
      birth_date: decode_opt_date(self.birth_date.as_deref())?,
      address: self.address,
      personal_id_number: self.personal_id_number,
      email_notifications_enabled: self.email_notifications_enabled,
      sms_notifications_enabled: self.sms_notifications_enabled,
      taught_subject_ids,
      parent_ids,
      student_in_class_id: decode_opt_uuid(self.student_in_class_id.as_deref())?,
    })
  }
}

// ─── Loads ───────────────────────────────────────────────────────────────────

pub(crate) fn load_profile(conn: &Connection, id: Uuid) -> Result<Option<UserProfile>> {
  conn
    .query_row(
      &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE profile_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawProfile::from_row,
    )
    .optional()?
    .map(|raw| raw.into_profile(conn))
    .transpose()
}

pub(crate) fn require_profile(conn: &Connection, id: Uuid) -> Result<UserProfile> {
  load_profile(conn, id)?.ok_or_else(|| CoreError::not_found("profile", id).into())
}

/// Load every profile in `ids`; missing ones are reported as not found.
pub(crate) fn require_profiles(
  conn: &Connection,
  ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, UserProfile>> {
  let mut profiles = HashMap::new();
  for id in ids {
    if !profiles.contains_key(&id) {
      profiles.insert(id, require_profile(conn, id)?);
    }
  }
  Ok(profiles)
}

/// Run a `SELECT {PROFILE_COLUMNS} FROM profiles ...` query.
pub(crate) fn query_profiles(
  conn: &Connection,
  tail: &str,
  params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<UserProfile>> {
  let mut stmt = conn.prepare_cached(&format!("SELECT {PROFILE_COLUMNS} FROM profiles {tail}"))?;
  let raws = stmt
    .query_map(params, RawProfile::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(|raw| raw.into_profile(conn)).collect()
}

fn list_profiles(conn: &Connection, query: &ProfileQuery) -> Result<Vec<UserProfile>> {
  let text = query.text.as_deref().map(|t| format!("%{t}%"));
  let limit = query.limit.map_or(-1, |l| l as i64);
  let offset = query.offset.unwrap_or(0) as i64;
  query_profiles(
    conn,
    "WHERE (?1 IS NULL OR role = ?1)
       AND (?2 IS NULL OR school_unit_id = ?2)
       AND (?3 IS NULL OR full_name LIKE ?3 OR username LIKE ?3 OR email LIKE ?3)
       AND (?4 IS NULL OR is_active = ?4)
     ORDER BY full_name, username
     LIMIT ?5 OFFSET ?6",
    rusqlite::params![
      query.role.map(|r| r.to_string()),
      query.school_unit_id.map(encode_uuid),
      text,
      query.is_active,
      limit,
      offset,
    ],
  )
}

fn children_of(conn: &Connection, parent_id: Uuid) -> Result<Vec<UserProfile>> {
  query_profiles(
    conn,
    "WHERE profile_id IN (SELECT student_id FROM student_parents WHERE parent_id = ?1)
     ORDER BY full_name",
    rusqlite::params![encode_uuid(parent_id)],
  )
}

fn credentials(conn: &Connection, username: &str) -> Result<Option<Credentials>> {
  let row = conn
    .query_row(
      "SELECT profile_id, password_hash FROM profiles WHERE username = ?1",
      rusqlite::params![username],
      |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?)),
    )
    .optional()?;
  let Some((id, password_hash)) = row else {
    return Ok(None);
  };

  let profile = require_profile(conn, decode_uuid(&id)?)?;
  let school_active = match profile.school_unit_id {
    Some(school) => conn.query_row(
      "SELECT is_active FROM school_units WHERE school_unit_id = ?1",
      rusqlite::params![encode_uuid(school)],
      |r| r.get::<_, bool>(0),
    )?,
    None => true,
  };
  Ok(Some(Credentials { profile, password_hash, school_active }))
}

// ─── Writes ──────────────────────────────────────────────────────────────────

fn check_taught_subjects(conn: &Connection, subject_ids: &[Uuid]) -> Result<()> {
  for id in subject_ids {
    require_teachable_subject(conn, *id)?;
  }
  Ok(())
}

fn check_parent_ids(conn: &Connection, school: Option<Uuid>, parent_ids: &[Uuid]) -> Result<()> {
  if parent_ids.is_empty() {
    return Ok(());
  }
  let Some(school) = school else {
    return Err(CoreError::validation("parents need a school unit").into());
  };
  let parents: Vec<UserProfile> = require_profiles(conn, parent_ids.iter().copied())?
    .into_values()
    .collect();
  check_parents(school, &parents)?;
  Ok(())
}

fn write_links(conn: &Connection, id: Uuid, subjects: &[Uuid], parents: &[Uuid]) -> Result<()> {
  let id = encode_uuid(id);
  conn.execute("DELETE FROM teacher_subjects WHERE teacher_id = ?1", rusqlite::params![id])?;
  conn.execute("DELETE FROM student_parents WHERE student_id = ?1", rusqlite::params![id])?;
  for subject in subjects {
    conn.execute(
      "INSERT OR IGNORE INTO teacher_subjects (teacher_id, subject_id) VALUES (?1, ?2)",
      rusqlite::params![id, encode_uuid(*subject)],
    )?;
  }
  for parent in parents {
    conn.execute(
      "INSERT OR IGNORE INTO student_parents (student_id, parent_id) VALUES (?1, ?2)",
      rusqlite::params![id, encode_uuid(*parent)],
    )?;
  }
  Ok(())
}

pub(crate) fn create_profile(conn: &Connection, input: NewProfile) -> Result<UserProfile> {
  input.validate()?;
  let taken = exists(
    conn,
    "SELECT 1 FROM profiles WHERE username = ?1",
    rusqlite::params![input.username],
  )?;
  if taken {
    return Err(CoreError::conflict(format!("username {} is taken", input.username)).into());
  }
  if let Some(school) = input.school_unit_id {
    require_active_school(conn, school)?;
  }
  check_taught_subjects(conn, &input.taught_subject_ids)?;
  check_parent_ids(conn, input.school_unit_id, &input.parent_ids)?;

  let id = Uuid::new_v4();
  conn.execute(
    "INSERT INTO profiles (
       profile_id, school_unit_id, full_name, username, email, phone_number, role,
       is_active, created_at, birth_date, address, personal_id_number,
       email_notifications_enabled, sms_notifications_enabled, password_hash
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    rusqlite::params![
      encode_uuid(id),
      input.school_unit_id.map(encode_uuid),
      input.full_name,
      input.username,
      input.email,
      input.phone_number,
      input.role.to_string(),
      encode_dt(Utc::now()),
      input.birth_date.map(encode_date),
      input.address,
      input.personal_id_number,
      input.email_notifications_enabled,
      input.sms_notifications_enabled,
      input.password_hash,
    ],
  )?;
  write_links(conn, id, &input.taught_subject_ids, &input.parent_ids)?;
  require_profile(conn, id)
}

fn update_profile(
  conn: &Connection,
  id: Uuid,
  update: ProfileUpdate,
  current_year: i32,
) -> Result<UserProfile> {
  let current = require_profile(conn, id)?;
  update.validate(current.role)?;
  check_taught_subjects(conn, &update.taught_subject_ids)?;
  check_parent_ids(conn, current.school_unit_id, &update.parent_ids)?;

  for dropped in current
    .taught_subject_ids
    .iter()
    .filter(|s| !update.taught_subject_ids.contains(s))
  {
    let still_teaching = exists(
      conn,
      "SELECT 1 FROM class_teachers ct
       JOIN study_classes sc ON sc.study_class_id = ct.study_class_id
       WHERE ct.teacher_id = ?1 AND ct.subject_id = ?2 AND sc.academic_year = ?3",
      rusqlite::params![encode_uuid(id), encode_uuid(*dropped), current_year],
    )?;
    if still_teaching {
      return Err(CoreError::validation(format!(
        "{} still teaches subject {dropped} in a class of {current_year}",
        current.full_name
      ))
      .into());
    }
  }

  conn.execute(
    "UPDATE profiles
     SET full_name = ?2, email = ?3, phone_number = ?4, birth_date = ?5, address = ?6,
         personal_id_number = ?7, email_notifications_enabled = ?8,
         sms_notifications_enabled = ?9
     WHERE profile_id = ?1",
    rusqlite::params![
      encode_uuid(id),
      update.full_name,
      update.email,
      update.phone_number,
      update.birth_date.map(encode_date),
      update.address,
      update.personal_id_number,
      update.email_notifications_enabled,
      update.sms_notifications_enabled,
    ],
  )?;
  write_links(conn, id, &update.taught_subject_ids, &update.parent_ids)?;
  require_profile(conn, id)
}

fn set_active(conn: &Connection, id: Uuid, is_active: bool) -> Result<UserProfile> {
  let updated = conn.execute(
    "UPDATE profiles SET is_active = ?2 WHERE profile_id = ?1",
    rusqlite::params![encode_uuid(id), is_active],
  )?;
  if updated == 0 {
    return Err(CoreError::not_found("profile", id).into());
  }
  require_profile(conn, id)
}

fn delete_profile(conn: &Connection, id: Uuid) -> Result<()> {
  let profile = require_profile(conn, id)?;
  if profile.last_online.is_some() {
    return Err(CoreError::conflict(format!(
      "{} has already used the account and can only be deactivated",
      profile.full_name
    ))
    .into());
  }

  let key = encode_uuid(id);
  let blocker = match profile.role {
    UserRole::Administrator => None,
    UserRole::Principal => Some((
      "SELECT 1 FROM school_units WHERE principal_id = ?1",
      "leads a school unit",
    )),
    UserRole::Teacher => Some((
      "SELECT 1 FROM study_classes WHERE class_master_id = ?1
       UNION SELECT 1 FROM class_teachers WHERE teacher_id = ?1
       UNION SELECT 1 FROM catalogs_per_subject WHERE teacher_id = ?1",
      "is assigned to study classes",
    )),
    UserRole::Parent => Some((
      "SELECT 1 FROM student_parents WHERE parent_id = ?1",
      "has children registered",
    )),
    UserRole::Student => Some((
      "SELECT 1 FROM class_students WHERE student_id = ?1
       UNION SELECT 1 FROM catalogs_per_year WHERE student_id = ?1
       UNION SELECT 1 FROM catalogs_per_subject WHERE student_id = ?1",
      "is enrolled in a study class or has catalog history",
    )),
  };
  if let Some((sql, reason)) = blocker
    && exists(conn, sql, rusqlite::params![key])?
  {
    return Err(CoreError::conflict(format!("{} {reason}", profile.full_name)).into());
  }

  conn.execute("DELETE FROM notification_recipients WHERE user_id = ?1", rusqlite::params![key])?;
  conn.execute("DELETE FROM profiles WHERE profile_id = ?1", rusqlite::params![key])?;
  Ok(())
}

fn set_password(conn: &Connection, id: Uuid, password_hash: &str) -> Result<()> {
  let updated = conn.execute(
    "UPDATE profiles SET password_hash = ?2 WHERE profile_id = ?1",
    rusqlite::params![encode_uuid(id), password_hash],
  )?;
  if updated == 0 {
    return Err(CoreError::not_found("profile", id).into());
  }
  Ok(())
}

fn touch_last_online(conn: &Connection, id: Uuid, at: DateTime<Utc>) -> Result<()> {
  conn.execute(
    "UPDATE profiles SET last_online = ?2 WHERE profile_id = ?1",
    rusqlite::params![encode_uuid(id), encode_dt(at)],
  )?;
  Ok(())
}

// ─── ProfileStore impl ───────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
  async fn create_profile(&self, input: NewProfile) -> Result<UserProfile> {
    let profile = self.write(move |conn| create_profile(conn, input)).await?;
    info!(
      profile_id = %profile.profile_id,
      role = %profile.role,
      username = %profile.username,
      "created profile"
    );
    Ok(profile)
  }

  async fn update_profile(
    &self,
    id: Uuid,
    update: ProfileUpdate,
    current_year: i32,
  ) -> Result<UserProfile> {
    self
      .write(move |conn| update_profile(conn, id, update, current_year))
      .await
  }

  async fn set_active(&self, id: Uuid, is_active: bool) -> Result<UserProfile> {
    let profile = self.write(move |conn| set_active(conn, id, is_active)).await?;
    info!(profile_id = %id, is_active, "changed profile state");
    Ok(profile)
  }

  async fn delete_profile(&self, id: Uuid) -> Result<()> {
    self.write(move |conn| delete_profile(conn, id)).await?;
    info!(profile_id = %id, "deleted profile");
    Ok(())
  }

  async fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
    self.read(move |conn| load_profile(conn, id)).await
  }

  async fn list_profiles(&self, query: ProfileQuery) -> Result<Vec<UserProfile>> {
    self.read(move |conn| list_profiles(conn, &query)).await
  }

  async fn children_of(&self, parent_id: Uuid) -> Result<Vec<UserProfile>> {
    self.read(move |conn| children_of(conn, parent_id)).await
  }

  async fn set_password(&self, id: Uuid, password_hash: String) -> Result<()> {
    self
      .write(move |conn| set_password(conn, id, &password_hash))
      .await
  }

  async fn credentials(&self, username: String) -> Result<Option<Credentials>> {
    self.read(move |conn| credentials(conn, &username)).await
  }

  async fn touch_last_online(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    self.write(move |conn| touch_last_online(conn, id, at)).await
  }
}
