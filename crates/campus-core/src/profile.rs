//! User profiles: role-tagged accounts.
//!
//! Every account has exactly one [`UserRole`]. Role-specific fields
//! (taught subjects, parents, the current study class) are empty for the
//! other roles.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Role ────────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
  Administrator,
  Principal,
  Teacher,
  Parent,
  Student,
}

impl UserRole {
  /// Roles whose accounts always belong to a school unit from creation.
  /// Principals get their school when a school is assigned to them.
  pub fn requires_school_at_creation(self) -> bool {
    matches!(self, Self::Teacher | Self::Parent | Self::Student)
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
  pub profile_id:                  Uuid,
  pub school_unit_id:              Option<Uuid>,
  pub full_name:                   String,
  pub username:                    String,
  pub email:                       Option<String>,
  pub phone_number:                Option<String>,
  pub role:                        UserRole,
  pub is_active:                   bool,
  pub created_at:                  DateTime<Utc>,
  /// `None` until the first successful authentication.
  pub last_online:                 Option<DateTime<Utc>>,
  pub birth_date:                  Option<NaiveDate>,
  pub address:                     Option<String>,
  pub personal_id_number:          Option<String>,
  pub email_notifications_enabled: bool,
  pub sms_notifications_enabled:   bool,
  /// Teachers only.
  pub taught_subject_ids:          Vec<Uuid>,
  /// Students only.
  pub parent_ids:                  Vec<Uuid>,
  /// Students only; maintained by study-class operations.
  pub student_in_class_id:         Option<Uuid>,
}

impl UserProfile {
  pub fn belongs_to(&self, school_unit_id: Uuid) -> bool {
    self.school_unit_id == Some(school_unit_id)
  }

  pub fn teaches(&self, subject_id: Uuid) -> bool {
    self.taught_subject_ids.contains(&subject_id)
  }

  /// Active account of `role` in `school_unit_id`.
  pub fn is_active_member(&self, role: UserRole, school_unit_id: Uuid) -> bool {
    self.is_active && self.role == role && self.belongs_to(school_unit_id)
  }
}

/// A profile together with what authentication needs to know about it.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub profile:       UserProfile,
  /// PHC string produced by argon2; `None` if no password was ever set.
  pub password_hash: Option<String>,
  /// `false` when the profile's school unit is deactivated.
  pub school_active: bool,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::ProfileStore::create_profile`].
#[derive(Debug, Clone)]
pub struct NewProfile {
  pub school_unit_id:              Option<Uuid>,
  pub full_name:                   String,
  pub username:                    String,
  pub email:                       Option<String>,
  pub phone_number:                Option<String>,
  pub role:                        UserRole,
  pub birth_date:                  Option<NaiveDate>,
  pub address:                     Option<String>,
  pub personal_id_number:          Option<String>,
  pub email_notifications_enabled: bool,
  pub sms_notifications_enabled:   bool,
  pub taught_subject_ids:          Vec<Uuid>,
  pub parent_ids:                  Vec<Uuid>,
  pub password_hash:               Option<String>,
}

impl NewProfile {
  /// Convenience constructor with all optional fields left empty.
  pub fn new(
    role: UserRole,
    school_unit_id: Option<Uuid>,
    username: impl Into<String>,
    full_name: impl Into<String>,
  ) -> Self {
    Self {
      school_unit_id,
      full_name: full_name.into(),
      username: username.into(),
      email: None,
      phone_number: None,
      role,
      birth_date: None,
      address: None,
      personal_id_number: None,
      email_notifications_enabled: true,
      sms_notifications_enabled: false,
      taught_subject_ids: Vec::new(),
      parent_ids: Vec::new(),
      password_hash: None,
    }
  }

  /// Shape checks that need no stored data.
  pub fn validate(&self) -> Result<()> {
    validate_username(&self.username)?;
    validate_contact(
      self.role,
      &self.full_name,
      self.email.as_deref(),
      self.phone_number.as_deref(),
    )?;
    validate_role_lists(self.role, &self.taught_subject_ids, &self.parent_ids)?;

    match (self.role.requires_school_at_creation(), self.school_unit_id) {
      (true, None) => Err(Error::validation(format!(
        "a {} must belong to a school unit",
        self.role
      ))),
      (false, Some(_)) => Err(Error::validation(format!(
        "a {} cannot be created inside a school unit",
        self.role
      ))),
      _ => Ok(()),
    }
  }
}

/// Full replacement of a profile's editable fields. Role and school are
/// immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
  pub full_name:                   String,
  pub email:                       Option<String>,
  pub phone_number:                Option<String>,
  pub birth_date:                  Option<NaiveDate>,
  pub address:                     Option<String>,
  pub personal_id_number:          Option<String>,
  pub email_notifications_enabled: bool,
  pub sms_notifications_enabled:   bool,
  #[serde(default)]
  pub taught_subject_ids:          Vec<Uuid>,
  #[serde(default)]
  pub parent_ids:                  Vec<Uuid>,
}

impl ProfileUpdate {
  pub fn validate(&self, role: UserRole) -> Result<()> {
    validate_contact(
      role,
      &self.full_name,
      self.email.as_deref(),
      self.phone_number.as_deref(),
    )?;
    validate_role_lists(role, &self.taught_subject_ids, &self.parent_ids)
  }

  /// Whether the update touches fields only managers may change.
  pub fn changes_managed_fields(&self, current: &UserProfile) -> bool {
    !same_members(&self.taught_subject_ids, &current.taught_subject_ids)
      || !same_members(&self.parent_ids, &current.parent_ids)
      || self.personal_id_number != current.personal_id_number
  }
}

/// Parameters for [`crate::store::ProfileStore::list_profiles`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileQuery {
  pub role:           Option<UserRole>,
  pub school_unit_id: Option<Uuid>,
  /// Case-insensitive filter over full name, username and email.
  pub text:           Option<String>,
  pub is_active:      Option<bool>,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

pub fn validate_username(username: &str) -> Result<()> {
  if username.trim().is_empty() {
    return Err(Error::validation("username must not be empty"));
  }
  if username.chars().any(char::is_whitespace) || username.contains(':') {
    return Err(Error::validation(
      "username must not contain whitespace or ':'",
    ));
  }
  Ok(())
}

fn validate_contact(
  role: UserRole,
  full_name: &str,
  email: Option<&str>,
  phone_number: Option<&str>,
) -> Result<()> {
  if full_name.trim().is_empty() {
    return Err(Error::validation("full name must not be empty"));
  }
  if let Some(email) = email
    && !is_plausible_email(email)
  {
    return Err(Error::validation(format!("invalid email address {email:?}")));
  }
  if let Some(phone) = phone_number
    && !is_plausible_phone(phone)
  {
    return Err(Error::validation(format!("invalid phone number {phone:?}")));
  }
  if role == UserRole::Principal && email.is_none() {
    return Err(Error::validation("a principal must have an email address"));
  }
  Ok(())
}

fn validate_role_lists(
  role: UserRole,
  taught_subject_ids: &[Uuid],
  parent_ids: &[Uuid],
) -> Result<()> {
  if role != UserRole::Teacher && !taught_subject_ids.is_empty() {
    return Err(Error::validation("only teachers can have taught subjects"));
  }
  if role != UserRole::Student && !parent_ids.is_empty() {
    return Err(Error::validation("only students can have parents"));
  }
  Ok(())
}

/// Parents of a student must be active parents of the student's school.
pub fn check_parents(school_unit_id: Uuid, parents: &[UserProfile]) -> Result<()> {
  for parent in parents {
    if !parent.is_active_member(UserRole::Parent, school_unit_id) {
      return Err(Error::validation(format!(
        "{} is not an active parent of this school unit",
        parent.profile_id
      )));
    }
  }
  Ok(())
}

fn is_plausible_email(email: &str) -> bool {
  match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    }
    None => false,
  }
}

fn is_plausible_phone(phone: &str) -> bool {
  let digits = phone.trim_start_matches('+');
  digits.len() >= 6 && digits.chars().all(|c| c.is_ascii_digit())
}

fn same_members(a: &[Uuid], b: &[Uuid]) -> bool {
  a.len() == b.len() && a.iter().all(|id| b.contains(id))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn teacher_needs_school() {
    let input = NewProfile::new(UserRole::Teacher, None, "t1", "Ana Pop");
    assert!(matches!(input.validate(), Err(Error::Validation(_))));
  }

  #[test]
  fn principal_is_created_without_school_and_needs_email() {
    let mut input =
      NewProfile::new(UserRole::Principal, None, "p1", "Ion Popescu");
    assert!(input.validate().is_err());
    input.email = Some("principal@school.ro".into());
    assert!(input.validate().is_ok());

    input.school_unit_id = Some(Uuid::new_v4());
    assert!(input.validate().is_err());
  }

  #[test]
  fn role_specific_lists_are_exclusive() {
    let mut input =
      NewProfile::new(UserRole::Parent, Some(Uuid::new_v4()), "pa", "Parent");
    input.taught_subject_ids = vec![Uuid::new_v4()];
    assert!(input.validate().is_err());

    let mut input =
      NewProfile::new(UserRole::Teacher, Some(Uuid::new_v4()), "te", "Teacher");
    input.parent_ids = vec![Uuid::new_v4()];
    assert!(input.validate().is_err());
  }

  #[test]
  fn usernames_and_contacts() {
    assert!(validate_username("ana.pop").is_ok());
    assert!(validate_username("ana pop").is_err());
    assert!(validate_username("ana:pop").is_err());
    assert!(validate_username("  ").is_err());

    assert!(is_plausible_email("a@b.ro"));
    assert!(!is_plausible_email("a@b"));
    assert!(!is_plausible_email("@b.ro"));
    assert!(is_plausible_phone("+40712345678"));
    assert!(!is_plausible_phone("07-12"));
  }
}
