//! School units and subjects.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  profile::{UserProfile, UserRole},
};

/// Name of the seeded class-master subject. Its catalogs carry no grades.
pub const COORDINATION_SUBJECT_NAME: &str = "Dirigenție";

// ─── Category ────────────────────────────────────────────────────────────────

/// Classification of a school unit; each category teaches a grade range.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchoolCategory {
  PrimarySchool,
  SecondarySchool,
  Highschool,
  TechnologicalHighschool,
  VocationalSchool,
}

impl SchoolCategory {
  pub fn grades(self) -> RangeInclusive<u8> {
    match self {
      Self::PrimarySchool => 0..=4,
      Self::SecondarySchool => 5..=8,
      Self::Highschool | Self::TechnologicalHighschool => 9..=12,
      Self::VocationalSchool => 9..=11,
    }
  }

  pub fn teaches(self, grade: u8) -> bool { self.grades().contains(&grade) }

  /// Categories that may carry an academic profile (e.g. "real", "uman").
  pub fn has_profiles(self) -> bool {
    matches!(
      self,
      Self::Highschool | Self::TechnologicalHighschool | Self::VocationalSchool
    )
  }
}

// ─── School unit ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolUnit {
  pub school_unit_id:   Uuid,
  pub name:             String,
  pub address:          String,
  pub phone_number:     String,
  pub email:            String,
  pub district:         String,
  pub city:             String,
  pub categories:       Vec<SchoolCategory>,
  pub academic_profile: Option<String>,
  pub principal_id:     Uuid,
  pub is_active:        bool,
  pub created_at:       DateTime<Utc>,
}

impl SchoolUnit {
  pub fn teaches_grade(&self, grade: u8) -> bool {
    self.categories.iter().any(|c| c.teaches(grade))
  }
}

/// Input to `create_school` and `update_school` (full replacement).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchool {
  pub name:             String,
  pub address:          String,
  pub phone_number:     String,
  pub email:            String,
  pub district:         String,
  pub city:             String,
  pub categories:       Vec<SchoolCategory>,
  pub academic_profile: Option<String>,
  pub principal_id:     Uuid,
}

impl NewSchool {
  pub fn validate(&self) -> Result<()> {
    for (field, value) in [
      ("name", &self.name),
      ("address", &self.address),
      ("district", &self.district),
      ("city", &self.city),
      ("phone_number", &self.phone_number),
      ("email", &self.email),
    ] {
      if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} must not be empty")));
      }
    }

    if self.categories.is_empty() {
      return Err(Error::validation("at least one category is required"));
    }
    let mut seen = self.categories.clone();
    seen.sort();
    seen.dedup();
    if seen.len() != self.categories.len() {
      return Err(Error::validation("categories must be unique"));
    }

    if self.academic_profile.is_some()
      && !self.categories.iter().any(|c| c.has_profiles())
    {
      return Err(Error::validation(
        "only high schools can have an academic profile",
      ));
    }
    Ok(())
  }
}

/// Principals lead exactly one school unit.
///
/// `current_school` is the school being updated, if any; a principal may keep
/// leading it.
pub fn check_principal(
  principal: &UserProfile,
  current_school: Option<Uuid>,
) -> Result<()> {
  if principal.role != UserRole::Principal || !principal.is_active {
    return Err(Error::validation(format!(
      "{} is not an active principal",
      principal.profile_id
    )));
  }
  match principal.school_unit_id {
    Some(school) if Some(school) != current_school => Err(Error::conflict(
      format!("principal {} already leads another school", principal.profile_id),
    )),
    _ => Ok(()),
  }
}

/// Parameters for `list_schools`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchoolQuery {
  pub city:      Option<String>,
  pub district:  Option<String>,
  pub is_active: Option<bool>,
  /// Case-insensitive filter over the school name.
  pub text:      Option<String>,
}

// ─── Subjects ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id:      Uuid,
  pub name:            String,
  pub is_coordination: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubject {
  pub name: String,
}

impl NewSubject {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::validation("subject name must not be empty"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn school() -> NewSchool {
    NewSchool {
      name:             "Colegiul Național".into(),
      address:          "Str. Lungă 1".into(),
      phone_number:     "0268000000".into(),
      email:            "office@cn.ro".into(),
      district:         "Brașov".into(),
      city:             "Brașov".into(),
      categories:       vec![SchoolCategory::Highschool],
      academic_profile: Some("real".into()),
      principal_id:     Uuid::new_v4(),
    }
  }

  #[test]
  fn category_grade_ranges() {
    assert!(SchoolCategory::PrimarySchool.teaches(0));
    assert!(!SchoolCategory::PrimarySchool.teaches(5));
    assert!(SchoolCategory::VocationalSchool.teaches(11));
    assert!(!SchoolCategory::VocationalSchool.teaches(12));
  }

  #[test]
  fn valid_school() {
    assert!(school().validate().is_ok());
  }

  #[test]
  fn duplicate_categories_rejected() {
    let mut s = school();
    s.categories = vec![SchoolCategory::Highschool, SchoolCategory::Highschool];
    assert!(s.validate().is_err());
  }

  #[test]
  fn profile_requires_high_school_category() {
    let mut s = school();
    s.categories = vec![SchoolCategory::PrimarySchool];
    assert!(s.validate().is_err());
    s.academic_profile = None;
    assert!(s.validate().is_ok());
  }
}
