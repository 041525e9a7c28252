//! Role-based access rules.
//!
//! Every check takes the authenticated actor first. Checks return
//! [`Error::Forbidden`] so callers can propagate them with `?`.

use uuid::Uuid;

use crate::{
  Error, Result,
  catalog::CatalogPerSubject,
  profile::{UserProfile, UserRole},
  study_class::StudyClass,
};

pub fn require_role(actor: &UserProfile, roles: &[UserRole]) -> Result<()> {
  if roles.contains(&actor.role) {
    return Ok(());
  }
  Err(Error::forbidden(format!(
    "{} accounts cannot perform this operation",
    actor.role
  )))
}

pub fn require_admin(actor: &UserProfile) -> Result<()> {
  require_role(actor, &[UserRole::Administrator])
}

/// The actor is the principal of `school_unit_id`.
pub fn require_principal_of(actor: &UserProfile, school_unit_id: Uuid) -> Result<()> {
  require_role(actor, &[UserRole::Principal])?;
  require_same_school(actor, school_unit_id)
}

/// The actor is a member of `school_unit_id`. Administrators pass.
pub fn require_same_school(actor: &UserProfile, school_unit_id: Uuid) -> Result<()> {
  if actor.role == UserRole::Administrator || actor.belongs_to(school_unit_id) {
    return Ok(());
  }
  Err(Error::forbidden("resource belongs to another school unit"))
}

/// The school a principal operates on; principals without a school cannot
/// manage anything yet.
pub fn principal_school(actor: &UserProfile) -> Result<Uuid> {
  require_role(actor, &[UserRole::Principal])?;
  actor
    .school_unit_id
    .ok_or_else(|| Error::forbidden("principal is not assigned to a school unit"))
}

// ─── Profiles ────────────────────────────────────────────────────────────────

/// Administrators manage administrators and principals; principals manage
/// teachers, parents and students of their own school.
pub fn can_manage(
  actor: &UserProfile,
  role: UserRole,
  school_unit_id: Option<Uuid>,
) -> bool {
  match actor.role {
    UserRole::Administrator => {
      matches!(role, UserRole::Administrator | UserRole::Principal)
    }
    UserRole::Principal => {
      matches!(role, UserRole::Teacher | UserRole::Parent | UserRole::Student)
        && school_unit_id.is_some()
        && actor.school_unit_id == school_unit_id
    }
    _ => false,
  }
}

pub fn require_manage(
  actor: &UserProfile,
  role: UserRole,
  school_unit_id: Option<Uuid>,
) -> Result<()> {
  if can_manage(actor, role, school_unit_id) {
    return Ok(());
  }
  Err(Error::forbidden(format!(
    "{} accounts cannot manage {role} accounts",
    actor.role
  )))
}

pub fn require_manage_profile(actor: &UserProfile, target: &UserProfile) -> Result<()> {
  require_manage(actor, target.role, target.school_unit_id)
}

/// Own profile, a managed profile, or any profile of the actor's school for
/// school staff.
pub fn can_read_profile(actor: &UserProfile, target: &UserProfile) -> bool {
  if actor.profile_id == target.profile_id
    || can_manage(actor, target.role, target.school_unit_id)
  {
    return true;
  }
  matches!(actor.role, UserRole::Principal | UserRole::Teacher)
    && target
      .school_unit_id
      .is_some_and(|school| actor.belongs_to(school))
}

pub fn require_read_profile(actor: &UserProfile, target: &UserProfile) -> Result<()> {
  if can_read_profile(actor, target) {
    return Ok(());
  }
  Err(Error::forbidden("cannot read this profile"))
}

/// Own profile or a managed one.
pub fn require_self_or_manager(actor: &UserProfile, target: &UserProfile) -> Result<()> {
  if actor.profile_id == target.profile_id {
    return Ok(());
  }
  require_manage_profile(actor, target)
}

// ─── Catalogs ────────────────────────────────────────────────────────────────

/// Who may read a student's catalogs: the student, their parents, the
/// principal of their school, administrators, and teachers of `class`.
pub fn can_read_student(
  actor: &UserProfile,
  student: &UserProfile,
  class: Option<&StudyClass>,
) -> bool {
  match actor.role {
    UserRole::Administrator => true,
    UserRole::Principal => student
      .school_unit_id
      .is_some_and(|school| actor.belongs_to(school)),
    UserRole::Teacher => class.is_some_and(|c| c.is_taught_by(actor.profile_id)),
    UserRole::Parent => student.parent_ids.contains(&actor.profile_id),
    UserRole::Student => actor.profile_id == student.profile_id,
  }
}

pub fn require_read_student(
  actor: &UserProfile,
  student: &UserProfile,
  class: Option<&StudyClass>,
) -> Result<()> {
  if can_read_student(actor, student, class) {
    return Ok(());
  }
  Err(Error::forbidden("cannot read this student's catalogs"))
}

/// Only the catalog's teacher records grades and absences.
pub fn require_catalog_teacher(
  actor: &UserProfile,
  catalog: &CatalogPerSubject,
) -> Result<()> {
  if actor.role == UserRole::Teacher && actor.profile_id == catalog.teacher_id {
    return Ok(());
  }
  Err(Error::forbidden("only the subject teacher can edit this catalog"))
}

pub fn require_class_master(actor: &UserProfile, class: &StudyClass) -> Result<()> {
  if actor.role == UserRole::Teacher && actor.profile_id == class.class_master_id {
    return Ok(());
  }
  Err(Error::forbidden(format!(
    "only the class master of {} can do this",
    class.name()
  )))
}

/// Subject catalogs of a class are visible to the subject's teacher, the
/// class master and the school's principal.
pub fn require_read_class_subject(
  actor: &UserProfile,
  class: &StudyClass,
  subject_id: Uuid,
) -> Result<()> {
  let allowed = match actor.role {
    UserRole::Administrator => true,
    UserRole::Principal => actor.belongs_to(class.school_unit_id),
    UserRole::Teacher => {
      class.class_master_id == actor.profile_id
        || class.teacher_for(subject_id) == Some(actor.profile_id)
    }
    _ => false,
  };
  if allowed {
    return Ok(());
  }
  Err(Error::forbidden("cannot read catalogs of this class subject"))
}
