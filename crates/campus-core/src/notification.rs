//! Notifications and their audience rules.
//!
//! A notification is addressed to a [`NotificationTarget`]. Before anything is
//! stored, [`authorize_target`] turns the target into an [`Audience`] that the
//! sender is allowed to reach; backends resolve the audience into recipients.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  access::principal_school,
  profile::{UserProfile, UserRole},
  study_class::StudyClass,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationTarget {
  /// Every user of `role`: all principals for administrators, the sender's
  /// school otherwise.
  Role { role: UserRole },
  /// Students of a class, or the parents of those students.
  Class { study_class_id: Uuid, role: UserRole },
  User { user_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub notification_id:     Uuid,
  pub title:               String,
  pub body:                String,
  pub send_sms:            bool,
  pub from_user_id:        Uuid,
  pub from_user_full_name: String,
  pub from_user_role:      UserRole,
  pub target:              NotificationTarget,
  pub recipients_count:    u32,
  pub created_at:          DateTime<Utc>,
}

/// Delivery state of a notification for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetUserThrough {
  pub notification_id: Uuid,
  pub user_id:         Uuid,
  pub user_role:       UserRole,
  pub is_read:         bool,
  pub sent_at_email:   Option<DateTime<Utc>>,
  pub sent_at_phone:   Option<DateTime<Utc>>,
}

/// A notification as seen from a recipient's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedNotification {
  pub notification: Notification,
  pub is_read:      bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
  pub title:    String,
  pub body:     String,
  #[serde(default)]
  pub send_sms: bool,
  pub target:   NotificationTarget,
}

impl NewNotification {
  pub fn validate(&self) -> Result<()> {
    if self.title.trim().is_empty() {
      return Err(Error::validation("title must not be empty"));
    }
    if self.body.trim().is_empty() {
      return Err(Error::validation("body must not be empty"));
    }
    Ok(())
  }
}

// ─── Audience ────────────────────────────────────────────────────────────────

/// The set of users a notification reaches, after authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
  AllPrincipals,
  SchoolRole { school_unit_id: Uuid, role: UserRole },
  ClassRole { study_class_id: Uuid, role: UserRole },
  Single { user_id: Uuid },
}

/// Decide whether `sender` may address `target`.
///
/// `class` is the target class for [`NotificationTarget::Class`]. For
/// [`NotificationTarget::User`], `recipient` is the addressed profile and
/// `recipient_classes` the classes it is related to (a student's class, or
/// the classes of a parent's children).
pub fn authorize_target(
  sender: &UserProfile,
  target: &NotificationTarget,
  class: Option<&StudyClass>,
  recipient: Option<&UserProfile>,
  recipient_classes: &[StudyClass],
) -> Result<Audience> {
  match sender.role {
    UserRole::Administrator => match target {
      NotificationTarget::Role { role: UserRole::Principal } => {
        Ok(Audience::AllPrincipals)
      }
      NotificationTarget::User { user_id } => {
        let recipient = expect_recipient(recipient, *user_id)?;
        if recipient.role != UserRole::Principal {
          return Err(Error::forbidden(
            "administrators can only notify principals",
          ));
        }
        Ok(Audience::Single { user_id: *user_id })
      }
      _ => Err(Error::forbidden("administrators can only notify principals")),
    },

    UserRole::Principal => {
      let school = principal_school(sender)?;
      match target {
        NotificationTarget::Role { role } => {
          if !matches!(role, UserRole::Teacher | UserRole::Parent | UserRole::Student) {
            return Err(Error::validation(format!("cannot notify all {role}s")));
          }
          Ok(Audience::SchoolRole { school_unit_id: school, role: *role })
        }
        NotificationTarget::Class { study_class_id, role } => {
          let class = expect_class(class, *study_class_id)?;
          check_class_role(*role)?;
          if class.school_unit_id != school {
            return Err(Error::forbidden("class belongs to another school unit"));
          }
          Ok(Audience::ClassRole { study_class_id: *study_class_id, role: *role })
        }
        NotificationTarget::User { user_id } => {
          let recipient = expect_recipient(recipient, *user_id)?;
          if recipient.profile_id == sender.profile_id || !recipient.belongs_to(school) {
            return Err(Error::forbidden(
              "principals can only notify users of their school unit",
            ));
          }
          Ok(Audience::Single { user_id: *user_id })
        }
      }
    }

    UserRole::Teacher => match target {
      NotificationTarget::Class { study_class_id, role } => {
        let class = expect_class(class, *study_class_id)?;
        check_class_role(*role)?;
        if !class.is_taught_by(sender.profile_id) {
          return Err(Error::forbidden("teachers can only notify their own classes"));
        }
        Ok(Audience::ClassRole { study_class_id: *study_class_id, role: *role })
      }
      NotificationTarget::User { user_id } => {
        let recipient = expect_recipient(recipient, *user_id)?;
        let related = matches!(recipient.role, UserRole::Parent | UserRole::Student)
          && recipient_classes
            .iter()
            .any(|c| c.is_taught_by(sender.profile_id));
        if !related {
          return Err(Error::forbidden(
            "teachers can only notify students and parents of their classes",
          ));
        }
        Ok(Audience::Single { user_id: *user_id })
      }
      NotificationTarget::Role { .. } => Err(Error::forbidden(
        "teachers cannot notify a whole school unit",
      )),
    },

    UserRole::Parent | UserRole::Student => Err(Error::forbidden(format!(
      "{} accounts cannot send notifications",
      sender.role
    ))),
  }
}

fn check_class_role(role: UserRole) -> Result<()> {
  if matches!(role, UserRole::Parent | UserRole::Student) {
    return Ok(());
  }
  Err(Error::validation(format!("a class has no {role} audience")))
}

fn expect_class(class: Option<&StudyClass>, id: Uuid) -> Result<&StudyClass> {
  class
    .filter(|c| c.study_class_id == id)
    .ok_or_else(|| Error::not_found("study class", id))
}

fn expect_recipient(recipient: Option<&UserProfile>, id: Uuid) -> Result<&UserProfile> {
  recipient
    .filter(|r| r.profile_id == id)
    .ok_or_else(|| Error::not_found("profile", id))
}

/// Recipients of a class audience: its students, or the union of their
/// parents. `students` are the class's student profiles.
pub fn class_recipients(role: UserRole, students: &[UserProfile]) -> Vec<Uuid> {
  match role {
    UserRole::Student => students.iter().map(|s| s.profile_id).collect(),
    UserRole::Parent => students
      .iter()
      .flat_map(|s| s.parent_ids.iter().copied())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect(),
    _ => Vec::new(),
  }
}

// ─── Delivery ────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryChannel {
  Email,
  Sms,
}

/// One message to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryJob {
  pub notification_id: Uuid,
  pub user_id:         Uuid,
  pub channel:         DeliveryChannel,
  /// Email address or phone number.
  pub address:         String,
  pub title:           String,
  pub body:            String,
}

/// Email jobs for recipients with an address and email notifications on;
/// SMS jobs when requested and the recipient has a phone with SMS on.
pub fn delivery_jobs(
  notification: &Notification,
  recipients: &[UserProfile],
) -> Vec<DeliveryJob> {
  let job = |user: &UserProfile, channel, address: &str| DeliveryJob {
    notification_id: notification.notification_id,
    user_id: user.profile_id,
    channel,
    address: address.to_owned(),
    title: notification.title.clone(),
    body: notification.body.clone(),
  };

  let mut jobs = Vec::new();
  for user in recipients {
    if user.email_notifications_enabled
      && let Some(email) = &user.email
    {
      jobs.push(job(user, DeliveryChannel::Email, email));
    }
    if notification.send_sms
      && user.sms_notifications_enabled
      && let Some(phone) = &user.phone_number
    {
      jobs.push(job(user, DeliveryChannel::Sms, phone));
    }
  }
  jobs
}

#[cfg(test)]
mod tests {
  use super::*;

  fn profile(role: UserRole, school: Option<Uuid>) -> UserProfile {
    UserProfile {
      profile_id: Uuid::new_v4(),
      school_unit_id: school,
      full_name: "Ana Pop".into(),
      username: format!("u-{}", Uuid::new_v4()),
      email: Some("ana@example.ro".into()),
      phone_number: Some("0712345678".into()),
      role,
      is_active: true,
      created_at: Utc::now(),
      last_online: None,
      birth_date: None,
      address: None,
      personal_id_number: None,
      email_notifications_enabled: true,
      sms_notifications_enabled: false,
      taught_subject_ids: Vec::new(),
      parent_ids: Vec::new(),
      student_in_class_id: None,
    }
  }

  fn class(school: Uuid, master: Uuid) -> StudyClass {
    StudyClass {
      study_class_id:  Uuid::new_v4(),
      school_unit_id:  school,
      program_id:      Uuid::new_v4(),
      program_name:    "Program".into(),
      class_grade:     7,
      class_letter:    "C".into(),
      academic_year:   2024,
      class_master_id: master,
      teachers:        Vec::new(),
      student_ids:     Vec::new(),
    }
  }

  #[test]
  fn administrators_reach_principals_only() {
    let admin = profile(UserRole::Administrator, None);
    let all = NotificationTarget::Role { role: UserRole::Principal };
    assert_eq!(
      authorize_target(&admin, &all, None, None, &[]).unwrap(),
      Audience::AllPrincipals
    );
    let teachers = NotificationTarget::Role { role: UserRole::Teacher };
    assert!(authorize_target(&admin, &teachers, None, None, &[]).is_err());
  }

  #[test]
  fn principals_stay_inside_their_school() {
    let school = Uuid::new_v4();
    let principal = profile(UserRole::Principal, Some(school));
    let own = class(school, Uuid::new_v4());
    let foreign = class(Uuid::new_v4(), Uuid::new_v4());

    let target = |c: &StudyClass| NotificationTarget::Class {
      study_class_id: c.study_class_id,
      role:           UserRole::Parent,
    };
    assert!(authorize_target(&principal, &target(&own), Some(&own), None, &[]).is_ok());
    assert!(matches!(
      authorize_target(&principal, &target(&foreign), Some(&foreign), None, &[]),
      Err(Error::Forbidden(_))
    ));
  }

  #[test]
  fn teachers_reach_related_students_and_parents() {
    let school = Uuid::new_v4();
    let teacher = profile(UserRole::Teacher, Some(school));
    let taught = class(school, teacher.profile_id);
    let parent = profile(UserRole::Parent, Some(school));
    let target = NotificationTarget::User { user_id: parent.profile_id };

    assert!(
      authorize_target(&teacher, &target, None, Some(&parent), &[taught.clone()]).is_ok()
    );
    let other = class(school, Uuid::new_v4());
    assert!(authorize_target(&teacher, &target, None, Some(&parent), &[other]).is_err());

    let students = NotificationTarget::Role { role: UserRole::Student };
    assert!(authorize_target(&teacher, &students, None, None, &[]).is_err());
  }

  #[test]
  fn parents_cannot_send() {
    let parent = profile(UserRole::Parent, Some(Uuid::new_v4()));
    let target = NotificationTarget::User { user_id: Uuid::new_v4() };
    assert!(authorize_target(&parent, &target, None, None, &[]).is_err());
  }

  #[test]
  fn parents_of_a_class_are_deduplicated() {
    let parent = Uuid::new_v4();
    let mut a = profile(UserRole::Student, None);
    let mut b = profile(UserRole::Student, None);
    a.parent_ids.push(parent);
    b.parent_ids.push(parent);
    assert_eq!(class_recipients(UserRole::Parent, &[a.clone(), b]), vec![parent]);
    assert_eq!(class_recipients(UserRole::Student, &[a.clone()]), vec![a.profile_id]);
  }

  #[test]
  fn delivery_respects_preferences() {
    let mut email_only = profile(UserRole::Parent, None);
    email_only.sms_notifications_enabled = false;
    let mut both = profile(UserRole::Parent, None);
    both.sms_notifications_enabled = true;
    let mut silent = profile(UserRole::Parent, None);
    silent.email_notifications_enabled = false;

    let notification = Notification {
      notification_id:     Uuid::new_v4(),
      title:               "Ședință".into(),
      body:                "Joi, ora 18".into(),
      send_sms:            true,
      from_user_id:        Uuid::new_v4(),
      from_user_full_name: "Dir".into(),
      from_user_role:      UserRole::Principal,
      target:              NotificationTarget::Role { role: UserRole::Parent },
      recipients_count:    3,
      created_at:          Utc::now(),
    };
    let jobs = delivery_jobs(&notification, &[email_only, both.clone(), silent]);
    assert_eq!(jobs.len(), 3);
    assert_eq!(
      jobs.iter().filter(|j| j.user_id == both.profile_id).count(),
      2
    );
    assert!(jobs.iter().any(|j| j.channel == DeliveryChannel::Sms));
  }
}
