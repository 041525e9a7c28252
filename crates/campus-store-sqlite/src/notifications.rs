//! Notifications and their recipients.

use campus_core::{
  Error as CoreError,
  notification::{
    Audience, DeliveryChannel, DeliveryJob, NewNotification, Notification,
    NotificationTarget, ReceivedNotification, TargetUserThrough, authorize_target,
    class_recipients, delivery_jobs,
  },
  profile::{UserProfile, UserRole},
  store::NotificationStore,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, ToSql};
use tracing::info;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  classes::{load_class, related_classes},
  encode::{decode_dt, decode_enum, decode_opt_dt, decode_uuid, encode_dt, encode_uuid},
  profiles::{load_profile, query_profiles},
};

// ─── Rows ────────────────────────────────────────────────────────────────────

const NOTIFICATION_COLUMNS: &str = "n.notification_id, n.title, n.body, n.send_sms, \
  n.from_user_id, n.from_user_full_name, n.from_user_role, n.target, \
  n.recipients_count, n.created_at";

struct RawNotification {
  notification_id:     String,
  title:               String,
  body:                String,
  send_sms:            bool,
  from_user_id:        String,
  from_user_full_name: String,
  from_user_role:      String,
  target:              String,
  recipients_count:    u32,
  created_at:          String,
}

impl RawNotification {
  fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      notification_id:     r.get("notification_id")?,
      title:               r.get("title")?,
      body:                r.get("body")?,
      send_sms:            r.get("send_sms")?,
      from_user_id:        r.get("from_user_id")?,
      from_user_full_name: r.get("from_user_full_name")?,
      from_user_role:      r.get("from_user_role")?,
      target:              r.get("target")?,
      recipients_count:    r.get("recipients_count")?,
      created_at:          r.get("created_at")?,
    })
  }

  fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      notification_id:     decode_uuid(&self.notification_id)?,
      title:               self.title,
      body:                self.body,
      send_sms:            self.send_sms,
      from_user_id:        decode_uuid(&self.from_user_id)?,
      from_user_full_name: self.from_user_full_name,
      from_user_role:      decode_enum(&self.from_user_role, "role")?,
      target:              serde_json::from_str(&self.target)?,
      recipients_count:    self.recipients_count,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

fn query_notifications(
  conn: &Connection,
  tail: &str,
  params: &[&dyn ToSql],
) -> Result<Vec<Notification>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {NOTIFICATION_COLUMNS} FROM notifications n {tail}"
  ))?;
  let raws = stmt
    .query_map(params, RawNotification::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawNotification::into_notification).collect()
}

fn load_notification(conn: &Connection, id: Uuid) -> Result<Option<Notification>> {
  Ok(
    query_notifications(conn, "WHERE n.notification_id = ?1", rusqlite::params![encode_uuid(id)])?
      .into_iter()
      .next(),
  )
}

fn load_recipient(
  conn: &Connection,
  notification_id: Uuid,
  user_id: Uuid,
) -> Result<Option<TargetUserThrough>> {
  let mut stmt = conn.prepare_cached(
    "SELECT user_role, is_read, sent_at_email, sent_at_phone
     FROM notification_recipients WHERE notification_id = ?1 AND user_id = ?2",
  )?;
  let rows = stmt
    .query_map(
      rusqlite::params![encode_uuid(notification_id), encode_uuid(user_id)],
      |r| {
        Ok((
          r.get::<_, String>(0)?,
          r.get::<_, bool>(1)?,
          r.get::<_, Option<String>>(2)?,
          r.get::<_, Option<String>>(3)?,
        ))
      },
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .next()
    .map(|(role, is_read, email, phone)| {
      Ok(TargetUserThrough {
        notification_id,
        user_id,
        user_role: decode_enum(&role, "role")?,
        is_read,
        sent_at_email: decode_opt_dt(email.as_deref())?,
        sent_at_phone: decode_opt_dt(phone.as_deref())?,
      })
    })
    .transpose()
}

// ─── Sending ─────────────────────────────────────────────────────────────────

/// Active profiles reached by an authorized audience, the sender excluded.
fn resolve_audience(
  conn: &Connection,
  audience: &Audience,
  sender_id: Uuid,
) -> Result<Vec<UserProfile>> {
  let recipients = match audience {
    Audience::AllPrincipals => query_profiles(
      conn,
      "WHERE role = ?1 AND is_active = 1 ORDER BY full_name",
      rusqlite::params![UserRole::Principal.to_string()],
    )?,
    Audience::SchoolRole { school_unit_id, role } => query_profiles(
      conn,
      "WHERE role = ?1 AND school_unit_id = ?2 AND is_active = 1 ORDER BY full_name",
      rusqlite::params![role.to_string(), encode_uuid(*school_unit_id)],
    )?,
    Audience::ClassRole { study_class_id, role } => {
      let students = query_profiles(
        conn,
        "WHERE profile_id IN (
           SELECT student_id FROM class_students WHERE study_class_id = ?1)
         ORDER BY full_name",
        rusqlite::params![encode_uuid(*study_class_id)],
      )?;
      let mut recipients = Vec::new();
      for id in class_recipients(*role, &students) {
        if let Some(profile) = load_profile(conn, id)? {
          recipients.push(profile);
        }
      }
      recipients.retain(|p| p.is_active);
      recipients
    }
    Audience::Single { user_id } => {
      let profile = load_profile(conn, *user_id)?
        .ok_or_else(|| CoreError::not_found("profile", user_id))?;
      if !profile.is_active {
        return Err(CoreError::validation(format!(
          "{} is not an active user",
          profile.full_name
        ))
        .into());
      }
      vec![profile]
    }
  };
  Ok(recipients.into_iter().filter(|p| p.profile_id != sender_id).collect())
}

fn send(
  conn: &Connection,
  sender: UserProfile,
  input: NewNotification,
  current_year: i32,
) -> Result<(Notification, Vec<DeliveryJob>)> {
  input.validate()?;

  let class = match &input.target {
    NotificationTarget::Class { study_class_id, .. } => load_class(conn, *study_class_id)?,
    _ => None,
  };
  let (recipient, recipient_classes) = match &input.target {
    NotificationTarget::User { user_id } => {
      (load_profile(conn, *user_id)?, related_classes(conn, *user_id, current_year)?)
    }
    _ => (None, Vec::new()),
  };
  let audience = authorize_target(
    &sender,
    &input.target,
    class.as_ref(),
    recipient.as_ref(),
    &recipient_classes,
  )?;
  let recipients = resolve_audience(conn, &audience, sender.profile_id)?;

  let notification = Notification {
    notification_id:     Uuid::new_v4(),
    title:               input.title.trim().to_owned(),
    body:                input.body,
    send_sms:            input.send_sms,
    from_user_id:        sender.profile_id,
    from_user_full_name: sender.full_name,
    from_user_role:      sender.role,
    target:              input.target,
    recipients_count:    recipients.len() as u32,
    created_at:          Utc::now(),
  };
  let key = encode_uuid(notification.notification_id);
  conn.execute(
    "INSERT INTO notifications (
       notification_id, title, body, send_sms, from_user_id, from_user_full_name,
       from_user_role, target, recipients_count, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      key,
      notification.title,
      notification.body,
      notification.send_sms,
      encode_uuid(notification.from_user_id),
      notification.from_user_full_name,
      notification.from_user_role.to_string(),
      serde_json::to_string(&notification.target)?,
      notification.recipients_count,
      encode_dt(notification.created_at),
    ],
  )?;
  for user in &recipients {
    conn.execute(
      "INSERT INTO notification_recipients (notification_id, user_id, user_role)
       VALUES (?1, ?2, ?3)",
      rusqlite::params![key, encode_uuid(user.profile_id), user.role.to_string()],
    )?;
  }

  let jobs = delivery_jobs(&notification, &recipients);
  Ok((notification, jobs))
}

// ─── Reading ─────────────────────────────────────────────────────────────────

fn list_received(
  conn: &Connection,
  user_id: Uuid,
  unread_only: bool,
) -> Result<Vec<ReceivedNotification>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {NOTIFICATION_COLUMNS}, r.is_read
     FROM notifications n
     JOIN notification_recipients r ON r.notification_id = n.notification_id
     WHERE r.user_id = ?1 AND (?2 = 0 OR r.is_read = 0)
     ORDER BY n.created_at DESC"
  ))?;
  let rows = stmt
    .query_map(rusqlite::params![encode_uuid(user_id), unread_only], |r| {
      Ok((RawNotification::from_row(r)?, r.get::<_, bool>("is_read")?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .map(|(raw, is_read)| {
      Ok(ReceivedNotification { notification: raw.into_notification()?, is_read })
    })
    .collect()
}

fn mark_read(conn: &Connection, notification_id: Uuid, user_id: Uuid) -> Result<()> {
  let updated = conn.execute(
    "UPDATE notification_recipients SET is_read = 1
     WHERE notification_id = ?1 AND user_id = ?2",
    rusqlite::params![encode_uuid(notification_id), encode_uuid(user_id)],
  )?;
  if updated == 0 {
    return Err(CoreError::not_found(
      "notification recipient",
      format!("{notification_id}/{user_id}"),
    )
    .into());
  }
  Ok(())
}

fn mark_delivered(
  conn: &Connection,
  notification_id: Uuid,
  user_id: Uuid,
  channel: DeliveryChannel,
  at: DateTime<Utc>,
) -> Result<()> {
  let column = match channel {
    DeliveryChannel::Email => "sent_at_email",
    DeliveryChannel::Sms => "sent_at_phone",
  };
  conn.execute(
    &format!(
      "UPDATE notification_recipients SET {column} = ?3
       WHERE notification_id = ?1 AND user_id = ?2"
    ),
    rusqlite::params![encode_uuid(notification_id), encode_uuid(user_id), encode_dt(at)],
  )?;
  Ok(())
}

// ─── NotificationStore impl ──────────────────────────────────────────────────

impl NotificationStore for SqliteStore {
  async fn send_notification(
    &self,
    sender: UserProfile,
    input: NewNotification,
    current_year: i32,
  ) -> Result<(Notification, Vec<DeliveryJob>)> {
    let (notification, jobs) = self
      .write(move |conn| send(conn, sender, input, current_year))
      .await?;
    info!(
      notification_id = %notification.notification_id,
      from = %notification.from_user_id,
      recipients = notification.recipients_count,
      deliveries = jobs.len(),
      "sent notification"
    );
    Ok((notification, jobs))
  }

  async fn list_sent(&self, user_id: Uuid) -> Result<Vec<Notification>> {
    self
      .read(move |conn| {
        query_notifications(
          conn,
          "WHERE n.from_user_id = ?1 ORDER BY n.created_at DESC",
          rusqlite::params![encode_uuid(user_id)],
        )
      })
      .await
  }

  async fn list_received(
    &self,
    user_id: Uuid,
    unread_only: bool,
  ) -> Result<Vec<ReceivedNotification>> {
    self.read(move |conn| list_received(conn, user_id, unread_only)).await
  }

  async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
    self.read(move |conn| load_notification(conn, id)).await
  }

  async fn recipient(
    &self,
    notification_id: Uuid,
    user_id: Uuid,
  ) -> Result<Option<TargetUserThrough>> {
    self
      .read(move |conn| load_recipient(conn, notification_id, user_id))
      .await
  }

  async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<()> {
    self.write(move |conn| mark_read(conn, notification_id, user_id)).await
  }

  async fn mark_delivered(
    &self,
    notification_id: Uuid,
    user_id: Uuid,
    channel: DeliveryChannel,
    at: DateTime<Utc>,
  ) -> Result<()> {
    self
      .write(move |conn| mark_delivered(conn, notification_id, user_id, channel, at))
      .await
  }
}
