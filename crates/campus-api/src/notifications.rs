//! Handlers for `/notifications`.
//!
//! | Method | Path | Who |
//! |--------|------|-----|
//! | `GET`  | `/notifications[?box=received|sent&unread_only=]` | anyone |
//! | `POST` | `/notifications` | anyone allowed to reach the target |
//! | `GET`  | `/notifications/{id}` | sender, recipients |
//! | `POST` | `/notifications/{id}/read` | recipients |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use campus_core::{
  notification::{NewNotification, Notification},
  store::Store,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  ApiState, CurrentUser,
  error::{ApiError, found},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mailbox {
  #[default]
  Received,
  Sent,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default, rename = "box")]
  pub mailbox:     Mailbox,
  #[serde(default)]
  pub unread_only: bool,
}

/// `GET /notifications[?box=received|sent&unread_only=true]`
pub async fn list<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
  let response = match params.mailbox {
    Mailbox::Sent => {
      let sent = state
        .store
        .list_sent(actor.profile_id)
        .await
        .map_err(ApiError::store)?;
      Json(sent).into_response()
    }
    Mailbox::Received => {
      let received = state
        .store
        .list_received(actor.profile_id, params.unread_only)
        .await
        .map_err(ApiError::store)?;
      Json(received).into_response()
    }
  };
  Ok(response)
}

/// `POST /notifications` — body: `{"title":…,"body":…,"send_sms":false,"target":{"type":…}}`
pub async fn send<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Json(input): Json<NewNotification>,
) -> Result<impl IntoResponse, ApiError> {
  let sender_id = actor.profile_id;
  let (notification, jobs) = state
    .store
    .send_notification(actor, input, state.current_year())
    .await
    .map_err(ApiError::store)?;
  info!(
    notification_id = %notification.notification_id,
    from = %sender_id,
    recipients = notification.recipients_count,
    deliveries = jobs.len(),
    "notification sent"
  );
  state.enqueue(jobs);
  Ok((StatusCode::CREATED, Json(notification)))
}

async fn load<S: Store>(state: &ApiState<S>, id: Uuid) -> Result<Notification, ApiError> {
  let notification = state.store.get_notification(id).await.map_err(ApiError::store)?;
  found(notification, "notification", id)
}

async fn require_recipient<S: Store>(
  state: &ApiState<S>,
  notification_id: Uuid,
  user_id: Uuid,
) -> Result<(), ApiError> {
  let recipient = state
    .store
    .recipient(notification_id, user_id)
    .await
    .map_err(ApiError::store)?;
  match recipient {
    Some(_) => Ok(()),
    None => Err(ApiError::Forbidden("not a recipient of this notification".into())),
  }
}

/// `GET /notifications/{id}`
pub async fn get_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
  let notification = load(&state, id).await?;
  if notification.from_user_id != actor.profile_id {
    require_recipient(&state, id, actor.profile_id).await?;
  }
  Ok(Json(notification))
}

/// `POST /notifications/{id}/read`
pub async fn mark_read<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  load(&state, id).await?;
  require_recipient(&state, id, actor.profile_id).await?;
  state
    .store
    .mark_read(id, actor.profile_id)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
