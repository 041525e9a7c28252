//! Handlers for `/me` and `/profiles` endpoints.
//!
//! | Method | Path | Who |
//! |--------|------|-----|
//! | `GET`  | `/me` | anyone |
//! | `GET`  | `/profiles` | administrators; principals see their school |
//! | `POST` | `/profiles` | administrators (admins, principals), principals (their school) |
//! | `GET`  | `/profiles/{id}` | self, managers, staff of the same school |
//! | `PUT`  | `/profiles/{id}` | self (contact fields), managers |
//! | `DELETE` | `/profiles/{id}` | managers |
//! | `POST` | `/profiles/{id}/activate`, `/deactivate` | managers |
//! | `POST` | `/profiles/{id}/password` | self, managers |
//! | `GET`  | `/profiles/{id}/children` | the parent, their principal |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use campus_core::{
  access,
  profile::{NewProfile, ProfileQuery, ProfileUpdate, UserProfile, UserRole},
  store::Store,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  ApiState, CurrentUser,
  auth::hash_password,
  error::{ApiError, found},
};

async fn load<S: Store>(state: &ApiState<S>, id: Uuid) -> Result<UserProfile, ApiError> {
  let profile = state.store.get_profile(id).await.map_err(ApiError::store)?;
  found(profile, "profile", id)
}

fn hash(password: &str) -> Result<String, ApiError> {
  if password.is_empty() {
    return Err(ApiError::BadRequest("password must not be empty".into()));
  }
  hash_password(password).map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

// ─── Me ──────────────────────────────────────────────────────────────────────

/// `GET /me`
pub async fn me(CurrentUser(actor): CurrentUser) -> Json<UserProfile> { Json(actor) }

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /profiles[?role=&school_unit_id=&text=&is_active=&limit=&offset=]`
pub async fn list<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Query(mut query): Query<ProfileQuery>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
  access::require_role(&actor, &[UserRole::Administrator, UserRole::Principal])?;
  if actor.role == UserRole::Principal {
    query.school_unit_id = Some(access::principal_school(&actor)?);
  }
  let profiles = state.store.list_profiles(query).await.map_err(ApiError::store)?;
  Ok(Json(profiles))
}

// ─── Create ──────────────────────────────────────────────────────────────────

fn default_true() -> bool { true }

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub role:                        UserRole,
  /// Defaults to the principal's school when a principal creates a profile.
  pub school_unit_id:              Option<Uuid>,
  pub username:                    String,
  pub full_name:                   String,
  pub email:                       Option<String>,
  pub phone_number:                Option<String>,
  pub birth_date:                  Option<NaiveDate>,
  pub address:                     Option<String>,
  pub personal_id_number:          Option<String>,
  #[serde(default = "default_true")]
  pub email_notifications_enabled: bool,
  #[serde(default)]
  pub sms_notifications_enabled:   bool,
  #[serde(default)]
  pub taught_subject_ids:          Vec<Uuid>,
  #[serde(default)]
  pub parent_ids:                  Vec<Uuid>,
  pub password:                    Option<String>,
}

/// `POST /profiles`
pub async fn create<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let school_unit_id = match (actor.role, body.school_unit_id) {
    (UserRole::Principal, None) if body.role.requires_school_at_creation() => {
      actor.school_unit_id
    }
    (_, school) => school,
  };
  access::require_manage(&actor, body.role, school_unit_id)?;

  let password_hash = body.password.as_deref().map(hash).transpose()?;
  let input = NewProfile {
    school_unit_id,
    full_name: body.full_name,
    username: body.username,
    email: body.email,
    phone_number: body.phone_number,
    role: body.role,
    birth_date: body.birth_date,
    address: body.address,
    personal_id_number: body.personal_id_number,
    email_notifications_enabled: body.email_notifications_enabled,
    sms_notifications_enabled: body.sms_notifications_enabled,
    taught_subject_ids: body.taught_subject_ids,
    parent_ids: body.parent_ids,
    password_hash,
  };
  let profile = state.store.create_profile(input).await.map_err(ApiError::store)?;
  info!(
    profile_id = %profile.profile_id,
    role = %profile.role,
    by = %actor.profile_id,
    "created profile"
  );
  Ok((StatusCode::CREATED, Json(profile)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /profiles/{id}`
pub async fn get_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, ApiError> {
  let profile = load(&state, id).await?;
  access::require_read_profile(&actor, &profile)?;
  Ok(Json(profile))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PUT /profiles/{id}` replaces every editable field.
pub async fn update<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
  let target = load(&state, id).await?;
  access::require_self_or_manager(&actor, &target)?;
  if !access::can_manage(&actor, target.role, target.school_unit_id)
    && update.changes_managed_fields(&target)
  {
    return Err(ApiError::Forbidden(
      "only a manager can change subjects, parents or the personal id number".into(),
    ));
  }
  let profile = state
    .store
    .update_profile(id, update, state.current_year())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(profile))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /profiles/{id}`
pub async fn delete_one<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  let target = load(&state, id).await?;
  access::require_manage_profile(&actor, &target)?;
  state.store.delete_profile(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Activation ──────────────────────────────────────────────────────────────

async fn set_active<S: Store>(
  state: &ApiState<S>,
  actor: &UserProfile,
  id: Uuid,
  is_active: bool,
) -> Result<Json<UserProfile>, ApiError> {
  let target = load(state, id).await?;
  access::require_manage_profile(actor, &target)?;
  if target.profile_id == actor.profile_id {
    return Err(ApiError::BadRequest("cannot change the state of your own account".into()));
  }
  let profile = state.store.set_active(id, is_active).await.map_err(ApiError::store)?;
  Ok(Json(profile))
}

/// `POST /profiles/{id}/activate`
pub async fn activate<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, ApiError> {
  set_active(&state, &actor, id, true).await
}

/// `POST /profiles/{id}/deactivate`
pub async fn deactivate<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, ApiError> {
  set_active(&state, &actor, id, false).await
}

// ─── Password ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PasswordBody {
  pub password: String,
}

/// `POST /profiles/{id}/password` — body: `{"password":"…"}`
pub async fn set_password<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<PasswordBody>,
) -> Result<StatusCode, ApiError> {
  let target = load(&state, id).await?;
  access::require_self_or_manager(&actor, &target)?;
  let password_hash = hash(&body.password)?;
  state
    .store
    .set_password(id, password_hash)
    .await
    .map_err(ApiError::store)?;
  info!(profile_id = %id, by = %actor.profile_id, "password changed");
  Ok(StatusCode::NO_CONTENT)
}

// ─── Children ────────────────────────────────────────────────────────────────

/// `GET /profiles/{id}/children`
pub async fn children<S: Store>(
  State(state): State<ApiState<S>>,
  CurrentUser(actor): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
  let parent = load(&state, id).await?;
  if parent.role != UserRole::Parent {
    return Err(ApiError::BadRequest(format!("{} is not a parent", parent.full_name)));
  }
  if actor.profile_id != parent.profile_id {
    let school = parent
      .school_unit_id
      .ok_or_else(|| ApiError::Forbidden("cannot read this parent's children".into()))?;
    access::require_principal_of(&actor, school)?;
  }
  let children = state.store.children_of(id).await.map_err(ApiError::store)?;
  Ok(Json(children))
}
