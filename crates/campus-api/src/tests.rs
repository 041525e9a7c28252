//! Router tests: requests go through `api_router` against an in-memory store.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use campus_core::{
  calendar::{AcademicCalendar, Term},
  notification::{DeliveryChannel, DeliveryJob},
  profile::{NewProfile, UserProfile, UserRole},
  program::{GenericSubjectInput, NewGenericProgram, NewProgram},
  school::{NewSchool, NewSubject, SchoolCategory, Subject},
  store::{CalendarStore, CatalogStore, ProfileStore, ProgramStore, SchoolStore, StudyClassStore},
  study_class::{AssignmentInput, NewStudyClass, StudyClass},
};
use campus_store_sqlite::SqliteStore;
use chrono::NaiveDate;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{ApiSettings, ApiState, Clock, api_router, auth::hash_password};

const PASSWORD: &str = "parola";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Harness {
  state:      ApiState<SqliteStore>,
  deliveries: mpsc::Receiver<DeliveryJob>,
  math:       Subject,
  class:      StudyClass,
  other:      UserProfile,
  parent:     UserProfile,
  student:    UserProfile,
}

async fn profile(
  store: &SqliteStore,
  hash: &str,
  role: UserRole,
  school: Option<Uuid>,
  username: &str,
  subjects: &[Uuid],
) -> UserProfile {
  let mut input = NewProfile::new(role, school, username, username);
  input.email = Some(format!("{username}@school.example"));
  input.password_hash = Some(hash.to_owned());
  input.taught_subject_ids = subjects.to_vec();
  store.create_profile(input).await.unwrap()
}

/// One school with a grade 9 class for 2024, today being 2025-03-03.
async fn harness() -> Harness {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let hash = hash_password(PASSWORD).unwrap();

  profile(&store, &hash, UserRole::Administrator, None, "admin", &[]).await;
  let principal = profile(&store, &hash, UserRole::Principal, None, "director", &[]).await;
  let school = store
    .create_school(NewSchool {
      name:             "Liceul Teoretic".into(),
      address:          "Str. Scolii 3".into(),
      phone_number:     "0264222222".into(),
      email:            "office@liceu.example".into(),
      district:         "Cluj".into(),
      city:             "Dej".into(),
      categories:       vec![SchoolCategory::Highschool],
      academic_profile: None,
      principal_id:     principal.profile_id,
    })
    .await
    .unwrap();
  let school_id = school.school_unit_id;

  let math = store.create_subject(NewSubject { name: "Matematica".into() }).await.unwrap();
  let generic = store
    .create_generic_program(NewGenericProgram {
      name:             "Real".into(),
      category:         SchoolCategory::Highschool,
      academic_profile: None,
      subjects:         vec![GenericSubjectInput {
        subject_id:   math.subject_id,
        class_grade:  9,
        weekly_hours: 4,
      }],
      optional_hours:   BTreeMap::new(),
    })
    .await
    .unwrap();
  let program = store
    .create_program(NewProgram {
      school_unit_id:     school_id,
      generic_program_id: generic.generic_program_id,
      academic_year:      2024,
      core_subject_id:    None,
      optional_subjects:  Vec::new(),
    })
    .await
    .unwrap();

  let teacher =
    profile(&store, &hash, UserRole::Teacher, Some(school_id), "t.mate", &[math.subject_id]).await;
  let other =
    profile(&store, &hash, UserRole::Teacher, Some(school_id), "t.alt", &[math.subject_id]).await;
  let parent = profile(&store, &hash, UserRole::Parent, Some(school_id), "parinte", &[]).await;
  let mut student = NewProfile::new(UserRole::Student, Some(school_id), "elev", "Maria Rus");
  student.password_hash = Some(hash.clone());
  student.parent_ids = vec![parent.profile_id];
  let student = store.create_profile(student).await.unwrap();

  store
    .set_calendar(AcademicCalendar {
      academic_year:   2024,
      first_semester:  Term { starts_on: date(2024, 9, 9), ends_on: date(2025, 1, 31) },
      second_semester: Term { starts_on: date(2025, 2, 10), ends_on: date(2025, 6, 20) },
    })
    .await
    .unwrap();

  let class = store
    .create_study_class(
      NewStudyClass {
        school_unit_id:  school_id,
        program_id:      program.program_id,
        class_grade:     9,
        class_letter:    "A".into(),
        academic_year:   2024,
        class_master_id: teacher.profile_id,
        teachers:        vec![AssignmentInput {
          subject_id: math.subject_id,
          teacher_id: teacher.profile_id,
        }],
        student_ids:     vec![student.profile_id],
      },
      2024,
    )
    .await
    .unwrap();

  let (tx, deliveries) = mpsc::channel(16);
  let state = ApiState {
    store:      Arc::new(store),
    deliveries: tx,
    settings:   Arc::new(ApiSettings {
      clock: Clock::Fixed(date(2025, 3, 3)),
      ..Default::default()
    }),
  };
  Harness { state, deliveries, math, class, other, parent, student }
}

impl Harness {
  async fn send(&self, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      let auth = format!("Basic {}", B64.encode(format!("{user}:{PASSWORD}")));
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    let body = match body {
      Some(json) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    api_router(self.state.clone())
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap()
  }

  async fn math_catalog(&self) -> Uuid {
    self
      .state
      .store
      .list_class_subject_catalogs(self.class.study_class_id, self.math.subject_id)
      .await
      .unwrap()[0]
      .catalog_id
  }
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

// ─── Authentication ──────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_credentials_get_a_basic_challenge() {
  let h = harness().await;
  let resp = h.send("GET", "/me", None, None).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
  assert!(challenge.to_str().unwrap().starts_with("Basic"));
}

#[tokio::test]
async fn me_returns_the_caller() {
  let h = harness().await;
  let resp = h.send("GET", "/me", Some("elev"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["username"], "elev");
  assert_eq!(body["student_in_class_id"], json!(h.class.study_class_id));
}

// ─── Access control and error mapping ────────────────────────────────────────

#[tokio::test]
async fn students_cannot_list_profiles() {
  let h = harness().await;
  let resp = h.send("GET", "/profiles", Some("elev"), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  assert!(json_body(resp).await["error"].is_string());
}

#[tokio::test]
async fn unknown_class_is_not_found() {
  let h = harness().await;
  let uri = format!("/study-classes/{}", Uuid::new_v4());
  let resp = h.send("GET", &uri, Some("director"), None).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_class_is_a_conflict() {
  let h = harness().await;
  let body = json!({
    "program_id": h.class.program_id,
    "class_grade": 9,
    "class_letter": "A",
    "academic_year": 2024,
    "class_master_id": h.other.profile_id,
    "teachers": [{ "subject_id": h.math.subject_id, "teacher_id": h.other.profile_id }],
  });
  let resp = h.send("POST", "/study-classes", Some("director"), Some(body)).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
}

// ─── Catalogs ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn teacher_grades_and_parent_reads_the_report_card() {
  let h = harness().await;
  let catalog = h.math_catalog().await;
  let uri = format!("/catalogs/{catalog}/grades");

  let grade = json!({ "grade": 9, "taken_at": "2025-02-20" });
  let resp = h.send("POST", &uri, Some("t.mate"), Some(grade.clone())).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  assert_eq!(json_body(resp).await["semester"], "second");

  let resp = h.send("POST", &uri, Some("t.alt"), Some(grade)).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);

  let future = json!({ "grade": 7, "taken_at": "2025-04-01" });
  let resp = h.send("POST", &uri, Some("t.mate"), Some(future)).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let card = format!("/students/{}/report-card", h.student.profile_id);
  let resp = h.send("GET", &card, Some("parinte"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = json_body(resp).await;
  assert_eq!(body["class_name"], "IX A");
  assert_eq!(body["subjects"][0]["grades"].as_array().unwrap().len(), 1);

  let resp = h.send("GET", &card, Some("t.alt"), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn class_master_authorizes_absences() {
  let h = harness().await;
  let catalog = h.math_catalog().await;
  let uri = format!("/catalogs/{catalog}/absences");
  let resp = h
    .send("POST", &uri, Some("t.mate"), Some(json!({ "taken_at": "2025-02-24" })))
    .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let absence = json_body(resp).await;
  assert_eq!(absence["is_founded"], false);

  let authorize = format!("/absences/{}/authorize", absence["absence_id"].as_str().unwrap());
  let resp = h.send("POST", &authorize, Some("t.alt"), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  let resp = h.send("POST", &authorize, Some("t.mate"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["is_founded"], true);
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sent_notifications_reach_the_delivery_queue() {
  let mut h = harness().await;
  let body = json!({
    "title": "Sedinta cu parintii",
    "body": "Joi la ora 18.",
    "target": { "type": "class", "study_class_id": h.class.study_class_id, "role": "parent" },
  });
  let resp = h.send("POST", "/notifications", Some("t.mate"), Some(body)).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let notification = json_body(resp).await;
  assert_eq!(notification["recipients_count"], 1);

  let job = h.deliveries.try_recv().unwrap();
  assert_eq!(job.user_id, h.parent.profile_id);
  assert_eq!(job.channel, DeliveryChannel::Email);

  let id = notification["notification_id"].as_str().unwrap();
  let resp = h.send("GET", &format!("/notifications/{id}"), Some("elev"), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);

  let resp = h.send("POST", &format!("/notifications/{id}/read"), Some("parinte"), None).await;
  assert_eq!(resp.status(), StatusCode::NO_CONTENT);
  let resp = h.send("GET", "/notifications?unread_only=true", Some("parinte"), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 0);
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_administrators_refresh_statistics() {
  let h = harness().await;
  let resp = h.send("POST", "/statistics/refresh", Some("director"), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);

  let resp = h.send("POST", "/statistics/refresh", Some("admin"), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let summary = json_body(resp).await;
  assert_eq!(summary["academic_year"], 2024);
  assert_eq!(summary["study_classes"], 1);

  let resp = h.send("GET", "/statistics/study-classes", Some("director"), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn at_risk_thresholds_can_be_lowered_per_request() {
  let h = harness().await;
  let catalog = h.math_catalog().await;
  let uri = format!("/catalogs/{catalog}/absences");
  h.send("POST", &uri, Some("t.mate"), Some(json!({ "taken_at": "2025-02-24" })))
    .await;

  let resp = h.send("GET", "/statistics/at-risk-students", Some("director"), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 0);

  let resp = h
    .send("GET", "/statistics/at-risk-students?unfounded_absences=1", Some("director"), None)
    .await;
  let flagged = json_body(resp).await;
  assert_eq!(flagged[0]["student_id"], json!(h.student.profile_id));

  let class_view = format!(
    "/statistics/at-risk-students?unfounded_absences=1&study_class_id={}",
    h.class.study_class_id
  );
  let resp = h.send("GET", &class_view, Some("t.alt"), None).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  let resp = h.send("GET", &class_view, Some("t.mate"), None).await;
  assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);
}
