use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::{Extension, Path, State};
use axum::Json;
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use call_cell::handlers::*;
use call_cell::models::*;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn mock_config(mock_server: &MockServer) -> Arc<AppConfig> {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    Arc::new(config)
}

fn auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

fn token_for(user: &TestUser, config: &AppConfig) -> String {
    JwtTestUtils::create_test_token(user, &config.supabase_jwt_secret, Some(24))
}

fn user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn appointment_json(id: Uuid, patient_id: &str, doctor_id: Uuid) -> serde_json::Value {
    json!({
        "id": id,
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "appointment_date": "2026-09-01",
        "appointment_time": "10:00:00",
        "consultation_type": "video",
        "status": "ongoing",
        "amount": null,
        "notes": null,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn session_json(id: Uuid, appointment_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "appointment_id": appointment_id,
        "room_id": "room_k9PzQx7Ln2VbT4sWcYhAeD1mRfGu8oJi",
        "status": status,
        "started_at": if status == "waiting" { json!(null) } else { json!(Utc::now().to_rfc3339()) },
        "ended_at": if status == "ended" { json!(Utc::now().to_rfc3339()) } else { json!(null) },
        "created_at": Utc::now().to_rfc3339()
    })
}

async fn mock_session_fetch(mock_server: &MockServer, session_id: Uuid, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("id", format!("eq.{}", session_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([body])))
        .mount(mock_server)
        .await;
}

async fn mock_appointment_fetch(
    mock_server: &MockServer,
    appointment_id: Uuid,
    body: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([body])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_create_call_success() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient, &config);
    let appointment_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &patient.id, Uuid::new_v4()),
    )
    .await;

    // No live session exists yet.
    Mock::given(method("GET"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("status", "in.(waiting,active)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/video_calls"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([session_json(
            session_id,
            appointment_id,
            "waiting"
        )])))
        .mount(&mock_server)
        .await;

    let result = create_call(
        State(config),
        auth_header(&token),
        user_extension(&patient),
        Json(CreateCallRequest { appointment_id }),
    )
    .await;

    let Json(body) = result.expect("session creation should succeed");
    assert_eq!(body["id"], json!(session_id));
    assert_eq!(body["status"], json!("waiting"));
    assert!(body["room_id"].as_str().unwrap().starts_with("room_"));
}

#[tokio::test]
async fn test_create_call_refused_while_one_is_live() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient, &config);
    let appointment_id = Uuid::new_v4();

    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &patient.id, Uuid::new_v4()),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("status", "in.(waiting,active)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([session_json(
            Uuid::new_v4(),
            appointment_id,
            "active"
        )])))
        .mount(&mock_server)
        .await;

    let result = create_call(
        State(config),
        auth_header(&token),
        user_extension(&patient),
        Json(CreateCallRequest { appointment_id }),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_create_call_conflict_when_concurrent_create_wins() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient, &config);
    let appointment_id = Uuid::new_v4();

    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &patient.id, Uuid::new_v4()),
    )
    .await;

    // Both racing creates read "no live session"; the store's unique index
    // rejects whichever insert lands second.
    Mock::given(method("GET"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("status", "in.(waiting,active)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/video_calls"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint \"one_live_call_per_appointment\""
        })))
        .mount(&mock_server)
        .await;

    let result = create_call(
        State(config),
        auth_header(&token),
        user_extension(&patient),
        Json(CreateCallRequest { appointment_id }),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_create_call_rejects_non_participant() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let stranger = TestUser::patient("stranger@example.com");
    let token = token_for(&stranger, &config);
    let appointment_id = Uuid::new_v4();

    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), Uuid::new_v4()),
    )
    .await;

    let result = create_call(
        State(config),
        auth_header(&token),
        user_extension(&stranger),
        Json(CreateCallRequest { appointment_id }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_create_call_rejects_admin() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let admin = TestUser::admin("admin@example.com");
    let token = token_for(&admin, &config);
    let appointment_id = Uuid::new_v4();

    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), Uuid::new_v4()),
    )
    .await;

    let result = create_call(
        State(config),
        auth_header(&token),
        user_extension(&admin),
        Json(CreateCallRequest { appointment_id }),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_start_call_success() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let doctor = TestUser::doctor("doctor@example.com");
    let token = token_for(&doctor, &config);
    let doctor_id = doctor.id.parse::<Uuid>().unwrap();
    let session_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_session_fetch(
        &mock_server,
        session_id,
        session_json(session_id, appointment_id, "waiting"),
    )
    .await;
    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), doctor_id),
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("id", format!("eq.{}", session_id)))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([session_json(
            session_id,
            appointment_id,
            "active"
        )])))
        .mount(&mock_server)
        .await;

    let result = start_call(
        State(config),
        Path(session_id),
        auth_header(&token),
        user_extension(&doctor),
    )
    .await;

    let Json(body) = result.expect("start should succeed");
    assert_eq!(body["status"], json!("active"));
    assert!(!body["started_at"].is_null());
}

#[tokio::test]
async fn test_start_call_rejects_non_participant() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let stranger = TestUser::patient("stranger@example.com");
    let token = token_for(&stranger, &config);
    let session_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_session_fetch(
        &mock_server,
        session_id,
        session_json(session_id, appointment_id, "waiting"),
    )
    .await;
    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), Uuid::new_v4()),
    )
    .await;

    let result = start_call(
        State(config),
        Path(session_id),
        auth_header(&token),
        user_extension(&stranger),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_start_call_on_ended_session_reports_conflict() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let doctor = TestUser::doctor("doctor@example.com");
    let token = token_for(&doctor, &config);
    let doctor_id = doctor.id.parse::<Uuid>().unwrap();
    let session_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_session_fetch(
        &mock_server,
        session_id,
        session_json(session_id, appointment_id, "ended"),
    )
    .await;
    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), doctor_id),
    )
    .await;

    // Mocked for the interleaving where the session leaves `waiting` between
    // the read and the write; the filtered write then matches nothing.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = start_call(
        State(config),
        Path(session_id),
        auth_header(&token),
        user_extension(&doctor),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_start_call_maps_store_conflict_to_session_conflict() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let doctor = TestUser::doctor("doctor@example.com");
    let token = token_for(&doctor, &config);
    let doctor_id = doctor.id.parse::<Uuid>().unwrap();
    let session_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_session_fetch(
        &mock_server,
        session_id,
        session_json(session_id, appointment_id, "waiting"),
    )
    .await;
    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), doctor_id),
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint \"one_live_call_per_appointment\""
        })))
        .mount(&mock_server)
        .await;

    let result = start_call(
        State(config),
        Path(session_id),
        auth_header(&token),
        user_extension(&doctor),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_end_call_success_from_active() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let doctor = TestUser::doctor("doctor@example.com");
    let token = token_for(&doctor, &config);
    let doctor_id = doctor.id.parse::<Uuid>().unwrap();
    let session_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_session_fetch(
        &mock_server,
        session_id,
        session_json(session_id, appointment_id, "active"),
    )
    .await;
    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), doctor_id),
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("id", format!("eq.{}", session_id)))
        .and(query_param("status", "in.(waiting,active)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([session_json(
            session_id,
            appointment_id,
            "ended"
        )])))
        .mount(&mock_server)
        .await;

    let result = end_call(
        State(config),
        Path(session_id),
        auth_header(&token),
        user_extension(&doctor),
    )
    .await;

    let Json(body) = result.expect("end should succeed");
    assert_eq!(body["status"], json!("ended"));
    assert!(!body["ended_at"].is_null());
}

#[tokio::test]
async fn test_end_call_rejects_non_participant() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let stranger = TestUser::patient("stranger@example.com");
    let token = token_for(&stranger, &config);
    let session_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_session_fetch(
        &mock_server,
        session_id,
        session_json(session_id, appointment_id, "active"),
    )
    .await;
    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), Uuid::new_v4()),
    )
    .await;

    let result = end_call(
        State(config),
        Path(session_id),
        auth_header(&token),
        user_extension(&stranger),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_end_call_twice_reports_conflict() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let doctor = TestUser::doctor("doctor@example.com");
    let token = token_for(&doctor, &config);
    let doctor_id = doctor.id.parse::<Uuid>().unwrap();
    let session_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mock_session_fetch(
        &mock_server,
        session_id,
        session_json(session_id, appointment_id, "ended"),
    )
    .await;
    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &Uuid::new_v4().to_string(), doctor_id),
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("status", "in.(waiting,active)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = end_call(
        State(config),
        Path(session_id),
        auth_header(&token),
        user_extension(&doctor),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn test_get_call_for_appointment_returns_latest() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);

    let patient = TestUser::patient("patient@example.com");
    let token = token_for(&patient, &config);
    let appointment_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();

    mock_appointment_fetch(
        &mock_server,
        appointment_id,
        appointment_json(appointment_id, &patient.id, Uuid::new_v4()),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/video_calls"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([session_json(
            session_id,
            appointment_id,
            "active"
        )])))
        .mount(&mock_server)
        .await;

    let result = get_call_for_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&patient),
    )
    .await;

    let Json(body) = result.expect("lookup should succeed");
    assert_eq!(body["id"], json!(session_id));
    assert_eq!(body["status"], json!("active"));
}
