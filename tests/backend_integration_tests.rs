use serde_json::json;
use shiftlog::backend::{Backend, BackendError, Query, RestBackend, fetch_one, tables};
use shiftlog::core::model::{Shift, ShiftStatus};
use tokio_test::{assert_err, assert_ok};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path, query_param},
};

// ============================================================================
// Helper Functions
// ============================================================================

fn signed_in(server: &MockServer) -> RestBackend {
    RestBackend::new(server.uri(), "anon-key".to_string(), Some("user-token".to_string()))
}

fn shift_row() -> serde_json::Value {
    json!({
        "id": "s1",
        "user_id": "u1",
        "vehicle_id": "v1",
        "status": "paused",
        "started_at": "2026-03-02T08:00:00Z",
        "paused_at": "2026-03-02T09:00:00Z",
        "paused_seconds": 0,
        "start_odometer": 1200.0
    })
}

// ============================================================================
// Tables
// ============================================================================

#[tokio::test]
async fn test_select_sends_filters_and_auth_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/shifts"))
        .and(query_param("select", "*"))
        .and(query_param("user_id", "eq.u1"))
        .and(query_param("status", "neq.completed"))
        .and(query_param("order", "started_at.desc"))
        .and(query_param("limit", "1"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([shift_row()])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = signed_in(&mock_server);
    let shift: Option<Shift> = fetch_one(
        &backend,
        tables::SHIFTS,
        Query::new()
            .eq("user_id", "u1")
            .neq("status", "completed")
            .order_desc("started_at"),
    )
    .await
    .unwrap();

    let shift = shift.expect("the open shift");
    assert_eq!(shift.status, ShiftStatus::Paused);
    assert_eq!(shift.start_odometer, Some(1200.0));
}

#[tokio::test]
async fn test_insert_asks_for_representation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/vehicles"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({"name": "Corolla"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": "v1", "user_id": "u1", "name": "Corolla", "type": "rental",
            "weekly_cost": 210.0, "monthly_wash_cost": 0.0
        }])))
        .mount(&mock_server)
        .await;

    let backend = signed_in(&mock_server);
    let stored = backend
        .insert(tables::VEHICLES, json!({"id": "v1", "name": "Corolla"}))
        .await
        .unwrap();

    // The stored row, not the one sent
    assert_eq!(stored["type"], "rental");
}

#[tokio::test]
async fn test_update_and_delete_send_filters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/settings"))
        .and(query_param("user_id", "eq.u1"))
        .and(body_partial_json(json!({"currency": "USD"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"user_id": "u1"}])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/fixed_costs"))
        .and(query_param("id", "eq.c1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let backend = signed_in(&mock_server);
    let updated = backend
        .update(
            tables::SETTINGS,
            &Query::new().eq("user_id", "u1"),
            json!({"currency": "USD"}),
        )
        .await
        .unwrap();
    assert_eq!(updated.len(), 1);

    assert_ok!(
        backend
            .delete(tables::FIXED_COSTS, &Query::new().eq("id", "c1"))
            .await
    );
}

#[tokio::test]
async fn test_api_error_message_is_verbatim() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/transactions"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "new row violates row-level security policy for table \"transactions\""
        })))
        .mount(&mock_server)
        .await;

    let backend = signed_in(&mock_server);
    let err = assert_err!(backend.insert(tables::TRANSACTIONS, json!({"id": "t1"})).await);

    assert_eq!(
        err,
        BackendError::Api {
            status: 403,
            message: "new row violates row-level security policy for table \"transactions\""
                .to_string(),
        }
    );
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    // Nothing listens on the discard port
    let backend = RestBackend::new("http://127.0.0.1:9".into(), "anon".into(), Some("t".into()));
    let err = backend
        .select(tables::VEHICLES, &Query::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Network(_)));
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_rejected_token_means_signed_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"msg": "JWT expired"})))
        .mount(&mock_server)
        .await;

    let backend = signed_in(&mock_server);
    assert_eq!(backend.current_user().await, Ok(None));
}

#[tokio::test]
async fn test_sign_in_stores_token_for_later_calls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_partial_json(json!({"email": "driver@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "token_type": "bearer",
            "user": {"id": "u9", "email": "driver@example.com"}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "u9", "email": "driver@example.com"})),
        )
        .mount(&mock_server)
        .await;

    let backend = RestBackend::new(mock_server.uri(), "anon-key".into(), None);
    let user = backend.sign_in("driver@example.com", "hunter2").await.unwrap();
    assert_eq!(user.id, "u9");

    let current = backend.current_user().await.unwrap();
    assert_eq!(current.map(|u| u.id).as_deref(), Some("u9"));
}

#[tokio::test]
async fn test_bad_password_message_surfaces() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&mock_server)
        .await;

    let backend = RestBackend::new(mock_server.uri(), "anon-key".into(), None);
    let err = backend.sign_in("driver@example.com", "wrong").await.unwrap_err();
    assert_eq!(err.message(), "Invalid login credentials");
}
